//! Configuration loaded from environment variables (a `.env` file is read first).
//!
//! Required: `DATABASE_URL`, `JWT_SECRET`.
//!
//! Optional:
//! - `PORT` (default 3000)
//! - `DEFAULT_UNIT_OF_MEASURE_ID` (default 2, "Unidad")
//! - `NEAR_EXPIRY_DAYS` (default 30)
//! - `LOT_SELECTION_POLICY` (`created_order`, `nearest_expiry`, `explicit`)
//! - `STRICT_EXPIRY_DATES` (default false)
//! - `ANONYMOUS_CUSTOMER_ID` (walk-in customer used when a sale names none)

use std::env;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

use crate::ledger::{ExpiryDatePolicy, LedgerSettings, LotSelectionPolicy, DEFAULT_NEAR_EXPIRY_DAYS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub ledger: LedgerSettings,
    pub anonymous_customer_id: Option<Uuid>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let expiry_dates = if parse_or(&lookup, "STRICT_EXPIRY_DATES", false)? {
            ExpiryDatePolicy::Strict
        } else {
            ExpiryDatePolicy::Lenient
        };

        let ledger = LedgerSettings {
            default_unit_of_measure_id: parse_or(&lookup, "DEFAULT_UNIT_OF_MEASURE_ID", 2)?,
            near_expiry_days: parse_or(&lookup, "NEAR_EXPIRY_DAYS", DEFAULT_NEAR_EXPIRY_DAYS)?,
            lot_selection: parse_or(&lookup, "LOT_SELECTION_POLICY", LotSelectionPolicy::CreatedOrder)?,
            expiry_dates,
        };

        let anonymous_customer_id = match lookup("ANONYMOUS_CUSTOMER_ID").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(Uuid::parse_str(raw.trim()).map_err(|e| {
                ConfigError::InvalidEnvVar("ANONYMOUS_CUSTOMER_ID".to_string(), e.to_string())
            })?),
            None => None,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            port: parse_or(&lookup, "PORT", 3000)?,
            ledger,
            anonymous_customer_id,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
