use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{LedgerError, LedgerResult};

pub const DEFAULT_NEAR_EXPIRY_DAYS: i64 = 30;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryStatus {
    Expired,
    NearExpiry,
    Normal,
    NoExpiry,
}

impl ExpiryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExpiryStatus::Expired => "Expired",
            ExpiryStatus::NearExpiry => "Near expiry",
            ExpiryStatus::Normal => "Normal",
            ExpiryStatus::NoExpiry => "No expiry",
        }
    }
}

/// Whole days until `expires_at`, rounded up.
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expires_at - now).num_seconds();
    // ceil division that also holds for negative spans
    seconds.div_euclid(SECONDS_PER_DAY) + i64::from(seconds.rem_euclid(SECONDS_PER_DAY) != 0)
}

pub fn classify_expiry(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    window_days: i64,
) -> ExpiryStatus {
    let Some(expires_at) = expires_at else {
        return ExpiryStatus::NoExpiry;
    };
    let days = days_until(expires_at, now);
    if days <= 0 {
        ExpiryStatus::Expired
    } else if days <= window_days {
        ExpiryStatus::NearExpiry
    } else {
        ExpiryStatus::Normal
    }
}

/// What to do with an expiry date that cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryDatePolicy {
    /// Unparseable or epoch-zero dates become "no expiry".
    #[default]
    Lenient,
    /// Unparseable or epoch-zero dates are rejected.
    Strict,
}

pub fn parse_expiry(raw: Option<&str>, policy: ExpiryDatePolicy) -> LedgerResult<Option<DateTime<Utc>>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    match parse_timestamp(raw).filter(|ts| ts.timestamp_millis() != 0) {
        Some(ts) => Ok(Some(ts)),
        None => match policy {
            ExpiryDatePolicy::Lenient => {
                log::warn!("Ignoring unusable expiry date {:?}", raw);
                Ok(None)
            }
            ExpiryDatePolicy::Strict => Err(LedgerError::validation(format!(
                "invalid expiry date: {}",
                raw
            ))),
        },
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
