use askama::Result;
use chrono::{DateTime, Utc};

use crate::ledger::ExpiryStatus;

// Lot rows in the warehouse page are coloured by expiry bucket.
#[allow(clippy::unnecessary_wraps)]
pub fn expiry_class(status: &ExpiryStatus) -> Result<&'static str> {
    Ok(match status {
        ExpiryStatus::Expired => "expired",
        ExpiryStatus::NearExpiry => "near-expiry",
        ExpiryStatus::Normal => "normal",
        ExpiryStatus::NoExpiry => "no-expiry",
    })
}

#[allow(clippy::unnecessary_wraps)]
pub fn date_or_dash(date: &Option<DateTime<Utc>>) -> Result<String> {
    Ok(date.map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string()))
}
