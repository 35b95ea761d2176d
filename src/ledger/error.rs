use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the lot ledger's write paths.
///
/// Reconciliation never produces one of these; it degrades to zeroes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("lot numbers already exist for product {product_id}: {}", lot_numbers.join(", "))]
    Conflict {
        product_id: Uuid,
        lot_numbers: Vec<String>,
    },

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("{0} not found")]
    NotFound(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
