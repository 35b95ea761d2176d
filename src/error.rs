//! Application error type. Handlers return `Result<T, AppError>`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ledger::LedgerError;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Turns a unique-constraint violation into a conflict, leaving other database errors alone.
    pub fn from_unique_violation(err: sqlx::Error, message: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Self::Conflict(message.into())
            }
            _ => Self::Database(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(err) => match err {
                LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                LedgerError::Conflict { .. } | LedgerError::InsufficientStock { .. } => StatusCode::CONFLICT,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            },
            Self::Database(sqlx::Error::RowNotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Template(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl AppError {
    /// Stable machine-readable kind sent next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ledger(LedgerError::Validation(_)) | Self::BadRequest(_) => "validation",
            Self::Ledger(LedgerError::Conflict { .. }) | Self::Conflict(_) => "conflict",
            Self::Ledger(LedgerError::InsufficientStock { .. }) => "insufficient_stock",
            Self::Ledger(LedgerError::NotFound(_)) | Self::NotFound(_) => "not_found",
            Self::Database(sqlx::Error::RowNotFound) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Database(_) | Self::Template(_) | Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the log.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            log::warn!("Request rejected: {}", self);
            self.to_string()
        };

        (status, Json(json!({ "message": message, "error": self.code() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn ledger_errors_map_to_statuses() {
        assert_eq!(
            AppError::from(LedgerError::validation("bad lots")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(LedgerError::Conflict {
                product_id: Uuid::nil(),
                lot_numbers: vec!["A1".to_string()],
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(LedgerError::InsufficientStock { requested: 5, available: 1 }).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(LedgerError::not_found("lot")).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn ledger_message_passes_through() {
        let err = AppError::from(LedgerError::validation("at least one lot is required"));
        assert_eq!(err.to_string(), "at least one lot is required");
    }

    #[test]
    fn database_errors_are_opaque() {
        let response = AppError::Database(sqlx::Error::PoolTimedOut).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn codes_follow_the_ledger_variant() {
        assert_eq!(
            AppError::from(LedgerError::InsufficientStock { requested: 2, available: 0 }).code(),
            "insufficient_stock"
        );
        assert_eq!(AppError::Conflict("dup".to_string()).code(), "conflict");
        assert_eq!(AppError::Database(sqlx::Error::PoolTimedOut).code(), "internal");
    }

    #[test]
    fn missing_row_is_not_found() {
        assert_eq!(AppError::Database(sqlx::Error::RowNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn non_unique_database_error_stays_database() {
        let err = AppError::from_unique_violation(sqlx::Error::PoolClosed, "duplicate");
        assert!(matches!(err, AppError::Database(_)));
    }
}
