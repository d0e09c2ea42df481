use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use ledger_core::{LedgerError, StorageError};

pub const CODE_VALIDATION: &str = "VALIDATION";
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const CODE_CANCELED: &str = "CANCELED";
pub const CODE_INTERNAL: &str = "INTERNAL";

/// Map a ledger failure to a response. Storage detail is logged, never sent.
pub fn ledger_error_to_response(err: LedgerError) -> Response {
    match err {
        LedgerError::Validation { message, .. } => {
            json_error(StatusCode::BAD_REQUEST, CODE_VALIDATION, message)
        }
        LedgerError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, CODE_NOT_FOUND, format!("{what} not found"))
        }
        LedgerError::Storage(e) if e.is_cancellation() => {
            tracing::warn!(error = %e, "request abandoned");
            json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                CODE_CANCELED,
                "request canceled or timed out",
            )
        }
        LedgerError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                CODE_INTERNAL,
                "internal storage error",
            )
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Handler error; renders through [`ledger_error_to_response`].
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ledger_error_to_response(self.0)
    }
}
