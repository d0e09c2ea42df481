//! Ledger error model.
//!
//! Every operation of the ledger fails with exactly one of three kinds:
//!
//! - **Validation**: the caller sent malformed or conflicting parameters. The
//!   offending parameter is always named so the API can echo it back.
//! - **NotFound**: a point lookup (transaction by id, mapping) matched nothing.
//!   An empty listing page is *not* a not-found condition.
//! - **Storage**: the backing SQL store failed. Cancellation and deadline
//!   expiry are storage sub-kinds that callers must not retry blindly.

use thiserror::Error;

/// Result type used across the ledger crates.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Top-level ledger error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A request parameter failed validation.
    #[error("{message}")]
    Validation { param: String, message: String },

    /// A point lookup found nothing.
    #[error("{0} not found")]
    NotFound(String),

    /// The backing store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn validation(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Shorthand for the "could not decode `<param>`" family of errors.
    pub fn invalid_param(param: &str) -> Self {
        Self::validation(param, format!("invalid '{param}' query param"))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Name of the offending parameter, for validation errors.
    pub fn param(&self) -> Option<&str> {
        match self {
            Self::Validation { param, .. } => Some(param),
            _ => None,
        }
    }
}

/// Failure of the backing store.
///
/// Messages carry the operation name for logs; the API layer never forwards
/// them to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The caller canceled the operation while the query was in flight.
    #[error("{0}: canceled")]
    Canceled(String),

    /// The caller's deadline expired while the query was in flight.
    #[error("{0}: deadline exceeded")]
    DeadlineExceeded(String),

    /// A uniqueness or integrity constraint rejected a write.
    #[error("{operation}: constraint violated: {message}")]
    Constraint { operation: String, message: String },

    /// Connectivity or query-execution failure.
    #[error("{operation}: {message}")]
    Backend { operation: String, message: String },

    /// A stored row could not be decoded into a domain value.
    #[error("{operation}: corrupted row: {message}")]
    Corrupt { operation: String, message: String },
}

impl StorageError {
    pub fn backend(operation: &str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn constraint(operation: &str, message: impl Into<String>) -> Self {
        Self::Constraint {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    pub fn corrupt(operation: &str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// True for caller-initiated aborts (explicit cancel or deadline).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled(_) | Self::DeadlineExceeded(_))
    }
}
