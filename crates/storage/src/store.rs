//! The ledger store handle.

use sqlx::AnyConnection;

use ledger_core::StorageError;

use crate::dialect::{Dialect, QueryBuilder};

/// Dialect-bound entry point for every ledger read and write.
///
/// The store holds no connection. Each operation borrows the caller's
/// connection (or open transaction) for the duration of the call, so one
/// handle can serve any number of concurrent requests.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Store {
    dialect: Dialect,
}

impl Store {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Bind to whatever backend `conn` talks to.
    pub fn for_connection(conn: &AnyConnection) -> Result<Self, StorageError> {
        let backend = conn.backend_name();
        Dialect::from_backend_name(backend)
            .map(Self::new)
            .ok_or_else(|| {
                StorageError::backend("resolve_dialect", format!("unsupported backend {backend}"))
            })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) fn builder(&self) -> &'static dyn QueryBuilder {
        self.dialect.builder()
    }
}
