//! Mapping of sqlx failures onto the ledger's storage taxonomy.

use sqlx::error::ErrorKind;

use ledger_core::StorageError;

/// Translate a sqlx error raised while running `operation`.
///
/// Uniqueness and integrity violations become `Constraint`; row decoding
/// problems become `Corrupt`; everything else is a `Backend` failure.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error: {}", db_err.message());
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => StorageError::constraint(operation, msg),
                _ => StorageError::backend(operation, msg),
            }
        }
        sqlx::Error::ColumnDecode { index, source } => {
            StorageError::corrupt(operation, format!("column {index}: {source}"))
        }
        sqlx::Error::ColumnNotFound(column) => {
            StorageError::corrupt(operation, format!("missing column {column}"))
        }
        sqlx::Error::Decode(source) => StorageError::corrupt(operation, source.to_string()),
        sqlx::Error::PoolClosed => StorageError::backend(operation, "connection pool closed"),
        sqlx::Error::PoolTimedOut => {
            StorageError::backend(operation, "timed out acquiring a connection")
        }
        sqlx::Error::RowNotFound => StorageError::backend(operation, "unexpected empty result"),
        other => StorageError::backend(operation, format!("sqlx error: {other}")),
    }
}
