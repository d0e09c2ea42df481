//! Table bootstrap.

use sqlx::AnyConnection;
use tracing::{info, instrument};

use ledger_core::StorageError;

use crate::cancel::CancelSignal;
use crate::dialect::{Dialect, Statement};
use crate::exec;

/// Create the ledger tables if they do not exist yet.
#[instrument(skip(conn), fields(dialect = %dialect), err)]
pub async fn migrate(conn: &mut AnyConnection, dialect: Dialect) -> Result<(), StorageError> {
    let signal = CancelSignal::none();
    for ddl in dialect.builder().create_tables() {
        let stmt = Statement {
            sql: (*ddl).to_string(),
            args: Vec::new(),
        };
        exec::execute(conn, &stmt, &signal, "migrate").await?;
    }
    info!("ledger schema ready");
    Ok(())
}
