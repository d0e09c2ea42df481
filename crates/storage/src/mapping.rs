//! The ledger's singleton mapping document.

use sqlx::{AnyConnection, Row};
use tracing::instrument;

use ledger_core::{LedgerError, LedgerResult, Mapping, StorageError};

use crate::cancel::CancelSignal;
use crate::exec;
use crate::store::Store;

impl Store {
    /// Latest saved mapping; `NotFound` if none was ever saved.
    #[instrument(skip(self, conn, signal), fields(dialect = %self.dialect()), err)]
    pub async fn load_mapping(
        &self,
        conn: &mut AnyConnection,
        signal: &CancelSignal,
    ) -> LedgerResult<Mapping> {
        const OPERATION: &str = "load_mapping";

        let row = exec::fetch_optional(conn, &self.builder().load_mapping(), signal, OPERATION)
            .await?
            .ok_or_else(|| LedgerError::not_found("mapping"))?;
        let raw: String = row
            .try_get("mapping")
            .map_err(|e| crate::error::map_sqlx_error(OPERATION, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| StorageError::corrupt(OPERATION, format!("mapping: {e}")).into())
    }

    /// Replace the mapping wholesale.
    #[instrument(
        skip(self, conn, mapping, signal),
        fields(dialect = %self.dialect(), contracts = mapping.contracts.len()),
        err
    )]
    pub async fn save_mapping(
        &self,
        conn: &mut AnyConnection,
        mapping: &Mapping,
        signal: &CancelSignal,
    ) -> LedgerResult<()> {
        const OPERATION: &str = "save_mapping";

        let raw = serde_json::to_string(mapping)
            .map_err(|e| StorageError::corrupt(OPERATION, format!("mapping: {e}")))?;
        exec::execute(conn, &self.builder().save_mapping(&raw), signal, OPERATION).await?;
        Ok(())
    }
}
