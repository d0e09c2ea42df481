//! Transaction persistence, point lookup, listing and counting.

use sqlx::any::AnyRow;
use sqlx::{AnyConnection, FromRow, Row};
use tracing::{Span, debug, instrument};

use ledger_core::transaction::canonical_timestamp;
use ledger_core::{
    Cursor, LedgerError, LedgerResult, Metadata, NewTransaction, Posting, StorageError,
    Transaction, TransactionFilter, TransactionsPaginationToken, TransactionsQuery, clamp_page_size,
    encode_token,
};

use crate::cancel::CancelSignal;
use crate::dialect::TransactionInsert;
use crate::exec;
use crate::store::Store;

/// Raw `transactions` row, JSON columns still as text.
#[derive(Debug)]
struct TransactionRow {
    id: i64,
    timestamp: String,
    reference: Option<String>,
    metadata: Option<String>,
    postings: String,
}

impl<'r> FromRow<'r, AnyRow> for TransactionRow {
    fn from_row(row: &'r AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            reference: row.try_get("reference")?,
            metadata: row.try_get("metadata")?,
            postings: row.try_get("postings")?,
        })
    }
}

impl TransactionRow {
    fn decode(row: &AnyRow, operation: &str) -> Result<Transaction, StorageError> {
        Self::from_row(row)
            .map_err(|e| crate::error::map_sqlx_error(operation, e))?
            .into_transaction(operation)
    }

    fn into_transaction(self, operation: &str) -> Result<Transaction, StorageError> {
        let id = u64::try_from(self.id)
            .map_err(|_| StorageError::corrupt(operation, format!("negative id {}", self.id)))?;
        let timestamp = canonical_timestamp::parse(&self.timestamp).map_err(|e| {
            StorageError::corrupt(operation, format!("txid {id}: timestamp: {e}"))
        })?;
        let metadata = match self.metadata.as_deref() {
            None => Metadata::new(),
            Some(raw) => serde_json::from_str::<Option<Metadata>>(raw)
                .map_err(|e| StorageError::corrupt(operation, format!("txid {id}: metadata: {e}")))?
                .unwrap_or_default(),
        };
        let postings: Vec<Posting> = serde_json::from_str(&self.postings)
            .map_err(|e| StorageError::corrupt(operation, format!("txid {id}: postings: {e}")))?;

        Ok(Transaction {
            id,
            timestamp,
            reference: self.reference.unwrap_or_default(),
            metadata,
            postings,
        })
    }
}

fn to_json<T: serde::Serialize>(operation: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::corrupt(operation, e.to_string()))
}

impl Store {
    /// Persist a new transaction.
    ///
    /// Without a caller-pinned id the next id is `max(id) + 1`, starting at 0.
    /// Run this inside a transaction when concurrent appends are possible;
    /// a lost race surfaces as a constraint violation on the primary key.
    #[instrument(
        skip(self, conn, tx, signal),
        fields(dialect = %self.dialect(), txid = tracing::field::Empty),
        err
    )]
    pub async fn append(
        &self,
        conn: &mut AnyConnection,
        tx: NewTransaction,
        signal: &CancelSignal,
    ) -> LedgerResult<Transaction> {
        const OPERATION: &str = "append";

        if tx.postings.is_empty() {
            return Err(LedgerError::validation(
                "postings",
                "transaction must contain at least one posting",
            ));
        }

        let id = match tx.id {
            Some(id) => id,
            None => self.next_id(conn, signal).await?,
        };
        let stored_id = i64::try_from(id).map_err(|_| {
            LedgerError::validation("txid", format!("transaction id {id} is out of range"))
        })?;

        let transaction = tx.into_transaction(id);
        let row = TransactionInsert {
            id: stored_id,
            timestamp: canonical_timestamp::format(&transaction.timestamp),
            reference: Some(transaction.reference.clone()).filter(|r| !r.is_empty()),
            postings: to_json(OPERATION, &transaction.postings)?,
            metadata: to_json(OPERATION, &transaction.metadata)?,
        };

        exec::execute(conn, &self.builder().insert_transaction(&row), signal, OPERATION).await?;

        Span::current().record("txid", id);
        Ok(transaction)
    }

    async fn next_id(&self, conn: &mut AnyConnection, signal: &CancelSignal) -> LedgerResult<u64> {
        const OPERATION: &str = "next_id";

        let row = exec::fetch_one(conn, &self.builder().next_id(), signal, OPERATION).await?;
        let next: i64 = row
            .try_get("next_id")
            .map_err(|e| crate::error::map_sqlx_error(OPERATION, e))?;
        u64::try_from(next)
            .map_err(|_| StorageError::corrupt(OPERATION, format!("negative next id {next}")).into())
    }

    /// Point lookup. `Ok(None)` when no transaction carries `id`.
    #[instrument(skip(self, conn, signal), fields(dialect = %self.dialect()), err)]
    pub async fn get_transaction(
        &self,
        conn: &mut AnyConnection,
        id: u64,
        signal: &CancelSignal,
    ) -> LedgerResult<Option<Transaction>> {
        const OPERATION: &str = "get_transaction";

        // Ids are stored as signed 64-bit integers; larger ones cannot exist.
        let Ok(stored_id) = i64::try_from(id) else {
            return Ok(None);
        };

        let stmt = self.builder().lookup(stored_id);
        let row = exec::fetch_optional(conn, &stmt, signal, OPERATION).await?;
        Ok(row
            .map(|row| TransactionRow::decode(&row, OPERATION))
            .transpose()?)
    }

    /// One page of transactions, newest first.
    ///
    /// `total` comes from a second statement that does not share a snapshot
    /// with the page query. A write landing between the two can make `total`
    /// disagree with `has_more`; `has_more` is authoritative.
    #[instrument(
        skip(self, conn, query, signal),
        fields(dialect = %self.dialect(), page_size = query.page_size, after = ?query.after),
        err
    )]
    pub async fn find_transactions(
        &self,
        conn: &mut AnyConnection,
        query: &TransactionsQuery,
        signal: &CancelSignal,
    ) -> LedgerResult<Cursor<Transaction>> {
        const OPERATION: &str = "find_transactions";

        // Direct callers may hand over an unclamped descriptor.
        let query = &TransactionsQuery {
            page_size: clamp_page_size(u64::from(query.page_size)),
            ..query.clone()
        };

        let stmt = self.builder().filtered_select(
            &query.filter,
            query.after,
            query.page_size as usize + 1,
        );
        let rows = exec::fetch_all(conn, &stmt, signal, OPERATION).await?;
        let transactions = rows
            .iter()
            .map(|row| TransactionRow::decode(row, OPERATION))
            .collect::<Result<Vec<_>, _>>()?;

        let mut page = Cursor::from_overfetch(transactions, query.page_size);
        page.total = Some(self.count_transactions(conn, &query.filter, signal).await?);

        if page.has_more {
            let last_id = page.data.last().map(|tx| tx.id);
            let token = TransactionsPaginationToken::next_page(query, last_id);
            page.next = Some(encode_token(&token).map_err(|e| {
                StorageError::corrupt(OPERATION, format!("encoding cursor: {e}"))
            })?);
        }

        debug!(
            returned = page.data.len(),
            has_more = page.has_more,
            total = ?page.total,
            "listed transactions"
        );
        Ok(page)
    }

    /// Number of transactions matching `filter`, ignoring pagination.
    #[instrument(skip(self, conn, filter, signal), fields(dialect = %self.dialect()), err)]
    pub async fn count_transactions(
        &self,
        conn: &mut AnyConnection,
        filter: &TransactionFilter,
        signal: &CancelSignal,
    ) -> LedgerResult<u64> {
        const OPERATION: &str = "count_transactions";

        let row = exec::fetch_one(conn, &self.builder().count_query(filter), signal, OPERATION).await?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| crate::error::map_sqlx_error(OPERATION, e))?;
        Ok(u64::try_from(total).unwrap_or_default())
    }
}
