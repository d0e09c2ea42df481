//! Statement execution against any connection or open transaction.
//!
//! `&mut AnyConnection` is the executor seam: a pooled connection and a
//! `sqlx::Transaction<'_, Any>` both deref to it, so callers pick the scope
//! and the store never begins or commits anything itself.

use futures::TryStreamExt;
use sqlx::any::{AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection};

use ledger_core::StorageError;

use crate::cancel::CancelSignal;
use crate::dialect::{Arg, Statement};
use crate::error::map_sqlx_error;

fn prepare(stmt: &Statement) -> Query<'_, Any, AnyArguments<'_>> {
    stmt.args
        .iter()
        .fold(sqlx::query(&stmt.sql), |query, arg| match arg {
            Arg::Int(value) => query.bind(*value),
            Arg::Text(value) => query.bind(value.as_str()),
            Arg::Null => query.bind(None::<String>),
        })
}

pub(crate) async fn fetch_all(
    conn: &mut AnyConnection,
    stmt: &Statement,
    signal: &CancelSignal,
    operation: &str,
) -> Result<Vec<AnyRow>, StorageError> {
    signal
        .guard(operation, prepare(stmt).fetch_all(&mut *conn))
        .await?
        .map_err(|e| map_sqlx_error(operation, e))
}

pub(crate) async fn fetch_optional(
    conn: &mut AnyConnection,
    stmt: &Statement,
    signal: &CancelSignal,
    operation: &str,
) -> Result<Option<AnyRow>, StorageError> {
    signal
        .guard(operation, prepare(stmt).fetch_optional(&mut *conn))
        .await?
        .map_err(|e| map_sqlx_error(operation, e))
}

pub(crate) async fn fetch_one(
    conn: &mut AnyConnection,
    stmt: &Statement,
    signal: &CancelSignal,
    operation: &str,
) -> Result<AnyRow, StorageError> {
    signal
        .guard(operation, prepare(stmt).fetch_one(&mut *conn))
        .await?
        .map_err(|e| map_sqlx_error(operation, e))
}

pub(crate) async fn execute(
    conn: &mut AnyConnection,
    stmt: &Statement,
    signal: &CancelSignal,
    operation: &str,
) -> Result<AnyQueryResult, StorageError> {
    signal
        .guard(operation, prepare(stmt).execute(&mut *conn))
        .await?
        .map_err(|e| map_sqlx_error(operation, e))
}

/// Stream rows through `each` without buffering the whole result set.
pub(crate) async fn for_each_row<F>(
    conn: &mut AnyConnection,
    stmt: &Statement,
    signal: &CancelSignal,
    operation: &str,
    mut each: F,
) -> Result<u64, StorageError>
where
    F: FnMut(&AnyRow) -> Result<(), StorageError>,
{
    let scan = async {
        let mut rows = prepare(stmt).fetch(&mut *conn);
        let mut seen = 0u64;
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| map_sqlx_error(operation, e))?
        {
            each(&row)?;
            seen += 1;
        }
        Ok::<_, StorageError>(seen)
    };
    signal.guard(operation, scan).await?
}
