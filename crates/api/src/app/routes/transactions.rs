//! Transaction history endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, rejection::JsonRejection},
};
use sqlx::Connection;

use ledger_core::pagination::transactions_query;
use ledger_core::{Cursor, LedgerError, NewTransaction, Transaction};
use ledger_storage::map_sqlx_error;

use crate::app::dto::{self, AppendTransactionRequest, DataResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// GET /transactions?account=&source=&destination=&reference=&after=&page_size=
///
/// Or `?cursor=<token>` alone to resume a previous listing.
pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Cursor<Transaction>>, ApiError> {
    let query = transactions_query(&dto::query_params(pairs))?;

    let mut conn = services.acquire().await?;
    let page = services
        .store()
        .find_transactions(&mut conn, &query, &services.signal())
        .await?;
    Ok(Json(page))
}

/// GET /transactions/:id
pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<Transaction>>, ApiError> {
    let id: u64 = id
        .parse()
        .map_err(|_| LedgerError::validation("txid", format!("invalid transaction id '{id}'")))?;

    let mut conn = services.acquire().await?;
    let tx = services
        .store()
        .get_transaction(&mut conn, id, &services.signal())
        .await?
        .ok_or_else(|| LedgerError::not_found("transaction"))?;
    Ok(Json(DataResponse::new(tx)))
}

/// POST /transactions
///
/// The insert runs inside a database transaction owned by this handler.
pub async fn append_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<AppendTransactionRequest>, JsonRejection>,
) -> Result<Json<DataResponse<Transaction>>, ApiError> {
    let Json(req) = payload.map_err(|e| LedgerError::validation("body", e.body_text()))?;
    let new_tx = NewTransaction::from(req);

    let mut conn = services.acquire().await?;
    let mut db_tx = conn.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
    let stored = services
        .store()
        .append(&mut db_tx, new_tx, &services.signal())
        .await?;
    db_tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

    tracing::info!(txid = stored.id, postings = stored.postings.len(), "transaction appended");
    Ok(Json(DataResponse::new(stored)))
}
