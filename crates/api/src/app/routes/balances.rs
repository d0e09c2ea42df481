//! Balance endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
};

use ledger_core::pagination::{aggregated_balances_filter, balances_query};
use ledger_core::{AccountsBalances, AssetsBalances, Cursor};

use crate::app::dto::{self, DataResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// GET /balances?address=<regex>[,<regex>…]&after=<address>&page_size=
pub async fn list_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Cursor<AccountsBalances>>, ApiError> {
    let query = balances_query(&dto::query_params(pairs))?;

    let mut conn = services.acquire().await?;
    let page = services
        .store()
        .get_balances(&mut conn, &query, &services.signal())
        .await?;
    Ok(Json(page))
}

/// GET /aggregate/balances?address=<regex>
pub async fn aggregate_balances(
    Extension(services): Extension<Arc<AppServices>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<DataResponse<AssetsBalances>>, ApiError> {
    let filters = aggregated_balances_filter(&dto::query_params(pairs));

    let mut conn = services.acquire().await?;
    let balances = services
        .store()
        .get_balances_aggregated(&mut conn, &filters, &services.signal())
        .await?;
    Ok(Json(DataResponse::new(balances)))
}
