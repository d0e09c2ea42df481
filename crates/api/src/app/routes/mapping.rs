use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
};

use ledger_core::{LedgerError, Mapping};

use crate::app::dto::DataResponse;
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// GET /mapping
pub async fn load_mapping(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<Json<DataResponse<Mapping>>, ApiError> {
    let mut conn = services.acquire().await?;
    let mapping = services
        .store()
        .load_mapping(&mut conn, &services.signal())
        .await?;
    Ok(Json(DataResponse::new(mapping)))
}

/// PUT /mapping
pub async fn save_mapping(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<Mapping>, JsonRejection>,
) -> Result<Json<DataResponse<Mapping>>, ApiError> {
    let Json(mapping) = payload.map_err(|e| LedgerError::validation("body", e.body_text()))?;

    let mut conn = services.acquire().await?;
    services
        .store()
        .save_mapping(&mut conn, &mapping, &services.signal())
        .await?;
    Ok(Json(DataResponse::new(mapping)))
}
