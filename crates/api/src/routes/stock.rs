//! Stock inspection and manual override endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use commerce::CommerceClient;
use common::{BlankKey, BlankVariantKey, GraphicVariantId};
use engine::OverrideRequest;
use serde::{Deserialize, Serialize};
use store::{AdjustMode, BlankVariantRecord, SiblingFailure};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct StockOverrideRequest {
    pub variant_id: String,
    /// Expected blank style; rejected with 409 when it contradicts the
    /// variant's association.
    #[serde(default)]
    pub blank_key: Option<String>,
    pub new_stock: i64,
    #[serde(default = "default_mode")]
    pub mode: AdjustMode,
}

fn default_mode() -> AdjustMode {
    AdjustMode::Set
}

#[derive(Serialize)]
pub struct StockOverrideResponse {
    pub ok: bool,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub updated: Vec<GraphicVariantId>,
    pub failed: Vec<SiblingFailure>,
}

/// POST /stock/override — operator correction: adjust the ledger, then
/// propagate the result to every sibling.
#[tracing::instrument(skip(state, req), fields(variant_id = %req.variant_id))]
pub async fn override_stock<C: CommerceClient>(
    State(state): State<Arc<AppState<C>>>,
    Json(req): Json<StockOverrideRequest>,
) -> Result<Json<StockOverrideResponse>, ApiError> {
    let outcome = state
        .processor
        .apply_override(&OverrideRequest {
            variant_id: GraphicVariantId::new(req.variant_id),
            blank_key: req.blank_key.map(BlankKey::new),
            value: req.new_stock,
            mode: req.mode,
        })
        .await?;

    Ok(Json(StockOverrideResponse {
        ok: true,
        previous_stock: outcome.previous_stock,
        new_stock: outcome.new_stock,
        updated: outcome.updated,
        failed: outcome.failed,
    }))
}

/// GET /stock/{blank_key}/{size}/{color} — current ledger record.
#[tracing::instrument(skip(state))]
pub async fn get_record<C: CommerceClient>(
    State(state): State<Arc<AppState<C>>>,
    Path((blank_key, size, color)): Path<(String, String, String)>,
) -> Result<Json<BlankVariantRecord>, ApiError> {
    let key = BlankVariantKey::new(BlankKey::new(blank_key), size, color);
    let record = state
        .stock
        .get(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No stock record for {key}")))?;
    Ok(Json(record))
}
