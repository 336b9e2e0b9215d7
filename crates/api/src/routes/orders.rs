//! Order log inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use commerce::CommerceClient;
use common::OrderId;
use store::OrderStockLog;

use crate::AppState;
use crate::error::ApiError;

/// GET /orders/{order_id}/log — the full processing/audit record for an
/// order.
#[tracing::instrument(skip(state))]
pub async fn log<C: CommerceClient>(
    State(state): State<Arc<AppState<C>>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStockLog>, ApiError> {
    let order_id = OrderId::new(order_id);
    let log = state
        .logs
        .get(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No processing log for order {order_id}")))?;
    Ok(Json(log))
}
