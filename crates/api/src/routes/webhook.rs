//! Paid-order webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use commerce::CommerceClient;
use engine::{OrderPayload, ProcessDisposition};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the hex-encoded HMAC-SHA256 of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-webhook-hmac-sha256";

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_processed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    pub processed: u32,
    pub errors: u32,
}

/// Verifies the delivery signature against the shared secret.
///
/// Comparison happens inside `verify_slice`, which is constant-time.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing webhook signature".to_string()))?;
    let signature = hex::decode(signature.trim())
        .map_err(|_| ApiError::Unauthorized("Malformed webhook signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::Internal("Webhook secret is unusable".to_string()))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| ApiError::Unauthorized("Invalid webhook signature".to_string()))
}

/// POST /webhooks/orders/paid — verifies, parses, and synchronously runs
/// the order through the processing pipeline.
#[tracing::instrument(skip_all)]
pub async fn orders_paid<C: CommerceClient>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    verify_signature(&state.config.webhook_secret, &headers, &body)?;

    let payload: OrderPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order payload: {e}")))?;

    let outcome = state.processor.process_order(&payload).await?;
    Ok(Json(WebhookResponse {
        ok: true,
        already_processed: outcome.disposition == ProcessDisposition::AlreadyCompleted,
        already_processing: outcome.disposition == ProcessDisposition::AlreadyProcessing,
        order_number: outcome.order_number,
        processed: outcome.processed,
        errors: outcome.errors,
    }))
}
