//! Inbound payment webhooks
//!
//! The signature is checked against the raw body bytes before anything
//! parses them. Rejected deliveries get a 401 and are never interpreted.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::{info, warn};
use zoho_webhook::{SIGNATURE_HEADER, WebhookSummary};

use crate::AppState;
use crate::error::ApiError;
use crate::metrics;

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/zoho-payments", get(ping).post(receive))
}

/// GET/HEAD: reachability check used when registering the endpoint.
async fn ping() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = state.verifier.verify(header, &body) {
        metrics::record_webhook(e.label());
        warn!(reason = e.label(), error = %e, "webhook rejected");
        return Err(ApiError::InvalidSignature);
    }
    metrics::record_webhook("accepted");

    let summary = WebhookSummary::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Payment state is left untouched; the event is acknowledged and logged.
    info!(
        event = %summary.event,
        payment_link_id = summary.payment_link_id.as_deref().unwrap_or(""),
        status = %summary.status,
        "webhook accepted"
    );

    Ok(Json(json!({
        "ok": true,
        "event": summary.event,
        "payment_link_id": summary.payment_link_id,
        "status": summary.status,
    })))
}
