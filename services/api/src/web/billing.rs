//! services/api/src/web/billing.rs
//!
//! The billing webhook endpoint. Tier changes arrive here asynchronously
//! from the payment provider; the handler verifies the HMAC signature over
//! the raw body before trusting anything, then applies the event
//! idempotently so redeliveries are harmless.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::web::state::AppState;
use ctxt_core::billing::{self, BillingEvent};

const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// POST /billing/webhook - Apply a signed billing event
#[utoipa::path(
    post,
    path = "/billing/webhook",
    request_body(content = String, content_type = "application/json", description = "Raw signed billing event JSON body"),
    responses(
        (status = 200, description = "Event processed or acknowledged"),
        (status = 422, description = "Missing or invalid signature, or unparseable body")
    )
)]
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Verify the signature against the raw body before parsing it.
    let secret = state.config.billing_webhook_secret.as_deref();
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let (Some(secret), Some(signature)) = (secret, signature) else {
        warn!("billing webhook without signature or configured secret");
        return Err(ApiError::validation("Invalid signature"));
    };

    if !billing::verify_signature(secret, &body, signature) {
        warn!("billing webhook signature mismatch");
        return Err(ApiError::validation("Invalid signature"));
    }

    // 2. Parse the event envelope.
    let event: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::validation("Invalid JSON"))?;

    let event_type = event["type"]
        .as_str()
        .ok_or_else(|| ApiError::validation("Missing event type"))?;
    let data = &event["data"];

    // 3. Apply it. Unhandled types and broken payloads are acknowledged so
    //    the provider stops redelivering them.
    match BillingEvent::parse(event_type, data) {
        Ok(Some(billing_event)) => {
            billing::apply(state.accounts.as_ref(), billing_event).await?;
            info!(event_type, "billing event processed");
            Ok(Json(serde_json::json!({ "message": "Webhook processed successfully" })))
        }
        Ok(None) => {
            info!(event_type, "unhandled billing event type");
            Ok(Json(serde_json::json!({ "message": "Webhook received" })))
        }
        Err(e) => {
            warn!(event_type, error = %e, "malformed billing event ignored");
            Ok(Json(serde_json::json!({ "message": "Webhook ignored" })))
        }
    }
}
