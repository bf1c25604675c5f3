use axum::{
    body::Bytes, extract::State, http::HeaderMap, response::IntoResponse, routing::post, Json,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::{errors::ServiceError, gateway::signature::verify_signature, AppState};

/// Envelope of a payment gateway webhook event.
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
    payment_intent: Option<String>,
}

/// Receives gateway webhooks. The signature is verified over the raw
/// body before any JSON parsing; unknown event types are acknowledged
/// so the gateway stops retrying them.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let secret = state
        .config
        .payment_webhook_secret
        .as_deref()
        .ok_or_else(|| {
            warn!("webhook received but no webhook secret is configured");
            ServiceError::Unauthorized("Webhook signature verification not configured".into())
        })?;

    if !verify_signature(
        &headers,
        &body,
        secret,
        state.config.payment_webhook_tolerance_secs,
    ) {
        warn!("webhook rejected: bad or missing signature");
        return Err(ServiceError::Unauthorized(
            "Invalid webhook signature".into(),
        ));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::InvalidInput(format!("Malformed webhook payload: {}", e)))?;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session_id = event.data.object.id;
            let known = state
                .services
                .checkout
                .mark_session_paid(&session_id, event.data.object.payment_intent)
                .await?;
            info!(%session_id, known, "checkout.session.completed webhook processed");
        }
        other => {
            info!(event_type = %other, "ignoring unhandled webhook event");
        }
    }

    Ok(Json(json!({ "received": true })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_webhook))
}
