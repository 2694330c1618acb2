//! HTTP request handlers

use super::types::{AppError, VerificationQuery, WebhookAck};
use super::AppState;
use crate::flow::FlowRequestEnvelope;
use crate::message::WebhookPayload;
use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Subscription handshake and message delivery share the callback URL
        .route("/", get(verify_webhook).post(receive_webhook))
        .route("/flow", post(flow_exchange))
        .route("/healthcheck", get(healthcheck))
        .with_state(state)
}

// ============================================================
// Webhook
// ============================================================

async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerificationQuery>,
) -> Result<String, AppError> {
    let (Some(mode), Some(token), Some(challenge)) =
        (query.mode, query.verify_token, query.challenge)
    else {
        return Err(AppError::Forbidden(
            "Missing hub.mode, hub.verify_token or hub.challenge".to_string(),
        ));
    };

    if mode != "subscribe" || state.verify_token.as_deref() != Some(token.as_str()) {
        tracing::warn!(mode = %mode, "Webhook verification rejected");
        return Err(AppError::BadRequest("Verification failed".to_string()));
    }

    tracing::info!("Webhook verified");
    Ok(challenge)
}

async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let raw: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))?;
    if raw.get("object").is_none() {
        tracing::warn!("Webhook delivery without an object field");
        return Err(AppError::BadRequest("Unknown event".to_string()));
    }

    let payload: WebhookPayload = serde_json::from_value(raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {e}")))?;
    let updates = payload
        .updates()
        .map_err(|e| AppError::BadRequest(format!("Invalid messages change: {e}")))?;

    let mut ack = WebhookAck::default();
    for incoming in &updates {
        let report = state.dispatcher.handle_incoming(incoming).await;
        ack.dispatched += report.dispatched();
        ack.duplicates += report.duplicates();
        ack.failed += report.failures.len();
    }
    if ack.failed > 0 {
        tracing::warn!(failed = ack.failed, dispatched = ack.dispatched, "Delivery accepted with failed messages");
    }

    Ok(Json(ack))
}

// ============================================================
// Flow Data Exchange
// ============================================================

/// Responds with the base64 of the encrypted response, as a plain body
async fn flow_exchange(State(state): State<AppState>, body: Bytes) -> Result<String, AppError> {
    let Some(endpoint) = state.flow.as_ref() else {
        return Err(AppError::NotFound("Flow endpoint not configured".to_string()));
    };

    let envelope: FlowRequestEnvelope = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid flow envelope: {e}")))?;

    let ciphertext = endpoint.respond(envelope).await.map_err(|e| {
        if e.is_decryption_failure() {
            tracing::warn!(error = %e, "Flow request could not be decrypted");
        } else {
            tracing::error!(error = %e, "Flow request failed");
        }
        AppError::from(e)
    })?;

    Ok(BASE64.encode(ciphertext))
}

// ============================================================
// Liveness
// ============================================================

async fn healthcheck() -> &'static str {
    "Everything all right!"
}
