// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events relayed by the push proxy.

use crate::error::AppError;
use crate::models::WebhookEnvelope;
use crate::services::webhook::ACK_ERROR_PREFIX;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.challenge")]
    challenge: String,
    #[serde(rename = "hub.verify_token")]
    verify_token: String,
}

/// Verification response.
#[derive(Serialize, Default)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    if params.mode == "subscribe" && params.verify_token == state.config.webhook_verify_token {
        tracing::info!("Webhook subscription verified");
        (
            StatusCode::OK,
            Json(VerifyResponse {
                challenge: params.challenge,
            }),
        )
    } else {
        tracing::warn!(
            mode = %params.mode,
            "Webhook verification failed: invalid token"
        );
        (StatusCode::FORBIDDEN, Json(VerifyResponse::default()))
    }
}

/// Handle a relayed event (POST).
///
/// Outcomes are distinguished by body text, not status: the proxy needs a
/// uniform 200 acknowledgment. Only a missing shared-secret configuration
/// fails the request itself. The body is parsed here rather than by an
/// extractor so a bad content type or non-JSON body is still acknowledged.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, String), AppError> {
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook envelope");
            return Ok((StatusCode::OK, format!("{}{}", ACK_ERROR_PREFIX, e)));
        }
    };

    match state
        .webhook
        .handle_inbound_event(&envelope.secret, &envelope.strava_payload)
        .await
    {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Webhook event handled");
            Ok((StatusCode::OK, outcome.ack().to_string()))
        }
        Err(e @ AppError::MissingConfig(_)) => Err(e),
        Err(e) => {
            tracing::error!(
                error = %e,
                object_id = envelope.strava_payload.object_id,
                "Webhook processing failed"
            );
            Ok((StatusCode::OK, format!("{}{}", ACK_ERROR_PREFIX, e)))
        }
    }
}
