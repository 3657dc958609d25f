// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth routes for connecting club members.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed OAuth state stays valid.
const STATE_MAX_AGE_MS: i64 = 60 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/strava", get(auth_start))
        .route("/auth/strava/callback", get(auth_callback))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// If not provided, uses FRONTEND_URL env var.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to Strava authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: axum::http::HeaderMap,
) -> Result<Redirect> {
    let frontend_url = match params.redirect_uri {
        Some(uri) if same_origin(&uri, &state.config.frontend_url) => uri,
        Some(uri) => {
            tracing::warn!(redirect_uri = %uri, "Redirect outside the frontend origin, using default");
            state.config.frontend_url.clone()
        }
        None => state.config.frontend_url.clone(),
    };

    let oauth_state = sign_state(
        &frontend_url,
        Utc::now().timestamp_millis(),
        &state.config.oauth_state_key,
    )?;

    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");
    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };
    let callback_url = format!("{}://{}/auth/strava/callback", scheme, host);

    let auth_url = state.strava.client().authorize_url(&callback_url, &oauth_state);

    tracing::info!(frontend_url = %frontend_url, "Starting OAuth flow, redirecting to Strava");

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code, store the member, queue their first sync.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    let frontend_url = verify_and_decode_state(
        &params.state,
        &state.config.oauth_state_key,
        Utc::now().timestamp_millis(),
    )
    .unwrap_or_else(|| {
        tracing::warn!("Invalid or tampered state parameter, falling back to default frontend URL");
        state.config.frontend_url.clone()
    });

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Strava");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok(Redirect::temporary(&redirect));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let result = state.strava.handle_oauth_callback(&code).await?;

    // The first sync happens through the queue; a busy queue only delays it.
    if let Err(e) = state.queue.enqueue(&[result.athlete_id.clone()]).await {
        tracing::warn!(athlete_id = %result.athlete_id, error = %e, "Failed to enqueue new member");
    }

    let redirect_url = format!(
        "{}/callback?athlete_id={}&new={}",
        frontend_url, result.athlete_id, result.is_new
    );
    Ok(Redirect::temporary(&redirect_url))
}

/// True if `candidate` has the same scheme, host and port as `frontend_url`.
fn same_origin(candidate: &str, frontend_url: &str) -> bool {
    match (reqwest::Url::parse(candidate), reqwest::Url::parse(frontend_url)) {
        (Ok(candidate), Ok(frontend)) => candidate.origin() == frontend.origin(),
        _ => false,
    }
}

fn state_signature(payload: &str, secret: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Encode `frontend_url|timestamp_hex|signature_hex` as URL-safe base64.
fn sign_state(frontend_url: &str, now_ms: i64, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", frontend_url, now_ms);
    let signature = state_signature(&payload, secret)?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify the HMAC and age of an OAuth state and return its frontend URL.
fn verify_and_decode_state(state: &str, secret: &[u8], now_ms: i64) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // Split from the right so a '|' inside the URL survives.
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}", frontend_url, timestamp_hex);
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    let signature = hex::decode(signature_hex).ok()?;
    if mac.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = i64::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms - issued_ms > STATE_MAX_AGE_MS {
        tracing::warn!(issued_ms, "OAuth state expired");
        return None;
    }

    Some(frontend_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"secret_key";
    const NOW_MS: i64 = 1_780_000_000_000;

    #[test]
    fn test_state_round_trip() {
        let state = sign_state("https://club.example", NOW_MS, SECRET).unwrap();

        let result = verify_and_decode_state(&state, SECRET, NOW_MS + 1000);

        assert_eq!(result.as_deref(), Some("https://club.example"));
    }

    #[test]
    fn test_state_wrong_secret_rejected() {
        let state = sign_state("https://club.example", NOW_MS, SECRET).unwrap();

        assert_eq!(verify_and_decode_state(&state, b"wrong_key", NOW_MS), None);
    }

    #[test]
    fn test_state_tampered_url_rejected() {
        let state = sign_state("https://club.example", NOW_MS, SECRET).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&state).unwrap()).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(decoded.replace("club.example", "evil.example"));

        assert_eq!(verify_and_decode_state(&forged, SECRET, NOW_MS), None);
    }

    #[test]
    fn test_state_expires() {
        let state = sign_state("https://club.example", NOW_MS, SECRET).unwrap();

        assert_eq!(
            verify_and_decode_state(&state, SECRET, NOW_MS + STATE_MAX_AGE_MS + 1),
            None
        );
    }

    #[test]
    fn test_redirect_must_share_frontend_origin() {
        let frontend = "https://club.example";

        assert!(same_origin("https://club.example/welcome", frontend));
        assert!(!same_origin("https://evil.example/welcome", frontend));
        assert!(!same_origin("http://club.example", frontend));
        assert!(!same_origin("https://club.example:8443", frontend));
        assert!(!same_origin("not a url", frontend));
    }

    #[test]
    fn test_state_malformed() {
        let encoded_state = URL_SAFE_NO_PAD.encode("invalid|format");
        assert_eq!(verify_and_decode_state(&encoded_state, SECRET, NOW_MS), None);
        assert_eq!(verify_and_decode_state("%%%", SECRET, NOW_MS), None);
    }
}
