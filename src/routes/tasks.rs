// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for scheduler callbacks.
//!
//! These endpoints are called by the external scheduler (or an operator),
//! not by members. They are guarded by `require_tasks_auth`.

use crate::error::{AppError, Result};
use crate::models::AthleteId;
use crate::services::{DrainReport, HealthReport, RecomputeReport, SyncOutcome};
use crate::AppState;
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Task handler routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/drain-queue", post(drain_queue))
        .route("/tasks/check-health", post(check_health))
        .route("/tasks/recompute-challenges", post(recompute_challenges))
        .route("/tasks/enqueue", post(enqueue))
        .route("/tasks/sync-user", post(sync_user))
        .route("/tasks/purge-activities", post(purge_activities))
}

#[derive(Serialize)]
pub struct DrainResponse {
    /// False when the drain schedule is disarmed
    pub ran: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DrainReport>,
}

/// Scheduled queue drain (every ~15 minutes).
async fn drain_queue(State(state): State<Arc<AppState>>) -> Result<Json<DrainResponse>> {
    let report = state.queue.run_scheduled_drain().await?;
    Ok(Json(DrainResponse {
        ran: report.is_some(),
        report,
    }))
}

/// Daily webhook health check.
async fn check_health(State(state): State<Arc<AppState>>) -> Result<Json<HealthReport>> {
    Ok(Json(state.health.check_health().await?))
}

/// Hourly challenge progress recompute.
async fn recompute_challenges(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecomputeReport>> {
    Ok(Json(state.challenges.recompute_all().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct EnqueueRequest {
    #[validate(length(min = 1, max = 500))]
    pub user_ids: Vec<AthleteId>,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub added: usize,
}

/// Add users to the batch queue.
async fn enqueue(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let added = state.queue.enqueue(&body.user_ids).await?;
    Ok(Json(EnqueueResponse { added }))
}

#[derive(Debug, Deserialize)]
pub struct SyncUserRequest {
    pub user_id: AthleteId,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub lookback_days: Option<i64>,
}

/// Sync one user now.
async fn sync_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SyncUserRequest>,
) -> Result<Json<SyncOutcome>> {
    let lookback_days = body
        .lookback_days
        .unwrap_or_else(|| state.sync.default_lookback_days());
    if lookback_days <= 0 {
        return Err(AppError::BadRequest(
            "lookback_days must be positive".to_string(),
        ));
    }

    let outcome = state
        .sync
        .sync_user(&body.user_id, body.force, lookback_days)
        .await?;

    if outcome.any_added() {
        state.sync.invalidate_caches();
    }
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub removed: usize,
}

/// Delete stored activities that fail the current filter.
async fn purge_activities(State(state): State<Arc<AppState>>) -> Result<Json<PurgeResponse>> {
    let removed = state.sync.purge_disallowed().await?;
    Ok(Json(PurgeResponse { removed }))
}
