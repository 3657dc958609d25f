// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-only club API: leaderboards and challenge progress.

use crate::error::{AppError, Result};
use crate::models::ChallengeProgress;
use crate::services::LeaderboardEntry;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/challenges/{id}/progress", get(get_challenge_progress))
}

// ─── Leaderboard ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LeaderboardParams {
    /// Restrict totals to one activity type (e.g. "Swim")
    #[serde(default, rename = "type")]
    activity_type: Option<String>,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_type: Option<String>,
    pub entries: Vec<LeaderboardEntry>,
}

async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<LeaderboardResponse>> {
    let activity_type = params.activity_type.filter(|t| !t.is_empty());
    let board = state.leaderboard.get(activity_type.as_deref()).await?;

    Ok(Json(LeaderboardResponse {
        activity_type,
        entries: board.as_ref().clone(),
    }))
}

// ─── Challenges ──────────────────────────────────────────────

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChallengeProgressResponse {
    pub challenge_id: String,
    pub name: String,
    pub progress: Vec<ChallengeProgress>,
}

async fn get_challenge_progress(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<ChallengeProgressResponse>> {
    let challenge = state
        .records
        .get_challenge(&challenge_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", challenge_id)))?;

    let progress = state.challenges.progress(&challenge.id).await?;

    Ok(Json(ChallengeProgressResponse {
        challenge_id: challenge.id,
        name: challenge.name,
        progress,
    }))
}
