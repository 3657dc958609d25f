// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use chrono::{Duration, Utc};
use club_sync::config::Config;
use club_sync::db::{MemoryStore, RecordStore};
use club_sync::models::{Activity, ActivitySource, AthleteId, User};
use club_sync::routes::create_router;
use club_sync::AppState;
use std::sync::Arc;

pub const SHARED_SECRET: &str = "test_shared_secret";
pub const TASKS_TOKEN: &str = "test_tasks_token";

/// Test state over an in-memory store. Strava calls go to `strava_url`.
pub fn test_state_with(strava_url: &str, config: Config) -> (Arc<AppState>, MemoryStore) {
    let mut config = config;
    config.strava_api_url = strava_url.to_string();
    config.strava_oauth_url = format!("{}/oauth", strava_url);

    let store = MemoryStore::new();
    let state = AppState::new(config, Arc::new(store.clone()), Arc::new(store.clone()))
        .expect("Failed to build app state");
    (Arc::new(state), store)
}

pub fn test_state(strava_url: &str) -> (Arc<AppState>, MemoryStore) {
    test_state_with(strava_url, Config::test_default())
}

/// Create a test app whose Strava base URL points nowhere.
pub fn create_test_app() -> (axum::Router, Arc<AppState>, MemoryStore) {
    let (state, store) = test_state("http://127.0.0.1:9");
    (create_router(state.clone()), state, store)
}

/// Authorized user with a token valid for the next hour.
pub fn user(id: &str) -> User {
    User::new(
        AthleteId::new(id),
        format!("Member {}", id),
        format!("access_{}", id),
        format!("refresh_{}", id),
        Utc::now() + Duration::hours(1),
    )
}

pub async fn seed_user(store: &MemoryStore, id: &str) -> User {
    let user = user(id);
    store.upsert_user(&user).await.unwrap();
    user
}

pub async fn seed_users(store: &MemoryStore, ids: &[&str]) {
    for id in ids {
        seed_user(store, id).await;
    }
}

pub fn swim(activity_id: u64, owner: &str) -> Activity {
    Activity {
        activity_id,
        athlete_id: AthleteId::new(owner),
        name: format!("Swim {}", activity_id),
        activity_type: "Swim".to_string(),
        distance_meters: 1000.0,
        moving_time_secs: 1200,
        start_date: Utc::now() - Duration::hours(2),
        visibility: "everyone".to_string(),
        source: ActivitySource::Sync,
        synced_at: Utc::now(),
    }
}

/// Strava activity JSON as returned by the list and detail endpoints.
pub fn strava_activity(id: u64, kind: &str, visibility: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": format!("Activity {}", id),
        "type": kind,
        "distance": 1500.0,
        "moving_time": 1800,
        "start_date": (Utc::now() - Duration::hours(3)).to_rfc3339(),
        "visibility": visibility
    })
}

pub fn ids(raw: &[&str]) -> Vec<AthleteId> {
    raw.iter().map(AthleteId::new).collect()
}

/// Authorized user with no credentials; its syncs fail without network.
pub async fn seed_idle_users(store: &MemoryStore, ids: &[&str]) {
    for id in ids {
        let mut user = user(id);
        user.access_token = None;
        user.refresh_token = None;
        user.token_expires_at = None;
        store.upsert_user(&user).await.unwrap();
    }
}
