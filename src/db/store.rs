// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage interfaces consumed by the sync pipeline.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{Activity, AthleteId, Challenge, ChallengeProgress, User};

pub type SharedRecordStore = Arc<dyn RecordStore>;
pub type SharedStateStore = Arc<dyn StateStore>;

/// Tabular record storage.
///
/// Reads skip rows that fail to parse (logged as corrupt) instead of
/// failing the whole read.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    async fn get_user(&self, athlete_id: &AthleteId) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    async fn upsert_user(&self, user: &User) -> Result<()>;

    // ─── Activities ──────────────────────────────────────────────

    async fn list_activities(&self) -> Result<Vec<Activity>>;

    /// IDs of every stored activity.
    async fn list_activity_ids(&self) -> Result<HashSet<u64>> {
        Ok(self
            .list_activities()
            .await?
            .into_iter()
            .map(|a| a.activity_id)
            .collect())
    }

    async fn list_activities_for_athlete(&self, athlete_id: &AthleteId) -> Result<Vec<Activity>>;

    /// Insert unless a record with the same activity ID exists.
    ///
    /// Returns `false` when the ID is already stored; the check and the
    /// write are a single storage operation.
    async fn insert_activity(&self, activity: &Activity) -> Result<bool>;

    /// Delete by activity ID. Returns `false` if nothing was stored.
    async fn delete_activity(&self, activity_id: u64) -> Result<bool>;

    // ─── Challenges ──────────────────────────────────────────────

    async fn list_challenges(&self) -> Result<Vec<Challenge>>;

    async fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>>;

    async fn upsert_challenge(&self, challenge: &Challenge) -> Result<()>;

    async fn list_progress(&self, challenge_id: &str) -> Result<Vec<ChallengeProgress>>;

    async fn upsert_progress(&self, progress: &ChallengeProgress) -> Result<()>;
}

/// Process-wide key/value state with lease locks.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<Option<Value>>;

    async fn set_value(&self, key: &str, value: Value) -> Result<()>;

    async fn delete_value(&self, key: &str) -> Result<()>;

    /// Single attempt to take the named lock for `lease`.
    ///
    /// Succeeds if the lock is free, its lease has expired, or `owner`
    /// already holds it.
    async fn try_acquire_lock(&self, name: &str, owner: &str, lease: Duration) -> Result<bool>;

    /// Release the lock if `owner` still holds it.
    async fn release_lock(&self, name: &str, owner: &str) -> Result<()>;
}

/// Read a typed state value. A value that no longer parses is logged and
/// treated as absent.
pub async fn get_state<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get_value(key).await? else {
        return Ok(None);
    };

    match serde_json::from_value(raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::error!(key, error = %e, "Corrupt state value, ignoring");
            Ok(None)
        }
    }
}

/// Write a typed state value.
pub async fn set_state<T: Serialize + Sync>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;
    store.set_value(key, raw).await
}
