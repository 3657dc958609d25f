// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process storage backend.
//!
//! Rows are kept as raw JSON, like a spreadsheet of records, and decoded
//! on read with the same lenient rules as Firestore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::db::collections;
use crate::db::rows::{decode_row, decode_rows, encode_row};
use crate::db::{RecordStore, StateStore};
use crate::error::{AppError, Result};
use crate::models::{Activity, AthleteId, Challenge, ChallengeProgress, User};

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: DashMap<String, Value>,
    activities: DashMap<String, Value>,
    challenges: DashMap<String, Value>,
    progress: DashMap<String, Value>,
    state: DashMap<String, Value>,
    locks: DashMap<String, Lease>,
}

/// In-memory record and state store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, collection: &str) -> Result<&DashMap<String, Value>> {
        match collection {
            collections::USERS => Ok(&self.tables.users),
            collections::ACTIVITIES => Ok(&self.tables.activities),
            collections::CHALLENGES => Ok(&self.tables.challenges),
            collections::CHALLENGE_PROGRESS => Ok(&self.tables.progress),
            collections::APP_STATE => Ok(&self.tables.state),
            other => Err(AppError::Database(format!("Unknown collection: {}", other))),
        }
    }

    /// Write a raw row, bypassing encoding. Lets tests plant malformed data.
    pub fn insert_raw(&self, collection: &str, id: &str, row: Value) -> Result<()> {
        self.table(collection)?.insert(id.to_string(), row);
        Ok(())
    }

    /// Number of rows in a collection, including ones that fail to decode.
    pub fn row_count(&self, collection: &str) -> usize {
        self.table(collection).map(|t| t.len()).unwrap_or(0)
    }

    fn snapshot(table: &DashMap<String, Value>) -> Vec<(String, Value)> {
        table
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn get<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let row = self.table(collection)?.get(id).map(|r| r.value().clone());
        Ok(row.and_then(|row| decode_row(collection, id, row)))
    }

    fn put<T: serde::Serialize>(&self, collection: &str, id: String, value: &T) -> Result<()> {
        let row = encode_row(value)?;
        self.table(collection)?.insert(id, row);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_user(&self, athlete_id: &AthleteId) -> Result<Option<User>> {
        self.get(collections::USERS, athlete_id.as_str())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> =
            decode_rows(collections::USERS, Self::snapshot(&self.tables.users));
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.athlete_id.cmp(&b.athlete_id)));
        Ok(users)
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.put(collections::USERS, user.athlete_id.to_string(), user)
    }

    async fn list_activities(&self) -> Result<Vec<Activity>> {
        Ok(decode_rows(
            collections::ACTIVITIES,
            Self::snapshot(&self.tables.activities),
        ))
    }

    async fn list_activities_for_athlete(&self, athlete_id: &AthleteId) -> Result<Vec<Activity>> {
        Ok(self
            .list_activities()
            .await?
            .into_iter()
            .filter(|a| &a.athlete_id == athlete_id)
            .collect())
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<bool> {
        let row = encode_row(activity)?;
        match self.tables.activities.entry(activity.activity_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(row);
                Ok(true)
            }
        }
    }

    async fn delete_activity(&self, activity_id: u64) -> Result<bool> {
        Ok(self
            .tables
            .activities
            .remove(&activity_id.to_string())
            .is_some())
    }

    async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        Ok(decode_rows(
            collections::CHALLENGES,
            Self::snapshot(&self.tables.challenges),
        ))
    }

    async fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>> {
        self.get(collections::CHALLENGES, challenge_id)
    }

    async fn upsert_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.put(collections::CHALLENGES, challenge.id.clone(), challenge)
    }

    async fn list_progress(&self, challenge_id: &str) -> Result<Vec<ChallengeProgress>> {
        let rows: Vec<ChallengeProgress> = decode_rows(
            collections::CHALLENGE_PROGRESS,
            Self::snapshot(&self.tables.progress),
        );
        Ok(rows
            .into_iter()
            .filter(|p| p.challenge_id == challenge_id)
            .collect())
    }

    async fn upsert_progress(&self, progress: &ChallengeProgress) -> Result<()> {
        self.put(
            collections::CHALLENGE_PROGRESS,
            ChallengeProgress::doc_id(&progress.challenge_id, &progress.athlete_id),
            progress,
        )
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.tables.state.get(key).map(|v| v.value().clone()))
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<()> {
        self.tables.state.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<()> {
        self.tables.state.remove(key);
        Ok(())
    }

    async fn try_acquire_lock(&self, name: &str, owner: &str, lease: Duration) -> Result<bool> {
        let now = Utc::now();
        let lease = Lease {
            owner: owner.to_string(),
            expires_at: now
                + chrono::Duration::from_std(lease)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid lease: {}", e)))?,
        };

        match self.tables.locks.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(lease);
                Ok(true)
            }
            Entry::Occupied(mut held) => {
                if held.get().owner == owner || held.get().expires_at <= now {
                    held.insert(lease);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn release_lock(&self, name: &str, owner: &str) -> Result<()> {
        self.tables
            .locks
            .remove_if(name, |_, lease| lease.owner == owner);
        Ok(())
    }
}
