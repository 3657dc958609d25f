// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore storage backend.
//!
//! Collections:
//! - `users` keyed by athlete ID
//! - `activities` keyed by activity ID
//! - `challenges`, `challenge_progress`
//! - `app_state` holding wrapped JSON values
//! - `locks` holding lease documents

use ::firestore::errors::FirestoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gcloud_sdk::google::firestore::v1::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::db::collections;
use crate::db::rows::{decode_row, decode_rows, encode_row};
use crate::db::{RecordStore, StateStore};
use crate::error::AppError;
use crate::models::{Activity, AthleteId, Challenge, ChallengeProgress, User};

type Result<T> = std::result::Result<T, AppError>;

/// Wrapper so any JSON value (including arrays) can be stored as a document.
#[derive(Debug, Serialize, Deserialize)]
struct StateDoc {
    value: Value,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LockDoc {
    owner: String,
    expires_at: DateTime<Utc>,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: ::firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Connect to Firestore.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = ::firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Emulator connection with a dummy bearer token.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = ::firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = ::firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore Emulator");

        Ok(Self { client })
    }

    // ─── Raw row helpers ─────────────────────────────────────────

    fn doc_to_row(collection: &str, doc: &Document) -> Option<(String, Value)> {
        let id = doc.name.rsplit('/').next().unwrap_or_default().to_string();
        match ::firestore::FirestoreDb::deserialize_doc_to::<Value>(doc) {
            Ok(row) => Some((id, row)),
            Err(e) => {
                let err = AppError::DataCorruption(format!("{}/{}: {}", collection, id, e));
                tracing::error!(collection, id = %id, error = %err, "Skipping unreadable document");
                None
            }
        }
    }

    async fn get_row(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let doc = self
            .client
            .fluent()
            .select()
            .by_id_in(collection)
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(doc
            .as_ref()
            .and_then(|doc| Self::doc_to_row(collection, doc))
            .map(|(_, row)| row))
    }

    async fn list_rows(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let docs = self
            .client
            .fluent()
            .select()
            .from(collection)
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(docs
            .iter()
            .filter_map(|doc| Self::doc_to_row(collection, doc))
            .collect())
    }

    async fn list_rows_where(
        &self,
        collection: &str,
        field: &'static str,
        value: &str,
    ) -> Result<Vec<(String, Value)>> {
        let value = value.to_string();
        let docs = self
            .client
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| q.for_all([q.field(field).eq(value.clone())]))
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(docs
            .iter()
            .filter_map(|doc| Self::doc_to_row(collection, doc))
            .collect())
    }

    async fn put_row(&self, collection: &str, id: &str, row: &Value) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(row)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_row(&self, collection: &str, id: &str) -> Result<()> {
        self.client
            .fluent()
            .delete()
            .from(collection)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn write_lock(&self, name: &str, lock: &LockDoc) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::LOCKS)
            .document_id(name)
            .object(lock)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn read_lock(&self, name: &str) -> Result<Option<LockDoc>> {
        Ok(self
            .get_row(collections::LOCKS, name)
            .await?
            .and_then(|row| decode_row(collections::LOCKS, name, row)))
    }
}

#[async_trait]
impl RecordStore for FirestoreDb {
    async fn get_user(&self, athlete_id: &AthleteId) -> Result<Option<User>> {
        Ok(self
            .get_row(collections::USERS, athlete_id.as_str())
            .await?
            .and_then(|row| decode_row(collections::USERS, athlete_id.as_str(), row)))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = decode_rows(collections::USERS, self.list_rows(collections::USERS).await?);
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.athlete_id.cmp(&b.athlete_id)));
        Ok(users)
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.put_row(collections::USERS, user.athlete_id.as_str(), &encode_row(user)?)
            .await
    }

    async fn list_activities(&self) -> Result<Vec<Activity>> {
        Ok(decode_rows(
            collections::ACTIVITIES,
            self.list_rows(collections::ACTIVITIES).await?,
        ))
    }

    async fn list_activities_for_athlete(&self, athlete_id: &AthleteId) -> Result<Vec<Activity>> {
        Ok(decode_rows(
            collections::ACTIVITIES,
            self.list_rows_where(collections::ACTIVITIES, "athlete_id", athlete_id.as_str())
                .await?,
        ))
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<bool> {
        let result = self
            .client
            .fluent()
            .insert()
            .into(collections::ACTIVITIES)
            .document_id(activity.activity_id.to_string())
            .object(activity)
            .execute::<Activity>()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn delete_activity(&self, activity_id: u64) -> Result<bool> {
        let id = activity_id.to_string();
        if self.get_row(collections::ACTIVITIES, &id).await?.is_none() {
            return Ok(false);
        }
        self.delete_row(collections::ACTIVITIES, &id).await?;
        Ok(true)
    }

    async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        Ok(decode_rows(
            collections::CHALLENGES,
            self.list_rows(collections::CHALLENGES).await?,
        ))
    }

    async fn get_challenge(&self, challenge_id: &str) -> Result<Option<Challenge>> {
        Ok(self
            .get_row(collections::CHALLENGES, challenge_id)
            .await?
            .and_then(|row| decode_row(collections::CHALLENGES, challenge_id, row)))
    }

    async fn upsert_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.put_row(collections::CHALLENGES, &challenge.id, &encode_row(challenge)?)
            .await
    }

    async fn list_progress(&self, challenge_id: &str) -> Result<Vec<ChallengeProgress>> {
        Ok(decode_rows(
            collections::CHALLENGE_PROGRESS,
            self.list_rows_where(collections::CHALLENGE_PROGRESS, "challenge_id", challenge_id)
                .await?,
        ))
    }

    async fn upsert_progress(&self, progress: &ChallengeProgress) -> Result<()> {
        let doc_id = ChallengeProgress::doc_id(&progress.challenge_id, &progress.athlete_id);
        self.put_row(collections::CHALLENGE_PROGRESS, &doc_id, &encode_row(progress)?)
            .await
    }
}

#[async_trait]
impl StateStore for FirestoreDb {
    async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let doc: Option<StateDoc> = self
            .get_row(collections::APP_STATE, key)
            .await?
            .and_then(|row| decode_row(collections::APP_STATE, key, row));
        Ok(doc.map(|d| d.value))
    }

    async fn set_value(&self, key: &str, value: Value) -> Result<()> {
        let doc = StateDoc {
            value,
            updated_at: Utc::now(),
        };
        self.put_row(collections::APP_STATE, key, &encode_row(&doc)?)
            .await
    }

    async fn delete_value(&self, key: &str) -> Result<()> {
        self.delete_row(collections::APP_STATE, key).await
    }

    async fn try_acquire_lock(&self, name: &str, owner: &str, lease: Duration) -> Result<bool> {
        let now = Utc::now();
        let lock = LockDoc {
            owner: owner.to_string(),
            expires_at: now
                + chrono::Duration::from_std(lease)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid lease: {}", e)))?,
        };

        let created = self
            .client
            .fluent()
            .insert()
            .into(collections::LOCKS)
            .document_id(name)
            .object(&lock)
            .execute::<LockDoc>()
            .await;

        match created {
            Ok(_) => return Ok(true),
            Err(FirestoreError::DataConflictError(_)) => {}
            Err(e) => return Err(AppError::Database(e.to_string())),
        }

        // Lock document exists: take it over only if we own it or it expired.
        let held = self.read_lock(name).await?;
        let can_take = match &held {
            Some(held) => held.owner == owner || held.expires_at <= now,
            None => true,
        };
        if !can_take {
            return Ok(false);
        }

        self.write_lock(name, &lock).await?;

        // Two expired-lease takeovers can race; the last writer wins.
        Ok(self
            .read_lock(name)
            .await?
            .is_some_and(|current| current.owner == owner))
    }

    async fn release_lock(&self, name: &str, owner: &str) -> Result<()> {
        match self.read_lock(name).await? {
            Some(held) if held.owner == owner => self.delete_row(collections::LOCKS, name).await,
            _ => {
                tracing::debug!(lock = name, owner, "Lock no longer held by owner, skipping release");
                Ok(())
            }
        }
    }
}
