// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dispatch of authenticated push events.

use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::db::store::{get_state, set_state};
use crate::db::{state_keys, SharedRecordStore, SharedStateStore};
use crate::error::{AppError, Result};
use crate::models::{Activity, AthleteId, WebhookEvent};
use crate::services::{BatchQueue, ChallengeService, IngestService, StravaService, SyncOrchestrator};

/// Acknowledgment text for a rejected shared secret.
pub const ACK_AUTH_FAILED: &str = "Authentication Failed";
/// Acknowledgment text for a processed event.
pub const ACK_SUCCESS: &str = "Success";
/// Prefix of the acknowledgment text for a processing error.
pub const ACK_ERROR_PREFIX: &str = "Error processing request: ";

/// What the router did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    Ingested { added: bool },
    /// Update event: old record removed (if present), fresh copy ingested
    Replaced { removed: bool, added: bool },
    Deleted { existed: bool },
    Deauthorized { known_user: bool },
    /// Event accepted but not acted on (no token, fetch failed)
    Aborted(&'static str),
    Unhandled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    AuthFailed,
    Processed(EventAction),
}

impl WebhookOutcome {
    /// Text the transport returns to the proxy.
    pub fn ack(&self) -> &'static str {
        match self {
            WebhookOutcome::AuthFailed => ACK_AUTH_FAILED,
            WebhookOutcome::Processed(_) => ACK_SUCCESS,
        }
    }
}

#[derive(Clone)]
pub struct WebhookRouter {
    shared_secret: Option<String>,
    records: SharedRecordStore,
    state: SharedStateStore,
    strava: StravaService,
    ingest: IngestService,
    sync: SyncOrchestrator,
    challenges: ChallengeService,
    queue: BatchQueue,
}

impl WebhookRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shared_secret: Option<String>,
        records: SharedRecordStore,
        state: SharedStateStore,
        strava: StravaService,
        ingest: IngestService,
        sync: SyncOrchestrator,
        challenges: ChallengeService,
        queue: BatchQueue,
    ) -> Self {
        Self {
            shared_secret,
            records,
            state,
            strava,
            ingest,
            sync,
            challenges,
            queue,
        }
    }

    /// When the last authenticated event arrived.
    pub async fn last_received(&self) -> Result<Option<chrono::DateTime<Utc>>> {
        get_state(self.state.as_ref(), state_keys::LAST_WEBHOOK_AT).await
    }

    /// Authenticate and dispatch one event.
    ///
    /// A missing configured secret is an error for the whole request; a
    /// wrong secret is `AuthFailed` with no side effects.
    pub async fn handle_inbound_event(
        &self,
        secret: &str,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome> {
        let expected = self
            .shared_secret
            .as_deref()
            .ok_or(AppError::MissingConfig("WEBHOOK_SHARED_SECRET"))?;

        if !bool::from(secret.as_bytes().ct_eq(expected.as_bytes())) {
            tracing::warn!(
                object_type = %event.object_type,
                object_id = event.object_id,
                "Webhook rejected: shared secret mismatch"
            );
            return Ok(WebhookOutcome::AuthFailed);
        }

        if let Err(e) = set_state(self.state.as_ref(), state_keys::LAST_WEBHOOK_AT, &Utc::now()).await {
            tracing::warn!(error = %e, "Failed to record webhook receipt time");
        }

        tracing::info!(
            object_type = %event.object_type,
            aspect_type = %event.aspect_type,
            object_id = event.object_id,
            owner_id = %event.owner_id,
            "Webhook event received"
        );

        let action = match (event.object_type.as_str(), event.aspect_type.as_str()) {
            ("activity", "create") => self.handle_create(event).await?,
            ("activity", "update") => self.handle_update(event).await?,
            ("activity", "delete") => self.handle_delete(event).await?,
            ("athlete", _) if event.is_deauthorization() => {
                let known_user = self.strava.revoke_local_tokens(&event.owner_id).await?;
                if !known_user {
                    tracing::info!(owner_id = %event.owner_id, "Deauthorization for unknown user");
                }
                EventAction::Deauthorized { known_user }
            }
            (object_type, aspect_type) => {
                tracing::debug!(object_type, aspect_type, "Unhandled webhook event");
                EventAction::Unhandled
            }
        };

        Ok(WebhookOutcome::Processed(action))
    }

    /// Fetch the full activity, or explain why not.
    async fn fetch_for_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<std::result::Result<Activity, &'static str>> {
        if !self.strava.has_token(&event.owner_id).await? {
            tracing::warn!(owner_id = %event.owner_id, activity_id = event.object_id, "No token for activity owner");
            return Ok(Err("no token for owner"));
        }

        match self
            .strava
            .fetch_activity_by_id(event.object_id, &event.owner_id)
            .await
        {
            Ok(activity) => Ok(Ok(activity)),
            Err(e) => {
                tracing::warn!(
                    owner_id = %event.owner_id,
                    activity_id = event.object_id,
                    error = %e,
                    "Failed to fetch activity for webhook"
                );
                Ok(Err("activity fetch failed"))
            }
        }
    }

    async fn handle_create(&self, event: &WebhookEvent) -> Result<EventAction> {
        let activity = match self.fetch_for_event(event).await? {
            Ok(activity) => activity,
            Err(reason) => return Ok(EventAction::Aborted(reason)),
        };

        let added = self.ingest.ingest_one(&activity).await?;
        if added {
            self.after_change(&event.owner_id, true).await?;
        }
        Ok(EventAction::Ingested { added })
    }

    /// Replace the stored record with the current remote state.
    ///
    /// The fetch happens before the delete, so a failed fetch leaves the
    /// old record in place.
    async fn handle_update(&self, event: &WebhookEvent) -> Result<EventAction> {
        let activity = match self.fetch_for_event(event).await? {
            Ok(activity) => activity,
            Err(reason) => return Ok(EventAction::Aborted(reason)),
        };

        let removed = self.records.delete_activity(event.object_id).await?;
        let added = self.ingest.ingest_one(&activity).await?;

        if added {
            self.after_change(&event.owner_id, true).await?;
        } else if removed {
            self.after_change(&event.owner_id, false).await?;
        }

        tracing::info!(activity_id = event.object_id, removed, added, "Activity replaced");
        Ok(EventAction::Replaced { removed, added })
    }

    async fn handle_delete(&self, event: &WebhookEvent) -> Result<EventAction> {
        let existed = self.records.delete_activity(event.object_id).await?;
        if existed {
            tracing::info!(activity_id = event.object_id, "Activity deleted");
            if let Err(e) = self.challenges.recompute_for_user(&event.owner_id).await {
                tracing::warn!(owner_id = %event.owner_id, error = %e, "Challenge recompute failed");
            }
        } else {
            tracing::debug!(activity_id = event.object_id, "Delete for unknown activity");
        }
        self.sync.invalidate_caches();
        Ok(EventAction::Deleted { existed })
    }

    /// Downstream effects of a stored-activity change. An addition also
    /// proves the push channel is live, so polling is disarmed.
    async fn after_change(&self, owner_id: &AthleteId, added: bool) -> Result<()> {
        if added {
            self.sync.mark_synced(owner_id, Utc::now()).await?;
        }
        if let Err(e) = self.challenges.recompute_for_user(owner_id).await {
            tracing::warn!(owner_id = %owner_id, error = %e, "Challenge recompute failed");
        }
        self.sync.invalidate_caches();
        if added {
            self.queue.disarm_schedule().await?;
        }
        Ok(())
    }
}
