// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user activity sync.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::SyncSettings;
use crate::db::SharedRecordStore;
use crate::error::Result;
use crate::models::AthleteId;
use crate::services::{ChallengeService, IngestService, LeaderboardCache, StravaService};

/// What a call to [`SyncOrchestrator::sync_user`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SyncOutcome {
    UserNotFound,
    /// Synced too recently and not forced
    Throttled,
    /// Strava fetch failed; logged and treated as no activities
    FetchFailed,
    Synced { fetched: usize, added: usize },
}

impl SyncOutcome {
    pub fn any_added(&self) -> bool {
        matches!(self, SyncOutcome::Synced { added, .. } if *added > 0)
    }
}

/// Pulls recent activities for one user and ingests them.
#[derive(Clone)]
pub struct SyncOrchestrator {
    records: SharedRecordStore,
    strava: StravaService,
    ingest: IngestService,
    challenges: ChallengeService,
    leaderboard: LeaderboardCache,
    update_interval: Duration,
    default_lookback_days: i64,
    initial_lookback_days: i64,
}

impl SyncOrchestrator {
    pub fn new(
        records: SharedRecordStore,
        strava: StravaService,
        ingest: IngestService,
        challenges: ChallengeService,
        leaderboard: LeaderboardCache,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            records,
            strava,
            ingest,
            challenges,
            leaderboard,
            update_interval: Duration::hours(settings.update_interval_hours),
            default_lookback_days: settings.default_lookback_days,
            initial_lookback_days: settings.initial_lookback_days,
        }
    }

    pub fn default_lookback_days(&self) -> i64 {
        self.default_lookback_days
    }

    /// Sync one user.
    ///
    /// Unless `force`, a user synced within the update interval is skipped.
    /// A user who never synced gets the initial lookback window instead of
    /// `lookback_days`. On any addition the user's `last_synced` moves to
    /// the call time and their challenge progress is recomputed; the caller
    /// is responsible for invalidating caches (see [`SyncOutcome::any_added`]).
    pub async fn sync_user(
        &self,
        athlete_id: &AthleteId,
        force: bool,
        lookback_days: i64,
    ) -> Result<SyncOutcome> {
        let now = Utc::now();

        let Some(user) = self.records.get_user(athlete_id).await? else {
            tracing::warn!(athlete_id = %athlete_id, "Sync requested for unknown user");
            return Ok(SyncOutcome::UserNotFound);
        };

        if !force {
            if let Some(last) = user.last_synced {
                if now - last < self.update_interval {
                    tracing::debug!(athlete_id = %athlete_id, last_synced = %last, "Sync throttled");
                    return Ok(SyncOutcome::Throttled);
                }
            }
        }

        let days = match user.last_synced {
            None => self.initial_lookback_days,
            Some(_) => lookback_days,
        };
        let after = now - Duration::days(days);

        let activities = match self
            .strava
            .fetch_athlete_activities(athlete_id, after, now)
            .await
        {
            Ok(activities) => activities,
            Err(e) => {
                tracing::warn!(athlete_id = %athlete_id, error = %e, "Activity fetch failed");
                return Ok(SyncOutcome::FetchFailed);
            }
        };

        let fetched = activities.len();
        let added = self.ingest.ingest_batch(&activities).await?;

        if added > 0 {
            self.mark_synced(athlete_id, now).await?;
            if let Err(e) = self.challenges.recompute_for_user(athlete_id).await {
                tracing::warn!(athlete_id = %athlete_id, error = %e, "Challenge recompute failed");
            }
        }

        tracing::info!(athlete_id = %athlete_id, fetched, added, lookback_days = days, "User synced");
        Ok(SyncOutcome::Synced { fetched, added })
    }

    /// Set `last_synced` on a fresh copy of the user record.
    pub async fn mark_synced(&self, athlete_id: &AthleteId, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut user) = self.records.get_user(athlete_id).await? {
            user.last_synced = Some(at);
            self.records.upsert_user(&user).await?;
        }
        Ok(())
    }

    pub fn invalidate_caches(&self) {
        self.leaderboard.invalidate();
    }

    /// Delete every stored activity the current filter rejects.
    pub async fn purge_disallowed(&self) -> Result<usize> {
        let mut removed = 0;

        for activity in self.records.list_activities().await? {
            if self.ingest.filter().is_allowed(&activity) {
                continue;
            }
            match self.records.delete_activity(activity.activity_id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        activity_id = activity.activity_id,
                        error = %e,
                        "Failed to purge activity, continuing"
                    );
                }
            }
        }

        if removed > 0 {
            self.invalidate_caches();
        }
        tracing::info!(removed, "Purged activities failing the filter");
        Ok(removed)
    }
}
