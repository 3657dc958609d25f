// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persisted FIFO of users waiting for a sync, drained in bounded runs.
//!
//! The queue and its drain schedule live in the state store so every
//! instance sees the same pending list. Read-modify-write cycles on the
//! queue hold the `sync_queue_lock` lease lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SyncSettings;
use crate::db::store::{get_state, set_state};
use crate::db::{acquire_lock, state_keys, LockGuard, SharedRecordStore, SharedStateStore};
use crate::error::{AppError, Result};
use crate::models::AthleteId;
use crate::services::SyncOrchestrator;

/// Persisted drain schedule flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainSchedule {
    pub armed: bool,
    pub changed_at: DateTime<Utc>,
}

/// Result of one drain call.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DrainReport {
    /// Another drain held the lock; nothing was done
    pub skipped: bool,
    /// The queue was empty and was refilled from the user list
    pub refilled: bool,
    /// No users exist; the schedule was disarmed
    pub disarmed: bool,
    /// Users synced this run, in queue order
    pub processed: Vec<AthleteId>,
    /// Users whose sync returned an error
    pub failed: usize,
    pub any_added: bool,
    /// Users still queued after this run
    pub remaining: usize,
}

#[derive(Clone)]
pub struct BatchQueue {
    state: SharedStateStore,
    records: SharedRecordStore,
    sync: SyncOrchestrator,
    max_per_run: usize,
    enqueue_lock_wait: Duration,
    drain_lock_wait: Duration,
    lock_lease: Duration,
}

impl BatchQueue {
    pub fn new(
        state: SharedStateStore,
        records: SharedRecordStore,
        sync: SyncOrchestrator,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            state,
            records,
            sync,
            max_per_run: settings.max_users_per_queue_run,
            enqueue_lock_wait: settings.enqueue_lock_wait,
            drain_lock_wait: settings.drain_lock_wait,
            lock_lease: settings.lock_lease,
        }
    }

    /// Current queue contents, front first.
    pub async fn pending(&self) -> Result<Vec<AthleteId>> {
        Ok(get_state(self.state.as_ref(), state_keys::SYNC_QUEUE)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, queue: &[AthleteId]) -> Result<()> {
        set_state(self.state.as_ref(), state_keys::SYNC_QUEUE, &queue).await
    }

    async fn lock(&self, wait: Duration) -> Result<LockGuard> {
        acquire_lock(
            self.state.as_ref(),
            state_keys::SYNC_QUEUE_LOCK,
            wait,
            self.lock_lease,
        )
        .await
    }

    async fn release(&self, guard: LockGuard) {
        if let Err(e) = guard.release(self.state.as_ref()).await {
            tracing::warn!(error = %e, "Failed to release queue lock; lease will expire");
        }
    }

    // ─── Enqueue ─────────────────────────────────────────────────

    /// Append users not already queued, then arm the drain schedule.
    ///
    /// Fails with `LockContention` if the queue lock stays busy for the
    /// whole enqueue wait. Returns how many users were added.
    pub async fn enqueue(&self, athlete_ids: &[AthleteId]) -> Result<usize> {
        let guard = self.lock(self.enqueue_lock_wait).await.inspect_err(|e| {
            tracing::warn!(error = %e, "Enqueue could not take the queue lock");
        })?;

        let result = self.enqueue_locked(athlete_ids).await;
        self.release(guard).await;
        let added = result?;

        self.arm_schedule().await?;

        tracing::info!(added, offered = athlete_ids.len(), "Users enqueued");
        Ok(added)
    }

    async fn enqueue_locked(&self, athlete_ids: &[AthleteId]) -> Result<usize> {
        let mut queue = self.pending().await?;
        let before = queue.len();

        for id in athlete_ids {
            if !id.is_empty() && !queue.contains(id) {
                queue.push(id.clone());
            }
        }

        let added = queue.len() - before;
        if added > 0 {
            self.save(&queue).await?;
        }
        Ok(added)
    }

    // ─── Drain ───────────────────────────────────────────────────

    /// Sync up to the per-run limit of queued users, front first.
    ///
    /// A busy lock skips this run. An empty queue is refilled from every
    /// authorized user; with no users at all the schedule is disarmed.
    /// Popped users are persisted as removed before their syncs run.
    pub async fn drain(&self) -> Result<DrainReport> {
        let guard = match self.lock(self.drain_lock_wait).await {
            Ok(guard) => guard,
            Err(AppError::LockContention(msg)) => {
                tracing::warn!(reason = %msg, "Queue drain already in progress, skipping");
                return Ok(DrainReport {
                    skipped: true,
                    ..DrainReport::default()
                });
            }
            Err(e) => return Err(e),
        };

        let popped = self.pop_batch().await;
        self.release(guard).await;
        let (batch, mut report) = popped?;

        if report.disarmed {
            return Ok(report);
        }

        for athlete_id in &batch {
            match self
                .sync
                .sync_user(athlete_id, false, self.sync.default_lookback_days())
                .await
            {
                Ok(outcome) => {
                    report.any_added |= outcome.any_added();
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(athlete_id = %athlete_id, error = %e, "Queued sync failed, continuing");
                }
            }
        }
        report.processed = batch;

        if report.any_added {
            self.sync.invalidate_caches();
        }

        tracing::info!(
            processed = report.processed.len(),
            failed = report.failed,
            remaining = report.remaining,
            refilled = report.refilled,
            any_added = report.any_added,
            "Queue drain complete"
        );
        Ok(report)
    }

    /// Remove the next batch from the queue. Caller holds the queue lock.
    async fn pop_batch(&self) -> Result<(Vec<AthleteId>, DrainReport)> {
        let mut report = DrainReport::default();
        let mut queue = self.pending().await?;

        if queue.is_empty() {
            queue = self
                .records
                .list_users()
                .await?
                .into_iter()
                .filter(|u| u.authorized)
                .map(|u| u.athlete_id)
                .collect();

            if queue.is_empty() {
                self.disarm_schedule().await?;
                report.disarmed = true;
                tracing::info!("No users to sync, drain schedule disarmed");
                return Ok((Vec::new(), report));
            }
            report.refilled = true;
            tracing::info!(users = queue.len(), "Queue empty, refilled with all users");
        }

        let take = self.max_per_run.min(queue.len());
        let batch: Vec<AthleteId> = queue.drain(..take).collect();
        self.save(&queue).await?;
        report.remaining = queue.len();

        Ok((batch, report))
    }

    // ─── Schedule ────────────────────────────────────────────────

    pub async fn schedule(&self) -> Result<Option<DrainSchedule>> {
        get_state(self.state.as_ref(), state_keys::DRAIN_SCHEDULE).await
    }

    pub async fn is_armed(&self) -> Result<bool> {
        Ok(self.schedule().await?.is_some_and(|s| s.armed))
    }

    /// Arm the scheduled drain. Returns false if it was already armed.
    pub async fn arm_schedule(&self) -> Result<bool> {
        if self.is_armed().await? {
            return Ok(false);
        }
        self.set_schedule(true).await?;
        tracing::info!("Queue drain schedule armed");
        Ok(true)
    }

    /// Disarm the scheduled drain. Returns false if it was not armed.
    pub async fn disarm_schedule(&self) -> Result<bool> {
        if !self.is_armed().await? {
            return Ok(false);
        }
        self.set_schedule(false).await?;
        tracing::info!("Queue drain schedule disarmed");
        Ok(true)
    }

    async fn set_schedule(&self, armed: bool) -> Result<()> {
        let schedule = DrainSchedule {
            armed,
            changed_at: Utc::now(),
        };
        set_state(self.state.as_ref(), state_keys::DRAIN_SCHEDULE, &schedule).await
    }

    /// Scheduler entry point: drain only while the schedule is armed.
    pub async fn run_scheduled_drain(&self) -> Result<Option<DrainReport>> {
        if !self.is_armed().await? {
            tracing::debug!("Drain schedule not armed, skipping");
            return Ok(None);
        }
        self.drain().await.map(Some)
    }
}
