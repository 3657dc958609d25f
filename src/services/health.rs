// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Push-channel health check with polling fallback.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::store::get_state;
use crate::db::{state_keys, SharedStateStore};
use crate::error::Result;
use crate::services::BatchQueue;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub last_webhook_at: Option<DateTime<Utc>>,
    pub hours_since_webhook: Option<i64>,
    /// True if the webhook channel looks dead
    pub stale: bool,
    /// True if this check armed the drain schedule
    pub armed_drain: bool,
}

#[derive(Clone)]
pub struct HealthMonitor {
    state: SharedStateStore,
    queue: BatchQueue,
    threshold: Duration,
}

impl HealthMonitor {
    pub fn new(state: SharedStateStore, queue: BatchQueue, threshold_hours: i64) -> Self {
        Self {
            state,
            queue,
            threshold: Duration::hours(threshold_hours),
        }
    }

    /// Arm polling if no webhook was ever seen or the last one is older
    /// than the threshold. Never disarms.
    pub async fn check_health(&self) -> Result<HealthReport> {
        let last: Option<DateTime<Utc>> =
            get_state(self.state.as_ref(), state_keys::LAST_WEBHOOK_AT).await?;
        let now = Utc::now();

        let (stale, hours) = match last {
            None => (true, None),
            Some(at) => {
                let age = now - at;
                (age > self.threshold, Some(age.num_hours()))
            }
        };

        let armed_drain = if stale {
            tracing::warn!(
                last_webhook_at = ?last,
                hours_since_webhook = ?hours,
                "Webhook channel stale, arming queue drain"
            );
            self.queue.arm_schedule().await?
        } else {
            tracing::debug!(hours_since_webhook = ?hours, "Webhook channel healthy");
            false
        };

        Ok(HealthReport {
            last_webhook_at: last,
            hours_since_webhook: hours,
            stale,
            armed_drain,
        })
    }
}
