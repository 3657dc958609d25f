// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process scheduler for deployments without an external trigger.
//!
//! Runs the same jobs as the `/tasks/*` routes on fixed intervals.

use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::AppState;

/// Queue drain cadence while armed.
const DRAIN_INTERVAL: Duration = Duration::from_secs(15 * 60);

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const CHALLENGE_RECOMPUTE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Delay before the first run so the server finishes starting.
const INITIAL_DELAY: Duration = Duration::from_secs(60);

/// Spawn the drain, health-check and challenge-recompute loops.
pub fn start_scheduler(state: Arc<AppState>) {
    spawn_loop("queue_drain", DRAIN_INTERVAL, state.clone(), |state| async move {
        match state.queue.run_scheduled_drain().await {
            Ok(Some(report)) => tracing::info!(
                processed = report.processed.len(),
                remaining = report.remaining,
                "Scheduled drain finished"
            ),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Scheduled drain failed"),
        }
    });

    spawn_loop("health_check", HEALTH_CHECK_INTERVAL, state.clone(), |state| async move {
        if let Err(e) = state.health.check_health().await {
            tracing::warn!(error = %e, "Scheduled health check failed");
        }
    });

    spawn_loop(
        "challenge_recompute",
        CHALLENGE_RECOMPUTE_INTERVAL,
        state,
        |state| async move {
            if let Err(e) = state.challenges.recompute_all().await {
                tracing::warn!(error = %e, "Scheduled challenge recompute failed");
            }
        },
    );
}

fn spawn_loop<F, Fut>(name: &'static str, period: Duration, state: Arc<AppState>, job: F)
where
    F: Fn(Arc<AppState>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        tracing::info!(job = name, period_secs = period.as_secs(), "Scheduler loop started");
        tokio::time::sleep(INITIAL_DELAY).await;

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            tracing::debug!(job = name, "Running scheduled job");
            job(state.clone()).await;
        }
    });
}
