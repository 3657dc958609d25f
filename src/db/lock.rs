// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded-wait acquisition of state-store lease locks.

use std::time::Duration;
use tokio::time::Instant;

use crate::db::StateStore;
use crate::error::{AppError, Result};

/// Poll interval while waiting for a busy lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Proof of holding a named lock. Release explicitly with [`LockGuard::release`];
/// an unreleased lock frees itself when its lease runs out.
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    owner: String,
}

impl LockGuard {
    pub async fn release(self, store: &dyn StateStore) -> Result<()> {
        store.release_lock(&self.name, &self.owner).await
    }
}

/// Acquire `name`, retrying until `wait` has elapsed.
///
/// A zero `wait` makes exactly one attempt. Failing to acquire in time is
/// `AppError::LockContention`.
pub async fn acquire_lock(
    store: &dyn StateStore,
    name: &str,
    wait: Duration,
    lease: Duration,
) -> Result<LockGuard> {
    let owner = uuid::Uuid::new_v4().to_string();
    let deadline = Instant::now() + wait;

    loop {
        if store.try_acquire_lock(name, &owner, lease).await? {
            tracing::debug!(lock = name, owner = %owner, "Lock acquired");
            return Ok(LockGuard {
                name: name.to_string(),
                owner,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(AppError::LockContention(format!(
                "{} still held after {:?}",
                name, wait
            )));
        }
        tokio::time::sleep(LOCK_POLL_INTERVAL.min(deadline - now)).await;
    }
}
