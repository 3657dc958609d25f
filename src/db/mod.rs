// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer.
//!
//! Two narrow interfaces are injected into the services:
//! - [`RecordStore`]: users, activities, challenges, challenge progress
//! - [`StateStore`]: process-wide JSON values plus lease locks
//!
//! Both are implemented by [`MemoryStore`] (tests, single-instance
//! deployments) and [`FirestoreDb`].

pub mod firestore;
pub mod lock;
pub mod memory;
pub mod rows;
pub mod store;

pub use self::firestore::FirestoreDb;
pub use lock::{acquire_lock, LockGuard};
pub use memory::MemoryStore;
pub use store::{RecordStore, SharedRecordStore, SharedStateStore, StateStore};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ACTIVITIES: &str = "activities";
    pub const CHALLENGES: &str = "challenges";
    /// Progress rows keyed by `{challenge_id}_{athlete_id}`
    pub const CHALLENGE_PROGRESS: &str = "challenge_progress";
    /// Process-wide key/value state (queue contents, timestamps, flags)
    pub const APP_STATE: &str = "app_state";
    pub const LOCKS: &str = "locks";
}

/// Keys used in the state store.
pub mod state_keys {
    /// Pending user IDs for the batch queue
    pub const SYNC_QUEUE: &str = "sync_queue";
    /// Lock guarding queue read-modify-write cycles
    pub const SYNC_QUEUE_LOCK: &str = "sync_queue_lock";
    /// Whether the scheduled queue drain is armed
    pub const DRAIN_SCHEDULE: &str = "drain_schedule";
    /// Last accepted webhook event
    pub const LAST_WEBHOOK_AT: &str = "last_webhook_at";
}
