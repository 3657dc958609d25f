// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod challenges;
pub mod filter;
pub mod health;
pub mod ingest;
pub mod leaderboard;
pub mod queue;
pub mod scheduler;
pub mod strava;
pub mod sync;
pub mod webhook;

pub use challenges::{ChallengeService, RecomputeReport};
pub use filter::ActivityFilter;
pub use health::{HealthMonitor, HealthReport};
pub use ingest::IngestService;
pub use leaderboard::{LeaderboardCache, LeaderboardEntry};
pub use queue::{BatchQueue, DrainReport};
pub use strava::{OAuthResult, StravaClient, StravaService};
pub use sync::{SyncOrchestrator, SyncOutcome};
pub use webhook::{EventAction, WebhookOutcome, WebhookRouter};
