// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Club-Sync: keep a club's Strava activities in step with Strava
//!
//! This crate provides the backend that pulls member activities through
//! polling, a persisted batch queue and push webhooks, and keeps
//! leaderboards and challenge progress current.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::{SharedRecordStore, SharedStateStore};
use error::Result;
use services::{
    ActivityFilter, BatchQueue, ChallengeService, HealthMonitor, IngestService, LeaderboardCache,
    StravaClient, StravaService, SyncOrchestrator, WebhookRouter,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub records: SharedRecordStore,
    pub state: SharedStateStore,
    pub strava: StravaService,
    pub ingest: IngestService,
    pub sync: SyncOrchestrator,
    pub queue: BatchQueue,
    pub webhook: WebhookRouter,
    pub health: HealthMonitor,
    pub challenges: ChallengeService,
    pub leaderboard: LeaderboardCache,
}

impl AppState {
    /// Wire every service over the given stores.
    pub fn new(config: Config, records: SharedRecordStore, state: SharedStateStore) -> Result<Self> {
        let settings = &config.sync;
        let filter = ActivityFilter::from_settings(settings);

        let strava = StravaService::new(
            StravaClient::new(&config)?,
            records.clone(),
            filter.clone(),
            settings,
        );
        let ingest = IngestService::new(records.clone(), filter);
        let challenges = ChallengeService::new(records.clone());
        let leaderboard = LeaderboardCache::new(records.clone());
        let sync = SyncOrchestrator::new(
            records.clone(),
            strava.clone(),
            ingest.clone(),
            challenges.clone(),
            leaderboard.clone(),
            settings,
        );
        let queue = BatchQueue::new(state.clone(), records.clone(), sync.clone(), settings);
        let health = HealthMonitor::new(
            state.clone(),
            queue.clone(),
            settings.webhook_health_threshold_hours,
        );
        let webhook = WebhookRouter::new(
            config.webhook_shared_secret.clone(),
            records.clone(),
            state.clone(),
            strava.clone(),
            ingest.clone(),
            sync.clone(),
            challenges.clone(),
            queue.clone(),
        );

        Ok(Self {
            config,
            records,
            state,
            strava,
            ingest,
            sync,
            queue,
            webhook,
            health,
            challenges,
            leaderboard,
        })
    }
}
