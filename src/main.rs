// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Club-Sync API Server
//!
//! Keeps club members' Strava activities synchronized through webhooks,
//! a persisted batch queue and scheduled polling.

use club_sync::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryStore, SharedRecordStore, SharedStateStore},
    services::scheduler,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Club-Sync API");

    let (records, state): (SharedRecordStore, SharedStateStore) = match config.storage_backend {
        StorageBackend::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id).await?;
            (Arc::new(db.clone()), Arc::new(db))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            let store = MemoryStore::new();
            (Arc::new(store.clone()), Arc::new(store))
        }
    };

    if config.webhook_shared_secret.is_none() {
        tracing::warn!("WEBHOOK_SHARED_SECRET not set; webhook events will be rejected");
    }

    let run_scheduler = config.run_scheduler;
    let port = config.port;
    let state = Arc::new(AppState::new(config, records, state)?);

    if run_scheduler {
        scheduler::start_scheduler(state.clone());
    }

    let app = club_sync::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("club_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
