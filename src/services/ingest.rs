// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deduplicating activity ingest.

use std::collections::HashSet;

use crate::db::SharedRecordStore;
use crate::error::Result;
use crate::models::Activity;
use crate::services::ActivityFilter;

/// Why an activity was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingId,
    Filtered,
    Duplicate,
}

/// Stores activities at most once per Strava activity ID.
#[derive(Clone)]
pub struct IngestService {
    records: SharedRecordStore,
    filter: ActivityFilter,
}

impl IngestService {
    pub fn new(records: SharedRecordStore, filter: ActivityFilter) -> Self {
        Self { records, filter }
    }

    pub fn filter(&self) -> &ActivityFilter {
        &self.filter
    }

    fn precheck(&self, activity: &Activity, existing: &HashSet<u64>) -> Option<Rejection> {
        if activity.activity_id == 0 {
            Some(Rejection::MissingId)
        } else if !self.filter.is_allowed(activity) {
            Some(Rejection::Filtered)
        } else if existing.contains(&activity.activity_id) {
            Some(Rejection::Duplicate)
        } else {
            None
        }
    }

    /// Store `activity` if it has an ID, passes the filter, and is not
    /// already stored. Returns whether it was added.
    pub async fn ingest_one(&self, activity: &Activity) -> Result<bool> {
        let existing = self.records.list_activity_ids().await?;
        if let Some(reason) = self.precheck(activity, &existing) {
            tracing::debug!(activity_id = activity.activity_id, ?reason, "Activity not ingested");
            return Ok(false);
        }

        // The store enforces uniqueness, so a concurrent insert of the
        // same ID loses here instead of writing a duplicate.
        let added = self.records.insert_activity(activity).await?;
        if added {
            tracing::info!(
                activity_id = activity.activity_id,
                athlete_id = %activity.athlete_id,
                "Activity ingested"
            );
        }
        Ok(added)
    }

    /// Ingest many activities with one existence scan. Per-item storage
    /// failures are logged and skipped. Returns how many were added.
    pub async fn ingest_batch(&self, activities: &[Activity]) -> Result<usize> {
        let mut existing = self.records.list_activity_ids().await?;
        let mut added = 0;

        for activity in activities {
            if let Some(reason) = self.precheck(activity, &existing) {
                tracing::debug!(activity_id = activity.activity_id, ?reason, "Activity not ingested");
                continue;
            }

            match self.records.insert_activity(activity).await {
                Ok(true) => {
                    existing.insert(activity.activity_id);
                    added += 1;
                }
                Ok(false) => {
                    existing.insert(activity.activity_id);
                }
                Err(e) => {
                    tracing::warn!(
                        activity_id = activity.activity_id,
                        error = %e,
                        "Failed to store activity, continuing"
                    );
                }
            }
        }

        if added > 0 {
            tracing::info!(added, offered = activities.len(), "Batch ingest complete");
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::db::{MemoryStore, RecordStore};
    use crate::models::{ActivitySource, AthleteId};
    use chrono::Utc;
    use std::sync::Arc;

    fn swim(id: u64) -> Activity {
        Activity {
            activity_id: id,
            athlete_id: AthleteId::from(3u64),
            name: "Swim".to_string(),
            activity_type: "Swim".to_string(),
            distance_meters: 1000.0,
            moving_time_secs: 900,
            start_date: Utc::now(),
            visibility: "everyone".to_string(),
            source: ActivitySource::Sync,
            synced_at: Utc::now(),
        }
    }

    fn service() -> (MemoryStore, IngestService) {
        let store = MemoryStore::new();
        let ingest = IngestService::new(
            Arc::new(store.clone()),
            ActivityFilter::from_settings(&SyncSettings::default()),
        );
        (store, ingest)
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let (store, ingest) = service();

        assert!(ingest.ingest_one(&swim(10)).await.unwrap());
        assert!(!ingest.ingest_one(&swim(10)).await.unwrap());

        let stored = store.list_activities().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].activity_id, 10);
    }

    #[tokio::test]
    async fn test_filtered_activity_never_persisted() {
        let (store, ingest) = service();

        let mut run = swim(11);
        run.activity_type = "Run".to_string();
        let mut private = swim(12);
        private.visibility = "only_me".to_string();

        assert!(!ingest.ingest_one(&run).await.unwrap());
        assert!(!ingest.ingest_one(&private).await.unwrap());
        assert!(store.list_activities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_id_rejected() {
        let (store, ingest) = service();

        assert!(!ingest.ingest_one(&swim(0)).await.unwrap());
        assert!(store.list_activities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_dedups_within_and_across_calls() {
        let (store, ingest) = service();
        ingest.ingest_one(&swim(1)).await.unwrap();

        let added = ingest
            .ingest_batch(&[swim(1), swim(2), swim(2), swim(3)])
            .await
            .unwrap();

        assert_eq!(added, 2);
        assert_eq!(store.list_activities().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_ingest_stores_once() {
        let (store, ingest) = service();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ingest = ingest.clone();
                tokio::spawn(async move { ingest.ingest_one(&swim(77)).await.unwrap() })
            })
            .collect();

        let mut added = 0;
        for handle in handles {
            if handle.await.unwrap() {
                added += 1;
            }
        }

        assert_eq!(added, 1);
        assert_eq!(store.list_activities().await.unwrap().len(), 1);
    }
}
