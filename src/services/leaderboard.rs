// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cached per-athlete totals.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::db::SharedRecordStore;
use crate::error::Result;
use crate::models::AthleteId;

/// One leaderboard row.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub athlete_id: AthleteId,
    pub display_name: String,
    pub activity_count: u64,
    pub distance_meters: f64,
    pub moving_time_secs: u64,
}

/// Lazily computed leaderboards keyed by activity type ("" = all types).
///
/// Writers call [`LeaderboardCache::invalidate`] after adding or deleting
/// activities; the next read recomputes.
#[derive(Clone)]
pub struct LeaderboardCache {
    records: SharedRecordStore,
    boards: Arc<DashMap<String, Arc<Vec<LeaderboardEntry>>>>,
    invalidations: Arc<AtomicU64>,
}

impl LeaderboardCache {
    pub fn new(records: SharedRecordStore) -> Self {
        Self {
            records,
            boards: Arc::default(),
            invalidations: Arc::default(),
        }
    }

    pub fn invalidate(&self) {
        self.boards.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Leaderboard cache invalidated");
    }

    /// How many times the cache has been invalidated.
    pub fn invalidation_count(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn is_cached(&self, activity_type: Option<&str>) -> bool {
        self.boards.contains_key(activity_type.unwrap_or_default())
    }

    /// Leaderboard sorted by distance, optionally for one activity type.
    pub async fn get(&self, activity_type: Option<&str>) -> Result<Arc<Vec<LeaderboardEntry>>> {
        let key = activity_type.unwrap_or_default().to_string();
        if let Some(board) = self.boards.get(&key) {
            return Ok(board.clone());
        }

        let board = Arc::new(self.compute(activity_type).await?);
        self.boards.insert(key, board.clone());
        Ok(board)
    }

    async fn compute(&self, activity_type: Option<&str>) -> Result<Vec<LeaderboardEntry>> {
        let names: HashMap<AthleteId, String> = self
            .records
            .list_users()
            .await?
            .into_iter()
            .map(|u| (u.athlete_id, u.display_name))
            .collect();

        let mut totals: HashMap<AthleteId, LeaderboardEntry> = HashMap::new();
        for activity in self.records.list_activities().await? {
            if activity_type.is_some_and(|t| t != activity.activity_type) {
                continue;
            }
            let entry = totals
                .entry(activity.athlete_id.clone())
                .or_insert_with(|| LeaderboardEntry {
                    display_name: names
                        .get(&activity.athlete_id)
                        .cloned()
                        .unwrap_or_default(),
                    athlete_id: activity.athlete_id.clone(),
                    activity_count: 0,
                    distance_meters: 0.0,
                    moving_time_secs: 0,
                });
            entry.activity_count += 1;
            entry.distance_meters += activity.distance_meters;
            entry.moving_time_secs += activity.moving_time_secs;
        }

        let mut board: Vec<LeaderboardEntry> = totals.into_values().collect();
        board.sort_by(|a, b| {
            b.distance_meters
                .total_cmp(&a.distance_meters)
                .then_with(|| a.athlete_id.cmp(&b.athlete_id))
        });
        Ok(board)
    }
}
