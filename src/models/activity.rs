// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Strava activity model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ids::lenient_u64;
use crate::models::AthleteId;

/// Which trigger stored an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    /// Pulled by the sync orchestrator (manual sync or queue drain)
    Sync,
    /// Delivered by a push notification
    Webhook,
}

/// Stored activity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Strava activity ID (also used as document ID)
    #[serde(deserialize_with = "lenient_u64")]
    pub activity_id: u64,
    /// Strava athlete ID (owner)
    pub athlete_id: AthleteId,
    /// Activity name/title
    #[serde(default)]
    pub name: String,
    /// Activity type (Swim, Run, Ride, ...)
    #[serde(rename = "type")]
    pub activity_type: String,
    /// Distance in meters
    #[serde(default)]
    pub distance_meters: f64,
    /// Moving time in seconds
    #[serde(default)]
    pub moving_time_secs: u64,
    /// Start date/time
    pub start_date: DateTime<Utc>,
    /// Strava visibility ("everyone", "followers_only", "only_me")
    pub visibility: String,
    /// Which trigger stored this record
    pub source: ActivitySource,
    /// When this record was written
    pub synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_with_float_ids_parses() {
        let activity: Activity = serde_json::from_value(json!({
            "activity_id": 1001.0,
            "athlete_id": "77.0",
            "name": "Morning Swim",
            "type": "Swim",
            "distance_meters": 1500.0,
            "moving_time_secs": 1800,
            "start_date": "2026-01-05T07:00:00Z",
            "visibility": "everyone",
            "source": "webhook",
            "synced_at": "2026-01-05T09:00:00Z"
        }))
        .unwrap();

        assert_eq!(activity.activity_id, 1001);
        assert_eq!(activity.athlete_id.as_str(), "77");
        assert_eq!(activity.source, ActivitySource::Webhook);
    }

    #[test]
    fn test_row_missing_type_is_rejected() {
        let result = serde_json::from_value::<Activity>(json!({
            "activity_id": 1,
            "athlete_id": "1",
            "start_date": "2026-01-05T07:00:00Z",
            "visibility": "everyone",
            "source": "sync",
            "synced_at": "2026-01-05T09:00:00Z"
        }));
        assert!(result.is_err());
    }
}
