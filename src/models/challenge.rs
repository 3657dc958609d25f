// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Club challenges and per-participant progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::{Activity, AthleteId};

/// Reserved participant ID holding the community-wide aggregate.
pub const COMMUNITY_ATHLETE_ID: &str = "COMMUNITY";

/// What a challenge sums over the activities in its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMetric {
    /// Meters
    Distance,
    /// Seconds
    MovingTime,
    /// Number of activities
    Count,
}

impl ChallengeMetric {
    /// Contribution of one activity to this metric.
    pub fn value_of(&self, activity: &Activity) -> f64 {
        match self {
            ChallengeMetric::Distance => activity.distance_meters,
            ChallengeMetric::MovingTime => activity.moving_time_secs as f64,
            ChallengeMetric::Count => 1.0,
        }
    }
}

/// A club challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge ID (also used as document ID)
    pub id: String,
    pub name: String,
    pub metric: ChallengeMetric,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Activity types that count; empty means any stored activity
    #[serde(default)]
    pub activity_types: Vec<String>,
    /// Registered participants
    #[serde(default)]
    pub participants: Vec<AthleteId>,
    /// Community challenges include every user and track an aggregate
    #[serde(default)]
    pub community: bool,
}

impl Challenge {
    /// True if the athlete's activities count toward this challenge.
    pub fn includes(&self, athlete_id: &AthleteId) -> bool {
        self.community || self.participants.contains(athlete_id)
    }

    /// True if the activity falls in the window and matches the type list.
    pub fn counts(&self, activity: &Activity) -> bool {
        activity.start_date >= self.starts_at
            && activity.start_date < self.ends_at
            && (self.activity_types.is_empty()
                || self.activity_types.contains(&activity.activity_type))
    }

    /// Sum this challenge's metric over one athlete's activities.
    pub fn progress_for(&self, activities: &[Activity]) -> f64 {
        activities
            .iter()
            .filter(|a| self.counts(a))
            .map(|a| self.metric.value_of(a))
            .sum()
    }
}

/// Recomputed progress for one (challenge, participant) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChallengeProgress {
    pub challenge_id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub athlete_id: AthleteId,
    pub value: f64,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub updated_at: DateTime<Utc>,
}

impl ChallengeProgress {
    /// Document ID for the progress row.
    pub fn doc_id(challenge_id: &str, athlete_id: &AthleteId) -> String {
        format!("{}_{}", urlencoding::encode(challenge_id), athlete_id)
    }
}
