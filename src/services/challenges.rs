// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Challenge progress recompute.
//!
//! Progress is always rebuilt from stored activities, never patched
//! incrementally.

use chrono::Utc;
use serde::Serialize;

use crate::db::SharedRecordStore;
use crate::error::Result;
use crate::models::{AthleteId, Challenge, ChallengeProgress, COMMUNITY_ATHLETE_ID};

/// Outcome of a full recompute pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RecomputeReport {
    pub users: usize,
    pub failed: usize,
    pub rows_written: usize,
}

#[derive(Clone)]
pub struct ChallengeService {
    records: SharedRecordStore,
}

impl ChallengeService {
    pub fn new(records: SharedRecordStore) -> Self {
        Self { records }
    }

    /// Recompute every challenge the athlete takes part in, plus the
    /// community aggregate of any community challenge among them.
    /// Returns the number of progress rows written.
    pub async fn recompute_for_user(&self, athlete_id: &AthleteId) -> Result<usize> {
        let challenges = self.records.list_challenges().await?;
        let joined = joined_challenges(&challenges, athlete_id);
        if joined.is_empty() {
            return Ok(0);
        }

        let mut written = self.recompute_participant(athlete_id, &joined).await?;
        if joined.iter().any(|c| c.community) {
            written += self.recompute_community(&joined).await?;
        }

        tracing::debug!(athlete_id = %athlete_id, written, "Challenge progress recomputed");
        Ok(written)
    }

    /// Write the athlete's own row for each of `challenges`.
    async fn recompute_participant(
        &self,
        athlete_id: &AthleteId,
        challenges: &[&Challenge],
    ) -> Result<usize> {
        let activities = self.records.list_activities_for_athlete(athlete_id).await?;
        let mut written = 0;

        for challenge in challenges {
            let progress = ChallengeProgress {
                challenge_id: challenge.id.clone(),
                athlete_id: athlete_id.clone(),
                value: challenge.progress_for(&activities),
                updated_at: Utc::now(),
            };
            self.records.upsert_progress(&progress).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Rebuild the sentinel aggregate row for each community challenge.
    async fn recompute_community(&self, challenges: &[&Challenge]) -> Result<usize> {
        let all = self.records.list_activities().await?;
        let community_id = AthleteId::new(COMMUNITY_ATHLETE_ID);
        let mut written = 0;

        for challenge in challenges.iter().filter(|c| c.community) {
            let progress = ChallengeProgress {
                challenge_id: challenge.id.clone(),
                athlete_id: community_id.clone(),
                value: challenge.progress_for(&all),
                updated_at: Utc::now(),
            };
            self.records.upsert_progress(&progress).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Recompute for every user. One user's failure does not stop the rest.
    ///
    /// Community aggregates are rebuilt once at the end of the pass.
    pub async fn recompute_all(&self) -> Result<RecomputeReport> {
        let users = self.records.list_users().await?;
        let challenges = self.records.list_challenges().await?;
        let mut report = RecomputeReport::default();
        let mut community: Vec<&Challenge> = Vec::new();

        for user in &users {
            let joined = joined_challenges(&challenges, &user.athlete_id);
            match self.recompute_participant(&user.athlete_id, &joined).await {
                Ok(rows) => {
                    report.users += 1;
                    report.rows_written += rows;
                    for challenge in joined.into_iter().filter(|c| c.community) {
                        if !community.iter().any(|c| c.id == challenge.id) {
                            community.push(challenge);
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        athlete_id = %user.athlete_id,
                        error = %e,
                        "Challenge recompute failed for user"
                    );
                }
            }
        }

        if !community.is_empty() {
            match self.recompute_community(&community).await {
                Ok(rows) => report.rows_written += rows,
                Err(e) => tracing::warn!(error = %e, "Community aggregate recompute failed"),
            }
        }

        tracing::info!(
            users = report.users,
            failed = report.failed,
            rows = report.rows_written,
            "Challenge recompute complete"
        );
        Ok(report)
    }

    /// Progress rows for one challenge, highest first.
    pub async fn progress(&self, challenge_id: &str) -> Result<Vec<ChallengeProgress>> {
        let mut rows = self.records.list_progress(challenge_id).await?;
        rows.sort_by(|a, b| b.value.total_cmp(&a.value));
        Ok(rows)
    }
}

fn joined_challenges<'a>(challenges: &'a [Challenge], athlete_id: &AthleteId) -> Vec<&'a Challenge> {
    challenges.iter().filter(|c| c.includes(athlete_id)).collect()
}
