// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AthleteId;

/// Club member record, keyed by Strava athlete ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Strava athlete ID (also used as document ID)
    pub athlete_id: AthleteId,
    /// Name shown on leaderboards
    #[serde(default)]
    pub display_name: String,
    /// OAuth access token
    #[serde(default)]
    pub access_token: Option<String>,
    /// OAuth refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Last successful sync that added activities; None means never synced
    #[serde(default)]
    pub last_synced: Option<DateTime<Utc>>,
    /// False once the athlete revoked access on Strava
    #[serde(default = "default_authorized")]
    pub authorized: bool,
    /// When the user first connected
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_authorized() -> bool {
    true
}

impl User {
    /// New authorized user holding a fresh token pair.
    pub fn new(
        athlete_id: AthleteId,
        display_name: String,
        access_token: String,
        refresh_token: String,
        token_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            athlete_id,
            display_name,
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            token_expires_at: Some(token_expires_at),
            last_synced: None,
            authorized: true,
            created_at: Utc::now(),
        }
    }

    /// True if any token is on file.
    pub fn has_tokens(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }

    /// Drop stored credentials and mark the user unauthorized.
    pub fn revoke(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expires_at = None;
        self.authorized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sparse_row_uses_defaults() {
        let user: User = serde_json::from_value(json!({
            "athlete_id": 555.0,
            "display_name": "Sparse"
        }))
        .unwrap();

        assert_eq!(user.athlete_id.as_str(), "555");
        assert!(user.authorized);
        assert!(user.last_synced.is_none());
        assert!(!user.has_tokens());
    }

    #[test]
    fn test_revoke_clears_tokens() {
        let mut user = User::new(
            AthleteId::from(1u64),
            "A".to_string(),
            "access".to_string(),
            "refresh".to_string(),
            Utc::now(),
        );
        assert!(user.has_tokens());

        user.revoke();

        assert!(!user.has_tokens());
        assert!(!user.authorized);
        assert!(user.token_expires_at.is_none());
    }
}
