// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client and token-managing service.
//!
//! Handles:
//! - Activity listing (paginated) and single-activity fetches
//! - Token refresh when expired, persisted to the user record
//! - One refresh-and-retry when Strava answers 401
//! - OAuth code exchange for new members

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{Config, SyncSettings};
use crate::db::SharedRecordStore;
use crate::error::{AppError, Result};
use crate::models::{Activity, ActivitySource, AthleteId, User};
use crate::services::ActivityFilter;

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    api_url: String,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a client using the URLs and credentials in `config`.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_urls(
            &config.strava_api_url,
            &config.strava_oauth_url,
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
            config.sync.request_timeout,
        )
    }

    /// Create a client against explicit base URLs (tests point these at a mock server).
    pub fn with_urls(
        api_url: &str,
        oauth_url: &str,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client setup: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            oauth_url: oauth_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        })
    }

    /// URL of the Strava consent page.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&approval_prompt=auto&scope=activity:read_all&state={}",
            self.oauth_url,
            self.client_id,
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity> {
        let url = format!("{}/activities/{}", self.api_url, activity_id);
        self.get_json(&url, access_token).await
    }

    /// One page of the athlete's activities started inside `(after, before)`.
    ///
    /// Elements are returned undecoded so one bad entry cannot fail the page.
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: i64,
        before: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/athlete/activities", self.api_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("after", after.to_string()),
                ("before", before.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response_json(response).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenRefreshResponse> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token refresh request failed: {}", e)))?;

        check_response_json(response).await
    }

    /// Exchange an OAuth authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse> {
        let response = self
            .http
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::StravaApi(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Strava token exchange failed");
            return Err(AppError::StravaApi(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("Failed to parse token response: {}", e)))
    }

    /// Get authenticated athlete profile.
    pub async fn get_athlete(&self, access_token: &str) -> Result<StravaAthlete> {
        let url = format!("{}/athlete", self.api_url);
        self.get_json(&url, access_token).await
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        check_response_json(response).await
    }
}

/// Check response status and parse the JSON body.
///
/// 401 becomes [`AppError::STRAVA_TOKEN_ERROR`], 429 becomes
/// [`AppError::STRAVA_RATE_LIMIT`]; anything else non-2xx keeps the status
/// and body in the message.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("Strava rate limit hit (429)");
            return Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()));
        }

        if status.as_u16() == 401 {
            return Err(AppError::StravaApi(AppError::STRAVA_TOKEN_ERROR.to_string()));
        }

        return Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
}

/// Decode one listed activity, logging a malformed entry instead of failing.
fn decode_activity(athlete_id: &AthleteId, entry: serde_json::Value) -> Option<StravaActivity> {
    let activity_id = entry.get("id").cloned().unwrap_or_default();
    match serde_json::from_value(entry) {
        Ok(activity) => Some(activity),
        Err(e) => {
            let err = AppError::DataCorruption(format!("activity {}: {}", activity_id, e));
            tracing::error!(athlete_id = %athlete_id, error = %err, "Skipping malformed Strava activity");
            None
        }
    }
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Token exchange response from Strava OAuth (includes athlete info).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub athlete: StravaAthlete,
}

/// Athlete profile.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
}

impl StravaAthlete {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
            .trim()
            .to_string()
    }
}

/// Owner reference nested inside an activity.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthleteRef {
    pub id: u64,
}

/// Activity as returned by both the list and detail endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    /// Missing IDs decode as 0 and are rejected at ingest.
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub sport_type: Option<String>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub moving_time: u64,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub athlete: Option<StravaAthleteRef>,
}

impl StravaActivity {
    /// Flatten into a stored record. The nested owner wins over `fallback_owner`.
    pub fn into_activity(self, fallback_owner: &AthleteId, source: ActivitySource) -> Activity {
        let athlete_id = self
            .athlete
            .map(|a| AthleteId::from(a.id))
            .unwrap_or_else(|| fallback_owner.clone());

        Activity {
            activity_id: self.id,
            athlete_id,
            name: self.name,
            activity_type: self.activity_type.or(self.sport_type).unwrap_or_default(),
            distance_meters: self.distance.max(0.0),
            moving_time_secs: self.moving_time,
            start_date: self.start_date,
            visibility: self.visibility.unwrap_or_default(),
            source,
            synced_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StravaService - High-level service with token management
// ─────────────────────────────────────────────────────────────────────────────

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub type TokenCache = Arc<DashMap<AthleteId, CachedToken>>;

pub type RefreshLocks = Arc<DashMap<AthleteId, Arc<Mutex<()>>>>;

/// A freshly refreshed access token.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of handling OAuth callback.
#[derive(Debug, Clone)]
pub struct OAuthResult {
    pub athlete_id: AthleteId,
    pub display_name: String,
    /// True the first time this athlete connects
    pub is_new: bool,
}

/// Strava access on behalf of club members.
///
/// Tokens live on the user record. Valid access tokens are cached in
/// memory; refreshes are serialized per user.
#[derive(Clone)]
pub struct StravaService {
    client: StravaClient,
    records: SharedRecordStore,
    filter: ActivityFilter,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
    page_size: u32,
    max_pages: u32,
}

impl StravaService {
    pub fn new(
        client: StravaClient,
        records: SharedRecordStore,
        filter: ActivityFilter,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            client,
            records,
            filter,
            token_cache: TokenCache::default(),
            refresh_locks: RefreshLocks::default(),
            page_size: settings.page_size,
            max_pages: settings.max_pages,
        }
    }

    pub fn client(&self) -> &StravaClient {
        &self.client
    }

    // ─── Token Management ────────────────────────────────────────────────────

    fn refresh_lock(&self, athlete_id: &AthleteId) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(athlete_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn cached_token(&self, athlete_id: &AthleteId) -> Option<String> {
        let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        self.token_cache
            .get(athlete_id)
            .filter(|cached| Utc::now() + margin < cached.expires_at)
            .map(|cached| cached.access_token.clone())
    }

    fn cache_token(&self, athlete_id: &AthleteId, access_token: &str, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            athlete_id.clone(),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }

    /// Drop any cached access token for `athlete_id`.
    pub fn invalidate_cached_token(&self, athlete_id: &AthleteId) {
        self.token_cache.remove(athlete_id);
    }

    /// True if the user exists, is authorized, and has credentials on file.
    pub async fn has_token(&self, athlete_id: &AthleteId) -> Result<bool> {
        Ok(self
            .records
            .get_user(athlete_id)
            .await?
            .is_some_and(|u| u.authorized && u.has_tokens()))
    }

    /// Get a valid (non-expiring) access token, refreshing if the stored one
    /// is missing or within 5 minutes of expiry.
    pub async fn get_valid_access_token(&self, athlete_id: &AthleteId) -> Result<String> {
        if let Some(token) = self.cached_token(athlete_id) {
            return Ok(token);
        }

        let lock = self.refresh_lock(athlete_id);
        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        if let Some(token) = self.cached_token(athlete_id) {
            return Ok(token);
        }

        let user = self.load_authorized_user(athlete_id).await?;

        let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if let (Some(token), Some(expires_at)) = (&user.access_token, user.token_expires_at) {
            if Utc::now() + margin < expires_at {
                self.cache_token(athlete_id, token, expires_at);
                return Ok(token.clone());
            }
        }

        tracing::info!(athlete_id = %athlete_id, "Access token missing or expiring, refreshing");
        Ok(self.refresh_locked(user).await?.access_token)
    }

    /// Exchange the stored refresh token for a new pair and persist it.
    pub async fn refresh_access_token(&self, athlete_id: &AthleteId) -> Result<RefreshedToken> {
        let lock = self.refresh_lock(athlete_id);
        let _guard = lock.lock().await;

        let user = self.load_authorized_user(athlete_id).await?;
        self.refresh_locked(user).await
    }

    async fn load_authorized_user(&self, athlete_id: &AthleteId) -> Result<User> {
        let user = self
            .records
            .get_user(athlete_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", athlete_id)))?;

        if !user.authorized || !user.has_tokens() {
            tracing::warn!(athlete_id = %athlete_id, "No usable Strava credentials on file");
            return Err(AppError::Unauthorized);
        }
        Ok(user)
    }

    /// Refresh with the caller holding the user's refresh lock.
    async fn refresh_locked(&self, mut user: User) -> Result<RefreshedToken> {
        let athlete_id = user.athlete_id.clone();
        let Some(refresh_token) = user.refresh_token.clone() else {
            tracing::warn!(athlete_id = %athlete_id, "No refresh token on file");
            return Err(AppError::Unauthorized);
        };

        let new_tokens = match self.client.refresh_token(&refresh_token).await {
            Ok(t) => t,
            Err(e) if e.is_strava_token_error() => {
                // Another instance may have rotated the refresh token already.
                if let Some(winner) = self.tokens_rotated_elsewhere(&athlete_id, &refresh_token).await? {
                    tracing::info!(athlete_id = %athlete_id, "Refresh race lost, using stored tokens");
                    return Ok(winner);
                }
                tracing::warn!(athlete_id = %athlete_id, error = %e, "Token refresh rejected");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(athlete_id = %athlete_id, error = %e, "Token refresh failed");
                return Err(e);
            }
        };

        let expires_at = DateTime::from_timestamp(new_tokens.expires_at, 0).unwrap_or_default();

        // Re-read so a concurrent last_synced update is not overwritten.
        if let Some(latest) = self.records.get_user(&athlete_id).await? {
            user = latest;
        }
        user.access_token = Some(new_tokens.access_token.clone());
        user.refresh_token = Some(new_tokens.refresh_token);
        user.token_expires_at = Some(expires_at);
        self.records.upsert_user(&user).await?;

        self.cache_token(&athlete_id, &new_tokens.access_token, expires_at);

        tracing::info!(athlete_id = %athlete_id, "Token refreshed and stored");
        Ok(RefreshedToken {
            access_token: new_tokens.access_token,
            expires_at,
        })
    }

    async fn tokens_rotated_elsewhere(
        &self,
        athlete_id: &AthleteId,
        stale_refresh_token: &str,
    ) -> Result<Option<RefreshedToken>> {
        let Some(user) = self.records.get_user(athlete_id).await? else {
            return Ok(None);
        };

        match (user.refresh_token.as_deref(), user.access_token, user.token_expires_at) {
            (Some(current), Some(access_token), Some(expires_at))
                if current != stale_refresh_token && expires_at > Utc::now() =>
            {
                self.cache_token(athlete_id, &access_token, expires_at);
                Ok(Some(RefreshedToken {
                    access_token,
                    expires_at,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Run `call` with a valid token. If Strava rejects the token, refresh
    /// once and retry once; a second rejection is returned as-is.
    async fn with_token_retry<T, F, Fut>(&self, athlete_id: &AthleteId, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self.get_valid_access_token(athlete_id).await?;

        match call(token).await {
            Err(e) if e.is_strava_token_error() => {
                tracing::info!(athlete_id = %athlete_id, "Strava rejected access token, refreshing once");
                self.invalidate_cached_token(athlete_id);
                let refreshed = self.refresh_access_token(athlete_id).await?;
                call(refreshed.access_token).await
            }
            other => other,
        }
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// Allowed activities the athlete started inside `(after, before)`.
    ///
    /// The token is refreshed at most once per call, however many pages a
    /// rejection shows up on. Malformed entries are logged and skipped.
    pub async fn fetch_athlete_activities(
        &self,
        athlete_id: &AthleteId,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        let mut token = self.get_valid_access_token(athlete_id).await?;
        let mut refreshed = false;
        let mut fetched = Vec::new();
        let mut skipped = 0usize;

        for page in 1..=self.max_pages {
            let raw = loop {
                match self
                    .client
                    .list_activities(
                        &token,
                        after.timestamp(),
                        before.timestamp(),
                        page,
                        self.page_size,
                    )
                    .await
                {
                    Err(e) if e.is_strava_token_error() && !refreshed => {
                        tracing::info!(athlete_id = %athlete_id, page, "Strava rejected access token, refreshing once");
                        self.invalidate_cached_token(athlete_id);
                        token = self.refresh_access_token(athlete_id).await?.access_token;
                        refreshed = true;
                    }
                    other => break other?,
                }
            };

            let done = raw.len() < self.page_size as usize;
            for entry in raw {
                match decode_activity(athlete_id, entry) {
                    Some(activity) => fetched.push(activity),
                    None => skipped += 1,
                }
            }
            if done {
                break;
            }
        }

        let total = fetched.len();
        let allowed: Vec<Activity> = fetched
            .into_iter()
            .map(|a| a.into_activity(athlete_id, ActivitySource::Sync))
            .filter(|a| self.filter.is_allowed(a))
            .collect();

        tracing::debug!(
            athlete_id = %athlete_id,
            total,
            skipped,
            allowed = allowed.len(),
            "Fetched athlete activities"
        );
        Ok(allowed)
    }

    /// Fetch one activity. Not filtered; ingest applies the rules.
    pub async fn fetch_activity_by_id(
        &self,
        activity_id: u64,
        athlete_id: &AthleteId,
    ) -> Result<Activity> {
        let activity = self
            .with_token_retry(athlete_id, |token| async move {
                self.client.get_activity(&token, activity_id).await
            })
            .await?;

        Ok(activity.into_activity(athlete_id, ActivitySource::Webhook))
    }

    /// Clear the user's stored tokens and mark them unauthorized.
    ///
    /// Returns false if the user is unknown.
    pub async fn revoke_local_tokens(&self, athlete_id: &AthleteId) -> Result<bool> {
        let lock = self.refresh_lock(athlete_id);
        let _guard = lock.lock().await;

        let Some(mut user) = self.records.get_user(athlete_id).await? else {
            return Ok(false);
        };

        user.revoke();
        self.records.upsert_user(&user).await?;
        self.invalidate_cached_token(athlete_id);

        tracing::info!(athlete_id = %athlete_id, "Local tokens revoked");
        Ok(true)
    }

    // ─── OAuth Callback Handling ─────────────────────────────────────────────

    /// Exchange the code and create or update the member's record.
    pub async fn handle_oauth_callback(&self, code: &str) -> Result<OAuthResult> {
        let response = self.client.exchange_code(code).await?;

        // Exchange responses carry a summary athlete; fetch the profile if it has no name.
        let mut athlete = response.athlete;
        if athlete.display_name().is_empty() {
            match self.client.get_athlete(&response.access_token).await {
                Ok(profile) => athlete = profile,
                Err(e) => {
                    tracing::warn!(athlete_id = athlete.id, error = %e, "Failed to fetch athlete profile");
                }
            }
        }

        let athlete_id = AthleteId::from(athlete.id);
        let display_name = athlete.display_name();
        let expires_at = DateTime::from_timestamp(response.expires_at, 0).unwrap_or_default();

        let lock = self.refresh_lock(&athlete_id);
        let _guard = lock.lock().await;

        let existing = self.records.get_user(&athlete_id).await?;
        let is_new = existing.is_none();

        let user = match existing {
            Some(mut user) => {
                user.display_name = display_name.clone();
                user.access_token = Some(response.access_token.clone());
                user.refresh_token = Some(response.refresh_token);
                user.token_expires_at = Some(expires_at);
                user.authorized = true;
                user
            }
            None => User::new(
                athlete_id.clone(),
                display_name.clone(),
                response.access_token.clone(),
                response.refresh_token,
                expires_at,
            ),
        };

        self.records.upsert_user(&user).await?;
        self.cache_token(&athlete_id, &response.access_token, expires_at);

        tracing::info!(
            athlete_id = %athlete_id,
            is_new,
            "OAuth callback handled, user and tokens stored"
        );

        Ok(OAuthResult {
            athlete_id,
            display_name,
            is_new,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_flattens_nested_owner() {
        let raw: StravaActivity = serde_json::from_value(json!({
            "id": 12345,
            "name": "Lap swim",
            "type": "Swim",
            "sport_type": "Swim",
            "distance": 1500.5,
            "moving_time": 1800,
            "start_date": "2026-03-01T07:00:00Z",
            "visibility": "everyone",
            "athlete": {"id": 99, "resource_state": 1}
        }))
        .unwrap();

        let activity = raw.into_activity(&AthleteId::from(1u64), ActivitySource::Sync);

        assert_eq!(activity.activity_id, 12345);
        assert_eq!(activity.athlete_id.as_str(), "99");
        assert_eq!(activity.activity_type, "Swim");
        assert_eq!(activity.moving_time_secs, 1800);
    }

    #[test]
    fn test_activity_falls_back_to_sport_type_and_owner() {
        let raw: StravaActivity = serde_json::from_value(json!({
            "id": 1,
            "sport_type": "OpenWaterSwim",
            "distance": -3.0,
            "start_date": "2026-03-01T07:00:00Z"
        }))
        .unwrap();

        let activity = raw.into_activity(&AthleteId::from(7u64), ActivitySource::Webhook);

        assert_eq!(activity.athlete_id.as_str(), "7");
        assert_eq!(activity.activity_type, "OpenWaterSwim");
        assert_eq!(activity.distance_meters, 0.0);
        assert_eq!(activity.visibility, "");
    }

    #[test]
    fn test_authorize_url_encodes_state() {
        let client = StravaClient::with_urls(
            "https://api.example/v3/",
            "https://oauth.example",
            "123".to_string(),
            "secret".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();

        let url = client.authorize_url("https://app.example/cb", "a.b+c");

        assert!(url.starts_with("https://oauth.example/authorize?client_id=123"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example%2Fcb"));
        assert!(url.contains("state=a.b%2Bc"));
    }
}
