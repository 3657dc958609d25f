// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets are injected as environment variables by the deployment
//! (Cloud Run secret bindings), so everything is read once at startup.

use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Strava REST API base URL.
pub const STRAVA_API_URL: &str = "https://www.strava.com/api/v3";

/// Strava OAuth base URL (authorize, token, deauthorize).
pub const STRAVA_OAUTH_URL: &str = "https://www.strava.com/oauth";

/// Which storage backend holds users, activities and process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", s.to_string())),
        }
    }
}

/// Tunables for the sync pipeline.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Activity types accepted by the filter (e.g. "Swim").
    pub allowed_activity_types: HashSet<String>,
    /// Visibility classes accepted by the filter (e.g. "everyone").
    pub allowed_visibilities: HashSet<String>,
    /// Minimum time between non-forced syncs of one user.
    pub update_interval_hours: i64,
    /// Lookback window for users that have synced before.
    pub default_lookback_days: i64,
    /// Lookback window for users that have never synced.
    pub initial_lookback_days: i64,
    /// Users processed per queue drain.
    pub max_users_per_queue_run: usize,
    /// Hours without a webhook before polling is re-armed.
    pub webhook_health_threshold_hours: i64,
    /// How long enqueue waits for the queue lock.
    pub enqueue_lock_wait: Duration,
    /// How long a drain waits for the queue lock before skipping.
    pub drain_lock_wait: Duration,
    /// Lease on the queue lock so a crashed holder cannot block forever.
    pub lock_lease: Duration,
    /// Timeout applied to every Strava HTTP request.
    pub request_timeout: Duration,
    /// Page size for `GET /athlete/activities`.
    pub page_size: u32,
    /// Upper bound on pages fetched per sync.
    pub max_pages: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            allowed_activity_types: parse_set("Swim"),
            allowed_visibilities: parse_set("everyone,followers_only"),
            update_interval_hours: 4,
            default_lookback_days: 3,
            initial_lookback_days: 30,
            max_users_per_queue_run: 5,
            webhook_health_threshold_hours: 24,
            enqueue_lock_wait: Duration::from_secs(15),
            drain_lock_wait: Duration::from_secs(10),
            lock_lease: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            page_size: 100,
            max_pages: 10,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava REST base URL (overridable for tests)
    pub strava_api_url: String,
    /// Strava OAuth base URL (overridable for tests)
    pub strava_oauth_url: String,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Storage backend selection
    pub storage_backend: StorageBackend,
    /// Run the in-process scheduler loops
    pub run_scheduler: bool,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Shared secret the webhook proxy sends with every event
    pub webhook_shared_secret: Option<String>,
    /// Webhook subscription verification token
    pub webhook_verify_token: String,
    /// Bearer token required on `/tasks/*`
    pub tasks_auth_token: String,
    /// HMAC key used to sign the OAuth state parameter
    pub oauth_state_key: Vec<u8>,

    // --- Sync pipeline ---
    pub sync: SyncSettings,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_api_url: STRAVA_API_URL.to_string(),
            strava_oauth_url: STRAVA_OAUTH_URL.to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            run_scheduler: false,
            strava_client_secret: "test_secret".to_string(),
            webhook_shared_secret: Some("test_shared_secret".to_string()),
            webhook_verify_token: "test_verify_token".to_string(),
            tasks_auth_token: "test_tasks_token".to_string(),
            oauth_state_key: b"test_oauth_state_key_32_bytes!!!".to_vec(),
            sync: SyncSettings {
                enqueue_lock_wait: Duration::from_millis(200),
                drain_lock_wait: Duration::ZERO,
                request_timeout: Duration::from_secs(5),
                ..SyncSettings::default()
            },
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            allowed_activity_types: env::var("ALLOWED_ACTIVITY_TYPES")
                .map(|v| parse_set(&v))
                .unwrap_or(defaults.allowed_activity_types),
            allowed_visibilities: env::var("ALLOWED_VISIBILITIES")
                .map(|v| parse_set(&v))
                .unwrap_or(defaults.allowed_visibilities),
            update_interval_hours: parse_var(
                "UPDATE_INTERVAL_HOURS",
                defaults.update_interval_hours,
            )?,
            max_users_per_queue_run: at_least_one(
                "MAX_USERS_PER_QUEUE_RUN",
                parse_var("MAX_USERS_PER_QUEUE_RUN", defaults.max_users_per_queue_run)?,
            )?,
            webhook_health_threshold_hours: parse_var(
                "WEBHOOK_HEALTH_THRESHOLD_HOURS",
                defaults.webhook_health_threshold_hours,
            )?,
            ..defaults
        };

        Ok(Self {
            // Non-sensitive config from env
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_api_url: env::var("STRAVA_API_URL")
                .unwrap_or_else(|_| STRAVA_API_URL.to_string()),
            strava_oauth_url: env::var("STRAVA_OAUTH_URL")
                .unwrap_or_else(|_| STRAVA_OAUTH_URL.to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            storage_backend: env::var("STORAGE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StorageBackend::Firestore))?,
            run_scheduler: env::var("RUN_SCHEDULER")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),

            // Secrets
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            webhook_shared_secret: env::var("WEBHOOK_SHARED_SECRET")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            webhook_verify_token: env::var("WEBHOOK_VERIFY_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_VERIFY_TOKEN"))?,
            tasks_auth_token: env::var("TASKS_AUTH_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("TASKS_AUTH_TOKEN"))?,
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
            sync,
        })
    }
}

/// Parse a comma-separated list into a set, dropping blanks.
pub fn parse_set(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// A drain limit of zero would never shrink the queue.
fn at_least_one(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value < 1 {
        return Err(ConfigError::Invalid(name, value.to_string()));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("STRAVA_CLIENT_ID", "test_id");
        env::set_var("STRAVA_CLIENT_SECRET", "test_secret");
        env::set_var("WEBHOOK_VERIFY_TOKEN", "test_verify");
        env::set_var("TASKS_AUTH_TOKEN", "tasks");
        env::set_var("OAUTH_STATE_KEY", "state_key");
        env::set_var("STORAGE_BACKEND", "memory");
        env::set_var("ALLOWED_ACTIVITY_TYPES", "Swim, Run ,");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.strava_client_id, "test_id");
        assert_eq!(config.strava_client_secret, "test_secret");
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.sync.allowed_activity_types.len(), 2);
        assert!(config.sync.allowed_activity_types.contains("Run"));
        assert_eq!(config.sync.max_users_per_queue_run, 5);
    }

    #[test]
    fn test_parse_set_trims_and_drops_blanks() {
        let set = parse_set(" everyone , ,followers_only");
        assert_eq!(set.len(), 2);
        assert!(set.contains("everyone"));
        assert!(set.contains("followers_only"));
    }

    #[test]
    fn test_zero_queue_run_limit_rejected() {
        let err = at_least_one("MAX_USERS_PER_QUEUE_RUN", 0).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("MAX_USERS_PER_QUEUE_RUN", _)));
        assert_eq!(at_least_one("MAX_USERS_PER_QUEUE_RUN", 1).unwrap(), 1);
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(
            "Firestore".parse::<StorageBackend>().unwrap(),
            StorageBackend::Firestore
        );
        assert!("sheets".parse::<StorageBackend>().is_err());
    }
}
