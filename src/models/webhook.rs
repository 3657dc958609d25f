// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inbound push-notification payloads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::ids::lenient_u64;
use crate::models::AthleteId;

/// Body the webhook proxy forwards: the shared secret plus Strava's event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub secret: String,
    pub strava_payload: WebhookEvent,
}

/// Strava webhook event payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookEvent {
    pub object_type: String, // "activity" or "athlete"
    pub aspect_type: String, // "create", "update", "delete"
    pub owner_id: AthleteId,
    #[serde(deserialize_with = "lenient_u64")]
    pub object_id: u64,
    /// For athlete events, contains {"authorized": "false"} on deauthorization
    #[serde(default)]
    pub updates: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub subscription_id: Option<u64>,
    #[serde(default)]
    pub event_time: Option<i64>,
}

impl WebhookEvent {
    /// Check if this event represents an athlete deauthorization.
    /// Strava sends: object_type="athlete", aspect_type="update", updates={"authorized": "false"}
    pub fn is_deauthorization(&self) -> bool {
        self.object_type == "athlete"
            && self.aspect_type == "update"
            && self
                .updates
                .as_ref()
                .and_then(|u| u.get("authorized"))
                .is_some_and(|v| v.as_bool() == Some(false) || v.as_str() == Some("false"))
    }
}
