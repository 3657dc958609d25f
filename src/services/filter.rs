// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Inclusion rules for activities.

use std::collections::HashSet;

use crate::config::SyncSettings;
use crate::models::Activity;

/// Accepts an activity only if both its type and its visibility are allowed.
#[derive(Debug, Clone)]
pub struct ActivityFilter {
    allowed_types: HashSet<String>,
    allowed_visibilities: HashSet<String>,
}

impl ActivityFilter {
    pub fn new(allowed_types: HashSet<String>, allowed_visibilities: HashSet<String>) -> Self {
        Self {
            allowed_types,
            allowed_visibilities,
        }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            settings.allowed_activity_types.clone(),
            settings.allowed_visibilities.clone(),
        )
    }

    pub fn is_allowed(&self, activity: &Activity) -> bool {
        self.allowed_types.contains(&activity.activity_type)
            && self.allowed_visibilities.contains(&activity.visibility)
    }
}
