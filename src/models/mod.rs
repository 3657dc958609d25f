// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod challenge;
pub mod ids;
pub mod user;
pub mod webhook;

pub use activity::{Activity, ActivitySource};
pub use challenge::{Challenge, ChallengeMetric, ChallengeProgress, COMMUNITY_ATHLETE_ID};
pub use ids::AthleteId;
pub use user::User;
pub use webhook::{WebhookEnvelope, WebhookEvent};
