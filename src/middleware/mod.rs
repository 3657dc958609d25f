// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (scheduler auth, security headers).

pub mod security;
pub mod tasks_auth;

pub use tasks_auth::require_tasks_auth;
