// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for webhook handling.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use club_sync::config::Config;
use club_sync::db::RecordStore;
use club_sync::models::AthleteId;
use club_sync::routes::create_router;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

async fn post_webhook(app: axum::Router, body: serde_json::Value) -> (StatusCode, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn activity_event(aspect: &str, owner: u64, object_id: u64, secret: &str) -> serde_json::Value {
    json!({
        "secret": secret,
        "strava_payload": {
            "object_type": "activity",
            "aspect_type": aspect,
            "owner_id": owner,
            "object_id": object_id,
            "event_time": 1_780_000_000
        }
    })
}

// ─── Subscription handshake ──────────────────────────────────

#[tokio::test]
async fn test_webhook_verification() {
    let (app, _, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe&hub.challenge=abc123&hub.verify_token=test_verify_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["hub.challenge"], "abc123");
}

#[tokio::test]
async fn test_webhook_verification_wrong_token() {
    let (app, _, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe&hub.challenge=abc123&hub.verify_token=nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ─── Authentication ──────────────────────────────────────────

#[tokio::test]
async fn test_wrong_secret_has_no_side_effects() {
    let (app, state, store) = common::create_test_app();
    store.insert_activity(&common::swim(42, "7")).await.unwrap();

    let (status, text) = post_webhook(app, activity_event("delete", 7, 42, "wrong")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Authentication Failed");
    assert_eq!(store.list_activities().await.unwrap().len(), 1);
    assert!(state.webhook.last_received().await.unwrap().is_none());
    assert_eq!(state.leaderboard.invalidation_count(), 0);
}

#[tokio::test]
async fn test_missing_secret_config_is_server_error() {
    let config = Config {
        webhook_shared_secret: None,
        ..Config::test_default()
    };
    let (state, store) = common::test_state_with("http://127.0.0.1:9", config);
    store.insert_activity(&common::swim(42, "7")).await.unwrap();

    let (status, _) = post_webhook(
        create_router(state),
        activity_event("delete", 7, 42, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.list_activities().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_envelope_is_acknowledged_with_error() {
    let (app, _, _) = common::create_test_app();

    let (status, text) = post_webhook(app, json!({"secret": "x", "strava_payload": {}})).await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.starts_with("Error processing request: "), "{}", text);
}

#[tokio::test]
async fn test_non_json_body_is_acknowledged_with_error() {
    let (app, state, _) = common::create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "text/plain")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("Error processing request: "), "{}", text);
    assert!(state.health.check_health().await.unwrap().last_webhook_at.is_none());
}

// ─── Activity events ─────────────────────────────────────────

#[tokio::test]
async fn test_delete_removes_activity_and_invalidates() {
    let (app, state, store) = common::create_test_app();
    store.insert_activity(&common::swim(42, "7")).await.unwrap();
    store.insert_activity(&common::swim(43, "7")).await.unwrap();

    let (status, text) = post_webhook(
        app,
        activity_event("delete", 7, 42, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Success");
    let remaining: Vec<u64> = store
        .list_activities()
        .await
        .unwrap()
        .iter()
        .map(|a| a.activity_id)
        .collect();
    assert_eq!(remaining, vec![43]);
    assert_eq!(state.leaderboard.invalidation_count(), 1);
    assert!(state.webhook.last_received().await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_unknown_activity_still_succeeds() {
    let (app, _, _) = common::create_test_app();

    let (_, text) = post_webhook(
        app,
        activity_event("delete", 7, 999, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(text, "Success");
}

#[tokio::test]
async fn test_create_ingests_and_disarms_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/activities/77"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::strava_activity(77, "Swim", "everyone")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (state, store) = common::test_state(&server.uri());
    common::seed_user(&store, "7").await;
    state.queue.arm_schedule().await.unwrap();

    let (_, text) = post_webhook(
        create_router(state.clone()),
        activity_event("create", 7, 77, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(text, "Success");
    let stored = store.list_activities().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].activity_id, 77);
    assert!(!state.queue.is_armed().await.unwrap());

    let user = store.get_user(&AthleteId::new("7")).await.unwrap().unwrap();
    assert!(user.last_synced.is_some());
}

#[tokio::test]
async fn test_create_for_filtered_activity_keeps_polling_armed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/activities/78"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::strava_activity(78, "Ride", "everyone")),
        )
        .mount(&server)
        .await;

    let (state, store) = common::test_state(&server.uri());
    common::seed_user(&store, "7").await;
    state.queue.arm_schedule().await.unwrap();

    let (_, text) = post_webhook(
        create_router(state.clone()),
        activity_event("create", 7, 78, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(text, "Success");
    assert!(store.list_activities().await.unwrap().is_empty());
    assert!(state.queue.is_armed().await.unwrap());
}

#[tokio::test]
async fn test_create_without_token_is_aborted() {
    let (app, _, store) = common::create_test_app();

    let (_, text) = post_webhook(
        app,
        activity_event("create", 7, 77, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(text, "Success");
    assert!(store.list_activities().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_replaces_stored_record() {
    let server = MockServer::start().await;
    let mut renamed = common::strava_activity(55, "Swim", "everyone");
    renamed["name"] = json!("Renamed swim");
    Mock::given(method("GET"))
        .and(path("/activities/55"))
        .respond_with(ResponseTemplate::new(200).set_body_json(renamed))
        .mount(&server)
        .await;

    let (state, store) = common::test_state(&server.uri());
    common::seed_user(&store, "7").await;
    store.insert_activity(&common::swim(55, "7")).await.unwrap();

    let (_, text) = post_webhook(
        create_router(state),
        activity_event("update", 7, 55, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(text, "Success");
    let stored = store.list_activities().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "Renamed swim");
}

#[tokio::test]
async fn test_update_to_private_removes_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/activities/55"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::strava_activity(55, "Swim", "only_me")),
        )
        .mount(&server)
        .await;

    let (state, store) = common::test_state(&server.uri());
    common::seed_user(&store, "7").await;
    store.insert_activity(&common::swim(55, "7")).await.unwrap();

    post_webhook(
        create_router(state.clone()),
        activity_event("update", 7, 55, common::SHARED_SECRET),
    )
    .await;

    assert!(store.list_activities().await.unwrap().is_empty());
    assert_eq!(state.leaderboard.invalidation_count(), 1);
}

#[tokio::test]
async fn test_update_with_failed_fetch_keeps_old_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/activities/55"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (state, store) = common::test_state(&server.uri());
    common::seed_user(&store, "7").await;
    store.insert_activity(&common::swim(55, "7")).await.unwrap();

    let (_, text) = post_webhook(
        create_router(state),
        activity_event("update", 7, 55, common::SHARED_SECRET),
    )
    .await;

    assert_eq!(text, "Success");
    assert_eq!(store.list_activities().await.unwrap().len(), 1);
}

// ─── Athlete events ──────────────────────────────────────────

#[tokio::test]
async fn test_deauthorization_revokes_tokens() {
    let (app, _, store) = common::create_test_app();
    common::seed_user(&store, "7").await;

    let (_, text) = post_webhook(
        app,
        json!({
            "secret": common::SHARED_SECRET,
            "strava_payload": {
                "object_type": "athlete",
                "aspect_type": "update",
                "owner_id": 7,
                "object_id": 7,
                "updates": {"authorized": "false"}
            }
        }),
    )
    .await;

    assert_eq!(text, "Success");
    let user = store.get_user(&AthleteId::new("7")).await.unwrap().unwrap();
    assert!(!user.authorized);
    assert!(!user.has_tokens());
}
