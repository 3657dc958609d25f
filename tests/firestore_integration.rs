// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore backend tests.
//!
//! These tests require the Firestore emulator (FIRESTORE_EMULATOR_HOST)
//! and are skipped without it.

use club_sync::db::{FirestoreDb, RecordStore, StateStore};
use club_sync::models::AthleteId;
use serde_json::json;
use std::time::Duration;

mod common;

/// Skip the test when no emulator is configured.
macro_rules! require_emulator {
    () => {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_err() {
            eprintln!("Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique numeric ID for test isolation.
fn unique_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
        % 1_000_000_000_000
}

#[tokio::test]
async fn test_user_round_trip() {
    require_emulator!();
    let db = test_db().await;
    let id = unique_id().to_string();

    assert!(db.get_user(&AthleteId::new(&id)).await.unwrap().is_none());

    let user = common::user(&id);
    db.upsert_user(&user).await.unwrap();

    let loaded = db.get_user(&AthleteId::new(&id)).await.unwrap().unwrap();
    assert_eq!(loaded.display_name, user.display_name);
    assert_eq!(loaded.refresh_token, user.refresh_token);
}

#[tokio::test]
async fn test_activity_insert_is_unique() {
    require_emulator!();
    let db = test_db().await;
    let activity = common::swim(unique_id(), "7");

    assert!(db.insert_activity(&activity).await.unwrap());
    assert!(!db.insert_activity(&activity).await.unwrap());
    assert!(db
        .list_activity_ids()
        .await
        .unwrap()
        .contains(&activity.activity_id));

    assert!(db.delete_activity(activity.activity_id).await.unwrap());
    assert!(!db.delete_activity(activity.activity_id).await.unwrap());
}

#[tokio::test]
async fn test_state_values() {
    require_emulator!();
    let db = test_db().await;
    let key = format!("test_key_{}", unique_id());

    db.set_value(&key, json!(["1", "2"])).await.unwrap();
    assert_eq!(db.get_value(&key).await.unwrap(), Some(json!(["1", "2"])));

    db.delete_value(&key).await.unwrap();
    assert_eq!(db.get_value(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_lock_lease() {
    require_emulator!();
    let db = test_db().await;
    let name = format!("test_lock_{}", unique_id());
    let lease = Duration::from_secs(60);

    assert!(db.try_acquire_lock(&name, "a", lease).await.unwrap());
    assert!(!db.try_acquire_lock(&name, "b", lease).await.unwrap());

    db.release_lock(&name, "b").await.unwrap();
    assert!(!db.try_acquire_lock(&name, "b", lease).await.unwrap());

    db.release_lock(&name, "a").await.unwrap();
    assert!(db.try_acquire_lock(&name, "b", lease).await.unwrap());
}
