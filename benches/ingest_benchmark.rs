// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{Duration, Utc};
use club_sync::config::SyncSettings;
use club_sync::db::{MemoryStore, RecordStore};
use club_sync::models::{Activity, ActivitySource, AthleteId};
use club_sync::services::{ActivityFilter, IngestService};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;
use std::sync::Arc;

const KINDS: [&str; 4] = ["Swim", "Run", "Ride", "Swim"];
const VISIBILITIES: [&str; 3] = ["everyone", "followers_only", "only_me"];

fn activities(count: u64) -> Vec<Activity> {
    (1..=count)
        .map(|id| Activity {
            activity_id: id,
            athlete_id: AthleteId::from(id % 40),
            name: format!("Activity {}", id),
            activity_type: KINDS[(id % 4) as usize].to_string(),
            distance_meters: 1000.0 + id as f64,
            moving_time_secs: 1200,
            start_date: Utc::now() - Duration::hours(id as i64),
            visibility: VISIBILITIES[(id % 3) as usize].to_string(),
            source: ActivitySource::Sync,
            synced_at: Utc::now(),
        })
        .collect()
}

fn benchmark_filter(c: &mut Criterion) {
    let filter = ActivityFilter::from_settings(&SyncSettings::default());
    let batch = activities(1000);

    c.bench_function("filter_1000_activities", |b| {
        b.iter(|| {
            black_box(&batch)
                .iter()
                .filter(|a| filter.is_allowed(a))
                .count()
        })
    });
}

fn benchmark_batch_ingest(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let filter = ActivityFilter::from_settings(&SyncSettings::default());
    let batch = activities(500);

    let mut group = c.benchmark_group("batch_ingest");

    group.bench_function("empty_store", |b| {
        b.iter_batched(
            || IngestService::new(Arc::new(MemoryStore::new()), filter.clone()),
            |ingest| rt.block_on(ingest.ingest_batch(black_box(&batch))),
            BatchSize::SmallInput,
        )
    });

    // Half the batch already stored: the repeat-poll case.
    group.bench_function("half_duplicates", |b| {
        b.iter_batched(
            || {
                let store = MemoryStore::new();
                rt.block_on(async {
                    for activity in batch.iter().step_by(2) {
                        store.insert_activity(activity).await.expect("seed insert");
                    }
                });
                IngestService::new(Arc::new(store), filter.clone())
            },
            |ingest| rt.block_on(ingest.ingest_batch(black_box(&batch))),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, benchmark_filter, benchmark_batch_ingest);
criterion_main!(benches);
