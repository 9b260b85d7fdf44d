// crates/tvws-core/tests/cache.rs
// ============================================================================
// Module: Incumbent Cache Tests
// Description: Refresh, first-load, timeout, and staleness behavior.
// ============================================================================
//! ## Overview
//! Drives [`CacheManager`] with a manual clock and an instrumented store to
//! check idempotent refresh, snapshot atomicity, single first loads, sync
//! status short-circuits, fetch timeouts, and the fail-closed age horizon.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Barrier;
use std::time::Duration;

use common::InstrumentedStore;
use common::RecordingSink;
use common::T0;
use common::manager;
use common::seed;
use common::tv_station;
use common::us_polygon;
use common::us_region;
use tvws_core::Authority;
use tvws_core::CacheError;
use tvws_core::CacheEventKind;
use tvws_core::CacheKey;
use tvws_core::CacheSettings;
use tvws_core::CacheState;
use tvws_core::DatasetKind;
use tvws_core::GeoPoint;
use tvws_core::IncumbentKind;
use tvws_core::IncumbentRecord;
use tvws_core::IncumbentStoreExt;
use tvws_core::RefreshOutcome;
use tvws_core::SharedIncumbentStore;
use tvws_core::SkipReason;
use tvws_core::StaticIntervals;
use tvws_core::StoreEntity;
use tvws_core::SyncStatus;
use tvws_core::Timestamp;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const TV_KEY: CacheKey =
    CacheKey::Incumbents { authority: Authority::Fcc, dataset: DatasetKind::TvEngineeringData };

fn stations(prefix: &str, count: u32) -> Vec<IncumbentRecord> {
    (0 .. count)
        .map(|index| {
            tv_station(&format!("{prefix}{index}"), 10 + index, GeoPoint::new(40.0, -75.0), None)
        })
        .collect()
}

fn seeded_store(records: &[IncumbentRecord]) -> InstrumentedStore {
    let store = InstrumentedStore::new();
    seed(&store.inner, records);
    store.inner.insert_or_replace(&us_polygon()).unwrap();
    store
}

fn tv_status(modified: Timestamp, needs_update: bool) -> SyncStatus {
    SyncStatus {
        scope: "fcc".to_string(),
        dataset: "tv_engineering_data".to_string(),
        last_modified: modified,
        needs_update,
    }
}

// ============================================================================
// SECTION: Startup and First Load
// ============================================================================

#[test]
fn download_all_loads_every_dataset() {
    let store = seeded_store(&stations("a", 3));
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData, DatasetKind::LpAux],
        CacheSettings::default(),
    );
    let report = cache.download_all();
    assert!(report.is_complete(), "{report:?}");
    assert_eq!(report.loaded.len(), 3);
    let snapshot = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(cache.region_polygons().unwrap().polygon_count(), 1);
}

#[test]
fn download_all_failure_leaves_cache_empty() {
    let store = seeded_store(&stations("a", 2));
    store.set_unavailable(true);
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    let report = cache.download_all();
    assert_eq!(report.failed.len(), 2);
    let status = cache.status();
    assert!(status.iter().all(|entry| entry.state == CacheState::Empty));
}

#[test]
fn concurrent_first_reads_load_exactly_once() {
    let store = seeded_store(&stations("a", 4));
    store.set_delay(Duration::from_millis(50));
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    let cache = Arc::new(cache);
    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0 .. 8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                cache
                    .get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData)
                    .map(|snapshot| snapshot.len())
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), 4);
    }
    assert_eq!(store.partition_calls(IncumbentRecord::TABLE), 1);
}

#[test]
fn unknown_dataset_is_rejected() {
    let store = seeded_store(&[]);
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    let err = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::Pmse).unwrap_err();
    assert!(matches!(err, CacheError::UnknownDataset(_)));
    let err = cache.refresh(CacheKey::Incumbents {
        authority: Authority::Ofcom,
        dataset: DatasetKind::TvEngineeringData,
    });
    assert!(matches!(err, Err(CacheError::UnknownDataset(_))));
}

// ============================================================================
// SECTION: Refresh Semantics
// ============================================================================

#[test]
fn repeated_refresh_without_change_keeps_snapshot_pointer() {
    let store = seeded_store(&stations("a", 3));
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    assert!(cache.download_all().is_complete());
    let before = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).unwrap();

    assert_eq!(cache.refresh(TV_KEY).unwrap(), RefreshOutcome::Unchanged { records: 3 });
    assert_eq!(cache.refresh(TV_KEY).unwrap(), RefreshOutcome::Unchanged { records: 3 });

    let after = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(*before, *after);
}

#[test]
fn refresh_publishes_changed_data() {
    let store = seeded_store(&stations("a", 2));
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    cache.download_all();
    seed(&store.inner, &stations("b", 2));
    let outcome = cache.refresh(TV_KEY).unwrap();
    assert_eq!(outcome, RefreshOutcome::Reloaded { records: 4, dropped: 0 });
}

#[test]
fn sync_status_short_circuits_fetch() {
    let store = seeded_store(&stations("a", 2));
    store.inner.insert_or_replace(&tv_status(Timestamp::from_unix_millis(10), false)).unwrap();
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    cache.download_all();
    let fetches = store.partition_calls(IncumbentRecord::TABLE);

    let outcome = cache.refresh(TV_KEY).unwrap();
    assert_eq!(outcome, RefreshOutcome::Skipped { reason: SkipReason::NotModified });
    assert_eq!(store.partition_calls(IncumbentRecord::TABLE), fetches);

    seed(&store.inner, &stations("b", 1));
    store.inner.insert_or_replace(&tv_status(Timestamp::from_unix_millis(20), false)).unwrap();
    let outcome = cache.refresh(TV_KEY).unwrap();
    assert_eq!(outcome, RefreshOutcome::Reloaded { records: 3, dropped: 0 });
}

#[test]
fn needs_update_flag_forces_fetch_but_keeps_equal_snapshot() {
    let store = seeded_store(&stations("a", 2));
    store.inner.insert_or_replace(&tv_status(Timestamp::from_unix_millis(10), true)).unwrap();
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    cache.download_all();
    let before = store.partition_calls(IncumbentRecord::TABLE);
    let outcome = cache.refresh(TV_KEY).unwrap();
    assert_eq!(outcome, RefreshOutcome::Unchanged { records: 2 });
    assert_eq!(store.partition_calls(IncumbentRecord::TABLE), before + 1);
    let status: SyncStatus = store.inner.fetch_entity("fcc", "tv_engineering_data").unwrap().unwrap();
    assert!(status.needs_update);
}

#[test]
fn invalid_records_are_dropped_and_counted() {
    let bad_channel = tv_station("bad", 90, GeoPoint::new(40.0, -75.0), None);
    let mut bad_location = tv_station("worse", 20, GeoPoint::new(40.0, -75.0), None);
    bad_location.location = GeoPoint::new(120.0, 0.0);
    let mut records = stations("a", 2);
    records.push(bad_channel);
    records.push(bad_location);
    let store = seeded_store(&records);
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    let outcome = cache.refresh(TV_KEY).unwrap();
    assert_eq!(outcome, RefreshOutcome::Reloaded { records: 2, dropped: 2 });
}

#[test]
fn failed_refresh_keeps_previous_snapshot() {
    let store = seeded_store(&stations("a", 3));
    let events = RecordingSink::default();
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    let cache = cache.with_events(Arc::new(events.clone()));
    cache.download_all();
    store.set_unavailable(true);
    let outcome = cache.refresh(TV_KEY).unwrap();
    assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
    let snapshot = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).unwrap();
    assert_eq!(snapshot.len(), 3);
    let status = cache.status().into_iter().find(|entry| entry.key == TV_KEY).unwrap();
    assert_eq!(status.state, CacheState::Stale);
    assert_eq!(status.failures, 1);
    assert!(events.kinds().contains(&CacheEventKind::Loaded));
}

#[test]
fn unreadable_sync_status_is_reported() {
    let store = seeded_store(&stations("a", 3));
    let events = RecordingSink::default();
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    let cache = cache.with_events(Arc::new(events.clone()));
    cache.download_all();
    store.set_unavailable(true);

    let RefreshOutcome::Failed { reason } = cache.refresh(TV_KEY).unwrap() else {
        panic!("refresh should fail while the store is offline");
    };
    assert!(reason.starts_with("sync status unavailable"), "{reason}");
    let recorded = events.events.lock().unwrap();
    let failed = recorded
        .iter()
        .rev()
        .find(|event| event.event == CacheEventKind::RefreshFailed)
        .expect("refresh failure event");
    assert_eq!(failed.authority, Some(Authority::Fcc));
    assert_eq!(failed.dataset, "tv_engineering_data");
    assert_eq!(failed.message.as_deref(), Some(reason.as_str()));
}

#[test]
fn slow_fetch_is_discarded_after_timeout() {
    let store = seeded_store(&stations("a", 2));
    let events = RecordingSink::default();
    let settings = CacheSettings {
        fetch_timeout: Duration::from_millis(20),
        max_snapshot_age: Duration::from_secs(3_600),
    };
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        settings,
    );
    let cache = cache.with_events(Arc::new(events.clone()));
    cache.download_all();
    seed(&store.inner, &stations("b", 5));
    store.set_delay(Duration::from_millis(80));

    let outcome = cache.refresh(TV_KEY).unwrap();
    assert!(matches!(outcome, RefreshOutcome::Failed { .. }));
    let snapshot = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(events.kinds().contains(&CacheEventKind::Timeout));
}

#[test]
fn overlapping_refresh_is_absorbed() {
    let store = seeded_store(&stations("a", 2));
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    cache.download_all();
    store.set_delay(Duration::from_millis(200));
    let cache = Arc::new(cache);
    let slow = {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || cache.refresh(TV_KEY).unwrap())
    };
    std::thread::sleep(Duration::from_millis(50));
    let absorbed = cache.refresh(TV_KEY).unwrap();
    assert_eq!(absorbed, RefreshOutcome::Skipped { reason: SkipReason::InFlight });
    assert_eq!(slow.join().unwrap(), RefreshOutcome::Unchanged { records: 2 });
}

// ============================================================================
// SECTION: Snapshot Atomicity
// ============================================================================

#[test]
fn readers_see_whole_snapshots_during_refresh() {
    let store = seeded_store(&stations("old", 3));
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    cache.download_all();
    for record in stations("new", 5) {
        store.inner.insert_or_replace(&record).unwrap();
    }
    store.set_delay(Duration::from_millis(100));
    let cache = Arc::new(cache);
    let writer = {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || cache.refresh(TV_KEY).unwrap())
    };
    let readers: Vec<_> = (0 .. 4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0 .. 200 {
                    let snapshot = cache
                        .get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData)
                        .unwrap();
                    let first_len = snapshot.len();
                    let has_new = snapshot.records().iter().any(|r| r.row_key.starts_with("new"));
                    let second_len = snapshot.records().len();
                    assert_eq!(first_len, second_len);
                    assert!(
                        (first_len == 3 && !has_new) || (first_len == 8 && has_new),
                        "mixed snapshot of {first_len} records"
                    );
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();
    assert!(matches!(writer.join().unwrap(), RefreshOutcome::Reloaded { records: 8, .. }));
    for reader in readers {
        reader.join().unwrap();
    }
}

// ============================================================================
// SECTION: Scheduling and Staleness
// ============================================================================

#[test]
fn refresh_due_follows_per_dataset_intervals() {
    let store = seeded_store(&stations("a", 1));
    let (cache, clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData, DatasetKind::Pmse],
        CacheSettings::default(),
    );
    let cache = cache.with_intervals(Arc::new(StaticIntervals::default()));
    cache.download_all();
    assert!(cache.refresh_due().is_empty());

    clock.advance(Duration::from_secs(301));
    let due = cache.refresh_due();
    let keys: Vec<CacheKey> = due.iter().map(|(key, _)| *key).collect();
    assert_eq!(
        keys,
        vec![CacheKey::Incumbents { authority: Authority::Fcc, dataset: DatasetKind::Pmse }]
    );

    clock.advance(Duration::from_secs(3_600));
    let due = cache.refresh_due();
    assert_eq!(due.len(), 2);
}

#[test]
fn snapshot_older_than_horizon_is_refused() {
    let store = seeded_store(&stations("a", 2));
    let settings = CacheSettings {
        fetch_timeout: Duration::from_secs(5),
        max_snapshot_age: Duration::from_secs(3_600),
    };
    let (cache, clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        settings,
    );
    cache.download_all();
    store.set_unavailable(true);

    clock.advance(Duration::from_secs(1_800));
    assert!(matches!(cache.refresh(TV_KEY).unwrap(), RefreshOutcome::Failed { .. }));
    assert!(cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).is_ok());

    clock.advance(Duration::from_secs(3_600));
    let err = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).unwrap_err();
    assert!(matches!(err, CacheError::SnapshotExpired(_)));

    store.set_unavailable(false);
    assert!(cache.refresh(TV_KEY).unwrap().is_success());
    assert!(cache.get_service_cache_objects(Authority::Fcc, DatasetKind::TvEngineeringData).is_ok());
}

#[test]
fn status_reports_fresh_after_load() {
    let store = seeded_store(&stations("a", 2));
    let (cache, clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData],
        CacheSettings::default(),
    );
    cache.download_all();
    let status = cache.status();
    let tv = status.iter().find(|entry| entry.key == TV_KEY).unwrap();
    assert_eq!(tv.state, CacheState::Fresh);
    assert_eq!(tv.records, 2);
    assert_eq!(tv.verified_at, Some(T0));

    clock.advance(Duration::from_secs(7_200));
    let status = cache.status();
    let tv = status.iter().find(|entry| entry.key == TV_KEY).unwrap();
    assert_eq!(tv.state, CacheState::Stale);
}

#[test]
fn search_filters_across_datasets() {
    let store = seeded_store(&stations("a", 5));
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::TvEngineeringData, DatasetKind::LpAux],
        CacheSettings::default(),
    );
    let found = cache
        .search_cache_objects(
            Authority::Fcc,
            &[DatasetKind::TvEngineeringData, DatasetKind::LpAux],
            |record| record.channel >= 13,
        )
        .unwrap();
    let channels: Vec<u32> = found.iter().map(|record| record.channel).collect();
    assert_eq!(channels, vec![13, 14]);
}

// ============================================================================
// SECTION: Live Updates
// ============================================================================

fn lp_aux(row_key: &str, channel: u32) -> IncumbentRecord {
    IncumbentRecord {
        partition_key: DatasetKind::LpAux.partition_for(Authority::Fcc),
        row_key: row_key.to_string(),
        call_sign: String::new(),
        channel,
        location: GeoPoint::new(38.9, -77.0),
        contour: None,
        protection_radius_km: None,
        validity: None,
        kind: IncumbentKind::LpAuxRegistration {
            venue: Some("arena".to_string()),
            licensee: None,
        },
    }
}

#[test]
fn live_update_publishes_a_copy_with_the_record() {
    let store = seeded_store(&[lp_aux("mic-1", 21)]);
    let events = RecordingSink::default();
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store.clone()),
        us_region(),
        &[DatasetKind::LpAux],
        CacheSettings::default(),
    );
    let cache = cache.with_events(Arc::new(events.clone()));
    cache.download_all();
    let before = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::LpAux).unwrap();
    let fetches = store.total_calls();

    assert!(cache.update_cache_objects(Authority::Fcc, lp_aux("mic-2", 22)).unwrap());
    let after = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::LpAux).unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 2);
    assert_eq!(after.on_channel(22).count(), 1);
    assert_eq!(store.total_calls(), fetches);
    assert_eq!(events.kinds().last(), Some(&CacheEventKind::Loaded));

    assert!(cache.update_cache_objects(Authority::Fcc, lp_aux("mic-1", 23)).unwrap());
    let replaced = cache.get_service_cache_objects(Authority::Fcc, DatasetKind::LpAux).unwrap();
    assert_eq!(replaced.len(), 2);
    assert_eq!(replaced.on_channel(21).count(), 0);
    assert_eq!(replaced.records()[0].row_key, "mic-1");
}

#[test]
fn live_update_before_first_load_is_left_to_the_store() {
    let store = seeded_store(&[]);
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::LpAux],
        CacheSettings::default(),
    );
    assert!(!cache.update_cache_objects(Authority::Fcc, lp_aux("mic-1", 21)).unwrap());
}

#[test]
fn live_update_rejects_records_a_load_would_drop() {
    let store = seeded_store(&[]);
    let (cache, _clock) = manager(
        SharedIncumbentStore::from_store(store),
        us_region(),
        &[DatasetKind::LpAux],
        CacheSettings::default(),
    );
    cache.download_all();
    let err = cache.update_cache_objects(Authority::Fcc, lp_aux("mic-1", 90)).unwrap_err();
    assert!(matches!(err, CacheError::InvalidRecord(_)));

    let mut misfiled = lp_aux("mic-2", 21);
    misfiled.partition_key = DatasetKind::Pmse.partition_for(Authority::Fcc);
    let err = cache.update_cache_objects(Authority::Fcc, misfiled).unwrap_err();
    assert!(matches!(err, CacheError::InvalidRecord(_)));

    let station = tv_station("t", 30, GeoPoint::new(38.9, -77.0), None);
    let err = cache.update_cache_objects(Authority::Fcc, station).unwrap_err();
    assert!(matches!(err, CacheError::UnknownDataset(_)));
}
