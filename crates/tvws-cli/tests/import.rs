// crates/tvws-cli/tests/import.rs
// ============================================================================
// Module: Import Tests
// Description: Bundle import and partner sync against real stores.
// Purpose: Verify entity writes, derived sync rows, and poll gating.
// Dependencies: tvws-cli, tvws-core, tvws-store-sqlite, tempfile
// ============================================================================

//! ## Overview
//! Imports bundles into SQLite and in-memory stores and drives the partner
//! sync poller through file changes and failures.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only import assertions."
)]

use std::fs::File;
use std::path::Path;
use std::time::Duration;
use std::time::SystemTime;

use tempfile::TempDir;
use tvws_cli::import::ImportBundle;
use tvws_cli::import::ImportError;
use tvws_cli::import::ImportMode;
use tvws_cli::import::ImportReport;
use tvws_cli::import::SyncPoller;
use tvws_cli::import::import_bundle;
use tvws_core::Authority;
use tvws_core::DatasetKind;
use tvws_core::GeoPoint;
use tvws_core::InMemoryIncumbentStore;
use tvws_core::IncumbentKind;
use tvws_core::IncumbentRecord;
use tvws_core::IncumbentStoreExt;
use tvws_core::Polygon;
use tvws_core::RegionCode;
use tvws_core::RegionPolygonRecord;
use tvws_core::SyncStatus;
use tvws_core::Timestamp;
use tvws_store_sqlite::SqliteIncumbentStore;
use tvws_store_sqlite::SqliteStoreConfig;

const NOW: Timestamp = Timestamp::from_unix_millis(1_700_000_000_000);

fn tv_station(row_key: &str) -> IncumbentRecord {
    IncumbentRecord {
        partition_key: DatasetKind::TvEngineeringData.partition_for(Authority::Fcc),
        row_key: row_key.to_string(),
        call_sign: format!("W{row_key}"),
        channel: 30,
        location: GeoPoint::new(38.9, -77.0),
        contour: None,
        protection_radius_km: Some(10.0),
        validity: None,
        kind: IncumbentKind::TvEngineeringData { facility_id: None, erp_kw: Some(1000.0) },
    }
}

fn us_polygon() -> RegionPolygonRecord {
    RegionPolygonRecord {
        region: RegionCode::new("US"),
        polygon_id: "conus".to_string(),
        polygon: Polygon::new(vec![
            GeoPoint::new(24.0, -125.0),
            GeoPoint::new(50.0, -125.0),
            GeoPoint::new(50.0, -66.0),
            GeoPoint::new(24.0, -66.0),
        ])
        .expect("polygon"),
    }
}

fn sample_bundle() -> ImportBundle {
    ImportBundle {
        incumbents: vec![tv_station("1"), tv_station("2")],
        region_polygons: vec![us_polygon()],
        sync_status: Vec::new(),
    }
}

fn write_bundle(path: &Path, bundle: &ImportBundle) {
    std::fs::write(path, serde_json::to_vec(bundle).unwrap()).unwrap();
}

fn tv_status<S: IncumbentStoreExt>(store: &S) -> SyncStatus {
    let partition = DatasetKind::TvEngineeringData.partition_for(Authority::Fcc);
    let (scope, dataset) = partition.split_once('/').unwrap();
    store.fetch_entity::<SyncStatus>(scope, dataset).unwrap().expect("tv status row")
}

#[test]
fn seed_import_writes_entities_and_derived_status_rows() {
    let dir = TempDir::new().unwrap();
    let store = SqliteIncumbentStore::new(&SqliteStoreConfig::at(dir.path().join("tvws.db")))
        .expect("sqlite store");
    let report = import_bundle(&store, &sample_bundle(), ImportMode::Seed, NOW).expect("import");
    assert_eq!(report, ImportReport { incumbents: 2, region_polygons: 1, sync_status: 2 });

    let partition = DatasetKind::TvEngineeringData.partition_for(Authority::Fcc);
    let records = store.fetch_by_partition::<IncumbentRecord>(&partition).unwrap();
    assert_eq!(records.len(), 2);
    let polygons = store.fetch_by_partition::<RegionPolygonRecord>("US").unwrap();
    assert_eq!(polygons, vec![us_polygon()]);

    let status = tv_status(&store);
    assert_eq!(status.last_modified, NOW);
    assert!(!status.needs_update);
    let region_status = store
        .fetch_entity::<SyncStatus>(SyncStatus::REGION_SCOPE, SyncStatus::REGION_DATASET)
        .unwrap()
        .expect("region status row");
    assert_eq!(region_status.last_modified, NOW);
}

#[test]
fn explicit_status_rows_are_kept_in_seed_mode() {
    let store = InMemoryIncumbentStore::new();
    let partition = DatasetKind::TvEngineeringData.partition_for(Authority::Fcc);
    let (scope, dataset) = partition.split_once('/').unwrap();
    let earlier = Timestamp::from_unix_millis(1_600_000_000_000);
    let mut bundle = sample_bundle();
    bundle.sync_status = vec![SyncStatus {
        scope: scope.to_string(),
        dataset: dataset.to_string(),
        last_modified: earlier,
        needs_update: false,
    }];
    let report = import_bundle(&store, &bundle, ImportMode::Seed, NOW).expect("import");
    assert_eq!(report.sync_status, 2);
    assert_eq!(tv_status(&store).last_modified, earlier);
}

#[test]
fn sync_mode_flags_every_status_for_update() {
    let store = InMemoryIncumbentStore::new();
    import_bundle(&store, &sample_bundle(), ImportMode::Sync, NOW).expect("import");
    assert!(tv_status(&store).needs_update);
    let region_status = store
        .fetch_entity::<SyncStatus>(SyncStatus::REGION_SCOPE, SyncStatus::REGION_DATASET)
        .unwrap()
        .expect("region status row");
    assert!(region_status.needs_update);
}

#[test]
fn record_in_wrong_partition_is_rejected() {
    let store = InMemoryIncumbentStore::new();
    let mut record = tv_station("1");
    record.partition_key = DatasetKind::Pmse.partition_for(Authority::Fcc);
    let bundle = ImportBundle { incumbents: vec![record], ..ImportBundle::default() };
    let err = import_bundle(&store, &bundle, ImportMode::Seed, NOW).expect_err("mismatch");
    assert!(matches!(err, ImportError::Invalid(_)));
    let partition = DatasetKind::Pmse.partition_for(Authority::Fcc);
    assert!(store.fetch_by_partition::<IncumbentRecord>(&partition).unwrap().is_empty());
}

#[test]
fn partition_without_dataset_is_rejected() {
    let store = InMemoryIncumbentStore::new();
    let mut record = tv_station("1");
    record.partition_key = "fcc".to_string();
    let bundle = ImportBundle { incumbents: vec![record], ..ImportBundle::default() };
    let err = import_bundle(&store, &bundle, ImportMode::Seed, NOW).expect_err("no dataset");
    assert!(matches!(err, ImportError::Invalid(_)));
}

#[test]
fn poller_imports_only_when_the_file_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partner.json");
    write_bundle(&path, &sample_bundle());
    let store = InMemoryIncumbentStore::new();
    let mut poller = SyncPoller::new(&path);

    let first = poller.poll_once(&store, NOW).expect("first poll");
    assert_eq!(first.map(|report| report.incumbents), Some(2));
    assert!(poller.poll_once(&store, NOW).expect("second poll").is_none());

    let mut bundle = sample_bundle();
    bundle.incumbents.push(tv_station("3"));
    write_bundle(&path, &bundle);
    let later = SystemTime::now() + Duration::from_secs(60);
    File::options().write(true).open(&path).unwrap().set_modified(later).unwrap();
    let third = poller.poll_once(&store, NOW).expect("third poll");
    assert_eq!(third.map(|report| report.incumbents), Some(3));
}

#[test]
fn poller_retries_after_a_failed_import() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partner.json");
    std::fs::write(&path, b"{ not json").unwrap();
    let store = InMemoryIncumbentStore::new();
    let mut poller = SyncPoller::new(&path);
    assert!(matches!(poller.poll_once(&store, NOW), Err(ImportError::Parse(_))));
    assert!(matches!(poller.poll_once(&store, NOW), Err(ImportError::Parse(_))));
}

#[test]
fn poller_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    let store = InMemoryIncumbentStore::new();
    let mut poller = SyncPoller::new(dir.path().join("absent.json"));
    assert!(matches!(poller.poll_once(&store, NOW), Err(ImportError::Io(_))));
}
