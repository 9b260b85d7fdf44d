// crates/tvws-paws/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures for tvws-paws integration tests.
// Purpose: Build a protocol manager over a seeded, call-counting store.
// Dependencies: tvws-core, tvws-paws
// ============================================================================

//! ## Overview
//! [`Harness`] wires a [`PawsProtocolManager`] over an in-memory store that
//! counts every call, a manual clock, and a recording audit sink. Request
//! builders produce PAWS params in wire form.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Shared helpers are used by a subset of test binaries."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use tvws_core::Authority;
use tvws_core::AvailabilityEngine;
use tvws_core::CacheEvent;
use tvws_core::CacheEventKind;
use tvws_core::CacheEventSink;
use tvws_core::CacheManager;
use tvws_core::CacheSettings;
use tvws_core::DatasetKind;
use tvws_core::DeviceClassRules;
use tvws_core::GeoPoint;
use tvws_core::InMemoryIncumbentStore;
use tvws_core::IncumbentKind;
use tvws_core::IncumbentRecord;
use tvws_core::IncumbentStore;
use tvws_core::IncumbentStoreExt;
use tvws_core::KindDistances;
use tvws_core::ManualClock;
use tvws_core::Polygon;
use tvws_core::RegionCatalog;
use tvws_core::RegionCode;
use tvws_core::RegionPolygonRecord;
use tvws_core::RegionRules;
use tvws_core::RulesetId;
use tvws_core::SharedIncumbentStore;
use tvws_core::StoreError;
use tvws_core::StoredRow;
use tvws_core::Timestamp;
use tvws_paws::PawsAuditEvent;
use tvws_paws::PawsAuditSink;
use tvws_paws::PawsError;
use tvws_paws::PawsProtocolManager;
use tvws_paws::ProtocolSettings;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Start time used by the manual clock.
pub const T0: Timestamp = Timestamp::from_unix_millis(1_700_000_000_000);

/// Ruleset advertised by the US region.
pub const FCC_RULESET: &str = "FccTvBandWhiteSpace-2010";

/// Point near Washington, DC.
pub const DC: (f64, f64) = (38.9, -77.0);

/// US region spanning channels 2-51 at 6 MHz.
pub fn us_region() -> RegionRules {
    RegionRules {
        code: RegionCode::new("US"),
        authority: Authority::Fcc,
        start_channel: 2,
        end_channel: 51,
        start_frequency_mhz: 54.0,
        channel_bandwidth_mhz: 6.0,
        power_dbm_transition_point: 30.0,
        max_eirp_dbm: 36.0,
        ruleset_ids: vec![RulesetId::new(FCC_RULESET)],
        max_location_change_m: 100.0,
        max_polling_secs: 86_400,
        protection_radius_km: KindDistances::default(),
        min_separation_km: KindDistances::default(),
        adjacent_channel_protection: false,
        needs_spectrum_report: false,
        device_classes: DeviceClassRules::default(),
    }
}

/// Box roughly covering the contiguous US.
pub fn us_polygon() -> RegionPolygonRecord {
    RegionPolygonRecord {
        region: RegionCode::new("US"),
        polygon_id: "conus".to_string(),
        polygon: Polygon::new(vec![
            GeoPoint::new(24.0, -125.0),
            GeoPoint::new(50.0, -125.0),
            GeoPoint::new(50.0, -66.0),
            GeoPoint::new(24.0, -66.0),
        ])
        .expect("conus polygon"),
    }
}

/// TV station protecting `channel` within `radius_km` of `point`.
pub fn tv_station(row_key: &str, channel: u32, point: GeoPoint, radius_km: f64) -> IncumbentRecord {
    IncumbentRecord {
        partition_key: DatasetKind::TvEngineeringData.partition_for(Authority::Fcc),
        row_key: row_key.to_string(),
        call_sign: format!("W{row_key}"),
        channel,
        location: point,
        contour: None,
        protection_radius_km: Some(radius_km),
        validity: None,
        kind: IncumbentKind::TvEngineeringData { facility_id: None, erp_kw: Some(1000.0) },
    }
}

// ============================================================================
// SECTION: Audit Recorder
// ============================================================================

/// Audit sink that keeps every event.
#[derive(Default)]
pub struct RecordingAudit {
    /// Events in arrival order.
    pub events: Mutex<Vec<PawsAuditEvent>>,
}

impl RecordingAudit {
    /// Most recent event.
    pub fn last(&self) -> PawsAuditEvent {
        self.events.lock().unwrap().last().cloned().expect("audit event")
    }
}

impl PawsAuditSink for RecordingAudit {
    fn record(&self, event: &PawsAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Cache event sink that keeps every event.
#[derive(Default)]
pub struct RecordingEvents {
    /// Events in arrival order.
    pub events: Mutex<Vec<CacheEvent>>,
}

impl RecordingEvents {
    /// Recorded event kinds in order.
    pub fn kinds(&self) -> Vec<CacheEventKind> {
        self.events.lock().unwrap().iter().map(|event| event.event).collect()
    }
}

impl CacheEventSink for RecordingEvents {
    fn record(&self, event: &CacheEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Counting Store
// ============================================================================

/// Store double counting every call.
#[derive(Clone, Default)]
pub struct CountingStore {
    /// Backing data.
    pub inner: InMemoryIncumbentStore,
    /// Calls of any kind.
    calls: Arc<AtomicU64>,
    /// Partition fetch delay.
    delay_ms: Arc<AtomicU64>,
    /// Offline switch.
    offline: Arc<AtomicBool>,
    /// Makes every write panic.
    panic_on_write: Arc<AtomicBool>,
}

impl CountingStore {
    /// All store calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Delays every partition fetch.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    /// Makes every call fail with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes every write panic.
    pub fn set_panic_on_write(&self, panic_on_write: bool) {
        self.panic_on_write.store(panic_on_write, Ordering::SeqCst);
    }

    /// Counts a call and fails when the store is offline.
    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

impl IncumbentStore for CountingStore {
    fn fetch_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredRow>, StoreError> {
        self.check()?;
        self.inner.fetch_row(table, partition_key, row_key)
    }

    fn fetch_partition(&self, table: &str, partition_key: &str) -> Result<Vec<StoredRow>, StoreError> {
        self.check()?;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.inner.fetch_partition(table, partition_key)
    }

    fn upsert_row(&self, table: &str, row: StoredRow) -> Result<(), StoreError> {
        self.check()?;
        assert!(!self.panic_on_write.load(Ordering::SeqCst), "store write panicked");
        self.inner.upsert_row(table, row)
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Protocol manager over a seeded store.
pub struct Harness {
    /// Manager under test.
    pub manager: PawsProtocolManager,
    /// Store shared with the cache.
    pub store: CountingStore,
    /// Audit recorder.
    pub audit: Arc<RecordingAudit>,
    /// Cache shared with the engine.
    pub cache: Arc<CacheManager>,
    /// Clock driving the cache.
    pub clock: ManualClock,
    /// Events emitted by the cache.
    pub events: Arc<RecordingEvents>,
}

impl Harness {
    /// Harness with the US polygon and `records` seeded.
    pub fn with_records(records: &[IncumbentRecord]) -> Self {
        Self::with_settings(records, ProtocolSettings::default())
    }

    /// Harness with custom protocol settings.
    pub fn with_settings(records: &[IncumbentRecord], settings: ProtocolSettings) -> Self {
        let store = CountingStore::default();
        store.inner.insert_or_replace(&us_polygon()).unwrap();
        for record in records {
            store.inner.insert_or_replace(record).unwrap();
        }
        let catalog = Arc::new(RegionCatalog::new(vec![us_region()]).expect("catalog"));
        let datasets = BTreeMap::from([(
            Authority::Fcc,
            BTreeSet::from([DatasetKind::TvEngineeringData, DatasetKind::LpAux]),
        )]);
        let clock = ManualClock::new(T0);
        let events = Arc::new(RecordingEvents::default());
        let cache = Arc::new(
            CacheManager::new(
                SharedIncumbentStore::from_store(store.clone()),
                &catalog,
                &datasets,
                CacheSettings::default(),
            )
            .with_clock(Arc::new(clock.clone()))
            .with_events(Arc::clone(&events) as Arc<dyn CacheEventSink>),
        );
        let engine = Arc::new(AvailabilityEngine::new(catalog, Arc::clone(&cache)));
        let audit = Arc::new(RecordingAudit::default());
        let manager = PawsProtocolManager::new(
            engine,
            Arc::clone(&audit) as Arc<dyn PawsAuditSink>,
            settings,
        );
        Self { manager, store, audit, cache, clock, events }
    }

    /// Calls a method and returns its result.
    pub fn call(&self, method: &str, params: Value) -> Result<Value, PawsError> {
        self.manager.handle(method, Some(params), Some("1".to_string()))
    }
}

// ============================================================================
// SECTION: Request Builders
// ============================================================================

/// Exact point location in wire form.
pub fn location(latitude: f64, longitude: f64) -> Value {
    json!({ "point": { "center": { "latitude": latitude, "longitude": longitude } } })
}

/// Mode II device descriptor in wire form.
pub fn mode_ii_device(serial: &str) -> Value {
    json!({
        "serialNumber": serial,
        "manufacturerId": "acme",
        "rulesetIds": [FCC_RULESET],
        "deviceType": "MODE_2",
        "fccId": "ACME-1",
    })
}

/// LPAUX device descriptor in wire form.
pub fn lp_aux_device(serial: &str) -> Value {
    json!({
        "serialNumber": serial,
        "manufacturerId": "acme",
        "rulesetIds": [FCC_RULESET],
        "deviceType": "LPAUX",
        "fccId": "ACME-2",
    })
}

/// Fixed device descriptor in wire form.
pub fn fixed_device(serial: &str) -> Value {
    json!({
        "serialNumber": serial,
        "manufacturerId": "acme",
        "rulesetIds": [FCC_RULESET],
        "deviceType": "FIXED",
        "fccId": "ACME-1",
    })
}

/// `getSpectrum` params at a point.
pub fn spectrum_params(device: Value, latitude: f64, longitude: f64) -> Value {
    json!({
        "type": "AVAIL_SPECTRUM_REQ",
        "version": "1.0",
        "deviceDesc": device,
        "location": location(latitude, longitude),
    })
}

/// `register` params for a fixed device.
pub fn register_params(device: Value) -> Value {
    json!({
        "type": "REGISTRATION_REQ",
        "version": "1.0",
        "deviceDesc": device,
        "location": location(DC.0, DC.1),
        "deviceOwner": { "name": "Acme Ops", "email": "ops@acme.test" },
        "antenna": { "height": 30.0, "heightType": "AGL" },
    })
}

/// Channel numbers of the first schedule in a spectrum response.
pub fn first_schedule_channels(result: &Value) -> Vec<u64> {
    result["spectrumSpecs"][0]["spectrumSchedules"][0]["spectra"]
        .as_array()
        .expect("spectra")
        .iter()
        .map(|info| info["channel"].as_u64().expect("channel"))
        .collect()
}
