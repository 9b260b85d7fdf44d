// crates/tvws-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures and store doubles for tvws-core tests.
// Purpose: Build regions, incumbents, and instrumented stores.
// Dependencies: tvws-core
// ============================================================================

//! ## Overview
//! Provides a US region fixture, incumbent builders, a recording event sink,
//! and [`InstrumentedStore`], a store double that counts calls per table and
//! can be made slow or unavailable on demand.

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

use tvws_core::Authority;
use tvws_core::CacheEvent;
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

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Start time used by manual clocks.
pub const T0: Timestamp = Timestamp::from_unix_millis(1_700_000_000_000);

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
        ruleset_ids: vec![RulesetId::new("FccTvBandWhiteSpace-2010")],
        max_location_change_m: 100.0,
        max_polling_secs: 86_400,
        protection_radius_km: KindDistances::default(),
        min_separation_km: KindDistances::default(),
        adjacent_channel_protection: false,
        needs_spectrum_report: false,
        device_classes: DeviceClassRules::default(),
    }
}

/// Catalog holding one region.
pub fn catalog_with(region: RegionRules) -> RegionCatalog {
    RegionCatalog::new(vec![region]).expect("catalog")
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

/// FCC dataset map for the cache manager.
pub fn fcc_datasets(kinds: &[DatasetKind]) -> BTreeMap<Authority, BTreeSet<DatasetKind>> {
    BTreeMap::from([(Authority::Fcc, kinds.iter().copied().collect())])
}

/// TV engineering record without a contour.
pub fn tv_station(row_key: &str, channel: u32, point: GeoPoint, radius_km: Option<f64>) -> IncumbentRecord {
    IncumbentRecord {
        partition_key: DatasetKind::TvEngineeringData.partition_for(Authority::Fcc),
        row_key: row_key.to_string(),
        call_sign: format!("W{row_key}"),
        channel,
        location: point,
        contour: None,
        protection_radius_km: radius_km,
        validity: None,
        kind: IncumbentKind::TvEngineeringData { facility_id: None, erp_kw: Some(1000.0) },
    }
}

/// Writes records into a store.
pub fn seed(store: &impl IncumbentStore, records: &[IncumbentRecord]) {
    for record in records {
        store.insert_or_replace(record).unwrap();
    }
}

/// Builds a cache over `store` with a manual clock at [`T0`].
pub fn manager(
    store: SharedIncumbentStore,
    region: RegionRules,
    kinds: &[DatasetKind],
    settings: CacheSettings,
) -> (CacheManager, ManualClock) {
    let clock = ManualClock::new(T0);
    let manager = CacheManager::new(store, &catalog_with(region), &fcc_datasets(kinds), settings)
        .with_clock(Arc::new(clock.clone()));
    (manager, clock)
}

// ============================================================================
// SECTION: Event Recorder
// ============================================================================

/// Cache event sink that keeps every event.
#[derive(Default, Clone)]
pub struct RecordingSink {
    /// Events in arrival order.
    pub events: Arc<Mutex<Vec<CacheEvent>>>,
}

impl RecordingSink {
    /// Recorded event kinds in order.
    pub fn kinds(&self) -> Vec<tvws_core::CacheEventKind> {
        self.events.lock().unwrap().iter().map(|event| event.event).collect()
    }
}

impl CacheEventSink for RecordingSink {
    fn record(&self, event: &CacheEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Instrumented Store
// ============================================================================

/// Store double counting partition fetches per table.
#[derive(Clone, Default)]
pub struct InstrumentedStore {
    /// Backing data.
    pub inner: InMemoryIncumbentStore,
    /// Partition fetches per table.
    partition_calls: Arc<Mutex<BTreeMap<String, usize>>>,
    /// Row fetches.
    row_calls: Arc<AtomicU64>,
    /// Writes.
    write_calls: Arc<AtomicU64>,
    /// Partition fetch delay.
    delay_ms: Arc<AtomicU64>,
    /// Offline switch.
    unavailable: Arc<AtomicBool>,
}

impl InstrumentedStore {
    /// Creates an empty, available store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition fetches made against `table`.
    pub fn partition_calls(&self, table: &str) -> usize {
        self.partition_calls.lock().unwrap().get(table).copied().unwrap_or(0)
    }

    /// All store calls of any kind.
    pub fn total_calls(&self) -> u64 {
        let partitions: usize = self.partition_calls.lock().unwrap().values().sum();
        u64::try_from(partitions).unwrap()
            + self.row_calls.load(Ordering::SeqCst)
            + self.write_calls.load(Ordering::SeqCst)
    }

    /// Delays every partition fetch.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    /// Makes every call fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fails when the store is offline.
    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

impl IncumbentStore for InstrumentedStore {
    fn fetch_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredRow>, StoreError> {
        self.row_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.fetch_row(table, partition_key, row_key)
    }

    fn fetch_partition(&self, table: &str, partition_key: &str) -> Result<Vec<StoredRow>, StoreError> {
        *self.partition_calls.lock().unwrap().entry(table.to_string()).or_default() += 1;
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.check()?;
        self.inner.fetch_partition(table, partition_key)
    }

    fn upsert_row(&self, table: &str, row: StoredRow) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.upsert_row(table, row)
    }
}
