// crates/tvws-core/src/runtime/cache.rs
// ============================================================================
// Module: TVWS Incumbent Cache
// Description: Periodically refreshed snapshots of incumbent and polygon data.
// Purpose: Serve read-mostly incumbent data without blocking on the store.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The [`CacheManager`] owns one snapshot per dataset: each authority's
//! incumbent datasets (grouped in a [`ServiceCacheRegistry`]) plus the region
//! polygons (one [`RegionPolygonSet`]). Every dataset moves through
//! `Empty -> Loading -> Fresh -> Stale -> Loading -> Fresh`.
//!
//! Invariants:
//! - At most one refresh per dataset is in flight. Periodic refreshes use
//!   `try_lock` on the dataset gate and report [`SkipReason::InFlight`] when
//!   it is busy; first loads block on the gate and load exactly once.
//! - Snapshots are immutable and published by pointer swap.
//! - A failed or timed-out refresh leaves the previous snapshot in place.
//! - A re-fetch equal to the current snapshot keeps the existing pointer.
//! - Readers are refused once the last successful refresh is older than
//!   [`CacheSettings::max_snapshot_age`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::core::Authority;
use crate::core::CacheEvent;
use crate::core::CacheEventKind;
use crate::core::CacheKey;
use crate::core::DatasetKind;
use crate::core::IncumbentRecord;
use crate::core::RegionCatalog;
use crate::core::RegionCode;
use crate::core::SyncStatus;
use crate::core::Timestamp;
use crate::interfaces::CacheEventSink;
use crate::interfaces::Clock;
use crate::interfaces::IncumbentStore;
use crate::interfaces::IncumbentStoreExt;
use crate::interfaces::NoopCacheEventSink;
use crate::interfaces::RefreshIntervals;
use crate::interfaces::StoreEntity;
use crate::interfaces::StoreError;
use crate::interfaces::decode_row;
use crate::runtime::SharedIncumbentStore;
use crate::runtime::StaticIntervals;
use crate::runtime::SystemClock;
use crate::runtime::polygon_index::RegionPolygonSet;
use crate::runtime::snapshot::SnapshotCell;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Cache read errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The dataset has never loaded successfully.
    #[error("cache never loaded: {0}")]
    NeverLoaded(String),
    /// The last successful refresh is older than the allowed age.
    #[error("cache snapshot expired: {0}")]
    SnapshotExpired(String),
    /// The dataset is not configured.
    #[error("unknown cache dataset: {0}")]
    UnknownDataset(String),
    /// A live update carried a record the dataset would drop on load.
    #[error("invalid cache record: {0}")]
    InvalidRecord(String),
}

// ============================================================================
// SECTION: Settings and Outcomes
// ============================================================================

/// Default fetch timeout.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Default max snapshot age.
const DEFAULT_MAX_SNAPSHOT_AGE: Duration = Duration::from_secs(86_400);

/// Cache timing limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Fetches slower than this are discarded.
    pub fetch_timeout: Duration,
    /// Oldest successful refresh a reader may be served.
    pub max_snapshot_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { fetch_timeout: DEFAULT_FETCH_TIMEOUT, max_snapshot_age: DEFAULT_MAX_SNAPSHOT_AGE }
    }
}

/// Why a refresh did not fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another refresh of the dataset is in flight.
    InFlight,
    /// The sync-status record shows no change since the last load.
    NotModified,
}

/// Result of one refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// No fetch was performed.
    Skipped {
        /// Skip cause.
        reason: SkipReason,
    },
    /// Fetched data matched the current snapshot; the pointer was kept.
    Unchanged {
        /// Records in the snapshot.
        records: usize,
    },
    /// A new snapshot was published.
    Reloaded {
        /// Records in the new snapshot.
        records: usize,
        /// Records dropped for failing validation.
        dropped: usize,
    },
    /// The refresh failed; the previous snapshot remains.
    Failed {
        /// Diagnostic text.
        reason: String,
    },
}

impl RefreshOutcome {
    /// Short label for status reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Skipped { reason: SkipReason::InFlight } => "skipped_in_flight",
            Self::Skipped { reason: SkipReason::NotModified } => "not_modified",
            Self::Unchanged { .. } => "unchanged",
            Self::Reloaded { .. } => "reloaded",
            Self::Failed { .. } => "failed",
        }
    }

    /// Returns true when the refresh confirmed the snapshot is current.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Skipped { reason: SkipReason::NotModified }
                | Self::Unchanged { .. }
                | Self::Reloaded { .. }
        )
    }
}

/// Per-dataset lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Never loaded.
    Empty,
    /// A refresh is running.
    Loading,
    /// Loaded and refreshed within its interval.
    Fresh,
    /// Loaded, but due for refresh or the last refresh failed.
    Stale,
}

/// Per-dataset status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Dataset key.
    pub key: CacheKey,
    /// Lifecycle state.
    pub state: CacheState,
    /// Records in the current snapshot.
    pub records: usize,
    /// Backing data last-modified time recorded at the last load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    /// Last successful refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<Timestamp>,
    /// Next scheduled refresh.
    pub next_due: Timestamp,
    /// Outcome label of the last refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,
    /// Diagnostic text of the last failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Refresh attempts that fetched or tried to fetch.
    pub attempts: u64,
    /// Failed attempts.
    pub failures: u64,
}

/// Result of the startup load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Datasets that loaded.
    pub loaded: Vec<CacheKey>,
    /// Datasets that failed with their diagnostic text.
    pub failed: Vec<(CacheKey, String)>,
}

impl DownloadReport {
    /// Returns true when every dataset loaded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Immutable incumbent dataset with a per-channel index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncumbentSnapshot {
    /// Records in store order.
    records: Vec<IncumbentRecord>,
    /// Record positions by channel.
    by_channel: BTreeMap<u32, Vec<usize>>,
}

impl IncumbentSnapshot {
    /// Builds a snapshot and its channel index.
    #[must_use]
    pub fn new(records: Vec<IncumbentRecord>) -> Self {
        let mut by_channel: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (position, record) in records.iter().enumerate() {
            by_channel.entry(record.channel).or_default().push(position);
        }
        Self { records, by_channel }
    }

    /// All records.
    #[must_use]
    pub fn records(&self) -> &[IncumbentRecord] {
        &self.records
    }

    /// Record count.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when the snapshot holds no records.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records protecting `channel`.
    pub fn on_channel(&self, channel: u32) -> impl Iterator<Item = &IncumbentRecord> {
        self.by_channel
            .get(&channel)
            .into_iter()
            .flatten()
            .filter_map(|position| self.records.get(*position))
    }
}

/// Record counting for status reports.
trait SnapshotSize {
    /// Number of records held.
    fn record_count(&self) -> usize;
}

impl SnapshotSize for IncumbentSnapshot {
    fn record_count(&self) -> usize {
        self.len()
    }
}

impl SnapshotSize for RegionPolygonSet {
    fn record_count(&self) -> usize {
        self.polygon_count()
    }
}

// ============================================================================
// SECTION: Refresh Tracking
// ============================================================================

/// Mutable bookkeeping for one dataset.
#[derive(Debug, Default)]
struct TrackerMeta {
    /// True while a refresh holds the gate.
    loading: bool,
    /// Sync-status time recorded at the last successful load.
    last_modified: Option<Timestamp>,
    /// Last successful refresh time.
    verified_at: Option<Timestamp>,
    /// Next scheduled refresh.
    next_due: Timestamp,
    /// Last refresh outcome.
    last_outcome: Option<RefreshOutcome>,
    /// Last failure text.
    last_error: Option<String>,
    /// Fetch attempts.
    attempts: u64,
    /// Failed attempts.
    failures: u64,
}

/// Refresh gate and bookkeeping for one dataset.
#[derive(Debug, Default)]
struct RefreshTracker {
    /// Held for the whole refresh; serializes refreshes.
    gate: Mutex<()>,
    /// Bookkeeping, locked briefly.
    meta: Mutex<TrackerMeta>,
}

impl RefreshTracker {
    /// Locks the bookkeeping.
    fn meta(&self) -> MutexGuard<'_, TrackerMeta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One authority dataset: snapshot plus tracker.
#[derive(Debug, Default)]
struct IncumbentSlot {
    /// Published snapshot.
    cell: SnapshotCell<IncumbentSnapshot>,
    /// Refresh state.
    tracker: RefreshTracker,
}

// ============================================================================
// SECTION: Service Cache Registry
// ============================================================================

/// Incumbent datasets of one regulatory authority.
#[derive(Debug)]
pub struct ServiceCache {
    /// Owning authority.
    authority: Authority,
    /// Union channel span of the authority's regions, used for validation.
    channels: RangeInclusive<u32>,
    /// Datasets held.
    datasets: BTreeMap<DatasetKind, IncumbentSlot>,
}

impl ServiceCache {
    /// Owning authority.
    #[must_use]
    pub const fn authority(&self) -> Authority {
        self.authority
    }

    /// Datasets held by this cache.
    pub fn datasets(&self) -> impl Iterator<Item = DatasetKind> + '_ {
        self.datasets.keys().copied()
    }
}

/// All service caches, one per authority.
#[derive(Debug, Default)]
pub struct ServiceCacheRegistry {
    /// Caches by authority.
    caches: BTreeMap<Authority, ServiceCache>,
}

impl ServiceCacheRegistry {
    /// Builds a registry from `authority -> datasets` using the catalog's
    /// channel spans. Authorities without a region are ignored.
    #[must_use]
    pub fn new(catalog: &RegionCatalog, datasets: &BTreeMap<Authority, BTreeSet<DatasetKind>>) -> Self {
        let caches = datasets
            .iter()
            .filter_map(|(authority, kinds)| {
                let channels = catalog.channel_span(*authority)?;
                let datasets =
                    kinds.iter().map(|kind| (*kind, IncumbentSlot::default())).collect();
                Some((*authority, ServiceCache { authority: *authority, channels, datasets }))
            })
            .collect();
        Self { caches }
    }

    /// Service cache for an authority.
    #[must_use]
    pub fn get(&self, authority: Authority) -> Option<&ServiceCache> {
        self.caches.get(&authority)
    }

    /// Every incumbent cache key in stable order.
    pub fn keys(&self) -> impl Iterator<Item = CacheKey> + '_ {
        self.caches.values().flat_map(|cache| {
            cache.datasets.keys().map(|dataset| CacheKey::Incumbents {
                authority: cache.authority,
                dataset: *dataset,
            })
        })
    }

    /// Looks up a dataset slot.
    fn slot(&self, authority: Authority, dataset: DatasetKind) -> Option<(&ServiceCache, &IncumbentSlot)> {
        let cache = self.caches.get(&authority)?;
        cache.datasets.get(&dataset).map(|slot| (cache, slot))
    }
}

// ============================================================================
// SECTION: Cache Manager
// ============================================================================

/// Owner of every cached dataset and its refresh policy.
pub struct CacheManager {
    /// Backing store.
    store: SharedIncumbentStore,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Operational event sink.
    events: Arc<dyn CacheEventSink>,
    /// Refresh interval source.
    intervals: Arc<dyn RefreshIntervals>,
    /// Timing limits.
    settings: CacheSettings,
    /// Incumbent datasets.
    registry: ServiceCacheRegistry,
    /// Region polygon snapshot.
    polygons: SnapshotCell<RegionPolygonSet>,
    /// Region polygon refresh state.
    polygon_tracker: RefreshTracker,
    /// Regions whose polygons are loaded.
    region_codes: Vec<RegionCode>,
}

impl CacheManager {
    /// Creates a manager for the catalog's regions and the given datasets,
    /// using the system clock, default intervals, and no event sink.
    #[must_use]
    pub fn new(
        store: SharedIncumbentStore,
        catalog: &RegionCatalog,
        datasets: &BTreeMap<Authority, BTreeSet<DatasetKind>>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            events: Arc::new(NoopCacheEventSink),
            intervals: Arc::new(StaticIntervals::default()),
            settings,
            registry: ServiceCacheRegistry::new(catalog, datasets),
            polygons: SnapshotCell::default(),
            polygon_tracker: RefreshTracker::default(),
            region_codes: catalog.codes().cloned().collect(),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn CacheEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replaces the interval source.
    #[must_use]
    pub fn with_intervals(mut self, intervals: Arc<dyn RefreshIntervals>) -> Self {
        self.intervals = intervals;
        self
    }

    /// Current time from the injected clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Backing store handle.
    #[must_use]
    pub const fn store(&self) -> &SharedIncumbentStore {
        &self.store
    }

    /// Incumbent dataset registry.
    #[must_use]
    pub const fn registry(&self) -> &ServiceCacheRegistry {
        &self.registry
    }

    /// Refresh interval for a dataset, read from the interval source.
    #[must_use]
    pub fn interval(&self, key: &CacheKey) -> Duration {
        self.intervals.interval(key)
    }

    /// Every cached dataset key: region polygons first, then incumbents.
    #[must_use]
    pub fn keys(&self) -> Vec<CacheKey> {
        std::iter::once(CacheKey::RegionPolygons).chain(self.registry.keys()).collect()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Returns an authority dataset, loading it synchronously on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the dataset is unknown, has never loaded,
    /// or is older than the allowed age.
    pub fn get_service_cache_objects(
        &self,
        authority: Authority,
        dataset: DatasetKind,
    ) -> Result<Arc<IncumbentSnapshot>, CacheError> {
        let key = CacheKey::Incumbents { authority, dataset };
        let (cache, slot) = self
            .registry
            .slot(authority, dataset)
            .ok_or_else(|| CacheError::UnknownDataset(key.to_string()))?;
        self.get_or_load(key, &slot.tracker, &slot.cell, || {
            self.fetch_incumbents(cache, dataset)
        })
    }

    /// Returns every record across `datasets` matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns the first [`CacheError`] raised by a dataset read.
    pub fn search_cache_objects(
        &self,
        authority: Authority,
        datasets: &[DatasetKind],
        predicate: impl Fn(&IncumbentRecord) -> bool,
    ) -> Result<Vec<IncumbentRecord>, CacheError> {
        let mut found = Vec::new();
        for dataset in datasets {
            let snapshot = self.get_service_cache_objects(authority, *dataset)?;
            found.extend(snapshot.records().iter().filter(|record| predicate(record)).cloned());
        }
        Ok(found)
    }

    /// Returns the region polygon set, loading it synchronously on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when polygons have never loaded or are expired.
    pub fn region_polygons(&self) -> Result<Arc<RegionPolygonSet>, CacheError> {
        self.get_or_load(CacheKey::RegionPolygons, &self.polygon_tracker, self.polygon_cell(), || {
            self.fetch_polygons()
        })
    }

    // ------------------------------------------------------------------------
    // Live Updates
    // ------------------------------------------------------------------------

    /// Adds `record` to its loaded dataset, replacing any record with the same
    /// row key, by publishing a copy of the snapshot. The dataset gate is held
    /// for the copy so the update cannot interleave with a refresh.
    ///
    /// Returns `false` when the dataset has not loaded yet; the first load
    /// reads the record from the store instead.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnknownDataset`] when the record's dataset is not
    /// configured for `authority`, or [`CacheError::InvalidRecord`] when the
    /// record would be dropped by a load.
    pub fn update_cache_objects(
        &self,
        authority: Authority,
        record: IncumbentRecord,
    ) -> Result<bool, CacheError> {
        let dataset = record.kind.dataset();
        let key = CacheKey::Incumbents { authority, dataset };
        let (cache, slot) = self
            .registry
            .slot(authority, dataset)
            .ok_or_else(|| CacheError::UnknownDataset(key.to_string()))?;
        if record.partition_key != dataset.partition_for(authority) {
            return Err(CacheError::InvalidRecord(format!(
                "incumbent {} is not in partition {key}",
                record.row_key
            )));
        }
        record.validate(&cache.channels).map_err(CacheError::InvalidRecord)?;

        let guard = slot.tracker.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = slot.cell.load() else {
            return Ok(false);
        };
        let mut records = current.records().to_vec();
        match records.iter_mut().find(|existing| existing.row_key == record.row_key) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        let count = records.len();
        slot.cell.swap(Arc::new(IncumbentSnapshot::new(records)));
        drop(guard);
        self.emit(CacheEventKind::Loaded, key, |event| {
            event.with_records(count).with_message("live update")
        });
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------------

    /// Loads every dataset once. Failures leave the dataset empty and are
    /// reported rather than aborting startup.
    pub fn download_all(&self) -> DownloadReport {
        let mut report = DownloadReport::default();
        for key in self.keys() {
            match self.refresh_with(key, GateMode::Block, true) {
                Ok(outcome) if outcome.is_success() => report.loaded.push(key),
                Ok(RefreshOutcome::Failed { reason }) => report.failed.push((key, reason)),
                Ok(outcome) => report.failed.push((key, outcome.label().to_string())),
                Err(err) => report.failed.push((key, err.to_string())),
            }
        }
        report
    }

    /// Periodic refresh of one dataset. A busy gate absorbs the call.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnknownDataset`] for an unconfigured key.
    pub fn refresh(&self, key: CacheKey) -> Result<RefreshOutcome, CacheError> {
        self.refresh_with(key, GateMode::Try, false)
    }

    /// Refreshes every dataset whose next refresh time has passed.
    #[must_use]
    pub fn refresh_due(&self) -> Vec<(CacheKey, RefreshOutcome)> {
        let now = self.clock.now();
        self.keys()
            .into_iter()
            .filter(|key| self.tracker(*key).is_some_and(|tracker| tracker.meta().next_due <= now))
            .filter_map(|key| self.refresh(key).ok().map(|outcome| (key, outcome)))
            .collect()
    }

    /// Per-dataset status.
    #[must_use]
    pub fn status(&self) -> Vec<CacheStatus> {
        let now = self.clock.now();
        self.keys()
            .into_iter()
            .filter_map(|key| {
                let tracker = self.tracker(key)?;
                let records = match key {
                    CacheKey::RegionPolygons => {
                        self.polygon_cell().load().map(|set| set.record_count())
                    }
                    CacheKey::Incumbents { authority, dataset } => self
                        .registry
                        .slot(authority, dataset)
                        .and_then(|(_, slot)| slot.cell.load())
                        .map(|snapshot| snapshot.record_count()),
                };
                let meta = tracker.meta();
                let state = match (meta.loading, records) {
                    (true, _) => CacheState::Loading,
                    (false, None) => CacheState::Empty,
                    (false, Some(_)) => {
                        let failed = meta.last_outcome.as_ref().is_some_and(|outcome| {
                            matches!(outcome, RefreshOutcome::Failed { .. })
                        });
                        if failed || meta.next_due <= now {
                            CacheState::Stale
                        } else {
                            CacheState::Fresh
                        }
                    }
                };
                Some(CacheStatus {
                    key,
                    state,
                    records: records.unwrap_or(0),
                    last_modified: meta.last_modified,
                    verified_at: meta.verified_at,
                    next_due: meta.next_due,
                    last_outcome: meta.last_outcome.as_ref().map(|o| o.label().to_string()),
                    last_error: meta.last_error.clone(),
                    attempts: meta.attempts,
                    failures: meta.failures,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Polygon snapshot cell.
    const fn polygon_cell(&self) -> &SnapshotCell<RegionPolygonSet> {
        &self.polygons
    }

    /// Tracker for a key.
    fn tracker(&self, key: CacheKey) -> Option<&RefreshTracker> {
        match key {
            CacheKey::RegionPolygons => Some(&self.polygon_tracker),
            CacheKey::Incumbents { authority, dataset } => {
                self.registry.slot(authority, dataset).map(|(_, slot)| &slot.tracker)
            }
        }
    }

    /// Dispatches a refresh to the right dataset.
    fn refresh_with(
        &self,
        key: CacheKey,
        mode: GateMode,
        force: bool,
    ) -> Result<RefreshOutcome, CacheError> {
        match key {
            CacheKey::RegionPolygons => Ok(self.run_refresh(
                key,
                &self.polygon_tracker,
                self.polygon_cell(),
                mode,
                force,
                || self.fetch_polygons(),
            )),
            CacheKey::Incumbents { authority, dataset } => {
                let (cache, slot) = self
                    .registry
                    .slot(authority, dataset)
                    .ok_or_else(|| CacheError::UnknownDataset(key.to_string()))?;
                Ok(self.run_refresh(key, &slot.tracker, &slot.cell, mode, force, || {
                    self.fetch_incumbents(cache, dataset)
                }))
            }
        }
    }

    /// Returns the snapshot, paying for the first load exactly once.
    fn get_or_load<T: PartialEq + SnapshotSize>(
        &self,
        key: CacheKey,
        tracker: &RefreshTracker,
        cell: &SnapshotCell<T>,
        fetch: impl FnOnce() -> Result<(T, usize), StoreError>,
    ) -> Result<Arc<T>, CacheError> {
        if let Some(snapshot) = cell.load() {
            return self.check_age(key, tracker, snapshot);
        }
        let seen_attempts = tracker.meta().attempts;
        let guard = tracker.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(snapshot) = cell.load() {
            drop(guard);
            return self.check_age(key, tracker, snapshot);
        }
        if tracker.meta().attempts != seen_attempts {
            drop(guard);
            self.emit(CacheEventKind::Degraded, key, |event| {
                event.with_message("first load already attempted and failed")
            });
            return Err(CacheError::NeverLoaded(key.to_string()));
        }
        self.refresh_locked(key, tracker, cell, true, fetch);
        drop(guard);
        match cell.load() {
            Some(snapshot) => Ok(snapshot),
            None => {
                self.emit(CacheEventKind::Degraded, key, |event| {
                    event.with_message("no snapshot available")
                });
                Err(CacheError::NeverLoaded(key.to_string()))
            }
        }
    }

    /// Refuses snapshots older than the allowed age.
    fn check_age<T>(
        &self,
        key: CacheKey,
        tracker: &RefreshTracker,
        snapshot: Arc<T>,
    ) -> Result<Arc<T>, CacheError> {
        let verified_at = tracker.meta().verified_at;
        let max_age = u64::try_from(self.settings.max_snapshot_age.as_millis()).unwrap_or(u64::MAX);
        let age = verified_at.map(|at| self.clock.now().millis_since(at));
        match age {
            Some(age) if age <= max_age => Ok(snapshot),
            _ => {
                self.emit(CacheEventKind::Degraded, key, |event| {
                    event.with_message(format!("snapshot older than {max_age} ms refused"))
                });
                Err(CacheError::SnapshotExpired(key.to_string()))
            }
        }
    }

    /// Acquires the gate per `mode` and runs the refresh.
    fn run_refresh<T: PartialEq + SnapshotSize>(
        &self,
        key: CacheKey,
        tracker: &RefreshTracker,
        cell: &SnapshotCell<T>,
        mode: GateMode,
        force: bool,
        fetch: impl FnOnce() -> Result<(T, usize), StoreError>,
    ) -> RefreshOutcome {
        let guard = match mode {
            GateMode::Block => tracker.gate.lock().unwrap_or_else(PoisonError::into_inner),
            GateMode::Try => match tracker.gate.try_lock() {
                Ok(guard) => guard,
                Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(std::sync::TryLockError::WouldBlock) => {
                    self.emit(CacheEventKind::RefreshSkipped, key, |event| {
                        event.with_message("refresh already in flight")
                    });
                    return RefreshOutcome::Skipped { reason: SkipReason::InFlight };
                }
            },
        };
        let outcome = self.refresh_locked(key, tracker, cell, force, fetch);
        drop(guard);
        outcome
    }

    /// Refresh body; the caller holds the gate.
    fn refresh_locked<T: PartialEq + SnapshotSize>(
        &self,
        key: CacheKey,
        tracker: &RefreshTracker,
        cell: &SnapshotCell<T>,
        force: bool,
        fetch: impl FnOnce() -> Result<(T, usize), StoreError>,
    ) -> RefreshOutcome {
        let started_at = self.clock.now();
        let recorded_modified = {
            let mut meta = tracker.meta();
            meta.loading = true;
            meta.last_modified
        };
        let current = cell.load();

        let outcome = match self.store.fetch_entity::<SyncStatus>(key.sync_scope(), key.dataset_label()) {
            Err(err) => {
                let reason = format!("sync status unavailable: {err}");
                self.emit(CacheEventKind::RefreshFailed, key, |event| {
                    event.with_message(reason.clone())
                });
                Err(reason)
            }
            Ok(status) => {
                let remote_modified = status.as_ref().map(|status| status.last_modified);
                let needs_update = status.as_ref().is_some_and(|status| status.needs_update);
                let not_modified = !force
                    && current.is_some()
                    && !needs_update
                    && remote_modified.is_some()
                    && recorded_modified >= remote_modified;
                if not_modified {
                    Ok((RefreshOutcome::Skipped { reason: SkipReason::NotModified }, remote_modified))
                } else {
                    tracker.meta().attempts += 1;
                    self.fetch_and_publish(key, cell, current.as_ref(), fetch)
                        .map(|outcome| (outcome, remote_modified))
                }
            }
        };

        let next_due = started_at.saturating_add_millis(
            i64::try_from(self.intervals.interval(&key).as_millis()).unwrap_or(i64::MAX),
        );
        let mut meta = tracker.meta();
        meta.loading = false;
        meta.next_due = next_due;
        let outcome = match outcome {
            Ok((outcome, remote_modified)) => {
                if remote_modified.is_some() {
                    meta.last_modified = remote_modified;
                }
                meta.verified_at = Some(started_at);
                meta.last_error = None;
                outcome
            }
            Err(reason) => {
                meta.failures += 1;
                meta.last_error = Some(reason.clone());
                RefreshOutcome::Failed { reason }
            }
        };
        meta.last_outcome = Some(outcome.clone());
        drop(meta);
        if let RefreshOutcome::Skipped { reason: SkipReason::NotModified } = outcome {
            self.emit(CacheEventKind::RefreshSkipped, key, |event| {
                event.with_message("sync status not modified")
            });
        }
        outcome
    }

    /// Fetches, enforces the timeout, and publishes unless unchanged.
    fn fetch_and_publish<T: PartialEq + SnapshotSize>(
        &self,
        key: CacheKey,
        cell: &SnapshotCell<T>,
        current: Option<&Arc<T>>,
        fetch: impl FnOnce() -> Result<(T, usize), StoreError>,
    ) -> Result<RefreshOutcome, String> {
        let timer = Instant::now();
        let fetched = fetch();
        let elapsed = timer.elapsed();
        if elapsed > self.settings.fetch_timeout {
            let reason = format!(
                "fetch took {} ms, limit {} ms; result discarded",
                elapsed.as_millis(),
                self.settings.fetch_timeout.as_millis()
            );
            self.emit(CacheEventKind::Timeout, key, |event| event.with_message(reason.clone()));
            return Err(reason);
        }
        let (value, dropped) = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                let reason = err.to_string();
                self.emit(CacheEventKind::RefreshFailed, key, |event| {
                    event.with_message(reason.clone())
                });
                return Err(reason);
            }
        };
        let records = value.record_count();
        if current.is_some_and(|current| **current == value) {
            self.emit(CacheEventKind::Unchanged, key, |event| {
                event.with_records(records).with_dropped(dropped)
            });
            return Ok(RefreshOutcome::Unchanged { records });
        }
        cell.swap(Arc::new(value));
        self.emit(CacheEventKind::Loaded, key, |event| {
            event.with_records(records).with_dropped(dropped)
        });
        Ok(RefreshOutcome::Reloaded { records, dropped })
    }

    /// Loads an authority dataset, dropping records that fail validation.
    fn fetch_incumbents(
        &self,
        cache: &ServiceCache,
        dataset: DatasetKind,
    ) -> Result<(IncumbentSnapshot, usize), StoreError> {
        let partition = dataset.partition_for(cache.authority);
        let rows = self.store.fetch_partition(IncumbentRecord::TABLE, &partition)?;
        let mut dropped = 0;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let valid = decode_row::<IncumbentRecord>(row).ok().filter(|record| {
                record.kind.dataset() == dataset && record.validate(&cache.channels).is_ok()
            });
            match valid {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }
        Ok((IncumbentSnapshot::new(records), dropped))
    }

    /// Loads polygons for every configured region.
    fn fetch_polygons(&self) -> Result<(RegionPolygonSet, usize), StoreError> {
        RegionPolygonSet::load(&self.store, &self.region_codes)
    }

    /// Emits a cache event built by `build`.
    fn emit(&self, kind: CacheEventKind, key: CacheKey, build: impl FnOnce(CacheEvent) -> CacheEvent) {
        let event = CacheEvent::new(kind, self.clock.now(), key.authority(), key.dataset_label());
        self.events.record(&build(event));
    }
}

/// How a refresh acquires the dataset gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateMode {
    /// Wait for the gate.
    Block,
    /// Give up when the gate is busy.
    Try,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
