// crates/tvws-core/src/runtime/clock.rs
// ============================================================================
// Module: TVWS Clocks and Intervals
// Description: System and manual clocks plus static refresh intervals.
// Purpose: Make cache timing injectable and deterministic under test.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads wall time. [`ManualClock`] only moves when told to,
//! which lets tests drive `refresh_due` without sleeping. [`StaticIntervals`]
//! is the fixed interval table used when no reloadable source is configured.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::CacheKey;
use crate::core::DatasetKind;
use crate::core::Timestamp;
use crate::interfaces::Clock;
use crate::interfaces::RefreshIntervals;

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Wall-clock time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Timestamp::from_unix_millis(millis)
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    /// Current time in unix milliseconds.
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock fixed at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self { now_ms: Arc::new(AtomicI64::new(start.as_unix_millis())) }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        self.now_ms.store(at.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Static Intervals
// ============================================================================

/// Default incumbent dataset interval.
const DEFAULT_INCUMBENT_INTERVAL: Duration = Duration::from_secs(3_600);
/// Default PMSE interval.
const DEFAULT_PMSE_INTERVAL: Duration = Duration::from_secs(300);
/// Default region polygon interval.
const DEFAULT_POLYGON_INTERVAL: Duration = Duration::from_secs(43_200);

/// Fixed refresh interval table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIntervals {
    /// Interval per incumbent dataset kind.
    datasets: BTreeMap<DatasetKind, Duration>,
    /// Interval for region polygons.
    region_polygons: Duration,
}

impl Default for StaticIntervals {
    fn default() -> Self {
        let datasets = DatasetKind::ALL
            .into_iter()
            .map(|kind| {
                let interval = if kind == DatasetKind::Pmse {
                    DEFAULT_PMSE_INTERVAL
                } else {
                    DEFAULT_INCUMBENT_INTERVAL
                };
                (kind, interval)
            })
            .collect();
        Self { datasets, region_polygons: DEFAULT_POLYGON_INTERVAL }
    }
}

impl StaticIntervals {
    /// Overrides the interval for one dataset kind.
    #[must_use]
    pub fn with_dataset(mut self, kind: DatasetKind, interval: Duration) -> Self {
        self.datasets.insert(kind, interval);
        self
    }

    /// Overrides the region polygon interval.
    #[must_use]
    pub const fn with_region_polygons(mut self, interval: Duration) -> Self {
        self.region_polygons = interval;
        self
    }
}

impl RefreshIntervals for StaticIntervals {
    fn interval(&self, key: &CacheKey) -> Duration {
        match key {
            CacheKey::Incumbents { dataset, .. } => {
                self.datasets.get(dataset).copied().unwrap_or(DEFAULT_INCUMBENT_INTERVAL)
            }
            CacheKey::RegionPolygons => self.region_polygons,
        }
    }
}
