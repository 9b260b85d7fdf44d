// crates/tvws-core/src/runtime/mod.rs
// ============================================================================
// Module: TVWS Runtime
// Description: Stores, clocks, polygon index, incumbent cache, and engine.
// Purpose: Execute availability computations against cached incumbent data.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules hold every piece of mutable shared state in the system:
//! the snapshot pointers and refresh bookkeeping owned by [`CacheManager`].
//! Everything they publish is immutable; the [`AvailabilityEngine`] only
//! reads.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod cache;
pub mod clock;
pub mod engine;
pub mod polygon_index;
mod snapshot;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CacheError;
pub use cache::CacheManager;
pub use cache::CacheSettings;
pub use cache::CacheState;
pub use cache::CacheStatus;
pub use cache::DownloadReport;
pub use cache::IncumbentSnapshot;
pub use cache::RefreshOutcome;
pub use cache::ServiceCache;
pub use cache::ServiceCacheRegistry;
pub use cache::SkipReason;
pub use clock::ManualClock;
pub use clock::StaticIntervals;
pub use clock::SystemClock;
pub use engine::AvailabilityEngine;
pub use engine::AvailabilityError;
pub use engine::AvailabilityQuery;
pub use engine::AvailabilityResult;
pub use polygon_index::RegionPolygonSet;
pub use polygon_index::RegionPolygons;
pub use store::InMemoryIncumbentStore;
pub use store::SharedIncumbentStore;
