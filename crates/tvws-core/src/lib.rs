// crates/tvws-core/src/lib.rs
// ============================================================================
// Module: TVWS Core Library
// Description: Public API surface for the TV white space database core.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The TVWS core holds the incumbent-protection cache and the spectrum
//! availability engine. It is backend-agnostic: persistence, clocks, and
//! operational logging are reached through the traits in [`interfaces`], so the
//! same engine serves the PAWS protocol layer, offline tooling, and tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CacheEventSink;
pub use interfaces::Clock;
pub use interfaces::IncumbentStore;
pub use interfaces::IncumbentStoreExt;
pub use interfaces::NoopCacheEventSink;
pub use interfaces::RefreshIntervals;
pub use interfaces::StoreEntity;
pub use interfaces::StoreError;
pub use interfaces::StoredRow;
pub use runtime::AvailabilityEngine;
pub use runtime::AvailabilityError;
pub use runtime::AvailabilityQuery;
pub use runtime::AvailabilityResult;
pub use runtime::CacheError;
pub use runtime::CacheManager;
pub use runtime::CacheSettings;
pub use runtime::CacheState;
pub use runtime::CacheStatus;
pub use runtime::DownloadReport;
pub use runtime::InMemoryIncumbentStore;
pub use runtime::IncumbentSnapshot;
pub use runtime::ManualClock;
pub use runtime::RefreshOutcome;
pub use runtime::RegionPolygonSet;
pub use runtime::RegionPolygons;
pub use runtime::ServiceCache;
pub use runtime::ServiceCacheRegistry;
pub use runtime::SharedIncumbentStore;
pub use runtime::SkipReason;
pub use runtime::StaticIntervals;
pub use runtime::SystemClock;
