// crates/tvws-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Incumbent Store
// Description: Durable IncumbentStore backend using SQLite.
// Purpose: Persist incumbents, region polygons, sync status, and registrations.
// Dependencies: tvws-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`IncumbentStore`] implementation. All
//! entity tables share one keyed `entities` table, so the store needs no
//! schema change when a new entity kind is added.
//!
//! [`IncumbentStore`]: tvws_core::IncumbentStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_PAYLOAD_BYTES;
pub use store::SqliteIncumbentStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
