// crates/tvws-cli/src/lib.rs
// ============================================================================
// Module: TVWS CLI Library
// Description: Shared helpers for the tvws binary.
// Purpose: Keep import and sync logic testable outside the entry point.
// Dependencies: tvws-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The `tvws` binary is a thin wrapper. Bundle import and the partner sync
//! poller live here so integration tests can drive them against real stores.

pub mod import;
