// crates/tvws-config/src/lib.rs
// ============================================================================
// Module: TVWS Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for tvws.toml semantics.
// Dependencies: tvws-core, tvws-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `tvws-config` defines the canonical configuration model for the TV white
//! space database: server limits, the incumbent store backend, cache timing,
//! authorities, and region channel plans. Validation is strict and fails
//! closed; a config that loads is safe to build the cache and engine from.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;
pub mod intervals;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
pub use intervals::ReloadingIntervals;
