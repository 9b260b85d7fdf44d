// crates/tvws-core/src/interfaces/mod.rs
// ============================================================================
// Module: TVWS Interfaces
// Description: Backend-agnostic interfaces for storage, time, and cache events.
// Purpose: Define the contract surfaces the cache and engine depend on.
// Dependencies: crate::core, serde, serde_json
// ============================================================================

//! ## Overview
//! The core reaches every external collaborator through a trait defined here:
//! the partitioned incumbent store, the clock, refresh intervals, and the
//! operational event sink. Implementations must never panic on bad data;
//! they report it through the error types so the cache can fall back to the
//! last good snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::core::CacheEvent;
use crate::core::CacheKey;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Incumbent Store
// ============================================================================

/// Incumbent store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store could not be reached. Transient.
    #[error("incumbent store unavailable: {0}")]
    Unavailable(String),
    /// Requested entity does not exist.
    #[error("incumbent store entity not found: {0}")]
    NotFound(String),
    /// Stored data failed to decode or integrity checks.
    #[error("incumbent store corruption: {0}")]
    Corrupt(String),
    /// Caller supplied invalid keys or payloads.
    #[error("incumbent store invalid data: {0}")]
    Invalid(String),
}

/// Raw keyed row as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Partition key.
    pub partition_key: String,
    /// Row key, unique within the partition.
    pub row_key: String,
    /// JSON payload of the entity.
    pub payload: Value,
}

/// Partitioned key-value store holding incumbents and related tables.
///
/// The trait works on raw JSON rows so it stays object safe; typed access is
/// provided by [`IncumbentStoreExt`].
pub trait IncumbentStore {
    /// Fetches one row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn fetch_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredRow>, StoreError>;

    /// Fetches every row in a partition, ordered by row key. No match yields
    /// an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store cannot be read.
    fn fetch_partition(&self, table: &str, partition_key: &str)
    -> Result<Vec<StoredRow>, StoreError>;

    /// Inserts or replaces a row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_row(&self, table: &str, row: StoredRow) -> Result<(), StoreError>;

    /// Reports store readiness.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Typed entity persisted in an [`IncumbentStore`] table.
pub trait StoreEntity: Serialize + DeserializeOwned {
    /// Table the entity lives in.
    const TABLE: &'static str;

    /// Partition key of this entity.
    fn partition_key(&self) -> &str;

    /// Row key of this entity.
    fn row_key(&self) -> &str;
}

/// Typed helpers over [`IncumbentStore`].
pub trait IncumbentStoreExt: IncumbentStore {
    /// Fetches one entity by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when the row does not decode.
    fn fetch_entity<T: StoreEntity>(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.fetch_row(T::TABLE, partition_key, row_key)?
            .map(|row| decode_row::<T>(row))
            .transpose()
    }

    /// Fetches every entity in a partition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when any row does not decode.
    fn fetch_by_partition<T: StoreEntity>(&self, partition_key: &str) -> Result<Vec<T>, StoreError> {
        self.fetch_partition(T::TABLE, partition_key)?.into_iter().map(decode_row::<T>).collect()
    }

    /// Inserts or replaces an entity under its own keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for empty keys or unserializable payloads.
    fn insert_or_replace<T: StoreEntity>(&self, entity: &T) -> Result<(), StoreError> {
        let partition_key = entity.partition_key().to_string();
        let row_key = entity.row_key().to_string();
        if partition_key.is_empty() || row_key.is_empty() {
            return Err(StoreError::Invalid(format!("{}: empty partition or row key", T::TABLE)));
        }
        let payload = serde_json::to_value(entity)
            .map_err(|err| StoreError::Invalid(format!("{}: {err}", T::TABLE)))?;
        self.upsert_row(T::TABLE, StoredRow { partition_key, row_key, payload })
    }
}

impl<S: IncumbentStore + ?Sized> IncumbentStoreExt for S {}

/// Decodes a raw row into an entity.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] naming the row when decoding fails.
pub fn decode_row<T: StoreEntity>(row: StoredRow) -> Result<T, StoreError> {
    serde_json::from_value(row.payload).map_err(|err| {
        StoreError::Corrupt(format!("{} {}/{}: {err}", T::TABLE, row.partition_key, row.row_key))
    })
}

// ============================================================================
// SECTION: Time
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

// ============================================================================
// SECTION: Refresh Intervals
// ============================================================================

/// Per-dataset refresh intervals, consulted on every timer fire.
pub trait RefreshIntervals: Send + Sync {
    /// Returns the interval before the next refresh of `key`.
    fn interval(&self, key: &CacheKey) -> Duration;
}

// ============================================================================
// SECTION: Cache Events
// ============================================================================

/// Sink for structured cache events.
pub trait CacheEventSink: Send + Sync {
    /// Records a cache event.
    fn record(&self, event: &CacheEvent);
}

/// Cache event sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheEventSink;

impl CacheEventSink for NoopCacheEventSink {
    fn record(&self, _event: &CacheEvent) {}
}
