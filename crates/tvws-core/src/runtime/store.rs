// crates/tvws-core/src/runtime/store.rs
// ============================================================================
// Module: TVWS In-Memory Store
// Description: In-memory incumbent store and shared store wrapper.
// Purpose: Provide a deterministic store for tests, demos, and memory mode.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryIncumbentStore`] keeps rows in ordered maps keyed by table,
//! partition, and row, so partition scans return rows in row-key order like
//! the durable backend does. [`SharedIncumbentStore`] erases the backend type
//! so the cache, protocol layer, and CLI can hold one clonable handle.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::interfaces::IncumbentStore;
use crate::interfaces::StoreError;
use crate::interfaces::StoredRow;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Rows of one table grouped by partition then row key.
type TableRows = BTreeMap<String, BTreeMap<String, Value>>;

/// In-memory incumbent store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIncumbentStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<BTreeMap<String, TableRows>>>,
}

impl InMemoryIncumbentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the table map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, TableRows>>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("incumbent store mutex poisoned".to_string()))
    }
}

impl IncumbentStore for InMemoryIncumbentStore {
    fn fetch_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredRow>, StoreError> {
        let guard = self.lock()?;
        let payload = guard
            .get(table)
            .and_then(|partitions| partitions.get(partition_key))
            .and_then(|rows| rows.get(row_key))
            .cloned();
        Ok(payload.map(|payload| StoredRow {
            partition_key: partition_key.to_string(),
            row_key: row_key.to_string(),
            payload,
        }))
    }

    fn fetch_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<StoredRow>, StoreError> {
        let guard = self.lock()?;
        let Some(rows) = guard.get(table).and_then(|partitions| partitions.get(partition_key))
        else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .map(|(row_key, payload)| StoredRow {
                partition_key: partition_key.to_string(),
                row_key: row_key.clone(),
                payload: payload.clone(),
            })
            .collect())
    }

    fn upsert_row(&self, table: &str, row: StoredRow) -> Result<(), StoreError> {
        self.lock()?
            .entry(table.to_string())
            .or_default()
            .entry(row.partition_key)
            .or_default()
            .insert(row.row_key, row.payload);
        Ok(())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared incumbent store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedIncumbentStore {
    /// Inner store implementation.
    inner: Arc<dyn IncumbentStore + Send + Sync>,
}

impl SharedIncumbentStore {
    /// Wraps a store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl IncumbentStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn IncumbentStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl IncumbentStore for SharedIncumbentStore {
    fn fetch_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredRow>, StoreError> {
        self.inner.fetch_row(table, partition_key, row_key)
    }

    fn fetch_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<StoredRow>, StoreError> {
        self.inner.fetch_partition(table, partition_key)
    }

    fn upsert_row(&self, table: &str, row: StoredRow) -> Result<(), StoreError> {
        self.inner.upsert_row(table, row)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}
