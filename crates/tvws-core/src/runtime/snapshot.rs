// crates/tvws-core/src/runtime/snapshot.rs
// ============================================================================
// Module: TVWS Snapshot Cell
// Description: Copy-on-write snapshot pointer.
// Purpose: Publish immutable datasets to concurrent readers atomically.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`SnapshotCell`] holds an optional `Arc` to an immutable value. Readers
//! clone the `Arc` under a read lock held only for the clone; writers replace
//! it under a write lock held only for the swap. A reader therefore sees the
//! previous complete value or the next complete value, never a mix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

// ============================================================================
// SECTION: Snapshot Cell
// ============================================================================

/// Atomically swappable snapshot pointer.
#[derive(Debug)]
pub struct SnapshotCell<T> {
    /// Current snapshot, if any has been published.
    current: RwLock<Option<Arc<T>>>,
}

impl<T> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self { current: RwLock::new(None) }
    }
}

impl<T> SnapshotCell<T> {
    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Option<Arc<T>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Publishes a new snapshot.
    pub fn swap(&self, next: Arc<T>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(next);
    }
}
