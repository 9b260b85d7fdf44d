// crates/tvws-core/src/core/events.rs
// ============================================================================
// Module: TVWS Cache Events
// Description: Structured operational events emitted by the incumbent cache.
// Purpose: Give operators a JSON-line trail of loads, skips, and degradations.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Cache events are emitted through [`crate::interfaces::CacheEventSink`]. They
//! always carry the full internal error text, since operators need it even
//! when the protocol response shows only a generic message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::Authority;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Cache event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEventKind {
    /// A new snapshot was published.
    #[serde(rename = "cache_loaded")]
    Loaded,
    /// A re-fetch matched the current snapshot; the pointer was kept.
    #[serde(rename = "cache_unchanged")]
    Unchanged,
    /// A refresh was absorbed by an in-flight refresh or an unchanged sync status.
    #[serde(rename = "cache_refresh_skipped")]
    RefreshSkipped,
    /// A refresh failed; the previous snapshot stays in place.
    #[serde(rename = "cache_refresh_failed")]
    RefreshFailed,
    /// A reader was served degraded data or refused because data is missing.
    #[serde(rename = "cache_degraded")]
    Degraded,
    /// A fetch exceeded the configured timeout and was discarded.
    #[serde(rename = "cache_timeout")]
    Timeout,
}

/// Structured cache event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// Event classification.
    pub event: CacheEventKind,
    /// Event time in unix milliseconds.
    pub timestamp_ms: i64,
    /// Owning authority, absent for region polygons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<Authority>,
    /// Dataset label.
    pub dataset: String,
    /// Records in the published snapshot, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    /// Records dropped because they failed validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped_records: Option<usize>,
    /// Internal diagnostic text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CacheEvent {
    /// Creates an event with no counts or message.
    #[must_use]
    pub fn new(
        event: CacheEventKind,
        at: Timestamp,
        authority: Option<Authority>,
        dataset: impl Into<String>,
    ) -> Self {
        Self {
            event,
            timestamp_ms: at.as_unix_millis(),
            authority,
            dataset: dataset.into(),
            record_count: None,
            dropped_records: None,
            message: None,
        }
    }

    /// Attaches a record count.
    #[must_use]
    pub const fn with_records(mut self, count: usize) -> Self {
        self.record_count = Some(count);
        self
    }

    /// Attaches a dropped-record count when it is non-zero.
    #[must_use]
    pub const fn with_dropped(mut self, dropped: usize) -> Self {
        if dropped > 0 {
            self.dropped_records = Some(dropped);
        }
        self
    }

    /// Attaches a diagnostic message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
