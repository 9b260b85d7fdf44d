// crates/tvws-core/src/core/time.rs
// ============================================================================
// Module: TVWS Time Model
// Description: Millisecond timestamps and incumbent validity windows.
// Purpose: Provide deterministic time values for cache and protection logic.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Timestamps are unix epoch milliseconds. The core never reads the wall clock
//! directly; callers pass a [`Timestamp`] obtained from an injected
//! [`crate::interfaces::Clock`]. RFC 3339 rendering is provided for protocol
//! payloads, which carry times as strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while converting timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The RFC 3339 text could not be parsed.
    #[error("invalid rfc3339 timestamp: {0}")]
    Parse(String),
    /// The timestamp is outside the representable calendar range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(String),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix epoch timestamp in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The unix epoch.
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns a timestamp offset by the given milliseconds, saturating.
    #[must_use]
    pub const fn saturating_add_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns the milliseconds elapsed from `earlier` to `self`, or zero when
    /// `earlier` is later.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> u64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta <= 0 { 0 } else { delta.unsigned_abs() }
    }

    /// Parses an RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Parse`] when the input is not valid RFC 3339, or
    /// [`TimeError::OutOfRange`] when it does not fit in i64 milliseconds.
    pub fn parse_rfc3339(value: &str) -> Result<Self, TimeError> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| TimeError::Parse(err.to_string()))?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis)
            .map(Self)
            .map_err(|_| TimeError::OutOfRange(value.to_string()))
    }

    /// Renders the timestamp as RFC 3339 in UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] when the timestamp is outside the
    /// calendar range supported by the `time` crate.
    pub fn to_rfc3339(self) -> Result<String, TimeError> {
        let nanos = i128::from(self.0) * 1_000_000;
        let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|err| TimeError::OutOfRange(err.to_string()))?;
        datetime.format(&Rfc3339).map_err(|err| TimeError::OutOfRange(err.to_string()))
    }
}

/// Serde adapter that carries a [`Timestamp`] as an RFC 3339 string.
pub mod rfc3339 {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::de::Error as _;
    use serde::ser::Error as _;

    use super::Timestamp;

    /// Serializes a timestamp as RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns a serializer error when the timestamp cannot be rendered.
    pub fn serialize<S: Serializer>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        let text = value.to_rfc3339().map_err(S::Error::custom)?;
        serializer.serialize_str(&text)
    }

    /// Deserializes a timestamp from RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns a deserializer error when the text is not valid RFC 3339.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let text = String::deserialize(deserializer)?;
        Timestamp::parse_rfc3339(&text).map_err(D::Error::custom)
    }
}

// ============================================================================
// SECTION: Validity Window
// ============================================================================

/// Half-open activity window `[start, end)` for an incumbent protection.
///
/// A missing `end` means the protection never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// Start of protection.
    pub start: Timestamp,
    /// End of protection, exclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
}

impl ValidityWindow {
    /// Returns true when the protection applies at `at`.
    #[must_use]
    pub fn is_active_at(&self, at: Timestamp) -> bool {
        at >= self.start && self.end.is_none_or(|end| at < end)
    }

    /// Returns true when the protection overlaps the event window `[start, stop)`.
    #[must_use]
    pub fn overlaps(&self, start: Timestamp, stop: Timestamp) -> bool {
        let ends_after_start = self.end.is_none_or(|end| end > start);
        ends_after_start && self.start < stop
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
