// crates/tvws-core/src/core/spectrum.rs
// ============================================================================
// Module: TVWS Spectrum Payloads
// Description: Channel, schedule, ruleset, and whitespace summary types.
// Purpose: Carry availability results to the protocol layer.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Spectrum payloads are produced by the availability engine and serialized
//! verbatim into PAWS responses. [`whitespace_summary`] performs the
//! contiguous-run analysis over a channel range.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::Authority;
use crate::core::RulesetId;
use crate::core::Timestamp;
use crate::core::time::rfc3339;

// ============================================================================
// SECTION: Channels
// ============================================================================

/// Power class assigned to an available channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    /// Device power at or above the region transition point.
    HighPower,
    /// Device power below the region transition point.
    LowPower,
}

/// Available channel with its frequency span and power limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    /// Channel number.
    pub channel: u32,
    /// Lower band edge in hertz.
    pub start_hz: f64,
    /// Upper band edge in hertz.
    pub stop_hz: f64,
    /// Maximum permitted EIRP in dBm.
    pub max_eirp_dbm: f64,
    /// Assigned power class.
    pub mode: OperatingMode,
}

/// Why a channel was excluded. Retained for diagnostics and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exclusion {
    /// Excluded channel.
    pub channel: u32,
    /// Incumbent kind label, or `prohibited_channel` for a device class rule.
    pub incumbent_kind: String,
    /// Incumbent call sign, possibly empty.
    pub call_sign: String,
    /// Incumbent store row key; the device type for a class rule.
    pub row_key: String,
    /// True when excluded as a neighbour of the protected channel.
    #[serde(default)]
    pub adjacent: bool,
}

// ============================================================================
// SECTION: Whitespace Summary
// ============================================================================

/// Contiguous free-channel run statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitespaceSummary {
    /// Number of free channels.
    pub free_channels: usize,
    /// Number of contiguous free runs.
    pub run_count: usize,
    /// Narrowest run width in channels.
    pub min_run_width: usize,
    /// Median run width (index `len / 2` of the sorted widths).
    pub median_run_width: usize,
    /// Widest run width in channels.
    pub max_run_width: usize,
}

/// Scans `[start, end]` left to right and summarizes runs of free channels.
///
/// Widths are sorted ascending and the median is the element at index
/// `len / 2`. An empty free set yields an all-zero summary.
#[must_use]
pub fn whitespace_summary(free: &BTreeSet<u32>, start: u32, end: u32) -> WhitespaceSummary {
    let mut widths = Vec::new();
    let mut run = 0_usize;
    for channel in start..=end {
        if free.contains(&channel) {
            run += 1;
        } else if run > 0 {
            widths.push(run);
            run = 0;
        }
    }
    if run > 0 {
        widths.push(run);
    }
    widths.sort_unstable();
    let (Some(min), Some(max), Some(median)) =
        (widths.first(), widths.last(), widths.get(widths.len() / 2))
    else {
        return WhitespaceSummary::default();
    };
    WhitespaceSummary {
        free_channels: widths.iter().sum(),
        run_count: widths.len(),
        min_run_width: *min,
        median_run_width: *median,
        max_run_width: *max,
    }
}

// ============================================================================
// SECTION: Schedules and Rulesets
// ============================================================================

/// Time span a schedule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    /// Start of the span.
    #[serde(with = "rfc3339")]
    pub start_time: Timestamp,
    /// End of the span.
    #[serde(with = "rfc3339")]
    pub stop_time: Timestamp,
}

/// Channels available over an event time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumSchedule {
    /// Applicable span.
    pub event_time: EventTime,
    /// Available channels with power limits.
    pub spectra: Vec<ChannelInfo>,
}

/// Ruleset parameters returned by init and registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesetInfo {
    /// Regulatory authority.
    pub authority: Authority,
    /// Ruleset identifier.
    pub ruleset_id: RulesetId,
    /// Distance in metres a device may move before re-querying.
    pub max_location_change: f64,
    /// Maximum seconds between availability polls.
    pub max_polling_secs: u64,
    /// First channel in the region.
    pub start_channel: u32,
    /// Last channel in the region.
    pub end_channel: u32,
    /// Region EIRP ceiling in dBm.
    pub max_eirp_dbm: f64,
    /// High/low power transition in dBm.
    pub power_transition_dbm: f64,
}

/// Availability result for one ruleset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumSpec {
    /// Ruleset the schedule conforms to.
    pub ruleset_info: RulesetInfo,
    /// Schedules of available channels.
    pub spectrum_schedules: Vec<SpectrumSchedule>,
    /// Whether the device must report its spectrum use.
    pub needs_spectrum_report: bool,
    /// Total bandwidth available in hertz.
    pub max_total_bw_hz: f64,
    /// Widest contiguous bandwidth available in hertz.
    pub max_contiguous_bw_hz: f64,
}
