// crates/tvws-core/src/core/region.rs
// ============================================================================
// Module: TVWS Region Rules
// Description: Per-region channel plans, power limits, and protection distances.
// Purpose: Provide the ruleset parameters the engine applies to a location.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A region maps a contiguous channel range onto frequencies with a fixed
//! channel bandwidth, and fixes the power transition point that splits
//! high-power from low-power operation. Protection distances are nominal per
//! incumbent kind; records may carry their own radius which takes precedence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Authority;
use crate::core::DatasetKind;
use crate::core::DeviceType;
use crate::core::OperatingMode;
use crate::core::RegionCode;
use crate::core::RulesetId;
use crate::core::RulesetInfo;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Region rule validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionRulesError {
    /// A region definition is internally inconsistent.
    #[error("region {region}: {reason}")]
    Invalid {
        /// Offending region.
        region: String,
        /// Violated rule.
        reason: String,
    },
    /// Two regions share a code.
    #[error("duplicate region code: {0}")]
    Duplicate(String),
}

// ============================================================================
// SECTION: Kind Distances
// ============================================================================

/// Optional per-kind distances in kilometres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindDistances {
    /// TV engineering data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tv_engineering_data: Option<f64>,
    /// Low-power auxiliary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lp_aux: Option<f64>,
    /// PMSE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmse: Option<f64>,
    /// TBAS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tbas: Option<f64>,
    /// MVPD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mvpd: Option<f64>,
}

impl KindDistances {
    /// Returns the configured distance for a dataset kind.
    #[must_use]
    pub const fn get(&self, kind: DatasetKind) -> Option<f64> {
        match kind {
            DatasetKind::TvEngineeringData => self.tv_engineering_data,
            DatasetKind::LpAux => self.lp_aux,
            DatasetKind::Pmse => self.pmse,
            DatasetKind::Tbas => self.tbas,
            DatasetKind::Mvpd => self.mvpd,
        }
    }

    /// Checks every configured distance is finite and non-negative.
    fn check(&self, label: &str) -> Result<(), String> {
        for kind in DatasetKind::ALL {
            if let Some(value) = self.get(kind)
                && (!value.is_finite() || value < 0.0)
            {
                return Err(format!("{label}.{} must be finite and >= 0", kind.as_str()));
            }
        }
        Ok(())
    }
}

/// Nominal protection radius when neither region nor record configures one.
const fn default_radius_km(kind: DatasetKind) -> f64 {
    match kind {
        DatasetKind::TvEngineeringData => 10.0,
        DatasetKind::LpAux | DatasetKind::Pmse => 1.0,
        DatasetKind::Tbas | DatasetKind::Mvpd => 8.0,
    }
}

// ============================================================================
// SECTION: Device Classes
// ============================================================================

/// Channel and power limits for one device class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceClassLimits {
    /// Channels the class may never use.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prohibited_channels: Vec<u32>,
    /// EIRP ceiling for the class in dBm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_eirp_dbm: Option<f64>,
    /// EIRP ceiling on a channel next to a protected TV channel. Ignored when
    /// adjacent channels are excluded outright.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjacent_eirp_dbm: Option<f64>,
}

impl DeviceClassLimits {
    /// Returns true when the class may not use `channel`.
    #[must_use]
    pub fn prohibits(&self, channel: u32) -> bool {
        self.prohibited_channels.contains(&channel)
    }

    /// Class ceiling applied to `eirp_dbm`.
    #[must_use]
    pub fn cap_eirp_dbm(&self, eirp_dbm: f64) -> f64 {
        self.max_eirp_dbm.map_or(eirp_dbm, |cap| eirp_dbm.min(cap))
    }

    /// Checks power limits are finite.
    fn check(&self, label: &str) -> Result<(), String> {
        let finite = |value: Option<f64>| value.is_none_or(f64::is_finite);
        if finite(self.max_eirp_dbm) && finite(self.adjacent_eirp_dbm) {
            Ok(())
        } else {
            Err(format!("device_classes.{label} power limits must be finite"))
        }
    }
}

/// Limits per device class: fixed, portable (Mode I and II), and the
/// event-scheduled auxiliary devices (LPAUX and TBAS).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceClassRules {
    /// Fixed devices.
    #[serde(default)]
    pub fixed: DeviceClassLimits,
    /// Mode I and Mode II devices.
    #[serde(default)]
    pub portable: DeviceClassLimits,
    /// LPAUX and TBAS devices.
    #[serde(default)]
    pub auxiliary: DeviceClassLimits,
}

impl DeviceClassRules {
    /// Limits for a device type.
    #[must_use]
    pub const fn for_device(&self, device_type: DeviceType) -> &DeviceClassLimits {
        match device_type {
            DeviceType::Fixed => &self.fixed,
            DeviceType::ModeI | DeviceType::ModeII => &self.portable,
            DeviceType::LpAux | DeviceType::Tbas => &self.auxiliary,
        }
    }
}

// ============================================================================
// SECTION: Region Rules
// ============================================================================

/// Channel plan and protection parameters for one regulatory region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionRules {
    /// Region code.
    pub code: RegionCode,
    /// Owning authority.
    pub authority: Authority,
    /// First channel, inclusive.
    pub start_channel: u32,
    /// Last channel, inclusive.
    pub end_channel: u32,
    /// Lower edge of `start_channel` in MHz.
    pub start_frequency_mhz: f64,
    /// Channel bandwidth in MHz.
    pub channel_bandwidth_mhz: f64,
    /// Device EIRP at or above which operation is high power.
    pub power_dbm_transition_point: f64,
    /// Region EIRP ceiling in dBm.
    pub max_eirp_dbm: f64,
    /// Rulesets offered in the region.
    pub ruleset_ids: Vec<RulesetId>,
    /// Metres a device may move before re-querying.
    #[serde(default = "default_max_location_change_m")]
    pub max_location_change_m: f64,
    /// Seconds between availability polls.
    #[serde(default = "default_max_polling_secs")]
    pub max_polling_secs: u64,
    /// Nominal protection radii per incumbent kind.
    #[serde(default)]
    pub protection_radius_km: KindDistances,
    /// Extra separation added to every protection per incumbent kind.
    #[serde(default)]
    pub min_separation_km: KindDistances,
    /// Also exclude channels adjacent to protected TV channels for fixed devices.
    #[serde(default)]
    pub adjacent_channel_protection: bool,
    /// Whether devices must report spectrum use after a query.
    #[serde(default)]
    pub needs_spectrum_report: bool,
    /// Channel and power limits per device class.
    #[serde(default)]
    pub device_classes: DeviceClassRules,
}

/// Default location-change allowance.
const fn default_max_location_change_m() -> f64 {
    100.0
}

/// Default polling interval.
const fn default_max_polling_secs() -> u64 {
    86_400
}

impl RegionRules {
    /// Validates the channel plan and distances.
    ///
    /// # Errors
    ///
    /// Returns [`RegionRulesError::Invalid`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), RegionRulesError> {
        let invalid = |reason: String| RegionRulesError::Invalid {
            region: self.code.to_string(),
            reason,
        };
        if self.code.as_str().is_empty() {
            return Err(invalid("code must be non-empty".to_string()));
        }
        if self.start_channel > self.end_channel {
            return Err(invalid(format!(
                "start_channel {} exceeds end_channel {}",
                self.start_channel, self.end_channel
            )));
        }
        if !self.channel_bandwidth_mhz.is_finite() || self.channel_bandwidth_mhz <= 0.0 {
            return Err(invalid("channel_bandwidth_mhz must be > 0".to_string()));
        }
        if !self.start_frequency_mhz.is_finite() || self.start_frequency_mhz <= 0.0 {
            return Err(invalid("start_frequency_mhz must be > 0".to_string()));
        }
        if !self.power_dbm_transition_point.is_finite() || !self.max_eirp_dbm.is_finite() {
            return Err(invalid("power limits must be finite".to_string()));
        }
        if !self.max_location_change_m.is_finite() || self.max_location_change_m < 0.0 {
            return Err(invalid("max_location_change_m must be >= 0".to_string()));
        }
        if self.ruleset_ids.is_empty() {
            return Err(invalid("ruleset_ids must be non-empty".to_string()));
        }
        self.protection_radius_km.check("protection_radius_km").map_err(invalid)?;
        self.min_separation_km.check("min_separation_km").map_err(invalid)?;
        self.device_classes.fixed.check("fixed").map_err(invalid)?;
        self.device_classes.portable.check("portable").map_err(invalid)?;
        self.device_classes.auxiliary.check("auxiliary").map_err(invalid)?;
        Ok(())
    }

    /// Configured channel range.
    #[must_use]
    pub const fn channels(&self) -> RangeInclusive<u32> {
        self.start_channel..=self.end_channel
    }

    /// Band edges of `channel` in hertz, or `None` outside the range.
    #[must_use]
    pub fn channel_frequency_hz(&self, channel: u32) -> Option<(f64, f64)> {
        if !self.channels().contains(&channel) {
            return None;
        }
        let offset = f64::from(channel - self.start_channel);
        let start_mhz = self.channel_bandwidth_mhz.mul_add(offset, self.start_frequency_mhz);
        let stop_mhz = start_mhz + self.channel_bandwidth_mhz;
        Some((start_mhz * 1e6, stop_mhz * 1e6))
    }

    /// Channel bandwidth in hertz.
    #[must_use]
    pub fn channel_bandwidth_hz(&self) -> f64 {
        self.channel_bandwidth_mhz * 1e6
    }

    /// Device power capped at the region ceiling.
    #[must_use]
    pub fn effective_eirp_dbm(&self, device_max_eirp_dbm: Option<f64>) -> f64 {
        device_max_eirp_dbm
            .filter(|value| value.is_finite())
            .map_or(self.max_eirp_dbm, |value| value.min(self.max_eirp_dbm))
    }

    /// At or above the transition point is high power.
    #[must_use]
    pub fn operating_mode(&self, eirp_dbm: f64) -> OperatingMode {
        if eirp_dbm >= self.power_dbm_transition_point {
            OperatingMode::HighPower
        } else {
            OperatingMode::LowPower
        }
    }

    /// Nominal protection radius for a kind.
    #[must_use]
    pub fn protection_radius_km(&self, kind: DatasetKind) -> f64 {
        self.protection_radius_km.get(kind).unwrap_or_else(|| default_radius_km(kind))
    }

    /// Minimum extra separation for a kind.
    #[must_use]
    pub fn min_separation_km(&self, kind: DatasetKind) -> f64 {
        self.min_separation_km.get(kind).unwrap_or(0.0)
    }

    /// Rulesets that apply to a device advertising `supported`. An empty list
    /// accepts every region ruleset.
    #[must_use]
    pub fn applicable_rulesets(&self, supported: &[RulesetId]) -> Vec<RulesetId> {
        if supported.is_empty() {
            return self.ruleset_ids.clone();
        }
        self.ruleset_ids.iter().filter(|id| supported.contains(id)).cloned().collect()
    }

    /// Ruleset parameters advertised for `ruleset_id`.
    #[must_use]
    pub fn ruleset_info(&self, ruleset_id: RulesetId) -> RulesetInfo {
        RulesetInfo {
            authority: self.authority,
            ruleset_id,
            max_location_change: self.max_location_change_m,
            max_polling_secs: self.max_polling_secs,
            start_channel: self.start_channel,
            end_channel: self.end_channel,
            max_eirp_dbm: self.max_eirp_dbm,
            power_transition_dbm: self.power_dbm_transition_point,
        }
    }
}

// ============================================================================
// SECTION: Region Catalog
// ============================================================================

/// Validated set of regions keyed by code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionCatalog {
    /// Regions by code, iterated in code order.
    regions: BTreeMap<RegionCode, RegionRules>,
}

impl RegionCatalog {
    /// Builds a catalog, validating each region and rejecting duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`RegionRulesError`] for an invalid or duplicated region.
    pub fn new(regions: Vec<RegionRules>) -> Result<Self, RegionRulesError> {
        let mut map = BTreeMap::new();
        for region in regions {
            region.validate()?;
            let code = region.code.clone();
            if map.insert(code.clone(), region).is_some() {
                return Err(RegionRulesError::Duplicate(code.to_string()));
            }
        }
        Ok(Self { regions: map })
    }

    /// Looks up a region.
    #[must_use]
    pub fn get(&self, code: &RegionCode) -> Option<&RegionRules> {
        self.regions.get(code)
    }

    /// Iterates regions in code order.
    pub fn iter(&self) -> impl Iterator<Item = &RegionRules> {
        self.regions.values()
    }

    /// Region codes in order.
    pub fn codes(&self) -> impl Iterator<Item = &RegionCode> {
        self.regions.keys()
    }

    /// Authorities with at least one region.
    #[must_use]
    pub fn authorities(&self) -> BTreeSet<Authority> {
        self.regions.values().map(|region| region.authority).collect()
    }

    /// Union channel span over an authority's regions.
    #[must_use]
    pub fn channel_span(&self, authority: Authority) -> Option<RangeInclusive<u32>> {
        let mut regions = self.regions.values().filter(|region| region.authority == authority);
        let first = regions.next()?;
        let (start, end) = regions.fold((first.start_channel, first.end_channel), |acc, region| {
            (acc.0.min(region.start_channel), acc.1.max(region.end_channel))
        });
        Some(start..=end)
    }
}
