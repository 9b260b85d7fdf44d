// crates/tvws-core/src/runtime/engine.rs
// ============================================================================
// Module: TVWS Availability Engine
// Description: Free-channel computation against cached incumbent protections.
// Purpose: Decide which channels a device may use at a location.
// Dependencies: crate::{core, runtime}
// ============================================================================

//! ## Overview
//! The engine is a pure function of its query, the region catalog, and the
//! current cache snapshots. It never reads the store directly.
//!
//! Failure policy: when any incumbent dataset for the region's authority is
//! unavailable (never loaded or older than the allowed age), the computation
//! fails with [`AvailabilityError::IncumbentDataUnavailable`]. Channels are
//! never reported free without incumbent data behind the decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

use thiserror::Error;

use crate::core::Authority;
use crate::core::ChannelInfo;
use crate::core::DatasetKind;
use crate::core::DeviceDescriptor;
use crate::core::DeviceType;
use crate::core::Exclusion;
use crate::core::GeoPoint;
use crate::core::IncumbentRecord;
use crate::core::Location;
use crate::core::OperatingMode;
use crate::core::RegionCatalog;
use crate::core::RegionCode;
use crate::core::RegionRules;
use crate::core::Timestamp;
use crate::core::WhitespaceSummary;
use crate::core::whitespace_summary;
use crate::runtime::CacheManager;
use crate::runtime::IncumbentSnapshot;
use crate::runtime::ServiceCache;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Availability computation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvailabilityError {
    /// The location is in no configured region.
    #[error("location outside supported regions: {0}")]
    OutsideSupportedRegion(String),
    /// The location coordinates are invalid.
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    /// Incumbent or polygon data is missing or too old to decide safely.
    #[error("incumbent data unavailable: {0}")]
    IncumbentDataUnavailable(String),
    /// The requested region is not configured.
    #[error("unknown region: {0}")]
    UnknownRegion(String),
}

// ============================================================================
// SECTION: Query and Result
// ============================================================================

/// Inputs to one availability computation.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityQuery {
    /// Requesting device.
    pub device: DeviceDescriptor,
    /// Device location.
    pub location: Location,
    /// Region, when already known; otherwise resolved from polygons.
    pub region: Option<RegionCode>,
    /// Evaluation time.
    pub at: Timestamp,
    /// Event window for event-scheduled device types.
    pub event_window: Option<(Timestamp, Timestamp)>,
}

/// Outcome of one availability computation.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityResult {
    /// Resolved region.
    pub region: RegionCode,
    /// Region authority.
    pub authority: Authority,
    /// Available channels in ascending order.
    pub channels: Vec<ChannelInfo>,
    /// Exclusion reasons, one per protecting incumbent and channel, plus one
    /// per channel the device class may not use.
    pub exclusions: Vec<Exclusion>,
    /// Contiguous-run statistics over the region channel range.
    pub summary: WhitespaceSummary,
    /// EIRP granted on available channels; channels next to a protected TV
    /// channel may carry a lower limit.
    pub eirp_dbm: f64,
    /// Power class granted.
    pub mode: OperatingMode,
}

impl AvailabilityResult {
    /// Returns true when `channel` is available.
    #[must_use]
    pub fn is_available(&self, channel: u32) -> bool {
        self.channel(channel).is_some()
    }

    /// Available channel entry with its power limit.
    #[must_use]
    pub fn channel(&self, channel: u32) -> Option<&ChannelInfo> {
        self.channels.iter().find(|info| info.channel == channel)
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Spectrum availability engine.
#[derive(Clone)]
pub struct AvailabilityEngine {
    /// Region rules.
    catalog: Arc<RegionCatalog>,
    /// Incumbent and polygon cache.
    cache: Arc<CacheManager>,
}

impl AvailabilityEngine {
    /// Creates an engine over a catalog and cache.
    #[must_use]
    pub const fn new(catalog: Arc<RegionCatalog>, cache: Arc<CacheManager>) -> Self {
        Self { catalog, cache }
    }

    /// Region catalog.
    #[must_use]
    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// Cache manager.
    #[must_use]
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Resolves the region for a point. An explicit code must contain the
    /// point; otherwise the first region in code order that does wins.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::UnknownRegion`] for an unconfigured code,
    /// [`AvailabilityError::OutsideSupportedRegion`] when no polygon contains
    /// the point, or [`AvailabilityError::IncumbentDataUnavailable`] when the
    /// polygons cannot be read.
    pub fn resolve_region(
        &self,
        point: &GeoPoint,
        requested: Option<&RegionCode>,
    ) -> Result<&RegionRules, AvailabilityError> {
        point.validate().map_err(|err| AvailabilityError::InvalidLocation(err.to_string()))?;
        let polygons = self
            .cache
            .region_polygons()
            .map_err(|err| AvailabilityError::IncumbentDataUnavailable(err.to_string()))?;
        let code = match requested {
            Some(code) if polygons.contains(code, point) => code.clone(),
            Some(code) if polygons.get(code).is_some() => {
                return Err(AvailabilityError::OutsideSupportedRegion(format!(
                    "({}, {}) is not in region {code}",
                    point.latitude, point.longitude
                )));
            }
            Some(code) => return Err(AvailabilityError::UnknownRegion(code.to_string())),
            None => polygons.find_region_for(point).ok_or_else(|| {
                AvailabilityError::OutsideSupportedRegion(format!(
                    "({}, {})",
                    point.latitude, point.longitude
                ))
            })?,
        };
        self.catalog.get(&code).ok_or_else(|| AvailabilityError::UnknownRegion(code.to_string()))
    }

    /// Computes the free channels for a device at a location.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError`] when the location is invalid or outside
    /// every region, or when incumbent data is unavailable.
    pub fn compute_available_channels(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<AvailabilityResult, AvailabilityError> {
        let point = query.location.center();
        let region = self.resolve_region(&point, query.region.as_ref())?;
        let snapshots = self.snapshots(region.authority)?;
        let device_type = query.device.effective_type();
        let class = region.device_classes.for_device(device_type);
        let window = if device_type.is_event_scheduled() { query.event_window } else { None };
        let uncertainty_km = query.location.uncertainty_km();
        let block_adjacent = region.adjacent_channel_protection && device_type == DeviceType::Fixed;
        let reduce_adjacent = !block_adjacent && class.adjacent_eirp_dbm.is_some();

        let protects = |record: &IncumbentRecord| {
            let kind = record.kind.dataset();
            record.applies_during(query.at, window)
                && record.protects(
                    &point,
                    region.protection_radius_km(kind),
                    region.min_separation_km(kind) + uncertainty_km,
                )
        };

        let mut exclusions = Vec::new();
        let mut free = BTreeSet::new();
        let mut beside_tv = BTreeSet::new();
        for channel in region.channels() {
            if class.prohibits(channel) {
                exclusions.push(prohibited(channel, device_type));
                continue;
            }
            let before = exclusions.len();
            let mut adjacent_to_tv = false;
            for snapshot in &snapshots {
                exclusions.extend(
                    snapshot
                        .on_channel(channel)
                        .filter(|&record| protects(record))
                        .map(|record| exclusion(channel, record, false)),
                );
                if block_adjacent || reduce_adjacent {
                    let neighbours = [channel.checked_sub(1), channel.checked_add(1)];
                    let mut stations = neighbours
                        .into_iter()
                        .flatten()
                        .flat_map(|neighbour| snapshot.on_channel(neighbour))
                        .filter(|&record| record.kind.is_tv() && protects(record));
                    if block_adjacent {
                        exclusions.extend(stations.map(|record| exclusion(channel, record, true)));
                    } else {
                        adjacent_to_tv |= stations.next().is_some();
                    }
                }
            }
            if exclusions.len() == before {
                free.insert(channel);
                if adjacent_to_tv {
                    beside_tv.insert(channel);
                }
            }
        }

        let eirp_dbm = class.cap_eirp_dbm(region.effective_eirp_dbm(query.device.max_eirp_dbm));
        let mode = region.operating_mode(eirp_dbm);
        let channels = free
            .iter()
            .filter_map(|channel| {
                let channel_eirp = match class.adjacent_eirp_dbm {
                    Some(cap) if beside_tv.contains(channel) => eirp_dbm.min(cap),
                    _ => eirp_dbm,
                };
                region.channel_frequency_hz(*channel).map(|(start_hz, stop_hz)| ChannelInfo {
                    channel: *channel,
                    start_hz,
                    stop_hz,
                    max_eirp_dbm: channel_eirp,
                    mode: region.operating_mode(channel_eirp),
                })
            })
            .collect();
        Ok(AvailabilityResult {
            region: region.code.clone(),
            authority: region.authority,
            channels,
            exclusions,
            summary: whitespace_summary(&free, region.start_channel, region.end_channel),
            eirp_dbm,
            mode,
        })
    }

    /// Incumbents whose protection covers `point` on any channel in
    /// `channels` (all channels when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::IncumbentDataUnavailable`] when any
    /// dataset cannot be read.
    pub fn find_protecting_incumbents(
        &self,
        region: &RegionRules,
        point: &GeoPoint,
        channels: Option<RangeInclusive<u32>>,
        at: Timestamp,
    ) -> Result<Vec<IncumbentRecord>, AvailabilityError> {
        let channels = channels.unwrap_or_else(|| region.channels());
        let datasets: Vec<DatasetKind> = self.service_cache(region.authority)?.datasets().collect();
        self.cache
            .search_cache_objects(region.authority, &datasets, |record| {
                let kind = record.kind.dataset();
                channels.contains(&record.channel)
                    && record.applies_during(at, None)
                    && record.protects(
                        point,
                        region.protection_radius_km(kind),
                        region.min_separation_km(kind),
                    )
            })
            .map_err(|err| AvailabilityError::IncumbentDataUnavailable(err.to_string()))
    }

    /// Service cache of an authority.
    fn service_cache(&self, authority: Authority) -> Result<&ServiceCache, AvailabilityError> {
        self.cache.registry().get(authority).ok_or_else(|| {
            AvailabilityError::IncumbentDataUnavailable(format!(
                "no incumbent datasets configured for {authority}"
            ))
        })
    }

    /// Reads every dataset of an authority, failing closed.
    fn snapshots(&self, authority: Authority) -> Result<Vec<Arc<IncumbentSnapshot>>, AvailabilityError> {
        self.service_cache(authority)?
            .datasets()
            .map(|dataset| {
                self.cache
                    .get_service_cache_objects(authority, dataset)
                    .map_err(|err| AvailabilityError::IncumbentDataUnavailable(err.to_string()))
            })
            .collect()
    }
}

/// Exclusion for a channel the device class may never use.
fn prohibited(channel: u32, device_type: DeviceType) -> Exclusion {
    Exclusion {
        channel,
        incumbent_kind: "prohibited_channel".to_string(),
        call_sign: String::new(),
        row_key: device_type.as_str().to_string(),
        adjacent: false,
    }
}

/// Builds an exclusion entry.
fn exclusion(channel: u32, record: &IncumbentRecord, adjacent: bool) -> Exclusion {
    Exclusion {
        channel,
        incumbent_kind: record.kind.label().to_string(),
        call_sign: record.call_sign.clone(),
        row_key: record.row_key.clone(),
        adjacent,
    }
}
