// crates/tvws-core/src/core/incumbent.rs
// ============================================================================
// Module: TVWS Incumbents
// Description: Protected incumbent records, region polygons, and sync status.
// Purpose: Model the store-backed datasets the cache snapshots.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Incumbents are a tagged union over the protected-user kinds. The engine
//! dispatches on [`IncumbentKind`] instead of inspecting runtime types. All
//! records are immutable once loaded; a refresh replaces the whole snapshot.
//!
//! Store layout:
//! - `incumbents`: partition `{authority}/{dataset}`, row = record id.
//! - `region_polygons`: partition = region code, row = polygon id.
//! - `sync_status`: partition = authority (or `regions`), row = dataset label.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ops::RangeInclusive;

use serde::Deserialize;
use serde::Serialize;

use crate::core::Authority;
use crate::core::GeoPoint;
use crate::core::Polygon;
use crate::core::RegionCode;
use crate::core::Timestamp;
use crate::core::ValidityWindow;
use crate::interfaces::StoreEntity;

// ============================================================================
// SECTION: Dataset Kinds
// ============================================================================

/// Incumbent dataset held by an authority's service cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Licensed full-power TV station engineering data.
    TvEngineeringData,
    /// Low-power auxiliary (wireless microphone) registrations.
    LpAux,
    /// Programme-making and special-events assignments.
    Pmse,
    /// Temporary broadcast auxiliary service links.
    Tbas,
    /// Multichannel video programming distributor receive sites.
    Mvpd,
}

impl DatasetKind {
    /// Every dataset kind in stable order.
    pub const ALL: [Self; 5] =
        [Self::TvEngineeringData, Self::LpAux, Self::Pmse, Self::Tbas, Self::Mvpd];

    /// Returns the stable label used for store rows and config keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TvEngineeringData => "tv_engineering_data",
            Self::LpAux => "lp_aux",
            Self::Pmse => "pmse",
            Self::Tbas => "tbas",
            Self::Mvpd => "mvpd",
        }
    }

    /// Parses a dataset label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Returns the incumbent store partition for this dataset.
    #[must_use]
    pub fn partition_for(self, authority: Authority) -> String {
        format!("{}/{}", authority.as_str(), self.as_str())
    }
}

// ============================================================================
// SECTION: Incumbent Records
// ============================================================================

/// Kind-specific incumbent payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncumbentKind {
    /// Licensed TV transmitter.
    TvEngineeringData {
        /// Licensing facility identifier.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        facility_id: Option<String>,
        /// Effective radiated power in kilowatts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        erp_kw: Option<f64>,
    },
    /// PMSE assignment for a venue.
    PmseAssignment {
        /// Venue name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        venue: Option<String>,
    },
    /// Low-power auxiliary registration.
    LpAuxRegistration {
        /// Venue name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        venue: Option<String>,
        /// Licensee name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        licensee: Option<String>,
    },
    /// TBAS link registration, protected at its receive site.
    TbasRegistration {
        /// Receive site.
        receive_location: GeoPoint,
    },
    /// MVPD receive-site registration.
    MvpdRegistration {
        /// Receive site.
        receive_location: GeoPoint,
    },
}

impl IncumbentKind {
    /// Dataset that carries records of this kind.
    #[must_use]
    pub const fn dataset(&self) -> DatasetKind {
        match self {
            Self::TvEngineeringData { .. } => DatasetKind::TvEngineeringData,
            Self::PmseAssignment { .. } => DatasetKind::Pmse,
            Self::LpAuxRegistration { .. } => DatasetKind::LpAux,
            Self::TbasRegistration { .. } => DatasetKind::Tbas,
            Self::MvpdRegistration { .. } => DatasetKind::Mvpd,
        }
    }

    /// Stable label used in exclusion diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::TvEngineeringData { .. } => "tv_engineering_data",
            Self::PmseAssignment { .. } => "pmse_assignment",
            Self::LpAuxRegistration { .. } => "lp_aux_registration",
            Self::TbasRegistration { .. } => "tbas_registration",
            Self::MvpdRegistration { .. } => "mvpd_registration",
        }
    }

    /// Returns true for broadcast TV incumbents.
    #[must_use]
    pub const fn is_tv(&self) -> bool {
        matches!(self, Self::TvEngineeringData { .. })
    }
}

/// Protected incumbent as stored and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncumbentRecord {
    /// Store partition key, opaque to the core.
    pub partition_key: String,
    /// Store row key, opaque to the core.
    pub row_key: String,
    /// Call sign; empty for non-broadcast kinds.
    #[serde(default)]
    pub call_sign: String,
    /// Protected channel.
    pub channel: u32,
    /// Transmitter or venue location.
    pub location: GeoPoint,
    /// Protected contour; absent means point-radius protection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contour: Option<Polygon>,
    /// Record-specific protection radius overriding the region nominal radius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_radius_km: Option<f64>,
    /// Activity window; absent means always active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<ValidityWindow>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: IncumbentKind,
}

impl IncumbentRecord {
    /// Checks record invariants against the authority's channel span.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self, channels: &RangeInclusive<u32>) -> Result<(), String> {
        if !channels.contains(&self.channel) {
            return Err(format!(
                "incumbent {} channel {} outside {}..={}",
                self.row_key,
                self.channel,
                channels.start(),
                channels.end()
            ));
        }
        self.location.validate().map_err(|err| format!("incumbent {}: {err}", self.row_key))?;
        if let IncumbentKind::TbasRegistration { receive_location }
        | IncumbentKind::MvpdRegistration { receive_location } = &self.kind
        {
            receive_location
                .validate()
                .map_err(|err| format!("incumbent {} receive site: {err}", self.row_key))?;
        }
        if let Some(radius) = self.protection_radius_km
            && (!radius.is_finite() || radius < 0.0)
        {
            return Err(format!("incumbent {} has invalid protection radius", self.row_key));
        }
        Ok(())
    }

    /// Point protected by a radius rule. Receive-site kinds protect the
    /// receiver, not the transmitter.
    #[must_use]
    pub const fn protected_point(&self) -> GeoPoint {
        match &self.kind {
            IncumbentKind::TbasRegistration { receive_location }
            | IncumbentKind::MvpdRegistration { receive_location } => *receive_location,
            _ => self.location,
        }
    }

    /// Returns true when the protection geometry contains `point` or lies
    /// within `separation_km` of it.
    #[must_use]
    pub fn protects(&self, point: &GeoPoint, nominal_radius_km: f64, separation_km: f64) -> bool {
        if let Some(contour) = &self.contour {
            return contour.contains(point)
                || contour.distance_km_to_boundary(point) <= separation_km;
        }
        let radius = self.protection_radius_km.unwrap_or(nominal_radius_km);
        self.protected_point().distance_km(point) <= radius + separation_km
    }

    /// Returns true when the protection applies at `at`, or overlaps the
    /// event window when one is supplied.
    #[must_use]
    pub fn applies_during(&self, at: Timestamp, event_window: Option<(Timestamp, Timestamp)>) -> bool {
        let Some(validity) = &self.validity else {
            return true;
        };
        match event_window {
            Some((start, stop)) => validity.overlaps(start, stop),
            None => validity.is_active_at(at),
        }
    }
}

impl StoreEntity for IncumbentRecord {
    const TABLE: &'static str = "incumbents";

    fn partition_key(&self) -> &str {
        &self.partition_key
    }

    fn row_key(&self) -> &str {
        &self.row_key
    }
}

// ============================================================================
// SECTION: Region Polygons
// ============================================================================

/// One boundary polygon of a regulatory region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionPolygonRecord {
    /// Region the polygon belongs to (store partition).
    pub region: RegionCode,
    /// Polygon identifier within the region (store row).
    pub polygon_id: String,
    /// Boundary ring.
    pub polygon: Polygon,
}

impl StoreEntity for RegionPolygonRecord {
    const TABLE: &'static str = "region_polygons";

    fn partition_key(&self) -> &str {
        self.region.as_str()
    }

    fn row_key(&self) -> &str {
        &self.polygon_id
    }
}

// ============================================================================
// SECTION: Sync Status
// ============================================================================

/// Lightweight last-modified record consulted before a full re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Authority label, or [`SyncStatus::REGION_SCOPE`] for polygons.
    pub scope: String,
    /// Dataset label.
    pub dataset: String,
    /// Time the backing data last changed.
    pub last_modified: Timestamp,
    /// Forces a re-fetch regardless of `last_modified`.
    #[serde(default)]
    pub needs_update: bool,
}

impl SyncStatus {
    /// Scope used for region polygon status rows.
    pub const REGION_SCOPE: &'static str = "regions";
    /// Dataset label used for region polygon status rows.
    pub const REGION_DATASET: &'static str = "region_polygons";
}

impl StoreEntity for SyncStatus {
    const TABLE: &'static str = "sync_status";

    fn partition_key(&self) -> &str {
        &self.scope
    }

    fn row_key(&self) -> &str {
        &self.dataset
    }
}

// ============================================================================
// SECTION: Cache Keys
// ============================================================================

/// Identifies one independently refreshed cache dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheKey {
    /// One authority's incumbent dataset.
    Incumbents {
        /// Owning authority.
        authority: Authority,
        /// Dataset kind.
        dataset: DatasetKind,
    },
    /// Region boundary polygons for every region.
    RegionPolygons,
}

impl CacheKey {
    /// Authority owning the dataset, absent for region polygons.
    #[must_use]
    pub const fn authority(&self) -> Option<Authority> {
        match self {
            Self::Incumbents { authority, .. } => Some(*authority),
            Self::RegionPolygons => None,
        }
    }

    /// Dataset label used for sync-status rows and events.
    #[must_use]
    pub const fn dataset_label(&self) -> &'static str {
        match self {
            Self::Incumbents { dataset, .. } => dataset.as_str(),
            Self::RegionPolygons => SyncStatus::REGION_DATASET,
        }
    }

    /// Sync-status partition consulted before a refresh.
    #[must_use]
    pub const fn sync_scope(&self) -> &'static str {
        match self {
            Self::Incumbents { authority, .. } => authority.as_str(),
            Self::RegionPolygons => SyncStatus::REGION_SCOPE,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incumbents { authority, dataset } => {
                write!(f, "{}/{}", authority.as_str(), dataset.as_str())
            }
            Self::RegionPolygons => f.write_str(SyncStatus::REGION_DATASET),
        }
    }
}
