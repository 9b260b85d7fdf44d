// crates/tvws-core/src/core/device.rs
// ============================================================================
// Module: TVWS Devices
// Description: Device descriptors, locations, owners, and registrations.
// Purpose: Model the device-side value objects of a PAWS exchange.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Device types serialize with PAWS wire names (`camelCase` fields). A
//! [`DeviceRegistration`] is the one device-side value that persists: it is
//! written by `Register` and read back by device validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::GeoPoint;
use crate::core::RulesetId;
use crate::core::Timestamp;
use crate::interfaces::StoreEntity;

// ============================================================================
// SECTION: Device Descriptor
// ============================================================================

/// Regulatory device class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    /// Fixed device at a registered location.
    #[serde(rename = "FIXED")]
    Fixed,
    /// Personal/portable client device.
    #[serde(rename = "MODE_1")]
    ModeI,
    /// Personal/portable device with geolocation.
    #[default]
    #[serde(rename = "MODE_2")]
    ModeII,
    /// Low-power auxiliary device scheduled for an event.
    #[serde(rename = "LPAUX")]
    LpAux,
    /// TBAS link device scheduled for an event.
    #[serde(rename = "TBAS")]
    Tbas,
}

impl DeviceType {
    /// PAWS wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::ModeI => "MODE_1",
            Self::ModeII => "MODE_2",
            Self::LpAux => "LPAUX",
            Self::Tbas => "TBAS",
        }
    }

    /// Returns true for kinds whose protections intersect an event window.
    #[must_use]
    pub const fn is_event_scheduled(self) -> bool {
        matches!(self, Self::LpAux | Self::Tbas)
    }
}

/// Device identity and capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Manufacturer serial number.
    #[serde(default)]
    pub serial_number: String,
    /// Manufacturer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_id: Option<String>,
    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Rulesets the device supports.
    #[serde(default)]
    pub ruleset_ids: Vec<RulesetId>,
    /// Regulatory device class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    /// Regulatory equipment identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fcc_id: Option<String>,
    /// Maximum EIRP the device can emit, in dBm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_eirp_dbm: Option<f64>,
}

impl DeviceDescriptor {
    /// Device class, defaulting to Mode II when unspecified.
    #[must_use]
    pub fn effective_type(&self) -> DeviceType {
        self.device_type.unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Location
// ============================================================================

/// Location ellipse: a centre with uncertainty axes in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ellipse {
    /// Centre point.
    pub center: GeoPoint,
    /// Semi-major axis in metres.
    #[serde(default)]
    pub semi_major_axis: f64,
    /// Semi-minor axis in metres.
    #[serde(default)]
    pub semi_minor_axis: f64,
    /// Orientation of the major axis in degrees from north.
    #[serde(default)]
    pub orientation: f64,
}

/// Device location with confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Location ellipse.
    pub point: Ellipse,
    /// Confidence percentage for the ellipse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl Location {
    /// Creates an exact point location.
    #[must_use]
    pub const fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            point: Ellipse {
                center: GeoPoint::new(latitude, longitude),
                semi_major_axis: 0.0,
                semi_minor_axis: 0.0,
                orientation: 0.0,
            },
            confidence: None,
        }
    }

    /// Centre point.
    #[must_use]
    pub const fn center(&self) -> GeoPoint {
        self.point.center
    }

    /// Worst-case horizontal uncertainty in kilometres.
    #[must_use]
    pub fn uncertainty_km(&self) -> f64 {
        let axis = self.point.semi_major_axis.max(self.point.semi_minor_axis);
        if axis.is_finite() && axis > 0.0 { axis / 1000.0 } else { 0.0 }
    }
}

/// Antenna height reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeightType {
    /// Above ground level.
    #[serde(rename = "AGL")]
    Agl,
    /// Above mean sea level.
    #[serde(rename = "AMSL")]
    Amsl,
}

/// Antenna characteristics reported at registration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntennaCharacteristics {
    /// Antenna height in metres.
    pub height: f64,
    /// Height reference.
    pub height_type: HeightType,
    /// Height uncertainty in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_uncertainty: Option<f64>,
}

/// Registrant contact details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOwner {
    /// Registrant name.
    #[serde(default)]
    pub name: String,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact telephone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

// ============================================================================
// SECTION: Registration Entity
// ============================================================================

/// Persisted device registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    /// Manufacturer identifier (store partition).
    pub manufacturer_id: String,
    /// Serial number (store row).
    pub serial_number: String,
    /// Descriptor as registered.
    pub device: DeviceDescriptor,
    /// Registrant.
    pub owner: DeviceOwner,
    /// Registered location.
    pub location: Location,
    /// Antenna details, required for fixed devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antenna: Option<AntennaCharacteristics>,
    /// Registration time.
    pub registered_at: Timestamp,
}

impl StoreEntity for DeviceRegistration {
    const TABLE: &'static str = "device_registrations";

    fn partition_key(&self) -> &str {
        &self.manufacturer_id
    }

    fn row_key(&self) -> &str {
        &self.serial_number
    }
}
