// crates/tvws-paws/src/messages.rs
// ============================================================================
// Module: PAWS Messages
// Description: Request and response payloads for every PAWS method.
// Purpose: Typed wire shapes decoded from JSON-RPC params.
// Dependencies: tvws-core, serde
// ============================================================================

//! ## Overview
//! Request fields are optional on the wire so that absent fields surface as
//! validation failures with a field name rather than as decode errors.
//! Responses always carry the message `type` and the protocol `version`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use tvws_core::AntennaCharacteristics;
use tvws_core::CacheStatus;
use tvws_core::DeviceDescriptor;
use tvws_core::DeviceOwner;
use tvws_core::EventTime;
use tvws_core::IncumbentRecord;
use tvws_core::Location;
use tvws_core::RulesetInfo;
use tvws_core::SpectrumSpec;
use tvws_core::Timestamp;

// ============================================================================
// SECTION: Methods
// ============================================================================

/// JSON-RPC method classification.
///
/// # Invariants
/// - Variants are stable for audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PawsMethod {
    /// `spectrum.paws.init`.
    Init,
    /// `spectrum.paws.register`.
    Register,
    /// `spectrum.paws.getSpectrum`.
    GetSpectrum,
    /// `spectrum.paws.getSpectrumBatch`.
    GetSpectrumBatch,
    /// `spectrum.paws.notifySpectrumUse`.
    NotifySpectrumUse,
    /// `spectrum.paws.verifyDevice`.
    VerifyDevice,
    /// `spectrum.paws.interferenceQuery`.
    InterferenceQuery,
    /// `tvws.cacheStatus`.
    CacheStatus,
    /// Malformed envelope.
    Invalid,
    /// Unknown method name.
    Other,
}

impl PawsMethod {
    /// Every routable method.
    pub const ROUTABLE: [Self; 8] = [
        Self::Init,
        Self::Register,
        Self::GetSpectrum,
        Self::GetSpectrumBatch,
        Self::NotifySpectrumUse,
        Self::VerifyDevice,
        Self::InterferenceQuery,
        Self::CacheStatus,
    ];

    /// Returns the JSON-RPC method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "spectrum.paws.init",
            Self::Register => "spectrum.paws.register",
            Self::GetSpectrum => "spectrum.paws.getSpectrum",
            Self::GetSpectrumBatch => "spectrum.paws.getSpectrumBatch",
            Self::NotifySpectrumUse => "spectrum.paws.notifySpectrumUse",
            Self::VerifyDevice => "spectrum.paws.verifyDevice",
            Self::InterferenceQuery => "spectrum.paws.interferenceQuery",
            Self::CacheStatus => "tvws.cacheStatus",
            Self::Invalid => "invalid",
            Self::Other => "other",
        }
    }

    /// Parses a JSON-RPC method name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ROUTABLE.into_iter().find(|method| method.as_str() == name)
    }
}

// ============================================================================
// SECTION: Message Types
// ============================================================================

/// Message `type` values.
pub mod message_type {
    /// Init request.
    pub const INIT_REQ: &str = "INIT_REQ";
    /// Init response.
    pub const INIT_RESP: &str = "INIT_RESP";
    /// Registration request.
    pub const REGISTRATION_REQ: &str = "REGISTRATION_REQ";
    /// Registration response.
    pub const REGISTRATION_RESP: &str = "REGISTRATION_RESP";
    /// Available spectrum request.
    pub const AVAIL_SPECTRUM_REQ: &str = "AVAIL_SPECTRUM_REQ";
    /// Available spectrum response.
    pub const AVAIL_SPECTRUM_RESP: &str = "AVAIL_SPECTRUM_RESP";
    /// Batch available spectrum request.
    pub const AVAIL_SPECTRUM_BATCH_REQ: &str = "AVAIL_SPECTRUM_BATCH_REQ";
    /// Batch available spectrum response.
    pub const AVAIL_SPECTRUM_BATCH_RESP: &str = "AVAIL_SPECTRUM_BATCH_RESP";
    /// Spectrum use notification.
    pub const SPECTRUM_USE_NOTIFY: &str = "SPECTRUM_USE_NOTIFY";
    /// Spectrum use acknowledgement.
    pub const SPECTRUM_USE_RESP: &str = "SPECTRUM_USE_RESP";
    /// Device validation request.
    pub const DEV_VALID_REQ: &str = "DEV_VALID_REQ";
    /// Device validation response.
    pub const DEV_VALID_RESP: &str = "DEV_VALID_RESP";
    /// Interference query request.
    pub const INTERFERENCE_QUERY_REQ: &str = "INTERFERENCE_QUERY_REQ";
    /// Interference query response.
    pub const INTERFERENCE_QUERY_RESP: &str = "INTERFERENCE_QUERY_RESP";
}

/// Common accessors over PAWS request payloads.
pub trait PawsRequest {
    /// Expected message `type`.
    const TYPE: &'static str;

    /// Message `type` as sent.
    fn message_type(&self) -> Option<&str>;

    /// Protocol version as sent.
    fn version(&self) -> Option<&str>;
}

/// Implements [`PawsRequest`] for a request struct.
macro_rules! paws_request {
    ($request:ty, $type:expr) => {
        impl PawsRequest for $request {
            const TYPE: &'static str = $type;

            fn message_type(&self) -> Option<&str> {
                self.message_type.as_deref()
            }

            fn version(&self) -> Option<&str> {
                self.version.as_deref()
            }
        }
    };
}

// ============================================================================
// SECTION: Init and Registration
// ============================================================================

/// `INIT_REQ` params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
    /// Device descriptor.
    #[serde(default)]
    pub device_desc: Option<DeviceDescriptor>,
    /// Device location.
    #[serde(default)]
    pub location: Option<Location>,
}

paws_request!(InitRequest, message_type::INIT_REQ);

/// `INIT_RESP` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Protocol version.
    pub version: String,
    /// Rulesets applying to the device.
    pub ruleset_infos: Vec<RulesetInfo>,
}

/// `REGISTRATION_REQ` params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
    /// Device descriptor.
    #[serde(default)]
    pub device_desc: Option<DeviceDescriptor>,
    /// Device location.
    #[serde(default)]
    pub location: Option<Location>,
    /// Registrant.
    #[serde(default)]
    pub device_owner: Option<DeviceOwner>,
    /// Antenna details.
    #[serde(default)]
    pub antenna: Option<AntennaCharacteristics>,
}

paws_request!(RegistrationRequest, message_type::REGISTRATION_REQ);

/// `REGISTRATION_RESP` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Protocol version.
    pub version: String,
    /// Rulesets applying to the device.
    pub ruleset_infos: Vec<RulesetInfo>,
}

// ============================================================================
// SECTION: Available Spectrum
// ============================================================================

/// `AVAIL_SPECTRUM_REQ` params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailSpectrumRequest {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
    /// Device descriptor.
    #[serde(default)]
    pub device_desc: Option<DeviceDescriptor>,
    /// Device location.
    #[serde(default)]
    pub location: Option<Location>,
    /// Event span for event-scheduled devices.
    #[serde(default)]
    pub event_time: Option<EventTime>,
}

paws_request!(AvailSpectrumRequest, message_type::AVAIL_SPECTRUM_REQ);

/// `AVAIL_SPECTRUM_RESP` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailSpectrumResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Protocol version.
    pub version: String,
    /// Response time.
    #[serde(with = "tvws_core::core::time::rfc3339")]
    pub timestamp: Timestamp,
    /// Device descriptor echoed back.
    pub device_desc: DeviceDescriptor,
    /// One spec per applicable ruleset.
    pub spectrum_specs: Vec<SpectrumSpec>,
}

/// `AVAIL_SPECTRUM_BATCH_REQ` params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailSpectrumBatchRequest {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
    /// Device descriptor.
    #[serde(default)]
    pub device_desc: Option<DeviceDescriptor>,
    /// Locations to evaluate.
    #[serde(default)]
    pub locations: Option<Vec<Location>>,
    /// Event span for event-scheduled devices.
    #[serde(default)]
    pub event_time: Option<EventTime>,
}

paws_request!(AvailSpectrumBatchRequest, message_type::AVAIL_SPECTRUM_BATCH_REQ);

/// Spectrum specs for one batch location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoSpectrumSpec {
    /// Location evaluated.
    pub location: Location,
    /// One spec per applicable ruleset.
    pub spectrum_specs: Vec<SpectrumSpec>,
}

/// `AVAIL_SPECTRUM_BATCH_RESP` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailSpectrumBatchResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Protocol version.
    pub version: String,
    /// Response time.
    #[serde(with = "tvws_core::core::time::rfc3339")]
    pub timestamp: Timestamp,
    /// Device descriptor echoed back.
    pub device_desc: DeviceDescriptor,
    /// Specs in request location order.
    pub geo_spectrum_specs: Vec<GeoSpectrumSpec>,
}

// ============================================================================
// SECTION: Spectrum Use
// ============================================================================

/// One channel a device reports using.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumUse {
    /// Channel number.
    pub channel: u32,
    /// EIRP in use, in dBm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eirp_dbm: Option<f64>,
}

/// `SPECTRUM_USE_NOTIFY` params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumUseNotify {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
    /// Device descriptor.
    #[serde(default)]
    pub device_desc: Option<DeviceDescriptor>,
    /// Device location.
    #[serde(default)]
    pub location: Option<Location>,
    /// Channels in use.
    #[serde(default)]
    pub spectra: Option<Vec<SpectrumUse>>,
    /// Event span, required for LPAUX and TBAS devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<EventTime>,
}

paws_request!(SpectrumUseNotify, message_type::SPECTRUM_USE_NOTIFY);

/// `SPECTRUM_USE_RESP` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumUseResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Protocol version.
    pub version: String,
}

// ============================================================================
// SECTION: Device Validation
// ============================================================================

/// `DEV_VALID_REQ` params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceValidationRequest {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
    /// Devices to validate.
    #[serde(default)]
    pub device_descs: Option<Vec<DeviceDescriptor>>,
}

paws_request!(DeviceValidationRequest, message_type::DEV_VALID_REQ);

/// Validity of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceValidity {
    /// Device as submitted.
    pub device_desc: DeviceDescriptor,
    /// Whether the device may operate.
    pub is_valid: bool,
    /// Why the device is invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `DEV_VALID_RESP` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceValidationResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Protocol version.
    pub version: String,
    /// Per-device results in request order.
    pub device_validities: Vec<DeviceValidity>,
}

// ============================================================================
// SECTION: Interference Query
// ============================================================================

/// `INTERFERENCE_QUERY_REQ` params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterferenceQueryRequest {
    /// Message type.
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    /// Protocol version.
    #[serde(default)]
    pub version: Option<String>,
    /// Location to test.
    #[serde(default)]
    pub location: Option<Location>,
    /// First channel of interest.
    #[serde(default)]
    pub start_channel: Option<u32>,
    /// Last channel of interest.
    #[serde(default)]
    pub end_channel: Option<u32>,
}

paws_request!(InterferenceQueryRequest, message_type::INTERFERENCE_QUERY_REQ);

/// `INTERFERENCE_QUERY_RESP` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterferenceQueryResponse {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Protocol version.
    pub version: String,
    /// Response time.
    #[serde(with = "tvws_core::core::time::rfc3339")]
    pub timestamp: Timestamp,
    /// Incumbents protected at the location.
    pub incumbents: Vec<IncumbentRecord>,
}

// ============================================================================
// SECTION: Cache Status
// ============================================================================

/// `tvws.cacheStatus` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatusResponse {
    /// Per-dataset status.
    pub datasets: Vec<CacheStatus>,
}
