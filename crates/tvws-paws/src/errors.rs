// crates/tvws-paws/src/errors.rs
// ============================================================================
// Module: PAWS Errors
// Description: Protocol error taxonomy and wire error envelope.
// Purpose: Map every failure to a stable code before it leaves the manager.
// Dependencies: tvws-core, serde, thiserror
// ============================================================================

//! ## Overview
//! Every protocol failure is a [`PawsError`] carrying a [`PawsErrorKind`], a
//! client-facing message, and optional diagnostic `data`. Kinds map to the
//! stable string codes of the PAWS error envelope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use thiserror::Error;
use tvws_core::AvailabilityError;
use tvws_core::CacheError;
use tvws_core::StoreError;

// ============================================================================
// SECTION: Error Kinds
// ============================================================================

/// Whether a validation failure is a missing field or a bad value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    /// A required field is absent.
    Missing,
    /// A field is present but invalid.
    Invalid,
}

/// Protocol error classification.
///
/// # Invariants
/// - Codes are stable wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PawsErrorKind {
    /// Params absent or not a JSON object, or a malformed envelope.
    InvalidRequest,
    /// Unknown method name.
    MethodNotFound,
    /// Field validation failed.
    Validation(ValidationCode),
    /// Requested protocol version differs from the server's.
    UnsupportedVersion,
    /// No ruleset the device supports applies in its region.
    Unsupported,
    /// The location resolves to no configured region.
    OutsideSupportedRegion,
    /// The device must register before this call.
    NotRegistered,
    /// Well-formed query with no matching incumbent.
    IncumbentNotFound,
    /// Unexpected internal failure.
    ServerError,
}

impl PawsErrorKind {
    /// Wire error code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "-32600",
            Self::MethodNotFound => "-32601",
            Self::Validation(ValidationCode::Missing) => "-201",
            Self::Validation(ValidationCode::Invalid) => "-202",
            Self::UnsupportedVersion => "-101",
            Self::Unsupported => "-102",
            Self::OutsideSupportedRegion => "-104",
            Self::NotRegistered => "-302",
            Self::IncumbentNotFound => "200",
            Self::ServerError => "-32000",
        }
    }

    /// Stable label for audit records.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::MethodNotFound => "method_not_found",
            Self::Validation(ValidationCode::Missing) => "missing_field",
            Self::Validation(ValidationCode::Invalid) => "invalid_value",
            Self::UnsupportedVersion => "unsupported_version",
            Self::Unsupported => "unsupported",
            Self::OutsideSupportedRegion => "outside_supported_region",
            Self::NotRegistered => "not_registered",
            Self::IncumbentNotFound => "incumbent_not_found",
            Self::ServerError => "server_error",
        }
    }
}

// ============================================================================
// SECTION: Protocol Error
// ============================================================================

/// Protocol failure returned to the transport as an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {}", .kind.label(), .message)]
pub struct PawsError {
    /// Classification.
    pub kind: PawsErrorKind,
    /// Client-facing message.
    pub message: String,
    /// Diagnostic text sent in the envelope `data` field.
    pub data: Option<String>,
    /// Internal diagnostic text kept for the audit log only.
    pub diagnostic: Option<String>,
}

impl PawsError {
    /// Creates an error with no diagnostic data.
    #[must_use]
    pub fn new(kind: PawsErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), data: None, diagnostic: None }
    }

    /// Attaches diagnostic data sent to the client.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Attaches diagnostic text recorded only in the audit log.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// Params are absent or malformed.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(PawsErrorKind::InvalidRequest, message)
    }

    /// Field validation failure.
    #[must_use]
    pub fn validation(code: ValidationCode, messages: &[String]) -> Self {
        Self::new(PawsErrorKind::Validation(code), messages.join("; "))
    }

    /// Generic internal failure. The diagnostic travels in `data`.
    #[must_use]
    pub fn server_error(diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        Self::new(PawsErrorKind::ServerError, "internal server error")
            .with_data(diagnostic.clone())
            .with_diagnostic(diagnostic)
    }

    /// Wire envelope for this error.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.kind.code().to_string(),
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }
}

impl From<AvailabilityError> for PawsError {
    fn from(error: AvailabilityError) -> Self {
        match error {
            AvailabilityError::OutsideSupportedRegion(location) => Self::new(
                PawsErrorKind::OutsideSupportedRegion,
                format!("unsupported location {location}"),
            ),
            AvailabilityError::UnknownRegion(code) => Self::new(
                PawsErrorKind::OutsideSupportedRegion,
                format!("region {code} is not supported"),
            ),
            AvailabilityError::InvalidLocation(message) => {
                Self::new(PawsErrorKind::Validation(ValidationCode::Invalid), message)
            }
            AvailabilityError::IncumbentDataUnavailable(message) => {
                Self::server_error(format!("incumbent data unavailable: {message}"))
            }
        }
    }
}

impl From<StoreError> for PawsError {
    fn from(error: StoreError) -> Self {
        Self::server_error(error.to_string())
    }
}

impl From<CacheError> for PawsError {
    fn from(error: CacheError) -> Self {
        Self::server_error(error.to_string())
    }
}

// ============================================================================
// SECTION: Wire Envelope
// ============================================================================

/// PAWS error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional diagnostic text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}
