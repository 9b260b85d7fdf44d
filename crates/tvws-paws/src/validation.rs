// crates/tvws-paws/src/validation.rs
// ============================================================================
// Module: PAWS Request Validation
// Description: Field-level checks for every PAWS request.
// Purpose: Reject malformed requests before any cache, store, or engine call.
// Dependencies: tvws-core
// ============================================================================

//! ## Overview
//! A [`Validator`] collects human-readable issues while a request is walked.
//! Missing required fields take precedence: any missing field yields a
//! `-201` error listing every issue; otherwise any invalid value yields `-202`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tvws_core::AntennaCharacteristics;
use tvws_core::DeviceDescriptor;
use tvws_core::DeviceOwner;
use tvws_core::DeviceType;
use tvws_core::EventTime;
use tvws_core::Location;

use crate::errors::PawsError;
use crate::errors::ValidationCode;
use crate::messages::AvailSpectrumBatchRequest;
use crate::messages::AvailSpectrumRequest;
use crate::messages::DeviceValidationRequest;
use crate::messages::InitRequest;
use crate::messages::InterferenceQueryRequest;
use crate::messages::PawsRequest;
use crate::messages::RegistrationRequest;
use crate::messages::SpectrumUseNotify;

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Accumulates validation issues for one request.
#[derive(Debug, Default)]
pub struct Validator {
    /// Missing required fields.
    missing: Vec<String>,
    /// Present but invalid values.
    invalid: Vec<String>,
}

impl Validator {
    /// Creates an empty validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a missing field.
    pub fn missing(&mut self, field: &str) {
        self.missing.push(format!("{field} is required"));
    }

    /// Records an invalid value.
    pub fn invalid(&mut self, message: impl Into<String>) {
        self.invalid.push(message.into());
    }

    /// Returns the value when present, recording it as missing otherwise.
    pub fn require<'a, T>(&mut self, field: &str, value: Option<&'a T>) -> Option<&'a T> {
        if value.is_none() {
            self.missing(field);
        }
        value
    }

    /// Converts collected issues into a result.
    ///
    /// # Errors
    ///
    /// Returns a `-201` [`PawsError`] when any field is missing, else `-202`
    /// when any value is invalid.
    pub fn finish(self) -> Result<(), PawsError> {
        if !self.missing.is_empty() {
            let mut messages = self.missing;
            messages.extend(self.invalid);
            return Err(PawsError::validation(ValidationCode::Missing, &messages));
        }
        if !self.invalid.is_empty() {
            return Err(PawsError::validation(ValidationCode::Invalid, &self.invalid));
        }
        Ok(())
    }
}

/// Request-specific validation.
pub trait Validate {
    /// Records every issue in the request.
    fn validate(&self, validator: &mut Validator, limits: &ValidationLimits);
}

/// Server-side bounds applied during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Maximum locations in one batch request.
    pub max_batch_locations: usize,
}

/// Validates a request and returns the collected outcome.
///
/// # Errors
///
/// Returns the validation [`PawsError`] when any issue is found.
pub fn validate_request<R: PawsRequest + Validate>(
    request: &R,
    limits: &ValidationLimits,
) -> Result<(), PawsError> {
    let mut validator = Validator::new();
    check_envelope(request, &mut validator);
    request.validate(&mut validator, limits);
    validator.finish()
}

// ============================================================================
// SECTION: Shared Checks
// ============================================================================

/// Checks the message `type` and presence of `version`.
fn check_envelope<R: PawsRequest>(request: &R, validator: &mut Validator) {
    if let Some(message_type) = request.message_type()
        && message_type != R::TYPE
    {
        validator.invalid(format!("type must be {}, got {message_type}", R::TYPE));
    }
    match request.version() {
        None => validator.missing("version"),
        Some(version) if version.trim().is_empty() => validator.missing("version"),
        Some(_) => {}
    }
}

/// Checks a device descriptor.
fn check_device(validator: &mut Validator, field: &str, device: Option<&DeviceDescriptor>) {
    let Some(device) = validator.require(field, device) else {
        return;
    };
    if device.serial_number.trim().is_empty() {
        validator.missing(&format!("{field}.serialNumber"));
    }
    if let Some(eirp) = device.max_eirp_dbm
        && !eirp.is_finite()
    {
        validator.invalid(format!("{field}.maxEirpDbm must be finite"));
    }
    if device.ruleset_ids.iter().any(|id| id.as_str().trim().is_empty()) {
        validator.invalid(format!("{field}.rulesetIds must not contain empty ids"));
    }
}

/// Checks a location ellipse.
fn check_location(validator: &mut Validator, field: &str, location: Option<&Location>) {
    let Some(location) = validator.require(field, location) else {
        return;
    };
    if let Err(err) = location.center().validate() {
        validator.invalid(format!("{field}.point.center: {err}"));
    }
    let axes = [location.point.semi_major_axis, location.point.semi_minor_axis];
    if axes.iter().any(|axis| !axis.is_finite() || *axis < 0.0) {
        validator.invalid(format!("{field}.point axes must be finite and >= 0"));
    }
    if location.confidence.is_some_and(|confidence| confidence > 100) {
        validator.invalid(format!("{field}.confidence must be <= 100"));
    }
}

/// Checks the event span for event-scheduled device types.
fn check_event_time(
    validator: &mut Validator,
    device: Option<&DeviceDescriptor>,
    event_time: Option<&EventTime>,
) {
    let scheduled = device.is_some_and(|device| device.effective_type().is_event_scheduled());
    match event_time {
        None if scheduled => validator.missing("eventTime"),
        None => {}
        Some(_) if device.is_some() && !scheduled => {
            validator.invalid("eventTime applies only to LPAUX and TBAS devices");
        }
        Some(span) if span.start_time >= span.stop_time => {
            validator.invalid("eventTime.startTime must precede eventTime.stopTime");
        }
        Some(_) => {}
    }
}

/// Checks registrant identity and contact.
fn check_owner(validator: &mut Validator, owner: Option<&DeviceOwner>) {
    let Some(owner) = validator.require("deviceOwner", owner) else {
        return;
    };
    if owner.name.trim().is_empty() {
        validator.missing("deviceOwner.name");
    }
    let has_contact = [&owner.email, &owner.phone]
        .into_iter()
        .flatten()
        .any(|contact| !contact.trim().is_empty());
    if !has_contact {
        validator.missing("deviceOwner.email or deviceOwner.phone");
    }
    if let Some(email) = owner.email.as_deref()
        && !email.trim().is_empty()
        && !email.contains('@')
    {
        validator.invalid("deviceOwner.email must contain @");
    }
}

/// Checks antenna characteristics.
fn check_antenna(validator: &mut Validator, antenna: &AntennaCharacteristics) {
    if !antenna.height.is_finite() || antenna.height < 0.0 {
        validator.invalid("antenna.height must be finite and >= 0");
    }
    if antenna.height_uncertainty.is_some_and(|value| !value.is_finite() || value < 0.0) {
        validator.invalid("antenna.heightUncertainty must be finite and >= 0");
    }
}

// ============================================================================
// SECTION: Request Checks
// ============================================================================

impl Validate for InitRequest {
    fn validate(&self, validator: &mut Validator, _limits: &ValidationLimits) {
        check_device(validator, "deviceDesc", self.device_desc.as_ref());
        check_location(validator, "location", self.location.as_ref());
    }
}

impl Validate for RegistrationRequest {
    fn validate(&self, validator: &mut Validator, _limits: &ValidationLimits) {
        check_device(validator, "deviceDesc", self.device_desc.as_ref());
        check_location(validator, "location", self.location.as_ref());
        check_owner(validator, self.device_owner.as_ref());
        if let Some(device) = &self.device_desc {
            let manufacturer = device.manufacturer_id.as_deref().unwrap_or_default();
            if manufacturer.trim().is_empty() {
                validator.missing("deviceDesc.manufacturerId");
            }
            if device.effective_type() == DeviceType::Fixed && self.antenna.is_none() {
                validator.missing("antenna");
            }
        }
        if let Some(antenna) = &self.antenna {
            check_antenna(validator, antenna);
        }
    }
}

impl Validate for AvailSpectrumRequest {
    fn validate(&self, validator: &mut Validator, _limits: &ValidationLimits) {
        check_device(validator, "deviceDesc", self.device_desc.as_ref());
        check_location(validator, "location", self.location.as_ref());
        check_event_time(validator, self.device_desc.as_ref(), self.event_time.as_ref());
    }
}

impl Validate for AvailSpectrumBatchRequest {
    fn validate(&self, validator: &mut Validator, limits: &ValidationLimits) {
        check_device(validator, "deviceDesc", self.device_desc.as_ref());
        check_event_time(validator, self.device_desc.as_ref(), self.event_time.as_ref());
        let Some(locations) = validator.require("locations", self.locations.as_ref()) else {
            return;
        };
        if locations.is_empty() {
            validator.missing("locations[0]");
        }
        if locations.len() > limits.max_batch_locations {
            validator.invalid(format!(
                "locations exceeds the batch limit of {}",
                limits.max_batch_locations
            ));
        }
        for (index, location) in locations.iter().enumerate() {
            check_location(validator, &format!("locations[{index}]"), Some(location));
        }
    }
}

impl Validate for SpectrumUseNotify {
    fn validate(&self, validator: &mut Validator, _limits: &ValidationLimits) {
        check_device(validator, "deviceDesc", self.device_desc.as_ref());
        check_location(validator, "location", self.location.as_ref());
        check_event_time(validator, self.device_desc.as_ref(), self.event_time.as_ref());
        let Some(spectra) = validator.require("spectra", self.spectra.as_ref()) else {
            return;
        };
        if spectra.is_empty() {
            validator.missing("spectra[0]");
        }
        for (index, used) in spectra.iter().enumerate() {
            if used.eirp_dbm.is_some_and(|eirp| !eirp.is_finite()) {
                validator.invalid(format!("spectra[{index}].eirpDbm must be finite"));
            }
        }
    }
}

impl Validate for DeviceValidationRequest {
    fn validate(&self, validator: &mut Validator, limits: &ValidationLimits) {
        let Some(devices) = validator.require("deviceDescs", self.device_descs.as_ref()) else {
            return;
        };
        if devices.is_empty() {
            validator.missing("deviceDescs[0]");
        }
        if devices.len() > limits.max_batch_locations {
            validator.invalid(format!(
                "deviceDescs exceeds the batch limit of {}",
                limits.max_batch_locations
            ));
        }
        for (index, device) in devices.iter().enumerate() {
            check_device(validator, &format!("deviceDescs[{index}]"), Some(device));
        }
    }
}

impl Validate for InterferenceQueryRequest {
    fn validate(&self, validator: &mut Validator, _limits: &ValidationLimits) {
        check_location(validator, "location", self.location.as_ref());
        if let (Some(start), Some(end)) = (self.start_channel, self.end_channel)
            && start > end
        {
            validator.invalid(format!("startChannel {start} exceeds endChannel {end}"));
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
