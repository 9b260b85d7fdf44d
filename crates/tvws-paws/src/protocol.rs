// crates/tvws-paws/src/protocol.rs
// ============================================================================
// Module: PAWS Protocol Manager
// Description: Method dispatch for PAWS requests over the availability engine.
// Purpose: Turn untrusted params into validated engine calls and responses.
// Dependencies: tvws-core, serde, serde_json
// ============================================================================

//! ## Overview
//! [`PawsProtocolManager`] handles one request at a time and keeps no state
//! between requests beyond the shared cache. Every method follows the same
//! path through [`ProtocolStage`]: params must be a JSON object, decode into
//! the typed request, pass field validation, and match the server protocol
//! version before anything touches the store or engine.
//!
//! ## Invariants
//! - A version mismatch is rejected before any store or cache call.
//! - A panic inside a handler becomes a `ServerError`; it never reaches the
//!   transport.
//! - Every call emits exactly one audit event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tvws_config::ServerConfig;
use tvws_core::Authority;
use tvws_core::AvailabilityEngine;
use tvws_core::AvailabilityQuery;
use tvws_core::CacheError;
use tvws_core::CacheKey;
use tvws_core::DatasetKind;
use tvws_core::DeviceDescriptor;
use tvws_core::DeviceRegistration;
use tvws_core::DeviceType;
use tvws_core::EventTime;
use tvws_core::IncumbentKind;
use tvws_core::IncumbentRecord;
use tvws_core::IncumbentStoreExt;
use tvws_core::Location;
use tvws_core::RegionRules;
use tvws_core::RulesetId;
use tvws_core::SpectrumSchedule;
use tvws_core::SpectrumSpec;
use tvws_core::SyncStatus;
use tvws_core::Timestamp;
use tvws_core::ValidityWindow;

use crate::audit::PawsAuditEvent;
use crate::audit::PawsAuditSink;
use crate::errors::PawsError;
use crate::errors::PawsErrorKind;
use crate::errors::ValidationCode;
use crate::messages::AvailSpectrumBatchRequest;
use crate::messages::AvailSpectrumBatchResponse;
use crate::messages::AvailSpectrumRequest;
use crate::messages::AvailSpectrumResponse;
use crate::messages::CacheStatusResponse;
use crate::messages::DeviceValidationRequest;
use crate::messages::DeviceValidationResponse;
use crate::messages::DeviceValidity;
use crate::messages::GeoSpectrumSpec;
use crate::messages::InitRequest;
use crate::messages::InitResponse;
use crate::messages::InterferenceQueryRequest;
use crate::messages::InterferenceQueryResponse;
use crate::messages::PawsMethod;
use crate::messages::PawsRequest;
use crate::messages::RegistrationRequest;
use crate::messages::RegistrationResponse;
use crate::messages::SpectrumUse;
use crate::messages::SpectrumUseNotify;
use crate::messages::SpectrumUseResponse;
use crate::messages::message_type;
use crate::validation::Validate;
use crate::validation::ValidationLimits;
use crate::validation::validate_request;

// ============================================================================
// SECTION: Stages and Settings
// ============================================================================

/// Per-request protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStage {
    /// Envelope accepted.
    Received,
    /// Params decoded into the typed request.
    Parsed,
    /// Field validation and version gate passed.
    Validated,
    /// Engine or store work finished.
    Executed,
    /// Result serialized for the transport.
    Responded,
}

/// Protocol-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    /// Supported protocol version string.
    pub protocol_version: String,
    /// Maximum locations or devices in one batch.
    pub max_batch_locations: usize,
}

impl ProtocolSettings {
    /// Builds settings from the server config section.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            protocol_version: config.protocol_version.clone(),
            max_batch_locations: config.max_batch_locations,
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self { protocol_version: "1.0".to_string(), max_batch_locations: 64 }
    }
}

// ============================================================================
// SECTION: Protocol Manager
// ============================================================================

/// Dispatches PAWS methods to the availability engine and store.
#[derive(Clone)]
pub struct PawsProtocolManager {
    /// Availability engine with its cache and store.
    engine: Arc<AvailabilityEngine>,
    /// Audit sink for request events.
    audit: Arc<dyn PawsAuditSink>,
    /// Protocol settings.
    settings: ProtocolSettings,
}

impl PawsProtocolManager {
    /// Creates a protocol manager.
    #[must_use]
    pub fn new(
        engine: Arc<AvailabilityEngine>,
        audit: Arc<dyn PawsAuditSink>,
        settings: ProtocolSettings,
    ) -> Self {
        Self { engine, audit, settings }
    }

    /// Availability engine.
    #[must_use]
    pub fn engine(&self) -> &AvailabilityEngine {
        &self.engine
    }

    /// Protocol settings.
    #[must_use]
    pub const fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// Handles one method call and records its audit event.
    ///
    /// # Errors
    ///
    /// Returns [`PawsError`] for every protocol failure, including panics
    /// raised while the request was executing.
    pub fn handle(
        &self,
        method: &str,
        params: Option<Value>,
        request_id: Option<String>,
    ) -> Result<Value, PawsError> {
        let started = Instant::now();
        let mut stage = ProtocolStage::Received;
        let parsed = PawsMethod::parse(method);
        let result = match parsed {
            None => Err(PawsError::new(
                PawsErrorKind::MethodNotFound,
                format!("unknown method {method}"),
            )),
            Some(method) => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    self.dispatch(method, params, &mut stage)
                }));
                outcome.unwrap_or_else(|payload| {
                    Err(PawsError::server_error(format!(
                        "handler panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
            }
        };
        if result.is_ok() {
            stage = ProtocolStage::Responded;
        }
        self.audit.record(&PawsAuditEvent::new(
            request_id,
            parsed.unwrap_or(PawsMethod::Other),
            stage,
            result.as_ref().err(),
            started.elapsed().as_millis(),
        ));
        result
    }

    /// Routes a parsed method.
    fn dispatch(
        &self,
        method: PawsMethod,
        params: Option<Value>,
        stage: &mut ProtocolStage,
    ) -> Result<Value, PawsError> {
        match method {
            PawsMethod::Init => self.run(params, stage, Self::init),
            PawsMethod::Register => self.run(params, stage, Self::register),
            PawsMethod::GetSpectrum => self.run(params, stage, Self::get_spectrum),
            PawsMethod::GetSpectrumBatch => self.run(params, stage, Self::get_spectrum_batch),
            PawsMethod::NotifySpectrumUse => self.run(params, stage, Self::notify_spectrum_use),
            PawsMethod::VerifyDevice => self.run(params, stage, Self::verify_device),
            PawsMethod::InterferenceQuery => self.run(params, stage, Self::interference_query),
            PawsMethod::CacheStatus => {
                *stage = ProtocolStage::Validated;
                let response = CacheStatusResponse { datasets: self.engine.cache().status() };
                *stage = ProtocolStage::Executed;
                encode(&response)
            }
            PawsMethod::Invalid | PawsMethod::Other => Err(PawsError::new(
                PawsErrorKind::MethodNotFound,
                format!("unknown method {}", method.as_str()),
            )),
        }
    }

    /// Shared request pipeline: null check, decode, validate, version gate,
    /// execute.
    fn run<R, S>(
        &self,
        params: Option<Value>,
        stage: &mut ProtocolStage,
        execute: fn(&Self, R) -> Result<S, PawsError>,
    ) -> Result<Value, PawsError>
    where
        R: DeserializeOwned + PawsRequest + Validate,
        S: Serialize,
    {
        let params = match params {
            None | Some(Value::Null) => {
                return Err(PawsError::invalid_request("params are required"));
            }
            Some(params @ Value::Object(_)) => params,
            Some(_) => return Err(PawsError::invalid_request("params must be a JSON object")),
        };
        let request: R = serde_json::from_value(params).map_err(|err| {
            PawsError::new(
                PawsErrorKind::Validation(ValidationCode::Invalid),
                format!("malformed params: {err}"),
            )
        })?;
        *stage = ProtocolStage::Parsed;
        validate_request(&request, &self.limits())?;
        self.check_version(request.version())?;
        *stage = ProtocolStage::Validated;
        let response = execute(self, request)?;
        *stage = ProtocolStage::Executed;
        encode(&response)
    }

    /// Validation bounds.
    const fn limits(&self) -> ValidationLimits {
        ValidationLimits { max_batch_locations: self.settings.max_batch_locations }
    }

    /// Rejects any version other than the server's.
    fn check_version(&self, requested: Option<&str>) -> Result<(), PawsError> {
        let requested = requested.unwrap_or_default();
        if requested == self.settings.protocol_version {
            return Ok(());
        }
        Err(PawsError::new(
            PawsErrorKind::UnsupportedVersion,
            format!(
                "protocol version {requested} is not supported; server speaks {}",
                self.settings.protocol_version
            ),
        ))
    }

    /// Version echoed in responses.
    fn version(&self) -> String {
        self.settings.protocol_version.clone()
    }

    // ------------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------------

    /// `spectrum.paws.init`.
    fn init(&self, request: InitRequest) -> Result<InitResponse, PawsError> {
        let device = present(request.device_desc, "deviceDesc")?;
        let location = present(request.location, "location")?;
        let region = self.engine.resolve_region(&location.center(), None)?;
        let rulesets = applicable_rulesets(region, &device)?;
        Ok(InitResponse {
            message_type: message_type::INIT_RESP.to_string(),
            version: self.version(),
            ruleset_infos: rulesets.into_iter().map(|id| region.ruleset_info(id)).collect(),
        })
    }

    /// `spectrum.paws.register`.
    fn register(&self, request: RegistrationRequest) -> Result<RegistrationResponse, PawsError> {
        let device = present(request.device_desc, "deviceDesc")?;
        let location = present(request.location, "location")?;
        let owner = present(request.device_owner, "deviceOwner")?;
        let manufacturer_id = present(device.manufacturer_id.clone(), "deviceDesc.manufacturerId")?;
        let region = self.engine.resolve_region(&location.center(), None)?;
        let rulesets = applicable_rulesets(region, &device)?;
        let registration = DeviceRegistration {
            manufacturer_id,
            serial_number: device.serial_number.clone(),
            device,
            owner,
            location,
            antenna: request.antenna,
            registered_at: self.now(),
        };
        self.engine.cache().store().insert_or_replace(&registration)?;
        Ok(RegistrationResponse {
            message_type: message_type::REGISTRATION_RESP.to_string(),
            version: self.version(),
            ruleset_infos: rulesets.into_iter().map(|id| region.ruleset_info(id)).collect(),
        })
    }

    /// `spectrum.paws.getSpectrum`.
    fn get_spectrum(
        &self,
        request: AvailSpectrumRequest,
    ) -> Result<AvailSpectrumResponse, PawsError> {
        let device = present(request.device_desc, "deviceDesc")?;
        let location = present(request.location, "location")?;
        self.ensure_registered(&device)?;
        let now = self.now();
        let spectrum_specs = self.spectrum_specs(&device, &location, request.event_time, now)?;
        Ok(AvailSpectrumResponse {
            message_type: message_type::AVAIL_SPECTRUM_RESP.to_string(),
            version: self.version(),
            timestamp: now,
            device_desc: device,
            spectrum_specs,
        })
    }

    /// `spectrum.paws.getSpectrumBatch`. The first failing location fails
    /// the whole batch.
    fn get_spectrum_batch(
        &self,
        request: AvailSpectrumBatchRequest,
    ) -> Result<AvailSpectrumBatchResponse, PawsError> {
        let device = present(request.device_desc, "deviceDesc")?;
        let locations = present(request.locations, "locations")?;
        self.ensure_registered(&device)?;
        let now = self.now();
        let geo_spectrum_specs = locations
            .into_iter()
            .map(|location| {
                let spectrum_specs =
                    self.spectrum_specs(&device, &location, request.event_time, now)?;
                Ok(GeoSpectrumSpec { location, spectrum_specs })
            })
            .collect::<Result<Vec<_>, PawsError>>()?;
        Ok(AvailSpectrumBatchResponse {
            message_type: message_type::AVAIL_SPECTRUM_BATCH_RESP.to_string(),
            version: self.version(),
            timestamp: now,
            device_desc: device,
            geo_spectrum_specs,
        })
    }

    /// `spectrum.paws.notifySpectrumUse`. Channels an LPAUX device reports
    /// for an event become protected incumbents for that event.
    fn notify_spectrum_use(
        &self,
        request: SpectrumUseNotify,
    ) -> Result<SpectrumUseResponse, PawsError> {
        let device = present(request.device_desc, "deviceDesc")?;
        let location = present(request.location, "location")?;
        let spectra = present(request.spectra, "spectra")?;
        let device_type = device.effective_type();
        let serial_number = device.serial_number.clone();
        let result = self.engine.compute_available_channels(&AvailabilityQuery {
            device,
            location,
            region: None,
            at: self.now(),
            event_window: request.event_time.map(|span| (span.start_time, span.stop_time)),
        })?;
        let mut issues = Vec::new();
        for used in &spectra {
            match result.channel(used.channel) {
                None => issues
                    .push(format!("channel {} is not available at this location", used.channel)),
                Some(info) if used.eirp_dbm.is_some_and(|eirp| eirp > info.max_eirp_dbm) => {
                    issues.push(format!(
                        "channel {} exceeds the permitted EIRP of {} dBm",
                        used.channel, info.max_eirp_dbm
                    ));
                }
                Some(_) => {}
            }
        }
        if !issues.is_empty() {
            let available: Vec<String> =
                result.channels.iter().map(|info| info.channel.to_string()).collect();
            return Err(PawsError::validation(ValidationCode::Invalid, &issues).with_data(format!(
                "region {} available channels: [{}]",
                result.region,
                available.join(", ")
            )));
        }
        if device_type == DeviceType::LpAux
            && let Some(event_time) = request.event_time
        {
            self.record_event_use(
                result.authority,
                &serial_number,
                &location,
                &spectra,
                event_time,
            )?;
        }
        Ok(SpectrumUseResponse {
            message_type: message_type::SPECTRUM_USE_RESP.to_string(),
            version: self.version(),
        })
    }

    /// `spectrum.paws.verifyDevice`. A store failure fails the whole batch.
    fn verify_device(
        &self,
        request: DeviceValidationRequest,
    ) -> Result<DeviceValidationResponse, PawsError> {
        let devices = present(request.device_descs, "deviceDescs")?;
        let device_validities = devices
            .into_iter()
            .map(|device| {
                let reason = self.invalid_reason(&device)?;
                Ok(DeviceValidity { device_desc: device, is_valid: reason.is_none(), reason })
            })
            .collect::<Result<Vec<_>, PawsError>>()?;
        Ok(DeviceValidationResponse {
            message_type: message_type::DEV_VALID_RESP.to_string(),
            version: self.version(),
            device_validities,
        })
    }

    /// `spectrum.paws.interferenceQuery`.
    fn interference_query(
        &self,
        request: InterferenceQueryRequest,
    ) -> Result<InterferenceQueryResponse, PawsError> {
        let location = present(request.location, "location")?;
        let point = location.center();
        let region = self.engine.resolve_region(&point, None)?;
        let start = request.start_channel.unwrap_or(region.start_channel);
        let end = request.end_channel.unwrap_or(region.end_channel);
        let now = self.now();
        let incumbents =
            self.engine.find_protecting_incumbents(region, &point, Some(start..=end), now)?;
        if incumbents.is_empty() {
            return Err(PawsError::new(
                PawsErrorKind::IncumbentNotFound,
                format!("no incumbent protects the location on channels {start}-{end}"),
            ));
        }
        Ok(InterferenceQueryResponse {
            message_type: message_type::INTERFERENCE_QUERY_RESP.to_string(),
            version: self.version(),
            timestamp: now,
            incumbents,
        })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Current time from the cache clock.
    fn now(&self) -> Timestamp {
        self.engine.cache().now()
    }

    /// Stores one LPAUX incumbent per used channel, bumps the dataset sync
    /// status, and publishes each record to the live cache.
    fn record_event_use(
        &self,
        authority: Authority,
        serial_number: &str,
        location: &Location,
        spectra: &[SpectrumUse],
        event_time: EventTime,
    ) -> Result<(), PawsError> {
        let cache = self.engine.cache();
        let store = cache.store();
        let key = CacheKey::Incumbents { authority, dataset: DatasetKind::LpAux };
        for used in spectra {
            let record = IncumbentRecord {
                partition_key: DatasetKind::LpAux.partition_for(authority),
                row_key: format!("{serial_number}-{}", used.channel),
                call_sign: serial_number.to_string(),
                channel: used.channel,
                location: location.center(),
                contour: None,
                protection_radius_km: None,
                validity: Some(ValidityWindow {
                    start: event_time.start_time,
                    end: Some(event_time.stop_time),
                }),
                kind: IncumbentKind::LpAuxRegistration { venue: None, licensee: None },
            };
            store.insert_or_replace(&record)?;
            match cache.update_cache_objects(authority, record) {
                Ok(_) | Err(CacheError::UnknownDataset(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        store.insert_or_replace(&SyncStatus {
            scope: key.sync_scope().to_string(),
            dataset: key.dataset_label().to_string(),
            last_modified: self.now(),
            needs_update: false,
        })?;
        Ok(())
    }

    /// Fixed devices must hold a registration before spectrum queries.
    fn ensure_registered(&self, device: &DeviceDescriptor) -> Result<(), PawsError> {
        if device.effective_type() != DeviceType::Fixed {
            return Ok(());
        }
        if self.registration(device)?.is_some() {
            return Ok(());
        }
        Err(PawsError::new(
            PawsErrorKind::NotRegistered,
            format!("fixed device {} must register before requesting spectrum", device.serial_number),
        ))
    }

    /// Looks up the registration for a device.
    fn registration(
        &self,
        device: &DeviceDescriptor,
    ) -> Result<Option<DeviceRegistration>, PawsError> {
        let Some(manufacturer_id) = device.manufacturer_id.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .engine
            .cache()
            .store()
            .fetch_entity::<DeviceRegistration>(manufacturer_id, &device.serial_number)?)
    }

    /// Reason a device may not operate, or `None` when it may.
    fn invalid_reason(&self, device: &DeviceDescriptor) -> Result<Option<String>, PawsError> {
        if device.manufacturer_id.as_deref().is_none_or(str::is_empty) {
            return Ok(Some("manufacturerId is required for validation".to_string()));
        }
        let offered = self.engine.catalog().iter().any(|region| {
            !region.applicable_rulesets(&device.ruleset_ids).is_empty()
        });
        if !offered {
            return Ok(Some("no configured region offers the device rulesets".to_string()));
        }
        match self.registration(device)? {
            None => Ok(Some("device is not registered".to_string())),
            Some(registration) if registration.device.fcc_id != device.fcc_id => {
                Ok(Some("device identifier does not match the registration".to_string()))
            }
            Some(_) => Ok(None),
        }
    }

    /// Builds one spectrum spec per applicable ruleset at a location.
    fn spectrum_specs(
        &self,
        device: &DeviceDescriptor,
        location: &Location,
        event_time: Option<EventTime>,
        now: Timestamp,
    ) -> Result<Vec<SpectrumSpec>, PawsError> {
        let region = self.engine.resolve_region(&location.center(), None)?;
        let rulesets = applicable_rulesets(region, device)?;
        let result = self.engine.compute_available_channels(&AvailabilityQuery {
            device: device.clone(),
            location: *location,
            region: Some(region.code.clone()),
            at: now,
            event_window: event_time.map(|span| (span.start_time, span.stop_time)),
        })?;
        let polling_ms = i64::try_from(region.max_polling_secs.saturating_mul(1000))
            .unwrap_or(i64::MAX);
        let schedule_time = event_time.unwrap_or(EventTime {
            start_time: now,
            stop_time: now.saturating_add_millis(polling_ms),
        });
        let bandwidth_hz = region.channel_bandwidth_hz();
        let max_total_bw_hz = channels_hz(result.summary.free_channels, bandwidth_hz);
        let max_contiguous_bw_hz = channels_hz(result.summary.max_run_width, bandwidth_hz);
        Ok(rulesets
            .into_iter()
            .map(|ruleset_id| SpectrumSpec {
                ruleset_info: region.ruleset_info(ruleset_id),
                spectrum_schedules: vec![SpectrumSchedule {
                    event_time: schedule_time,
                    spectra: result.channels.clone(),
                }],
                needs_spectrum_report: region.needs_spectrum_report,
                max_total_bw_hz,
                max_contiguous_bw_hz,
            })
            .collect())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rulesets of `region` the device supports, or `Unsupported` when none.
fn applicable_rulesets(
    region: &RegionRules,
    device: &DeviceDescriptor,
) -> Result<Vec<RulesetId>, PawsError> {
    let rulesets = region.applicable_rulesets(&device.ruleset_ids);
    if rulesets.is_empty() {
        return Err(PawsError::new(
            PawsErrorKind::Unsupported,
            format!("no ruleset supported by the device applies in region {}", region.code),
        ));
    }
    Ok(rulesets)
}

/// Unwraps a field that validation already required.
fn present<T>(value: Option<T>, field: &str) -> Result<T, PawsError> {
    value.ok_or_else(|| {
        PawsError::validation(ValidationCode::Missing, &[format!("{field} is required")])
    })
}

/// Bandwidth of `count` channels.
fn channels_hz(count: usize, bandwidth_hz: f64) -> f64 {
    f64::from(u32::try_from(count).unwrap_or(u32::MAX)) * bandwidth_hz
}

/// Serializes a response.
fn encode(response: &impl Serialize) -> Result<Value, PawsError> {
    serde_json::to_value(response)
        .map_err(|err| PawsError::server_error(format!("response serialization failed: {err}")))
}

/// Extracts the message of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
