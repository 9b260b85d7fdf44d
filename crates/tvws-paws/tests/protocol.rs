// crates/tvws-paws/tests/protocol.rs
// ============================================================================
// Module: Protocol Manager Tests
// Description: End-to-end PAWS method handling over a seeded store.
// Purpose: Verify validation order, error codes, and method results.
// Dependencies: tvws-core, tvws-paws
// ============================================================================

//! ## Overview
//! Drives every PAWS method through [`tvws_paws::PawsProtocolManager`] with a
//! single TV station protecting channel 30 around Washington, DC.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::float_cmp,
    reason = "Test-only protocol assertions."
)]

mod common;

use std::time::Duration;

use serde_json::json;
use tvws_core::Authority;
use tvws_core::CacheEventKind;
use tvws_core::DatasetKind;
use tvws_core::GeoPoint;
use tvws_core::IncumbentRecord;
use tvws_core::IncumbentStoreExt;
use tvws_paws::PawsErrorKind;
use tvws_paws::PawsMethod;
use tvws_paws::PawsOutcome;
use tvws_paws::ProtocolSettings;
use tvws_paws::ProtocolStage;
use tvws_paws::ValidationCode;

use crate::common::DC;
use crate::common::FCC_RULESET;
use crate::common::Harness;
use crate::common::first_schedule_channels;
use crate::common::fixed_device;
use crate::common::location;
use crate::common::lp_aux_device;
use crate::common::mode_ii_device;
use crate::common::register_params;
use crate::common::spectrum_params;
use crate::common::tv_station;

fn dc_harness() -> Harness {
    Harness::with_records(&[tv_station("1", 30, GeoPoint::new(DC.0, DC.1), 10.0)])
}

// ============================================================================
// SECTION: Request Gates
// ============================================================================

#[test]
fn version_mismatch_is_rejected_before_any_store_call() {
    let harness = dc_harness();
    let mut params = spectrum_params(mode_ii_device("SN-1"), DC.0, DC.1);
    params["version"] = json!("2.0");
    let err = harness.call("spectrum.paws.getSpectrum", params).expect_err("version mismatch");
    assert_eq!(err.kind, PawsErrorKind::UnsupportedVersion);
    assert_eq!(err.envelope().code, "-101");
    assert_eq!(harness.store.calls(), 0);
    let event = harness.audit.last();
    assert_eq!(event.stage, ProtocolStage::Parsed);
    assert_eq!(event.error_code, Some("-101"));
}

#[test]
fn null_params_are_an_invalid_request() {
    let harness = dc_harness();
    let err = harness
        .manager
        .handle("spectrum.paws.init", None, None)
        .expect_err("params required");
    assert_eq!(err.envelope().code, "-32600");
    assert_eq!(err.message, "params are required");

    let err = harness.call("spectrum.paws.init", json!([1, 2])).expect_err("not an object");
    assert_eq!(err.message, "params must be a JSON object");
    assert_eq!(harness.store.calls(), 0);
}

#[test]
fn malformed_params_report_invalid_value() {
    let harness = dc_harness();
    let params = json!({ "version": "1.0", "location": "here" });
    let err = harness.call("spectrum.paws.init", params).expect_err("malformed");
    assert_eq!(err.kind, PawsErrorKind::Validation(ValidationCode::Invalid));
    assert!(err.message.starts_with("malformed params"));
}

#[test]
fn missing_location_reports_missing_field() {
    let harness = dc_harness();
    let params = json!({
        "type": "AVAIL_SPECTRUM_REQ",
        "version": "1.0",
        "deviceDesc": mode_ii_device("SN-1"),
    });
    let err = harness.call("spectrum.paws.getSpectrum", params).expect_err("missing location");
    assert_eq!(err.envelope().code, "-201");
    assert!(err.message.contains("location is required"));
    assert_eq!(harness.store.calls(), 0);
}

#[test]
fn event_devices_require_event_time() {
    let harness = dc_harness();
    let mut device = mode_ii_device("LP-1");
    device["deviceType"] = json!("LPAUX");
    let err = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(device, DC.0, DC.1))
        .expect_err("event time required");
    assert_eq!(err.envelope().code, "-201");
    assert!(err.message.contains("eventTime is required"));
}

// ============================================================================
// SECTION: Init and Registration
// ============================================================================

#[test]
fn init_returns_region_rulesets() {
    let harness = dc_harness();
    let params = json!({
        "type": "INIT_REQ",
        "version": "1.0",
        "deviceDesc": mode_ii_device("SN-1"),
        "location": location(DC.0, DC.1),
    });
    let result = harness.call("spectrum.paws.init", params).expect("init");
    assert_eq!(result["type"], "INIT_RESP");
    assert_eq!(result["version"], "1.0");
    let info = &result["rulesetInfos"][0];
    assert_eq!(info["rulesetId"], FCC_RULESET);
    assert_eq!(info["startChannel"], 2);
    assert_eq!(info["endChannel"], 51);
}

#[test]
fn init_with_foreign_ruleset_is_unsupported() {
    let harness = dc_harness();
    let mut device = mode_ii_device("SN-1");
    device["rulesetIds"] = json!(["ETSI-EN-301-598-1.1.1"]);
    let params = json!({
        "type": "INIT_REQ",
        "version": "1.0",
        "deviceDesc": device,
        "location": location(DC.0, DC.1),
    });
    let err = harness.call("spectrum.paws.init", params).expect_err("unsupported");
    assert_eq!(err.envelope().code, "-102");
}

#[test]
fn location_outside_every_region_is_rejected() {
    let harness = dc_harness();
    let err = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-1"), 10.0, 10.0))
        .expect_err("outside region");
    assert_eq!(err.kind, PawsErrorKind::OutsideSupportedRegion);
    assert_eq!(err.envelope().code, "-104");
}

#[test]
fn registration_requires_owner_contact() {
    let harness = dc_harness();
    let mut params = register_params(fixed_device("FX-1"));
    params["deviceOwner"] = json!({ "name": "Acme Ops" });
    let err = harness.call("spectrum.paws.register", params).expect_err("contact required");
    assert_eq!(err.envelope().code, "-201");
    assert!(err.message.contains("deviceOwner.email or deviceOwner.phone"));
}

// ============================================================================
// SECTION: Spectrum Queries
// ============================================================================

#[test]
fn get_spectrum_excludes_protected_channel() {
    let harness = dc_harness();
    let result = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-1"), DC.0, DC.1))
        .expect("spectrum");
    assert_eq!(result["type"], "AVAIL_SPECTRUM_RESP");
    let channels = first_schedule_channels(&result);
    assert!((20..=25).all(|channel| channels.contains(&channel)));
    assert!(!channels.contains(&30));
    assert_eq!(channels.len(), 49);
    let spec = &result["spectrumSpecs"][0];
    assert_eq!(spec["rulesetInfo"]["rulesetId"], FCC_RULESET);
    assert_eq!(spec["maxTotalBwHz"].as_f64().unwrap(), 49.0 * 6e6);
    assert_eq!(spec["maxContiguousBwHz"].as_f64().unwrap(), 28.0 * 6e6);

    let event = harness.audit.last();
    assert_eq!(event.method, PawsMethod::GetSpectrum);
    assert_eq!(event.stage, ProtocolStage::Responded);
    assert_eq!(event.outcome, PawsOutcome::Ok);
}

#[test]
fn distant_location_keeps_every_channel() {
    let harness = dc_harness();
    let result = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-1"), 40.7, -74.0))
        .expect("spectrum");
    assert_eq!(first_schedule_channels(&result).len(), 50);
}

#[test]
fn fixed_device_must_register_first() {
    let harness = dc_harness();
    let err = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(fixed_device("FX-1"), DC.0, DC.1))
        .expect_err("not registered");
    assert_eq!(err.kind, PawsErrorKind::NotRegistered);
    assert_eq!(err.envelope().code, "-302");
}

#[test]
fn registered_fixed_device_gets_spectrum_and_validates() {
    let harness = dc_harness();
    let result =
        harness.call("spectrum.paws.register", register_params(fixed_device("FX-1"))).expect("register");
    assert_eq!(result["type"], "REGISTRATION_RESP");

    let result = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(fixed_device("FX-1"), DC.0, DC.1))
        .expect("spectrum");
    assert!(!first_schedule_channels(&result).contains(&30));

    let params = json!({
        "type": "DEV_VALID_REQ",
        "version": "1.0",
        "deviceDescs": [fixed_device("FX-1"), fixed_device("FX-2")],
    });
    let result = harness.call("spectrum.paws.verifyDevice", params).expect("verify");
    let validities = result["deviceValidities"].as_array().expect("validities");
    assert_eq!(validities.len(), 2);
    assert_eq!(validities[0]["isValid"], true);
    assert_eq!(validities[1]["isValid"], false);
    assert_eq!(validities[1]["reason"], "device is not registered");
}

#[test]
fn verify_device_flags_identifier_mismatch() {
    let harness = dc_harness();
    harness.call("spectrum.paws.register", register_params(fixed_device("FX-1"))).expect("register");
    let mut device = fixed_device("FX-1");
    device["fccId"] = json!("OTHER-9");
    let params = json!({ "type": "DEV_VALID_REQ", "version": "1.0", "deviceDescs": [device] });
    let result = harness.call("spectrum.paws.verifyDevice", params).expect("verify");
    assert_eq!(result["deviceValidities"][0]["isValid"], false);
    assert_eq!(
        result["deviceValidities"][0]["reason"],
        "device identifier does not match the registration"
    );
}

#[test]
fn batch_returns_one_entry_per_location() {
    let harness = dc_harness();
    let params = json!({
        "type": "AVAIL_SPECTRUM_BATCH_REQ",
        "version": "1.0",
        "deviceDesc": mode_ii_device("SN-1"),
        "locations": [location(DC.0, DC.1), location(40.7, -74.0)],
    });
    let result = harness.call("spectrum.paws.getSpectrumBatch", params).expect("batch");
    let entries = result["geoSpectrumSpecs"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(first_schedule_channels(&entries[0]).len(), 49);
    assert_eq!(first_schedule_channels(&entries[1]).len(), 50);
}

#[test]
fn batch_over_the_limit_is_rejected() {
    let settings = ProtocolSettings { max_batch_locations: 2, ..ProtocolSettings::default() };
    let harness = Harness::with_settings(&[], settings);
    let params = json!({
        "type": "AVAIL_SPECTRUM_BATCH_REQ",
        "version": "1.0",
        "deviceDesc": mode_ii_device("SN-1"),
        "locations": [location(DC.0, DC.1), location(DC.0, DC.1), location(DC.0, DC.1)],
    });
    let err = harness.call("spectrum.paws.getSpectrumBatch", params).expect_err("over limit");
    assert_eq!(err.envelope().code, "-202");
    assert!(err.message.contains("batch limit of 2"));
    assert_eq!(harness.store.calls(), 0);
}

#[test]
fn batch_fails_whole_when_one_location_is_outside() {
    let harness = dc_harness();
    let params = json!({
        "type": "AVAIL_SPECTRUM_BATCH_REQ",
        "version": "1.0",
        "deviceDesc": mode_ii_device("SN-1"),
        "locations": [location(DC.0, DC.1), location(10.0, 10.0)],
    });
    let err = harness.call("spectrum.paws.getSpectrumBatch", params).expect_err("outside");
    assert_eq!(err.envelope().code, "-104");
}

// ============================================================================
// SECTION: Spectrum Use and Interference
// ============================================================================

/// Event span around the harness start time.
fn event_time() -> serde_json::Value {
    json!({ "startTime": "2023-11-14T22:00:00Z", "stopTime": "2023-11-15T02:00:00Z" })
}

fn notify_params(spectra: serde_json::Value) -> serde_json::Value {
    json!({
        "type": "SPECTRUM_USE_NOTIFY",
        "version": "1.0",
        "deviceDesc": mode_ii_device("SN-1"),
        "location": location(DC.0, DC.1),
        "spectra": spectra,
    })
}

#[test]
fn notify_on_available_channel_is_accepted() {
    let harness = dc_harness();
    let result = harness
        .call("spectrum.paws.notifySpectrumUse", notify_params(json!([{ "channel": 21 }])))
        .expect("notify");
    assert_eq!(result["type"], "SPECTRUM_USE_RESP");
}

#[test]
fn notify_on_protected_channel_lists_available_channels() {
    let harness = dc_harness();
    let err = harness
        .call("spectrum.paws.notifySpectrumUse", notify_params(json!([{ "channel": 30 }])))
        .expect_err("protected channel");
    let envelope = err.envelope();
    assert_eq!(envelope.code, "-202");
    assert!(envelope.message.contains("channel 30 is not available"));
    let data = envelope.data.expect("data");
    assert!(data.starts_with("region US available channels: [2, 3"));
    assert!(!data.contains(" 30,"));
}

#[test]
fn notify_above_permitted_eirp_is_rejected() {
    let harness = dc_harness();
    let err = harness
        .call(
            "spectrum.paws.notifySpectrumUse",
            notify_params(json!([{ "channel": 21, "eirpDbm": 40.0 }])),
        )
        .expect_err("too loud");
    assert_eq!(err.envelope().code, "-202");
    assert!(err.message.contains("exceeds the permitted EIRP"));
}

#[test]
fn event_time_is_refused_for_non_event_devices() {
    let harness = dc_harness();
    let mut params = notify_params(json!([{ "channel": 21 }]));
    params["eventTime"] = event_time();
    let err = harness.call("spectrum.paws.notifySpectrumUse", params).expect_err("mode 2");
    assert_eq!(err.envelope().code, "-202");
    assert!(err.message.contains("eventTime applies only to LPAUX and TBAS devices"));
    assert_eq!(harness.store.calls(), 0);
}

#[test]
fn lp_aux_use_protects_its_channel_for_the_event() {
    let harness = dc_harness();
    let mut params = notify_params(json!([{ "channel": 21 }]));
    params["deviceDesc"] = lp_aux_device("LP-1");
    params["eventTime"] = event_time();
    harness.call("spectrum.paws.notifySpectrumUse", params).expect("notify");

    let partition = DatasetKind::LpAux.partition_for(Authority::Fcc);
    let stored = harness.store.inner.fetch_by_partition::<IncumbentRecord>(&partition).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].row_key, "LP-1-21");
    let live = harness.cache.get_service_cache_objects(Authority::Fcc, DatasetKind::LpAux).unwrap();
    assert_eq!(live.on_channel(21).count(), 1);
    assert!(harness.events.events.lock().unwrap().iter().any(|event| {
        event.event == CacheEventKind::Loaded && event.message.as_deref() == Some("live update")
    }));

    let result = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-2"), DC.0, DC.1))
        .expect("spectrum");
    assert!(!first_schedule_channels(&result).contains(&21));
}

#[test]
fn interference_query_returns_protecting_station() {
    let harness = dc_harness();
    let params = json!({
        "type": "INTERFERENCE_QUERY_REQ",
        "version": "1.0",
        "location": location(DC.0, DC.1),
        "startChannel": 28,
        "endChannel": 32,
    });
    let result = harness.call("spectrum.paws.interferenceQuery", params).expect("query");
    let incumbents = result["incumbents"].as_array().expect("incumbents");
    assert_eq!(incumbents.len(), 1);
    assert_eq!(incumbents[0]["row_key"], "1");
    assert_eq!(incumbents[0]["channel"], 30);
}

#[test]
fn interference_query_without_match_reports_not_found() {
    let harness = dc_harness();
    let params = json!({
        "type": "INTERFERENCE_QUERY_REQ",
        "version": "1.0",
        "location": location(DC.0, DC.1),
        "startChannel": 2,
        "endChannel": 20,
    });
    let err = harness.call("spectrum.paws.interferenceQuery", params).expect_err("no match");
    assert_eq!(err.kind, PawsErrorKind::IncumbentNotFound);
    assert_eq!(err.envelope().code, "200");
}

#[test]
fn interference_query_rejects_inverted_range() {
    let harness = dc_harness();
    let params = json!({
        "type": "INTERFERENCE_QUERY_REQ",
        "version": "1.0",
        "location": location(DC.0, DC.1),
        "startChannel": 40,
        "endChannel": 20,
    });
    let err = harness.call("spectrum.paws.interferenceQuery", params).expect_err("inverted");
    assert_eq!(err.envelope().code, "-202");
}

// ============================================================================
// SECTION: Cache Status
// ============================================================================

#[test]
fn cache_status_reflects_loaded_datasets() {
    let harness = dc_harness();
    harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-1"), DC.0, DC.1))
        .expect("spectrum");
    let result = harness.manager.handle("tvws.cacheStatus", None, None).expect("status");
    let datasets = result["datasets"].as_array().expect("datasets");
    assert_eq!(datasets.len(), 3);
    assert!(datasets.iter().all(|status| status["state"] == "fresh"));
}

// ============================================================================
// SECTION: Store Failures
// ============================================================================

/// Loads the region polygons and incumbents so later calls hit the cache.
fn warm(harness: &Harness) {
    harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-1"), DC.0, DC.1))
        .expect("warm spectrum");
}

#[test]
fn verify_device_fails_whole_batch_when_store_is_offline() {
    let harness = dc_harness();
    harness.store.set_offline(true);
    let params = json!({
        "type": "DEV_VALID_REQ",
        "version": "1.0",
        "deviceDescs": [fixed_device("FX-1"), fixed_device("FX-2")],
    });
    let err = harness.call("spectrum.paws.verifyDevice", params).expect_err("store offline");
    assert_eq!(err.kind, PawsErrorKind::ServerError);
    assert_eq!(err.envelope().code, "-32000");
    assert!(err.data.as_deref().is_some_and(|data| data.contains("store offline")));
}

#[test]
fn register_reports_store_failure() {
    let harness = dc_harness();
    warm(&harness);
    harness.store.set_offline(true);
    let err = harness
        .call("spectrum.paws.register", register_params(fixed_device("FX-1")))
        .expect_err("store offline");
    assert_eq!(err.envelope().code, "-32000");
    let event = harness.audit.last();
    assert_eq!(event.method, PawsMethod::Register);
    assert_eq!(event.stage, ProtocolStage::Validated);
    assert_eq!(event.error_code, Some("-32000"));
}

#[test]
fn handler_panic_becomes_server_error() {
    let harness = dc_harness();
    warm(&harness);
    harness.store.set_panic_on_write(true);
    let err = harness
        .call("spectrum.paws.register", register_params(fixed_device("FX-1")))
        .expect_err("panicked");
    assert_eq!(err.kind, PawsErrorKind::ServerError);
    assert_eq!(err.message, "internal server error");
    let data = err.data.expect("data");
    assert!(data.starts_with("handler panicked"), "{data}");
    assert!(data.contains("store write panicked"), "{data}");
    assert_eq!(harness.audit.last().error_code, Some("-32000"));

    harness.store.set_panic_on_write(false);
    harness
        .call("spectrum.paws.register", register_params(fixed_device("FX-1")))
        .expect("manager keeps serving");
}

#[test]
fn spectrum_fails_closed_when_data_never_loaded() {
    let harness = dc_harness();
    harness.store.set_offline(true);
    let err = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-1"), DC.0, DC.1))
        .expect_err("no data");
    assert_eq!(err.kind, PawsErrorKind::ServerError);
    assert_eq!(err.envelope().code, "-32000");
}

#[test]
fn spectrum_fails_closed_when_data_expires() {
    let harness = dc_harness();
    warm(&harness);
    harness.store.set_offline(true);
    harness.clock.advance(Duration::from_secs(86_401));
    let err = harness
        .call("spectrum.paws.getSpectrum", spectrum_params(mode_ii_device("SN-1"), DC.0, DC.1))
        .expect_err("expired data");
    assert_eq!(err.envelope().code, "-32000");
    assert!(harness.events.kinds().contains(&CacheEventKind::Degraded));
}
