// crates/tvws-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic starting point for operators and tests.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `tvws.toml` covering both supported authorities. The
//! output is static and must always pass [`crate::TvwsConfig::from_toml`].

/// Returns a canonical example `tvws.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8080"
max_body_bytes = 1048576
protocol_version = "1.0"
max_batch_locations = 64

[store]
type = "sqlite"
path = "tvws.sqlite"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[cache]
fetch_timeout_ms = 30000
max_snapshot_age_secs = 86400

[cache.refresh]
tv_engineering_data = 3600
lp_aux = 3600
pmse = 300
tbas = 3600
mvpd = 3600
region_polygons = 43200

[[authorities]]
name = "fcc"
datasets = ["tv_engineering_data", "lp_aux", "tbas", "mvpd"]

[[authorities]]
name = "ofcom"
datasets = ["tv_engineering_data", "pmse"]

[[regions]]
code = "US"
authority = "fcc"
start_channel = 2
end_channel = 51
start_frequency_mhz = 54.0
channel_bandwidth_mhz = 6.0
power_dbm_transition_point = 36.0
max_eirp_dbm = 36.0
ruleset_ids = ["FccTvBandWhiteSpace-2010"]
max_location_change_m = 100.0
max_polling_secs = 86400
adjacent_channel_protection = true

[regions.protection_radius_km]
tv_engineering_data = 100.0
lp_aux = 1.0
tbas = 8.0
mvpd = 8.0

[regions.device_classes.fixed]
prohibited_channels = [3, 4, 37]

[regions.device_classes.portable]
prohibited_channels = [2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 37]
max_eirp_dbm = 20.0
adjacent_eirp_dbm = 16.0

[regions.device_classes.auxiliary]
prohibited_channels = [3, 4, 37]

[[regions]]
code = "GB"
authority = "ofcom"
start_channel = 21
end_channel = 60
start_frequency_mhz = 470.0
channel_bandwidth_mhz = 8.0
power_dbm_transition_point = 30.0
max_eirp_dbm = 36.0
ruleset_ids = ["ETSI-EN-301-598-1.1.1"]
max_location_change_m = 50.0
max_polling_secs = 900

[regions.protection_radius_km]
tv_engineering_data = 60.0
pmse = 2.0

[audit]
sink = "stderr"
"#,
    )
}
