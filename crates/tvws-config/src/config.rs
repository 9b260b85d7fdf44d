// crates/tvws-config/src/config.rs
// ============================================================================
// Module: TVWS Configuration
// Description: Configuration loading and validation for the TVWS database.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: tvws-core, tvws-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed: the service never starts
//! with a channel plan or cache policy it could not validate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tvws_core::Authority;
use tvws_core::CacheSettings;
use tvws_core::DatasetKind;
use tvws_core::RegionCatalog;
use tvws_core::RegionRules;
use tvws_core::StaticIntervals;
use tvws_store_sqlite::SqliteStoreConfig;
use tvws_store_sqlite::SqliteStoreMode;
use tvws_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "tvws.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "TVWS_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default request body limit.
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default supported protocol version.
const DEFAULT_PROTOCOL_VERSION: &str = "1.0";
/// Default batch location limit.
const DEFAULT_MAX_BATCH_LOCATIONS: usize = 64;
/// Maximum batch location limit.
const MAX_BATCH_LOCATIONS: usize = 1024;
/// Default `SQLite` busy timeout.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default fetch timeout.
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;
/// Minimum fetch timeout.
const MIN_FETCH_TIMEOUT_MS: u64 = 100;
/// Maximum fetch timeout.
const MAX_FETCH_TIMEOUT_MS: u64 = 600_000;
/// Default snapshot age horizon.
const DEFAULT_MAX_SNAPSHOT_AGE_SECS: u64 = 86_400;
/// Maximum refresh interval (one week).
const MAX_REFRESH_INTERVAL_SECS: u64 = 604_800;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Parsed and validated `tvws.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TvwsConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Incumbent store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Cache timing.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Authorities and the datasets their caches hold.
    #[serde(default)]
    pub authorities: Vec<AuthorityConfig>,
    /// Region channel plans.
    #[serde(default)]
    pub regions: Vec<RegionRules>,
    /// Operational log sink.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Modified time of the file this config was loaded from (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl TvwsConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.store.validate()?;
        self.cache.validate()?;
        self.audit.validate()?;
        if self.authorities.is_empty() {
            return Err(ConfigError::Invalid("at least one authority is required".to_string()));
        }
        let mut seen = BTreeSet::new();
        for authority in &self.authorities {
            authority.validate()?;
            if !seen.insert(authority.name) {
                return Err(ConfigError::Invalid(format!(
                    "authority {} listed more than once",
                    authority.name
                )));
            }
        }
        if self.regions.is_empty() {
            return Err(ConfigError::Invalid("at least one region is required".to_string()));
        }
        for region in &self.regions {
            if !seen.contains(&region.authority) {
                return Err(ConfigError::Invalid(format!(
                    "region {} uses authority {} which is not listed in [[authorities]]",
                    region.code, region.authority
                )));
            }
        }
        self.catalog().map(|_| ())
    }

    /// Builds the validated region catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a region is invalid or duplicated.
    pub fn catalog(&self) -> Result<RegionCatalog, ConfigError> {
        RegionCatalog::new(self.regions.clone()).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Datasets held per authority.
    #[must_use]
    pub fn dataset_map(&self) -> BTreeMap<Authority, BTreeSet<DatasetKind>> {
        self.authorities
            .iter()
            .map(|authority| (authority.name, authority.datasets.iter().copied().collect()))
            .collect()
    }

    /// Cache timing limits.
    #[must_use]
    pub const fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            fetch_timeout: Duration::from_millis(self.cache.fetch_timeout_ms),
            max_snapshot_age: Duration::from_secs(self.cache.max_snapshot_age_secs),
        }
    }

    /// Refresh interval table from `[cache.refresh]`.
    #[must_use]
    pub fn refresh_intervals(&self) -> StaticIntervals {
        self.cache.refresh.intervals()
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Protocol version the server accepts.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Maximum locations in one batch spectrum request.
    #[serde(default = "default_max_batch_locations")]
    pub max_batch_locations: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            protocol_version: default_protocol_version(),
            max_batch_locations: default_max_batch_locations(),
        }
    }
}

impl ServerConfig {
    /// Parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid server.bind address: {}", self.bind)))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.protocol_version.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "server.protocol_version must be non-empty".to_string(),
            ));
        }
        if !(1 ..= MAX_BATCH_LOCATIONS).contains(&self.max_batch_locations) {
            return Err(ConfigError::Invalid(format!(
                "server.max_batch_locations must be between 1 and {MAX_BATCH_LOCATIONS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Incumbent store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// In-memory store (tests and demos).
    #[default]
    Memory,
    /// `SQLite`-backed store.
    Sqlite,
}

/// Incumbent store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// `SQLite` store settings, or `None` for the memory backend.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match self.store_type {
            StoreType::Memory => None,
            StoreType::Sqlite => self.path.as_ref().map(|path| SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
        }
    }

    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_path_string("store.path", &path.to_string_lossy())
            }
        }
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Cache timing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Fetches slower than this are discarded.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Oldest successful refresh served to readers.
    #[serde(default = "default_max_snapshot_age_secs")]
    pub max_snapshot_age_secs: u64,
    /// Per-dataset refresh intervals.
    #[serde(default)]
    pub refresh: RefreshConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_snapshot_age_secs: default_max_snapshot_age_secs(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Validates cache timing.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_FETCH_TIMEOUT_MS ..= MAX_FETCH_TIMEOUT_MS).contains(&self.fetch_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "cache.fetch_timeout_ms must be between {MIN_FETCH_TIMEOUT_MS} and \
                 {MAX_FETCH_TIMEOUT_MS}"
            )));
        }
        if self.max_snapshot_age_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_snapshot_age_secs must be greater than zero".to_string(),
            ));
        }
        self.refresh.validate()
    }
}

/// Refresh intervals in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// TV engineering data.
    #[serde(default = "default_hourly")]
    pub tv_engineering_data: u64,
    /// Low-power auxiliary registrations.
    #[serde(default = "default_hourly")]
    pub lp_aux: u64,
    /// PMSE assignments.
    #[serde(default = "default_pmse_secs")]
    pub pmse: u64,
    /// TBAS registrations.
    #[serde(default = "default_hourly")]
    pub tbas: u64,
    /// MVPD registrations.
    #[serde(default = "default_hourly")]
    pub mvpd: u64,
    /// Region polygons.
    #[serde(default = "default_polygon_secs")]
    pub region_polygons: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            tv_engineering_data: default_hourly(),
            lp_aux: default_hourly(),
            pmse: default_pmse_secs(),
            tbas: default_hourly(),
            mvpd: default_hourly(),
            region_polygons: default_polygon_secs(),
        }
    }
}

impl RefreshConfig {
    /// Interval for a dataset kind, in seconds.
    #[must_use]
    pub const fn seconds(&self, kind: DatasetKind) -> u64 {
        match kind {
            DatasetKind::TvEngineeringData => self.tv_engineering_data,
            DatasetKind::LpAux => self.lp_aux,
            DatasetKind::Pmse => self.pmse,
            DatasetKind::Tbas => self.tbas,
            DatasetKind::Mvpd => self.mvpd,
        }
    }

    /// Interval table for the cache manager.
    #[must_use]
    pub fn intervals(&self) -> StaticIntervals {
        DatasetKind::ALL
            .into_iter()
            .fold(StaticIntervals::default(), |intervals, kind| {
                intervals.with_dataset(kind, Duration::from_secs(self.seconds(kind)))
            })
            .with_region_polygons(Duration::from_secs(self.region_polygons))
    }

    /// Validates every interval is within range.
    fn validate(&self) -> Result<(), ConfigError> {
        let entries = DatasetKind::ALL
            .into_iter()
            .map(|kind| (kind.as_str(), self.seconds(kind)))
            .chain(std::iter::once(("region_polygons", self.region_polygons)));
        for (name, seconds) in entries {
            if !(1 ..= MAX_REFRESH_INTERVAL_SECS).contains(&seconds) {
                return Err(ConfigError::Invalid(format!(
                    "cache.refresh.{name} must be between 1 and {MAX_REFRESH_INTERVAL_SECS} seconds"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Authorities
// ============================================================================

/// One regulatory authority and its incumbent datasets.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorityConfig {
    /// Authority name.
    pub name: Authority,
    /// Datasets held by the authority's service cache.
    pub datasets: Vec<DatasetKind>,
}

impl AuthorityConfig {
    /// Validates the dataset list.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.datasets.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "authority {} must list at least one dataset",
                self.name
            )));
        }
        let unique: BTreeSet<_> = self.datasets.iter().collect();
        if unique.len() != self.datasets.len() {
            return Err(ConfigError::Invalid(format!(
                "authority {} lists a dataset more than once",
                self.name
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Operational log sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append-only JSON lines file.
    File,
    /// Discard.
    None,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires audit.path".to_string()))
            }
            (AuditSinkKind::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default protocol version.
fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

/// Default batch location limit.
const fn default_max_batch_locations() -> usize {
    DEFAULT_MAX_BATCH_LOCATIONS
}

/// Default store busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Default fetch timeout.
const fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

/// Default snapshot age horizon.
const fn default_max_snapshot_age_secs() -> u64 {
    DEFAULT_MAX_SNAPSHOT_AGE_SECS
}

/// Hourly refresh.
const fn default_hourly() -> u64 {
    3_600
}

/// PMSE refresh.
const fn default_pmse_secs() -> u64 {
    300
}

/// Region polygon refresh.
const fn default_polygon_secs() -> u64 {
    43_200
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
pub(crate) fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
