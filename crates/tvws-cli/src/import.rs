// crates/tvws-cli/src/import.rs
// ============================================================================
// Module: Incumbent Import
// Description: JSON bundle import and the partner-database sync poller.
// Purpose: Seed an incumbent store and flag changed datasets for refresh.
// Dependencies: tvws-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! An [`ImportBundle`] is a JSON document carrying incumbent records, region
//! polygons, and sync-status rows. [`import_bundle`] writes every entity and
//! guarantees each touched dataset has a sync-status row. In
//! [`ImportMode::Sync`] every written status is flagged `needs_update` so
//! running caches re-fetch on their next timer fire, whatever the recorded
//! modified times say.
//!
//! [`SyncPoller`] watches one partner export file by modified time and
//! re-imports it in sync mode when it changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tvws_core::IncumbentRecord;
use tvws_core::IncumbentStore;
use tvws_core::IncumbentStoreExt;
use tvws_core::RegionPolygonRecord;
use tvws_core::StoreError;
use tvws_core::SyncStatus;
use tvws_core::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Largest bundle file accepted.
pub const MAX_BUNDLE_BYTES: usize = 256 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Import failures.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The bundle file could not be read.
    #[error("bundle io error: {0}")]
    Io(String),
    /// The bundle is larger than allowed.
    #[error("bundle is {size} bytes, limit {limit}")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
    /// The bundle is not valid JSON of the expected shape.
    #[error("bundle parse error: {0}")]
    Parse(String),
    /// A record has a partition key the importer cannot map to a dataset.
    #[error("invalid record: {0}")]
    Invalid(String),
    /// The store rejected a write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Bundle
// ============================================================================

/// Entities to import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportBundle {
    /// Incumbent records.
    #[serde(default)]
    pub incumbents: Vec<IncumbentRecord>,
    /// Region boundary polygons.
    #[serde(default)]
    pub region_polygons: Vec<RegionPolygonRecord>,
    /// Explicit sync-status rows.
    #[serde(default)]
    pub sync_status: Vec<SyncStatus>,
}

impl ImportBundle {
    /// Reads a bundle from disk, enforcing [`MAX_BUNDLE_BYTES`].
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] when the file is unreadable, too large, or
    /// malformed.
    pub fn read(path: &Path) -> Result<Self, ImportError> {
        let bytes = read_bytes_with_limit(path, MAX_BUNDLE_BYTES)?;
        serde_json::from_slice(&bytes).map_err(|err| ImportError::Parse(err.to_string()))
    }
}

/// How sync-status rows are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Initial seeding: explicit rows are written as given.
    Seed,
    /// Partner sync: every written row forces a re-fetch.
    Sync,
}

/// Counts of written entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Incumbent records written.
    pub incumbents: usize,
    /// Region polygons written.
    pub region_polygons: usize,
    /// Sync-status rows written, explicit and derived.
    pub sync_status: usize,
}

/// Writes a bundle into `store`.
///
/// Datasets touched by the bundle without an explicit sync-status row get one
/// stamped `now`.
///
/// # Errors
///
/// Returns [`ImportError`] when a record cannot be mapped to a dataset or a
/// store write fails. Entities written before the failure stay written.
pub fn import_bundle<S: IncumbentStore + ?Sized>(
    store: &S,
    bundle: &ImportBundle,
    mode: ImportMode,
    now: Timestamp,
) -> Result<ImportReport, ImportError> {
    let mut statuses: BTreeMap<(String, String), SyncStatus> = bundle
        .sync_status
        .iter()
        .map(|status| ((status.scope.clone(), status.dataset.clone()), status.clone()))
        .collect();
    let mut touched = Vec::new();
    for record in &bundle.incumbents {
        let (scope, dataset) = record.partition_key.split_once('/').ok_or_else(|| {
            ImportError::Invalid(format!(
                "incumbent {} has partition {} without an authority/dataset pair",
                record.row_key, record.partition_key
            ))
        })?;
        if dataset != record.kind.dataset().as_str() {
            return Err(ImportError::Invalid(format!(
                "incumbent {} is a {} record in partition {}",
                record.row_key,
                record.kind.label(),
                record.partition_key
            )));
        }
        touched.push((scope.to_string(), dataset.to_string()));
    }
    if !bundle.region_polygons.is_empty() {
        touched.push((SyncStatus::REGION_SCOPE.to_string(), SyncStatus::REGION_DATASET.to_string()));
    }
    for (scope, dataset) in touched {
        statuses.entry((scope.clone(), dataset.clone())).or_insert(SyncStatus {
            scope,
            dataset,
            last_modified: now,
            needs_update: false,
        });
    }

    for record in &bundle.incumbents {
        store.insert_or_replace(record)?;
    }
    for polygon in &bundle.region_polygons {
        store.insert_or_replace(polygon)?;
    }
    let mut written = 0;
    for mut status in statuses.into_values() {
        if mode == ImportMode::Sync {
            status.needs_update = true;
        }
        store.insert_or_replace(&status)?;
        written += 1;
    }
    Ok(ImportReport {
        incumbents: bundle.incumbents.len(),
        region_polygons: bundle.region_polygons.len(),
        sync_status: written,
    })
}

// ============================================================================
// SECTION: Sync Poller
// ============================================================================

/// Re-imports a partner export whenever its modified time changes.
#[derive(Debug, Clone)]
pub struct SyncPoller {
    /// Partner export file.
    path: PathBuf,
    /// Modified time of the last imported version.
    last_seen: Option<SystemTime>,
}

impl SyncPoller {
    /// Creates a poller that imports the file on its first poll.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), last_seen: None }
    }

    /// Watched file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Imports the file when it changed since the last successful import.
    ///
    /// Returns `None` when the file is unchanged. A failed import is retried
    /// on the next poll.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError`] when the file cannot be read or imported.
    pub fn poll_once<S: IncumbentStore + ?Sized>(
        &mut self,
        store: &S,
        now: Timestamp,
    ) -> Result<Option<ImportReport>, ImportError> {
        let modified = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|err| ImportError::Io(format!("{}: {err}", self.path.display())))?;
        if self.last_seen == Some(modified) {
            return Ok(None);
        }
        let bundle = ImportBundle::read(&self.path)?;
        let report = import_bundle(store, &bundle, ImportMode::Sync, now)?;
        self.last_seen = Some(modified);
        Ok(Some(report))
    }
}

// ============================================================================
// SECTION: Bounded Reads
// ============================================================================

/// Reads a file while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ImportError> {
    let io_error = |err: std::io::Error| ImportError::Io(format!("{}: {err}", path.display()));
    let file = File::open(path).map_err(io_error)?;
    let size = file.metadata().map_err(io_error)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ImportError::TooLarge { size, limit: max_bytes });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(io_error)?;
    if bytes.len() > max_bytes {
        let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        return Err(ImportError::TooLarge { size, limit: max_bytes });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
