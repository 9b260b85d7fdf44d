// crates/tvws-config/src/intervals.rs
// ============================================================================
// Module: Reloading Refresh Intervals
// Description: Refresh interval table backed by the live config file.
// Purpose: Let a running scheduler pick up edited intervals without restart.
// Dependencies: tvws-core
// ============================================================================

//! ## Overview
//! [`ReloadingIntervals`] answers interval lookups from the last valid
//! `[cache.refresh]` table. On each lookup it compares the config file's
//! modified time with the one it last loaded; a change triggers a re-read.
//! A file that no longer validates leaves the previous intervals in force.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::SystemTime;

use tvws_core::CacheKey;
use tvws_core::RefreshIntervals;
use tvws_core::StaticIntervals;

use crate::config::ConfigError;
use crate::config::TvwsConfig;

// ============================================================================
// SECTION: Reloading Intervals
// ============================================================================

/// Mutable reload state.
#[derive(Debug)]
struct ReloadState {
    /// Modified time of the file the current intervals came from.
    modified: Option<SystemTime>,
    /// Intervals currently in force.
    intervals: StaticIntervals,
    /// Error from the most recent failed reload.
    last_error: Option<String>,
}

/// Refresh intervals re-read from `tvws.toml` when the file changes.
#[derive(Debug)]
pub struct ReloadingIntervals {
    /// Config file path.
    path: PathBuf,
    /// Reload state.
    state: Mutex<ReloadState>,
}

impl ReloadingIntervals {
    /// Creates a reloading table seeded from an already-loaded config.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: &TvwsConfig) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(ReloadState {
                modified: config.source_modified_at,
                intervals: config.refresh_intervals(),
                last_error: None,
            }),
        }
    }

    /// Loads the config at `path` and seeds the table from it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the initial load fails.
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let config = TvwsConfig::load(Some(path))?;
        Ok(Self::new(path, &config))
    }

    /// Error message from the most recent failed reload, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).last_error.clone()
    }

    /// Re-reads the config when its modified time differs from the loaded one.
    fn refresh(&self, state: &mut ReloadState) {
        let Ok(modified) = fs::metadata(&self.path).and_then(|meta| meta.modified()) else {
            return;
        };
        if state.modified == Some(modified) {
            return;
        }
        match TvwsConfig::load(Some(&self.path)) {
            Ok(config) => {
                state.intervals = config.refresh_intervals();
                state.modified = config.source_modified_at.or(Some(modified));
                state.last_error = None;
            }
            Err(err) => state.last_error = Some(err.to_string()),
        }
    }
}

impl RefreshIntervals for ReloadingIntervals {
    fn interval(&self, key: &CacheKey) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refresh(&mut state);
        state.intervals.interval(key)
    }
}
