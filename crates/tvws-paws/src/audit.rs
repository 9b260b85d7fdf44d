// crates/tvws-paws/src/audit.rs
// ============================================================================
// Module: PAWS Audit Logging
// Description: Structured audit events for PAWS request handling.
// Purpose: Emit one JSON line per protocol call and per cache event.
// Dependencies: tvws-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Every protocol call produces one [`PawsAuditEvent`] recording the method,
//! the last stage the request reached, and the outcome. Internal diagnostics
//! travel here even when the client sees a generic message. The stderr and
//! file sinks also accept core [`CacheEvent`]s so one stream carries all
//! operational logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tvws_core::CacheEvent;
use tvws_core::CacheEventSink;

use crate::errors::PawsError;
use crate::messages::PawsMethod;
use crate::protocol::ProtocolStage;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PawsOutcome {
    /// A result was returned.
    Ok,
    /// An error envelope was returned.
    Error,
}

/// PAWS audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PawsAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// JSON-RPC request identifier when provided.
    pub request_id: Option<String>,
    /// Method classification.
    pub method: PawsMethod,
    /// Last protocol stage reached.
    pub stage: ProtocolStage,
    /// Request outcome.
    pub outcome: PawsOutcome,
    /// Wire error code when present.
    pub error_code: Option<&'static str>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Handling latency in milliseconds.
    pub latency_ms: u128,
    /// Internal diagnostic text.
    pub diagnostic: Option<String>,
}

impl PawsAuditEvent {
    /// Creates an audit event stamped with the current time.
    #[must_use]
    pub fn new(
        request_id: Option<String>,
        method: PawsMethod,
        stage: ProtocolStage,
        error: Option<&PawsError>,
        latency_ms: u128,
    ) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "paws_request",
            timestamp_ms,
            request_id,
            method,
            stage,
            outcome: if error.is_some() { PawsOutcome::Error } else { PawsOutcome::Ok },
            error_code: error.map(|error| error.kind.code()),
            error_kind: error.map(|error| error.kind.label()),
            latency_ms,
            diagnostic: error.and_then(|error| error.diagnostic.clone()),
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for PAWS request events.
pub trait PawsAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &PawsAuditEvent);
}

/// Writes one serialized line, ignoring serialization and write failures.
fn write_line(writer: &mut impl Write, payload: &impl Serialize) {
    if let Ok(line) = serde_json::to_string(payload) {
        let _ = writeln!(writer, "{line}");
        let _ = writer.flush();
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrAuditSink;

impl PawsAuditSink for StderrAuditSink {
    fn record(&self, event: &PawsAuditEvent) {
        write_line(&mut io::stderr(), event);
    }
}

impl CacheEventSink for StderrAuditSink {
    fn record(&self, event: &CacheEvent) {
        write_line(&mut io::stderr(), event);
    }
}

/// Audit sink that logs JSON lines to a file.
#[derive(Debug)]
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Appends one line under the file lock.
    fn append(&self, payload: &impl Serialize) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        write_line(&mut *file, payload);
    }
}

impl PawsAuditSink for FileAuditSink {
    fn record(&self, event: &PawsAuditEvent) {
        self.append(event);
    }
}

impl CacheEventSink for FileAuditSink {
    fn record(&self, event: &CacheEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl PawsAuditSink for NoopAuditSink {
    fn record(&self, _event: &PawsAuditEvent) {}
}
