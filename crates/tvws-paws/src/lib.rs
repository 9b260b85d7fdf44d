// crates/tvws-paws/src/lib.rs
// ============================================================================
// Module: TVWS PAWS Library
// Description: PAWS protocol handling and HTTP service for the TVWS database.
// Purpose: Expose the protocol manager, transport, scheduler, and audit sinks.
// Dependencies: tvws-core, tvws-config, axum, tokio
// ============================================================================

//! ## Overview
//! `tvws-paws` serves the PAWS protocol over JSON-RPC 2.0. The
//! [`PawsProtocolManager`] validates untrusted requests and calls the
//! availability engine; [`PawsServer`] wires it to axum and runs the
//! [`RefreshScheduler`] that keeps incumbent snapshots current.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod errors;
pub mod messages;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::PawsAuditEvent;
pub use audit::PawsAuditSink;
pub use audit::PawsOutcome;
pub use audit::StderrAuditSink;
pub use errors::ErrorEnvelope;
pub use errors::PawsError;
pub use errors::PawsErrorKind;
pub use errors::ValidationCode;
pub use messages::PawsMethod;
pub use protocol::PawsProtocolManager;
pub use protocol::ProtocolSettings;
pub use protocol::ProtocolStage;
pub use scheduler::RefreshScheduler;
pub use scheduler::SchedulerHandle;
pub use server::PawsServer;
pub use server::PawsServerError;
pub use server::build_incumbent_store;
