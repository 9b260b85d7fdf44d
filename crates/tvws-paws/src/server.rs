// crates/tvws-paws/src/server.rs
// ============================================================================
// Module: PAWS Server
// Description: HTTP JSON-RPC transport for the PAWS protocol manager.
// Purpose: Wire config, store, cache, engine, and scheduler into one service.
// Dependencies: tvws-config, tvws-core, tvws-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! [`PawsServer`] builds the incumbent store, cache, engine, and protocol
//! manager from a validated [`TvwsConfig`]. [`PawsServer::serve`] loads every
//! dataset before binding, starts the refresh scheduler, and then serves
//! JSON-RPC 2.0 over `POST /paws`. Request bodies are untrusted: size and
//! envelope checks run before any method dispatch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tvws_config::AuditConfig;
use tvws_config::AuditSinkKind;
use tvws_config::ReloadingIntervals;
use tvws_config::StoreConfig;
use tvws_config::StoreType;
use tvws_config::TvwsConfig;
use tvws_core::AvailabilityEngine;
use tvws_core::CacheEvent;
use tvws_core::CacheEventKind;
use tvws_core::CacheEventSink;
use tvws_core::CacheManager;
use tvws_core::CacheState;
use tvws_core::DownloadReport;
use tvws_core::InMemoryIncumbentStore;
use tvws_core::IncumbentStore;
use tvws_core::NoopCacheEventSink;
use tvws_core::RefreshIntervals;
use tvws_core::SharedIncumbentStore;
use tvws_core::Timestamp;
use tvws_store_sqlite::SqliteIncumbentStore;

use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::PawsAuditSink;
use crate::audit::StderrAuditSink;
use crate::errors::ErrorEnvelope;
use crate::errors::PawsError;
use crate::protocol::PawsProtocolManager;
use crate::protocol::ProtocolSettings;
use crate::scheduler::RefreshScheduler;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server startup and transport errors.
#[derive(Debug, Error)]
pub enum PawsServerError {
    /// Configuration is unusable.
    #[error("config error: {0}")]
    Config(String),
    /// A component failed to initialize.
    #[error("init error: {0}")]
    Init(String),
    /// The HTTP transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: PAWS Server
// ============================================================================

/// PAWS server instance.
pub struct PawsServer {
    /// Server configuration.
    config: TvwsConfig,
    /// Protocol manager for request dispatch.
    manager: PawsProtocolManager,
    /// Shared incumbent cache.
    cache: Arc<CacheManager>,
    /// Operational event sink shared with the scheduler.
    events: Arc<dyn CacheEventSink>,
}

impl PawsServer {
    /// Builds a server from configuration. When `config_path` is given,
    /// refresh intervals are re-read from that file as it changes.
    ///
    /// # Errors
    ///
    /// Returns [`PawsServerError`] when initialization fails.
    pub fn from_config(
        config: TvwsConfig,
        config_path: Option<PathBuf>,
    ) -> Result<Self, PawsServerError> {
        config.validate().map_err(|err| PawsServerError::Config(err.to_string()))?;
        let catalog = Arc::new(config.catalog().map_err(|err| PawsServerError::Config(err.to_string()))?);
        let store = build_incumbent_store(&config.store)?;
        let (audit, events) = build_audit_sinks(&config.audit)?;
        let intervals: Arc<dyn RefreshIntervals> = match config_path {
            Some(path) => Arc::new(ReloadingIntervals::new(path, &config)),
            None => Arc::new(config.refresh_intervals()),
        };
        let cache = Arc::new(
            CacheManager::new(store, &catalog, &config.dataset_map(), config.cache_settings())
                .with_events(Arc::clone(&events))
                .with_intervals(intervals),
        );
        let engine = Arc::new(AvailabilityEngine::new(catalog, Arc::clone(&cache)));
        let manager =
            PawsProtocolManager::new(engine, audit, ProtocolSettings::from_config(&config.server));
        Ok(Self { config, manager, cache, events })
    }

    /// Protocol manager.
    #[must_use]
    pub const fn manager(&self) -> &PawsProtocolManager {
        &self.manager
    }

    /// Shared incumbent cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// HTTP routes for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::new(ServerState {
            manager: self.manager.clone(),
            max_body_bytes: self.config.server.max_body_bytes,
        }))
    }

    /// Loads every dataset, starts the refresh scheduler, and serves HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`PawsServerError`] when the load task or the transport fails.
    pub async fn serve(self) -> Result<(), PawsServerError> {
        let addr = self
            .config
            .server
            .bind_addr()
            .map_err(|err| PawsServerError::Config(err.to_string()))?;
        self.download_all().await?;
        let scheduler = RefreshScheduler::new(
            Arc::clone(&self.cache),
            self.config.cache_settings().fetch_timeout,
        )
        .with_events(Arc::clone(&self.events))
        .spawn();
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| PawsServerError::Transport(format!("http bind failed: {err}")))?;
        let served = axum::serve(listener, app)
            .await
            .map_err(|err| PawsServerError::Transport(format!("http server failed: {err}")));
        scheduler.shutdown().await;
        served
    }

    /// Runs the startup load on the blocking pool. Failed datasets stay empty
    /// and each one is reported as a degraded event.
    ///
    /// # Errors
    ///
    /// Returns [`PawsServerError::Init`] when the load task cannot complete.
    pub async fn download_all(&self) -> Result<DownloadReport, PawsServerError> {
        let cache = Arc::clone(&self.cache);
        let report = tokio::task::spawn_blocking(move || cache.download_all())
            .await
            .map_err(|err| PawsServerError::Init(format!("startup load failed: {err}")))?;
        report_failed_loads(self.events.as_ref(), self.cache.now(), &report);
        Ok(report)
    }
}

/// Emits one degraded event per dataset the startup load left empty.
fn report_failed_loads(events: &dyn CacheEventSink, at: Timestamp, report: &DownloadReport) {
    for (key, reason) in &report.failed {
        let event = CacheEvent::new(CacheEventKind::Degraded, at, key.authority(), key.dataset_label())
            .with_message(format!("serving without {key} after startup load failed: {reason}"));
        events.record(&event);
    }
}

/// Builds the incumbent store from config.
///
/// # Errors
///
/// Returns [`PawsServerError`] when the sqlite store cannot be opened.
pub fn build_incumbent_store(config: &StoreConfig) -> Result<SharedIncumbentStore, PawsServerError> {
    match config.store_type {
        StoreType::Memory => Ok(SharedIncumbentStore::from_store(InMemoryIncumbentStore::new())),
        StoreType::Sqlite => {
            let sqlite_config = config.sqlite_config().ok_or_else(|| {
                PawsServerError::Config("sqlite store requires path".to_string())
            })?;
            let store = SqliteIncumbentStore::new(&sqlite_config)
                .map_err(|err| PawsServerError::Init(err.to_string()))?;
            Ok(SharedIncumbentStore::from_store(store))
        }
    }
}

/// Audit and cache event sinks sharing one destination.
type AuditSinks = (Arc<dyn PawsAuditSink>, Arc<dyn CacheEventSink>);

/// Builds the audit sinks from config.
fn build_audit_sinks(config: &AuditConfig) -> Result<AuditSinks, PawsServerError> {
    match (config.sink, &config.path) {
        (AuditSinkKind::Stderr, _) => {
            let audit: Arc<dyn PawsAuditSink> = Arc::new(StderrAuditSink);
            let events: Arc<dyn CacheEventSink> = Arc::new(StderrAuditSink);
            Ok((audit, events))
        }
        (AuditSinkKind::File, Some(path)) => {
            let sink = Arc::new(
                FileAuditSink::new(path)
                    .map_err(|err| PawsServerError::Init(format!("audit log open failed: {err}")))?,
            );
            let audit: Arc<dyn PawsAuditSink> = Arc::clone(&sink) as Arc<dyn PawsAuditSink>;
            let events: Arc<dyn CacheEventSink> = sink;
            Ok((audit, events))
        }
        (AuditSinkKind::File, None) => {
            Err(PawsServerError::Config("file audit sink requires audit.path".to_string()))
        }
        (AuditSinkKind::None, _) => {
            let audit: Arc<dyn PawsAuditSink> = Arc::new(NoopAuditSink);
            let events: Arc<dyn CacheEventSink> = Arc::new(NoopCacheEventSink);
            Ok((audit, events))
        }
    }
}

// ============================================================================
// SECTION: HTTP Transport
// ============================================================================

/// Shared server state for HTTP handlers.
#[derive(Clone)]
struct ServerState {
    /// Protocol manager for request dispatch.
    manager: PawsProtocolManager,
    /// Maximum allowed request body size.
    max_body_bytes: usize,
}

/// Builds the axum router over shared state.
fn build_router(state: Arc<ServerState>) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/paws", post(handle_http))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Handles HTTP JSON-RPC requests.
async fn handle_http(State(state): State<Arc<ServerState>>, bytes: Bytes) -> impl IntoResponse {
    let response = parse_request(&state, &bytes);
    (response.0, Json(response.1))
}

/// Liveness probe.
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Readiness probe: the store answers and every dataset has loaded once.
async fn handle_ready(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let cache = state.manager.engine().cache();
    if let Err(err) = cache.store().readiness() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": err.to_string() })),
        );
    }
    let empty: Vec<String> = cache
        .status()
        .into_iter()
        .filter(|status| status.state == CacheState::Empty)
        .map(|status| status.key.to_string())
        .collect();
    if empty.is_empty() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "empty_datasets": empty })),
        )
    }
}

// ============================================================================
// SECTION: JSON-RPC Handling
// ============================================================================

/// Incoming JSON-RPC request payload.
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    /// JSON-RPC protocol version.
    jsonrpc: String,
    /// Request identifier.
    #[serde(default)]
    id: Value,
    /// Method name.
    method: String,
    /// Optional parameters payload.
    #[serde(default)]
    params: Option<Value>,
}

/// JSON-RPC response envelope.
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    /// JSON-RPC protocol version.
    jsonrpc: &'static str,
    /// Request identifier.
    id: Value,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    /// Error payload when the request fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorEnvelope>,
}

impl JsonRpcResponse {
    /// Error response for `id`.
    fn error(id: Value, error: &PawsError) -> Self {
        Self { jsonrpc: "2.0", id, result: None, error: Some(error.envelope()) }
    }
}

/// Parses and validates a JSON-RPC request payload.
fn parse_request(state: &ServerState, bytes: &Bytes) -> (StatusCode, JsonRpcResponse) {
    if bytes.len() > state.max_body_bytes {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            JsonRpcResponse::error(Value::Null, &PawsError::invalid_request("request body too large")),
        );
    }
    let request: Result<JsonRpcRequest, _> = serde_json::from_slice(bytes.as_ref());
    request.map_or_else(
        |_| {
            (
                StatusCode::BAD_REQUEST,
                JsonRpcResponse::error(
                    Value::Null,
                    &PawsError::invalid_request("invalid json-rpc request"),
                ),
            )
        },
        |request| handle_request(&state.manager, request),
    )
}

/// Dispatches a JSON-RPC request to the protocol manager.
fn handle_request(
    manager: &PawsProtocolManager,
    request: JsonRpcRequest,
) -> (StatusCode, JsonRpcResponse) {
    if request.jsonrpc != "2.0" {
        return (
            StatusCode::BAD_REQUEST,
            JsonRpcResponse::error(request.id, &PawsError::invalid_request("jsonrpc must be 2.0")),
        );
    }
    let request_id = (!request.id.is_null()).then(|| request.id.to_string());
    let result = call_with_blocking(manager, &request.method, request.params, request_id);
    let response = match result {
        Ok(value) => JsonRpcResponse { jsonrpc: "2.0", id: request.id, result: Some(value), error: None },
        Err(error) => JsonRpcResponse::error(request.id, &error),
    };
    (StatusCode::OK, response)
}

/// Executes a call, shifting to a blocking context when available.
fn call_with_blocking(
    manager: &PawsProtocolManager,
    method: &str,
    params: Option<Value>,
    request_id: Option<String>,
) -> Result<Value, PawsError> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| manager.handle(method, params, request_id))
        }
        _ => manager.handle(method, params, request_id),
    }
}
