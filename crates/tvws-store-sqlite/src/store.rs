// crates/tvws-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Incumbent Store
// Description: Durable IncumbentStore backed by SQLite.
// Purpose: Persist keyed entity rows with fail-closed decoding.
// Dependencies: tvws-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`IncumbentStore`] using `SQLite`. Rows
//! are keyed by `(table_name, partition_key, row_key)` and hold the entity as
//! JSON text. Reads that find undecodable or oversized payloads fail with
//! [`StoreError::Corrupt`] so the cache keeps its last good snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tvws_core::IncumbentStore;
use tvws_core::StoreError;
use tvws_core::StoredRow;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a table, partition, or row key.
const MAX_KEY_LENGTH: usize = 512;
/// Maximum entity payload size accepted by the store.
pub const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` incumbent store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Config for `path` with default pragmas.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored payload failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid keys or payloads.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => {
                Self::Unavailable(message)
            }
            SqliteStoreError::Corrupt(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Corrupt(message)
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge { max_bytes, actual_bytes } => Self::Invalid(format!(
                "payload exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed incumbent store.
#[derive(Clone)]
pub struct SqliteIncumbentStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteIncumbentStore {
    /// Opens an `SQLite`-backed incumbent store, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Number of rows in a table.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn row_count(&self, table: &str) -> Result<u64, SqliteStoreError> {
        let guard = self.lock()?;
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE table_name = ?1",
                params![table],
                |row| row.get(0),
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        u64::try_from(count).map_err(|_| SqliteStoreError::Corrupt("negative row count".to_string()))
    }

    /// Atomically replaces every row of a partition.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when any row is invalid or the write
    /// fails; on error the partition is left unchanged.
    pub fn replace_partition(
        &self,
        table: &str,
        partition_key: &str,
        rows: &[StoredRow],
    ) -> Result<(), SqliteStoreError> {
        validate_key("table", table)?;
        validate_key("partition_key", partition_key)?;
        let encoded = rows
            .iter()
            .map(|row| {
                if row.partition_key != partition_key {
                    return Err(SqliteStoreError::Invalid(format!(
                        "row {} belongs to partition {}",
                        row.row_key, row.partition_key
                    )));
                }
                validate_key("row_key", &row.row_key)?;
                Ok((row.row_key.as_str(), encode_payload(&row.payload)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let updated_at = unix_millis();
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute(
            "DELETE FROM entities WHERE table_name = ?1 AND partition_key = ?2",
            params![table, partition_key],
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        for (row_key, payload) in &encoded {
            tx.execute(
                "INSERT INTO entities (table_name, partition_key, row_key, payload, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![table, partition_key, row_key, payload, updated_at],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        Ok(())
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Loads one row.
    fn load_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredRow>, SqliteStoreError> {
        let guard = self.lock()?;
        let payload: Option<String> = guard
            .query_row(
                "SELECT payload FROM entities WHERE table_name = ?1 AND partition_key = ?2 AND \
                 row_key = ?3",
                params![table, partition_key, row_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        payload
            .map(|payload| {
                Ok(StoredRow {
                    partition_key: partition_key.to_string(),
                    row_key: row_key.to_string(),
                    payload: decode_payload(table, row_key, &payload)?,
                })
            })
            .transpose()
    }

    /// Loads every row of a partition in row-key order.
    fn load_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<StoredRow>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT row_key, payload FROM entities WHERE table_name = ?1 AND partition_key = \
                 ?2 ORDER BY row_key",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let raw = statement
            .query_map(params![table, partition_key], |row| {
                let row_key: String = row.get(0)?;
                let payload: String = row.get(1)?;
                Ok((row_key, payload))
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(statement);
        drop(guard);
        raw.into_iter()
            .map(|(row_key, payload)| {
                let payload = decode_payload(table, &row_key, &payload)?;
                Ok(StoredRow { partition_key: partition_key.to_string(), row_key, payload })
            })
            .collect()
    }

    /// Inserts or replaces one row.
    fn save_row(&self, table: &str, row: &StoredRow) -> Result<(), SqliteStoreError> {
        validate_key("table", table)?;
        validate_key("partition_key", &row.partition_key)?;
        validate_key("row_key", &row.row_key)?;
        let payload = encode_payload(&row.payload)?;
        let updated_at = unix_millis();
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO entities (table_name, partition_key, row_key, payload, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(table_name, partition_key, row_key) DO \
                 UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
                params![table, row.partition_key, row.row_key, payload, updated_at],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        Ok(())
    }
}

impl IncumbentStore for SqliteIncumbentStore {
    fn fetch_row(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<StoredRow>, StoreError> {
        self.load_row(table, partition_key, row_key).map_err(StoreError::from)
    }

    fn fetch_partition(&self, table: &str, partition_key: &str) -> Result<Vec<StoredRow>, StoreError> {
        self.load_partition(table, partition_key).map_err(StoreError::from)
    }

    fn upsert_row(&self, table: &str, row: StoredRow) -> Result<(), StoreError> {
        self.save_row(table, &row).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .query_row("SELECT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a payload, enforcing the size limit.
fn encode_payload(payload: &Value) -> Result<String, SqliteStoreError> {
    let text =
        serde_json::to_string(payload).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if text.len() > MAX_PAYLOAD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_PAYLOAD_BYTES,
            actual_bytes: text.len(),
        });
    }
    Ok(text)
}

/// Parses a stored payload, failing closed on oversized or malformed text.
fn decode_payload(table: &str, row_key: &str, payload: &str) -> Result<Value, SqliteStoreError> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(SqliteStoreError::Corrupt(format!(
            "{table}/{row_key} payload exceeds {MAX_PAYLOAD_BYTES} bytes"
        )));
    }
    serde_json::from_str(payload)
        .map_err(|err| SqliteStoreError::Corrupt(format!("{table}/{row_key}: {err}")))
}

/// Rejects empty or overlong keys.
fn validate_key(field: &str, value: &str) -> Result<(), SqliteStoreError> {
    if value.is_empty() {
        return Err(SqliteStoreError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_KEY_LENGTH {
        return Err(SqliteStoreError::Invalid(format!("{field} exceeds {MAX_KEY_LENGTH} bytes")));
    }
    Ok(())
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS entities (
                    table_name TEXT NOT NULL,
                    partition_key TEXT NOT NULL,
                    row_key TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (table_name, partition_key, row_key)
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
