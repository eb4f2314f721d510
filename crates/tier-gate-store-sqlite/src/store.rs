// crates/tier-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store Foundation
// Description: Configuration, errors, connection setup, and schema.
// Purpose: Share one durable schema between the policy and counter stores.
// Dependencies: tier-gate-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! Opens `SQLite` connections with durable pragmas and creates the versioned
//! schema used by [`crate::SqlitePolicyStore`] and
//! [`crate::SqliteUsageCounterStore`]. Database contents are untrusted: rows
//! are decoded strictly and invalid data fails closed.
//!
//! A missing sub-feature is stored as the empty string so that grant and
//! counter keys remain usable as primary keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;
use tier_gate_core::CounterStoreError;
use tier_gate_core::PolicyStoreError;
use tier_gate_core::PolicyViolation;
use tier_gate_core::SubFeatureId;

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
/// Stored value for "no sub-feature" in key columns.
pub(crate) const NO_SUB_FEATURE: &str = "";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
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

/// Configuration for the `SQLite` stores.
#[derive(Debug, Clone, Deserialize)]
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
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
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
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Mutation rejected by policy validation.
    #[error("sqlite store rejected mutation: {0}")]
    Rejected(PolicyViolation),
}

impl From<SqliteStoreError> for PolicyStoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Storage(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
            SqliteStoreError::Rejected(violation) => Self::from(violation),
        }
    }
}

impl From<SqliteStoreError> for CounterStoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Invalid(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Invalid(message)
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

/// Maps a `rusqlite` error into a store error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err callback.")]
pub(crate) fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Validates the path, opens a connection, and initializes the schema.
pub(crate) fn open_store(
    config: &SqliteStoreConfig,
) -> Result<Arc<Mutex<Connection>>, SqliteStoreError> {
    validate_store_path(&config.path)?;
    ensure_parent_dir(&config.path)?;
    let mut connection = open_connection(config)?;
    initialize_schema(&mut connection)?;
    Ok(Arc::new(Mutex::new(connection)))
}

/// Encodes an optional sub-feature for a key column.
pub(crate) fn encode_sub_feature(sub_feature_id: Option<&SubFeatureId>) -> &str {
    sub_feature_id.map_or(NO_SUB_FEATURE, SubFeatureId::as_str)
}

/// Decodes a sub-feature key column.
pub(crate) fn decode_sub_feature(value: String) -> Option<SubFeatureId> {
    if value == NO_SUB_FEATURE { None } else { Some(SubFeatureId::new(value)) }
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
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
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
        .map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS tiers (
                    tier_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    priority_level INTEGER NOT NULL,
                    is_active INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS features (
                    feature_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    category TEXT NOT NULL,
                    is_active INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS sub_features (
                    sub_feature_id TEXT PRIMARY KEY,
                    feature_id TEXT NOT NULL REFERENCES features(feature_id),
                    name TEXT NOT NULL,
                    is_active INTEGER NOT NULL,
                    UNIQUE (feature_id, name)
                );
                CREATE TABLE IF NOT EXISTS actions (
                    action_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    is_active INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS permission_grants (
                    tier_id TEXT NOT NULL REFERENCES tiers(tier_id),
                    feature_id TEXT NOT NULL REFERENCES features(feature_id),
                    sub_feature_id TEXT NOT NULL DEFAULT '',
                    action_id TEXT NOT NULL REFERENCES actions(action_id),
                    is_granted INTEGER NOT NULL,
                    max_uses INTEGER,
                    timeframe TEXT,
                    PRIMARY KEY (tier_id, feature_id, sub_feature_id, action_id)
                );
                CREATE TABLE IF NOT EXISTS usage_counters (
                    subject_id TEXT NOT NULL,
                    tier_id TEXT NOT NULL,
                    feature_id TEXT NOT NULL,
                    sub_feature_id TEXT NOT NULL DEFAULT '',
                    action_id TEXT NOT NULL,
                    window_start INTEGER NOT NULL,
                    count INTEGER NOT NULL CHECK (count >= 0),
                    PRIMARY KEY (
                        subject_id, tier_id, feature_id, sub_feature_id, action_id, window_start
                    )
                );
                CREATE INDEX IF NOT EXISTS idx_usage_counters_window
                    ON usage_counters (window_start);",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
