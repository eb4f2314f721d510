// crates/tier-gate-config/src/config.rs
// ============================================================================
// Module: Tier Gate Configuration
// Description: Configuration loading and validation for Tier Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: tier-gate-core, tier-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Unknown keys are rejected and every section is validated before use.
//! Missing sections fall back to defaults: in-memory stores, a 5 second cache
//! TTL, bypass priority level 100, and 30 day billing cycles anchored at the
//! Unix epoch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tier_gate_core::DEFAULT_BYPASS_PRIORITY_LEVEL;
use tier_gate_core::PolicyRules;
use tier_gate_core::WindowConfig;
use tier_gate_core::core::window::DEFAULT_BILLING_CYCLE_DAYS;
use tier_gate_core::runtime::DEFAULT_CACHE_TTL_MS;
use tier_gate_store_sqlite::SqliteStoreConfig;
use tier_gate_store_sqlite::SqliteStoreMode;
use tier_gate_store_sqlite::SqliteSyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "tier-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "TIER_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Minimum cache TTL in milliseconds.
const MIN_CACHE_TTL_MS: u64 = 10;
/// Maximum cache TTL in milliseconds.
const MAX_CACHE_TTL_MS: u64 = 3_600_000;
/// Maximum billing cycle length in days.
const MAX_BILLING_CYCLE_DAYS: u32 = 366;
/// Default busy timeout for `SQLite` stores in milliseconds.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum busy timeout for `SQLite` stores in milliseconds.
const MAX_STORE_BUSY_TIMEOUT_MS: u64 = 60_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Tier Gate configuration loaded from `tier-gate.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierGateConfig {
    /// Matrix cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Permission resolver configuration.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Usage window configuration.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Policy store configuration.
    #[serde(default)]
    pub policy_store: StoreConfig,
    /// Usage counter store configuration.
    #[serde(default)]
    pub counter_store: StoreConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl TierGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Parses and validates configuration from raw file bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the payload is oversized, not utf-8, not
    /// valid TOML, or fails validation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
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
        self.cache.validate()?;
        self.resolver.validate()?;
        self.quota.validate()?;
        self.policy_store.validate("policy_store")?;
        self.counter_store.validate("counter_store")?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns write-time policy rules.
    #[must_use]
    pub const fn policy_rules(&self) -> PolicyRules {
        PolicyRules {
            bypass_priority_level: self.resolver.bypass_priority_level,
        }
    }

    /// Returns usage window alignment settings.
    #[must_use]
    pub const fn window_config(&self) -> WindowConfig {
        WindowConfig {
            billing_cycle_days: self.quota.billing_cycle_days,
            billing_anchor_unix: self.quota.billing_anchor_unix,
        }
    }
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Matrix cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Snapshot TTL in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
        }
    }
}

impl CacheConfig {
    /// Returns the TTL as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Validates cache configuration.
    fn validate(self) -> Result<(), ConfigError> {
        validate_range("cache.ttl_ms", self.ttl_ms, MIN_CACHE_TTL_MS, MAX_CACHE_TTL_MS)
    }
}

/// Permission resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Priority level reserved for the bypass tier.
    #[serde(default = "default_bypass_priority_level")]
    pub bypass_priority_level: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bypass_priority_level: default_bypass_priority_level(),
        }
    }
}

impl ResolverConfig {
    /// Validates resolver configuration.
    fn validate(self) -> Result<(), ConfigError> {
        if self.bypass_priority_level == 0 {
            return Err(ConfigError::Invalid(
                "resolver.bypass_priority_level must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Usage window configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Billing cycle length in days.
    #[serde(default = "default_billing_cycle_days")]
    pub billing_cycle_days: u32,
    /// Unix timestamp (seconds) billing cycles are aligned to.
    #[serde(default)]
    pub billing_anchor_unix: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            billing_cycle_days: default_billing_cycle_days(),
            billing_anchor_unix: 0,
        }
    }
}

impl QuotaConfig {
    /// Validates quota configuration.
    fn validate(self) -> Result<(), ConfigError> {
        validate_range(
            "quota.billing_cycle_days",
            u64::from(self.billing_cycle_days),
            1,
            u64::from(MAX_BILLING_CYCLE_DAYS),
        )
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Policy store or counter store configuration.
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
    /// Returns the `SQLite` settings when the sqlite backend is selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates store configuration for the named section.
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(format!(
                        "memory {section} must not set path"
                    )));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid(format!("sqlite {section} requires path"))
                })?;
                validate_store_path(section, path)?;
                validate_range(
                    &format!("{section}.busy_timeout_ms"),
                    self.busy_timeout_ms,
                    0,
                    MAX_STORE_BUSY_TIMEOUT_MS,
                )
            }
        }
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// Discard audit events.
    #[default]
    None,
    /// Write JSON lines to stderr.
    Stderr,
    /// Append JSON lines to a file.
    File,
}

/// Audit configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::File, Some(path)) => validate_store_path("audit", path),
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit path requires sink = \"file\"".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
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
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
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

/// Validates the resolved path against security limits.
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

/// Validates store and log paths against security limits.
fn validate_store_path(section: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{section} path must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{section} path exceeds max length")));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{section} path component too long")));
        }
    }
    Ok(())
}

/// Validates a numeric value against inclusive bounds.
fn validate_range(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!("{field} must be between {min} and {max}")));
    }
    Ok(())
}

/// Default matrix cache TTL.
const fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

/// Default bypass priority level.
const fn default_bypass_priority_level() -> u32 {
    DEFAULT_BYPASS_PRIORITY_LEVEL
}

/// Default billing cycle length.
const fn default_billing_cycle_days() -> u32 {
    DEFAULT_BILLING_CYCLE_DAYS
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}
