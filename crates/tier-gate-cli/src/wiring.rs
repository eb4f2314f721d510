// crates/tier-gate-cli/src/wiring.rs
// ============================================================================
// Module: Tier Gate Engine Wiring
// Description: Builds stores, cache, bus, gateway, and service from config.
// Purpose: Single composition root shared by every CLI command.
// Dependencies: tier-gate-config, tier-gate-core, tier-gate-store-sqlite
// ============================================================================

//! ## Overview
//! [`Engine::from_config`] opens the configured policy and counter stores,
//! subscribes a matrix cache to a fresh invalidation bus, and returns the
//! admin write path alongside the permission read path. In-memory stores
//! start empty and live only as long as the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use tier_gate_config::AuditConfig;
use tier_gate_config::AuditSinkType;
use tier_gate_config::StoreConfig;
use tier_gate_config::TierGateConfig;
use tier_gate_core::AdminGateway;
use tier_gate_core::InMemoryPolicyStore;
use tier_gate_core::InMemoryUsageCounterStore;
use tier_gate_core::InvalidationBus;
use tier_gate_core::MatrixCache;
use tier_gate_core::PermissionResolver;
use tier_gate_core::PermissionService;
use tier_gate_core::PolicyRules;
use tier_gate_core::PolicyStore;
use tier_gate_core::QuotaEnforcer;
use tier_gate_core::SystemClock;
use tier_gate_core::UsageCounterStore;
use tier_gate_core::runtime::FileAuditSink;
use tier_gate_core::runtime::NoopAuditSink;
use tier_gate_core::runtime::PermissionAuditSink;
use tier_gate_core::runtime::StderrAuditSink;
use tier_gate_store_sqlite::SqlitePolicyStore;
use tier_gate_store_sqlite::SqliteUsageCounterStore;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures while assembling an engine from configuration.
#[derive(Debug, Error)]
pub enum WiringError {
    /// A store could not be opened.
    #[error("store initialization failed: {0}")]
    Store(String),
    /// The audit sink could not be opened.
    #[error("audit sink initialization failed: {0}")]
    Audit(String),
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Fully wired permission engine.
pub struct Engine {
    /// Admin mutation gateway (write path).
    pub gateway: AdminGateway,
    /// Permission service (read path).
    pub service: PermissionService,
    /// Invalidation bus shared by the gateway and caches.
    pub bus: Arc<InvalidationBus>,
}

impl Engine {
    /// Builds an engine from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WiringError`] when a store or the audit sink cannot be opened.
    pub fn from_config(config: &TierGateConfig) -> Result<Self, WiringError> {
        let rules = config.policy_rules();
        let audit = audit_sink(&config.audit)?;
        let store = policy_store(&config.policy_store, rules)?;
        let counters = counter_store(&config.counter_store)?;

        let bus = Arc::new(InvalidationBus::new());
        let cache = Arc::new(MatrixCache::with_audit(
            Arc::clone(&store),
            config.cache.ttl(),
            Arc::clone(&audit),
        ));
        bus.subscribe(cache.clone());
        let enforcer = QuotaEnforcer::new(
            PermissionResolver::new(rules.bypass_priority_level),
            counters,
            config.window_config(),
        );
        let service = PermissionService::with_audit(
            cache,
            enforcer,
            Arc::new(SystemClock),
            Arc::clone(&audit),
        );
        let gateway = AdminGateway::with_audit(store, Arc::clone(&bus), audit);
        Ok(Self {
            gateway,
            service,
            bus,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens the configured policy store.
fn policy_store(
    config: &StoreConfig,
    rules: PolicyRules,
) -> Result<Arc<dyn PolicyStore>, WiringError> {
    match config.sqlite_config() {
        Some(sqlite) => {
            let store = SqlitePolicyStore::with_rules(&sqlite, rules)
                .map_err(|err| WiringError::Store(err.to_string()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryPolicyStore::with_rules(rules))),
    }
}

/// Opens the configured usage counter store.
fn counter_store(config: &StoreConfig) -> Result<Arc<dyn UsageCounterStore>, WiringError> {
    match config.sqlite_config() {
        Some(sqlite) => {
            let store = SqliteUsageCounterStore::new(&sqlite)
                .map_err(|err| WiringError::Store(err.to_string()))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryUsageCounterStore::new())),
    }
}

/// Opens the configured audit sink.
fn audit_sink(config: &AuditConfig) -> Result<Arc<dyn PermissionAuditSink>, WiringError> {
    match (config.sink, &config.path) {
        (AuditSinkType::File, Some(path)) => {
            let sink =
                FileAuditSink::new(path).map_err(|err| WiringError::Audit(err.to_string()))?;
            Ok(Arc::new(sink))
        }
        (AuditSinkType::File, None) => {
            Err(WiringError::Audit("file audit sink requires path".to_string()))
        }
        (AuditSinkType::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
        (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
    }
}
