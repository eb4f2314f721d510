// crates/tier-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Tier Gate Runtime
// Description: Resolver, cache, enforcer, service, and admin write path.
// Purpose: Execute permission checks against cached policy snapshots.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement permission resolution, quota enforcement, the
//! single-flight matrix cache, invalidation fan-out, and in-memory backends.
//! Every outer surface calls into the same [`PermissionService`] logic.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod admin;
pub mod audit;
pub mod cache;
pub mod clock;
pub mod enforcer;
pub mod invalidation;
pub mod resolver;
pub mod service;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use admin::AdminGateway;
pub use audit::FileAuditSink;
pub use audit::MatrixReloadEvent;
pub use audit::NoopAuditSink;
pub use audit::PermissionAuditSink;
pub use audit::PermissionCheckEvent;
pub use audit::PolicyMutationEvent;
pub use audit::ReloadTrigger;
pub use audit::StderrAuditSink;
pub use cache::DEFAULT_CACHE_TTL_MS;
pub use cache::MatrixCache;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use enforcer::PermissionError;
pub use enforcer::QuotaEnforcer;
pub use invalidation::InvalidationBus;
pub use resolver::PermissionResolver;
pub use service::CheckRequest;
pub use service::FeatureMatrixView;
pub use service::PermissionService;
pub use service::SubFeatureMatrixView;
pub use service::TierMatrixView;
pub use store::InMemoryPolicyStore;
pub use store::InMemoryUsageCounterStore;
