// crates/tier-gate-core/src/lib.rs
// ============================================================================
// Module: Tier Gate Core Library
// Description: Public API surface for the Tier Gate permission engine.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Tier Gate decides whether a membership tier may perform an action on a
//! feature or sub-feature, and whether the caller has quota left in the
//! current usage window. It is backend-agnostic: durable stores plug in
//! through [`PolicyStore`] and [`UsageCounterStore`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::Clock;
pub use interfaces::CounterKey;
pub use interfaces::CounterStoreError;
pub use interfaces::IncrementOutcome;
pub use interfaces::InvalidationEvent;
pub use interfaces::InvalidationListener;
pub use interfaces::PolicyStore;
pub use interfaces::PolicyStoreError;
pub use interfaces::UsageCounterStore;
pub use runtime::AdminGateway;
pub use runtime::CheckRequest;
pub use runtime::InMemoryPolicyStore;
pub use runtime::InMemoryUsageCounterStore;
pub use runtime::InvalidationBus;
pub use runtime::ManualClock;
pub use runtime::MatrixCache;
pub use runtime::PermissionError;
pub use runtime::PermissionResolver;
pub use runtime::PermissionService;
pub use runtime::QuotaEnforcer;
pub use runtime::SystemClock;
pub use runtime::TierMatrixView;
