// crates/tier-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Tier Gate Interfaces
// Description: Backend-agnostic interfaces for policy, counters, time, and signals.
// Purpose: Define the contract surfaces used by the Tier Gate runtime.
// Dependencies: crate::core, serde, thiserror, time
// ============================================================================

//! ## Overview
//! Interfaces define how Tier Gate integrates with storage backends without
//! embedding backend-specific details. Implementations must fail closed:
//! infrastructure failures are returned as errors and are never folded into
//! permission denials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::FeatureId;
use crate::core::identifiers::SubFeatureId;
use crate::core::identifiers::SubjectId;
use crate::core::identifiers::TierId;
use crate::core::policy::PolicyMutation;
use crate::core::policy::PolicyRecords;
use crate::core::policy::PolicyViolation;

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Policy store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyStoreError {
    /// Referenced entity is missing.
    #[error("policy store not found: {0}")]
    NotFound(String),
    /// Mutation conflicts with stored state.
    #[error("policy store conflict: {0}")]
    Conflict(String),
    /// Mutation payload is malformed.
    #[error("policy store validation error: {0}")]
    Validation(String),
    /// Store is unreachable or failed.
    #[error("policy store storage error: {0}")]
    Storage(String),
    /// Stored data is invalid or corrupted.
    #[error("policy store invalid data: {0}")]
    Invalid(String),
}

impl PolicyStoreError {
    /// Returns true when the error reflects an infrastructure failure.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Invalid(_))
    }
}

impl From<PolicyViolation> for PolicyStoreError {
    fn from(violation: PolicyViolation) -> Self {
        match violation {
            PolicyViolation::NotFound(message) => Self::NotFound(message),
            PolicyViolation::Conflict(message) => Self::Conflict(message),
            PolicyViolation::Validation(message) => Self::Validation(message),
        }
    }
}

/// Durable source of truth for tiers, features, actions, and grants.
pub trait PolicyStore: Send + Sync {
    /// Loads the complete policy tables.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the store cannot be read.
    fn load_matrix(&self) -> Result<PolicyRecords, PolicyStoreError>;

    /// Applies a mutation batch atomically: all mutations or none.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when validation or persistence fails.
    fn apply_mutations(&self, mutations: &[PolicyMutation]) -> Result<(), PolicyStoreError>;

    /// Applies a single mutation atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when validation or persistence fails.
    fn apply_mutation(&self, mutation: &PolicyMutation) -> Result<(), PolicyStoreError> {
        self.apply_mutations(std::slice::from_ref(mutation))
    }
}

// ============================================================================
// SECTION: Usage Counter Store
// ============================================================================

/// Usage counter store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterStoreError {
    /// Store is unreachable or failed.
    #[error("usage counter store storage error: {0}")]
    Storage(String),
    /// Stored data is invalid.
    #[error("usage counter store invalid data: {0}")]
    Invalid(String),
}

/// Unique identity of a usage counter row.
///
/// # Invariants
/// - `window_start` is the fixed-epoch window start in unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    /// Subject being counted.
    pub subject_id: SubjectId,
    /// Tier identifier.
    pub tier_id: TierId,
    /// Feature identifier.
    pub feature_id: FeatureId,
    /// Sub-feature identifier when the matched grant is sub-feature scoped.
    pub sub_feature_id: Option<SubFeatureId>,
    /// Action identifier.
    pub action_id: ActionId,
    /// Window start in unix seconds.
    pub window_start: i64,
}

/// Result of an atomic conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Pre-increment count was below the limit; `count` is the new value.
    Accepted {
        /// Count after the increment.
        count: u32,
    },
    /// Counter already at or above the limit; nothing changed.
    Rejected {
        /// Unchanged count.
        count: u32,
    },
}

/// Concurrency-safe usage counters keyed by subject, scope, and window.
pub trait UsageCounterStore: Send + Sync {
    /// Increments the counter only if its current value is below `max_uses`.
    ///
    /// The read and the increment form one atomic operation, so concurrent
    /// callers never collectively exceed `max_uses`.
    ///
    /// # Errors
    ///
    /// Returns [`CounterStoreError`] when the store cannot be updated.
    fn try_increment(
        &self,
        key: &CounterKey,
        max_uses: u32,
    ) -> Result<IncrementOutcome, CounterStoreError>;

    /// Returns the current count (zero when no row exists yet).
    ///
    /// # Errors
    ///
    /// Returns [`CounterStoreError`] when the store cannot be read.
    fn current(&self, key: &CounterKey) -> Result<u32, CounterStoreError>;

    /// Deletes counters whose window starts before `window_start` and
    /// returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CounterStoreError`] when the store cannot be updated.
    fn prune_before(&self, window_start: i64) -> Result<u64, CounterStoreError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Wall-clock source used to place calls into usage windows.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> OffsetDateTime;
}

// ============================================================================
// SECTION: Invalidation
// ============================================================================

/// Pub/sub message announcing that the policy matrix changed.
///
/// Serializes as `{"type":"matrix_invalidated"}`; consumers always perform a
/// full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvalidationEvent {
    /// Full matrix reload required.
    MatrixInvalidated,
}

/// Consumer of invalidation events (one per matrix cache instance).
pub trait InvalidationListener: Send + Sync {
    /// Handles an invalidation event; must not block on a reload.
    fn on_invalidation(&self, event: InvalidationEvent);
}
