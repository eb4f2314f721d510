// crates/tier-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Tier Gate In-Memory Stores
// Description: In-memory policy and usage counter stores.
// Purpose: Provide deterministic backends for tests, demos, and embedding.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The in-memory policy store applies each batch to a working copy and swaps
//! it in only when every mutation validated, so batches are atomic. The
//! counter store performs check-and-increment under one mutex and keeps
//! closed windows until `prune_before` drops them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::policy::PolicyMutation;
use crate::core::policy::PolicyRecords;
use crate::core::policy::PolicyRules;
use crate::interfaces::CounterKey;
use crate::interfaces::CounterStoreError;
use crate::interfaces::IncrementOutcome;
use crate::interfaces::PolicyStore;
use crate::interfaces::PolicyStoreError;
use crate::interfaces::UsageCounterStore;

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// In-memory policy store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPolicyStore {
    /// Policy tables protected by a mutex.
    records: Arc<Mutex<PolicyRecords>>,
    /// Write-time validation rules.
    rules: PolicyRules,
}

impl InMemoryPolicyStore {
    /// Creates an empty store with default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with explicit rules.
    #[must_use]
    pub fn with_rules(rules: PolicyRules) -> Self {
        Self {
            records: Arc::new(Mutex::new(PolicyRecords::default())),
            rules,
        }
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn load_matrix(&self) -> Result<PolicyRecords, PolicyStoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| PolicyStoreError::Storage("policy store mutex poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn apply_mutations(&self, mutations: &[PolicyMutation]) -> Result<(), PolicyStoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| PolicyStoreError::Storage("policy store mutex poisoned".to_string()))?;
        let mut working = guard.clone();
        working.apply_all(mutations, self.rules)?;
        *guard = working;
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Counter Store
// ============================================================================

/// In-memory usage counter store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUsageCounterStore {
    /// Counters protected by a mutex.
    counters: Arc<Mutex<BTreeMap<CounterKey, u32>>>,
}

impl InMemoryUsageCounterStore {
    /// Creates an empty counter store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageCounterStore for InMemoryUsageCounterStore {
    fn try_increment(
        &self,
        key: &CounterKey,
        max_uses: u32,
    ) -> Result<IncrementOutcome, CounterStoreError> {
        let mut guard = self
            .counters
            .lock()
            .map_err(|_| CounterStoreError::Storage("counter store mutex poisoned".to_string()))?;
        let count = guard.get(key).copied().unwrap_or(0);
        if count >= max_uses {
            return Ok(IncrementOutcome::Rejected {
                count,
            });
        }
        guard.insert(key.clone(), count + 1);
        drop(guard);
        Ok(IncrementOutcome::Accepted {
            count: count + 1,
        })
    }

    fn current(&self, key: &CounterKey) -> Result<u32, CounterStoreError> {
        let guard = self
            .counters
            .lock()
            .map_err(|_| CounterStoreError::Storage("counter store mutex poisoned".to_string()))?;
        Ok(guard.get(key).copied().unwrap_or(0))
    }

    fn prune_before(&self, window_start: i64) -> Result<u64, CounterStoreError> {
        let mut guard = self
            .counters
            .lock()
            .map_err(|_| CounterStoreError::Storage("counter store mutex poisoned".to_string()))?;
        let before = guard.len();
        guard.retain(|key, _| key.window_start >= window_start);
        let removed = before - guard.len();
        drop(guard);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
