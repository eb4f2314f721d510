// crates/tier-gate-core/src/runtime/admin.rs
// ============================================================================
// Module: Tier Gate Admin Mutation Gateway
// Description: Single write path into the policy store.
// Purpose: Apply mutations and announce them before acknowledging success.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`AdminGateway`] is the only writer of policy data. A successful batch
//! publishes [`InvalidationEvent::MatrixInvalidated`] on the bus before
//! `apply` returns, so every subscribed cache reloads on its next read.
//! Rejected batches leave the store untouched and publish nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::policy::PolicyMutation;
use crate::interfaces::InvalidationEvent;
use crate::interfaces::PolicyStore;
use crate::interfaces::PolicyStoreError;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::PermissionAuditSink;
use crate::runtime::audit::PolicyMutationEvent;
use crate::runtime::invalidation::InvalidationBus;

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// Administrative write path with cache invalidation.
pub struct AdminGateway {
    /// Authoritative policy store.
    store: Arc<dyn PolicyStore>,
    /// Invalidation fan-out.
    bus: Arc<InvalidationBus>,
    /// Audit sink for mutation events.
    audit: Arc<dyn PermissionAuditSink>,
}

impl AdminGateway {
    /// Creates a gateway without audit logging.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, bus: Arc<InvalidationBus>) -> Self {
        Self::with_audit(store, bus, Arc::new(NoopAuditSink))
    }

    /// Creates a gateway with an audit sink.
    #[must_use]
    pub fn with_audit(
        store: Arc<dyn PolicyStore>,
        bus: Arc<InvalidationBus>,
        audit: Arc<dyn PermissionAuditSink>,
    ) -> Self {
        Self {
            store,
            bus,
            audit,
        }
    }

    /// Applies a batch atomically and publishes an invalidation on success.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when validation or persistence fails.
    pub fn apply(&self, mutations: &[PolicyMutation]) -> Result<(), PolicyStoreError> {
        let operations = mutations.iter().map(PolicyMutation::label).collect();
        match self.store.apply_mutations(mutations) {
            Ok(()) => {
                self.bus.publish(InvalidationEvent::MatrixInvalidated);
                self.audit.record_mutation(&PolicyMutationEvent::new(operations, None));
                Ok(())
            }
            Err(err) => {
                self.audit.record_mutation(&PolicyMutationEvent::new(operations, Some(err.to_string())));
                Err(err)
            }
        }
    }

    /// Applies a single mutation.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when validation or persistence fails.
    pub fn apply_one(&self, mutation: &PolicyMutation) -> Result<(), PolicyStoreError> {
        self.apply(std::slice::from_ref(mutation))
    }
}
