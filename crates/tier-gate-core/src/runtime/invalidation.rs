// crates/tier-gate-core/src/runtime/invalidation.rs
// ============================================================================
// Module: Tier Gate Invalidation Bus
// Description: In-process fan-out of matrix invalidation events.
// Purpose: Deliver one event to every subscribed matrix cache.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! The bus is the in-process transport for [`InvalidationEvent`]. Every
//! subscriber receives every event. Listener callbacks must stay cheap;
//! caches only bump an epoch and reload lazily on the next read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;

use crate::interfaces::InvalidationEvent;
use crate::interfaces::InvalidationListener;

// ============================================================================
// SECTION: Bus
// ============================================================================

/// Fan-out invalidation channel.
#[derive(Default)]
pub struct InvalidationBus {
    /// Registered listeners.
    listeners: RwLock<Vec<Arc<dyn InvalidationListener>>>,
}

impl InvalidationBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for all future events.
    pub fn subscribe(&self, listener: Arc<dyn InvalidationListener>) {
        let mut guard = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(listener);
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Delivers an event to every listener before returning.
    pub fn publish(&self, event: InvalidationEvent) {
        let listeners = match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for listener in listeners {
            listener.on_invalidation(event);
        }
    }
}
