// crates/tier-gate-core/src/runtime/cache.rs
// ============================================================================
// Module: Tier Gate Matrix Cache
// Description: Single-flight, invalidation-aware policy matrix cache.
// Purpose: Serve immutable matrix snapshots to many concurrent readers.
// Dependencies: crate::{core, interfaces, runtime::audit}
// ============================================================================

//! ## Overview
//! The cache holds the current [`PolicyMatrix`] behind an `Arc` and swaps it
//! atomically on rebuild. A snapshot is fresh while its invalidation epoch
//! matches the cache epoch and it is younger than the TTL.
//!
//! - Stale reads while another thread rebuilds are served the previous
//!   snapshot without blocking.
//! - A cold cache (no snapshot yet) waits on the in-flight rebuild.
//! - Only one rebuild runs at a time; a waiter that finds a fresh snapshot
//!   after acquiring the rebuild lock reuses it instead of reloading.
//! - Load failures always propagate; a stale snapshot is never used to mask
//!   an unreachable policy store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::TryLockError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use crate::core::matrix::PolicyMatrix;
use crate::interfaces::InvalidationEvent;
use crate::interfaces::InvalidationListener;
use crate::interfaces::PolicyStore;
use crate::interfaces::PolicyStoreError;
use crate::runtime::audit::MatrixReloadEvent;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::PermissionAuditSink;
use crate::runtime::audit::ReloadTrigger;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default snapshot TTL in milliseconds.
pub const DEFAULT_CACHE_TTL_MS: u64 = 5_000;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Cached snapshot plus freshness metadata.
#[derive(Clone)]
struct CachedSnapshot {
    /// Shared immutable matrix.
    matrix: Arc<PolicyMatrix>,
    /// Instant the snapshot was stored.
    loaded_at: Instant,
    /// Instant the store read began; the snapshot reflects no later write.
    load_started: Instant,
    /// Invalidation epoch observed before the load began.
    epoch: u64,
}

/// In-memory snapshot cache over a [`PolicyStore`].
pub struct MatrixCache {
    /// Authoritative policy store.
    store: Arc<dyn PolicyStore>,
    /// Audit sink for reload events.
    audit: Arc<dyn PermissionAuditSink>,
    /// Maximum snapshot age.
    ttl: Duration,
    /// Current snapshot.
    current: RwLock<Option<CachedSnapshot>>,
    /// Single-flight rebuild lock.
    rebuild: Mutex<()>,
    /// Incremented on every invalidation signal.
    epoch: AtomicU64,
    /// Last generation number handed out.
    generation: AtomicU64,
}

impl MatrixCache {
    /// Creates a cache with the given TTL and no audit sink.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, ttl: Duration) -> Self {
        Self::with_audit(store, ttl, Arc::new(NoopAuditSink))
    }

    /// Creates a cache with the given TTL and audit sink.
    #[must_use]
    pub fn with_audit(
        store: Arc<dyn PolicyStore>,
        ttl: Duration,
        audit: Arc<dyn PermissionAuditSink>,
    ) -> Self {
        Self {
            store,
            audit,
            ttl,
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
            epoch: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the generation of the current snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError::Storage`] when the cache lock is poisoned.
    pub fn current_generation(&self) -> Result<Option<u64>, PolicyStoreError> {
        Ok(self.read_current()?.map(|snapshot| snapshot.matrix.generation()))
    }

    /// Marks the current snapshot stale; the next read triggers a reload.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns a snapshot, rebuilding it when stale.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when a required reload fails.
    pub fn snapshot(&self) -> Result<Arc<PolicyMatrix>, PolicyStoreError> {
        match self.read_current()? {
            Some(snapshot) if self.is_fresh(&snapshot) => Ok(snapshot.matrix),
            Some(snapshot) => match self.rebuild.try_lock() {
                Ok(guard) => self.rebuild_locked(&guard, self.stale_trigger(&snapshot), None),
                Err(TryLockError::WouldBlock) => Ok(snapshot.matrix),
                Err(TryLockError::Poisoned(_)) => {
                    Err(PolicyStoreError::Storage("matrix rebuild lock poisoned".to_string()))
                }
            },
            None => {
                let guard = self.lock_rebuild()?;
                self.rebuild_locked(&guard, ReloadTrigger::Cold, None)
            }
        }
    }

    /// Forces a reload, joining an in-flight rebuild only when its store
    /// read began after this call was issued.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the reload fails.
    pub fn refresh(&self) -> Result<Arc<PolicyMatrix>, PolicyStoreError> {
        let requested_at = Instant::now();
        let guard = self.lock_rebuild()?;
        self.rebuild_locked(&guard, ReloadTrigger::Forced, Some(requested_at))
    }

    /// Reloads under the rebuild lock unless a fresh snapshot already exists.
    fn rebuild_locked(
        &self,
        _guard: &MutexGuard<'_, ()>,
        trigger: ReloadTrigger,
        not_before: Option<Instant>,
    ) -> Result<Arc<PolicyMatrix>, PolicyStoreError> {
        if let Some(snapshot) = self.read_current()?
            && self.is_fresh(&snapshot)
            && not_before.is_none_or(|instant| snapshot.load_started >= instant)
        {
            return Ok(snapshot.matrix);
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        let load_started = Instant::now();
        let records = match self.store.load_matrix() {
            Ok(records) => records,
            Err(err) => {
                self.audit.record_reload(&MatrixReloadEvent::failed(trigger, err.to_string()));
                return Err(err);
            }
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let matrix = match PolicyMatrix::build(records, generation) {
            Ok(matrix) => Arc::new(matrix),
            Err(err) => {
                self.audit.record_reload(&MatrixReloadEvent::failed(trigger, err.to_string()));
                return Err(PolicyStoreError::Invalid(err.to_string()));
            }
        };
        let snapshot = CachedSnapshot {
            matrix: Arc::clone(&matrix),
            loaded_at: Instant::now(),
            load_started,
            epoch,
        };
        *self
            .current
            .write()
            .map_err(|_| PolicyStoreError::Storage("matrix cache lock poisoned".to_string()))? =
            Some(snapshot);
        self.audit.record_reload(&MatrixReloadEvent::loaded(
            trigger,
            generation,
            matrix.digest().value.clone(),
        ));
        Ok(matrix)
    }

    /// Returns a clone of the current snapshot.
    fn read_current(&self) -> Result<Option<CachedSnapshot>, PolicyStoreError> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| PolicyStoreError::Storage("matrix cache lock poisoned".to_string()))
    }

    /// Acquires the rebuild lock, waiting for any in-flight rebuild.
    fn lock_rebuild(&self) -> Result<MutexGuard<'_, ()>, PolicyStoreError> {
        self.rebuild
            .lock()
            .map_err(|_| PolicyStoreError::Storage("matrix rebuild lock poisoned".to_string()))
    }

    /// Returns true when the snapshot is neither invalidated nor expired.
    fn is_fresh(&self, snapshot: &CachedSnapshot) -> bool {
        snapshot.epoch == self.epoch.load(Ordering::SeqCst) && snapshot.loaded_at.elapsed() < self.ttl
    }

    /// Classifies why a snapshot is stale.
    fn stale_trigger(&self, snapshot: &CachedSnapshot) -> ReloadTrigger {
        if snapshot.epoch == self.epoch.load(Ordering::SeqCst) {
            ReloadTrigger::TtlExpired
        } else {
            ReloadTrigger::Invalidated
        }
    }
}

impl InvalidationListener for MatrixCache {
    fn on_invalidation(&self, event: InvalidationEvent) {
        match event {
            InvalidationEvent::MatrixInvalidated => self.invalidate(),
        }
    }
}
