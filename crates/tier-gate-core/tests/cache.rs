// crates/tier-gate-core/tests/cache.rs
// ============================================================================
// Module: Matrix Cache Tests
// Description: Invalidation coherency, single-flight rebuilds, and TTL expiry.
// Purpose: Validate that administrative edits reach resolution promptly.
// Dependencies: tier-gate-core
// ============================================================================
//! ## Overview
//! Covers the cache through the admin gateway and through instrumented
//! policy stores that count, delay, or fail loads.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::GatedPolicyStore;
use common::InstrumentedPolicyStore;
use common::fixture_mutations;
use common::grant;
use common::harness;
use common::request;
use common::tier;
use tier_gate_core::InvalidationBus;
use tier_gate_core::InvalidationEvent;
use tier_gate_core::MatrixCache;
use tier_gate_core::PolicyMutation;
use tier_gate_core::PolicyStore;
use tier_gate_core::PolicyStoreError;
use tier_gate_core::ReasonCode;
use tier_gate_core::TierId;

// ============================================================================
// SECTION: Coherency
// ============================================================================

#[test]
fn granted_flip_is_visible_after_invalidation() {
    let engine = harness();
    let check = || {
        engine
            .service
            .check(request("pat", "pro_competitor", "subwoofer_designer", None, "export"))
            .unwrap()
    };
    let before = check();
    assert!(!before.allowed);
    assert_eq!(before.reason_code, ReasonCode::Denied);

    engine
        .gateway
        .apply_one(&PolicyMutation::UpsertGrant(grant("t-pro", "f-sub", None, "a-export", true)))
        .unwrap();

    let after = check();
    assert!(after.allowed);
    assert_eq!(after.reason_code, ReasonCode::Granted);
    assert_eq!(after.remaining, None);
}

#[test]
fn deactivation_is_visible_after_invalidation() {
    let engine = harness();
    assert!(
        engine.service.check(request("a", "free", "subwoofer_designer", None, "view")).unwrap().allowed
    );
    engine
        .gateway
        .apply_one(&PolicyMutation::DeactivateTier {
            id: TierId::new("t-free"),
        })
        .unwrap();
    let decision =
        engine.service.check(request("a", "free", "subwoofer_designer", None, "view")).unwrap();
    assert_eq!(decision.reason_code, ReasonCode::InactiveEntity);
}

#[test]
fn rejected_mutation_publishes_nothing() {
    let engine = harness();
    let first = engine.cache.snapshot().unwrap();
    let err = engine
        .gateway
        .apply_one(&PolicyMutation::UpsertGrant(grant("t-pro", "f-missing", None, "a-view", true)))
        .unwrap_err();
    assert!(matches!(err, PolicyStoreError::NotFound(_)));
    let second = engine.cache.snapshot().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let mutations = engine.audit.mutations.lock().unwrap();
    let last = mutations.last().unwrap();
    assert_eq!(last["outcome"], "error");
    assert_eq!(last["invalidated"], false);
}

#[test]
fn every_subscribed_cache_is_invalidated() {
    let store = Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::ZERO));
    let bus = InvalidationBus::new();
    let caches: Vec<_> = (0 .. 3)
        .map(|_| Arc::new(MatrixCache::new(store.clone(), Duration::from_secs(60))))
        .collect();
    for cache in &caches {
        bus.subscribe(cache.clone());
        cache.snapshot().unwrap();
    }
    assert_eq!(bus.listener_count(), 3);
    assert_eq!(store.loads(), 3);

    bus.publish(InvalidationEvent::MatrixInvalidated);
    for cache in &caches {
        assert_eq!(cache.snapshot().unwrap().generation(), 2);
    }
    assert_eq!(store.loads(), 6);
}

#[test]
fn snapshot_is_reused_while_fresh() {
    let store = Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::ZERO));
    let cache = MatrixCache::new(store.clone(), Duration::from_secs(60));
    let first = cache.snapshot().unwrap();
    let second = cache.snapshot().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.loads(), 1);
}

// ============================================================================
// SECTION: Single Flight
// ============================================================================

#[test]
fn cold_cache_loads_once_for_concurrent_readers() {
    let store =
        Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::from_millis(50)));
    let cache = MatrixCache::new(store.clone(), Duration::from_secs(60));
    let barrier = Barrier::new(16);
    let generations: Vec<u64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0 .. 16)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache.snapshot().unwrap().generation()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert_eq!(store.loads(), 1);
    assert!(generations.iter().all(|generation| *generation == 1));
}

#[test]
fn stale_readers_are_served_previous_snapshot_during_rebuild() {
    let store =
        Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::from_millis(200)));
    let cache = MatrixCache::new(store.clone(), Duration::from_secs(60));
    cache.snapshot().unwrap();
    cache.invalidate();

    std::thread::scope(|scope| {
        let rebuilder = scope.spawn(|| cache.snapshot().unwrap().generation());
        std::thread::sleep(Duration::from_millis(50));
        let stale = cache.snapshot().unwrap();
        assert_eq!(stale.generation(), 1);
        assert_eq!(rebuilder.join().unwrap(), 2);
    });
    assert_eq!(store.loads(), 2);
}

#[test]
fn refresh_forces_reload() {
    let store = Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::ZERO));
    let cache = MatrixCache::new(store.clone(), Duration::from_secs(60));
    assert_eq!(cache.snapshot().unwrap().generation(), 1);
    assert_eq!(cache.refresh().unwrap().generation(), 2);
    assert_eq!(cache.current_generation().unwrap(), Some(2));
    assert_eq!(store.loads(), 2);
}

#[test]
fn refresh_does_not_reuse_load_that_read_before_it_was_issued() {
    let store = Arc::new(GatedPolicyStore::new(&fixture_mutations()));
    let cache = MatrixCache::new(store.clone(), Duration::from_secs(60));
    assert_eq!(cache.snapshot().unwrap().generation(), 1);
    store.armed.store(true, Ordering::SeqCst);

    std::thread::scope(|scope| {
        let early = scope.spawn(|| cache.refresh().unwrap());
        store.read_done.wait();
        store
            .inner
            .apply_mutation(&PolicyMutation::UpsertTier(tier("t-org", "organization", 40)))
            .unwrap();

        let late = scope.spawn(|| cache.refresh().unwrap());
        std::thread::sleep(Duration::from_millis(50));
        store.release.wait();

        let early = early.join().unwrap();
        assert!(early.tier_by_name("organization").is_none());
        let late = late.join().unwrap();
        assert!(late.tier_by_name("organization").is_some());
        assert_eq!(late.generation(), 3);
    });
    assert_eq!(store.loads(), 3);
}

// ============================================================================
// SECTION: TTL
// ============================================================================

#[test]
fn expired_snapshot_is_reloaded() {
    let store = Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::ZERO));
    let cache = MatrixCache::new(store.clone(), Duration::from_millis(20));
    assert_eq!(cache.snapshot().unwrap().generation(), 1);
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(cache.snapshot().unwrap().generation(), 2);
}

#[test]
fn lost_invalidation_is_recovered_by_ttl() {
    let store = Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::ZERO));
    let cache = MatrixCache::new(store.clone(), Duration::from_millis(20));
    let before = cache.snapshot().unwrap();
    assert!(before.tier(&TierId::new("t-free")).unwrap().is_active);

    store
        .inner
        .apply_mutation(&PolicyMutation::DeactivateTier {
            id: TierId::new("t-free"),
        })
        .unwrap();
    std::thread::sleep(Duration::from_millis(40));
    let after = cache.snapshot().unwrap();
    assert!(!after.tier(&TierId::new("t-free")).unwrap().is_active);
}

// ============================================================================
// SECTION: Failures
// ============================================================================

#[test]
fn cold_load_failure_propagates() {
    let store = Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::ZERO));
    store.fail.store(true, Ordering::SeqCst);
    let cache = MatrixCache::new(store, Duration::from_secs(60));
    let err = cache.snapshot().unwrap_err();
    assert!(err.is_storage());
}

#[test]
fn stale_load_failure_is_not_masked() {
    let store = Arc::new(InstrumentedPolicyStore::new(&fixture_mutations(), Duration::ZERO));
    let cache = MatrixCache::new(store.clone(), Duration::from_secs(60));
    cache.snapshot().unwrap();
    store.fail.store(true, Ordering::SeqCst);
    cache.invalidate();
    assert!(cache.snapshot().is_err());

    store.fail.store(false, Ordering::SeqCst);
    assert_eq!(cache.snapshot().unwrap().generation(), 2);
}

#[test]
fn reloads_are_audited() {
    let engine = harness();
    engine.cache.snapshot().unwrap();
    engine.cache.refresh().unwrap();
    let reloads = engine.audit.reloads.lock().unwrap();
    assert_eq!(reloads.len(), 2);
    assert_eq!(reloads[0]["trigger"], "cold");
    assert_eq!(reloads[1]["trigger"], "forced");
    assert_eq!(reloads[1]["generation"], 2);
    assert_eq!(reloads[1]["event"], "matrix_reload");
}
