// crates/tier-gate-core/tests/common/mod.rs
// =============================================================================
// Module: Core Test Helpers
// Description: Shared policy fixtures and recording doubles.
// Purpose: Reduce duplication across tier-gate-core integration tests.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use time::OffsetDateTime;
use time::macros::datetime;
use tier_gate_core::Action;
use tier_gate_core::ActionId;
use tier_gate_core::AdminGateway;
use tier_gate_core::CheckRequest;
use tier_gate_core::CounterKey;
use tier_gate_core::CounterStoreError;
use tier_gate_core::Feature;
use tier_gate_core::FeatureId;
use tier_gate_core::InMemoryPolicyStore;
use tier_gate_core::InMemoryUsageCounterStore;
use tier_gate_core::IncrementOutcome;
use tier_gate_core::InvalidationBus;
use tier_gate_core::ManualClock;
use tier_gate_core::MatrixCache;
use tier_gate_core::PermissionGrant;
use tier_gate_core::PermissionResolver;
use tier_gate_core::PermissionService;
use tier_gate_core::PolicyMutation;
use tier_gate_core::PolicyRecords;
use tier_gate_core::PolicyStore;
use tier_gate_core::PolicyStoreError;
use tier_gate_core::QuotaEnforcer;
use tier_gate_core::SubFeature;
use tier_gate_core::SubFeatureId;
use tier_gate_core::Tier;
use tier_gate_core::TierId;
use tier_gate_core::Timeframe;
use tier_gate_core::UsageCounterStore;
use tier_gate_core::UsageLimit;
use tier_gate_core::WindowConfig;
use tier_gate_core::runtime::audit::MatrixReloadEvent;
use tier_gate_core::runtime::audit::PermissionAuditSink;
use tier_gate_core::runtime::audit::PermissionCheckEvent;
use tier_gate_core::runtime::audit::PolicyMutationEvent;

// ============================================================================
// SECTION: Entity Builders
// ============================================================================

/// Fixed instant used as "now" by default.
pub const START: OffsetDateTime = datetime!(2024-05-14 10:00 UTC);

pub fn tier(id: &str, name: &str, priority_level: u32) -> Tier {
    Tier {
        id: TierId::new(id),
        name: name.to_string(),
        priority_level,
        is_active: true,
    }
}

pub fn feature(id: &str, name: &str) -> Feature {
    Feature {
        id: FeatureId::new(id),
        name: name.to_string(),
        category: "tools".to_string(),
        is_active: true,
    }
}

pub fn sub_feature(id: &str, feature_id: &str, name: &str) -> SubFeature {
    SubFeature {
        id: SubFeatureId::new(id),
        feature_id: FeatureId::new(feature_id),
        name: name.to_string(),
        is_active: true,
    }
}

pub fn action(id: &str, name: &str) -> Action {
    Action {
        id: ActionId::new(id),
        name: name.to_string(),
        is_active: true,
    }
}

pub fn grant(
    tier_id: &str,
    feature_id: &str,
    sub_feature_id: Option<&str>,
    action_id: &str,
    is_granted: bool,
) -> PermissionGrant {
    PermissionGrant {
        tier_id: TierId::new(tier_id),
        feature_id: FeatureId::new(feature_id),
        sub_feature_id: sub_feature_id.map(SubFeatureId::new),
        action_id: ActionId::new(action_id),
        is_granted,
        usage_limit: None,
    }
}

pub fn limited(mut grant: PermissionGrant, max_uses: u32, timeframe: Timeframe) -> PermissionGrant {
    grant.usage_limit = Some(UsageLimit {
        max_uses: Some(max_uses),
        timeframe,
    });
    grant
}

// ============================================================================
// SECTION: Fixture Policy
// ============================================================================

/// Entities shared by every fixture: four tiers, two features, two
/// sub-features of `subwoofer_designer`, and three actions.
pub fn entity_mutations() -> Vec<PolicyMutation> {
    vec![
        PolicyMutation::UpsertTier(tier("t-free", "free", 10)),
        PolicyMutation::UpsertTier(tier("t-comp", "competitor", 20)),
        PolicyMutation::UpsertTier(tier("t-pro", "pro_competitor", 30)),
        PolicyMutation::UpsertTier(tier("t-admin", "admin", 100)),
        PolicyMutation::UpsertFeature(feature("f-sub", "subwoofer_designer")),
        PolicyMutation::UpsertFeature(feature("f-box", "box_builder")),
        PolicyMutation::UpsertSubFeature(sub_feature("sf-encl", "f-sub", "enclosure_calc")),
        PolicyMutation::UpsertSubFeature(sub_feature("sf-port", "f-sub", "port_tuner")),
        PolicyMutation::UpsertAction(action("a-view", "view")),
        PolicyMutation::UpsertAction(action("a-save", "save")),
        PolicyMutation::UpsertAction(action("a-export", "export")),
    ]
}

/// Entities plus a representative grant set.
pub fn fixture_mutations() -> Vec<PolicyMutation> {
    let mut mutations = entity_mutations();
    mutations.extend([
        PolicyMutation::UpsertGrant(grant("t-free", "f-sub", None, "a-view", true)),
        PolicyMutation::UpsertGrant(limited(
            grant("t-free", "f-sub", None, "a-export", true),
            2,
            Timeframe::Day,
        )),
        PolicyMutation::UpsertGrant(limited(
            grant("t-comp", "f-sub", None, "a-export", true),
            5,
            Timeframe::Day,
        )),
        PolicyMutation::UpsertGrant(grant("t-comp", "f-sub", Some("sf-port"), "a-export", false)),
        PolicyMutation::UpsertGrant(limited(
            grant("t-comp", "f-sub", Some("sf-encl"), "a-save", true),
            3,
            Timeframe::Week,
        )),
        PolicyMutation::UpsertGrant(grant("t-pro", "f-sub", None, "a-view", true)),
        PolicyMutation::UpsertGrant(grant("t-pro", "f-sub", None, "a-export", false)),
    ]);
    mutations
}

/// Builds policy records from mutations.
pub fn records_from(mutations: &[PolicyMutation]) -> PolicyRecords {
    let mut records = PolicyRecords::default();
    records.apply_all(mutations, tier_gate_core::PolicyRules::default()).unwrap();
    records
}

/// Builds a name-level check request.
pub fn request<'a>(
    subject_id: &'a str,
    tier: &'a str,
    feature: &'a str,
    sub_feature: Option<&'a str>,
    action: &'a str,
) -> CheckRequest<'a> {
    CheckRequest {
        subject_id,
        tier,
        feature,
        sub_feature,
        action,
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Fully wired in-memory engine.
pub struct Harness {
    pub store: Arc<InMemoryPolicyStore>,
    pub counters: Arc<RecordingCounterStore>,
    pub bus: Arc<InvalidationBus>,
    pub cache: Arc<MatrixCache>,
    pub gateway: AdminGateway,
    pub service: PermissionService,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<RecordingAuditSink>,
}

/// Wires an engine over the fixture policy.
pub fn harness() -> Harness {
    harness_with(&fixture_mutations(), Duration::from_secs(60))
}

/// Wires an engine over the given mutations and cache TTL.
pub fn harness_with(mutations: &[PolicyMutation], ttl: Duration) -> Harness {
    let store = Arc::new(InMemoryPolicyStore::new());
    store.apply_mutations(mutations).unwrap();
    let audit = Arc::new(RecordingAuditSink::default());
    let counters = Arc::new(RecordingCounterStore::default());
    let bus = Arc::new(InvalidationBus::new());
    let cache = Arc::new(MatrixCache::with_audit(store.clone(), ttl, audit.clone()));
    bus.subscribe(cache.clone());
    let gateway = AdminGateway::with_audit(store.clone(), bus.clone(), audit.clone());
    let clock = Arc::new(ManualClock::new(START));
    let enforcer =
        QuotaEnforcer::new(PermissionResolver::default(), counters.clone(), WindowConfig::default());
    let service = PermissionService::with_audit(cache.clone(), enforcer, clock.clone(), audit.clone());
    Harness {
        store,
        counters,
        bus,
        cache,
        gateway,
        service,
        clock,
        audit,
    }
}

// ============================================================================
// SECTION: Doubles
// ============================================================================

/// Counter store that records increments and can be forced to fail.
#[derive(Default)]
pub struct RecordingCounterStore {
    pub inner: InMemoryUsageCounterStore,
    pub increments: AtomicUsize,
    pub keys: Mutex<Vec<CounterKey>>,
    pub fail: AtomicBool,
}

impl UsageCounterStore for RecordingCounterStore {
    fn try_increment(
        &self,
        key: &CounterKey,
        max_uses: u32,
    ) -> Result<IncrementOutcome, CounterStoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CounterStoreError::Storage("counter store offline".to_string()));
        }
        self.increments.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.clone());
        self.inner.try_increment(key, max_uses)
    }

    fn current(&self, key: &CounterKey) -> Result<u32, CounterStoreError> {
        self.inner.current(key)
    }

    fn prune_before(&self, window_start: i64) -> Result<u64, CounterStoreError> {
        self.inner.prune_before(window_start)
    }
}

/// Policy store that counts loads, can slow them down, and can fail.
pub struct InstrumentedPolicyStore {
    pub inner: InMemoryPolicyStore,
    pub loads: AtomicUsize,
    pub delay: Duration,
    pub fail: AtomicBool,
}

impl InstrumentedPolicyStore {
    pub fn new(mutations: &[PolicyMutation], delay: Duration) -> Self {
        let inner = InMemoryPolicyStore::new();
        inner.apply_mutations(mutations).unwrap();
        Self {
            inner,
            loads: AtomicUsize::new(0),
            delay,
            fail: AtomicBool::new(false),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PolicyStore for InstrumentedPolicyStore {
    fn load_matrix(&self) -> Result<PolicyRecords, PolicyStoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PolicyStoreError::Storage("policy store offline".to_string()));
        }
        self.inner.load_matrix()
    }

    fn apply_mutations(&self, mutations: &[PolicyMutation]) -> Result<(), PolicyStoreError> {
        self.inner.apply_mutations(mutations)
    }
}

/// Policy store whose next armed load reads the tables, then parks until
/// the test releases it.
pub struct GatedPolicyStore {
    pub inner: InMemoryPolicyStore,
    pub loads: AtomicUsize,
    pub armed: AtomicBool,
    pub read_done: Barrier,
    pub release: Barrier,
}

impl GatedPolicyStore {
    pub fn new(mutations: &[PolicyMutation]) -> Self {
        let inner = InMemoryPolicyStore::new();
        inner.apply_mutations(mutations).unwrap();
        Self {
            inner,
            loads: AtomicUsize::new(0),
            armed: AtomicBool::new(false),
            read_done: Barrier::new(2),
            release: Barrier::new(2),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PolicyStore for GatedPolicyStore {
    fn load_matrix(&self) -> Result<PolicyRecords, PolicyStoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let records = self.inner.load_matrix()?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.read_done.wait();
            self.release.wait();
        }
        Ok(records)
    }

    fn apply_mutations(&self, mutations: &[PolicyMutation]) -> Result<(), PolicyStoreError> {
        self.inner.apply_mutations(mutations)
    }
}

/// Audit sink that keeps every event as a JSON value.
#[derive(Default)]
pub struct RecordingAuditSink {
    pub checks: Mutex<Vec<serde_json::Value>>,
    pub mutations: Mutex<Vec<serde_json::Value>>,
    pub reloads: Mutex<Vec<serde_json::Value>>,
}

impl PermissionAuditSink for RecordingAuditSink {
    fn record_check(&self, event: &PermissionCheckEvent) {
        self.checks.lock().unwrap().push(serde_json::to_value(event).unwrap());
    }

    fn record_mutation(&self, event: &PolicyMutationEvent) {
        self.mutations.lock().unwrap().push(serde_json::to_value(event).unwrap());
    }

    fn record_reload(&self, event: &MatrixReloadEvent) {
        self.reloads.lock().unwrap().push(serde_json::to_value(event).unwrap());
    }
}
