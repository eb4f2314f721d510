// crates/tier-gate-store-sqlite/tests/common/mod.rs
// =============================================================================
// Module: SQLite Store Test Helpers
// Description: Policy fixtures and store constructors for SQLite tests.
// Purpose: Reduce duplication across tier-gate-store-sqlite integration tests.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;

use tier_gate_core::Action;
use tier_gate_core::ActionId;
use tier_gate_core::CounterKey;
use tier_gate_core::Feature;
use tier_gate_core::FeatureId;
use tier_gate_core::PermissionGrant;
use tier_gate_core::PolicyMutation;
use tier_gate_core::SubFeature;
use tier_gate_core::SubFeatureId;
use tier_gate_core::SubjectId;
use tier_gate_core::Tier;
use tier_gate_core::TierId;
use tier_gate_core::Timeframe;
use tier_gate_core::UsageLimit;
use tier_gate_store_sqlite::SqlitePolicyStore;
use tier_gate_store_sqlite::SqliteStoreConfig;
use tier_gate_store_sqlite::SqliteUsageCounterStore;

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Opens a policy store at `path`.
pub fn policy_store(path: &Path) -> SqlitePolicyStore {
    SqlitePolicyStore::new(&SqliteStoreConfig::new(path)).unwrap()
}

/// Opens a counter store at `path`.
pub fn counter_store(path: &Path) -> SqliteUsageCounterStore {
    SqliteUsageCounterStore::new(&SqliteStoreConfig::new(path)).unwrap()
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

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

/// Tiers, one feature with a sub-feature, two actions, and a few grants.
pub fn fixture_mutations() -> Vec<PolicyMutation> {
    vec![
        PolicyMutation::UpsertTier(tier("t-free", "free", 10)),
        PolicyMutation::UpsertTier(tier("t-comp", "competitor", 20)),
        PolicyMutation::UpsertTier(tier("t-admin", "admin", 100)),
        PolicyMutation::UpsertFeature(feature("f-sub", "subwoofer_designer")),
        PolicyMutation::UpsertSubFeature(sub_feature("sf-port", "f-sub", "port_tuner")),
        PolicyMutation::UpsertAction(action("a-view", "view")),
        PolicyMutation::UpsertAction(action("a-export", "export")),
        PolicyMutation::UpsertGrant(grant("t-free", "f-sub", None, "a-view", true)),
        PolicyMutation::UpsertGrant(limited(
            grant("t-comp", "f-sub", None, "a-export", true),
            5,
            Timeframe::Day,
        )),
        PolicyMutation::UpsertGrant(grant("t-comp", "f-sub", Some("sf-port"), "a-export", false)),
    ]
}

/// Builds a counter key for the competitor export allowance.
pub fn counter_key(subject: &str, sub_feature_id: Option<&str>, window_start: i64) -> CounterKey {
    CounterKey {
        subject_id: SubjectId::new(subject),
        tier_id: TierId::new("t-comp"),
        feature_id: FeatureId::new("f-sub"),
        sub_feature_id: sub_feature_id.map(SubFeatureId::new),
        action_id: ActionId::new("a-export"),
        window_start,
    }
}
