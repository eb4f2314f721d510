// crates/tier-gate-core/tests/policy.rs
// ============================================================================
// Module: Policy Mutation Tests
// Description: Write-time validation, upsert identity, and batch atomicity.
// Purpose: Ensure the policy tables cannot be driven into invalid states.
// Dependencies: tier-gate-core, serde_json
// ============================================================================
//! ## Overview
//! Mutations are applied through the in-memory store so that batch
//! atomicity is observed exactly as backends observe it.

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

use common::entity_mutations;
use common::feature;
use common::fixture_mutations;
use common::grant;
use common::harness;
use common::limited;
use common::request;
use common::sub_feature;
use common::tier;
use serde_json::json;
use tier_gate_core::FeatureId;
use tier_gate_core::GrantKey;
use tier_gate_core::InMemoryPolicyStore;
use tier_gate_core::PolicyMatrix;
use tier_gate_core::PolicyMutation;
use tier_gate_core::PolicyRules;
use tier_gate_core::PolicyStore;
use tier_gate_core::PolicyStoreError;
use tier_gate_core::SubFeatureId;
use tier_gate_core::TierId;
use tier_gate_core::Timeframe;
use tier_gate_core::UsageLimit;

fn seeded() -> InMemoryPolicyStore {
    let store = InMemoryPolicyStore::new();
    store.apply_mutations(&fixture_mutations()).unwrap();
    store
}

// ============================================================================
// SECTION: Upserts
// ============================================================================

#[test]
fn identical_grant_upsert_is_idempotent() {
    let engine = harness();
    let upsert = PolicyMutation::UpsertGrant(grant("t-pro", "f-box", None, "a-save", true));
    engine.gateway.apply_one(&upsert).unwrap();
    let first_records = engine.store.load_matrix().unwrap();
    let first = engine
        .service
        .check(request("p", "pro_competitor", "box_builder", None, "save"))
        .unwrap();

    engine.gateway.apply_one(&upsert).unwrap();
    let second_records = engine.store.load_matrix().unwrap();
    let second = engine
        .service
        .check(request("p", "pro_competitor", "box_builder", None, "save"))
        .unwrap();

    assert_eq!(first_records, second_records);
    let key = grant("t-pro", "f-box", None, "a-save", true).key();
    assert_eq!(second_records.grants.keys().filter(|candidate| **candidate == key).count(), 1);
    assert_eq!(first, second);

    let first_digest = PolicyMatrix::build(first_records, 1).unwrap().digest().clone();
    let second_digest = PolicyMatrix::build(second_records, 2).unwrap().digest().clone();
    assert_eq!(first_digest, second_digest);
}

#[test]
fn grant_upsert_overwrites_existing_key() {
    let store = seeded();
    let before = store.load_matrix().unwrap().grants.len();
    store
        .apply_mutation(&PolicyMutation::UpsertGrant(limited(
            grant("t-free", "f-sub", None, "a-view", true),
            7,
            Timeframe::Month,
        )))
        .unwrap();
    let records = store.load_matrix().unwrap();
    assert_eq!(records.grants.len(), before);
    let stored = &records.grants[&grant("t-free", "f-sub", None, "a-view", true).key()];
    assert_eq!(
        stored.usage_limit,
        Some(UsageLimit {
            max_uses: Some(7),
            timeframe: Timeframe::Month,
        })
    );
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn limit_on_denied_grant_is_conflict() {
    let store = seeded();
    let err = store
        .apply_mutation(&PolicyMutation::UpsertGrant(limited(
            grant("t-free", "f-box", None, "a-view", false),
            3,
            Timeframe::Day,
        )))
        .unwrap_err();
    assert!(matches!(err, PolicyStoreError::Conflict(_)));
}

#[test]
fn zero_max_uses_is_validation_error() {
    let store = seeded();
    let err = store
        .apply_mutation(&PolicyMutation::UpsertGrant(limited(
            grant("t-free", "f-box", None, "a-view", true),
            0,
            Timeframe::Day,
        )))
        .unwrap_err();
    assert!(matches!(err, PolicyStoreError::Validation(_)));
}

#[test]
fn priority_above_bypass_is_validation_error() {
    let store = InMemoryPolicyStore::with_rules(PolicyRules {
        bypass_priority_level: 50,
    });
    let err = store.apply_mutation(&PolicyMutation::UpsertTier(tier("t-x", "x", 51))).unwrap_err();
    assert!(matches!(err, PolicyStoreError::Validation(_)));
    store.apply_mutation(&PolicyMutation::UpsertTier(tier("t-x", "x", 50))).unwrap();
}

#[test]
fn grant_references_must_exist() {
    let store = seeded();
    for mutation in [
        PolicyMutation::UpsertGrant(grant("t-none", "f-sub", None, "a-view", true)),
        PolicyMutation::UpsertGrant(grant("t-free", "f-none", None, "a-view", true)),
        PolicyMutation::UpsertGrant(grant("t-free", "f-sub", None, "a-none", true)),
        PolicyMutation::UpsertGrant(grant("t-free", "f-sub", Some("sf-none"), "a-view", true)),
        PolicyMutation::DeactivateTier {
            id: TierId::new("t-none"),
        },
        PolicyMutation::RemoveGrant(grant("t-free", "f-box", None, "a-view", true).key()),
    ] {
        let err = store.apply_mutation(&mutation).unwrap_err();
        assert!(matches!(err, PolicyStoreError::NotFound(_)), "{mutation:?}");
    }
}

#[test]
fn foreign_sub_feature_grant_is_conflict() {
    let store = seeded();
    let err = store
        .apply_mutation(&PolicyMutation::UpsertGrant(grant(
            "t-free",
            "f-box",
            Some("sf-encl"),
            "a-view",
            true,
        )))
        .unwrap_err();
    assert!(matches!(err, PolicyStoreError::Conflict(_)));
}

#[test]
fn duplicate_names_and_reparenting_are_conflicts() {
    let store = seeded();
    for mutation in [
        PolicyMutation::UpsertTier(tier("t-other", "free", 5)),
        PolicyMutation::UpsertFeature(feature("f-other", "box_builder")),
        PolicyMutation::UpsertSubFeature(sub_feature("sf-other", "f-sub", "port_tuner")),
        PolicyMutation::UpsertSubFeature(sub_feature("sf-port", "f-box", "port_tuner")),
    ] {
        let err = store.apply_mutation(&mutation).unwrap_err();
        assert!(matches!(err, PolicyStoreError::Conflict(_)), "{mutation:?}");
    }
    store
        .apply_mutation(&PolicyMutation::UpsertSubFeature(sub_feature(
            "sf-box-port",
            "f-box",
            "port_tuner",
        )))
        .unwrap();
}

#[test]
fn empty_names_are_validation_errors() {
    let store = seeded();
    let err = store.apply_mutation(&PolicyMutation::UpsertTier(tier("t-blank", " ", 1))).unwrap_err();
    assert!(matches!(err, PolicyStoreError::Validation(_)));
    let err = store.apply_mutation(&PolicyMutation::UpsertTier(tier("", "blank", 1))).unwrap_err();
    assert!(matches!(err, PolicyStoreError::Validation(_)));
}

// ============================================================================
// SECTION: Batches
// ============================================================================

#[test]
fn failed_batch_applies_nothing() {
    let store = seeded();
    let before = store.load_matrix().unwrap();
    let err = store
        .apply_mutations(&[
            PolicyMutation::UpsertGrant(grant("t-pro", "f-box", None, "a-view", true)),
            PolicyMutation::DeactivateFeature {
                id: FeatureId::new("f-sub"),
            },
            PolicyMutation::UpsertGrant(grant("t-pro", "f-box", None, "a-missing", true)),
        ])
        .unwrap_err();
    assert!(matches!(err, PolicyStoreError::NotFound(_)));
    assert_eq!(store.load_matrix().unwrap(), before);
}

#[test]
fn batch_may_reference_entities_created_earlier_in_batch() {
    let store = InMemoryPolicyStore::new();
    let mut mutations = entity_mutations();
    mutations.push(PolicyMutation::UpsertSubFeature(sub_feature("sf-new", "f-box", "cutouts")));
    mutations.push(PolicyMutation::UpsertGrant(grant("t-free", "f-box", Some("sf-new"), "a-view", true)));
    store.apply_mutations(&mutations).unwrap();
    assert_eq!(store.load_matrix().unwrap().grants.len(), 1);
}

#[test]
fn deactivation_preserves_grants() {
    let store = seeded();
    let before = store.load_matrix().unwrap().grants;
    store
        .apply_mutations(&[
            PolicyMutation::DeactivateTier {
                id: TierId::new("t-comp"),
            },
            PolicyMutation::DeactivateSubFeature {
                id: SubFeatureId::new("sf-port"),
            },
        ])
        .unwrap();
    assert_eq!(store.load_matrix().unwrap().grants, before);
}

#[test]
fn remove_grant_deletes_the_key() {
    let store = seeded();
    let key = GrantKey {
        tier_id: TierId::new("t-pro"),
        feature_id: FeatureId::new("f-sub"),
        sub_feature_id: None,
        action_id: tier_gate_core::ActionId::new("a-export"),
    };
    store.apply_mutation(&PolicyMutation::RemoveGrant(key.clone())).unwrap();
    assert!(!store.load_matrix().unwrap().grants.contains_key(&key));
}

// ============================================================================
// SECTION: Wire Format
// ============================================================================

#[test]
fn mutations_parse_from_tagged_json() {
    let payload = json!([
        {"op": "upsert_tier", "id": "t-org", "name": "organization", "priority_level": 40, "is_active": true},
        {"op": "deactivate_action", "id": "a-save"},
        {
            "op": "upsert_grant",
            "tier_id": "t-org",
            "feature_id": "f-sub",
            "action_id": "a-export",
            "is_granted": true,
            "usage_limit": {"max_uses": 10, "timeframe": "billing_cycle"}
        },
        {"op": "remove_grant", "tier_id": "t-org", "feature_id": "f-sub", "sub_feature_id": null, "action_id": "a-export"}
    ]);
    let mutations: Vec<PolicyMutation> = serde_json::from_value(payload).unwrap();
    assert_eq!(mutations.len(), 4);
    assert_eq!(mutations[0].label(), "upsert_tier");
    match &mutations[2] {
        PolicyMutation::UpsertGrant(grant) => {
            assert_eq!(grant.sub_feature_id, None);
            assert_eq!(grant.usage_limit.map(|limit| limit.timeframe), Some(Timeframe::BillingCycle));
        }
        other => panic!("unexpected mutation {other:?}"),
    }

    let store = seeded();
    store.apply_mutations(&mutations).unwrap();
    let records = store.load_matrix().unwrap();
    assert!(records.tiers.contains_key(&TierId::new("t-org")));
    assert!(records.grants.keys().all(|key| key.tier_id.as_str() != "t-org"));
}
