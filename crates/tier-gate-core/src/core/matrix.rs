// crates/tier-gate-core/src/core/matrix.rs
// ============================================================================
// Module: Tier Gate Policy Matrix
// Description: Immutable, indexed snapshot of the policy tables.
// Purpose: Serve resolver lookups without touching the policy store.
// Dependencies: crate::core::{policy, hashing}
// ============================================================================

//! ## Overview
//! A [`PolicyMatrix`] is built once per cache rebuild and then shared behind
//! an `Arc`. It never changes after construction, so any number of readers
//! may resolve against it concurrently. Name indexes back the name-level
//! resolution API; the digest fingerprints the exact tables it was built from.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::ActionId;
use crate::core::identifiers::FeatureId;
use crate::core::identifiers::SubFeatureId;
use crate::core::identifiers::TierId;
use crate::core::model::Action;
use crate::core::model::Feature;
use crate::core::model::GrantKey;
use crate::core::model::PermissionGrant;
use crate::core::model::SubFeature;
use crate::core::model::Tier;
use crate::core::policy::PolicyRecords;

// ============================================================================
// SECTION: Matrix
// ============================================================================

/// Read-optimized policy snapshot.
///
/// # Invariants
/// - Immutable after [`PolicyMatrix::build`].
/// - `generation` strictly increases across snapshots built by one cache.
#[derive(Debug, Clone)]
pub struct PolicyMatrix {
    /// Source tables.
    records: PolicyRecords,
    /// Tier name index.
    tier_names: BTreeMap<String, TierId>,
    /// Feature name index.
    feature_names: BTreeMap<String, FeatureId>,
    /// Sub-feature name index scoped by owning feature.
    sub_feature_names: BTreeMap<(FeatureId, String), SubFeatureId>,
    /// Action name index.
    action_names: BTreeMap<String, ActionId>,
    /// Snapshot generation number.
    generation: u64,
    /// Canonical digest of the source tables.
    digest: HashDigest,
}

impl PolicyMatrix {
    /// Builds an indexed snapshot from raw policy tables.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the tables cannot be canonicalized.
    pub fn build(records: PolicyRecords, generation: u64) -> Result<Self, HashError> {
        let digest = hash_canonical_json(&records.view())?;
        let tier_names =
            records.tiers.values().map(|tier| (tier.name.clone(), tier.id.clone())).collect();
        let feature_names = records
            .features
            .values()
            .map(|feature| (feature.name.clone(), feature.id.clone()))
            .collect();
        let sub_feature_names = records
            .sub_features
            .values()
            .map(|sub| ((sub.feature_id.clone(), sub.name.clone()), sub.id.clone()))
            .collect();
        let action_names =
            records.actions.values().map(|action| (action.name.clone(), action.id.clone())).collect();
        Ok(Self {
            records,
            tier_names,
            feature_names,
            sub_feature_names,
            action_names,
            generation,
            digest,
        })
    }

    /// Returns the snapshot generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the canonical digest of the snapshot tables.
    #[must_use]
    pub const fn digest(&self) -> &HashDigest {
        &self.digest
    }

    /// Looks up a tier by identifier.
    #[must_use]
    pub fn tier(&self, id: &TierId) -> Option<&Tier> {
        self.records.tiers.get(id)
    }

    /// Looks up a feature by identifier.
    #[must_use]
    pub fn feature(&self, id: &FeatureId) -> Option<&Feature> {
        self.records.features.get(id)
    }

    /// Looks up a sub-feature by identifier.
    #[must_use]
    pub fn sub_feature(&self, id: &SubFeatureId) -> Option<&SubFeature> {
        self.records.sub_features.get(id)
    }

    /// Looks up an action by identifier.
    #[must_use]
    pub fn action(&self, id: &ActionId) -> Option<&Action> {
        self.records.actions.get(id)
    }

    /// Looks up a grant by key.
    #[must_use]
    pub fn grant(&self, key: &GrantKey) -> Option<&PermissionGrant> {
        self.records.grants.get(key)
    }

    /// Looks up a tier by name.
    #[must_use]
    pub fn tier_by_name(&self, name: &str) -> Option<&Tier> {
        self.tier_names.get(name).and_then(|id| self.tier(id))
    }

    /// Looks up a feature by name.
    #[must_use]
    pub fn feature_by_name(&self, name: &str) -> Option<&Feature> {
        self.feature_names.get(name).and_then(|id| self.feature(id))
    }

    /// Looks up a sub-feature by name within its owning feature.
    #[must_use]
    pub fn sub_feature_by_name(&self, feature_id: &FeatureId, name: &str) -> Option<&SubFeature> {
        self.sub_feature_names
            .get(&(feature_id.clone(), name.to_string()))
            .and_then(|id| self.sub_feature(id))
    }

    /// Looks up an action by name.
    #[must_use]
    pub fn action_by_name(&self, name: &str) -> Option<&Action> {
        self.action_names.get(name).and_then(|id| self.action(id))
    }

    /// Returns all features in identifier order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.records.features.values()
    }

    /// Returns all actions in identifier order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.records.actions.values()
    }

    /// Returns the sub-features owned by a feature in identifier order.
    pub fn sub_features_of<'a>(
        &'a self,
        feature_id: &'a FeatureId,
    ) -> impl Iterator<Item = &'a SubFeature> + 'a {
        self.records.sub_features.values().filter(move |sub| &sub.feature_id == feature_id)
    }
}
