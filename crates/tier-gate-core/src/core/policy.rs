// crates/tier-gate-core/src/core/policy.rs
// ============================================================================
// Module: Tier Gate Policy Records
// Description: Raw policy tables and the administrative mutation model.
// Purpose: Single validation authority for every policy store backend.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`PolicyRecords`] is the authoritative table set loaded from a policy
//! store. [`PolicyMutation`] describes every administrative write. Store
//! backends apply mutation batches to a working copy of the records via
//! [`PolicyRecords::apply`]; only if the whole batch validates is it
//! persisted. Deactivation never deletes grants.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::FeatureId;
use crate::core::identifiers::SubFeatureId;
use crate::core::identifiers::TierId;
use crate::core::model::Action;
use crate::core::model::DEFAULT_BYPASS_PRIORITY_LEVEL;
use crate::core::model::Feature;
use crate::core::model::GrantKey;
use crate::core::model::PermissionGrant;
use crate::core::model::SubFeature;
use crate::core::model::Tier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum identifier length in bytes.
pub const MAX_ID_LENGTH: usize = 128;
/// Maximum entity name length in bytes.
pub const MAX_NAME_LENGTH: usize = 128;
/// Maximum feature category length in bytes.
pub const MAX_CATEGORY_LENGTH: usize = 128;
/// Maximum number of mutations accepted in one batch.
pub const MAX_MUTATION_BATCH: usize = 4_096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Mutation rejected by policy validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Mutation conflicts with existing state or with itself.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Mutation payload is malformed.
    #[error("validation failed: {0}")]
    Validation(String),
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Write-time rules shared by every policy store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRules {
    /// Reserved top priority level marking the bypass tier.
    pub bypass_priority_level: u32,
}

impl Default for PolicyRules {
    fn default() -> Self {
        Self {
            bypass_priority_level: DEFAULT_BYPASS_PRIORITY_LEVEL,
        }
    }
}

// ============================================================================
// SECTION: Mutations
// ============================================================================

/// Administrative write against the policy store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PolicyMutation {
    /// Creates or replaces a tier.
    UpsertTier(Tier),
    /// Marks a tier inactive.
    DeactivateTier {
        /// Tier identifier.
        id: TierId,
    },
    /// Creates or replaces a feature.
    UpsertFeature(Feature),
    /// Marks a feature inactive.
    DeactivateFeature {
        /// Feature identifier.
        id: FeatureId,
    },
    /// Creates or replaces a sub-feature.
    UpsertSubFeature(SubFeature),
    /// Marks a sub-feature inactive.
    DeactivateSubFeature {
        /// Sub-feature identifier.
        id: SubFeatureId,
    },
    /// Creates or replaces an action.
    UpsertAction(Action),
    /// Marks an action inactive.
    DeactivateAction {
        /// Action identifier.
        id: ActionId,
    },
    /// Creates or overwrites the grant for its key.
    UpsertGrant(PermissionGrant),
    /// Deletes the grant stored under a key.
    RemoveGrant(GrantKey),
}

impl PolicyMutation {
    /// Returns a stable label for audit logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UpsertTier(_) => "upsert_tier",
            Self::DeactivateTier {
                ..
            } => "deactivate_tier",
            Self::UpsertFeature(_) => "upsert_feature",
            Self::DeactivateFeature {
                ..
            } => "deactivate_feature",
            Self::UpsertSubFeature(_) => "upsert_sub_feature",
            Self::DeactivateSubFeature {
                ..
            } => "deactivate_sub_feature",
            Self::UpsertAction(_) => "upsert_action",
            Self::DeactivateAction {
                ..
            } => "deactivate_action",
            Self::UpsertGrant(_) => "upsert_grant",
            Self::RemoveGrant(_) => "remove_grant",
        }
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Authoritative policy tables.
///
/// # Invariants
/// - Every grant references existing tier, feature, action, and (when scoped)
///   a sub-feature owned by the grant's feature.
/// - No grant carries a usage limit unless it is granted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRecords {
    /// Tiers by identifier.
    pub tiers: BTreeMap<TierId, Tier>,
    /// Features by identifier.
    pub features: BTreeMap<FeatureId, Feature>,
    /// Sub-features by identifier.
    pub sub_features: BTreeMap<SubFeatureId, SubFeature>,
    /// Actions by identifier.
    pub actions: BTreeMap<ActionId, Action>,
    /// Grants by key.
    pub grants: BTreeMap<GrantKey, PermissionGrant>,
}

/// Ordered, serializable view of the policy tables.
#[derive(Debug, Serialize)]
pub struct PolicyRecordsView<'a> {
    /// Tiers in identifier order.
    pub tiers: Vec<&'a Tier>,
    /// Features in identifier order.
    pub features: Vec<&'a Feature>,
    /// Sub-features in identifier order.
    pub sub_features: Vec<&'a SubFeature>,
    /// Actions in identifier order.
    pub actions: Vec<&'a Action>,
    /// Grants in key order.
    pub grants: Vec<&'a PermissionGrant>,
}

impl PolicyRecords {
    /// Returns an ordered view suitable for serialization and hashing.
    #[must_use]
    pub fn view(&self) -> PolicyRecordsView<'_> {
        PolicyRecordsView {
            tiers: self.tiers.values().collect(),
            features: self.features.values().collect(),
            sub_features: self.sub_features.values().collect(),
            actions: self.actions.values().collect(),
            grants: self.grants.values().collect(),
        }
    }

    /// Applies a batch of mutations in order; on error the records may be
    /// partially modified, so callers apply batches to a working copy.
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyViolation`] raised by the batch.
    pub fn apply_all(
        &mut self,
        mutations: &[PolicyMutation],
        rules: PolicyRules,
    ) -> Result<(), PolicyViolation> {
        if mutations.len() > MAX_MUTATION_BATCH {
            return Err(PolicyViolation::Validation(format!(
                "mutation batch exceeds {MAX_MUTATION_BATCH} entries"
            )));
        }
        for mutation in mutations {
            self.apply(mutation, rules)?;
        }
        Ok(())
    }

    /// Applies a single mutation after validating it against current state.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyViolation`] when the mutation references missing
    /// entities, conflicts with existing records, or is malformed.
    pub fn apply(
        &mut self,
        mutation: &PolicyMutation,
        rules: PolicyRules,
    ) -> Result<(), PolicyViolation> {
        match mutation {
            PolicyMutation::UpsertTier(tier) => self.upsert_tier(tier, rules),
            PolicyMutation::DeactivateTier {
                id,
            } => {
                let tier = self
                    .tiers
                    .get_mut(id)
                    .ok_or_else(|| PolicyViolation::NotFound(format!("tier {id}")))?;
                tier.is_active = false;
                Ok(())
            }
            PolicyMutation::UpsertFeature(feature) => self.upsert_feature(feature),
            PolicyMutation::DeactivateFeature {
                id,
            } => {
                let feature = self
                    .features
                    .get_mut(id)
                    .ok_or_else(|| PolicyViolation::NotFound(format!("feature {id}")))?;
                feature.is_active = false;
                Ok(())
            }
            PolicyMutation::UpsertSubFeature(sub_feature) => self.upsert_sub_feature(sub_feature),
            PolicyMutation::DeactivateSubFeature {
                id,
            } => {
                let sub_feature = self
                    .sub_features
                    .get_mut(id)
                    .ok_or_else(|| PolicyViolation::NotFound(format!("sub-feature {id}")))?;
                sub_feature.is_active = false;
                Ok(())
            }
            PolicyMutation::UpsertAction(action) => self.upsert_action(action),
            PolicyMutation::DeactivateAction {
                id,
            } => {
                let action = self
                    .actions
                    .get_mut(id)
                    .ok_or_else(|| PolicyViolation::NotFound(format!("action {id}")))?;
                action.is_active = false;
                Ok(())
            }
            PolicyMutation::UpsertGrant(grant) => self.upsert_grant(grant),
            PolicyMutation::RemoveGrant(key) => {
                if self.grants.remove(key).is_none() {
                    return Err(PolicyViolation::NotFound(format!(
                        "grant for tier {} feature {} action {}",
                        key.tier_id, key.feature_id, key.action_id
                    )));
                }
                Ok(())
            }
        }
    }

    /// Validates and stores a tier.
    fn upsert_tier(&mut self, tier: &Tier, rules: PolicyRules) -> Result<(), PolicyViolation> {
        validate_id("tier id", tier.id.as_str())?;
        validate_name("tier name", &tier.name)?;
        if tier.priority_level > rules.bypass_priority_level {
            return Err(PolicyViolation::Validation(format!(
                "tier priority_level {} exceeds bypass level {}",
                tier.priority_level, rules.bypass_priority_level
            )));
        }
        if self.tiers.values().any(|other| other.id != tier.id && other.name == tier.name) {
            return Err(PolicyViolation::Conflict(format!("tier name {} already in use", tier.name)));
        }
        self.tiers.insert(tier.id.clone(), tier.clone());
        Ok(())
    }

    /// Validates and stores a feature.
    fn upsert_feature(&mut self, feature: &Feature) -> Result<(), PolicyViolation> {
        validate_id("feature id", feature.id.as_str())?;
        validate_name("feature name", &feature.name)?;
        if feature.category.len() > MAX_CATEGORY_LENGTH {
            return Err(PolicyViolation::Validation("feature category exceeds max length".to_string()));
        }
        if self.features.values().any(|other| other.id != feature.id && other.name == feature.name)
        {
            return Err(PolicyViolation::Conflict(format!(
                "feature name {} already in use",
                feature.name
            )));
        }
        self.features.insert(feature.id.clone(), feature.clone());
        Ok(())
    }

    /// Validates and stores a sub-feature.
    fn upsert_sub_feature(&mut self, sub_feature: &SubFeature) -> Result<(), PolicyViolation> {
        validate_id("sub-feature id", sub_feature.id.as_str())?;
        validate_name("sub-feature name", &sub_feature.name)?;
        if !self.features.contains_key(&sub_feature.feature_id) {
            return Err(PolicyViolation::NotFound(format!("feature {}", sub_feature.feature_id)));
        }
        if let Some(existing) = self.sub_features.get(&sub_feature.id)
            && existing.feature_id != sub_feature.feature_id
        {
            return Err(PolicyViolation::Conflict(format!(
                "sub-feature {} belongs to feature {}",
                sub_feature.id, existing.feature_id
            )));
        }
        if self.sub_features.values().any(|other| {
            other.id != sub_feature.id
                && other.feature_id == sub_feature.feature_id
                && other.name == sub_feature.name
        }) {
            return Err(PolicyViolation::Conflict(format!(
                "sub-feature name {} already in use for feature {}",
                sub_feature.name, sub_feature.feature_id
            )));
        }
        self.sub_features.insert(sub_feature.id.clone(), sub_feature.clone());
        Ok(())
    }

    /// Validates and stores an action.
    fn upsert_action(&mut self, action: &Action) -> Result<(), PolicyViolation> {
        validate_id("action id", action.id.as_str())?;
        validate_name("action name", &action.name)?;
        if self.actions.values().any(|other| other.id != action.id && other.name == action.name) {
            return Err(PolicyViolation::Conflict(format!(
                "action name {} already in use",
                action.name
            )));
        }
        self.actions.insert(action.id.clone(), action.clone());
        Ok(())
    }

    /// Validates and stores a grant, overwriting any grant with the same key.
    fn upsert_grant(&mut self, grant: &PermissionGrant) -> Result<(), PolicyViolation> {
        if !self.tiers.contains_key(&grant.tier_id) {
            return Err(PolicyViolation::NotFound(format!("tier {}", grant.tier_id)));
        }
        if !self.features.contains_key(&grant.feature_id) {
            return Err(PolicyViolation::NotFound(format!("feature {}", grant.feature_id)));
        }
        if !self.actions.contains_key(&grant.action_id) {
            return Err(PolicyViolation::NotFound(format!("action {}", grant.action_id)));
        }
        if let Some(sub_feature_id) = &grant.sub_feature_id {
            let sub_feature = self
                .sub_features
                .get(sub_feature_id)
                .ok_or_else(|| PolicyViolation::NotFound(format!("sub-feature {sub_feature_id}")))?;
            if sub_feature.feature_id != grant.feature_id {
                return Err(PolicyViolation::Conflict(format!(
                    "sub-feature {sub_feature_id} does not belong to feature {}",
                    grant.feature_id
                )));
            }
        }
        if let Some(limit) = &grant.usage_limit {
            if !grant.is_granted {
                return Err(PolicyViolation::Conflict(
                    "usage limit cannot be attached to a denied grant".to_string(),
                ));
            }
            if limit.max_uses == Some(0) {
                return Err(PolicyViolation::Validation(
                    "usage limit max_uses must be greater than zero".to_string(),
                ));
            }
        }
        self.grants.insert(grant.key(), grant.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates an identifier string.
fn validate_id(field: &str, value: &str) -> Result<(), PolicyViolation> {
    if value.trim().is_empty() {
        return Err(PolicyViolation::Validation(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(PolicyViolation::Validation(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Validates an entity name.
fn validate_name(field: &str, value: &str) -> Result<(), PolicyViolation> {
    if value.trim().is_empty() {
        return Err(PolicyViolation::Validation(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(PolicyViolation::Validation(format!("{field} exceeds max length")));
    }
    Ok(())
}
