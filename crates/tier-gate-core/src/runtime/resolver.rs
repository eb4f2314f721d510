// crates/tier-gate-core/src/runtime/resolver.rs
// ============================================================================
// Module: Tier Gate Permission Resolver
// Description: Pure grant resolution over a policy matrix snapshot.
// Purpose: Combine bypass rules, activity checks, and override precedence.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The resolver is a pure function of a [`PolicyMatrix`] snapshot and a
//! request. It performs no I/O and never fails: unknown or inactive entities
//! and missing grants resolve to denials with distinct reason codes.
//!
//! Evaluation order:
//! 1. Unknown entity (or sub-feature owned by another feature): deny.
//! 2. Bypass tier with every referenced entity active: allow, no limit.
//! 3. Any referenced entity inactive: deny.
//! 4. Sub-feature grant, when present, decides alone.
//! 5. Otherwise the feature grant decides.
//! 6. No grant at either scope: deny (fail closed).

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::decision::ReasonCode;
use crate::core::decision::Resolution;
use crate::core::decision::ResolveRequest;
use crate::core::matrix::PolicyMatrix;
use crate::core::model::DEFAULT_BYPASS_PRIORITY_LEVEL;
use crate::core::model::GrantKey;
use crate::core::model::PermissionGrant;

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Pure permission resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionResolver {
    /// Priority level reserved for the bypass tier.
    bypass_priority_level: u32,
}

impl Default for PermissionResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BYPASS_PRIORITY_LEVEL)
    }
}

impl PermissionResolver {
    /// Creates a resolver using the given bypass priority level.
    #[must_use]
    pub const fn new(bypass_priority_level: u32) -> Self {
        Self {
            bypass_priority_level,
        }
    }

    /// Returns the bypass priority level.
    #[must_use]
    pub const fn bypass_priority_level(&self) -> u32 {
        self.bypass_priority_level
    }

    /// Resolves a request against a matrix snapshot.
    #[must_use]
    pub fn resolve(&self, matrix: &PolicyMatrix, request: ResolveRequest<'_>) -> Resolution {
        let (Some(tier), Some(feature), Some(action)) = (
            matrix.tier(request.tier_id),
            matrix.feature(request.feature_id),
            matrix.action(request.action_id),
        ) else {
            return Resolution::denied(ReasonCode::UnknownEntity);
        };
        let sub_feature = match request.sub_feature_id {
            None => None,
            Some(id) => match matrix.sub_feature(id) {
                Some(sub) if sub.feature_id == feature.id => Some(sub),
                _ => return Resolution::denied(ReasonCode::UnknownEntity),
            },
        };

        let all_active = tier.is_active
            && feature.is_active
            && action.is_active
            && sub_feature.is_none_or(|sub| sub.is_active);

        if tier.priority_level == self.bypass_priority_level && all_active {
            return Resolution {
                allowed: true,
                usage_limit: None,
                reason_code: ReasonCode::Bypass,
                scope: None,
            };
        }
        if !all_active {
            return Resolution::denied(ReasonCode::InactiveEntity);
        }

        let feature_key = GrantKey {
            tier_id: tier.id.clone(),
            feature_id: feature.id.clone(),
            sub_feature_id: None,
            action_id: action.id.clone(),
        };
        let sub_feature_grant = sub_feature.and_then(|sub| {
            matrix.grant(&GrantKey {
                sub_feature_id: Some(sub.id.clone()),
                ..feature_key.clone()
            })
        });
        match sub_feature_grant.or_else(|| matrix.grant(&feature_key)) {
            Some(grant) => resolution_from_grant(grant),
            None => Resolution::denied(ReasonCode::NoGrant),
        }
    }
}

/// Converts a matched grant into a resolution.
const fn resolution_from_grant(grant: &PermissionGrant) -> Resolution {
    if grant.is_granted {
        Resolution {
            allowed: true,
            usage_limit: grant.usage_limit,
            reason_code: ReasonCode::Granted,
            scope: Some(grant.scope()),
        }
    } else {
        Resolution {
            allowed: false,
            usage_limit: None,
            reason_code: ReasonCode::Denied,
            scope: Some(grant.scope()),
        }
    }
}
