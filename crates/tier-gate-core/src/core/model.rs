// crates/tier-gate-core/src/core/model.rs
// ============================================================================
// Module: Tier Gate Entity Model
// Description: Tiers, features, sub-features, actions, and permission grants.
// Purpose: Provide the tagged-entity model the resolver and stores share.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Policy entities are plain serializable records. Relationships are expressed
//! by identifier only; referential integrity is enforced when mutations are
//! applied (see [`crate::core::policy`]), never by the types themselves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::FeatureId;
use crate::core::identifiers::SubFeatureId;
use crate::core::identifiers::TierId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default reserved priority level marking the unconditional-bypass tier.
pub const DEFAULT_BYPASS_PRIORITY_LEVEL: u32 = 100;

// ============================================================================
// SECTION: Entities
// ============================================================================

/// Membership tier with a privilege rank.
///
/// # Invariants
/// - Higher `priority_level` means more privileged.
/// - `priority_level` never exceeds the configured bypass level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Tier identifier.
    pub id: TierId,
    /// Unique tier name (e.g. `pro_competitor`).
    pub name: String,
    /// Privilege rank.
    pub priority_level: u32,
    /// Whether the tier is active.
    pub is_active: bool,
}

/// Top-level capability grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature identifier.
    pub id: FeatureId,
    /// Unique feature name (e.g. `subwoofer_designer`).
    pub name: String,
    /// Free-form category label.
    pub category: String,
    /// Whether the feature is active.
    pub is_active: bool,
}

/// Finer-grained capability owned by exactly one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFeature {
    /// Sub-feature identifier.
    pub id: SubFeatureId,
    /// Owning feature identifier.
    pub feature_id: FeatureId,
    /// Name, unique within the owning feature.
    pub name: String,
    /// Whether the sub-feature is active.
    pub is_active: bool,
}

/// Operation performable on any feature (view, save, export, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action identifier.
    pub id: ActionId,
    /// Unique action name.
    pub name: String,
    /// Whether the action is active.
    pub is_active: bool,
}

// ============================================================================
// SECTION: Usage Limits
// ============================================================================

/// Recurring window over which usage is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    /// Calendar day (UTC).
    Day,
    /// Week starting Monday 00:00 UTC.
    Week,
    /// Calendar month (UTC).
    Month,
    /// Fixed-length billing cycle aligned to the configured anchor.
    BillingCycle,
}

impl Timeframe {
    /// Every timeframe, shortest first.
    pub const ALL: [Self; 4] = [Self::Day, Self::Week, Self::Month, Self::BillingCycle];

    /// Returns a stable label for the timeframe.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::BillingCycle => "billing_cycle",
        }
    }

    /// Parses a stable label back into a timeframe.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "billing_cycle" => Some(Self::BillingCycle),
            _ => None,
        }
    }
}

/// Cap on how many times a granted action may be performed per window.
///
/// # Invariants
/// - Only attached to grants with `is_granted = true`.
/// - `max_uses = None` means unlimited; `Some(0)` is rejected at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimit {
    /// Maximum uses per window, or `None` for unlimited.
    pub max_uses: Option<u32>,
    /// Window over which uses are counted.
    pub timeframe: Timeframe,
}

// ============================================================================
// SECTION: Grants
// ============================================================================

/// Unique identity of a permission grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GrantKey {
    /// Tier identifier.
    pub tier_id: TierId,
    /// Feature identifier.
    pub feature_id: FeatureId,
    /// Sub-feature identifier for sub-feature scoped grants.
    pub sub_feature_id: Option<SubFeatureId>,
    /// Action identifier.
    pub action_id: ActionId,
}

/// Scope at which a grant is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    /// Grant applies to the whole feature.
    Feature,
    /// Grant applies to one sub-feature and overrides the feature grant.
    SubFeature,
}

/// Recorded allow/deny decision for a tier, feature, optional sub-feature, and action.
///
/// # Invariants
/// - At most one grant exists per [`GrantKey`]; writes are upserts.
/// - `usage_limit` is `None` whenever `is_granted` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Tier identifier.
    pub tier_id: TierId,
    /// Feature identifier.
    pub feature_id: FeatureId,
    /// Sub-feature identifier for sub-feature scoped grants.
    #[serde(default)]
    pub sub_feature_id: Option<SubFeatureId>,
    /// Action identifier.
    pub action_id: ActionId,
    /// Whether the action is granted.
    pub is_granted: bool,
    /// Optional usage allowance.
    #[serde(default)]
    pub usage_limit: Option<UsageLimit>,
}

impl PermissionGrant {
    /// Returns the unique key of this grant.
    #[must_use]
    pub fn key(&self) -> GrantKey {
        GrantKey {
            tier_id: self.tier_id.clone(),
            feature_id: self.feature_id.clone(),
            sub_feature_id: self.sub_feature_id.clone(),
            action_id: self.action_id.clone(),
        }
    }

    /// Returns the scope at which this grant is recorded.
    #[must_use]
    pub const fn scope(&self) -> GrantScope {
        if self.sub_feature_id.is_some() { GrantScope::SubFeature } else { GrantScope::Feature }
    }
}
