// crates/tier-gate-core/src/core/decision.rs
// ============================================================================
// Module: Tier Gate Decisions
// Description: Resolution requests, reason codes, and decision payloads.
// Purpose: Represent every expected business outcome as data, not errors.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Expected outcomes (inactive entity, no grant, quota exhausted) are reason
//! codes on a decision. Only infrastructure failures surface as errors, so
//! callers can render distinct messages for each denial cause.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::ActionId;
use crate::core::identifiers::FeatureId;
use crate::core::identifiers::SubFeatureId;
use crate::core::identifiers::TierId;
use crate::core::model::GrantScope;
use crate::core::model::UsageLimit;

// ============================================================================
// SECTION: Reason Codes
// ============================================================================

/// Reason attached to every decision.
///
/// # Invariants
/// - Variants and labels are stable for callers and audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Bypass tier; granted unconditionally without quota tracking.
    Bypass,
    /// Explicit grant allows the action.
    Granted,
    /// Explicit grant denies the action.
    Denied,
    /// Tier, feature, sub-feature, or action is inactive.
    InactiveEntity,
    /// No grant recorded at either scope.
    NoGrant,
    /// Referenced entity is missing from the matrix.
    UnknownEntity,
    /// Usage allowance for the current window is exhausted.
    QuotaExceeded,
}

impl ReasonCode {
    /// Returns a stable label for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bypass => "BYPASS",
            Self::Granted => "GRANTED",
            Self::Denied => "DENIED",
            Self::InactiveEntity => "INACTIVE_ENTITY",
            Self::NoGrant => "NO_GRANT",
            Self::UnknownEntity => "UNKNOWN_ENTITY",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
        }
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Identifier-level resolution request.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    /// Tier identifier.
    pub tier_id: &'a TierId,
    /// Feature identifier.
    pub feature_id: &'a FeatureId,
    /// Optional sub-feature identifier.
    pub sub_feature_id: Option<&'a SubFeatureId>,
    /// Action identifier.
    pub action_id: &'a ActionId,
}

/// Pure resolver outcome.
///
/// # Invariants
/// - `usage_limit` is `None` unless `allowed` is true.
/// - `scope` is set only when a grant record decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Whether the action is permitted by the matrix.
    pub allowed: bool,
    /// Usage allowance carried by the matched grant.
    pub usage_limit: Option<UsageLimit>,
    /// Reason for the outcome.
    pub reason_code: ReasonCode,
    /// Scope of the grant that decided the outcome.
    pub scope: Option<GrantScope>,
}

impl Resolution {
    /// Builds a denial that no grant record decided.
    #[must_use]
    pub const fn denied(reason_code: ReasonCode) -> Self {
        Self {
            allowed: false,
            usage_limit: None,
            reason_code,
            scope: None,
        }
    }
}

// ============================================================================
// SECTION: Check Decision
// ============================================================================

/// Bounded decision returned by the quota enforcer.
///
/// # Invariants
/// - `remaining` is `None` for unlimited grants and for denials decided by the matrix.
/// - `reset_at` is set whenever a usage window was evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDecision {
    /// Whether the caller may perform the action now.
    pub allowed: bool,
    /// Remaining uses in the current window after this call.
    pub remaining: Option<u32>,
    /// End of the current usage window.
    #[serde(with = "time::serde::rfc3339::option")]
    pub reset_at: Option<OffsetDateTime>,
    /// Reason for the outcome.
    pub reason_code: ReasonCode,
}

impl CheckDecision {
    /// Lifts a matrix-only resolution into a decision without quota data.
    #[must_use]
    pub const fn from_resolution(resolution: &Resolution) -> Self {
        Self {
            allowed: resolution.allowed,
            remaining: None,
            reset_at: None,
            reason_code: resolution.reason_code,
        }
    }
}
