// crates/tier-gate-core/src/runtime/enforcer.rs
// ============================================================================
// Module: Tier Gate Quota Enforcer
// Description: Resolves a request and applies usage allowances atomically.
// Purpose: Turn matrix resolutions into bounded, quota-aware decisions.
// Dependencies: crate::{core, interfaces, runtime::resolver}, thiserror, time
// ============================================================================

//! ## Overview
//! The enforcer runs the [`PermissionResolver`] and, when the matched grant
//! carries a finite allowance, performs one conditional increment against the
//! [`UsageCounterStore`]. Denials from the matrix pass through unchanged and
//! never touch the counter store; neither do bypass or unlimited grants.
//!
//! The counter key uses the scope of the grant that matched, so a
//! feature-level allowance is shared by every sub-feature that falls back
//! to it, while a sub-feature grant carries its own counter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::decision::CheckDecision;
use crate::core::decision::ReasonCode;
use crate::core::decision::ResolveRequest;
use crate::core::identifiers::SubjectId;
use crate::core::matrix::PolicyMatrix;
use crate::core::model::GrantScope;
use crate::core::window::WindowConfig;
use crate::core::window::WindowError;
use crate::core::window::retention_cutoff;
use crate::core::window::usage_window;
use crate::interfaces::CounterKey;
use crate::interfaces::CounterStoreError;
use crate::interfaces::IncrementOutcome;
use crate::interfaces::PolicyStoreError;
use crate::interfaces::UsageCounterStore;
use crate::runtime::resolver::PermissionResolver;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Infrastructure failures raised while producing a decision.
///
/// Business outcomes (inactive entity, missing grant, exhausted quota) are
/// reason codes on [`CheckDecision`], never errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// Policy store or counter store failed.
    #[error("permission storage error: {0}")]
    Storage(String),
    /// Usage window could not be computed.
    #[error("permission window error: {0}")]
    Window(String),
    /// Requested tier name is not in the matrix.
    #[error("unknown tier: {0}")]
    UnknownTier(String),
}

impl From<PolicyStoreError> for PermissionError {
    fn from(err: PolicyStoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CounterStoreError> for PermissionError {
    fn from(err: CounterStoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<WindowError> for PermissionError {
    fn from(err: WindowError) -> Self {
        Self::Window(err.to_string())
    }
}

// ============================================================================
// SECTION: Enforcer
// ============================================================================

/// Quota-aware decision maker over matrix snapshots.
pub struct QuotaEnforcer {
    /// Pure grant resolver.
    resolver: PermissionResolver,
    /// Usage counter backend.
    counters: Arc<dyn UsageCounterStore>,
    /// Window alignment settings.
    windows: WindowConfig,
}

impl QuotaEnforcer {
    /// Creates an enforcer.
    #[must_use]
    pub fn new(
        resolver: PermissionResolver,
        counters: Arc<dyn UsageCounterStore>,
        windows: WindowConfig,
    ) -> Self {
        Self {
            resolver,
            counters,
            windows,
        }
    }

    /// Returns the resolver used by this enforcer.
    #[must_use]
    pub const fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Deletes counters for windows that closed before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the cutoff cannot be computed or the
    /// counter store fails.
    pub fn prune_expired(&self, now: OffsetDateTime) -> Result<u64, PermissionError> {
        let cutoff = retention_cutoff(now, &self.windows)?;
        self.counters.prune_before(cutoff).map_err(PermissionError::from)
    }

    /// Decides a request at `now`, consuming one use when a finite allowance
    /// applies and space remains.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the counter store fails or the usage
    /// window cannot be computed.
    pub fn check(
        &self,
        matrix: &PolicyMatrix,
        subject_id: &SubjectId,
        request: ResolveRequest<'_>,
        now: OffsetDateTime,
    ) -> Result<CheckDecision, PermissionError> {
        let resolution = self.resolver.resolve(matrix, request);
        if !resolution.allowed {
            return Ok(CheckDecision::from_resolution(&resolution));
        }
        let Some(limit) = resolution.usage_limit else {
            return Ok(CheckDecision::from_resolution(&resolution));
        };
        let Some(max_uses) = limit.max_uses else {
            return Ok(CheckDecision::from_resolution(&resolution));
        };

        let window = usage_window(limit.timeframe, now, &self.windows)?;
        let sub_feature_id = match resolution.scope {
            Some(GrantScope::SubFeature) => request.sub_feature_id.cloned(),
            Some(GrantScope::Feature) | None => None,
        };
        let key = CounterKey {
            subject_id: subject_id.clone(),
            tier_id: request.tier_id.clone(),
            feature_id: request.feature_id.clone(),
            sub_feature_id,
            action_id: request.action_id.clone(),
            window_start: window.start_unix(),
        };
        let decision = match self.counters.try_increment(&key, max_uses)? {
            IncrementOutcome::Accepted {
                count,
            } => CheckDecision {
                allowed: true,
                remaining: Some(max_uses.saturating_sub(count)),
                reset_at: Some(window.end),
                reason_code: resolution.reason_code,
            },
            IncrementOutcome::Rejected {
                ..
            } => CheckDecision {
                allowed: false,
                remaining: Some(0),
                reset_at: Some(window.end),
                reason_code: ReasonCode::QuotaExceeded,
            },
        };
        Ok(decision)
    }
}
