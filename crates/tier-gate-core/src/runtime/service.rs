// crates/tier-gate-core/src/runtime/service.rs
// ============================================================================
// Module: Tier Gate Permission Service
// Description: Name-level Resolution API and Matrix Describe API.
// Purpose: Front the matrix cache and quota enforcer for application code.
// Dependencies: crate::{core, interfaces, runtime}, serde
// ============================================================================

//! ## Overview
//! [`PermissionService`] accepts human-readable names, resolves them against
//! the current matrix snapshot, and delegates to the [`QuotaEnforcer`].
//! Names missing from the snapshot resolve to `UNKNOWN_ENTITY` denials.
//! Every check outcome, including infrastructure failures, is audited.
//!
//! `describe_tier` renders the effective cell for every feature, sub-feature,
//! and action of one tier without touching usage counters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::core::decision::CheckDecision;
use crate::core::decision::ReasonCode;
use crate::core::decision::Resolution;
use crate::core::decision::ResolveRequest;
use crate::core::identifiers::FeatureId;
use crate::core::identifiers::SubFeatureId;
use crate::core::identifiers::SubjectId;
use crate::core::identifiers::TierId;
use crate::core::matrix::PolicyMatrix;
use crate::interfaces::Clock;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::PermissionAuditSink;
use crate::runtime::audit::PermissionCheckEvent;
use crate::runtime::audit::PermissionCheckEventParams;
use crate::runtime::cache::MatrixCache;
use crate::runtime::enforcer::PermissionError;
use crate::runtime::enforcer::QuotaEnforcer;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Name-level permission check request.
#[derive(Debug, Clone, Copy)]
pub struct CheckRequest<'a> {
    /// Subject performing the action.
    pub subject_id: &'a str,
    /// Tier name.
    pub tier: &'a str,
    /// Feature name.
    pub feature: &'a str,
    /// Sub-feature name, scoped to the feature.
    pub sub_feature: Option<&'a str>,
    /// Action name.
    pub action: &'a str,
}

// ============================================================================
// SECTION: Describe Views
// ============================================================================

/// Effective permission matrix for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierMatrixView {
    /// Tier identifier.
    pub tier_id: TierId,
    /// Tier name.
    pub tier: String,
    /// Tier priority level.
    pub priority_level: u32,
    /// Whether the tier is active.
    pub is_active: bool,
    /// Matrix generation the view was computed from.
    pub generation: u64,
    /// Hex digest of the matrix the view was computed from.
    pub digest: String,
    /// Features keyed by name.
    pub features: BTreeMap<String, FeatureMatrixView>,
}

/// Effective cells for one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureMatrixView {
    /// Feature identifier.
    pub feature_id: FeatureId,
    /// Whether the feature is active.
    pub is_active: bool,
    /// Feature-scope cells keyed by action name.
    pub actions: BTreeMap<String, Resolution>,
    /// Sub-feature views keyed by sub-feature name.
    pub sub_features: BTreeMap<String, SubFeatureMatrixView>,
}

/// Effective cells for one sub-feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubFeatureMatrixView {
    /// Sub-feature identifier.
    pub sub_feature_id: SubFeatureId,
    /// Whether the sub-feature is active.
    pub is_active: bool,
    /// Sub-feature-scope cells keyed by action name.
    pub actions: BTreeMap<String, Resolution>,
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Resolution and describe entry point for application code.
pub struct PermissionService {
    /// Shared matrix cache.
    cache: Arc<MatrixCache>,
    /// Quota enforcer.
    enforcer: QuotaEnforcer,
    /// Wall clock used for usage windows.
    clock: Arc<dyn Clock>,
    /// Audit sink for check events.
    audit: Arc<dyn PermissionAuditSink>,
}

impl PermissionService {
    /// Creates a service without audit logging.
    #[must_use]
    pub fn new(cache: Arc<MatrixCache>, enforcer: QuotaEnforcer, clock: Arc<dyn Clock>) -> Self {
        Self::with_audit(cache, enforcer, clock, Arc::new(NoopAuditSink))
    }

    /// Creates a service with an audit sink.
    #[must_use]
    pub fn with_audit(
        cache: Arc<MatrixCache>,
        enforcer: QuotaEnforcer,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn PermissionAuditSink>,
    ) -> Self {
        Self {
            cache,
            enforcer,
            clock,
            audit,
        }
    }

    /// Returns the matrix cache backing this service.
    #[must_use]
    pub const fn cache(&self) -> &Arc<MatrixCache> {
        &self.cache
    }

    /// Checks whether a subject may perform an action now.
    ///
    /// Allowed checks against a finite allowance consume one use; callers
    /// must call this exactly once per attempted use.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the policy store or counter store
    /// fails. Callers must treat an error as a denial.
    pub fn check(&self, request: CheckRequest<'_>) -> Result<CheckDecision, PermissionError> {
        let outcome = self.check_inner(request);
        let (decision, matrix_generation, error) = match &outcome {
            Ok((decision, generation)) => (Some(decision), Some(*generation), None),
            Err(err) => (None, None, Some(err.to_string())),
        };
        self.audit.record_check(&PermissionCheckEvent::new(PermissionCheckEventParams {
            subject_id: request.subject_id,
            tier: request.tier,
            feature: request.feature,
            sub_feature: request.sub_feature,
            action: request.action,
            decision,
            matrix_generation,
            error,
        }));
        outcome.map(|(decision, _)| decision)
    }

    /// Deletes usage counters whose windows have closed.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] when the counter store fails.
    pub fn prune_expired_counters(&self) -> Result<u64, PermissionError> {
        self.enforcer.prune_expired(self.clock.now())
    }

    /// Describes the effective permission matrix of a tier.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::UnknownTier`] for unknown tier names and
    /// [`PermissionError::Storage`] when the matrix cannot be loaded.
    pub fn describe_tier(&self, tier_name: &str) -> Result<TierMatrixView, PermissionError> {
        let matrix = self.cache.snapshot()?;
        let tier = matrix
            .tier_by_name(tier_name)
            .ok_or_else(|| PermissionError::UnknownTier(tier_name.to_string()))?;
        let resolver = self.enforcer.resolver();
        let cells = |feature_id: &FeatureId, sub_feature_id: Option<&SubFeatureId>| {
            matrix
                .actions()
                .map(|action| {
                    let resolution = resolver.resolve(&matrix, ResolveRequest {
                        tier_id: &tier.id,
                        feature_id,
                        sub_feature_id,
                        action_id: &action.id,
                    });
                    (action.name.clone(), resolution)
                })
                .collect::<BTreeMap<_, _>>()
        };

        let mut features = BTreeMap::new();
        for feature in matrix.features() {
            let sub_features = matrix
                .sub_features_of(&feature.id)
                .map(|sub| {
                    (sub.name.clone(), SubFeatureMatrixView {
                        sub_feature_id: sub.id.clone(),
                        is_active: sub.is_active,
                        actions: cells(&feature.id, Some(&sub.id)),
                    })
                })
                .collect();
            features.insert(feature.name.clone(), FeatureMatrixView {
                feature_id: feature.id.clone(),
                is_active: feature.is_active,
                actions: cells(&feature.id, None),
                sub_features,
            });
        }

        Ok(TierMatrixView {
            tier_id: tier.id.clone(),
            tier: tier.name.clone(),
            priority_level: tier.priority_level,
            is_active: tier.is_active,
            generation: matrix.generation(),
            digest: matrix.digest().value.clone(),
            features,
        })
    }

    /// Runs a check and returns the decision with its matrix generation.
    fn check_inner(
        &self,
        request: CheckRequest<'_>,
    ) -> Result<(CheckDecision, u64), PermissionError> {
        let matrix = self.cache.snapshot()?;
        let generation = matrix.generation();
        let Some(resolve) = resolve_names(&matrix, &request) else {
            let denial = Resolution::denied(ReasonCode::UnknownEntity);
            return Ok((CheckDecision::from_resolution(&denial), generation));
        };
        let subject_id = SubjectId::new(request.subject_id);
        let decision = self.enforcer.check(&matrix, &subject_id, resolve, self.clock.now())?;
        Ok((decision, generation))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps request names to identifiers in the snapshot.
fn resolve_names<'m>(
    matrix: &'m PolicyMatrix,
    request: &CheckRequest<'_>,
) -> Option<ResolveRequest<'m>> {
    let tier = matrix.tier_by_name(request.tier)?;
    let feature = matrix.feature_by_name(request.feature)?;
    let action = matrix.action_by_name(request.action)?;
    let sub_feature_id = match request.sub_feature {
        None => None,
        Some(name) => Some(&matrix.sub_feature_by_name(&feature.id, name)?.id),
    };
    Some(ResolveRequest {
        tier_id: &tier.id,
        feature_id: &feature.id,
        sub_feature_id,
        action_id: &action.id,
    })
}
