// crates/tier-gate-core/src/core/mod.rs
// ============================================================================
// Module: Tier Gate Core Types
// Description: Canonical policy entities, snapshots, decisions, and windows.
// Purpose: Provide stable, serializable types shared by every backend.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Core types define the tagged-entity policy model, the mutation model used
//! by administrators, the immutable matrix snapshot, decision payloads, and
//! fixed-epoch usage windows. They perform no I/O.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod decision;
pub mod hashing;
pub mod identifiers;
pub mod matrix;
pub mod model;
pub mod policy;
pub mod window;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use decision::CheckDecision;
pub use decision::ReasonCode;
pub use decision::Resolution;
pub use decision::ResolveRequest;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::ActionId;
pub use identifiers::FeatureId;
pub use identifiers::SubFeatureId;
pub use identifiers::SubjectId;
pub use identifiers::TierId;
pub use matrix::PolicyMatrix;
pub use model::Action;
pub use model::DEFAULT_BYPASS_PRIORITY_LEVEL;
pub use model::Feature;
pub use model::GrantKey;
pub use model::GrantScope;
pub use model::PermissionGrant;
pub use model::SubFeature;
pub use model::Tier;
pub use model::Timeframe;
pub use model::UsageLimit;
pub use policy::PolicyMutation;
pub use policy::PolicyRecords;
pub use policy::PolicyRules;
pub use policy::PolicyViolation;
pub use window::UsageWindow;
pub use window::WindowConfig;
pub use window::WindowError;
pub use window::retention_cutoff;
pub use window::usage_window;
