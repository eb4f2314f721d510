// crates/tier-gate-core/src/runtime/audit.rs
// ============================================================================
// Module: Tier Gate Audit Logging
// Description: Structured audit events for checks, mutations, and reloads.
// Purpose: Emit JSON-lines audit records without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines audit event payloads and sinks. Events carry
//! identifiers, reason codes, and outcomes only. Deployments route the
//! JSON lines to their preferred logging pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::decision::CheckDecision;
use crate::core::decision::ReasonCode;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome label shared by audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation completed.
    Ok,
    /// Operation failed with an error.
    Error,
}

/// Permission check audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionCheckEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Subject identifier.
    pub subject_id: String,
    /// Requested tier name.
    pub tier: String,
    /// Requested feature name.
    pub feature: String,
    /// Requested sub-feature name when scoped.
    pub sub_feature: Option<String>,
    /// Requested action name.
    pub action: String,
    /// Request outcome.
    pub outcome: AuditOutcome,
    /// Decision flag when a decision was produced.
    pub allowed: Option<bool>,
    /// Reason code when a decision was produced.
    pub reason_code: Option<ReasonCode>,
    /// Remaining uses when a quota was evaluated.
    pub remaining: Option<u32>,
    /// Matrix generation that produced the decision.
    pub matrix_generation: Option<u64>,
    /// Error message for infrastructure failures.
    pub error: Option<String>,
}

/// Inputs required to construct a permission check audit event.
pub struct PermissionCheckEventParams<'a> {
    /// Subject identifier.
    pub subject_id: &'a str,
    /// Requested tier name.
    pub tier: &'a str,
    /// Requested feature name.
    pub feature: &'a str,
    /// Requested sub-feature name when scoped.
    pub sub_feature: Option<&'a str>,
    /// Requested action name.
    pub action: &'a str,
    /// Decision when one was produced.
    pub decision: Option<&'a CheckDecision>,
    /// Matrix generation that produced the decision.
    pub matrix_generation: Option<u64>,
    /// Error message for infrastructure failures.
    pub error: Option<String>,
}

impl PermissionCheckEvent {
    /// Creates a new check audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: PermissionCheckEventParams<'_>) -> Self {
        let outcome = if params.error.is_some() { AuditOutcome::Error } else { AuditOutcome::Ok };
        Self {
            event: "permission_check",
            timestamp_ms: now_millis(),
            subject_id: params.subject_id.to_string(),
            tier: params.tier.to_string(),
            feature: params.feature.to_string(),
            sub_feature: params.sub_feature.map(str::to_string),
            action: params.action.to_string(),
            outcome,
            allowed: params.decision.map(|decision| decision.allowed),
            reason_code: params.decision.map(|decision| decision.reason_code),
            remaining: params.decision.and_then(|decision| decision.remaining),
            matrix_generation: params.matrix_generation,
            error: params.error,
        }
    }
}

/// Policy mutation audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyMutationEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Mutation labels in batch order.
    pub operations: Vec<&'static str>,
    /// Mutation outcome.
    pub outcome: AuditOutcome,
    /// Whether an invalidation signal was published.
    pub invalidated: bool,
    /// Error message when the batch was rejected.
    pub error: Option<String>,
}

impl PolicyMutationEvent {
    /// Creates a new mutation audit event with a consistent timestamp.
    #[must_use]
    pub fn new(operations: Vec<&'static str>, error: Option<String>) -> Self {
        let outcome = if error.is_some() { AuditOutcome::Error } else { AuditOutcome::Ok };
        Self {
            event: "policy_mutation",
            timestamp_ms: now_millis(),
            operations,
            outcome,
            invalidated: error.is_none(),
            error,
        }
    }
}

/// Reason a matrix rebuild ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadTrigger {
    /// No snapshot existed yet.
    Cold,
    /// An invalidation signal was received.
    Invalidated,
    /// The snapshot outlived its TTL.
    TtlExpired,
    /// A caller forced a refresh.
    Forced,
}

/// Matrix reload audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReloadEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Reload trigger.
    pub trigger: ReloadTrigger,
    /// Reload outcome.
    pub outcome: AuditOutcome,
    /// Generation of the new snapshot when the reload succeeded.
    pub generation: Option<u64>,
    /// Hex digest of the new snapshot when the reload succeeded.
    pub digest: Option<String>,
    /// Error message when the reload failed.
    pub error: Option<String>,
}

impl MatrixReloadEvent {
    /// Creates a successful reload event.
    #[must_use]
    pub fn loaded(trigger: ReloadTrigger, generation: u64, digest: String) -> Self {
        Self {
            event: "matrix_reload",
            timestamp_ms: now_millis(),
            trigger,
            outcome: AuditOutcome::Ok,
            generation: Some(generation),
            digest: Some(digest),
            error: None,
        }
    }

    /// Creates a failed reload event.
    #[must_use]
    pub fn failed(trigger: ReloadTrigger, error: String) -> Self {
        Self {
            event: "matrix_reload",
            timestamp_ms: now_millis(),
            trigger,
            outcome: AuditOutcome::Error,
            generation: None,
            digest: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for permission engine events.
pub trait PermissionAuditSink: Send + Sync {
    /// Records a permission check event.
    fn record_check(&self, event: &PermissionCheckEvent);

    /// Records a policy mutation event.
    fn record_mutation(&self, _event: &PolicyMutationEvent) {}

    /// Records a matrix reload event.
    fn record_reload(&self, _event: &MatrixReloadEvent) {}
}

/// Audit sink that discards every event.
pub struct NoopAuditSink;

impl PermissionAuditSink for NoopAuditSink {
    fn record_check(&self, _event: &PermissionCheckEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl PermissionAuditSink for StderrAuditSink {
    fn record_check(&self, event: &PermissionCheckEvent) {
        write_stderr_json(event);
    }

    fn record_mutation(&self, event: &PolicyMutationEvent) {
        write_stderr_json(event);
    }

    fn record_reload(&self, event: &MatrixReloadEvent) {
        write_stderr_json(event);
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Serializes and appends one event.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl PermissionAuditSink for FileAuditSink {
    fn record_check(&self, event: &PermissionCheckEvent) {
        self.append(event);
    }

    fn record_mutation(&self, event: &PolicyMutationEvent) {
        self.append(event);
    }

    fn record_reload(&self, event: &MatrixReloadEvent) {
        self.append(event);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes one JSON line to stderr, dropping serialization failures.
fn write_stderr_json<T: Serialize>(event: &T) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(std::io::stderr(), "{payload}");
    }
}

/// Returns the current unix epoch in milliseconds.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
