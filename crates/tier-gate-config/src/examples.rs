// crates/tier-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the CLI.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `tier-gate.toml`. The example is validated by the
//! crate's tests so it stays in sync with the config model.

/// Returns a canonical example `tier-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[cache]
ttl_ms = 5000

[resolver]
bypass_priority_level = 100

[quota]
billing_cycle_days = 30
billing_anchor_unix = 0

[policy_store]
type = "sqlite"
path = "tier-gate.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[counter_store]
type = "sqlite"
path = "tier-gate.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[audit]
sink = "stderr"
"#,
    )
}
