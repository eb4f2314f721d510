// crates/tier-gate-cli/src/lib.rs
// ============================================================================
// Module: Tier Gate CLI Library
// Description: Shared wiring for the tier-gate binary.
// Purpose: Expose engine composition for the CLI and its tests.
// Dependencies: tier-gate-config, tier-gate-core, tier-gate-store-sqlite
// ============================================================================

//! ## Overview
//! The `tier-gate` binary is a thin dispatcher; engine composition lives here
//! so it can be exercised without spawning a process.

pub mod wiring;

pub use wiring::Engine;
pub use wiring::WiringError;
