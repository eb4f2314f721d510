// crates/tier-gate-config/src/lib.rs
// ============================================================================
// Module: Tier Gate Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for tier-gate.toml semantics.
// Dependencies: tier-gate-core, tier-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `tier-gate-config` defines the configuration model for Tier Gate. Loading
//! is strict and fail-closed: oversized, non-utf-8, unknown-key, or
//! inconsistent configuration is rejected before any store is opened.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
