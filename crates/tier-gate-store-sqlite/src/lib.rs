// crates/tier-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Policy and Counter Stores
// Description: Durable PolicyStore and UsageCounterStore backends using SQLite.
// Purpose: Persist tier policy and usage counters with storage-level uniqueness.
// Dependencies: tier-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides `SQLite`-backed [`PolicyStore`] and
//! [`UsageCounterStore`] implementations. Both share one schema, so they may
//! point at the same database file. Grant keys and counter keys are primary
//! keys, and the quota check-and-increment is a single conditional upsert.
//!
//! [`PolicyStore`]: tier_gate_core::PolicyStore
//! [`UsageCounterStore`]: tier_gate_core::UsageCounterStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod counters;
pub mod policy;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use counters::SqliteUsageCounterStore;
pub use policy::SqlitePolicyStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
