// crates/tier-gate-store-sqlite/src/counters.rs
// ============================================================================
// Module: SQLite Usage Counter Store
// Description: Durable atomic usage counters backed by SQLite.
// Purpose: Enforce usage quotas across threads and processes.
// Dependencies: tier-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! Each increment is a single conditional upsert inside an immediate
//! transaction. The `WHERE count < max` guard on the conflict branch makes
//! the check and the increment one statement, so concurrent writers (in this
//! process or another one sharing the file) never exceed the limit.
//! Rows for past windows stay until [`UsageCounterStore::prune_before`]
//! removes them; an index on `window_start` keeps that delete cheap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tier_gate_core::CounterKey;
use tier_gate_core::CounterStoreError;
use tier_gate_core::IncrementOutcome;
use tier_gate_core::UsageCounterStore;

use crate::store::SqliteStoreConfig;
use crate::store::SqliteStoreError;
use crate::store::db_error;
use crate::store::encode_sub_feature;
use crate::store::open_store;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed usage counter store.
#[derive(Clone)]
pub struct SqliteUsageCounterStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteUsageCounterStore {
    /// Opens a counter store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Ok(Self {
            connection: open_store(config)?,
        })
    }

    /// Runs the conditional increment.
    fn increment(
        &self,
        key: &CounterKey,
        max_uses: u32,
    ) -> Result<IncrementOutcome, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let incremented: Option<i64> = tx
            .query_row(
                "INSERT INTO usage_counters (subject_id, tier_id, feature_id, sub_feature_id, \
                 action_id, window_start, count) SELECT ?1, ?2, ?3, ?4, ?5, ?6, 1 WHERE ?7 > 0 \
                 ON CONFLICT(subject_id, tier_id, feature_id, sub_feature_id, action_id, \
                 window_start) DO UPDATE SET count = count + 1 WHERE usage_counters.count < ?7 \
                 RETURNING count",
                params![
                    key.subject_id.as_str(),
                    key.tier_id.as_str(),
                    key.feature_id.as_str(),
                    encode_sub_feature(key.sub_feature_id.as_ref()),
                    key.action_id.as_str(),
                    key.window_start,
                    i64::from(max_uses),
                ],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        let outcome = match incremented {
            Some(count) => IncrementOutcome::Accepted {
                count: decode_count(count)?,
            },
            None => IncrementOutcome::Rejected {
                count: read_count(&tx, key)?,
            },
        };
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(outcome)
    }

    /// Deletes every counter whose window starts before `window_start`.
    fn prune(&self, window_start: i64) -> Result<u64, SqliteStoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let removed = guard
            .execute("DELETE FROM usage_counters WHERE window_start < ?1", params![window_start])
            .map_err(db_error)?;
        drop(guard);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    /// Reads the current count.
    fn read(&self, key: &CounterKey) -> Result<u32, SqliteStoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let count = read_count(&guard, key)?;
        drop(guard);
        Ok(count)
    }
}

impl UsageCounterStore for SqliteUsageCounterStore {
    fn try_increment(
        &self,
        key: &CounterKey,
        max_uses: u32,
    ) -> Result<IncrementOutcome, CounterStoreError> {
        self.increment(key, max_uses).map_err(CounterStoreError::from)
    }

    fn current(&self, key: &CounterKey) -> Result<u32, CounterStoreError> {
        self.read(key).map_err(CounterStoreError::from)
    }

    fn prune_before(&self, window_start: i64) -> Result<u64, CounterStoreError> {
        self.prune(window_start).map_err(CounterStoreError::from)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a counter row, treating a missing row as zero.
fn read_count(conn: &Connection, key: &CounterKey) -> Result<u32, SqliteStoreError> {
    let count: Option<i64> = conn
        .query_row(
            "SELECT count FROM usage_counters WHERE subject_id = ?1 AND tier_id = ?2 AND \
             feature_id = ?3 AND sub_feature_id = ?4 AND action_id = ?5 AND window_start = ?6",
            params![
                key.subject_id.as_str(),
                key.tier_id.as_str(),
                key.feature_id.as_str(),
                encode_sub_feature(key.sub_feature_id.as_ref()),
                key.action_id.as_str(),
                key.window_start,
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_error)?;
    count.map_or(Ok(0), decode_count)
}

/// Converts a stored count into `u32`.
fn decode_count(count: i64) -> Result<u32, SqliteStoreError> {
    u32::try_from(count)
        .map_err(|_| SqliteStoreError::Invalid(format!("usage counter out of range: {count}")))
}
