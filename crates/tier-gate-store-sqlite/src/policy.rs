// crates/tier-gate-store-sqlite/src/policy.rs
// ============================================================================
// Module: SQLite Policy Store
// Description: Durable PolicyStore backed by SQLite tables.
// Purpose: Persist tiers, features, sub-features, actions, and grants.
// Dependencies: tier-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! Each mutation batch runs in one immediate transaction: the current tables
//! are loaded, the batch is validated by [`PolicyRecords::apply_all`], and
//! only then are the equivalent statements executed. A rejected batch rolls
//! back without touching any row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use tier_gate_core::Action;
use tier_gate_core::ActionId;
use tier_gate_core::Feature;
use tier_gate_core::FeatureId;
use tier_gate_core::GrantKey;
use tier_gate_core::PermissionGrant;
use tier_gate_core::PolicyMutation;
use tier_gate_core::PolicyRecords;
use tier_gate_core::PolicyRules;
use tier_gate_core::PolicyStore;
use tier_gate_core::PolicyStoreError;
use tier_gate_core::SubFeature;
use tier_gate_core::SubFeatureId;
use tier_gate_core::Tier;
use tier_gate_core::TierId;
use tier_gate_core::Timeframe;
use tier_gate_core::UsageLimit;

use crate::store::SqliteStoreConfig;
use crate::store::SqliteStoreError;
use crate::store::db_error;
use crate::store::decode_sub_feature;
use crate::store::encode_sub_feature;
use crate::store::open_store;

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed policy store.
#[derive(Clone)]
pub struct SqlitePolicyStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
    /// Write-time validation rules.
    rules: PolicyRules,
}

impl SqlitePolicyStore {
    /// Opens a policy store with default rules.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        Self::with_rules(config, PolicyRules::default())
    }

    /// Opens a policy store with explicit rules.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn with_rules(
        config: &SqliteStoreConfig,
        rules: PolicyRules,
    ) -> Result<Self, SqliteStoreError> {
        Ok(Self {
            connection: open_store(config)?,
            rules,
        })
    }

    /// Loads every policy table in one read transaction.
    fn load_records(&self) -> Result<PolicyRecords, SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(db_error)?;
        let records = read_records(&tx)?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(records)
    }

    /// Validates and persists a mutation batch atomically.
    fn apply_batch(&self, mutations: &[PolicyMutation]) -> Result<(), SqliteStoreError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        let tx =
            guard.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
        let mut working = read_records(&tx)?;
        working.apply_all(mutations, self.rules).map_err(SqliteStoreError::Rejected)?;
        for mutation in mutations {
            write_mutation(&tx, mutation)?;
        }
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }
}

impl PolicyStore for SqlitePolicyStore {
    fn load_matrix(&self) -> Result<PolicyRecords, PolicyStoreError> {
        self.load_records().map_err(PolicyStoreError::from)
    }

    fn apply_mutations(&self, mutations: &[PolicyMutation]) -> Result<(), PolicyStoreError> {
        self.apply_batch(mutations).map_err(PolicyStoreError::from)
    }
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Reads all policy tables.
fn read_records(conn: &Connection) -> Result<PolicyRecords, SqliteStoreError> {
    let mut records = PolicyRecords::default();

    let mut stmt = conn
        .prepare("SELECT tier_id, name, priority_level, is_active FROM tiers")
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })
        .map_err(db_error)?;
    for row in rows {
        let (id, name, priority_level, is_active) = row.map_err(db_error)?;
        let priority_level = u32::try_from(priority_level).map_err(|_| {
            SqliteStoreError::Invalid(format!("tier {id} has out-of-range priority_level"))
        })?;
        let tier = Tier {
            id: TierId::new(id),
            name,
            priority_level,
            is_active,
        };
        records.tiers.insert(tier.id.clone(), tier);
    }

    let mut stmt = conn
        .prepare("SELECT feature_id, name, category, is_active FROM features")
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![], |row| {
            Ok(Feature {
                id: FeatureId::new(row.get::<_, String>(0)?),
                name: row.get(1)?,
                category: row.get(2)?,
                is_active: row.get(3)?,
            })
        })
        .map_err(db_error)?;
    for row in rows {
        let feature = row.map_err(db_error)?;
        records.features.insert(feature.id.clone(), feature);
    }

    let mut stmt = conn
        .prepare("SELECT sub_feature_id, feature_id, name, is_active FROM sub_features")
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![], |row| {
            Ok(SubFeature {
                id: SubFeatureId::new(row.get::<_, String>(0)?),
                feature_id: FeatureId::new(row.get::<_, String>(1)?),
                name: row.get(2)?,
                is_active: row.get(3)?,
            })
        })
        .map_err(db_error)?;
    for row in rows {
        let sub_feature = row.map_err(db_error)?;
        records.sub_features.insert(sub_feature.id.clone(), sub_feature);
    }

    let mut stmt =
        conn.prepare("SELECT action_id, name, is_active FROM actions").map_err(db_error)?;
    let rows = stmt
        .query_map(params![], |row| {
            Ok(Action {
                id: ActionId::new(row.get::<_, String>(0)?),
                name: row.get(1)?,
                is_active: row.get(2)?,
            })
        })
        .map_err(db_error)?;
    for row in rows {
        let action = row.map_err(db_error)?;
        records.actions.insert(action.id.clone(), action);
    }

    let mut stmt = conn
        .prepare(
            "SELECT tier_id, feature_id, sub_feature_id, action_id, is_granted, max_uses, \
             timeframe FROM permission_grants",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(params![], |row| {
            Ok(GrantRow {
                tier_id: row.get(0)?,
                feature_id: row.get(1)?,
                sub_feature_id: row.get(2)?,
                action_id: row.get(3)?,
                is_granted: row.get(4)?,
                max_uses: row.get(5)?,
                timeframe: row.get(6)?,
            })
        })
        .map_err(db_error)?;
    for row in rows {
        let grant = row.map_err(db_error)?.into_grant()?;
        records.grants.insert(grant.key(), grant);
    }

    Ok(records)
}

/// Raw grant row prior to validation.
struct GrantRow {
    /// Tier identifier column.
    tier_id: String,
    /// Feature identifier column.
    feature_id: String,
    /// Sub-feature key column (empty for feature scope).
    sub_feature_id: String,
    /// Action identifier column.
    action_id: String,
    /// Granted flag column.
    is_granted: bool,
    /// Max uses column.
    max_uses: Option<i64>,
    /// Timeframe label column.
    timeframe: Option<String>,
}

impl GrantRow {
    /// Decodes the row into a grant, failing closed on invalid limits.
    fn into_grant(self) -> Result<PermissionGrant, SqliteStoreError> {
        let usage_limit = match (self.timeframe, self.max_uses) {
            (None, None) => None,
            (None, Some(_)) => {
                return Err(SqliteStoreError::Invalid(format!(
                    "grant for tier {} has max_uses without timeframe",
                    self.tier_id
                )));
            }
            (Some(label), max_uses) => {
                let timeframe = Timeframe::parse(&label).ok_or_else(|| {
                    SqliteStoreError::Invalid(format!("unsupported timeframe: {label}"))
                })?;
                let max_uses = max_uses
                    .map(|value| {
                        u32::try_from(value)
                            .ok()
                            .filter(|value| *value > 0)
                            .ok_or_else(|| SqliteStoreError::Invalid("invalid max_uses".to_string()))
                    })
                    .transpose()?;
                Some(UsageLimit {
                    max_uses,
                    timeframe,
                })
            }
        };
        Ok(PermissionGrant {
            tier_id: TierId::new(self.tier_id),
            feature_id: FeatureId::new(self.feature_id),
            sub_feature_id: decode_sub_feature(self.sub_feature_id),
            action_id: ActionId::new(self.action_id),
            is_granted: self.is_granted,
            usage_limit,
        })
    }
}

// ============================================================================
// SECTION: Writes
// ============================================================================

/// Executes the statements for one validated mutation.
fn write_mutation(conn: &Connection, mutation: &PolicyMutation) -> Result<(), SqliteStoreError> {
    let result = match mutation {
        PolicyMutation::UpsertTier(tier) => conn.execute(
            "INSERT INTO tiers (tier_id, name, priority_level, is_active) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(tier_id) DO UPDATE SET name = excluded.name, priority_level = \
             excluded.priority_level, is_active = excluded.is_active",
            params![tier.id.as_str(), tier.name, i64::from(tier.priority_level), tier.is_active],
        ),
        PolicyMutation::DeactivateTier {
            id,
        } => conn.execute("UPDATE tiers SET is_active = 0 WHERE tier_id = ?1", params![id.as_str()]),
        PolicyMutation::UpsertFeature(feature) => conn.execute(
            "INSERT INTO features (feature_id, name, category, is_active) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(feature_id) DO UPDATE SET name = excluded.name, category = \
             excluded.category, is_active = excluded.is_active",
            params![feature.id.as_str(), feature.name, feature.category, feature.is_active],
        ),
        PolicyMutation::DeactivateFeature {
            id,
        } => conn.execute(
            "UPDATE features SET is_active = 0 WHERE feature_id = ?1",
            params![id.as_str()],
        ),
        PolicyMutation::UpsertSubFeature(sub_feature) => conn.execute(
            "INSERT INTO sub_features (sub_feature_id, feature_id, name, is_active) VALUES (?1, \
             ?2, ?3, ?4) ON CONFLICT(sub_feature_id) DO UPDATE SET name = excluded.name, \
             is_active = excluded.is_active",
            params![
                sub_feature.id.as_str(),
                sub_feature.feature_id.as_str(),
                sub_feature.name,
                sub_feature.is_active
            ],
        ),
        PolicyMutation::DeactivateSubFeature {
            id,
        } => conn.execute(
            "UPDATE sub_features SET is_active = 0 WHERE sub_feature_id = ?1",
            params![id.as_str()],
        ),
        PolicyMutation::UpsertAction(action) => conn.execute(
            "INSERT INTO actions (action_id, name, is_active) VALUES (?1, ?2, ?3) ON \
             CONFLICT(action_id) DO UPDATE SET name = excluded.name, is_active = excluded.is_active",
            params![action.id.as_str(), action.name, action.is_active],
        ),
        PolicyMutation::DeactivateAction {
            id,
        } => conn.execute(
            "UPDATE actions SET is_active = 0 WHERE action_id = ?1",
            params![id.as_str()],
        ),
        PolicyMutation::UpsertGrant(grant) => conn.execute(
            "INSERT INTO permission_grants (tier_id, feature_id, sub_feature_id, action_id, \
             is_granted, max_uses, timeframe) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) ON \
             CONFLICT(tier_id, feature_id, sub_feature_id, action_id) DO UPDATE SET is_granted \
             = excluded.is_granted, max_uses = excluded.max_uses, timeframe = excluded.timeframe",
            params![
                grant.tier_id.as_str(),
                grant.feature_id.as_str(),
                encode_sub_feature(grant.sub_feature_id.as_ref()),
                grant.action_id.as_str(),
                grant.is_granted,
                grant.usage_limit.and_then(|limit| limit.max_uses).map(i64::from),
                grant.usage_limit.map(|limit| limit.timeframe.as_str()),
            ],
        ),
        PolicyMutation::RemoveGrant(key) => remove_grant(conn, key),
    };
    result.map_err(db_error)?;
    Ok(())
}

/// Deletes the grant stored under a key.
fn remove_grant(conn: &Connection, key: &GrantKey) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM permission_grants WHERE tier_id = ?1 AND feature_id = ?2 AND sub_feature_id \
         = ?3 AND action_id = ?4",
        params![
            key.tier_id.as_str(),
            key.feature_id.as_str(),
            encode_sub_feature(key.sub_feature_id.as_ref()),
            key.action_id.as_str()
        ],
    )
}
