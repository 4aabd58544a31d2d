//! # Tenant Manager
//!
//! Owns the `tenant id → Engine` map and the engine lifecycle: bulk load at
//! startup, creation, zero-downtime schema swap, and removal. Engines are
//! handed out as `Arc<Engine>`, so an engine swapped out of the map keeps
//! serving in-flight evaluations and is reclaimed when the last caller
//! drops its reference.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{CompileFailure, CompilePolicy, Engine, EVAL_COST_LIMIT};
use crate::error::{Error, Result};
use crate::expr::Env;
use crate::schema::{validate_schema, Schema};
use crate::store::{encode_time, ConnectionPool, SqliteRuleStore};

/// Build an expression environment from a validated schema: one dynamically
/// typed top-level variable per object, macros cleared, cost ceiling set.
pub fn env_from_schema(schema: &Schema) -> Env {
    let mut builder = Env::builder().clear_macros().cost_limit(EVAL_COST_LIMIT);
    for object_name in schema.keys() {
        builder = builder.variable(object_name);
    }
    builder.build()
}

/// The outcome of a schema update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaUpdate {
    /// The version number assigned to the new schema row.
    pub version: i64,
    /// How many active rules compiled under the new schema.
    pub rules_recompiled: usize,
    /// Active rules that no longer compile. The swap still completed;
    /// these evaluate to per-rule "not compiled" errors until fixed.
    pub failures: Vec<CompileFailure>,
}

/// Manages one engine per tenant.
pub struct TenantManager {
    engines: RwLock<HashMap<String, Arc<Engine>>>,
    pool: ConnectionPool,
}

impl TenantManager {
    pub fn new(pool: ConnectionPool) -> Self {
        TenantManager {
            engines: RwLock::new(HashMap::new()),
            pool,
        }
    }

    /// Load every tenant that has an active schema and build its engine.
    /// Called once at process start. A stored schema that no longer
    /// validates is skipped with a warning rather than failing startup;
    /// an engine that fails to build is fatal.
    pub fn load_all_tenants(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare(
                "SELECT t.id, s.definition
                 FROM tenants t
                 JOIN schemas s ON s.tenant_id = t.id
                 WHERE s.active = 1",
            )
            .map_err(|e| Error::store("fetch tenants", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| Error::store("fetch tenants", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::store("scan tenant row", e))?;
        drop(stmt);
        drop(conn);

        let mut loaded = 0;
        for (tenant_id, definition) in rows {
            let schema: Schema = serde_json::from_str(&definition)?;
            match self.create_tenant(&tenant_id, &schema) {
                Ok(()) => loaded += 1,
                Err(Error::InvalidSchema(err)) => {
                    warn!(tenant_id, %err, "stored schema no longer validates, skipping tenant");
                }
                Err(err) => return Err(err),
            }
        }

        info!(loaded, "tenants loaded");
        Ok(loaded)
    }

    /// Validate the schema, build an engine, and register it. Does not
    /// write any tenant row; row creation is the HTTP layer's concern.
    pub fn create_tenant(&self, tenant_id: &str, schema: &Schema) -> Result<()> {
        validate_schema(schema)?;

        let env = env_from_schema(schema);
        let store = Arc::new(SqliteRuleStore::new(self.pool.clone(), tenant_id));
        let engine = Engine::new(env, store)?;

        self.engines
            .write()
            .insert(tenant_id.to_owned(), Arc::new(engine));
        Ok(())
    }

    /// Shared handle to a tenant's engine.
    pub fn get_engine(&self, tenant_id: &str) -> Result<Arc<Engine>> {
        self.engines
            .read()
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| Error::not_found("tenant", tenant_id))
    }

    /// Snapshot of loaded tenant ids, sorted for stable output.
    pub fn list_tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.engines.read().keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Number of loaded tenants.
    pub fn tenant_count(&self) -> usize {
        self.engines.read().len()
    }

    /// Replace a tenant's schema with zero downtime.
    ///
    /// Under the manager write lock: persist the new schema row (the
    /// deactivate/insert pair runs in one transaction), build a fresh
    /// engine against the new environment, and swap it into the map. The
    /// same path serves first-time schema creation, so version numbering
    /// starts at 1 and the write lock is held throughout — there is no
    /// unlock/re-lock hand-off.
    ///
    /// In-flight evaluations keep their `Arc` to the old engine and finish
    /// against consistent state; lookups after the swap see the new one.
    pub fn update_tenant_schema(
        &self,
        tenant_id: &str,
        new_schema: &Schema,
    ) -> Result<SchemaUpdate> {
        validate_schema(new_schema)?;

        let mut engines = self.engines.write();

        let version = self.persist_schema(tenant_id, new_schema)?;

        let env = env_from_schema(new_schema);
        let store = Arc::new(SqliteRuleStore::new(self.pool.clone(), tenant_id));
        let (engine, failures) = Engine::with_policy(env, store, CompilePolicy::Lenient)?;
        let rules_recompiled = engine.program_count();

        engines.insert(tenant_id.to_owned(), Arc::new(engine));

        if failures.is_empty() {
            info!(tenant_id, version, rules_recompiled, "schema updated");
        } else {
            warn!(
                tenant_id,
                version,
                failed = failures.len(),
                "schema updated; some rules no longer compile"
            );
        }

        Ok(SchemaUpdate {
            version,
            rules_recompiled,
            failures,
        })
    }

    /// Deactivate the tenant's current schema rows and insert the new one
    /// as `version = max + 1, active = true`, atomically.
    fn persist_schema(&self, tenant_id: &str, schema: &Schema) -> Result<i64> {
        let definition = serde_json::to_string(schema)?;
        let conn = self.pool.get()?;

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::store("begin schema transaction", e))?;

        tx.execute(
            "UPDATE schemas SET active = 0 WHERE tenant_id = ?1",
            rusqlite::params![tenant_id],
        )
        .map_err(|e| Error::store("deactivate old schemas", e))?;

        let version: i64 = tx
            .query_row(
                "INSERT INTO schemas (tenant_id, version, definition, active, created_at)
                 SELECT ?1, COALESCE(MAX(version), 0) + 1, ?2, 1, ?3
                 FROM schemas
                 WHERE tenant_id = ?1
                 RETURNING version",
                rusqlite::params![tenant_id, definition, encode_time(chrono::Utc::now())],
                |row| row.get(0),
            )
            .map_err(|e| Error::store("insert new schema", e))?;

        tx.commit()
            .map_err(|e| Error::store("commit schema transaction", e))?;

        Ok(version)
    }

    /// Drop a tenant's engine from the map. Does not touch the database.
    pub fn delete_tenant(&self, tenant_id: &str) -> Result<()> {
        match self.engines.write().remove(tenant_id) {
            Some(_) => Ok(()),
            None => Err(Error::not_found("tenant", tenant_id)),
        }
    }
}
