//! SQLite-backed rule store and connection pool.
//!
//! The pool runs every new connection through a pragma customizer (WAL,
//! foreign keys ON, busy timeout), so cascade deletes and concurrent
//! readers behave the same on every handle. The store itself is bound to
//! one tenant at construction; every statement it emits carries a
//! `tenant_id = ?` predicate and uses bound parameters throughout.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

use super::{Rule, RuleStore};

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Connection pool sizing. Defaults cover a few dozen concurrent
/// evaluators with headroom; raise `max_open` if the server runs hotter.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum open connections.
    pub max_open: u32,
    /// Idle connections kept warm.
    pub min_idle: Option<u32>,
    /// Recycle connections older than this.
    pub max_lifetime_secs: u64,
    /// Close connections idle longer than this.
    pub idle_timeout_secs: u64,
    /// SQLite busy timeout per connection.
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_open: 32,
            min_idle: Some(8),
            max_lifetime_secs: 1800,
            idle_timeout_secs: 600,
            busy_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        Ok(())
    }
}

fn build_pool(manager: SqliteConnectionManager, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(config.max_open)
        .min_idle(config.min_idle)
        .max_lifetime(Some(std::time::Duration::from_secs(config.max_lifetime_secs)))
        .idle_timeout(Some(std::time::Duration::from_secs(config.idle_timeout_secs)))
        .connection_timeout(std::time::Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
        }))
        .build(manager)?;
    Ok(pool)
}

/// Create a file-backed connection pool.
pub fn new_file_pool(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    build_pool(SqliteConnectionManager::file(path), config)
}

/// Create an in-memory pool. Each pooled connection owns a private
/// database, so this is only suitable for single-connection use such as
/// pragma or migration tests.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let config = ConnectionConfig {
        max_open: 1,
        min_idle: None,
        ..config.clone()
    };
    build_pool(SqliteConnectionManager::memory(), &config)
}

/// Serialize a timestamp for storage. Fixed-width RFC3339 with microsecond
/// precision and a `Z` suffix, so TEXT ordering equals chronological order.
pub(crate) fn encode_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

/// The current instant, truncated to the stored precision so the returned
/// record equals what a later `get` reads back.
fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1000 * 1000).unwrap_or(now)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Durable, tenant-scoped rule store.
pub struct SqliteRuleStore {
    pool: ConnectionPool,
    tenant_id: String,
}

impl SqliteRuleStore {
    /// Bind a store to one tenant. Construction is cheap; connections are
    /// drawn from the shared pool per operation.
    pub fn new(pool: ConnectionPool, tenant_id: impl Into<String>) -> Self {
        SqliteRuleStore {
            pool,
            tenant_id: tenant_id.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rule> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        Ok(Rule {
            id: row.get("id")?,
            name: row.get("name")?,
            expression: row.get("expression")?,
            active: row.get("active")?,
            created_at: decode_time(&created_at).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            updated_at: decode_time(&updated_at).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
        })
    }
}

impl RuleStore for SqliteRuleStore {
    fn add(&self, rule: &Rule) -> Result<Rule> {
        let conn = self.pool.get()?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM rules WHERE id = ?1 AND tenant_id = ?2)",
                params![rule.id, self.tenant_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::store("check rule existence", e))?;
        if exists {
            return Err(Error::AlreadyExists(rule.id.clone()));
        }

        let now = now_micros();
        let stored = Rule {
            created_at: now,
            updated_at: now,
            ..rule.clone()
        };

        conn.execute(
            "INSERT INTO rules (id, tenant_id, name, expression, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stored.id,
                self.tenant_id,
                stored.name,
                stored.expression,
                stored.active,
                encode_time(stored.created_at),
                encode_time(stored.updated_at),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::AlreadyExists(rule.id.clone())
            } else {
                Error::store("insert rule", e)
            }
        })?;

        Ok(stored)
    }

    fn get(&self, id: &str) -> Result<Rule> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, name, expression, active, created_at, updated_at
             FROM rules
             WHERE id = ?1 AND tenant_id = ?2",
            params![id, self.tenant_id],
            Self::map_row,
        )
        .optional()
        .map_err(|e| Error::store("get rule", e))?
        .ok_or_else(|| Error::not_found("rule", id))
    }

    fn list_active(&self) -> Result<Vec<Rule>> {
        let conn = self.pool.get()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, expression, active, created_at, updated_at
                 FROM rules
                 WHERE tenant_id = ?1 AND active = 1
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| Error::store("list active rules", e))?;

        let rules = stmt
            .query_map(params![self.tenant_id], Self::map_row)
            .map_err(|e| Error::store("list active rules", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::store("scan rule row", e))?;

        Ok(rules)
    }

    fn update(&self, rule: &Rule) -> Result<Rule> {
        // Verify existence first so a vanished row is a clean NotFound and
        // the caller gets the preserved created_at back.
        let existing = self.get(&rule.id)?;

        let stored = Rule {
            created_at: existing.created_at,
            updated_at: now_micros(),
            ..rule.clone()
        };

        let conn = self.pool.get()?;
        let affected = conn
            .execute(
                "UPDATE rules
                 SET name = ?1, expression = ?2, active = ?3, updated_at = ?4
                 WHERE id = ?5 AND tenant_id = ?6",
                params![
                    stored.name,
                    stored.expression,
                    stored.active,
                    encode_time(stored.updated_at),
                    stored.id,
                    self.tenant_id,
                ],
            )
            .map_err(|e| Error::store("update rule", e))?;

        if affected == 0 {
            return Err(Error::not_found("rule", &*rule.id));
        }
        Ok(stored)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let affected = conn
            .execute(
                "DELETE FROM rules WHERE id = ?1 AND tenant_id = ?2",
                params![id, self.tenant_id],
            )
            .map_err(|e| Error::store("delete rule", e))?;

        if affected == 0 {
            return Err(Error::not_found("rule", id));
        }
        Ok(())
    }
}
