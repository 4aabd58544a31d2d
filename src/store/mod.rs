//! # Rule Persistence
//!
//! [`RuleStore`] is the tenant-scoped persistence contract: a store instance
//! is bound to exactly one tenant at construction, and nothing it does can
//! see another tenant's rows. Two implementations:
//!
//! - [`SqliteRuleStore`] — the durable store backing production engines.
//! - [`InMemoryRuleStore`] — the same contract over a map, for tests.

mod memory;
pub mod migrations;
mod sqlite;

pub use memory::InMemoryRuleStore;
pub use sqlite::{
    new_file_pool, new_in_memory, ConnectionConfig, ConnectionPool, PooledConnection,
    SqliteRuleStore,
};
pub(crate) use sqlite::{decode_time, encode_time};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single evaluation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub expression: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Build a rule with fresh timestamps; the store overwrites them on add.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        expression: impl Into<String>,
        active: bool,
    ) -> Self {
        let now = Utc::now();
        Rule {
            id: id.into(),
            name: name.into(),
            expression: expression.into(),
            active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Tenant-scoped rule persistence.
///
/// Every method operates only on the tenant the store was constructed for.
/// Implementations set `created_at`/`updated_at` on `add` and bump
/// `updated_at` (preserving `created_at`) on `update`.
pub trait RuleStore: Send + Sync {
    /// Insert a new rule. Fails with AlreadyExists on a duplicate id or
    /// duplicate name within the tenant.
    fn add(&self, rule: &Rule) -> Result<Rule>;

    /// Fetch a rule by id. Fails with NotFound if absent for this tenant.
    fn get(&self, id: &str) -> Result<Rule>;

    /// All active rules in ascending `created_at` order (ties broken by
    /// id). This order is the evaluation order of `evaluate_all`.
    fn list_active(&self) -> Result<Vec<Rule>>;

    /// Update an existing rule. Fails with NotFound if absent.
    fn update(&self, rule: &Rule) -> Result<Rule>;

    /// Delete a rule. Fails with NotFound if absent.
    fn delete(&self, id: &str) -> Result<()>;
}
