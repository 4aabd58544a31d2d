//! # Verdict
//!
//! A multi-tenant, in-process rules-evaluation engine. Tenants declare a
//! data schema, author boolean expressions over it, and evaluate live fact
//! payloads against the compiled rules at high request rates.
//!
//! ## Architecture
//!
//! ```text
//! TenantManager
//!     ├── tenant id → Arc<Engine>            (atomic swap on schema update)
//!     └── Engine (per tenant)
//!         ├── expr::Env                      (variables from the schema,
//!         │                                   macros off, cost ceiling)
//!         ├── programs: rule id → Program    (compiled once, evaluated many)
//!         ├── ActiveRuleCache                (invalidated on rule mutation)
//!         └── SqliteRuleStore                (every query tenant-scoped)
//! ```
//!
//! Compilation happens on rule mutation and engine construction only; the
//! evaluate hot path runs entirely in memory (one `list_active` query on a
//! cold cache, zero on a warm one). A schema update builds a whole new
//! engine and swaps it into the manager map; in-flight evaluations finish
//! on the old engine through their own `Arc` and the old engine is dropped
//! with its last reference.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use verdict::{Engine, InMemoryRuleStore, Rule};
//! use verdict::expr::{facts_from_json, Env};
//!
//! let env = Env::builder().variable("User").clear_macros().build();
//! let engine = Engine::new(env, Arc::new(InMemoryRuleStore::new()))?;
//! engine.add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))?;
//!
//! let facts = facts_from_json(
//!     serde_json::json!({"User": {"Age": 25}}).as_object().unwrap(),
//! );
//! let results = engine.evaluate_all(&facts)?;
//! assert!(results[0].matched);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod logging;
pub mod manager;
pub mod schema;
pub mod server;
pub mod store;

pub use cache::{ActiveRuleCache, CacheConfig};
pub use config::Config;
pub use engine::{
    CompileFailure, CompilePolicy, Engine, EvaluationResult, EVAL_COST_LIMIT,
};
pub use error::{Error, Result};
pub use manager::{env_from_schema, SchemaUpdate, TenantManager};
pub use schema::{validate_schema, Schema, SchemaError};
pub use store::{
    new_file_pool, new_in_memory, ConnectionConfig, ConnectionPool, InMemoryRuleStore, Rule,
    RuleStore, SqliteRuleStore,
};
