//! Tenant manager: lifecycle, isolation, and the zero-downtime schema swap.

use std::collections::BTreeMap;

use tempfile::TempDir;
use verdict::expr::{facts_from_json, Facts};
use verdict::store::{migrations, new_file_pool, ConnectionConfig, ConnectionPool};
use verdict::{Rule, RuleStore, Schema, SqliteRuleStore, TenantManager};

fn test_pool() -> (ConnectionPool, TempDir) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("verdict.db");
    let pool = new_file_pool(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        migrations::run_migrations(&conn).unwrap();
    }
    (pool, temp)
}

fn insert_tenant(pool: &ConnectionPool, tenant_id: &str) {
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO tenants (id, name, created_at, updated_at)
         VALUES (?1, ?2, '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
        rusqlite::params![tenant_id, format!("tenant {tenant_id}")],
    )
    .unwrap();
}

fn schema_of(objects: &[(&str, &[(&str, &str)])]) -> Schema {
    objects
        .iter()
        .map(|(name, fields)| {
            let fields: BTreeMap<String, String> = fields
                .iter()
                .map(|(f, t)| ((*f).to_owned(), (*t).to_owned()))
                .collect();
            ((*name).to_owned(), fields)
        })
        .collect()
}

fn user_schema() -> Schema {
    schema_of(&[("User", &[("Age", "int")])])
}

fn facts(json: serde_json::Value) -> Facts {
    facts_from_json(json.as_object().unwrap())
}

fn schema_rows(pool: &ConnectionPool, tenant_id: &str) -> Vec<(i64, bool)> {
    let conn = pool.get().unwrap();
    let mut stmt = conn
        .prepare("SELECT version, active FROM schemas WHERE tenant_id = ?1 ORDER BY version")
        .unwrap();
    stmt.query_map(rusqlite::params![tenant_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?))
    })
    .unwrap()
    .collect::<rusqlite::Result<Vec<_>>>()
    .unwrap()
}

#[test]
fn first_schema_update_creates_engine_and_row() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());

    let update = manager.update_tenant_schema("t1", &user_schema()).unwrap();
    assert_eq!(update.version, 1);
    assert!(update.failures.is_empty());

    assert_eq!(schema_rows(&pool, "t1"), vec![(1, true)]);
    assert!(manager.get_engine("t1").is_ok());
    assert_eq!(manager.list_tenants(), vec!["t1".to_owned()]);
}

#[test]
fn schema_update_keeps_rules_working() {
    // S4: a rule compiled under schema v1 still matches after a superset
    // schema lands as v2.
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());

    manager.update_tenant_schema("t1", &user_schema()).unwrap();
    let engine = manager.get_engine("t1").unwrap();
    engine
        .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
        .unwrap();

    let wider = schema_of(&[
        ("User", &[("Age", "int"), ("Email", "string")]),
        ("Transaction", &[("Amount", "float64")]),
    ]);
    let update = manager.update_tenant_schema("t1", &wider).unwrap();
    assert_eq!(update.version, 2);
    assert_eq!(update.rules_recompiled, 1);
    assert!(update.failures.is_empty());

    assert_eq!(schema_rows(&pool, "t1"), vec![(1, false), (2, true)]);

    let engine = manager.get_engine("t1").unwrap();
    let result = engine
        .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 25}})))
        .unwrap();
    assert!(result.matched);
}

#[test]
fn exactly_one_active_schema_after_many_updates() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());

    for _ in 0..5 {
        manager.update_tenant_schema("t1", &user_schema()).unwrap();
    }

    let rows = schema_rows(&pool, "t1");
    assert_eq!(rows.len(), 5);
    let active: Vec<i64> = rows
        .iter()
        .filter(|(_, active)| *active)
        .map(|(v, _)| *v)
        .collect();
    assert_eq!(active, vec![5], "only the max version may be active");
}

#[test]
fn invalid_schema_rejected_without_db_write() {
    // S6: multiple violations in one schema; nothing is persisted.
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());

    let bad = schema_of(&[
        ("123Invalid", &[("field-name", "varchar")]),
        ("EmptyObject", &[]),
    ]);
    let err = manager.update_tenant_schema("t1", &bad).unwrap_err();
    assert!(err.to_string().starts_with("invalid schema:"));

    assert!(schema_rows(&pool, "t1").is_empty());
    assert!(manager.get_engine("t1").unwrap_err().is_not_found());
}

#[test]
fn cross_tenant_rule_evaluation_denied() {
    // S3: a rule of tenant A is invisible through tenant B's engine.
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "a");
    insert_tenant(&pool, "b");
    let manager = TenantManager::new(pool.clone());

    manager.update_tenant_schema("a", &user_schema()).unwrap();
    manager.update_tenant_schema("b", &user_schema()).unwrap();

    let engine_a = manager.get_engine("a").unwrap();
    let rule = engine_a
        .add_rule(&Rule::new("ra", "a-only", "User.Age >= 18", true))
        .unwrap();

    let engine_b = manager.get_engine("b").unwrap();
    let payload = facts(serde_json::json!({"User": {"Age": 99}}));

    let err = engine_b.evaluate(&rule.id, &payload).unwrap_err();
    assert!(err.is_not_found());
    assert!(engine_b.evaluate_all(&payload).unwrap().is_empty());
}

#[test]
fn get_engine_unknown_tenant_is_not_found() {
    let (pool, _temp) = test_pool();
    let manager = TenantManager::new(pool);
    assert!(manager.get_engine("nope").unwrap_err().is_not_found());
}

#[test]
fn delete_tenant_removes_engine_only() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());
    manager.update_tenant_schema("t1", &user_schema()).unwrap();

    manager.delete_tenant("t1").unwrap();
    assert!(manager.get_engine("t1").unwrap_err().is_not_found());
    assert!(manager.delete_tenant("t1").unwrap_err().is_not_found());

    // The database rows are untouched; only the engine map forgot it.
    assert_eq!(schema_rows(&pool, "t1").len(), 1);
}

#[test]
fn load_all_tenants_rebuilds_engines() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "a");
    insert_tenant(&pool, "b");

    // Seed via a first manager, as a previous process run would have.
    {
        let manager = TenantManager::new(pool.clone());
        manager.update_tenant_schema("a", &user_schema()).unwrap();
        manager.update_tenant_schema("b", &user_schema()).unwrap();
        manager
            .get_engine("a")
            .unwrap()
            .add_rule(&Rule::new("ra", "adult", "User.Age >= 18", true))
            .unwrap();
    }

    // Fresh manager, as on process start.
    let manager = TenantManager::new(pool.clone());
    assert_eq!(manager.tenant_count(), 0);
    let loaded = manager.load_all_tenants().unwrap();
    assert_eq!(loaded, 2);
    assert_eq!(manager.list_tenants(), vec!["a".to_owned(), "b".to_owned()]);

    let result = manager
        .get_engine("a")
        .unwrap()
        .evaluate("ra", &facts(serde_json::json!({"User": {"Age": 30}})))
        .unwrap();
    assert!(result.matched);
}

#[test]
fn load_skips_tenant_whose_stored_schema_no_longer_validates() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "good");
    insert_tenant(&pool, "bad");

    {
        let manager = TenantManager::new(pool.clone());
        manager.update_tenant_schema("good", &user_schema()).unwrap();
    }
    // Plant a schema row that decodes but fails validation.
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO schemas (tenant_id, version, definition, active, created_at)
         VALUES ('bad', 1, '{\"123Invalid\":{\"f\":\"varchar\"}}', 1, '2024-01-01T00:00:00.000000Z')",
        [],
    )
    .unwrap();
    drop(conn);

    let manager = TenantManager::new(pool.clone());
    let loaded = manager.load_all_tenants().unwrap();
    assert_eq!(loaded, 1);
    assert!(manager.get_engine("good").is_ok());
    assert!(manager.get_engine("bad").unwrap_err().is_not_found());
}

#[test]
fn schema_swap_reports_rules_that_stop_compiling() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());

    manager.update_tenant_schema("t1", &user_schema()).unwrap();
    manager
        .get_engine("t1")
        .unwrap()
        .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
        .unwrap();

    // The new schema renames the object; the rule no longer compiles, but
    // the swap still completes and reports it.
    let renamed = schema_of(&[("Person", &[("Age", "int")])]);
    let update = manager.update_tenant_schema("t1", &renamed).unwrap();
    assert_eq!(update.version, 2);
    assert_eq!(update.rules_recompiled, 0);
    assert_eq!(update.failures.len(), 1);
    assert_eq!(update.failures[0].rule_id, "r1");

    // The rule is still stored and listed, but evaluates to a per-rule
    // "not compiled" error under the new engine.
    let engine = manager.get_engine("t1").unwrap();
    let results = engine
        .evaluate_all(&facts(serde_json::json!({"Person": {"Age": 30}})))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].error.as_deref().unwrap().contains("not compiled"));
}

#[test]
fn old_engine_survives_swap_for_in_flight_callers() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());

    manager.update_tenant_schema("t1", &user_schema()).unwrap();
    let old_engine = manager.get_engine("t1").unwrap();
    old_engine
        .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
        .unwrap();

    manager
        .update_tenant_schema(
            "t1",
            &schema_of(&[("User", &[("Age", "int"), ("Email", "string")])]),
        )
        .unwrap();

    // The caller still holds the pre-swap engine; it keeps answering.
    let result = old_engine
        .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 25}})))
        .unwrap();
    assert!(result.matched);

    // And the swapped-in engine answers too, independently.
    let new_engine = manager.get_engine("t1").unwrap();
    let result = new_engine
        .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 25}})))
        .unwrap();
    assert!(result.matched);
}

#[test]
fn rules_visible_through_fresh_store_after_engine_mutations() {
    let (pool, _temp) = test_pool();
    insert_tenant(&pool, "t1");
    let manager = TenantManager::new(pool.clone());
    manager.update_tenant_schema("t1", &user_schema()).unwrap();

    let engine = manager.get_engine("t1").unwrap();
    engine
        .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
        .unwrap();

    let store = SqliteRuleStore::new(pool.clone(), "t1");
    assert_eq!(store.list_active().unwrap().len(), 1);
}
