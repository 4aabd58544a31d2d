//! # Per-tenant Rules Engine
//!
//! An [`Engine`] owns an expression environment, a map of compiled programs
//! (`rule id → Program`), and an active-rule cache, all backed by a
//! tenant-scoped [`RuleStore`]. Construction compiles every active rule, so
//! the evaluate hot path never compiles and never touches the database
//! beyond one `list_active` on a cold cache.
//!
//! Concurrency: one `RwLock` guards the program map. Readers clone the
//! program (cheap, shared AST) and evaluate outside the lock, so any number
//! of evaluations proceed in parallel; a mutation excludes readers only for
//! the map write itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::cache::{ActiveRuleCache, CacheConfig};
use crate::error::{Error, Result};
use crate::expr::{Env, Facts, Program, ProgramOptions, Value};
use crate::store::{Rule, RuleStore};

/// Evaluation cost ceiling applied to every compiled rule.
pub const EVAL_COST_LIMIT: u64 = 1_000_000;

/// What engine construction does when an active rule fails to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilePolicy {
    /// Fail construction on the first compile error. Used when creating or
    /// loading a tenant: a tenant whose stored rules don't compile under
    /// its own schema is a configuration fault worth surfacing.
    Strict,
    /// Complete construction and report the failures. Used for the schema
    /// swap, so one broken rule cannot block a tenant's schema update;
    /// broken rules surface as per-rule "not compiled" evaluation errors.
    Lenient,
}

/// A rule that failed to compile during engine construction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileFailure {
    pub rule_id: String,
    pub rule_name: String,
    pub error: String,
}

/// The outcome of evaluating one rule.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    #[serde(rename = "ruleID")]
    pub rule_id: String,
    #[serde(rename = "ruleName")]
    pub rule_name: String,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<serde_json::Value>,
}

/// Per-tenant compilation and evaluation engine.
pub struct Engine {
    env: Env,
    store: Arc<dyn RuleStore>,
    cache: ActiveRuleCache,
    programs: RwLock<HashMap<String, Program>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine, compiling every active rule from the store. Fails
    /// if any rule fails to compile.
    pub fn new(env: Env, store: Arc<dyn RuleStore>) -> Result<Self> {
        let (engine, failures) = Self::with_policy(env, store, CompilePolicy::Strict)?;
        debug_assert!(failures.is_empty(), "strict construction reports no failures");
        Ok(engine)
    }

    /// Build an engine under the given compile policy, returning any
    /// compile failures (always empty under [`CompilePolicy::Strict`]).
    pub fn with_policy(
        env: Env,
        store: Arc<dyn RuleStore>,
        policy: CompilePolicy,
    ) -> Result<(Self, Vec<CompileFailure>)> {
        let engine = Engine {
            env,
            store,
            cache: ActiveRuleCache::new(CacheConfig::default()),
            programs: RwLock::new(HashMap::new()),
        };

        let rules = engine.store.list_active()?;
        let mut failures = Vec::new();
        for rule in &rules {
            match engine.compile_rule(&rule.id, &rule.expression) {
                Ok(()) => {}
                Err(err) if policy == CompilePolicy::Lenient => {
                    failures.push(CompileFailure {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        error: err.to_string(),
                    });
                }
                Err(err) => {
                    return Err(Error::Internal(format!(
                        "failed to compile rule {}: {err}",
                        rule.id
                    )));
                }
            }
        }

        engine.cache.set(rules);
        Ok((engine, failures))
    }

    /// Number of compiled programs currently held.
    pub fn program_count(&self) -> usize {
        self.programs.read().len()
    }

    /// Compile an expression and commit the program under the write lock.
    fn compile_rule(&self, rule_id: &str, expression: &str) -> Result<()> {
        let program = self.build_program(expression)?;
        self.programs.write().insert(rule_id.to_owned(), program);
        Ok(())
    }

    /// Compile an expression to a program without committing it.
    fn build_program(&self, expression: &str) -> Result<Program> {
        let ast = self.env.compile(expression)?;
        Ok(self.env.program(
            &ast,
            ProgramOptions {
                track_state: true,
                cost_limit: Some(EVAL_COST_LIMIT),
            },
        ))
    }

    /// Add a rule: verify it is new, compile it, persist it, invalidate the
    /// active-list cache. If the store insert fails the compiled program is
    /// rolled back, so the program map never holds entries the store lacks.
    pub fn add_rule(&self, rule: &Rule) -> Result<Rule> {
        match self.store.get(&rule.id) {
            Ok(_) => return Err(Error::AlreadyExists(rule.id.clone())),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        self.compile_rule(&rule.id, &rule.expression)?;

        let stored = match self.store.add(rule) {
            Ok(stored) => stored,
            Err(err) => {
                self.programs.write().remove(&rule.id);
                return Err(err);
            }
        };

        self.cache.invalidate();
        Ok(stored)
    }

    /// Update a rule: verify it exists, compile the new expression, persist
    /// the row, then commit the program. The program map is only touched
    /// after the store accepts the update, so a store failure leaves the
    /// old program serving the old stored expression.
    pub fn update_rule(&self, rule: &Rule) -> Result<Rule> {
        self.store.get(&rule.id)?;

        let program = self.build_program(&rule.expression)?;
        let stored = self.store.update(rule)?;

        self.programs.write().insert(rule.id.clone(), program);
        self.cache.invalidate();
        Ok(stored)
    }

    /// Delete a rule from the store, then drop its program. A store
    /// failure leaves the caches untouched.
    pub fn delete_rule(&self, rule_id: &str) -> Result<()> {
        self.store.delete(rule_id)?;
        self.programs.write().remove(rule_id);
        self.cache.invalidate();
        Ok(())
    }

    /// Evaluate a single rule against the fact payload.
    ///
    /// Infrastructure faults (unknown rule, rule not compiled, store
    /// failure) return `Err`; evaluation-time failures return `Ok` with
    /// `matched == false` and the error captured in the result.
    pub fn evaluate(&self, rule_id: &str, facts: &Facts) -> Result<EvaluationResult> {
        let rule = self.store.get(rule_id)?;

        let program = self
            .programs
            .read()
            .get(rule_id)
            .cloned()
            .ok_or_else(|| Error::NotCompiled(rule_id.to_owned()))?;

        Ok(run_program(&program, &rule, facts))
    }

    /// Evaluate every active rule, in `list_active` order. Per-rule errors
    /// (including missing programs) are captured in their result and the
    /// loop continues. The only store access is one `list_active` on a
    /// cold cache; a warm cache issues no queries at all.
    pub fn evaluate_all(&self, facts: &Facts) -> Result<Vec<EvaluationResult>> {
        let rules = match self.cache.get() {
            Some(rules) => rules,
            None => {
                let rules = self.store.list_active()?;
                self.cache.set(rules.clone());
                rules
            }
        };

        let mut results = Vec::with_capacity(rules.len());
        for rule in &rules {
            let program = self.programs.read().get(&rule.id).cloned();
            let result = match program {
                Some(program) => run_program(&program, rule, facts),
                None => EvaluationResult {
                    rule_id: rule.id.clone(),
                    rule_name: rule.name.clone(),
                    matched: false,
                    error: Some(Error::NotCompiled(rule.id.clone()).to_string()),
                    trace: None,
                },
            };
            results.push(result);
        }

        Ok(results)
    }
}

/// Run one compiled program and fold the outcome into a result row.
/// A non-boolean value is not a match and not an error; an evaluation
/// error is captured and reported per-rule.
fn run_program(program: &Program, rule: &Rule, facts: &Facts) -> EvaluationResult {
    match program.evaluate(facts) {
        Ok(evaluation) => EvaluationResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            matched: matches!(evaluation.value, Value::Bool(true)),
            error: None,
            trace: evaluation
                .trace
                .and_then(|steps| serde_json::to_value(steps).ok()),
        },
        Err(err) => EvaluationResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            matched: false,
            error: Some(err.to_string()),
            trace: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::facts_from_json;
    use crate::store::InMemoryRuleStore;

    fn env() -> Env {
        Env::builder()
            .variable("User")
            .variable("Transaction")
            .clear_macros()
            .cost_limit(EVAL_COST_LIMIT)
            .build()
    }

    fn engine() -> Engine {
        Engine::new(env(), Arc::new(InMemoryRuleStore::new())).unwrap()
    }

    fn facts(json: serde_json::Value) -> Facts {
        facts_from_json(json.as_object().unwrap())
    }

    #[test]
    fn add_compiles_and_persists() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
            .unwrap();
        assert_eq!(engine.program_count(), 1);

        let result = engine
            .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 25}})))
            .unwrap();
        assert!(result.matched);
        assert!(result.error.is_none());
        assert_eq!(result.rule_name, "adult");
    }

    #[test]
    fn add_rejects_invalid_expression_before_store() {
        let engine = engine();
        let err = engine
            .add_rule(&Rule::new("r1", "bad", "Account.Balance > 0", true))
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("rule validation failed: undeclared reference"));
        assert_eq!(engine.program_count(), 0);
        assert!(engine.evaluate_all(&Facts::new()).unwrap().is_empty());
    }

    #[test]
    fn add_duplicate_id_fails_without_recompiling() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("x", "first", "true", true))
            .unwrap();
        let err = engine
            .add_rule(&Rule::new("x", "second", "false", true))
            .unwrap_err();
        assert!(err.is_already_exists());
        // The original still evaluates as before.
        let result = engine.evaluate("x", &Facts::new()).unwrap();
        assert!(result.matched);
    }

    #[test]
    fn evaluate_unknown_rule_is_not_found() {
        let engine = engine();
        let err = engine.evaluate("ghost", &Facts::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn evaluate_uncompiled_rule_reports_not_compiled() {
        // Build the engine first, then slip a rule into the store behind
        // its back: the row exists but no program was ever compiled.
        let store = Arc::new(InMemoryRuleStore::new());
        let engine = Engine::new(env(), Arc::clone(&store) as Arc<dyn RuleStore>).unwrap();
        store.add(&Rule::new("r9", "stray", "true", true)).unwrap();

        let err = engine.evaluate("r9", &Facts::new()).unwrap_err();
        assert!(matches!(err, Error::NotCompiled(id) if id == "r9"));
    }

    #[test]
    fn evaluation_error_is_captured_in_result() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("r1", "needs-tx", "Transaction.Amount > 10", true))
            .unwrap();

        let result = engine
            .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 1}})))
            .unwrap();
        assert!(!result.matched);
        assert!(result.error.unwrap().contains("no such attribute"));
    }

    #[test]
    fn non_boolean_expression_is_no_match_no_error() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("r1", "arith", "User.Age + 1", true))
            .unwrap();

        let result = engine
            .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 1}})))
            .unwrap();
        assert!(!result.matched);
        assert!(result.error.is_none());
    }

    #[test]
    fn update_replaces_behavior() {
        let engine = engine();
        let stored = engine
            .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
            .unwrap();

        let mut changed = stored.clone();
        changed.expression = "User.Age >= 21".into();
        engine.update_rule(&changed).unwrap();

        let result = engine
            .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 19}})))
            .unwrap();
        assert!(!result.matched);
    }

    #[test]
    fn update_with_invalid_expression_keeps_old_program() {
        let engine = engine();
        let stored = engine
            .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
            .unwrap();

        let mut broken = stored.clone();
        broken.expression = "Nope.Nope > 1".into();
        assert!(engine.update_rule(&broken).is_err());

        // Old program and old stored expression both intact.
        let result = engine
            .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 25}})))
            .unwrap();
        assert!(result.matched);
    }

    #[test]
    fn update_unknown_rule_is_not_found() {
        let engine = engine();
        let err = engine
            .update_rule(&Rule::new("ghost", "g", "true", true))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn delete_removes_program_and_row() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("r1", "adult", "true", true))
            .unwrap();
        engine.delete_rule("r1").unwrap();

        assert_eq!(engine.program_count(), 0);
        assert!(engine.evaluate("r1", &Facts::new()).unwrap_err().is_not_found());
        assert!(engine.evaluate_all(&Facts::new()).unwrap().is_empty());
    }

    #[test]
    fn evaluate_all_keeps_going_past_failures() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("r1", "ok", "User.Age >= 18", true))
            .unwrap();
        engine
            .add_rule(&Rule::new("r2", "broken-at-runtime", "Transaction.Amount > 0", true))
            .unwrap();
        engine
            .add_rule(&Rule::new("r3", "also-ok", "true", true))
            .unwrap();

        let results = engine
            .evaluate_all(&facts(serde_json::json!({"User": {"Age": 30}})))
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].matched);
        assert!(results[1].error.is_some());
        assert!(!results[1].matched);
        assert!(results[2].matched);
    }

    #[test]
    fn evaluate_all_skips_inactive_rules() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("r1", "active", "true", true))
            .unwrap();
        engine
            .add_rule(&Rule::new("r2", "inactive", "true", false))
            .unwrap();

        let results = engine.evaluate_all(&Facts::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_id, "r1");
    }

    #[test]
    fn construction_compiles_existing_rules() {
        let store = Arc::new(InMemoryRuleStore::new());
        store
            .add(&Rule::new("r1", "adult", "User.Age >= 18", true))
            .unwrap();
        store
            .add(&Rule::new("r2", "inactive", "true", false))
            .unwrap();

        let engine = Engine::new(env(), store).unwrap();
        assert_eq!(engine.program_count(), 1);
        let result = engine
            .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 20}})))
            .unwrap();
        assert!(result.matched);
    }

    #[test]
    fn strict_construction_fails_on_broken_rule() {
        let store = Arc::new(InMemoryRuleStore::new());
        store
            .add(&Rule::new("r1", "broken", "Missing.Field > 0", true))
            .unwrap();
        assert!(Engine::new(env(), store).is_err());
    }

    #[test]
    fn lenient_construction_reports_failures() {
        let store = Arc::new(InMemoryRuleStore::new());
        store
            .add(&Rule::new("r1", "broken", "Missing.Field > 0", true))
            .unwrap();
        store
            .add(&Rule::new("r2", "fine", "true", true))
            .unwrap();

        let (engine, failures) =
            Engine::with_policy(env(), store, CompilePolicy::Lenient).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].rule_id, "r1");
        assert_eq!(engine.program_count(), 1);

        // The broken rule shows up as a per-rule error, not a request failure.
        let results = engine.evaluate_all(&Facts::new()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].error.as_deref().unwrap().contains("not compiled"));
        assert!(results[1].matched);
    }

    #[test]
    fn cost_ceiling_is_a_per_rule_error() {
        let engine = engine();
        let chunk = "a".repeat(1024);
        let mut expression = format!("\"{chunk}\"");
        for _ in 0..60 {
            expression.push_str(&format!(" + \"{chunk}\""));
        }
        expression.push_str(" != \"\"");

        engine
            .add_rule(&Rule::new("r1", "expensive", &expression, true))
            .unwrap();

        let results = engine.evaluate_all(&Facts::new()).unwrap();
        assert!(!results[0].matched);
        assert!(results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("cost limit"));
    }

    #[test]
    fn trace_is_returned_for_matches() {
        let engine = engine();
        engine
            .add_rule(&Rule::new("r1", "adult", "User.Age >= 18", true))
            .unwrap();
        let result = engine
            .evaluate("r1", &facts(serde_json::json!({"User": {"Age": 25}})))
            .unwrap();
        assert!(result.trace.is_some());
    }
}
