//! In-memory rule store, used by unit and engine tests.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{Error, Result};

use super::{Rule, RuleStore};

/// A [`RuleStore`] over a map. Same contract as the durable store,
/// including the active-list ordering.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, Rule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn add(&self, rule: &Rule) -> Result<Rule> {
        let mut rules = self.rules.write();
        if rules.contains_key(&rule.id) {
            return Err(Error::AlreadyExists(rule.id.clone()));
        }
        if rules.values().any(|r| r.name == rule.name) {
            return Err(Error::AlreadyExists(rule.name.clone()));
        }

        let now = Utc::now();
        let stored = Rule {
            created_at: now,
            updated_at: now,
            ..rule.clone()
        };
        rules.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn get(&self, id: &str) -> Result<Rule> {
        self.rules
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("rule", id))
    }

    fn list_active(&self) -> Result<Vec<Rule>> {
        let mut active: Vec<Rule> = self
            .rules
            .read()
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(active)
    }

    fn update(&self, rule: &Rule) -> Result<Rule> {
        let mut rules = self.rules.write();
        let existing = rules
            .get(&rule.id)
            .ok_or_else(|| Error::not_found("rule", &*rule.id))?;

        let stored = Rule {
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..rule.clone()
        };
        rules.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn delete(&self, id: &str) -> Result<()> {
        match self.rules.write().remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::not_found("rule", id)),
        }
    }
}
