//! Host-wide table of plugin-contributed validation rules.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use umr_core::error::AppError;
use umr_core::result::AppResult;
use umr_core::traits::validation::ValidationRule;

/// A rule together with the plugin that contributed it.
#[derive(Debug, Clone)]
pub struct RuleEntry {
    /// Contributing plugin id.
    pub owner: String,
    /// The rule.
    pub rule: Arc<dyn ValidationRule>,
}

/// Rules keyed by rule id.
///
/// A rule id belongs to exactly one plugin. Re-registering an id from the
/// same plugin replaces the rule; registering it from another plugin fails.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: RwLock<HashMap<String, RuleEntry>>,
}

impl RuleTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `rule` on behalf of `owner`.
    pub async fn register(&self, owner: &str, rule: Arc<dyn ValidationRule>) -> AppResult<()> {
        let id = rule.id().to_string();
        let mut rules = self.rules.write().await;

        if let Some(existing) = rules.get(&id) {
            if existing.owner != owner {
                return Err(AppError::conflict(format!(
                    "Validation rule '{id}' is already registered by plugin '{}'",
                    existing.owner
                )));
            }
        }

        debug!(plugin_id = %owner, rule_id = %id, "Registered validation rule");
        rules.insert(
            id,
            RuleEntry {
                owner: owner.to_string(),
                rule,
            },
        );
        Ok(())
    }

    /// Removes one rule if `owner` contributed it.
    pub async fn unregister(&self, owner: &str, rule_id: &str) -> bool {
        let mut rules = self.rules.write().await;
        match rules.get(rule_id) {
            Some(entry) if entry.owner == owner => {
                rules.remove(rule_id);
                true
            }
            _ => false,
        }
    }

    /// Removes every rule contributed by `owner`. Returns how many.
    pub async fn unregister_owner(&self, owner: &str) -> usize {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|_, entry| entry.owner != owner);
        before - rules.len()
    }

    /// Looks up a rule by id.
    pub async fn get(&self, rule_id: &str) -> Option<Arc<dyn ValidationRule>> {
        self.rules
            .read()
            .await
            .get(rule_id)
            .map(|entry| Arc::clone(&entry.rule))
    }

    /// Returns the plugin that contributed `rule_id`.
    pub async fn owner_of(&self, rule_id: &str) -> Option<String> {
        self.rules
            .read()
            .await
            .get(rule_id)
            .map(|entry| entry.owner.clone())
    }

    /// All rules, ordered by id.
    pub async fn rules(&self) -> Vec<Arc<dyn ValidationRule>> {
        let rules = self.rules.read().await;
        let mut ids: Vec<&String> = rules.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| Arc::clone(&rules[id].rule))
            .collect()
    }

    /// Rule ids contributed by `owner`, sorted.
    pub async fn ids_for(&self, owner: &str) -> Vec<String> {
        let rules = self.rules.read().await;
        let mut ids: Vec<String> = rules
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of registered rules.
    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    /// Whether the table is empty.
    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }
}
