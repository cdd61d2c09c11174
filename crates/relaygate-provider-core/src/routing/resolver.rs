use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::rule::{Rule, RuleId, Scenario};

/// A rule behind the per-rule exclusive lock that load balancing and usage accounting both take.
pub type RuleHandle = Arc<Mutex<Rule>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    NotFound,
}

/// Holds the configured rule set and resolves `(scenario, request_model)` to a [`Rule`].
///
/// Mirrors `CredentialPool`'s shape: a coarse `RwLock` over the rule list (read for lookups,
/// write for config reloads) plus a per-entry lock for the mutable state (here, the round-robin
/// cursor and service counters) so that selecting a service for one rule never blocks lookups
/// or selections against a different rule.
pub struct RuleStore {
    rules: RwLock<Vec<RuleHandle>>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    pub async fn replace_all(&self, rules: Vec<Rule>) {
        let handles = rules.into_iter().map(|r| Arc::new(Mutex::new(r))).collect();
        *self.rules.write().await = handles;
    }

    pub async fn upsert(&self, rule: Rule) {
        let guard = self.rules.read().await;
        for handle in guard.iter() {
            let mut existing = handle.lock().await;
            if existing.id == rule.id {
                *existing = rule;
                return;
            }
        }
        drop(guard);
        self.rules.write().await.push(Arc::new(Mutex::new(rule)));
    }

    pub async fn remove(&self, id: RuleId) {
        let mut guard = self.rules.write().await;
        let mut keep = Vec::with_capacity(guard.len());
        for handle in guard.drain(..) {
            let matches = handle.lock().await.id == id;
            if !matches {
                keep.push(handle);
            }
        }
        *guard = keep;
    }

    pub async fn all(&self) -> Vec<RuleHandle> {
        self.rules.read().await.clone()
    }

    /// Linear scan filtering by `scenario == scenario && request_model == request_model &&
    /// active`, per the resolver's spec. Rule counts are small (operator-configured), so a
    /// lock-per-candidate scan is simpler than maintaining a secondary index.
    pub async fn resolve(&self, scenario: Scenario, request_model: &str) -> Result<RuleHandle, ResolveError> {
        let guard = self.rules.read().await;
        for handle in guard.iter() {
            let rule = handle.lock().await;
            if rule.active && rule.scenario == scenario && rule.request_model == request_model {
                return Ok(handle.clone());
            }
        }
        Err(ResolveError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::rule::{Service, ServiceCounters, Tactic};

    fn sample_rule(id: RuleId, scenario: Scenario, model: &str, active: bool) -> Rule {
        Rule {
            id,
            scenario,
            request_model: model.to_string(),
            response_model: None,
            services: vec![Service {
                provider: "p1".to_string(),
                model: "m1".to_string(),
                weight: 1,
                active: true,
                time_window_secs: 300,
                counters: ServiceCounters::default(),
            }],
            tactic: Tactic::RoundRobin { request_threshold: 0 },
            current_service_index: 0,
            active,
        }
    }

    #[tokio::test]
    async fn resolve_matches_scenario_and_request_model() {
        let store = RuleStore::new();
        store
            .replace_all(vec![
                sample_rule(1, Scenario::Anthropic, "tingly-claude", true),
                sample_rule(2, Scenario::OpenAI, "tingly-claude", true),
            ])
            .await;
        let resolved = store.resolve(Scenario::Anthropic, "tingly-claude").await.unwrap();
        assert_eq!(resolved.lock().await.id, 1);
    }

    #[tokio::test]
    async fn resolve_ignores_inactive_rules() {
        let store = RuleStore::new();
        store
            .replace_all(vec![sample_rule(1, Scenario::Anthropic, "tingly-claude", false)])
            .await;
        assert_eq!(
            store.resolve(Scenario::Anthropic, "tingly-claude").await.unwrap_err(),
            ResolveError::NotFound
        );
    }

    #[tokio::test]
    async fn resolve_allows_name_collisions_across_scenarios() {
        let store = RuleStore::new();
        store
            .replace_all(vec![
                sample_rule(1, Scenario::Anthropic, "shared-name", true),
                sample_rule(2, Scenario::OpenAI, "shared-name", true),
            ])
            .await;
        assert_eq!(
            store.resolve(Scenario::Anthropic, "shared-name").await.unwrap().lock().await.id,
            1
        );
        assert_eq!(
            store.resolve(Scenario::OpenAI, "shared-name").await.unwrap().lock().await.id,
            2
        );
    }

    #[tokio::test]
    async fn upsert_replaces_existing_rule_by_id() {
        let store = RuleStore::new();
        store.replace_all(vec![sample_rule(1, Scenario::Anthropic, "m", true)]).await;
        store.upsert(sample_rule(1, Scenario::Anthropic, "m2", true)).await;
        assert_eq!(store.all().await.len(), 1);
        assert!(store.resolve(Scenario::Anthropic, "m2").await.is_ok());
        assert_eq!(
            store.resolve(Scenario::Anthropic, "m").await.unwrap_err(),
            ResolveError::NotFound
        );
    }

    #[tokio::test]
    async fn remove_drops_the_rule() {
        let store = RuleStore::new();
        store.replace_all(vec![sample_rule(1, Scenario::Anthropic, "m", true)]).await;
        store.remove(1).await;
        assert!(store.all().await.is_empty());
    }
}
