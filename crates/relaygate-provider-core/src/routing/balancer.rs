use std::time::{Duration, SystemTime};

use rand::Rng;

use super::rule::{Rule, Tactic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectError {
    NoActiveServices,
}

/// Picks one active [`Service`](super::rule::Service) per request from a [`Rule`]'s candidates.
///
/// All entry points take `&mut Rule` deliberately: the caller is expected to be holding the
/// rule's exclusive lock (a `tokio::sync::Mutex<Rule>` in [`super::resolver::RuleStore`]), since
/// window rollover and round-robin's cursor are both mutations of shared state.
pub struct LoadBalancer;

impl LoadBalancer {
    /// Selects among all active services of `rule`.
    pub fn select_service(rule: &mut Rule) -> Result<usize, SelectError> {
        roll_windows(rule, SystemTime::now());
        let active = active_indices(rule, None);
        Self::select_from(rule, &active)
    }

    /// Selects among a caller-supplied subset of `rule.services` indices (used by smart-routing
    /// layers that override the rule's default candidate list).
    pub fn select_service_from_candidates(
        rule: &mut Rule,
        candidates: &[usize],
    ) -> Result<usize, SelectError> {
        roll_windows(rule, SystemTime::now());
        let active = active_indices(rule, Some(candidates));
        Self::select_from(rule, &active)
    }

    fn select_from(rule: &mut Rule, active: &[usize]) -> Result<usize, SelectError> {
        match active.len() {
            0 => Err(SelectError::NoActiveServices),
            1 => Ok(active[0]),
            _ => Ok(Self::dispatch(rule, active)),
        }
    }

    fn dispatch(rule: &mut Rule, active: &[usize]) -> usize {
        match rule.tactic {
            Tactic::RoundRobin { .. } => Self::round_robin(rule, active),
            Tactic::WeightedRandom => Self::weighted_random(rule, active),
            Tactic::LeastTokens => Self::least_tokens(rule, active),
            Tactic::LeastRequests => Self::least_requests(rule, active),
            Tactic::Hybrid {
                request_threshold,
                token_threshold,
            } => {
                let under_requests: Vec<usize> = active
                    .iter()
                    .copied()
                    .filter(|&i| rule.services[i].counters.window_request_count < request_threshold)
                    .collect();
                if !under_requests.is_empty() {
                    return Self::least_tokens(rule, &under_requests);
                }
                let under_tokens: Vec<usize> = active
                    .iter()
                    .copied()
                    .filter(|&i| rule.services[i].counters.window_tokens_consumed < token_threshold)
                    .collect();
                if !under_tokens.is_empty() {
                    return Self::least_requests(rule, &under_tokens);
                }
                Self::round_robin(rule, active)
            }
        }
    }

    /// Pre-increment modulo the active-set size: the cursor is bumped *before* indexing, which
    /// is an observable contract (the first pick after a fresh index of 0 skips the 0th slot).
    fn round_robin(rule: &mut Rule, active: &[usize]) -> usize {
        rule.current_service_index = (rule.current_service_index + 1) % active.len();
        active[rule.current_service_index]
    }

    fn weighted_random(rule: &Rule, active: &[usize]) -> usize {
        let total: u64 = active.iter().map(|&i| u64::from(rule.services[i].weight)).sum();
        if total == 0 {
            let idx = rand::rng().random_range(0..active.len());
            return active[idx];
        }
        let draw = rand::rng().random_range(0..total);
        let mut acc = 0u64;
        for &i in active {
            acc += u64::from(rule.services[i].weight);
            if draw < acc {
                return i;
            }
        }
        *active.last().expect("active is non-empty")
    }

    fn least_tokens(rule: &Rule, active: &[usize]) -> usize {
        *active
            .iter()
            .min_by_key(|&&i| {
                let c = &rule.services[i].counters;
                (c.window_tokens_consumed, c.window_request_count, i)
            })
            .expect("active is non-empty")
    }

    fn least_requests(rule: &Rule, active: &[usize]) -> usize {
        *active
            .iter()
            .min_by_key(|&&i| {
                let c = &rule.services[i].counters;
                (c.window_request_count, c.window_tokens_consumed, i)
            })
            .expect("active is non-empty")
    }
}

fn active_indices(rule: &Rule, restrict_to: Option<&[usize]>) -> Vec<usize> {
    let in_scope = |i: usize| restrict_to.is_none_or(|c| c.contains(&i));
    rule.services
        .iter()
        .enumerate()
        .filter(|(i, s)| s.active && in_scope(*i))
        .map(|(i, _)| i)
        .collect()
}

/// Resets a service's rolling window once `time_window_secs` has elapsed since it last reset.
fn roll_windows(rule: &mut Rule, now: SystemTime) {
    for service in rule.services.iter_mut() {
        let window = Duration::from_secs(service.time_window_secs.max(1));
        let elapsed = service
            .counters
            .window_start
            .and_then(|start| now.duration_since(start).ok());
        match elapsed {
            None => service.counters.window_start = Some(now),
            Some(e) if e >= window => {
                service.counters.window_request_count = 0;
                service.counters.window_tokens_consumed = 0;
                service.counters.window_input_tokens = 0;
                service.counters.window_output_tokens = 0;
                service.counters.window_start = Some(now);
            }
            Some(_) => {}
        }
    }
}

/// Applies usage from a completed request to the service's rolling counters. Invoked by the
/// usage tracker exactly once per request alongside the durable usage record.
pub fn record_service_usage(rule: &mut Rule, service_index: usize, input_tokens: u64, output_tokens: u64) {
    roll_windows(rule, SystemTime::now());
    let Some(service) = rule.services.get_mut(service_index) else {
        return;
    };
    let c = &mut service.counters;
    c.request_count += 1;
    c.window_request_count += 1;
    c.window_input_tokens += input_tokens;
    c.window_output_tokens += output_tokens;
    c.window_tokens_consumed += input_tokens + output_tokens;
    c.last_used = Some(SystemTime::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::rule::{Scenario, Service, ServiceCounters};

    fn service(provider: &str, model: &str, weight: u32) -> Service {
        Service {
            provider: provider.to_string(),
            model: model.to_string(),
            weight,
            active: true,
            time_window_secs: 300,
            counters: ServiceCounters::default(),
        }
    }

    fn rule_with(services: Vec<Service>, tactic: Tactic) -> Rule {
        Rule {
            id: 1,
            scenario: Scenario::Anthropic,
            request_model: "tingly-claude".to_string(),
            response_model: None,
            services,
            tactic,
            current_service_index: 0,
            active: true,
        }
    }

    #[test]
    fn round_robin_pre_increment_matches_s4() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1)],
            Tactic::RoundRobin { request_threshold: 0 },
        );
        let picks: Vec<&str> = (0..4)
            .map(|_| {
                let idx = LoadBalancer::select_service(&mut rule).unwrap();
                rule.services[idx].provider.as_str()
            })
            .collect();
        assert_eq!(picks, vec!["b", "a", "b", "a"]);
    }

    #[test]
    fn round_robin_distributes_within_floor_ceil_of_n_over_k() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1), service("c", "m", 1)],
            Tactic::RoundRobin { request_threshold: 0 },
        );
        let n = 100;
        let mut counts = std::collections::HashMap::new();
        for _ in 0..n {
            let idx = LoadBalancer::select_service(&mut rule).unwrap();
            *counts.entry(rule.services[idx].provider.clone()).or_insert(0) += 1;
        }
        let floor = n / 3;
        let ceil = floor + 1;
        for count in counts.values() {
            assert!(*count == floor || *count == ceil, "count {count} out of range");
        }
    }

    #[test]
    fn weighted_random_respects_weights_within_three_sigma() {
        let mut rule = rule_with(
            vec![service("a", "m", 3), service("b", "m", 1)],
            Tactic::WeightedRandom,
        );
        let draws = 1000;
        let mut a_count = 0;
        for _ in 0..draws {
            let idx = LoadBalancer::select_service(&mut rule).unwrap();
            if rule.services[idx].provider == "a" {
                a_count += 1;
            }
        }
        // p = 0.75, n = 1000 -> sigma = sqrt(n*p*(1-p)) ~= 13.7; 3-sigma ~= 41.
        assert!((710..=790).contains(&a_count), "a_count={a_count}");
    }

    #[test]
    fn least_tokens_picks_smallest_window_consumption() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1)],
            Tactic::LeastTokens,
        );
        rule.services[0].counters.window_tokens_consumed = 500;
        rule.services[1].counters.window_tokens_consumed = 10;
        let idx = LoadBalancer::select_service(&mut rule).unwrap();
        assert_eq!(rule.services[idx].provider, "b");
    }

    #[test]
    fn least_tokens_ties_break_on_window_request_count_then_index() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1), service("c", "m", 1)],
            Tactic::LeastTokens,
        );
        for s in rule.services.iter_mut() {
            s.counters.window_tokens_consumed = 100;
        }
        rule.services[1].counters.window_request_count = 1;
        rule.services[2].counters.window_request_count = 1;
        let idx = LoadBalancer::select_service(&mut rule).unwrap();
        assert_eq!(rule.services[idx].provider, "a");
    }

    #[test]
    fn least_requests_picks_smallest_window_request_count() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1)],
            Tactic::LeastRequests,
        );
        rule.services[0].counters.window_request_count = 9;
        rule.services[1].counters.window_request_count = 2;
        let idx = LoadBalancer::select_service(&mut rule).unwrap();
        assert_eq!(rule.services[idx].provider, "b");
    }

    #[test]
    fn hybrid_prefers_least_tokens_under_request_threshold() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1)],
            Tactic::Hybrid {
                request_threshold: 10,
                token_threshold: 1000,
            },
        );
        rule.services[0].counters.window_request_count = 1;
        rule.services[0].counters.window_tokens_consumed = 900;
        rule.services[1].counters.window_request_count = 1;
        rule.services[1].counters.window_tokens_consumed = 50;
        let idx = LoadBalancer::select_service(&mut rule).unwrap();
        assert_eq!(rule.services[idx].provider, "b");
    }

    #[test]
    fn hybrid_falls_back_to_round_robin_past_both_thresholds() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1)],
            Tactic::Hybrid {
                request_threshold: 1,
                token_threshold: 1,
            },
        );
        for s in rule.services.iter_mut() {
            s.counters.window_request_count = 5;
            s.counters.window_tokens_consumed = 5;
        }
        let first = LoadBalancer::select_service(&mut rule).unwrap();
        let second = LoadBalancer::select_service(&mut rule).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn no_active_services_is_an_error_not_a_panic() {
        let mut rule = rule_with(
            vec![
                Service { active: false, ..service("a", "m", 1) },
                Service { active: false, ..service("b", "m", 1) },
            ],
            Tactic::RoundRobin { request_threshold: 0 },
        );
        assert_eq!(
            LoadBalancer::select_service(&mut rule),
            Err(SelectError::NoActiveServices)
        );
    }

    #[test]
    fn single_active_service_shortcuts_the_tactic() {
        let mut rule = rule_with(
            vec![
                Service { active: false, ..service("a", "m", 1) },
                service("b", "m", 1),
            ],
            Tactic::WeightedRandom,
        );
        let idx = LoadBalancer::select_service(&mut rule).unwrap();
        assert_eq!(rule.services[idx].provider, "b");
    }

    #[test]
    fn record_service_usage_accumulates_window_counters() {
        let mut rule = rule_with(vec![service("a", "m", 1)], Tactic::RoundRobin { request_threshold: 0 });
        let idx = LoadBalancer::select_service(&mut rule).unwrap();
        record_service_usage(&mut rule, idx, 10, 20);
        record_service_usage(&mut rule, idx, 5, 5);
        let c = &rule.services[idx].counters;
        assert_eq!(c.request_count, 2);
        assert_eq!(c.window_request_count, 2);
        assert_eq!(c.window_input_tokens, 15);
        assert_eq!(c.window_output_tokens, 25);
        assert_eq!(c.window_tokens_consumed, 40);
        assert!(c.last_used.is_some());
    }

    #[test]
    fn select_service_from_candidates_restricts_the_active_set() {
        let mut rule = rule_with(
            vec![service("a", "m", 1), service("b", "m", 1), service("c", "m", 1)],
            Tactic::LeastRequests,
        );
        rule.services[0].counters.window_request_count = 0;
        rule.services[2].counters.window_request_count = 0;
        let idx = LoadBalancer::select_service_from_candidates(&mut rule, &[1, 2]).unwrap();
        assert_eq!(rule.services[idx].provider, "c");
    }
}
