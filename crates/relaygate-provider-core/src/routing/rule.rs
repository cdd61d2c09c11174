use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub type RuleId = i64;

/// Declared client-facing protocol family a [`Rule`] is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    OpenAI,
    Anthropic,
    ClaudeCode,
    OpenCode,
}

impl Scenario {
    pub fn parse_loose(value: &str) -> Option<Self> {
        match value {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            "claude_code" => Some(Self::ClaudeCode),
            "opencode" => Some(Self::OpenCode),
            _ => None,
        }
    }

    /// Scans a request path for the scenario's literal substring. Used when an endpoint
    /// doesn't carry an explicit scenario segment but usage records still need one.
    pub fn infer_from_path(path: &str) -> Option<Self> {
        if path.contains("claude_code") {
            Some(Self::ClaudeCode)
        } else if path.contains("opencode") {
            Some(Self::OpenCode)
        } else if path.contains("anthropic") {
            Some(Self::Anthropic)
        } else if path.contains("openai") {
            Some(Self::OpenAI)
        } else {
            None
        }
    }
}

/// A load-balancing algorithm plus the parameters it needs, merged into a single
/// adjacently-tagged union (the params shape is a function of the tactic type).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tactic {
    RoundRobin {
        #[serde(default)]
        request_threshold: u64,
    },
    WeightedRandom,
    LeastTokens,
    LeastRequests,
    Hybrid {
        request_threshold: u64,
        token_threshold: u64,
    },
}

impl Default for Tactic {
    fn default() -> Self {
        Tactic::RoundRobin { request_threshold: 0 }
    }
}

/// Rolling counters attached to one [`Service`], reset when `time_window_secs` elapses.
/// Transient runtime state: not persisted, rebuilt from zero on process restart.
#[derive(Debug, Clone, Default)]
pub struct ServiceCounters {
    pub request_count: u64,
    pub window_request_count: u64,
    pub window_tokens_consumed: u64,
    pub window_input_tokens: u64,
    pub window_output_tokens: u64,
    pub last_used: Option<SystemTime>,
    pub window_start: Option<SystemTime>,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> u32 {
    1
}

fn default_time_window_secs() -> u64 {
    300
}

/// One `(provider, model)` candidate inside a [`Rule`]. `provider` names a runtime-registered
/// provider (the same key `AppState::providers` and the credential pool index on) rather than
/// a UUID: this codebase treats the provider name as the stable identity everywhere else, so
/// Service follows suit instead of introducing a second identity scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_time_window_secs")]
    pub time_window_secs: u64,
    #[serde(default, skip_serializing, skip_deserializing)]
    pub counters: ServiceCounters,
}

/// A named routing entry matching `(scenario, request_model)` to a set of candidate services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing)]
    pub id: RuleId,
    pub scenario: Scenario,
    pub request_model: String,
    #[serde(default)]
    pub response_model: Option<String>,
    pub services: Vec<Service>,
    #[serde(default)]
    pub tactic: Tactic,
    #[serde(default)]
    pub current_service_index: usize,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Rule {
    /// The label to write back into the client-visible response, falling back to the
    /// request model the client actually sent.
    pub fn response_model(&self) -> &str {
        self.response_model.as_deref().unwrap_or(&self.request_model)
    }
}
