use relaygate_provider_core::config::{
    AIStudioConfig, AntigravityConfig, ClaudeCodeConfig, ClaudeConfig, CodexConfig, DeepSeekConfig,
    GeminiCliConfig, NvidiaConfig, OpenAIConfig, ProviderConfig, VertexConfig, VertexExpressConfig,
};

/// One row to seed into storage the first time a fresh database boots: a builtin provider
/// name plus the default-configured `ProviderConfig` it starts disabled with.
pub struct BuiltinProviderSeed {
    pub name: &'static str,
    pub config_json: serde_json::Value,
    pub enabled: bool,
}

/// Default rows for every provider this crate ships an `UpstreamProvider` impl for, minus
/// `custom` (admin-authored, nothing sensible to seed). Bootstrap inserts one row per seed for
/// any name storage doesn't already know about, so re-running against an existing database never
/// clobbers admin edits.
pub fn builtin_provider_seeds() -> Vec<BuiltinProviderSeed> {
    vec![
        seed("openai", ProviderConfig::OpenAI(OpenAIConfig::default())),
        seed("claude", ProviderConfig::Claude(ClaudeConfig::default())),
        seed(
            "aistudio",
            ProviderConfig::AIStudio(AIStudioConfig::default()),
        ),
        seed(
            "vertexexpress",
            ProviderConfig::VertexExpress(VertexExpressConfig::default()),
        ),
        seed("vertex", ProviderConfig::Vertex(VertexConfig::default())),
        seed(
            "geminicli",
            ProviderConfig::GeminiCli(GeminiCliConfig::default()),
        ),
        seed(
            "claudecode",
            ProviderConfig::ClaudeCode(ClaudeCodeConfig::default()),
        ),
        seed("codex", ProviderConfig::Codex(CodexConfig::default())),
        seed(
            "antigravity",
            ProviderConfig::Antigravity(AntigravityConfig::default()),
        ),
        seed("nvidia", ProviderConfig::Nvidia(NvidiaConfig::default())),
        seed(
            "deepseek",
            ProviderConfig::DeepSeek(DeepSeekConfig::default()),
        ),
    ]
}

fn seed(name: &'static str, config: ProviderConfig) -> BuiltinProviderSeed {
    BuiltinProviderSeed {
        name,
        config_json: serde_json::to_value(config).expect("provider config always serializes"),
        enabled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_every_builtin_provider_except_custom() {
        let names: Vec<&str> = builtin_provider_seeds().iter().map(|s| s.name).collect();
        assert_eq!(names.len(), 11);
        assert!(!names.contains(&"custom"));
        assert!(names.contains(&"openai"));
        assert!(names.contains(&"deepseek"));
    }

    #[test]
    fn seeds_start_disabled() {
        for seed in builtin_provider_seeds() {
            assert!(!seed.enabled, "{} should start disabled", seed.name);
        }
    }
}
