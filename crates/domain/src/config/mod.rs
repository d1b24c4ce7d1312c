mod agent;
mod context;
mod gardener;
mod llm;
mod memory;
mod server;
mod subagent;

pub use agent::*;
pub use context::*;
pub use gardener::*;
pub use llm::*;
pub use memory::*;
pub use server::*;
pub use subagent::*;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub gardener: GardenerConfig,
    #[serde(default)]
    pub subagent: SubAgentConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_tree() {
        let cfg = Config::default();
        assert_eq!(cfg.agent.max_iterations, 10);
        assert_eq!(cfg.gardener.deep_every, 72);
        assert_eq!(cfg.gardener.sleep_every, 288);
        assert_eq!(cfg.memory.decay.weight_age, 0.30);
        assert_eq!(cfg.llm.budget.warning_threshold, 0.75);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.agent.max_iterations, 10);
        assert_eq!(cfg.gardener.quiet_hours.start, 2);
        assert_eq!(cfg.gardener.quiet_hours.end, 5);
    }

    #[test]
    fn partial_toml_overrides_one_field() {
        let cfg: Config = toml::from_str(
            r#"
            [agent]
            max_iterations = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.max_iterations, 3);
        assert_eq!(cfg.gardener.deep_every, 72);
    }
}
