use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent turn engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum tool-use loops per turn before the turn is force-closed.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Memories injected into the system prompt, prominence-ranked.
    #[serde(default = "default_memory_top_k")]
    pub memory_top_k: usize,
    /// Identity line at the top of every system prompt.
    #[serde(default = "default_identity")]
    pub identity: String,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_memory_top_k() -> usize {
    6
}

fn default_identity() -> String {
    "You are Valet, a personal assistant with durable memory. \
     Be concise, concrete, and proactive when it helps."
        .into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            memory_top_k: default_memory_top_k(),
            identity: default_identity(),
        }
    }
}
