use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sub-agent scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentConfig {
    /// Tool-use loops a child run may consume.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Cumulative input tokens before the run is cut off.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: u64,
    /// Wall-clock deadline per run, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Model tier child runs use unless the spawn input names one.
    #[serde(default = "default_child_tier")]
    pub default_tier: String,
    /// Child context window (messages kept hot).
    #[serde(default = "default_child_hot_window")]
    pub hot_window_messages: usize,
    /// Child total prompt budget in characters.
    #[serde(default = "default_child_total_chars")]
    pub max_total_chars: usize,
    /// Child per-tool-output clip in characters.
    #[serde(default = "default_child_tool_output_chars")]
    pub tool_output_max_chars: usize,
    /// Give children a read-only view of the memory store.
    #[serde(default = "default_true")]
    pub read_only_memory: bool,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_max_input_tokens() -> u64 {
    50_000
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_child_tier() -> String {
    "cloud_budget".into()
}
fn default_child_hot_window() -> usize {
    20
}
fn default_child_total_chars() -> usize {
    48_000
}
fn default_child_tool_output_chars() -> usize {
    4_000
}
fn default_true() -> bool {
    true
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_input_tokens: default_max_input_tokens(),
            timeout_secs: default_timeout_secs(),
            default_tier: default_child_tier(),
            hot_window_messages: default_child_hot_window(),
            max_total_chars: default_child_total_chars(),
            tool_output_max_chars: default_child_tool_output_chars(),
            read_only_memory: default_true(),
        }
    }
}
