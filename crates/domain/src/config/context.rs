use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Most recent messages kept verbatim (the hot window).
    #[serde(default = "default_hot_window")]
    pub hot_window_messages: usize,
    /// Total prompt budget in characters.
    #[serde(default = "default_total_chars")]
    pub max_total_chars: usize,
    /// Per-tool-output clip in characters.
    #[serde(default = "default_tool_output_chars")]
    pub tool_output_max_chars: usize,
}

fn default_hot_window() -> usize {
    40
}
fn default_total_chars() -> usize {
    120_000
}
fn default_tool_output_chars() -> usize {
    8_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            hot_window_messages: default_hot_window(),
            max_total_chars: default_total_chars(),
            tool_output_max_chars: default_tool_output_chars(),
        }
    }
}
