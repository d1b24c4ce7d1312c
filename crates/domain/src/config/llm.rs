use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Tier label → ordered provider ids. The degradation ladder walks
    /// `tier_order`; unknown labels fall back to `default_tier`.
    #[serde(default)]
    pub tiers: HashMap<String, Vec<String>>,
    /// Degradation order of tier labels, most capable first.
    #[serde(default = "default_tier_order")]
    pub tier_order: Vec<String>,
    /// Tier assumed when a request names no tier.
    #[serde(default = "default_tier")]
    pub default_tier: String,
    /// Text of the synthetic response returned when every tier fails.
    #[serde(default = "default_offline_message")]
    pub offline_message: String,
    /// Per-model pricing for cost estimation (key = model name).
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Health window for the fallback chain, in seconds.
    #[serde(default = "default_health_window_secs")]
    pub health_window_secs: u64,
    /// Failures inside the window before a provider is skipped.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_tier_order() -> Vec<String> {
    vec!["cloud_premium".into(), "cloud_budget".into(), "local".into()]
}

fn default_tier() -> String {
    "cloud_budget".into()
}

fn default_offline_message() -> String {
    "I'm in offline mode right now and can't reach any language model. \
     I'll catch up as soon as a provider is available again."
        .into()
}

fn default_health_window_secs() -> u64 {
    60
}

fn default_failure_threshold() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            tiers: HashMap::new(),
            tier_order: default_tier_order(),
            default_tier: default_tier(),
            offline_message: default_offline_message(),
            pricing: HashMap::new(),
            budget: BudgetConfig::default(),
            health_window_secs: default_health_window_secs(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// One configured provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique id used in tier lists (e.g. "openai", "local-llama").
    pub id: String,
    #[serde(default)]
    pub kind: ProviderKind,
    /// Base URL of the chat-completions endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Env var holding the API key. Read once at startup.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Default model for this provider.
    #[serde(default)]
    pub model: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries the adapter performs itself (the chain never re-tries the
    /// same provider).
    #[serde(default = "default_provider_retries")]
    pub max_retries: u32,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_provider_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompat,
    /// Scripted in-process provider, used by tests and demos.
    Mock,
}

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_mtok
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_mtok
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Budget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Daily spend ceiling in USD. `None` = unlimited.
    #[serde(default)]
    pub daily_usd: Option<f64>,
    /// Monthly spend ceiling in USD. `None` = unlimited.
    #[serde(default)]
    pub monthly_usd: Option<f64>,
    /// Fraction of either ceiling at which a soft warning is emitted.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

fn default_warning_threshold() -> f64 {
    0.75
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_usd: None,
            monthly_usd: None,
            warning_threshold: default_warning_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_estimate() {
        let p = ModelPricing {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        };
        let cost = p.estimate_cost(1_000_000, 1_000_000);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn tier_order_defaults_most_capable_first() {
        let cfg = LlmConfig::default();
        assert_eq!(
            cfg.tier_order,
            vec!["cloud_premium", "cloud_budget", "local"]
        );
    }
}
