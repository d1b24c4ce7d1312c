//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances and the tier
//! assignments the router walks. At startup the registry reads the
//! [`LlmConfig`], resolves authentication (env vars), and instantiates the
//! appropriate adapter for each configured provider.

use std::collections::HashMap;
use std::sync::Arc;

use valet_domain::config::{LlmConfig, ProviderKind};
use valet_domain::error::Result;

use crate::health::HealthTracker;
use crate::mock::MockProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated LLM providers plus the tier ordering.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// Tier label → ordered provider ids.
    tiers: HashMap<String, Vec<String>>,
    /// Degradation order of tier labels, most capable first.
    tier_order: Vec<String>,
    default_tier: String,
    /// Provider ids that failed to initialize, with their error messages.
    init_errors: Vec<ProviderInitError>,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub kind: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message so raw secrets never leak into logs or state endpoints.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..]);
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Providers that fail to initialize are logged and skipped rather than
    /// aborting the entire startup.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors: Vec<ProviderInitError> = Vec::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind {
                ProviderKind::OpenaiCompat => OpenAiCompatProvider::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                ProviderKind::Mock => {
                    Ok(Arc::new(MockProvider::echo(&pc.id)) as Arc<dyn LlmProvider>)
                }
            };

            match result {
                Ok(provider) => {
                    tracing::info!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        "registered LLM provider"
                    );
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %safe_error,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        kind: format!("{:?}", pc.kind),
                        error: safe_error,
                    });
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() {
            tracing::warn!(
                failed_providers = init_errors.len(),
                "no LLM providers initialized; the degradation ladder will \
                 answer in offline mode until credentials are fixed"
            );
        }

        Ok(Self {
            providers,
            tiers: config.tiers.clone(),
            tier_order: config.tier_order.clone(),
            default_tier: config.default_tier.clone(),
            init_errors,
        })
    }

    /// Construct directly from parts (used by tests).
    pub fn new(
        providers: HashMap<String, Arc<dyn LlmProvider>>,
        tiers: HashMap<String, Vec<String>>,
        tier_order: Vec<String>,
        default_tier: String,
    ) -> Self {
        Self {
            providers,
            tiers,
            tier_order,
            default_tier,
            init_errors: Vec::new(),
        }
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// Ordered providers assigned to a tier label. Ids without a registered
    /// instance are silently dropped.
    pub fn providers_for_tier(&self, tier: &str) -> Vec<Arc<dyn LlmProvider>> {
        self.tiers
            .get(tier)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.providers.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Router contract: the first healthy provider of a tier, falling back
    /// to the default tier when the label is unknown.
    pub fn select_provider(
        &self,
        tier: &str,
        health: &HealthTracker,
    ) -> Option<Arc<dyn LlmProvider>> {
        let mut candidates = self.providers_for_tier(tier);
        if candidates.is_empty() && tier != self.default_tier {
            candidates = self.providers_for_tier(&self.default_tier);
        }
        candidates
            .into_iter()
            .find(|p| health.is_healthy(p.provider_id()))
    }

    /// Degradation order of tier labels.
    pub fn tier_order(&self) -> &[String] {
        &self.tier_order
    }

    pub fn default_tier(&self) -> &str {
        &self.default_tier
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider ids (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Provider initialization errors (empty if all succeeded).
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secrets_hides_long_tokens() {
        let msg = "auth failed for key sk_abcdefghijklmnopqrstuvwx please check";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("sk_abcdefghijklmnopqrstuvwx"));
        assert!(masked.contains("sk_a"));
    }

    #[test]
    fn mask_secrets_leaves_short_words() {
        let msg = "connection refused";
        assert_eq!(mask_secrets(msg), msg);
    }

    #[test]
    fn select_provider_skips_unhealthy() {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert("a".into(), Arc::new(MockProvider::echo("a")));
        providers.insert("b".into(), Arc::new(MockProvider::echo("b")));
        let mut tiers = HashMap::new();
        tiers.insert("budget".to_string(), vec!["a".to_string(), "b".to_string()]);
        let registry =
            ProviderRegistry::new(providers, tiers, vec!["budget".into()], "budget".into());

        let health = HealthTracker::new(std::time::Duration::from_secs(60), 1);
        health.record_failure("a");

        let picked = registry.select_provider("budget", &health).unwrap();
        assert_eq!(picked.provider_id(), "b");
    }

    #[test]
    fn unknown_tier_falls_back_to_default() {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert("a".into(), Arc::new(MockProvider::echo("a")));
        let mut tiers = HashMap::new();
        tiers.insert("budget".to_string(), vec!["a".to_string()]);
        let registry =
            ProviderRegistry::new(providers, tiers, vec!["budget".into()], "budget".into());

        let health = HealthTracker::default();
        let picked = registry.select_provider("premium", &health).unwrap();
        assert_eq!(picked.provider_id(), "a");
    }
}
