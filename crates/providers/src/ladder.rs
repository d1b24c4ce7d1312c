//! Tier-ordered degradation ladder.
//!
//! The ladder walks the configured tier order (e.g. `cloud_premium` →
//! `cloud_budget` → `local`), running the fallback chain inside each tier.
//! When every tier is exhausted it mints a synthetic offline response instead
//! of returning an error, so callers always get an answer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use valet_domain::trace::TraceEvent;

use crate::fallback::run_chain;
use crate::health::HealthTracker;
use crate::registry::ProviderRegistry;
use crate::traits::{ChatRequest, ChatResponse, StopReason};

/// The synthetic tier label reported while offline.
pub const OFFLINE_TIER: &str = "offline";

/// Result of a ladder call: which provider answered (None when offline) and
/// the response itself.
pub struct LadderReply {
    pub provider_id: Option<String>,
    pub tier: String,
    pub response: ChatResponse,
}

/// Snapshot of the ladder's current position.
#[derive(Debug, Clone, Serialize)]
pub struct LadderState {
    pub current_tier: String,
    pub available_tiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct LadderInner {
    current_tier: String,
    degraded_since: Option<DateTime<Utc>>,
    message: Option<String>,
}

pub struct DegradationLadder {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthTracker>,
    offline_message: String,
    state: Mutex<LadderInner>,
}

impl DegradationLadder {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthTracker>,
        offline_message: impl Into<String>,
    ) -> Self {
        let initial_tier = registry
            .tier_order()
            .first()
            .cloned()
            .unwrap_or_else(|| OFFLINE_TIER.into());
        Self {
            registry,
            health,
            offline_message: offline_message.into(),
            state: Mutex::new(LadderInner {
                current_tier: initial_tier,
                degraded_since: None,
                message: None,
            }),
        }
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Run a chat request starting at `tier`, degrading tier by tier and
    /// terminating in a synthetic offline response. Never errors.
    pub async fn chat(&self, tier: &str, req: &ChatRequest) -> LadderReply {
        let order = self.registry.tier_order();
        let start_idx = order.iter().position(|t| t == tier).unwrap_or(0);

        for label in &order[start_idx..] {
            let providers = self.registry.providers_for_tier(label);
            if providers.is_empty() {
                continue;
            }
            match run_chain(&providers, &self.health, req, label).await {
                Ok(outcome) => {
                    self.note_answered(label);
                    return LadderReply {
                        provider_id: Some(outcome.provider_id),
                        tier: label.clone(),
                        response: outcome.response,
                    };
                }
                Err(e) => {
                    tracing::warn!(tier = %label, error = %e, "tier exhausted, degrading");
                }
            }
        }

        self.note_offline();
        LadderReply {
            provider_id: None,
            tier: OFFLINE_TIER.into(),
            response: ChatResponse {
                content: self.offline_message.clone(),
                skill_calls: Vec::new(),
                stop_reason: StopReason::EndTurn,
                usage: None,
                model: OFFLINE_TIER.into(),
                degraded: true,
            },
        }
    }

    /// Snapshot for `/api/state` and the dashboard.
    pub fn state(&self) -> LadderState {
        let inner = self.state.lock();
        LadderState {
            current_tier: inner.current_tier.clone(),
            available_tiers: self.registry.tier_order().to_vec(),
            degraded_since: inner.degraded_since,
            message: inner.message.clone(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.state.lock().degraded_since.is_some()
    }

    // ── State transitions ──────────────────────────────────────────

    fn note_answered(&self, tier: &str) {
        let mut inner = self.state.lock();
        if inner.degraded_since.is_some() {
            TraceEvent::TierRecovered {
                tier: tier.to_owned(),
            }
            .emit();
            inner.degraded_since = None;
            inner.message = None;
        }
        if inner.current_tier != tier {
            TraceEvent::TierDegraded {
                from_tier: inner.current_tier.clone(),
                to_tier: tier.to_owned(),
            }
            .emit();
            inner.current_tier = tier.to_owned();
        }
    }

    fn note_offline(&self) {
        let mut inner = self.state.lock();
        if inner.degraded_since.is_none() {
            TraceEvent::TierDegraded {
                from_tier: inner.current_tier.clone(),
                to_tier: OFFLINE_TIER.into(),
            }
            .emit();
            inner.degraded_since = Some(Utc::now());
            inner.message = Some(self.offline_message.clone());
        }
        inner.current_tier = OFFLINE_TIER.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use crate::traits::LlmProvider;
    use std::collections::HashMap;

    fn ladder_with(
        providers: Vec<(&str, Arc<dyn LlmProvider>)>,
        tiers: Vec<(&str, Vec<&str>)>,
    ) -> DegradationLadder {
        let providers: HashMap<String, Arc<dyn LlmProvider>> = providers
            .into_iter()
            .map(|(id, p)| (id.to_string(), p))
            .collect();
        let tiers: HashMap<String, Vec<String>> = tiers
            .into_iter()
            .map(|(t, ids)| (t.to_string(), ids.iter().map(|s| s.to_string()).collect()))
            .collect();
        let order: Vec<String> = vec![
            "cloud_premium".into(),
            "cloud_budget".into(),
            "local".into(),
        ];
        let registry = Arc::new(ProviderRegistry::new(
            providers,
            tiers,
            order,
            "cloud_budget".into(),
        ));
        DegradationLadder::new(registry, Arc::new(HealthTracker::default()), "offline mode")
    }

    fn req() -> ChatRequest {
        ChatRequest {
            messages: vec![valet_domain::chat::ChatMessage::user("hello")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn answers_from_requested_tier() {
        let ladder = ladder_with(
            vec![
                ("prem", Arc::new(MockProvider::echo("prem"))),
                ("cheap", Arc::new(MockProvider::echo("cheap"))),
            ],
            vec![("cloud_premium", vec!["prem"]), ("cloud_budget", vec!["cheap"])],
        );
        let reply = ladder.chat("cloud_budget", &req()).await;
        assert_eq!(reply.provider_id.as_deref(), Some("cheap"));
        assert_eq!(reply.tier, "cloud_budget");
        assert!(!reply.response.degraded);
        assert!(!ladder.is_degraded());
    }

    #[tokio::test]
    async fn degrades_across_tiers() {
        let ladder = ladder_with(
            vec![
                ("prem", Arc::new(MockProvider::failing("prem"))),
                ("loc", Arc::new(MockProvider::echo("loc"))),
            ],
            vec![("cloud_premium", vec!["prem"]), ("local", vec!["loc"])],
        );
        let reply = ladder.chat("cloud_premium", &req()).await;
        assert_eq!(reply.provider_id.as_deref(), Some("loc"));
        assert_eq!(reply.tier, "local");
    }

    #[tokio::test]
    async fn all_tiers_failing_yields_offline_response() {
        let ladder = ladder_with(
            vec![
                ("prem", Arc::new(MockProvider::failing("prem"))),
                ("cheap", Arc::new(MockProvider::failing("cheap"))),
            ],
            vec![("cloud_premium", vec!["prem"]), ("cloud_budget", vec!["cheap"])],
        );
        let reply = ladder.chat("cloud_premium", &req()).await;
        assert!(reply.provider_id.is_none());
        assert_eq!(reply.tier, OFFLINE_TIER);
        assert!(reply.response.degraded);
        assert!(reply.response.content.contains("offline mode"));

        let state = ladder.state();
        assert_eq!(state.current_tier, OFFLINE_TIER);
        assert!(state.degraded_since.is_some());
        assert!(ladder.is_degraded());
    }

    #[tokio::test]
    async fn recovers_after_offline() {
        let flaky = Arc::new(MockProvider::failing_then_echo("flaky", 1));
        let ladder = ladder_with(
            vec![("flaky", flaky)],
            vec![("cloud_premium", vec!["flaky"])],
        );

        let first = ladder.chat("cloud_premium", &req()).await;
        assert!(first.response.degraded);
        assert!(ladder.is_degraded());

        let second = ladder.chat("cloud_premium", &req()).await;
        assert!(!second.response.degraded);
        assert!(!ladder.is_degraded());
        assert_eq!(ladder.state().current_tier, "cloud_premium");
    }

    #[tokio::test]
    async fn no_providers_at_all_is_offline() {
        let ladder = ladder_with(vec![], vec![]);
        let reply = ladder.chat("cloud_premium", &req()).await;
        assert!(reply.response.degraded);
    }
}
