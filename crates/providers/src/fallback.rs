//! Ordered fallback chain over one tier's providers.
//!
//! Providers marked unhealthy by the [`HealthTracker`] are skipped without a
//! call. Outcomes are recorded back into the tracker, so a provider that
//! keeps failing drops out of rotation until its window expires. The chain
//! never retries the same provider; per-call retries belong to the adapter.

use std::sync::Arc;
use std::time::Instant;

use valet_domain::error::{Error, Result};
use valet_domain::trace::TraceEvent;

use crate::health::HealthTracker;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// A successful chain outcome: which provider answered and what it said.
#[derive(Debug)]
pub struct ChainOutcome {
    pub provider_id: String,
    pub response: ChatResponse,
}

/// Call each provider in order, skipping unhealthy ones.
///
/// Returns the first success, or the last error when every provider in the
/// list failed or was skipped.
pub async fn run_chain(
    providers: &[Arc<dyn LlmProvider>],
    health: &HealthTracker,
    req: &ChatRequest,
    tier: &str,
) -> Result<ChainOutcome> {
    let mut last_error: Option<Error> = None;
    let mut previous_id: Option<String> = None;

    for provider in providers {
        let id = provider.provider_id().to_owned();

        if !health.is_healthy(&id) {
            tracing::debug!(provider = %id, tier, "skipping unhealthy provider");
            continue;
        }

        if let Some(from) = &previous_id {
            TraceEvent::LlmFallback {
                from_provider: from.clone(),
                to_provider: id.clone(),
                tier: tier.to_owned(),
                reason: last_error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "previous provider unavailable".into()),
            }
            .emit();
        }

        let start = Instant::now();
        match provider.chat(req).await {
            Ok(response) => {
                health.record_success(&id);
                TraceEvent::LlmRequest {
                    provider: id.clone(),
                    model: response.model.clone(),
                    tier: tier.to_owned(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    prompt_tokens: response.usage.map(|u| u.prompt_tokens),
                    completion_tokens: response.usage.map(|u| u.completion_tokens),
                }
                .emit();
                return Ok(ChainOutcome {
                    provider_id: id,
                    response,
                });
            }
            Err(e) => {
                health.record_failure(&id);
                tracing::warn!(
                    provider = %id,
                    tier,
                    error = %e,
                    "provider call failed, trying next in chain"
                );
                previous_id = Some(id);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Provider {
        provider: "chain".into(),
        message: format!("no healthy providers in tier '{tier}'"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    fn req() -> ChatRequest {
        ChatRequest {
            messages: vec![valet_domain::chat::ChatMessage::user("hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_healthy_provider_answers() {
        let providers: Vec<Arc<dyn LlmProvider>> = vec![
            Arc::new(MockProvider::failing("down")),
            Arc::new(MockProvider::echo("up")),
        ];
        let health = HealthTracker::default();

        let outcome = run_chain(&providers, &health, &req(), "budget")
            .await
            .unwrap();
        assert_eq!(outcome.provider_id, "up");
        assert_eq!(health.failure_count("down"), 1);
    }

    #[tokio::test]
    async fn unhealthy_provider_is_not_called() {
        let down = Arc::new(MockProvider::failing("down"));
        let providers: Vec<Arc<dyn LlmProvider>> =
            vec![down.clone(), Arc::new(MockProvider::echo("up"))];
        let health = HealthTracker::new(std::time::Duration::from_secs(60), 1);
        health.record_failure("down");

        let outcome = run_chain(&providers, &health, &req(), "budget")
            .await
            .unwrap();
        assert_eq!(outcome.provider_id, "up");
        // The unhealthy provider was skipped, not invoked.
        assert_eq!(down.call_count(), 0);
    }

    #[tokio::test]
    async fn all_failing_returns_error() {
        let providers: Vec<Arc<dyn LlmProvider>> = vec![
            Arc::new(MockProvider::failing("a")),
            Arc::new(MockProvider::failing("b")),
        ];
        let health = HealthTracker::default();

        let err = run_chain(&providers, &health, &req(), "budget")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("provider"));
    }

    #[tokio::test]
    async fn empty_tier_returns_error() {
        let health = HealthTracker::default();
        let err = run_chain(&[], &health, &req(), "local").await.unwrap_err();
        assert!(err.to_string().contains("local"));
    }
}
