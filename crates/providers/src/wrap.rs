//! Provider decorators.
//!
//! [`CostTracking`] records spend into the ledger after every call.
//! [`TokenBudget`] cuts a caller off once its cumulative input tokens exceed
//! a ceiling; sub-agent runs are wrapped with both, cost first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use valet_domain::config::ModelPricing;
use valet_domain::error::{Error, Result};

use crate::cost::{CostRecord, CostTracker};
use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CostTracking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Records a [`CostRecord`] for every successful chat call.
pub struct CostTracking {
    inner: Arc<dyn LlmProvider>,
    tracker: Arc<CostTracker>,
    pricing: HashMap<String, ModelPricing>,
    session_id: String,
}

impl CostTracking {
    pub fn new(
        inner: Arc<dyn LlmProvider>,
        tracker: Arc<CostTracker>,
        pricing: HashMap<String, ModelPricing>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            tracker,
            pricing,
            session_id: session_id.into(),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for CostTracking {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let response = self.inner.chat(req).await?;
        if let Some(usage) = response.usage {
            let cost = self
                .pricing
                .get(&response.model)
                .map(|p| p.estimate_cost(usage.prompt_tokens, usage.completion_tokens))
                .unwrap_or(0.0);
            self.tracker.record(CostRecord {
                timestamp: Utc::now(),
                session_id: self.session_id.clone(),
                model: response.model.clone(),
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cost_usd: cost,
            });
        }
        Ok(response)
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.inner.embeddings(req).await
    }

    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TokenBudget
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors once the cumulative input-token count exceeds the ceiling.
///
/// The count is taken from reported usage after each call, so the call that
/// crosses the ceiling completes; the next one is refused.
pub struct TokenBudget {
    inner: Arc<dyn LlmProvider>,
    max_input_tokens: u64,
    used_input_tokens: AtomicU64,
}

impl TokenBudget {
    pub fn new(inner: Arc<dyn LlmProvider>, max_input_tokens: u64) -> Self {
        Self {
            inner,
            max_input_tokens,
            used_input_tokens: AtomicU64::new(0),
        }
    }

    pub fn used_input_tokens(&self) -> u64 {
        self.used_input_tokens.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl LlmProvider for TokenBudget {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let used = self.used_input_tokens.load(Ordering::Relaxed);
        if used > self.max_input_tokens {
            return Err(Error::Budget(format!(
                "input token budget exceeded: {used} > {} tokens",
                self.max_input_tokens
            )));
        }
        let response = self.inner.chat(req).await?;
        if let Some(usage) = response.usage {
            self.used_input_tokens
                .fetch_add(usage.prompt_tokens as u64, Ordering::Relaxed);
        }
        Ok(response)
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        self.inner.embeddings(req).await
    }

    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use valet_domain::chat::ChatMessage;

    fn req() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cost_tracking_records_spend() {
        let tracker = Arc::new(CostTracker::ephemeral());
        let mut pricing = HashMap::new();
        pricing.insert(
            "mock".to_string(),
            ModelPricing {
                input_per_mtok: 1.0,
                output_per_mtok: 2.0,
            },
        );
        let wrapped = CostTracking::new(
            Arc::new(MockProvider::echo("p1")),
            tracker.clone(),
            pricing,
            "sess",
        );

        wrapped.chat(&req()).await.unwrap();
        assert_eq!(tracker.total_requests(), 1);
        assert!(tracker.daily_spend() > 0.0);
    }

    #[tokio::test]
    async fn token_budget_cuts_off_after_ceiling() {
        // Mock reports 10 prompt tokens per call; ceiling 15 lets the first
        // two calls through (crossing happens after call two) and refuses
        // the third.
        let wrapped = TokenBudget::new(Arc::new(MockProvider::echo("p1")), 15);

        wrapped.chat(&req()).await.unwrap();
        wrapped.chat(&req()).await.unwrap();
        let err = wrapped.chat(&req()).await.unwrap_err();
        assert!(matches!(err, Error::Budget(_)));
        assert_eq!(wrapped.used_input_tokens(), 20);
    }
}
