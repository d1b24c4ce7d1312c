//! Integration tests for the router stack — full round-trip without any
//! external service. Registry + health + chain + ladder + budget exercised
//! together through the public API.

use std::collections::HashMap;
use std::sync::Arc;

use valet_domain::chat::ChatMessage;
use valet_domain::config::{BudgetConfig, ModelPricing};
use valet_providers::mock::MockProvider;
use valet_providers::{
    BudgetGuard, ChatRequest, CostTracker, CostTracking, DegradationLadder, HealthTracker,
    LlmProvider, ProviderRegistry, OFFLINE_TIER,
};

fn registry(entries: Vec<(&str, Arc<dyn LlmProvider>)>, tiers: Vec<(&str, Vec<&str>)>) -> Arc<ProviderRegistry> {
    let providers: HashMap<String, Arc<dyn LlmProvider>> = entries
        .into_iter()
        .map(|(id, p)| (id.to_string(), p))
        .collect();
    let tiers: HashMap<String, Vec<String>> = tiers
        .into_iter()
        .map(|(t, ids)| (t.to_string(), ids.iter().map(|s| s.to_string()).collect()))
        .collect();
    Arc::new(ProviderRegistry::new(
        providers,
        tiers,
        vec![
            "cloud_premium".into(),
            "cloud_budget".into(),
            "local".into(),
        ],
        "cloud_budget".into(),
    ))
}

fn req() -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user("ping")],
        ..Default::default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Degradation end-to-end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn every_tier_failing_ends_in_offline_mode() {
    let reg = registry(
        vec![
            ("prem", Arc::new(MockProvider::failing("prem"))),
            ("cheap", Arc::new(MockProvider::failing("cheap"))),
            ("loc", Arc::new(MockProvider::failing("loc"))),
        ],
        vec![
            ("cloud_premium", vec!["prem"]),
            ("cloud_budget", vec!["cheap"]),
            ("local", vec!["loc"]),
        ],
    );
    let ladder = DegradationLadder::new(reg, Arc::new(HealthTracker::default()), "offline mode");

    let reply = ladder.chat("cloud_premium", &req()).await;

    assert!(reply.response.degraded);
    assert!(reply.response.content.contains("offline mode"));
    assert_eq!(reply.tier, OFFLINE_TIER);

    let state = ladder.state();
    assert_eq!(state.current_tier, OFFLINE_TIER);
    assert!(state.degraded_since.is_some());
    assert_eq!(
        state.available_tiers,
        vec!["cloud_premium", "cloud_budget", "local"]
    );
}

#[tokio::test]
async fn unhealthy_primary_is_skipped_without_a_call() {
    let prem: Arc<MockProvider> = Arc::new(MockProvider::failing("prem"));
    let cheap: Arc<MockProvider> = Arc::new(MockProvider::echo("cheap"));
    let reg = registry(
        vec![
            ("prem", prem.clone() as Arc<dyn LlmProvider>),
            ("cheap", cheap.clone() as Arc<dyn LlmProvider>),
        ],
        vec![
            ("cloud_premium", vec!["prem"]),
            ("cloud_budget", vec!["cheap"]),
        ],
    );
    let health = Arc::new(HealthTracker::new(std::time::Duration::from_secs(60), 3));
    let ladder = DegradationLadder::new(reg, health.clone(), "offline mode");

    // Three failures mark the premium provider unhealthy.
    for _ in 0..3 {
        let _ = ladder.chat("cloud_premium", &req()).await;
    }
    let calls_before = prem.call_count();

    let reply = ladder.chat("cloud_premium", &req()).await;
    assert_eq!(reply.provider_id.as_deref(), Some("cheap"));
    // The unhealthy provider was not invoked again.
    assert_eq!(prem.call_count(), calls_before);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cost + budget wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn wrapped_calls_feed_the_budget_guard() {
    let tracker = Arc::new(CostTracker::ephemeral());
    let mut pricing = HashMap::new();
    pricing.insert(
        "mock".to_string(),
        ModelPricing {
            // Absurd pricing so a single mock call (10 in / 5 out tokens)
            // costs 1.5 USD and trips a 2 USD daily budget on call two.
            input_per_mtok: 100_000.0,
            output_per_mtok: 100_000.0,
        },
    );
    let wrapped = CostTracking::new(
        Arc::new(MockProvider::echo("p")),
        tracker.clone(),
        pricing,
        "sess-1",
    );
    let guard = BudgetGuard::new(
        BudgetConfig {
            daily_usd: Some(2.0),
            monthly_usd: None,
            warning_threshold: 0.75,
        },
        tracker.clone(),
    );

    assert!(guard.check(1.5).is_ok());
    wrapped.chat(&req()).await.unwrap();
    assert!((tracker.daily_spend() - 1.5).abs() < 1e-9);

    let err = guard.check(1.5).unwrap_err();
    assert!(err.to_string().contains("daily"));
}

#[tokio::test]
async fn budget_block_is_not_triggered_by_warning_level() {
    let tracker = Arc::new(CostTracker::ephemeral());
    let guard = BudgetGuard::new(
        BudgetConfig {
            daily_usd: Some(1.0),
            monthly_usd: None,
            warning_threshold: 0.75,
        },
        tracker,
    );
    let verdict = guard.check(0.75).unwrap();
    assert!(verdict.warning.is_some());
}
