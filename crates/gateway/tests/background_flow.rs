//! Background machinery end-to-end: proactive delivery through the light
//! tick, sub-agent spawn/await, and announce-queue behavior.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};

use valet_domain::config::Config;
use valet_domain::event::AgentEvent;
use valet_gateway::channels::ChannelFabric;
use valet_gateway::gardener::{self, GardenerStats};
use valet_gateway::runtime::cancel::CancelMap;
use valet_gateway::runtime::subagent::{self, RunStatus, SpawnInput, SubAgentScheduler};
use valet_gateway::state::AppState;
use valet_memory::{ItemSource, ItemStatus, ItemType, MemoryStore, ScheduledItem};
use valet_providers::mock::{MockProvider, ScriptStep};
use valet_providers::{
    BudgetGuard, CostTracker, DegradationLadder, HealthTracker, LlmProvider, ProviderRegistry,
};
use valet_sessions::SessionStore;
use valet_skills::SkillRegistry;

struct Harness {
    state: AppState,
    _workspace: tempfile::TempDir,
}

fn harness(providers: Vec<(&str, Arc<dyn LlmProvider>)>, config: Config) -> Harness {
    let workspace = tempfile::tempdir().unwrap();
    let provider_map: HashMap<String, Arc<dyn LlmProvider>> = providers
        .into_iter()
        .map(|(id, p)| (id.to_string(), p))
        .collect();
    let mut tiers: HashMap<String, Vec<String>> = HashMap::new();
    tiers.insert(
        "cloud_budget".into(),
        provider_map.keys().cloned().collect(),
    );
    let registry = Arc::new(ProviderRegistry::new(
        provider_map,
        tiers,
        vec!["cloud_budget".into()],
        "cloud_budget".into(),
    ));
    let ladder = Arc::new(DegradationLadder::new(
        registry,
        Arc::new(HealthTracker::default()),
        "offline mode",
    ));
    let costs = Arc::new(CostTracker::ephemeral());
    let budget = Arc::new(BudgetGuard::new(config.llm.budget.clone(), costs.clone()));

    let state = AppState {
        config: Arc::new(config),
        memory: Arc::new(MemoryStore::ephemeral(Default::default())),
        sessions: Arc::new(SessionStore::ephemeral()),
        skills: Arc::new(SkillRegistry::builtin()),
        ladder,
        costs,
        budget,
        cancel_map: Arc::new(CancelMap::new()),
        channels: Arc::new(ChannelFabric::new()),
        subagents: Arc::new(SubAgentScheduler::new()),
        gardener_stats: Arc::new(GardenerStats::default()),
        workspace: PathBuf::from(workspace.path()),
        api_token_hash: None,
    };
    Harness {
        state,
        _workspace: workspace,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Proactive delivery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn due_item_fires_as_trigger_on_the_owners_channel() {
    let h = harness(
        vec![("m", Arc::new(MockProvider::echo("m")) as Arc<dyn LlmProvider>)],
        Config::default(),
    );
    let mut rx = h.state.channels.register("ws:alice", "alice");

    let item = ScheduledItem::new(
        "alice",
        ItemSource::User,
        ItemType::Reminder,
        "water the plants",
        Utc::now() - Duration::minutes(2),
    );
    let item_id = h.state.memory.add_item(item);

    gardener::light::run(&h.state).await;

    let event = rx.try_recv().expect("expected a delivered event");
    match event {
        AgentEvent::Trigger { content } => assert_eq!(content, "water the plants"),
        other => panic!("expected Trigger, got {other:?}"),
    }
    assert_eq!(
        h.state.memory.item(item_id).unwrap().status,
        ItemStatus::Fired
    );

    // A second light tick does not re-deliver.
    gardener::light::run(&h.state).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn light_tick_with_nothing_to_do_is_a_no_op() {
    let h = harness(
        vec![("m", Arc::new(MockProvider::echo("m")) as Arc<dyn LlmProvider>)],
        Config::default(),
    );
    gardener::light::run(&h.state).await;
    let stats = h.state.gardener_stats.snapshot();
    assert_eq!(stats.items_fired, 0);
    assert_eq!(stats.items_expired, 0);
}

#[tokio::test]
async fn overdue_item_expires_instead_of_firing() {
    let h = harness(
        vec![("m", Arc::new(MockProvider::echo("m")) as Arc<dyn LlmProvider>)],
        Config::default(),
    );
    let mut rx = h.state.channels.register("ws:alice", "alice");

    let item = ScheduledItem::new(
        "alice",
        ItemSource::Agent,
        ItemType::FollowUp,
        "ancient follow-up",
        Utc::now() - Duration::days(3),
    );
    let item_id = h.state.memory.add_item(item);

    gardener::light::run(&h.state).await;

    assert_eq!(
        h.state.memory.item(item_id).unwrap().status,
        ItemStatus::Expired
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn structured_item_context_fires_as_proactive() {
    let h = harness(
        vec![("m", Arc::new(MockProvider::echo("m")) as Arc<dyn LlmProvider>)],
        Config::default(),
    );
    let mut rx = h.state.channels.register("ws:alice", "alice");

    let mut item = ScheduledItem::new(
        "alice",
        ItemSource::Agent,
        ItemType::FollowUp,
        "how did the interview go?",
        Utc::now() - Duration::minutes(1),
    );
    item.context = Some(serde_json::json!({"category": "follow_up", "urgency": "low"}));
    h.state.memory.add_item(item);

    gardener::light::run(&h.state).await;

    match rx.try_recv().expect("expected event") {
        AgentEvent::Proactive {
            content,
            category,
            urgency,
            source,
        } => {
            assert_eq!(content, "how did the interview go?");
            assert_eq!(category, "follow_up");
            assert_eq!(urgency, "low");
            assert_eq!(source, "gardener");
        }
        other => panic!("expected Proactive, got {other:?}"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sub-agents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn spawn_and_wait_completes_with_sentinel() {
    let provider = Arc::new(MockProvider::scripted(
        "m",
        vec![ScriptStep::Text("counted 3 files [DONE]".into())],
    ));
    let h = harness(
        vec![("m", provider as Arc<dyn LlmProvider>)],
        Config::default(),
    );

    let entry = subagent::spawn_and_wait(
        h.state.clone(),
        "ws:alice",
        "alice",
        SpawnInput {
            task: "count the files in the workspace".into(),
            allowed_skills: None,
            tier: None,
        },
    )
    .await;

    assert!(!entry.failed);
    assert_eq!(entry.result, "counted 3 files");

    let runs = h.state.subagents.runs_for_parent("ws:alice");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    // The deny list held even though the task mentioned files.
    assert!(!runs[0].allowed_skills.contains(&"spawn_agent".to_string()));
}

#[tokio::test]
async fn missing_sentinel_is_announced_as_incomplete() {
    let provider = Arc::new(MockProvider::scripted(
        "m",
        vec![ScriptStep::Text("here is a partial answer".into())],
    ));
    let h = harness(
        vec![("m", provider as Arc<dyn LlmProvider>)],
        Config::default(),
    );

    let entry = subagent::spawn_and_wait(
        h.state.clone(),
        "ws:alice",
        "alice",
        SpawnInput {
            task: "do the thing".into(),
            allowed_skills: None,
            tier: None,
        },
    )
    .await;

    assert!(entry.failed);
    assert!(entry.result.starts_with("Error:"));
    let runs = h.state.subagents.runs_for_parent("ws:alice");
    assert_eq!(runs[0].status, RunStatus::Failed);
}

#[tokio::test]
async fn announce_queue_holds_results_until_drained() {
    let provider = Arc::new(MockProvider::scripted(
        "m",
        vec![ScriptStep::Text("done quickly [DONE]".into())],
    ));
    let h = harness(
        vec![("m", provider as Arc<dyn LlmProvider>)],
        Config::default(),
    );

    // No client connected: the announce must queue.
    let spawned = subagent::spawn(
        h.state.clone(),
        "ws:alice",
        "alice",
        SpawnInput {
            task: "quick job".into(),
            allowed_skills: None,
            tier: None,
        },
    );

    // Wait for the run to reach a terminal state.
    for _ in 0..100 {
        if h.state
            .subagents
            .run(spawned.run_id)
            .map(|r| r.status.is_terminal())
            .unwrap_or(false)
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    assert_eq!(h.state.subagents.pending_announcements("ws:alice"), 1);
    let drained = h.state.subagents.drain_announcements("ws:alice");
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].result, "done quickly");
    // FIFO drain empties the queue.
    assert!(h.state.subagents.drain_announcements("ws:alice").is_empty());
}

#[tokio::test]
async fn sub_agent_timeout_announces_failure() {
    // A provider that loops skill calls forever against a 1-second budget.
    let provider = Arc::new(MockProvider::looping_skill(
        "m",
        "shell",
        serde_json::json!({"command": "sleep 5"}),
    ));
    let mut config = Config::default();
    config.subagent.timeout_secs = 1;
    config.subagent.max_iterations = 50;
    let h = harness(vec![("m", provider as Arc<dyn LlmProvider>)], config);

    let entry = subagent::spawn_and_wait(
        h.state.clone(),
        "ws:alice",
        "alice",
        SpawnInput {
            task: "never finishes".into(),
            allowed_skills: Some(vec!["shell".into()]),
            tier: None,
        },
    )
    .await;

    assert!(entry.failed);
    assert!(entry.result.starts_with("Error:"));
    let runs = h.state.subagents.runs_for_parent("ws:alice");
    assert_eq!(runs[0].status, RunStatus::TimedOut);
}

#[tokio::test]
async fn cancel_for_parent_stops_live_runs() {
    let provider = Arc::new(MockProvider::looping_skill(
        "m",
        "shell",
        serde_json::json!({"command": "sleep 5"}),
    ));
    let mut config = Config::default();
    config.subagent.timeout_secs = 60;
    let h = harness(vec![("m", provider as Arc<dyn LlmProvider>)], config);

    let spawned = subagent::spawn(
        h.state.clone(),
        "ws:alice",
        "alice",
        SpawnInput {
            task: "long job".into(),
            allowed_skills: Some(vec!["shell".into()]),
            tier: None,
        },
    );

    // Give the run a moment to start.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let cancelled = subagent::cancel_for_parent(&h.state, "ws:alice");
    assert_eq!(cancelled, 1);
    assert_eq!(
        h.state.subagents.run(spawned.run_id).unwrap().status,
        RunStatus::Cancelled
    );
}
