//! Wiring: config → stores → providers → app state → server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use valet_domain::config::Config;
use valet_memory::MemoryStore;
use valet_providers::{BudgetGuard, CostTracker, DegradationLadder, HealthTracker,
    ProviderRegistry};
use valet_sessions::SessionStore;
use valet_skills::SkillRegistry;

use crate::api;
use crate::channels::ChannelFabric;
use crate::gardener::{self, GardenerStats};
use crate::runtime::cancel::CancelMap;
use crate::runtime::subagent::SubAgentScheduler;
use crate::state::AppState;

/// Build the full application state from a loaded config.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    let state_path = PathBuf::from(&config.server.state_path);
    std::fs::create_dir_all(&state_path)?;
    let workspace = PathBuf::from(&config.server.workspace_path);
    std::fs::create_dir_all(&workspace)?;

    let memory = Arc::new(MemoryStore::new(&state_path, config.memory.clone())?);
    let sessions = Arc::new(SessionStore::new(&state_path)?);
    let skills = Arc::new(SkillRegistry::builtin());

    let registry = Arc::new(ProviderRegistry::from_config(&config.llm)?);
    let health = Arc::new(HealthTracker::new(
        Duration::from_secs(config.llm.health_window_secs),
        config.llm.failure_threshold,
    ));
    let ladder = Arc::new(DegradationLadder::new(
        registry,
        health,
        config.llm.offline_message.clone(),
    ));

    let costs = Arc::new(CostTracker::new(&state_path));
    let budget = Arc::new(BudgetGuard::new(config.llm.budget.clone(), costs.clone()));

    let api_token_hash = api::auth::token_hash_from_env(&config.server.api_token_env);
    if api_token_hash.is_none() {
        tracing::warn!(
            env = %config.server.api_token_env,
            "no API token configured; running in open dev mode"
        );
    }

    Ok(AppState {
        config: Arc::new(config),
        memory,
        sessions,
        skills,
        ladder,
        costs,
        budget,
        cancel_map: Arc::new(CancelMap::new()),
        channels: Arc::new(ChannelFabric::new()),
        subagents: Arc::new(SubAgentScheduler::new()),
        gardener_stats: Arc::new(GardenerStats::default()),
        workspace,
        api_token_hash,
    })
}

/// Serve until ctrl-c; flushes stores on the way out.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let gardener_task = gardener::spawn(state.clone());

    let listener = tokio::net::TcpListener::bind(&state.config.server.listen).await?;
    tracing::info!(listen = %state.config.server.listen, "valetd listening");

    let app = api::router(state.clone());
    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            if let Err(e) = shutdown_state.memory.flush() {
                tracing::warn!(error = %e, "memory flush on shutdown failed");
            }
            if let Err(e) = shutdown_state.sessions.flush() {
                tracing::warn!(error = %e, "session flush on shutdown failed");
            }
        })
        .await?;

    gardener_task.abort();
    Ok(())
}
