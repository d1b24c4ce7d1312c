//! Sleep tick — the nightly pass, gated to quiet hours.
//!
//! Dream cycle (fusion at a wider prominence band, across category
//! boundaries), self-reflection into insight memories, and the gap
//! scanner.

use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};

use valet_domain::chat::ChatMessage;
use valet_memory::{fusion, ItemSource, ItemStatus, ItemType, MemoryCategory, MemoryEntry,
    ScheduledItem};
use valet_providers::ChatRequest;

use crate::prompts;
use crate::state::AppState;

use super::deep::recent_summaries;
use super::gaps::{self, word_overlap};

pub async fn run(state: &AppState) {
    dream(state).await;
    reflect(state).await;
    scan_gaps(state);
}

// ── Dream cycle ───────────────────────────────────────────────────

/// NREM-style consolidation: the fusion band widens below the dormant
/// floor and above the active threshold, and category boundaries open up.
async fn dream(state: &AppState) {
    let registry = state.ladder.registry();
    let Some(provider) =
        registry.select_provider(&state.config.llm.default_tier, state.ladder.health())
    else {
        tracing::debug!("no provider available, skipping dream cycle");
        return;
    };
    let decay = &state.memory.config().decay;
    let fusion_cfg = &state.config.gardener.fusion;

    let min = (decay.dormant_threshold * 0.5).max(0.02);
    let max = (decay.active_threshold + 0.25).min(0.9);

    let fused = fusion::run_pass(
        &state.memory,
        provider.as_ref(),
        min,
        max,
        fusion_cfg.sleep_cross_category,
        fusion_cfg.min_cluster_size,
        fusion_cfg.max_clusters,
    )
    .await;
    if fused > 0 {
        state
            .gardener_stats
            .memories_fused
            .fetch_add(fused as u64, Ordering::Relaxed);
        tracing::info!(fused, "dream cycle consolidated memory clusters");
    }
}

// ── Self-reflection ───────────────────────────────────────────────

async fn reflect(state: &AppState) {
    let registry = state.ladder.registry();
    let Some(provider) =
        registry.select_provider(&state.config.llm.default_tier, state.ladder.health())
    else {
        return;
    };

    for user_id in state.memory.users() {
        let summaries = recent_summaries(state, &user_id, 7);
        if summaries.len() < 2 {
            continue;
        }
        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompts::reflection_prompt(&summaries))],
            temperature: Some(0.6),
            ..Default::default()
        };
        match provider.chat(&req).await {
            Ok(response) if !response.content.trim().is_empty() => {
                let mut entry = MemoryEntry::new(
                    user_id.clone(),
                    response.content.trim().to_owned(),
                    MemoryCategory::Insight,
                    6,
                );
                entry.metadata = Some(serde_json::json!({"kind": "reflection"}));
                state.memory.insert(entry);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user_id, error = %e, "self-reflection failed");
            }
        }
    }
}

// ── Gap scanner ───────────────────────────────────────────────────

fn scan_gaps(state: &AppState) {
    let now = Utc::now();
    for user_id in state.memory.users() {
        let entries = state.memory.entries_for_user(&user_id);
        let items = state.memory.items_for_user(&user_id);
        let patterns = state.memory.patterns(&user_id);

        let mut candidates = gaps::detect_stale_goals(&entries, now);
        candidates.extend(gaps::detect_unresolved_threads(&items, now));
        candidates.extend(gaps::detect_anomalies(&patterns));

        let deduped = gaps::dedupe(candidates);

        // Skip anything already covered by a pending item.
        let pending: Vec<String> = items
            .iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .map(|i| i.message.clone())
            .collect();
        let fresh: Vec<_> = deduped
            .into_iter()
            .filter(|c| !pending.iter().any(|p| word_overlap(p, &c.message) >= 0.8))
            .collect();

        let actions = gaps::triage(fresh, patterns.proactiveness);
        let count = actions.len();
        for action in actions {
            state.memory.add_item(ScheduledItem::new(
                &user_id,
                ItemSource::Agent,
                ItemType::FollowUp,
                action.message,
                now + Duration::hours(16),
            ));
        }
        if count > 0 {
            tracing::info!(user_id, count, "gap scanner scheduled follow-ups");
        }
    }
}
