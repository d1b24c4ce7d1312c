//! Deep tick — the six-hourly consolidation pass.
//!
//! Full decay scan, memory fusion, session summarization, enhanced
//! forgetting, behavioral-pattern inference, trust updates, goal-deadline
//! checks, and the inner-thoughts evaluation. Each step is isolated; a
//! failure is logged and the pass moves on.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use valet_domain::chat::{ChatMessage, MessageContent};
use valet_domain::trace::TraceEvent;
use valet_memory::{fusion, ItemSource, ItemStatus, ItemType, MemoryCategory, MemoryEntry,
    ScheduledItem};
use valet_providers::{ChatRequest, LlmProvider};

use crate::prompts;
use crate::state::AppState;

use super::gaps::word_overlap;

/// Sessions summarized per deep tick at most.
const SUMMARIES_PER_TICK: usize = 5;

pub async fn run(state: &AppState) {
    full_decay(state);
    fusion_pass(state).await;
    summarize_sessions(state).await;
    forget(state);
    infer_patterns(state).await;
    update_trust(state);
    check_goal_deadlines(state);
    inner_thoughts(state).await;
}

/// The provider used for the gardener's own LLM calls.
fn gardener_provider(state: &AppState) -> Option<Arc<dyn LlmProvider>> {
    let registry = state.ladder.registry();
    registry.select_provider(&state.config.llm.default_tier, state.ladder.health())
}

// ── Decay & forgetting ────────────────────────────────────────────

fn full_decay(state: &AppState) {
    let entries = state.memory.non_static_entries();
    if entries.is_empty() {
        return;
    }
    let (scanned, updated) = state.memory.apply_decay(&entries, Utc::now(), 0.001);
    TraceEvent::MemoryDecayed { scanned, updated }.emit();
}

fn forget(state: &AppState) {
    let pruned = state
        .memory
        .prune_archived(state.config.gardener.retention_days);
    if pruned > 0 {
        state
            .gardener_stats
            .memories_pruned
            .fetch_add(pruned as u64, Ordering::Relaxed);
        tracing::info!(pruned, "pruned archived memories past retention");
    }
}

// ── Fusion ────────────────────────────────────────────────────────

async fn fusion_pass(state: &AppState) {
    let Some(provider) = gardener_provider(state) else {
        tracing::debug!("no provider available, skipping fusion pass");
        return;
    };
    let decay = &state.memory.config().decay;
    let fusion_cfg = &state.config.gardener.fusion;

    let fused = fusion::run_pass(
        &state.memory,
        provider.as_ref(),
        decay.dormant_threshold,
        decay.active_threshold,
        fusion_cfg.deep_cross_category,
        fusion_cfg.min_cluster_size,
        fusion_cfg.max_clusters,
    )
    .await;
    if fused > 0 {
        state
            .gardener_stats
            .memories_fused
            .fetch_add(fused as u64, Ordering::Relaxed);
    }
}

// ── Session summarization ─────────────────────────────────────────

fn transcript_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| {
            let text = match &m.content {
                MessageContent::Text(t) => t.clone(),
                MessageContent::Blocks(_) => m.content.extract_all_text(),
            };
            if text.trim().is_empty() {
                None
            } else {
                Some(format!("{:?}: {}", m.role, text))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn summarize_sessions(state: &AppState) {
    let Some(provider) = gardener_provider(state) else {
        return;
    };
    let idle = Duration::hours(state.config.gardener.summarize_after_hours);
    let mut stale = state.sessions.stale_unsummarized(idle);
    stale.retain(|s| s.channel != "subagent");
    stale.truncate(SUMMARIES_PER_TICK);

    for session in stale {
        let messages = state.sessions.messages(&session.session_id);
        if messages.len() < 2 {
            state.sessions.mark_summarized(&session.session_key);
            continue;
        }

        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompts::summary_prompt(
                &transcript_text(&messages),
            ))],
            temperature: Some(0.3),
            ..Default::default()
        };
        match provider.chat(&req).await {
            Ok(response) if !response.content.trim().is_empty() => {
                let mut entry = MemoryEntry::new(
                    session.user_id.clone(),
                    response.content.trim().to_owned(),
                    MemoryCategory::Event,
                    4,
                );
                entry.metadata = Some(serde_json::json!({
                    "kind": "session_summary",
                    "session_key": session.session_key,
                }));
                state.memory.insert(entry);
                state.sessions.mark_summarized(&session.session_key);
            }
            Ok(_) => {
                tracing::warn!(session = %session.session_key, "empty session summary, skipping");
            }
            Err(e) => {
                tracing::warn!(session = %session.session_key, error = %e, "session summarization failed");
            }
        }
    }
}

/// Recent session summaries for one user, newest first.
pub(super) fn recent_summaries(state: &AppState, user_id: &str, days: i64) -> Vec<String> {
    let cutoff = Utc::now() - Duration::days(days);
    let mut entries: Vec<MemoryEntry> = state
        .memory
        .entries_for_user(user_id)
        .into_iter()
        .filter(|e| {
            e.is_latest
                && e.created_at > cutoff
                && e.metadata
                    .as_ref()
                    .and_then(|m| m.get("kind"))
                    .and_then(|k| k.as_str())
                    == Some("session_summary")
        })
        .collect();
    entries.sort_by_key(|e| std::cmp::Reverse(e.created_at));
    entries.into_iter().map(|e| e.content).take(10).collect()
}

// ── Behavioral patterns ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AffectReply {
    valence: f64,
    arousal: f64,
    emotion: String,
    #[serde(default)]
    goal_signal: Option<String>,
}

async fn infer_patterns(state: &AppState) {
    let provider = gardener_provider(state);

    for user_id in state.memory.users() {
        // Message-frequency smoothing runs whether or not an LLM is up.
        state.memory.update_patterns(&user_id, |p| {
            p.daily_average = 0.7 * p.daily_average + 0.3 * p.messages_today as f64;
            p.messages_today = 0;
        });

        let summaries = recent_summaries(state, &user_id, 2);
        if summaries.is_empty() {
            continue;
        }
        let Some(provider) = &provider else { continue };

        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompts::affect_prompt(&summaries))],
            json_mode: true,
            temperature: Some(0.2),
            ..Default::default()
        };
        match provider.chat(&req).await {
            Ok(response) => match serde_json::from_str::<AffectReply>(response.content.trim()) {
                Ok(reply) => {
                    state.memory.update_patterns(&user_id, |p| {
                        p.smooth_affect(reply.valence, reply.arousal, &reply.emotion, 0.3);
                        if reply.goal_signal.is_some() {
                            p.goal_signal = reply.goal_signal.clone();
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "affect reply was not valid JSON");
                }
            },
            Err(e) => {
                tracing::warn!(user_id, error = %e, "affect inference failed");
            }
        }
    }
}

fn update_trust(state: &AppState) {
    let window = Duration::hours(6);
    let now = Utc::now();
    for user_id in state.memory.users() {
        let items = state.memory.items_for_user(&user_id);
        let recent = |t: DateTime<Utc>| now - t < window;
        let fired = items
            .iter()
            .filter(|i| i.status == ItemStatus::Fired && i.fired_at.map_or(false, recent))
            .count();
        let expired = items
            .iter()
            .filter(|i| i.status == ItemStatus::Expired && recent(i.trigger_at))
            .count();
        if fired == 0 && expired == 0 {
            continue;
        }
        state.memory.update_patterns(&user_id, |p| {
            p.trust_score = (p.trust_score + 0.02 * fired.min(5) as f64
                - 0.05 * expired.min(5) as f64)
                .clamp(0.0, 1.0);
        });
    }
}

// ── Goal deadlines & inner thoughts ───────────────────────────────

fn check_goal_deadlines(state: &AppState) {
    let now = Utc::now();
    for user_id in state.memory.users() {
        let dial = state.memory.patterns(&user_id).proactiveness;
        let pending: Vec<ScheduledItem> = state
            .memory
            .items_for_user(&user_id)
            .into_iter()
            .filter(|i| i.status == ItemStatus::Pending)
            .collect();

        let mut created = 0usize;
        for entry in state.memory.entries_for_user(&user_id) {
            if created >= dial.max_actions() {
                break;
            }
            let Some(meta) = &entry.metadata else { continue };
            if meta.get("kind").and_then(|k| k.as_str()) != Some("goal") {
                continue;
            }
            let Some(deadline) = meta
                .get("deadline")
                .and_then(|d| d.as_str())
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.with_timezone(&Utc))
            else {
                continue;
            };
            if deadline <= now || deadline - now > Duration::hours(48) {
                continue;
            }

            let message = format!("A goal's deadline is coming up: {}", entry.content);
            let already = pending
                .iter()
                .any(|i| word_overlap(&i.message, &message) >= 0.8);
            if already {
                continue;
            }

            state.memory.add_item(ScheduledItem::new(
                &user_id,
                ItemSource::Agent,
                ItemType::FollowUp,
                message,
                now + Duration::hours(1),
            ));
            created += 1;
        }
    }
}

#[derive(Debug, Deserialize)]
struct InnerThought {
    message: String,
    #[serde(default)]
    hours_from_now: Option<f64>,
}

async fn inner_thoughts(state: &AppState) {
    let Some(provider) = gardener_provider(state) else {
        return;
    };
    let now = Utc::now();

    for user_id in state.memory.users() {
        let summaries = recent_summaries(state, &user_id, 2);
        if summaries.is_empty() {
            continue;
        }
        let patterns = state.memory.patterns(&user_id);

        let req = ChatRequest {
            messages: vec![ChatMessage::user(prompts::inner_thoughts_prompt(
                &patterns, &summaries,
            ))],
            json_mode: true,
            temperature: Some(0.5),
            ..Default::default()
        };
        let thoughts: Vec<InnerThought> = match provider.chat(&req).await {
            Ok(response) => serde_json::from_str(response.content.trim()).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "inner-thoughts evaluation failed");
                continue;
            }
        };

        for thought in thoughts.into_iter().take(patterns.proactiveness.max_actions()) {
            if thought.message.trim().is_empty() {
                continue;
            }
            let hours = thought.hours_from_now.unwrap_or(4.0).clamp(0.5, 72.0);
            state.memory.add_item(ScheduledItem::new(
                &user_id,
                ItemSource::Agent,
                ItemType::FollowUp,
                thought.message,
                now + Duration::minutes((hours * 60.0) as i64),
            ));
        }
    }
}
