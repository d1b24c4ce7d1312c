//! Light tick — cheap, frequent maintenance.
//!
//! Incremental decay over recently touched or aging memories, expiry of
//! overdue scheduled items, delivery of due items to their owners'
//! channels, and a storage health ping.

use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};

use valet_domain::event::AgentEvent;
use valet_domain::trace::TraceEvent;

use crate::state::AppState;

/// Prominence write-backs smaller than this are skipped.
const DECAY_EPSILON: f64 = 0.01;

pub async fn run(state: &AppState) {
    let now = Utc::now();
    let cfg = &state.config.gardener;

    // ── Incremental decay ────────────────────────────────────────
    let window = Duration::seconds(cfg.light_interval_secs as i64);
    let candidates = state
        .memory
        .light_decay_candidates(now, window, cfg.light_batch);
    if !candidates.is_empty() {
        let (scanned, updated) = state.memory.apply_decay(&candidates, now, DECAY_EPSILON);
        TraceEvent::MemoryDecayed { scanned, updated }.emit();
    }

    // ── Scheduled items: expire, then fire ───────────────────────
    let grace = Duration::hours(cfg.expire_grace_hours);

    let expired = state.memory.expire_overdue(now, grace);
    if !expired.is_empty() {
        state
            .gardener_stats
            .items_expired
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        tracing::debug!(count = expired.len(), "expired overdue scheduled items");
    }

    for item in state.memory.due_items(now, grace) {
        // `mark_fired` is single-shot; a restart may re-deliver, the
        // fabric's dedup set keeps one process from double-sending.
        let Some(fired) = state.memory.mark_fired(item.id) else {
            continue;
        };
        let event = match fired.context.as_ref().and_then(|c| c.get("category")) {
            Some(category) => AgentEvent::Proactive {
                content: fired.message.clone(),
                category: category.as_str().unwrap_or("follow_up").to_owned(),
                urgency: fired
                    .context
                    .as_ref()
                    .and_then(|c| c.get("urgency"))
                    .and_then(|u| u.as_str())
                    .unwrap_or("normal")
                    .to_owned(),
                source: "gardener".into(),
            },
            None => AgentEvent::Trigger {
                content: fired.message.clone(),
            },
        };
        state.channels.deliver_item(&fired.user_id, fired.id, &event);
        state
            .gardener_stats
            .items_fired
            .fetch_add(1, Ordering::Relaxed);
        TraceEvent::ScheduledItemFired {
            item_id: fired.id.to_string(),
            user_id: fired.user_id.clone(),
        }
        .emit();
    }

    // ── Storage health ───────────────────────────────────────────
    if let Err(e) = state.memory.ping() {
        tracing::warn!(error = %e, "memory store health ping failed");
    }
    if let Err(e) = state.memory.flush() {
        tracing::warn!(error = %e, "memory store flush failed");
    }
    if let Err(e) = state.sessions.flush() {
        tracing::warn!(error = %e, "session store flush failed");
    }
}
