//! Core runtime — the orchestrator tying sessions, prompt building, the
//! provider ladder, skill dispatch, and persistence into one deterministic
//! loop.
//!
//! Entry point: [`run_turn`] takes a session + user message and emits
//! [`AgentEvent`]s on the caller's channel while it works.

pub mod cancel;
pub mod skills;
pub mod subagent;
pub mod turn;

pub use turn::{run_turn, TurnInput, TurnOutcome};

use valet_domain::event::{AgentEvent, MemoryEventItem};
use valet_memory::RetrievedMemory;

/// Reference pricing used for pre-flight budget estimates when the actual
/// model is not yet known (USD per million tokens).
const ESTIMATE_INPUT_PER_MTOK: f64 = 5.0;
const ESTIMATE_OUTPUT_PER_MTOK: f64 = 15.0;
const ESTIMATE_OUTPUT_TOKENS: f64 = 800.0;

/// Rough pre-flight cost estimate for a request of `prompt_chars`.
pub(crate) fn estimate_request_cost(prompt_chars: usize) -> f64 {
    let input_tokens = prompt_chars as f64 / 4.0;
    (input_tokens / 1_000_000.0) * ESTIMATE_INPUT_PER_MTOK
        + (ESTIMATE_OUTPUT_TOKENS / 1_000_000.0) * ESTIMATE_OUTPUT_PER_MTOK
}

/// Build the `memory` progress event for a retrieval pass.
pub(crate) fn memory_event(action: &str, hits: &[RetrievedMemory]) -> AgentEvent {
    AgentEvent::Memory {
        action: action.to_owned(),
        count: hits.len(),
        items: hits
            .iter()
            .map(|h| MemoryEventItem {
                kind: format!("{:?}", h.category).to_lowercase(),
                subject: h.subject.clone(),
                content: h.content.clone(),
            })
            .collect(),
    }
}
