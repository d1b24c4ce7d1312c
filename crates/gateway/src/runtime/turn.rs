//! Turn execution loop — drive one user message through plan → skill
//! invocations → result feedback → final response.
//!
//! The loop is bounded by `max_iterations`; the cancel token is checked
//! before every provider call and every skill invocation. Skill failures
//! are fed back to the model as error tool results and never unwind the
//! loop; reaching the cap closes the turn with an explanatory message.

use std::sync::Arc;

use tokio::sync::mpsc;

use valet_context::{bound_window, ContextLimits};
use valet_domain::chat::ChatMessage;
use valet_domain::error::Result;
use valet_domain::event::AgentEvent;
use valet_memory::{MemoryCommands, SearchQuery};
use valet_providers::{ChatRequest, LlmProvider, StopReason, Usage};
use valet_skills::{validate_args, SkillView};

use crate::prompts;
use crate::state::AppState;

use super::cancel::CancelToken;
use super::skills::dispatch_skill;
use super::{estimate_request_cost, memory_event};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input / Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
pub struct TurnInput {
    pub session_key: String,
    pub user_id: String,
    pub channel: String,
    pub message: String,
    pub attachments: Vec<String>,
    /// Model tier; `None` uses the configured default.
    pub tier: Option<String>,
    /// Skill surface for this turn (filtered for sub-agents).
    pub skills: SkillView,
    /// Memory command surface (read-only guard for sub-agents).
    pub memory: Arc<dyn MemoryCommands>,
    pub limits: ContextLimits,
    pub max_iterations: u32,
    /// When set (sub-agent runs), calls bypass the ladder and go straight
    /// to this wrapped provider.
    pub provider_override: Option<Arc<dyn LlmProvider>>,
    /// Replaces the assembled system prompt (sub-agent runs).
    pub system_prompt_override: Option<String>,
}

/// What a finished turn reports back.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub text: String,
    pub iterations: u32,
    pub usage: Usage,
    pub degraded: bool,
    pub cancelled: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execute one user message to completion.
///
/// Progress events stream onto `events` as they happen; the final assistant
/// text also arrives there as a `response` event. The session transcript is
/// persisted through the session store as the loop advances, so the next
/// iteration's provider input always sees a consistent transcript.
pub async fn run_turn(
    state: &AppState,
    input: TurnInput,
    events: mpsc::Sender<AgentEvent>,
    cancel: CancelToken,
) -> Result<TurnOutcome> {
    let (session, _) =
        state
            .sessions
            .resolve_or_create(&input.session_key, &input.user_id, &input.channel);
    let session_id = session.session_id.clone();

    // ── Append the user message ──────────────────────────────────
    let mut user_text = input.message.clone();
    for attachment in &input.attachments {
        user_text.push_str(&format!("\n[attachment: {attachment}]"));
    }
    let user_message = ChatMessage::user(user_text);
    state
        .sessions
        .append_message(&session_id, &user_message)?;

    // ── Build the system prompt ──────────────────────────────────
    let system_text = match &input.system_prompt_override {
        Some(text) => text.clone(),
        None => {
            let all_entries = state.memory.entries_for_user(&input.user_id);
            let profile = prompts::profile_entries(&all_entries);

            let hits = input.memory.search(&SearchQuery {
                user_id: input.user_id.clone(),
                text: input.message.clone(),
                embedding: None,
                top_k: state.config.agent.memory_top_k,
            });
            if !hits.is_empty() {
                let _ = events.send(memory_event("search", &hits)).await;
                let ids: Vec<uuid::Uuid> = hits.iter().map(|h| h.id).collect();
                input.memory.record_access(&ids);
            }

            let patterns = state.memory.patterns(&input.user_id);
            prompts::system_prompt(
                &state.config.agent.identity,
                &profile,
                &hits,
                Some(&patterns),
                &input.skills.render_index(),
            )
        }
    };

    // ── Pre-flight budget check ──────────────────────────────────
    let estimated = estimate_request_cost(system_text.len() + input.message.len());
    if let Err(e) = state.budget.check(estimated) {
        let _ = events
            .send(AgentEvent::Error {
                error: e.to_string(),
            })
            .await;
        return Err(e);
    }

    // ── The tool-use loop ────────────────────────────────────────
    let mut transcript = state.sessions.messages(&session_id);
    let mut total_usage = Usage::default();
    let mut degraded = false;

    for iteration in 0..input.max_iterations {
        if cancel.is_cancelled() {
            return Ok(finish_cancelled(iteration, total_usage));
        }

        let mut window = Vec::with_capacity(transcript.len() + 1);
        window.push(ChatMessage::system(system_text.clone()));
        window.extend(transcript.iter().cloned());
        let bounded = bound_window(window, &input.limits);

        let req = ChatRequest {
            messages: bounded,
            skills: input.skills.definitions(),
            temperature: Some(0.7),
            max_tokens: None,
            json_mode: false,
            model: None,
        };

        let response = match &input.provider_override {
            Some(provider) => match provider.chat(&req).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = events
                        .send(AgentEvent::Error {
                            error: e.to_string(),
                        })
                        .await;
                    return Err(e);
                }
            },
            None => {
                let tier = input
                    .tier
                    .clone()
                    .unwrap_or_else(|| state.config.llm.default_tier.clone());
                let reply = state.ladder.chat(&tier, &req).await;
                if let Some(usage) = reply.response.usage {
                    let cost = state
                        .config
                        .llm
                        .pricing
                        .get(&reply.response.model)
                        .map(|p| p.estimate_cost(usage.prompt_tokens, usage.completion_tokens))
                        .unwrap_or(0.0);
                    state.costs.record(valet_providers::CostRecord {
                        timestamp: chrono::Utc::now(),
                        session_id: session_id.clone(),
                        model: reply.response.model.clone(),
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                        cost_usd: cost,
                    });
                }
                reply.response
            }
        };

        if let Some(u) = &response.usage {
            total_usage.add(u);
        }
        degraded = degraded || response.degraded;

        // Natural stop: persist and answer.
        if response.stop_reason != StopReason::ToolUse || response.skill_calls.is_empty() {
            let assistant = ChatMessage::assistant(response.content.clone());
            state.sessions.append_message(&session_id, &assistant)?;
            state.sessions.record_usage(
                &input.session_key,
                total_usage.prompt_tokens as u64,
                total_usage.completion_tokens as u64,
            );
            let _ = events
                .send(AgentEvent::Response {
                    content: response.content.clone(),
                    session_id: session_id.clone(),
                })
                .await;
            return Ok(TurnOutcome {
                text: response.content,
                iterations: iteration + 1,
                usage: total_usage,
                degraded,
                cancelled: false,
            });
        }

        // ── Skill dispatch, in declaration order ─────────────────
        let assistant = ChatMessage::assistant_with_calls(&response.content, &response.skill_calls);
        state.sessions.append_message(&session_id, &assistant)?;
        transcript.push(assistant);

        let mut results: Vec<(String, String, bool)> = Vec::new();
        let mut stopped_mid_dispatch = false;

        for call in &response.skill_calls {
            if cancel.is_cancelled() {
                // Stop-notice for this and every remaining pending call.
                results.push((
                    call.call_id.clone(),
                    "[stopped by user before execution]".into(),
                    false,
                ));
                stopped_mid_dispatch = true;
                continue;
            }

            let _ = events
                .send(AgentEvent::SkillStart {
                    skill: call.skill_name.clone(),
                    input: call.arguments.clone(),
                })
                .await;

            let (content, is_error) =
                run_one_skill(state, &input, call.skill_name.as_str(), &call.arguments).await;

            if is_error {
                let _ = events
                    .send(AgentEvent::SkillError {
                        skill: call.skill_name.clone(),
                        error: content.clone(),
                    })
                    .await;
            } else {
                let _ = events
                    .send(AgentEvent::SkillComplete {
                        skill: call.skill_name.clone(),
                        output: content.clone(),
                    })
                    .await;
            }

            results.push((call.call_id.clone(), content, is_error));
        }

        let results_message = ChatMessage::tool_results(results);
        state.sessions.append_message(&session_id, &results_message)?;
        transcript.push(results_message);

        if stopped_mid_dispatch {
            return Ok(finish_cancelled(iteration + 1, total_usage));
        }
    }

    // ── Iteration cap reached ────────────────────────────────────
    let closing = format!(
        "I hit the maximum iterations ({}) for this request before finishing. \
         Here is where things stand; ask me to continue if you'd like.",
        input.max_iterations
    );
    let assistant = ChatMessage::assistant(closing.clone());
    state.sessions.append_message(&session_id, &assistant)?;
    state.sessions.record_usage(
        &input.session_key,
        total_usage.prompt_tokens as u64,
        total_usage.completion_tokens as u64,
    );
    let _ = events
        .send(AgentEvent::Response {
            content: closing.clone(),
            session_id: session_id.clone(),
        })
        .await;

    Ok(TurnOutcome {
        text: closing,
        iterations: input.max_iterations,
        usage: total_usage,
        degraded,
        cancelled: false,
    })
}

fn finish_cancelled(iterations: u32, usage: Usage) -> TurnOutcome {
    TurnOutcome {
        text: String::new(),
        iterations,
        usage,
        degraded: false,
        cancelled: true,
    }
}

/// Resolve, validate, and execute one skill call.
/// Returns `(content, is_error)` — never an Err; failures become error
/// tool results the model can recover from.
async fn run_one_skill(
    state: &AppState,
    input: &TurnInput,
    name: &str,
    arguments: &serde_json::Value,
) -> (String, bool) {
    let view: &SkillView = &input.skills;

    let (spec, handler) = match view.resolve(name) {
        Ok(found) => found,
        Err(_) => return (format!("Unknown skill: {name}"), true),
    };

    if let Err(e) = validate_args(spec, arguments) {
        return (e.to_string(), true);
    }

    let outcome = dispatch_skill(state, input, handler, arguments).await;
    (outcome.content().to_owned(), !outcome.success)
}

impl std::fmt::Debug for TurnInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnInput")
            .field("session_key", &self.session_key)
            .field("user_id", &self.user_id)
            .field("channel", &self.channel)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}
