//! Sub-agent scheduler — spawn bounded child agents for background tasks.
//!
//! Children run against their own session with a filtered skill surface, a
//! read-only memory view, tight context limits, a token budget, and a
//! wall-clock deadline. Results are announced on a per-parent FIFO queue
//! and pushed to the parent's channel when one is connected. Runs are
//! serialized through a named lock keyed `subagent:{run_id}`, so nothing
//! interleaves state mutations for the same run.
//!
//! A run counts as complete only when its final response carries the
//! `[DONE]` sentinel; every other exit (iteration cap, token budget,
//! timeout) is announced as a failure.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use valet_context::ContextLimits;
use valet_domain::error::Error;
use valet_domain::event::AgentEvent;
use valet_domain::trace::TraceEvent;
use valet_memory::{MemoryCommands, ReadOnlyMemory, SearchQuery};
use valet_providers::{CostTracking, LlmProvider, TokenBudget, Usage};
use valet_skills::SkillView;

use crate::prompts;
use crate::state::AppState;

use super::turn::{run_turn, TurnInput};

/// Sentinel a child must emit to mark its work complete. Stripped before
/// the result is published.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Skills granted when the spawner names none.
const DEFAULT_SKILLS: &[&str] = &[
    "read_file",
    "write_file",
    "shell",
    "web_search",
    "memory_search",
];

/// Never handed to a child, whatever the spawner or the keyword pass says.
const NEVER_ALLOWED: &[&str] = &["spawn_agent", "check_agents", "send_user_message"];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubAgentRun {
    pub run_id: Uuid,
    pub parent_session: String,
    pub child_session: String,
    pub label: String,
    pub task: String,
    pub allowed_skills: Vec<String>,
    pub tier: String,
    pub status: RunStatus,
    pub result: Option<String>,
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One entry on a parent's announce queue.
#[derive(Debug, Clone, Serialize)]
pub struct AnnounceEntry {
    pub run_id: Uuid,
    pub parent_session: String,
    pub label: String,
    pub result: String,
    pub token_usage: Usage,
    pub timestamp: DateTime<Utc>,
    pub failed: bool,
}

/// What `spawn` hands back immediately.
pub struct Spawned {
    pub run_id: Uuid,
    pub child_session_key: String,
}

pub struct SpawnInput {
    pub task: String,
    pub allowed_skills: Option<Vec<String>>,
    pub tier: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct SubAgentScheduler {
    runs: Mutex<HashMap<Uuid, SubAgentRun>>,
    /// Parent session → FIFO of finished-run announcements.
    announce: Mutex<HashMap<String, VecDeque<AnnounceEntry>>>,
    /// Named serialization locks, keyed `subagent:{run_id}`.
    named_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubAgentScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, run_id: Uuid) -> Option<SubAgentRun> {
        self.runs.lock().get(&run_id).cloned()
    }

    pub fn runs_for_parent(&self, parent_session: &str) -> Vec<SubAgentRun> {
        let mut runs: Vec<SubAgentRun> = self
            .runs
            .lock()
            .values()
            .filter(|r| r.parent_session == parent_session)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    /// Pop every queued announcement for a parent, FIFO order.
    pub fn drain_announcements(&self, parent_session: &str) -> Vec<AnnounceEntry> {
        self.announce
            .lock()
            .get_mut(parent_session)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    /// Queued (undrained) announcements, FIFO order.
    pub fn pending_announcements(&self, parent_session: &str) -> usize {
        self.announce
            .lock()
            .get(parent_session)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.named_locks
            .lock()
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn update(&self, run_id: Uuid, f: impl FnOnce(&mut SubAgentRun)) {
        if let Some(run) = self.runs.lock().get_mut(&run_id) {
            f(run);
        }
    }

    fn enqueue_announce(&self, entry: AnnounceEntry) {
        self.announce
            .lock()
            .entry(entry.parent_session.clone())
            .or_default()
            .push_back(entry);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability derivation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Derive the capability surface for a child run.
///
/// Start from the explicit allowlist (or the default set), add skills the
/// task text implies, subtract the never-allowed set, and intersect with
/// the concrete registry. The deny list wins over every other source.
pub fn derive_capabilities(
    explicit: Option<&[String]>,
    task: &str,
    registry_names: &[String],
) -> HashSet<String> {
    let mut allowed: HashSet<String> = match explicit {
        Some(list) => list.iter().cloned().collect(),
        None => DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect(),
    };

    // Keyword auto-selection over the task text.
    let lower = task.to_lowercase();
    let search_re = regex::Regex::new(r"search|find|look up").unwrap();
    let file_re = regex::Regex::new(r"file|read|write|edit").unwrap();
    let shell_re = regex::Regex::new(r"\brun\b|command|shell|script|execute").unwrap();
    let memory_re = regex::Regex::new(r"remember|memor").unwrap();

    if search_re.is_match(&lower) {
        allowed.insert("web_search".into());
        allowed.insert("memory_search".into());
    }
    if file_re.is_match(&lower) {
        allowed.insert("read_file".into());
        allowed.insert("write_file".into());
    }
    if shell_re.is_match(&lower) {
        allowed.insert("shell".into());
    }
    if memory_re.is_match(&lower) {
        allowed.insert("memory_search".into());
    }

    for denied in NEVER_ALLOWED {
        allowed.remove(*denied);
    }

    let registry: HashSet<&str> = registry_names.iter().map(|s| s.as_str()).collect();
    allowed.retain(|name| registry.contains(name.as_str()));
    allowed
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Spawning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn short_label(task: &str) -> String {
    let words: Vec<&str> = task.split_whitespace().take(5).collect();
    let mut label = words.join(" ");
    if label.len() > 48 {
        label.truncate(45);
        label.push_str("...");
    }
    label
}

/// Enqueue an asynchronous run. Returns the run id and child session key
/// immediately; the run executes on its own task.
pub fn spawn(
    state: AppState,
    parent_session: &str,
    user_id: &str,
    input: SpawnInput,
) -> Spawned {
    let run_id = Uuid::new_v4();
    let child_session_key = valet_sessions::subagent_key(&run_id.to_string());
    let tier = input
        .tier
        .clone()
        .unwrap_or_else(|| state.config.subagent.default_tier.clone());

    let allowed = derive_capabilities(
        input.allowed_skills.as_deref(),
        &input.task,
        &state.skills.names(),
    );

    let run = SubAgentRun {
        run_id,
        parent_session: parent_session.to_owned(),
        child_session: child_session_key.clone(),
        label: short_label(&input.task),
        task: input.task.clone(),
        allowed_skills: {
            let mut v: Vec<String> = allowed.iter().cloned().collect();
            v.sort();
            v
        },
        tier,
        status: RunStatus::Pending,
        result: None,
        usage: Usage::default(),
        created_at: Utc::now(),
        finished_at: None,
    };
    state.subagents.runs.lock().insert(run_id, run);

    TraceEvent::SubAgentSpawned {
        run_id: run_id.to_string(),
        parent_session: parent_session.to_owned(),
        skills: allowed.len(),
    }
    .emit();

    let user_id = user_id.to_owned();
    tokio::spawn(async move {
        let entry = execute_run(&state, run_id, &user_id).await;
        announce(&state, entry);
    });

    Spawned {
        run_id,
        child_session_key,
    }
}

/// Spawn and block on completion. Returns the announce entry directly
/// (it is not queued).
pub async fn spawn_and_wait(
    state: AppState,
    parent_session: &str,
    user_id: &str,
    input: SpawnInput,
) -> AnnounceEntry {
    let spawned = {
        // Register exactly like `spawn` but run inline.
        let run_id = Uuid::new_v4();
        let child_session_key = valet_sessions::subagent_key(&run_id.to_string());
        let tier = input
            .tier
            .clone()
            .unwrap_or_else(|| state.config.subagent.default_tier.clone());
        let allowed = derive_capabilities(
            input.allowed_skills.as_deref(),
            &input.task,
            &state.skills.names(),
        );
        let run = SubAgentRun {
            run_id,
            parent_session: parent_session.to_owned(),
            child_session: child_session_key.clone(),
            label: short_label(&input.task),
            task: input.task.clone(),
            allowed_skills: allowed.iter().cloned().collect(),
            tier,
            status: RunStatus::Pending,
            result: None,
            usage: Usage::default(),
            created_at: Utc::now(),
            finished_at: None,
        };
        state.subagents.runs.lock().insert(run_id, run);
        Spawned {
            run_id,
            child_session_key,
        }
    };
    execute_run(&state, spawned.run_id, user_id).await
}

/// Cancel a run. Returns true when the run existed and was still live.
pub fn cancel(state: &AppState, run_id: Uuid) -> bool {
    let Some(run) = state.subagents.run(run_id) else {
        return false;
    };
    if run.status.is_terminal() {
        return false;
    }
    state.cancel_map.cancel(&run.child_session);
    state.subagents.update(run_id, |r| {
        r.status = RunStatus::Cancelled;
        r.finished_at = Some(Utc::now());
    });
    true
}

/// Cancel every live run of a parent session. Returns how many were hit.
pub fn cancel_for_parent(state: &AppState, parent_session: &str) -> usize {
    let run_ids: Vec<Uuid> = state
        .subagents
        .runs_for_parent(parent_session)
        .into_iter()
        .filter(|r| !r.status.is_terminal())
        .map(|r| r.run_id)
        .collect();
    run_ids.into_iter().filter(|id| cancel(state, *id)).count()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn execute_run(state: &AppState, run_id: Uuid, user_id: &str) -> AnnounceEntry {
    let Some(run) = state.subagents.run(run_id) else {
        return AnnounceEntry {
            run_id,
            parent_session: String::new(),
            label: "unknown".into(),
            result: "Error: run record vanished".into(),
            token_usage: Usage::default(),
            timestamp: Utc::now(),
            failed: true,
        };
    };

    // Serialize all state mutations for this run.
    let lock = state.subagents.lock_for(&format!("subagent:{run_id}"));
    let _guard = lock.lock().await;

    // If the run was cancelled while queued, don't start it.
    if state
        .subagents
        .run(run_id)
        .map(|r| r.status.is_terminal())
        .unwrap_or(true)
    {
        return failure_entry(&run, "Error: run cancelled before start", Usage::default());
    }

    state.subagents.update(run_id, |r| r.status = RunStatus::Running);

    // ── Provider: router selection, then cost + token-budget wraps ──
    let registry = state.ladder.registry();
    let Some(base_provider) = registry.select_provider(&run.tier, state.ladder.health()) else {
        let entry = failure_entry(
            &run,
            &format!("Error: no healthy provider for tier '{}'", run.tier),
            Usage::default(),
        );
        finish(state, run_id, RunStatus::Failed, &entry);
        return entry;
    };
    let cost_wrapped: Arc<dyn LlmProvider> = Arc::new(CostTracking::new(
        base_provider,
        state.costs.clone(),
        state.config.llm.pricing.clone(),
        run.child_session.clone(),
    ));
    let budgeted: Arc<dyn LlmProvider> = Arc::new(TokenBudget::new(
        cost_wrapped,
        state.config.subagent.max_input_tokens,
    ));

    // ── Capability surface & memory guard ───────────────────────
    let allowed: HashSet<String> = run.allowed_skills.iter().cloned().collect();
    let skills = SkillView::filtered(state.skills.clone(), allowed);

    let memory: Arc<dyn MemoryCommands> = if state.config.subagent.read_only_memory {
        Arc::new(ReadOnlyMemory::new(state.memory.clone()))
    } else {
        state.memory.clone()
    };

    // ── Child system prompt ──────────────────────────────────────
    let all_entries = state.memory.entries_for_user(user_id);
    let profile = prompts::profile_entries(&all_entries);
    let retrieved = memory.search(&SearchQuery {
        user_id: user_id.to_owned(),
        text: run.task.clone(),
        embedding: None,
        top_k: 3,
    });
    let system_prompt = prompts::subagent_prompt(&run.task, &profile, &retrieved);

    // ── Cancellation: token + parent cascade + deadline ──────────
    let cancel_token = state.cancel_map.register(&run.child_session);
    state
        .cancel_map
        .add_to_group(&run.parent_session, &run.child_session);

    let deadline = std::time::Duration::from_secs(state.config.subagent.timeout_secs);
    let watchdog_token = cancel_token.clone();
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        watchdog_token.cancel();
    });

    // ── Forward child progress to the parent, re-labelled ────────
    let (events_tx, events_rx) = mpsc::channel::<AgentEvent>(64);
    let forwarder = spawn_event_forwarder(state, &run, events_rx);

    let turn_input = TurnInput {
        session_key: run.child_session.clone(),
        user_id: user_id.to_owned(),
        channel: "subagent".into(),
        message: run.task.clone(),
        attachments: Vec::new(),
        tier: Some(run.tier.clone()),
        skills,
        memory,
        limits: ContextLimits {
            hot_window_messages: state.config.subagent.hot_window_messages,
            max_total_chars: state.config.subagent.max_total_chars,
            tool_output_max_chars: state.config.subagent.tool_output_max_chars,
        },
        max_iterations: state.config.subagent.max_iterations,
        provider_override: Some(budgeted),
        system_prompt_override: Some(system_prompt),
    };

    let result = tokio::time::timeout(
        deadline + std::time::Duration::from_secs(5),
        run_turn(state, turn_input, events_tx, cancel_token.clone()),
    )
    .await;

    watchdog.abort();
    forwarder.abort();
    state
        .cancel_map
        .remove_from_group(&run.parent_session, &run.child_session);
    state.cancel_map.remove(&run.child_session);

    // ── Interpret the exit ───────────────────────────────────────
    let entry = match result {
        Err(_) => {
            // Hard wall-clock expiry.
            let entry = failure_entry(
                &run,
                &format!(
                    "Error: sub-agent timed out after {}s",
                    state.config.subagent.timeout_secs
                ),
                Usage::default(),
            );
            finish(state, run_id, RunStatus::TimedOut, &entry);
            entry
        }
        Ok(Err(e)) => {
            let text = match &e {
                Error::Budget(msg) => format!("Error: {msg}"),
                other => format!("Error: {other}"),
            };
            let entry = failure_entry(&run, &text, Usage::default());
            finish(state, run_id, RunStatus::Failed, &entry);
            entry
        }
        Ok(Ok(outcome)) if outcome.cancelled => {
            let status = if cancel_token.is_cancelled()
                && state
                    .subagents
                    .run(run_id)
                    .map(|r| r.status == RunStatus::Cancelled)
                    .unwrap_or(false)
            {
                RunStatus::Cancelled
            } else {
                // Cancellation we triggered ourselves = the deadline.
                RunStatus::TimedOut
            };
            let entry = failure_entry(
                &run,
                &format!(
                    "Error: sub-agent {} before finishing",
                    if status == RunStatus::Cancelled {
                        "was cancelled"
                    } else {
                        "timed out"
                    }
                ),
                outcome.usage,
            );
            finish(state, run_id, status, &entry);
            entry
        }
        Ok(Ok(outcome)) => {
            // Complete only with the sentinel; everything else is an
            // incomplete exit.
            if let Some(stripped) = strip_sentinel(&outcome.text) {
                let entry = AnnounceEntry {
                    run_id,
                    parent_session: run.parent_session.clone(),
                    label: run.label.clone(),
                    result: stripped,
                    token_usage: outcome.usage,
                    timestamp: Utc::now(),
                    failed: false,
                };
                finish(state, run_id, RunStatus::Completed, &entry);
                entry
            } else {
                let entry = failure_entry(
                    &run,
                    &format!("Error: sub-agent stopped without completing: {}", outcome.text),
                    outcome.usage,
                );
                finish(state, run_id, RunStatus::Failed, &entry);
                entry
            }
        }
    };

    entry
}

fn strip_sentinel(text: &str) -> Option<String> {
    if text.contains(DONE_SENTINEL) {
        Some(text.replace(DONE_SENTINEL, "").trim().to_owned())
    } else {
        None
    }
}

fn failure_entry(run: &SubAgentRun, message: &str, usage: Usage) -> AnnounceEntry {
    AnnounceEntry {
        run_id: run.run_id,
        parent_session: run.parent_session.clone(),
        label: run.label.clone(),
        result: message.to_owned(),
        token_usage: usage,
        timestamp: Utc::now(),
        failed: true,
    }
}

fn finish(state: &AppState, run_id: Uuid, status: RunStatus, entry: &AnnounceEntry) {
    state.subagents.update(run_id, |r| {
        // Cancelled runs keep their status.
        if !r.status.is_terminal() {
            r.status = status;
        }
        r.result = Some(entry.result.clone());
        r.usage = entry.token_usage;
        r.finished_at = Some(Utc::now());
    });
}

/// Queue the announce entry and push it to the parent's channel when a
/// client is connected. The queue keeps entries for `check_agents` when
/// nobody is listening.
fn announce(state: &AppState, entry: AnnounceEntry) {
    let urgency = if entry.failed { "high" } else { "normal" };
    let event = AgentEvent::Proactive {
        content: entry.result.clone(),
        category: "subagent".into(),
        urgency: urgency.into(),
        source: entry.label.clone(),
    };
    let delivered = state.channels.send(&entry.parent_session, &event);
    if delivered == 0 {
        state.subagents.enqueue_announce(entry);
    }
}

fn spawn_event_forwarder(
    state: &AppState,
    run: &SubAgentRun,
    mut events_rx: mpsc::Receiver<AgentEvent>,
) -> tokio::task::JoinHandle<()> {
    let channels = state.channels.clone();
    let parent = run.parent_session.clone();
    let label = run.label.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let message = match event {
                AgentEvent::SkillStart { skill, .. } => format!("[{label}] running {skill}"),
                AgentEvent::SkillError { skill, error } => {
                    format!("[{label}] {skill} failed: {error}")
                }
                AgentEvent::Response { .. } => format!("[{label}] drafting result"),
                _ => continue,
            };
            channels.send(&parent, &AgentEvent::Planning { message });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_names() -> Vec<String> {
        valet_skills::SkillRegistry::builtin().names()
    }

    #[test]
    fn default_capabilities_without_hints() {
        let caps = derive_capabilities(None, "summarize the report", &registry_names());
        assert!(caps.contains("shell"));
        assert!(caps.contains("read_file"));
        assert!(!caps.contains("spawn_agent"));
    }

    #[test]
    fn keyword_autoselect_adds_search_tools() {
        let caps = derive_capabilities(
            Some(&["shell".to_string()]),
            "find the latest release notes",
            &registry_names(),
        );
        assert!(caps.contains("web_search"));
        assert!(caps.contains("memory_search"));
        assert!(caps.contains("shell"));
    }

    #[test]
    fn deny_list_wins_over_explicit_allow() {
        let caps = derive_capabilities(
            Some(&["spawn_agent".to_string(), "send_user_message".to_string(), "shell".to_string()]),
            "message the user about files",
            &registry_names(),
        );
        assert!(!caps.contains("spawn_agent"));
        assert!(!caps.contains("send_user_message"));
        assert!(!caps.contains("check_agents"));
        assert!(caps.contains("shell"));
    }

    #[test]
    fn unknown_skills_are_dropped_by_registry_intersection() {
        let caps = derive_capabilities(
            Some(&["teleport".to_string(), "shell".to_string()]),
            "work",
            &registry_names(),
        );
        assert!(!caps.contains("teleport"));
        assert!(caps.contains("shell"));
    }

    #[test]
    fn sentinel_stripping() {
        assert_eq!(
            strip_sentinel("the answer is 42 [DONE]").as_deref(),
            Some("the answer is 42")
        );
        assert!(strip_sentinel("no sentinel here").is_none());
    }

    #[test]
    fn labels_are_short() {
        let label = short_label(
            "investigate the extremely long task description that goes on and on forever",
        );
        assert!(label.len() <= 48);
    }
}
