//! Skill dispatch — executes one resolved [`SkillHandler`] with the
//! application state in hand.
//!
//! Handlers return a [`SkillOutcome`] result union; nothing here unwinds
//! into the turn loop. Argument shapes were already validated against the
//! skill's schema by the caller.

use chrono::{Duration, Utc};
use serde_json::Value;

use valet_domain::event::AgentEvent;
use valet_memory::{
    ItemSource, ItemType, MemoryCategory, MemoryEntry, ScheduledItem, SearchQuery,
};
use valet_skills::{SkillHandler, SkillOutcome};
use valet_tools::{exec, file_ops};

use crate::state::AppState;

use super::subagent;
use super::turn::TurnInput;

/// Execute one skill call. `input` carries the turn's memory surface and
/// session identity so handlers act on behalf of the right user.
pub async fn dispatch_skill(
    state: &AppState,
    input: &TurnInput,
    handler: SkillHandler,
    arguments: &Value,
) -> SkillOutcome {
    match handler {
        SkillHandler::ReadFile => read_file(state, arguments).await,
        SkillHandler::WriteFile => write_file(state, arguments).await,
        SkillHandler::Shell => shell(state, arguments).await,
        SkillHandler::WebSearch => SkillOutcome::err(
            "web_search is not configured on this server. Use the shell skill \
             with curl against a specific site instead.",
        ),
        SkillHandler::MemorySearch => memory_search(input, arguments),
        SkillHandler::MemorySave => memory_save(input, arguments),
        SkillHandler::ScheduleReminder => schedule_reminder(input, arguments),
        SkillHandler::SendUserMessage => send_user_message(state, input, arguments),
        SkillHandler::SpawnAgent => spawn_agent(state, input, arguments),
        SkillHandler::CheckAgents => check_agents(state, input),
    }
}

// ── File & shell ──────────────────────────────────────────────────

async fn read_file(state: &AppState, arguments: &Value) -> SkillOutcome {
    let req: file_ops::FileReadRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return SkillOutcome::err(format!("invalid read_file arguments: {e}")),
    };
    match file_ops::read_file(&state.workspace, req).await {
        Ok(resp) => SkillOutcome::ok(resp.content),
        Err(e) => SkillOutcome::err(e),
    }
}

async fn write_file(state: &AppState, arguments: &Value) -> SkillOutcome {
    let req: file_ops::FileWriteRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return SkillOutcome::err(format!("invalid write_file arguments: {e}")),
    };
    match file_ops::write_file(&state.workspace, req).await {
        Ok(msg) => SkillOutcome::ok(msg),
        Err(e) => SkillOutcome::err(e),
    }
}

async fn shell(state: &AppState, arguments: &Value) -> SkillOutcome {
    let req: exec::ExecRequest = match serde_json::from_value(arguments.clone()) {
        Ok(r) => r,
        Err(e) => return SkillOutcome::err(format!("invalid shell arguments: {e}")),
    };
    let resp = exec::exec(&state.workspace, req).await;
    if resp.timed_out {
        return SkillOutcome::err(resp.stderr);
    }
    let mut output = resp.stdout;
    if !resp.stderr.is_empty() {
        output.push_str("\n[stderr]\n");
        output.push_str(&resp.stderr);
    }
    if resp.exit_code.unwrap_or(0) != 0 {
        output.push_str(&format!("\n[exit code: {}]", resp.exit_code.unwrap_or(-1)));
    }
    SkillOutcome::ok(output)
}

// ── Memory ────────────────────────────────────────────────────────

fn memory_search(input: &TurnInput, arguments: &Value) -> SkillOutcome {
    let query = arguments.get("query").and_then(|q| q.as_str()).unwrap_or("");
    let limit = arguments
        .get("limit")
        .and_then(|l| l.as_u64())
        .unwrap_or(5) as usize;

    let hits = input.memory.search(&SearchQuery {
        user_id: input.user_id.clone(),
        text: query.to_owned(),
        embedding: None,
        top_k: limit,
    });
    if hits.is_empty() {
        return SkillOutcome::ok("No matching memories.");
    }
    let ids: Vec<uuid::Uuid> = hits.iter().map(|h| h.id).collect();
    input.memory.record_access(&ids);

    let lines: Vec<String> = hits
        .iter()
        .map(|h| format!("- ({:?}) {}", h.category, h.content))
        .collect();
    SkillOutcome::ok(lines.join("\n"))
}

fn memory_save(input: &TurnInput, arguments: &Value) -> SkillOutcome {
    let content = match arguments.get("content").and_then(|c| c.as_str()) {
        Some(c) if !c.trim().is_empty() => c.to_owned(),
        _ => return SkillOutcome::err("memory_save needs non-empty content"),
    };
    let category = arguments
        .get("category")
        .and_then(|c| c.as_str())
        .and_then(|c| serde_json::from_value(Value::String(c.to_owned())).ok())
        .unwrap_or(MemoryCategory::Fact);
    let importance = arguments
        .get("importance")
        .and_then(|i| i.as_u64())
        .unwrap_or(5)
        .min(10) as u8;

    let mut entry = MemoryEntry::new(&input.user_id, content, category, importance);
    if let Some(subject) = arguments.get("subject").and_then(|s| s.as_str()) {
        entry.metadata = Some(serde_json::json!({ "subject": subject }));
    }

    match input.memory.save(entry) {
        Ok(id) => SkillOutcome::ok(format!("Remembered ({id}).")),
        Err(e) => SkillOutcome::err(e.to_string()),
    }
}

fn schedule_reminder(input: &TurnInput, arguments: &Value) -> SkillOutcome {
    let message = arguments
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default();
    let minutes = arguments
        .get("in_minutes")
        .and_then(|m| m.as_i64())
        .unwrap_or(0);
    if message.is_empty() || minutes <= 0 {
        return SkillOutcome::err("schedule_reminder needs a message and a positive in_minutes");
    }

    let item = ScheduledItem::new(
        &input.user_id,
        ItemSource::Agent,
        ItemType::Reminder,
        message,
        Utc::now() + Duration::minutes(minutes),
    );
    match input.memory.schedule(item) {
        Ok(id) => SkillOutcome::ok(format!("Reminder scheduled ({id}) in {minutes} minutes.")),
        Err(e) => SkillOutcome::err(e.to_string()),
    }
}

// ── Channel & sub-agents ──────────────────────────────────────────

fn send_user_message(state: &AppState, input: &TurnInput, arguments: &Value) -> SkillOutcome {
    let content = arguments
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    if content.is_empty() {
        return SkillOutcome::err("send_user_message needs content");
    }
    let reached = state.channels.send_to_user(
        &input.user_id,
        &AgentEvent::Proactive {
            content: content.to_owned(),
            category: "direct".into(),
            urgency: "normal".into(),
            source: "agent".into(),
        },
    );
    SkillOutcome::ok(format!("Delivered to {reached} connection(s)."))
}

fn spawn_agent(state: &AppState, input: &TurnInput, arguments: &Value) -> SkillOutcome {
    let task = arguments
        .get("task")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    if task.is_empty() {
        return SkillOutcome::err("spawn_agent needs a task");
    }
    let allowed_skills = arguments.get("skills").and_then(|s| s.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(|s| s.to_owned()))
            .collect::<Vec<_>>()
    });
    let tier = arguments
        .get("tier")
        .and_then(|t| t.as_str())
        .map(|t| t.to_owned());

    let spawned = subagent::spawn(
        state.clone(),
        &input.session_key,
        &input.user_id,
        subagent::SpawnInput {
            task: task.to_owned(),
            allowed_skills,
            tier,
        },
    );
    SkillOutcome::ok(format!(
        "Sub-agent started (run {}). Results will be announced; use \
         check_agents to collect them.",
        spawned.run_id
    ))
}

fn check_agents(state: &AppState, input: &TurnInput) -> SkillOutcome {
    let runs = state.subagents.runs_for_parent(&input.session_key);
    let announces = state.subagents.drain_announcements(&input.session_key);

    if runs.is_empty() && announces.is_empty() {
        return SkillOutcome::ok("No sub-agent runs for this session.");
    }

    let mut out = String::new();
    if !runs.is_empty() {
        out.push_str("Runs:\n");
        for run in runs {
            out.push_str(&format!("- {} [{:?}] {}\n", run.run_id, run.status, run.task));
        }
    }
    if !announces.is_empty() {
        out.push_str("Finished:\n");
        for a in announces {
            out.push_str(&format!("- {} → {}\n", a.label, a.result));
        }
    }
    SkillOutcome::ok(out)
}
