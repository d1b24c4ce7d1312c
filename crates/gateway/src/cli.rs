//! Interactive CLI chat — a second channel adapter over the same fabric
//! the WebSocket clients use.
//!
//! Runs against in-process state (no server socket): reads lines from
//! stdin, drives turns, and prints the event stream. `/stop` cancels the
//! running turn, `/quit` exits.

use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use valet_context::ContextLimits;
use valet_domain::event::AgentEvent;
use valet_memory::MemoryCommands;
use valet_sessions::session_key;
use valet_skills::SkillView;

use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::Response { content, .. } => println!("\n{content}\n"),
        AgentEvent::SkillStart { skill, .. } => println!("  · {skill}…"),
        AgentEvent::SkillComplete { skill, .. } => println!("  · {skill} done"),
        AgentEvent::SkillError { skill, error } => println!("  ! {skill}: {error}"),
        AgentEvent::Memory { count, .. } => println!("  · recalled {count} memories"),
        AgentEvent::Planning { message } | AgentEvent::Thinking { message } => {
            println!("  ({message})")
        }
        AgentEvent::Trigger { content } => println!("\n[reminder] {content}\n"),
        AgentEvent::Proactive {
            content, source, ..
        } => println!("\n[{source}] {content}\n"),
        AgentEvent::Error { error } => eprintln!("error: {error}"),
        _ => {}
    }
}

/// Run the interactive chat loop until `/quit` or EOF.
pub async fn chat(state: AppState) -> anyhow::Result<()> {
    let user_id = state.config.server.default_user_id.clone();
    let key = session_key("cli", &user_id);

    // Register on the fabric so gardener pushes and sub-agent
    // announcements reach the terminal too.
    let mut outbound = state.channels.register(&key, &user_id);
    tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            print_event(&event);
        }
    });

    println!("valet — type a message, /stop to cancel, /quit to exit");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/stop" => {
                state.cancel_map.cancel(&key);
                continue;
            }
            _ => {}
        }

        state
            .memory
            .update_patterns(&user_id, |p| p.messages_today += 1);

        let cancel = state.cancel_map.register(&key);
        let (events_tx, mut events_rx) = mpsc::channel::<AgentEvent>(64);
        let channels = state.channels.clone();
        let fanout_key = key.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                channels.send(&fanout_key, &event);
            }
        });

        let input = TurnInput {
            session_key: key.clone(),
            user_id: user_id.clone(),
            channel: "cli".into(),
            message: line.to_owned(),
            attachments: Vec::new(),
            tier: None,
            skills: SkillView::full(state.skills.clone()),
            memory: state.memory.clone() as Arc<dyn MemoryCommands>,
            limits: ContextLimits::from(&state.config.context),
            max_iterations: state.config.agent.max_iterations,
            provider_override: None,
            system_prompt_override: None,
        };

        // Block until the turn completes so the prompt stays coherent.
        let result = run_turn(&state, input, events_tx, cancel).await;
        state.cancel_map.remove(&key);
        let _ = pump.await;
        if let Err(e) = result {
            eprintln!("turn failed: {e}");
        }
    }

    state.memory.flush().ok();
    state.sessions.flush().ok();
    Ok(())
}
