//! WebSocket endpoint — the primary client adapter.
//!
//! Flow:
//! 1. Client connects to `/ws?token=<api-token>&user=<user-id>`
//! 2. Client sends `{type:"chat"|"stop"|"ping"}` JSON messages
//! 3. Server streams tagged [`AgentEvent`] objects back: turn progress,
//!    final responses, proactive pushes from the gardener, sub-agent
//!    announcements.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use valet_context::ContextLimits;
use valet_domain::event::AgentEvent;
use valet_memory::MemoryCommands;
use valet_sessions::session_key;
use valet_skills::SkillView;

use crate::runtime::{run_turn, TurnInput};
use crate::state::AppState;

use super::auth::validate_request;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client → server protocol
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Chat {
        message: String,
        #[serde(default)]
        attachments: Vec<String>,
    },
    Stop {},
    Ping {},
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    /// User identity for this connection; single-user deployments omit it.
    pub user: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /ws — upgrade to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    if !validate_request(
        &headers,
        query.token.as_deref(),
        state.api_token_hash.as_deref(),
    ) {
        return (axum::http::StatusCode::UNAUTHORIZED, "invalid or missing token")
            .into_response();
    }

    let user_id = query
        .user
        .unwrap_or_else(|| state.config.server.default_user_id.clone());

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let key = session_key("ws", &user_id);
    let mut outbound = state.channels.register(&key, &user_id);
    let (mut ws_sink, mut ws_stream) = socket.split();

    tracing::info!(session_key = %key, "client connected");

    // Pump fabric events to the socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Read client messages.
    while let Some(Ok(message)) = ws_stream.next().await {
        let raw = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let parsed: ClientMessage = match serde_json::from_str(&raw) {
            Ok(m) => m,
            Err(e) => {
                state.channels.send(
                    &key,
                    &AgentEvent::Error {
                        error: format!("unrecognized message: {e}"),
                    },
                );
                continue;
            }
        };

        match parsed {
            ClientMessage::Ping {} => {
                state.channels.send(&key, &AgentEvent::Pong {});
            }
            ClientMessage::Stop {} => {
                let found = state.cancel_map.cancel(&key);
                tracing::debug!(session_key = %key, found, "stop requested");
            }
            ClientMessage::Chat {
                message,
                attachments,
            } => {
                if state.cancel_map.is_running(&key) {
                    state.channels.send(
                        &key,
                        &AgentEvent::Error {
                            error: "a turn is already running; send stop first".into(),
                        },
                    );
                    continue;
                }
                start_turn(&state, &key, &user_id, message, attachments);
            }
        }
    }

    writer.abort();
    tracing::info!(session_key = %key, "client disconnected");
}

/// Spawn one turn on its own task, wiring its events into the fabric.
fn start_turn(
    state: &AppState,
    session_key: &str,
    user_id: &str,
    message: String,
    attachments: Vec<String>,
) {
    state
        .memory
        .update_patterns(user_id, |p| p.messages_today += 1);

    let cancel = state.cancel_map.register(session_key);
    let (events_tx, mut events_rx) = mpsc::channel::<AgentEvent>(64);

    // Forward turn events to every connection of the session.
    {
        let channels = state.channels.clone();
        let key = session_key.to_owned();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                channels.send(&key, &event);
            }
        });
    }

    let input = TurnInput {
        session_key: session_key.to_owned(),
        user_id: user_id.to_owned(),
        channel: "ws".into(),
        message,
        attachments,
        tier: None,
        skills: SkillView::full(state.skills.clone()),
        memory: state.memory.clone() as Arc<dyn MemoryCommands>,
        limits: ContextLimits::from(&state.config.context),
        max_iterations: state.config.agent.max_iterations,
        provider_override: None,
        system_prompt_override: None,
    };

    let state = state.clone();
    let key = session_key.to_owned();
    tokio::spawn(async move {
        let result = run_turn(&state, input, events_tx, cancel).await;
        state.cancel_map.remove(&key);
        if let Err(e) = result {
            tracing::warn!(session_key = %key, error = %e, "turn ended with error");
        }
    });
}
