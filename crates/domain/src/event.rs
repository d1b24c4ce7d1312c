//! Progress events emitted during a turn and pushed to connected clients.
//!
//! This is the complete server→client vocabulary of the WebSocket protocol;
//! adapters serialize these as tagged JSON objects.

use serde::{Deserialize, Serialize};

/// One retrieved memory surfaced to the client in a [`AgentEvent::Memory`]
/// event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEventItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub content: String,
}

/// Events emitted during a single agent turn (plus proactive pushes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The final assistant message for a turn.
    Response {
        content: String,
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// Incremental text from the assistant (optional; only emitted by
    /// streaming-capable adapters).
    Chunk { content: String },

    /// The model is invoking a skill.
    SkillStart {
        skill: String,
        input: serde_json::Value,
    },

    /// Skill execution finished.
    SkillComplete { skill: String, output: String },

    /// Skill execution failed.
    SkillError { skill: String, error: String },

    /// Memory retrieval happened ("search") or new memories were
    /// collected ("collect").
    Memory {
        action: String,
        count: usize,
        items: Vec<MemoryEventItem>,
    },

    /// High-level plan narration.
    Planning { message: String },

    /// Reasoning content from the model.
    Thinking { message: String },

    /// A scheduled item fired; plain-text proactive push.
    Trigger { content: String },

    /// Structured proactive push from the gardener.
    Proactive {
        content: String,
        category: String,
        urgency: String,
        source: String,
    },

    /// A file produced during the turn.
    File {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },

    /// An error terminated the turn.
    Error { error: String },

    /// Reply to a client ping.
    Pong {},
}
