use serde::{Deserialize, Serialize};

use valet_domain::chat::{ChatMessage, SkillCall, SkillDefinition};
use valet_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<ChatMessage>,
    /// Skill definitions the model may invoke.
    pub skills: Vec<SkillDefinition>,
    /// Sampling temperature (0.0 – 2.0). `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// When `true`, request the model to respond with valid JSON only.
    pub json_mode: bool,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural completion: the content is the final answer.
    EndTurn,
    /// The model requested one or more skill invocations.
    ToolUse,
    /// The response hit the max-token limit.
    MaxTokens,
    /// Anything else the provider reported.
    Other,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Textual content of the response.
    pub content: String,
    /// Skill calls emitted by the model, in declaration order.
    pub skill_calls: Vec<SkillCall>,
    pub stop_reason: StopReason,
    /// Token usage information.
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    /// Set on the synthetic response minted when every tier failed.
    pub degraded: bool,
}

impl ChatResponse {
    /// Plain text response with no skill calls.
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            skill_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: None,
            model: model.into(),
            degraded: false,
        }
    }
}

/// A request for text embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingsRequest {
    /// Input texts to embed.
    pub input: Vec<String>,
    /// Model to use. When `None`, the provider uses its default embedding model.
    pub model: Option<String>,
}

/// An embeddings response.
#[derive(Debug, Clone)]
pub struct EmbeddingsResponse {
    /// One embedding vector per input text.
    pub embeddings: Vec<Vec<f32>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM adapter must implement.
///
/// Implementations translate between our internal types and the wire format
/// of each provider's HTTP API; each adapter owns its own timeout and at most
/// a small number of retries. The chain above never retries the same adapter.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Generate text embeddings.
    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
