//! Scripted in-process provider.
//!
//! Used by unit and integration tests (and demo configs) to drive the agent
//! loop without network access. A mock either echoes, fails, fails a fixed
//! number of times before recovering, loops a skill call forever, or plays a
//! script of canned steps.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use valet_domain::chat::SkillCall;
use valet_domain::error::{Error, Result};

use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider, StopReason,
    Usage,
};

/// One canned step in a scripted mock.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Final text answer (stop reason `end_turn`).
    Text(String),
    /// One skill invocation (stop reason `tool_use`).
    SkillUse {
        name: String,
        arguments: serde_json::Value,
    },
    /// Several skill invocations in one response.
    SkillUses(Vec<(String, serde_json::Value)>),
    /// Provider error.
    Fail(String),
}

enum Behavior {
    Echo,
    Fail,
    FailThenEcho(u32),
    LoopSkill {
        name: String,
        arguments: serde_json::Value,
    },
    Script,
}

pub struct MockProvider {
    id: String,
    behavior: Behavior,
    script: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicU32,
}

impl MockProvider {
    /// Always answers `echo: <last user text>`.
    pub fn echo(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            behavior: Behavior::Echo,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Always fails with a transient-looking provider error.
    pub fn failing(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            behavior: Behavior::Fail,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Fails the first `n` calls, then behaves like [`Self::echo`].
    pub fn failing_then_echo(id: &str, n: u32) -> Self {
        Self {
            id: id.to_owned(),
            behavior: Behavior::FailThenEcho(n),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Requests the same skill on every call, never finishing.
    pub fn looping_skill(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self {
            id: id.to_owned(),
            behavior: Behavior::LoopSkill {
                name: name.to_owned(),
                arguments,
            },
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Plays the given steps in order; exhausted scripts fall back to echo.
    pub fn scripted(id: &str, steps: Vec<ScriptStep>) -> Self {
        Self {
            id: id.to_owned(),
            behavior: Behavior::Script,
            script: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn echo_response(&self, req: &ChatRequest) -> ChatResponse {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == valet_domain::chat::Role::User)
            .and_then(|m| m.content.text().map(|t| t.to_owned()))
            .unwrap_or_default();
        self.finish(ChatResponse {
            content: format!("echo: {last_user}"),
            skill_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: None,
            model: String::new(),
            degraded: false,
        })
    }

    fn finish(&self, mut resp: ChatResponse) -> ChatResponse {
        resp.model = "mock".into();
        resp.usage = Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        resp
    }

    fn skill_response(&self, calls: Vec<(String, serde_json::Value)>) -> ChatResponse {
        let n = self.calls.load(Ordering::Relaxed);
        let skill_calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| SkillCall {
                call_id: format!("call_{n}_{i}"),
                skill_name: name,
                arguments,
            })
            .collect();
        self.finish(ChatResponse {
            content: String::new(),
            skill_calls,
            stop_reason: StopReason::ToolUse,
            usage: None,
            model: String::new(),
            degraded: false,
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let call_no = self.calls.fetch_add(1, Ordering::Relaxed);

        match &self.behavior {
            Behavior::Echo => Ok(self.echo_response(req)),
            Behavior::Fail => Err(Error::Provider {
                provider: self.id.clone(),
                message: "HTTP 503 service unavailable".into(),
            }),
            Behavior::FailThenEcho(n) => {
                if call_no < *n {
                    Err(Error::Provider {
                        provider: self.id.clone(),
                        message: "HTTP 503 service unavailable".into(),
                    })
                } else {
                    Ok(self.echo_response(req))
                }
            }
            Behavior::LoopSkill { name, arguments } => {
                Ok(self.skill_response(vec![(name.clone(), arguments.clone())]))
            }
            Behavior::Script => {
                let step = self.script.lock().pop_front();
                match step {
                    Some(ScriptStep::Text(text)) => Ok(self.finish(ChatResponse {
                        content: text,
                        skill_calls: Vec::new(),
                        stop_reason: StopReason::EndTurn,
                        usage: None,
                        model: String::new(),
                        degraded: false,
                    })),
                    Some(ScriptStep::SkillUse { name, arguments }) => {
                        Ok(self.skill_response(vec![(name, arguments)]))
                    }
                    Some(ScriptStep::SkillUses(calls)) => Ok(self.skill_response(calls)),
                    Some(ScriptStep::Fail(message)) => Err(Error::Provider {
                        provider: self.id.clone(),
                        message,
                    }),
                    None => {
                        tracing::warn!(provider = %self.id, "mock script exhausted, echoing");
                        Ok(self.echo_response(req))
                    }
                }
            }
        }
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        // Deterministic toy embedding: character-class histogram, normalized.
        let embeddings = req
            .input
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 8];
                for (i, b) in text.bytes().enumerate() {
                    v[(b as usize + i) % 8] += 1.0;
                }
                let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
                v.iter().map(|x| x / norm).collect()
            })
            .collect();
        Ok(EmbeddingsResponse { embeddings })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
