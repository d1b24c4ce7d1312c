//! OpenAI-compatible chat-completions adapter.
//!
//! Covers the large family of providers speaking the OpenAI wire format
//! (OpenAI itself, most local inference servers, many cloud gateways). The
//! adapter owns its own per-request timeout and a small retry count; the
//! fallback chain above never retries the same adapter.

use serde_json::Value;

use valet_domain::chat::{ChatMessage, ContentBlock, MessageContent, Role, SkillCall,
    SkillDefinition};
use valet_domain::config::ProviderConfig;
use valet_domain::error::{Error, Result};

use crate::traits::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider, StopReason,
    Usage,
};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    timeout: std::time::Duration,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the deserialized provider config.
    /// The API key env var is read once, here.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .ok_or_else(|| Error::Config(format!("provider '{}' has no base_url", cfg.id)))?;

        let api_key = match &cfg.api_key_env {
            Some(var) if !var.is_empty() => match std::env::var(var) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    return Err(Error::Config(format!(
                        "provider '{}': env var {var} is not set",
                        cfg.id
                    )))
                }
            },
            _ => None,
        };

        let timeout = std::time::Duration::from_millis(cfg.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone().unwrap_or_else(|| "gpt-4o-mini".into()),
            timeout,
            max_retries: cfg.max_retries,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        for msg in &req.messages {
            messages.extend(msg_to_openai(msg));
        }

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
        });

        if !req.skills.is_empty() {
            let tools: Vec<Value> = req.skills.iter().map(skill_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }

    async fn chat_once(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.id, url = %url, "chat request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), truncate(&resp_text, 300)),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&self.id, &resp_json)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Convert one internal message into the OpenAI wire shape.
///
/// Tool results live in user messages as blocks on our side but become
/// standalone `role: "tool"` messages on the wire; an assistant message with
/// tool_use blocks becomes a single message with a `tool_calls` array.
fn msg_to_openai(msg: &ChatMessage) -> Vec<Value> {
    match &msg.content {
        MessageContent::Text(text) => {
            vec![serde_json::json!({
                "role": role_to_str(msg.role),
                "content": text,
            })]
        }
        MessageContent::Blocks(blocks) => {
            let mut out = Vec::new();
            let mut text_parts: Vec<&str> = Vec::new();
            let mut tool_calls: Vec<Value> = Vec::new();

            for block in blocks {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text),
                    ContentBlock::Thinking { .. } => {}
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => {
                        out.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        }));
                    }
                    ContentBlock::Image { url, .. } => {
                        text_parts.push(url);
                    }
                }
            }

            if !text_parts.is_empty() || !tool_calls.is_empty() {
                let mut m = serde_json::json!({
                    "role": role_to_str(msg.role),
                    "content": text_parts.join("\n"),
                });
                if !tool_calls.is_empty() {
                    m["tool_calls"] = Value::Array(tool_calls);
                }
                // Tool messages must come after the assistant message that
                // requested them; insert at the front of this batch.
                out.insert(0, m);
            }
            out
        }
    }
}

fn skill_to_openai(skill: &SkillDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": skill.name,
            "description": skill.description,
            "parameters": skill.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider_id: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider_id.to_owned(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: provider_id.to_owned(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let skill_calls = parse_openai_tool_calls(message);

    let stop_reason = match choice.get("finish_reason").and_then(|v| v.as_str()) {
        _ if !skill_calls.is_empty() => StopReason::ToolUse,
        Some("stop") => StopReason::EndTurn,
        Some("tool_calls") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::Other,
    };

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        content,
        skill_calls,
        stop_reason,
        usage,
        model,
        degraded: false,
    })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<SkillCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let skill_name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
            let arguments: Value =
                serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(SkillCall {
                call_id,
                skill_name,
                arguments,
            })
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

fn is_retriable(err: &Error) -> bool {
    match err {
        Error::Timeout(_) => true,
        Error::Http(_) => true,
        Error::Provider { message, .. } => {
            message.contains("HTTP 5") || message.contains("HTTP 429")
        }
        _ => false,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match tokio::time::timeout(self.timeout, self.chat_once(req)).await {
                Ok(Ok(resp)) => return Ok(resp),
                Ok(Err(e)) if is_retriable(&e) && attempt < self.max_retries => {
                    tracing::warn!(
                        provider = %self.id,
                        attempt,
                        error = %e,
                        "retriable provider error"
                    );
                    last_err = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    let e = Error::Timeout(format!(
                        "provider '{}' timed out after {:?}",
                        self.id, self.timeout
                    ));
                    if attempt < self.max_retries {
                        last_err = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Provider {
            provider: self.id.clone(),
            message: "exhausted retries".into(),
        }))
    }

    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        let model = req
            .model
            .unwrap_or_else(|| "text-embedding-3-small".into());
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({ "model": model, "input": req.input });

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), truncate(&resp_text, 300)),
            });
        }

        let v: Value = serde_json::from_str(&resp_text)?;
        let embeddings = v
            .get("data")
            .and_then(|d| d.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        item.get("embedding").and_then(|e| e.as_array()).map(|nums| {
                            nums.iter()
                                .filter_map(|n| n.as_f64().map(|f| f as f32))
                                .collect()
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(EmbeddingsResponse { embeddings })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_blocks_become_tool_messages() {
        let msg = ChatMessage::tool_results(vec![
            ("tc_1".into(), "result one".into(), false),
            ("tc_2".into(), "result two".into(), true),
        ]);
        let wire = msg_to_openai(&msg);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "tc_1");
        assert_eq!(wire[1]["tool_call_id"], "tc_2");
    }

    #[test]
    fn assistant_with_calls_becomes_tool_calls_array() {
        let msg = ChatMessage::assistant_with_calls(
            "working on it",
            &[SkillCall {
                call_id: "tc_9".into(),
                skill_name: "shell".into(),
                arguments: serde_json::json!({"command": "ls"}),
            }],
        );
        let wire = msg_to_openai(&msg);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["role"], "assistant");
        assert_eq!(wire[0]["tool_calls"][0]["id"], "tc_9");
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "shell");
    }

    #[test]
    fn parse_response_with_tool_calls() {
        let body = serde_json::json!({
            "model": "gpt-test",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "web_search", "arguments": "{\"query\":\"x\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        });
        let resp = parse_chat_response("p", &body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.skill_calls[0].skill_name, "web_search");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_response_plain_text() {
        let body = serde_json::json!({
            "model": "gpt-test",
            "choices": [{
                "finish_reason": "stop",
                "message": {"content": "hello"}
            }]
        });
        let resp = parse_chat_response("p", &body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.content, "hello");
        assert!(resp.skill_calls.is_empty());
    }

    #[test]
    fn malformed_tool_call_arguments_default_to_empty_object() {
        let message = serde_json::json!({
            "tool_calls": [{
                "id": "c1",
                "function": {"name": "t", "arguments": "not json"}
            }]
        });
        let calls = parse_openai_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].arguments.as_object().unwrap().is_empty());
    }
}
