use serde::{Deserialize, Serialize};

/// Internal skill call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillCall {
    pub call_id: String,
    pub skill_name: String,
    pub arguments: serde_json::Value,
}

/// Skill definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the skill's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Assistant message carrying text plus the skill calls it requested.
    pub fn assistant_with_calls(text: &str, calls: &[SkillCall]) -> Self {
        let mut blocks = Vec::new();
        if !text.is_empty() {
            blocks.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
        for call in calls {
            blocks.push(ContentBlock::ToolUse {
                id: call.call_id.clone(),
                name: call.skill_name.clone(),
                input: call.arguments.clone(),
            });
        }
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// User message carrying one tool_result block per answered call,
    /// in the same order as the calls.
    pub fn tool_results(results: Vec<(String, String, bool)>) -> Self {
        let blocks = results
            .into_iter()
            .map(|(id, content, is_error)| ContentBlock::ToolResult {
                tool_use_id: id,
                content,
                is_error,
            })
            .collect();
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Skill calls requested by this message, in declaration order.
    pub fn skill_calls(&self) -> Vec<SkillCall> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, name, input } => Some(SkillCall {
                        call_id: id.clone(),
                        skill_name: name.clone(),
                        arguments: input.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text block, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Extract and join all text content, returning an owned String.
    ///
    /// For `Text` variant, returns the string directly.
    /// For `Blocks` variant, joins all `Text` blocks with `"\n"`.
    /// Non-text blocks (ToolUse, ToolResult, Thinking, Image) are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}
