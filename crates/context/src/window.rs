//! Hot-window truncation over a message list.
//!
//! Bounds what gets handed to a provider: leading system messages are always
//! kept, only the most recent messages stay hot, tool outputs are clipped,
//! and a total character budget drops the oldest survivors first. Truncation
//! never splits a tool_use/tool_result pair: a window can only start at a
//! message that is not answering a dropped assistant turn.

use valet_domain::chat::{ChatMessage, ContentBlock, MessageContent, Role};
use valet_domain::config::ContextConfig;

use crate::clip::clip_output;

#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    pub hot_window_messages: usize,
    pub max_total_chars: usize,
    pub tool_output_max_chars: usize,
}

impl From<&ContextConfig> for ContextLimits {
    fn from(cfg: &ContextConfig) -> Self {
        Self {
            hot_window_messages: cfg.hot_window_messages,
            max_total_chars: cfg.max_total_chars,
            tool_output_max_chars: cfg.tool_output_max_chars,
        }
    }
}

/// A user message consisting only of tool_result blocks answers an
/// assistant tool_use turn; it cannot open a window.
fn is_tool_result_only(msg: &ChatMessage) -> bool {
    msg.role == Role::User
        && match &msg.content {
            MessageContent::Text(_) => false,
            MessageContent::Blocks(blocks) => {
                !blocks.is_empty()
                    && blocks
                        .iter()
                        .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
            }
        }
}

fn message_chars(msg: &ChatMessage) -> usize {
    match &msg.content {
        MessageContent::Text(t) => t.len(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } | ContentBlock::Thinking { text } => text.len(),
                ContentBlock::ToolUse { input, .. } => input.to_string().len(),
                ContentBlock::ToolResult { content, .. } => content.len(),
                ContentBlock::Image { url, .. } => url.len(),
            })
            .sum(),
    }
}

fn clip_tool_results(msg: &mut ChatMessage, max_chars: usize) {
    if let MessageContent::Blocks(blocks) = &mut msg.content {
        for block in blocks {
            if let ContentBlock::ToolResult { content, .. } = block {
                let (clipped, was_clipped) = clip_output(content, max_chars);
                if was_clipped {
                    *content = clipped;
                }
            }
        }
    }
}

/// Apply the context limits to a full transcript, returning the bounded
/// message list to hand to the provider.
pub fn bound_window(messages: Vec<ChatMessage>, limits: &ContextLimits) -> Vec<ChatMessage> {
    let mut system: Vec<ChatMessage> = Vec::new();
    let mut tail: Vec<ChatMessage> = Vec::new();
    for msg in messages {
        if msg.role == Role::System && tail.is_empty() {
            system.push(msg);
        } else {
            tail.push(msg);
        }
    }

    // Hot window: keep the most recent N.
    let mut start = tail.len().saturating_sub(limits.hot_window_messages);

    // Character budget, walking back from the end. The final message is
    // always kept.
    let mut budget = limits.max_total_chars;
    let mut earliest = tail.len();
    for (i, msg) in tail.iter().enumerate().skip(start).rev() {
        let cost = message_chars(msg);
        if earliest != tail.len() && cost > budget {
            break;
        }
        budget = budget.saturating_sub(cost);
        earliest = i;
    }
    start = start.max(earliest);

    // Never open a window on an orphaned tool_result message.
    while start < tail.len() && is_tool_result_only(&tail[start]) {
        start += 1;
    }

    let mut kept: Vec<ChatMessage> = tail.split_off(start);
    for msg in &mut kept {
        clip_tool_results(msg, limits.tool_output_max_chars);
    }

    system.extend(kept);
    system
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_domain::chat::SkillCall;

    fn limits(hot: usize, total: usize, tool: usize) -> ContextLimits {
        ContextLimits {
            hot_window_messages: hot,
            max_total_chars: total,
            tool_output_max_chars: tool,
        }
    }

    fn turn(n: usize) -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(format!("question {n}")),
            ChatMessage::assistant(format!("answer {n}")),
        ]
    }

    #[test]
    fn system_prompt_survives_any_window() {
        let mut messages = vec![ChatMessage::system("identity")];
        for n in 0..20 {
            messages.extend(turn(n));
        }
        let bounded = bound_window(messages, &limits(4, 100_000, 1_000));
        assert_eq!(bounded[0].role, Role::System);
        assert_eq!(bounded.len(), 5);
        assert_eq!(
            bounded.last().unwrap().content.text(),
            Some("answer 19")
        );
    }

    #[test]
    fn window_never_starts_on_a_tool_result() {
        let calls = vec![SkillCall {
            call_id: "tc_1".into(),
            skill_name: "shell".into(),
            arguments: serde_json::json!({}),
        }];
        let messages = vec![
            ChatMessage::user("old"),
            ChatMessage::assistant_with_calls("", &calls),
            ChatMessage::tool_results(vec![("tc_1".into(), "out".into(), false)]),
            ChatMessage::assistant("done"),
        ];
        // Hot window of 2 would start at the tool_results message; the
        // bound must advance past it.
        let bounded = bound_window(messages, &limits(2, 100_000, 1_000));
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].content.text(), Some("done"));
    }

    #[test]
    fn tool_outputs_are_clipped() {
        let messages = vec![
            ChatMessage::user("run it"),
            ChatMessage::tool_results(vec![("tc".into(), "x".repeat(5_000), false)]),
        ];
        // A plain-text user opener keeps the window valid here.
        let bounded = bound_window(messages, &limits(10, 100_000, 100));
        match &bounded[1].content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, .. } => {
                    assert!(content.len() < 200);
                    assert!(content.contains("[TRUNCATED]"));
                }
                _ => panic!("expected ToolResult"),
            },
            _ => panic!("expected Blocks"),
        }
    }

    #[test]
    fn char_budget_drops_oldest_first() {
        let messages = vec![
            ChatMessage::user("a".repeat(400)),
            ChatMessage::user("b".repeat(400)),
            ChatMessage::user("c".repeat(400)),
        ];
        let bounded = bound_window(messages, &limits(10, 900, 1_000));
        assert_eq!(bounded.len(), 2);
        assert!(bounded[0].content.text().unwrap().starts_with('b'));
    }

    #[test]
    fn final_message_kept_even_when_over_budget() {
        let messages = vec![ChatMessage::user("x".repeat(10_000))];
        let bounded = bound_window(messages, &limits(10, 100, 1_000));
        assert_eq!(bounded.len(), 1);
    }
}
