//! Skill descriptors.
//!
//! Skills are a closed enum of handler implementations plus an open
//! documentation-only variant. The registry stores descriptors; actual
//! execution lives in the runtime, which matches on [`SkillHandler`] with
//! its own state in hand. Execution results are a plain result union — the
//! loop never unwinds on a skill failure.

use serde::{Deserialize, Serialize};

/// Every executable skill the runtime knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillHandler {
    ReadFile,
    WriteFile,
    Shell,
    WebSearch,
    MemorySearch,
    MemorySave,
    ScheduleReminder,
    SendUserMessage,
    SpawnAgent,
    CheckAgents,
}

#[derive(Debug, Clone)]
pub enum SkillKind {
    /// Dispatched by the runtime.
    Handler(SkillHandler),
    /// Reference material only; listed to the model, never executed.
    Documentation { doc: String },
}

/// One catalog entry: name, description, JSON-Schema parameters, and how
/// (or whether) it executes.
#[derive(Debug, Clone)]
pub struct SkillSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the skill's arguments.
    pub parameters: serde_json::Value,
    pub kind: SkillKind,
}

impl SkillSpec {
    pub fn is_executable(&self) -> bool {
        matches!(self.kind, SkillKind::Handler(_))
    }

    pub fn handler(&self) -> Option<SkillHandler> {
        match self.kind {
            SkillKind::Handler(h) => Some(h),
            SkillKind::Documentation { .. } => None,
        }
    }
}

/// Result union of one skill execution.
#[derive(Debug, Clone, Serialize)]
pub struct SkillOutcome {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SkillOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }

    /// The content fed back to the model as a tool result.
    pub fn content(&self) -> &str {
        if self.success {
            &self.output
        } else {
            self.error.as_deref().unwrap_or("unknown error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_content_picks_the_right_side() {
        let ok = SkillOutcome::ok("result");
        assert_eq!(ok.content(), "result");
        let err = SkillOutcome::err("boom");
        assert_eq!(err.content(), "boom");
        assert!(!err.success);
    }

    #[test]
    fn handler_enum_serializes_snake_case() {
        let json = serde_json::to_string(&SkillHandler::ReadFile).unwrap();
        assert_eq!(json, "\"read_file\"");
    }
}
