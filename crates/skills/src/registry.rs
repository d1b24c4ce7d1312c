//! Skill registry and filtering views.
//!
//! The registry is immutable after startup. Sub-agents get a [`SkillView`]
//! restricted to an allowed set — the view behaves as if the allowed set
//! were the whole registry, so a child can neither see nor call anything
//! outside it.

use std::collections::HashSet;
use std::sync::Arc;

use valet_domain::chat::SkillDefinition;
use valet_domain::error::{Error, Result};

use crate::types::{SkillHandler, SkillKind, SkillSpec};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SkillRegistry {
    specs: Vec<SkillSpec>,
}

impl SkillRegistry {
    pub fn new(specs: Vec<SkillSpec>) -> Self {
        Self { specs }
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self::new(builtin_specs())
    }

    pub fn get(&self, name: &str) -> Option<&SkillSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Look up a skill through a filter predicate; names outside the filter
    /// behave exactly like unknown skills.
    pub fn lookup_with(
        &self,
        name: &str,
        filter: &dyn Fn(&SkillSpec) -> bool,
    ) -> Option<&SkillSpec> {
        self.specs.iter().find(|s| s.name == name && filter(s))
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn definitions_where(&self, filter: &dyn Fn(&SkillSpec) -> bool) -> Vec<SkillDefinition> {
        self.specs
            .iter()
            .filter(|s| s.is_executable() && filter(s))
            .map(|s| SkillDefinition {
                name: s.name.clone(),
                description: s.description.clone(),
                parameters: s.parameters.clone(),
            })
            .collect()
    }

    /// One-line catalog rendered into system prompts (includes
    /// documentation-only entries).
    pub fn render_index(&self) -> String {
        self.specs
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Validate call arguments against a skill's declared JSON Schema:
/// arguments must be an object carrying every `required` property.
pub fn validate_args(spec: &SkillSpec, args: &serde_json::Value) -> Result<()> {
    let obj = args.as_object().ok_or_else(|| {
        Error::Other(format!("arguments for '{}' must be an object", spec.name))
    })?;

    if let Some(required) = spec.parameters.get("required").and_then(|r| r.as_array()) {
        for field in required {
            if let Some(field) = field.as_str() {
                if !obj.contains_key(field) {
                    return Err(Error::Other(format!(
                        "missing required argument '{field}' for '{}'",
                        spec.name
                    )));
                }
            }
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SkillView
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A read-only window onto the registry. `full` sees everything;
/// `filtered` pretends the allowed set is the whole registry.
#[derive(Clone)]
pub struct SkillView {
    registry: Arc<SkillRegistry>,
    /// `None` = unrestricted.
    allowed: Option<HashSet<String>>,
}

impl SkillView {
    pub fn full(registry: Arc<SkillRegistry>) -> Self {
        Self {
            registry,
            allowed: None,
        }
    }

    pub fn filtered(registry: Arc<SkillRegistry>, allowed: HashSet<String>) -> Self {
        Self {
            registry,
            allowed: Some(allowed),
        }
    }

    fn permits(&self, name: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(set) => set.contains(name),
        }
    }

    /// Resolve a call by name. Returns the spec and its handler, or an
    /// error suitable for feeding back to the model.
    pub fn resolve(&self, name: &str) -> Result<(&SkillSpec, SkillHandler)> {
        let spec = self
            .registry
            .lookup_with(name, &|s| self.permits(&s.name))
            .ok_or_else(|| Error::SkillNotFound(name.to_owned()))?;
        match spec.handler() {
            Some(h) => Ok((spec, h)),
            None => Err(Error::SkillNotFound(name.to_owned())),
        }
    }

    /// Definitions handed to the LLM.
    pub fn definitions(&self) -> Vec<SkillDefinition> {
        self.registry.definitions_where(&|s| self.permits(&s.name))
    }

    /// Names visible through this view.
    pub fn names(&self) -> Vec<String> {
        self.registry
            .names()
            .into_iter()
            .filter(|n| self.permits(n))
            .collect()
    }

    pub fn render_index(&self) -> String {
        self.definitions()
            .iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn spec(
    name: &str,
    description: &str,
    parameters: serde_json::Value,
    handler: SkillHandler,
) -> SkillSpec {
    SkillSpec {
        name: name.into(),
        description: description.into(),
        parameters,
        kind: SkillKind::Handler(handler),
    }
}

fn builtin_specs() -> Vec<SkillSpec> {
    vec![
        spec(
            "read_file",
            "Read a file from the workspace. Supports line offset/limit windows.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path relative to the workspace root" },
                    "offset": { "type": "integer", "description": "First line to return (0-indexed)" },
                    "limit": { "type": "integer", "description": "Maximum lines to return" }
                },
                "required": ["path"]
            }),
            SkillHandler::ReadFile,
        ),
        spec(
            "write_file",
            "Create or replace a file in the workspace.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path relative to the workspace root" },
                    "content": { "type": "string", "description": "Full file content" }
                },
                "required": ["path", "content"]
            }),
            SkillHandler::WriteFile,
        ),
        spec(
            "shell",
            "Run a shell command in the workspace. Returns stdout, stderr, and the exit code.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Shell command to execute" },
                    "timeout_sec": { "type": "integer", "description": "Hard timeout in seconds" }
                },
                "required": ["command"]
            }),
            SkillHandler::Shell,
        ),
        spec(
            "web_search",
            "Search the web. Currently unavailable — returns an error naming alternatives.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            }),
            SkillHandler::WebSearch,
        ),
        spec(
            "memory_search",
            "Search long-term memory for relevant facts about the user.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "limit": { "type": "integer", "description": "Max results (default 5)" }
                },
                "required": ["query"]
            }),
            SkillHandler::MemorySearch,
        ),
        spec(
            "memory_save",
            "Store a fact, preference, or event in long-term memory.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "What to remember" },
                    "category": {
                        "type": "string",
                        "enum": ["preference", "fact", "event", "relationship", "insight"],
                        "description": "Memory category"
                    },
                    "importance": { "type": "integer", "description": "0-10, default 5" },
                    "subject": { "type": "string", "description": "Stable subject key; newer entries supersede older ones with the same subject" }
                },
                "required": ["content"]
            }),
            SkillHandler::MemorySave,
        ),
        spec(
            "schedule_reminder",
            "Schedule a reminder or follow-up to be delivered at a future time.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "What to deliver" },
                    "in_minutes": { "type": "integer", "description": "Minutes from now" }
                },
                "required": ["message", "in_minutes"]
            }),
            SkillHandler::ScheduleReminder,
        ),
        spec(
            "send_user_message",
            "Push a message to the user's connected clients immediately.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "Message text" }
                },
                "required": ["content"]
            }),
            SkillHandler::SendUserMessage,
        ),
        spec(
            "spawn_agent",
            "Delegate a background task to a bounded sub-agent. Returns a run id immediately.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "task": { "type": "string", "description": "The task to work on" },
                    "skills": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Skills the sub-agent may use (defaults to file/shell/search)"
                    },
                    "tier": { "type": "string", "description": "Model tier (premium, budget, local)" }
                },
                "required": ["task"]
            }),
            SkillHandler::SpawnAgent,
        ),
        spec(
            "check_agents",
            "List sub-agent runs for this session and collect finished results.",
            serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            SkillHandler::CheckAgents,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_resolves_by_name() {
        let registry = Arc::new(SkillRegistry::builtin());
        let view = SkillView::full(registry);
        let (spec, handler) = view.resolve("shell").unwrap();
        assert_eq!(spec.name, "shell");
        assert_eq!(handler, SkillHandler::Shell);
    }

    #[test]
    fn unknown_name_is_skill_not_found() {
        let view = SkillView::full(Arc::new(SkillRegistry::builtin()));
        let err = view.resolve("nonexistent_tool").unwrap_err();
        assert!(matches!(err, Error::SkillNotFound(_)));
    }

    #[test]
    fn filtered_view_hides_everything_else() {
        let registry = Arc::new(SkillRegistry::builtin());
        let allowed: HashSet<String> = ["read_file", "shell"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let view = SkillView::filtered(registry, allowed);

        assert!(view.resolve("read_file").is_ok());
        // Present in the registry, invisible through the view.
        let err = view.resolve("spawn_agent").unwrap_err();
        assert!(matches!(err, Error::SkillNotFound(_)));

        let defs = view.definitions();
        assert_eq!(defs.len(), 2);
        assert!(defs.iter().all(|d| d.name == "read_file" || d.name == "shell"));
    }

    #[test]
    fn documentation_entries_are_listed_but_not_executable() {
        let mut specs = vec![SkillSpec {
            name: "style_guide".into(),
            description: "House style for written output.".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            kind: SkillKind::Documentation {
                doc: "Write plainly.".into(),
            },
        }];
        specs.extend(SkillRegistry::builtin().specs);
        let registry = Arc::new(SkillRegistry::new(specs));

        let view = SkillView::full(registry.clone());
        assert!(view.resolve("style_guide").is_err());
        assert!(!view.definitions().iter().any(|d| d.name == "style_guide"));
        assert!(registry.render_index().contains("style_guide"));
    }

    #[test]
    fn validate_args_checks_required_fields() {
        let registry = SkillRegistry::builtin();
        let spec = registry.get("write_file").unwrap();

        assert!(validate_args(spec, &serde_json::json!({"path": "a", "content": "b"})).is_ok());

        let err = validate_args(spec, &serde_json::json!({"path": "a"})).unwrap_err();
        assert!(err.to_string().contains("content"));

        let err = validate_args(spec, &serde_json::json!("not an object")).unwrap_err();
        assert!(err.to_string().contains("object"));
    }
}
