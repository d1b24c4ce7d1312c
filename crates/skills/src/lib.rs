//! Skill catalog: typed descriptors with JSON-Schema parameters, a closed
//! handler enum dispatched by the runtime, and predicate-filtered views for
//! sub-agents.

pub mod registry;
pub mod types;

pub use registry::{validate_args, SkillRegistry, SkillView};
pub use types::{SkillHandler, SkillKind, SkillOutcome, SkillSpec};
