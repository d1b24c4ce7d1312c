//! Durable per-user memory graph: entries with prominence-based decay,
//! typed relations, scheduled items, behavioral patterns, hybrid retrieval,
//! spreading activation, and LLM-assisted fusion.

pub mod activation;
pub mod decay;
pub mod fusion;
pub mod guard;
pub mod retrieval;
pub mod store;
pub mod types;

pub use guard::ReadOnlyMemory;
pub use retrieval::RetrievedMemory;
pub use store::{MemoryCommands, MemoryStore, SearchQuery};
pub use types::{
    BehavioralPatterns, ItemSource, ItemStatus, ItemType, MemoryCategory, MemoryEntry,
    MemoryRelation, MemoryType, Proactiveness, RelationType, ScheduledItem,
};
