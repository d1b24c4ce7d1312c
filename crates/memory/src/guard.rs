//! Read-only view of the memory store.
//!
//! Handed to sub-agents: reads pass through, writes succeed as harmless
//! no-ops so child runs cannot mutate the graph.

use std::sync::Arc;

use uuid::Uuid;

use valet_domain::error::Result;

use crate::retrieval::RetrievedMemory;
use crate::store::{MemoryCommands, SearchQuery};
use crate::types::{MemoryEntry, MemoryRelation, ScheduledItem};

pub struct ReadOnlyMemory {
    inner: Arc<dyn MemoryCommands>,
}

impl ReadOnlyMemory {
    pub fn new(inner: Arc<dyn MemoryCommands>) -> Self {
        Self { inner }
    }
}

impl MemoryCommands for ReadOnlyMemory {
    fn save(&self, entry: MemoryEntry) -> Result<Uuid> {
        tracing::debug!(user_id = %entry.user_id, "read-only memory: save dropped");
        Ok(entry.id)
    }

    fn relate(&self, _relation: MemoryRelation) -> Result<()> {
        Ok(())
    }

    fn record_access(&self, _ids: &[Uuid]) {}

    fn schedule(&self, item: ScheduledItem) -> Result<Uuid> {
        tracing::debug!(user_id = %item.user_id, "read-only memory: schedule dropped");
        Ok(item.id)
    }

    fn search(&self, query: &SearchQuery) -> Vec<RetrievedMemory> {
        self.inner.search(query)
    }

    fn get(&self, id: Uuid) -> Option<MemoryEntry> {
        self.inner.get(id)
    }
}
