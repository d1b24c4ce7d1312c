use serde::Serialize;

/// Structured trace events emitted across all Valet crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        tier: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        to_provider: String,
        tier: String,
        reason: String,
    },
    TierDegraded {
        from_tier: String,
        to_tier: String,
    },
    TierRecovered {
        tier: String,
    },
    SessionResolved {
        session_key: String,
        session_id: String,
        is_new: bool,
    },
    GardenerTick {
        tier: String,
        tick: u64,
        duration_ms: u64,
    },
    MemoryDecayed {
        scanned: usize,
        updated: usize,
    },
    ClusterFused {
        cluster_size: usize,
        derived_id: String,
    },
    SubAgentSpawned {
        run_id: String,
        parent_session: String,
        skills: usize,
    },
    ScheduledItemFired {
        item_id: String,
        user_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "valet_event");
    }
}
