use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory store & retrieval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Weights and thresholds of the prominence formula. The four weights are
/// applied to normalized factors and should sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    #[serde(default = "default_weight_age")]
    pub weight_age: f64,
    #[serde(default = "default_weight_access")]
    pub weight_access: f64,
    #[serde(default = "default_weight_recency")]
    pub weight_recency: f64,
    #[serde(default = "default_weight_importance")]
    pub weight_importance: f64,
    /// Per-access boost increment.
    #[serde(default = "default_access_boost_k")]
    pub access_boost_k: f64,
    /// Access count beyond which further accesses stop boosting.
    #[serde(default = "default_max_access")]
    pub max_counted_accesses: u32,
    /// Prominence at or above which a memory is ACTIVE.
    #[serde(default = "default_active_threshold")]
    pub active_threshold: f64,
    /// Prominence below which a memory is ARCHIVED.
    #[serde(default = "default_dormant_threshold")]
    pub dormant_threshold: f64,
}

fn default_weight_age() -> f64 {
    0.30
}
fn default_weight_access() -> f64 {
    0.25
}
fn default_weight_recency() -> f64 {
    0.25
}
fn default_weight_importance() -> f64 {
    0.20
}
fn default_access_boost_k() -> f64 {
    0.1
}
fn default_max_access() -> u32 {
    10
}
fn default_active_threshold() -> f64 {
    0.5
}
fn default_dormant_threshold() -> f64 {
    0.1
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            weight_age: default_weight_age(),
            weight_access: default_weight_access(),
            weight_recency: default_weight_recency(),
            weight_importance: default_weight_importance(),
            access_boost_k: default_access_boost_k(),
            max_counted_accesses: default_max_access(),
            active_threshold: default_active_threshold(),
            dormant_threshold: default_dormant_threshold(),
        }
    }
}

/// Hybrid retrieval scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of the normalized BM25 term score.
    #[serde(default = "default_term_weight")]
    pub term_weight: f64,
    /// Weight of the normalized cosine similarity.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    /// Apply a recency boost to recently accessed memories.
    #[serde(default = "default_recency_boost")]
    pub recency_boost: bool,
}

fn default_term_weight() -> f64 {
    0.5
}
fn default_vector_weight() -> f64 {
    0.5
}
fn default_recency_boost() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            term_weight: default_term_weight(),
            vector_weight: default_vector_weight(),
            recency_boost: default_recency_boost(),
        }
    }
}
