//! Memory data model — entries, relations, scheduled items, and per-user
//! behavioral patterns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Preference,
    Fact,
    Event,
    Relationship,
    Insight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Pinned identity facts; prominence is fixed at 1.0.
    StaticProfile,
    /// Profile attributes that evolve (mood, current projects).
    DynamicProfile,
    Regular,
    /// Produced by fusion from a cluster of sources.
    Derived,
    /// Replaced by a newer entry or a derived memory.
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub user_id: String,
    pub content: String,
    pub category: MemoryCategory,
    pub memory_type: MemoryType,
    /// 0–10.
    pub importance: u8,
    /// [0, 1].
    pub confidence: f64,
    pub is_latest: bool,
    /// When the memory was created (the document date).
    pub document_date: DateTime<Utc>,
    /// When the remembered event occurred, if different.
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    /// [0, 1]; recomputed by the decay engine.
    pub prominence: f64,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_count: u32,
    #[serde(default)]
    pub source_chunk: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryEntry {
    /// A fresh `regular` entry with full prominence.
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        category: MemoryCategory,
        importance: u8,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            content: content.into(),
            category,
            memory_type: MemoryType::Regular,
            importance: importance.min(10),
            confidence: 1.0,
            is_latest: true,
            document_date: now,
            event_date: None,
            prominence: 1.0,
            last_accessed: None,
            access_count: 0,
            source_chunk: None,
            embedding: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    Updates,
    Extends,
    Derives,
}

/// Directed edge between two memories. Never mutated after creation;
/// deleted only when an endpoint is pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation_type: RelationType,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl MemoryRelation {
    pub fn new(source_id: Uuid, target_id: Uuid, relation_type: RelationType, confidence: f64) -> Self {
        Self {
            source_id,
            target_id,
            relation_type,
            confidence,
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduled items
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    Agent,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    FollowUp,
    Reminder,
    CheckIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Fired,
    Expired,
    Cancelled,
}

/// A time-bearing intention created by the gardener or by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: Uuid,
    pub user_id: String,
    pub source: ItemSource,
    pub item_type: ItemType,
    pub message: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    pub trigger_at: DateTime<Utc>,
    pub status: ItemStatus,
    #[serde(default)]
    pub fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledItem {
    pub fn new(
        user_id: impl Into<String>,
        source: ItemSource,
        item_type: ItemType,
        message: impl Into<String>,
        trigger_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            source,
            item_type,
            message: message.into(),
            context: None,
            trigger_at,
            status: ItemStatus::Pending,
            fired_at: None,
            created_at: Utc::now(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Behavioral patterns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How eagerly the system creates proactive follow-ups for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Proactiveness {
    Conservative,
    #[default]
    Moderate,
    Eager,
}

impl Proactiveness {
    /// Cap on proactive items created per evaluation pass.
    pub fn max_actions(&self) -> usize {
        match self {
            Proactiveness::Conservative => 1,
            Proactiveness::Moderate => 2,
            Proactiveness::Eager => 4,
        }
    }
}

/// Per-user smoothed affect and interaction statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralPatterns {
    pub user_id: String,
    /// Smoothed valence in [-1, 1].
    pub valence: f64,
    /// Smoothed arousal in [0, 1].
    pub arousal: f64,
    pub emotion: String,
    #[serde(default)]
    pub goal_signal: Option<String>,
    #[serde(default)]
    pub proactiveness: Proactiveness,
    /// Messages observed today.
    #[serde(default)]
    pub messages_today: u32,
    /// Exponentially smoothed daily message count.
    #[serde(default)]
    pub daily_average: f64,
    /// [0, 1]; grows with accurate proactive suggestions.
    #[serde(default = "default_trust")]
    pub trust_score: f64,
    pub updated_at: DateTime<Utc>,
}

fn default_trust() -> f64 {
    0.5
}

impl BehavioralPatterns {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            valence: 0.0,
            arousal: 0.3,
            emotion: "neutral".into(),
            goal_signal: None,
            proactiveness: Proactiveness::default(),
            messages_today: 0,
            daily_average: 0.0,
            trust_score: default_trust(),
            updated_at: Utc::now(),
        }
    }

    /// Blend a new affect observation into the smoothed state.
    /// `alpha` is the weight of the new observation.
    pub fn smooth_affect(&mut self, valence: f64, arousal: f64, emotion: &str, alpha: f64) {
        let a = alpha.clamp(0.0, 1.0);
        self.valence = (1.0 - a) * self.valence + a * valence.clamp(-1.0, 1.0);
        self.arousal = (1.0 - a) * self.arousal + a * arousal.clamp(0.0, 1.0);
        self.emotion = emotion.to_owned();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&RelationType::Derives).unwrap();
        assert_eq!(json, "\"DERIVES\"");
    }

    #[test]
    fn new_entry_defaults() {
        let e = MemoryEntry::new("u1", "likes tea", MemoryCategory::Preference, 12);
        assert_eq!(e.importance, 10); // clamped
        assert_eq!(e.prominence, 1.0);
        assert!(e.is_latest);
        assert_eq!(e.access_count, 0);
    }

    #[test]
    fn smooth_affect_blends() {
        let mut p = BehavioralPatterns::new("u1");
        p.smooth_affect(1.0, 1.0, "excited", 0.5);
        assert!((p.valence - 0.5).abs() < 1e-9);
        assert!((p.arousal - 0.65).abs() < 1e-9);
        assert_eq!(p.emotion, "excited");
    }

    #[test]
    fn proactiveness_caps() {
        assert_eq!(Proactiveness::Conservative.max_actions(), 1);
        assert!(Proactiveness::Eager.max_actions() > Proactiveness::Moderate.max_actions());
    }

    #[test]
    fn scheduled_item_starts_pending() {
        let item = ScheduledItem::new(
            "u1",
            ItemSource::Agent,
            ItemType::FollowUp,
            "check in about the move",
            Utc::now(),
        );
        assert_eq!(item.status, ItemStatus::Pending);
        assert!(item.fired_at.is_none());
    }
}
