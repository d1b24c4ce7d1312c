//! Gap scanner — detect dropped threads and stale goals, dedupe the
//! candidates, and triage them through the user's proactiveness dial.
//!
//! Detection and dedup are pure; the sleep tick feeds them store snapshots
//! and schedules whatever survives triage.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use valet_memory::{
    BehavioralPatterns, ItemStatus, ItemType, MemoryEntry, Proactiveness, ScheduledItem,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    StaleGoal,
    UnresolvedThread,
    BehavioralAnomaly,
}

#[derive(Debug, Clone)]
pub struct GapCandidate {
    /// Stable identity of what produced this gap (memory id, item id, or
    /// a synthetic marker) used for dedup.
    pub source_id: String,
    pub message: String,
    pub kind: GapKind,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Goals untouched for two weeks.
pub fn detect_stale_goals(entries: &[MemoryEntry], now: DateTime<Utc>) -> Vec<GapCandidate> {
    entries
        .iter()
        .filter(|e| {
            e.is_latest
                && e.metadata
                    .as_ref()
                    .and_then(|m| m.get("kind"))
                    .and_then(|k| k.as_str())
                    == Some("goal")
                && now - e.updated_at > Duration::days(14)
        })
        .map(|e| GapCandidate {
            source_id: e.id.to_string(),
            message: format!("Check in on a goal that has gone quiet: {}", e.content),
            kind: GapKind::StaleGoal,
        })
        .collect()
}

/// Follow-ups that expired unfired in the last week — threads the system
/// dropped on the floor.
pub fn detect_unresolved_threads(
    items: &[ScheduledItem],
    now: DateTime<Utc>,
) -> Vec<GapCandidate> {
    items
        .iter()
        .filter(|i| {
            i.status == ItemStatus::Expired
                && i.item_type == ItemType::FollowUp
                && now - i.trigger_at < Duration::days(7)
        })
        .map(|i| GapCandidate {
            source_id: i.id.to_string(),
            message: format!("Revisit a dropped follow-up: {}", i.message),
            kind: GapKind::UnresolvedThread,
        })
        .collect()
}

/// A sharp drop in message frequency compared to the smoothed average.
pub fn detect_anomalies(patterns: &BehavioralPatterns) -> Vec<GapCandidate> {
    if patterns.daily_average >= 3.0 && (patterns.messages_today as f64) < patterns.daily_average / 3.0
    {
        vec![GapCandidate {
            source_id: format!("anomaly:{}", patterns.user_id),
            message: "The user has been much quieter than usual; a light check-in may help."
                .into(),
            kind: GapKind::BehavioralAnomaly,
        }]
    } else {
        Vec::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dedup & triage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fraction of shared words relative to the larger message.
pub fn word_overlap(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_owned())
        .filter(|w| !w.is_empty())
        .collect();
    let words_b: HashSet<String> = b
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_owned())
        .filter(|w| !w.is_empty())
        .collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let shared = words_a.intersection(&words_b).count() as f64;
    shared / words_a.len().max(words_b.len()) as f64
}

/// Drop candidates repeating an earlier source id or overlapping an
/// earlier message by ≥ 0.8. Keep-first, so a second pass over an already
/// deduped list changes nothing.
pub fn dedupe(candidates: Vec<GapCandidate>) -> Vec<GapCandidate> {
    let mut kept: Vec<GapCandidate> = Vec::new();
    for candidate in candidates {
        let duplicate = kept.iter().any(|k| {
            k.source_id == candidate.source_id
                || word_overlap(&k.message, &candidate.message) >= 0.8
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// Cap the surviving candidates by the user's proactiveness dial.
pub fn triage(mut candidates: Vec<GapCandidate>, dial: Proactiveness) -> Vec<GapCandidate> {
    candidates.truncate(dial.max_actions());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_memory::{ItemSource, MemoryCategory};

    fn candidate(source: &str, message: &str) -> GapCandidate {
        GapCandidate {
            source_id: source.into(),
            message: message.into(),
            kind: GapKind::StaleGoal,
        }
    }

    #[test]
    fn overlap_of_identical_messages_is_one() {
        assert_eq!(word_overlap("check the goal", "check the goal"), 1.0);
    }

    #[test]
    fn overlap_of_disjoint_messages_is_zero() {
        assert_eq!(word_overlap("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn dedupe_drops_same_source_and_near_duplicates() {
        let candidates = vec![
            candidate("a", "check in on the marathon training goal"),
            candidate("a", "completely different text"),
            candidate("b", "check in on the marathon training goal today"),
            candidate("c", "something unrelated entirely"),
        ];
        let deduped = dedupe(candidates);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source_id, "a");
        assert_eq!(deduped[1].source_id, "c");
    }

    #[test]
    fn dedupe_is_idempotent() {
        let candidates = vec![
            candidate("a", "check in on the marathon training goal"),
            candidate("b", "check in on the marathon training goal now"),
            candidate("c", "ask about the new job"),
        ];
        let once = dedupe(candidates);
        let twice = dedupe(once.clone());
        assert_eq!(once.len(), twice.len());
        for (x, y) in once.iter().zip(twice.iter()) {
            assert_eq!(x.source_id, y.source_id);
        }
    }

    #[test]
    fn triage_respects_the_dial() {
        let candidates = vec![
            candidate("a", "one"),
            candidate("b", "two"),
            candidate("c", "three"),
        ];
        assert_eq!(triage(candidates.clone(), Proactiveness::Conservative).len(), 1);
        assert_eq!(triage(candidates.clone(), Proactiveness::Moderate).len(), 2);
        assert_eq!(triage(candidates, Proactiveness::Eager).len(), 3);
    }

    #[test]
    fn stale_goal_detection() {
        let now = Utc::now();
        let mut fresh = MemoryEntry::new("u1", "run a marathon", MemoryCategory::Fact, 7);
        fresh.metadata = Some(serde_json::json!({"kind": "goal"}));

        let mut stale = MemoryEntry::new("u1", "learn violin", MemoryCategory::Fact, 7);
        stale.metadata = Some(serde_json::json!({"kind": "goal"}));
        stale.updated_at = now - Duration::days(30);

        let gaps = detect_stale_goals(&[fresh, stale], now);
        assert_eq!(gaps.len(), 1);
        assert!(gaps[0].message.contains("violin"));
    }

    #[test]
    fn anomaly_requires_established_average() {
        let mut patterns = BehavioralPatterns::new("u1");
        patterns.daily_average = 9.0;
        patterns.messages_today = 1;
        assert_eq!(detect_anomalies(&patterns).len(), 1);

        patterns.daily_average = 1.0;
        patterns.messages_today = 0;
        assert!(detect_anomalies(&patterns).is_empty());
    }

    #[test]
    fn expired_followups_surface_as_threads() {
        let now = Utc::now();
        let mut item = ScheduledItem::new(
            "u1",
            ItemSource::Agent,
            ItemType::FollowUp,
            "ask how the interview went",
            now - Duration::days(2),
        );
        item.status = ItemStatus::Expired;
        let gaps = detect_unresolved_threads(&[item], now);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].kind, GapKind::UnresolvedThread);
    }
}
