//! Prominence computation.
//!
//! Pure arithmetic over a memory entry and a clock; the store applies the
//! result. Prominence is a weighted sum of four normalized factors: age
//! decay, access frequency, access recency, and importance.

use chrono::{DateTime, Utc};

use valet_domain::config::DecayConfig;

use crate::types::{MemoryCategory, MemoryEntry, MemoryType};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Daily retention rate per memory type. Higher = slower decay.
fn type_rate(memory_type: MemoryType) -> f64 {
    match memory_type {
        MemoryType::StaticProfile => 1.0,
        MemoryType::DynamicProfile => 0.98,
        MemoryType::Regular => 0.95,
        MemoryType::Derived => 0.97,
        MemoryType::Superseded => 0.90,
    }
}

/// Daily retention rate per category.
fn category_rate(category: MemoryCategory) -> f64 {
    match category {
        MemoryCategory::Preference => 0.97,
        MemoryCategory::Fact => 0.97,
        MemoryCategory::Event => 0.92,
        MemoryCategory::Relationship => 0.98,
        MemoryCategory::Insight => 0.96,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prominence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compute the prominence of a memory at `now`.
///
/// `static_profile` entries are pinned at 1.0. Entries younger than one day
/// with zero accesses get a grace value of 1.0. High-importance (≥ 8) fact
/// and relationship entries never drop below 0.2.
pub fn prominence(entry: &MemoryEntry, now: DateTime<Utc>, cfg: &DecayConfig) -> f64 {
    if entry.memory_type == MemoryType::StaticProfile {
        return 1.0;
    }

    let age_days = (now - entry.document_date).num_seconds().max(0) as f64 / 86_400.0;

    // Grace clause for brand-new, untouched memories.
    if age_days < 1.0 && entry.access_count == 0 {
        return 1.0;
    }

    let decay_rate = type_rate(entry.memory_type).max(category_rate(entry.category));
    let age_decay = decay_rate.powf(age_days);

    // Access-frequency boost, normalized by its maximum value.
    let max_access_boost = 1.0 + cfg.access_boost_k * cfg.max_counted_accesses as f64;
    let access_boost = if entry.access_count == 0 {
        0.5
    } else {
        1.0 + cfg.access_boost_k * entry.access_count.min(cfg.max_counted_accesses) as f64
    };

    // Recency boost, normalized by its maximum value (1.3).
    let recency_boost = match entry.last_accessed {
        None => 1.0,
        Some(at) => {
            let last_days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
            1.0 + 0.3 * (-last_days / 7.0).exp()
        }
    };
    let max_recency_boost = 1.3;

    let importance_weight = entry.importance.min(10) as f64 / 10.0;

    let mut value = cfg.weight_age * age_decay
        + cfg.weight_access * (access_boost / max_access_boost)
        + cfg.weight_recency * (recency_boost / max_recency_boost)
        + cfg.weight_importance * importance_weight;

    // Sticky identity: important facts and relationships never fully fade.
    if entry.importance >= 8
        && matches!(
            entry.category,
            MemoryCategory::Fact | MemoryCategory::Relationship
        )
    {
        value = value.max(0.2);
    }

    value.clamp(0.0, 1.0)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProminenceBand {
    Active,
    Dormant,
    Archived,
}

/// Classify a prominence value against the configured thresholds.
pub fn band(value: f64, cfg: &DecayConfig) -> ProminenceBand {
    if value >= cfg.active_threshold {
        ProminenceBand::Active
    } else if value >= cfg.dormant_threshold {
        ProminenceBand::Dormant
    } else {
        ProminenceBand::Archived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cfg() -> DecayConfig {
        DecayConfig::default()
    }

    fn entry(age_days: i64, access_count: u32, importance: u8) -> MemoryEntry {
        let now = Utc::now();
        let mut e = MemoryEntry::new("u1", "content", MemoryCategory::Event, importance);
        e.document_date = now - Duration::days(age_days);
        e.created_at = e.document_date;
        e.access_count = access_count;
        if access_count > 0 {
            e.last_accessed = Some(now - Duration::days(1));
        }
        e
    }

    #[test]
    fn static_profile_pinned_at_one() {
        let mut e = entry(100, 0, 3);
        e.memory_type = MemoryType::StaticProfile;
        assert_eq!(prominence(&e, Utc::now(), &cfg()), 1.0);
    }

    #[test]
    fn grace_clause_for_fresh_untouched() {
        let e = entry(0, 0, 1);
        assert_eq!(prominence(&e, Utc::now(), &cfg()), 1.0);
    }

    #[test]
    fn grace_does_not_apply_once_accessed() {
        let mut e = entry(0, 1, 1);
        e.last_accessed = Some(Utc::now());
        let p = prominence(&e, Utc::now(), &cfg());
        assert!(p < 1.0);
    }

    #[test]
    fn old_unaccessed_memory_fades() {
        let e = entry(60, 0, 2);
        let p = prominence(&e, Utc::now(), &cfg());
        assert!(p < 0.5, "expected dormant-or-lower, got {p}");
    }

    #[test]
    fn accesses_slow_the_fade() {
        let cold = entry(30, 0, 5);
        let warm = entry(30, 8, 5);
        let now = Utc::now();
        assert!(prominence(&warm, now, &cfg()) > prominence(&cold, now, &cfg()));
    }

    #[test]
    fn sticky_floor_for_important_facts() {
        let now = Utc::now();
        let mut e = entry(3650, 0, 9);
        e.category = MemoryCategory::Fact;
        assert!(prominence(&e, now, &cfg()) >= 0.2);

        e.category = MemoryCategory::Relationship;
        assert!(prominence(&e, now, &cfg()) >= 0.2);

        // Events of the same importance have no floor.
        e.category = MemoryCategory::Event;
        let p = prominence(&e, now, &cfg());
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn prominence_always_in_unit_interval() {
        let now = Utc::now();
        for age in [0, 1, 7, 30, 365, 3650] {
            for access in [0, 1, 5, 50] {
                for imp in [0, 5, 10] {
                    let e = entry(age, access, imp);
                    let p = prominence(&e, now, &cfg());
                    assert!((0.0..=1.0).contains(&p), "p={p} age={age} acc={access}");
                }
            }
        }
    }

    #[test]
    fn recomputation_is_idempotent() {
        let e = entry(12, 3, 6);
        let now = Utc::now();
        let first = prominence(&e, now, &cfg());
        let second = prominence(&e, now, &cfg());
        assert_eq!(first, second);
    }

    #[test]
    fn band_thresholds() {
        let c = cfg();
        assert_eq!(band(0.9, &c), ProminenceBand::Active);
        assert_eq!(band(0.5, &c), ProminenceBand::Active);
        assert_eq!(band(0.49, &c), ProminenceBand::Dormant);
        assert_eq!(band(0.1, &c), ProminenceBand::Dormant);
        assert_eq!(band(0.09, &c), ProminenceBand::Archived);
    }
}
