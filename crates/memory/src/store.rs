//! The memory store — the single shared mutable resource of the system.
//!
//! Owns memory entries, relations, scheduled items, and behavioral patterns
//! for every user. All writes go through the command surface here; readers
//! get a consistent snapshot per operation (one lock guards the whole
//! state). Persisted as JSON snapshots under the state directory; `flush`
//! writes, `new` reloads.
//!
//! The entry model is append-and-supersede: updates to a logical subject
//! mark the previous latest entry `superseded` and link it with an
//! `UPDATES` relation instead of overwriting history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use valet_domain::config::MemoryConfig;
use valet_domain::error::{Error, Result};

use crate::decay;
use crate::retrieval::{self, RetrievedMemory};
use crate::types::{
    BehavioralPatterns, ItemStatus, MemoryEntry, MemoryRelation, MemoryType, RelationType,
    ScheduledItem,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Command surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Query for hybrid retrieval.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub user_id: String,
    pub text: String,
    /// Query embedding, when the caller could produce one.
    pub embedding: Option<Vec<f32>>,
    pub top_k: usize,
}

/// The narrow command surface handed to the turn engine and skills.
/// Sub-agents get a read-only wrapper over the same trait.
pub trait MemoryCommands: Send + Sync {
    fn save(&self, entry: MemoryEntry) -> Result<Uuid>;
    fn relate(&self, relation: MemoryRelation) -> Result<()>;
    fn record_access(&self, ids: &[Uuid]);
    fn schedule(&self, item: ScheduledItem) -> Result<Uuid>;
    fn search(&self, query: &SearchQuery) -> Vec<RetrievedMemory>;
    fn get(&self, id: Uuid) -> Option<MemoryEntry>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default, Serialize, Deserialize)]
struct StoreState {
    entries: HashMap<Uuid, MemoryEntry>,
    relations: Vec<MemoryRelation>,
    items: HashMap<Uuid, ScheduledItem>,
    patterns: HashMap<String, BehavioralPatterns>,
}

pub struct MemoryStore {
    state_dir: Option<PathBuf>,
    config: MemoryConfig,
    inner: RwLock<StoreState>,
}

impl MemoryStore {
    /// Load or create the store under `state_dir/memory/`.
    pub fn new(state_dir: &Path, config: MemoryConfig) -> Result<Self> {
        let dir = state_dir.join("memory");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let snapshot = dir.join("store.json");
        let state = if snapshot.exists() {
            let raw = std::fs::read_to_string(&snapshot).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            StoreState::default()
        };

        let store = Self {
            state_dir: Some(dir),
            config,
            inner: RwLock::new(state),
        };
        tracing::info!(
            entries = store.inner.read().entries.len(),
            "memory store loaded"
        );
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn ephemeral(config: MemoryConfig) -> Self {
        Self {
            state_dir: None,
            config,
            inner: RwLock::new(StoreState::default()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Persist the current state to disk. No-op for ephemeral stores.
    pub fn flush(&self) -> Result<()> {
        let Some(dir) = &self.state_dir else {
            return Ok(());
        };
        let state = self.inner.read();
        let json = serde_json::to_string(&*state)
            .map_err(|e| Error::Storage(format!("serializing memory store: {e}")))?;
        std::fs::write(dir.join("store.json"), json).map_err(Error::Io)?;
        Ok(())
    }

    /// Cheap storage health check: the state directory is writable.
    pub fn ping(&self) -> Result<()> {
        let Some(dir) = &self.state_dir else {
            return Ok(());
        };
        let probe = dir.join(".ping");
        std::fs::write(&probe, b"ok").map_err(Error::Io)?;
        std::fs::remove_file(&probe).map_err(Error::Io)?;
        Ok(())
    }

    // ── Entries ────────────────────────────────────────────────────

    /// Insert an entry, enforcing the supersede invariant.
    ///
    /// When the entry's metadata carries a `"subject"` string and another
    /// latest entry for the same (user, subject) exists, that entry is
    /// marked superseded and linked with an `UPDATES` relation from the new
    /// entry.
    pub fn insert(&self, mut entry: MemoryEntry) -> Uuid {
        if entry.memory_type == MemoryType::StaticProfile {
            entry.prominence = 1.0;
        }
        if entry.memory_type == MemoryType::Superseded {
            entry.is_latest = false;
        }

        let subject = entry
            .metadata
            .as_ref()
            .and_then(|m| m.get("subject"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_owned());

        let mut state = self.inner.write();

        if let Some(subject) = subject {
            let prior: Option<Uuid> = state
                .entries
                .values()
                .find(|e| {
                    e.is_latest
                        && e.user_id == entry.user_id
                        && e.metadata
                            .as_ref()
                            .and_then(|m| m.get("subject"))
                            .and_then(|s| s.as_str())
                            == Some(subject.as_str())
                })
                .map(|e| e.id);
            if let Some(prior_id) = prior {
                if let Some(old) = state.entries.get_mut(&prior_id) {
                    old.is_latest = false;
                    old.memory_type = MemoryType::Superseded;
                    old.updated_at = Utc::now();
                }
                state.relations.push(MemoryRelation::new(
                    entry.id,
                    prior_id,
                    RelationType::Updates,
                    entry.confidence,
                ));
            }
        }

        let id = entry.id;
        state.entries.insert(id, entry);
        id
    }

    pub fn entry(&self, id: Uuid) -> Option<MemoryEntry> {
        self.inner.read().entries.get(&id).cloned()
    }

    pub fn entries_for_user(&self, user_id: &str) -> Vec<MemoryEntry> {
        self.inner
            .read()
            .entries
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    /// All users with at least one entry, pattern, or scheduled item.
    pub fn users(&self) -> Vec<String> {
        let state = self.inner.read();
        let mut users: Vec<String> = state
            .entries
            .values()
            .map(|e| e.user_id.clone())
            .chain(state.items.values().map(|i| i.user_id.clone()))
            .chain(state.patterns.keys().cloned())
            .collect();
        users.sort();
        users.dedup();
        users
    }

    /// Record an access on each id: bump the counter and timestamp.
    pub fn touch(&self, ids: &[Uuid]) {
        let now = Utc::now();
        let mut state = self.inner.write();
        for id in ids {
            if let Some(e) = state.entries.get_mut(id) {
                e.access_count += 1;
                e.last_accessed = Some(now);
                e.updated_at = now;
            }
        }
    }

    /// Set prominence, keeping static profiles pinned and clamping to [0, 1].
    pub fn set_prominence(&self, id: Uuid, value: f64) {
        let mut state = self.inner.write();
        if let Some(e) = state.entries.get_mut(&id) {
            if e.memory_type == MemoryType::StaticProfile {
                e.prominence = 1.0;
            } else {
                e.prominence = value.clamp(0.0, 1.0);
            }
            e.updated_at = Utc::now();
        }
    }

    /// Mark an entry superseded (loses `is_latest`).
    pub fn mark_superseded(&self, id: Uuid) {
        let mut state = self.inner.write();
        if let Some(e) = state.entries.get_mut(&id) {
            e.memory_type = MemoryType::Superseded;
            e.is_latest = false;
            e.updated_at = Utc::now();
        }
    }

    /// Delete archived entries whose last update is older than
    /// `retention_days`, dropping relations that touch them.
    /// Returns the number of pruned entries.
    pub fn prune_archived(&self, retention_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let floor = self.config.decay.dormant_threshold;
        let mut state = self.inner.write();

        let doomed: Vec<Uuid> = state
            .entries
            .values()
            .filter(|e| {
                e.memory_type != MemoryType::StaticProfile
                    && e.prominence < floor
                    && e.updated_at < cutoff
            })
            .map(|e| e.id)
            .collect();

        for id in &doomed {
            state.entries.remove(id);
        }
        state
            .relations
            .retain(|r| !doomed.contains(&r.source_id) && !doomed.contains(&r.target_id));
        doomed.len()
    }

    /// Candidates for the incremental (light) decay pass: entries touched
    /// within `recent_window`, or older than one day with prominence above
    /// the archive floor. Ordered by prominence descending, capped.
    pub fn light_decay_candidates(
        &self,
        now: DateTime<Utc>,
        recent_window: Duration,
        cap: usize,
    ) -> Vec<MemoryEntry> {
        let floor = self.config.decay.dormant_threshold;
        let state = self.inner.read();
        let mut out: Vec<MemoryEntry> = state
            .entries
            .values()
            .filter(|e| e.memory_type != MemoryType::StaticProfile)
            .filter(|e| {
                let recently_touched = e.updated_at > now - recent_window
                    || e.last_accessed.map_or(false, |t| t > now - recent_window);
                let aged = (now - e.document_date) > Duration::days(1) && e.prominence >= floor;
                recently_touched || aged
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.prominence
                .partial_cmp(&a.prominence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.truncate(cap);
        out
    }

    /// Every non-static entry (full decay scan).
    pub fn non_static_entries(&self) -> Vec<MemoryEntry> {
        self.inner
            .read()
            .entries
            .values()
            .filter(|e| e.memory_type != MemoryType::StaticProfile)
            .cloned()
            .collect()
    }

    // ── Relations ──────────────────────────────────────────────────

    pub fn add_relation(&self, relation: MemoryRelation) -> Result<()> {
        let mut state = self.inner.write();
        if !state.entries.contains_key(&relation.source_id)
            || !state.entries.contains_key(&relation.target_id)
        {
            return Err(Error::Storage(format!(
                "relation endpoints missing: {} -> {}",
                relation.source_id, relation.target_id
            )));
        }
        state.relations.push(relation);
        Ok(())
    }

    pub fn relations(&self) -> Vec<MemoryRelation> {
        self.inner.read().relations.clone()
    }

    pub fn relations_for(&self, id: Uuid) -> Vec<MemoryRelation> {
        self.inner
            .read()
            .relations
            .iter()
            .filter(|r| r.source_id == id || r.target_id == id)
            .cloned()
            .collect()
    }

    // ── Scheduled items ────────────────────────────────────────────

    pub fn add_item(&self, item: ScheduledItem) -> Uuid {
        let id = item.id;
        self.inner.write().items.insert(id, item);
        id
    }

    pub fn item(&self, id: Uuid) -> Option<ScheduledItem> {
        self.inner.read().items.get(&id).cloned()
    }

    pub fn items_for_user(&self, user_id: &str) -> Vec<ScheduledItem> {
        self.inner
            .read()
            .items
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Pending items whose trigger time has arrived and is still inside the
    /// grace horizon. Sorted by trigger time.
    pub fn due_items(&self, now: DateTime<Utc>, grace: Duration) -> Vec<ScheduledItem> {
        let state = self.inner.read();
        let mut due: Vec<ScheduledItem> = state
            .items
            .values()
            .filter(|i| {
                i.status == ItemStatus::Pending
                    && i.trigger_at <= now
                    && i.trigger_at > now - grace
            })
            .cloned()
            .collect();
        due.sort_by_key(|i| i.trigger_at);
        due
    }

    /// Expire pending items whose trigger time is past the grace horizon.
    /// Returns the expired ids.
    pub fn expire_overdue(&self, now: DateTime<Utc>, grace: Duration) -> Vec<Uuid> {
        let mut state = self.inner.write();
        let mut expired = Vec::new();
        for item in state.items.values_mut() {
            if item.status == ItemStatus::Pending && item.trigger_at <= now - grace {
                item.status = ItemStatus::Expired;
                expired.push(item.id);
            }
        }
        expired
    }

    /// Transition an item to `fired`. Returns the item, or `None` when it
    /// was not pending (making delivery dedup idempotent).
    pub fn mark_fired(&self, id: Uuid) -> Option<ScheduledItem> {
        let mut state = self.inner.write();
        let item = state.items.get_mut(&id)?;
        if item.status != ItemStatus::Pending {
            return None;
        }
        item.status = ItemStatus::Fired;
        item.fired_at = Some(Utc::now());
        Some(item.clone())
    }

    pub fn cancel_item(&self, id: Uuid) -> bool {
        let mut state = self.inner.write();
        match state.items.get_mut(&id) {
            Some(item) if item.status == ItemStatus::Pending => {
                item.status = ItemStatus::Cancelled;
                true
            }
            _ => false,
        }
    }

    // ── Behavioral patterns ────────────────────────────────────────

    pub fn patterns(&self, user_id: &str) -> BehavioralPatterns {
        self.inner
            .read()
            .patterns
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| BehavioralPatterns::new(user_id))
    }

    pub fn update_patterns(&self, user_id: &str, f: impl FnOnce(&mut BehavioralPatterns)) {
        let mut state = self.inner.write();
        let entry = state
            .patterns
            .entry(user_id.to_owned())
            .or_insert_with(|| BehavioralPatterns::new(user_id));
        f(entry);
        entry.updated_at = Utc::now();
    }

    // ── Decay application ──────────────────────────────────────────

    /// Recompute prominence for the given entries, writing back values that
    /// moved by more than `epsilon`. Returns (scanned, updated).
    pub fn apply_decay(
        &self,
        entries: &[MemoryEntry],
        now: DateTime<Utc>,
        epsilon: f64,
    ) -> (usize, usize) {
        let mut updated = 0;
        let mut state = self.inner.write();
        for snapshot in entries {
            let fresh = decay::prominence(snapshot, now, &self.config.decay);
            if (fresh - snapshot.prominence).abs() > epsilon {
                if let Some(e) = state.entries.get_mut(&snapshot.id) {
                    e.prominence = fresh;
                    e.updated_at = now;
                    updated += 1;
                }
            }
        }
        (entries.len(), updated)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryCommands impl
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl MemoryCommands for MemoryStore {
    fn save(&self, entry: MemoryEntry) -> Result<Uuid> {
        Ok(self.insert(entry))
    }

    fn relate(&self, relation: MemoryRelation) -> Result<()> {
        self.add_relation(relation)
    }

    fn record_access(&self, ids: &[Uuid]) {
        self.touch(ids);
    }

    fn schedule(&self, item: ScheduledItem) -> Result<Uuid> {
        Ok(self.add_item(item))
    }

    fn search(&self, query: &SearchQuery) -> Vec<RetrievedMemory> {
        let state = self.inner.read();
        let floor = self.config.decay.dormant_threshold;
        let candidates: Vec<&MemoryEntry> = state
            .entries
            .values()
            .filter(|e| {
                e.user_id == query.user_id
                    && e.is_latest
                    // Prominence gates retrieval: archived entries stay out.
                    && e.prominence >= floor
            })
            .collect();
        let mut hits = retrieval::rank(
            &candidates,
            &query.text,
            query.embedding.as_deref(),
            &self.config.retrieval,
            query.top_k,
            Utc::now(),
        );

        // Spreading activation pulls in graph neighbors of the strongest
        // hits; their activation, weighted by prominence, is the score.
        if !hits.is_empty() {
            let seeds: Vec<Uuid> = hits.iter().take(3).map(|h| h.id).collect();
            let activation = crate::activation::spread(
                &seeds,
                &state.relations,
                &crate::activation::ActivationParams::default(),
            );
            for (id, level) in activation {
                if level < 0.2 || hits.iter().any(|h| h.id == id) {
                    continue;
                }
                let Some(e) = state.entries.get(&id) else {
                    continue;
                };
                if e.is_latest && e.user_id == query.user_id && e.prominence >= floor {
                    hits.push(RetrievedMemory {
                        id,
                        category: e.category,
                        content: e.content.clone(),
                        subject: e
                            .metadata
                            .as_ref()
                            .and_then(|m| m.get("subject"))
                            .and_then(|s| s.as_str())
                            .map(|s| s.to_owned()),
                        score: level * e.prominence,
                    });
                }
            }
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            hits.truncate(query.top_k);
        }
        hits
    }

    fn get(&self, id: Uuid) -> Option<MemoryEntry> {
        self.entry(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemSource, ItemType, MemoryCategory};

    fn store() -> MemoryStore {
        MemoryStore::ephemeral(MemoryConfig::default())
    }

    fn entry(user: &str, content: &str) -> MemoryEntry {
        MemoryEntry::new(user, content, MemoryCategory::Fact, 5)
    }

    #[test]
    fn insert_and_get() {
        let s = store();
        let e = entry("u1", "likes tea");
        let id = s.insert(e);
        assert_eq!(s.entry(id).unwrap().content, "likes tea");
    }

    #[test]
    fn subject_insert_supersedes_prior_latest() {
        let s = store();
        let mut first = entry("u1", "works at Acme");
        first.metadata = Some(serde_json::json!({"subject": "employer"}));
        let first_id = s.insert(first);

        let mut second = entry("u1", "works at Initech");
        second.metadata = Some(serde_json::json!({"subject": "employer"}));
        let second_id = s.insert(second);

        let old = s.entry(first_id).unwrap();
        assert!(!old.is_latest);
        assert_eq!(old.memory_type, MemoryType::Superseded);
        assert!(s.entry(second_id).unwrap().is_latest);

        let rels = s.relations_for(first_id);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].relation_type, RelationType::Updates);
        assert_eq!(rels[0].source_id, second_id);
    }

    #[test]
    fn static_profile_prominence_pinned_through_writes() {
        let s = store();
        let mut e = entry("u1", "name is Ada");
        e.memory_type = MemoryType::StaticProfile;
        e.prominence = 0.3;
        let id = s.insert(e);
        assert_eq!(s.entry(id).unwrap().prominence, 1.0);

        s.set_prominence(id, 0.1);
        assert_eq!(s.entry(id).unwrap().prominence, 1.0);
    }

    #[test]
    fn touch_bumps_access_counters() {
        let s = store();
        let id = s.insert(entry("u1", "x"));
        s.touch(&[id]);
        s.touch(&[id]);
        let e = s.entry(id).unwrap();
        assert_eq!(e.access_count, 2);
        assert!(e.last_accessed.is_some());
    }

    #[test]
    fn relation_requires_both_endpoints() {
        let s = store();
        let a = s.insert(entry("u1", "a"));
        let missing = Uuid::new_v4();
        let err = s
            .add_relation(MemoryRelation::new(a, missing, RelationType::Extends, 0.9))
            .unwrap_err();
        assert!(err.to_string().contains("endpoints"));
    }

    #[test]
    fn prune_archived_drops_entries_and_relations() {
        let s = store();
        let a = s.insert(entry("u1", "a"));
        let b = s.insert(entry("u1", "b"));
        s.add_relation(MemoryRelation::new(a, b, RelationType::Extends, 1.0))
            .unwrap();

        // Push `a` into the archive band with an old update stamp.
        {
            let mut state = s.inner.write();
            let e = state.entries.get_mut(&a).unwrap();
            e.prominence = 0.05;
            e.updated_at = Utc::now() - Duration::days(90);
        }

        let pruned = s.prune_archived(30);
        assert_eq!(pruned, 1);
        assert!(s.entry(a).is_none());
        assert!(s.relations().is_empty());
        assert!(s.entry(b).is_some());
    }

    #[test]
    fn due_and_expired_items() {
        let s = store();
        let now = Utc::now();
        let due = ScheduledItem::new(
            "u1",
            ItemSource::User,
            ItemType::Reminder,
            "water the plants",
            now - Duration::minutes(5),
        );
        let stale = ScheduledItem::new(
            "u1",
            ItemSource::Agent,
            ItemType::FollowUp,
            "ancient follow-up",
            now - Duration::days(3),
        );
        let future = ScheduledItem::new(
            "u1",
            ItemSource::User,
            ItemType::Reminder,
            "later",
            now + Duration::hours(1),
        );
        let due_id = s.add_item(due);
        let stale_id = s.add_item(stale);
        s.add_item(future);

        let grace = Duration::hours(24);
        let expired = s.expire_overdue(now, grace);
        assert_eq!(expired, vec![stale_id]);
        assert_eq!(s.item(stale_id).unwrap().status, ItemStatus::Expired);

        let due_now = s.due_items(now, grace);
        assert_eq!(due_now.len(), 1);
        assert_eq!(due_now[0].id, due_id);
    }

    #[test]
    fn mark_fired_is_single_shot() {
        let s = store();
        let item = ScheduledItem::new(
            "u1",
            ItemSource::User,
            ItemType::Reminder,
            "ping",
            Utc::now(),
        );
        let id = s.add_item(item);
        assert!(s.mark_fired(id).is_some());
        assert!(s.mark_fired(id).is_none());
        assert_eq!(s.item(id).unwrap().status, ItemStatus::Fired);
    }

    #[test]
    fn apply_decay_writes_back_only_real_changes() {
        let s = store();
        let mut e = entry("u1", "old news");
        e.document_date = Utc::now() - Duration::days(40);
        e.created_at = e.document_date;
        let id = s.insert(e);

        let snapshot = vec![s.entry(id).unwrap()];
        let (scanned, updated) = s.apply_decay(&snapshot, Utc::now(), 0.01);
        assert_eq!(scanned, 1);
        assert_eq!(updated, 1);
        let first_value = s.entry(id).unwrap().prominence;
        assert!(first_value < 1.0);

        // Second application at (nearly) the same clock is a no-op.
        let snapshot = vec![s.entry(id).unwrap()];
        let (_, updated) = s.apply_decay(&snapshot, Utc::now(), 0.01);
        assert_eq!(updated, 0);
    }

    #[test]
    fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let id;
        {
            let s = MemoryStore::new(dir.path(), MemoryConfig::default()).unwrap();
            id = s.insert(entry("u1", "persisted"));
            s.update_patterns("u1", |p| p.trust_score = 0.9);
            s.flush().unwrap();
        }
        let s = MemoryStore::new(dir.path(), MemoryConfig::default()).unwrap();
        assert_eq!(s.entry(id).unwrap().content, "persisted");
        assert!((s.patterns("u1").trust_score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn search_pulls_in_graph_neighbors_via_activation() {
        let s = store();
        let mut hit = entry("u1", "training for the marathon");
        hit.prominence = 0.9;
        let hit_id = s.insert(hit);

        // Related but textually unmatched entry, linked in the graph.
        let mut neighbor = entry("u1", "physiotherapy on Tuesdays");
        neighbor.prominence = 0.8;
        let neighbor_id = s.insert(neighbor);
        s.add_relation(MemoryRelation::new(
            hit_id,
            neighbor_id,
            RelationType::Extends,
            1.0,
        ))
        .unwrap();

        let hits = s.search(&SearchQuery {
            user_id: "u1".into(),
            text: "marathon".into(),
            embedding: None,
            top_k: 5,
        });
        assert!(hits.iter().any(|h| h.id == neighbor_id));
        // The direct match still outranks the activated neighbor.
        assert_eq!(hits[0].id, hit_id);
    }

    #[test]
    fn search_excludes_archived_and_non_latest() {
        let s = store();
        let mut hot = entry("u1", "coffee order is flat white");
        hot.prominence = 0.9;
        s.insert(hot);

        let mut cold = entry("u1", "coffee machine was broken once");
        cold.prominence = 0.05;
        s.insert(cold);

        let mut old = entry("u1", "coffee order used to be espresso");
        old.is_latest = false;
        old.prominence = 0.9;
        s.insert(old);

        let hits = s.search(&SearchQuery {
            user_id: "u1".into(),
            text: "coffee order".into(),
            embedding: None,
            top_k: 10,
        });
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("flat white"));
    }
}
