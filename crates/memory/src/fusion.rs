//! Memory fusion — merging clusters of related dormant memories into a
//! single derived memory via an LLM summarization call.
//!
//! Cluster discovery is pure graph arithmetic; only the merge itself talks
//! to a provider. Per-cluster failures are logged and skipped so one bad
//! cluster never halts a pass.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use uuid::Uuid;

use valet_domain::chat::ChatMessage;
use valet_domain::error::{Error, Result};
use valet_domain::trace::TraceEvent;
use valet_providers::{ChatRequest, LlmProvider};

use crate::store::MemoryStore;
use crate::types::{MemoryCategory, MemoryEntry, MemoryRelation, MemoryType, RelationType};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cluster discovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct Cluster {
    pub ids: Vec<Uuid>,
    /// `None` for mixed-category (cross-category) clusters.
    pub category: Option<MemoryCategory>,
}

/// Find fusion candidates: connected components of related memories inside
/// the `[min_prominence, max_prominence)` band, excluding derived and
/// superseded entries.
///
/// Without `cross_category` every component is split by category; with it,
/// mixed components survive whole. Components smaller than `min_size` are
/// dropped; the largest `max_clusters` are kept.
pub fn find_clusters(
    entries: &[MemoryEntry],
    relations: &[MemoryRelation],
    min_prominence: f64,
    max_prominence: f64,
    cross_category: bool,
    min_size: usize,
    max_clusters: usize,
) -> Vec<Cluster> {
    let eligible: HashMap<Uuid, &MemoryEntry> = entries
        .iter()
        .filter(|e| {
            e.prominence >= min_prominence
                && e.prominence < max_prominence
                && !matches!(e.memory_type, MemoryType::Derived | MemoryType::Superseded)
        })
        .map(|e| (e.id, e))
        .collect();

    let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for r in relations {
        if eligible.contains_key(&r.source_id) && eligible.contains_key(&r.target_id) {
            adjacency.entry(r.source_id).or_default().push(r.target_id);
            adjacency.entry(r.target_id).or_default().push(r.source_id);
        }
    }

    // Connected components via BFS.
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut components: Vec<Vec<Uuid>> = Vec::new();
    for id in eligible.keys() {
        if seen.contains(id) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = vec![*id];
        seen.insert(*id);
        while let Some(node) = queue.pop() {
            component.push(node);
            if let Some(neighbors) = adjacency.get(&node) {
                for n in neighbors {
                    if seen.insert(*n) {
                        queue.push(*n);
                    }
                }
            }
        }
        components.push(component);
    }

    let mut clusters: Vec<Cluster> = Vec::new();
    for component in components {
        if cross_category {
            let categories: HashSet<MemoryCategory> =
                component.iter().map(|id| eligible[id].category).collect();
            let category = if categories.len() == 1 {
                categories.into_iter().next()
            } else {
                None
            };
            clusters.push(Cluster {
                ids: component,
                category,
            });
        } else {
            let mut by_category: HashMap<MemoryCategory, Vec<Uuid>> = HashMap::new();
            for id in component {
                by_category.entry(eligible[&id].category).or_default().push(id);
            }
            for (category, ids) in by_category {
                clusters.push(Cluster {
                    ids,
                    category: Some(category),
                });
            }
        }
    }

    clusters.retain(|c| c.ids.len() >= min_size);
    clusters.sort_by(|a, b| b.ids.len().cmp(&a.ids.len()));
    clusters.truncate(max_clusters);
    clusters
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fusing one cluster
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct FusionReply {
    summary: String,
    #[allow(dead_code)]
    importance: Option<u8>,
    category: Option<String>,
}

fn fusion_prompt(sources: &[MemoryEntry]) -> String {
    let mut lines = String::from(
        "Merge the following related memories about the user into one \
         consolidated memory. Respond with a JSON object only: \
         {\"summary\": string, \"importance\": integer 0-10, \"category\": \
         one of \"preference\", \"fact\", \"event\", \"relationship\", \
         \"insight\"}.\nThe summary must be shorter than the combined \
         sources and must not invent details.\n\nMemories:\n",
    );
    for (i, src) in sources.iter().enumerate() {
        lines.push_str(&format!("{}. {}\n", i + 1, src.content));
    }
    lines
}

fn parse_category(raw: Option<&str>) -> Option<MemoryCategory> {
    serde_json::from_value(serde_json::Value::String(raw?.to_owned())).ok()
}

/// Fuse one cluster: ask the provider for a consolidated summary, validate
/// it, create the derived memory, link sources with `DERIVES` relations,
/// and mark every source superseded.
///
/// The derived memory takes importance = max of sources and confidence =
/// min of sources. Replies with invalid JSON or a summary longer than the
/// combined sources are rejected.
pub async fn fuse_cluster(
    store: &MemoryStore,
    provider: &dyn LlmProvider,
    cluster: &Cluster,
) -> Result<Uuid> {
    let sources: Vec<MemoryEntry> = cluster
        .ids
        .iter()
        .filter_map(|id| store.entry(*id))
        .collect();
    if sources.len() < 2 {
        return Err(Error::Other("cluster sources vanished".into()));
    }

    let req = ChatRequest {
        messages: vec![ChatMessage::user(fusion_prompt(&sources))],
        json_mode: true,
        temperature: Some(0.3),
        ..Default::default()
    };
    let response = provider.chat(&req).await?;

    let reply: FusionReply = serde_json::from_str(response.content.trim())
        .map_err(|e| Error::Other(format!("fusion reply is not valid JSON: {e}")))?;

    let source_len: usize = sources.iter().map(|s| s.content.len()).sum();
    if reply.summary.is_empty() || reply.summary.len() > source_len {
        return Err(Error::Other(format!(
            "fusion summary rejected: {} chars vs {} source chars",
            reply.summary.len(),
            source_len
        )));
    }

    let importance = sources.iter().map(|s| s.importance).max().unwrap_or(5);
    let confidence = sources
        .iter()
        .map(|s| s.confidence)
        .fold(f64::INFINITY, f64::min);
    let category = parse_category(reply.category.as_deref())
        .or(cluster.category)
        .unwrap_or(sources[0].category);

    let mut derived = MemoryEntry::new(
        sources[0].user_id.clone(),
        reply.summary,
        category,
        importance,
    );
    derived.memory_type = MemoryType::Derived;
    derived.confidence = confidence;
    derived.event_date = sources.iter().filter_map(|s| s.event_date).max();

    let derived_id = store.insert(derived);
    for src in &sources {
        store.add_relation(MemoryRelation::new(
            derived_id,
            src.id,
            RelationType::Derives,
            confidence,
        ))?;
        store.mark_superseded(src.id);
    }

    TraceEvent::ClusterFused {
        cluster_size: sources.len(),
        derived_id: derived_id.to_string(),
    }
    .emit();

    Ok(derived_id)
}

/// Run one full fusion pass over the given band. Per-cluster errors are
/// logged and skipped. Returns the number of derived memories created.
pub async fn run_pass(
    store: &MemoryStore,
    provider: &dyn LlmProvider,
    min_prominence: f64,
    max_prominence: f64,
    cross_category: bool,
    min_size: usize,
    max_clusters: usize,
) -> usize {
    let entries = store.non_static_entries();
    let relations = store.relations();
    let clusters = find_clusters(
        &entries,
        &relations,
        min_prominence,
        max_prominence,
        cross_category,
        min_size,
        max_clusters,
    );

    let mut fused = 0;
    for cluster in &clusters {
        match fuse_cluster(store, provider, cluster).await {
            Ok(_) => fused += 1,
            Err(e) => {
                tracing::warn!(
                    cluster_size = cluster.ids.len(),
                    error = %e,
                    "fusion cluster skipped"
                );
            }
        }
    }
    fused
}
