//! Hybrid memory retrieval.
//!
//! Candidates are scored with a BM25 term score and a cosine similarity over
//! embeddings, each normalized to [0, 1] across the candidate set, combined
//! with configurable weights, optionally boosted by access recency, and
//! finally weighted by prominence.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use valet_domain::config::RetrievalConfig;

use crate::types::{MemoryCategory, MemoryEntry};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

/// One ranked retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedMemory {
    pub id: Uuid,
    pub category: MemoryCategory,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub score: f64,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_owned())
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        na += (*x as f64) * (*x as f64);
        nb += (*y as f64) * (*y as f64);
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// BM25 scores of every candidate against the query tokens.
fn bm25_scores(candidates: &[&MemoryEntry], query_tokens: &[String]) -> Vec<f64> {
    let docs: Vec<Vec<String>> = candidates.iter().map(|e| tokenize(&e.content)).collect();
    let n = docs.len() as f64;
    let avg_len = if docs.is_empty() {
        1.0
    } else {
        docs.iter().map(|d| d.len() as f64).sum::<f64>() / n
    };

    query_tokens
        .iter()
        .fold(vec![0.0; docs.len()], |mut scores, term| {
            let df = docs.iter().filter(|d| d.iter().any(|t| t == term)).count() as f64;
            if df == 0.0 {
                return scores;
            }
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (i, doc) in docs.iter().enumerate() {
                let tf = doc.iter().filter(|t| *t == term).count() as f64;
                if tf > 0.0 {
                    let len_norm = 1.0 - BM25_B + BM25_B * (doc.len() as f64 / avg_len.max(1.0));
                    scores[i] += idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * len_norm);
                }
            }
            scores
        })
}

fn normalize(scores: &mut [f64]) {
    let max = scores.iter().cloned().fold(0.0f64, f64::max);
    if max > 0.0 {
        for s in scores.iter_mut() {
            *s /= max;
        }
    }
}

/// Rank candidates against a query, returning the top `k` hits.
pub fn rank(
    candidates: &[&MemoryEntry],
    query: &str,
    query_embedding: Option<&[f32]>,
    cfg: &RetrievalConfig,
    k: usize,
    now: DateTime<Utc>,
) -> Vec<RetrievedMemory> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let query_tokens = tokenize(query);
    let mut term_scores = bm25_scores(candidates, &query_tokens);
    normalize(&mut term_scores);

    let mut vector_scores: Vec<f64> = candidates
        .iter()
        .map(|e| match (query_embedding, e.embedding.as_deref()) {
            (Some(q), Some(v)) => cosine(q, v).max(0.0),
            _ => 0.0,
        })
        .collect();
    normalize(&mut vector_scores);

    // When one signal is entirely absent, fall back to the other alone
    // instead of halving every score.
    let have_vectors = vector_scores.iter().any(|s| *s > 0.0);
    let have_terms = term_scores.iter().any(|s| *s > 0.0);
    let (tw, vw) = match (have_terms, have_vectors) {
        (true, true) => (cfg.term_weight, cfg.vector_weight),
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (false, false) => return Vec::new(),
    };

    let mut hits: Vec<RetrievedMemory> = candidates
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let mut score = tw * term_scores[i] + vw * vector_scores[i];
            if cfg.recency_boost {
                if let Some(at) = e.last_accessed {
                    let days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
                    score *= 1.0 + 0.3 * (-days / 7.0).exp();
                }
            }
            score *= e.prominence;
            RetrievedMemory {
                id: e.id,
                category: e.category,
                content: e.content.clone(),
                subject: e
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("subject"))
                    .and_then(|s| s.as_str())
                    .map(|s| s.to_owned()),
                score,
            }
        })
        .filter(|h| h.score > 0.0)
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: &str, prominence: f64) -> MemoryEntry {
        let mut e = MemoryEntry::new("u1", content, MemoryCategory::Fact, 5);
        e.prominence = prominence;
        e
    }

    #[test]
    fn term_match_ranks_relevant_first() {
        let a = entry("enjoys hiking in the mountains", 1.0);
        let b = entry("prefers tea over coffee", 1.0);
        let candidates = vec![&a, &b];

        let hits = rank(
            &candidates,
            "mountain hiking trip",
            None,
            &RetrievalConfig::default(),
            5,
            Utc::now(),
        );
        assert!(!hits.is_empty());
        assert!(hits[0].content.contains("hiking"));
    }

    #[test]
    fn prominence_weighs_the_final_score() {
        let strong = entry("tea drinker", 1.0);
        let weak = entry("tea drinker", 0.2);
        let candidates = vec![&weak, &strong];

        let hits = rank(
            &candidates,
            "tea",
            None,
            &RetrievalConfig::default(),
            5,
            Utc::now(),
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, strong.id);
    }

    #[test]
    fn vector_only_query_uses_cosine_alone() {
        let mut a = entry("alpha", 1.0);
        a.embedding = Some(vec![1.0, 0.0]);
        let mut b = entry("beta", 1.0);
        b.embedding = Some(vec![0.0, 1.0]);
        let candidates = vec![&a, &b];

        let hits = rank(
            &candidates,
            "zzz unmatched query",
            Some(&[1.0, 0.0]),
            &RetrievalConfig::default(),
            5,
            Utc::now(),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);
    }

    #[test]
    fn no_signal_returns_empty() {
        let a = entry("alpha", 1.0);
        let candidates = vec![&a];
        let hits = rank(
            &candidates,
            "zzz",
            None,
            &RetrievalConfig::default(),
            5,
            Utc::now(),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn top_k_caps_results() {
        let entries: Vec<MemoryEntry> = (0..10)
            .map(|i| entry(&format!("tea fact number {i}"), 1.0))
            .collect();
        let candidates: Vec<&MemoryEntry> = entries.iter().collect();
        let hits = rank(
            &candidates,
            "tea",
            None,
            &RetrievalConfig::default(),
            3,
            Utc::now(),
        );
        assert_eq!(hits.len(), 3);
    }
}
