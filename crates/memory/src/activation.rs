//! Spreading activation over the relation graph.
//!
//! Edges are stored as rows, not pointers; traversal works over an adjacency
//! index built per call. Activation starts at the seed memories and spreads
//! outward for a bounded number of steps, attenuated by a decay factor and
//! perturbed by a small noise term. The resulting map can be multiplied by
//! prominence for final ranking.

use std::collections::HashMap;

use rand::Rng;
use uuid::Uuid;

use crate::types::MemoryRelation;

#[derive(Debug, Clone, Copy)]
pub struct ActivationParams {
    /// Propagation rounds.
    pub max_steps: usize,
    /// Attenuation per hop, in (0, 1).
    pub decay: f64,
    /// Uniform noise amplitude applied per hop; 0.0 disables noise.
    pub noise: f64,
}

impl Default for ActivationParams {
    fn default() -> Self {
        Self {
            max_steps: 3,
            decay: 0.5,
            noise: 0.05,
        }
    }
}

/// Spread activation from `seeds` across `relations` (treated as
/// undirected for traversal). Returns the activation per reached memory,
/// seeds included at 1.0.
pub fn spread(
    seeds: &[Uuid],
    relations: &[MemoryRelation],
    params: &ActivationParams,
) -> HashMap<Uuid, f64> {
    let mut adjacency: HashMap<Uuid, Vec<(Uuid, f64)>> = HashMap::new();
    for r in relations {
        adjacency
            .entry(r.source_id)
            .or_default()
            .push((r.target_id, r.confidence));
        adjacency
            .entry(r.target_id)
            .or_default()
            .push((r.source_id, r.confidence));
    }

    let mut activation: HashMap<Uuid, f64> = HashMap::new();
    let mut frontier: Vec<Uuid> = Vec::new();
    for seed in seeds {
        activation.insert(*seed, 1.0);
        frontier.push(*seed);
    }

    let mut rng = rand::thread_rng();

    for _ in 0..params.max_steps {
        let mut next_frontier = Vec::new();
        for node in frontier.drain(..) {
            let Some(level) = activation.get(&node).copied() else {
                continue;
            };
            let Some(neighbors) = adjacency.get(&node) else {
                continue;
            };
            for (neighbor, edge_confidence) in neighbors {
                let jitter = if params.noise > 0.0 {
                    1.0 + rng.gen_range(-params.noise..=params.noise)
                } else {
                    1.0
                };
                let contribution = level * params.decay * edge_confidence * jitter;
                if contribution <= 0.001 {
                    continue;
                }
                let slot = activation.entry(*neighbor).or_insert(0.0);
                if contribution > *slot {
                    *slot = contribution.min(1.0);
                    next_frontier.push(*neighbor);
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    activation
}
