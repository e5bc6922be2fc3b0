//! Global node and edge samplers.
//!
//! Separately from per-node neighbor sampling, clients create sampler
//! objects that draw nodes or edges from the whole shard, typically to seed
//! mini-batches. A sampler is built once over the hosted partitions, is
//! immutable afterwards, and lives in a process-wide registry until
//! shutdown. `Create` reports the total mass this shard contributes so a
//! federated client can decide how many draws to request from each shard.
//!
//! The on-disk format carries no per-node weight, so a weighted node
//! sampler weighs every eligible node equally and reports the eligible node
//! count as its mass; weighted edge samplers draw proportionally to edge
//! weight.

use crate::engine::GraphEngine;
use dashmap::DashMap;
use graphd_core::{EdgeType, NodeId, NodeType, RequestError, SamplerCategory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

/// One draw result; for edge samplers `node_ids` is `[src..., dst...]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    pub types: Vec<i32>,
    pub node_ids: Vec<NodeId>,
}

/// Sampler over the shard's nodes of a set of types.
#[derive(Debug)]
struct NodeSampler {
    category: SamplerCategory,
    types: Vec<NodeType>,
    node_ids: Vec<NodeId>,
}

impl NodeSampler {
    fn build(engine: &GraphEngine, entity_types: &[NodeType], category: SamplerCategory) -> Self {
        let mut types = Vec::new();
        let mut node_ids = Vec::new();
        for partition in engine.partitions() {
            for (internal, &node_type) in partition.node_types().iter().enumerate() {
                if entity_types.contains(&node_type) {
                    types.push(node_type);
                    node_ids.push(partition.external_ids()[internal]);
                }
            }
        }
        Self {
            category,
            types,
            node_ids,
        }
    }

    fn weight(&self) -> f32 {
        self.node_ids.len() as f32
    }

    fn sample(&self, seed: i64, count: usize) -> SampleSet {
        let mut out = SampleSet::default();
        if self.node_ids.is_empty() {
            return out;
        }
        let mut rng = StdRng::seed_from_u64(seed as u64);
        match self.category {
            // Without per-node weights every node carries mass one, so the
            // weighted draw coincides with the uniform one.
            SamplerCategory::Weighted | SamplerCategory::UniformWithReplacement => {
                for _ in 0..count {
                    let pick = rng.gen_range(0..self.node_ids.len());
                    out.types.push(self.types[pick]);
                    out.node_ids.push(self.node_ids[pick]);
                }
            }
            SamplerCategory::UniformWithoutReplacement => {
                for pick in reservoir(&mut rng, self.node_ids.len(), count) {
                    out.types.push(self.types[pick]);
                    out.node_ids.push(self.node_ids[pick]);
                }
            }
        }
        out
    }
}

/// Sampler over the shard's edges of a set of types.
#[derive(Debug)]
struct EdgeSampler {
    category: SamplerCategory,
    types: Vec<EdgeType>,
    src_ids: Vec<NodeId>,
    dst_ids: Vec<NodeId>,
    /// Running weight sums for the weighted category.
    cumulative: Vec<f32>,
    total_weight: f32,
}

impl EdgeSampler {
    fn build(engine: &GraphEngine, entity_types: &[EdgeType], category: SamplerCategory) -> Self {
        let mut sampler = Self {
            category,
            types: Vec::new(),
            src_ids: Vec::new(),
            dst_ids: Vec::new(),
            cumulative: Vec::new(),
            total_weight: 0.0,
        };
        for partition in engine.partitions() {
            let external_ids = partition.external_ids();
            partition.for_each_edge(|src_internal, record| {
                if entity_types.contains(&record.edge_type) {
                    sampler.types.push(record.edge_type);
                    sampler.src_ids.push(external_ids[src_internal]);
                    sampler.dst_ids.push(record.dst);
                    sampler.total_weight += record.weight;
                    sampler.cumulative.push(sampler.total_weight);
                }
            });
        }
        sampler
    }

    fn len(&self) -> usize {
        self.types.len()
    }

    fn weight(&self) -> f32 {
        match self.category {
            SamplerCategory::Weighted => self.total_weight,
            _ => self.len() as f32,
        }
    }

    fn sample(&self, seed: i64, count: usize) -> SampleSet {
        let mut picks = Vec::new();
        if self.len() > 0 {
            let mut rng = StdRng::seed_from_u64(seed as u64);
            match self.category {
                SamplerCategory::Weighted if self.total_weight > 0.0 => {
                    for _ in 0..count {
                        let r: f32 = rng.gen_range(0.0..self.total_weight);
                        picks.push(
                            self.cumulative
                                .partition_point(|&c| c <= r)
                                .min(self.len() - 1),
                        );
                    }
                }
                SamplerCategory::Weighted | SamplerCategory::UniformWithReplacement => {
                    for _ in 0..count {
                        picks.push(rng.gen_range(0..self.len()));
                    }
                }
                SamplerCategory::UniformWithoutReplacement => {
                    picks = reservoir(&mut rng, self.len(), count);
                }
            }
        }

        let mut out = SampleSet::default();
        for &pick in &picks {
            out.types.push(self.types[pick]);
            out.node_ids.push(self.src_ids[pick]);
        }
        for &pick in &picks {
            out.node_ids.push(self.dst_ids[pick]);
        }
        out
    }
}

/// Standard reservoir pick of `min(count, items)` distinct indices.
fn reservoir(rng: &mut StdRng, items: usize, count: usize) -> Vec<usize> {
    let mut picks: Vec<usize> = (0..items.min(count)).collect();
    for item in picks.len()..items {
        let r = rng.gen_range(0..=item);
        if r < count {
            picks[r] = item;
        }
    }
    picks
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
enum Sampler {
    Nodes(NodeSampler),
    Edges(EdgeSampler),
}

/// Process-wide sampler table, created at startup and dropped at shutdown.
#[derive(Debug, Default)]
pub struct SamplerRegistry {
    samplers: DashMap<u64, Sampler>,
    next_id: AtomicU64,
}

impl SamplerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sampler over the engine's partitions and registers it.
    ///
    /// Returns the sampler id and the total mass this shard contributes for
    /// the requested entity types.
    pub fn create(
        &self,
        engine: &GraphEngine,
        entity_types: &[i32],
        is_edge: bool,
        category: SamplerCategory,
    ) -> (u64, f32) {
        let (sampler, weight) = if is_edge {
            let sampler = EdgeSampler::build(engine, entity_types, category);
            let weight = sampler.weight();
            (Sampler::Edges(sampler), weight)
        } else {
            let sampler = NodeSampler::build(engine, entity_types, category);
            let weight = sampler.weight();
            (Sampler::Nodes(sampler), weight)
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.samplers.insert(id, sampler);
        (id, weight)
    }

    /// Draws from a registered sampler.
    pub fn sample(
        &self,
        sampler_id: u64,
        seed: i64,
        count: usize,
        is_edge: bool,
    ) -> Result<SampleSet, RequestError> {
        let sampler = self
            .samplers
            .get(&sampler_id)
            .ok_or(RequestError::UnknownSampler(sampler_id))?;
        match (&*sampler, is_edge) {
            (Sampler::Nodes(s), false) => Ok(s.sample(seed, count)),
            (Sampler::Edges(s), true) => Ok(s.sample(seed, count)),
            _ => Err(RequestError::SamplerKindMismatch(sampler_id)),
        }
    }

    /// Number of live samplers.
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }
}
