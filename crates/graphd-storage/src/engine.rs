//! The per-request query engine.
//!
//! One [`GraphEngine`] owns every partition hosted by this server, the
//! node-location index over them, the metadata manifest and the optional
//! fan-out pool. Every request follows the same skeleton: resolve each work
//! item through the index, iterate its placements, accumulate columnar
//! output, and assemble the reply deterministically.
//!
//! Two placement-iteration contracts coexist and are part of the query
//! semantics, not an accident: feature lookups stop at the first placement
//! that owns the data, while neighbor enumeration and sampling visit every
//! placement and accumulate.
//!
//! Per-element absences are not errors; they are conveyed by omission in
//! offsets columns or by sentinel defaults in sampling replies. Only
//! structural violations ([`RequestError`]) fail a request.

use crate::fanout::{run_chunked, ThreadPool};
use crate::metadata::Metadata;
use crate::node_map::{read_node_map, NodeLocationIndex};
use crate::partition::Partition;
use crate::storage::{StorageError, StorageMode};
use graphd_core::{
    check_sorted_edge_types, feature_vector_size, EdgeType, FeatureId, FeatureMeta, NodeId,
    NodeType, RequestError, DEFAULT_NODE_TYPE,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const NEIGHBORS_PREFIX: &str = "neighbors_";

// =============================================================================
// Options
// =============================================================================

/// Startup options for the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Data directory holding the partition files and `meta.json`.
    pub data_dir: PathBuf,
    /// Partition suffix numbers this server hosts.
    pub partitions: Vec<u32>,
    /// How partition files are held in memory.
    pub storage: StorageMode,
    /// Whether to create the request fan-out pool.
    pub enable_threadpool: bool,
}

// =============================================================================
// Reply shapes
// =============================================================================

/// Dense feature reply: concatenated payload plus the offsets column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeaturesReply {
    pub values: Vec<u8>,
    pub offsets: Vec<u32>,
}

/// Sparse feature reply; the `_counts` arrays split the flat `indices` and
/// `values` by feature, or by feature-per-worker for edge requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseFeaturesReply {
    pub values: Vec<u8>,
    pub indices: Vec<i64>,
    pub dimensions: Vec<i64>,
    pub indices_counts: Vec<i64>,
    pub values_counts: Vec<i64>,
}

/// String feature reply; `dimensions` is a flat `inputs x features` table of
/// byte lengths, zero meaning absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringFeaturesReply {
    pub values: Vec<u8>,
    pub dimensions: Vec<i64>,
}

/// Node type reply; only nodes with a non-default type are reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTypesReply {
    pub types: Vec<NodeType>,
    pub offsets: Vec<u32>,
}

/// Full neighbor enumeration reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborsReply {
    pub node_ids: Vec<NodeId>,
    pub edge_weights: Vec<f32>,
    pub edge_types: Vec<EdgeType>,
    pub neighbor_counts: Vec<u64>,
}

/// Weighted neighbor sampling request.
#[derive(Debug, Clone)]
pub struct WeightedSampleRequest {
    pub seed: i64,
    pub node_ids: Vec<NodeId>,
    pub edge_types: Vec<EdgeType>,
    pub count: usize,
    pub default_node_id: NodeId,
    pub default_node_weight: f32,
    pub default_edge_type: EdgeType,
}

/// Weighted neighbor sampling reply; `found x count` slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightedSampleReply {
    pub node_ids: Vec<NodeId>,
    pub neighbor_ids: Vec<NodeId>,
    pub neighbor_types: Vec<EdgeType>,
    pub neighbor_weights: Vec<f32>,
    pub shard_weights: Vec<f32>,
}

/// Uniform neighbor sampling request.
#[derive(Debug, Clone)]
pub struct UniformSampleRequest {
    pub seed: i64,
    pub node_ids: Vec<NodeId>,
    pub edge_types: Vec<EdgeType>,
    pub count: usize,
    pub without_replacement: bool,
    pub default_node_id: NodeId,
    pub default_edge_type: EdgeType,
}

/// Uniform neighbor sampling reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSampleReply {
    pub node_ids: Vec<NodeId>,
    pub neighbor_ids: Vec<NodeId>,
    pub neighbor_types: Vec<EdgeType>,
    pub shard_counts: Vec<u64>,
}

// =============================================================================
// Engine
// =============================================================================

/// Read-only query engine over the hosted partitions.
#[derive(Debug)]
pub struct GraphEngine {
    metadata: Metadata,
    partitions: Vec<Partition>,
    index: NodeLocationIndex,
    pool: Option<ThreadPool>,
}

impl GraphEngine {
    /// Loads every configured partition under the data directory.
    ///
    /// Suffixes are discovered from `neighbors_<suffix>.*` files whose
    /// numeric tail is in the configured partition set, sorted
    /// lexicographically and assigned consecutive local indices. Any
    /// unreadable or incomplete partition is fatal.
    pub fn open(options: EngineOptions) -> Result<Self, StorageError> {
        let metadata = Metadata::load(&options.data_dir)?;
        let suffixes = discover_suffixes(&options.data_dir, &options.partitions)?;

        let mut partitions = Vec::with_capacity(suffixes.len());
        let mut index = NodeLocationIndex::new();
        for (local, suffix) in suffixes.iter().enumerate() {
            let map_path = options.data_dir.join(format!("node_{suffix}.map"));
            if !map_path.exists() {
                return Err(StorageError::MissingCompanion {
                    suffix: suffix.clone(),
                    path: map_path,
                });
            }
            let records = read_node_map(&map_path)?;
            let partition = Partition::load(&options.data_dir, suffix, options.storage, &records)?;
            index.add_partition(&records, local as u32);
            info!(
                suffix = %suffix,
                nodes = partition.node_count(),
                edges = partition.edge_count(),
                "loaded partition"
            );
            partitions.push(partition);
        }

        let pool = options.enable_threadpool.then(|| ThreadPool::new(0));
        info!(
            partitions = partitions.len(),
            nodes = index.node_count(),
            threadpool = pool.is_some(),
            "graph engine ready"
        );

        Ok(Self {
            metadata,
            partitions,
            index,
            pool,
        })
    }

    /// The metadata manifest loaded at startup.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The hosted partitions in local-index order.
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    // =========================================================================
    // Node types
    // =========================================================================

    /// Resolves the first non-default type of each node across placements.
    pub fn node_types(&self, node_ids: &[NodeId]) -> NodeTypesReply {
        let mut reply = NodeTypesReply::default();
        for (position, &node_id) in node_ids.iter().enumerate() {
            let Some(run) = self.index.locate(node_id) else {
                continue;
            };
            let mut result = DEFAULT_NODE_TYPE;
            for (partition, internal) in run.iter() {
                result = self.partitions[partition as usize].get_node_type(internal);
                if result != DEFAULT_NODE_TYPE {
                    break;
                }
            }
            if result != DEFAULT_NODE_TYPE {
                reply.offsets.push(position as u32);
                reply.types.push(result);
            }
        }
        reply
    }

    // =========================================================================
    // Dense features
    // =========================================================================

    /// Fetches dense node features; the first placement that owns node
    /// features wins.
    pub fn node_features(
        self: &Arc<Self>,
        node_ids: Vec<NodeId>,
        features: Vec<FeatureMeta>,
    ) -> FeaturesReply {
        let fv_size = feature_vector_size(&features);
        let items = node_ids.len();
        let engine = Arc::clone(self);
        let node_ids = Arc::new(node_ids);
        let features = Arc::new(features);

        let buffers = run_chunked(
            self.pool.as_ref(),
            items,
            || (Vec::<u32>::new(), Vec::<u8>::new()),
            move |_, start, end, buf| {
                for position in start..end {
                    let Some(run) = engine.index.locate(node_ids[position]) else {
                        continue;
                    };
                    for (partition, internal) in run.iter() {
                        let partition = &engine.partitions[partition as usize];
                        if partition.has_node_features(internal) {
                            let at = buf.1.len();
                            buf.1.resize(at + fv_size, 0);
                            partition.get_node_feature(internal, &features, &mut buf.1[at..]);
                            buf.0.push(position as u32);
                            break;
                        }
                    }
                }
            },
        );

        let mut reply = FeaturesReply::default();
        for (offsets, values) in buffers {
            reply.offsets.extend(offsets);
            reply.values.extend(values);
        }
        reply
    }

    /// Fetches dense edge features for `[src..., dst...]` endpoint pairs;
    /// the first placement containing the edge wins.
    pub fn edge_features(
        self: &Arc<Self>,
        node_ids: Vec<NodeId>,
        types: Vec<EdgeType>,
        features: Vec<FeatureMeta>,
    ) -> Result<FeaturesReply, RequestError> {
        let len = check_edge_arity(&node_ids, &types)?;
        let fv_size = feature_vector_size(&features);
        let engine = Arc::clone(self);
        let node_ids = Arc::new(node_ids);
        let types = Arc::new(types);
        let features = Arc::new(features);

        let buffers = run_chunked(
            self.pool.as_ref(),
            len,
            || (Vec::<u32>::new(), Vec::<u8>::new()),
            move |_, start, end, buf| {
                for position in start..end {
                    let Some(run) = engine.index.locate(node_ids[position]) else {
                        continue;
                    };
                    let at = buf.1.len();
                    buf.1.resize(at + fv_size, 0);
                    let mut found = false;
                    for (partition, internal) in run.iter() {
                        found = engine.partitions[partition as usize].get_edge_feature(
                            internal,
                            node_ids[len + position],
                            types[position],
                            &features,
                            &mut buf.1[at..],
                        );
                        if found {
                            break;
                        }
                    }
                    if found {
                        buf.0.push(position as u32);
                    } else {
                        buf.1.truncate(at);
                    }
                }
            },
        );

        let mut reply = FeaturesReply::default();
        for (offsets, values) in buffers {
            reply.offsets.extend(offsets);
            reply.values.extend(values);
        }
        Ok(reply)
    }

    // =========================================================================
    // Sparse features
    // =========================================================================

    /// Fetches sparse node features; counts are reported per feature,
    /// summed across workers.
    pub fn node_sparse_features(
        self: &Arc<Self>,
        node_ids: Vec<NodeId>,
        features: Vec<FeatureId>,
    ) -> SparseFeaturesReply {
        let items = node_ids.len();
        let feature_count = features.len();
        let engine = Arc::clone(self);
        let node_ids = Arc::new(node_ids);
        let features = Arc::new(features);

        let buffers = run_chunked(
            self.pool.as_ref(),
            items,
            move || SparseBuffer::new(feature_count),
            move |_, start, end, buf| {
                for position in start..end {
                    let Some(run) = engine.index.locate(node_ids[position]) else {
                        continue;
                    };
                    for (partition, internal) in run.iter() {
                        let found = engine.partitions[partition as usize].get_node_sparse_feature(
                            internal,
                            &features,
                            position as i64,
                            &mut buf.dimensions,
                            &mut buf.indices,
                            &mut buf.values,
                        );
                        if found {
                            break;
                        }
                    }
                }
            },
        );

        assemble_sparse_by_feature(feature_count, &buffers)
    }

    /// Fetches sparse edge features; counts are reported per feature per
    /// worker, in worker-index order.
    pub fn edge_sparse_features(
        self: &Arc<Self>,
        node_ids: Vec<NodeId>,
        types: Vec<EdgeType>,
        features: Vec<FeatureId>,
    ) -> Result<SparseFeaturesReply, RequestError> {
        let len = check_edge_arity(&node_ids, &types)?;
        let feature_count = features.len();
        let engine = Arc::clone(self);
        let node_ids = Arc::new(node_ids);
        let types = Arc::new(types);
        let features = Arc::new(features);

        let buffers = run_chunked(
            self.pool.as_ref(),
            len,
            move || SparseBuffer::new(feature_count),
            move |_, start, end, buf| {
                for position in start..end {
                    let Some(run) = engine.index.locate(node_ids[position]) else {
                        continue;
                    };
                    for (partition, internal) in run.iter() {
                        let found = engine.partitions[partition as usize].get_edge_sparse_feature(
                            internal,
                            node_ids[len + position],
                            types[position],
                            &features,
                            position as i64,
                            &mut buf.dimensions,
                            &mut buf.indices,
                            &mut buf.values,
                        );
                        if found {
                            break;
                        }
                    }
                }
            },
        );

        Ok(assemble_sparse_by_worker(feature_count, &buffers))
    }

    // =========================================================================
    // String features
    // =========================================================================

    /// Fetches string node features; the dimensions table reports one byte
    /// length per `(input, feature)` pair, zero meaning absent.
    pub fn node_string_features(
        self: &Arc<Self>,
        node_ids: Vec<NodeId>,
        features: Vec<FeatureId>,
    ) -> StringFeaturesReply {
        let items = node_ids.len();
        let feature_count = features.len();
        let engine = Arc::clone(self);
        let node_ids = Arc::new(node_ids);
        let features = Arc::new(features);

        let buffers = run_chunked(
            self.pool.as_ref(),
            items,
            || (Vec::<u8>::new(), Vec::<i64>::new()),
            move |_, start, end, buf| {
                buf.1.resize((end - start) * feature_count, 0);
                for position in start..end {
                    let Some(run) = engine.index.locate(node_ids[position]) else {
                        continue;
                    };
                    let dims_at = (position - start) * feature_count;
                    let dims = &mut buf.1[dims_at..dims_at + feature_count];
                    for (partition, internal) in run.iter() {
                        let found = engine.partitions[partition as usize].get_node_string_feature(
                            internal,
                            &features,
                            dims,
                            &mut buf.0,
                        );
                        if found {
                            break;
                        }
                    }
                }
            },
        );

        assemble_string(&buffers)
    }

    /// Fetches string edge features for endpoint pairs.
    pub fn edge_string_features(
        self: &Arc<Self>,
        node_ids: Vec<NodeId>,
        types: Vec<EdgeType>,
        features: Vec<FeatureId>,
    ) -> Result<StringFeaturesReply, RequestError> {
        let len = check_edge_arity(&node_ids, &types)?;
        let feature_count = features.len();
        let engine = Arc::clone(self);
        let node_ids = Arc::new(node_ids);
        let types = Arc::new(types);
        let features = Arc::new(features);

        let buffers = run_chunked(
            self.pool.as_ref(),
            len,
            || (Vec::<u8>::new(), Vec::<i64>::new()),
            move |_, start, end, buf| {
                buf.1.resize((end - start) * feature_count, 0);
                for position in start..end {
                    let Some(run) = engine.index.locate(node_ids[position]) else {
                        continue;
                    };
                    let dims_at = (position - start) * feature_count;
                    let dims = &mut buf.1[dims_at..dims_at + feature_count];
                    for (partition, internal) in run.iter() {
                        let found = engine.partitions[partition as usize].get_edge_string_feature(
                            internal,
                            node_ids[len + position],
                            types[position],
                            &features,
                            dims,
                            &mut buf.0,
                        );
                        if found {
                            break;
                        }
                    }
                }
            },
        );

        Ok(assemble_string(&buffers))
    }

    // =========================================================================
    // Neighbors
    // =========================================================================

    /// Counts matching neighbors per input node across all placements.
    pub fn neighbor_counts(
        &self,
        node_ids: &[NodeId],
        edge_types: &[EdgeType],
    ) -> Result<Vec<u64>, RequestError> {
        check_sorted_edge_types(edge_types)?;
        let mut counts = vec![0u64; node_ids.len()];
        for (position, &node_id) in node_ids.iter().enumerate() {
            let Some(run) = self.index.locate(node_id) else {
                continue;
            };
            for (partition, internal) in run.iter() {
                counts[position] +=
                    self.partitions[partition as usize].neighbor_count(internal, edge_types);
            }
        }
        Ok(counts)
    }

    /// Enumerates all matching neighbors; every placement contributes, in
    /// placement order.
    pub fn full_neighbors(
        &self,
        node_ids: &[NodeId],
        edge_types: &[EdgeType],
    ) -> Result<NeighborsReply, RequestError> {
        check_sorted_edge_types(edge_types)?;
        let mut reply = NeighborsReply {
            neighbor_counts: vec![0u64; node_ids.len()],
            ..NeighborsReply::default()
        };
        for (position, &node_id) in node_ids.iter().enumerate() {
            let Some(run) = self.index.locate(node_id) else {
                continue;
            };
            for (partition, internal) in run.iter() {
                let added = self.partitions[partition as usize].full_neighbor(
                    internal,
                    edge_types,
                    &mut reply.node_ids,
                    &mut reply.edge_types,
                    &mut reply.edge_weights,
                );
                reply.neighbor_counts[position] += added;
            }
        }
        Ok(reply)
    }

    // =========================================================================
    // Neighbor sampling
    // =========================================================================

    /// Weighted neighbor sampling.
    ///
    /// Seeds are consumed in a defined order: for each located node in
    /// request order, one seed value per placement, advancing by exactly one
    /// per placement call. Unfound nodes neither produce slots nor consume
    /// seeds.
    pub fn weighted_sample_neighbors(
        &self,
        request: &WeightedSampleRequest,
    ) -> Result<WeightedSampleReply, RequestError> {
        check_sorted_edge_types(&request.edge_types)?;
        let count = request.count;
        let mut reply = WeightedSampleReply::default();
        let mut seed = request.seed as u64;

        for &node_id in &request.node_ids {
            let Some(run) = self.index.locate(node_id) else {
                continue;
            };
            let slot = reply.node_ids.len();
            reply.node_ids.push(node_id);
            reply.shard_weights.push(0.0);
            let base = slot * count;
            reply
                .neighbor_ids
                .resize(base + count, request.default_node_id);
            reply
                .neighbor_types
                .resize(base + count, request.default_edge_type);
            reply
                .neighbor_weights
                .resize(base + count, request.default_node_weight);

            for (partition, internal) in run.iter() {
                self.partitions[partition as usize].sample_neighbor(
                    seed,
                    internal,
                    &request.edge_types,
                    count,
                    &mut reply.neighbor_ids[base..base + count],
                    &mut reply.neighbor_types[base..base + count],
                    &mut reply.neighbor_weights[base..base + count],
                    &mut reply.shard_weights[slot],
                );
                seed = seed.wrapping_add(1);
            }
        }
        Ok(reply)
    }

    /// Uniform neighbor sampling, with or without replacement.
    pub fn uniform_sample_neighbors(
        &self,
        request: &UniformSampleRequest,
    ) -> Result<UniformSampleReply, RequestError> {
        check_sorted_edge_types(&request.edge_types)?;
        let count = request.count;
        let mut reply = UniformSampleReply::default();
        let mut seed = request.seed as u64;

        for &node_id in &request.node_ids {
            let Some(run) = self.index.locate(node_id) else {
                continue;
            };
            let slot = reply.node_ids.len();
            reply.node_ids.push(node_id);
            reply.shard_counts.push(0);
            let base = slot * count;
            reply
                .neighbor_ids
                .resize(base + count, request.default_node_id);
            reply
                .neighbor_types
                .resize(base + count, request.default_edge_type);

            for (partition, internal) in run.iter() {
                self.partitions[partition as usize].uniform_sample_neighbor(
                    request.without_replacement,
                    seed,
                    internal,
                    &request.edge_types,
                    count,
                    &mut reply.neighbor_ids[base..base + count],
                    &mut reply.neighbor_types[base..base + count],
                    &mut reply.shard_counts[slot],
                );
                seed = seed.wrapping_add(1);
            }
        }
        Ok(reply)
    }
}

// =============================================================================
// Assembly helpers
// =============================================================================

/// Per-worker sparse accumulation buffers, one row list per feature.
struct SparseBuffer {
    indices: Vec<Vec<i64>>,
    values: Vec<Vec<u8>>,
    dimensions: Vec<i64>,
}

impl SparseBuffer {
    fn new(feature_count: usize) -> Self {
        Self {
            indices: vec![Vec::new(); feature_count],
            values: vec![Vec::new(); feature_count],
            dimensions: vec![0; feature_count],
        }
    }
}

fn check_edge_arity(node_ids: &[NodeId], types: &[EdgeType]) -> Result<usize, RequestError> {
    if node_ids.len() != 2 * types.len() {
        return Err(RequestError::EdgeArityMismatch {
            node_ids: node_ids.len(),
            types: types.len(),
        });
    }
    Ok(types.len())
}

fn merge_dimensions(feature_count: usize, buffers: &[SparseBuffer]) -> Vec<i64> {
    let mut dimensions = vec![0i64; feature_count];
    for buffer in buffers {
        for fi in 0..feature_count {
            if dimensions[fi] == 0 {
                dimensions[fi] = buffer.dimensions[fi];
            }
        }
    }
    dimensions
}

fn assemble_sparse_by_feature(feature_count: usize, buffers: &[SparseBuffer]) -> SparseFeaturesReply {
    let mut reply = SparseFeaturesReply {
        dimensions: merge_dimensions(feature_count, buffers),
        ..SparseFeaturesReply::default()
    };
    for fi in 0..feature_count {
        let mut indices_sum = 0i64;
        let mut values_sum = 0i64;
        for buffer in buffers {
            reply.indices.extend_from_slice(&buffer.indices[fi]);
            reply.values.extend_from_slice(&buffer.values[fi]);
            indices_sum += buffer.indices[fi].len() as i64;
            values_sum += buffer.values[fi].len() as i64;
        }
        reply.indices_counts.push(indices_sum);
        reply.values_counts.push(values_sum);
    }
    reply
}

fn assemble_sparse_by_worker(feature_count: usize, buffers: &[SparseBuffer]) -> SparseFeaturesReply {
    let mut reply = SparseFeaturesReply {
        dimensions: merge_dimensions(feature_count, buffers),
        ..SparseFeaturesReply::default()
    };
    for buffer in buffers {
        for fi in 0..feature_count {
            reply.indices.extend_from_slice(&buffer.indices[fi]);
            reply.values.extend_from_slice(&buffer.values[fi]);
            reply.indices_counts.push(buffer.indices[fi].len() as i64);
            reply.values_counts.push(buffer.values[fi].len() as i64);
        }
    }
    reply
}

fn assemble_string(buffers: &[(Vec<u8>, Vec<i64>)]) -> StringFeaturesReply {
    let mut reply = StringFeaturesReply::default();
    for (values, dimensions) in buffers {
        reply.values.extend_from_slice(values);
        reply.dimensions.extend_from_slice(dimensions);
    }
    reply
}

// =============================================================================
// Partition discovery
// =============================================================================

/// Lists the data directory for `neighbors_<suffix>.*` files whose numeric
/// tail is in the configured partition set; suffixes come back sorted
/// lexicographically and deduplicated.
fn discover_suffixes(dir: &Path, partitions: &[u32]) -> Result<Vec<String>, StorageError> {
    let partition_set: BTreeSet<u32> = partitions.iter().copied().collect();
    let entries = std::fs::read_dir(dir).map_err(|source| StorageError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut suffixes = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| StorageError::ListDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(suffix) = stem.strip_prefix(NEIGHBORS_PREFIX) else {
            continue;
        };
        let digits: String = suffix.chars().take_while(|c| c.is_ascii_digit()).collect();
        let Ok(number) = digits.parse::<u32>() else {
            continue;
        };
        if partition_set.contains(&number) {
            suffixes.insert(suffix.to_string());
        }
    }

    if suffixes.is_empty() {
        return Err(StorageError::NoPartitions {
            path: dir.to_path_buf(),
        });
    }
    Ok(suffixes.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PartitionFixture;
    use tempfile::TempDir;

    fn engine_with(partitions: &[u32], enable_threadpool: bool, dir: &TempDir) -> Arc<GraphEngine> {
        Metadata::default().write(dir.path()).unwrap();
        Arc::new(
            GraphEngine::open(EngineOptions {
                data_dir: dir.path().to_path_buf(),
                partitions: partitions.to_vec(),
                storage: StorageMode::Mmap,
                enable_threadpool,
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_discovery_sorts_and_filters_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        for suffix in ["2", "0", "10"] {
            PartitionFixture::new(suffix)
                .node(suffix.parse::<i64>().unwrap(), 0)
                .write(dir.path())
                .unwrap();
        }
        // Partition 2 is not in the configured set.
        let engine = engine_with(&[0, 10], false, &dir);
        let suffixes: Vec<&str> = engine.partitions().iter().map(|p| p.suffix()).collect();
        // Lexicographic: "0" < "10".
        assert_eq!(suffixes, vec!["0", "10"]);
    }

    #[test]
    fn test_open_without_partitions_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        Metadata::default().write(dir.path()).unwrap();
        let err = GraphEngine::open(EngineOptions {
            data_dir: dir.path().to_path_buf(),
            partitions: vec![0],
            storage: StorageMode::Mmap,
            enable_threadpool: false,
        })
        .unwrap_err();
        assert!(matches!(err, StorageError::NoPartitions { .. }));
    }

    #[test]
    fn test_edge_arity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        PartitionFixture::new("0").node(1, 0).write(dir.path()).unwrap();
        let engine = engine_with(&[0], false, &dir);
        let err = engine
            .edge_features(vec![1, 2, 3], vec![0], vec![FeatureMeta::new(0, 4)])
            .unwrap_err();
        assert!(matches!(err, RequestError::EdgeArityMismatch { .. }));
    }

    #[test]
    fn test_unsorted_edge_types_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        PartitionFixture::new("0").node(1, 0).write(dir.path()).unwrap();
        let engine = engine_with(&[0], false, &dir);
        assert!(matches!(
            engine.neighbor_counts(&[1], &[3, 1]),
            Err(RequestError::UnsortedEdgeTypes)
        ));
    }

    #[test]
    fn test_node_types_first_non_default_wins() {
        let dir = tempfile::tempdir().unwrap();
        // Partition 0 knows node 5 without a type; partition 1 types it.
        PartitionFixture::new("0").node(5, -1).write(dir.path()).unwrap();
        PartitionFixture::new("1").node(5, 3).node(6, 2).write(dir.path()).unwrap();
        let engine = engine_with(&[0, 1], false, &dir);

        let reply = engine.node_types(&[5, 99, 6]);
        assert_eq!(reply.offsets, vec![0, 2]);
        assert_eq!(reply.types, vec![3, 2]);
    }
}
