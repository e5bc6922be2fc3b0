//! Single-partition store over the binary partition files.
//!
//! A partition is an immutable bundle of files sharing a suffix, written by
//! the offline conversion pipeline:
//!
//! ```text
//! node_<s>.map             20-byte records <u64 external, u64 internal, i32 type>
//! neighbors_<s>.index      (node_count + 1) u64 record offsets
//! neighbors_<s>.data       16-byte records <i64 dst, i32 edge_type, f32 weight>,
//!                          sorted by edge_type within each node's run
//! node_features_<s>.map    (node_count + 1) u64 feature-slot offsets
//! node_features_<s>.index  (total_slots + 1) u64 byte offsets into .data
//! node_features_<s>.data   raw feature bytes
//! edge_features_<s>.*      same three-level scheme keyed by edge index
//! ```
//!
//! The position of a record in `neighbors_<s>.data` is the partition-global
//! edge index used to address edge features. Feature slot `j` of entity `i`
//! holds feature id `j - slot_start(i)`; an empty byte range means the
//! feature is absent.
//!
//! All operations take the partition-internal node index assigned by the
//! node map; translating public ids to internal indices is the job of the
//! node-location index, one level up.

use crate::node_map::NodeMapRecord;
use crate::storage::{f32_at, i32_at, i64_at, u32_at, u64_at, Blob, StorageError, StorageMode};
use graphd_core::{EdgeType, FeatureId, FeatureMeta, NodeId, NodeType, DEFAULT_NODE_TYPE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Byte size of one adjacency record.
pub const NEIGHBOR_RECORD_SIZE: usize = 16;

/// One adjacency entry: destination, edge type and edge weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborRecord {
    pub dst: NodeId,
    pub edge_type: EdgeType,
    pub weight: f32,
}

// =============================================================================
// Feature tables
// =============================================================================

/// Three-level feature lookup: entity -> feature slots -> byte ranges.
#[derive(Debug)]
struct FeatureTable {
    map: Blob,
    index: Blob,
    data: Blob,
}

impl FeatureTable {
    /// Opens the `<prefix>_<suffix>.{map,index,data}` triple.
    ///
    /// Returns `Ok(None)` when all three files are absent (a partition may
    /// carry no features of this kind); a partially present triple is
    /// startup-fatal.
    fn open(
        dir: &Path,
        prefix: &str,
        suffix: &str,
        mode: StorageMode,
        entities: usize,
    ) -> Result<Option<Self>, StorageError> {
        let map_path = dir.join(format!("{prefix}_{suffix}.map"));
        let index_path = dir.join(format!("{prefix}_{suffix}.index"));
        let data_path = dir.join(format!("{prefix}_{suffix}.data"));

        let present = [&map_path, &index_path, &data_path].map(|p| p.exists());
        if present.iter().all(|&p| !p) {
            return Ok(None);
        }
        if let Some(missing) = [&map_path, &index_path, &data_path]
            .iter()
            .zip(present)
            .find_map(|(path, exists)| (!exists).then(|| (*path).clone()))
        {
            return Err(StorageError::MissingCompanion {
                suffix: suffix.to_string(),
                path: missing,
            });
        }

        let map = Blob::open_sized(&map_path, mode, ((entities + 1) * 8) as u64)?;
        let total_slots = u64_at(&map, entities) as usize;
        let index = Blob::open_sized(&index_path, mode, ((total_slots + 1) * 8) as u64)?;
        let data = Blob::open(&data_path, mode)?;
        Ok(Some(Self { map, index, data }))
    }

    #[inline]
    fn slot_range(&self, entity: usize) -> (usize, usize) {
        (
            u64_at(&self.map, entity) as usize,
            u64_at(&self.map, entity + 1) as usize,
        )
    }

    fn has_any(&self, entity: usize) -> bool {
        let (start, end) = self.slot_range(entity);
        start < end
    }

    /// Stored bytes of `feature_id` on `entity`, if present and non-empty.
    fn feature(&self, entity: usize, feature_id: FeatureId) -> Option<&[u8]> {
        if feature_id < 0 {
            return None;
        }
        let (start, end) = self.slot_range(entity);
        let slot = start + feature_id as usize;
        if slot >= end {
            return None;
        }
        let from = u64_at(&self.index, slot) as usize;
        let to = u64_at(&self.index, slot + 1) as usize;
        (from < to).then(|| &self.data[from..to])
    }
}

/// Decoded sparse feature blob:
/// `<u32 dimensions, u32 index_count, i64 indices[index_count], values...>`.
struct SparseBlob<'a> {
    dimensions: u32,
    index_bytes: &'a [u8],
    values: &'a [u8],
}

impl<'a> SparseBlob<'a> {
    fn parse(blob: &'a [u8]) -> Option<Self> {
        if blob.len() < 8 {
            return None;
        }
        let dimensions = u32_at(blob, 0);
        let index_count = u32_at(blob, 4) as usize;
        let indices_end = 8 + index_count * 8;
        if dimensions == 0 || blob.len() < indices_end {
            return None;
        }
        Some(Self {
            dimensions,
            index_bytes: &blob[8..indices_end],
            values: &blob[indices_end..],
        })
    }

    fn index_count(&self) -> usize {
        self.index_bytes.len() / 8
    }

    fn index(&self, i: usize) -> i64 {
        i64_at(self.index_bytes, i * 8)
    }
}

// =============================================================================
// Partition
// =============================================================================

/// Read-only store for one partition of the graph.
#[derive(Debug)]
pub struct Partition {
    suffix: String,
    node_types: Vec<NodeType>,
    external_ids: Vec<NodeId>,
    neighbor_index: Blob,
    neighbor_data: Blob,
    node_features: Option<FeatureTable>,
    edge_features: Option<FeatureTable>,
}

impl Partition {
    /// Loads the partition files for `suffix` under `dir`.
    ///
    /// `records` are the already-parsed node map records of this partition;
    /// the partition retains the per-internal-index type and external id
    /// columns and validates the companion files against the node count.
    pub fn load(
        dir: &Path,
        suffix: &str,
        mode: StorageMode,
        records: &[NodeMapRecord],
    ) -> Result<Self, StorageError> {
        let node_count = records.len();
        let node_types = records.iter().map(|r| r.node_type).collect();
        let external_ids = records.iter().map(|r| r.external_id).collect();

        let index_path = dir.join(format!("neighbors_{suffix}.index"));
        let data_path = dir.join(format!("neighbors_{suffix}.data"));
        for path in [&index_path, &data_path] {
            if !path.exists() {
                return Err(StorageError::MissingCompanion {
                    suffix: suffix.to_string(),
                    path: path.clone(),
                });
            }
        }

        let neighbor_index = Blob::open_sized(&index_path, mode, ((node_count + 1) * 8) as u64)?;
        let neighbor_data = Blob::open_records(&data_path, mode, NEIGHBOR_RECORD_SIZE as u64)?;
        let edge_count = neighbor_data.len() / NEIGHBOR_RECORD_SIZE;
        let declared = u64_at(&neighbor_index, node_count) as usize;
        if declared != edge_count {
            return Err(StorageError::UnexpectedSize {
                path: data_path,
                expected: (declared * NEIGHBOR_RECORD_SIZE) as u64,
                found: neighbor_data.len() as u64,
            });
        }

        let node_features = FeatureTable::open(dir, "node_features", suffix, mode, node_count)?;
        let edge_features = FeatureTable::open(dir, "edge_features", suffix, mode, edge_count)?;

        Ok(Self {
            suffix: suffix.to_string(),
            node_types,
            external_ids,
            neighbor_index,
            neighbor_data,
            node_features,
            edge_features,
        })
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn node_count(&self) -> usize {
        self.node_types.len()
    }

    pub fn edge_count(&self) -> usize {
        self.neighbor_data.len() / NEIGHBOR_RECORD_SIZE
    }

    /// Per-internal-index node types, as stated by the node map.
    pub fn node_types(&self) -> &[NodeType] {
        &self.node_types
    }

    /// Per-internal-index public node ids, as stated by the node map.
    pub fn external_ids(&self) -> &[NodeId] {
        &self.external_ids
    }

    // =========================================================================
    // Adjacency
    // =========================================================================

    #[inline]
    fn neighbor_range(&self, internal: u64) -> (usize, usize) {
        let i = internal as usize;
        (
            u64_at(&self.neighbor_index, i) as usize,
            u64_at(&self.neighbor_index, i + 1) as usize,
        )
    }

    #[inline]
    fn neighbor_record(&self, pos: usize) -> NeighborRecord {
        let base = pos * NEIGHBOR_RECORD_SIZE;
        NeighborRecord {
            dst: i64_at(&self.neighbor_data, base),
            edge_type: i32_at(&self.neighbor_data, base + 8),
            weight: f32_at(&self.neighbor_data, base + 12),
        }
    }

    /// Visits every adjacency record of `internal` whose edge type is in the
    /// sorted `edge_types` filter, passing the partition-global edge index.
    fn for_each_matching(
        &self,
        internal: u64,
        edge_types: &[EdgeType],
        mut visit: impl FnMut(usize, NeighborRecord),
    ) {
        debug_assert!(edge_types.windows(2).all(|w| w[0] <= w[1]));
        let (start, end) = self.neighbor_range(internal);
        for pos in start..end {
            let record = self.neighbor_record(pos);
            if edge_types.binary_search(&record.edge_type).is_ok() {
                visit(pos, record);
            }
        }
    }

    /// Visits every edge of the partition as (source internal index, record).
    pub(crate) fn for_each_edge(&self, mut visit: impl FnMut(usize, NeighborRecord)) {
        for internal in 0..self.node_count() {
            let (start, end) = self.neighbor_range(internal as u64);
            for pos in start..end {
                visit(internal, self.neighbor_record(pos));
            }
        }
    }

    fn find_edge(&self, internal: u64, dst: NodeId, edge_type: EdgeType) -> Option<usize> {
        let (start, end) = self.neighbor_range(internal);
        (start..end).find(|&pos| {
            let record = self.neighbor_record(pos);
            record.dst == dst && record.edge_type == edge_type
        })
    }

    // =========================================================================
    // Node types and dense features
    // =========================================================================

    /// Stored node type, or [`DEFAULT_NODE_TYPE`] when the index is not
    /// hosted by this partition.
    pub fn get_node_type(&self, internal: u64) -> NodeType {
        self.node_types
            .get(internal as usize)
            .copied()
            .unwrap_or(DEFAULT_NODE_TYPE)
    }

    /// Whether this partition stores any features for the node.
    pub fn has_node_features(&self, internal: u64) -> bool {
        self.node_features
            .as_ref()
            .is_some_and(|t| t.has_any(internal as usize))
    }

    /// Copies the requested dense features of `internal` into `out` as a
    /// contiguous concatenation. Short stored values are zero-padded, long
    /// ones truncated; absent features read as zeros.
    ///
    /// `out` must be exactly `feature_vector_size(features)` bytes.
    pub fn get_node_feature(&self, internal: u64, features: &[FeatureMeta], out: &mut [u8]) {
        write_dense(self.node_features.as_ref(), internal as usize, features, out);
    }

    /// Writes the dense features of the `(internal -> dst, edge_type)` edge.
    ///
    /// Returns `true` iff the edge exists in this partition; the feature
    /// bytes follow the same padding rules as node features.
    pub fn get_edge_feature(
        &self,
        internal: u64,
        dst: NodeId,
        edge_type: EdgeType,
        features: &[FeatureMeta],
        out: &mut [u8],
    ) -> bool {
        match self.find_edge(internal, dst, edge_type) {
            Some(pos) => {
                write_dense(self.edge_features.as_ref(), pos, features, out);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Sparse and string features
    // =========================================================================

    /// Appends one coordinate row per stored nonzero of each requested
    /// sparse feature, prefixing `row_index` to form global coordinates.
    ///
    /// Returns `true` iff this partition stores any features for the node;
    /// the caller stops at the first placement that does.
    pub fn get_node_sparse_feature(
        &self,
        internal: u64,
        features: &[FeatureId],
        row_index: i64,
        dimensions: &mut [i64],
        indices: &mut [Vec<i64>],
        values: &mut [Vec<u8>],
    ) -> bool {
        if !self.has_node_features(internal) {
            return false;
        }
        if let Some(table) = &self.node_features {
            append_sparse(table, internal as usize, features, row_index, dimensions, indices, values);
        }
        true
    }

    /// Sparse variant for edges; `true` iff the edge exists here.
    #[allow(clippy::too_many_arguments)]
    pub fn get_edge_sparse_feature(
        &self,
        internal: u64,
        dst: NodeId,
        edge_type: EdgeType,
        features: &[FeatureId],
        row_index: i64,
        dimensions: &mut [i64],
        indices: &mut [Vec<i64>],
        values: &mut [Vec<u8>],
    ) -> bool {
        let Some(pos) = self.find_edge(internal, dst, edge_type) else {
            return false;
        };
        if let Some(table) = &self.edge_features {
            append_sparse(table, pos, features, row_index, dimensions, indices, values);
        }
        true
    }

    /// Appends the raw bytes of each requested string feature and records
    /// per-feature byte lengths into `dimensions`.
    ///
    /// Returns `true` iff this partition stores any features for the node.
    pub fn get_node_string_feature(
        &self,
        internal: u64,
        features: &[FeatureId],
        dimensions: &mut [i64],
        values: &mut Vec<u8>,
    ) -> bool {
        if !self.has_node_features(internal) {
            return false;
        }
        if let Some(table) = &self.node_features {
            append_string(table, internal as usize, features, dimensions, values);
        }
        true
    }

    /// String variant for edges; `true` iff the edge exists here.
    pub fn get_edge_string_feature(
        &self,
        internal: u64,
        dst: NodeId,
        edge_type: EdgeType,
        features: &[FeatureId],
        dimensions: &mut [i64],
        values: &mut Vec<u8>,
    ) -> bool {
        let Some(pos) = self.find_edge(internal, dst, edge_type) else {
            return false;
        };
        if let Some(table) = &self.edge_features {
            append_string(table, pos, features, dimensions, values);
        }
        true
    }

    // =========================================================================
    // Neighbors
    // =========================================================================

    /// Number of neighbors reachable via any of the sorted `edge_types`.
    pub fn neighbor_count(&self, internal: u64, edge_types: &[EdgeType]) -> u64 {
        let mut count = 0;
        self.for_each_matching(internal, edge_types, |_, _| count += 1);
        count
    }

    /// Appends every matching neighbor and returns how many were added.
    pub fn full_neighbor(
        &self,
        internal: u64,
        edge_types: &[EdgeType],
        out_ids: &mut Vec<NodeId>,
        out_types: &mut Vec<EdgeType>,
        out_weights: &mut Vec<f32>,
    ) -> u64 {
        let mut count = 0;
        self.for_each_matching(internal, edge_types, |_, record| {
            out_ids.push(record.dst);
            out_types.push(record.edge_type);
            out_weights.push(record.weight);
            count += 1;
        });
        count
    }

    // =========================================================================
    // Neighbor sampling
    // =========================================================================

    /// Draws `count` neighbors with replacement, proportionally to edge
    /// weight among this partition's matching neighbors, overwriting the
    /// caller's slots in place. Adds the matching-weight total to
    /// `shard_weight` whether or not any sample was drawn.
    ///
    /// The caller advances `seed` by exactly one per placement call.
    #[allow(clippy::too_many_arguments)]
    pub fn sample_neighbor(
        &self,
        seed: u64,
        internal: u64,
        edge_types: &[EdgeType],
        count: usize,
        out_ids: &mut [NodeId],
        out_types: &mut [EdgeType],
        out_weights: &mut [f32],
        shard_weight: &mut f32,
    ) {
        let mut matching = Vec::new();
        let mut cumulative = Vec::new();
        let mut total = 0.0f32;
        self.for_each_matching(internal, edge_types, |_, record| {
            total += record.weight;
            matching.push(record);
            cumulative.push(total);
        });

        *shard_weight += total;
        if matching.is_empty() || total <= 0.0 {
            return;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        for slot in 0..count {
            let r: f32 = rng.gen_range(0.0..total);
            let pick = cumulative.partition_point(|&c| c <= r).min(matching.len() - 1);
            let record = matching[pick];
            out_ids[slot] = record.dst;
            out_types[slot] = record.edge_type;
            out_weights[slot] = record.weight;
        }
    }

    /// Uniform neighbor sampling.
    ///
    /// With replacement: `count` uniform draws over this partition's
    /// matching neighbors, overwriting all slots. Without replacement: the
    /// reservoir started by earlier placements is continued, using the
    /// accumulated `shard_count` as the running item index, so that across
    /// placements every matching neighbor is retained with equal
    /// probability and no neighbor occupies two slots.
    #[allow(clippy::too_many_arguments)]
    pub fn uniform_sample_neighbor(
        &self,
        without_replacement: bool,
        seed: u64,
        internal: u64,
        edge_types: &[EdgeType],
        count: usize,
        out_ids: &mut [NodeId],
        out_types: &mut [EdgeType],
        shard_count: &mut u64,
    ) {
        let mut matching = Vec::new();
        self.for_each_matching(internal, edge_types, |_, record| matching.push(record));

        if without_replacement {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut running = *shard_count;
            for record in &matching {
                let slot = if (running as usize) < count {
                    Some(running as usize)
                } else {
                    let r = rng.gen_range(0..=running);
                    ((r as usize) < count).then_some(r as usize)
                };
                if let Some(slot) = slot {
                    out_ids[slot] = record.dst;
                    out_types[slot] = record.edge_type;
                }
                running += 1;
            }
            *shard_count = running;
        } else {
            *shard_count += matching.len() as u64;
            if matching.is_empty() {
                return;
            }
            let mut rng = StdRng::seed_from_u64(seed);
            for slot in 0..count {
                let record = matching[rng.gen_range(0..matching.len())];
                out_ids[slot] = record.dst;
                out_types[slot] = record.edge_type;
            }
        }
    }
}

// =============================================================================
// Shared feature writers
// =============================================================================

fn write_dense(table: Option<&FeatureTable>, entity: usize, features: &[FeatureMeta], out: &mut [u8]) {
    let mut offset = 0;
    for meta in features {
        let size = meta.size as usize;
        let dst = &mut out[offset..offset + size];
        match table.and_then(|t| t.feature(entity, meta.id)) {
            Some(blob) => {
                let n = blob.len().min(size);
                dst[..n].copy_from_slice(&blob[..n]);
                dst[n..].fill(0);
            }
            None => dst.fill(0),
        }
        offset += size;
    }
}

fn append_sparse(
    table: &FeatureTable,
    entity: usize,
    features: &[FeatureId],
    row_index: i64,
    dimensions: &mut [i64],
    indices: &mut [Vec<i64>],
    values: &mut [Vec<u8>],
) {
    for (fi, &feature_id) in features.iter().enumerate() {
        let Some(blob) = table.feature(entity, feature_id) else {
            continue;
        };
        let Some(sparse) = SparseBlob::parse(blob) else {
            continue;
        };
        if dimensions[fi] == 0 {
            dimensions[fi] = sparse.dimensions as i64;
        }
        let width = sparse.dimensions as usize;
        let rows = sparse.index_count() / width;
        for row in 0..rows {
            indices[fi].push(row_index);
            for d in 0..width {
                indices[fi].push(sparse.index(row * width + d));
            }
        }
        values[fi].extend_from_slice(sparse.values);
    }
}

fn append_string(
    table: &FeatureTable,
    entity: usize,
    features: &[FeatureId],
    dimensions: &mut [i64],
    values: &mut Vec<u8>,
) {
    for (fi, &feature_id) in features.iter().enumerate() {
        let blob = table.feature(entity, feature_id).unwrap_or(&[]);
        dimensions[fi] = blob.len() as i64;
        values.extend_from_slice(blob);
    }
}
