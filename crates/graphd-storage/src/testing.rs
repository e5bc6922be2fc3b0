//! Test-support builders for partition files.
//!
//! Production partition files come from the offline conversion pipeline;
//! tests build small partitions in the same binary format through
//! [`PartitionFixture`]. The builder mirrors the write side of the layout
//! documented in [`crate::partition`]: edges are sorted by edge type within
//! each node's run, and feature slots are laid out densely from feature id
//! zero.

use graphd_core::{EdgeType, FeatureId, NodeId, NodeType};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Builder for one partition's file bundle.
#[derive(Debug, Default)]
pub struct PartitionFixture {
    suffix: String,
    nodes: Vec<NodeFixture>,
}

#[derive(Debug, Default)]
struct NodeFixture {
    external_id: NodeId,
    node_type: NodeType,
    features: BTreeMap<FeatureId, Vec<u8>>,
    edges: Vec<EdgeFixture>,
}

#[derive(Debug, Default)]
struct EdgeFixture {
    dst: NodeId,
    edge_type: EdgeType,
    weight: f32,
    features: BTreeMap<FeatureId, Vec<u8>>,
}

/// Encodes a sparse feature blob:
/// `<u32 dimensions, u32 index_count, i64 indices[], values...>`.
pub fn encode_sparse(dimensions: u32, indices: &[i64], values: &[u8]) -> Vec<u8> {
    assert!(dimensions > 0, "sparse features need a coordinate width");
    assert_eq!(indices.len() % dimensions as usize, 0);
    let mut blob = Vec::with_capacity(8 + indices.len() * 8 + values.len());
    blob.extend_from_slice(&dimensions.to_le_bytes());
    blob.extend_from_slice(&(indices.len() as u32).to_le_bytes());
    for index in indices {
        blob.extend_from_slice(&index.to_le_bytes());
    }
    blob.extend_from_slice(values);
    blob
}

impl PartitionFixture {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            nodes: Vec::new(),
        }
    }

    /// Starts a new node; subsequent feature and edge calls attach to it.
    pub fn node(mut self, external_id: NodeId, node_type: NodeType) -> Self {
        self.nodes.push(NodeFixture {
            external_id,
            node_type,
            ..NodeFixture::default()
        });
        self
    }

    /// Attaches a raw feature blob to the current node.
    pub fn dense(mut self, feature_id: FeatureId, bytes: &[u8]) -> Self {
        self.current_node().features.insert(feature_id, bytes.to_vec());
        self
    }

    /// Attaches an encoded sparse feature to the current node.
    pub fn sparse(self, feature_id: FeatureId, dimensions: u32, indices: &[i64], values: &[u8]) -> Self {
        let blob = encode_sparse(dimensions, indices, values);
        self.dense(feature_id, &blob)
    }

    /// Attaches a string feature to the current node.
    pub fn string(self, feature_id: FeatureId, text: &str) -> Self {
        self.dense(feature_id, text.as_bytes())
    }

    /// Adds an outgoing edge to the current node.
    pub fn edge(mut self, dst: NodeId, edge_type: EdgeType, weight: f32) -> Self {
        self.current_node().edges.push(EdgeFixture {
            dst,
            edge_type,
            weight,
            ..EdgeFixture::default()
        });
        self
    }

    /// Attaches a raw feature blob to the current edge.
    pub fn edge_dense(mut self, feature_id: FeatureId, bytes: &[u8]) -> Self {
        self.current_edge().features.insert(feature_id, bytes.to_vec());
        self
    }

    /// Attaches an encoded sparse feature to the current edge.
    pub fn edge_sparse(
        self,
        feature_id: FeatureId,
        dimensions: u32,
        indices: &[i64],
        values: &[u8],
    ) -> Self {
        let blob = encode_sparse(dimensions, indices, values);
        self.edge_dense(feature_id, &blob)
    }

    /// Attaches a string feature to the current edge.
    pub fn edge_string(self, feature_id: FeatureId, text: &str) -> Self {
        self.edge_dense(feature_id, text.as_bytes())
    }

    fn current_node(&mut self) -> &mut NodeFixture {
        self.nodes.last_mut().expect("call node() first")
    }

    fn current_edge(&mut self) -> &mut EdgeFixture {
        self.current_node()
            .edges
            .last_mut()
            .expect("call edge() first")
    }

    /// Writes the partition file bundle under `dir`.
    pub fn write(&self, dir: &Path) -> std::io::Result<()> {
        let suffix = &self.suffix;

        // Edge records are sorted by type within each node's run; feature
        // payloads address edges by their position after sorting.
        let sorted: Vec<NodeView<'_>> = self
            .nodes
            .iter()
            .map(|node| {
                let mut edges: Vec<&EdgeFixture> = node.edges.iter().collect();
                edges.sort_by_key(|e| e.edge_type);
                NodeView { node, edges }
            })
            .collect();

        self.write_node_map(dir, &sorted)?;
        self.write_neighbors(dir, &sorted)?;

        let node_blobs: Vec<&BTreeMap<FeatureId, Vec<u8>>> =
            sorted.iter().map(|v| &v.node.features).collect();
        write_feature_table(dir, "node_features", suffix, &node_blobs)?;

        let edge_blobs: Vec<&BTreeMap<FeatureId, Vec<u8>>> = sorted
            .iter()
            .flat_map(|v| v.edges.iter().map(|e| &e.features))
            .collect();
        write_feature_table(dir, "edge_features", suffix, &edge_blobs)?;
        Ok(())
    }

    fn write_node_map(&self, dir: &Path, sorted: &[NodeView<'_>]) -> std::io::Result<()> {
        let mut out = Vec::new();
        for (internal, view) in sorted.iter().enumerate() {
            out.extend_from_slice(&(view.node.external_id as u64).to_le_bytes());
            out.extend_from_slice(&(internal as u64).to_le_bytes());
            out.extend_from_slice(&view.node.node_type.to_le_bytes());
        }
        write_file(dir, &format!("node_{}.map", self.suffix), &out)
    }

    fn write_neighbors(&self, dir: &Path, sorted: &[NodeView<'_>]) -> std::io::Result<()> {
        let mut index = Vec::new();
        let mut data = Vec::new();
        let mut offset = 0u64;
        index.extend_from_slice(&offset.to_le_bytes());
        for view in sorted {
            for edge in &view.edges {
                data.extend_from_slice(&edge.dst.to_le_bytes());
                data.extend_from_slice(&edge.edge_type.to_le_bytes());
                data.extend_from_slice(&edge.weight.to_le_bytes());
            }
            offset += view.edges.len() as u64;
            index.extend_from_slice(&offset.to_le_bytes());
        }
        write_file(dir, &format!("neighbors_{}.index", self.suffix), &index)?;
        write_file(dir, &format!("neighbors_{}.data", self.suffix), &data)
    }
}

struct NodeView<'a> {
    node: &'a NodeFixture,
    edges: Vec<&'a EdgeFixture>,
}

/// Writes a `<prefix>_<suffix>.{map,index,data}` triple, or nothing when no
/// entity carries features of this kind.
fn write_feature_table(
    dir: &Path,
    prefix: &str,
    suffix: &str,
    blobs: &[&BTreeMap<FeatureId, Vec<u8>>],
) -> std::io::Result<()> {
    if blobs.iter().all(|b| b.is_empty()) {
        return Ok(());
    }

    let mut map = Vec::new();
    let mut index = Vec::new();
    let mut data = Vec::new();
    let mut slots = 0u64;
    let mut bytes = 0u64;

    map.extend_from_slice(&slots.to_le_bytes());
    index.extend_from_slice(&bytes.to_le_bytes());
    for features in blobs {
        let slot_count = features
            .keys()
            .next_back()
            .map(|&max_id| max_id as u64 + 1)
            .unwrap_or(0);
        for feature_id in 0..slot_count {
            if let Some(blob) = features.get(&(feature_id as FeatureId)) {
                data.extend_from_slice(blob);
                bytes += blob.len() as u64;
            }
            index.extend_from_slice(&bytes.to_le_bytes());
        }
        slots += slot_count;
        map.extend_from_slice(&slots.to_le_bytes());
    }

    write_file(dir, &format!("{prefix}_{suffix}.map"), &map)?;
    write_file(dir, &format!("{prefix}_{suffix}.index"), &index)?;
    write_file(dir, &format!("{prefix}_{suffix}.data"), &data)
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(dir.join(name))?;
    file.write_all(bytes)
}
