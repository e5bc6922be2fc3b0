//! Graph metadata manifest.
//!
//! The conversion pipeline leaves a `meta.json` manifest at the data root
//! describing the whole graph: global counts, feature counts and the
//! per-partition weight vectors a federated client needs to merge samples
//! drawn from independent shards. The manifest is loaded once at startup and
//! never mutated.

use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Manifest file name at the data root.
pub const MANIFEST_FILE: &str = "meta.json";

/// Graph-wide metadata shared by every partition of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    /// Binary format version stamped by the conversion pipeline.
    pub version: u32,
    /// Total node count across all partitions of the dataset.
    pub node_count: u64,
    /// Total edge count across all partitions of the dataset.
    pub edge_count: u64,
    pub node_type_count: usize,
    pub edge_type_count: usize,
    pub node_feature_count: usize,
    pub edge_feature_count: usize,
    /// Number of partitions the dataset was split into.
    pub partition_count: usize,
    /// Per-partition, per-node-type sampling weight: `[partition][type]`.
    pub node_partition_weights: Vec<Vec<f32>>,
    /// Per-partition, per-edge-type sampling weight: `[partition][type]`.
    pub edge_partition_weights: Vec<Vec<f32>>,
    pub node_count_per_type: Vec<u64>,
    pub edge_count_per_type: Vec<u64>,
}

impl Metadata {
    /// Loads the manifest from `<dir>/meta.json`.
    ///
    /// A missing or malformed manifest is startup-fatal.
    pub fn load(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).map_err(|source| StorageError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StorageError::Manifest { path, source })
    }

    /// Writes the manifest to `<dir>/meta.json`.
    ///
    /// Only the conversion pipeline and test fixtures write manifests; the
    /// server never does.
    pub fn write(&self, dir: &Path) -> Result<(), StorageError> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| StorageError::Manifest {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, bytes).map_err(|source| StorageError::Read { path, source })
    }
}
