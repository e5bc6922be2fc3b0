//! # graphd Core
//!
//! Shared identifier types and feature metadata for the graphd engine.
//!
//! The graph served by graphd is produced by an offline conversion pipeline
//! and queried read-only; these types describe its public surface:
//! - [`NodeId`] - public 64-bit node identifier
//! - [`NodeType`] / [`EdgeType`] - 32-bit type identifiers (disjoint spaces)
//! - [`FeatureId`] / [`FeatureMeta`] - dense feature column descriptors
//! - [`SamplerCategory`] - global sampler flavors

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Identifiers
// =============================================================================

/// Public identifier of a graph node.
///
/// Node ids are assigned by the conversion pipeline and are stable across
/// partitions; a single id may be hosted by several partitions at once.
pub type NodeId = i64;

/// Type of a node. Node and edge type spaces are disjoint.
pub type NodeType = i32;

/// Type of an edge. Node and edge type spaces are disjoint.
pub type EdgeType = i32;

/// Identifier of a feature column attached to nodes or edges.
pub type FeatureId = i32;

/// Local index of a partition on this server, assigned after sorting the
/// discovered partition suffixes.
pub type PartitionIndex = u32;

/// Sentinel type marking "no type / node not present in this partition".
pub const DEFAULT_NODE_TYPE: NodeType = -1;

// =============================================================================
// Feature metadata
// =============================================================================

/// Descriptor of one dense feature column to fetch: the feature id and the
/// number of bytes the caller expects for it.
///
/// Stored values shorter than `size` are zero-padded on read; longer values
/// are truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMeta {
    /// Feature column identifier.
    pub id: FeatureId,
    /// Requested byte size of the column.
    pub size: u32,
}

impl FeatureMeta {
    /// Creates a new feature descriptor.
    #[inline]
    pub const fn new(id: FeatureId, size: u32) -> Self {
        Self { id, size }
    }
}

impl fmt::Display for FeatureMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}:{}B", self.id, self.size)
    }
}

/// Total reply bytes per found element for a set of dense feature columns.
pub fn feature_vector_size(features: &[FeatureMeta]) -> usize {
    features.iter().map(|f| f.size as usize).sum()
}

// =============================================================================
// Sampler categories
// =============================================================================

/// Flavor of a global node/edge sampler object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplerCategory {
    /// Draws proportionally to entity weight, with replacement.
    Weighted,
    /// Uniform draws with replacement.
    UniformWithReplacement,
    /// Uniform draws without replacement within one call.
    UniformWithoutReplacement,
}

impl fmt::Display for SamplerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SamplerCategory::Weighted => "weighted",
            SamplerCategory::UniformWithReplacement => "uniform",
            SamplerCategory::UniformWithoutReplacement => "uniform_without_replacement",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Request validation errors
// =============================================================================

/// Structural violations in an incoming request.
///
/// Per-element absences (unknown node, missing edge or feature) are not
/// errors; they are conveyed through offsets columns and sentinel defaults.
/// Only malformed request shapes surface as failures.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Edge requests must carry `node_ids = [src..., dst...]`.
    #[error("edge request node_ids length {node_ids} must equal 2 x types length {types}")]
    EdgeArityMismatch { node_ids: usize, types: usize },

    /// Neighbor and sampling requests require sorted edge type filters.
    #[error("edge_types filter must be sorted ascending")]
    UnsortedEdgeTypes,

    /// Sampler operations on an id that was never created or already dropped.
    #[error("unknown sampler id {0}")]
    UnknownSampler(u64),

    /// Edge sampling requested on a node sampler, or the reverse.
    #[error("sampler {0} does not sample the requested entity kind")]
    SamplerKindMismatch(u64),
}

/// Validates the sorted-ascending contract on an edge type filter.
pub fn check_sorted_edge_types(edge_types: &[EdgeType]) -> Result<(), RequestError> {
    if edge_types.windows(2).all(|w| w[0] <= w[1]) {
        Ok(())
    } else {
        Err(RequestError::UnsortedEdgeTypes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_meta() {
        let meta = FeatureMeta::new(3, 16);
        assert_eq!(meta.id, 3);
        assert_eq!(meta.size, 16);
        assert_eq!(format!("{}", meta), "f3:16B");

        let features = [FeatureMeta::new(0, 4), FeatureMeta::new(1, 12)];
        assert_eq!(feature_vector_size(&features), 16);
    }

    #[test]
    fn test_sorted_edge_types() {
        assert!(check_sorted_edge_types(&[]).is_ok());
        assert!(check_sorted_edge_types(&[0]).is_ok());
        assert!(check_sorted_edge_types(&[0, 0, 2, 5]).is_ok());
        assert!(check_sorted_edge_types(&[2, 1]).is_err());
    }

    #[test]
    fn test_sampler_category_serialization() {
        let cat = SamplerCategory::UniformWithoutReplacement;
        let json = serde_json::to_string(&cat).unwrap();
        let parsed: SamplerCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(cat, parsed);
    }

    #[test]
    fn test_default_node_type_sentinel() {
        assert_eq!(DEFAULT_NODE_TYPE, -1);
    }
}
