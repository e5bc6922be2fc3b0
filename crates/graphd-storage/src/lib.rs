//! # graphd Storage
//!
//! Partition store, node-location index and query engine for the graphd
//! server. Everything here is read-only after startup: the offline
//! conversion pipeline writes the binary partition files, the server loads
//! them once, and requests only ever read.
//!
//! The layering, bottom up:
//! - [`storage`] - memory-mapped or streamed byte views of partition files
//! - [`node_map`] - node map parsing and the placement index
//! - [`metadata`] - the `meta.json` manifest
//! - [`partition`] - per-partition primitives (features, neighbors, sampling)
//! - [`fanout`] - the fixed thread pool and chunked request fan-out
//! - [`engine`] - per-request dispatch and columnar reply assembly
//! - [`sampler`] - global node/edge sampler objects and their registry

pub mod engine;
pub mod fanout;
pub mod logging;
pub mod metadata;
pub mod node_map;
pub mod partition;
pub mod sampler;
pub mod storage;
pub mod testing;

// Re-exports
pub use engine::{
    EngineOptions, FeaturesReply, GraphEngine, NeighborsReply, NodeTypesReply,
    SparseFeaturesReply, StringFeaturesReply, UniformSampleReply, UniformSampleRequest,
    WeightedSampleReply, WeightedSampleRequest,
};
pub use metadata::Metadata;
pub use node_map::NodeLocationIndex;
pub use partition::Partition;
pub use sampler::{SampleSet, SamplerRegistry};
pub use storage::{StorageError, StorageMode};
