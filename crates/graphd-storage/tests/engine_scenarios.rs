//! End-to-end engine scenarios over a small three-partition dataset.
//!
//! The dataset exercises replicated nodes, per-partition feature ownership
//! and every sampling flavor:
//!
//! - node 42 lives in partition 0 only, with dense/sparse/string features
//! - node 3 is split across partitions 0 and 1 with one matching neighbor
//!   in each
//! - node 7 is split 2 + 1 across partitions 0 and 1
//! - node 10 has three placements (partitions 0, 1, 2)
//! - edge (5 -> 9, type 2) exists in partition 1 only
//! - node 60 is isolated in partition 3, whose adjacency data file is
//!   therefore empty

use graphd_core::FeatureMeta;
use graphd_storage::engine::{
    EngineOptions, GraphEngine, UniformSampleRequest, WeightedSampleRequest,
};
use graphd_storage::metadata::Metadata;
use graphd_storage::storage::StorageMode;
use graphd_storage::testing::PartitionFixture;
use std::path::Path;
use std::sync::Arc;

fn write_dataset(dir: &Path) {
    Metadata {
        version: 1,
        node_count: 8,
        edge_count: 11,
        node_type_count: 2,
        edge_type_count: 3,
        node_feature_count: 3,
        edge_feature_count: 3,
        partition_count: 4,
        ..Metadata::default()
    }
    .write(dir)
    .unwrap();

    PartitionFixture::new("0")
        .node(42, 0)
        .dense(0, &[1, 2, 3, 4])
        .sparse(1, 2, &[0, 1, 2, 3], &[10, 20])
        .string(2, "alpha")
        .edge(9, 0, 1.0)
        .edge(11, 0, 3.0)
        .edge(13, 2, 2.0)
        .node(2, 1)
        .dense(0, &[9, 9, 9, 9])
        .node(3, 0)
        .edge(21, 0, 1.0)
        .node(7, 0)
        .edge(70, 0, 1.0)
        .edge(71, 0, 1.5)
        .node(10, 0)
        .edge(100, 0, 1.0)
        .node(5, 0)
        .edge(9, 1, 1.0)
        .write(dir)
        .unwrap();

    PartitionFixture::new("1")
        .node(5, 0)
        .edge(9, 2, 5.0)
        .edge_dense(0, &[0xDE, 0xAD])
        .edge_sparse(2, 1, &[4], &[7])
        .edge_string(1, "edge")
        .node(7, 0)
        .edge(72, 0, 2.0)
        .node(3, 0)
        .edge(22, 0, 1.0)
        .node(10, 0)
        .edge(101, 0, 2.0)
        .edge(102, 0, 3.0)
        .write(dir)
        .unwrap();

    PartitionFixture::new("2")
        .node(10, 0)
        .edge(103, 0, 4.0)
        .write(dir)
        .unwrap();

    PartitionFixture::new("3").node(60, 1).write(dir).unwrap();
}

fn open_engine(dir: &Path, enable_threadpool: bool) -> Arc<GraphEngine> {
    Arc::new(
        GraphEngine::open(EngineOptions {
            data_dir: dir.to_path_buf(),
            partitions: vec![0, 1, 2, 3],
            storage: StorageMode::Mmap,
            enable_threadpool,
        })
        .unwrap(),
    )
}

#[test]
fn singleton_partition_dense_feature() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let reply = engine.node_features(vec![42, 99], vec![FeatureMeta::new(0, 4)]);
    assert_eq!(reply.values, vec![1, 2, 3, 4]);
    assert_eq!(reply.offsets, vec![0]);
}

#[test]
fn replicated_node_neighbors_concatenate_across_placements() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let reply = engine.full_neighbors(&[7], &[0]).unwrap();
    assert_eq!(reply.neighbor_counts, vec![3]);
    assert_eq!(reply.node_ids, vec![70, 71, 72]);
    assert_eq!(reply.edge_weights, vec![1.0, 1.5, 2.0]);
    assert_eq!(reply.edge_types, vec![0, 0, 0]);

    assert_eq!(engine.neighbor_counts(&[7, 999], &[0]).unwrap(), vec![3, 0]);
}

#[test]
fn weighted_sample_is_deterministic_across_calls_and_pool_modes() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let sequential = open_engine(dir.path(), false);
    let pooled = open_engine(dir.path(), true);

    let request = WeightedSampleRequest {
        seed: 12345,
        node_ids: vec![10],
        edge_types: vec![0],
        count: 4,
        default_node_id: -1,
        default_node_weight: 0.0,
        default_edge_type: -1,
    };

    let first = sequential.weighted_sample_neighbors(&request).unwrap();
    let second = sequential.weighted_sample_neighbors(&request).unwrap();
    let pooled_reply = pooled.weighted_sample_neighbors(&request).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, pooled_reply);

    assert_eq!(first.node_ids, vec![10]);
    // Placement weights: 1.0 + (2.0 + 3.0) + 4.0.
    assert_eq!(first.shard_weights, vec![10.0]);
    assert_eq!(first.neighbor_ids.len(), 4);
    assert!(first
        .neighbor_ids
        .iter()
        .all(|id| [100, 101, 102, 103].contains(id)));
}

#[test]
fn uniform_without_replacement_undersupplied_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let reply = engine
        .uniform_sample_neighbors(&UniformSampleRequest {
            seed: 1,
            node_ids: vec![3],
            edge_types: vec![0],
            count: 5,
            without_replacement: true,
            default_node_id: -1,
            default_edge_type: -1,
        })
        .unwrap();

    assert_eq!(reply.node_ids, vec![3]);
    assert_eq!(reply.shard_counts, vec![2]);
    // The reservoir fills sequentially while undersupplied: one real
    // neighbor from each placement, then untouched defaults.
    assert_eq!(reply.neighbor_ids, vec![21, 22, -1, -1, -1]);
    assert_eq!(&reply.neighbor_types[..2], &[0, 0]);
    assert_eq!(&reply.neighbor_types[2..], &[-1, -1, -1]);
}

#[test]
fn unknown_nodes_are_omitted_not_padded() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    // Only node 2 of [1, 2, 3-with-no-features] has dense features here:
    // node 1 is unknown, node 3 exists but carries no features.
    let reply = engine.node_features(vec![1, 2, 3], vec![FeatureMeta::new(0, 4)]);
    assert_eq!(reply.offsets, vec![1]);
    assert_eq!(reply.values, vec![9, 9, 9, 9]);

    let sample = engine
        .weighted_sample_neighbors(&WeightedSampleRequest {
            seed: 0,
            node_ids: vec![1, 2, 404],
            edge_types: vec![0],
            count: 3,
            default_node_id: -7,
            default_node_weight: 0.0,
            default_edge_type: -1,
        })
        .unwrap();
    // Node 2 is located (producing default-filled slots); 1 and 404 are not.
    assert_eq!(sample.node_ids, vec![2]);
    assert_eq!(sample.shard_weights, vec![0.0]);
    assert_eq!(sample.neighbor_ids, vec![-7, -7, -7]);
    assert_eq!(sample.neighbor_types, vec![-1, -1, -1]);
}

#[test]
fn edge_feature_found_in_second_placement_only() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let reply = engine
        .edge_features(vec![5, 9], vec![2], vec![FeatureMeta::new(0, 2)])
        .unwrap();
    assert_eq!(reply.offsets, vec![0]);
    assert_eq!(reply.values, vec![0xDE, 0xAD]);

    // The same endpoints under a type that exists nowhere yield nothing.
    let reply = engine
        .edge_features(vec![5, 9], vec![0], vec![FeatureMeta::new(0, 2)])
        .unwrap();
    assert!(reply.offsets.is_empty());
    assert!(reply.values.is_empty());
}

#[test]
fn offsets_column_is_faithful_under_fanout() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let pooled = open_engine(dir.path(), true);
    let sequential = open_engine(dir.path(), false);

    // A work list long enough to be split across workers, with known ids
    // scattered through unknowns.
    let mut node_ids = Vec::new();
    for i in 0..128i64 {
        node_ids.push(match i % 4 {
            0 => 42,
            1 => 2,
            2 => 1000 + i,
            _ => 10, // located, but featureless
        });
    }
    let features = vec![FeatureMeta::new(0, 4), FeatureMeta::new(1, 2)];

    let reply = pooled.node_features(node_ids.clone(), features.clone());
    assert!(reply.offsets.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(reply.values.len(), reply.offsets.len() * 6);
    for &offset in &reply.offsets {
        assert!(matches!(node_ids[offset as usize], 42 | 2));
    }

    // Worker-order concatenation makes the pooled reply byte-identical to
    // the sequential one.
    assert_eq!(reply, sequential.node_features(node_ids, features));
}

#[test]
fn sparse_reply_invariants() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let reply = engine.node_sparse_features(vec![42, 2, 999], vec![1]);
    assert_eq!(reply.dimensions, vec![2]);
    assert_eq!(reply.indices_counts.len(), 1);
    assert_eq!(reply.values_counts.len(), 1);
    assert_eq!(
        reply.indices_counts.iter().sum::<i64>(),
        reply.indices.len() as i64
    );
    assert_eq!(
        reply.values_counts.iter().sum::<i64>(),
        reply.values.len() as i64
    );
    // Row index 0 is prepended to each stored coordinate pair.
    assert_eq!(reply.indices, vec![0, 0, 1, 0, 2, 3]);
    assert_eq!(reply.values, vec![10, 20]);

    let reply = engine
        .edge_sparse_features(vec![5, 9], vec![2], vec![2])
        .unwrap();
    assert_eq!(reply.dimensions, vec![1]);
    assert_eq!(reply.indices, vec![0, 4]);
    assert_eq!(reply.values, vec![7]);
    assert_eq!(reply.indices_counts, vec![2]);
    assert_eq!(reply.values_counts, vec![1]);
}

#[test]
fn string_features_report_byte_lengths_per_input() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let reply = engine.node_string_features(vec![42, 999, 2], vec![2]);
    assert_eq!(reply.dimensions, vec![5, 0, 0]);
    assert_eq!(reply.values, b"alpha");

    let reply = engine
        .edge_string_features(vec![5, 9], vec![2], vec![1])
        .unwrap();
    assert_eq!(reply.dimensions, vec![4]);
    assert_eq!(reply.values, b"edge");
}

#[test]
fn sampling_shape_counts_found_nodes_only() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let reply = engine
        .weighted_sample_neighbors(&WeightedSampleRequest {
            seed: 9,
            node_ids: vec![10, 999, 7],
            edge_types: vec![0],
            count: 3,
            default_node_id: -1,
            default_node_weight: 0.0,
            default_edge_type: -1,
        })
        .unwrap();
    assert_eq!(reply.node_ids, vec![10, 7]);
    assert_eq!(reply.neighbor_ids.len(), 6);
    assert_eq!(reply.neighbor_types.len(), 6);
    assert_eq!(reply.neighbor_weights.len(), 6);
    assert_eq!(reply.shard_weights.len(), 2);
    // Shard weight accounting across placements.
    assert_eq!(reply.shard_weights, vec![10.0, 4.5]);
}

#[test]
fn without_replacement_never_duplicates_real_neighbors() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    for seed in 0..20 {
        let reply = engine
            .uniform_sample_neighbors(&UniformSampleRequest {
                seed,
                node_ids: vec![7],
                edge_types: vec![0],
                count: 2,
                without_replacement: true,
                default_node_id: -1,
                default_edge_type: -1,
            })
            .unwrap();
        assert_eq!(reply.shard_counts, vec![3]);
        assert_ne!(reply.neighbor_ids[0], reply.neighbor_ids[1], "seed {seed}");
        for id in &reply.neighbor_ids {
            assert!([70, 71, 72].contains(id));
        }
    }
}

#[test]
fn edgeless_partition_loads_and_serves_its_isolated_node() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    // Startup memory-maps every partition file, including partition 3's
    // zero-byte adjacency data.
    let engine = open_engine(dir.path(), false);
    assert_eq!(engine.partitions()[3].edge_count(), 0);

    assert_eq!(engine.neighbor_counts(&[60], &[0, 1, 2]).unwrap(), vec![0]);

    let types = engine.node_types(&[60]);
    assert_eq!(types.offsets, vec![0]);
    assert_eq!(types.types, vec![1]);

    // The node is located, so it produces default-filled sampling slots.
    let reply = engine
        .weighted_sample_neighbors(&WeightedSampleRequest {
            seed: 0,
            node_ids: vec![60],
            edge_types: vec![0],
            count: 2,
            default_node_id: -1,
            default_node_weight: 0.0,
            default_edge_type: -1,
        })
        .unwrap();
    assert_eq!(reply.node_ids, vec![60]);
    assert_eq!(reply.shard_weights, vec![0.0]);
    assert_eq!(reply.neighbor_ids, vec![-1, -1]);
}

#[test]
fn sparse_count_layouts_under_a_pooled_run() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let pooled = open_engine(dir.path(), true);
    let sequential = open_engine(dir.path(), false);

    // The engine sizes its pool to hardware concurrency; a work list of
    // several elements per worker guarantees every worker gets a range.
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let len = workers * 8;

    // Edge-sparse counts are reported per feature per worker.
    let mut srcs = Vec::new();
    let mut dsts = Vec::new();
    for i in 0..len as i64 {
        if i % 2 == 0 {
            srcs.push(5);
            dsts.push(9);
        } else {
            srcs.push(5);
            dsts.push(2000 + i);
        }
    }
    let node_ids: Vec<i64> = srcs.into_iter().chain(dsts).collect();
    let types = vec![2; len];
    let features = vec![2, 0];

    let reply = pooled
        .edge_sparse_features(node_ids.clone(), types.clone(), features.clone())
        .unwrap();
    assert_eq!(reply.indices_counts.len(), features.len() * workers);
    assert_eq!(reply.values_counts.len(), features.len() * workers);
    assert_eq!(
        reply.indices_counts.iter().sum::<i64>(),
        reply.indices.len() as i64
    );
    assert_eq!(
        reply.values_counts.iter().sum::<i64>(),
        reply.values.len() as i64
    );
    // The pooled run finds the same rows as the sequential one.
    let flat = sequential
        .edge_sparse_features(node_ids, types, features.clone())
        .unwrap();
    assert_eq!(
        reply.indices_counts.iter().sum::<i64>(),
        flat.indices_counts.iter().sum::<i64>()
    );
    assert_eq!(
        reply.values_counts.iter().sum::<i64>(),
        flat.values_counts.iter().sum::<i64>()
    );

    // Node-sparse counts stay summed per feature under the same pool.
    let node_ids: Vec<i64> = (0..len as i64)
        .map(|i| if i % 2 == 0 { 42 } else { 3000 + i })
        .collect();
    let reply = pooled.node_sparse_features(node_ids.clone(), vec![1, 0]);
    assert_eq!(reply.indices_counts.len(), 2);
    assert_eq!(reply.values_counts.len(), 2);
    assert_eq!(
        reply.indices_counts.iter().sum::<i64>(),
        reply.indices.len() as i64
    );
    // Per-feature grouping in worker order reproduces the sequential reply.
    assert_eq!(reply, sequential.node_sparse_features(node_ids, vec![1, 0]));
}

#[test]
fn metadata_is_served_from_the_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());
    let engine = open_engine(dir.path(), false);

    let metadata = engine.metadata();
    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.node_count, 8);
    assert_eq!(metadata.partition_count, 4);
}
