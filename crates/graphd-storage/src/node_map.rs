//! Node map parsing and the node-location index.
//!
//! Every partition ships a `node_<suffix>.map` file assigning its internal
//! indices: fixed 20-byte little-endian records
//! `<u64 external_id, u64 internal_index, i32 node_type>`, ordered by
//! internal index from zero. The same node id may appear in several
//! partitions; the [`NodeLocationIndex`] collapses those appearances into a
//! single lookup returning every (partition, internal index) placement.
//!
//! # Placement encoding
//!
//! Placements live in three parallel arrays. A node with `k` placements owns
//! a contiguous run of length `k`; every `counts` slot inside the run holds
//! `k`. When a later partition adds a placement for a node that already has
//! a run, the old run is copied to the tail, extended by one, and the map is
//! repointed - dead runs stay in the arrays. This keeps the update O(1) map
//! work per record at the cost of dead space, which is acceptable for a
//! load-once index.

use crate::storage::{i32_at, StorageError};
use graphd_core::{NodeId, NodeType, PartitionIndex};
use std::collections::HashMap;
use std::path::Path;

/// Byte size of one node map record.
pub const NODE_MAP_RECORD_SIZE: usize = 20;

/// One parsed record of a `node_<suffix>.map` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMapRecord {
    pub external_id: NodeId,
    pub internal_index: u64,
    pub node_type: NodeType,
}

/// Reads and parses a node map file.
///
/// The file is read through a plain buffered handle regardless of the
/// partition storage mode; the parsed records replace the raw bytes.
pub fn read_node_map(path: &Path) -> Result<Vec<NodeMapRecord>, StorageError> {
    let bytes = std::fs::read(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if bytes.len() % NODE_MAP_RECORD_SIZE != 0 {
        return Err(StorageError::MisalignedRecords {
            path: path.to_path_buf(),
            found: bytes.len() as u64,
            record: NODE_MAP_RECORD_SIZE as u64,
        });
    }

    let count = bytes.len() / NODE_MAP_RECORD_SIZE;
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let base = i * NODE_MAP_RECORD_SIZE;
        records.push(NodeMapRecord {
            external_id: u64::from_le_bytes(bytes[base..base + 8].try_into().unwrap()) as NodeId,
            internal_index: u64::from_le_bytes(bytes[base + 8..base + 16].try_into().unwrap()),
            node_type: i32_at(&bytes, base + 16),
        });
    }
    Ok(records)
}

/// In-memory index from public node id to its placements.
#[derive(Debug, Default)]
pub struct NodeLocationIndex {
    /// Node id to offset of its live run in the placement arrays.
    map: HashMap<NodeId, usize>,
    partition_indices: Vec<PartitionIndex>,
    internal_indices: Vec<u64>,
    counts: Vec<u32>,
}

/// A resolved run of placements for one node.
#[derive(Debug, Clone, Copy)]
pub struct PlacementRun<'a> {
    index: &'a NodeLocationIndex,
    offset: usize,
    count: usize,
}

impl<'a> PlacementRun<'a> {
    /// Number of partitions hosting the node.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Placements in placement-array order.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionIndex, u64)> + 'a {
        let index = self.index;
        (self.offset..self.offset + self.count)
            .map(move |i| (index.partition_indices[i], index.internal_indices[i]))
    }
}

impl NodeLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests one partition's node map records.
    ///
    /// Partitions must be ingested in local-index order; the records of a
    /// partition arrive ordered by internal index starting at zero.
    pub fn add_partition(&mut self, records: &[NodeMapRecord], partition: PartitionIndex) {
        self.map.reserve(records.len());
        self.partition_indices.reserve(records.len());
        self.internal_indices.reserve(records.len());
        self.counts.reserve(records.len());
        for (position, record) in records.iter().enumerate() {
            debug_assert_eq!(record.internal_index, position as u64);
            self.insert(record.external_id, record.internal_index, partition);
        }
    }

    fn insert(&mut self, external_id: NodeId, internal_index: u64, partition: PartitionIndex) {
        match self.map.entry(external_id) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(self.internal_indices.len());
                self.partition_indices.push(partition);
                self.internal_indices.push(internal_index);
                self.counts.push(1);
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let old_offset = *entry.get();
                let old_count = self.counts[old_offset] as usize;
                entry.insert(self.internal_indices.len());

                for p in 0..old_count {
                    self.partition_indices.push(self.partition_indices[old_offset + p]);
                    self.internal_indices.push(self.internal_indices[old_offset + p]);
                }
                self.partition_indices.push(partition);
                self.internal_indices.push(internal_index);

                let new_count = old_count as u32 + 1;
                self.counts
                    .extend(std::iter::repeat(new_count).take(old_count + 1));
            }
        }
    }

    /// Resolves a node id to its placements, if the node is hosted here.
    pub fn locate(&self, node_id: NodeId) -> Option<PlacementRun<'_>> {
        let offset = *self.map.get(&node_id)?;
        Some(PlacementRun {
            index: self,
            offset,
            count: self.counts[offset] as usize,
        })
    }

    /// Number of distinct node ids in the index.
    pub fn node_count(&self) -> usize {
        self.map.len()
    }

    /// Total placement slots, dead runs included.
    pub fn slot_count(&self) -> usize {
        self.internal_indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(external_id: NodeId, internal_index: u64, node_type: NodeType) -> NodeMapRecord {
        NodeMapRecord {
            external_id,
            internal_index,
            node_type,
        }
    }

    #[test]
    fn test_read_node_map_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_0.map");
        let mut bytes = Vec::new();
        for (ext, internal, ty) in [(42u64, 0u64, 3i32), (7, 1, -1), (100, 2, 0)] {
            bytes.extend_from_slice(&ext.to_le_bytes());
            bytes.extend_from_slice(&internal.to_le_bytes());
            bytes.extend_from_slice(&ty.to_le_bytes());
        }
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let records = read_node_map(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], record(42, 0, 3));
        assert_eq!(records[1], record(7, 1, -1));
        assert_eq!(records[2], record(100, 2, 0));
    }

    #[test]
    fn test_read_node_map_rejects_torn_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_0.map");
        std::fs::write(&path, [0u8; 30]).unwrap();
        assert!(matches!(
            read_node_map(&path),
            Err(StorageError::MisalignedRecords { .. })
        ));
    }

    #[test]
    fn test_single_partition_placements() {
        let mut index = NodeLocationIndex::new();
        index.add_partition(&[record(5, 0, 0), record(9, 1, 1)], 0);

        let run = index.locate(5).unwrap();
        assert_eq!(run.len(), 1);
        assert_eq!(run.iter().collect::<Vec<_>>(), vec![(0, 0)]);

        let run = index.locate(9).unwrap();
        assert_eq!(run.iter().collect::<Vec<_>>(), vec![(0, 1)]);

        assert!(index.locate(6).is_none());
    }

    #[test]
    fn test_replicated_node_run_is_extended() {
        let mut index = NodeLocationIndex::new();
        index.add_partition(&[record(7, 0, 0), record(8, 1, 0)], 0);
        index.add_partition(&[record(7, 0, 0)], 1);
        index.add_partition(&[record(7, 0, 0), record(9, 1, 0)], 2);

        let run = index.locate(7).unwrap();
        assert_eq!(run.len(), 3);
        // Placement order follows partition ingestion order.
        assert_eq!(run.iter().collect::<Vec<_>>(), vec![(0, 0), (1, 0), (2, 0)]);

        // Non-replicated nodes are untouched by the copy-and-append.
        assert_eq!(index.locate(8).unwrap().iter().collect::<Vec<_>>(), vec![(0, 1)]);
        assert_eq!(index.locate(9).unwrap().iter().collect::<Vec<_>>(), vec![(2, 1)]);

        // Dead runs remain allocated: 2 + 1 + 2 fresh slots plus 1 + 2 copies.
        assert_eq!(index.slot_count(), 8);
        assert_eq!(index.node_count(), 3);
    }

    #[test]
    fn test_locate_count_matches_hosting_partitions() {
        let mut index = NodeLocationIndex::new();
        for partition in 0..4u32 {
            index.add_partition(&[record(1, 0, 0)], partition);
        }
        let run = index.locate(1).unwrap();
        assert_eq!(run.len(), 4);
        let partitions: Vec<_> = run.iter().map(|(p, _)| p).collect();
        assert_eq!(partitions, vec![0, 1, 2, 3]);
    }
}
