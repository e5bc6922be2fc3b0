//! File-backed storage for partition payloads.
//!
//! Partition files are immutable once written by the offline conversion
//! pipeline, so the server only ever needs a read-only byte view of each
//! file. Two backends provide that view:
//!
//! - [`StorageMode::Mmap`] maps the file and lets the page cache decide what
//!   stays resident. This is the default for local data directories.
//! - [`StorageMode::Streaming`] reads the whole file into heap memory through
//!   a buffered handle opened per file, for filesystems where mapping is
//!   unavailable or undesirable.
//!
//! Both backends end up behind [`Blob`], which dereferences to `[u8]`.

use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while opening or validating partition files.
///
/// Everything here is startup-fatal: the server refuses to come up over a
/// data directory it cannot fully load.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to list data directory {path}: {source}")]
    ListDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}: expected {expected} bytes, found {found}")]
    UnexpectedSize {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("{path}: file size {found} is not a multiple of the {record} byte record size")]
    MisalignedRecords {
        path: PathBuf,
        found: u64,
        record: u64,
    },

    #[error("partition {suffix}: missing companion file {path}")]
    MissingCompanion { suffix: String, path: PathBuf },

    #[error("metadata manifest {path} is malformed: {source}")]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no partitions found under {path} for the configured partition set")]
    NoPartitions { path: PathBuf },
}

/// How partition files are held in memory for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Memory-map each file read-only.
    #[default]
    Mmap,
    /// Read each file into heap memory through a streaming handle.
    Streaming,
}

/// Read-only byte view of one partition file.
#[derive(Debug)]
pub enum Blob {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl Blob {
    /// Opens `path` with the requested backend.
    pub fn open(path: &Path, mode: StorageMode) -> Result<Self, StorageError> {
        let file = File::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        match mode {
            StorageMode::Mmap => {
                // Zero-byte files are legal (a partition of isolated nodes
                // has an empty adjacency data file) and cannot be mapped.
                let len = file
                    .metadata()
                    .map_err(|source| StorageError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?
                    .len();
                if len == 0 {
                    return Ok(Blob::Buffered(Vec::new()));
                }
                // Safety: partition files are written once by the conversion
                // pipeline and never modified while the server is running.
                let mmap = unsafe { Mmap::map(&file) }.map_err(|source| StorageError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(Blob::Mapped(mmap))
            }
            StorageMode::Streaming => {
                let mut buf = Vec::new();
                let mut reader = std::io::BufReader::new(file);
                reader
                    .read_to_end(&mut buf)
                    .map_err(|source| StorageError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Ok(Blob::Buffered(buf))
            }
        }
    }

    /// Opens `path`, verifying the byte length is exactly `expected`.
    pub fn open_sized(path: &Path, mode: StorageMode, expected: u64) -> Result<Self, StorageError> {
        let blob = Self::open(path, mode)?;
        if blob.len() as u64 != expected {
            return Err(StorageError::UnexpectedSize {
                path: path.to_path_buf(),
                expected,
                found: blob.len() as u64,
            });
        }
        Ok(blob)
    }

    /// Opens `path`, verifying the byte length is a multiple of `record`.
    pub fn open_records(path: &Path, mode: StorageMode, record: u64) -> Result<Self, StorageError> {
        let blob = Self::open(path, mode)?;
        if blob.len() as u64 % record != 0 {
            return Err(StorageError::MisalignedRecords {
                path: path.to_path_buf(),
                found: blob.len() as u64,
                record,
            });
        }
        Ok(blob)
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Blob::Mapped(m) => m,
            Blob::Buffered(v) => v,
        }
    }
}

// =============================================================================
// Little-endian accessors
// =============================================================================
//
// Partition files are packed little-endian with no alignment guarantees, so
// all reads go through byte copies rather than pointer casts.

/// Reads the `idx`-th u64 of an offset table.
#[inline]
pub(crate) fn u64_at(bytes: &[u8], idx: usize) -> u64 {
    let start = idx * 8;
    u64::from_le_bytes(bytes[start..start + 8].try_into().unwrap())
}

/// Reads an i64 at byte offset `start`.
#[inline]
pub(crate) fn i64_at(bytes: &[u8], start: usize) -> i64 {
    i64::from_le_bytes(bytes[start..start + 8].try_into().unwrap())
}

/// Reads an i32 at byte offset `start`.
#[inline]
pub(crate) fn i32_at(bytes: &[u8], start: usize) -> i32 {
    i32::from_le_bytes(bytes[start..start + 4].try_into().unwrap())
}

/// Reads a u32 at byte offset `start`.
#[inline]
pub(crate) fn u32_at(bytes: &[u8], start: usize) -> u32 {
    u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap())
}

/// Reads an f32 at byte offset `start`.
#[inline]
pub(crate) fn f32_at(bytes: &[u8], start: usize) -> f32 {
    f32::from_le_bytes(bytes[start..start + 4].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_blob_backends_agree() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..=255).collect();
        let path = write_file(dir.path(), "blob.bin", &payload);

        let mapped = Blob::open(&path, StorageMode::Mmap).unwrap();
        let buffered = Blob::open(&path, StorageMode::Streaming).unwrap();
        assert_eq!(&mapped[..], &payload[..]);
        assert_eq!(&buffered[..], &payload[..]);
    }

    #[test]
    fn test_zero_length_file_opens_under_mmap() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.data", &[]);

        let blob = Blob::open(&path, StorageMode::Mmap).unwrap();
        assert!(blob.is_empty());
        assert!(Blob::open_records(&path, StorageMode::Mmap, 16).unwrap().is_empty());
        assert!(Blob::open_sized(&path, StorageMode::Mmap, 0).is_ok());
    }

    #[test]
    fn test_open_sized_rejects_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "short.bin", &[0u8; 12]);

        assert!(Blob::open_sized(&path, StorageMode::Mmap, 12).is_ok());
        let err = Blob::open_sized(&path, StorageMode::Mmap, 16).unwrap_err();
        assert!(matches!(err, StorageError::UnexpectedSize { .. }));
    }

    #[test]
    fn test_open_records_rejects_misalignment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "records.bin", &[0u8; 30]);

        let err = Blob::open_records(&path, StorageMode::Streaming, 16).unwrap_err();
        assert!(matches!(err, StorageError::MisalignedRecords { .. }));
        assert!(Blob::open_records(&path, StorageMode::Streaming, 10).is_ok());
    }

    #[test]
    fn test_unaligned_accessors() {
        let mut bytes = vec![0u8; 1];
        bytes.extend_from_slice(&(-7i64).to_le_bytes());
        bytes.extend_from_slice(&3.5f32.to_le_bytes());
        assert_eq!(i64_at(&bytes, 1), -7);
        assert_eq!(f32_at(&bytes, 9), 3.5);
    }
}
