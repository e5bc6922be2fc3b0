//! Server configuration.
//!
//! Configuration is resolved in three layers, later layers winning:
//! built-in defaults, an optional TOML file, then `GRAPHD__`-prefixed
//! environment variables. Command-line flags in `main` override everything.
//!
//! # Environment Variables
//!
//! - `GRAPHD__PORT=50051`
//! - `GRAPHD__DATA_DIR=/data/papers100m`
//! - `GRAPHD__PARTITIONS=0,1,2`
//! - `GRAPHD__STORAGE=mmap|streaming`
//! - `GRAPHD__ENABLE_THREADPOOL=true`

use graphd_storage::StorageMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value: {0}")]
    Invalid(String),
}

/// Resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the gRPC server listens on.
    pub port: u16,
    /// Data directory holding partition files and `meta.json`.
    pub data_dir: PathBuf,
    /// Partition suffix numbers to host.
    pub partitions: Vec<u32>,
    /// Partition storage backend.
    pub storage: StorageMode,
    /// Whether the request fan-out pool is created.
    pub enable_threadpool: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 50051,
            data_dir: PathBuf::from("data"),
            partitions: vec![0],
            storage: StorageMode::Mmap,
            enable_threadpool: true,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from an optional TOML file, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = std::env::var("GRAPHD__PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("GRAPHD__PORT={port}")))?;
        }
        if let Ok(dir) = std::env::var("GRAPHD__DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(partitions) = std::env::var("GRAPHD__PARTITIONS") {
            self.partitions = parse_partitions(&partitions)?;
        }
        if let Ok(storage) = std::env::var("GRAPHD__STORAGE") {
            self.storage = parse_storage_mode(&storage)?;
        }
        if let Ok(enabled) = std::env::var("GRAPHD__ENABLE_THREADPOOL") {
            self.enable_threadpool = matches!(enabled.to_lowercase().as_str(), "true" | "1");
        }
        Ok(())
    }
}

/// Parses a comma-separated partition list such as `0,1,2`.
pub fn parse_partitions(value: &str) -> Result<Vec<u32>, ConfigError> {
    value
        .split(',')
        .map(|part| {
            part.trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("partition number {part:?}")))
        })
        .collect()
}

/// Parses a storage mode name.
pub fn parse_storage_mode(value: &str) -> Result<StorageMode, ConfigError> {
    match value.to_lowercase().as_str() {
        "mmap" => Ok(StorageMode::Mmap),
        "streaming" | "stream" => Ok(StorageMode::Streaming),
        other => Err(ConfigError::Invalid(format!("storage mode {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 50051);
        assert_eq!(config.storage, StorageMode::Mmap);
        assert!(config.enable_threadpool);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphd.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
port = 9090
data_dir = "/srv/graph"
partitions = [0, 3]
storage = "streaming"
enable_threadpool = false
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.data_dir, PathBuf::from("/srv/graph"));
        assert_eq!(config.partitions, vec![0, 3]);
        assert_eq!(config.storage, StorageMode::Streaming);
        assert!(!config.enable_threadpool);
    }

    #[test]
    fn test_parse_partitions() {
        assert_eq!(parse_partitions("0").unwrap(), vec![0]);
        assert_eq!(parse_partitions("0, 2, 5").unwrap(), vec![0, 2, 5]);
        assert!(parse_partitions("0,x").is_err());
    }

    #[test]
    fn test_parse_storage_mode() {
        assert_eq!(parse_storage_mode("mmap").unwrap(), StorageMode::Mmap);
        assert_eq!(
            parse_storage_mode("Streaming").unwrap(),
            StorageMode::Streaming
        );
        assert!(parse_storage_mode("tape").is_err());
    }
}
