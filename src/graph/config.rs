//! Graph store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for opening a [`FileGraph`](super::FileGraph)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Backing file, one vertex per line
    pub path: PathBuf,
    /// fsync after every append and before a rewrite replaces the file
    pub sync_writes: bool,
    /// Create parent directories and an empty file on open
    pub create_if_missing: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./graph.jsonl"),
            sync_writes: true,
            create_if_missing: true,
        }
    }
}

impl GraphConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GraphConfig::default();
        assert_eq!(config.path, PathBuf::from("./graph.jsonl"));
        assert!(config.sync_writes);
        assert!(config.create_if_missing);
    }

    #[test]
    fn test_builder() {
        let config = GraphConfig::new("/data/g.jsonl")
            .with_sync_writes(false)
            .with_create_if_missing(false);
        assert_eq!(config.path, PathBuf::from("/data/g.jsonl"));
        assert!(!config.sync_writes);
        assert!(!config.create_if_missing);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GraphConfig = serde_json::from_str(r#"{"path": "x.jsonl"}"#).unwrap();
        assert_eq!(config.path, PathBuf::from("x.jsonl"));
        assert!(config.sync_writes);
    }
}
