use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node home directory; the contract store lives underneath it.
    #[serde(default = "default_home")]
    pub home: String,
    pub engine: EngineConfig,
}

fn default_home() -> String {
    ".ember".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Runtime backend: "compiler" (wasmtime) or "interpreter" (wasmi).
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_denom")]
    pub denom: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Linear memory cap per instance, in bytes.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
    /// Optional shared compiled-artifact cache directory.
    #[serde(default)]
    pub shared_aot_cache: Option<String>,
}

fn default_backend() -> String {
    "compiler".to_string()
}

fn default_denom() -> String {
    "ember".to_string()
}

fn default_chain_id() -> u64 {
    7000
}

fn default_memory_limit() -> usize {
    ember_forge::backend::DEFAULT_MEMORY_LIMIT
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            engine: EngineConfig {
                backend: default_backend(),
                denom: default_denom(),
                chain_id: default_chain_id(),
                memory_limit: default_memory_limit(),
                shared_aot_cache: None,
            },
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), NodeError> {
        let raw = toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ember.toml");
        let config = NodeConfig::default();
        config.save(&path).unwrap();
        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.engine.backend, "compiler");
        assert_eq!(loaded.engine.chain_id, 7000);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let parsed: NodeConfig = toml::from_str("[engine]\nbackend = \"interpreter\"\n").unwrap();
        assert_eq!(parsed.engine.backend, "interpreter");
        assert_eq!(parsed.engine.denom, "ember");
        assert_eq!(parsed.home, ".ember");
    }
}
