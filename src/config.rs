//! Runtime configuration: the enumerated Config surface of spec.md §6,
//! plus object-cache policy selection.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "/etc/raleighsl/raleighsl.toml";
const ENV_CONFIG_PATH: &str = "RALEIGHSL_CONFIG";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub mmpool: MmPoolConfig,
    #[serde(default)]
    pub rings: RingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from file. The path can be overridden with the
    /// `RALEIGHSL_CONFIG` environment variable. If the file is missing or
    /// fails to parse, defaults are returned.
    pub fn load() -> Self {
        let path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&PathBuf::from(path))
    }

    pub fn load_from(path: &PathBuf) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }
}

/// Worker / core layout (spec.md §4.8, §6).
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_ncores")]
    pub ncores: usize,
    #[serde(default = "default_udata_size")]
    pub udata_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ncores: default_ncores(),
            udata_size: default_udata_size(),
        }
    }
}

fn default_ncores() -> usize {
    num_cpus::get().max(1)
}
fn default_udata_size() -> usize {
    64
}

/// Per-core arena shape (spec.md §6: `mmpool_{base_size,page_size,block_min,block_max}`).
#[derive(Debug, Deserialize, Clone)]
pub struct MmPoolConfig {
    #[serde(default = "default_base_size")]
    pub base_size: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_block_min")]
    pub block_min: usize,
    #[serde(default = "default_block_max")]
    pub block_max: usize,
}

impl Default for MmPoolConfig {
    fn default() -> Self {
        Self {
            base_size: default_base_size(),
            page_size: default_page_size(),
            block_min: default_block_min(),
            block_max: default_block_max(),
        }
    }
}

fn default_base_size() -> usize {
    1 << 20
}
fn default_page_size() -> usize {
    4096
}
fn default_block_min() -> usize {
    64
}
fn default_block_max() -> usize {
    1 << 16
}

/// Cross-worker and producer ring sizes (spec.md §6).
#[derive(Debug, Deserialize, Clone)]
pub struct RingConfig {
    #[serde(default = "default_local_ring_size")]
    pub local_ring_size: usize,
    #[serde(default = "default_remote_ring_size")]
    pub remote_ring_size: usize,
    #[serde(default = "default_events_ring_size")]
    pub events_ring_size: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            local_ring_size: default_local_ring_size(),
            remote_ring_size: default_remote_ring_size(),
            events_ring_size: default_events_ring_size(),
        }
    }
}

fn default_local_ring_size() -> usize {
    4096
}
fn default_remote_ring_size() -> usize {
    1024
}
fn default_events_ring_size() -> usize {
    1024
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicyKind {
    Lru,
    TwoQ,
}

impl Default for CachePolicyKind {
    fn default() -> Self {
        CachePolicyKind::Lru
    }
}

/// Object cache shape: capacity and eviction policy (spec.md §4.5). The
/// Config enumeration in spec.md §6 does not name this, but policy
/// selection is part of the cache's contract, so it is added here.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub policy: CachePolicyKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            policy: CachePolicyKind::default(),
        }
    }
}

fn default_cache_capacity() -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_config_defaults() {
        let toml = r#"
[runtime]
ncores = 4
udata_size = 64

[mmpool]
base_size = 1048576
page_size = 4096
block_min = 64
block_max = 65536

[rings]
local_ring_size = 4096
remote_ring_size = 1024
events_ring_size = 1024

[cache]
capacity = 8192
policy = "two_q"
"#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.runtime.ncores, 4);
        assert_eq!(cfg.mmpool.page_size, 4096);
        assert_eq!(cfg.rings.local_ring_size, 4096);
        assert_eq!(cfg.cache.capacity, 8192);
        assert_eq!(cfg.cache.policy, CachePolicyKind::TwoQ);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load_from(&PathBuf::from("/does/not/exist/raleighsl.toml"));
        assert_eq!(cfg.cache.policy, CachePolicyKind::Lru);
        assert!(cfg.runtime.ncores >= 1);
    }

    #[test]
    fn env_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\ncapacity = 16\npolicy = \"two_q\"").unwrap();
        unsafe {
            std::env::set_var(ENV_CONFIG_PATH, file.path());
        }
        let cfg = Config::load();
        assert_eq!(cfg.cache.capacity, 16);
        unsafe {
            std::env::remove_var(ENV_CONFIG_PATH);
        }
    }
}
