//! Configuration management for sixhound
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (`SIXHOUND_*` prefix, highest precedence)
//! 2. `sixhound.local.toml` (gitignored, local overrides)
//! 3. `sixhound.toml` (git-tracked, project config)
//! 4. `~/.config/sixhound/config.toml` (user defaults)
//! 5. Built-in defaults (lowest precedence)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main sixhound configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SixhoundConfig {
    pub storage: StorageConfig,
    pub scanning: ScanningConfig,
    pub alias: AliasConfig,
    pub fanout: FanOutConfig,
    pub filter: FilterConfig,
    pub housekeeping: HousekeepingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the artifact directories and fixed-path files.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".sixhound/data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Candidates requested from the cluster model per generation stage.
    pub generate_address_count: usize,
    /// Network scanned when no target network file exists. The default is
    /// the global-unicast scope.
    pub target_network: String,
    /// External scanner binary.
    pub prober_command: String,
    /// Scanner argument template; `{input}` and `{output}` are replaced
    /// per invocation.
    pub prober_args: Vec<String>,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            generate_address_count: 1_000_000,
            target_network: "2000::/3".to_string(),
            prober_command: "zmapv6".to_string(),
            prober_args: vec![
                "--probe-module=icmp6_echoscan".to_string(),
                "--ipv6-target-file={input}".to_string(),
                "--output-file={output}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasConfig {
    /// Prefix-length floor of the alias boundary search.
    pub alias_left_index_start: u8,
    /// Duplicates per probe in boundary-search scans.
    pub alias_duplicate_scan_count: usize,
    /// Random addresses probed per network in the is-aliased test.
    pub network_ping_count: usize,
    /// Fraction of probes that must respond for a network to count as
    /// aliased.
    pub network_blacklist_percent: f64,
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            alias_left_index_start: 16,
            alias_duplicate_scan_count: 3,
            network_ping_count: 1024,
            network_blacklist_percent: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanOutConfig {
    /// First nybble index varied by the nybble-adjacent stage.
    pub nybble_fanout_from: usize,
    /// One past the last nybble index varied.
    pub nybble_fanout_to: usize,
    /// /64 networks walked on each side of a live address.
    pub slash64_radius: u64,
    /// Host addresses probed per neighboring /64.
    pub slash64_host_count: u64,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            nybble_fanout_from: 24,
            nybble_fanout_to: 32,
            slash64_radius: 2,
            slash64_host_count: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Bloom filter size in bits.
    pub address_filter_size: u64,
    /// Bloom filter hash count.
    pub address_filter_hash_count: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            address_filter_size: 250_000_000,
            address_filter_hash_count: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    /// Whether the cleanup stage prunes old artifacts.
    pub cleanup_enabled: bool,
    /// Files kept per artifact directory by the cleanup stage.
    pub cleanup_keep_count: usize,
    /// Treat a missing stage timer as fatal.
    pub exit_on_failed_metrics: bool,
    /// Progress-log emission frequency for long loops.
    pub log_loop_emit_freq: usize,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            cleanup_enabled: true,
            cleanup_keep_count: 4,
            exit_on_failed_metrics: false,
            log_loop_emit_freq: 250_000,
        }
    }
}

impl SixhoundConfig {
    /// Resolves relative paths against the project directory.
    pub fn resolve_paths(&mut self, project_dir: &Path) {
        if self.storage.data_dir.is_relative() {
            self.storage.data_dir = project_dir.join(&self.storage.data_dir);
        }
    }
}
