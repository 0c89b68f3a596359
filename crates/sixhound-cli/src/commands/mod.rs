//! Subcommand implementations.

pub mod alias;
pub mod clean;
pub mod scan;

use anyhow::{Context, Result};
use sixhound_config::{ConfigLoader, SixhoundConfig};
use sixhound_scan::CommandProber;
use sixhound_store::ArtifactStore;

/// Loads the layered configuration for a project directory.
pub fn load_config(project_dir: &str) -> Result<SixhoundConfig> {
    ConfigLoader::new()
        .with_project_dir(project_dir)
        .load()
        .context("Failed to load configuration")
}

/// Builds the artifact store and external prober from a configuration.
pub fn build_runtime(config: &SixhoundConfig) -> (ArtifactStore, CommandProber) {
    let store = ArtifactStore::new(&config.storage.data_dir);
    let prober = CommandProber::new(
        config.scanning.prober_command.clone(),
        config.scanning.prober_args.clone(),
    );
    (store, prober)
}
