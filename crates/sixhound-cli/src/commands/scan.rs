//! Scan command - runs the discovery pipeline indefinitely.

use anyhow::{Context, Result};
use sixhound_addr::Network;
use sixhound_pipeline::Pipeline;

pub fn run(project_dir: &str, target: Option<&str>) -> Result<()> {
    let config = super::load_config(project_dir)?;
    let (store, prober) = super::build_runtime(&config);

    if let Some(cidr) = target {
        let network: Network = cidr
            .parse()
            .with_context(|| format!("'{cidr}' is not a valid IPv6 CIDR range"))?;
        store
            .bootstrap()
            .context("Failed to prepare data directories")?;
        store
            .write_target_network(&network)
            .context("Failed to persist the target network")?;
        tracing::info!(target = %network, "target network updated");
    }

    let mut pipeline = Pipeline::new(store, config, Box::new(prober))
        .context("Failed to initialize the pipeline")?;

    // Runs until a stage fails; the persisted state byte resumes the
    // failed stage on the next invocation.
    pipeline.run().context("Pipeline aborted")
}
