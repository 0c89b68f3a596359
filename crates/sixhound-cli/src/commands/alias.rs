//! Alias command - tests one CIDR range for aliasing and locates the
//! aliased boundary.

use anyhow::{bail, Context, Result};
use sixhound_addr::Network;
use sixhound_scan::{AliasSeeker, AliasSettings, ScanError};
use sixhound_store::ArtifactKind;

pub fn run(project_dir: &str, cidr: &str) -> Result<()> {
    let config = super::load_config(project_dir)?;
    let (mut store, prober) = super::build_runtime(&config);
    store.bootstrap().context("Failed to prepare data directories")?;

    let network: Network = cidr
        .parse()
        .with_context(|| format!("'{cidr}' is not a valid IPv6 CIDR range"))?;

    let settings = AliasSettings {
        left_index_start: config.alias.alias_left_index_start,
        duplicate_scan_count: config.alias.alias_duplicate_scan_count,
        network_ping_count: config.alias.network_ping_count,
        network_blacklist_percent: config.alias.network_blacklist_percent,
    };
    let seeker = AliasSeeker::new(&prober, settings);

    let mut next_paths = || {
        let targets = store
            .new_path(ArtifactKind::ProbeTargets)
            .map_err(|e| ScanError::Io(std::io::Error::other(e)))?;
        let results = store
            .new_path(ArtifactKind::ProbeResults)
            .map_err(|e| ScanError::Io(std::io::Error::other(e)))?;
        Ok((targets, results))
    };

    tracing::info!(network = %network, "checking range for aliased behavior");
    let mut rng = rand::thread_rng();
    let outcomes = seeker
        .check_networks_aliased(&[network], &mut rng, &mut next_paths)
        .context("Is-aliased test failed")?;

    let Some(seed) = outcomes.into_iter().next().flatten() else {
        bail!(
            "{network} does not appear to be aliased under the current \
             settings (ping count {}, threshold {}%)",
            config.alias.network_ping_count,
            config.alias.network_blacklist_percent * 100.0
        );
    };

    tracing::info!(seed = %seed, "range is aliased, seeking the boundary");
    let networks = seeker
        .seek(&[seed], network.prefix_len(), &mut next_paths)
        .context("Boundary search failed")?;

    for found in networks {
        println!("{found}");
    }
    Ok(())
}
