//! Clean command - filters an address list through the current blacklist.

use std::path::Path;

use anyhow::{Context, Result};
use sixhound_addr::{read_hex_file, unique, write_hex_file};

pub fn run(project_dir: &str, input: &str, output: &str) -> Result<()> {
    let config = super::load_config(project_dir)?;
    let (mut store, _) = super::build_runtime(&config);

    let addrs = read_hex_file(Path::new(input))
        .with_context(|| format!("Failed to read address list '{input}'"))?;
    tracing::info!(addresses = addrs.len(), input, "loaded address list");

    let emit_freq = config.housekeeping.log_loop_emit_freq;
    let uniq = unique(&addrs, emit_freq);
    tracing::info!(
        total = addrs.len(),
        unique = uniq.len(),
        "deduplicated input addresses"
    );

    let blacklist = store
        .load_blacklist()
        .context("Failed to load the blacklist")?;
    let cleaned = blacklist.clean(&uniq, emit_freq);
    tracing::info!(
        kept = cleaned.len(),
        removed = uniq.len() - cleaned.len(),
        blacklist = blacklist.len(),
        "cleaned addresses against blacklist"
    );

    write_hex_file(Path::new(output), &cleaned)
        .with_context(|| format!("Failed to write cleaned list '{output}'"))?;
    tracing::info!(output, "wrote cleaned address list");
    Ok(())
}
