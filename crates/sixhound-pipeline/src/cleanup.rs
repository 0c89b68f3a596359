//! The post-scan cleanup subroutine shared by the three alias-removal
//! stages.
//!
//! Operates on the newest scan batch only: (a) group results into /64
//! ranges, (b) run the alias detector over the groups, (c) merge the
//! confirmed networks into the blacklist, (d) persist blacklist and
//! aliased networks, (e) blacklist-filter the scan results into the
//! cleaned artifact, (f) union the cleaned set into the cumulative output
//! through the Bloom filter.

use std::collections::HashSet;
use std::net::Ipv6Addr;

use sixhound_addr::{write_binary_file, write_networks_file, Network};
use sixhound_scan::{AliasSeeker, AliasSettings, ScanError};
use sixhound_store::ArtifactKind;

use crate::driver::Pipeline;
use crate::PipelineError;

/// The unique /64 networks containing `addrs`, first occurrence first.
fn group_into_slash64s(addrs: &[Ipv6Addr]) -> Vec<Network> {
    let mut seen = HashSet::new();
    addrs
        .iter()
        .map(|&addr| Network::slash64(addr))
        .filter(|network| seen.insert(*network))
        .collect()
}

impl Pipeline {
    pub(crate) fn post_scan_cleanup(&mut self) -> Result<(), PipelineError> {
        let scan_addrs = (*self.store.load_scan_results()?).clone();
        tracing::info!(addresses = scan_addrs.len(), "post-scan cleanup starting");

        // (a) Group the batch into /64 ranges.
        let groups = group_into_slash64s(&scan_addrs);
        let groups_path = self.store.new_path(ArtifactKind::NetworkGroups)?;
        write_networks_file(&groups_path, &groups)?;
        self.store.update_network_groups(groups_path, groups.clone());

        // (b) Seek aliased networks among the groups.
        let aliased = self.detect_aliased_networks(&groups)?;
        let aliased_path = self.store.new_path(ArtifactKind::AliasedNetworks)?;
        write_networks_file(&aliased_path, &aliased)?;
        self.store
            .update_aliased_networks(aliased_path, aliased.clone());

        // (c, d) Merge into the blacklist and persist it.
        let current = self.store.load_blacklist()?;
        let mut merged = (*current).clone();
        let mut added = 0usize;
        for network in &aliased {
            if merged.insert(*network) {
                added += 1;
            }
        }
        let blacklist_path = self.store.new_path(ArtifactKind::Blacklist)?;
        merged.write_to(&blacklist_path)?;
        tracing::info!(
            aliased = aliased.len(),
            added,
            blacklist = merged.len(),
            "blacklist updated"
        );

        // (e) Filter the batch and persist the cleaned results.
        let emit_freq = self.config.housekeeping.log_loop_emit_freq;
        let cleaned = merged.clean(&scan_addrs, emit_freq);
        self.store.update_blacklist(blacklist_path, merged);
        let cleaned_path = self.store.new_path(ArtifactKind::CleanPingResults)?;
        write_binary_file(&cleaned_path, &cleaned)?;
        tracing::info!(
            kept = cleaned.len(),
            removed = scan_addrs.len() - cleaned.len(),
            "scan results cleaned"
        );
        self.store.update_clean_results(cleaned_path, cleaned.clone());

        // (f) Union into the cumulative output, deduped by the filter.
        let filter = self.store.load_bloom(
            self.config.filter.address_filter_size,
            self.config.filter.address_filter_hash_count,
            emit_freq,
        )?;
        let mut filter = (*filter).clone();
        let mut fresh = Vec::new();
        for addr in &cleaned {
            if !filter.contains(*addr) {
                filter.add(*addr);
                fresh.push(*addr);
            }
        }
        self.store.append_output(&fresh)?;
        let filter_path = self.store.new_path(ArtifactKind::BloomFilter)?;
        filter.write_to(&filter_path)?;
        self.store.update_bloom(filter_path, filter);
        tracing::info!(new_addresses = fresh.len(), "cumulative output updated");
        Ok(())
    }

    /// Runs the alias detector over /64 groups: a batched is-aliased
    /// pre-test, then a joint boundary search for the groups that passed.
    fn detect_aliased_networks(
        &mut self,
        groups: &[Network],
    ) -> Result<Vec<Network>, PipelineError> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let settings = AliasSettings {
            left_index_start: self.config.alias.alias_left_index_start,
            duplicate_scan_count: self.config.alias.alias_duplicate_scan_count,
            network_ping_count: self.config.alias.network_ping_count,
            network_blacklist_percent: self.config.alias.network_blacklist_percent,
        };

        // The seeker borrows the prober while the path factory borrows
        // the store, so split the field borrows up front.
        let store = &mut self.store;
        let seeker = AliasSeeker::new(&*self.prober, settings);
        let mut next_paths = || {
            let targets = store
                .new_path(ArtifactKind::ProbeTargets)
                .map_err(|e| ScanError::Io(std::io::Error::other(e)))?;
            let results = store
                .new_path(ArtifactKind::ProbeResults)
                .map_err(|e| ScanError::Io(std::io::Error::other(e)))?;
            Ok((targets, results))
        };

        let mut rng = rand::thread_rng();
        let outcomes = seeker.check_networks_aliased(groups, &mut rng, &mut next_paths)?;
        let seeds: Vec<Ipv6Addr> = outcomes.into_iter().flatten().collect();
        if seeds.is_empty() {
            tracing::info!(groups = groups.len(), "no aliased groups detected");
            return Ok(Vec::new());
        }
        tracing::info!(
            groups = groups.len(),
            aliased = seeds.len(),
            "seeking aliased network boundaries"
        );
        let networks = seeker.seek(&seeds, 64, &mut next_paths)?;
        Ok(networks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_dedupes_and_preserves_order() {
        let addrs: Vec<Ipv6Addr> = vec![
            "2001:db8:0:2::1".parse().unwrap(),
            "2001:db8:0:1::1".parse().unwrap(),
            "2001:db8:0:2::9".parse().unwrap(),
        ];
        let groups = group_into_slash64s(&addrs);
        assert_eq!(
            groups,
            vec![
                "2001:db8:0:2::/64".parse().unwrap(),
                "2001:db8:0:1::/64".parse().unwrap(),
            ]
        );
    }
}
