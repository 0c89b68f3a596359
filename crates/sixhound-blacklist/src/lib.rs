//! Aliased-network blacklist.
//!
//! A [`NetworkBlacklist`] is an unordered set of CIDR networks whose
//! addresses must be excluded from scan results because an upstream device
//! answers probes on their behalf. Two invariants hold at all times:
//!
//! - no member network overlaps another: [`NetworkBlacklist::insert`]
//!   drops an incoming network that is already covered and absorbs any
//!   members the incoming network covers
//! - serialization is the count-prefixed 17-byte network stream; loading
//!   re-enforces non-overlap and rejects violating streams
//!
//! # Representation
//!
//! Canonical network numbers bucketed by prefix length
//! (`HashMap<u8, HashSet<u128>>` plus a sorted prefix list).
//! `contains` costs one hash probe per distinct prefix length present —
//! O(P) with P ≤ 129 and single digits in practice. `insert` is O(1) for
//! the covered check plus a sweep of the longer-prefix buckets to absorb
//! contained members.

use std::collections::{HashMap, HashSet};
use std::net::Ipv6Addr;
use std::path::Path;

use thiserror::Error;

use sixhound_addr::{read_networks_file, write_networks_file, AddrError, Network};

/// Errors produced by blacklist loading and serialization.
#[derive(Debug, Error)]
pub enum BlacklistError {
    #[error("blacklist entries overlap: {outer} covers {inner}")]
    Overlap { outer: Network, inner: Network },

    #[error(transparent)]
    Addr(#[from] AddrError),
}

/// A non-overlapping set of blacklisted networks.
#[derive(Debug, Clone, Default)]
pub struct NetworkBlacklist {
    by_prefix: HashMap<u8, HashSet<u128>>,
    /// Distinct prefix lengths present, ascending.
    prefixes: Vec<u8>,
    count: usize,
}

impl NetworkBlacklist {
    /// Creates an empty blacklist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a blacklist from networks, enforcing non-overlap by
    /// insertion order (later covering networks absorb earlier members).
    pub fn from_networks(networks: impl IntoIterator<Item = Network>) -> Self {
        let mut blacklist = Self::new();
        for network in networks {
            blacklist.insert(network);
        }
        blacklist
    }

    /// Number of member networks.
    pub fn len(&self) -> usize {
        self.count
    }

    /// True when no networks are blacklisted.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True iff some member network contains `addr`.
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        self.covering(addr).is_some()
    }

    /// The member network containing `addr`, if any. At most one exists
    /// thanks to the non-overlap invariant.
    pub fn covering(&self, addr: Ipv6Addr) -> Option<Network> {
        let value = u128::from(addr);
        for &prefix in &self.prefixes {
            let masked = value & prefix_mask(prefix);
            if self
                .by_prefix
                .get(&prefix)
                .is_some_and(|bucket| bucket.contains(&masked))
            {
                return Some(
                    Network::new(Ipv6Addr::from(masked), prefix)
                        .expect("stored prefixes are always <= 128"),
                );
            }
        }
        None
    }

    /// Inserts a network, maintaining the non-overlap invariant.
    ///
    /// Returns `false` when the network was dropped because a member
    /// already covers it (including an exact duplicate). Members covered
    /// by the incoming network are removed before it is added.
    pub fn insert(&mut self, network: Network) -> bool {
        let value = u128::from(network.addr());

        // Already covered (or duplicate) -> drop the incomer.
        for &prefix in &self.prefixes {
            if prefix > network.prefix_len() {
                break;
            }
            let masked = value & prefix_mask(prefix);
            if self
                .by_prefix
                .get(&prefix)
                .is_some_and(|bucket| bucket.contains(&masked))
            {
                return false;
            }
        }

        // Absorb members the incomer covers.
        let longer: Vec<u8> = self
            .prefixes
            .iter()
            .copied()
            .filter(|&p| p > network.prefix_len())
            .collect();
        for prefix in longer {
            let bucket = self
                .by_prefix
                .get_mut(&prefix)
                .expect("prefix list mirrors bucket keys");
            let before = bucket.len();
            bucket.retain(|&member| member & prefix_mask(network.prefix_len()) != value);
            self.count -= before - bucket.len();
            if bucket.is_empty() {
                self.by_prefix.remove(&prefix);
                self.prefixes.retain(|&p| p != prefix);
            }
        }

        let bucket = self.by_prefix.entry(network.prefix_len()).or_default();
        if bucket.is_empty() {
            self.prefixes.push(network.prefix_len());
            self.prefixes.sort_unstable();
        }
        bucket.insert(value);
        self.count += 1;
        true
    }

    /// Filters `addrs`, keeping only addresses no member network contains.
    /// Order is preserved. Emits a debug progress line every `emit_freq`
    /// elements.
    pub fn clean(&self, addrs: &[Ipv6Addr], emit_freq: usize) -> Vec<Ipv6Addr> {
        let mut out = Vec::with_capacity(addrs.len());
        for (i, addr) in addrs.iter().enumerate() {
            if emit_freq > 0 && i % emit_freq == 0 && i > 0 {
                tracing::debug!(
                    processed = i,
                    total = addrs.len(),
                    kept = out.len(),
                    "cleaning addresses against blacklist"
                );
            }
            if !self.contains(*addr) {
                out.push(*addr);
            }
        }
        out
    }

    /// Member networks in deterministic order (prefix length, then
    /// network number). Insertion order is not preserved.
    pub fn networks(&self) -> Vec<Network> {
        let mut out = Vec::with_capacity(self.count);
        for &prefix in &self.prefixes {
            let mut values: Vec<u128> = self.by_prefix[&prefix].iter().copied().collect();
            values.sort_unstable();
            for value in values {
                out.push(
                    Network::new(Ipv6Addr::from(value), prefix)
                        .expect("stored prefixes are always <= 128"),
                );
            }
        }
        out
    }

    /// Builds a blacklist from a stream of networks, rejecting any strict
    /// overlap between distinct records. Exact duplicates are tolerated.
    pub fn from_networks_strict(
        networks: impl IntoIterator<Item = Network>,
    ) -> Result<Self, BlacklistError> {
        let mut blacklist = Self::new();
        for network in networks {
            // Locate the conflicting member before mutating, so the error
            // can name both ranges.
            if let Some(existing) = blacklist.covering(network.addr()) {
                if existing == network {
                    continue;
                }
                let (outer, inner) = if existing.prefix_len() <= network.prefix_len() {
                    (existing, network)
                } else {
                    (network, existing)
                };
                return Err(BlacklistError::Overlap { outer, inner });
            }
            let value = u128::from(network.addr());
            if let Some(inner) = blacklist
                .networks()
                .into_iter()
                .find(|member| member.prefix_len() > network.prefix_len()
                    && u128::from(member.addr()) & prefix_mask(network.prefix_len()) == value)
            {
                return Err(BlacklistError::Overlap {
                    outer: network,
                    inner,
                });
            }
            blacklist.insert(network);
        }
        Ok(blacklist)
    }

    /// Loads a blacklist file, enforcing the non-overlap invariant.
    pub fn read_from(path: &Path) -> Result<Self, BlacklistError> {
        let networks = read_networks_file(path)?;
        let blacklist = Self::from_networks_strict(networks)?;
        tracing::debug!(
            path = %path.display(),
            networks = blacklist.len(),
            "loaded network blacklist"
        );
        Ok(blacklist)
    }

    /// Writes the blacklist in the count-prefixed stream format.
    pub fn write_to(&self, path: &Path) -> Result<(), BlacklistError> {
        write_networks_file(path, &self.networks())?;
        Ok(())
    }
}

fn prefix_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn net(s: &str) -> Network {
        s.parse().unwrap()
    }

    #[test]
    fn contains_and_clean_agree() {
        let blacklist = NetworkBlacklist::from_networks([net("2001:db8::/32")]);
        for a in ["2001:db8::1", "2001:db9::1", "::1"] {
            let a = addr(a);
            let cleaned = blacklist.clean(&[a], 0);
            assert_eq!(cleaned == vec![a], !blacklist.contains(a));
        }
    }

    #[test]
    fn clean_preserves_order() {
        let blacklist = NetworkBlacklist::from_networks([net("2001:db8::/32")]);
        let input = vec![addr("2001:db8::1"), addr("2001:db9::1")];
        assert_eq!(blacklist.clean(&input, 0), vec![addr("2001:db9::1")]);
    }

    #[test]
    fn insert_drops_covered_networks() {
        let mut blacklist = NetworkBlacklist::from_networks([net("2001:db8::/32")]);
        assert!(!blacklist.insert(net("2001:db8:1::/48")));
        assert!(!blacklist.insert(net("2001:db8::/32")));
        assert_eq!(blacklist.len(), 1);
    }

    #[test]
    fn insert_absorbs_contained_networks() {
        let mut blacklist =
            NetworkBlacklist::from_networks([net("2001:db8:1::/48"), net("2001:db8:2::/48")]);
        assert_eq!(blacklist.len(), 2);
        assert!(blacklist.insert(net("2001:db8::/32")));
        assert_eq!(blacklist.len(), 1);
        assert_eq!(blacklist.networks(), vec![net("2001:db8::/32")]);
        assert!(blacklist.contains(addr("2001:db8:1::1")));
    }

    #[test]
    fn covering_names_the_member() {
        let blacklist =
            NetworkBlacklist::from_networks([net("2001:db8::/32"), net("fe80::/10")]);
        assert_eq!(blacklist.covering(addr("2001:db8::1")), Some(net("2001:db8::/32")));
        assert_eq!(blacklist.covering(addr("2001:db9::1")), None);
    }

    #[test]
    fn serialization_preserves_contained_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist.bin");
        let blacklist = NetworkBlacklist::from_networks([
            net("2001:db8::/32"),
            net("2400:cb00::/32"),
            net("fe80::/10"),
        ]);
        blacklist.write_to(&path).unwrap();
        let loaded = NetworkBlacklist::read_from(&path).unwrap();
        assert_eq!(loaded.networks(), blacklist.networks());
        for a in ["2001:db8::1", "2400:cb00:dead::1", "fe80::1", "2001:db9::1"] {
            assert_eq!(loaded.contains(addr(a)), blacklist.contains(addr(a)));
        }
    }

    #[test]
    fn strict_load_rejects_overlap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist.bin");
        sixhound_addr::write_networks_file(
            &path,
            &[net("2001:db8::/32"), net("2001:db8:1::/48")],
        )
        .unwrap();
        assert!(matches!(
            NetworkBlacklist::read_from(&path),
            Err(BlacklistError::Overlap { .. })
        ));
    }

    #[test]
    fn strict_load_tolerates_exact_duplicates() {
        let loaded = NetworkBlacklist::from_networks_strict([
            net("2001:db8::/32"),
            net("2001:db8::/32"),
        ])
        .unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
