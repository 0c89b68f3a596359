//! Aliased-network boundary detection.
//!
//! An *aliased* network is a CIDR range in which some upstream device
//! answers pings for every address. The detector works in two phases:
//!
//! 1. **Is-aliased test**: probe `network_ping_count` uniform-random
//!    addresses inside a candidate range; the range is aliased when the
//!    response count reaches `floor(network_ping_count ×
//!    network_blacklist_percent)`.
//! 2. **Boundary search**: per seed address, bisect over prefix lengths
//!    `[lo, hi]` (`lo` starts at the configured search floor, `hi` at the
//!    input prefix). Each round probes the seed with every bit between the
//!    midpoint boundary and `hi` complemented; a responsive probe advances
//!    `lo = mid + 1`, an unresponsive one retracts `hi = mid`. The search
//!    terminates when `lo == hi`, and the aliased network is the seed
//!    masked to that boundary.
//!
//! All seeds are searched jointly: every round emits the probes of all
//! unresolved seeds in a single scanner invocation, each duplicated
//! `alias_duplicate_scan_count` times to tolerate probe loss (a probe
//! counts as responsive if any duplicate replied).

use std::collections::HashSet;
use std::net::Ipv6Addr;
use std::path::PathBuf;

use rand::RngCore;

use sixhound_addr::{flip_bits, read_hex_file, write_hex_file, Network};

use crate::model::host_mask;
use crate::probe::Prober;
use crate::ScanError;

/// Tunables for alias detection.
#[derive(Debug, Clone, Copy)]
pub struct AliasSettings {
    /// Prefix-length floor of the boundary search.
    pub left_index_start: u8,
    /// How many times each probe is duplicated per scan round.
    pub duplicate_scan_count: usize,
    /// Random addresses probed per network in the is-aliased test.
    pub network_ping_count: usize,
    /// Fraction of probes that must respond for a network to count as
    /// aliased.
    pub network_blacklist_percent: f64,
}

/// Bisection state for one seed address.
///
/// `lo` and `hi` are prefix-length bounds with `lo <= hi`; the state is
/// terminal when they meet, and the boundary is then `lo`.
#[derive(Debug, Clone)]
pub struct AliasCheckState {
    seed: Ipv6Addr,
    lo: u8,
    hi: u8,
    probe: Option<Ipv6Addr>,
}

impl AliasCheckState {
    fn new(seed: Ipv6Addr, lo: u8, hi: u8) -> Result<Self, ScanError> {
        if lo > hi {
            return Err(ScanError::InvertedBounds { lo, hi });
        }
        Ok(Self {
            seed,
            lo,
            hi,
            probe: None,
        })
    }

    /// True when the boundary has been pinned down.
    pub fn is_terminal(&self) -> bool {
        self.lo == self.hi
    }

    fn mid(&self) -> u8 {
        ((u16::from(self.lo) + u16::from(self.hi)) / 2) as u8
    }

    /// Builds this round's probe: the seed with every bit between the
    /// midpoint boundary and `hi` complemented. The probe shares its top
    /// `mid` bits with the seed and differs in everything up to `hi`.
    fn generate_probe(&mut self) -> Option<Ipv6Addr> {
        if self.is_terminal() {
            self.probe = None;
            return None;
        }
        let mid = self.mid();
        debug_assert!(mid < self.hi);
        let probe = flip_bits(self.seed, mid, self.hi - 1)
            .expect("bounds were validated at construction");
        self.probe = Some(probe);
        Some(probe)
    }

    fn apply(&mut self, responding: &HashSet<Ipv6Addr>) {
        let Some(probe) = self.probe.take() else {
            return;
        };
        let mid = self.mid();
        if responding.contains(&probe) {
            self.lo = mid + 1;
        } else {
            self.hi = mid;
        }
        debug_assert!(self.lo <= self.hi);
    }

    /// The resolved prefix-length boundary, once terminal.
    pub fn boundary(&self) -> Option<u8> {
        self.is_terminal().then_some(self.lo)
    }

    /// The detected aliased network: the seed masked to the boundary.
    pub fn aliased_network(&self) -> Option<Network> {
        self.boundary().map(|prefix| {
            Network::new(self.seed, prefix).expect("boundary never exceeds the input prefix")
        })
    }
}

/// Joint bisection over a set of seed addresses.
#[derive(Debug, Clone)]
pub struct AliasCheckStates {
    states: Vec<AliasCheckState>,
}

impl AliasCheckStates {
    pub fn new(seeds: &[Ipv6Addr], lo: u8, hi: u8) -> Result<Self, ScanError> {
        let states = seeds
            .iter()
            .map(|&seed| AliasCheckState::new(seed, lo, hi))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { states })
    }

    /// This round's probe addresses, one per unresolved seed.
    pub fn test_addresses(&mut self) -> Vec<Ipv6Addr> {
        self.states
            .iter_mut()
            .filter_map(AliasCheckState::generate_probe)
            .collect()
    }

    /// Advances every unresolved seed with this round's responses.
    pub fn update(&mut self, responding: &HashSet<Ipv6Addr>) {
        for state in &mut self.states {
            state.apply(responding);
        }
    }

    /// True when every seed's boundary is resolved.
    pub fn all_found(&self) -> bool {
        self.states.iter().all(AliasCheckState::is_terminal)
    }

    /// The detected networks, deduplicated, in seed order.
    pub fn aliased_networks(&self) -> Vec<Network> {
        let mut seen = HashSet::new();
        self.states
            .iter()
            .filter_map(AliasCheckState::aliased_network)
            .filter(|network| seen.insert(*network))
            .collect()
    }

    fn log_states(&self) {
        for state in &self.states {
            tracing::debug!(
                seed = %state.seed,
                lo = state.lo,
                hi = state.hi,
                terminal = state.is_terminal(),
                "alias check state"
            );
        }
    }
}

/// Generates `count` uniform-random addresses inside `network`.
pub fn random_addresses_in(
    network: &Network,
    count: usize,
    rng: &mut impl RngCore,
) -> Vec<Ipv6Addr> {
    let base = u128::from(network.addr());
    let mask = host_mask(network.prefix_len());
    (0..count)
        .map(|_| {
            let host = ((u128::from(rng.next_u64()) << 64) | u128::from(rng.next_u64())) & mask;
            Ipv6Addr::from(base | host)
        })
        .collect()
}

/// Drives alias detection against a [`Prober`].
///
/// Probe rounds are materialized as artifact files: the caller supplies a
/// path factory yielding a fresh `(targets, results)` pair per scanner
/// invocation, so every round remains on disk for inspection.
pub struct AliasSeeker<'a> {
    prober: &'a dyn Prober,
    settings: AliasSettings,
}

impl<'a> AliasSeeker<'a> {
    pub fn new(prober: &'a dyn Prober, settings: AliasSettings) -> Self {
        Self { prober, settings }
    }

    /// Runs the is-aliased test over a batch of candidate networks.
    ///
    /// One scanner invocation covers the whole batch; each network's
    /// response count is taken over its own probe addresses. For each
    /// network the result is `Some(seed)` — the first generated probe
    /// address, usable as the boundary-search seed — when the response
    /// count reaches the threshold, `None` otherwise.
    pub fn check_networks_aliased(
        &self,
        networks: &[Network],
        rng: &mut impl RngCore,
        next_paths: &mut dyn FnMut() -> Result<(PathBuf, PathBuf), ScanError>,
    ) -> Result<Vec<Option<Ipv6Addr>>, ScanError> {
        if networks.is_empty() || self.settings.network_ping_count == 0 {
            return Ok(vec![None; networks.len()]);
        }
        let per_network: Vec<Vec<Ipv6Addr>> = networks
            .iter()
            .map(|network| random_addresses_in(network, self.settings.network_ping_count, rng))
            .collect();
        let all: Vec<Ipv6Addr> = per_network.iter().flatten().copied().collect();

        let (targets, results) = next_paths()?;
        write_hex_file(&targets, &all)?;
        self.prober.scan(&targets, &results)?;
        let responding: HashSet<Ipv6Addr> = read_hex_file(&results)?.into_iter().collect();

        let threshold = (self.settings.network_ping_count as f64
            * self.settings.network_blacklist_percent) as usize;
        tracing::info!(
            networks = networks.len(),
            threshold,
            responded = responding.len(),
            "aliased-network pre-test complete"
        );

        Ok(per_network
            .iter()
            .map(|probes| {
                let responded = probes
                    .iter()
                    .filter(|probe| responding.contains(probe))
                    .count();
                if responded >= threshold {
                    Some(probes[0])
                } else {
                    None
                }
            })
            .collect())
    }

    /// Bisects the aliased boundary for every seed jointly.
    ///
    /// Each seed is known to lie in an aliased network whose prefix is at
    /// most `input_prefix`; the search floor is the configured
    /// `left_index_start` (clamped to the input prefix).
    pub fn seek(
        &self,
        seeds: &[Ipv6Addr],
        input_prefix: u8,
        next_paths: &mut dyn FnMut() -> Result<(PathBuf, PathBuf), ScanError>,
    ) -> Result<Vec<Network>, ScanError> {
        let lo = self.settings.left_index_start.min(input_prefix);
        let mut states = AliasCheckStates::new(seeds, lo, input_prefix)?;
        let duplicates = self.settings.duplicate_scan_count.max(1);
        let mut rounds = 0usize;

        loop {
            let probes = states.test_addresses();
            if probes.is_empty() {
                if states.all_found() {
                    break;
                }
                return Err(ScanError::EmptyProbeSet);
            }
            let mut scan_targets = Vec::with_capacity(probes.len() * duplicates);
            for probe in &probes {
                for _ in 0..duplicates {
                    scan_targets.push(*probe);
                }
            }

            let (targets, results) = next_paths()?;
            write_hex_file(&targets, &scan_targets)?;
            tracing::debug!(
                round = rounds,
                probes = probes.len(),
                duplicated = scan_targets.len(),
                targets = %targets.display(),
                "running alias boundary scan"
            );
            self.prober.scan(&targets, &results)?;
            let responding: HashSet<Ipv6Addr> = read_hex_file(&results)?.into_iter().collect();

            states.update(&responding);
            states.log_states();
            rounds += 1;
        }

        let networks = states.aliased_networks();
        tracing::info!(
            rounds,
            networks = networks.len(),
            "alias boundary search complete"
        );
        Ok(networks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ScriptedProber;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::Cell;
    use std::rc::Rc;
    use tempfile::TempDir;

    fn settings() -> AliasSettings {
        AliasSettings {
            left_index_start: 16,
            duplicate_scan_count: 3,
            network_ping_count: 4,
            network_blacklist_percent: 0.5,
        }
    }

    fn path_factory(dir: &TempDir) -> impl FnMut() -> Result<(PathBuf, PathBuf), ScanError> + '_ {
        let counter = Cell::new(0u32);
        move || {
            let n = counter.get();
            counter.set(n + 1);
            Ok((
                dir.path().join(format!("targets-{n:04}")),
                dir.path().join(format!("results-{n:04}")),
            ))
        }
    }

    #[test]
    fn fully_responsive_range_resolves_to_input_prefix() {
        let dir = TempDir::new().unwrap();
        let rounds = Rc::new(Cell::new(0usize));
        let rounds_seen = rounds.clone();
        let prober = ScriptedProber::new(move |targets: &[Ipv6Addr]| {
            rounds_seen.set(rounds_seen.get() + 1);
            targets.to_vec()
        });
        let seeker = AliasSeeker::new(&prober, settings());

        let seed: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let mut paths = path_factory(&dir);
        let networks = seeker.seek(&[seed], 32, &mut paths).unwrap();

        assert_eq!(networks, vec!["2001:db8::/32".parse().unwrap()]);
        // ceil(log2(32 - 16)) bisection rounds.
        assert_eq!(rounds.get(), 4);
    }

    #[test]
    fn fully_unresponsive_range_resolves_to_search_floor() {
        let dir = TempDir::new().unwrap();
        let prober = ScriptedProber::new(|_: &[Ipv6Addr]| Vec::new());
        let seeker = AliasSeeker::new(&prober, settings());

        let seed: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let mut paths = path_factory(&dir);
        let networks = seeker.seek(&[seed], 32, &mut paths).unwrap();

        assert_eq!(networks, vec!["2001::/16".parse().unwrap()]);
    }

    #[test]
    fn probes_are_duplicated_per_round() {
        let dir = TempDir::new().unwrap();
        let sizes = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sizes_seen = sizes.clone();
        let prober = ScriptedProber::new(move |targets: &[Ipv6Addr]| {
            sizes_seen.borrow_mut().push(targets.len());
            targets.to_vec()
        });
        let seeker = AliasSeeker::new(&prober, settings());

        let seeds: Vec<Ipv6Addr> =
            vec!["2001:db8::1".parse().unwrap(), "2600:9000::1".parse().unwrap()];
        let mut paths = path_factory(&dir);
        seeker.seek(&seeds, 32, &mut paths).unwrap();

        let sizes = sizes.borrow();
        // Two unresolved seeds, each probe tripled, on the first round.
        assert_eq!(sizes[0], 6);
        assert!(sizes.iter().all(|size| size % 3 == 0));
    }

    #[test]
    fn joint_search_resolves_seeds_independently() {
        let dir = TempDir::new().unwrap();
        // Probes of a seed always stay inside the seed's /16, so a
        // responder keyed on 2001::/16 answers every probe of the first
        // seed and none of the second.
        let responsive: Network = "2001::/16".parse().unwrap();
        let prober = ScriptedProber::new(move |targets: &[Ipv6Addr]| {
            targets
                .iter()
                .copied()
                .filter(|t| responsive.contains(*t))
                .collect()
        });
        let seeker = AliasSeeker::new(&prober, settings());

        let seeds: Vec<Ipv6Addr> =
            vec!["2001:db8::1".parse().unwrap(), "2600:9000::1".parse().unwrap()];
        let mut paths = path_factory(&dir);
        let networks = seeker.seek(&seeds, 32, &mut paths).unwrap();

        assert!(networks.contains(&"2001:db8::/32".parse().unwrap()));
        assert!(networks.contains(&"2600::/16".parse().unwrap()));
    }

    #[test]
    fn pre_test_detects_aliased_networks_at_threshold() {
        let dir = TempDir::new().unwrap();
        // Threshold is floor(4 * 0.5) = 2 responses.
        let aliased: Network = "2001:db8::/32".parse().unwrap();
        let prober = ScriptedProber::new(move |targets: &[Ipv6Addr]| {
            targets
                .iter()
                .copied()
                .filter(|t| aliased.contains(*t))
                .take(2)
                .collect()
        });
        let seeker = AliasSeeker::new(&prober, settings());

        let networks: Vec<Network> =
            vec!["2001:db8::/32".parse().unwrap(), "2600:9000::/32".parse().unwrap()];
        let mut rng = StdRng::seed_from_u64(7);
        let mut paths = path_factory(&dir);
        let outcomes = seeker
            .check_networks_aliased(&networks, &mut rng, &mut paths)
            .unwrap();

        assert!(outcomes[0].is_some());
        assert!(networks[0].contains(outcomes[0].unwrap()));
        assert!(outcomes[1].is_none());
    }

    #[test]
    fn pre_test_below_threshold_is_not_aliased() {
        let dir = TempDir::new().unwrap();
        let prober = ScriptedProber::new(|targets: &[Ipv6Addr]| {
            targets.iter().copied().take(1).collect()
        });
        let seeker = AliasSeeker::new(&prober, settings());

        let networks: Vec<Network> = vec!["2001:db8::/32".parse().unwrap()];
        let mut rng = StdRng::seed_from_u64(7);
        let mut paths = path_factory(&dir);
        let outcomes = seeker
            .check_networks_aliased(&networks, &mut rng, &mut paths)
            .unwrap();
        assert_eq!(outcomes, vec![None]);
    }

    #[test]
    fn probe_failure_aborts_the_search() {
        let dir = TempDir::new().unwrap();
        struct FailingProber;
        impl Prober for FailingProber {
            fn scan(&self, _: &std::path::Path, _: &std::path::Path) -> Result<usize, ScanError> {
                Err(ScanError::ProbeFailed {
                    reason: "scanner crashed".to_string(),
                })
            }
        }
        let prober = FailingProber;
        let seeker = AliasSeeker::new(&prober, settings());
        let mut paths = path_factory(&dir);
        let err = seeker
            .seek(&["2001:db8::1".parse().unwrap()], 32, &mut paths)
            .unwrap_err();
        assert!(matches!(err, ScanError::ProbeFailed { .. }));
    }
}
