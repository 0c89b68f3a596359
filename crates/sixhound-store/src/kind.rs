//! Artifact kinds and their directory names.

use std::fmt;

/// One kind of timestamped artifact.
///
/// Each kind maps to a directory under the data root; the fixed-path
/// artifacts (cumulative output, state file, target network) are not
/// kinds because they have exactly one file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Candidate addresses awaiting a scan (hex-line).
    CandidateAddresses,
    /// Raw prober output for candidate scans (hex-line).
    ScanResults,
    /// Alias-detection probe batches (hex-line).
    ProbeTargets,
    /// Prober output for alias-detection batches (hex-line).
    ProbeResults,
    /// Scan results grouped into /64 ranges (network stream).
    NetworkGroups,
    /// Networks the alias detector confirmed (network stream).
    AliasedNetworks,
    /// The network blacklist (network stream, non-overlapping).
    Blacklist,
    /// Blacklist-filtered scan results (16-byte binary records).
    CleanPingResults,
    /// The cumulative-output dedup filter (filter binary).
    BloomFilter,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 9] = [
        ArtifactKind::CandidateAddresses,
        ArtifactKind::ScanResults,
        ArtifactKind::ProbeTargets,
        ArtifactKind::ProbeResults,
        ArtifactKind::NetworkGroups,
        ArtifactKind::AliasedNetworks,
        ArtifactKind::Blacklist,
        ArtifactKind::CleanPingResults,
        ArtifactKind::BloomFilter,
    ];

    /// Directory name under the data root.
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::CandidateAddresses => "candidates",
            ArtifactKind::ScanResults => "scan-results",
            ArtifactKind::ProbeTargets => "probe-targets",
            ArtifactKind::ProbeResults => "probe-results",
            ArtifactKind::NetworkGroups => "network-groups",
            ArtifactKind::AliasedNetworks => "aliased-networks",
            ArtifactKind::Blacklist => "blacklist",
            ArtifactKind::CleanPingResults => "clean-results",
            ArtifactKind::BloomFilter => "bloom",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
