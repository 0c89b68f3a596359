//! The probabilistic cluster model, consumed as an opaque versioned blob.
//!
//! Training and the real sampler internals live outside this system; the
//! only operation the pipeline needs is *generate k addresses inside a
//! network*. The blob carries a magic tag, a format version, and seed
//! material that keys the sampler.
//!
//! # Blob Format
//!
//! ```text
//! [magic:4B "SHCM"][version:u8][seed material:32B]
//! ```

use std::net::Ipv6Addr;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use sixhound_addr::{low64_fingerprint, Network};

use crate::ScanError;

/// Magic tag identifying a cluster model blob.
pub const MODEL_MAGIC: &[u8; 4] = b"SHCM";

/// Supported model format version.
pub const MODEL_VERSION: u8 = 1;

/// Length of the seed material section.
const SEED_LEN: usize = 32;

/// A loaded cluster model.
///
/// Loaded once at startup (from the newest model artifact or the bundled
/// asset) and kept for the life of the process.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    seed: [u8; SEED_LEN],
}

impl ClusterModel {
    /// Parses a model blob.
    ///
    /// # Errors
    ///
    /// [`ScanError::BadModel`] on a wrong magic tag, an unsupported
    /// version, or missing seed material.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ScanError> {
        if data.len() < 4 || &data[..4] != MODEL_MAGIC {
            return Err(ScanError::BadModel {
                reason: "missing magic tag".to_string(),
            });
        }
        let version = *data.get(4).ok_or_else(|| ScanError::BadModel {
            reason: "missing version byte".to_string(),
        })?;
        if version != MODEL_VERSION {
            return Err(ScanError::BadModel {
                reason: format!("unsupported version {version}"),
            });
        }
        let body = &data[5..];
        if body.len() < SEED_LEN {
            return Err(ScanError::BadModel {
                reason: format!("seed material is {} bytes, need {SEED_LEN}", body.len()),
            });
        }
        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&body[..SEED_LEN]);
        Ok(Self { seed })
    }

    /// Generates `count` candidate addresses inside `network`.
    ///
    /// Every returned address is contained in `network`. Successive calls
    /// draw fresh entropy, so repeated generation explores the space.
    pub fn generate(&self, count: usize, network: &Network) -> Vec<Ipv6Addr> {
        self.generate_with_rng(count, network, &mut rand::thread_rng())
    }

    /// Deterministic variant of [`Self::generate`] for a caller-supplied RNG.
    pub fn generate_with_rng(
        &self,
        count: usize,
        network: &Network,
        rng: &mut impl RngCore,
    ) -> Vec<Ipv6Addr> {
        let mut sampler = self.sampler(network, rng.next_u64());
        let host_mask = host_mask(network.prefix_len());
        let base = u128::from(network.addr());
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let host: u128 = sampler.gen::<u128>() & host_mask;
            out.push(Ipv6Addr::from(base | host));
        }
        out
    }

    /// Keys the sampler on the model seed, the target network, and a
    /// per-call nonce.
    fn sampler(&self, network: &Network, nonce: u64) -> StdRng {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.seed);
        let fingerprint = low64_fingerprint(network.addr())
            ^ u64::from(network.prefix_len())
            ^ nonce;
        for (slot, byte) in key.iter_mut().zip(fingerprint.to_be_bytes().iter().cycle()) {
            *slot ^= byte;
        }
        StdRng::from_seed(key)
    }
}

pub(crate) fn host_mask(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        u128::MAX
    } else if prefix_len == 128 {
        0
    } else {
        u128::MAX >> u32::from(prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(MODEL_MAGIC);
        data.push(MODEL_VERSION);
        data.extend_from_slice(&[7u8; SEED_LEN]);
        data
    }

    #[test]
    fn parses_a_valid_blob() {
        assert!(ClusterModel::from_bytes(&blob()).is_ok());
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bad_magic = blob();
        bad_magic[0] = b'X';
        assert!(matches!(
            ClusterModel::from_bytes(&bad_magic),
            Err(ScanError::BadModel { .. })
        ));

        let mut bad_version = blob();
        bad_version[4] = 9;
        assert!(matches!(
            ClusterModel::from_bytes(&bad_version),
            Err(ScanError::BadModel { .. })
        ));

        assert!(matches!(
            ClusterModel::from_bytes(&blob()[..10]),
            Err(ScanError::BadModel { .. })
        ));
    }

    #[test]
    fn generated_addresses_are_contained() {
        let model = ClusterModel::from_bytes(&blob()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for cidr in ["2001:db8::/32", "2600::/12", "::/0", "2001:db8::1/128"] {
            let network: Network = cidr.parse().unwrap();
            let addrs = model.generate_with_rng(64, &network, &mut rng);
            assert_eq!(addrs.len(), 64);
            for addr in addrs {
                assert!(network.contains(addr), "{addr} escaped {network}");
            }
        }
    }

    #[test]
    fn generation_explores_the_space() {
        let model = ClusterModel::from_bytes(&blob()).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let network: Network = "2001:db8::/32".parse().unwrap();
        let addrs = model.generate_with_rng(128, &network, &mut rng);
        let distinct: std::collections::HashSet<_> = addrs.iter().collect();
        assert!(distinct.len() > 100);
    }
}
