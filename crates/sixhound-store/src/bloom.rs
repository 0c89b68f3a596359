//! Bloom filter over IPv6 addresses.
//!
//! Dedupes the cumulative output file without holding every discovered
//! address in memory. Double hashing derives the k probe positions from
//! two salted hashes of the address bytes.
//!
//! # File Format
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Offset │  Size │  Description               │
//! ├──────────────────────────────────────────────┤
//! │  0      │  4    │  Magic bytes: "SHBF"       │
//! │  4      │  1    │  Version: 0x01             │
//! │  5      │  8    │  Bit count (u64 BE)        │
//! │  13     │  4    │  Hash count (u32 BE)       │
//! │  17     │  N    │  Bit vector, LSB first     │
//! └──────────────────────────────────────────────┘
//! ```

use std::hash::{Hash, Hasher};
use std::net::Ipv6Addr;
use std::path::Path;

use crate::StoreError;

const MAGIC: &[u8; 4] = b"SHBF";
const VERSION: u8 = 0x01;
const HEADER_SIZE: usize = 4 + 1 + 8 + 4;

/// A fixed-size Bloom filter keyed on address bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u8>,
    bit_count: u64,
    hash_count: u32,
}

impl BloomFilter {
    /// Creates an empty filter with `bit_count` bits and `hash_count`
    /// probe positions per element. Zero arguments are clamped to one.
    pub fn new(bit_count: u64, hash_count: u32) -> Self {
        let bit_count = bit_count.max(1);
        Self {
            bits: vec![0u8; bit_count.div_ceil(8) as usize],
            bit_count,
            hash_count: hash_count.max(1),
        }
    }

    /// Inserts an address.
    pub fn add(&mut self, addr: Ipv6Addr) {
        let (h1, h2) = self.hash_pair(addr);
        for i in 0..self.hash_count {
            let bit = (h1.wrapping_add(u64::from(i).wrapping_mul(h2))) % self.bit_count;
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    /// True when `addr` may have been inserted; false when it definitely
    /// has not.
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        let (h1, h2) = self.hash_pair(addr);
        (0..self.hash_count).all(|i| {
            let bit = (h1.wrapping_add(u64::from(i).wrapping_mul(h2))) % self.bit_count;
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    fn hash_pair(&self, addr: Ipv6Addr) -> (u64, u64) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        addr.octets().hash(&mut hasher);
        let h1 = hasher.finish();
        // Re-salt rather than re-key: the second hash only needs to be
        // independent enough for double hashing.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        (addr.octets(), 0x9e37_79b9u32).hash(&mut hasher);
        let h2 = hasher.finish() | 1;
        (h1, h2)
    }

    /// Serializes the filter.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.bits.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&self.bit_count.to_be_bytes());
        out.extend_from_slice(&self.hash_count.to_be_bytes());
        out.extend_from_slice(&self.bits);
        out
    }

    /// Parses a serialized filter.
    pub fn from_bytes(data: &[u8]) -> Result<Self, StoreError> {
        if data.len() < HEADER_SIZE || &data[..4] != MAGIC {
            return Err(StoreError::BadFilter {
                reason: "missing magic tag".to_string(),
            });
        }
        if data[4] != VERSION {
            return Err(StoreError::BadFilter {
                reason: format!("unsupported version {}", data[4]),
            });
        }
        let bit_count = u64::from_be_bytes(data[5..13].try_into().expect("8-byte slice"));
        let hash_count = u32::from_be_bytes(data[13..17].try_into().expect("4-byte slice"));
        if bit_count == 0 || hash_count == 0 {
            return Err(StoreError::BadFilter {
                reason: "zero bit or hash count".to_string(),
            });
        }
        let bits = &data[HEADER_SIZE..];
        if bits.len() as u64 != bit_count.div_ceil(8) {
            return Err(StoreError::BadFilter {
                reason: format!(
                    "bit vector is {} bytes, header declares {} bits",
                    bits.len(),
                    bit_count
                ),
            });
        }
        Ok(Self {
            bits: bits.to_vec(),
            bit_count,
            hash_count,
        })
    }

    /// Reads a filter file.
    pub fn read_from(path: &Path) -> Result<Self, StoreError> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Writes the filter atomically.
    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        sixhound_addr::write_atomic(path, &self.to_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn added_addresses_are_found() {
        let mut filter = BloomFilter::new(8192, 3);
        let a = addr("2001:db8::1");
        let b = addr("2001:db8::2");
        assert!(!filter.contains(a));
        filter.add(a);
        assert!(filter.contains(a));
        assert!(!filter.contains(b));
    }

    #[test]
    fn serialization_round_trips() {
        let mut filter = BloomFilter::new(4096, 4);
        for i in 0..100u32 {
            filter.add(Ipv6Addr::from(0x2001_0db8_0000_0000_0000_0000_0000_0000u128 + u128::from(i)));
        }
        let restored = BloomFilter::from_bytes(&filter.to_bytes()).unwrap();
        assert_eq!(restored, filter);
    }

    #[test]
    fn rejects_corrupt_headers() {
        assert!(matches!(
            BloomFilter::from_bytes(b"nope"),
            Err(StoreError::BadFilter { .. })
        ));
        let mut bytes = BloomFilter::new(64, 2).to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            BloomFilter::from_bytes(&bytes),
            Err(StoreError::BadFilter { .. })
        ));
    }

    #[test]
    fn file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.bin");
        let mut filter = BloomFilter::new(1024, 3);
        filter.add(addr("2001:db8::1"));
        filter.write_to(&path).unwrap();
        assert_eq!(BloomFilter::read_from(&path).unwrap(), filter);
    }
}
