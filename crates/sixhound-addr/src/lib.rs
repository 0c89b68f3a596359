//! IPv6 address codec.
//!
//! Everything in this crate treats a 128-bit address through three
//! interchangeable views: 16 big-endian bytes, 32 nybbles (index 0 is the
//! most significant), and two 64-bit halves. All conversions between the
//! views are bijective.
//!
//! The crate also owns the on-disk address formats shared across the
//! workspace:
//!
//! - *binary*: concatenated 16-byte big-endian records
//! - *hex-line*: canonical lowercase colon notation, one address per line
//! - *fat-hex*: 32 lowercase hex nybbles per line
//! - *network stream*: `u64` count followed by 17-byte records
//!   (16 address bytes + 1 prefix byte)

use thiserror::Error;

mod codec;
mod files;
mod network;

pub use codec::{
    adjacent_nybble_variants, flip_bits, from_halves, from_nybbles, halves, low64_fingerprint,
    nybble, nybbles, unique, NYBBLES_PER_ADDRESS,
};
pub use files::{
    read_binary_file, read_hex_file, read_networks_file, write_atomic, write_binary_file,
    write_fat_hex_file, write_hex_file, write_networks_file,
};
pub use network::{network_from_bytes, network_to_bytes, networks_from_bytes, networks_to_bytes, Network};

/// Errors produced by the address codec.
///
/// Callers are not expected to recover from these; they indicate either a
/// caller bug (bad indices, bad ranges) or unusable input data.
#[derive(Debug, Error)]
pub enum AddrError {
    #[error("nybble index {index} out of range (an address has {NYBBLES_PER_ADDRESS} nybbles)")]
    IndexOutOfRange { index: usize },

    #[error("invalid range [{from}, {to})")]
    BadRange { from: usize, to: usize },

    #[error("file size {size} is not a multiple of the {record}-byte record size")]
    Truncated { size: u64, record: u64 },

    #[error("network stream declares {declared} records but only {available} bytes follow")]
    ShortStream { declared: u64, available: u64 },

    #[error("prefix length {0} exceeds 128")]
    BadPrefix(u8),

    #[error("invalid CIDR notation '{0}'")]
    BadCidr(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
