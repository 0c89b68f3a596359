//! CIDR networks and the length-prefixed network stream format.
//!
//! # Stream Format
//!
//! ```text
//! [count:u64 BE][record 0][record 1]...
//! record: [address:16B BE][prefix_len:u8]
//! ```
//!
//! Host bits are canonically zero in stored records; [`Network::new`]
//! enforces this for in-memory values as well.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use crate::AddrError;

/// Size of one serialized network record: 16 address bytes + 1 prefix byte.
const NETWORK_RECORD_SIZE: usize = 17;

/// Size of the record-count prefix on a network stream.
const COUNT_PREFIX_SIZE: usize = 8;

/// An IPv6 CIDR network: an address and a prefix length in `[0, 128]`.
///
/// The address is canonicalized on construction: every bit below the
/// prefix is forced to zero, so two `Network` values compare equal iff
/// they denote the same range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Network {
    addr: Ipv6Addr,
    prefix_len: u8,
}

impl Network {
    /// Creates a network from any contained address and a prefix length,
    /// zeroing the host bits.
    ///
    /// # Errors
    ///
    /// [`AddrError::BadPrefix`] when `prefix_len > 128`.
    pub fn new(addr: Ipv6Addr, prefix_len: u8) -> Result<Self, AddrError> {
        if prefix_len > 128 {
            return Err(AddrError::BadPrefix(prefix_len));
        }
        let masked = u128::from(addr) & Self::mask(prefix_len);
        Ok(Self {
            addr: Ipv6Addr::from(masked),
            prefix_len,
        })
    }

    /// The /64 network containing `addr`.
    pub fn slash64(addr: Ipv6Addr) -> Self {
        Self::new(addr, 64).expect("64 is a valid prefix length")
    }

    fn mask(prefix_len: u8) -> u128 {
        if prefix_len == 0 {
            0
        } else {
            u128::MAX << (128 - u32::from(prefix_len))
        }
    }

    /// The network address (host bits zero).
    pub fn addr(&self) -> Ipv6Addr {
        self.addr
    }

    /// The prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// True iff the top `prefix_len` bits of `addr` equal this network's.
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        u128::from(addr) & Self::mask(self.prefix_len) == u128::from(self.addr)
    }

    /// True iff every address of `other` is contained in `self`.
    pub fn covers(&self, other: &Network) -> bool {
        self.prefix_len <= other.prefix_len && self.contains(other.addr)
    }

    /// The 64-bit network number of a /64. Meaningful only for
    /// `prefix_len == 64`; for other prefixes it is simply the upper half.
    pub fn number64(&self) -> u64 {
        (u128::from(self.addr) >> 64) as u64
    }

    /// The /64 with the given 64-bit network number.
    pub fn from_number64(number: u64) -> Self {
        Self {
            addr: Ipv6Addr::from(u128::from(number) << 64),
            prefix_len: 64,
        }
    }

    /// Serializes this network as a single 17-byte record.
    pub fn to_record(&self) -> [u8; NETWORK_RECORD_SIZE] {
        let mut record = [0u8; NETWORK_RECORD_SIZE];
        record[..16].copy_from_slice(&self.addr.octets());
        record[16] = self.prefix_len;
        record
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl FromStr for Network {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, prefix_part) = s
            .split_once('/')
            .ok_or_else(|| AddrError::BadCidr(s.to_string()))?;
        let addr: Ipv6Addr = addr_part
            .parse()
            .map_err(|_| AddrError::BadCidr(s.to_string()))?;
        let prefix_len: u8 = prefix_part
            .parse()
            .map_err(|_| AddrError::BadCidr(s.to_string()))?;
        Self::new(addr, prefix_len)
    }
}

/// Serializes networks as a count-prefixed stream of 17-byte records.
pub fn networks_to_bytes(networks: &[Network]) -> Vec<u8> {
    let mut out = Vec::with_capacity(COUNT_PREFIX_SIZE + networks.len() * NETWORK_RECORD_SIZE);
    out.extend_from_slice(&(networks.len() as u64).to_be_bytes());
    for network in networks {
        out.extend_from_slice(&network.to_record());
    }
    out
}

/// Parses a count-prefixed stream of 17-byte network records.
///
/// # Errors
///
/// - [`AddrError::ShortStream`] when the payload is shorter than the
///   declared record count
/// - [`AddrError::BadPrefix`] when a record carries a prefix above 128
pub fn networks_from_bytes(data: &[u8]) -> Result<Vec<Network>, AddrError> {
    if data.len() < COUNT_PREFIX_SIZE {
        return Err(AddrError::ShortStream {
            declared: 0,
            available: data.len() as u64,
        });
    }
    let declared = u64::from_be_bytes(
        data[..COUNT_PREFIX_SIZE]
            .try_into()
            .expect("slice is exactly 8 bytes"),
    );
    let body = &data[COUNT_PREFIX_SIZE..];
    let needed = declared as usize * NETWORK_RECORD_SIZE;
    if body.len() < needed {
        return Err(AddrError::ShortStream {
            declared,
            available: body.len() as u64,
        });
    }
    let mut out = Vec::with_capacity(declared as usize);
    for record in body[..needed].chunks_exact(NETWORK_RECORD_SIZE) {
        let octets: [u8; 16] = record[..16].try_into().expect("slice is exactly 16 bytes");
        out.push(Network::new(Ipv6Addr::from(octets), record[16])?);
    }
    Ok(out)
}

/// Serializes a single network as a bare 17-byte record (no count prefix).
pub fn network_to_bytes(network: &Network) -> Vec<u8> {
    network.to_record().to_vec()
}

/// Parses a single bare 17-byte network record.
pub fn network_from_bytes(data: &[u8]) -> Result<Network, AddrError> {
    if data.len() != NETWORK_RECORD_SIZE {
        return Err(AddrError::Truncated {
            size: data.len() as u64,
            record: NETWORK_RECORD_SIZE as u64,
        });
    }
    let octets: [u8; 16] = data[..16].try_into().expect("slice is exactly 16 bytes");
    Network::new(Ipv6Addr::from(octets), data[16])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Network {
        s.parse().unwrap()
    }

    #[test]
    fn construction_zeroes_host_bits() {
        let n = Network::new("2001:db8::dead:beef".parse().unwrap(), 32).unwrap();
        assert_eq!(n, net("2001:db8::/32"));
        assert_eq!(n.addr(), "2001:db8::".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn containment() {
        let n = net("2001:db8::/32");
        assert!(n.contains("2001:db8::1".parse().unwrap()));
        assert!(n.contains("2001:db8:ffff::1".parse().unwrap()));
        assert!(!n.contains("2001:db9::1".parse().unwrap()));
        assert!(net("::/0").contains("ffff::1".parse().unwrap()));
        let host = net("2001:db8::1/128");
        assert!(host.contains("2001:db8::1".parse().unwrap()));
        assert!(!host.contains("2001:db8::2".parse().unwrap()));
    }

    #[test]
    fn covers_requires_shorter_prefix_and_containment() {
        assert!(net("2001:db8::/32").covers(&net("2001:db8:1::/48")));
        assert!(net("2001:db8::/32").covers(&net("2001:db8::/32")));
        assert!(!net("2001:db8:1::/48").covers(&net("2001:db8::/32")));
        assert!(!net("2001:db8::/32").covers(&net("2001:db9::/48")));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!("2001:db8::".parse::<Network>(), Err(AddrError::BadCidr(_))));
        assert!(matches!("nope/32".parse::<Network>(), Err(AddrError::BadCidr(_))));
        assert!(matches!("2001:db8::/x".parse::<Network>(), Err(AddrError::BadCidr(_))));
        assert!(matches!("2001:db8::/129".parse::<Network>(), Err(AddrError::BadPrefix(129))));
    }

    #[test]
    fn display_round_trips() {
        for s in ["2001:db8::/32", "::/0", "fe80::/10", "2001:db8::1/128"] {
            assert_eq!(net(s).to_string(), s);
        }
    }

    #[test]
    fn number64_round_trips() {
        let n = Network::slash64("2001:db8:0:42::99".parse().unwrap());
        assert_eq!(n, net("2001:db8:0:42::/64"));
        assert_eq!(Network::from_number64(n.number64()), n);
    }

    #[test]
    fn stream_round_trips() {
        let nets = vec![net("2001:db8::/32"), net("::/0"), net("fe80::1/128")];
        let bytes = networks_to_bytes(&nets);
        assert_eq!(bytes.len(), 8 + 3 * 17);
        assert_eq!(networks_from_bytes(&bytes).unwrap(), nets);
    }

    #[test]
    fn stream_rejects_short_payload() {
        let mut bytes = networks_to_bytes(&[net("2001:db8::/32")]);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            networks_from_bytes(&bytes),
            Err(AddrError::ShortStream { declared: 1, .. })
        ));
    }

    #[test]
    fn stream_rejects_bad_prefix() {
        let mut bytes = networks_to_bytes(&[net("2001:db8::/32")]);
        let last = bytes.len() - 1;
        bytes[last] = 200;
        assert!(matches!(networks_from_bytes(&bytes), Err(AddrError::BadPrefix(200))));
    }

    #[test]
    fn single_record_round_trips() {
        let n = net("2001:db8::/32");
        assert_eq!(network_from_bytes(&network_to_bytes(&n)).unwrap(), n);
        assert!(matches!(
            network_from_bytes(&[0u8; 16]),
            Err(AddrError::Truncated { size: 16, record: 17 })
        ));
    }
}
