//! Fan-out operators: expand a live address set into nearby probe
//! candidates.

use std::net::Ipv6Addr;

use sixhound_addr::{adjacent_nybble_variants, unique, Network};

use crate::ScanError;

/// Expands every address by substituting each nybble in `[from, to)` with
/// all 15 other values. The originals are kept; the result is
/// deduplicated, first occurrence first.
///
/// # Errors
///
/// [`sixhound_addr::AddrError::BadRange`] unless `from < to <= 32`.
pub fn nybble_adjacent(
    addrs: &[Ipv6Addr],
    from: usize,
    to: usize,
    emit_freq: usize,
) -> Result<Vec<Ipv6Addr>, ScanError> {
    let mut out = Vec::with_capacity(addrs.len() * (1 + 15 * to.saturating_sub(from)));
    for addr in addrs {
        out.extend(adjacent_nybble_variants(*addr, from, to)?);
    }
    Ok(unique(&out, emit_freq))
}

/// Walks the /64 neighborhood of every address.
///
/// For each address the containing /64 and its `radius` neighbors on both
/// sides (the 64-bit network number wraps silently on overflow) each
/// contribute `per_subnet` addresses with host suffixes `1..=per_subnet`.
/// The result is deduplicated, first occurrence first.
pub fn slash64_neighborhood(
    addrs: &[Ipv6Addr],
    radius: u64,
    per_subnet: u64,
    emit_freq: usize,
) -> Vec<Ipv6Addr> {
    let width = radius.saturating_mul(2).saturating_add(1) as usize;
    let mut out = Vec::with_capacity(addrs.len() * width * per_subnet as usize);
    for addr in addrs {
        let center = Network::slash64(*addr).number64();
        let signed_radius = radius as i64;
        for offset in -signed_radius..=signed_radius {
            let number = center.wrapping_add(offset as u64);
            let base = u128::from(number) << 64;
            for host in 1..=per_subnet {
                out.push(Ipv6Addr::from(base | u128::from(host)));
            }
        }
    }
    unique(&out, emit_freq)
}
