//! Address file IO.
//!
//! All writers go through [`write_atomic`]: the payload lands in a
//! temporary sibling file which is then renamed over the destination, so a
//! crash mid-write never leaves a half-written file under the final name.

use std::fs;
use std::io::{BufRead, BufReader};
use std::net::Ipv6Addr;
use std::path::Path;

use bytes::Bytes;

use crate::network::{networks_from_bytes, networks_to_bytes, Network};
use crate::AddrError;

/// Size of one binary address record.
const ADDRESS_RECORD_SIZE: u64 = 16;

/// Writes `contents` to `path` via a temporary sibling + rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), AddrError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads concatenated 16-byte big-endian address records.
///
/// # Errors
///
/// [`AddrError::Truncated`] when the file size is not a multiple of 16.
pub fn read_binary_file(path: &Path) -> Result<Vec<Ipv6Addr>, AddrError> {
    let data: Bytes = fs::read(path)?.into();
    if data.len() as u64 % ADDRESS_RECORD_SIZE != 0 {
        return Err(AddrError::Truncated {
            size: data.len() as u64,
            record: ADDRESS_RECORD_SIZE,
        });
    }
    let mut out = Vec::with_capacity(data.len() / ADDRESS_RECORD_SIZE as usize);
    for record in data.chunks_exact(ADDRESS_RECORD_SIZE as usize) {
        let octets: [u8; 16] = record.try_into().expect("chunk is exactly 16 bytes");
        out.push(Ipv6Addr::from(octets));
    }
    Ok(out)
}

/// Writes addresses as concatenated 16-byte records.
pub fn write_binary_file(path: &Path, addrs: &[Ipv6Addr]) -> Result<(), AddrError> {
    let mut buf = Vec::with_capacity(addrs.len() * ADDRESS_RECORD_SIZE as usize);
    for addr in addrs {
        buf.extend_from_slice(&addr.octets());
    }
    write_atomic(path, &buf)
}

/// Reads one canonical colon-notation address per line.
///
/// Unparseable lines are logged at warn level and skipped; a scanner that
/// dies mid-line must not invalidate the rest of its output.
pub fn read_hex_file(path: &Path) -> Result<Vec<Ipv6Addr>, AddrError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<Ipv6Addr>() {
            Ok(addr) => out.push(addr),
            Err(_) => {
                tracing::warn!(path = %path.display(), line = trimmed, "skipping unparseable address line");
            }
        }
    }
    Ok(out)
}

/// Writes addresses in canonical lowercase colon notation, LF-terminated.
pub fn write_hex_file(path: &Path, addrs: &[Ipv6Addr]) -> Result<(), AddrError> {
    let mut buf = String::new();
    for addr in addrs {
        buf.push_str(&addr.to_string());
        buf.push('\n');
    }
    write_atomic(path, buf.as_bytes())
}

/// Writes addresses as 32 lowercase hex nybbles per line.
pub fn write_fat_hex_file(path: &Path, addrs: &[Ipv6Addr]) -> Result<(), AddrError> {
    let mut buf = String::with_capacity(addrs.len() * 33);
    for addr in addrs {
        buf.push_str(&format!("{:032x}", u128::from(*addr)));
        buf.push('\n');
    }
    write_atomic(path, buf.as_bytes())
}

/// Reads a count-prefixed network stream file.
pub fn read_networks_file(path: &Path) -> Result<Vec<Network>, AddrError> {
    let data = fs::read(path)?;
    networks_from_bytes(&data)
}

/// Writes networks as a count-prefixed stream file.
pub fn write_networks_file(path: &Path, networks: &[Network]) -> Result<(), AddrError> {
    write_atomic(path, &networks_to_bytes(networks))
}
