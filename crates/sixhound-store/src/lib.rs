//! Persistent artifact store.
//!
//! Every pipeline stage reads and writes *artifacts*: files in a
//! per-kind directory whose names are monotonically increasing
//! timestamps. The newest file of a kind is the authoritative version;
//! older files are history kept until the cleanup stage prunes them.
//!
//! The [`ArtifactStore`] also owns a single-slot in-memory cache per kind
//! (keyed by path, last writer wins) and the bundled compressed fallbacks
//! for the two kinds that ship defaults: the network blacklist and the
//! cluster model. It is deliberately not thread-safe: the pipeline is
//! single-threaded, and anyone parallelizing a stage must synchronize
//! around the store themselves.

use thiserror::Error;

use sixhound_addr::AddrError;
use sixhound_blacklist::BlacklistError;
use sixhound_scan::ScanError;

mod assets;
mod bloom;
mod kind;
mod store;

pub use assets::{AssetProvider, BundledAssets, BLACKLIST_ASSET, CLUSTER_MODEL_ASSET};
pub use bloom::BloomFilter;
pub use kind::ArtifactKind;
pub use store::ArtifactStore;

/// Errors produced by the artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no {kind} artifact exists yet")]
    NoArtifact { kind: ArtifactKind },

    #[error("no bundled asset named '{name}'")]
    MissingAsset { name: String },

    #[error("bundled asset '{name}' is unusable: {reason}")]
    BadAsset { name: String, reason: String },

    #[error("invalid bloom filter file: {reason}")]
    BadFilter { reason: String },

    #[error(transparent)]
    Addr(#[from] AddrError),

    #[error(transparent)]
    Blacklist(#[from] BlacklistError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
