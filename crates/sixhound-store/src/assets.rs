//! Bundled compressed assets.
//!
//! Two zlib blobs are embedded at build time: a seed blacklist of known
//! aliased ranges and a cluster model. They back the artifact store's
//! fallback path when the corresponding directory is still empty.
//!
//! The [`AssetProvider`] seam exists so tests can substitute fixtures for
//! the compiled-in blobs.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::StoreError;

/// Name of the bundled blacklist asset.
pub const BLACKLIST_ASSET: &str = "blacklist.zlib";

/// Name of the bundled cluster-model asset.
pub const CLUSTER_MODEL_ASSET: &str = "clustermodel.zlib";

/// Source of named binary assets.
///
/// `find` returns the decompressed payload; the compression applied at
/// packaging time is the provider's concern.
pub trait AssetProvider {
    fn find(&self, name: &str) -> Result<Vec<u8>, StoreError>;
}

/// The compile-time embedded assets.
pub struct BundledAssets;

static BLACKLIST_BLOB: &[u8] = include_bytes!("../assets/blacklist.zlib");
static CLUSTER_MODEL_BLOB: &[u8] = include_bytes!("../assets/clustermodel.zlib");

impl AssetProvider for BundledAssets {
    fn find(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let blob = match name {
            BLACKLIST_ASSET => BLACKLIST_BLOB,
            CLUSTER_MODEL_ASSET => CLUSTER_MODEL_BLOB,
            _ => {
                return Err(StoreError::MissingAsset {
                    name: name.to_string(),
                })
            }
        };
        let mut decoder = ZlibDecoder::new(blob);
        let mut payload = Vec::new();
        decoder
            .read_to_end(&mut payload)
            .map_err(|e| StoreError::BadAsset {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(name, bytes = payload.len(), "decompressed bundled asset");
        Ok(payload)
    }
}
