//! The artifact store proper.

use std::fs;
use std::io::Write;
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use sixhound_addr::{
    network_from_bytes, network_to_bytes, networks_from_bytes, read_binary_file, read_hex_file,
    read_networks_file, unique, write_atomic, Network,
};
use sixhound_blacklist::NetworkBlacklist;
use sixhound_scan::ClusterModel;

use crate::assets::{AssetProvider, BundledAssets, BLACKLIST_ASSET, CLUSTER_MODEL_ASSET};
use crate::bloom::BloomFilter;
use crate::kind::ArtifactKind;
use crate::StoreError;

/// Fixed filename of the cumulative output file.
const OUTPUT_FILENAME: &str = "discovered.hex";

/// Fixed filename of the pipeline state file.
const STATE_FILENAME: &str = "state";

/// Fixed filename of the target network file.
const TARGET_NETWORK_FILENAME: &str = "target-network";

/// Single-slot cache: the newest parsed value of one artifact kind and
/// the path it came from. Last writer wins; there is no other eviction.
#[derive(Debug)]
struct Slot<T> {
    path: Option<PathBuf>,
    value: Option<Rc<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            path: None,
            value: None,
        }
    }
}

impl<T> Slot<T> {
    fn set(&mut self, path: Option<PathBuf>, value: Rc<T>) {
        self.path = path;
        self.value = Some(value);
    }
}

/// Loads through a slot: returns the cached value when the newest path on
/// disk matches the cached path, otherwise parses and replaces the slot.
fn load_slot<T>(
    slot: &mut Slot<T>,
    newest: PathBuf,
    parse: impl FnOnce(&Path) -> Result<T, StoreError>,
) -> Result<Rc<T>, StoreError> {
    if slot.path.as_deref() == Some(newest.as_path()) {
        if let Some(value) = &slot.value {
            tracing::debug!(path = %newest.display(), "artifact already cached");
            return Ok(value.clone());
        }
    }
    tracing::debug!(path = %newest.display(), "loading artifact from disk");
    let value = Rc::new(parse(&newest)?);
    slot.set(Some(newest), value.clone());
    Ok(value)
}

/// Owns the artifact directories under one data root plus the per-kind
/// caches and bundled fallbacks.
pub struct ArtifactStore {
    data_dir: PathBuf,
    assets: Box<dyn AssetProvider>,
    path_counter: u64,
    candidates: Slot<Vec<Ipv6Addr>>,
    scan_results: Slot<Vec<Ipv6Addr>>,
    network_groups: Slot<Vec<Network>>,
    aliased_networks: Slot<Vec<Network>>,
    blacklist: Slot<NetworkBlacklist>,
    clean_results: Slot<Vec<Ipv6Addr>>,
    bloom: Slot<BloomFilter>,
    model: Option<Rc<ClusterModel>>,
}

impl ArtifactStore {
    /// Creates a store over `data_dir` with the compiled-in assets.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_assets(data_dir, Box::new(BundledAssets))
    }

    /// Creates a store with a caller-supplied asset provider.
    pub fn with_assets(data_dir: impl Into<PathBuf>, assets: Box<dyn AssetProvider>) -> Self {
        Self {
            data_dir: data_dir.into(),
            assets,
            path_counter: 0,
            candidates: Slot::default(),
            scan_results: Slot::default(),
            network_groups: Slot::default(),
            aliased_networks: Slot::default(),
            blacklist: Slot::default(),
            clean_results: Slot::default(),
            bloom: Slot::default(),
            model: None,
        }
    }

    /// The data root.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Creates every kind directory.
    pub fn bootstrap(&self) -> Result<(), StoreError> {
        for kind in ArtifactKind::ALL {
            fs::create_dir_all(self.dir(kind))?;
        }
        tracing::debug!(data_dir = %self.data_dir.display(), "artifact directories ready");
        Ok(())
    }

    /// The directory holding artifacts of `kind`.
    pub fn dir(&self, kind: ArtifactKind) -> PathBuf {
        self.data_dir.join(kind.dir_name())
    }

    /// Path of the cumulative output file.
    pub fn output_file_path(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_FILENAME)
    }

    /// Path of the pipeline state file.
    pub fn state_file_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILENAME)
    }

    /// Path of the target network file.
    pub fn target_network_file_path(&self) -> PathBuf {
        self.data_dir.join(TARGET_NETWORK_FILENAME)
    }

    /// The newest artifact of `kind`, by lexicographically greatest
    /// filename. `None` when the directory is empty or missing.
    pub fn most_recent(&self, kind: ArtifactKind) -> Result<Option<PathBuf>, StoreError> {
        let dir = self.dir(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut newest: Option<String> = None;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            // Half-written files live under a .tmp suffix until renamed.
            if name.ends_with(".tmp") {
                continue;
            }
            if newest.as_deref().is_none_or(|n| name.as_str() > n) {
                newest = Some(name);
            }
        }
        Ok(newest.map(|name| dir.join(name)))
    }

    /// A fresh artifact path of `kind`, guaranteed lexicographically
    /// greater than every existing entry. Millisecond timestamp, ties
    /// broken by an in-process counter.
    pub fn new_path(&mut self, kind: ArtifactKind) -> Result<PathBuf, StoreError> {
        let dir = self.dir(kind);
        fs::create_dir_all(&dir)?;
        let newest_name = self
            .most_recent(kind)?
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));

        let mut millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        // A clock that jumped backwards must not break monotonicity.
        if let Some(name) = &newest_name {
            if let Some((stamp, _)) = name.split_once('-') {
                if let Ok(existing) = stamp.parse::<u64>() {
                    millis = millis.max(existing);
                }
            }
        }

        loop {
            let candidate = format!("{millis:013}-{:06}", self.path_counter);
            self.path_counter += 1;
            if newest_name
                .as_deref()
                .is_none_or(|newest| candidate.as_str() > newest)
            {
                return Ok(dir.join(candidate));
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-kind loads and cache updates
    // ------------------------------------------------------------------

    pub fn load_candidates(&mut self) -> Result<Rc<Vec<Ipv6Addr>>, StoreError> {
        let newest = self
            .most_recent(ArtifactKind::CandidateAddresses)?
            .ok_or(StoreError::NoArtifact {
                kind: ArtifactKind::CandidateAddresses,
            })?;
        load_slot(&mut self.candidates, newest, |p| Ok(read_hex_file(p)?))
    }

    pub fn update_candidates(&mut self, path: PathBuf, addrs: Vec<Ipv6Addr>) {
        self.candidates.set(Some(path), Rc::new(addrs));
    }

    pub fn load_scan_results(&mut self) -> Result<Rc<Vec<Ipv6Addr>>, StoreError> {
        let newest = self
            .most_recent(ArtifactKind::ScanResults)?
            .ok_or(StoreError::NoArtifact {
                kind: ArtifactKind::ScanResults,
            })?;
        load_slot(&mut self.scan_results, newest, |p| Ok(read_hex_file(p)?))
    }

    pub fn update_scan_results(&mut self, path: PathBuf, addrs: Vec<Ipv6Addr>) {
        self.scan_results.set(Some(path), Rc::new(addrs));
    }

    pub fn load_network_groups(&mut self) -> Result<Rc<Vec<Network>>, StoreError> {
        let newest = self
            .most_recent(ArtifactKind::NetworkGroups)?
            .ok_or(StoreError::NoArtifact {
                kind: ArtifactKind::NetworkGroups,
            })?;
        load_slot(&mut self.network_groups, newest, |p| {
            Ok(read_networks_file(p)?)
        })
    }

    pub fn update_network_groups(&mut self, path: PathBuf, networks: Vec<Network>) {
        self.network_groups.set(Some(path), Rc::new(networks));
    }

    pub fn load_aliased_networks(&mut self) -> Result<Rc<Vec<Network>>, StoreError> {
        let newest = self
            .most_recent(ArtifactKind::AliasedNetworks)?
            .ok_or(StoreError::NoArtifact {
                kind: ArtifactKind::AliasedNetworks,
            })?;
        load_slot(&mut self.aliased_networks, newest, |p| {
            Ok(read_networks_file(p)?)
        })
    }

    pub fn update_aliased_networks(&mut self, path: PathBuf, networks: Vec<Network>) {
        self.aliased_networks.set(Some(path), Rc::new(networks));
    }

    /// Loads the newest blacklist artifact, falling back to the bundled
    /// asset when the directory is empty.
    pub fn load_blacklist(&mut self) -> Result<Rc<NetworkBlacklist>, StoreError> {
        match self.most_recent(ArtifactKind::Blacklist)? {
            Some(newest) => load_slot(&mut self.blacklist, newest, |p| {
                Ok(NetworkBlacklist::read_from(p)?)
            }),
            None => {
                // An asset-backed value is cached with no path; any later
                // on-disk artifact takes precedence via the Some arm.
                if self.blacklist.path.is_none() {
                    if let Some(value) = &self.blacklist.value {
                        return Ok(value.clone());
                    }
                }
                tracing::info!("no blacklist artifact on disk, using bundled seed blacklist");
                let payload = self.assets.find(BLACKLIST_ASSET)?;
                let networks = networks_from_bytes(&payload)?;
                let blacklist = Rc::new(NetworkBlacklist::from_networks_strict(networks)?);
                self.blacklist.set(None, blacklist.clone());
                Ok(blacklist)
            }
        }
    }

    pub fn update_blacklist(&mut self, path: PathBuf, blacklist: NetworkBlacklist) {
        self.blacklist.set(Some(path), Rc::new(blacklist));
    }

    pub fn load_clean_results(&mut self) -> Result<Rc<Vec<Ipv6Addr>>, StoreError> {
        let newest = self
            .most_recent(ArtifactKind::CleanPingResults)?
            .ok_or(StoreError::NoArtifact {
                kind: ArtifactKind::CleanPingResults,
            })?;
        load_slot(&mut self.clean_results, newest, |p| Ok(read_binary_file(p)?))
    }

    pub fn update_clean_results(&mut self, path: PathBuf, addrs: Vec<Ipv6Addr>) {
        self.clean_results.set(Some(path), Rc::new(addrs));
    }

    /// Loads the newest Bloom filter artifact. With no artifact on disk
    /// the filter is rebuilt from the cumulative output file, or created
    /// empty when no output exists yet; neither fallback is cached, so the
    /// next on-disk artifact wins.
    pub fn load_bloom(
        &mut self,
        bit_count: u64,
        hash_count: u32,
        emit_freq: usize,
    ) -> Result<Rc<BloomFilter>, StoreError> {
        match self.most_recent(ArtifactKind::BloomFilter)? {
            Some(newest) => load_slot(&mut self.bloom, newest, |p| BloomFilter::read_from(p)),
            None => {
                let output = self.output_file_path();
                let mut filter = BloomFilter::new(bit_count, hash_count);
                if output.exists() {
                    let addrs = unique(&read_hex_file(&output)?, emit_freq);
                    tracing::info!(
                        addresses = addrs.len(),
                        "rebuilding bloom filter from cumulative output"
                    );
                    for addr in addrs {
                        filter.add(addr);
                    }
                } else {
                    tracing::debug!("no output file yet, starting with an empty bloom filter");
                }
                Ok(Rc::new(filter))
            }
        }
    }

    pub fn update_bloom(&mut self, path: PathBuf, filter: BloomFilter) {
        self.bloom.set(Some(path), Rc::new(filter));
    }

    /// Loads the cluster model from the bundled asset. Loaded once and
    /// kept for the life of the process.
    pub fn load_model(&mut self) -> Result<Rc<ClusterModel>, StoreError> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        let payload = self.assets.find(CLUSTER_MODEL_ASSET)?;
        let model = Rc::new(ClusterModel::from_bytes(&payload)?);
        self.model = Some(model.clone());
        tracing::debug!("cluster model loaded");
        Ok(model)
    }

    // ------------------------------------------------------------------
    // Fixed-path artifacts
    // ------------------------------------------------------------------

    /// Reads the target network file, if present.
    pub fn read_target_network(&self) -> Result<Option<Network>, StoreError> {
        let path = self.target_network_file_path();
        match fs::read(&path) {
            Ok(data) => Ok(Some(network_from_bytes(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the target network file atomically.
    pub fn write_target_network(&self, network: &Network) -> Result<(), StoreError> {
        write_atomic(&self.target_network_file_path(), &network_to_bytes(network))?;
        Ok(())
    }

    /// Reads the cumulative output file; an absent file is an empty list.
    pub fn read_output(&self) -> Result<Vec<Ipv6Addr>, StoreError> {
        let path = self.output_file_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(read_hex_file(&path)?)
    }

    /// Appends addresses to the cumulative output file.
    ///
    /// The output file grows append-only; the Bloom filter guards against
    /// duplicates and the hex reader skips a torn final line, so a
    /// rewrite-and-rename here would only add IO.
    pub fn append_output(&self, addrs: &[Ipv6Addr]) -> Result<(), StoreError> {
        if addrs.is_empty() {
            return Ok(());
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.output_file_path())?;
        let mut buf = String::with_capacity(addrs.len() * 24);
        for addr in addrs {
            buf.push_str(&addr.to_string());
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Deletes all but the newest `keep` files in every kind directory.
    /// Returns how many files were removed.
    pub fn prune(&self, keep: usize) -> Result<usize, StoreError> {
        let mut removed = 0usize;
        for kind in ArtifactKind::ALL {
            let dir = self.dir(kind);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let mut names: Vec<String> = Vec::new();
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names.sort_unstable();
            let cut = names.len().saturating_sub(keep);
            for name in &names[..cut] {
                fs::remove_file(dir.join(name))?;
                removed += 1;
            }
            if cut > 0 {
                tracing::debug!(kind = %kind, removed = cut, kept = keep, "pruned artifacts");
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn most_recent_picks_greatest_filename() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let kind_dir = store.dir(ArtifactKind::CandidateAddresses);
        fs::create_dir_all(&kind_dir).unwrap();
        for name in ["00001", "00003", "00002"] {
            fs::write(kind_dir.join(name), b"").unwrap();
        }
        let newest = store.most_recent(ArtifactKind::CandidateAddresses).unwrap();
        assert_eq!(newest, Some(kind_dir.join("00003")));
    }

    #[test]
    fn most_recent_ignores_temp_files_and_empty_dirs() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert_eq!(store.most_recent(ArtifactKind::ScanResults).unwrap(), None);

        let kind_dir = store.dir(ArtifactKind::ScanResults);
        fs::create_dir_all(&kind_dir).unwrap();
        fs::write(kind_dir.join("00009.tmp"), b"").unwrap();
        assert_eq!(store.most_recent(ArtifactKind::ScanResults).unwrap(), None);
    }

    #[test]
    fn new_path_is_monotonic_and_beats_existing_entries() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());

        let first = store.new_path(ArtifactKind::CandidateAddresses).unwrap();
        let second = store.new_path(ArtifactKind::CandidateAddresses).unwrap();
        assert!(second.file_name().unwrap() > first.file_name().unwrap());

        fs::write(&second, b"").unwrap();
        let newest = store
            .most_recent(ArtifactKind::CandidateAddresses)
            .unwrap()
            .unwrap();
        assert_eq!(newest, second);

        let third = store.new_path(ArtifactKind::CandidateAddresses).unwrap();
        assert!(third.file_name().unwrap() > second.file_name().unwrap());
    }

    #[test]
    fn new_path_outruns_a_future_timestamp() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());
        let kind_dir = store.dir(ArtifactKind::ScanResults);
        fs::create_dir_all(&kind_dir).unwrap();
        fs::write(kind_dir.join("9999999999999-000000"), b"").unwrap();

        let path = store.new_path(ArtifactKind::ScanResults).unwrap();
        assert!(path.file_name().unwrap() > std::ffi::OsStr::new("9999999999999-000000"));
    }

    #[test]
    fn update_sets_cache_without_touching_disk() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());

        let path = store.new_path(ArtifactKind::CandidateAddresses).unwrap();
        sixhound_addr::write_hex_file(&path, &[addr("2001:db8::1")]).unwrap();

        // Cache a different value under the same path: load must return
        // the cached value, proving it never reread the file.
        store.update_candidates(path, vec![addr("::2")]);
        let loaded = store.load_candidates().unwrap();
        assert_eq!(*loaded, vec![addr("::2")]);
    }

    #[test]
    fn load_reloads_when_a_newer_artifact_appears() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());

        let first = store.new_path(ArtifactKind::CandidateAddresses).unwrap();
        sixhound_addr::write_hex_file(&first, &[addr("2001:db8::1")]).unwrap();
        assert_eq!(*store.load_candidates().unwrap(), vec![addr("2001:db8::1")]);

        let second = store.new_path(ArtifactKind::CandidateAddresses).unwrap();
        sixhound_addr::write_hex_file(&second, &[addr("2001:db8::2")]).unwrap();
        assert_eq!(*store.load_candidates().unwrap(), vec![addr("2001:db8::2")]);
    }

    #[test]
    fn missing_candidates_is_an_error() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());
        assert!(matches!(
            store.load_candidates(),
            Err(StoreError::NoArtifact {
                kind: ArtifactKind::CandidateAddresses
            })
        ));
    }

    #[test]
    fn blacklist_falls_back_to_bundled_asset() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());
        let blacklist = store.load_blacklist().unwrap();
        assert!(!blacklist.is_empty());
        // Second load reuses the asset-backed cache.
        let again = store.load_blacklist().unwrap();
        assert!(Rc::ptr_eq(&blacklist, &again));
    }

    #[test]
    fn a_substituted_asset_provider_backs_the_fallback() {
        struct Fixture;
        impl AssetProvider for Fixture {
            fn find(&self, name: &str) -> Result<Vec<u8>, StoreError> {
                assert_eq!(name, BLACKLIST_ASSET);
                let network: Network = "2001:db8::/32".parse().unwrap();
                Ok(sixhound_addr::networks_to_bytes(&[network]))
            }
        }
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::with_assets(dir.path(), Box::new(Fixture));
        let blacklist = store.load_blacklist().unwrap();
        assert_eq!(blacklist.len(), 1);
        assert!(blacklist.contains(addr("2001:db8::1")));
    }

    #[test]
    fn on_disk_blacklist_beats_the_asset() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());
        let _ = store.load_blacklist().unwrap();

        let path = store.new_path(ArtifactKind::Blacklist).unwrap();
        let written =
            NetworkBlacklist::from_networks(["2001:db8::/32".parse::<Network>().unwrap()]);
        written.write_to(&path).unwrap();

        let loaded = store.load_blacklist().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains(addr("2001:db8::1")));
    }

    #[test]
    fn bloom_rebuilds_from_output_file() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());
        store.append_output(&[addr("2001:db8::1"), addr("2001:db8::2")]).unwrap();

        let filter = store.load_bloom(8192, 3, 0).unwrap();
        assert!(filter.contains(addr("2001:db8::1")));
        assert!(filter.contains(addr("2001:db8::2")));
        assert!(!filter.contains(addr("2001:db8::3")));
    }

    #[test]
    fn model_loads_from_bundled_asset() {
        let dir = tempdir().unwrap();
        let mut store = ArtifactStore::new(dir.path());
        let model = store.load_model().unwrap();
        let network: Network = "2001:db8::/32".parse().unwrap();
        for a in model.generate(16, &network) {
            assert!(network.contains(a));
        }
    }

    #[test]
    fn target_network_round_trips() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert_eq!(store.read_target_network().unwrap(), None);
        let network: Network = "2600::/12".parse().unwrap();
        store.write_target_network(&network).unwrap();
        assert_eq!(store.read_target_network().unwrap(), Some(network));
    }

    #[test]
    fn prune_keeps_the_newest_files() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let kind_dir = store.dir(ArtifactKind::ScanResults);
        fs::create_dir_all(&kind_dir).unwrap();
        for i in 0..6 {
            fs::write(kind_dir.join(format!("{i:05}")), b"").unwrap();
        }
        let removed = store.prune(2).unwrap();
        assert_eq!(removed, 4);
        let mut remaining: Vec<String> = fs::read_dir(&kind_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["00004", "00005"]);
    }
}
