//! Stage bodies other than the shared post-scan cleanup.

use sixhound_addr::{read_hex_file, write_hex_file, Network};
use sixhound_scan::{nybble_adjacent, slash64_neighborhood};
use sixhound_store::{ArtifactKind, StoreError};

use crate::driver::Pipeline;
use crate::PipelineError;

impl Pipeline {
    /// Stage 0: ask the cluster model for candidates inside the current
    /// target network.
    pub(crate) fn generate_candidates(&mut self) -> Result<(), PipelineError> {
        let target = match self.store.read_target_network()? {
            Some(network) => network,
            None => self.config.scanning.target_network.parse::<Network>()?,
        };
        let model = self.store.load_model()?;
        let count = self.config.scanning.generate_address_count;
        let addrs = model.generate(count, &target);
        debug_assert!(addrs.iter().all(|a| target.contains(*a)));

        let path = self.store.new_path(ArtifactKind::CandidateAddresses)?;
        write_hex_file(&path, &addrs)?;
        tracing::info!(
            count = addrs.len(),
            target = %target,
            path = %path.display(),
            "generated candidate addresses"
        );
        self.store.update_candidates(path, addrs);
        Ok(())
    }

    /// Stage 1: probe the newest candidate file.
    pub(crate) fn ping_scan_candidates(&mut self) -> Result<(), PipelineError> {
        let targets = self
            .store
            .most_recent(ArtifactKind::CandidateAddresses)?
            .ok_or(StoreError::NoArtifact {
                kind: ArtifactKind::CandidateAddresses,
            })?;
        let results = self.store.new_path(ArtifactKind::ScanResults)?;
        let responded = self.prober.scan(&targets, &results)?;
        tracing::info!(
            targets = %targets.display(),
            responded,
            "candidate ping scan complete"
        );
        let found = read_hex_file(&results)?;
        self.store.update_scan_results(results, found);
        Ok(())
    }

    /// Stage 3: expand cleaned results over the configured nybble range
    /// and probe the expansion.
    pub(crate) fn fan_out_nybble_adjacent(&mut self) -> Result<(), PipelineError> {
        let live = self.store.load_clean_results()?;
        let candidates = nybble_adjacent(
            &live,
            self.config.fanout.nybble_fanout_from,
            self.config.fanout.nybble_fanout_to,
            self.config.housekeeping.log_loop_emit_freq,
        )?;
        tracing::info!(
            live = live.len(),
            candidates = candidates.len(),
            from = self.config.fanout.nybble_fanout_from,
            to = self.config.fanout.nybble_fanout_to,
            "nybble-adjacent fan-out"
        );
        self.scan_fan_out_candidates(candidates)
    }

    /// Stage 5: walk neighboring /64 networks of the cleaned results and
    /// probe monotonic host addresses in each.
    pub(crate) fn fan_out_slash64s(&mut self) -> Result<(), PipelineError> {
        let live = self.store.load_clean_results()?;
        let candidates = slash64_neighborhood(
            &live,
            self.config.fanout.slash64_radius,
            self.config.fanout.slash64_host_count,
            self.config.housekeeping.log_loop_emit_freq,
        );
        tracing::info!(
            live = live.len(),
            candidates = candidates.len(),
            radius = self.config.fanout.slash64_radius,
            "slash-64 fan-out"
        );
        self.scan_fan_out_candidates(candidates)
    }

    /// Writes fan-out candidates as the next candidate artifact and runs
    /// the prober over them.
    fn scan_fan_out_candidates(
        &mut self,
        candidates: Vec<std::net::Ipv6Addr>,
    ) -> Result<(), PipelineError> {
        let candidates_path = self.store.new_path(ArtifactKind::CandidateAddresses)?;
        write_hex_file(&candidates_path, &candidates)?;
        self.store
            .update_candidates(candidates_path.clone(), candidates);

        let results = self.store.new_path(ArtifactKind::ScanResults)?;
        let responded = self.prober.scan(&candidates_path, &results)?;
        tracing::info!(responded, "fan-out ping scan complete");
        let found = read_hex_file(&results)?;
        self.store.update_scan_results(results, found);
        Ok(())
    }

    /// Stage 7: prune every artifact directory down to the newest files,
    /// unless cleanup is disabled.
    pub(crate) fn clean_up(&mut self) -> Result<(), PipelineError> {
        if !self.config.housekeeping.cleanup_enabled {
            tracing::info!("clean up disabled, skipping");
            return Ok(());
        }
        let keep = self.config.housekeeping.cleanup_keep_count;
        let removed = self.store.prune(keep)?;
        tracing::info!(removed, keep, "pruned old artifacts");
        Ok(())
    }

    /// Stage 8: flush stage timing.
    pub(crate) fn emit_metrics(&mut self) -> Result<(), PipelineError> {
        for (key, timer) in self.timers.iter() {
            if timer.samples == 0 {
                continue;
            }
            tracing::info!(
                timer = key,
                samples = timer.samples,
                total_ms = timer.total.as_millis() as u64,
                max_ms = timer.max.as_millis() as u64,
                "stage timing"
            );
        }
        ::metrics::counter!("sixhound_pipeline_cycles_total").increment(1);
        Ok(())
    }
}
