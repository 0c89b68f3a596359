//! The pipeline driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sixhound_config::SixhoundConfig;
use sixhound_scan::Prober;
use sixhound_store::ArtifactStore;

use crate::state::{init_state_file, read_state_file, write_state_file, PipelineState};
use crate::timing::StageTimers;
use crate::PipelineError;

/// Owns the artifact store, the prober, and the stage timers; executes
/// stages one at a time on a single thread.
pub struct Pipeline {
    pub(crate) store: ArtifactStore,
    pub(crate) config: SixhoundConfig,
    pub(crate) prober: Box<dyn Prober>,
    pub(crate) timers: StageTimers,
    shutdown: Arc<AtomicBool>,
}

impl Pipeline {
    /// Creates a pipeline, bootstrapping the artifact directories and the
    /// state file.
    pub fn new(
        store: ArtifactStore,
        config: SixhoundConfig,
        prober: Box<dyn Prober>,
    ) -> Result<Self, PipelineError> {
        store.bootstrap()?;
        init_state_file(&store.state_file_path())?;
        Ok(Self {
            store,
            config,
            prober,
            timers: StageTimers::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A flag that stops the run loop at the next stage boundary.
    /// Mid-stage cancellation is not supported; external prober processes
    /// are terminated by OS signals.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// The owned artifact store.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Accumulated stage timers.
    pub fn timers(&self) -> &StageTimers {
        &self.timers
    }

    /// Resumes from the persisted state and runs stages until shut down
    /// or a stage fails.
    ///
    /// A stage error aborts without advancing the state byte, so a
    /// restart re-executes the failed stage.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        let mut state = read_state_file(&self.store.state_file_path())?;
        tracing::info!(%state, data_dir = %self.store.data_dir().display(), "pipeline starting");
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!(%state, "shutdown requested, stopping at stage boundary");
                return Ok(());
            }
            state = self.step(state)?;
        }
    }

    /// Executes exactly one stage and advances the persisted state.
    /// Returns the next stage.
    pub fn step(&mut self, state: PipelineState) -> Result<PipelineState, PipelineError> {
        tracing::debug!(%state, "entering stage");
        let started = Instant::now();
        self.execute(state)?;
        let elapsed = started.elapsed();
        tracing::debug!(%state, elapsed_ms = elapsed.as_millis() as u64, "stage complete");

        ::metrics::histogram!("sixhound_stage_duration_seconds", "stage" => state.name())
            .record(elapsed.as_secs_f64());
        if !self.timers.record(state, elapsed) {
            tracing::warn!(%state, "no stage timer registered");
            if self.config.housekeeping.exit_on_failed_metrics {
                return Err(PipelineError::MetricsUnavailable {
                    stage: state.name(),
                });
            }
        }

        let next = state.next();
        write_state_file(&self.store.state_file_path(), next)?;
        Ok(next)
    }

    fn execute(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        match state {
            PipelineState::GenAddresses => self.generate_candidates(),
            PipelineState::PingScanAddr => self.ping_scan_candidates(),
            PipelineState::PingScanAliasRemoval
            | PipelineState::FanOutNybbleAdjacentAliasRemoval
            | PipelineState::FanOut64AliasRemoval => self.post_scan_cleanup(),
            PipelineState::FanOutNybbleAdjacent => self.fan_out_nybble_adjacent(),
            PipelineState::FanOut64 => self.fan_out_slash64s(),
            PipelineState::CleanUp => self.clean_up(),
            PipelineState::EmitMetrics => self.emit_metrics(),
        }
    }
}
