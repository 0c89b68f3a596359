//! Per-stage wall-time accounting.
//!
//! The driver owns one [`StageTimers`] registry with an entry per stage,
//! created up front. A lookup miss at record time therefore indicates a
//! registration bug; the driver downgrades it to a warning unless
//! `exit_on_failed_metrics` is set.

use std::collections::HashMap;
use std::time::Duration;

use crate::state::PipelineState;

/// Registry key of a stage timer.
pub fn timer_key(state: PipelineState) -> String {
    format!("pipeline.state_{}.time", state.as_byte())
}

/// Accumulated wall time of one stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageTimer {
    pub samples: u64,
    pub total: Duration,
    pub max: Duration,
}

impl StageTimer {
    fn update(&mut self, elapsed: Duration) {
        self.samples += 1;
        self.total += elapsed;
        self.max = self.max.max(elapsed);
    }
}

/// Stage timer registry.
#[derive(Debug)]
pub struct StageTimers {
    timers: HashMap<String, StageTimer>,
}

impl StageTimers {
    /// Creates a registry with an entry per pipeline stage.
    pub fn new() -> Self {
        let timers = PipelineState::ALL
            .iter()
            .map(|&state| (timer_key(state), StageTimer::default()))
            .collect();
        Self { timers }
    }

    /// Records a stage duration. Returns `false` when no timer is
    /// registered for the stage.
    pub fn record(&mut self, state: PipelineState, elapsed: Duration) -> bool {
        match self.timers.get_mut(&timer_key(state)) {
            Some(timer) => {
                timer.update(elapsed);
                true
            }
            None => false,
        }
    }

    /// The accumulated timer of a stage.
    pub fn get(&self, state: PipelineState) -> Option<&StageTimer> {
        self.timers.get(&timer_key(state))
    }

    /// All timers with their registry keys, unordered.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StageTimer)> {
        self.timers.iter().map(|(key, timer)| (key.as_str(), timer))
    }
}

impl Default for StageTimers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stage_has_a_timer() {
        let timers = StageTimers::new();
        for state in PipelineState::ALL {
            assert!(timers.get(state).is_some());
        }
    }

    #[test]
    fn recording_accumulates() {
        let mut timers = StageTimers::new();
        let state = PipelineState::GenAddresses;
        assert!(timers.record(state, Duration::from_millis(10)));
        assert!(timers.record(state, Duration::from_millis(30)));
        let timer = timers.get(state).unwrap();
        assert_eq!(timer.samples, 2);
        assert_eq!(timer.total, Duration::from_millis(40));
        assert_eq!(timer.max, Duration::from_millis(30));
    }

    #[test]
    fn keys_follow_the_state_byte() {
        assert_eq!(timer_key(PipelineState::GenAddresses), "pipeline.state_0.time");
        assert_eq!(timer_key(PipelineState::EmitMetrics), "pipeline.state_8.time");
    }
}
