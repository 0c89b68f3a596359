//! The discovery pipeline: a persistent, crash-resumable state machine
//! that alternates candidate generation and scanning with alias-network
//! detection and blacklist maintenance.
//!
//! # Stage Order
//!
//! ```text
//! 0 GenAddresses                     ask the cluster model for candidates
//! 1 PingScanAddr                     probe the candidates
//! 2 PingScanAliasRemoval             alias detection + blacklist cleanup
//! 3 FanOutNybbleAdjacent             nybble-adjacent candidates + probe
//! 4 FanOutNybbleAdjacentAliasRemoval alias detection + blacklist cleanup
//! 5 FanOut64                         /64 neighborhood candidates + probe
//! 6 FanOut64AliasRemoval             alias detection + blacklist cleanup
//! 7 CleanUp                          prune old artifacts
//! 8 EmitMetrics                      flush stage timers
//! ```
//!
//! # Crash Safety
//!
//! Every stage writes its outputs to fresh timestamp-named artifact files
//! and flushes them before the one-byte state file advances (temp +
//! rename). A crash between the two replays the stage: reruns produce
//! strictly newer files and the most-recent-file rule picks them up, so
//! no state is ever corrupted, only redone.

use thiserror::Error;

use sixhound_addr::AddrError;
use sixhound_blacklist::BlacklistError;
use sixhound_scan::ScanError;
use sixhound_store::StoreError;

mod cleanup;
mod driver;
mod stages;
mod state;
mod timing;

pub use driver::Pipeline;
pub use timing::{timer_key, StageTimer, StageTimers};
pub use state::{init_state_file, read_state_file, write_state_file, PipelineState};

/// Errors produced by the pipeline driver.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("state file is corrupt: {reason}")]
    CorruptState { reason: String },

    #[error("no timer registered for stage {stage}")]
    MetricsUnavailable { stage: &'static str },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Blacklist(#[from] BlacklistError),

    #[error(transparent)]
    Addr(#[from] AddrError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
