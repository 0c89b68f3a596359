//! Scanning subsystems: the external prober boundary, the probabilistic
//! cluster model, aliased-network boundary detection, and the two fan-out
//! operators that expand a live address set into new probe candidates.

use thiserror::Error;

use sixhound_addr::AddrError;

mod alias;
mod fanout;
mod model;
mod probe;

pub use alias::{
    random_addresses_in, AliasCheckState, AliasCheckStates, AliasSeeker, AliasSettings,
};
pub use fanout::{nybble_adjacent, slash64_neighborhood};
pub use model::{ClusterModel, MODEL_MAGIC, MODEL_VERSION};
pub use probe::{CommandProber, Prober, ScriptedProber};

/// Errors produced by the scanning subsystems.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("probe scan failed: {reason}")]
    ProbeFailed { reason: String },

    #[error("alias boundary search produced no probe addresses while seeds remain unresolved")]
    EmptyProbeSet,

    #[error("invalid cluster model blob: {reason}")]
    BadModel { reason: String },

    #[error("search bounds are inverted ({lo} > {hi})")]
    InvertedBounds { lo: u8, hi: u8 },

    #[error(transparent)]
    Addr(#[from] AddrError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
