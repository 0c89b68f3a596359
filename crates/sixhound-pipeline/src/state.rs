//! Pipeline states and the one-byte state file.
//!
//! The state file holds exactly one byte naming the stage that runs
//! next. It is written only after the previous stage's outputs are
//! durably on disk, via temp + rename, so a crash resumes at the stage
//! that was about to execute.

use std::fs;
use std::path::Path;

use sixhound_addr::write_atomic;

use crate::PipelineError;

/// The nine ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineState {
    GenAddresses = 0,
    PingScanAddr = 1,
    PingScanAliasRemoval = 2,
    FanOutNybbleAdjacent = 3,
    FanOutNybbleAdjacentAliasRemoval = 4,
    FanOut64 = 5,
    FanOut64AliasRemoval = 6,
    CleanUp = 7,
    EmitMetrics = 8,
}

impl PipelineState {
    pub const FIRST: PipelineState = PipelineState::GenAddresses;

    pub const ALL: [PipelineState; 9] = [
        PipelineState::GenAddresses,
        PipelineState::PingScanAddr,
        PipelineState::PingScanAliasRemoval,
        PipelineState::FanOutNybbleAdjacent,
        PipelineState::FanOutNybbleAdjacentAliasRemoval,
        PipelineState::FanOut64,
        PipelineState::FanOut64AliasRemoval,
        PipelineState::CleanUp,
        PipelineState::EmitMetrics,
    ];

    /// Decodes a state byte.
    ///
    /// # Errors
    ///
    /// [`PipelineError::CorruptState`] for any byte outside `0..=8`.
    pub fn from_byte(byte: u8) -> Result<Self, PipelineError> {
        Self::ALL
            .get(byte as usize)
            .copied()
            .ok_or_else(|| PipelineError::CorruptState {
                reason: format!("state byte {byte} is outside 0..=8"),
            })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// The successor stage, wrapping after the last.
    pub fn next(self) -> Self {
        Self::ALL[(self.as_byte() as usize + 1) % Self::ALL.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            PipelineState::GenAddresses => "gen_addresses",
            PipelineState::PingScanAddr => "ping_scan_addr",
            PipelineState::PingScanAliasRemoval => "ping_scan_alias_removal",
            PipelineState::FanOutNybbleAdjacent => "fan_out_nybble_adjacent",
            PipelineState::FanOutNybbleAdjacentAliasRemoval => {
                "fan_out_nybble_adjacent_alias_removal"
            }
            PipelineState::FanOut64 => "fan_out_64",
            PipelineState::FanOut64AliasRemoval => "fan_out_64_alias_removal",
            PipelineState::CleanUp => "clean_up",
            PipelineState::EmitMetrics => "emit_metrics",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reads the state file.
///
/// # Errors
///
/// [`PipelineError::CorruptState`] when the file is not exactly one byte
/// or the byte names no stage.
pub fn read_state_file(path: &Path) -> Result<PipelineState, PipelineError> {
    let content = fs::read(path)?;
    if content.len() != 1 {
        return Err(PipelineError::CorruptState {
            reason: format!(
                "state file '{}' holds {} bytes, expected exactly 1",
                path.display(),
                content.len()
            ),
        });
    }
    PipelineState::from_byte(content[0])
}

/// Writes the state file atomically.
pub fn write_state_file(path: &Path, state: PipelineState) -> Result<(), PipelineError> {
    tracing::debug!(path = %path.display(), state = %state, "updating state file");
    write_atomic(path, &[state.as_byte()])?;
    Ok(())
}

/// Creates the state file at the first stage unless it already exists.
pub fn init_state_file(path: &Path) -> Result<(), PipelineError> {
    if path.exists() {
        tracing::debug!(path = %path.display(), "state file already exists");
        return Ok(());
    }
    write_state_file(path, PipelineState::FIRST)
}
