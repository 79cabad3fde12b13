//! Pipeline phase and status types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One stage of the five-stage pipeline.
///
/// A phase may only start for a track once its predecessor phase is `done`
/// (`metadata_fetched` has no predecessor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    MetadataFetched,
    Matched,
    AudioDownloaded,
    LyricsFetched,
    Embedded,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 5] = [
        Phase::MetadataFetched,
        Phase::Matched,
        Phase::AudioDownloaded,
        Phase::LyricsFetched,
        Phase::Embedded,
    ];

    /// Phases reset to pending when a match is manually replaced
    pub const DOWNSTREAM_OF_MATCH: [Phase; 3] = [
        Phase::AudioDownloaded,
        Phase::LyricsFetched,
        Phase::Embedded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::MetadataFetched => "metadata_fetched",
            Phase::Matched => "matched",
            Phase::AudioDownloaded => "audio_downloaded",
            Phase::LyricsFetched => "lyrics_fetched",
            Phase::Embedded => "embedded",
        }
    }

    /// The phase that must be `done` before this one may start
    pub fn predecessor(self) -> Option<Phase> {
        match self {
            Phase::MetadataFetched => None,
            Phase::Matched => Some(Phase::MetadataFetched),
            Phase::AudioDownloaded => Some(Phase::Matched),
            Phase::LyricsFetched => Some(Phase::AudioDownloaded),
            Phase::Embedded => Some(Phase::LyricsFetched),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata_fetched" => Ok(Phase::MetadataFetched),
            "matched" => Ok(Phase::Matched),
            "audio_downloaded" => Ok(Phase::AudioDownloaded),
            "lyrics_fetched" => Ok(Phase::LyricsFetched),
            "embedded" => Ok(Phase::Embedded),
            other => Err(Error::InvalidInput(format!("unknown phase: {other}"))),
        }
    }
}

/// Persisted state of one (track, phase) unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl PhaseState {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseState::Pending => "pending",
            PhaseState::InProgress => "in_progress",
            PhaseState::Done => "done",
            PhaseState::Failed => "failed",
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PhaseState::Pending),
            "in_progress" => Ok(PhaseState::InProgress),
            "done" => Ok(PhaseState::Done),
            "failed" => Ok(PhaseState::Failed),
            other => Err(Error::Integrity(format!("unknown phase state: {other}"))),
        }
    }
}
