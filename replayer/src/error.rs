//! Error types for the replayer.

use crate::registry::EntityKind;
use shared::{EventKind, GameMode};
use std::path::PathBuf;
use thiserror::Error;

/// Study settings that do not match the logs on disk.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("participant count must be at least 1")]
    NoParticipants,

    #[error("run count must be at least 1")]
    NoRuns,

    #[error("expected run log {} is missing", path.display())]
    MissingRun { path: PathBuf },

    #[error("{runs} runs cannot be split evenly between the static and moving modes")]
    OddRuns { runs: u32 },

    #[error("participant {participant} is outside the study layout")]
    UnknownParticipant { participant: u32 },

    #[error("participant {participant} played {found} {mode:?} games, expected {expected}")]
    SessionCount {
        participant: u32,
        mode: GameMode,
        expected: u32,
        found: u32,
    },
}

/// Errors that can occur while replaying session logs.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A resolution event found no live entity to remove.
    #[error("line {line}: {kind:?} has no live {entity} to resolve")]
    Integrity {
        line: usize,
        kind: EventKind,
        entity: EntityKind,
    },

    #[error("line {line}: {kind:?} carries no position and no camera position is known")]
    MissingPosition { line: usize, kind: EventKind },

    #[error("line {line}: END received before the game mode was announced")]
    MissingGameMode { line: usize },

    #[error("line {line}: END carries no user_name")]
    MissingUserName { line: usize },

    #[error("{} has no END event", path.display())]
    Unfinished { path: PathBuf },

    #[error("scoreboard write failed: {0}")]
    Scoreboard(#[source] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Alias for `Result<T, ReplayError>`.
pub type ReplayResult<T> = Result<T, ReplayError>;
