use thiserror::Error;

use crate::drill::RangeKey;

/// Errors returned by sequencer commands. None of these change session state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("settings have not been loaded yet")]
    SettingsUnavailable,

    #[error("a practice session is already running or paused")]
    AlreadyActive,

    #[error("unknown drill type: {0}")]
    InvalidDrillType(String),
}

/// Raised by an audio backend when a cue cannot be started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("cue playback failed: {0}")]
    Playback(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SettingsError {
    #[error("settings have not been loaded yet")]
    NotLoaded,

    #[error("{key} range is inverted: min {min} > max {max}")]
    InvalidRange { key: RangeKey, min: f64, max: f64 },

    #[error("{key} bounds must be finite and non-negative (got {value})")]
    NegativeBound { key: RangeKey, value: f64 },

    #[error("{key} max of {max}s exceeds the {limit}s limit")]
    TooLong { key: RangeKey, max: f64, limit: f64 },

    #[error("number of reps must be at least 1")]
    ZeroReps,

    #[error("unknown delay range: {0}")]
    UnknownRange(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare history directory: {0}")]
    Io(#[from] std::io::Error),
}
