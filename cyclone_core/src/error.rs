//! Error types for the stitching engines.

use cyclone_env::{CalendarDateTime, EnvError};
use std::path::PathBuf;

/// Errors that abort processing of a window pair.
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    /// Storm record is inconsistent (variable set, gap length, step order, calendar)
    #[error("Malformed storm: {0}")]
    MalformedStorm(String),
    
    /// The early storm outlasts a late storm starting at the same time
    #[error("Ambiguous overlap at {start}: early track has {early_len} points, late track {late_len}")]
    OverlapAmbiguity {
        start: CalendarDateTime,
        early_len: usize,
        late_len: usize,
    },
    
    /// A header or point line does not tokenize into the expected fields
    #[error("Track file format error in {} line {line}: {reason}", .path.display())]
    TrackFileFormat {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    
    /// Configuration could not be read or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
    
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StitchError {
    /// Creates a malformed storm error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedStorm(msg.into())
    }
    
    /// Creates a track file format error.
    pub fn format(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::TrackFileFormat {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

impl From<EnvError> for StitchError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::UnknownCalendar(_) | EnvError::InvalidDate { .. } => {
                Self::MalformedStorm(err.to_string())
            }
            EnvError::InvalidTimeUnits(_)
            | EnvError::EmptyTimeCoordinate
            | EnvError::InvalidTimePeriod(_) => Self::Config(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StitchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
