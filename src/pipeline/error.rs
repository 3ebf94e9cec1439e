//! Station fault classification and reporting.
//!
//! A failing station step either loses one input or takes the station
//! down; the runner only needs to know which, so this split lives in a
//! two-variant error rather than the crate-wide taxonomy.

use std::fmt;

/// How badly a station step went.
#[derive(Debug, Clone)]
pub enum StationError {
    /// The offending input is lost; the station keeps running.
    Recoverable(String),
    /// The station cannot continue and its runner tears it down.
    Fatal(String),
}

impl StationError {
    /// True when the runner must stop driving the station.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StationError::Fatal(_))
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(msg) => write!(f, "recoverable: {}", msg),
            StationError::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

impl std::error::Error for StationError {}

/// Where station failures go. Failures never travel the data channels;
/// a reporter observes them while the stations keep running.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, station: &str, error: &StationError);
}

/// Reporter that writes one prefixed line per failure to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        eprintln!("livecap: {} station: {}", station, error);
    }
}
