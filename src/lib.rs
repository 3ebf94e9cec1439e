//! livecap - Live scrolling captions with optional translation
//!
//! Continuous audio capture, utterance segmentation, ordered
//! transcription, and a pipelined translation overlay.

// Error handling discipline: library code propagates, it never panics.
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod segmenter;
pub mod stt;
pub mod translate;

// Core traits (source → stations → sink)
pub use audio::AudioSource;
pub use pipeline::sink::{CollectorSink, PresentationSink};
pub use stt::SpeechEngine;
pub use translate::Translator;

// Pipeline
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle, PipelineMetrics};

// Error handling
pub use error::{LivecapError, Result};

// Config
pub use config::{Config, SourceMode};

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
