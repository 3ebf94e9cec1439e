//! Command-line interface for livecap
//!
//! Provides argument parsing using clap derive macros.

use crate::config::SourceMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Live captions for system and microphone audio
#[derive(Parser, Debug)]
#[command(name = "livecap", version, about = "Live captions for system and microphone audio")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (captions still render)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: pipeline stats, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio sources to caption (mic, system, mixed)
    #[arg(long, short = 's', value_name = "MODE", value_parser = parse_source_mode)]
    pub source: Option<SourceMode>,

    /// Microphone device name (default: system default input)
    #[arg(long, value_name = "DEVICE")]
    pub mic_device: Option<String>,

    /// Loopback/monitor device name for system audio
    #[arg(long, value_name = "DEVICE")]
    pub system_device: Option<String>,

    /// Caption a WAV file instead of live audio (16 kHz mono or resampled)
    #[arg(long, value_name = "FILE")]
    pub wav: Option<PathBuf>,

    /// Whisper model (default: base, multilingual). Use base.en for English-only
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Language code for transcription (default: auto-detect). Examples: auto, en, de, ja
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Enable the translation overlay
    #[arg(long, short = 't')]
    pub translate: bool,

    /// Target language for translation (default: EN). Examples: EN, DE, ZH
    #[arg(long, value_name = "LANG")]
    pub target_language: Option<String>,

    /// Silence duration that closes an utterance (default: 700ms). Examples: 500ms, 1s
    #[arg(long, value_name = "DURATION", value_parser = parse_millis)]
    pub debounce: Option<u32>,

    /// RMS threshold below which a frame counts as silence
    #[arg(long, value_name = "LEVEL")]
    pub threshold: Option<f32>,

    /// Caption window size in words (default: 40)
    #[arg(long, short = 'w', value_name = "WORDS")]
    pub word_buffer: Option<usize>,
}

/// Parse a duration string into milliseconds.
///
/// Supports any format accepted by `humantime` (`700ms`, `1s`, `1s500ms`)
/// plus bare numbers, which are taken as milliseconds.
fn parse_millis(s: &str) -> Result<u32, String> {
    let s = s.trim();
    // Bare number → milliseconds
    if let Ok(ms) = s.parse::<u32>() {
        return Ok(ms);
    }
    humantime::parse_duration(s)
        .map_err(|e| e.to_string())
        .and_then(|d| {
            u32::try_from(d.as_millis()).map_err(|_| "duration too large".to_string())
        })
}

/// Parse a source mode name (mic, system, mixed).
fn parse_source_mode(s: &str) -> Result<SourceMode, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "mic" => Ok(SourceMode::Mic),
        "system" => Ok(SourceMode::System),
        "mixed" => Ok(SourceMode::Mixed),
        other => Err(format!(
            "unknown source mode '{}' (expected mic, system, or mixed)",
            other
        )),
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file + env + CLI overrides)
    Show,
    /// Dump a configuration template with default values
    Dump,
}
