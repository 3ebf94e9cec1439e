//! Default configuration constants for livecap.
//!
//! Shared across config, CLI and pipeline construction so the same numbers
//! appear in exactly one place.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and is what the caption
/// pipeline normalizes every source to.
pub const SAMPLE_RATE: u32 = 16000;

/// Default silence threshold (normalized RMS, 0.0 to 1.0).
///
/// Frames below this energy count as silence. Smaller values make the
/// segmenter more sensitive to quiet speech.
pub const SILENCE_THRESHOLD: f32 = 0.02;

/// Default silence run length before an open segment is closed (milliseconds).
pub const DEBOUNCE_MS: u32 = 700;

/// Pre-roll duration in milliseconds.
///
/// Silence frames kept in a ring buffer while idle, prepended when speech
/// starts so soft onsets (plosives, fricatives) are not clipped.
pub const PRE_ROLL_MS: u32 = 500;

/// Post-roll padding in milliseconds.
///
/// Trailing silence included when a segment closes so word endings are not
/// clipped when the debounce is short.
pub const POST_ROLL_MS: u32 = 150;

/// Maximum segment duration before a force-split (milliseconds).
///
/// Continuous speech longer than this is split into multiple segments with
/// the continuation flag set, so the pipeline never holds unbounded audio.
pub const MAX_SEGMENT_MS: u32 = 10_000;

/// Default visible caption window, in words.
pub const WORD_BUFFER: usize = 40;

/// Default number of prior sentences supplied as translation context.
pub const CONTEXT_SENTENCES: usize = 3;

/// Default concurrent in-flight requests per engine stage.
pub const STAGE_CONCURRENCY: usize = 1;

/// Default retry attempts for transient engine/service failures.
pub const MAX_RETRIES: u32 = 2;

/// Base backoff between retries (milliseconds, doubled per attempt).
pub const RETRY_BACKOFF_MS: u64 = 250;

/// Timeout for a single translation request (milliseconds).
pub const TRANSLATION_TIMEOUT_MS: u64 = 10_000;

/// How long a mixed-mode sub-source may go quiet before it is declared
/// stalled and the adapter degrades to the remaining source (milliseconds).
pub const SOURCE_STALL_MS: u64 = 2_000;

/// Default Whisper model name.
pub const DEFAULT_MODEL: &str = "base";

/// Default source language code for transcription.
///
/// "auto" lets the engine detect the spoken language.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Default translation target language (DeepL code).
pub const DEFAULT_TARGET_LANGUAGE: &str = "EN";
