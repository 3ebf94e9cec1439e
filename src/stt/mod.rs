//! Speech recognition boundary: the engine trait, a mock for tests, and
//! the Whisper implementation.

pub mod engine;
pub mod whisper;

pub use engine::{MockEngine, SpeechEngine, Transcription};
pub use whisper::{WhisperEngine, WhisperEngineConfig};
