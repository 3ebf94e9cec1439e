//! Audio capture: source traits, live capture, mixing, and WAV replay.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod mixer;
pub mod source;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::{CpalAudioSource, list_devices, suppress_audio_warnings};
pub use mixer::MixedSource;
pub use source::{AudioSource, Clock, MockAudioSource, MockClock, SourceFactory, SystemClock};
pub use wav::WavAudioSource;
