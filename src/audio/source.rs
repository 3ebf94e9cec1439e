//! Audio source and clock seams, with mocks for deterministic tests.

use crate::config::SourceMode;
use crate::error::{LivecapError, Result};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Trait for audio source devices.
///
/// Allows swapping implementations: real capture, mixed capture, WAV
/// replay, or mocks. `read_samples` is non-blocking and returns whatever
/// accumulated since the last read; an empty read from a finite source
/// means end of stream.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read accumulated 16-bit PCM samples since the last read.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Whether this source ends on its own (file replay) rather than
    /// running until stopped (live capture).
    fn is_finite(&self) -> bool {
        false
    }

    /// Which capture mode this source represents, stamped onto frames.
    fn source_tag(&self) -> SourceMode;
}

/// Builds a capture source for a given mode.
///
/// Lets the running pipeline swap sources when the mode toggles, instead
/// of tearing the whole pipeline down for a restart.
#[derive(Clone)]
pub struct SourceFactory(Arc<dyn Fn(SourceMode) -> Result<Box<dyn AudioSource>> + Send + Sync>);

impl SourceFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(SourceMode) -> Result<Box<dyn AudioSource>> + Send + Sync + 'static,
    {
        Self(Arc::new(build))
    }

    /// Builds a fresh, not-yet-started source for the given mode.
    pub fn build(&self, mode: SourceMode) -> Result<Box<dyn AudioSource>> {
        (self.0)(mode)
    }
}

impl fmt::Debug for SourceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SourceFactory")
    }
}

/// Wall-clock seam so stall detection can be driven in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Debug)]
pub struct MockClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

/// Mock audio source for testing.
///
/// Serves a scripted sequence of reads ("phases"), then keeps returning
/// the last phase, or empty reads when marked finite.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    phases: Vec<Vec<i16>>,
    next_phase: usize,
    repeat_last: bool,
    finite: bool,
    tag: SourceMode,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    pub fn new() -> Self {
        Self {
            is_started: false,
            phases: vec![vec![0i16; 160]],
            next_phase: 0,
            repeat_last: true,
            finite: false,
            tag: SourceMode::Mic,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// One fixed read result, repeated forever.
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.phases = vec![samples];
        self
    }

    /// Scripted read results consumed in order. After the last phase the
    /// source repeats it, unless also marked finite.
    pub fn with_phases(mut self, phases: Vec<Vec<i16>>) -> Self {
        self.phases = phases;
        self
    }

    /// Exhausting the phases ends the stream (empty reads).
    pub fn finite(mut self) -> Self {
        self.finite = true;
        self.repeat_last = false;
        self
    }

    pub fn with_tag(mut self, tag: SourceMode) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(LivecapError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(LivecapError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        match self.phases.get(self.next_phase) {
            Some(phase) => {
                let samples = phase.clone();
                if self.next_phase + 1 < self.phases.len() || !self.repeat_last {
                    self.next_phase += 1;
                }
                Ok(samples)
            }
            None => Ok(Vec::new()),
        }
    }

    fn is_finite(&self) -> bool {
        self.finite
    }

    fn source_tag(&self) -> SourceMode {
        self.tag
    }
}
