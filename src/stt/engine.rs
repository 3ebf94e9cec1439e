use crate::error::{LivecapError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// The settled output of one engine request.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// Recognized text, trimmed. May be empty for non-speech audio.
    pub text: String,
    /// Detected language code, empty when the engine does not report one.
    pub language: String,
    /// Aggregate confidence in 0.0..=1.0.
    pub confidence: f32,
}

/// Trait for the speech recognition engine.
///
/// The pipeline treats the engine as a black box: audio in, text out.
/// Implementations must be safe to call from several worker threads at
/// once. `on_partial` receives interim hypotheses when the engine can
/// produce them; engines that decode whole utterances may never call it.
pub trait SpeechEngine: Send + Sync {
    /// Transcribe one utterance of 16kHz mono PCM.
    ///
    /// `language` is a hint ("auto" lets the engine detect). Interim
    /// hypotheses, when available, are streamed through `on_partial`
    /// before the final result returns.
    fn transcribe(
        &self,
        audio: &[i16],
        language: &str,
        on_partial: &mut dyn FnMut(String),
    ) -> Result<Transcription>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;

    /// Whether the engine can serve requests.
    fn is_ready(&self) -> bool;
}

/// Implement SpeechEngine for Arc<T> so one engine can be shared across
/// the worker pool.
impl<T: SpeechEngine + ?Sized> SpeechEngine for Arc<T> {
    fn transcribe(
        &self,
        audio: &[i16],
        language: &str,
        on_partial: &mut dyn FnMut(String),
    ) -> Result<Transcription> {
        (**self).transcribe(audio, language, on_partial)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Mock engine for testing.
///
/// Supports a fixed response, scripted per-call results, interim
/// hypotheses, a bounded number of leading failures (for retry tests),
/// and per-call delays (for out-of-order completion tests).
#[derive(Debug)]
pub struct MockEngine {
    model_name: String,
    response: String,
    partials: Vec<String>,
    should_fail: bool,
    fail_first: AtomicU32,
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    delays: Mutex<VecDeque<Duration>>,
    calls: AtomicU32,
}

impl MockEngine {
    /// Create a new mock engine with default settings.
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            partials: Vec::new(),
            should_fail: false,
            fail_first: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            delays: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Configure the mock to return a specific final text.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to emit interim hypotheses before each final.
    pub fn with_partials(mut self, partials: &[&str]) -> Self {
        self.partials = partials.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Configure the mock to fail every call.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to fail the first `n` calls, then succeed.
    pub fn failing_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Script results consumed one per call, in call order. `Err` strings
    /// become engine errors. Once the script runs out, the fixed response
    /// applies again.
    pub fn with_script(self, script: Vec<std::result::Result<&str, &str>>) -> Self {
        let mut queue = VecDeque::new();
        for entry in script {
            queue.push_back(match entry {
                Ok(text) => Ok(text.to_string()),
                Err(message) => Err(message.to_string()),
            });
        }
        *self.script.lock().unwrap() = queue;
        self
    }

    /// Delays consumed one per call, to stagger worker completions.
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap() = delays.into();
        self
    }

    /// Total number of transcribe calls observed.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for MockEngine {
    fn transcribe(
        &self,
        _audio: &[i16],
        language: &str,
        on_partial: &mut dyn FnMut(String),
    ) -> Result<Transcription> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.should_fail {
            return Err(LivecapError::Engine {
                message: "mock transcription failure".to_string(),
            });
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LivecapError::Engine {
                message: "mock transient failure".to_string(),
            });
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let text = match scripted {
            Some(Ok(text)) => text,
            Some(Err(message)) => return Err(LivecapError::Engine { message }),
            None => self.response.clone(),
        };

        for partial in &self.partials {
            on_partial(partial.clone());
        }

        let detected = if language == crate::defaults::DEFAULT_LANGUAGE {
            "en".to_string()
        } else {
            language.to_string()
        };
        Ok(Transcription {
            text,
            language: detected,
            confidence: 1.0,
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
