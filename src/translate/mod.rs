//! Translation boundary: the translator trait, a mock for tests, and the
//! DeepL client.

pub mod deepl;

pub use deepl::{DeepLConfig, DeepLTranslator};

use crate::error::{LivecapError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Trait for the machine translation service.
///
/// `context` carries the preceding finalized sentences, oldest first; the
/// service may use them for pronoun and tense resolution but only `text`
/// is translated. Implementations must tolerate concurrent calls.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, context: &[String], target_lang: &str) -> Result<String>;

    /// Service name for logging.
    fn name(&self) -> &'static str;
}

/// Implement Translator for Arc<T> so one client can be shared across the
/// worker pool.
impl<T: Translator + ?Sized> Translator for Arc<T> {
    fn translate(&self, text: &str, context: &[String], target_lang: &str) -> Result<String> {
        (**self).translate(text, context, target_lang)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Mock translator for testing.
///
/// Default behavior tags the input so tests can tell translations from
/// pass-throughs. Records every context window it is handed.
#[derive(Debug)]
pub struct MockTranslator {
    should_fail: bool,
    fail_first: AtomicU32,
    delays: Mutex<VecDeque<Duration>>,
    contexts: Mutex<Vec<Vec<String>>>,
    calls: AtomicU32,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self {
            should_fail: false,
            fail_first: AtomicU32::new(0),
            delays: Mutex::new(VecDeque::new()),
            contexts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Configure the mock to fail every call (service outage).
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to fail the first `n` calls, then succeed.
    pub fn failing_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Delays consumed one per call, to stagger worker completions.
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap() = delays.into();
        self
    }

    /// Context windows observed so far, in call order.
    pub fn contexts(&self) -> Vec<Vec<String>> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator for MockTranslator {
    fn translate(&self, text: &str, context: &[String], target_lang: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_vec());

        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.should_fail {
            return Err(LivecapError::Translation {
                message: "mock translation failure".to_string(),
            });
        }
        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LivecapError::Translation {
                message: "mock transient failure".to_string(),
            });
        }

        Ok(format!("[{}] {}", target_lang, text))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
