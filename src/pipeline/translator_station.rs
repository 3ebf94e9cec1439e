//! Translation station: context-aware worker pool over the translation
//! service.
//!
//! Finalized sentences arrive in caption order. Each is dispatched with a
//! snapshot of the preceding sentences as context and a dense dispatch
//! number; completions are reordered on that number (segment ids have
//! gaps here, since empty and error finals never reach translation). A
//! service failure after retries degrades the sentence to a pass-through
//! entry instead of dropping it, so the caption stream never loses text.

use crate::pipeline::error::StationError;
use crate::pipeline::reorder::ReorderBuffer;
use crate::pipeline::station::Station;
use crate::pipeline::types::{DisplayEvent, FinalSentence, TranslationEntry};
use crate::translate::Translator;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long `flush` waits for in-flight requests before giving up.
const DRAIN_DEADLINE: Duration = Duration::from_secs(15);

/// Tuning for the translation worker pool.
#[derive(Debug, Clone)]
pub struct TranslatorPoolConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Preceding finalized sentences supplied as context.
    pub context_sentences: usize,
    pub target_language: String,
}

impl Default for TranslatorPoolConfig {
    fn default() -> Self {
        use crate::defaults;
        Self {
            concurrency: defaults::STAGE_CONCURRENCY,
            max_retries: defaults::MAX_RETRIES,
            retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
            context_sentences: defaults::CONTEXT_SENTENCES,
            target_language: defaults::DEFAULT_TARGET_LANGUAGE.to_string(),
        }
    }
}

struct Job {
    seq: u64,
    sentence: FinalSentence,
    context: Vec<String>,
    context_ids: Vec<u64>,
}

pub struct TranslatorStation {
    config: TranslatorPoolConfig,
    job_tx: Option<Sender<Job>>,
    completion_rx: Receiver<(u64, TranslationEntry)>,
    workers: Vec<JoinHandle<()>>,
    reorder: ReorderBuffer<DisplayEvent>,
    /// Recent finalized sentences, oldest first, capped at
    /// `context_sentences`.
    context: VecDeque<FinalSentence>,
    next_seq: u64,
    in_flight: usize,
}

impl TranslatorStation {
    pub fn new(translator: Arc<dyn Translator>, config: TranslatorPoolConfig) -> Self {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (completion_tx, completion_rx) = unbounded();

        let workers = (0..config.concurrency.max(1))
            .map(|_| {
                let job_rx = job_rx.clone();
                let completion_tx = completion_tx.clone();
                let translator = Arc::clone(&translator);
                let pool_config = config.clone();
                std::thread::spawn(move || {
                    worker_loop(translator, job_rx, completion_tx, pool_config);
                })
            })
            .collect();

        Self {
            config,
            job_tx: Some(job_tx),
            completion_rx,
            workers,
            reorder: ReorderBuffer::new(0),
            context: VecDeque::new(),
            next_seq: 0,
            in_flight: 0,
        }
    }

    fn handle_completion(&mut self, seq: u64, entry: TranslationEntry, out: &mut Vec<DisplayEvent>) -> bool {
        let degraded = entry.degraded;
        self.in_flight = self.in_flight.saturating_sub(1);
        self.reorder
            .push(seq, DisplayEvent::TranslationReady(entry), true, out);
        degraded
    }

    fn drain_completions(&mut self, out: &mut Vec<DisplayEvent>) -> usize {
        let mut degraded = 0;
        while let Ok((seq, entry)) = self.completion_rx.try_recv() {
            if self.handle_completion(seq, entry, out) {
                degraded += 1;
            }
        }
        degraded
    }
}

impl Station for TranslatorStation {
    type Input = FinalSentence;
    type Output = DisplayEvent;

    fn process(
        &mut self,
        sentence: FinalSentence,
        out: &mut Vec<DisplayEvent>,
    ) -> Result<(), StationError> {
        let mut degraded = self.drain_completions(out);

        while self.in_flight >= self.config.concurrency.max(1) {
            match self.completion_rx.recv_timeout(DRAIN_DEADLINE) {
                Ok((seq, entry)) => {
                    if self.handle_completion(seq, entry, out) {
                        degraded += 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(StationError::Fatal(
                        "translation worker pool stalled".to_string(),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(StationError::Fatal(
                        "translation worker pool exited".to_string(),
                    ));
                }
            }
        }

        let context: Vec<String> = self.context.iter().map(|s| s.text.clone()).collect();
        let context_ids: Vec<u64> = self.context.iter().map(|s| s.segment_id).collect();

        // The sentence itself becomes context for its successors, whether
        // or not its translation succeeds.
        self.context.push_back(sentence.clone());
        while self.context.len() > self.config.context_sentences {
            self.context.pop_front();
        }

        let job = Job {
            seq: self.next_seq,
            sentence,
            context,
            context_ids,
        };
        if let Some(job_tx) = &self.job_tx
            && job_tx.send(job).is_ok()
        {
            self.next_seq += 1;
            self.in_flight += 1;
        } else {
            return Err(StationError::Fatal(
                "translation worker pool unavailable".to_string(),
            ));
        }

        if degraded > 0 {
            Err(StationError::Recoverable(format!(
                "{} sentence(s) passed through untranslated",
                degraded
            )))
        } else {
            Ok(())
        }
    }

    fn tick(&mut self, out: &mut Vec<DisplayEvent>) -> Result<(), StationError> {
        let degraded = self.drain_completions(out);
        if degraded > 0 {
            Err(StationError::Recoverable(format!(
                "{} sentence(s) passed through untranslated",
                degraded
            )))
        } else {
            Ok(())
        }
    }

    fn flush(&mut self, out: &mut Vec<DisplayEvent>) {
        let deadline = std::time::Instant::now() + DRAIN_DEADLINE;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.completion_rx.recv_timeout(remaining) {
                Ok((seq, entry)) => {
                    self.handle_completion(seq, entry, out);
                }
                Err(_) => break,
            }
        }
    }

    fn name(&self) -> &'static str {
        "translator"
    }

    fn shutdown(&mut self) {
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    translator: Arc<dyn Translator>,
    job_rx: Receiver<Job>,
    completion_tx: Sender<(u64, TranslationEntry)>,
    config: TranslatorPoolConfig,
) {
    while let Ok(job) = job_rx.recv() {
        let mut translated = None;
        for attempt in 0..=config.max_retries {
            match translator.translate(&job.sentence.text, &job.context, &config.target_language) {
                Ok(text) => {
                    translated = Some(text);
                    break;
                }
                Err(_) if attempt < config.max_retries => {
                    std::thread::sleep(config.retry_backoff * 2u32.pow(attempt));
                }
                Err(_) => {}
            }
        }

        // Degraded mode: show the source text rather than nothing.
        let degraded = translated.is_none();
        let entry = TranslationEntry {
            segment_id: job.sentence.segment_id,
            translated_text: translated.unwrap_or_else(|| job.sentence.text.clone()),
            source_text: job.sentence.text,
            context_window: job.context_ids,
            degraded,
        };
        if completion_tx.send((job.seq, entry)).is_err() {
            break;
        }
    }
}
