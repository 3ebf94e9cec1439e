//! Transcription station: a worker pool around the speech engine with
//! retry handling and ordered release.
//!
//! Segments are dispatched to worker threads as they arrive, up to the
//! configured concurrency. Workers may finish out of order; every event
//! they produce goes through a [`ReorderBuffer`] so downstream consumers
//! always observe segment-id order. A segment whose engine request fails
//! after retries still produces a final event (flagged as an error) so
//! the caption sequence never stalls on a hole.

use crate::config::HotConfigHandle;
use crate::pipeline::error::StationError;
use crate::pipeline::reorder::ReorderBuffer;
use crate::pipeline::station::Station;
use crate::pipeline::types::{Segment, TranscriptEvent};
use crate::stt::SpeechEngine;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long `flush` waits for in-flight engine requests before giving up.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Tuning for the transcription worker pool.
#[derive(Debug, Clone)]
pub struct TranscriberPoolConfig {
    /// Engine requests allowed in flight at once.
    pub concurrency: usize,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for TranscriberPoolConfig {
    fn default() -> Self {
        use crate::defaults;
        Self {
            concurrency: defaults::STAGE_CONCURRENCY,
            max_retries: defaults::MAX_RETRIES,
            retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
        }
    }
}

struct Job {
    segment: Segment,
    language: String,
}

pub struct TranscriberStation {
    config: TranscriberPoolConfig,
    hot: HotConfigHandle,
    job_tx: Option<Sender<Job>>,
    completion_rx: Receiver<TranscriptEvent>,
    workers: Vec<JoinHandle<()>>,
    reorder: ReorderBuffer<TranscriptEvent>,
    /// Segments dispatched whose final event has not yet come back.
    in_flight: usize,
}

impl TranscriberStation {
    /// Spawns the worker pool. The engine is shared across workers, so it
    /// must tolerate concurrent `transcribe` calls.
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        config: TranscriberPoolConfig,
        hot: HotConfigHandle,
    ) -> Self {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (completion_tx, completion_rx) = unbounded();

        let workers = (0..config.concurrency.max(1))
            .map(|_| {
                let job_rx = job_rx.clone();
                let completion_tx = completion_tx.clone();
                let engine = Arc::clone(&engine);
                let pool_config = config.clone();
                std::thread::spawn(move || {
                    worker_loop(engine, job_rx, completion_tx, pool_config);
                })
            })
            .collect();

        Self {
            config,
            hot,
            job_tx: Some(job_tx),
            completion_rx,
            workers,
            reorder: ReorderBuffer::new(0),
            in_flight: 0,
        }
    }

    /// Routes one completion through the reorder buffer. Returns true when
    /// the completion carries an engine failure.
    fn handle_completion(&mut self, event: TranscriptEvent, out: &mut Vec<TranscriptEvent>) -> bool {
        let failed = event.error;
        let terminal = event.is_final;
        if terminal {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
        self.reorder.push(event.segment_id, event, terminal, out);
        failed
    }

    /// Drains completions without blocking.
    fn drain_completions(&mut self, out: &mut Vec<TranscriptEvent>) -> usize {
        let mut failures = 0;
        while let Ok(event) = self.completion_rx.try_recv() {
            if self.handle_completion(event, out) {
                failures += 1;
            }
        }
        failures
    }
}

impl Station for TranscriberStation {
    type Input = Segment;
    type Output = TranscriptEvent;

    fn process(
        &mut self,
        segment: Segment,
        out: &mut Vec<TranscriptEvent>,
    ) -> Result<(), StationError> {
        let mut failures = self.drain_completions(out);

        // At capacity: block on completions rather than queueing unboundedly,
        // which backpressures the segmenter through the input channel.
        while self.in_flight >= self.config.concurrency.max(1) {
            match self.completion_rx.recv_timeout(DRAIN_DEADLINE) {
                Ok(event) => {
                    if self.handle_completion(event, out) {
                        failures += 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(StationError::Fatal(
                        "engine worker pool stalled".to_string(),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(StationError::Fatal(
                        "engine worker pool exited".to_string(),
                    ));
                }
            }
        }

        let language = self
            .hot
            .read()
            .map(|hot| hot.language.clone())
            .unwrap_or_else(|_| crate::defaults::DEFAULT_LANGUAGE.to_string());

        let job = Job { segment, language };
        if let Some(job_tx) = &self.job_tx
            && job_tx.send(job).is_ok()
        {
            self.in_flight += 1;
        } else {
            return Err(StationError::Fatal(
                "engine worker pool unavailable".to_string(),
            ));
        }

        if failures > 0 {
            Err(StationError::Recoverable(format!(
                "{} segment(s) failed transcription after retries",
                failures
            )))
        } else {
            Ok(())
        }
    }

    fn tick(&mut self, out: &mut Vec<TranscriptEvent>) -> Result<(), StationError> {
        let failures = self.drain_completions(out);
        if failures > 0 {
            Err(StationError::Recoverable(format!(
                "{} segment(s) failed transcription after retries",
                failures
            )))
        } else {
            Ok(())
        }
    }

    fn flush(&mut self, out: &mut Vec<TranscriptEvent>) {
        // No further input is coming; wait for in-flight requests so their
        // finals still reach the captions.
        let deadline = std::time::Instant::now() + DRAIN_DEADLINE;
        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.completion_rx.recv_timeout(remaining) {
                Ok(event) => {
                    self.handle_completion(event, out);
                }
                Err(_) => break,
            }
        }
    }

    fn name(&self) -> &'static str {
        "transcriber"
    }

    fn shutdown(&mut self) {
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    engine: Arc<dyn SpeechEngine>,
    job_rx: Receiver<Job>,
    completion_tx: Sender<TranscriptEvent>,
    config: TranscriberPoolConfig,
) {
    while let Ok(job) = job_rx.recv() {
        let Job { segment, language } = job;
        let id = segment.id;
        let continuation = segment.continuation;

        let mut result = None;
        for attempt in 0..=config.max_retries {
            let mut on_partial = |text: String| {
                let _ = completion_tx.send(TranscriptEvent::partial(id, text, continuation));
            };
            match engine.transcribe(&segment.samples, &language, &mut on_partial) {
                Ok(transcription) => {
                    result = Some(transcription);
                    break;
                }
                Err(_) if attempt < config.max_retries => {
                    // Exponential backoff between attempts.
                    std::thread::sleep(config.retry_backoff * 2u32.pow(attempt));
                }
                Err(_) => {}
            }
        }

        let event = match result {
            Some(transcription) => {
                let language = if transcription.language.is_empty() {
                    None
                } else {
                    Some(transcription.language)
                };
                TranscriptEvent::final_ok(id, transcription.text, language, continuation)
            }
            None => TranscriptEvent::final_error(id, continuation),
        };
        if completion_tx.send(event).is_err() {
            break;
        }
        // Segment samples drop here; audio is never retained past its final.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SourceMode};
    use crate::stt::MockEngine;

    fn segment(id: u64) -> Segment {
        Segment {
            id,
            start_seq: id * 10,
            end_seq: id * 10 + 9,
            samples: vec![1000i16; 1600],
            source: SourceMode::Mic,
            continuation: false,
        }
    }

    fn pool_config(concurrency: usize) -> TranscriberPoolConfig {
        TranscriberPoolConfig {
            concurrency,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn station(engine: MockEngine, concurrency: usize) -> TranscriberStation {
        TranscriberStation::new(
            Arc::new(engine),
            pool_config(concurrency),
            Config::default().hot_handle(),
        )
    }

    /// Pumps process + ticks until `station` has released `n` final events
    /// or the deadline passes.
    fn collect_finals(
        station: &mut TranscriberStation,
        segments: Vec<Segment>,
        n: usize,
    ) -> Vec<TranscriptEvent> {
        let mut out = Vec::new();
        for seg in segments {
            let _ = station.process(seg, &mut out);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while out.iter().filter(|e| e.is_final).count() < n
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
            let _ = station.tick(&mut out);
        }
        station.shutdown();
        out
    }

    #[test]
    fn test_finals_released_in_segment_order() {
        let engine = MockEngine::new("m").with_response("hello");
        let mut station = station(engine, 2);

        let out = collect_finals(&mut station, vec![segment(0), segment(1), segment(2)], 3);
        let finals: Vec<u64> = out
            .iter()
            .filter(|e| e.is_final)
            .map(|e| e.segment_id)
            .collect();
        assert_eq!(finals, vec![0, 1, 2]);
        assert!(out.iter().all(|e| !e.error));
    }

    #[test]
    fn test_slow_head_holds_later_finals() {
        // Segment 0 takes much longer than segment 1; order must still hold.
        let engine = MockEngine::new("m")
            .with_response("x")
            .with_delays(vec![Duration::from_millis(200), Duration::from_millis(1)]);
        let mut station = station(engine, 2);

        let out = collect_finals(&mut station, vec![segment(0), segment(1)], 2);
        let finals: Vec<u64> = out
            .iter()
            .filter(|e| e.is_final)
            .map(|e| e.segment_id)
            .collect();
        assert_eq!(finals, vec![0, 1]);
    }

    #[test]
    fn test_transient_failure_retried_to_success() {
        let engine = MockEngine::new("m").with_response("recovered").failing_first(2);
        let mut station = station(engine, 1);

        let out = collect_finals(&mut station, vec![segment(0)], 1);
        let final_event = out.iter().find(|e| e.is_final).unwrap();
        assert!(!final_event.error);
        assert_eq!(final_event.text, "recovered");
    }

    #[test]
    fn test_exhausted_retries_produce_error_final() {
        let engine = MockEngine::new("m").with_failure();
        let mut station = station(engine, 1);

        let out = collect_finals(&mut station, vec![segment(0), segment(1)], 2);
        let finals: Vec<&TranscriptEvent> = out.iter().filter(|e| e.is_final).collect();
        assert_eq!(finals.len(), 2);
        assert!(finals.iter().all(|e| e.error && e.text.is_empty()));
        // Ids still advance past the failures.
        assert_eq!(finals[0].segment_id, 0);
        assert_eq!(finals[1].segment_id, 1);
    }

    #[test]
    fn test_failed_segment_does_not_block_successor() {
        let engine = MockEngine::new("m")
            .with_response("fallback")
            .with_script(vec![Err("boom"), Err("boom"), Err("boom"), Ok("next")]);
        let mut station = station(engine, 1);

        let out = collect_finals(&mut station, vec![segment(0), segment(1)], 2);
        let finals: Vec<&TranscriptEvent> = out.iter().filter(|e| e.is_final).collect();
        assert_eq!(finals.len(), 2);
        assert_eq!(finals[0].segment_id, 0);
        assert!(finals[0].error);
        assert_eq!(finals[1].segment_id, 1);
        assert_eq!(finals[1].text, "next");
        assert!(!finals[1].error);
    }

    #[test]
    fn test_partials_precede_final_for_same_segment() {
        let engine = MockEngine::new("m")
            .with_partials(&["hel", "hello wor"])
            .with_response("hello world");
        let mut station = station(engine, 1);

        let out = collect_finals(&mut station, vec![segment(0)], 1);
        let final_pos = out.iter().position(|e| e.is_final).unwrap();
        let partials: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_final)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(partials.len(), 2);
        assert!(partials.iter().all(|&i| i < final_pos));
        assert_eq!(out[final_pos].text, "hello world");
    }

    #[test]
    fn test_flush_waits_for_in_flight_segments() {
        let engine = MockEngine::new("m")
            .with_response("late")
            .with_delays(vec![Duration::from_millis(100)]);
        let mut station = station(engine, 1);

        let mut out = Vec::new();
        station.process(segment(0), &mut out).unwrap();
        station.flush(&mut out);
        station.shutdown();

        assert!(out.iter().any(|e| e.is_final && e.text == "late"));
    }

    #[test]
    fn test_reorder_buffer_starts_at_zero() {
        let engine = MockEngine::new("m");
        let station = station(engine, 1);
        assert_eq!(station.reorder.head(), 0);
    }

    #[test]
    fn test_segment_starting_nonzero_blocks_until_predecessors() {
        // Sanity check on the reorder discipline: if the first segment the
        // station ever sees has id 1 (id 0 lost upstream), its events wait.
        let engine = MockEngine::new("m").with_response("x");
        let mut station = station(engine, 1);

        let mut out = Vec::new();
        let _ = station.process(segment(1), &mut out);
        let deadline = std::time::Instant::now() + Duration::from_millis(300);
        while std::time::Instant::now() < deadline {
            let _ = station.tick(&mut out);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(out.is_empty(), "events for id 1 must wait for id 0");
        station.shutdown();
    }
}
