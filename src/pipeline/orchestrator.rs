//! Caption pipeline that runs from startup until shutdown.

use crate::audio::{AudioSource, SourceFactory};
use crate::config::{Config, HotConfigHandle};
use crate::error::Result;
use crate::pipeline::caption::CaptionStation;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::segmenter_station::SegmenterStation;
use crate::pipeline::sink::{PresentationSink, SinkStation};
use crate::pipeline::station::StationRunner;
use crate::pipeline::transcriber_station::{TranscriberPoolConfig, TranscriberStation};
use crate::pipeline::translator_station::{TranslatorPoolConfig, TranslatorStation};
use crate::pipeline::types::{AudioFrame, DisplayEvent, FinalSentence};
use crate::segmenter::SegmenterConfig;
use crate::stt::SpeechEngine;
use crate::translate::Translator;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Segmenter configuration
    pub segmenter: SegmenterConfig,
    /// Transcription worker pool configuration
    pub transcriber: TranscriberPoolConfig,
    /// Translation worker pool configuration
    pub translator: TranslatorPoolConfig,
    /// Caption word budget
    pub word_budget: usize,
    /// Hot-reloadable settings shared with the stations
    pub hot: HotConfigHandle,
    /// Channel buffer sizes
    pub audio_buffer: usize,
    pub segment_buffer: usize,
    pub transcript_buffer: usize,
    pub sentence_buffer: usize,
    pub display_buffer: usize,
    /// Side channel from the audio source (mixed-mode degradation
    /// notices); forwarded into the display stream.
    pub source_event_rx: Option<Receiver<DisplayEvent>>,
    /// Builds replacement sources when the hot-config mode changes.
    /// Without one, the source handed to `start` is fixed for the run.
    pub source_factory: Option<SourceFactory>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineConfig {
    /// Derive the pipeline tuning from the application configuration.
    pub fn from_config(config: &Config) -> Self {
        use crate::defaults;
        Self {
            segmenter: SegmenterConfig {
                silence_threshold: config.audio.silence_threshold,
                debounce_ms: config.audio.debounce_ms,
                pre_roll_ms: config.audio.pre_roll_ms,
                post_roll_ms: config.audio.post_roll_ms,
                max_segment_ms: config.audio.max_segment_ms,
                sample_rate: config.audio.sample_rate,
            },
            transcriber: TranscriberPoolConfig {
                concurrency: config.stt.concurrency,
                max_retries: config.stt.max_retries,
                retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
            },
            translator: TranslatorPoolConfig {
                concurrency: config.translation.concurrency,
                max_retries: config.translation.max_retries,
                retry_backoff: Duration::from_millis(defaults::RETRY_BACKOFF_MS),
                context_sentences: config.translation.context_sentences,
                target_language: config.translation.target_language.clone(),
            },
            word_budget: config.display.word_buffer,
            hot: config.hot_handle(),
            audio_buffer: 1024,
            segment_buffer: 16,
            transcript_buffer: 64,
            sentence_buffer: 16,
            display_buffer: 64,
            source_event_rx: None,
            source_factory: None,
        }
    }
}

/// Counters observable while the pipeline runs.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Frames handed to the segmenter.
    pub frames_captured: AtomicU64,
    /// Frames evicted because the capture channel was full. Each eviction
    /// means transcription fell behind real time.
    pub overruns: AtomicU64,
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    /// Flag to signal shutdown
    running: Arc<AtomicBool>,
    /// Join handles for spawned threads
    threads: Vec<JoinHandle<()>>,
    /// Receiver for sink's finish() result
    result_rx: Option<crossbeam_channel::Receiver<Option<String>>>,
    metrics: Arc<PipelineMetrics>,
}

impl PipelineHandle {
    /// Stops the pipeline gracefully and returns the sink's final caption.
    ///
    /// Waits up to 5s for the result while in-flight engine and translation
    /// requests drain, then 1s for threads to finish. After the deadline,
    /// remaining threads are detached; they die with the process.
    pub fn stop(mut self) -> Option<String> {
        self.running.store(false, Ordering::SeqCst);

        // The result may arrive before all threads finish (the sink sends it
        // from its shutdown hook while upstream stations are still joining).
        let result = self
            .result_rx
            .as_ref()
            .and_then(|rx| rx.recv_timeout(Duration::from_secs(5)).ok().flatten());

        self.join_threads();
        result
    }

    /// Blocks until the pipeline drains on its own and returns the sink's
    /// final caption.
    ///
    /// Intended for finite sources (file replay); a live pipeline never
    /// finishes by itself.
    pub fn wait(mut self) -> Option<String> {
        let result = self
            .result_rx
            .as_ref()
            .and_then(|rx| rx.recv().ok().flatten());
        self.running.store(false, Ordering::SeqCst);
        self.join_threads();
        result
    }

    fn join_threads(&mut self) {
        let deadline = Instant::now() + Duration::from_secs(1);
        let poll_interval = Duration::from_millis(50);

        loop {
            // Drain finished threads, joining each to catch panics.
            let mut remaining = Vec::new();
            for handle in self.threads.drain(..) {
                if handle.is_finished() {
                    if let Err(panic_info) = handle.join() {
                        let msg = panic_info
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                            .unwrap_or("unknown panic");
                        eprintln!("livecap: pipeline thread panicked: {msg}");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            self.threads = remaining;

            if self.threads.is_empty() {
                break;
            }

            if Instant::now() >= deadline {
                eprintln!(
                    "livecap: shutdown timeout, {} thread(s) still running, detaching",
                    self.threads.len()
                );
                break;
            }

            thread::sleep(poll_interval);
        }
    }

    /// Returns true if the pipeline is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared counters for the running pipeline.
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }
}

/// Caption pipeline:
/// AudioSource → Segmenter → Transcriber → Caption → Sink, with the
/// translator branching off the caption station and merging back into the
/// display stream.
pub struct Pipeline {
    config: PipelineConfig,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Pipeline {
    /// Creates a new pipeline with the default error reporter.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Starts the pipeline.
    ///
    /// # Arguments
    /// * `audio_source` - Audio capture source (live, mixed, or replay)
    /// * `engine` - Speech recognition engine, shared across workers
    /// * `translator` - Translation service; None leaves the translation
    ///   stage unwired entirely
    /// * `sink` - Presentation adapter receiving ordered display events
    pub fn start(
        self,
        mut audio_source: Box<dyn AudioSource>,
        engine: Arc<dyn SpeechEngine>,
        translator: Option<Arc<dyn Translator>>,
        sink: Box<dyn PresentationSink>,
    ) -> Result<PipelineHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(PipelineMetrics::default());

        // Channels between stations.
        let (audio_tx, audio_rx) = bounded(self.config.audio_buffer);
        let (segment_tx, segment_rx) = bounded(self.config.segment_buffer);
        let (transcript_tx, transcript_rx) = bounded(self.config.transcript_buffer);
        let (display_tx, display_rx) = bounded(self.config.display_buffer);

        let segmenter_station =
            SegmenterStation::new(self.config.segmenter.clone(), self.config.hot.clone());

        let transcriber_station = TranscriberStation::new(
            engine,
            self.config.transcriber.clone(),
            self.config.hot.clone(),
        );

        // The translation branch only exists when a service is wired; the
        // runtime toggle in the hot config gates dispatch, not wiring.
        let mut translator_runner = None;
        let sentence_tx: Option<Sender<FinalSentence>> = translator.map(|translator| {
            let (sentence_tx, sentence_rx) = bounded(self.config.sentence_buffer);
            let station = TranslatorStation::new(translator, self.config.translator.clone());
            translator_runner = Some(StationRunner::spawn(
                station,
                sentence_rx,
                display_tx.clone(),
                self.error_reporter.clone(),
            ));
            sentence_tx
        });

        let caption_station = CaptionStation::new(
            self.config.word_budget,
            self.config.hot.clone(),
            sentence_tx,
        );

        let (result_tx, result_rx) = bounded(1);
        let sink_station = SinkStation::new(sink).with_result_sender(result_tx);

        // Spawn station runners.
        let segmenter_runner = StationRunner::spawn(
            segmenter_station,
            audio_rx.clone(),
            segment_tx,
            self.error_reporter.clone(),
        );
        let transcriber_runner = StationRunner::spawn(
            transcriber_station,
            segment_rx,
            transcript_tx,
            self.error_reporter.clone(),
        );
        let caption_runner = StationRunner::spawn(
            caption_station,
            transcript_rx,
            display_tx.clone(),
            self.error_reporter.clone(),
        );

        // The sink produces nothing; its output channel exists only to
        // satisfy the runner shape.
        let (sink_out_tx, sink_out_rx) = bounded::<()>(1);
        drop(sink_out_rx);
        let sink_runner = StationRunner::spawn(
            sink_station,
            display_rx,
            sink_out_tx,
            self.error_reporter.clone(),
        );

        // Forward mixed-source degradation notices into the display stream.
        let mut extra_threads: Vec<JoinHandle<()>> = Vec::new();
        if let Some(source_event_rx) = self.config.source_event_rx.clone() {
            let forward_tx = display_tx.clone();
            extra_threads.push(thread::spawn(move || {
                while let Ok(event) = source_event_rx.recv() {
                    if forward_tx.send(event).is_err() {
                        break;
                    }
                }
            }));
        }

        // Start audio capture.
        audio_source.start()?;

        // Spawn the audio polling thread. It owns the only long-lived
        // audio_tx, so its exit starts the flush cascade down the chain.
        let audio_running = running.clone();
        let audio_metrics = metrics.clone();
        let error_tx = display_tx;
        let hot = self.config.hot.clone();
        let source_factory = self.config.source_factory.clone();
        let audio_handle = thread::spawn(move || {
            let poll_interval = Duration::from_millis(16);
            let mut sequence: u64 = 0;
            let mut source_is_finite = audio_source.is_finite();
            let mut current_mode = hot
                .read()
                .map(|h| h.mode)
                .unwrap_or_else(|_| audio_source.source_tag());

            let mut consecutive_errors: u32 = 0;
            const MAX_CONSECUTIVE_ERRORS: u32 = 10;

            while audio_running.load(Ordering::SeqCst) {
                // Mode changes swap the capture source between reads; the
                // segmenter closes the open segment when the frame tag
                // changes, so the switch lands on a segment boundary.
                if let Some(factory) = &source_factory {
                    let desired = hot.read().map(|h| h.mode).unwrap_or(current_mode);
                    if desired != current_mode {
                        // Consume the change even on failure; captions
                        // continue from the old source instead of retrying
                        // the swap every poll.
                        current_mode = desired;
                        match swap_source(factory, desired, &mut audio_source) {
                            Ok(()) => {
                                source_is_finite = audio_source.is_finite();
                                consecutive_errors = 0;
                            }
                            Err(e) => {
                                eprintln!("livecap: switch to {desired} source failed: {e}");
                                let _ = error_tx.send(DisplayEvent::Error {
                                    segment_id: None,
                                    message: format!("switch to {} source failed: {}", desired, e),
                                });
                            }
                        }
                    }
                }

                let samples = match audio_source.read_samples() {
                    Ok(s) => {
                        consecutive_errors = 0;
                        s
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            eprintln!(
                                "livecap: audio capture failed {consecutive_errors} times in a row: {e}"
                            );
                            let _ = error_tx.send(DisplayEvent::Error {
                                segment_id: None,
                                message: format!("audio capture failed: {}", e),
                            });
                            break;
                        }
                        thread::sleep(poll_interval);
                        continue;
                    }
                };

                if samples.is_empty() {
                    if source_is_finite {
                        // File/pipe source exhausted; exit and let the
                        // pipeline flush.
                        break;
                    }
                    // Live source: empty reads are normal while the device
                    // initializes or between callbacks. Keep polling.
                    thread::sleep(poll_interval);
                    continue;
                }

                let source = audio_source.source_tag();
                let frame = AudioFrame::new(samples, sequence, source);
                sequence += 1;

                if !send_frame(&audio_tx, &audio_rx, frame, &audio_metrics) {
                    break;
                }

                thread::sleep(poll_interval);
            }

            if let Err(e) = audio_source.stop() {
                eprintln!("livecap: failed to stop audio capture: {e}");
            }
        });

        // Collect all thread handles.
        let mut threads = vec![audio_handle];
        threads.extend(extra_threads);

        // Wrap runner join handles so panics get logged instead of lost.
        threads.push(thread::spawn(move || {
            if let Err(msg) = segmenter_runner.join() {
                eprintln!("livecap: {msg}");
            }
        }));
        threads.push(thread::spawn(move || {
            if let Err(msg) = transcriber_runner.join() {
                eprintln!("livecap: {msg}");
            }
        }));
        if let Some(runner) = translator_runner {
            threads.push(thread::spawn(move || {
                if let Err(msg) = runner.join() {
                    eprintln!("livecap: {msg}");
                }
            }));
        }
        threads.push(thread::spawn(move || {
            if let Err(msg) = caption_runner.join() {
                eprintln!("livecap: {msg}");
            }
        }));
        threads.push(thread::spawn(move || {
            if let Err(msg) = sink_runner.join() {
                eprintln!("livecap: {msg}");
            }
        }));

        Ok(PipelineHandle {
            running,
            threads,
            result_rx: Some(result_rx),
            metrics,
        })
    }
}

/// Replace the running capture source with one built for `mode`.
///
/// The replacement is built and started before the old source stops, so a
/// failed swap leaves the old source delivering.
fn swap_source(
    factory: &SourceFactory,
    mode: crate::config::SourceMode,
    current: &mut Box<dyn AudioSource>,
) -> Result<()> {
    let mut next = factory.build(mode)?;
    next.start()?;
    if let Err(e) = current.stop() {
        eprintln!("livecap: failed to stop previous audio source: {e}");
    }
    *current = next;
    Ok(())
}

/// Push a frame into the capture channel, evicting the oldest frame when
/// the channel is full. Stale audio is worth less than fresh audio; the
/// segmenter sees the gap through the frame sequence numbers.
///
/// Returns false when the channel is disconnected.
fn send_frame(
    tx: &Sender<AudioFrame>,
    rx: &Receiver<AudioFrame>,
    frame: AudioFrame,
    metrics: &PipelineMetrics,
) -> bool {
    use crossbeam_channel::TrySendError;
    let mut frame = frame;
    loop {
        match tx.try_send(frame) {
            Ok(()) => {
                metrics.frames_captured.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            Err(TrySendError::Full(returned)) => {
                if rx.try_recv().is_ok() {
                    metrics.overruns.fetch_add(1, Ordering::Relaxed);
                }
                frame = returned;
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioSource;
    use crate::config::TranslationConfig;
    use crate::error::LivecapError;
    use crate::pipeline::sink::CollectorSink;
    use crate::stt::MockEngine;
    use crate::translate::MockTranslator;

    fn fast_config(config: &Config) -> PipelineConfig {
        let mut pipeline_config = PipelineConfig::from_config(config);
        pipeline_config.segmenter.debounce_ms = 100;
        pipeline_config.segmenter.pre_roll_ms = 0;
        pipeline_config.segmenter.post_roll_ms = 0;
        pipeline_config.transcriber.retry_backoff = Duration::from_millis(1);
        pipeline_config.translator.retry_backoff = Duration::from_millis(1);
        pipeline_config
    }

    /// Loud speech then enough silence to close the segment, then end of
    /// stream. Each read is 100ms of audio.
    fn burst_source() -> Box<dyn AudioSource> {
        let mut phases = vec![vec![10000i16; 1600]; 10];
        phases.extend(vec![vec![0i16; 1600]; 5]);
        Box::new(MockAudioSource::new().with_phases(phases).finite())
    }

    #[test]
    fn test_config_from_config_maps_fields() {
        let config = Config::default();
        let pipeline_config = PipelineConfig::from_config(&config);

        assert_eq!(pipeline_config.segmenter.silence_threshold, 0.02);
        assert_eq!(pipeline_config.segmenter.max_segment_ms, 10_000);
        assert_eq!(pipeline_config.transcriber.concurrency, 1);
        assert_eq!(pipeline_config.translator.target_language, "EN");
        assert_eq!(pipeline_config.word_budget, 40);
        assert_eq!(pipeline_config.audio_buffer, 1024);
    }

    #[test]
    fn test_handle_is_running() {
        let running = Arc::new(AtomicBool::new(true));
        let handle = PipelineHandle {
            running: running.clone(),
            threads: vec![],
            result_rx: None,
            metrics: Arc::new(PipelineMetrics::default()),
        };

        assert!(handle.is_running());
        running.store(false, Ordering::SeqCst);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_handle_stop_returns_result_from_channel() {
        let (result_tx, result_rx) = bounded(1);
        result_tx.send(Some("caption text".to_string())).unwrap();
        drop(result_tx);

        let handle = PipelineHandle {
            running: Arc::new(AtomicBool::new(true)),
            threads: vec![],
            result_rx: Some(result_rx),
            metrics: Arc::new(PipelineMetrics::default()),
        };

        assert_eq!(handle.stop(), Some("caption text".to_string()));
    }

    #[test]
    fn test_handle_stop_returns_none_when_channel_disconnected() {
        let (result_tx, result_rx) = bounded::<Option<String>>(1);
        drop(result_tx);

        let handle = PipelineHandle {
            running: Arc::new(AtomicBool::new(true)),
            threads: vec![],
            result_rx: Some(result_rx),
            metrics: Arc::new(PipelineMetrics::default()),
        };

        assert!(handle.stop().is_none());
    }

    #[test]
    fn test_handle_stop_survives_panicked_thread() {
        let panicking_handle = thread::spawn(|| {
            panic!("intentional test panic");
        });

        let handle = PipelineHandle {
            running: Arc::new(AtomicBool::new(true)),
            threads: vec![panicking_handle],
            result_rx: None,
            metrics: Arc::new(PipelineMetrics::default()),
        };

        assert!(handle.stop().is_none());
    }

    #[test]
    fn test_handle_stop_timeout_on_stuck_thread() {
        let running = Arc::new(AtomicBool::new(true));
        let stuck_running = running.clone();
        let stuck_handle = thread::spawn(move || {
            while stuck_running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(10));
            }
            thread::park();
        });

        let handle = PipelineHandle {
            running: running.clone(),
            threads: vec![stuck_handle],
            result_rx: None,
            metrics: Arc::new(PipelineMetrics::default()),
        };

        let start = Instant::now();
        let result = handle.stop();
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "stop() must return even with stuck threads"
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_handle_wait_drains_finite_source() {
        let pipeline = Pipeline::new(fast_config(&Config::default()));

        let engine = Arc::new(MockEngine::new("test-model").with_response("from a file"));
        let sink = Box::new(CollectorSink::new());

        let handle = pipeline
            .start(burst_source(), engine, None, sink)
            .expect("pipeline should start");

        assert_eq!(handle.wait(), Some("from a file".to_string()));
    }

    #[test]
    fn test_hot_mode_change_swaps_source_mid_run() {
        use crate::config::SourceMode;
        use std::sync::Mutex;

        let mut config = Config::default();
        config.audio.mode = SourceMode::Mic;
        let mut pipeline_config = fast_config(&config);
        let hot = pipeline_config.hot.clone();

        let built = Arc::new(Mutex::new(Vec::new()));
        let built_log = built.clone();
        pipeline_config.source_factory = Some(SourceFactory::new(move |mode| {
            built_log.lock().unwrap().push(mode);
            // The replacement delivers one burst, then ends the stream.
            let mut phases = vec![vec![10000i16; 1600]; 10];
            phases.extend(vec![vec![0i16; 1600]; 5]);
            Ok(Box::new(
                MockAudioSource::new()
                    .with_phases(phases)
                    .finite()
                    .with_tag(mode),
            ) as Box<dyn AudioSource>)
        }));

        let engine = Arc::new(MockEngine::new("test-model").with_response("switched over"));
        let sink = Box::new(CollectorSink::new());
        // The initial microphone source never speaks.
        let initial = Box::new(MockAudioSource::new().with_samples(vec![0i16; 1600]));

        let handle = Pipeline::new(pipeline_config)
            .start(initial, engine, None, sink)
            .expect("pipeline should start");

        hot.write().unwrap().mode = SourceMode::System;

        // The swapped-in source is finite, so the pipeline drains by itself.
        assert_eq!(handle.wait(), Some("switched over".to_string()));
        assert_eq!(*built.lock().unwrap(), vec![SourceMode::System]);
    }

    #[test]
    fn test_pipeline_start_fails_when_source_fails() {
        let pipeline = Pipeline::new(fast_config(&Config::default()));

        let audio_source = Box::new(
            MockAudioSource::new()
                .with_start_failure()
                .with_error_message("device gone"),
        );
        let engine = Arc::new(MockEngine::new("test-model"));
        let sink = Box::new(CollectorSink::new());

        let result = pipeline.start(audio_source, engine, None, sink);
        match result {
            Err(LivecapError::AudioCapture { message }) => {
                assert_eq!(message, "device gone");
            }
            _ => panic!("Expected AudioCapture error"),
        }
    }

    #[test]
    fn test_pipeline_full_cycle_without_translation() {
        let pipeline = Pipeline::new(fast_config(&Config::default()));

        let engine = Arc::new(MockEngine::new("test-model").with_response("hello world"));
        let collector = CollectorSink::new();
        let events = collector.events();

        let handle = pipeline
            .start(burst_source(), engine, None, Box::new(collector))
            .unwrap();
        assert!(handle.is_running());

        // The finite source exhausts on its own; wait for the commit to
        // travel the whole chain.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let committed = events.lock().unwrap().iter().any(|e| {
                matches!(e, DisplayEvent::FinalCommit { visible, .. } if visible.contains("hello world"))
            });
            if committed || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        let metrics = handle.metrics();
        let result = handle.stop();
        assert_eq!(result, Some("hello world".to_string()));
        assert!(metrics.frames_captured.load(Ordering::Relaxed) > 0);
        assert_eq!(metrics.overruns.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_pipeline_full_cycle_with_translation() {
        let config = Config {
            translation: TranslationConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = Pipeline::new(fast_config(&config));

        let engine = Arc::new(MockEngine::new("test-model").with_response("good morning"));
        let translator: Arc<dyn Translator> = Arc::new(MockTranslator::new());
        let collector = CollectorSink::new();
        let events = collector.events();

        let handle = pipeline
            .start(burst_source(), engine, Some(translator), Box::new(collector))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let translated = events.lock().unwrap().iter().any(|e| {
                matches!(
                    e,
                    DisplayEvent::TranslationReady(entry)
                        if entry.translated_text == "[EN] good morning" && !entry.degraded
                )
            });
            if translated || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        handle.stop();

        let events = events.lock().unwrap();
        let commit_pos = events
            .iter()
            .position(|e| matches!(e, DisplayEvent::FinalCommit { .. }))
            .expect("no commit observed");
        let translation_pos = events
            .iter()
            .position(|e| matches!(e, DisplayEvent::TranslationReady(_)))
            .expect("no translation observed");
        assert!(
            commit_pos < translation_pos,
            "translation must not precede its commit"
        );
    }

    #[test]
    fn test_pipeline_quiet_only_produces_nothing() {
        let pipeline = Pipeline::new(fast_config(&Config::default()));

        let phases = vec![vec![0i16; 1600]; 10];
        let audio_source = Box::new(MockAudioSource::new().with_phases(phases).finite());
        let engine = Arc::new(MockEngine::new("test-model").with_response("should not appear"));
        let sink = Box::new(CollectorSink::new());

        let handle = pipeline.start(audio_source, engine, None, sink).unwrap();
        thread::sleep(Duration::from_millis(400));

        assert!(handle.stop().is_none());
    }

    #[test]
    fn test_pipeline_survives_empty_reads_from_live_source() {
        // A live microphone returns empty reads at startup; the pipeline
        // must keep polling instead of treating it as end of stream.
        let pipeline = Pipeline::new(fast_config(&Config::default()));

        let mut phases = vec![Vec::new(); 5];
        phases.extend(vec![vec![10000i16; 1600]; 10]);
        phases.extend(vec![vec![0i16; 1600]; 5]);
        // Not finite: empty reads repeat after the script runs out.
        phases.push(Vec::new());
        let audio_source = Box::new(MockAudioSource::new().with_phases(phases));

        let engine = Arc::new(MockEngine::new("test-model").with_response("live audio"));
        let collector = CollectorSink::new();
        let events = collector.events();

        let handle = pipeline
            .start(audio_source, engine, None, Box::new(collector))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let committed = events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DisplayEvent::FinalCommit { .. }));
            if committed || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        assert_eq!(handle.stop(), Some("live audio".to_string()));
    }

    #[test]
    fn test_pipeline_read_errors_exit_after_threshold() {
        let pipeline = Pipeline::new(fast_config(&Config::default()));

        let audio_source = Box::new(MockAudioSource::new().with_read_failure());
        let engine = Arc::new(MockEngine::new("test-model"));
        let collector = CollectorSink::new();
        let events = collector.events();

        let handle = pipeline
            .start(audio_source, engine, None, Box::new(collector))
            .unwrap();

        // 10 errors at a 16ms poll interval is ~160ms; allow margin, then
        // confirm the failure surfaced as a display event.
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let errored = events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DisplayEvent::Error { segment_id: None, .. }));
            if errored || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        assert!(handle.stop().is_none());
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DisplayEvent::Error { segment_id: None, .. }))
        );
    }

    #[test]
    fn test_pipeline_source_events_reach_sink() {
        let (side_tx, side_rx) = crossbeam_channel::unbounded();
        let mut pipeline_config = fast_config(&Config::default());
        pipeline_config.source_event_rx = Some(side_rx);
        let pipeline = Pipeline::new(pipeline_config);

        let audio_source = Box::new(
            MockAudioSource::new()
                .with_phases(vec![vec![0i16; 1600]])
                .finite(),
        );
        let engine = Arc::new(MockEngine::new("test-model"));
        let collector = CollectorSink::new();
        let events = collector.events();

        let handle = pipeline
            .start(audio_source, engine, None, Box::new(collector))
            .unwrap();

        side_tx
            .send(DisplayEvent::SourceDegraded {
                source: crate::config::SourceMode::Mic,
                message: "no data".to_string(),
            })
            .unwrap();
        drop(side_tx);

        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let degraded = events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DisplayEvent::SourceDegraded { .. }));
            if degraded || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }

        handle.stop();
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DisplayEvent::SourceDegraded { .. }))
        );
    }

    #[test]
    fn test_send_frame_evicts_oldest_when_full() {
        let (tx, rx) = bounded(2);
        let metrics = PipelineMetrics::default();

        for seq in 0..3u64 {
            let frame = AudioFrame::new(vec![0i16; 4], seq, crate::config::SourceMode::Mic);
            assert!(send_frame(&tx, &rx, frame, &metrics));
        }

        assert_eq!(metrics.frames_captured.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.overruns.load(Ordering::Relaxed), 1);
        // The oldest frame is gone; the newest two remain.
        assert_eq!(rx.try_recv().unwrap().sequence, 1);
        assert_eq!(rx.try_recv().unwrap().sequence, 2);
    }

    #[test]
    fn test_send_frame_disconnected_returns_false() {
        let (tx, rx) = bounded::<AudioFrame>(1);
        let metrics = PipelineMetrics::default();

        // Dropping every receiver disconnects the channel; the eviction
        // receiver argument comes from a separate live channel.
        drop(rx);
        let (_other_tx, other_rx) = bounded::<AudioFrame>(1);

        let frame = AudioFrame::new(vec![0i16; 4], 0, crate::config::SourceMode::Mic);
        assert!(!send_frame(&tx, &other_rx, frame, &metrics));
        assert_eq!(metrics.frames_captured.load(Ordering::Relaxed), 0);
    }
}
