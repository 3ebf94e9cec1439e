//! Voice activity segmenter state machine.
//!
//! Consumes the capture frame stream and emits closed [`Segment`]s. All
//! timing is derived from sample counts, not wall clock, so replaying the
//! same frames always yields the same segments.

use crate::config::SourceMode;
use crate::pipeline::types::{AudioFrame, Segment};
use crate::segmenter::energy::calculate_rms;
use std::collections::VecDeque;

/// Configuration for the segmenter.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// RMS threshold separating silence from speech. A threshold of zero
    /// classifies every frame as speech (degrades to a force-split stream).
    pub silence_threshold: f32,
    /// Run of consecutive silence needed to close an open segment (ms).
    pub debounce_ms: u32,
    /// Silence kept before a speech onset (ms).
    pub pre_roll_ms: u32,
    /// Trailing silence kept inside a closed segment (ms).
    pub post_roll_ms: u32,
    /// Segments longer than this are force-closed and reopened (ms).
    pub max_segment_ms: u32,
    /// Sample rate used to convert sample counts to durations.
    pub sample_rate: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        use crate::defaults;
        Self {
            silence_threshold: defaults::SILENCE_THRESHOLD,
            debounce_ms: defaults::DEBOUNCE_MS,
            pre_roll_ms: defaults::PRE_ROLL_MS,
            post_roll_ms: defaults::POST_ROLL_MS,
            max_segment_ms: defaults::MAX_SEGMENT_MS,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// An open, still-growing utterance.
struct OpenSegment {
    samples: Vec<i16>,
    start_seq: Option<u64>,
    end_seq: u64,
    source: SourceMode,
    /// Consecutive trailing silence observed so far (samples).
    silence_run: usize,
    /// Trailing silence already appended to `samples` (samples).
    appended_silence: usize,
}

enum State {
    Silence,
    Speaking(OpenSegment),
}

/// Two-state utterance segmenter.
///
/// `Silence` → `Speaking` on a frame whose energy reaches the threshold;
/// the transition prepends the pre-roll ring so soft onsets are kept.
/// `Speaking` → `Silence` after a debounce-length silence run; the close
/// keeps a post-roll of trailing silence. Overlong segments are force-split
/// with the continuation flag set on every successor.
pub struct Segmenter {
    config: SegmenterConfig,
    state: State,
    next_id: u64,
    /// Ring of recent silence frames, capped at `pre_roll_ms`.
    pre_roll: VecDeque<AudioFrame>,
    pre_roll_samples: usize,
    /// The next emitted segment continues a force-split utterance.
    continuation_next: bool,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: State::Silence,
            next_id: 0,
            pre_roll: VecDeque::new(),
            pre_roll_samples: 0,
            continuation_next: false,
        }
    }

    /// Updates the silence threshold; applies on the next frame.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.config.silence_threshold = threshold;
    }

    /// Updates the debounce duration; applies on the next frame.
    pub fn set_debounce_ms(&mut self, debounce_ms: u32) {
        self.config.debounce_ms = debounce_ms;
    }

    /// Id the next emitted segment will carry.
    pub fn next_segment_id(&self) -> u64 {
        self.next_id
    }

    fn samples_for_ms(&self, ms: u32) -> usize {
        (self.config.sample_rate as u64 * ms as u64 / 1000) as usize
    }

    /// Feeds one capture frame, appending any closed segments to `out`.
    ///
    /// A single frame can close at most one segment, but a force-split
    /// closes and immediately reopens, so bursts of continuous speech
    /// produce a steady stream of closed segments here.
    pub fn push_frame(&mut self, frame: &AudioFrame, out: &mut Vec<Segment>) {
        if frame.samples.is_empty() {
            return;
        }

        // A source switch ends the utterance at this boundary; audio held
        // from the old source never mixes into the new one.
        if let State::Speaking(open) = &self.state
            && open.source != frame.source
        {
            self.close_segment(false, out);
        }
        if let Some(held) = self.pre_roll.back()
            && held.source != frame.source
        {
            self.pre_roll.clear();
            self.pre_roll_samples = 0;
        }

        let is_speech = calculate_rms(&frame.samples) >= self.config.silence_threshold;
        let post_roll = self.samples_for_ms(self.config.post_roll_ms);
        let debounce = self.samples_for_ms(self.config.debounce_ms);

        match &mut self.state {
            State::Silence => {
                if is_speech {
                    let mut open = OpenSegment {
                        samples: Vec::new(),
                        start_seq: None,
                        end_seq: frame.sequence,
                        source: frame.source,
                        silence_run: 0,
                        appended_silence: 0,
                    };
                    // Pre-roll first, so onsets clipped by the threshold
                    // crossing are still inside the segment.
                    for rolled in self.pre_roll.drain(..) {
                        if open.start_seq.is_none() {
                            open.start_seq = Some(rolled.sequence);
                        }
                        open.samples.extend_from_slice(&rolled.samples);
                    }
                    self.pre_roll_samples = 0;
                    if open.start_seq.is_none() {
                        open.start_seq = Some(frame.sequence);
                    }
                    open.samples.extend_from_slice(&frame.samples);
                    self.state = State::Speaking(open);
                    self.maybe_force_split(out);
                } else {
                    self.remember_pre_roll(frame);
                }
            }
            State::Speaking(open) => {
                if is_speech {
                    // Silence kept in the pre-roll ring mid-segment belongs
                    // to this utterance after all; restore it.
                    if open.silence_run > open.appended_silence {
                        for rolled in self.pre_roll.drain(..) {
                            open.samples.extend_from_slice(&rolled.samples);
                            open.end_seq = rolled.sequence;
                        }
                        self.pre_roll_samples = 0;
                    }
                    open.silence_run = 0;
                    open.appended_silence = 0;
                    open.samples.extend_from_slice(&frame.samples);
                    open.end_seq = frame.sequence;
                    self.maybe_force_split(out);
                } else {
                    open.silence_run += frame.samples.len();
                    let within_post_roll = open.appended_silence < post_roll;
                    if within_post_roll {
                        // Still inside the post-roll budget: the silence is
                        // part of the segment.
                        open.appended_silence += frame.samples.len();
                        open.samples.extend_from_slice(&frame.samples);
                        open.end_seq = frame.sequence;
                    }
                    let should_close = open.silence_run >= debounce;
                    if !within_post_roll {
                        // Beyond post-roll: hold the frame in the pre-roll
                        // ring in case speech resumes before the debounce.
                        self.remember_pre_roll(frame);
                    }

                    if should_close {
                        self.close_segment(false, out);
                    }
                }
            }
        }
    }

    /// Closes an open segment at end of stream (shutdown or source drained).
    pub fn flush(&mut self, out: &mut Vec<Segment>) {
        if matches!(self.state, State::Speaking(_)) {
            self.close_segment(false, out);
        }
        self.pre_roll.clear();
        self.pre_roll_samples = 0;
    }

    fn remember_pre_roll(&mut self, frame: &AudioFrame) {
        let budget = self.samples_for_ms(self.config.pre_roll_ms);
        if budget == 0 {
            return;
        }
        self.pre_roll.push_back(frame.clone());
        self.pre_roll_samples += frame.samples.len();
        while self.pre_roll_samples > budget {
            match self.pre_roll.pop_front() {
                Some(evicted) => self.pre_roll_samples -= evicted.samples.len(),
                None => break,
            }
        }
    }

    fn maybe_force_split(&mut self, out: &mut Vec<Segment>) {
        let max = self.samples_for_ms(self.config.max_segment_ms);
        let over = match &self.state {
            State::Speaking(open) => max > 0 && open.samples.len() >= max,
            State::Silence => false,
        };
        if over {
            self.close_segment(true, out);
        }
    }

    /// Emits the open segment. A force-split reopens immediately and marks
    /// every successor as a continuation of the same logical utterance.
    fn close_segment(&mut self, force_split: bool, out: &mut Vec<Segment>) {
        let state = std::mem::replace(&mut self.state, State::Silence);
        let open = match state {
            State::Speaking(open) => open,
            State::Silence => return,
        };

        // A reopened continuation that never received a frame has no
        // samples and would share its predecessor's end sequence; there is
        // nothing to emit.
        if open.samples.is_empty() {
            self.continuation_next = false;
            return;
        }

        let segment = Segment {
            id: self.next_id,
            start_seq: open.start_seq.unwrap_or(open.end_seq),
            end_seq: open.end_seq,
            samples: open.samples,
            source: open.source,
            continuation: self.continuation_next,
        };
        self.next_id += 1;

        if force_split {
            self.continuation_next = true;
            // Reopen at the split point; the successor starts with the
            // next frame that arrives.
            self.state = State::Speaking(OpenSegment {
                samples: Vec::new(),
                start_seq: None,
                end_seq: segment.end_seq,
                source: segment.source,
                silence_run: 0,
                appended_silence: 0,
            });
        } else {
            self.continuation_next = false;
        }

        out.push(segment);
    }
}
