//! Data types flowing through the caption pipeline.

use crate::config::SourceMode;

/// A fixed block of mono PCM samples from the audio source adapter.
///
/// Frames are immutable once produced; the sequence number is strictly
/// increasing per capture session and is used for segment bookkeeping and
/// gap detection.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM samples (16-bit signed integers, 16kHz mono).
    pub samples: Vec<i16>,
    /// Sequence number for ordering and gap detection.
    pub sequence: u64,
    /// Which physical source produced this frame.
    pub source: SourceMode,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(samples: Vec<i16>, sequence: u64, source: SourceMode) -> Self {
        Self {
            samples,
            sequence,
            source,
        }
    }
}

/// One spoken utterance, closed by the segmenter and owned by the
/// transcription stage afterwards. Never mutated once emitted.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Monotonic segment id, never reused.
    pub id: u64,
    /// Sequence number of the first frame included (pre-roll inclusive).
    pub start_seq: u64,
    /// Sequence number of the last frame included.
    pub end_seq: u64,
    /// Concatenated samples of all included frames.
    pub samples: Vec<i16>,
    /// Which physical source produced this segment.
    pub source: SourceMode,
    /// True when this segment is the tail of a force-split utterance and
    /// should be rendered without a separator after its predecessor.
    pub continuation: bool,
}

impl Segment {
    /// Segment duration derived from its sample count.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        if sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000 / sample_rate as u64) as u32
    }
}

/// A partial or final recognition result for one segment.
///
/// Invariant: exactly one final event per segment, and partials for a
/// segment never follow its final.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEvent {
    pub segment_id: u64,
    pub text: String,
    pub is_final: bool,
    pub language: Option<String>,
    /// True when the engine failed after retries; text is empty then.
    pub error: bool,
    /// Carried over from the segment for separator suppression downstream.
    pub continuation: bool,
}

impl TranscriptEvent {
    /// An in-progress recognition update.
    pub fn partial(segment_id: u64, text: String, continuation: bool) -> Self {
        Self {
            segment_id,
            text,
            is_final: false,
            language: None,
            error: false,
            continuation,
        }
    }

    /// The settled recognition result for a segment.
    pub fn final_ok(
        segment_id: u64,
        text: String,
        language: Option<String>,
        continuation: bool,
    ) -> Self {
        Self {
            segment_id,
            text,
            is_final: true,
            language,
            error: false,
            continuation,
        }
    }

    /// A final event standing in for a segment the engine could not
    /// transcribe. Keeps caption sequencing intact instead of dropping
    /// the segment silently.
    pub fn final_error(segment_id: u64, continuation: bool) -> Self {
        Self {
            segment_id,
            text: String::new(),
            is_final: true,
            language: None,
            error: true,
            continuation,
        }
    }
}

/// A finalized source sentence handed from the caption buffer to the
/// translation stage. Only created from final, non-empty, non-error text.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalSentence {
    pub segment_id: u64,
    pub text: String,
}

/// A translation aligned back to its source segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationEntry {
    pub segment_id: u64,
    pub source_text: String,
    pub translated_text: String,
    /// Segment ids of the prior sentences supplied as context.
    pub context_window: Vec<u64>,
    /// True when the service failed and the entry is a pass-through.
    pub degraded: bool,
}

/// Events delivered to the presentation adapter.
///
/// The adapter renders; it never reorders or buffers. Display updates and
/// translation entries arrive in non-decreasing segment-id order within
/// their kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// The live tail for an in-flight segment was replaced wholesale.
    PartialUpdate { segment_id: u64, text: String },
    /// A segment's text was committed; `visible` is the full caption window
    /// after eviction to the word budget.
    FinalCommit { segment_id: u64, visible: String },
    /// A translation settled for an already-committed segment.
    TranslationReady(TranslationEntry),
    /// A mixed-mode sub-source stalled; captions continue from the rest.
    SourceDegraded { source: SourceMode, message: String },
    /// Unrecoverable error surfaced to the overlay.
    Error {
        segment_id: Option<u64>,
        message: String,
    },
}
