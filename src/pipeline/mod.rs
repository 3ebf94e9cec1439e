//! Caption pipeline from audio frames to display events.
//!
//! Implements a multi-station pipeline where each station runs in its own
//! thread, connected by bounded crossbeam channels for backpressure.

pub mod caption;
pub mod error;
pub mod orchestrator;
pub mod reorder;
pub mod segmenter_station;
pub mod sink;
pub mod station;
pub mod transcriber_station;
pub mod translator_station;
pub mod types;

pub use caption::{CaptionBuffer, CaptionStation, ERROR_PLACEHOLDER};
pub use error::{ErrorReporter, LogReporter, StationError};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineHandle, PipelineMetrics};
pub use reorder::ReorderBuffer;
pub use segmenter_station::SegmenterStation;
pub use sink::{CollectorSink, PresentationSink, SinkStation};
pub use station::{Station, StationRunner};
pub use transcriber_station::{TranscriberPoolConfig, TranscriberStation};
pub use translator_station::{TranslatorPoolConfig, TranslatorStation};
pub use types::{
    AudioFrame, DisplayEvent, FinalSentence, Segment, TranscriptEvent, TranslationEntry,
};
