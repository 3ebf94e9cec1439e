//! Station wrapping the utterance segmenter.

use crate::config::HotConfigHandle;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioFrame, Segment};
use crate::segmenter::{Segmenter, SegmenterConfig};

/// Turns the capture frame stream into closed utterance segments.
///
/// Threshold and debounce are re-read from the shared hot config at every
/// frame boundary, so runtime tuning applies without touching an open
/// segment's already-accumulated samples.
pub struct SegmenterStation {
    segmenter: Segmenter,
    hot: HotConfigHandle,
}

impl SegmenterStation {
    pub fn new(config: SegmenterConfig, hot: HotConfigHandle) -> Self {
        Self {
            segmenter: Segmenter::new(config),
            hot,
        }
    }

    fn apply_hot_config(&mut self) {
        if let Ok(hot) = self.hot.read() {
            self.segmenter.set_threshold(hot.silence_threshold);
            self.segmenter.set_debounce_ms(hot.debounce_ms);
        }
    }
}

impl Station for SegmenterStation {
    type Input = AudioFrame;
    type Output = Segment;

    fn process(&mut self, frame: AudioFrame, out: &mut Vec<Segment>) -> Result<(), StationError> {
        self.apply_hot_config();
        self.segmenter.push_frame(&frame, out);
        Ok(())
    }

    fn flush(&mut self, out: &mut Vec<Segment>) {
        // End of stream closes whatever utterance is still open.
        self.segmenter.flush(out);
    }

    fn name(&self) -> &'static str {
        "segmenter"
    }
}
