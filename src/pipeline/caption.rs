//! Caption buffer and the station that owns it.
//!
//! The buffer is append-only: committed words are never edited, only
//! evicted from the front when the word budget is exceeded. The live tail
//! (the current head segment's interim text) is replaced wholesale on
//! every partial. The caption station is the single writer of display
//! state; everything downstream only renders.

use crate::config::HotConfigHandle;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{DisplayEvent, FinalSentence, TranscriptEvent};
use crossbeam_channel::Sender;
use std::collections::VecDeque;

/// Committed in place of text for segments the engine could not
/// transcribe, keeping the caption sequence visibly intact.
pub const ERROR_PLACEHOLDER: &str = "[inaudible]";

/// Rolling caption state: committed word history plus a live tail.
#[derive(Debug)]
pub struct CaptionBuffer {
    words: VecDeque<String>,
    word_budget: usize,
    tail: String,
}

impl CaptionBuffer {
    pub fn new(word_budget: usize) -> Self {
        Self {
            words: VecDeque::new(),
            word_budget: word_budget.max(1),
            tail: String::new(),
        }
    }

    /// Replaces the live tail wholesale with the latest hypothesis.
    pub fn set_tail(&mut self, text: &str) {
        self.tail.clear();
        self.tail.push_str(text);
    }

    /// Commits final text, evicts down to the word budget, and returns the
    /// visible window.
    ///
    /// `continuation` joins the first committed word onto the previous
    /// segment's last word, since a force-split may have cut mid-word.
    pub fn commit(&mut self, text: &str, continuation: bool) -> String {
        self.tail.clear();

        let mut tokens = text.split_whitespace();
        if continuation
            && let Some(first) = tokens.next()
        {
            match self.words.back_mut() {
                Some(last) => last.push_str(first),
                None => self.words.push_back(first.to_string()),
            }
        }
        for token in tokens {
            self.words.push_back(token.to_string());
        }

        while self.words.len() > self.word_budget {
            self.words.pop_front();
        }

        self.visible()
    }

    /// Commits the error placeholder for an untranscribable segment.
    pub fn commit_error(&mut self) -> String {
        self.tail.clear();
        self.words.push_back(ERROR_PLACEHOLDER.to_string());
        while self.words.len() > self.word_budget {
            self.words.pop_front();
        }
        self.visible()
    }

    /// The committed window, budget already applied.
    pub fn visible(&self) -> String {
        let mut text = String::new();
        for word in &self.words {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
        }
        text
    }

    /// Words currently committed.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// The current live tail.
    pub fn tail(&self) -> &str {
        &self.tail
    }
}

/// Station turning ordered transcript events into display events and
/// feeding finalized sentences to the translation stage.
pub struct CaptionStation {
    buffer: CaptionBuffer,
    hot: HotConfigHandle,
    /// Finalized sentences for the translator; None when the translation
    /// stage is not wired.
    translation_tx: Option<Sender<FinalSentence>>,
}

impl CaptionStation {
    pub fn new(
        word_budget: usize,
        hot: HotConfigHandle,
        translation_tx: Option<Sender<FinalSentence>>,
    ) -> Self {
        Self {
            buffer: CaptionBuffer::new(word_budget),
            hot,
            translation_tx,
        }
    }

    fn translation_enabled(&self) -> bool {
        self.hot
            .read()
            .map(|hot| hot.translation_enabled)
            .unwrap_or(false)
    }
}

impl Station for CaptionStation {
    type Input = TranscriptEvent;
    type Output = DisplayEvent;

    fn process(
        &mut self,
        event: TranscriptEvent,
        out: &mut Vec<DisplayEvent>,
    ) -> Result<(), StationError> {
        if !event.is_final {
            self.buffer.set_tail(&event.text);
            out.push(DisplayEvent::PartialUpdate {
                segment_id: event.segment_id,
                text: event.text,
            });
            return Ok(());
        }

        if event.error {
            let visible = self.buffer.commit_error();
            out.push(DisplayEvent::FinalCommit {
                segment_id: event.segment_id,
                visible,
            });
            return Ok(());
        }

        let visible = self.buffer.commit(&event.text, event.continuation);
        out.push(DisplayEvent::FinalCommit {
            segment_id: event.segment_id,
            visible,
        });

        let trimmed = event.text.trim();
        if !trimmed.is_empty()
            && self.translation_enabled()
            && let Some(tx) = &self.translation_tx
        {
            // The translator runs behind the captions; a closed channel
            // there must not take the captions down with it.
            let _ = tx.send(FinalSentence {
                segment_id: event.segment_id,
                text: trimmed.to_string(),
            });
        }

        Ok(())
    }

    fn flush(&mut self, _out: &mut Vec<DisplayEvent>) {
        // Detach the translator feed so it sees end of stream.
        self.translation_tx.take();
    }

    fn name(&self) -> &'static str {
        "caption"
    }
}
