//! Terminal rendering for caption events.
//!
//! The committed caption window lives on one line that is rewritten in
//! place; translations and notices print above it as finished lines.

use crate::pipeline::sink::PresentationSink;
use crate::pipeline::types::DisplayEvent;
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Clear the current terminal line (replaces the caption line).
pub fn clear_line() {
    eprint!("\r\x1b[2K");
}

/// Renders caption events to stderr.
///
/// Partials append a dim live tail after the committed window; commits
/// rewrite the window in place. Anything that deserves its own line is
/// printed above the caption line, which is then redrawn.
pub struct TerminalSink {
    visible: String,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            visible: String::new(),
        }
    }

    fn redraw(&self, tail: Option<&str>) {
        clear_line();
        match tail {
            Some(tail) if self.visible.is_empty() => eprint!("{DIM}{tail}{RESET}"),
            Some(tail) => eprint!("{} {DIM}{tail}{RESET}", self.visible),
            None => eprint!("{}", self.visible),
        }
        io::stderr().flush().ok();
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSink for TerminalSink {
    fn handle(&mut self, event: &DisplayEvent) -> crate::error::Result<()> {
        match event {
            DisplayEvent::PartialUpdate { text, .. } => {
                self.redraw(Some(text));
            }
            DisplayEvent::FinalCommit { visible, .. } => {
                self.visible = visible.clone();
                self.redraw(None);
            }
            DisplayEvent::TranslationReady(entry) => {
                clear_line();
                if entry.degraded {
                    eprintln!(
                        "{CYAN}{}{RESET} {DIM}(untranslated){RESET}",
                        entry.translated_text
                    );
                } else {
                    eprintln!("{CYAN}{}{RESET}", entry.translated_text);
                }
                self.redraw(None);
            }
            DisplayEvent::SourceDegraded { source, message } => {
                clear_line();
                eprintln!("{YELLOW}{:?} source degraded: {}{RESET}", source, message);
                self.redraw(None);
            }
            DisplayEvent::Error {
                segment_id,
                message,
            } => {
                clear_line();
                match segment_id {
                    Some(id) => eprintln!("{RED}error (segment {}): {}{RESET}", id, message),
                    None => eprintln!("{RED}error: {}{RESET}", message),
                }
                self.redraw(None);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        // Leave the last caption on screen instead of clobbering it with
        // the shell prompt.
        if !self.visible.is_empty() {
            eprintln!();
        }
        if self.visible.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.visible))
        }
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}
