//! Mixed-mode source: microphone and system capture summed into one
//! stream.
//!
//! Both sub-sources are polled together; the shorter read is padded with
//! silence and the two are summed with saturation. A sub-source that
//! stops delivering for longer than the stall timeout degrades the mix:
//! captions continue from the live side and a single `SourceDegraded`
//! event goes out on the side channel. The flag clears when data returns,
//! so a later stall reports again.

use crate::audio::source::{AudioSource, Clock, SystemClock};
use crate::config::SourceMode;
use crate::defaults;
use crate::error::Result;
use crate::pipeline::types::DisplayEvent;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct SubSource {
    inner: Box<dyn AudioSource>,
    tag: SourceMode,
    last_data: Instant,
    degraded: bool,
}

pub struct MixedSource {
    mic: SubSource,
    system: SubSource,
    clock: Arc<dyn Clock>,
    stall_timeout: Duration,
    events: Option<Sender<DisplayEvent>>,
}

impl MixedSource {
    pub fn new(mic: Box<dyn AudioSource>, system: Box<dyn AudioSource>) -> Self {
        Self::with_clock(mic, system, Arc::new(SystemClock))
    }

    pub fn with_clock(
        mic: Box<dyn AudioSource>,
        system: Box<dyn AudioSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            mic: SubSource {
                inner: mic,
                tag: SourceMode::Mic,
                last_data: now,
                degraded: false,
            },
            system: SubSource {
                inner: system,
                tag: SourceMode::System,
                last_data: now,
                degraded: false,
            },
            clock,
            stall_timeout: Duration::from_millis(defaults::SOURCE_STALL_MS),
            events: None,
        }
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Wires the side channel for degradation notices.
    pub fn with_event_sender(mut self, events: Sender<DisplayEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn poll_sub(
        sub: &mut SubSource,
        clock: &dyn Clock,
        stall_timeout: Duration,
        events: &Option<Sender<DisplayEvent>>,
    ) -> Vec<i16> {
        let now = clock.now();
        let samples = match sub.inner.read_samples() {
            Ok(samples) => samples,
            Err(e) => {
                // A failing side degrades like a silent one; the mix keeps
                // going from whatever still delivers.
                if !sub.degraded {
                    sub.degraded = true;
                    if let Some(tx) = events {
                        let _ = tx.send(DisplayEvent::SourceDegraded {
                            source: sub.tag,
                            message: format!("capture error: {}", e),
                        });
                    }
                }
                return Vec::new();
            }
        };

        if samples.is_empty() {
            if !sub.degraded && now.duration_since(sub.last_data) >= stall_timeout {
                sub.degraded = true;
                if let Some(tx) = events {
                    let _ = tx.send(DisplayEvent::SourceDegraded {
                        source: sub.tag,
                        message: format!(
                            "no data for {:.1}s, continuing without it",
                            stall_timeout.as_secs_f32()
                        ),
                    });
                }
            }
        } else {
            sub.last_data = now;
            sub.degraded = false;
        }

        samples
    }

    /// Whether either side is currently degraded.
    pub fn is_degraded(&self) -> bool {
        self.mic.degraded || self.system.degraded
    }
}

/// Pad-and-sum with saturation.
fn mix(mut a: Vec<i16>, b: Vec<i16>) -> Vec<i16> {
    if a.len() < b.len() {
        return mix(b, a);
    }
    for (sample, other) in a.iter_mut().zip(b.iter()) {
        *sample = sample.saturating_add(*other);
    }
    a
}

impl AudioSource for MixedSource {
    fn start(&mut self) -> Result<()> {
        self.mic.inner.start()?;
        self.system.inner.start()
    }

    fn stop(&mut self) -> Result<()> {
        let mic_result = self.mic.inner.stop();
        self.system.inner.stop()?;
        mic_result
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mic = Self::poll_sub(
            &mut self.mic,
            self.clock.as_ref(),
            self.stall_timeout,
            &self.events,
        );
        let system = Self::poll_sub(
            &mut self.system,
            self.clock.as_ref(),
            self.stall_timeout,
            &self.events,
        );
        Ok(mix(mic, system))
    }

    fn source_tag(&self) -> SourceMode {
        SourceMode::Mixed
    }
}
