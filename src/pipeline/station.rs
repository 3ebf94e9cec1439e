//! Core station abstraction and runner for the caption pipeline.

use crate::pipeline::error::{ErrorReporter, StationError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often an idle station gets a [`Station::tick`] call while no input
/// is pending. Stations with internal worker pools use ticks to drain
/// completions that arrived out of band.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// A processing station in the caption pipeline.
///
/// Each station receives input, processes it, and produces zero or more
/// outputs. Stations run in their own threads and are connected by bounded
/// channels.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item, pushing any ready outputs onto `out`.
    ///
    /// A station may produce nothing (input absorbed into internal state),
    /// one output, or several (e.g. a reorder buffer releasing a backlog).
    fn process(
        &mut self,
        input: Self::Input,
        out: &mut Vec<Self::Output>,
    ) -> Result<(), StationError>;

    /// Called periodically while no input is pending.
    ///
    /// Default does nothing. Stations that complete work asynchronously
    /// (engine worker pools) override this to release finished results.
    fn tick(&mut self, _out: &mut Vec<Self::Output>) -> Result<(), StationError> {
        Ok(())
    }

    /// Called once when the input channel closes, before `shutdown`.
    ///
    /// Stations holding buffered state (an open segment, in-flight engine
    /// requests) emit what they still can here.
    fn flush(&mut self, _out: &mut Vec<Self::Output>) {}

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    /// Handle to the spawned thread.
    handle: Option<JoinHandle<()>>,
    /// Name of the station (cached for error reporting).
    station_name: &'static str,
    /// Phantom data to mark the station type.
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a new station in a dedicated thread.
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let station_name = station.name();

        let handle = thread::spawn(move || {
            Self::run_station(&mut station, input_rx, output_tx, error_reporter);
        });

        Self {
            handle: Some(handle),
            station_name,
            _phantom: PhantomData,
        }
    }

    /// Main processing loop for the station.
    fn run_station(
        station: &mut S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
    ) {
        let station_name = station.name();
        let mut out = Vec::new();

        loop {
            let step = match input_rx.recv_timeout(TICK_INTERVAL) {
                Ok(input) => station.process(input, &mut out),
                Err(RecvTimeoutError::Timeout) => station.tick(&mut out),
                Err(RecvTimeoutError::Disconnected) => {
                    station.flush(&mut out);
                    for output in out.drain(..) {
                        if output_tx.send(output).is_err() {
                            break;
                        }
                    }
                    break;
                }
            };

            match step {
                Ok(()) => {}
                Err(error) => {
                    error_reporter.report(station_name, &error);
                    if error.is_fatal() {
                        break;
                    }
                }
            }

            let mut closed = false;
            for output in out.drain(..) {
                if output_tx.send(output).is_err() {
                    // Output channel closed, shutdown
                    closed = true;
                    break;
                }
            }
            if closed {
                break;
            }
        }

        // Cleanup on shutdown
        station.shutdown();
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<(), String> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name))
        } else {
            Ok(())
        }
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }
}
