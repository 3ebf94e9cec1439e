use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::DisplayEvent;
use std::sync::{Arc, Mutex};

/// Pluggable presentation adapter at the end of the pipeline.
/// Pairs with AudioSource on the input side - this renders caption events.
///
/// Implementations render; they never reorder, drop, or buffer events.
/// Events arrive already ordered by the upstream stations.
pub trait PresentationSink: Send + 'static {
    /// Render one display event.
    fn handle(&mut self, event: &DisplayEvent) -> crate::error::Result<()>;

    /// Called on pipeline shutdown. Return the final visible caption text
    /// if applicable.
    fn finish(&mut self) -> Option<String> {
        None
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Station wrapper for any PresentationSink implementation.
/// Converts PresentationSink into a Station for pipeline orchestration.
pub struct SinkStation {
    sink: Box<dyn PresentationSink>,
    result_tx: Option<crossbeam_channel::Sender<Option<String>>>,
}

impl SinkStation {
    pub fn new(sink: Box<dyn PresentationSink>) -> Self {
        Self {
            sink,
            result_tx: None,
        }
    }

    /// Deliver the sink's final caption to the given channel on shutdown.
    pub fn with_result_sender(mut self, tx: crossbeam_channel::Sender<Option<String>>) -> Self {
        self.result_tx = Some(tx);
        self
    }
}

impl Station for SinkStation {
    type Input = DisplayEvent;
    type Output = ();

    fn name(&self) -> &'static str {
        self.sink.name()
    }

    fn process(&mut self, event: DisplayEvent, _out: &mut Vec<()>) -> Result<(), StationError> {
        // A failed render never stops the pipeline; the next event will
        // redraw the full window anyway.
        self.sink
            .handle(&event)
            .map_err(|e| StationError::Recoverable(format!("render failed: {}", e)))
    }

    fn shutdown(&mut self) {
        let result = self.sink.finish();
        if let Some(tx) = self.result_tx.take()
            && tx.send(result).is_err()
        {
            eprintln!("livecap: sink shutdown, result receiver already dropped");
        }
    }
}

/// Collects display events for tests and library use.
///
/// The event log is shared, so a caller can keep a handle while the sink
/// itself moves into the pipeline.
#[derive(Clone)]
pub struct CollectorSink {
    events: Arc<Mutex<Vec<DisplayEvent>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle onto the shared event log.
    pub fn events(&self) -> Arc<Mutex<Vec<DisplayEvent>>> {
        Arc::clone(&self.events)
    }

    /// Snapshot of everything collected so far.
    pub fn collected(&self) -> Vec<DisplayEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSink for CollectorSink {
    fn handle(&mut self, event: &DisplayEvent) -> crate::error::Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        let events = self.events.lock().ok()?;
        events.iter().rev().find_map(|event| match event {
            DisplayEvent::FinalCommit { visible, .. } => Some(visible.clone()),
            _ => None,
        })
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LivecapError;

    fn commit(id: u64, visible: &str) -> DisplayEvent {
        DisplayEvent::FinalCommit {
            segment_id: id,
            visible: visible.to_string(),
        }
    }

    #[test]
    fn presentation_sink_is_object_safe() {
        let _sink: Box<dyn PresentationSink> = Box::new(CollectorSink::new());
    }

    #[test]
    fn collector_sink_records_events_in_order() {
        let mut sink = CollectorSink::new();

        sink.handle(&DisplayEvent::PartialUpdate {
            segment_id: 0,
            text: "hel".to_string(),
        })
        .unwrap();
        sink.handle(&commit(0, "hello")).unwrap();

        let collected = sink.collected();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1], commit(0, "hello"));
    }

    #[test]
    fn collector_sink_finish_returns_last_committed_window() {
        let mut sink = CollectorSink::new();
        sink.handle(&commit(0, "hello")).unwrap();
        sink.handle(&commit(1, "hello world")).unwrap();
        sink.handle(&DisplayEvent::PartialUpdate {
            segment_id: 2,
            text: "aga".to_string(),
        })
        .unwrap();

        assert_eq!(sink.finish(), Some("hello world".to_string()));
    }

    #[test]
    fn collector_sink_finish_empty_returns_none() {
        let mut sink = CollectorSink::new();
        assert_eq!(sink.finish(), None);
    }

    #[test]
    fn collector_sink_shares_log_across_clones() {
        let sink = CollectorSink::new();
        let mut moved = sink.clone();
        moved.handle(&commit(3, "shared")).unwrap();

        assert_eq!(sink.collected(), vec![commit(3, "shared")]);
    }

    #[test]
    fn sink_station_delegates_to_sink() {
        let collector = CollectorSink::new();
        let events = collector.events();
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let mut station = SinkStation::new(Box::new(collector)).with_result_sender(result_tx);
        let mut out = Vec::new();

        station.process(commit(0, "first"), &mut out).unwrap();
        station.process(commit(1, "first second"), &mut out).unwrap();
        station.shutdown();

        assert_eq!(events.lock().unwrap().len(), 2);
        assert_eq!(
            result_rx.recv().unwrap(),
            Some("first second".to_string())
        );
    }

    #[test]
    fn sink_station_render_failure_is_recoverable() {
        struct FailingSink;
        impl PresentationSink for FailingSink {
            fn handle(&mut self, _event: &DisplayEvent) -> crate::error::Result<()> {
                Err(LivecapError::Other("tty gone".to_string()))
            }
        }

        let mut station = SinkStation::new(Box::new(FailingSink));
        let mut out = Vec::new();

        let result = station.process(commit(0, "x"), &mut out);
        assert!(matches!(result, Err(StationError::Recoverable(_))));
    }

    #[test]
    fn sink_station_name_delegates_to_sink() {
        let station = SinkStation::new(Box::new(CollectorSink::new()));
        assert_eq!(station.name(), "collector");
    }

    #[test]
    fn sink_station_shutdown_survives_dropped_receiver() {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        let mut station =
            SinkStation::new(Box::new(CollectorSink::new())).with_result_sender(result_tx);

        drop(result_rx);
        station.shutdown();
    }
}
