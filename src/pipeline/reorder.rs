//! Segment-id reorder buffer.
//!
//! Engine requests may complete out of order when the worker pool runs more
//! than one in flight. Both the transcription and translation stages push
//! their results through a [`ReorderBuffer`], which releases them strictly
//! in increasing segment-id order: events for the head segment pass through
//! immediately, events for later segments wait until every earlier segment
//! has produced its terminal event.

use std::collections::{BTreeMap, BTreeSet};

/// Reorders per-segment events so downstream consumers observe them in
/// segment-id order.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    /// The id whose events are currently released immediately.
    next_id: u64,
    /// Buffered events for segments at or after `next_id`.
    queued: BTreeMap<u64, Vec<T>>,
    /// Segments whose terminal event has arrived but not yet been released.
    finished: BTreeSet<u64>,
}

impl<T> ReorderBuffer<T> {
    /// Creates a buffer expecting `start_id` as the first segment.
    pub fn new(start_id: u64) -> Self {
        Self {
            next_id: start_id,
            queued: BTreeMap::new(),
            finished: BTreeSet::new(),
        }
    }

    /// Accepts an event for `id`, appending any now-releasable events to
    /// `out` in order.
    ///
    /// `terminal` marks the final event of the segment; once the head
    /// segment's terminal is released, the head advances and any backlog
    /// behind it drains.
    ///
    /// Events for ids that have already fully released are stale and are
    /// dropped (a partial must never trail its final).
    pub fn push(&mut self, id: u64, item: T, terminal: bool, out: &mut Vec<T>) {
        if id < self.next_id {
            return;
        }
        if terminal {
            self.finished.insert(id);
        }
        self.queued.entry(id).or_default().push(item);
        self.release_ready(out);
    }

    /// The id currently at the head of the queue.
    pub fn head(&self) -> u64 {
        self.next_id
    }

    /// Number of segments with buffered, unreleased events.
    pub fn pending_segments(&self) -> usize {
        self.queued.len()
    }

    fn release_ready(&mut self, out: &mut Vec<T>) {
        loop {
            if let Some(events) = self.queued.remove(&self.next_id) {
                out.extend(events);
            }
            if self.finished.remove(&self.next_id) {
                self.next_id += 1;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(buf: &mut ReorderBuffer<&'static str>, id: u64, item: &'static str, terminal: bool) -> Vec<&'static str> {
        let mut out = Vec::new();
        buf.push(id, item, terminal, &mut out);
        out
    }

    #[test]
    fn test_in_order_events_pass_through() {
        let mut buf = ReorderBuffer::new(0);
        assert_eq!(push(&mut buf, 0, "a", true), vec!["a"]);
        assert_eq!(push(&mut buf, 1, "b", true), vec!["b"]);
        assert_eq!(buf.head(), 2);
    }

    #[test]
    fn test_out_of_order_final_is_held() {
        let mut buf = ReorderBuffer::new(0);
        // Segment 1 finishes before segment 0
        assert!(push(&mut buf, 1, "b", true).is_empty());
        assert_eq!(buf.pending_segments(), 1);
        // Segment 0 arriving releases both, in order
        assert_eq!(push(&mut buf, 0, "a", true), vec!["a", "b"]);
        assert_eq!(buf.head(), 2);
        assert_eq!(buf.pending_segments(), 0);
    }

    #[test]
    fn test_head_partials_release_immediately() {
        let mut buf = ReorderBuffer::new(0);
        assert_eq!(push(&mut buf, 0, "p1", false), vec!["p1"]);
        assert_eq!(push(&mut buf, 0, "p2", false), vec!["p2"]);
        // Head does not advance until the terminal arrives
        assert_eq!(buf.head(), 0);
        assert_eq!(push(&mut buf, 0, "final", true), vec!["final"]);
        assert_eq!(buf.head(), 1);
    }

    #[test]
    fn test_future_partials_wait_for_head() {
        let mut buf = ReorderBuffer::new(0);
        // Partials for segment 1 must not visually precede segment 0
        assert!(push(&mut buf, 1, "b-partial", false).is_empty());
        assert!(push(&mut buf, 1, "b-final", true).is_empty());
        assert_eq!(
            push(&mut buf, 0, "a-final", true),
            vec!["a-final", "b-partial", "b-final"]
        );
    }

    #[test]
    fn test_stale_events_are_dropped() {
        let mut buf = ReorderBuffer::new(0);
        push(&mut buf, 0, "a", true);
        assert!(push(&mut buf, 0, "late", false).is_empty());
        assert_eq!(buf.head(), 1);
    }

    #[test]
    fn test_long_backlog_drains_in_order() {
        let mut buf = ReorderBuffer::new(0);
        for id in (1..5).rev() {
            assert!(push(&mut buf, id, "x", true).is_empty());
        }
        let mut out = Vec::new();
        buf.push(0, "head", true, &mut out);
        assert_eq!(out.len(), 5);
        assert_eq!(out[0], "head");
        assert_eq!(buf.head(), 5);
    }

    #[test]
    fn test_nonzero_start_id() {
        let mut buf = ReorderBuffer::new(10);
        assert!(push(&mut buf, 11, "b", true).is_empty());
        assert_eq!(push(&mut buf, 10, "a", true), vec!["a", "b"]);
    }
}
