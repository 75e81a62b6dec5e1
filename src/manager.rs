//! Per-thread event buffer
//!
//! One [`EventManager`] exists per thread for the lifetime of that thread,
//! so `append` needs no cross-thread synchronization. When the buffer
//! reaches [`FLUSH_THRESHOLD`] events it is swapped for an empty one and the
//! batch is handed (by ownership transfer) to an [`EventSink`] — in
//! production the coordinator's file flush path, in tests a collector.

use crate::event::Event;
use std::mem;
use std::sync::Arc;

/// Buffered events that trigger an automatic flush.
///
/// 150 appends on one otherwise idle thread produce exactly two batches of
/// 100 and 50 events.
pub const FLUSH_THRESHOLD: usize = 100;

/// Receives flushed batches from per-thread buffers.
pub trait EventSink: Send + Sync {
    fn write_batch(&self, events: Vec<Event>);
}

/// Ordered, growable buffer of events produced by a single thread.
pub struct EventManager {
    events: Vec<Event>,
    sink: Arc<dyn EventSink>,
}

impl EventManager {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        EventManager {
            events: Vec::with_capacity(FLUSH_THRESHOLD),
            sink,
        }
    }

    /// Append one event; flushes automatically once the threshold is hit.
    pub fn append(&mut self, event: Event) {
        self.events.push(event);
        if self.events.len() >= FLUSH_THRESHOLD {
            self.flush();
        }
    }

    /// Swap the buffer for an empty one and hand the batch to the sink.
    /// No-op when the buffer is empty.
    pub fn flush(&mut self) {
        if self.events.is_empty() {
            return;
        }
        let batch = mem::take(&mut self.events);
        self.sink.write_batch(batch);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Drop for EventManager {
    fn drop(&mut self) {
        // No buffered events may be lost on thread exit.
        self.flush();
    }
}
