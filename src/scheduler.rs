//! Deterministic event scheduler.
//!
//! A `BinaryHeap` with reversed `Ord` on `Event` acts as a min-heap
//! keyed by `(scheduled_at, event_id)`. Event ids are handed out in
//! insertion order, so events sharing an instant pop FIFO and two runs
//! that schedule the same events dispatch them identically.

use std::collections::BinaryHeap;

use crate::event::{Event, EventId, EventIdGen, EventType};
use crate::time::VirtualTime;

/// Owns the event queue and the id generator. All scheduling goes
/// through here so ids stay monotonic.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Event>,
    id_gen: EventIdGen,
}

impl Scheduler {
    /// Create an empty scheduler whose first event gets id 0.
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Enqueue `payload` at absolute time `at`. Causality is checked by
    /// the caller (`Simulation` / `SimulationContext`), which knows `now`.
    pub fn schedule(&mut self, at: VirtualTime, payload: EventType) -> EventId {
        let id = self.id_gen.next_id();
        self.queue.push(Event::new(id, at, payload));
        id
    }

    /// Pop the earliest event (lowest id among equals).
    pub fn pop_next(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    /// Fire time of the next event, if any.
    pub fn peek_time(&self) -> Option<VirtualTime> {
        self.queue.peek().map(|e| e.scheduled_at)
    }

    /// Returns `true` if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
