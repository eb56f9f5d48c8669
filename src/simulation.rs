//! Simulation execution loop.
//!
//! Drives the scheduler: pops events, advances virtual time, dispatches
//! to a handler. The loop is synchronous and single-threaded; a handler
//! runs to completion before the next event is popped.

use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventType};
use crate::scheduler::Scheduler;
use crate::time::VirtualTime;

// ── Handler trait ─────────────────────────────────────────────────────

/// Reacts to dispatched events. An error returned here is not caught:
/// it ends the run and surfaces from [`Simulation::run`].
pub trait EventHandler {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> SimResult<()>;
}

/// A handler backed by a closure, for tests and one-off scripts.
impl<F> EventHandler for F
where
    F: FnMut(&mut SimulationContext, &Event) -> SimResult<()>,
{
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> SimResult<()> {
        (self)(ctx, event)
    }
}

// ── Simulation Context ───────────────────────────────────────────────

/// Mutable context handed to the handler on every dispatch: the current
/// time plus the ability to schedule follow-up events.
pub struct SimulationContext<'a> {
    pub(crate) scheduler: &'a mut Scheduler,
    pub(crate) now: VirtualTime,
}

impl<'a> SimulationContext<'a> {
    /// Time of the event being dispatched.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Schedule an event at an absolute time, which must not be in the past.
    pub fn schedule_at(&mut self, at: VirtualTime, payload: EventType) -> SimResult<EventId> {
        if at < self.now {
            return Err(SimError::InvalidTime {
                reason: format!("cannot schedule at {} when now is {}", at, self.now),
            });
        }
        Ok(self.scheduler.schedule(at, payload))
    }

    /// Schedule an event `delay` ticks after now.
    pub fn schedule_after(&mut self, delay: u64, payload: EventType) -> SimResult<EventId> {
        let at = self.now.plus(delay).ok_or_else(|| SimError::InvalidTime {
            reason: format!("{} + {} ticks overflows the clock", self.now, delay),
        })?;
        Ok(self.scheduler.schedule(at, payload))
    }

    /// Events still queued, including ones past the stop time.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Owns the scheduler, the clock and the single authoritative stop time.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    scheduler: Scheduler,
    current_time: VirtualTime,
    events_processed: u64,
    stop_at: Option<VirtualTime>,
}

impl Simulation {
    /// Create a simulation at time zero with no stop time.
    pub fn new() -> Self {
        Simulation {
            scheduler: Scheduler::new(),
            current_time: VirtualTime::ZERO,
            events_processed: 0,
            stop_at: None,
        }
    }

    /// Current virtual time.
    pub fn current_time(&self) -> VirtualTime {
        self.current_time
    }

    /// Total events dispatched so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Set the stop time. The last call wins. Events strictly after it
    /// stay queued and never run.
    pub fn stop_at(&mut self, at: VirtualTime) {
        self.stop_at = Some(at);
    }

    /// The stop time, if one was set.
    pub fn stop_time(&self) -> Option<VirtualTime> {
        self.stop_at
    }

    /// Schedule an event at an absolute time, e.g. to seed the run.
    pub fn schedule(&mut self, at: VirtualTime, payload: EventType) -> SimResult<EventId> {
        if at < self.current_time {
            return Err(SimError::InvalidTime {
                reason: format!(
                    "cannot schedule at {} when now is {}",
                    at, self.current_time
                ),
            });
        }
        Ok(self.scheduler.schedule(at, payload))
    }

    /// Schedule `delay_secs` seconds after the current time. Negative
    /// delays are rejected with `InvalidTime` rather than clamped.
    pub fn schedule_in(&mut self, delay_secs: f64, payload: EventType) -> SimResult<EventId> {
        let delay = VirtualTime::from_secs_f64(delay_secs)?;
        let at = self
            .current_time
            .plus(delay.ticks())
            .ok_or_else(|| SimError::InvalidTime {
                reason: format!("{} + {}s overflows the clock", self.current_time, delay_secs),
            })?;
        self.schedule(at, payload)
    }

    /// Whether the next event lies beyond the stop time.
    fn halted(&self) -> bool {
        match (self.stop_at, self.scheduler.peek_time()) {
            (Some(stop), Some(next)) => next > stop,
            _ => false,
        }
    }

    /// Pop one event, advance time and dispatch it.
    ///
    /// Returns `Ok(None)` when the queue is empty or the next event is
    /// past the stop time.
    pub fn step(&mut self, handler: &mut dyn EventHandler) -> SimResult<Option<Event>> {
        if self.halted() {
            if let Some(stop) = self.stop_at {
                self.current_time = self.current_time.max(stop);
            }
            return Ok(None);
        }
        let Some(event) = self.scheduler.pop_next() else {
            return Ok(None);
        };

        debug_assert!(
            event.scheduled_at >= self.current_time,
            "time went backward: current={}, event={}",
            self.current_time,
            event.scheduled_at
        );
        self.current_time = event.scheduled_at;
        self.events_processed += 1;
        trace!(id = %event.id, at = %event.scheduled_at, event = %event.payload, "dispatch");

        let mut ctx = SimulationContext {
            scheduler: &mut self.scheduler,
            now: self.current_time,
        };
        handler.handle(&mut ctx, &event)?;

        Ok(Some(event))
    }

    /// Run until the queue drains or the stop time is reached.
    /// Returns the number of events processed during this call.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> SimResult<u64> {
        let start = self.events_processed;
        while self.step(handler)?.is_some() {}
        Ok(self.events_processed - start)
    }

    /// True when nothing is left to dispatch: the queue is empty or the
    /// remaining events all lie past the stop time.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_empty() || self.halted()
    }

    /// Events still queued, including ones past the stop time.
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }
}
