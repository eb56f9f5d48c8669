//! Event records for the deterministic simulation kernel.
//!
//! Every effect in the simulation is modeled as an `Event`. Layered
//! chains (application send → channel transmit → device receive → reply)
//! are separate records carrying an explicit payload, dispatched in
//! `(fire time, id)` order by the scheduler.

use std::cmp::Ordering;
use std::net::SocketAddrV4;

use crate::app::AppId;
use crate::packet::{Frame, PacketTag};
use crate::time::VirtualTime;
use crate::topology::DeviceId;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly increasing event identifier, doubling as the insertion
/// sequence that breaks ties between events at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EventId(u64);

impl EventId {
    /// Wrap a raw id. Normally ids come from [`EventIdGen`].
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    /// The underlying counter value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Deterministic, strictly increasing event-ID generator.
///
/// Each `Simulation` owns exactly one, so the counter is the only
/// source of tie-break order.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    /// Start counting from 0.
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }
}

// ── Event Type ────────────────────────────────────────────────────────

/// The payload of an event, which is also its continuation tag: the
/// runtime decides what to do purely from the variant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum EventType {
    /// An application's start time has arrived.
    AppStart { app: AppId },

    /// An application's stop time has arrived.
    AppStop { app: AppId },

    /// A client's `seq`-th periodic send is due.
    ClientSend { app: AppId, seq: u32 },

    /// An application hands a datagram to its device. The runtime
    /// builds the packet, routes it and starts the first hop.
    AppSend {
        device: DeviceId,
        src_port: u16,
        dst: SocketAddrV4,
        size: u32,
        tag: PacketTag,
    },

    /// `device` tries to put `frame` on its channel. Re-queued at the
    /// channel's busy-until time when the medium is occupied.
    Transmit { device: DeviceId, frame: Frame },

    /// `frame` reaches `device` after propagation.
    Receive { device: DeviceId, frame: Frame },

    /// A wireless station starts its association handshake.
    Associate { station: DeviceId },

    /// Periodic mobility update and animation snapshot.
    MobilityTick,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::AppStart { app } => write!(f, "Start({})", app),
            EventType::AppStop { app } => write!(f, "Stop({})", app),
            EventType::ClientSend { app, seq } => write!(f, "ClientSend({}, #{})", app, seq),
            EventType::AppSend {
                device, dst, size, ..
            } => write!(f, "AppSend({} → {}, {} bytes)", device, dst, size),
            EventType::Transmit { device, frame } => write!(f, "Transmit({}, {})", device, frame),
            EventType::Receive { device, frame } => write!(f, "Receive({}, {})", device, frame),
            EventType::Associate { station } => write!(f, "Associate({})", station),
            EventType::MobilityTick => write!(f, "MobilityTick"),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single simulation event, ordered by `(scheduled_at, id)`.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub id: EventId,
    /// The virtual time at which this event fires.
    pub scheduled_at: VirtualTime,
    pub payload: EventType,
}

impl Event {
    pub fn new(id: EventId, scheduled_at: VirtualTime, payload: EventType) -> Self {
        Event {
            id,
            scheduled_at,
            payload,
        }
    }
}

/// Reversed so `BinaryHeap` (a max-heap) pops the smallest
/// `(scheduled_at, id)` first.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
