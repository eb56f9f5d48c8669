//! # Segnet — Deterministic Multi-Segment Network Simulation
//!
//! A discrete-event simulation core for heterogeneous networks:
//! point-to-point links, shared buses and wireless cells, bridged by
//! gateway nodes, addressed per segment, routed once, and driven by
//! timed echo traffic. No threads and no wall-clock time; two runs with
//! the same inputs produce byte-identical traces.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────┐
//! │      NetworkSimulation        │ ← build → address → route → run → flush
//! │  ┌─────────────────────────┐  │
//! │  │     NetworkRuntime      │  │ ← topology, apps, sinks
//! │  │  ┌───────────────────┐  │  │
//! │  │  │    Simulation     │  │  │ ← execution loop + stop time
//! │  │  │  ┌─────────────┐  │  │  │
//! │  │  │  │  Scheduler  │  │  │  │ ← deterministic min-heap
//! │  │  │  └─────────────┘  │  │  │
//! │  │  │  ┌─────────────┐  │  │  │
//! │  │  │  │   Events    │  │  │  │ ← payload + continuation tag
//! │  │  │  └─────────────┘  │  │  │
//! │  │  │  ┌─────────────┐  │  │  │
//! │  │  │  │ VirtualTime │  │  │  │ ← nanosecond logical clock
//! │  │  │  └─────────────┘  │  │  │
//! │  │  └───────────────────┘  │  │
//! │  └─────────────────────────┘  │
//! └───────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use segnet::config::ScenarioConfig;
//! use segnet::scenario::second;
//!
//! let mut scenario = second(&ScenarioConfig::default()).unwrap();
//! let summary = scenario.net.run().unwrap();
//! assert_eq!(summary.stats.delivered, 2);
//! ```

pub mod address;
pub mod app;
pub mod config;
pub mod error;
pub mod event;
pub mod instrument;
pub mod packet;
pub mod routing;
pub mod runtime;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod topology;

// Re-exports for convenience.
pub use address::{AddressAllocator, SegmentId, Subnet};
pub use app::{AppId, Application, EchoClient, EchoServer};
pub use error::{SimError, SimResult};
pub use event::{Event, EventId, EventIdGen, EventType};
pub use instrument::{CaptureSink, Direction, PacketTrace, PositionLog, PositionSink};
pub use runtime::{NetworkRuntime, NetworkStats};
pub use scenario::{NetworkSimulation, RunSummary, Scenario};
pub use scheduler::Scheduler;
pub use simulation::{EventHandler, Simulation, SimulationContext};
pub use time::VirtualTime;
pub use topology::{ChannelId, DeviceId, NodeId, Topology, TopologyBuilder};
