//! Timed traffic generators bound to devices.
//!
//! Applications never touch the topology directly. They react to
//! lifecycle, timer and packet callbacks from the runtime and put
//! traffic on the network by scheduling `AppSend` events through the
//! [`SimulationContext`].

pub mod echo_client;
pub mod echo_server;

use std::net::SocketAddrV4;

pub use echo_client::EchoClient;
pub use echo_server::EchoServer;

use crate::error::SimResult;
use crate::event::{EventId, EventType};
use crate::packet::{Packet, PacketTag};
use crate::simulation::SimulationContext;
use crate::time::VirtualTime;
use crate::topology::DeviceId;

/// First port handed out to applications that do not ask for one.
pub const EPHEMERAL_PORT_START: u16 = 49153;

/// Index of an installed application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AppId(u32);

impl AppId {
    pub fn new(raw: u32) -> Self {
        AppId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Observability counters. Nothing in the simulation reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AppCounters {
    pub sent: u64,
    pub received: u64,
}

/// Whether an application with `stop` has stopped by `now`.
pub fn is_stopped(stop: Option<VirtualTime>, now: VirtualTime) -> bool {
    stop.map_or(false, |s| now >= s)
}

/// A traffic generator installed on one device.
///
/// # Contract
///
/// - All side effects go through `ctx`.
/// - Callbacks arriving at or after `stop_time` must not produce traffic.
pub trait Application {
    /// Device the application sends from and listens on.
    fn device(&self) -> DeviceId;

    /// Port to listen on. `None` asks the runtime for an ephemeral port.
    fn requested_port(&self) -> Option<u16>;

    /// Called once at install time with the bound local address.
    fn bind(&mut self, local: SocketAddrV4);

    fn local(&self) -> Option<SocketAddrV4>;

    fn start_time(&self) -> VirtualTime;

    fn stop_time(&self) -> Option<VirtualTime>;

    fn on_start(&mut self, ctx: &mut SimulationContext, id: AppId) -> SimResult<()>;

    fn on_stop(&mut self, _ctx: &mut SimulationContext) -> SimResult<()> {
        Ok(())
    }

    /// A timer scheduled through `EventType::ClientSend` fired.
    fn on_timer(&mut self, _ctx: &mut SimulationContext, _id: AppId, _seq: u32) -> SimResult<()> {
        Ok(())
    }

    /// A packet arrived on the bound port.
    fn on_packet(&mut self, ctx: &mut SimulationContext, packet: &Packet) -> SimResult<()>;

    fn counters(&self) -> AppCounters;

    /// Downcast support for `NetworkRuntime::app::<T>()`.
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

impl SimulationContext<'_> {
    /// Hand a datagram to `from`'s device at the current instant.
    pub fn send_datagram(
        &mut self,
        from: SocketAddrV4,
        device: DeviceId,
        dst: SocketAddrV4,
        size: u32,
        tag: PacketTag,
    ) -> SimResult<EventId> {
        self.schedule_after(
            0,
            EventType::AppSend {
                device,
                src_port: from.port(),
                dst,
                size,
                tag,
            },
        )
    }
}
