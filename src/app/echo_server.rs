//! `EchoServer`: replies to every datagram on its port with one of the
//! same size.

use std::net::SocketAddrV4;

use tracing::info;

use crate::config::EchoServerConfig;
use crate::error::SimResult;
use crate::packet::{Packet, PacketTag};
use crate::simulation::SimulationContext;
use crate::time::VirtualTime;
use crate::topology::DeviceId;

use super::{is_stopped, AppCounters, AppId, Application};

#[derive(Debug, Clone)]
pub struct EchoServer {
    device: DeviceId,
    config: EchoServerConfig,
    local: Option<SocketAddrV4>,
    counters: AppCounters,
}

impl EchoServer {
    pub fn new(device: DeviceId, config: EchoServerConfig) -> Self {
        EchoServer {
            device,
            config,
            local: None,
            counters: AppCounters::default(),
        }
    }

    pub fn config(&self) -> &EchoServerConfig {
        &self.config
    }
}

impl Application for EchoServer {
    fn device(&self) -> DeviceId {
        self.device
    }

    fn requested_port(&self) -> Option<u16> {
        Some(self.config.port)
    }

    fn bind(&mut self, local: SocketAddrV4) {
        self.local = Some(local);
    }

    fn local(&self) -> Option<SocketAddrV4> {
        self.local
    }

    fn start_time(&self) -> VirtualTime {
        self.config.start
    }

    fn stop_time(&self) -> Option<VirtualTime> {
        self.config.stop
    }

    fn on_start(&mut self, _ctx: &mut SimulationContext, _id: AppId) -> SimResult<()> {
        Ok(())
    }

    fn on_packet(&mut self, ctx: &mut SimulationContext, packet: &Packet) -> SimResult<()> {
        let now = ctx.now();
        let Some(local) = self.local else {
            return Ok(());
        };
        if is_stopped(self.config.stop, now) {
            return Ok(());
        }
        self.counters.received += 1;
        info!(
            "At time {} server received {} bytes from {} port {}",
            now,
            packet.size,
            packet.src.ip(),
            packet.src.port()
        );

        let seq = match packet.tag {
            PacketTag::EchoRequest { seq } | PacketTag::EchoReply { seq } => seq,
        };
        ctx.send_datagram(local, self.device, packet.src, packet.size, PacketTag::EchoReply { seq })?;
        self.counters.sent += 1;
        info!(
            "At time {} server sent {} bytes to {} port {}",
            now,
            packet.size,
            packet.src.ip(),
            packet.src.port()
        );
        Ok(())
    }

    fn counters(&self) -> AppCounters {
        self.counters
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
