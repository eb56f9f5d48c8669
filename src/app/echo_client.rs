//! `EchoClient`: sends `max_packets` datagrams at a fixed interval and
//! counts the replies.

use std::net::SocketAddrV4;

use tracing::{debug, info};

use crate::config::EchoClientConfig;
use crate::error::SimResult;
use crate::event::EventType;
use crate::packet::{Packet, PacketTag};
use crate::simulation::SimulationContext;
use crate::time::VirtualTime;
use crate::topology::DeviceId;

use super::{is_stopped, AppCounters, AppId, Application};

#[derive(Debug, Clone)]
pub struct EchoClient {
    device: DeviceId,
    config: EchoClientConfig,
    local: Option<SocketAddrV4>,
    counters: AppCounters,
}

impl EchoClient {
    pub fn new(device: DeviceId, config: EchoClientConfig) -> Self {
        EchoClient {
            device,
            config,
            local: None,
            counters: AppCounters::default(),
        }
    }

    pub fn config(&self) -> &EchoClientConfig {
        &self.config
    }

    /// Adjust timing or volume before the run starts.
    pub fn config_mut(&mut self) -> &mut EchoClientConfig {
        &mut self.config
    }
}

impl Application for EchoClient {
    fn device(&self) -> DeviceId {
        self.device
    }

    fn requested_port(&self) -> Option<u16> {
        None
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

    /// Schedule every send up front at `now + k * interval`. Sends that
    /// would land at or after the stop time are never scheduled.
    fn on_start(&mut self, ctx: &mut SimulationContext, id: AppId) -> SimResult<()> {
        let now = ctx.now();
        for seq in 0..self.config.max_packets {
            let Some(offset) = self.config.interval.checked_mul(u64::from(seq)) else {
                break;
            };
            let Some(at) = now.plus(offset) else {
                break;
            };
            if is_stopped(self.config.stop, at) {
                break;
            }
            ctx.schedule_at(at, EventType::ClientSend { app: id, seq })?;
        }
        debug!(app = %id, packets = self.config.max_packets, "client started");
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut SimulationContext, _id: AppId, seq: u32) -> SimResult<()> {
        let now = ctx.now();
        let Some(local) = self.local else {
            return Ok(());
        };
        if is_stopped(self.config.stop, now) {
            return Ok(());
        }
        let remote = self.config.remote;
        ctx.send_datagram(
            local,
            self.device,
            remote,
            self.config.packet_size,
            PacketTag::EchoRequest { seq },
        )?;
        self.counters.sent += 1;
        info!(
            "At time {} client sent {} bytes to {} port {}",
            now,
            self.config.packet_size,
            remote.ip(),
            remote.port()
        );
        Ok(())
    }

    fn on_packet(&mut self, ctx: &mut SimulationContext, packet: &Packet) -> SimResult<()> {
        if is_stopped(self.config.stop, ctx.now()) {
            return Ok(());
        }
        self.counters.received += 1;
        info!(
            "At time {} client received {} bytes from {} port {}",
            ctx.now(),
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
