//! `NetworkRuntime` owns the topology and applications and dispatches
//! network events.
//!
//! Every layer of a packet's journey is its own event:
//!
//! ```text
//! ClientSend ─► AppSend ─► Transmit ──(channel delay)──► Receive
//!                              ▲  │ busy                    │
//!                              └──┘                         ├─► local listener ─► on_packet
//!                                                           └─► gateway: route ─► Transmit
//! ```
//!
//! Delivery misses are never errors. They are counted in
//! [`NetworkStats`] and the frame is dropped.

use std::collections::BTreeMap;
use std::net::SocketAddrV4;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::app::{AppCounters, AppId, Application, EPHEMERAL_PORT_START};
use crate::error::{SimError, SimResult};
use crate::event::{Event, EventType};
use crate::instrument::{CaptureSink, Direction, PositionSink};
use crate::packet::{Frame, FrameKind, Packet, PacketTag};
use crate::simulation::{EventHandler, Simulation, SimulationContext};
use crate::time::VirtualTime;
use crate::topology::{
    AssociationState, CaptureMode, DeviceId, DeviceRole, Mobility, NodeId, Position, Topology,
    TransmitDecision,
};

/// Delivery counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkStats {
    /// Frames admitted onto a channel.
    pub transmitted: u64,
    /// Transmissions re-queued because the medium was busy.
    pub deferred: u64,
    /// Data frames accepted by the device they were addressed to.
    pub received: u64,
    /// Frames heard by a device they were not addressed to.
    pub filtered: u64,
    pub dropped_unassociated: u64,
    pub dropped_no_route: u64,
    /// Packets reaching a non-gateway node that does not own the
    /// destination address.
    pub discarded_not_addressed: u64,
    /// Packets handed to a listening application.
    pub delivered: u64,
    /// Packets for a local address with nothing bound on the port.
    pub no_listener: u64,
    pub forwarded: u64,
    pub associations: u64,
}

/// Dispatches network events against an owned [`Topology`].
///
/// Implements [`EventHandler`] so it can be passed straight to
/// [`Simulation::run`].
pub struct NetworkRuntime {
    topology: Topology,
    apps: Vec<Box<dyn Application>>,
    /// Ports bound at install time, whether or not the app is running.
    bound: BTreeMap<(DeviceId, u16), AppId>,
    /// Ports currently accepting packets.
    listeners: BTreeMap<(DeviceId, u16), AppId>,
    next_ephemeral: BTreeMap<NodeId, u16>,
    next_packet_uid: u64,
    rng: ChaCha8Rng,
    capture: Option<Box<dyn CaptureSink>>,
    positions: Option<Box<dyn PositionSink>>,
    tick_interval: u64,
    tick_until: Option<VirtualTime>,
    last_tick: Option<VirtualTime>,
    primed: bool,
    stats: NetworkStats,
}

impl NetworkRuntime {
    /// `seed` drives mobility randomness and nothing else.
    pub fn new(topology: Topology, seed: u64) -> Self {
        NetworkRuntime {
            topology,
            apps: Vec::new(),
            bound: BTreeMap::new(),
            listeners: BTreeMap::new(),
            next_ephemeral: BTreeMap::new(),
            next_packet_uid: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            capture: None,
            positions: None,
            tick_interval: VirtualTime::from_millis(100).ticks(),
            tick_until: None,
            last_tick: None,
            primed: false,
            stats: NetworkStats::default(),
        }
    }

    /// The topology being simulated.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Mutable topology access, e.g. to enable capture before priming.
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Snapshot of the frame and packet counters.
    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    /// Receive every captured frame. Replaces any previous sink.
    pub fn set_capture_sink(&mut self, sink: Box<dyn CaptureSink>) {
        self.capture = Some(sink);
    }

    /// Receive initial positions and per-tick snapshots.
    pub fn set_position_sink(&mut self, sink: Box<dyn PositionSink>) {
        self.positions = Some(sink);
    }

    /// Ticks between mobility snapshots.
    pub fn set_tick_interval(&mut self, ticks: u64) {
        self.tick_interval = ticks.max(1);
    }

    /// Downcast the capture sink for inspection.
    pub fn capture_sink<T: CaptureSink + 'static>(&self) -> Option<&T> {
        self.capture.as_ref()?.as_any().downcast_ref::<T>()
    }

    /// Downcast the installed position sink.
    pub fn position_sink<T: PositionSink + 'static>(&self) -> Option<&T> {
        self.positions.as_ref()?.as_any().downcast_ref::<T>()
    }

    // ── Applications ──────────────────────────────────────────

    /// Bind an application to its device's address and register it.
    /// Apps without a requested port get the node's next ephemeral port.
    pub fn install(&mut self, mut app: Box<dyn Application>) -> SimResult<AppId> {
        let device = app.device();
        let ip = self.topology.ip_of(device)?;
        let node = self.topology.device(device)?.node();
        let port = match app.requested_port() {
            Some(port) => port,
            None => self.ephemeral_port(node)?,
        };
        if self.bound.contains_key(&(device, port)) {
            return Err(SimError::PortInUse { device, port });
        }
        let id = AppId::new(self.apps.len() as u32);
        let local = SocketAddrV4::new(ip, port);
        app.bind(local);
        self.bound.insert((device, port), id);
        self.apps.push(app);
        debug!(app = %id, %device, %local, "application installed");
        Ok(id)
    }

    fn ephemeral_port(&mut self, node: NodeId) -> SimResult<u16> {
        let next = self.next_ephemeral.entry(node).or_insert(EPHEMERAL_PORT_START);
        let port = *next;
        *next = port.checked_add(1).ok_or_else(|| {
            SimError::InvalidConfig(format!("node {} ran out of ephemeral ports", node))
        })?;
        Ok(port)
    }

    /// Number of installed applications.
    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    /// Downcast an application reference for inspection.
    pub fn app<T: Application + 'static>(&self, id: AppId) -> Option<&T> {
        self.apps
            .get(id.raw() as usize)?
            .as_any()
            .downcast_ref::<T>()
    }

    /// Mutable downcast of an installed application.
    pub fn app_mut<T: Application + 'static>(&mut self, id: AppId) -> Option<&mut T> {
        self.apps
            .get_mut(id.raw() as usize)?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Sent/received counters for every application, in install order.
    pub fn app_counters(&self) -> Vec<(AppId, AppCounters)> {
        self.apps
            .iter()
            .enumerate()
            .map(|(i, app)| (AppId::new(i as u32), app.counters()))
            .collect()
    }

    fn app_entry(&mut self, id: AppId) -> SimResult<&mut Box<dyn Application>> {
        self.apps
            .get_mut(id.raw() as usize)
            .ok_or(SimError::UnknownApp(id))
    }

    // ── Priming ───────────────────────────────────────────────

    /// Seed `sim` with application lifecycle events, association
    /// handshakes and mobility ticks, and report initial positions.
    /// Later calls do nothing.
    pub fn prime(&mut self, sim: &mut Simulation) -> SimResult<()> {
        if self.primed {
            return Ok(());
        }
        self.primed = true;

        for (i, app) in self.apps.iter().enumerate() {
            let id = AppId::new(i as u32);
            sim.schedule(app.start_time(), EventType::AppStart { app: id })?;
            if let Some(stop) = app.stop_time() {
                sim.schedule(stop, EventType::AppStop { app: id })?;
            }
        }

        for device in self.topology.devices() {
            if let DeviceRole::Station {
                associate_at: Some(at),
            } = device.role()
            {
                sim.schedule(at, EventType::Associate { station: device.id() })?;
            }
        }

        let placed: Vec<(NodeId, Position)> = self
            .topology
            .nodes()
            .iter()
            .filter_map(|n| n.mobility().map(|m| (n.id(), m.position())))
            .collect();
        if let Some(sink) = self.positions.as_mut() {
            for (node, p) in &placed {
                sink.on_position_assigned(*node, p.x, p.y);
            }
        }
        if let Some(stop) = sim.stop_time() {
            if !placed.is_empty() {
                self.tick_until = Some(stop);
                sim.schedule(sim.current_time(), EventType::MobilityTick)?;
            }
        }
        Ok(())
    }

    /// Flush both sinks once the run is over.
    pub fn flush(&mut self) -> SimResult<()> {
        if let Some(sink) = self.capture.as_mut() {
            sink.flush().map_err(|e| SimError::Sink(e.to_string()))?;
        }
        if let Some(sink) = self.positions.as_mut() {
            sink.flush().map_err(|e| SimError::Sink(e.to_string()))?;
        }
        Ok(())
    }

    // ── Packet path ───────────────────────────────────────────

    fn record_capture(&mut self, device: DeviceId, direction: Direction, now: VirtualTime, frame: &Frame) -> SimResult<()> {
        let Some(mode) = self.topology.device(device)?.capture() else {
            return Ok(());
        };
        let seen = match (mode, direction) {
            (_, Direction::Tx) | (CaptureMode::Promiscuous, Direction::Rx) => true,
            (CaptureMode::Normal, Direction::Rx) => frame.next_hop == device,
        };
        if seen {
            if let Some(sink) = self.capture.as_mut() {
                sink.on_packet_event(device, direction, now, frame);
            }
        }
        Ok(())
    }

    /// Pick the next hop for `packet` leaving `node` and queue the
    /// first transmission.
    fn route(&mut self, ctx: &mut SimulationContext, node: NodeId, packet: Packet) -> SimResult<()> {
        let dst = *packet.dst.ip();
        let Some(route) = self.topology.node(node)?.routing_table().lookup(dst).copied() else {
            debug!(%node, %dst, "no route");
            self.stats.dropped_no_route += 1;
            return Ok(());
        };
        let next_hop = match route.gateway {
            Some(gateway) => gateway,
            None => {
                let channel = self.topology.device(route.out_device)?.channel();
                match self.topology.device_on_channel(channel, dst) {
                    Some(host) => host,
                    None => {
                        debug!(%node, %dst, "destination not on connected segment");
                        self.stats.dropped_no_route += 1;
                        return Ok(());
                    }
                }
            }
        };
        ctx.schedule_after(
            0,
            EventType::Transmit {
                device: route.out_device,
                frame: Frame::data(packet, route.out_device, next_hop),
            },
        )?;
        Ok(())
    }

    /// Hand `packet` to whatever listens on `device`'s destination port.
    fn deliver_local(&mut self, ctx: &mut SimulationContext, device: DeviceId, packet: &Packet) -> SimResult<()> {
        match self.listeners.get(&(device, packet.dst.port())).copied() {
            Some(app) => {
                self.stats.delivered += 1;
                self.app_entry(app)?.on_packet(ctx, packet)
            }
            None => {
                trace!(%device, port = packet.dst.port(), "no listener");
                self.stats.no_listener += 1;
                Ok(())
            }
        }
    }

    fn on_app_send(
        &mut self,
        ctx: &mut SimulationContext,
        device: DeviceId,
        src_port: u16,
        dst: SocketAddrV4,
        size: u32,
        tag: PacketTag,
    ) -> SimResult<()> {
        let src = SocketAddrV4::new(self.topology.ip_of(device)?, src_port);
        let packet = Packet {
            uid: self.next_packet_uid,
            size,
            origin: device,
            src,
            dst,
            tag,
        };
        self.next_packet_uid += 1;

        let node = self.topology.device(device)?.node();
        if let Some(local) = self.topology.local_device(node, *dst.ip()) {
            return self.deliver_local(ctx, local, &packet);
        }
        self.route(ctx, node, packet)
    }

    fn on_transmit(&mut self, ctx: &mut SimulationContext, device: DeviceId, frame: &Frame) -> SimResult<()> {
        let now = ctx.now();
        let channel = self.topology.device(device)?.channel();
        let decision = self.topology.channel_mut(channel)?.transmit(now, device, frame);
        match decision {
            TransmitDecision::Admitted { receivers, delay } => {
                self.stats.transmitted += 1;
                self.record_capture(device, Direction::Tx, now, frame)?;
                for receiver in receivers {
                    ctx.schedule_after(
                        delay,
                        EventType::Receive {
                            device: receiver,
                            frame: frame.clone(),
                        },
                    )?;
                }
            }
            TransmitDecision::Deferred { retry_at } => {
                self.stats.deferred += 1;
                ctx.schedule_at(
                    retry_at,
                    EventType::Transmit {
                        device,
                        frame: frame.clone(),
                    },
                )?;
            }
            TransmitDecision::DroppedUnassociated => {
                self.stats.dropped_unassociated += 1;
            }
        }
        Ok(())
    }

    fn on_receive(&mut self, ctx: &mut SimulationContext, device: DeviceId, frame: &Frame) -> SimResult<()> {
        self.record_capture(device, Direction::Rx, ctx.now(), frame)?;
        if frame.next_hop != device {
            self.stats.filtered += 1;
            return Ok(());
        }

        match &frame.kind {
            FrameKind::AssociationRequest => {
                let channel = self.topology.device(device)?.channel();
                if let Some(table) = self.topology.channel_mut(channel)?.associations_mut() {
                    table.mark(frame.sender, AssociationState::Pending);
                }
                ctx.schedule_after(
                    0,
                    EventType::Transmit {
                        device,
                        frame: Frame {
                            kind: FrameKind::AssociationResponse,
                            sender: device,
                            next_hop: frame.sender,
                        },
                    },
                )?;
                Ok(())
            }
            FrameKind::AssociationResponse => {
                let channel = self.topology.device(device)?.channel();
                if let Some(table) = self.topology.channel_mut(channel)?.associations_mut() {
                    table.mark(device, AssociationState::Associated);
                }
                self.stats.associations += 1;
                debug!(station = %device, %channel, at = %ctx.now(), "associated");
                Ok(())
            }
            FrameKind::Data(packet) => {
                self.stats.received += 1;
                let node = self.topology.device(device)?.node();
                if let Some(local) = self.topology.local_device(node, *packet.dst.ip()) {
                    return self.deliver_local(ctx, local, packet);
                }
                if self.topology.node(node)?.is_gateway() {
                    self.stats.forwarded += 1;
                    return self.route(ctx, node, packet.clone());
                }
                self.stats.discarded_not_addressed += 1;
                Ok(())
            }
        }
    }

    fn on_associate(&mut self, ctx: &mut SimulationContext, station: DeviceId) -> SimResult<()> {
        let channel = self.topology.device(station)?.channel();
        let Some(ap) = self
            .topology
            .channel(channel)?
            .associations()
            .and_then(|t| t.access_point())
        else {
            return Err(SimError::NotSharedMedium { channel });
        };
        ctx.schedule_after(
            0,
            EventType::Transmit {
                device: station,
                frame: Frame {
                    kind: FrameKind::AssociationRequest,
                    sender: station,
                    next_hop: ap,
                },
            },
        )?;
        Ok(())
    }

    fn on_mobility_tick(&mut self, ctx: &mut SimulationContext) -> SimResult<()> {
        let now = ctx.now();
        let dt = self
            .last_tick
            .and_then(|last| now.duration_since(last))
            .unwrap_or(0);
        self.last_tick = Some(now);

        let mut snapshot = Vec::new();
        for node in &mut self.topology.nodes {
            if let Some(Mobility::RandomWalk(walk)) = node.mobility.as_mut() {
                walk.advance(now, dt, &mut self.rng);
            }
            if let Some(m) = &node.mobility {
                snapshot.push((node.id, m.position()));
            }
        }
        if let Some(sink) = self.positions.as_mut() {
            sink.on_simulation_tick(now, &snapshot);
        }

        if let (Some(until), Some(next)) = (self.tick_until, now.plus(self.tick_interval)) {
            if next <= until {
                ctx.schedule_at(next, EventType::MobilityTick)?;
            }
        }
        Ok(())
    }
}

impl EventHandler for NetworkRuntime {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> SimResult<()> {
        match &event.payload {
            EventType::AppStart { app } => {
                let id = *app;
                let entry = self.app_entry(id)?;
                if let Some(local) = entry.local() {
                    let device = entry.device();
                    self.listeners.insert((device, local.port()), id);
                }
                self.app_entry(id)?.on_start(ctx, id)
            }
            EventType::AppStop { app } => {
                let id = *app;
                let entry = self.app_entry(id)?;
                if let Some(local) = entry.local() {
                    let device = entry.device();
                    self.listeners.remove(&(device, local.port()));
                }
                self.app_entry(id)?.on_stop(ctx)
            }
            EventType::ClientSend { app, seq } => self.app_entry(*app)?.on_timer(ctx, *app, *seq),
            EventType::AppSend {
                device,
                src_port,
                dst,
                size,
                tag,
            } => self.on_app_send(ctx, *device, *src_port, *dst, *size, *tag),
            EventType::Transmit { device, frame } => self.on_transmit(ctx, *device, frame),
            EventType::Receive { device, frame } => self.on_receive(ctx, *device, frame),
            EventType::Associate { station } => self.on_associate(ctx, *station),
            EventType::MobilityTick => self.on_mobility_tick(ctx),
        }
    }
}
