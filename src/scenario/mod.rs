//! The owned simulation aggregate and the two reference topologies.
//!
//! [`NetworkSimulation`] ties a [`Simulation`] clock to a
//! [`NetworkRuntime`] and runs the whole life cycle: converge routing,
//! prime application events, run to the stop time, flush sinks.
//!
//! ```text
//!  second:   n0 ──p2p 10.1.1.0── n1 ══bus 10.1.2.0══ n2 … n(1+nCsma)
//!                                                         └ echo server :9
//!
//!  third:    sta … sta ~~wifi 10.1.3.0~~ n0(AP) ──p2p── n1 ══bus══ … server
//!            └ echo client on the last station
//! ```

#[cfg(test)]
mod tests;

use std::net::{Ipv4Addr, SocketAddrV4};

use tracing::{debug, info};

use crate::address::AddressAllocator;
use crate::app::{AppCounters, AppId, Application, EchoClient, EchoServer};
use crate::config::{
    CsmaConfig, EchoClientConfig, EchoServerConfig, GridConfig, PointToPointConfig,
    RandomWalkConfig, ScenarioConfig, WifiConfig,
};
use crate::error::{SimError, SimResult};
use crate::instrument::{PacketTrace, PositionLog};
use crate::routing::populate_routing_tables;
use crate::runtime::{NetworkRuntime, NetworkStats};
use crate::simulation::Simulation;
use crate::time::VirtualTime;
use crate::topology::{
    CaptureMode, DeviceId, GridPositionAllocator, Mobility, NodeId, Position, RandomWalk, Topology,
    TopologyBuilder,
};

const SEGMENT_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
const P2P_BASE: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 0);
const CSMA_BASE: Ipv4Addr = Ipv4Addr::new(10, 1, 2, 0);
const WIFI_BASE: Ipv4Addr = Ipv4Addr::new(10, 1, 3, 0);

// ── Run summary ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RunSummary {
    pub events_processed: u64,
    pub final_time: VirtualTime,
    pub apps: Vec<(AppId, AppCounters)>,
    pub stats: NetworkStats,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "events={} final_time={}",
            self.events_processed, self.final_time
        )?;
        for (id, c) in &self.apps {
            writeln!(f, "  {} sent={} received={}", id, c.sent, c.received)?;
        }
        write!(
            f,
            "  frames tx={} deferred={} rx={} filtered={} unassociated={} no_route={} not_addressed={}",
            self.stats.transmitted,
            self.stats.deferred,
            self.stats.received,
            self.stats.filtered,
            self.stats.dropped_unassociated,
            self.stats.dropped_no_route,
            self.stats.discarded_not_addressed
        )
    }
}

// ── NetworkSimulation ─────────────────────────────────────────────────

/// Explicitly owned simulation: construct, install, run, inspect.
pub struct NetworkSimulation {
    sim: Simulation,
    runtime: NetworkRuntime,
}

impl NetworkSimulation {
    /// Converge routing over an addressed topology.
    pub fn new(mut topology: Topology, allocator: &AddressAllocator, seed: u64) -> Self {
        let routes = populate_routing_tables(&mut topology, allocator);
        debug!(routes, "routing converged");
        NetworkSimulation {
            sim: Simulation::new(),
            runtime: NetworkRuntime::new(topology, seed),
        }
    }

    pub fn install(&mut self, app: Box<dyn Application>) -> SimResult<AppId> {
        self.runtime.install(app)
    }

    pub fn stop_at(&mut self, at: VirtualTime) {
        self.sim.stop_at(at);
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn runtime(&self) -> &NetworkRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut NetworkRuntime {
        &mut self.runtime
    }

    pub fn topology(&self) -> &Topology {
        self.runtime.topology()
    }

    /// Run to completion and flush the sinks.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.runtime.prime(&mut self.sim)?;
        self.sim.run(&mut self.runtime)?;
        self.runtime.flush()?;
        let summary = RunSummary {
            events_processed: self.sim.events_processed(),
            final_time: self.sim.current_time(),
            apps: self.runtime.app_counters(),
            stats: self.runtime.stats(),
        };
        info!(
            events = summary.events_processed,
            final_time = %summary.final_time,
            "simulation finished"
        );
        Ok(summary)
    }

    pub fn packet_trace(&self) -> Option<&PacketTrace> {
        self.runtime.capture_sink::<PacketTrace>()
    }

    pub fn position_log(&self) -> Option<&PositionLog> {
        self.runtime.position_sink::<PositionLog>()
    }
}

// ── Reference scenarios ───────────────────────────────────────────────

/// A built reference scenario, ready to run.
pub struct Scenario {
    pub net: NetworkSimulation,
    pub client: AppId,
    pub server: AppId,
    pub server_address: SocketAddrV4,
}

impl Scenario {
    pub fn client(&self) -> Option<&EchoClient> {
        self.net.runtime().app::<EchoClient>(self.client)
    }

    pub fn server(&self) -> Option<&EchoServer> {
        self.net.runtime().app::<EchoServer>(self.server)
    }
}

/// The point-to-point link and bus shared by both scenarios.
struct WiredCore {
    p2p_nodes: [NodeId; 2],
    csma_nodes: Vec<NodeId>,
    p2p_devices: [DeviceId; 2],
    csma_devices: Vec<DeviceId>,
}

fn wired_core(b: &mut TopologyBuilder, n_csma: u32) -> SimResult<WiredCore> {
    let p2p = b.add_nodes("n", 2);
    let p2p_nodes = [p2p[0], p2p[1]];
    let mut csma_nodes = vec![p2p_nodes[1]];
    csma_nodes.extend(b.add_nodes("n", n_csma));

    let (_, p2p_devices) =
        b.install_point_to_point(&PointToPointConfig::default(), p2p_nodes[0], p2p_nodes[1])?;
    let (_, csma_devices) = b.install_shared_bus(&CsmaConfig::default(), &csma_nodes)?;
    Ok(WiredCore {
        p2p_nodes,
        csma_nodes,
        p2p_devices,
        csma_devices,
    })
}

/// Install the echo pair, wire up the sinks and set the stop time.
fn finish(
    topology: Topology,
    allocator: &AddressAllocator,
    cfg: &ScenarioConfig,
    server_device: DeviceId,
    client_device: DeviceId,
) -> SimResult<Scenario> {
    let server_ip = topology.ip_of(server_device)?;
    let mut net = NetworkSimulation::new(topology, allocator, cfg.seed);
    net.runtime_mut().set_capture_sink(Box::new(PacketTrace::new()));
    net.runtime_mut().set_position_sink(Box::new(PositionLog::new()));
    net.runtime_mut().set_tick_interval(cfg.tick_interval);

    let server_cfg = EchoServerConfig::default();
    let server_address = SocketAddrV4::new(server_ip, server_cfg.port);
    let server = net.install(Box::new(EchoServer::new(server_device, server_cfg)))?;
    let client = net.install(Box::new(EchoClient::new(
        client_device,
        EchoClientConfig::new(server_address),
    )))?;
    net.stop_at(cfg.stop);
    Ok(Scenario {
        net,
        client,
        server,
        server_address,
    })
}

/// Point-to-point link into a shared bus, client on the far side of
/// the gateway. `n_csma == 0` is treated as 1.
pub fn second(cfg: &ScenarioConfig) -> SimResult<Scenario> {
    let n_csma = cfg.n_csma.max(1);
    let mut b = TopologyBuilder::new();
    let core = wired_core(&mut b, n_csma)?;

    b.set_mobility(core.p2p_nodes[0], Mobility::Constant(Position::new(10.0, 20.0)))?;
    b.set_mobility(core.p2p_nodes[1], Mobility::Constant(Position::new(30.0, 20.0)))?;
    for (i, node) in core.csma_nodes.iter().enumerate().skip(1) {
        let step = (i - 1) as f64;
        b.set_mobility(*node, Mobility::Constant(Position::new(40.0 + 10.0 * step, 5.0 + 5.0 * step)))?;
    }

    for dev in core.p2p_devices {
        b.enable_capture(dev, CaptureMode::Normal)?;
    }
    b.enable_capture(core.csma_devices[1], CaptureMode::Promiscuous)?;

    let mut topology = b.build()?;
    let mut allocator = AddressAllocator::new();
    let p2p_seg = allocator.allocate_segment(P2P_BASE, SEGMENT_MASK)?;
    allocator.assign_all(&mut topology, p2p_seg, &core.p2p_devices)?;
    let csma_seg = allocator.allocate_segment(CSMA_BASE, SEGMENT_MASK)?;
    allocator.assign_all(&mut topology, csma_seg, &core.csma_devices)?;

    let server_device = core.csma_devices[n_csma as usize];
    finish(topology, &allocator, cfg, server_device, core.p2p_devices[0])
}

/// The `second` topology plus a wireless cell whose access point is n0.
/// Stations random-walk from a placement grid; more stations than the
/// grid holds inside the walk bounds is a configuration error.
pub fn third(cfg: &ScenarioConfig) -> SimResult<Scenario> {
    let walk = RandomWalkConfig::default();
    let grid = GridPositionAllocator::new(GridConfig::default())?;
    let starts = grid.place(cfg.n_wifi, &walk.bounds)?;

    let n_csma = cfg.n_csma.max(1);
    let mut b = TopologyBuilder::new();
    let core = wired_core(&mut b, n_csma)?;
    let stations = b.add_nodes("n", cfg.n_wifi);
    let (_, ap_device, sta_devices) = b.install_shared_medium(
        &WifiConfig::default(),
        core.p2p_nodes[0],
        &stations,
        Some(VirtualTime::ZERO),
    )?;

    for (node, start) in stations.iter().zip(starts) {
        b.set_mobility(*node, Mobility::RandomWalk(RandomWalk::new(start, walk.clone())))?;
    }
    b.set_mobility(core.p2p_nodes[0], Mobility::Constant(Position::new(40.0, 20.0)))?;
    b.set_mobility(core.p2p_nodes[1], Mobility::Constant(Position::new(60.0, 20.0)))?;
    for (i, node) in core.csma_nodes.iter().enumerate().skip(1) {
        let x = 70.0 + 10.0 * (i - 1) as f64;
        b.set_mobility(*node, Mobility::Constant(Position::new(x, 20.0)))?;
    }

    for dev in core.p2p_devices {
        b.enable_capture(dev, CaptureMode::Normal)?;
    }
    b.enable_capture(ap_device, CaptureMode::Normal)?;
    b.enable_capture(core.csma_devices[0], CaptureMode::Promiscuous)?;

    let mut topology = b.build()?;
    let mut allocator = AddressAllocator::new();
    let p2p_seg = allocator.allocate_segment(P2P_BASE, SEGMENT_MASK)?;
    allocator.assign_all(&mut topology, p2p_seg, &core.p2p_devices)?;
    let csma_seg = allocator.allocate_segment(CSMA_BASE, SEGMENT_MASK)?;
    allocator.assign_all(&mut topology, csma_seg, &core.csma_devices)?;
    let wifi_seg = allocator.allocate_segment(WIFI_BASE, SEGMENT_MASK)?;
    allocator.assign_all(&mut topology, wifi_seg, &sta_devices)?;
    allocator.assign(&mut topology, wifi_seg, ap_device)?;

    let client_device = *sta_devices
        .last()
        .ok_or_else(|| SimError::InvalidConfig("third needs at least one wireless station".into()))?;
    let server_device = core.csma_devices[n_csma as usize];
    finish(topology, &allocator, cfg, server_device, client_device)
}
