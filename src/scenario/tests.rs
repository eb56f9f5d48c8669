//! End-to-end tests for `NetworkSimulation` and the reference scenarios.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::address::AddressAllocator;
use crate::app::{AppId, Application, EchoClient, EchoServer};
use crate::config::{EchoClientConfig, EchoServerConfig, PointToPointConfig, ScenarioConfig, WifiConfig};
use crate::error::SimError;
use crate::instrument::{Direction, PacketTrace};
use crate::scenario::{second, third, NetworkSimulation};
use crate::time::VirtualTime;
use crate::topology::{CaptureMode, DeviceId, TopologyBuilder};

const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Two nodes on one point-to-point link, both devices captured.
fn point_to_point_pair() -> (NetworkSimulation, [DeviceId; 2]) {
    let mut b = TopologyBuilder::new();
    let n = b.add_nodes("n", 2);
    let (_, devices) = b
        .install_point_to_point(&PointToPointConfig::default(), n[0], n[1])
        .unwrap();
    for d in devices {
        b.enable_capture(d, CaptureMode::Normal).unwrap();
    }
    let mut topo = b.build().unwrap();
    let mut alloc = AddressAllocator::new();
    let seg = alloc.allocate_segment(Ipv4Addr::new(10, 1, 1, 0), MASK).unwrap();
    alloc.assign_all(&mut topo, seg, &devices).unwrap();

    let mut net = NetworkSimulation::new(topo, &alloc, 1);
    net.runtime_mut().set_capture_sink(Box::new(PacketTrace::new()));
    (net, devices)
}

fn server_addr() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9)
}

// ── Scenario A: single point-to-point link ────────────────────────────

#[test]
fn test_point_to_point_echo_timing() {
    let (mut net, devices) = point_to_point_pair();
    let server = net
        .install(Box::new(EchoServer::new(devices[1], EchoServerConfig::default())))
        .unwrap();
    let client = net
        .install(Box::new(EchoClient::new(devices[0], EchoClientConfig::new(server_addr()))))
        .unwrap();
    let summary = net.run().unwrap();

    let rt = net.runtime();
    assert_eq!(rt.app::<EchoServer>(server).unwrap().counters().received, 1);
    assert_eq!(rt.app::<EchoClient>(client).unwrap().counters().received, 1);
    assert_eq!(summary.stats.delivered, 2);

    // 1024 bytes at 5 Mbps is 1.6384 ms, plus 2 ms propagation.
    let trace = net.packet_trace().unwrap();
    let times: Vec<(DeviceId, Direction, u64)> = trace
        .records()
        .iter()
        .map(|r| (r.device, r.direction, r.time.ticks()))
        .collect();
    assert_eq!(
        times,
        vec![
            (devices[0], Direction::Tx, 2_000_000_000),
            (devices[1], Direction::Rx, 2_003_638_400),
            (devices[1], Direction::Tx, 2_003_638_400),
            (devices[0], Direction::Rx, 2_007_276_800),
        ]
    );
}

// ── Scenario B: gateway between point-to-point and bus ────────────────

#[test]
fn test_second_delivers_through_gateway() {
    let mut scenario = second(&ScenarioConfig::default()).unwrap();
    assert_eq!(
        scenario.server_address,
        SocketAddrV4::new(Ipv4Addr::new(10, 1, 2, 4), 9)
    );
    let summary = scenario.net.run().unwrap();

    assert_eq!(scenario.server().unwrap().counters().received, 1);
    assert_eq!(scenario.client().unwrap().counters().received, 1);
    // n1 forwards the request onto the bus and the reply onto the link.
    assert_eq!(summary.stats.forwarded, 2);
    assert_eq!(summary.stats.dropped_no_route, 0);
    assert_eq!(summary.final_time, VirtualTime::from_secs(10));

    let gateway = &scenario.net.topology().nodes()[1];
    assert!(gateway.is_gateway());
    let route = gateway
        .routing_table()
        .lookup(Ipv4Addr::new(10, 1, 2, 4))
        .unwrap();
    assert!(route.is_connected());
}

#[test]
fn test_second_coerces_empty_bus() {
    let cfg = ScenarioConfig {
        n_csma: 0,
        ..ScenarioConfig::default()
    };
    let mut scenario = second(&cfg).unwrap();
    assert_eq!(*scenario.server_address.ip(), Ipv4Addr::new(10, 1, 2, 2));
    scenario.net.run().unwrap();
    assert_eq!(scenario.client().unwrap().counters().received, 1);
}

#[test]
fn test_second_every_packet_gets_one_reply() {
    let mut scenario = second(&ScenarioConfig::default()).unwrap();
    let client = scenario.client;
    scenario
        .net
        .runtime_mut()
        .app_mut::<EchoClient>(client)
        .unwrap()
        .config_mut()
        .max_packets = 4;
    scenario.net.run().unwrap();
    let counters = scenario.client().unwrap().counters();
    assert_eq!(counters.sent, 4);
    assert_eq!(counters.received, 4);
    assert_eq!(scenario.server().unwrap().counters().received, 4);
}

// ── Scenario C: association gates delivery ────────────────────────────

#[test]
fn test_unassociated_station_never_delivers() {
    let mut b = TopologyBuilder::new();
    let ap_node = b.add_node("ap");
    let sta = b.add_nodes("sta", 3);
    let ch = b.shared_medium(&WifiConfig::default());
    let s0 = b.attach_station(ch, sta[0], Some(VirtualTime::ZERO)).unwrap();
    let s1 = b.attach_station(ch, sta[1], Some(VirtualTime::ZERO)).unwrap();
    let s2 = b.attach_station(ch, sta[2], None).unwrap();
    let ap = b.attach_access_point(ch, ap_node).unwrap();
    let mut topo = b.build().unwrap();
    let mut alloc = AddressAllocator::new();
    let seg = alloc.allocate_segment(Ipv4Addr::new(10, 1, 3, 0), MASK).unwrap();
    alloc.assign_all(&mut topo, seg, &[s0, s1, s2, ap]).unwrap();

    let mut net = NetworkSimulation::new(topo, &alloc, 1);
    let target = SocketAddrV4::new(Ipv4Addr::new(10, 1, 3, 4), 9);
    let server = net
        .install(Box::new(EchoServer::new(ap, EchoServerConfig::default())))
        .unwrap();
    let silent = net
        .install(Box::new(EchoClient::new(s2, EchoClientConfig::new(target))))
        .unwrap();
    let heard = net
        .install(Box::new(EchoClient::new(s0, EchoClientConfig::new(target))))
        .unwrap();
    net.stop_at(VirtualTime::from_secs(10));
    let summary = net.run().unwrap();

    let rt = net.runtime();
    assert_eq!(summary.stats.associations, 2);
    assert_eq!(summary.stats.dropped_unassociated, 1);
    assert_eq!(rt.app::<EchoServer>(server).unwrap().counters().received, 1);
    assert_eq!(rt.app::<EchoClient>(silent).unwrap().counters().sent, 1);
    assert_eq!(rt.app::<EchoClient>(silent).unwrap().counters().received, 0);
    assert_eq!(rt.app::<EchoClient>(heard).unwrap().counters().received, 1);

    let table = rt.topology().channel(ch).unwrap().associations().unwrap();
    assert!(table.is_associated(s0));
    assert!(table.is_associated(s1));
    assert!(!table.is_associated(s2));
}

#[test]
fn test_busy_medium_serializes_stations() {
    let mut b = TopologyBuilder::new();
    let ap_node = b.add_node("ap");
    let sta = b.add_nodes("sta", 2);
    let (_, ap, stations) = b
        .install_shared_medium(&WifiConfig::default(), ap_node, &sta, Some(VirtualTime::ZERO))
        .unwrap();
    b.enable_capture(ap, CaptureMode::Normal).unwrap();
    let mut topo = b.build().unwrap();
    let mut alloc = AddressAllocator::new();
    let seg = alloc.allocate_segment(Ipv4Addr::new(10, 1, 3, 0), MASK).unwrap();
    alloc.assign_all(&mut topo, seg, &stations).unwrap();
    alloc.assign(&mut topo, seg, ap).unwrap();

    let mut net = NetworkSimulation::new(topo, &alloc, 1);
    net.runtime_mut().set_capture_sink(Box::new(PacketTrace::new()));
    let target = SocketAddrV4::new(Ipv4Addr::new(10, 1, 3, 3), 9);
    net.install(Box::new(EchoServer::new(ap, EchoServerConfig::default())))
        .unwrap();
    let clients: Vec<AppId> = stations
        .iter()
        .map(|d| {
            net.install(Box::new(EchoClient::new(*d, EchoClientConfig::new(target))))
                .unwrap()
        })
        .collect();
    net.stop_at(VirtualTime::from_secs(10));
    let summary = net.run().unwrap();

    for id in clients {
        let counters = net.runtime().app::<EchoClient>(id).unwrap().counters();
        assert_eq!((counters.sent, counters.received), (1, 1));
    }
    assert_eq!(summary.stats.associations, 2);
    assert_eq!(summary.stats.delivered, 4);
    // The association exchange contends too, so count at least the
    // deferred request and both replies.
    assert!(summary.stats.deferred >= 3);

    // 1024 bytes at 54 Mbps is 151703 ns; propagation is 1 us.
    let arrivals: Vec<u64> = net
        .packet_trace()
        .unwrap()
        .for_device(ap)
        .filter(|r| r.direction == Direction::Rx && r.time >= VirtualTime::from_secs(2))
        .map(|r| r.time.ticks())
        .collect();
    assert_eq!(
        arrivals,
        vec![2_000_000_000 + 151_703 + 1_000, 2_000_151_703 + 151_703 + 1_000]
    );
}

#[test]
fn test_third_crosses_three_segments() {
    let mut scenario = third(&ScenarioConfig::default()).unwrap();
    let local = scenario.client().unwrap().local().unwrap();
    assert_eq!(local, SocketAddrV4::new(Ipv4Addr::new(10, 1, 3, 3), 49153));
    let summary = scenario.net.run().unwrap();

    assert_eq!(scenario.server().unwrap().counters().received, 1);
    assert_eq!(scenario.client().unwrap().counters().received, 1);
    assert_eq!(summary.stats.associations, 3);
    assert_eq!(summary.stats.forwarded, 4);

    // The access point got the last wireless address.
    let ap = scenario.net.topology().nodes()[0].devices()[1];
    assert_eq!(
        scenario.net.topology().ip_of(ap).unwrap(),
        Ipv4Addr::new(10, 1, 3, 4)
    );
}

#[test]
fn test_third_rejects_too_many_stations() {
    let cfg = ScenarioConfig {
        n_wifi: 19,
        ..ScenarioConfig::default()
    };
    let err = third(&cfg).err().unwrap();
    assert_eq!(
        err,
        SimError::GridCapacity {
            requested: 19,
            capacity: 18
        }
    );
    assert!(err.is_configuration());

    let cfg = ScenarioConfig {
        n_wifi: 18,
        ..ScenarioConfig::default()
    };
    assert!(third(&cfg).is_ok());
}

#[test]
fn test_third_position_snapshots() {
    let mut scenario = third(&ScenarioConfig::default()).unwrap();
    scenario.net.run().unwrap();
    let log = scenario.net.position_log().unwrap();
    // n0, n1, three bus nodes, three stations.
    assert_eq!(log.initial().len(), 8);
    // One snapshot every 100 ms from 0 s through 10 s inclusive.
    assert_eq!(log.snapshots().len(), 101);
    assert_eq!(log.snapshots()[100].time, VirtualTime::from_secs(10));
}

// ── Determinism ───────────────────────────────────────────────────────

#[test]
fn test_identical_runs_identical_traces() {
    let run = |seed: u64| {
        let cfg = ScenarioConfig {
            seed,
            ..ScenarioConfig::default()
        };
        let mut scenario = third(&cfg).unwrap();
        let summary = scenario.net.run().unwrap();
        let trace = scenario.net.packet_trace().unwrap();
        let positions = scenario.net.position_log().unwrap().snapshots().to_vec();
        (summary, trace.render(), trace.digest(), positions)
    };
    let a = run(7);
    let b = run(7);
    assert_eq!(a.0, b.0);
    assert_eq!(a.1, b.1);
    assert_eq!(a.2, b.2);
    assert_eq!(a.3, b.3);

    // Position never affects delivery: another seed moves the stations
    // differently but carries exactly the same frames.
    let c = run(8);
    assert_ne!(a.3, c.3);
    assert_eq!(a.2, c.2);
}

// ── Stop-time suppression ─────────────────────────────────────────────

#[test]
fn test_client_stops_sending_at_stop_time() {
    let (mut net, devices) = point_to_point_pair();
    net.install(Box::new(EchoServer::new(devices[1], EchoServerConfig::default())))
        .unwrap();
    let mut cfg = EchoClientConfig::new(server_addr());
    cfg.max_packets = 5;
    cfg.stop = Some(VirtualTime::from_secs(4));
    let client = net
        .install(Box::new(EchoClient::new(devices[0], cfg)))
        .unwrap();
    net.run().unwrap();
    let counters = net.runtime().app::<EchoClient>(client).unwrap().counters();
    assert_eq!(counters.sent, 2);
    assert_eq!(counters.received, 2);
}

#[test]
fn test_stopped_server_does_not_reply() {
    let (mut net, devices) = point_to_point_pair();
    let server_cfg = EchoServerConfig {
        stop: Some(VirtualTime::from_millis(1_500)),
        ..EchoServerConfig::default()
    };
    let server = net
        .install(Box::new(EchoServer::new(devices[1], server_cfg)))
        .unwrap();
    let client = net
        .install(Box::new(EchoClient::new(devices[0], EchoClientConfig::new(server_addr()))))
        .unwrap();
    let summary = net.run().unwrap();

    assert_eq!(net.runtime().app::<EchoServer>(server).unwrap().counters().received, 0);
    assert_eq!(net.runtime().app::<EchoClient>(client).unwrap().counters().received, 0);
    assert_eq!(summary.stats.no_listener, 1);
    // Only the request went out.
    assert_eq!(summary.stats.transmitted, 1);
}

#[test]
fn test_global_stop_leaves_in_flight_frames() {
    let (mut net, devices) = point_to_point_pair();
    let server = net
        .install(Box::new(EchoServer::new(devices[1], EchoServerConfig::default())))
        .unwrap();
    net.install(Box::new(EchoClient::new(devices[0], EchoClientConfig::new(server_addr()))))
        .unwrap();
    net.stop_at(VirtualTime::from_millis(2_001));
    let summary = net.run().unwrap();

    assert_eq!(summary.final_time, VirtualTime::from_millis(2_001));
    assert_eq!(net.runtime().app::<EchoServer>(server).unwrap().counters().received, 0);
    assert!(net.simulation().pending_count() > 0);
}

#[test]
fn test_app_counters_in_summary() {
    let (mut net, devices) = point_to_point_pair();
    net.install(Box::new(EchoServer::new(devices[1], EchoServerConfig::default())))
        .unwrap();
    net.install(Box::new(EchoClient::new(devices[0], EchoClientConfig::new(server_addr()))))
        .unwrap();
    let summary = net.run().unwrap();
    assert_eq!(summary.apps.len(), 2);
    assert_eq!(summary.apps[1].0, AppId::new(1));
    assert_eq!(summary.apps[1].1.sent, 1);
    assert!(summary.to_string().contains("A1 sent=1 received=1"));
}
