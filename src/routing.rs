//! Static routing convergence.
//!
//! Runs once, after every segment is built and addressed. For each
//! declared subnet a breadth-first search from the nodes holding an
//! address in it gives every node its hop distance; a node's next hop
//! is then the first neighbor one hop closer, scanning its devices in
//! the order their segments were declared and each channel's devices in
//! attach order. Tables never change afterwards.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::address::{AddressAllocator, Subnet};
use crate::topology::{DeviceId, NodeId, Topology};

/// One routing table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    pub subnet: Subnet,
    /// Local device the packet leaves on.
    pub out_device: DeviceId,
    /// Next-hop device on `out_device`'s channel, or `None` when the
    /// subnet is directly connected.
    pub gateway: Option<DeviceId>,
    /// Node hops to the nearest holder of the subnet.
    pub hops: u32,
}

impl Route {
    /// Returns `true` if the subnet is on `out_device`'s own channel.
    pub fn is_connected(&self) -> bool {
        self.gateway.is_none()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.gateway {
            Some(gw) => write!(f, "{} via {} dev {} hops {}", self.subnet, gw, self.out_device, self.hops),
            None => write!(f, "{} dev {} connected", self.subnet, self.out_device),
        }
    }
}

/// Per-node destination subnet → next hop table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    /// Longest-prefix match; earlier entries win among equal prefixes.
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|r| r.subnet.contains(dst))
            .fold(None, |best: Option<&Route>, r| match best {
                Some(b) if b.subnet.prefix_len() >= r.subnet.prefix_len() => Some(b),
                _ => Some(r),
            })
    }

    /// Number of installed routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes in segment declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

/// Declaration index of the segment `device`'s address falls in.
/// Unaddressed devices sort last.
fn segment_rank(topo: &Topology, allocator: &AddressAllocator, device: DeviceId) -> usize {
    topo.devices[device.index()]
        .ip()
        .and_then(|ip| {
            allocator
                .segments()
                .iter()
                .position(|seg| seg.subnet().contains(ip))
        })
        .unwrap_or(usize::MAX)
}

/// `(local device, peer device, peer node)` for every link leaving `node`,
/// in tie-break order.
fn neighbors(
    topo: &Topology,
    allocator: &AddressAllocator,
    node: NodeId,
) -> Vec<(DeviceId, DeviceId, NodeId)> {
    let mut local: Vec<DeviceId> = topo.nodes[node.index()].devices.clone();
    local.sort_by_key(|d| (segment_rank(topo, allocator, *d), topo.devices[d.index()].channel));
    let mut out = Vec::new();
    for dev in local {
        let channel = &topo.channels[topo.devices[dev.index()].channel.index()];
        for peer in channel.devices.iter().copied() {
            let peer_node = topo.devices[peer.index()].node;
            if peer_node != node {
                out.push((dev, peer, peer_node));
            }
        }
    }
    out
}

/// Hop distance from every node to the nearest node that owns an
/// address inside `subnet`.
fn distances(topo: &Topology, adjacency: &[Vec<(DeviceId, DeviceId, NodeId)>], subnet: Subnet) -> Vec<Option<u32>> {
    let mut dist = vec![None; topo.nodes.len()];
    let mut queue = VecDeque::new();
    for node in &topo.nodes {
        let holds = node
            .devices
            .iter()
            .any(|d| topo.devices[d.index()].ip().map_or(false, |ip| subnet.contains(ip)));
        if holds {
            dist[node.id.index()] = Some(0);
            queue.push_back(node.id);
        }
    }
    while let Some(u) = queue.pop_front() {
        let next = dist[u.index()].map_or(0, |d| d + 1);
        for (_, _, v) in &adjacency[u.index()] {
            if dist[v.index()].is_none() {
                dist[v.index()] = Some(next);
                queue.push_back(*v);
            }
        }
    }
    dist
}

/// Fill every node's routing table from the allocator's segments.
/// Returns the total number of routes installed.
pub fn populate_routing_tables(topo: &mut Topology, allocator: &AddressAllocator) -> usize {
    let adjacency: Vec<_> = topo.nodes.iter().map(|n| neighbors(topo, allocator, n.id)).collect();
    let mut tables = vec![RoutingTable::default(); topo.nodes.len()];

    for segment in allocator.segments() {
        let subnet = segment.subnet();
        let dist = distances(topo, &adjacency, subnet);
        for node in &topo.nodes {
            let Some(hops) = dist[node.id.index()] else {
                continue;
            };
            let route = if hops == 0 {
                node.devices
                    .iter()
                    .copied()
                    .find(|d| topo.devices[d.index()].ip().map_or(false, |ip| subnet.contains(ip)))
                    .map(|out_device| Route {
                        subnet,
                        out_device,
                        gateway: None,
                        hops,
                    })
            } else {
                adjacency[node.id.index()]
                    .iter()
                    .find(|(_, _, v)| dist[v.index()] == Some(hops - 1))
                    .map(|(out_device, peer, _)| Route {
                        subnet,
                        out_device: *out_device,
                        gateway: Some(*peer),
                        hops,
                    })
            };
            if let Some(route) = route {
                debug!(node = %node.id, %route, "route installed");
                tables[node.id.index()].routes.push(route);
            }
        }
    }

    let mut total = 0;
    for (node, table) in topo.nodes.iter_mut().zip(tables) {
        total += table.len();
        node.routing = table;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CsmaConfig, PointToPointConfig};
    use crate::topology::TopologyBuilder;

    fn mask24() -> Ipv4Addr {
        Ipv4Addr::new(255, 255, 255, 0)
    }

    /// n0 -p2p- n1 =bus= n2, n3 ; n3 -p2p- n4
    fn chain() -> (Topology, AddressAllocator, Vec<NodeId>, Vec<DeviceId>) {
        let mut b = TopologyBuilder::new();
        let n = b.add_nodes("n", 5);
        let (_, p2p_a) = b
            .install_point_to_point(&PointToPointConfig::default(), n[0], n[1])
            .unwrap();
        let (_, bus) = b
            .install_shared_bus(&CsmaConfig::default(), &[n[1], n[2], n[3]])
            .unwrap();
        let (_, p2p_b) = b
            .install_point_to_point(&PointToPointConfig::default(), n[3], n[4])
            .unwrap();
        let mut topo = b.build().unwrap();
        let mut alloc = AddressAllocator::new();
        let s1 = alloc.allocate_segment(Ipv4Addr::new(10, 1, 1, 0), mask24()).unwrap();
        let s2 = alloc.allocate_segment(Ipv4Addr::new(10, 1, 2, 0), mask24()).unwrap();
        let s3 = alloc.allocate_segment(Ipv4Addr::new(10, 1, 3, 0), mask24()).unwrap();
        alloc.assign_all(&mut topo, s1, &p2p_a).unwrap();
        alloc.assign_all(&mut topo, s2, &bus).unwrap();
        alloc.assign_all(&mut topo, s3, &p2p_b).unwrap();
        let devices = [p2p_a.to_vec(), bus, p2p_b.to_vec()].concat();
        (topo, alloc, n, devices)
    }

    #[test]
    fn test_every_node_reaches_every_subnet() {
        let (mut topo, alloc, nodes, _) = chain();
        let total = populate_routing_tables(&mut topo, &alloc);
        assert_eq!(total, nodes.len() * 3);
        for node in topo.nodes() {
            assert_eq!(node.routing_table().len(), 3, "{}", node.name());
        }
    }

    #[test]
    fn test_connected_and_gateway_routes() {
        let (mut topo, alloc, nodes, devices) = chain();
        populate_routing_tables(&mut topo, &alloc);

        let n0 = topo.node(nodes[0]).unwrap().routing_table();
        let local = n0.lookup(Ipv4Addr::new(10, 1, 1, 2)).unwrap();
        assert!(local.is_connected());
        assert_eq!(local.out_device, devices[0]);

        let far = n0.lookup(Ipv4Addr::new(10, 1, 3, 2)).unwrap();
        assert_eq!(far.out_device, devices[0]);
        assert_eq!(far.gateway, Some(devices[1]));
        assert_eq!(far.hops, 2);

        // The bus gateway n1 forwards toward n3's bus device.
        let n1 = topo.node(nodes[1]).unwrap().routing_table();
        let via = n1.lookup(Ipv4Addr::new(10, 1, 3, 2)).unwrap();
        assert_eq!(via.out_device, devices[2]);
        assert_eq!(via.gateway, Some(devices[4]));
        assert_eq!(via.hops, 1);
    }

    #[test]
    fn test_unknown_destination_has_no_route() {
        let (mut topo, alloc, nodes, _) = chain();
        populate_routing_tables(&mut topo, &alloc);
        assert!(topo
            .node(nodes[2])
            .unwrap()
            .routing_table()
            .lookup(Ipv4Addr::new(192, 168, 0, 1))
            .is_none());
    }

    #[test]
    fn test_equal_paths_follow_segment_declaration_order() {
        // s -a- d and s -b- d, then d - e. Channel a is built first but
        // the s-b segment is declared first.
        let p2p = PointToPointConfig::default();
        let mut b = TopologyBuilder::new();
        let n = b.add_nodes("n", 5);
        let (s, a, bb, d, e) = (n[0], n[1], n[2], n[3], n[4]);
        let (_, sa) = b.install_point_to_point(&p2p, s, a).unwrap();
        let (_, sb) = b.install_point_to_point(&p2p, s, bb).unwrap();
        let (_, ad) = b.install_point_to_point(&p2p, a, d).unwrap();
        let (_, bd) = b.install_point_to_point(&p2p, bb, d).unwrap();
        let (_, de) = b.install_point_to_point(&p2p, d, e).unwrap();
        let mut topo = b.build().unwrap();

        let mut alloc = AddressAllocator::new();
        for (i, devs) in [sb, sa, ad, bd, de].iter().enumerate() {
            let seg = alloc
                .allocate_segment(Ipv4Addr::new(10, 0, i as u8, 0), mask24())
                .unwrap();
            alloc.assign_all(&mut topo, seg, devs).unwrap();
        }
        populate_routing_tables(&mut topo, &alloc);

        let route = topo
            .node(s)
            .unwrap()
            .routing_table()
            .lookup(Ipv4Addr::new(10, 0, 4, 2))
            .unwrap();
        assert_eq!(route.out_device, sb[0]);
        assert_eq!(route.gateway, Some(sb[1]));
        assert_eq!(route.hops, 2);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let wide = Subnet::new(Ipv4Addr::new(10, 1, 0, 0), 16).unwrap();
        let narrow = Subnet::new(Ipv4Addr::new(10, 1, 2, 0), 24).unwrap();
        let route = |subnet, out| Route {
            subnet,
            out_device: DeviceId::new(out),
            gateway: None,
            hops: 0,
        };
        let table = RoutingTable {
            routes: vec![route(wide, 0), route(narrow, 1)],
        };
        assert_eq!(
            table.lookup(Ipv4Addr::new(10, 1, 2, 9)).unwrap().out_device,
            DeviceId::new(1)
        );
        assert_eq!(
            table.lookup(Ipv4Addr::new(10, 1, 7, 9)).unwrap().out_device,
            DeviceId::new(0)
        );
    }
}
