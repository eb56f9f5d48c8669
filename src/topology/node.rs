//! Nodes and the devices they own.

use std::net::Ipv4Addr;

use crate::address::Subnet;
use crate::routing::RoutingTable;
use crate::time::VirtualTime;

use super::id::{ChannelId, DeviceId, NodeId};
use super::mobility::Mobility;

/// An address bound to a device, together with its segment's subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct InterfaceAddress {
    pub local: Ipv4Addr,
    pub subnet: Subnet,
}

impl std::fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.local, self.subnet.prefix_len())
    }
}

/// What a device does on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Point-to-point or shared-bus interface.
    Wired,
    /// The one access point of a shared-medium channel.
    AccessPoint,
    /// A shared-medium station. `associate_at` is when it starts its
    /// handshake; `None` means it never does.
    Station { associate_at: Option<VirtualTime> },
}

/// Which frames a capture-enabled device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum CaptureMode {
    /// Frames sent by the device or addressed to it.
    Normal,
    /// Every frame the device hears on its channel.
    Promiscuous,
}

/// A network interface. Belongs to one node and one channel for its
/// whole life.
#[derive(Debug, Clone)]
pub struct Device {
    pub(crate) id: DeviceId,
    pub(crate) node: NodeId,
    pub(crate) channel: ChannelId,
    pub(crate) role: DeviceRole,
    pub(crate) address: Option<InterfaceAddress>,
    pub(crate) capture: Option<CaptureMode>,
}

impl Device {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The channel this device is attached to.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn role(&self) -> DeviceRole {
        self.role
    }

    /// `None` until the address allocator assigns one.
    pub fn address(&self) -> Option<InterfaceAddress> {
        self.address
    }

    /// Assigned address, if any.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.address.map(|a| a.local)
    }

    /// Capture mode, or `None` when capture is off.
    pub fn capture(&self) -> Option<CaptureMode> {
        self.capture
    }
}

/// A simulated host. Nodes with devices on two or more channels act as
/// gateways and forward packets using their routing table.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) devices: Vec<DeviceId>,
    pub(crate) mobility: Option<Mobility>,
    pub(crate) routing: RoutingTable,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String) -> Self {
        Node {
            id,
            name,
            devices: Vec::new(),
            mobility: None,
            routing: RoutingTable::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owned devices in attach order.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    pub fn mobility(&self) -> Option<&Mobility> {
        self.mobility.as_ref()
    }

    /// Routes installed by convergence. Empty before it runs.
    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn is_gateway(&self) -> bool {
        self.devices.len() > 1
    }
}
