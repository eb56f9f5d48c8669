//! Topology model: an arena of nodes, devices and channels.
//!
//! Nodes own devices, devices point at exactly one channel, and
//! channels keep non-owning index lists of their attached devices. All
//! cross references are stable integer ids into the arena, so there is
//! no cyclic ownership between devices and channels.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`], [`DeviceId`], [`ChannelId`] |
//! | [`node`] | [`Node`], [`Device`], roles and capture modes |
//! | [`channel`] | [`Channel`] variants and the transmit contract |
//! | [`mobility`] | positions, random walk, grid placement |
//! | [`builder`] | [`TopologyBuilder`] |

pub mod builder;
pub mod channel;
pub mod id;
pub mod mobility;
pub mod node;

use std::net::Ipv4Addr;

pub use builder::TopologyBuilder;
pub use channel::{AssociationState, AssociationTable, Channel, ChannelKind, TransmitDecision};
pub use id::{ChannelId, DeviceId, NodeId};
pub use mobility::{GridPositionAllocator, Mobility, Position, RandomWalk, Rect};
pub use node::{CaptureMode, Device, DeviceRole, InterfaceAddress, Node};

use crate::error::{SimError, SimResult};

/// The frozen result of [`TopologyBuilder::build`]. Attachments never
/// change afterwards; addresses, routes, capture and mobility are
/// filled in before the run starts.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub(crate) nodes: Vec<Node>,
    pub(crate) devices: Vec<Device>,
    pub(crate) channels: Vec<Channel>,
}

impl Topology {
    /// All nodes, indexed by `NodeId`.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All devices, indexed by `DeviceId`.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// All channels, indexed by `ChannelId`.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Look up a node, failing with `UnknownNode`.
    pub fn node(&self, id: NodeId) -> SimResult<&Node> {
        self.nodes.get(id.index()).ok_or(SimError::UnknownNode(id))
    }

    /// Look up a device, failing with `UnknownDevice`.
    pub fn device(&self, id: DeviceId) -> SimResult<&Device> {
        self.devices.get(id.index()).ok_or(SimError::UnknownDevice(id))
    }

    /// Look up a channel, failing with `UnknownChannel`.
    pub fn channel(&self, id: ChannelId) -> SimResult<&Channel> {
        self.channels
            .get(id.index())
            .ok_or(SimError::UnknownChannel(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> SimResult<&mut Node> {
        self.nodes.get_mut(id.index()).ok_or(SimError::UnknownNode(id))
    }

    pub(crate) fn device_mut(&mut self, id: DeviceId) -> SimResult<&mut Device> {
        self.devices
            .get_mut(id.index())
            .ok_or(SimError::UnknownDevice(id))
    }

    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> SimResult<&mut Channel> {
        self.channels
            .get_mut(id.index())
            .ok_or(SimError::UnknownChannel(id))
    }

    /// Bind an address to a device. Fails if it already has one.
    pub(crate) fn set_address(&mut self, id: DeviceId, address: InterfaceAddress) -> SimResult<()> {
        let device = self.device_mut(id)?;
        if let Some(existing) = device.address {
            return Err(SimError::AddressAlreadyAssigned {
                device: id,
                address: existing.local,
            });
        }
        device.address = Some(address);
        Ok(())
    }

    /// Turn on capture for a device after the topology is built.
    pub fn enable_capture(&mut self, id: DeviceId, mode: CaptureMode) -> SimResult<()> {
        self.device_mut(id)?.capture = Some(mode);
        Ok(())
    }

    /// Replace a node's mobility model.
    pub fn set_mobility(&mut self, id: NodeId, mobility: Mobility) -> SimResult<()> {
        self.node_mut(id)?.mobility = Some(mobility);
        Ok(())
    }

    /// The device on `channel` that holds `ip`, if any.
    pub fn device_on_channel(&self, channel: ChannelId, ip: Ipv4Addr) -> Option<DeviceId> {
        let channel = self.channels.get(channel.index())?;
        channel
            .devices
            .iter()
            .copied()
            .find(|d| self.devices[d.index()].ip() == Some(ip))
    }

    /// The device of `node` that holds `ip`, if any.
    pub fn local_device(&self, node: NodeId, ip: Ipv4Addr) -> Option<DeviceId> {
        let node = self.nodes.get(node.index())?;
        node.devices
            .iter()
            .copied()
            .find(|d| self.devices[d.index()].ip() == Some(ip))
    }

    /// Address of a device, or an error if it has none yet.
    pub fn ip_of(&self, id: DeviceId) -> SimResult<Ipv4Addr> {
        self.device(id)?.ip().ok_or(SimError::Unaddressed(id))
    }
}
