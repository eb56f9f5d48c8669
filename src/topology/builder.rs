//! Fluent construction of a [`Topology`].
//!
//! Nodes and channels are declared first, devices are created by
//! attaching a node to a channel, and `build` validates channel arity
//! before freezing the attachments.
//!
//! # Example
//! ```rust
//! use segnet::config::{CsmaConfig, PointToPointConfig};
//! use segnet::topology::TopologyBuilder;
//!
//! let mut b = TopologyBuilder::new();
//! let n0 = b.add_node("n0");
//! let n1 = b.add_node("n1");
//! let n2 = b.add_node("n2");
//! b.install_point_to_point(&PointToPointConfig::default(), n0, n1).unwrap();
//! b.install_shared_bus(&CsmaConfig::default(), &[n1, n2]).unwrap();
//! let topology = b.build().unwrap();
//! assert!(topology.node(n1).unwrap().is_gateway());
//! ```

use tracing::debug;

use crate::config::{CsmaConfig, PointToPointConfig, WifiConfig};
use crate::error::{SimError, SimResult};
use crate::time::VirtualTime;

use super::channel::{AssociationTable, Channel, ChannelKind};
use super::id::{ChannelId, DeviceId, NodeId};
use super::mobility::Mobility;
use super::node::{CaptureMode, Device, DeviceRole, Node};
use super::Topology;

/// Shared channels need at least this many devices to be useful.
const MIN_SHARED_DEVICES: usize = 2;

#[derive(Debug, Default)]
pub struct TopologyBuilder {
    topo: Topology,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        TopologyBuilder::default()
    }

    // ── Nodes ─────────────────────────────────────────────────

    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId::new(self.topo.nodes.len() as u32);
        self.topo.nodes.push(Node::new(id, name.into()));
        id
    }

    /// Create `count` nodes named `{prefix}{index}`.
    pub fn add_nodes(&mut self, prefix: &str, count: u32) -> Vec<NodeId> {
        (0..count)
            .map(|_| {
                let name = format!("{}{}", prefix, self.topo.nodes.len());
                self.add_node(name)
            })
            .collect()
    }

    pub fn set_mobility(&mut self, node: NodeId, mobility: Mobility) -> SimResult<&mut Self> {
        self.topo.set_mobility(node, mobility)?;
        Ok(self)
    }

    // ── Channels ──────────────────────────────────────────────

    fn add_channel(&mut self, kind: ChannelKind) -> ChannelId {
        let id = ChannelId::new(self.topo.channels.len() as u32);
        self.topo.channels.push(Channel::new(id, kind));
        id
    }

    pub fn point_to_point(&mut self, cfg: &PointToPointConfig) -> ChannelId {
        self.add_channel(ChannelKind::PointToPoint {
            data_rate: cfg.data_rate,
            delay: cfg.delay,
        })
    }

    pub fn shared_bus(&mut self, cfg: &CsmaConfig) -> ChannelId {
        self.add_channel(ChannelKind::SharedBus {
            data_rate: cfg.data_rate,
            delay: cfg.delay,
        })
    }

    pub fn shared_medium(&mut self, cfg: &WifiConfig) -> ChannelId {
        self.add_channel(ChannelKind::SharedMedium {
            ssid: cfg.ssid.clone(),
            data_rate: cfg.data_rate,
            delay: cfg.delay,
            associations: AssociationTable::default(),
        })
    }

    // ── Attachment ────────────────────────────────────────────

    fn push_device(&mut self, channel: ChannelId, node: NodeId, role: DeviceRole) -> SimResult<DeviceId> {
        self.topo.node(node)?;
        let id = DeviceId::new(self.topo.devices.len() as u32);
        let ch = self.topo.channel_mut(channel)?;
        if matches!(ch.kind, ChannelKind::PointToPoint { .. }) && ch.devices.len() >= 2 {
            return Err(SimError::PointToPointFull { channel, node });
        }
        ch.devices.push(id);
        self.topo.node_mut(node)?.devices.push(id);
        self.topo.devices.push(Device {
            id,
            node,
            channel,
            role,
            address: None,
            capture: None,
        });
        debug!(%node, device = %id, %channel, ?role, "attached");
        Ok(id)
    }

    /// Attach `node` to `channel`, creating a device. On a shared medium
    /// this creates a station that associates at time zero.
    pub fn attach(&mut self, channel: ChannelId, node: NodeId) -> SimResult<DeviceId> {
        let role = match self.topo.channel(channel)?.kind {
            ChannelKind::SharedMedium { .. } => DeviceRole::Station {
                associate_at: Some(VirtualTime::ZERO),
            },
            _ => DeviceRole::Wired,
        };
        self.push_device(channel, node, role)
    }

    pub fn attach_access_point(&mut self, channel: ChannelId, node: NodeId) -> SimResult<DeviceId> {
        if !matches!(self.topo.channel(channel)?.kind, ChannelKind::SharedMedium { .. }) {
            return Err(SimError::NotSharedMedium { channel });
        }
        let id = self.push_device(channel, node, DeviceRole::AccessPoint)?;
        if let Some(table) = self.topo.channel_mut(channel)?.associations_mut() {
            if table.access_point().is_none() {
                table.set_access_point(id);
            }
        }
        Ok(id)
    }

    /// Attach a station that starts associating at `associate_at`, or
    /// never when `None`.
    pub fn attach_station(
        &mut self,
        channel: ChannelId,
        node: NodeId,
        associate_at: Option<VirtualTime>,
    ) -> SimResult<DeviceId> {
        if !matches!(self.topo.channel(channel)?.kind, ChannelKind::SharedMedium { .. }) {
            return Err(SimError::NotSharedMedium { channel });
        }
        self.push_device(channel, node, DeviceRole::Station { associate_at })
    }

    // ── Helpers ───────────────────────────────────────────────

    pub fn install_point_to_point(
        &mut self,
        cfg: &PointToPointConfig,
        a: NodeId,
        b: NodeId,
    ) -> SimResult<(ChannelId, [DeviceId; 2])> {
        let ch = self.point_to_point(cfg);
        let da = self.attach(ch, a)?;
        let db = self.attach(ch, b)?;
        Ok((ch, [da, db]))
    }

    pub fn install_shared_bus(
        &mut self,
        cfg: &CsmaConfig,
        nodes: &[NodeId],
    ) -> SimResult<(ChannelId, Vec<DeviceId>)> {
        let ch = self.shared_bus(cfg);
        let devices = nodes
            .iter()
            .map(|n| self.attach(ch, *n))
            .collect::<SimResult<Vec<_>>>()?;
        Ok((ch, devices))
    }

    /// Stations are attached first, in order, then the access point.
    pub fn install_shared_medium(
        &mut self,
        cfg: &WifiConfig,
        access_point: NodeId,
        stations: &[NodeId],
        associate_at: Option<VirtualTime>,
    ) -> SimResult<(ChannelId, DeviceId, Vec<DeviceId>)> {
        let ch = self.shared_medium(cfg);
        let sta_devices = stations
            .iter()
            .map(|n| self.attach_station(ch, *n, associate_at))
            .collect::<SimResult<Vec<_>>>()?;
        let ap = self.attach_access_point(ch, access_point)?;
        Ok((ch, ap, sta_devices))
    }

    pub fn enable_capture(&mut self, device: DeviceId, mode: CaptureMode) -> SimResult<&mut Self> {
        self.topo.enable_capture(device, mode)?;
        Ok(self)
    }

    // ── Build ─────────────────────────────────────────────────

    /// Validate every channel and freeze the attachments.
    pub fn build(self) -> SimResult<Topology> {
        for ch in &self.topo.channels {
            let attached = ch.devices.len();
            match &ch.kind {
                ChannelKind::PointToPoint { .. } if attached != 2 => {
                    return Err(SimError::ChannelUnderpopulated {
                        channel: ch.id,
                        attached,
                        required: 2,
                    });
                }
                ChannelKind::SharedBus { .. } | ChannelKind::SharedMedium { .. }
                    if attached < MIN_SHARED_DEVICES =>
                {
                    return Err(SimError::ChannelUnderpopulated {
                        channel: ch.id,
                        attached,
                        required: MIN_SHARED_DEVICES,
                    });
                }
                _ => {}
            }
            if matches!(ch.kind, ChannelKind::SharedMedium { .. }) {
                let count = ch
                    .devices
                    .iter()
                    .filter(|d| self.topo.devices[d.index()].role == DeviceRole::AccessPoint)
                    .count();
                if count != 1 {
                    return Err(SimError::AccessPointCount {
                        channel: ch.id,
                        count,
                    });
                }
            }
        }
        debug!(
            nodes = self.topo.nodes.len(),
            devices = self.topo.devices.len(),
            channels = self.topo.channels.len(),
            "topology built"
        );
        Ok(self.topo)
    }
}
