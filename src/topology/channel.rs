//! Channel models: point-to-point links, shared buses and shared
//! wireless media.
//!
//! All three share one contract: a device asks to put a frame on the
//! channel at `now`, and the channel answers with a [`TransmitDecision`]
//! naming who hears the frame and after how long. Shared channels
//! serialize access through a `busy_until` instant; a transmission that
//! finds the medium busy is deferred to that instant rather than
//! colliding.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::DataRate;
use crate::packet::{Frame, FrameKind};
use crate::time::VirtualTime;

use super::id::{ChannelId, DeviceId};

// ── Association ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    /// The access point has accepted the request; the station is still
    /// waiting for the response.
    Pending,
    Associated,
}

/// Per-channel record of the access point and its stations.
#[derive(Debug, Clone, Default)]
pub struct AssociationTable {
    access_point: Option<DeviceId>,
    stations: BTreeMap<DeviceId, AssociationState>,
}

impl AssociationTable {
    pub fn access_point(&self) -> Option<DeviceId> {
        self.access_point
    }

    pub fn state(&self, station: DeviceId) -> Option<AssociationState> {
        self.stations.get(&station).copied()
    }

    pub fn is_associated(&self, station: DeviceId) -> bool {
        self.state(station) == Some(AssociationState::Associated)
    }

    /// The access point and associated stations may carry data.
    pub fn may_carry_data(&self, device: DeviceId) -> bool {
        self.access_point == Some(device) || self.is_associated(device)
    }

    pub(crate) fn set_access_point(&mut self, ap: DeviceId) {
        self.access_point = Some(ap);
    }

    pub(crate) fn mark(&mut self, station: DeviceId, state: AssociationState) {
        self.stations.insert(station, state);
    }

    pub fn associated_count(&self) -> usize {
        self.stations
            .values()
            .filter(|s| **s == AssociationState::Associated)
            .count()
    }
}

// ── ChannelKind ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ChannelKind {
    /// Exactly two endpoints, no contention.
    PointToPoint { data_rate: DataRate, delay: u64 },
    /// N endpoints, one transmission at a time, every other device hears it.
    SharedBus { data_rate: DataRate, delay: u64 },
    /// N endpoints serialized like a bus; data frames only flow between
    /// the access point and associated stations.
    SharedMedium {
        ssid: String,
        data_rate: DataRate,
        delay: u64,
        associations: AssociationTable,
    },
}

impl ChannelKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelKind::PointToPoint { .. } => "point-to-point",
            ChannelKind::SharedBus { .. } => "shared-bus",
            ChannelKind::SharedMedium { .. } => "shared-medium",
        }
    }

    fn timing(&self) -> (DataRate, u64) {
        match self {
            ChannelKind::PointToPoint { data_rate, delay }
            | ChannelKind::SharedBus { data_rate, delay }
            | ChannelKind::SharedMedium {
                data_rate, delay, ..
            } => (*data_rate, *delay),
        }
    }
}

/// The outcome of asking a channel to carry a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitDecision {
    /// Each receiver hears the frame `delay` ticks from now.
    Admitted { receivers: Vec<DeviceId>, delay: u64 },
    /// The medium is busy; try again at `retry_at`.
    Deferred { retry_at: VirtualTime },
    /// A data frame from or to a station that has not associated.
    DroppedUnassociated,
}

// ── Channel ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) id: ChannelId,
    pub(crate) kind: ChannelKind,
    /// Attached devices in attach order. Non-owning: nodes own devices.
    pub(crate) devices: Vec<DeviceId>,
    pub(crate) busy_until: VirtualTime,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, kind: ChannelKind) -> Self {
        Channel {
            id,
            kind,
            devices: Vec::new(),
            busy_until: VirtualTime::ZERO,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn kind(&self) -> &ChannelKind {
        &self.kind
    }

    /// Attached devices in attach order.
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Time the current transmission clears the channel.
    pub fn busy_until(&self) -> VirtualTime {
        self.busy_until
    }

    /// Association state, for shared media only.
    pub fn associations(&self) -> Option<&AssociationTable> {
        match &self.kind {
            ChannelKind::SharedMedium { associations, .. } => Some(associations),
            _ => None,
        }
    }

    pub(crate) fn associations_mut(&mut self) -> Option<&mut AssociationTable> {
        match &mut self.kind {
            ChannelKind::SharedMedium { associations, .. } => Some(associations),
            _ => None,
        }
    }

    /// Ticks from the start of a transmission until receivers hold the
    /// whole frame: serialization plus propagation.
    pub fn frame_delay(&self, size: u32) -> u64 {
        let (rate, delay) = self.kind.timing();
        rate.transmission_time(size) + delay
    }

    fn others(&self, from: DeviceId) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().copied().filter(move |d| *d != from)
    }

    /// Decide what happens when `from` starts sending `frame` at `now`.
    pub fn transmit(&mut self, now: VirtualTime, from: DeviceId, frame: &Frame) -> TransmitDecision {
        let size = frame.size();
        let (rate, _) = self.kind.timing();
        let delay = self.frame_delay(size);

        let receivers: Vec<DeviceId> = match &self.kind {
            ChannelKind::PointToPoint { .. } => {
                return TransmitDecision::Admitted {
                    receivers: self.others(from).collect(),
                    delay,
                };
            }
            ChannelKind::SharedBus { .. } => self.others(from).collect(),
            ChannelKind::SharedMedium { associations, .. } => match frame.kind {
                FrameKind::Data(_) => {
                    if !associations.may_carry_data(from)
                        || !associations.may_carry_data(frame.next_hop)
                    {
                        debug!(channel = %self.id, %from, to = %frame.next_hop, "unassociated data frame dropped");
                        return TransmitDecision::DroppedUnassociated;
                    }
                    self.others(from)
                        .filter(|d| associations.may_carry_data(*d))
                        .collect()
                }
                FrameKind::AssociationRequest | FrameKind::AssociationResponse => {
                    vec![frame.next_hop]
                }
            },
        };

        if now < self.busy_until {
            debug!(channel = %self.id, %from, retry_at = %self.busy_until, "medium busy, deferring");
            return TransmitDecision::Deferred {
                retry_at: self.busy_until,
            };
        }
        self.busy_until = now
            .plus(rate.transmission_time(size))
            .unwrap_or(VirtualTime::new(u64::MAX));
        TransmitDecision::Admitted { receivers, delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Packet, PacketTag};
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn packet(size: u32) -> Packet {
        Packet {
            uid: 1,
            size,
            origin: DeviceId::new(0),
            src: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 49153),
            dst: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 9),
            tag: PacketTag::EchoRequest { seq: 0 },
        }
    }

    fn channel(kind: ChannelKind, devices: &[u32]) -> Channel {
        let mut ch = Channel::new(ChannelId::new(0), kind);
        ch.devices = devices.iter().map(|d| DeviceId::new(*d)).collect();
        ch
    }

    #[test]
    fn test_point_to_point_delay_and_peer() {
        let mut ch = channel(
            ChannelKind::PointToPoint {
                data_rate: DataRate::mbps(5),
                delay: 2_000_000,
            },
            &[0, 1],
        );
        let frame = Frame::data(packet(1024), DeviceId::new(0), DeviceId::new(1));
        let d = ch.transmit(VirtualTime::from_secs(2), DeviceId::new(0), &frame);
        assert_eq!(
            d,
            TransmitDecision::Admitted {
                receivers: vec![DeviceId::new(1)],
                delay: 3_638_400
            }
        );
        // No contention on a dedicated link.
        let again = ch.transmit(VirtualTime::from_secs(2), DeviceId::new(0), &frame);
        assert!(matches!(again, TransmitDecision::Admitted { .. }));
    }

    #[test]
    fn test_zero_size_costs_only_propagation() {
        let ch = channel(
            ChannelKind::PointToPoint {
                data_rate: DataRate::mbps(5),
                delay: 2_000_000,
            },
            &[0, 1],
        );
        assert_eq!(ch.frame_delay(0), 2_000_000);
    }

    #[test]
    fn test_shared_bus_broadcasts_and_defers() {
        let mut ch = channel(
            ChannelKind::SharedBus {
                data_rate: DataRate::mbps(100),
                delay: 6560,
            },
            &[0, 1, 2, 3],
        );
        let frame = Frame::data(packet(1024), DeviceId::new(1), DeviceId::new(3));
        let now = VirtualTime::from_secs(1);
        match ch.transmit(now, DeviceId::new(1), &frame) {
            TransmitDecision::Admitted { receivers, delay } => {
                assert_eq!(
                    receivers,
                    vec![DeviceId::new(0), DeviceId::new(2), DeviceId::new(3)]
                );
                assert_eq!(delay, 81_920 + 6560);
            }
            other => panic!("expected admission, got {:?}", other),
        }
        assert_eq!(ch.busy_until(), now.plus(81_920).unwrap());

        let d = ch.transmit(now.plus(10).unwrap(), DeviceId::new(2), &frame);
        assert_eq!(
            d,
            TransmitDecision::Deferred {
                retry_at: now.plus(81_920).unwrap()
            }
        );
        let d = ch.transmit(now.plus(81_920).unwrap(), DeviceId::new(2), &frame);
        assert!(matches!(d, TransmitDecision::Admitted { .. }));
    }

    fn wifi() -> Channel {
        let mut ch = channel(
            ChannelKind::SharedMedium {
                ssid: "test".into(),
                data_rate: DataRate::mbps(54),
                delay: 1000,
                associations: AssociationTable::default(),
            },
            &[0, 1, 2, 3],
        );
        ch.associations_mut().unwrap().set_access_point(DeviceId::new(3));
        ch
    }

    #[test]
    fn test_shared_medium_drops_unassociated_data() {
        let mut ch = wifi();
        let frame = Frame::data(packet(100), DeviceId::new(0), DeviceId::new(3));
        assert_eq!(
            ch.transmit(VirtualTime::ZERO, DeviceId::new(0), &frame),
            TransmitDecision::DroppedUnassociated
        );
        // A dropped frame never occupies the medium.
        assert_eq!(ch.busy_until(), VirtualTime::ZERO);
    }

    #[test]
    fn test_shared_medium_management_reaches_only_target() {
        let mut ch = wifi();
        let frame = Frame {
            kind: FrameKind::AssociationRequest,
            sender: DeviceId::new(1),
            next_hop: DeviceId::new(3),
        };
        match ch.transmit(VirtualTime::ZERO, DeviceId::new(1), &frame) {
            TransmitDecision::Admitted { receivers, .. } => {
                assert_eq!(receivers, vec![DeviceId::new(3)])
            }
            other => panic!("expected admission, got {:?}", other),
        }
    }

    #[test]
    fn test_shared_medium_delivers_to_associated_only() {
        let mut ch = wifi();
        let table = ch.associations_mut().unwrap();
        table.mark(DeviceId::new(0), AssociationState::Associated);
        table.mark(DeviceId::new(1), AssociationState::Pending);
        assert_eq!(ch.associations().unwrap().associated_count(), 1);

        let frame = Frame::data(packet(100), DeviceId::new(0), DeviceId::new(3));
        match ch.transmit(VirtualTime::ZERO, DeviceId::new(0), &frame) {
            TransmitDecision::Admitted { receivers, .. } => {
                assert_eq!(receivers, vec![DeviceId::new(3)])
            }
            other => panic!("expected admission, got {:?}", other),
        }
    }
}
