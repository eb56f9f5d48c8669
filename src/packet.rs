//! Packets and the link-layer frames that carry them.

use std::net::SocketAddrV4;

use crate::topology::DeviceId;

/// Size charged for association management frames on a shared medium.
pub const MANAGEMENT_FRAME_BYTES: u32 = 64;

/// What a packet is, for capture output and application dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketTag {
    EchoRequest { seq: u32 },
    EchoReply { seq: u32 },
}

impl std::fmt::Display for PacketTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketTag::EchoRequest { seq } => write!(f, "echo-request#{}", seq),
            PacketTag::EchoReply { seq } => write!(f, "echo-reply#{}", seq),
        }
    }
}

/// A network-layer datagram. Immutable once built by the runtime;
/// forwarding hands the same value from hop to hop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Packet {
    /// Run-unique, creation-ordered id.
    pub uid: u64,
    /// Payload size in bytes; the whole size is charged on the wire.
    pub size: u32,
    /// Device that originated the packet.
    pub origin: DeviceId,
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub tag: PacketTag,
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} > {} len={} {} uid={}",
            self.src, self.dst, self.size, self.tag, self.uid
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameKind {
    Data(Packet),
    /// Station asks the access point to join the cell.
    AssociationRequest,
    /// Access point confirms the station's membership.
    AssociationResponse,
}

/// A frame on a channel: one hop of a packet's journey, or a
/// shared-medium management exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    pub kind: FrameKind,
    /// Transmitting device.
    pub sender: DeviceId,
    /// Link-layer destination on the same channel.
    pub next_hop: DeviceId,
}

impl Frame {
    pub fn data(packet: Packet, sender: DeviceId, next_hop: DeviceId) -> Self {
        Frame {
            kind: FrameKind::Data(packet),
            sender,
            next_hop,
        }
    }

    /// Bytes occupying the medium.
    pub fn size(&self) -> u32 {
        match &self.kind {
            FrameKind::Data(packet) => packet.size,
            FrameKind::AssociationRequest | FrameKind::AssociationResponse => {
                MANAGEMENT_FRAME_BYTES
            }
        }
    }

    pub fn packet(&self) -> Option<&Packet> {
        match &self.kind {
            FrameKind::Data(packet) => Some(packet),
            _ => None,
        }
    }

    pub fn is_management(&self) -> bool {
        !matches!(self.kind, FrameKind::Data(_))
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FrameKind::Data(packet) => {
                write!(f, "{}->{} {}", self.sender, self.next_hop, packet)
            }
            FrameKind::AssociationRequest => {
                write!(f, "{}->{} assoc-request", self.sender, self.next_hop)
            }
            FrameKind::AssociationResponse => {
                write!(f, "{}->{} assoc-response", self.sender, self.next_hop)
            }
        }
    }
}
