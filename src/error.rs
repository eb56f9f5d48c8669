//! Structured error types for segnet.
//!
//! All fallible build-time APIs return `Result<T, SimError>`. Runtime
//! delivery misses (unassociated stations, missing routes, frames not
//! addressed to a device) are not errors: they are counted as drops.

use std::net::Ipv4Addr;

use thiserror::Error;

use crate::address::{SegmentId, Subnet};
use crate::app::AppId;
use crate::topology::{ChannelId, DeviceId, NodeId};

/// The top-level error type for the simulation core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    // ── Topology / configuration errors ───────────────────

    /// A point-to-point channel already has both endpoints.
    #[error("point-to-point channel {channel} already has two devices; cannot attach {node}")]
    PointToPointFull { channel: ChannelId, node: NodeId },

    /// A channel ended topology construction with too few devices.
    #[error("channel {channel} has {attached} device(s) attached, needs {required}")]
    ChannelUnderpopulated {
        channel: ChannelId,
        attached: usize,
        required: usize,
    },

    /// A wireless channel has no access point, or more than one.
    #[error("wireless channel {channel} has {count} access points, needs exactly one")]
    AccessPointCount { channel: ChannelId, count: usize },

    /// An access point or station was attached to a wired channel.
    #[error("channel {channel} is not a shared-medium channel")]
    NotSharedMedium { channel: ChannelId },

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// The requested number of wireless stations does not fit the
    /// placement grid inside the mobility bounds.
    #[error("number of wireless nodes {requested} exceeds the placement grid capacity of {capacity}")]
    GridCapacity { requested: u32, capacity: u32 },

    // ── Addressing errors ─────────────────────────────────

    /// The segment has handed out every usable host address.
    #[error("segment {segment} ({subnet}) has no free host addresses")]
    AddressExhausted { segment: SegmentId, subnet: Subnet },

    /// Base/mask pair is malformed or overlaps an earlier segment.
    #[error("invalid segment {base}/{mask}: {reason}")]
    InvalidSegment {
        base: Ipv4Addr,
        mask: Ipv4Addr,
        reason: String,
    },

    #[error("unknown segment {0}")]
    UnknownSegment(SegmentId),

    /// A device's address is fixed once assigned.
    #[error("device {device} already has address {address}")]
    AddressAlreadyAssigned { device: DeviceId, address: Ipv4Addr },

    #[error("unknown application {0}")]
    UnknownApp(AppId),

    /// Two applications asked for the same port on one device.
    #[error("port {port} is already bound on device {device}")]
    PortInUse { device: DeviceId, port: u16 },

    /// An application was installed on a device that has no address.
    #[error("device {0} has no address assigned")]
    Unaddressed(DeviceId),

    // ── Scheduling errors ─────────────────────────────────

    /// A negative delay, an instant in the past, or clock overflow.
    #[error("invalid time: {reason}")]
    InvalidTime { reason: String },

    // ── Scenario / config errors ──────────────────────────

    /// A configuration value could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Instrumentation errors ────────────────────────────

    /// A capture or position sink failed to flush its output.
    #[error("instrumentation sink failed: {0}")]
    Sink(String),
}

impl SimError {
    /// Whether the error was detected before any event ran. Every
    /// variant is, except clock errors raised from inside a handler and
    /// sink failures during the final flush.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, SimError::InvalidTime { .. } | SimError::Sink(_))
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_point_to_point_full() {
        let e = SimError::PointToPointFull {
            channel: ChannelId::new(0),
            node: NodeId::new(4),
        };
        assert_eq!(
            e.to_string(),
            "point-to-point channel C0 already has two devices; cannot attach N4"
        );
    }

    #[test]
    fn test_error_display_exhausted() {
        let subnet = Subnet::new(Ipv4Addr::new(10, 1, 4, 0), 30).unwrap();
        let e = SimError::AddressExhausted {
            segment: SegmentId::new(2),
            subnet,
        };
        let s = e.to_string();
        assert!(s.contains("10.1.4.0/30"));
        assert!(s.contains("S2"));
    }

    #[test]
    fn test_error_display_grid() {
        let e = SimError::GridCapacity {
            requested: 19,
            capacity: 18,
        };
        assert!(e.to_string().contains("19"));
        assert!(e.is_configuration());
    }

    #[test]
    fn test_invalid_time_is_not_configuration() {
        let e = SimError::InvalidTime {
            reason: "negative".into(),
        };
        assert!(!e.is_configuration());
        assert_eq!(e.to_string(), "invalid time: negative");
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::UnknownNode(NodeId::new(1)));
        assert_eq!(e.to_string(), "unknown node N1");
    }
}
