//! Per-segment address allocation.
//!
//! A segment is declared with a base address and mask; each `assign`
//! hands out the next host address after the base. Segments keep the
//! order they were declared in, which is also the order routing uses
//! to break ties.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::topology::{DeviceId, InterfaceAddress, Topology};

/// Longest prefix that still leaves room for two hosts.
const MAX_PREFIX: u8 = 30;

// ── Subnet ────────────────────────────────────────────────────────────

/// An IPv4 network prefix, e.g. `10.1.2.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Subnet {
    base: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// `base` must have no host bits set.
    pub fn new(base: Ipv4Addr, prefix: u8) -> SimResult<Self> {
        let mask = prefix_to_mask(prefix).ok_or_else(|| SimError::InvalidSegment {
            base,
            mask: Ipv4Addr::UNSPECIFIED,
            reason: format!("prefix length {} is longer than 32", prefix),
        })?;
        if u32::from(base) & !mask != 0 {
            return Err(SimError::InvalidSegment {
                base,
                mask: Ipv4Addr::from(mask),
                reason: "base has host bits set".into(),
            });
        }
        Ok(Subnet { base, prefix })
    }

    /// Build from a dotted mask such as `255.255.255.0`.
    pub fn from_mask(base: Ipv4Addr, mask: Ipv4Addr) -> SimResult<Self> {
        let bits = u32::from(mask);
        let prefix = bits.leading_ones();
        if bits.checked_shl(prefix).unwrap_or(0) != 0 {
            return Err(SimError::InvalidSegment {
                base,
                mask,
                reason: "mask is not contiguous".into(),
            });
        }
        Subnet::new(base, prefix as u8)
    }

    /// Network address.
    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    /// Dotted-quad netmask for the prefix.
    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(prefix_to_mask(self.prefix).unwrap_or(u32::MAX))
    }

    /// Returns `true` if `addr` lies inside this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask());
        u32::from(addr) & mask == u32::from(self.base)
    }

    /// Usable host addresses, excluding network and broadcast.
    pub fn host_capacity(&self) -> u64 {
        let size = 1u64 << (32 - u32::from(self.prefix));
        size.saturating_sub(2)
    }

    fn overlaps(&self, other: &Subnet) -> bool {
        self.contains(other.base) || other.contains(self.base)
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

fn prefix_to_mask(prefix: u8) -> Option<u32> {
    match prefix {
        0 => Some(0),
        1..=32 => Some(u32::MAX << (32 - u32::from(prefix))),
        _ => None,
    }
}

// ── Segment ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentId(u32);

impl SegmentId {
    pub fn new(raw: u32) -> Self {
        SegmentId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// One declared subnet and its allocation cursor.
#[derive(Debug, Clone)]
pub struct Segment {
    id: SegmentId,
    subnet: Subnet,
    /// Host number handed out next, counted from the base.
    next_host: u64,
    assigned: Vec<(DeviceId, Ipv4Addr)>,
}

impl Segment {
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// The subnet this segment hands addresses out of.
    pub fn subnet(&self) -> Subnet {
        self.subnet
    }

    /// Assignments in the order they were made.
    pub fn assigned(&self) -> &[(DeviceId, Ipv4Addr)] {
        &self.assigned
    }

    /// Host addresses still unassigned.
    pub fn remaining(&self) -> u64 {
        (self.subnet.host_capacity() + 1).saturating_sub(self.next_host)
    }
}

// ── Allocator ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct AddressAllocator {
    segments: Vec<Segment>,
}

impl AddressAllocator {
    /// An allocator with no segments.
    pub fn new() -> Self {
        AddressAllocator::default()
    }

    /// Declare a segment. Prefixes longer than /30 and subnets that
    /// overlap an earlier segment are rejected.
    pub fn allocate_segment(&mut self, base: Ipv4Addr, mask: Ipv4Addr) -> SimResult<SegmentId> {
        let subnet = Subnet::from_mask(base, mask)?;
        if subnet.prefix_len() > MAX_PREFIX {
            return Err(SimError::InvalidSegment {
                base,
                mask,
                reason: format!("/{} leaves no room for two hosts", subnet.prefix_len()),
            });
        }
        if let Some(existing) = self.segments.iter().find(|s| s.subnet.overlaps(&subnet)) {
            return Err(SimError::InvalidSegment {
                base,
                mask,
                reason: format!("overlaps segment {} ({})", existing.id, existing.subnet),
            });
        }
        let id = SegmentId(self.segments.len() as u32);
        self.segments.push(Segment {
            id,
            subnet,
            next_host: 1,
            assigned: Vec::new(),
        });
        debug!(segment = %id, %subnet, "segment declared");
        Ok(id)
    }

    /// Give `device` the next free host address of `segment`.
    pub fn assign(&mut self, topo: &mut Topology, segment: SegmentId, device: DeviceId) -> SimResult<Ipv4Addr> {
        let seg = self
            .segments
            .get_mut(segment.0 as usize)
            .ok_or(SimError::UnknownSegment(segment))?;
        if let Some(existing) = topo.device(device)?.ip() {
            return Err(SimError::AddressAlreadyAssigned {
                device,
                address: existing,
            });
        }
        if seg.next_host > seg.subnet.host_capacity() {
            return Err(SimError::AddressExhausted {
                segment,
                subnet: seg.subnet,
            });
        }
        let local = Ipv4Addr::from(u32::from(seg.subnet.base) + seg.next_host as u32);
        topo.set_address(
            device,
            InterfaceAddress {
                local,
                subnet: seg.subnet,
            },
        )?;
        seg.next_host += 1;
        seg.assigned.push((device, local));
        debug!(segment = %segment, %device, address = %local, "address assigned");
        Ok(local)
    }

    /// Assign every device in `devices`, in order.
    pub fn assign_all(
        &mut self,
        topo: &mut Topology,
        segment: SegmentId,
        devices: &[DeviceId],
    ) -> SimResult<Vec<Ipv4Addr>> {
        devices
            .iter()
            .map(|d| self.assign(topo, segment, *d))
            .collect()
    }

    /// Declared segments, in declaration order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Look up a segment, failing with `UnknownSegment`.
    pub fn segment(&self, id: SegmentId) -> SimResult<&Segment> {
        self.segments
            .get(id.0 as usize)
            .ok_or(SimError::UnknownSegment(id))
    }
}
