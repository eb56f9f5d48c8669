//! Instrumentation sinks.
//!
//! Sinks observe the run and never feed anything back into it. The
//! runtime reports frames on capture-enabled devices to a
//! [`CaptureSink`] and node positions to a [`PositionSink`]; turning
//! either into a file format is the sink's business.

use std::io::{self, Write};

use crate::packet::Frame;
use crate::time::VirtualTime;
use crate::topology::{DeviceId, NodeId, Position};

// ── Hash utility ──────────────────────────────────────────────────────

/// Hash a byte slice deterministically (FNV-1a).
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

// ── Capture ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Tx,
    Rx,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Tx => write!(f, "tx"),
            Direction::Rx => write!(f, "rx"),
        }
    }
}

/// Receives every transmission and reception on capture-enabled devices.
pub trait CaptureSink {
    fn on_packet_event(&mut self, device: DeviceId, direction: Direction, time: VirtualTime, frame: &Frame);

    /// Called once after the run ends.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CaptureRecord {
    pub time: VirtualTime,
    pub device: DeviceId,
    pub direction: Direction,
    pub frame: Frame,
}

impl std::fmt::Display for CaptureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.time.ticks(),
            self.device,
            self.direction,
            self.frame
        )
    }
}

/// In-memory capture that renders to deterministic text.
#[derive(Debug, Clone, Default)]
pub struct PacketTrace {
    records: Vec<CaptureRecord>,
}

impl PacketTrace {
    pub fn new() -> Self {
        PacketTrace::default()
    }

    /// Every captured record in dispatch order.
    pub fn records(&self) -> &[CaptureRecord] {
        &self.records
    }

    /// Number of captured records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records seen by one device.
    pub fn for_device(&self, device: DeviceId) -> impl Iterator<Item = &CaptureRecord> {
        self.records.iter().filter(move |r| r.device == device)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# SEGNET CAPTURE v1")?;
        writeln!(w, "# records: {}", self.records.len())?;
        for record in &self.records {
            writeln!(w, "{}", record)?;
        }
        Ok(())
    }

    /// The full export as a string.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Digest of the rendered trace; equal for byte-identical runs.
    pub fn digest(&self) -> u64 {
        hash_bytes(self.render().as_bytes())
    }

    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.records)
    }
}

impl CaptureSink for PacketTrace {
    fn on_packet_event(&mut self, device: DeviceId, direction: Direction, time: VirtualTime, frame: &Frame) {
        self.records.push(CaptureRecord {
            time,
            device,
            direction,
            frame: frame.clone(),
        });
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ── Positions ─────────────────────────────────────────────────────────

/// Receives initial placements and periodic snapshots of mobile nodes.
pub trait PositionSink {
    fn on_position_assigned(&mut self, node: NodeId, x: f64, y: f64);

    fn on_simulation_tick(&mut self, time: VirtualTime, positions: &[(NodeId, Position)]);

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PositionSnapshot {
    pub time: VirtualTime,
    pub positions: Vec<(NodeId, Position)>,
}

/// In-memory position recorder.
#[derive(Debug, Clone, Default)]
pub struct PositionLog {
    initial: Vec<(NodeId, Position)>,
    snapshots: Vec<PositionSnapshot>,
}

impl PositionLog {
    pub fn new() -> Self {
        PositionLog::default()
    }

    /// Positions reported at simulation start.
    pub fn initial(&self) -> &[(NodeId, Position)] {
        &self.initial
    }

    /// One snapshot per mobility tick.
    pub fn snapshots(&self) -> &[PositionSnapshot] {
        &self.snapshots
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# SEGNET POSITIONS v1")?;
        for (node, p) in &self.initial {
            writeln!(w, "P 0 {} {:.3} {:.3}", node, p.x, p.y)?;
        }
        for snap in &self.snapshots {
            for (node, p) in &snap.positions {
                writeln!(w, "T {} {} {:.3} {:.3}", snap.time.ticks(), node, p.x, p.y)?;
            }
        }
        Ok(())
    }

    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshots)
    }
}

impl PositionSink for PositionLog {
    fn on_position_assigned(&mut self, node: NodeId, x: f64, y: f64) {
        self.initial.push((node, Position::new(x, y)));
    }

    fn on_simulation_tick(&mut self, time: VirtualTime, positions: &[(NodeId, Position)]) {
        self.snapshots.push(PositionSnapshot {
            time,
            positions: positions.to_vec(),
        });
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FrameKind;

    fn mgmt(sender: u32, next_hop: u32) -> Frame {
        Frame {
            kind: FrameKind::AssociationRequest,
            sender: DeviceId::new(sender),
            next_hop: DeviceId::new(next_hop),
        }
    }

    #[test]
    fn test_hash_determinism() {
        assert_eq!(hash_bytes(b"segnet"), hash_bytes(b"segnet"));
        assert_ne!(hash_bytes(b"segnet"), hash_bytes(b"segnes"));
    }

    #[test]
    fn test_trace_render_and_digest() {
        let mut a = PacketTrace::new();
        let mut b = PacketTrace::new();
        for trace in [&mut a, &mut b] {
            trace.on_packet_event(DeviceId::new(0), Direction::Tx, VirtualTime::from_secs(1), &mgmt(0, 1));
            trace.on_packet_event(DeviceId::new(1), Direction::Rx, VirtualTime::from_millis(1_001), &mgmt(0, 1));
        }
        assert_eq!(a.len(), 2);
        assert_eq!(a.render(), b.render());
        assert_eq!(a.digest(), b.digest());
        assert!(a.render().contains("1000000000 D0 tx"));
        assert_eq!(a.for_device(DeviceId::new(1)).count(), 1);

        b.on_packet_event(DeviceId::new(1), Direction::Tx, VirtualTime::from_secs(2), &mgmt(1, 0));
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_position_log() {
        let mut log = PositionLog::new();
        log.on_position_assigned(NodeId::new(4), 5.0, 10.0);
        log.on_simulation_tick(
            VirtualTime::from_millis(100),
            &[(NodeId::new(4), Position::new(5.25, 10.0))],
        );
        assert_eq!(log.initial(), &[(NodeId::new(4), Position::new(5.0, 10.0))]);
        assert_eq!(log.snapshots().len(), 1);
        let mut out = Vec::new();
        log.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("T 100000000 N4 5.250 10.000"));
    }
}
