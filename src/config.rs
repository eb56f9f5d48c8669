//! Typed configuration for channels, applications and scenarios.
//!
//! Defaults reproduce the reference topologies: a 5 Mbps / 2 ms
//! point-to-point link, a 100 Mbps / 6560 ns shared bus, and an echo
//! pair on port 9 exchanging a single 1024-byte packet.

use std::net::SocketAddrV4;
use std::str::FromStr;

use crate::error::{SimError, SimResult};
use crate::time::{parse_duration, VirtualTime};
use crate::topology::mobility::Rect;

// ── DataRate ──────────────────────────────────────────────────────────

/// A link bit rate in bits per second. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(try_from = "u64"))]
pub struct DataRate(u64);

impl DataRate {
    pub fn from_bps(bps: u64) -> SimResult<Self> {
        if bps == 0 {
            return Err(SimError::InvalidConfig("data rate must be positive".into()));
        }
        Ok(DataRate(bps))
    }

    /// Shorthand for the common megabit rates used in topology scripts.
    pub fn mbps(mbps: u64) -> Self {
        DataRate(mbps.max(1) * 1_000_000)
    }

    pub fn bps(self) -> u64 {
        self.0
    }

    /// Ticks needed to serialize `bytes` onto the wire at this rate,
    /// saturating at `u64::MAX`.
    pub fn transmission_time(self, bytes: u32) -> u64 {
        let bits = bytes as u128 * 8;
        u64::try_from(bits * 1_000_000_000 / self.0 as u128).unwrap_or(u64::MAX)
    }
}

impl TryFrom<u64> for DataRate {
    type Error = SimError;

    fn try_from(bps: u64) -> SimResult<Self> {
        DataRate::from_bps(bps)
    }
}

impl FromStr for DataRate {
    type Err = SimError;

    /// Accepts `bps`, `kbps`, `Mbps` and `Gbps` suffixes, e.g. `"5Mbps"`.
    fn from_str(text: &str) -> SimResult<Self> {
        let text = text.trim();
        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| SimError::InvalidConfig(format!("bad data rate {text:?}")))?;
        let scale = match unit {
            "bps" | "b/s" | "" => 1.0,
            "kbps" | "Kbps" | "kb/s" => 1e3,
            "Mbps" | "mbps" | "Mb/s" => 1e6,
            "Gbps" | "gbps" | "Gb/s" => 1e9,
            other => {
                return Err(SimError::InvalidConfig(format!(
                    "unknown data rate unit {other:?}"
                )))
            }
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "data rate {text:?} must be positive"
            )));
        }
        DataRate::from_bps((value * scale).round() as u64)
    }
}

impl std::fmt::Display for DataRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            b if b % 1_000_000_000 == 0 => write!(f, "{}Gbps", b / 1_000_000_000),
            b if b % 1_000_000 == 0 => write!(f, "{}Mbps", b / 1_000_000),
            b if b % 1_000 == 0 => write!(f, "{}kbps", b / 1_000),
            b => write!(f, "{}bps", b),
        }
    }
}

// ── Channel configs ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PointToPointConfig {
    pub data_rate: DataRate,
    /// Propagation delay in ticks.
    pub delay: u64,
}

impl PointToPointConfig {
    /// Build from the string attributes topology scripts use,
    /// e.g. `("5Mbps", "2ms")`.
    pub fn parse(data_rate: &str, delay: &str) -> SimResult<Self> {
        Ok(PointToPointConfig {
            data_rate: data_rate.parse()?,
            delay: parse_duration(delay)?,
        })
    }
}

impl Default for PointToPointConfig {
    fn default() -> Self {
        PointToPointConfig {
            data_rate: DataRate::mbps(5),
            delay: VirtualTime::from_millis(2).ticks(),
        }
    }
}

/// Shared-bus (CSMA-like LAN) segment parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CsmaConfig {
    pub data_rate: DataRate,
    pub delay: u64,
}

impl CsmaConfig {
    pub fn parse(data_rate: &str, delay: &str) -> SimResult<Self> {
        Ok(CsmaConfig {
            data_rate: data_rate.parse()?,
            delay: parse_duration(delay)?,
        })
    }
}

impl Default for CsmaConfig {
    fn default() -> Self {
        CsmaConfig {
            data_rate: DataRate::mbps(100),
            delay: 6560,
        }
    }
}

/// Shared-medium (wireless) cell parameters. Position never affects
/// delivery; the medium is a contention domain with association.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WifiConfig {
    pub ssid: String,
    pub data_rate: DataRate,
    pub delay: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        WifiConfig {
            ssid: "segnet-ssid".into(),
            data_rate: DataRate::mbps(54),
            delay: VirtualTime::from_micros(1).ticks(),
        }
    }
}

// ── Application configs ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EchoServerConfig {
    pub port: u16,
    pub start: VirtualTime,
    pub stop: Option<VirtualTime>,
}

impl Default for EchoServerConfig {
    fn default() -> Self {
        EchoServerConfig {
            port: 9,
            start: VirtualTime::from_secs(1),
            stop: Some(VirtualTime::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct EchoClientConfig {
    pub remote: SocketAddrV4,
    pub max_packets: u32,
    /// Ticks between consecutive sends.
    pub interval: u64,
    pub packet_size: u32,
    pub start: VirtualTime,
    pub stop: Option<VirtualTime>,
}

impl EchoClientConfig {
    /// One 1024-byte packet, sent at 2 s, with the client stopping at 10 s.
    pub fn new(remote: SocketAddrV4) -> Self {
        EchoClientConfig {
            remote,
            max_packets: 1,
            interval: VirtualTime::from_secs(1).ticks(),
            packet_size: 1024,
            start: VirtualTime::from_secs(2),
            stop: Some(VirtualTime::from_secs(10)),
        }
    }
}

// ── Mobility / animation configs ──────────────────────────────────────

/// Row-first placement grid for initial station positions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct GridConfig {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub width: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: 5.0,
            delta_y: 10.0,
            width: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct RandomWalkConfig {
    pub bounds: Rect,
    /// Speed is drawn uniformly from `[speed_min, speed_max)` m/s.
    pub speed_min: f64,
    pub speed_max: f64,
    /// Ticks between heading/speed redraws.
    pub direction_interval: u64,
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        RandomWalkConfig {
            bounds: Rect::new(-50.0, 50.0, -50.0, 50.0),
            speed_min: 2.0,
            speed_max: 4.0,
            direction_interval: VirtualTime::from_secs(1).ticks(),
        }
    }
}

// ── Scenario config ───────────────────────────────────────────────────

/// Inputs to the reference scenario builders.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ScenarioConfig {
    /// Number of "extra" bus nodes beyond the gateway.
    pub n_csma: u32,
    /// Number of wireless stations.
    pub n_wifi: u32,
    /// Global stop time.
    pub stop: VirtualTime,
    /// Seed for mobility randomness.
    pub seed: u64,
    /// Ticks between animation snapshots.
    pub tick_interval: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            n_csma: 3,
            n_wifi: 3,
            stop: VirtualTime::from_secs(10),
            seed: 1,
            tick_interval: VirtualTime::from_millis(100).ticks(),
        }
    }
}
