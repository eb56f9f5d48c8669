//! Virtual time for the deterministic simulation.
//!
//! Represents a logical timestamp with no dependency on `std::time`.
//! Time advances only when the scheduler processes events, never from
//! wall-clock observation. One tick is one nanosecond.

use crate::error::{SimError, SimResult};

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A logical instant in simulation time, in nanoseconds since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// Create a `VirtualTime` from a raw tick (nanosecond) value.
    #[inline]
    pub const fn new(ticks: u64) -> Self {
        VirtualTime(ticks)
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        VirtualTime(micros * NANOS_PER_MICRO)
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VirtualTime(millis * NANOS_PER_MILLI)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VirtualTime(secs * NANOS_PER_SEC)
    }

    /// Convert fractional seconds, rejecting negative or non-finite input.
    pub fn from_secs_f64(secs: f64) -> SimResult<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(SimError::InvalidTime {
                reason: format!("{secs}s is not a non-negative finite time"),
            });
        }
        let nanos = (secs * NANOS_PER_SEC as f64).round();
        if nanos > u64::MAX as f64 {
            return Err(SimError::InvalidTime {
                reason: format!("{secs}s overflows the simulation clock"),
            });
        }
        Ok(VirtualTime(nanos as u64))
    }

    /// The raw tick (nanosecond) value.
    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Seconds as a float, for human-facing output.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Advance time by `delta` ticks.
    /// Returns `None` on overflow.
    #[inline]
    pub fn advance(self, delta: u64) -> Option<VirtualTime> {
        self.0.checked_add(delta).map(VirtualTime)
    }

    /// Alias for `advance`; reads better where future events are scheduled.
    #[inline]
    pub fn plus(self, delay: u64) -> Option<VirtualTime> {
        self.advance(delay)
    }

    /// Returns the duration (in ticks) between two points in time.
    /// Returns `None` if `other` is after `self`.
    #[inline]
    pub fn duration_since(self, other: VirtualTime) -> Option<u64> {
        self.0.checked_sub(other.0)
    }
}

/// Seconds, printed the way the echo applications report them: `2s`,
/// `2.003686s`.
impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.as_secs_f64())
    }
}

/// Parse a duration literal such as `2ms`, `6560ns`, `10us` or `1.5s`
/// into nanosecond ticks. A bare number is taken as seconds.
pub fn parse_duration(text: &str) -> SimResult<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| SimError::InvalidConfig(format!("bad duration literal {text:?}")))?;
    let scale = match unit {
        "ns" => 1.0,
        "us" => NANOS_PER_MICRO as f64,
        "ms" => NANOS_PER_MILLI as f64,
        "s" | "" => NANOS_PER_SEC as f64,
        other => {
            return Err(SimError::InvalidConfig(format!(
                "unknown duration unit {other:?} in {text:?}"
            )))
        }
    };
    if !value.is_finite() || value < 0.0 {
        return Err(SimError::InvalidTime {
            reason: format!("duration {text:?} is negative"),
        });
    }
    Ok((value * scale).round() as u64)
}
