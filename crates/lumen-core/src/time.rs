//! Time primitives for the Lumen agent
//!
//! Two notions of time are used:
//! - Tick: monotonic milliseconds since boot, drives the main loop and the
//!   deferred restart
//! - EpochSeconds: wall-clock time, only trusted once the clock sync gate passed

use std::ops::{Add, Sub};
use std::time::Duration;

/// Wall-clock readings below this floor are treated as an unset clock.
/// Forty years after 1970 is far in the past for any freshly booted device.
pub const MIN_PLAUSIBLE_EPOCH: EpochSeconds = EpochSeconds(40 * 365 * 24 * 3600);

/// Monotonic tick count in milliseconds since boot
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        Tick(millis)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn saturating_since(self, earlier: Tick) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Tick {
    type Output = Tick;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        Tick(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

impl Sub<Tick> for Tick {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Tick) -> Self::Output {
        self.saturating_since(rhs)
    }
}

impl std::fmt::Debug for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tick({}ms)", self.0)
    }
}

/// Seconds since the Unix epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct EpochSeconds(pub u64);

impl EpochSeconds {
    #[inline]
    pub fn new(secs: u64) -> Self {
        EpochSeconds(secs)
    }

    #[inline]
    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// Whether this reading can be trusted as a synchronized clock
    #[inline]
    pub fn is_plausible(self) -> bool {
        self >= MIN_PLAUSIBLE_EPOCH
    }
}

impl std::fmt::Display for EpochSeconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
