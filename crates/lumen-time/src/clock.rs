//! Tick clocks for the agent main loop

use std::time::Instant;

use lumen_core::Tick;

/// Source of monotonic ticks (milliseconds since boot)
/// INVARIANT: successive readings never decrease
pub trait TickClock {
    fn now(&self) -> Tick;
}

/// Tick clock backed by the OS monotonic clock
pub struct MonotonicClock {
    /// Reference instant treated as boot
    reference: Instant,
}

impl MonotonicClock {
    /// Create a clock whose tick zero is now
    pub fn new() -> Self {
        MonotonicClock {
            reference: Instant::now(),
        }
    }

    /// Create a clock counting from an earlier boot instant
    pub fn since(reference: Instant) -> Self {
        MonotonicClock { reference }
    }
}

impl TickClock for MonotonicClock {
    fn now(&self) -> Tick {
        Tick::from_millis(self.reference.elapsed().as_millis() as u64)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
