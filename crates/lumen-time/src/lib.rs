//! Lumen Time - tick clocks and wall-clock synchronization
//!
//! This crate implements:
//! - Monotonic tick clocks driving the agent main loop
//! - The clock sync gate that blocks until wall-clock time is trustworthy
//! - Network (SNTP) and host time sources

pub mod clock;
pub mod sntp;
pub mod sync;

pub use clock::*;
pub use sntp::*;
pub use sync::*;
