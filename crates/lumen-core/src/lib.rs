//! Lumen Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by every Lumen crate:
//! - Identifiers (DeviceId, CorrelationId)
//! - Time primitives (Tick, EpochSeconds)
//! - The common error type

pub mod id;
pub mod time;
pub mod error;

pub use id::*;
pub use time::*;
pub use error::*;
