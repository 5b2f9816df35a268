//! Lumen Wire - payload formats
//!
//! This crate implements what travels over the connection:
//! - The telemetry model and its JSON payload
//! - The serializer subsystem (init, model instances, serialize)
//! - Decoding of inbound command text

pub mod codec;
pub mod command;
pub mod telemetry;

pub use codec::*;
pub use command::*;
pub use telemetry::*;
