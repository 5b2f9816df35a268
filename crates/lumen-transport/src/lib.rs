//! Lumen Transport Layer - connection contract and bindings
//!
//! This crate provides:
//! - The platform / transport / connection contract used by the agent
//! - Transport messages and delivery confirmations
//! - Connection string parsing and SAS token generation
//! - MQTT binding (IoT-hub topic layout)
//! - In-memory loopback hub

pub mod connection_string;
pub mod loopback;
pub mod message;
pub mod mqtt;
pub mod sas;
pub mod transport;

pub use connection_string::*;
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use message::*;
pub use mqtt::MqttTransport;
pub use transport::*;
