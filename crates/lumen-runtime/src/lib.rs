//! Lumen Runtime - device telemetry agent
//!
//! This crate ties the lower layers into a tick-driven agent:
//! - Connection lifecycle (clock sync, platform, serializer, connection, model)
//! - Outbound telemetry dispatch and delivery confirmations
//! - Inbound command routing and the command action table
//! - Deferred device restart
//! - The main loop driver, configuration and logging setup

pub mod actions;
pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod lifecycle;
pub mod logging;
pub mod restart;
pub mod router;

pub use actions::*;
pub use agent::*;
pub use config::*;
pub use dispatcher::*;
pub use lifecycle::*;
pub use restart::*;
pub use router::*;
