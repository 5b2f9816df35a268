//! Lumen Test Harness - fakes and agent test rig
//!
//! This crate provides:
//! - Recording fakes for every agent collaborator
//! - Failure injection per initialization and send step
//! - Allocation-tracking payload buffers
//! - A manual tick clock and scripted wall-clock readings
//! - A lossy in-memory link with seeded message loss
//! - `TestRig`, an agent wired to all of the above
//! - End-to-end agent tests

pub mod fakes;
pub mod integration;
pub mod rig;

pub use fakes::*;
pub use rig::*;
