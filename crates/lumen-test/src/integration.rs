//! End-to-end agent tests
//!
//! Each test drives a full `Agent` through `TestRig` and checks:
//! - Initialization order, idempotence and unwinding
//! - Correlation ids and delivery confirmations
//! - Payload and inbound buffer release
//! - Command dispatch and the deferred restart
