//! Platform, transport and connection contract
//!
//! The agent drives every transport through these traits:
//! - `Platform`: one-time network stack bring-up
//! - `TransportFactory`: creates a connection from a connection string
//! - `Connection`: message callback registration, async send, work pump;
//!   dropping it destroys the connection
//!
//! Delivery confirmations flow back through a channel that connections only
//! feed from inside `do_work`, so a confirmation never arrives before its
//! `send_event_async` call has returned.

use std::fmt;

use lumen_core::{CorrelationId, LumenResult};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::{ConnectionString, Message};

/// Protocol binding used to reach the ingestion endpoint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Mqtt,
}

/// Outcome reported for a submitted message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// Delivered and acknowledged
    Ok,
    /// Connection destroyed before delivery
    BecauseDestroy,
    /// Not delivered in time
    MessageTimeout,
    Error,
}

impl Confirmation {
    pub fn is_ok(self) -> bool {
        self == Confirmation::Ok
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Confirmation::Ok => "CONFIRMATION_OK",
            Confirmation::BecauseDestroy => "CONFIRMATION_BECAUSE_DESTROY",
            Confirmation::MessageTimeout => "CONFIRMATION_MESSAGE_TIMEOUT",
            Confirmation::Error => "CONFIRMATION_ERROR",
        };
        f.write_str(name)
    }
}

/// Delivery confirmation for one message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    pub id: CorrelationId,
    pub result: Confirmation,
}

/// Sending half of the confirmation channel, owned by the connection
pub type ConfirmationSender = mpsc::UnboundedSender<DeliveryReport>;

/// Receiving half of the confirmation channel, owned by the agent
pub type ConfirmationReceiver = mpsc::UnboundedReceiver<DeliveryReport>;

/// Create a confirmation channel
pub fn confirmation_channel() -> (ConfirmationSender, ConfirmationReceiver) {
    mpsc::unbounded_channel()
}

/// What the application tells the transport about an inbound message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    Rejected,
    Abandoned,
}

/// Receiver of inbound (cloud-to-device) messages
pub trait InboundHandler {
    /// Handle one message. The handler owns the message and releases it on return.
    fn on_message(&mut self, message: Message) -> Disposition;
}

/// Network stack bring-up
pub trait Platform {
    fn init(&self) -> LumenResult<()>;
    fn deinit(&self);
}

/// Platform for hosted targets where the OS network stack is already up
#[derive(Clone, Copy, Debug, Default)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn init(&self) -> LumenResult<()> {
        info!("host platform ready");
        Ok(())
    }

    fn deinit(&self) {}
}

/// Creates connections
pub trait TransportFactory {
    /// Create a connection. Confirmations for messages sent on it are
    /// delivered through `confirmations`.
    fn create(
        &self,
        connection_string: &ConnectionString,
        protocol: Protocol,
        confirmations: ConfirmationSender,
    ) -> LumenResult<Box<dyn Connection>>;
}

/// A live connection. Dropping it destroys the connection.
pub trait Connection {
    /// Register for inbound messages. Idempotent.
    fn set_message_callback(&mut self) -> LumenResult<()>;

    /// Submit a message for asynchronous delivery. The connection copies what
    /// it needs; `message` may be released as soon as this returns.
    fn send_event_async(&mut self, message: &Message, id: CorrelationId) -> LumenResult<()>;

    /// Process pending sends, receives and retries once. Inbound messages are
    /// dispatched to `inbound`; confirmations are pushed to the channel.
    fn do_work(&mut self, inbound: &mut dyn InboundHandler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_channel_delivers_in_order() {
        let (tx, mut rx) = confirmation_channel();
        for i in 0..3 {
            tx.send(DeliveryReport {
                id: CorrelationId::new(i),
                result: Confirmation::Ok,
            })
            .unwrap();
        }

        let ids: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|r| r.id.value())
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_confirmation_display() {
        assert_eq!(Confirmation::Ok.to_string(), "CONFIRMATION_OK");
        assert!(!Confirmation::MessageTimeout.is_ok());
    }

    #[test]
    fn test_default_protocol() {
        assert_eq!(Protocol::default(), Protocol::Mqtt);
    }
}
