//! In-memory loopback hub
//!
//! Stands in for the ingestion endpoint on hosts without a broker: telemetry
//! sent by a connection is stored in the hub and confirmed on the next work
//! pump, and cloud-to-device messages queued on the hub are delivered once the
//! connection has registered its message callback.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use lumen_core::{CorrelationId, DeviceId, LumenResult};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    Confirmation, ConfirmationSender, Connection, ConnectionString, DeliveryReport,
    InboundHandler, Message, Protocol, TransportFactory,
};

/// A message that reached the hub
#[derive(Clone, Debug)]
pub struct Delivered {
    pub device_id: DeviceId,
    pub id: CorrelationId,
    pub payload: Bytes,
}

#[derive(Debug)]
struct HubState {
    delivered: Vec<Delivered>,
    cloud_to_device: VecDeque<Message>,
    delivery_result: Confirmation,
    open_connections: usize,
}

/// Shared in-memory hub
#[derive(Clone, Debug)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        LoopbackHub {
            state: Arc::new(Mutex::new(HubState {
                delivered: Vec::new(),
                cloud_to_device: VecDeque::new(),
                delivery_result: Confirmation::Ok,
                open_connections: 0,
            })),
        }
    }

    /// Transport factory creating connections to this hub
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport { hub: self.clone() }
    }

    /// Queue a cloud-to-device message
    pub fn push_message(&self, message: Message) {
        self.state.lock().cloud_to_device.push_back(message);
    }

    /// Messages delivered so far
    pub fn delivered(&self) -> Vec<Delivered> {
        self.state.lock().delivered.clone()
    }

    /// Drain delivered messages
    pub fn take_delivered(&self) -> Vec<Delivered> {
        std::mem::take(&mut self.state.lock().delivered)
    }

    /// Result reported for subsequent deliveries
    pub fn set_delivery_result(&self, result: Confirmation) {
        self.state.lock().delivery_result = result;
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    pub fn pending_cloud_to_device(&self) -> usize {
        self.state.lock().cloud_to_device.len()
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport factory for the loopback hub
#[derive(Clone, Debug)]
pub struct LoopbackTransport {
    hub: LoopbackHub,
}

impl LoopbackTransport {
    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }
}

impl TransportFactory for LoopbackTransport {
    fn create(
        &self,
        connection_string: &ConnectionString,
        _protocol: Protocol,
        confirmations: ConfirmationSender,
    ) -> LumenResult<Box<dyn Connection>> {
        self.hub.state.lock().open_connections += 1;
        Ok(Box::new(LoopbackConnection {
            hub: self.hub.clone(),
            device_id: connection_string.device_id.clone(),
            confirmations,
            outbox: VecDeque::new(),
            subscribed: false,
        }))
    }
}

struct LoopbackConnection {
    hub: LoopbackHub,
    device_id: DeviceId,
    confirmations: ConfirmationSender,
    outbox: VecDeque<(CorrelationId, Bytes)>,
    subscribed: bool,
}

impl Connection for LoopbackConnection {
    fn set_message_callback(&mut self) -> LumenResult<()> {
        self.subscribed = true;
        Ok(())
    }

    fn send_event_async(&mut self, message: &Message, id: CorrelationId) -> LumenResult<()> {
        let payload = Bytes::copy_from_slice(message.byte_array()?);
        self.outbox.push_back((id, payload));
        Ok(())
    }

    fn do_work(&mut self, inbound: &mut dyn InboundHandler) {
        let (result, incoming) = {
            let mut state = self.hub.state.lock();
            let result = state.delivery_result;
            for (id, payload) in &self.outbox {
                if result.is_ok() {
                    state.delivered.push(Delivered {
                        device_id: self.device_id.clone(),
                        id: *id,
                        payload: payload.clone(),
                    });
                }
            }
            let incoming: Vec<Message> = if self.subscribed {
                state.cloud_to_device.drain(..).collect()
            } else {
                Vec::new()
            };
            (result, incoming)
        };

        for (id, _) in self.outbox.drain(..) {
            let _ = self.confirmations.send(DeliveryReport { id, result });
        }

        for message in incoming {
            let disposition = inbound.on_message(message);
            debug!(?disposition, "loopback message dispatched");
        }
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        for (id, _) in self.outbox.drain(..) {
            let _ = self.confirmations.send(DeliveryReport {
                id,
                result: Confirmation::BecauseDestroy,
            });
        }
        self.hub.state.lock().open_connections -= 1;
    }
}
