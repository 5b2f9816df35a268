//! MQTT binding
//!
//! Device-to-cloud telemetry is published to `devices/{id}/messages/events/`
//! and cloud-to-device messages arrive on `devices/{id}/messages/devicebound/#`,
//! both at QoS 1. A PUBACK confirms delivery.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use lumen_core::{CorrelationId, DeviceId, LumenError, LumenResult};
use rumqttc::{Client, Event, MqttOptions, Outgoing, Packet, QoS, Transport};
use tracing::{debug, info, warn};

use crate::sas::{password_for, DEFAULT_TOKEN_TTL};
use crate::{
    Confirmation, ConfirmationSender, Connection, ConnectionString, DeliveryReport,
    InboundHandler, Message, Protocol, TransportFactory,
};

/// Secure MQTT port
pub const MQTT_TLS_PORT: u16 = 8883;

const API_VERSION: &str = "2021-04-12";

pub fn telemetry_topic(device_id: &DeviceId) -> String {
    format!("devices/{}/messages/events/", device_id)
}

pub fn command_topic(device_id: &DeviceId) -> String {
    format!("devices/{}/messages/devicebound/#", device_id)
}

/// Transport factory for the MQTT binding
#[derive(Clone, Debug)]
pub struct MqttTransport {
    keep_alive: Duration,
    capacity: usize,
    poll_timeout: Duration,
    token_ttl: Duration,
}

impl MqttTransport {
    pub fn new() -> Self {
        MqttTransport {
            keep_alive: Duration::from_secs(240),
            capacity: 16,
            poll_timeout: Duration::from_millis(10),
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// How long one work pump waits for network events
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    fn options(&self, connection_string: &ConnectionString) -> LumenResult<MqttOptions> {
        let device_id = &connection_string.device_id;
        let mut options = MqttOptions::new(
            device_id.as_str(),
            connection_string.endpoint_host(),
            MQTT_TLS_PORT,
        );
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(false);
        options.set_credentials(
            format!(
                "{}/{}/?api-version={}",
                connection_string.host_name, device_id, API_VERSION
            ),
            password_for(connection_string, self.token_ttl)?,
        );
        Ok(options)
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for MqttTransport {
    fn create(
        &self,
        connection_string: &ConnectionString,
        protocol: Protocol,
        confirmations: ConfirmationSender,
    ) -> LumenResult<Box<dyn Connection>> {
        match protocol {
            Protocol::Mqtt => {}
        }

        let mut options = self.options(connection_string)?;
        options.set_transport(Transport::tls_with_default_config());
        let (client, connection) = Client::new(options, self.capacity);
        info!(
            host = connection_string.endpoint_host(),
            device = %connection_string.device_id,
            "MQTT client created"
        );

        Ok(Box::new(MqttConnection::new(
            client,
            connection,
            connection_string.device_id.clone(),
            self.poll_timeout,
            self.capacity * 4,
            confirmations,
        )))
    }
}

struct MqttConnection {
    client: Client,
    connection: rumqttc::Connection,
    device_id: DeviceId,
    poll_timeout: Duration,
    max_events: usize,
    subscribed: bool,
    /// Submitted but not yet handed to the network, in submission order
    queued: VecDeque<CorrelationId>,
    /// Written to the network, awaiting PUBACK, by packet id
    in_flight: HashMap<u16, CorrelationId>,
    confirmations: ConfirmationSender,
}

impl MqttConnection {
    fn new(
        client: Client,
        connection: rumqttc::Connection,
        device_id: DeviceId,
        poll_timeout: Duration,
        max_events: usize,
        confirmations: ConfirmationSender,
    ) -> Self {
        MqttConnection {
            client,
            connection,
            device_id,
            poll_timeout,
            max_events,
            subscribed: false,
            queued: VecDeque::new(),
            in_flight: HashMap::new(),
            confirmations,
        }
    }

    fn confirm(&self, id: CorrelationId, result: Confirmation) {
        let _ = self.confirmations.send(DeliveryReport { id, result });
    }

    fn handle_event(&mut self, event: Event, inbound: &mut dyn InboundHandler) {
        match event {
            // A reconnect replays unacked publishes under their original packet id
            Event::Outgoing(Outgoing::Publish(pkid)) if self.in_flight.contains_key(&pkid) => {
                debug!(pkid, "publish retransmitted");
            }
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                if let Some(id) = self.queued.pop_front() {
                    self.in_flight.insert(pkid, id);
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                if let Some(id) = self.in_flight.remove(&ack.pkid) {
                    self.confirm(id, Confirmation::Ok);
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                debug!(topic = %publish.topic, len = publish.payload.len(), "inbound publish");
                match Message::from_bytes(publish.payload) {
                    Ok(message) => {
                        let disposition = inbound.on_message(message);
                        debug!(?disposition, "inbound message handled");
                    }
                    Err(e) => warn!(error = %e, "dropping inbound message"),
                }
            }
            Event::Incoming(Packet::ConnAck(_)) => {
                info!(device = %self.device_id, "connected");
            }
            Event::Incoming(Packet::SubAck(_)) => {
                debug!(device = %self.device_id, "subscription acknowledged");
            }
            _ => {}
        }
    }
}

impl Connection for MqttConnection {
    fn set_message_callback(&mut self) -> LumenResult<()> {
        if self.subscribed {
            return Ok(());
        }
        self.client
            .try_subscribe(command_topic(&self.device_id), QoS::AtLeastOnce)
            .map_err(|e| LumenError::CallbackRegistration(e.to_string()))?;
        self.subscribed = true;
        Ok(())
    }

    fn send_event_async(&mut self, message: &Message, id: CorrelationId) -> LumenResult<()> {
        let payload = message.byte_array()?.to_vec();
        self.client
            .try_publish(telemetry_topic(&self.device_id), QoS::AtLeastOnce, false, payload)
            .map_err(|e| LumenError::SendRejected(e.to_string()))?;
        self.queued.push_back(id);
        Ok(())
    }

    fn do_work(&mut self, inbound: &mut dyn InboundHandler) {
        for _ in 0..self.max_events {
            match self.connection.recv_timeout(self.poll_timeout) {
                Ok(Ok(event)) => self.handle_event(event, inbound),
                Ok(Err(e)) => {
                    warn!(device = %self.device_id, error = %e, "MQTT connection error");
                    break;
                }
                // Nothing more within the poll window
                Err(_) => break,
            }
        }
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        let _ = self.client.try_disconnect();
        let pending: Vec<CorrelationId> = self
            .in_flight
            .drain()
            .map(|(_, id)| id)
            .chain(self.queued.drain(..))
            .collect();
        for id in pending {
            self.confirm(id, Confirmation::BecauseDestroy);
        }
        debug!(device = %self.device_id, "MQTT connection destroyed");
    }
}
