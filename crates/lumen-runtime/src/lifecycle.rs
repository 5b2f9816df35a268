//! Connection lifecycle
//!
//! Initialization acquires, in order: a synchronized wall clock, the platform,
//! the serializer, the connection and the telemetry model. Each acquired
//! resource is held by a guard, so a failed step releases everything acquired
//! before it in reverse order, and the next attempt starts over from the clock.
//! Once a session is established it lives as long as the lifecycle.

use std::sync::Arc;

use bytes::Bytes;
use lumen_core::{DeviceId, LumenResult};
use lumen_time::{ClockSyncGate, Sleeper, TimeSource};
use lumen_transport::{
    ConfirmationSender, Connection, ConnectionString, Platform, Protocol, TransportFactory,
};
use lumen_wire::{Serializer, TelemetryModel};
use tracing::{debug, info};

/// Initialized platform, deinitialized on drop
pub struct PlatformGuard {
    platform: Arc<dyn Platform>,
}

impl PlatformGuard {
    pub fn acquire(platform: Arc<dyn Platform>) -> LumenResult<Self> {
        platform.init()?;
        Ok(PlatformGuard { platform })
    }
}

impl Drop for PlatformGuard {
    fn drop(&mut self) {
        debug!("platform deinit");
        self.platform.deinit();
    }
}

/// Initialized serializer, deinitialized on drop
pub struct SerializerGuard {
    serializer: Arc<dyn Serializer>,
}

impl SerializerGuard {
    pub fn acquire(serializer: Arc<dyn Serializer>) -> LumenResult<Self> {
        serializer.init()?;
        Ok(SerializerGuard { serializer })
    }

    pub fn get(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }
}

impl Drop for SerializerGuard {
    fn drop(&mut self) {
        debug!("serializer deinit");
        self.serializer.deinit();
    }
}

/// Everything a successful initialization acquired.
///
/// Fields drop in declaration order: connection, serializer, platform.
pub struct Session {
    model: TelemetryModel,
    connection: Box<dyn Connection>,
    serializer: SerializerGuard,
    _platform: PlatformGuard,
}

impl Session {
    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        self.connection.as_mut()
    }

    pub fn model(&self) -> &TelemetryModel {
        &self.model
    }

    /// Populate the model with a sample and serialize it
    pub fn encode(&mut self, device_id: &DeviceId, value: i32) -> LumenResult<Bytes> {
        self.model.set_sample(device_id, value);
        self.serializer.get().serialize(&self.model)
    }
}

/// Collaborators the lifecycle initializes
pub struct LifecycleParts {
    pub platform: Arc<dyn Platform>,
    pub serializer: Arc<dyn Serializer>,
    pub transport: Box<dyn TransportFactory>,
    pub time_source: Box<dyn TimeSource>,
    pub sleeper: Box<dyn Sleeper>,
}

/// Connection lifecycle manager
pub struct ConnectionLifecycle {
    parts: LifecycleParts,
    gate: ClockSyncGate,
    connection_string: String,
    protocol: Protocol,
    device_id: DeviceId,
    session: Option<Session>,
}

impl ConnectionLifecycle {
    pub fn new(
        parts: LifecycleParts,
        gate: ClockSyncGate,
        connection_string: impl Into<String>,
        protocol: Protocol,
        device_id: DeviceId,
    ) -> Self {
        ConnectionLifecycle {
            parts,
            gate,
            connection_string: connection_string.into(),
            protocol,
            device_id,
            session: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Initialize if not yet initialized. A no-op once a session exists.
    ///
    /// On error nothing from this attempt is left acquired.
    pub fn ensure_initialized(&mut self, confirmations: &ConfirmationSender) -> LumenResult<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = self.establish(confirmations)?;
        info!(device = %self.device_id, "connection established");
        self.session = Some(session);
        Ok(())
    }

    fn establish(&mut self, confirmations: &ConfirmationSender) -> LumenResult<Session> {
        self.gate
            .sync_clock(self.parts.time_source.as_mut(), self.parts.sleeper.as_ref());

        let platform = PlatformGuard::acquire(Arc::clone(&self.parts.platform))?;
        let serializer = SerializerGuard::acquire(Arc::clone(&self.parts.serializer))?;
        let connection_string = ConnectionString::parse(&self.connection_string)?;
        let connection =
            self.parts
                .transport
                .create(&connection_string, self.protocol, confirmations.clone())?;
        let model = serializer.get().create_model(&self.device_id)?;

        Ok(Session {
            model,
            connection,
            serializer,
            _platform: platform,
        })
    }
}
