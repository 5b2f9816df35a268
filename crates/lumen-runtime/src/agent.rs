//! Lumen Agent - main loop driver
//!
//! The agent is single-threaded and driven by `tick()`. Each tick:
//! 1. Ensure the connection is initialized (blocks on clock sync when not)
//! 2. Restart the device if a pending restart has fallen due, and stop there
//! 3. Pump the transport once, routing inbound commands
//! 4. Hand delivery confirmations to the confirmation handler
//!
//! Telemetry is sent with `send()` between ticks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lumen_core::{CorrelationId, DeviceId, LumenResult};
use lumen_time::{MonotonicClock, SntpTimeSource, ThreadSleeper, TickClock};
use lumen_transport::{HostPlatform, TransportFactory};
use lumen_wire::JsonSerializer;
use tracing::{debug, error, warn};

use crate::{
    ActionTable, AgentConfig, CommandRouter, ConfirmationHandler, ConnectionLifecycle,
    DeviceReset, Dispatcher, LifecycleParts, LogConfirmations, PendingRestart, ProcessRestart,
    RestartCoordinator,
};

/// Runtime counters
#[derive(Clone, Debug, Default)]
pub struct AgentStats {
    pub ticks: u64,
    pub init_attempts: u64,
    pub init_failures: u64,
    pub sends_submitted: u64,
    pub sends_failed: u64,
    pub inbound_messages: u64,
    pub commands_executed: u64,
    pub confirmations: u64,
    pub last_tick_duration: Duration,
}

/// Everything the agent talks to
pub struct Collaborators {
    pub lifecycle: LifecycleParts,
    pub clock: Box<dyn TickClock>,
    pub reset: Box<dyn DeviceReset>,
    pub confirmations: Box<dyn ConfirmationHandler>,
}

impl Collaborators {
    /// Hosted defaults around `transport`: OS network stack, JSON serializer,
    /// SNTP clock sync, monotonic ticks and process restart.
    pub fn host(transport: Box<dyn TransportFactory>) -> Self {
        Collaborators {
            lifecycle: LifecycleParts {
                platform: Arc::new(HostPlatform),
                serializer: Arc::new(JsonSerializer::new()),
                transport,
                time_source: Box::new(SntpTimeSource::new()),
                sleeper: Box::new(ThreadSleeper),
            },
            clock: Box::new(MonotonicClock::new()),
            reset: Box::new(ProcessRestart),
            confirmations: Box::new(LogConfirmations),
        }
    }
}

/// Device telemetry agent
pub struct Agent {
    device_id: DeviceId,
    tick_interval: Duration,
    lifecycle: ConnectionLifecycle,
    dispatcher: Dispatcher,
    actions: ActionTable,
    restart: RestartCoordinator,
    clock: Box<dyn TickClock>,
    stats: AgentStats,
}

impl Agent {
    pub fn new(config: AgentConfig, collaborators: Collaborators) -> LumenResult<Self> {
        config.validate()?;
        let device_id = config.device_id()?;

        let lifecycle = ConnectionLifecycle::new(
            collaborators.lifecycle,
            config.clock_sync.gate(),
            config.connection_string,
            config.protocol,
            device_id.clone(),
        );

        Ok(Agent {
            device_id,
            tick_interval: config.tick_interval,
            lifecycle,
            dispatcher: Dispatcher::new(collaborators.confirmations),
            actions: ActionTable::standard(),
            restart: RestartCoordinator::new(config.restart_grace, collaborators.reset),
            clock: collaborators.clock,
            stats: AgentStats::default(),
        })
    }

    /// Replace the command table
    pub fn with_actions(mut self, actions: ActionTable) -> Self {
        self.actions = actions;
        self
    }

    /// Initialize if needed. Returns whether the agent is initialized.
    pub fn ensure_initialized(&mut self) -> bool {
        if self.lifecycle.is_initialized() {
            return true;
        }

        self.stats.init_attempts += 1;
        match self
            .lifecycle
            .ensure_initialized(self.dispatcher.confirmation_sender())
        {
            Ok(()) => true,
            Err(e) => {
                self.stats.init_failures += 1;
                error!(attempt = self.stats.init_attempts, error = %e, "initialization failed");
                false
            }
        }
    }

    /// Send one light intensity sample. Does nothing before initialization.
    pub fn send(&mut self, value: i32) {
        let Some(session) = self.lifecycle.session_mut() else {
            return;
        };

        match self.dispatcher.submit(session, &self.device_id, value) {
            Ok(id) => {
                self.stats.sends_submitted += 1;
                debug!(correlation_id = %id, value, "message accepted for delivery");
            }
            Err(e) => {
                self.stats.sends_failed += 1;
                warn!(value, error = %e, "telemetry not sent");
            }
        }
    }

    /// Execute one iteration of the main loop
    pub fn tick(&mut self) {
        let start = Instant::now();
        self.stats.ticks += 1;

        self.ensure_initialized();

        if self.restart.poll(self.clock.now()) {
            return;
        }

        if let Some(session) = self.lifecycle.session_mut() {
            let mut router = CommandRouter::new(
                &self.actions,
                self.restart.pending_mut(),
                self.clock.as_ref(),
                &mut self.stats,
            );
            session.connection_mut().do_work(&mut router);
        }

        self.stats.confirmations += self.dispatcher.drain_confirmations() as u64;
        self.stats.last_tick_duration = start.elapsed();
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    pub fn pending_restart(&self) -> PendingRestart {
        self.restart.pending()
    }

    /// Correlation id the next submission will carry
    pub fn next_correlation_id(&self) -> CorrelationId {
        self.dispatcher.next_id()
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::Tick;
    use lumen_time::SystemTimeSource;
    use lumen_transport::{LoopbackHub, Message};
    use std::cell::Cell;
    use std::rc::Rc;

    struct SharedClock(Rc<Cell<u64>>);

    impl TickClock for SharedClock {
        fn now(&self) -> Tick {
            Tick::from_millis(self.0.get())
        }
    }

    struct CountingReset(Rc<Cell<u32>>);

    impl DeviceReset for CountingReset {
        fn restart(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct Harness {
        agent: Agent,
        hub: LoopbackHub,
        millis: Rc<Cell<u64>>,
        restarts: Rc<Cell<u32>>,
    }

    fn harness() -> Harness {
        let hub = LoopbackHub::new();
        let millis = Rc::new(Cell::new(0));
        let restarts = Rc::new(Cell::new(0));

        let config = AgentConfig {
            connection_string: "HostName=loopback;DeviceId=dev;SharedAccessKey=a2V5".into(),
            ..AgentConfig::default()
        };
        let collaborators = Collaborators {
            lifecycle: LifecycleParts {
                platform: Arc::new(HostPlatform),
                serializer: Arc::new(JsonSerializer::new()),
                transport: Box::new(hub.transport()),
                time_source: Box::new(SystemTimeSource),
                sleeper: Box::new(ThreadSleeper),
            },
            clock: Box::new(SharedClock(millis.clone())),
            reset: Box::new(CountingReset(restarts.clone())),
            confirmations: Box::new(LogConfirmations),
        };

        Harness {
            agent: Agent::new(config, collaborators).unwrap(),
            hub,
            millis,
            restarts,
        }
    }

    #[test]
    fn test_send_before_init_is_ignored() {
        let mut h = harness();
        h.agent.send(10);

        assert_eq!(h.agent.next_correlation_id(), CorrelationId::ZERO);
        assert_eq!(h.agent.stats().sends_submitted, 0);
        assert_eq!(h.hub.open_connections(), 0);
    }

    #[test]
    fn test_send_and_confirm() {
        let mut h = harness();
        h.agent.tick();
        assert!(h.agent.is_initialized());

        h.agent.send(300);
        h.agent.send(301);
        h.agent.tick();

        let delivered = h.hub.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(
            &delivered[0].payload[..],
            br#"{"DeviceId":"LightSensorDevice","LightIntensity":300}"#
        );
        assert_eq!(delivered[1].id, CorrelationId::new(1));
        assert_eq!(h.agent.stats().confirmations, 2);
        assert_eq!(h.agent.stats().init_attempts, 1);
    }

    #[test]
    fn test_reset_command_restarts_after_grace() {
        let mut h = harness();
        h.agent.tick();
        h.agent.send(1); // registers the message callback

        h.millis.set(1_000);
        h.hub.push_message(Message::from_payload(b"ResetDevice").unwrap());
        h.agent.tick();
        assert_eq!(h.agent.pending_restart().armed_at(), Some(Tick::from_millis(1_000)));

        h.millis.set(1_499);
        h.agent.tick();
        assert_eq!(h.restarts.get(), 0);

        h.millis.set(1_500);
        h.agent.tick();
        assert_eq!(h.restarts.get(), 1);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = AgentConfig {
            device_id: String::new(),
            ..AgentConfig::default()
        };
        let collaborators = Collaborators::host(Box::new(LoopbackHub::new().transport()));
        assert!(Agent::new(config, collaborators).is_err());
    }
}
