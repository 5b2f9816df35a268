//! Agent test rig
//!
//! Wires an `Agent` to the recording fakes and keeps handles to all of them.

use std::sync::Arc;

use lumen_core::LumenResult;
use lumen_runtime::{Agent, AgentConfig, Collaborators, LifecycleParts};
use lumen_transport::Message;

use crate::{
    BufferLedger, Call, CallLog, FailPlan, FakeLink, FakePlatform, FakeSerializer, FakeTransport,
    ManualClock, RecordingConfirmations, RecordingReset, RecordingSleeper, ScriptedTimeSource,
    Step,
};

/// Connection string the rig configures
pub const RIG_CONNECTION_STRING: &str = "HostName=hub.test;DeviceId=rig-device;SharedAccessKey=a2V5";

/// Builder for `TestRig`
pub struct TestRigBuilder {
    config: AgentConfig,
    readings: Vec<Option<u64>>,
    link: FakeLink,
    plan: FailPlan,
}

impl TestRigBuilder {
    /// Adjust the agent configuration
    pub fn config(mut self, adjust: impl FnOnce(&mut AgentConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// Wall-clock readings served before the clock is in sync
    pub fn time_readings(mut self, readings: Vec<Option<u64>>) -> Self {
        self.readings = readings;
        self
    }

    pub fn link(mut self, link: FakeLink) -> Self {
        self.link = link;
        self
    }

    /// Fail these steps from the start
    pub fn failing(self, steps: &[Step]) -> Self {
        for step in steps {
            self.plan.fail(*step);
        }
        self
    }

    pub fn build(self) -> LumenResult<TestRig> {
        let log = CallLog::new();
        let ledger = BufferLedger::new();
        let clock = ManualClock::new();
        let confirmations = RecordingConfirmations::new();

        let collaborators = Collaborators {
            lifecycle: LifecycleParts {
                platform: Arc::new(FakePlatform::new(log.clone(), self.plan.clone())),
                serializer: Arc::new(FakeSerializer::new(
                    log.clone(),
                    self.plan.clone(),
                    ledger.clone(),
                )),
                transport: Box::new(FakeTransport::new(
                    log.clone(),
                    self.plan.clone(),
                    self.link.clone(),
                )),
                time_source: Box::new(ScriptedTimeSource::new(self.readings, log.clone())),
                sleeper: Box::new(RecordingSleeper::new(log.clone())),
            },
            clock: Box::new(clock.clone()),
            reset: Box::new(RecordingReset::new(log.clone())),
            confirmations: Box::new(confirmations.clone()),
        };

        Ok(TestRig {
            agent: Agent::new(self.config, collaborators)?,
            log,
            plan: self.plan,
            ledger,
            clock,
            link: self.link,
            confirmations,
        })
    }
}

/// An agent wired to recording fakes
pub struct TestRig {
    pub agent: Agent,
    pub log: CallLog,
    pub plan: FailPlan,
    pub ledger: BufferLedger,
    pub clock: ManualClock,
    pub link: FakeLink,
    pub confirmations: RecordingConfirmations,
}

impl TestRig {
    pub fn builder() -> TestRigBuilder {
        TestRigBuilder {
            config: AgentConfig {
                connection_string: RIG_CONNECTION_STRING.to_string(),
                ..AgentConfig::default()
            },
            readings: Vec::new(),
            link: FakeLink::new(),
            plan: FailPlan::new(),
        }
    }

    pub fn new() -> LumenResult<Self> {
        Self::builder().build()
    }

    /// Rig that has completed its first tick, with the call log cleared
    pub fn started() -> LumenResult<Self> {
        let mut rig = Self::new()?;
        rig.agent.tick();
        rig.log.clear();
        Ok(rig)
    }

    pub fn tick(&mut self) {
        self.agent.tick();
    }

    pub fn send(&mut self, value: i32) {
        self.agent.send(value);
    }

    /// Queue an inbound byte-array message backed by a tracked buffer
    pub fn push_command(&self, body: &[u8]) -> LumenResult<()> {
        let message = Message::from_bytes(self.ledger.track(body.to_vec()))?;
        self.link.push(message);
        Ok(())
    }

    /// Queue an inbound string-typed message
    pub fn push_text(&self, text: &str) -> LumenResult<()> {
        self.link.push(Message::from_text(text)?);
        Ok(())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.log.count(call)
    }
}
