//! Recording fakes for the agent's collaborators
//!
//! Every fake appends to a shared `CallLog`, so tests can assert on the exact
//! order of initialization, teardown and I/O calls. Failures are injected per
//! step through a shared `FailPlan`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lumen_core::{CorrelationId, DeviceId, EpochSeconds, LumenError, LumenResult, Tick};
use lumen_runtime::{ConfirmationHandler, DeviceReset};
use lumen_time::{Sleeper, TickClock, TimeSource};
use lumen_transport::{
    Confirmation, ConfirmationSender, Connection, ConnectionString, DeliveryReport, Disposition,
    InboundHandler, Message, Platform, Protocol, TransportFactory, MAX_MESSAGE_SIZE,
};
use lumen_wire::{JsonSerializer, Serializer, TelemetryModel};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// CALL LOG
// ============================================================================

/// A collaborator call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    TimeConfigure,
    TimeRead,
    Sleep(Duration),
    PlatformInit,
    PlatformDeinit,
    SerializerInit,
    SerializerDeinit,
    CreateModel,
    Serialize,
    ConnectionCreate,
    ConnectionDestroy,
    SetCallback,
    Send(CorrelationId),
    DoWork,
    Restart,
}

/// Shared, ordered record of calls
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn sends(&self) -> Vec<CorrelationId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Send(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

// ============================================================================
// FAILURE INJECTION
// ============================================================================

/// Steps that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    PlatformInit,
    SerializerInit,
    ConnectionCreate,
    ModelCreate,
    SetCallback,
    Serialize,
    /// Serializer returns a payload larger than a message can hold
    OversizePayload,
    Send,
}

/// Steps currently set to fail. Failures persist until healed.
#[derive(Clone, Debug, Default)]
pub struct FailPlan {
    failing: Arc<Mutex<HashSet<Step>>>,
}

impl FailPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, step: Step) {
        self.failing.lock().insert(step);
    }

    pub fn heal(&self, step: Step) {
        self.failing.lock().remove(&step);
    }

    pub fn heal_all(&self) {
        self.failing.lock().clear();
    }

    pub fn fails(&self, step: Step) -> bool {
        self.failing.lock().contains(&step)
    }

    fn check(&self, step: Step, err: impl FnOnce(String) -> LumenError) -> LumenResult<()> {
        if self.fails(step) {
            return Err(err(format!("injected {:?} failure", step)));
        }
        Ok(())
    }
}

// ============================================================================
// ALLOCATION TRACKING
// ============================================================================

/// Counts tracked buffers created and released
#[derive(Clone, Debug, Default)]
pub struct BufferLedger {
    allocated: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl BufferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `data` in a buffer that reports its release to this ledger
    pub fn track(&self, data: Vec<u8>) -> Bytes {
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Bytes::from_owner(TrackedBuffer {
            data,
            ledger: self.clone(),
        })
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Buffers still alive
    pub fn outstanding(&self) -> usize {
        self.allocated() - self.released()
    }
}

struct TrackedBuffer {
    data: Vec<u8>,
    ledger: BufferLedger,
}

impl AsRef<[u8]> for TrackedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// PLATFORM & SERIALIZER
// ============================================================================

#[derive(Clone, Debug)]
pub struct FakePlatform {
    log: CallLog,
    plan: FailPlan,
}

impl FakePlatform {
    pub fn new(log: CallLog, plan: FailPlan) -> Self {
        FakePlatform { log, plan }
    }
}

impl Platform for FakePlatform {
    fn init(&self) -> LumenResult<()> {
        self.log.record(Call::PlatformInit);
        self.plan.check(Step::PlatformInit, LumenError::PlatformInit)
    }

    fn deinit(&self) {
        self.log.record(Call::PlatformDeinit);
    }
}

/// JSON serializer whose payloads are tracked by a `BufferLedger`
#[derive(Debug)]
pub struct FakeSerializer {
    log: CallLog,
    plan: FailPlan,
    ledger: BufferLedger,
    inner: JsonSerializer,
}

impl FakeSerializer {
    pub fn new(log: CallLog, plan: FailPlan, ledger: BufferLedger) -> Self {
        FakeSerializer {
            log,
            plan,
            ledger,
            inner: JsonSerializer::new(),
        }
    }
}

impl Serializer for FakeSerializer {
    fn init(&self) -> LumenResult<()> {
        self.log.record(Call::SerializerInit);
        self.plan.check(Step::SerializerInit, LumenError::SerializerInit)?;
        self.inner.init()
    }

    fn deinit(&self) {
        self.log.record(Call::SerializerDeinit);
        self.inner.deinit();
    }

    fn create_model(&self, device_id: &DeviceId) -> LumenResult<TelemetryModel> {
        self.log.record(Call::CreateModel);
        self.plan.check(Step::ModelCreate, LumenError::ModelCreate)?;
        self.inner.create_model(device_id)
    }

    fn serialize(&self, model: &TelemetryModel) -> LumenResult<Bytes> {
        self.log.record(Call::Serialize);
        self.plan.check(Step::Serialize, LumenError::Serialization)?;
        let data = if self.plan.fails(Step::OversizePayload) {
            vec![b' '; MAX_MESSAGE_SIZE + 1]
        } else {
            self.inner.serialize(model)?.to_vec()
        };
        Ok(self.ledger.track(data))
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Debug)]
struct LinkState {
    inbound: VecDeque<Message>,
    sent: Vec<(CorrelationId, Vec<u8>)>,
    dispositions: Vec<Disposition>,
    loss: Option<(f64, StdRng)>,
    open: usize,
}

/// Shared state behind fake connections: what was sent, what is waiting to
/// be received, and an optional seeded loss rate
#[derive(Clone, Debug)]
pub struct FakeLink {
    state: Arc<Mutex<LinkState>>,
}

impl FakeLink {
    pub fn new() -> Self {
        FakeLink {
            state: Arc::new(Mutex::new(LinkState {
                inbound: VecDeque::new(),
                sent: Vec::new(),
                dispositions: Vec::new(),
                loss: None,
                open: 0,
            })),
        }
    }

    /// Lose each message with probability `rate`; lost messages are
    /// confirmed as timed out
    pub fn with_loss(self, rate: f64, seed: u64) -> Self {
        self.state.lock().loss = Some((rate, StdRng::seed_from_u64(seed)));
        self
    }

    /// Queue a cloud-to-device message
    pub fn push(&self, message: Message) {
        self.state.lock().inbound.push_back(message);
    }

    pub fn sent(&self) -> Vec<(CorrelationId, Vec<u8>)> {
        self.state.lock().sent.clone()
    }

    pub fn dispositions(&self) -> Vec<Disposition> {
        self.state.lock().dispositions.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().open
    }

    fn delivery_result(&self) -> Confirmation {
        let mut state = self.state.lock();
        let lost = match &mut state.loss {
            Some((rate, rng)) => rng.gen_bool(*rate),
            None => false,
        };
        if lost {
            Confirmation::MessageTimeout
        } else {
            Confirmation::Ok
        }
    }
}

impl Default for FakeLink {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct FakeTransport {
    log: CallLog,
    plan: FailPlan,
    link: FakeLink,
}

impl FakeTransport {
    pub fn new(log: CallLog, plan: FailPlan, link: FakeLink) -> Self {
        FakeTransport { log, plan, link }
    }
}

impl TransportFactory for FakeTransport {
    fn create(
        &self,
        _connection_string: &ConnectionString,
        _protocol: Protocol,
        confirmations: ConfirmationSender,
    ) -> LumenResult<Box<dyn Connection>> {
        self.log.record(Call::ConnectionCreate);
        self.plan.check(Step::ConnectionCreate, LumenError::ConnectionCreate)?;
        self.link.state.lock().open += 1;
        Ok(Box::new(FakeConnection {
            log: self.log.clone(),
            plan: self.plan.clone(),
            link: self.link.clone(),
            confirmations,
            pending: Vec::new(),
            callback: false,
        }))
    }
}

struct FakeConnection {
    log: CallLog,
    plan: FailPlan,
    link: FakeLink,
    confirmations: ConfirmationSender,
    pending: Vec<CorrelationId>,
    callback: bool,
}

impl Connection for FakeConnection {
    fn set_message_callback(&mut self) -> LumenResult<()> {
        self.log.record(Call::SetCallback);
        self.plan.check(Step::SetCallback, LumenError::CallbackRegistration)?;
        self.callback = true;
        Ok(())
    }

    fn send_event_async(&mut self, message: &Message, id: CorrelationId) -> LumenResult<()> {
        self.log.record(Call::Send(id));
        self.plan.check(Step::Send, LumenError::SendRejected)?;
        let body = message.byte_array()?.to_vec();
        self.link.state.lock().sent.push((id, body));
        self.pending.push(id);
        Ok(())
    }

    fn do_work(&mut self, inbound: &mut dyn InboundHandler) {
        self.log.record(Call::DoWork);

        for id in std::mem::take(&mut self.pending) {
            let result = self.link.delivery_result();
            let _ = self.confirmations.send(DeliveryReport { id, result });
        }

        if !self.callback {
            return;
        }
        let messages: Vec<Message> = self.link.state.lock().inbound.drain(..).collect();
        for message in messages {
            let disposition = inbound.on_message(message);
            self.link.state.lock().dispositions.push(disposition);
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.log.record(Call::ConnectionDestroy);
        for id in self.pending.drain(..) {
            let _ = self.confirmations.send(DeliveryReport {
                id,
                result: Confirmation::BecauseDestroy,
            });
        }
        self.link.state.lock().open -= 1;
    }
}

// ============================================================================
// TIME
// ============================================================================

/// Tick clock moved by hand
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tick: Tick) {
        self.millis.store(tick.as_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TickClock for ManualClock {
    fn now(&self) -> Tick {
        Tick::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// A plausible synchronized time (2023-11-14)
pub const SYNCED_EPOCH: u64 = 1_700_000_000;

/// Wall-clock source replaying scripted readings. `None` is a failed read.
/// Once the script runs out every read returns `SYNCED_EPOCH`.
#[derive(Debug)]
pub struct ScriptedTimeSource {
    readings: VecDeque<Option<u64>>,
    log: CallLog,
}

impl ScriptedTimeSource {
    pub fn new(readings: impl IntoIterator<Item = Option<u64>>, log: CallLog) -> Self {
        ScriptedTimeSource {
            readings: readings.into_iter().collect(),
            log,
        }
    }
}

impl TimeSource for ScriptedTimeSource {
    fn configure(&mut self, _servers: &[String]) {
        self.log.record(Call::TimeConfigure);
    }

    fn now_epoch(&mut self) -> LumenResult<EpochSeconds> {
        self.log.record(Call::TimeRead);
        match self.readings.pop_front() {
            Some(Some(secs)) => Ok(EpochSeconds::new(secs)),
            Some(None) => Err(LumenError::TimeSync("no reply".into())),
            None => Ok(EpochSeconds::new(SYNCED_EPOCH)),
        }
    }
}

/// Sleeper that records instead of sleeping
#[derive(Clone, Debug)]
pub struct RecordingSleeper {
    log: CallLog,
}

impl RecordingSleeper {
    pub fn new(log: CallLog) -> Self {
        RecordingSleeper { log }
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.log.record(Call::Sleep(duration));
    }
}

// ============================================================================
// RESTART & CONFIRMATIONS
// ============================================================================

/// Device reset that records instead of restarting
#[derive(Clone, Debug)]
pub struct RecordingReset {
    log: CallLog,
}

impl RecordingReset {
    pub fn new(log: CallLog) -> Self {
        RecordingReset { log }
    }
}

impl DeviceReset for RecordingReset {
    fn restart(&mut self) {
        self.log.record(Call::Restart);
    }
}

/// Confirmation handler that keeps every report
#[derive(Clone, Debug, Default)]
pub struct RecordingConfirmations {
    seen: Arc<Mutex<Vec<(CorrelationId, Confirmation)>>>,
}

impl RecordingConfirmations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<(CorrelationId, Confirmation)> {
        self.seen.lock().clone()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.seen.lock().iter().map(|(id, _)| id.value()).collect()
    }
}

impl ConfirmationHandler for RecordingConfirmations {
    fn on_confirmation(&mut self, id: CorrelationId, result: Confirmation) {
        self.seen.lock().push((id, result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_counts_release_once() {
        let ledger = BufferLedger::new();
        let bytes = ledger.track(b"payload".to_vec());
        let clone = bytes.clone();
        drop(bytes);
        assert_eq!(ledger.outstanding(), 1);

        assert_eq!(&clone[..], b"payload");
        drop(clone);
        assert_eq!(ledger.allocated(), 1);
        assert_eq!(ledger.released(), 1);
    }

    #[test]
    fn test_fail_plan() {
        let plan = FailPlan::new();
        assert!(plan.check(Step::Send, LumenError::SendRejected).is_ok());

        plan.fail(Step::Send);
        assert!(matches!(
            plan.check(Step::Send, LumenError::SendRejected),
            Err(LumenError::SendRejected(_))
        ));

        plan.heal(Step::Send);
        assert!(!plan.fails(Step::Send));
    }

    #[test]
    fn test_scripted_time_source() {
        let log = CallLog::new();
        let mut source = ScriptedTimeSource::new([Some(5), None], log.clone());

        assert_eq!(source.now_epoch().unwrap(), EpochSeconds::new(5));
        assert!(source.now_epoch().is_err());
        assert_eq!(source.now_epoch().unwrap(), EpochSeconds::new(SYNCED_EPOCH));
        assert_eq!(log.count(&Call::TimeRead), 3);
    }

    #[test]
    fn test_lossy_link_is_deterministic() {
        let results = |seed| {
            let link = FakeLink::new().with_loss(0.5, seed);
            (0..32).map(|_| link.delivery_result()).collect::<Vec<_>>()
        };
        assert_eq!(results(9), results(9));
    }
}
