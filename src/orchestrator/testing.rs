//! Recording collaborators for orchestrator tests
//!
//! Every mock counts acquire/release calls, and the capture and detector
//! share a [`Microphone`] that records any overlap in ownership.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{Collaborators, Orchestrator, OrchestratorHandle};
use crate::capability::{
    AudioCapture, BackgroundLease, CaptureError, CaptureEvent, DetectorError, KeywordDetector,
    KeywordProfile, LeaseError, NotificationSink, NotifyError, PowerEvent, PowerMonitor,
    PowerStatus, RecordingDescriptor, RecordingId, RecordingStore, StoreError, TrainError,
};
use crate::config::OrchestratorConfig;
use crate::events::{NotificationContext, NotificationKind, StateEvent};
use crate::state::OperationalState;

/// Longest a test waits for an event; paused time makes this free
const EVENT_WAIT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Default)]
pub(crate) struct Microphone {
    capture_running: AtomicBool,
    detector_armed: AtomicBool,
    conflicts: AtomicUsize,
}

impl Microphone {
    pub(crate) fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    fn conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockCapture {
    mic: Arc<Microphone>,
    pub(crate) starts: AtomicUsize,
    pub(crate) stops: AtomicUsize,
    pub(crate) fail_start: AtomicBool,
    pub(crate) fail_stop: AtomicBool,
    next_file: AtomicUsize,
    events: broadcast::Sender<CaptureEvent>,
}

impl MockCapture {
    fn new(mic: Arc<Microphone>) -> Self {
        Self {
            mic,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
            next_file: AtomicUsize::new(0),
            events: broadcast::channel(16).0,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.mic.capture_running.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    async fn start(&self) -> Result<(), CaptureError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CaptureError::Busy("held by another application".into()));
        }
        if self.mic.capture_running.swap(true, Ordering::SeqCst) {
            self.mic.conflict();
            return Err(CaptureError::Busy("already capturing".into()));
        }
        if self.mic.detector_armed.load(Ordering::SeqCst) {
            self.mic.conflict();
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<PathBuf, CaptureError> {
        if !self.mic.capture_running.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::NotRunning);
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(CaptureError::Stream("device unplugged".into()));
        }
        let n = self.next_file.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(format!("/tmp/keyrec-test/capture-{n}.wav")))
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }
}

pub(crate) struct MockDetector {
    mic: Arc<Microphone>,
    pub(crate) arms: AtomicUsize,
    pub(crate) disarms: AtomicUsize,
    pub(crate) trains: AtomicUsize,
    pub(crate) fail_arm: AtomicBool,
    pub(crate) fail_train: AtomicBool,
    detections: broadcast::Sender<bool>,
}

impl MockDetector {
    fn new(mic: Arc<Microphone>) -> Self {
        Self {
            mic,
            arms: AtomicUsize::new(0),
            disarms: AtomicUsize::new(0),
            trains: AtomicUsize::new(0),
            fail_arm: AtomicBool::new(false),
            fail_train: AtomicBool::new(false),
            detections: broadcast::channel(16).0,
        }
    }

    /// Simulate the trigger phrase being heard
    pub(crate) fn detect(&self) {
        let _ = self.detections.send(true);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.mic.detector_armed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeywordDetector for MockDetector {
    async fn train(&self, sample: &Path, trigger_text: &str) -> Result<KeywordProfile, TrainError> {
        self.trains.fetch_add(1, Ordering::SeqCst);
        if self.fail_train.load(Ordering::SeqCst) {
            return Err(TrainError::BadSample("too quiet".into()));
        }
        Ok(KeywordProfile::new(trigger_text, sample.with_extension("model")))
    }

    async fn arm(&self, _profile: &KeywordProfile) -> Result<(), DetectorError> {
        if self.fail_arm.load(Ordering::SeqCst) {
            return Err(DetectorError::Arm("model missing".into()));
        }
        if self.mic.capture_running.load(Ordering::SeqCst) {
            self.mic.conflict();
        }
        self.mic.detector_armed.store(true, Ordering::SeqCst);
        self.arms.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disarm(&self) -> Result<(), DetectorError> {
        if self.mic.detector_armed.swap(false, Ordering::SeqCst) {
            self.disarms.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.detections.subscribe()
    }
}

#[derive(Default)]
pub(crate) struct MockLease {
    pub(crate) acquires: AtomicUsize,
    pub(crate) releases: AtomicUsize,
    pub(crate) deny: AtomicBool,
    held: AtomicBool,
}

impl MockLease {
    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundLease for MockLease {
    async fn acquire(&self) -> Result<(), LeaseError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(LeaseError::Denied("not allowed in tests".into()));
        }
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) -> Result<(), LeaseError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MockPower {
    status: Mutex<PowerStatus>,
    events: broadcast::Sender<PowerEvent>,
}

impl MockPower {
    fn new() -> Self {
        Self {
            status: Mutex::new(PowerStatus {
                battery_percent: Some(80),
                power_save: false,
            }),
            events: broadcast::channel(16).0,
        }
    }

    pub(crate) fn emit(&self, event: PowerEvent) {
        self.status.lock().unwrap().apply(event);
        let _ = self.events.send(event);
    }
}

impl PowerMonitor for MockPower {
    fn current(&self) -> PowerStatus {
        *self.status.lock().unwrap()
    }

    fn subscribe(&self) -> broadcast::Receiver<PowerEvent> {
        self.events.subscribe()
    }
}

#[derive(Default)]
pub(crate) struct MockNotifier {
    pub(crate) fail: AtomicBool,
    /// Never complete a delivery
    pub(crate) hang: AtomicBool,
    sent: Mutex<Vec<NotificationKind>>,
}

impl MockNotifier {
    pub(crate) fn sent(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for MockNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        _context: &NotificationContext,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(kind);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("no notification service".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) fail: AtomicBool,
    saved: Mutex<Vec<RecordingDescriptor>>,
}

impl MockStore {
    pub(crate) fn saved(&self) -> Vec<RecordingDescriptor> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordingStore for MockStore {
    async fn save(
        &self,
        descriptor: &RecordingDescriptor,
        _source: &Path,
    ) -> Result<RecordingId, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".into()));
        }
        self.saved.lock().unwrap().push(descriptor.clone());
        Ok(descriptor.id)
    }
}

/// An orchestrator wired to mock collaborators
pub(crate) struct Rig {
    pub(crate) handle: OrchestratorHandle,
    pub(crate) task: JoinHandle<()>,
    pub(crate) mic: Arc<Microphone>,
    pub(crate) capture: Arc<MockCapture>,
    pub(crate) detector: Arc<MockDetector>,
    pub(crate) lease: Arc<MockLease>,
    pub(crate) power: Arc<MockPower>,
    pub(crate) notifier: Arc<MockNotifier>,
    pub(crate) store: Arc<MockStore>,
}

pub(crate) fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        event_capacity: 4096,
        ..OrchestratorConfig::default()
    }
}

pub(crate) fn rig() -> Rig {
    rig_with(test_config())
}

pub(crate) fn rig_with(config: OrchestratorConfig) -> Rig {
    let mic = Arc::new(Microphone::default());
    let capture = Arc::new(MockCapture::new(Arc::clone(&mic)));
    let detector = Arc::new(MockDetector::new(Arc::clone(&mic)));
    let lease = Arc::new(MockLease::default());
    let power = Arc::new(MockPower::new());
    let notifier = Arc::new(MockNotifier::default());
    let store = Arc::new(MockStore::default());

    let collaborators = Collaborators {
        capture: capture.clone(),
        detector: detector.clone(),
        lease: lease.clone(),
        power: power.clone(),
        notifier: notifier.clone(),
        store: store.clone(),
    };
    let (handle, task) = Orchestrator::spawn(config, collaborators);

    Rig {
        handle,
        task,
        mic,
        capture,
        detector,
        lease,
        power,
        notifier,
        store,
    }
}

impl Rig {
    /// The mocks, for wiring a second orchestrator
    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            capture: self.capture.clone(),
            detector: self.detector.clone(),
            lease: self.lease.clone(),
            power: self.power.clone(),
            notifier: self.notifier.clone(),
            store: self.store.clone(),
        }
    }

    /// Register and activate a trained profile
    pub(crate) async fn with_profile(&self) -> KeywordProfile {
        let profile = KeywordProfile::new("hey recorder", "/tmp/keyrec-test/hey.model");
        self.handle
            .add_profile(profile.clone(), true)
            .await
            .expect("profile accepted");
        profile
    }

    /// Every acquire has exactly one matching release
    pub(crate) fn assert_balanced(&self) {
        let load = |n: &AtomicUsize| n.load(Ordering::SeqCst);
        assert_eq!(
            load(&self.capture.starts),
            load(&self.capture.stops),
            "capture start/stop"
        );
        assert_eq!(
            load(&self.detector.arms),
            load(&self.detector.disarms),
            "detector arm/disarm"
        );
        assert_eq!(
            load(&self.lease.acquires),
            load(&self.lease.releases),
            "lease acquire/release"
        );
        assert!(!self.capture.is_running());
        assert!(!self.detector.is_armed());
        assert!(!self.lease.is_held());
        assert_eq!(self.mic.conflicts(), 0, "microphone ownership overlapped");
    }
}

/// Wait for the next `Transitioned` event, skipping everything else
pub(crate) async fn next_transition(
    events: &mut broadcast::Receiver<StateEvent>,
) -> (OperationalState, OperationalState) {
    match next_event(events, |e| matches!(e, StateEvent::Transitioned { .. })).await {
        StateEvent::Transitioned { from, to, .. } => (from, to),
        _ => unreachable!(),
    }
}

/// Wait for the next event satisfying `matches`
pub(crate) async fn next_event(
    events: &mut broadcast::Receiver<StateEvent>,
    matches: impl Fn(&StateEvent) -> bool,
) -> StateEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream broken: {e}"),
            }
        }
    };
    tokio::time::timeout(EVENT_WAIT, wait)
        .await
        .expect("expected event never arrived")
}
