//! The orchestrator actor
//!
//! Owns the operational state and every resource tied to it. Commands are
//! processed one at a time from a single queue; detection, timer, capture and
//! power events are forwarded into the same queue so that nothing mutates
//! state outside of `handle`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::command::Command;
use super::handle::{OrchestratorHandle, Status};
use super::profiles::ProfileRegistry;
use super::scope::{StateScope, Subscription};
use super::OrchestratorError;
use crate::capability::{
    AudioCapture, BackgroundLease, CaptureError, CaptureEvent, CaptureLevel, KeywordDetector, KeywordProfile,
    NotificationSink, PowerEvent, PowerMonitor, PowerStatus, ProfileId, RecordingDescriptor,
    RecordingStore, TriggerKind,
};
use crate::config::{OrchestratorConfig, MAX_RECORDING_BOUND};
use crate::events::{NotificationContext, NotificationKind, StateEvent};
use crate::lease::LeaseController;
use crate::state::{OperationalState, StateKind, Trigger};
use crate::timer::{AutoStopTimer, TimerSignal};

/// External capabilities the orchestrator coordinates
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn AudioCapture>,
    pub detector: Arc<dyn KeywordDetector>,
    pub lease: Arc<dyn BackgroundLease>,
    pub power: Arc<dyn PowerMonitor>,
    pub notifier: Arc<dyn NotificationSink>,
    pub store: Arc<dyn RecordingStore>,
}

/// Capture held for the current state
#[derive(Debug)]
struct CaptureSession {
    /// `None` for a training sample
    trigger: Option<TriggerKind>,
    started_at: Instant,
}

impl CaptureSession {
    fn new(trigger: Option<TriggerKind>) -> Self {
        Self {
            trigger,
            started_at: Instant::now(),
        }
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    capture: Arc<dyn AudioCapture>,
    detector: Arc<dyn KeywordDetector>,
    power: Arc<dyn PowerMonitor>,
    notifier: Arc<dyn NotificationSink>,
    store: Arc<dyn RecordingStore>,
    lease: LeaseController,

    state: OperationalState,
    state_entered_at: Instant,
    profiles: ProfileRegistry,
    power_status: PowerStatus,
    /// Power events, tracked for the actor's whole lifetime
    power_feed: Option<Subscription>,
    scope: StateScope,
    session: Option<CaptureSession>,
    /// Bumped on every state entry that opens subscriptions
    generation: u64,

    commands: mpsc::WeakSender<Command>,
    status_tx: watch::Sender<Status>,
    remaining_tx: watch::Sender<Option<Duration>>,
    level_tx: watch::Sender<Option<CaptureLevel>>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl Orchestrator {
    /// Start the orchestrator on the current runtime
    pub fn spawn(
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_queue_depth.max(1));
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        let power_status = collaborators.power.current();
        let (status_tx, status_rx) = watch::channel(Status {
            power: power_status,
            ..Status::default()
        });
        let (remaining_tx, remaining_rx) = watch::channel(None);
        let (level_tx, level_rx) = watch::channel(None);

        let mut actor = Orchestrator {
            lease: LeaseController::with_timeout(collaborators.lease, config.lease_timeout),
            config,
            capture: collaborators.capture,
            detector: collaborators.detector,
            power: collaborators.power,
            notifier: collaborators.notifier,
            store: collaborators.store,
            state: OperationalState::Idle,
            state_entered_at: Instant::now(),
            profiles: ProfileRegistry::default(),
            power_status,
            power_feed: None,
            scope: StateScope::default(),
            session: None,
            generation: 0,
            commands: command_tx.downgrade(),
            status_tx,
            remaining_tx,
            level_tx,
            event_tx: event_tx.clone(),
        };

        let power_feed = actor.forward("power", actor.power.subscribe(), |event| {
            Some(Command::Power { event })
        });
        actor.power_feed = Some(power_feed);

        let handle = OrchestratorHandle::new(command_tx, status_rx, remaining_rx, level_rx, event_tx);
        let task = tokio::spawn(actor.run(command_rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("orchestrator started in Idle state");

        let mut shutdown_reply = None;
        while let Some(command) = commands.recv().await {
            if let Command::Shutdown(reply) = command {
                shutdown_reply = Some(reply);
                break;
            }
            self.handle(command).await;
        }

        self.dispose().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }

        info!("orchestrator stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::ArmListening(reply) => {
                let _ = reply.send(self.arm_listening().await);
            }
            Command::DisarmListening(reply) => {
                let _ = reply.send(self.disarm_listening().await);
            }
            Command::StartManualRecording { bound, reply } => {
                let _ = reply.send(self.start_manual_recording(bound).await);
            }
            Command::StopManualRecording(reply) => {
                let result = self.stop_recording_in(StateKind::ManualRecording, "stop_manual_recording");
                let _ = reply.send(result.await);
            }
            Command::StopAutoRecording(reply) => {
                let result = self.stop_recording_in(StateKind::AutoRecording, "stop_auto_recording");
                let _ = reply.send(result.await);
            }
            Command::StopRecording(reply) => {
                let kind = self.state.kind();
                let result = self.stop_recording_in(kind, "stop_recording").await;
                let _ = reply.send(result);
            }
            Command::StartTraining(reply) => {
                let _ = reply.send(self.start_training_capture().await);
            }
            Command::FinishTraining {
                trigger_text,
                reply,
            } => {
                let _ = reply.send(self.stop_training_capture_and_train(&trigger_text).await);
            }
            Command::Reset(reply) => {
                let _ = reply.send(self.reset());
            }
            Command::AddProfile {
                profile,
                activate,
                reply,
            } => {
                let _ = reply.send(self.add_profile(profile, activate));
            }
            Command::ActivateProfile { id, reply } => {
                let _ = reply.send(self.activate_profile(id));
            }
            Command::DeleteProfile { id, reply } => {
                let _ = reply.send(self.delete_profile(id));
            }
            Command::Shutdown(reply) => {
                // handled by the run loop
                let _ = reply.send(());
            }
            Command::KeywordDetected { generation } => self.on_keyword_detected(generation).await,
            Command::TimerTick {
                timer_id,
                remaining,
            } => self.on_timer_tick(timer_id, remaining),
            Command::TimerExpired { timer_id } => self.on_timer_expired(timer_id).await,
            Command::CaptureLevel { generation, level } => {
                if generation == self.generation && self.state.holds_capture() {
                    self.level_tx.send_replace(Some(level));
                }
            }
            Command::CaptureFailed { generation, error } => {
                self.on_capture_failure(generation, error).await
            }
            Command::Power { event } => self.on_power_event(event).await,
        }
    }

    // ---- listening ----

    async fn arm_listening(&mut self) -> Result<(), OrchestratorError> {
        let kind = self.state.kind();
        if kind == StateKind::ListeningArmed {
            debug!("keyword listening already armed");
            return Ok(());
        }
        if kind.next(Trigger::ArmListening).is_none() {
            return Err(self.busy("arm_listening"));
        }

        let profile = self
            .profiles
            .active()
            .cloned()
            .ok_or(OrchestratorError::NoActiveProfile)?;

        let current = self.power.current();
        if current != self.power_status {
            self.power_status = current;
            self.publish_status();
        }
        if let Some(reason) = self.power_pause_reason() {
            info!(reason, "keyword listening not armed");
            return Err(OrchestratorError::PowerRestricted(reason));
        }

        self.lease.acquire().await;

        let detections = self.detector.subscribe();
        if let Err(e) = self.detector.arm(&profile).await {
            warn!(error = %e, profile = %profile.id, "keyword detector failed to arm");
            self.lease.release().await;
            self.publish_status();
            return Err(e.into());
        }

        self.generation += 1;
        let generation = self.generation;
        let subscription = self.forward("detector", detections, move |detected: bool| {
            detected.then_some(Command::KeywordDetected { generation })
        });
        self.scope.open(subscription);

        info!(
            profile = %profile.id,
            trigger_text = %profile.trigger_text,
            lease_held = self.lease.is_held(),
            "keyword listening armed"
        );
        self.transition_to(OperationalState::ListeningArmed);
        self.notify(NotificationKind::ListeningStarted, self.context())
            .await;
        Ok(())
    }

    async fn disarm_listening(&mut self) -> Result<(), OrchestratorError> {
        if self.state.kind() != StateKind::ListeningArmed {
            debug!(state = %self.state.kind(), "disarm ignored, listening not armed");
            return Ok(());
        }
        self.leave_listening().await;
        self.notify(NotificationKind::ListeningStopped, self.context())
            .await;
        Ok(())
    }

    /// Tear down everything `arm_listening` set up and return to Idle
    async fn leave_listening(&mut self) {
        self.scope.close();
        if let Err(e) = self.detector.disarm().await {
            warn!(error = %e, "keyword detector failed to disarm");
        }
        self.lease.release().await;
        self.transition_to(OperationalState::Idle);
    }

    async fn on_keyword_detected(&mut self, generation: u64) {
        let kind = self.state.kind();
        if kind.next(Trigger::KeywordDetected).is_none() || generation != self.generation {
            info!(state = %kind, "keyword detection ignored");
            self.emit(StateEvent::KeywordIgnored { state: kind });
            return;
        }

        info!("keyword detected, starting auto recording");

        self.scope.close();
        if let Err(e) = self.detector.disarm().await {
            warn!(error = %e, "keyword detector failed to disarm before recording");
        }

        let capture_events = self.capture.subscribe();
        if let Err(e) = self.capture.start().await {
            error!(error = %e, "microphone unavailable after keyword detection");
            self.lease.release().await;
            self.transition_to(OperationalState::error(format!(
                "microphone unavailable: {e}"
            )));
            self.notify(
                NotificationKind::Failure,
                self.context().with_detail(e.to_string()),
            )
            .await;
            return;
        }

        let bound = self.config.auto_record_duration;
        self.enter_capture(capture_events, Some(TriggerKind::Keyword), Some(bound));
        self.transition_to(OperationalState::AutoRecording { remaining: bound });
        self.notify(
            NotificationKind::RecordingStarted,
            self.context().with_trigger(TriggerKind::Keyword),
        )
        .await;
    }

    // ---- recording ----

    async fn start_manual_recording(
        &mut self,
        bound: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        if self.state.kind().next(Trigger::StartManualRecording).is_none() {
            return Err(self.busy("start_manual_recording"));
        }

        let bound = bound.or(self.config.max_manual_duration);
        if let Some(bound) = bound {
            if bound.is_zero() || bound > MAX_RECORDING_BOUND {
                return Err(OrchestratorError::InvalidBound(bound));
            }
        }
        let capture_events = self.capture.subscribe();
        self.capture.start().await.map_err(|e| {
            warn!(error = %e, "microphone unavailable for manual recording");
            OrchestratorError::CaptureUnavailable(e)
        })?;

        self.enter_capture(capture_events, Some(TriggerKind::Manual), bound);
        self.transition_to(OperationalState::ManualRecording { remaining: bound });
        self.notify(
            NotificationKind::RecordingStarted,
            self.context().with_trigger(TriggerKind::Manual),
        )
        .await;
        Ok(())
    }

    async fn stop_recording_in(
        &mut self,
        expected: StateKind,
        command: &'static str,
    ) -> Result<RecordingDescriptor, OrchestratorError> {
        let kind = self.state.kind();
        let trigger = match expected {
            StateKind::ManualRecording => Trigger::StopManualRecording,
            _ => Trigger::StopAutoRecording,
        };
        if kind != expected || kind.next(trigger).is_none() {
            return Err(OrchestratorError::InvalidState {
                state: kind,
                command,
            });
        }
        self.finish_recording(true).await
    }

    fn on_timer_tick(&mut self, timer_id: u64, remaining: Duration) {
        if self.scope.timer_id() != Some(timer_id) {
            debug!(timer_id, "tick from stale timer ignored");
            return;
        }
        self.state = self.state.with_remaining(remaining);
        self.remaining_tx.send_replace(Some(remaining));
        self.publish_status();
        self.emit(StateEvent::RemainingTime {
            remaining_ms: remaining.as_millis() as u64,
        });
    }

    async fn on_timer_expired(&mut self, timer_id: u64) {
        if self.scope.timer_id() != Some(timer_id) {
            debug!(timer_id, "expiry of cancelled timer ignored");
            return;
        }
        if self.state.kind().next(Trigger::TimerExpired).is_none() {
            return;
        }

        info!(state = %self.state.kind(), "recording bound reached");
        if let Err(e) = self.finish_recording(true).await {
            warn!(error = %e, "recording stopped by timer did not complete cleanly");
        }
    }

    /// Stop the active recording, persist it and return to Idle.
    ///
    /// Capture and lease are always released, even when saving fails.
    async fn finish_recording(
        &mut self,
        allow_rearm: bool,
    ) -> Result<RecordingDescriptor, OrchestratorError> {
        let was = self.state.kind();
        let session = self.session.take();
        self.leave_capture();

        let stopped = self.capture.stop().await;
        if was == StateKind::AutoRecording {
            self.lease.release().await;
        }

        let path = match stopped {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "capture failed to stop cleanly");
                self.transition_to(OperationalState::error(format!("capture failed: {e}")));
                self.notify(
                    NotificationKind::Failure,
                    self.context().with_detail(e.to_string()),
                )
                .await;
                return Err(OrchestratorError::CaptureFailed(e));
            }
        };

        let trigger = session
            .as_ref()
            .and_then(|s| s.trigger)
            .unwrap_or(match was {
                StateKind::AutoRecording => TriggerKind::Keyword,
                _ => TriggerKind::Manual,
            });
        let duration = session
            .map(|s| s.started_at.elapsed())
            .unwrap_or_default();
        let descriptor = RecordingDescriptor::new(path.clone(), duration, trigger);

        let saved = self.store.save(&descriptor, &path).await;
        let result = match saved {
            Ok(id) => {
                info!(
                    recording = %id,
                    trigger = %trigger,
                    duration_ms = duration.as_millis() as u64,
                    "recording saved"
                );
                self.emit(StateEvent::RecordingSaved {
                    descriptor: descriptor.clone(),
                });
                Ok(descriptor)
            }
            Err(e) => {
                error!(error = %e, recording = %descriptor.id, "recording captured but not saved");
                self.emit(StateEvent::RecordingNotSaved {
                    descriptor: descriptor.clone(),
                    reason: e.to_string(),
                });
                Err(OrchestratorError::NotSaved {
                    descriptor,
                    source: e,
                })
            }
        };

        self.transition_to(OperationalState::Idle);

        let (kind, context) = match &result {
            Ok(descriptor) => (
                NotificationKind::RecordingSaved,
                self.context()
                    .with_trigger(trigger)
                    .with_recording(descriptor.id),
            ),
            Err(e) => (
                NotificationKind::RecordingNotSaved,
                self.context().with_trigger(trigger).with_detail(e.to_string()),
            ),
        };
        self.notify(kind, context).await;

        if allow_rearm && was == StateKind::AutoRecording && self.config.rearm_after_auto_recording
        {
            info!("re-arming keyword listening after auto recording");
            if let Err(e) = self.arm_listening().await {
                warn!(error = %e, "failed to re-arm keyword listening");
            }
        }

        result
    }

    // ---- training ----

    async fn start_training_capture(&mut self) -> Result<(), OrchestratorError> {
        if self.state.kind().next(Trigger::StartTraining).is_none() {
            return Err(self.busy("start_training_capture"));
        }

        let capture_events = self.capture.subscribe();
        self.capture.start().await.map_err(|e| {
            warn!(error = %e, "microphone unavailable for keyword training");
            OrchestratorError::CaptureUnavailable(e)
        })?;

        self.enter_capture(capture_events, None, None);
        self.transition_to(OperationalState::TrainingKeyword);
        self.notify(NotificationKind::TrainingStarted, self.context())
            .await;
        Ok(())
    }

    async fn stop_training_capture_and_train(
        &mut self,
        trigger_text: &str,
    ) -> Result<KeywordProfile, OrchestratorError> {
        let kind = self.state.kind();
        if kind.next(Trigger::FinishTraining).is_none() {
            return Err(OrchestratorError::InvalidState {
                state: kind,
                command: "stop_training_capture_and_train",
            });
        }
        let trigger_text = trigger_text.trim();
        if trigger_text.is_empty() {
            return Err(OrchestratorError::InvalidTriggerText);
        }

        self.session = None;
        self.leave_capture();
        let sample = match self.capture.stop().await {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "training capture failed to stop cleanly");
                self.transition_to(OperationalState::error(format!("capture failed: {e}")));
                return Err(OrchestratorError::CaptureFailed(e));
            }
        };
        self.transition_to(OperationalState::Idle);

        let profile = self
            .detector
            .train(&sample, trigger_text)
            .await
            .map_err(|e| {
                warn!(error = %e, sample = %sample.display(), "keyword training failed");
                OrchestratorError::from(e)
            })?;

        info!(profile = %profile.id, trigger_text, "keyword profile trained");
        self.profiles.insert(profile.clone(), true);
        self.publish_status();
        self.emit(StateEvent::ProfileTrained {
            profile: profile.clone(),
        });
        self.notify(
            NotificationKind::ProfileTrained,
            self.context().with_detail(profile.trigger_text.clone()),
        )
        .await;
        Ok(profile)
    }

    // ---- failures and recovery ----

    async fn on_capture_failure(&mut self, generation: u64, failure: CaptureError) {
        let kind = self.state.kind();
        if generation != self.generation || kind.next(Trigger::CaptureFailed).is_none() {
            debug!(state = %kind, error = %failure, "stale capture failure ignored");
            return;
        }

        error!(state = %kind, error = %failure, "capture failed mid-session");
        self.session = None;
        self.leave_capture();
        if let Err(e) = self.capture.stop().await {
            debug!(error = %e, "forced capture release reported an error");
        }
        self.lease.release().await;

        self.transition_to(OperationalState::error(failure.to_string()));
        self.notify(
            NotificationKind::Failure,
            self.context().with_detail(failure.to_string()),
        )
        .await;
    }

    fn reset(&mut self) -> Result<(), OrchestratorError> {
        match self.state.kind() {
            StateKind::Idle => Ok(()),
            kind if kind.next(Trigger::Reset).is_some() => {
                info!("recovering from error state");
                self.transition_to(OperationalState::Idle);
                Ok(())
            }
            kind => Err(OrchestratorError::InvalidState {
                state: kind,
                command: "reset",
            }),
        }
    }

    // ---- power ----

    async fn on_power_event(&mut self, event: PowerEvent) {
        if self.power_status.apply(event) {
            debug!(?event, "power status changed");
            self.publish_status();
            self.emit(StateEvent::PowerChanged {
                status: self.power_status,
            });
        }

        if self.state.kind() != StateKind::ListeningArmed {
            return;
        }

        if let Some(reason) = self.power_pause_reason() {
            info!(reason, "pausing keyword listening");
            self.leave_listening().await;
            self.notify(
                NotificationKind::ListeningPaused,
                self.context().with_detail(reason),
            )
            .await;
        }
    }

    /// Why listening may not run under the current power conditions
    fn power_pause_reason(&self) -> Option<&'static str> {
        if self.config.pause_on_power_save && self.power_status.power_save {
            Some("power-save mode enabled")
        } else if self.power_status.is_low(self.config.low_battery_percent) {
            Some("battery low")
        } else {
            None
        }
    }

    // ---- profiles ----

    fn add_profile(&mut self, profile: KeywordProfile, activate: bool) -> Result<(), OrchestratorError> {
        if activate {
            self.ensure_profile_switchable()?;
        }
        info!(profile = %profile.id, activate, "keyword profile added");
        self.profiles.insert(profile, activate);
        self.publish_status();
        Ok(())
    }

    fn activate_profile(&mut self, id: ProfileId) -> Result<(), OrchestratorError> {
        if !self.profiles.contains(id) {
            return Err(OrchestratorError::UnknownProfile(id));
        }
        if self.profiles.is_active(id) {
            return Ok(());
        }
        self.ensure_profile_switchable()?;
        self.profiles.activate(id);
        self.publish_status();
        Ok(())
    }

    fn delete_profile(&mut self, id: ProfileId) -> Result<(), OrchestratorError> {
        if !self.profiles.contains(id) {
            return Err(OrchestratorError::UnknownProfile(id));
        }
        if self.profiles.is_active(id) && self.state.kind() == StateKind::ListeningArmed {
            return Err(OrchestratorError::ProfileInUse(id));
        }
        self.profiles.remove(id);
        info!(profile = %id, "keyword profile deleted");
        self.publish_status();
        self.emit(StateEvent::ProfileDeleted { id });
        Ok(())
    }

    fn ensure_profile_switchable(&self) -> Result<(), OrchestratorError> {
        match self.state.kind() {
            StateKind::ListeningArmed => Err(OrchestratorError::AlreadyBusy {
                state: StateKind::ListeningArmed,
            }),
            _ => Ok(()),
        }
    }

    // ---- shutdown ----

    /// Release everything held by the current state
    async fn dispose(&mut self) {
        match self.state.kind() {
            StateKind::ListeningArmed => self.leave_listening().await,
            StateKind::ManualRecording | StateKind::AutoRecording => {
                if let Err(e) = self.finish_recording(false).await {
                    warn!(error = %e, "recording interrupted by shutdown");
                }
            }
            StateKind::TrainingKeyword => {
                self.session = None;
                self.leave_capture();
                match self.capture.stop().await {
                    Ok(sample) => debug!(sample = %sample.display(), "training sample discarded"),
                    Err(e) => warn!(error = %e, "training capture failed to stop"),
                }
                self.transition_to(OperationalState::Idle);
            }
            StateKind::Idle | StateKind::Error => {}
        }

        self.scope.close();
        self.power_feed = None;
        self.lease.release().await;
        self.publish_status();
    }

    // ---- plumbing ----

    /// Register a freshly acquired capture and its event stream
    fn enter_capture(
        &mut self,
        events: broadcast::Receiver<CaptureEvent>,
        trigger: Option<TriggerKind>,
        bound: Option<Duration>,
    ) {
        self.generation += 1;
        let generation = self.generation;
        self.session = Some(CaptureSession::new(trigger));

        let subscription = self.forward("capture", events, move |event| match event {
            CaptureEvent::Level(level) => Some(Command::CaptureLevel { generation, level }),
            CaptureEvent::Failed(error) => Some(Command::CaptureFailed { generation, error }),
        });
        self.scope.open(subscription);

        if let Some(bound) = bound {
            let (timer, signals) = AutoStopTimer::new(bound)
                .with_period(self.config.tick_period)
                .start();
            let subscription = self.forward_timer(timer.id(), signals);
            self.scope.set_timer(timer);
            self.scope.open(subscription);
            self.remaining_tx.send_replace(Some(bound));
        }
    }

    fn leave_capture(&mut self) {
        self.scope.close();
        self.remaining_tx.send_replace(None);
        self.level_tx.send_replace(None);
    }

    /// Spawn a task converting a broadcast stream into queued commands
    fn forward<T, F>(
        &self,
        source: &'static str,
        mut events: broadcast::Receiver<T>,
        to_command: F,
    ) -> Subscription
    where
        T: Clone + Send + 'static,
        F: Fn(T) -> Option<Command> + Send + 'static,
    {
        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(command) = to_command(event) else {
                            continue;
                        };
                        let Some(tx) = commands.upgrade() else {
                            break;
                        };
                        if tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(source, skipped = n, "subscription lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(source, "subscription source closed");
                        break;
                    }
                }
            }
        });
        Subscription::new(source, task)
    }

    fn forward_timer(&self, timer_id: u64, mut signals: mpsc::Receiver<TimerSignal>) -> Subscription {
        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let command = match signal {
                    TimerSignal::Tick(remaining) => Command::TimerTick {
                        timer_id,
                        remaining,
                    },
                    TimerSignal::Completed => Command::TimerExpired { timer_id },
                };
                let Some(tx) = commands.upgrade() else {
                    break;
                };
                if tx.send(command).await.is_err() {
                    break;
                }
            }
        });
        Subscription::new("timer", task)
    }

    /// Rejection for a start command that is not accepted from the current state
    fn busy(&self, command: &'static str) -> OrchestratorError {
        match self.state.kind() {
            state @ (StateKind::Idle | StateKind::Error) => {
                OrchestratorError::InvalidState { state, command }
            }
            state => OrchestratorError::AlreadyBusy { state },
        }
    }

    /// Perform a state transition
    fn transition_to(&mut self, next: OperationalState) {
        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;
        let previous = std::mem::replace(&mut self.state, next);

        info!(
            from = %previous,
            to = %self.state,
            duration_ms,
            "state transition"
        );

        if matches!(self.state.kind(), StateKind::Idle | StateKind::Error) {
            debug_assert!(
                self.scope.is_empty(),
                "resources still open on entering {}",
                self.state
            );
        }

        self.state_entered_at = Instant::now();
        if self.state.remaining().is_none() {
            self.remaining_tx.send_replace(None);
        }
        self.publish_status();
        self.emit(StateEvent::Transitioned {
            from: previous,
            to: self.state.clone(),
            duration_ms,
        });
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(Status {
            state: self.state.clone(),
            active_profile: self.profiles.active().cloned(),
            profiles: self.profiles.list().to_vec(),
            power: self.power_status,
            lease_held: self.lease.is_held(),
        });
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting state event");
        let _ = self.event_tx.send(event);
    }

    fn context(&self) -> NotificationContext {
        NotificationContext::new(&self.state)
    }

    /// Best-effort and bounded: failures and timeouts are logged, never propagated
    async fn notify(&self, kind: NotificationKind, context: NotificationContext) {
        let delivery = self.notifier.notify(kind, &context);
        match time::timeout(self.config.notify_timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(?kind, error = %e, "notification failed"),
            Err(_) => warn!(
                ?kind,
                timeout_ms = self.config.notify_timeout.as_millis() as u64,
                "notification timed out"
            ),
        }
    }
}
