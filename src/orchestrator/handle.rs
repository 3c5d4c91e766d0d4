//! Cloneable client side of the orchestrator
//!
//! Commands are queued and answered in arrival order. Read-only queries are
//! served from watch channels and never wait behind an in-flight command.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::command::{Command, Reply};
use super::OrchestratorError;
use crate::capability::{
    CaptureLevel, KeywordProfile, PowerStatus, ProfileId, RecordingDescriptor,
};
use crate::events::StateEvent;
use crate::state::OperationalState;

/// Read-only snapshot of everything the orchestrator owns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    pub state: OperationalState,
    pub active_profile: Option<KeywordProfile>,
    pub profiles: Vec<KeywordProfile>,
    pub power: PowerStatus,
    pub lease_held: bool,
}

#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<Status>,
    remaining: watch::Receiver<Option<Duration>>,
    level: watch::Receiver<Option<CaptureLevel>>,
    events: broadcast::Sender<StateEvent>,
}

impl OrchestratorHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        status: watch::Receiver<Status>,
        remaining: watch::Receiver<Option<Duration>>,
        level: watch::Receiver<Option<CaptureLevel>>,
        events: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            commands,
            status,
            remaining,
            level,
            events,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, OrchestratorError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| OrchestratorError::Stopped)?;
        response.await.map_err(|_| OrchestratorError::Stopped)?
    }

    pub async fn arm_listening(&self) -> Result<(), OrchestratorError> {
        self.request(Command::ArmListening).await
    }

    /// Idempotent: a no-op when listening is not armed
    pub async fn disarm_listening(&self) -> Result<(), OrchestratorError> {
        self.request(Command::DisarmListening).await
    }

    pub async fn start_manual_recording(
        &self,
        bound: Option<Duration>,
    ) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::StartManualRecording { bound, reply })
            .await
    }

    pub async fn stop_manual_recording(&self) -> Result<RecordingDescriptor, OrchestratorError> {
        self.request(Command::StopManualRecording).await
    }

    pub async fn stop_auto_recording(&self) -> Result<RecordingDescriptor, OrchestratorError> {
        self.request(Command::StopAutoRecording).await
    }

    /// Stop whichever recording is active
    pub async fn stop_recording(&self) -> Result<RecordingDescriptor, OrchestratorError> {
        self.request(Command::StopRecording).await
    }

    pub async fn start_training_capture(&self) -> Result<(), OrchestratorError> {
        self.request(Command::StartTraining).await
    }

    pub async fn stop_training_capture_and_train(
        &self,
        trigger_text: impl Into<String>,
    ) -> Result<KeywordProfile, OrchestratorError> {
        let trigger_text = trigger_text.into();
        self.request(|reply| Command::FinishTraining {
            trigger_text,
            reply,
        })
        .await
    }

    /// Leave the error state
    pub async fn reset(&self) -> Result<(), OrchestratorError> {
        self.request(Command::Reset).await
    }

    /// Register an already trained profile
    pub async fn add_profile(
        &self,
        profile: KeywordProfile,
        activate: bool,
    ) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::AddProfile {
            profile,
            activate,
            reply,
        })
        .await
    }

    pub async fn activate_profile(&self, id: ProfileId) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::ActivateProfile { id, reply })
            .await
    }

    pub async fn delete_profile(&self, id: ProfileId) -> Result<(), OrchestratorError> {
        self.request(|reply| Command::DeleteProfile { id, reply })
            .await
    }

    /// Tear down the current state and stop the orchestrator
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done)).await.is_ok() {
            let _ = finished.await;
        }
    }

    pub fn state(&self) -> OperationalState {
        self.status.borrow().state.clone()
    }

    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    pub fn list_profiles(&self) -> Vec<KeywordProfile> {
        self.status.borrow().profiles.clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Remaining time while a bounded recording runs
    pub fn watch_remaining(&self) -> watch::Receiver<Option<Duration>> {
        self.remaining.clone()
    }

    /// Latest input level while capture is held
    pub fn watch_level(&self) -> watch::Receiver<Option<CaptureLevel>> {
        self.level.clone()
    }

    /// Every state event, in the order it was applied
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    #[cfg(test)]
    pub(crate) async fn deliver(&self, command: Command) {
        let _ = self.commands.send(command).await;
    }
}
