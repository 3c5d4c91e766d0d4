//! Events module for orchestrator observers
//!
//! Provides the structured event stream published on every state
//! transition, plus the notification kinds handed to the notification sink.

use serde::{Deserialize, Serialize};

use crate::capability::{
    KeywordProfile, PowerStatus, ProfileId, RecordingDescriptor, RecordingId, TriggerKind,
};
use crate::state::{OperationalState, StateKind};

/// Events emitted by the orchestrator, in the order they are applied
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// The operational state changed
    Transitioned {
        from: OperationalState,
        to: OperationalState,
        /// Time spent in `from`, in milliseconds
        duration_ms: u64,
    },

    /// Countdown tick of a bounded recording
    RemainingTime { remaining_ms: u64 },

    /// A finished recording was persisted
    RecordingSaved { descriptor: RecordingDescriptor },

    /// Audio was captured but the store rejected it
    RecordingNotSaved {
        descriptor: RecordingDescriptor,
        reason: String,
    },

    /// Training produced a new, now active, profile
    ProfileTrained { profile: KeywordProfile },

    /// A profile was removed
    ProfileDeleted { id: ProfileId },

    /// A keyword detection arrived outside of `ListeningArmed`
    KeywordIgnored { state: StateKind },

    /// Battery level or power-save mode changed
    PowerChanged { status: PowerStatus },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::Transitioned { from, to, duration_ms } => {
                write!(f, "TRANSITIONED {} -> {} ({}ms)", from.kind(), to.kind(), duration_ms)
            }
            StateEvent::RemainingTime { remaining_ms } => {
                write!(f, "REMAINING_TIME ({}ms)", remaining_ms)
            }
            StateEvent::RecordingSaved { descriptor } => {
                write!(f, "RECORDING_SAVED ({})", descriptor.id)
            }
            StateEvent::RecordingNotSaved { descriptor, .. } => {
                write!(f, "RECORDING_NOT_SAVED ({})", descriptor.id)
            }
            StateEvent::ProfileTrained { profile } => {
                write!(f, "PROFILE_TRAINED ({})", profile.trigger_text)
            }
            StateEvent::ProfileDeleted { id } => write!(f, "PROFILE_DELETED ({})", id),
            StateEvent::KeywordIgnored { state } => write!(f, "KEYWORD_IGNORED ({})", state),
            StateEvent::PowerChanged { .. } => write!(f, "POWER_CHANGED"),
        }
    }
}

/// What a user-visible notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ListeningStarted,
    ListeningStopped,
    /// Listening was disarmed by the power policy
    ListeningPaused,
    RecordingStarted,
    RecordingSaved,
    RecordingNotSaved,
    TrainingStarted,
    ProfileTrained,
    Failure,
}

/// Details accompanying a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub state: OperationalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording: Option<RecordingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NotificationContext {
    pub fn new(state: &OperationalState) -> Self {
        Self {
            state: state.clone(),
            trigger: None,
            recording: None,
            detail: None,
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_recording(mut self, id: RecordingId) -> Self {
        self.recording = Some(id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
