//! Typed failures returned by orchestrator commands

use std::time::Duration;

use thiserror::Error;

use crate::capability::{
    CaptureError, DetectorError, ProfileId, RecordingDescriptor, StoreError, TrainError,
};
use crate::state::StateKind;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no keyword profile is active")]
    NoActiveProfile,

    #[error("cannot start while {state}")]
    AlreadyBusy { state: StateKind },

    #[error("{command} is not valid while {state}")]
    InvalidState {
        state: StateKind,
        command: &'static str,
    },

    #[error("microphone unavailable: {0}")]
    CaptureUnavailable(#[source] CaptureError),

    #[error("capture failed: {0}")]
    CaptureFailed(#[source] CaptureError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Training(#[from] TrainError),

    #[error("recording bound must be between 1 ms and 24 h, got {0:?}")]
    InvalidBound(Duration),

    #[error("listening is paused: {0}")]
    PowerRestricted(&'static str),

    #[error("trigger text must not be empty")]
    InvalidTriggerText,

    #[error("recording {} was captured but not saved: {source}", .descriptor.id)]
    NotSaved {
        descriptor: RecordingDescriptor,
        #[source]
        source: StoreError,
    },

    #[error("unknown keyword profile {0}")]
    UnknownProfile(ProfileId),

    #[error("keyword profile {0} is in use by the armed detector")]
    ProfileInUse(ProfileId),

    #[error("orchestrator is not running")]
    Stopped,
}

impl OrchestratorError {
    /// Stable identifier used on the IPC wire
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveProfile => "no_active_profile",
            Self::AlreadyBusy { .. } => "already_busy",
            Self::InvalidState { .. } => "invalid_state",
            Self::CaptureUnavailable(_) => "capture_unavailable",
            Self::CaptureFailed(_) => "capture_failed",
            Self::Detector(_) => "detector_failed",
            Self::Training(_) => "training_failed",
            Self::InvalidBound(_) => "invalid_bound",
            Self::PowerRestricted(_) => "power_restricted",
            Self::InvalidTriggerText => "invalid_trigger_text",
            Self::NotSaved { .. } => "not_saved",
            Self::UnknownProfile(_) => "unknown_profile",
            Self::ProfileInUse(_) => "profile_in_use",
            Self::Stopped => "stopped",
        }
    }
}
