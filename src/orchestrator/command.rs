//! Commands accepted by the orchestrator's serialized queue
//!
//! User-facing commands carry a reply channel. Internal commands are produced
//! by subscription forwarders and carry the generation or timer id they were
//! opened under, so events from a state that has since been left are
//! recognised as stale.

use std::time::Duration;

use tokio::sync::oneshot;

use super::OrchestratorError;
use crate::capability::{
    CaptureError, CaptureLevel, KeywordProfile, PowerEvent, ProfileId, RecordingDescriptor,
};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, OrchestratorError>>;

#[derive(Debug)]
pub(crate) enum Command {
    ArmListening(Reply<()>),
    DisarmListening(Reply<()>),
    StartManualRecording {
        bound: Option<Duration>,
        reply: Reply<()>,
    },
    StopManualRecording(Reply<RecordingDescriptor>),
    StopAutoRecording(Reply<RecordingDescriptor>),
    StopRecording(Reply<RecordingDescriptor>),
    StartTraining(Reply<()>),
    FinishTraining {
        trigger_text: String,
        reply: Reply<KeywordProfile>,
    },
    Reset(Reply<()>),
    AddProfile {
        profile: KeywordProfile,
        activate: bool,
        reply: Reply<()>,
    },
    ActivateProfile {
        id: ProfileId,
        reply: Reply<()>,
    },
    DeleteProfile {
        id: ProfileId,
        reply: Reply<()>,
    },
    Shutdown(oneshot::Sender<()>),

    KeywordDetected {
        generation: u64,
    },
    TimerTick {
        timer_id: u64,
        remaining: Duration,
    },
    TimerExpired {
        timer_id: u64,
    },
    CaptureLevel {
        generation: u64,
        level: CaptureLevel,
    },
    CaptureFailed {
        generation: u64,
        error: CaptureError,
    },
    Power {
        event: PowerEvent,
    },
}
