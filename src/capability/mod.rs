//! Capability interfaces consumed by the orchestrator
//!
//! Microphone access, keyword matching, background execution, power state,
//! notifications and persistence are all provided by collaborators behind
//! these traits. The orchestrator is the only caller of the mutating methods.

mod model;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::events::{NotificationContext, NotificationKind};

pub use model::{
    CaptureEvent, CaptureLevel, KeywordProfile, PowerEvent, PowerStatus, ProfileId,
    RecordingDescriptor, RecordingId, TriggerKind, DEFAULT_CONFIDENCE_THRESHOLD,
};

/// Errors reported by the audio capture gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no input device available")]
    NoDevice,

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("microphone is in use: {0}")]
    Busy(String),

    #[error("capture stream failed: {0}")]
    Stream(String),

    #[error("capture is not running")]
    NotRunning,
}

/// Errors reported by the keyword detector when arming or disarming
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectorError {
    #[error("failed to arm keyword detector: {0}")]
    Arm(String),

    #[error("failed to disarm keyword detector: {0}")]
    Disarm(String),
}

/// Errors reported while training a keyword profile
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrainError {
    #[error("training sample is unusable: {0}")]
    BadSample(String),

    #[error("training engine failed: {0}")]
    Engine(String),
}

/// Errors reported by the platform background lease
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("background execution is not supported on this platform")]
    Unsupported,

    #[error("background lease denied: {0}")]
    Denied(String),
}

/// Errors reported by the notification sink
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Errors reported by the recording store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("recording source file missing: {0}")]
    MissingSource(PathBuf),

    #[error("recording store I/O error: {0}")]
    Io(String),

    #[error("failed to encode recording metadata: {0}")]
    Encode(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Encode(e.to_string())
    }
}

/// Exclusive microphone capture
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Begin capturing into a new file
    async fn start(&self) -> Result<(), CaptureError>;

    /// Stop capturing and return the file that was written
    async fn stop(&self) -> Result<PathBuf, CaptureError>;

    /// Level and failure events of the running capture
    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent>;
}

/// Trigger phrase matching
#[async_trait]
pub trait KeywordDetector: Send + Sync {
    /// Train a profile from a recorded sample
    async fn train(&self, sample: &Path, trigger_text: &str)
        -> Result<KeywordProfile, TrainError>;

    /// Start matching against `profile`
    async fn arm(&self, profile: &KeywordProfile) -> Result<(), DetectorError>;

    /// Stop matching and release the detector's own capture loop
    async fn disarm(&self) -> Result<(), DetectorError>;

    /// Detection stream; `true` means the trigger phrase was heard
    fn subscribe(&self) -> broadcast::Receiver<bool>;
}

/// Platform grant that keeps capture alive while the app is not foregrounded
#[async_trait]
pub trait BackgroundLease: Send + Sync {
    async fn acquire(&self) -> Result<(), LeaseError>;
    async fn release(&self) -> Result<(), LeaseError>;
}

/// Read-only battery and power-save observation
pub trait PowerMonitor: Send + Sync {
    fn current(&self) -> PowerStatus;
    fn subscribe(&self) -> broadcast::Receiver<PowerEvent>;
}

/// User-visible notifications. Delivery is best-effort.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> Result<(), NotifyError>;
}

/// Persistence for finished recordings
#[async_trait]
pub trait RecordingStore: Send + Sync {
    async fn save(
        &self,
        descriptor: &RecordingDescriptor,
        source: &Path,
    ) -> Result<RecordingId, StoreError>;
}
