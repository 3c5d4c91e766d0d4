//! Data exchanged between the orchestrator and its collaborators

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CaptureError;
use crate::state::millis;

pub type ProfileId = Uuid;
pub type RecordingId = Uuid;

/// Default match threshold for freshly trained profiles
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// A trained trigger phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordProfile {
    pub id: ProfileId,
    /// The phrase the user trained
    pub trigger_text: String,
    /// Reference to the detector's trained model
    pub model_path: PathBuf,
    /// Minimum detector confidence for a match (0.0..=1.0)
    pub threshold: f32,
    pub trained_at: DateTime<Utc>,
}

impl KeywordProfile {
    pub fn new(trigger_text: impl Into<String>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_text: trigger_text.into(),
            model_path: model_path.into(),
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            trained_at: Utc::now(),
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

/// What started a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Keyword,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Manual => write!(f, "manual"),
            TriggerKind::Keyword => write!(f, "keyword"),
        }
    }
}

/// Metadata for a finished capture session. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingDescriptor {
    pub id: RecordingId,
    /// Audio file produced by the capture gateway
    pub source_path: PathBuf,
    #[serde(rename = "duration_ms", with = "millis")]
    pub duration: Duration,
    pub trigger: TriggerKind,
    pub created_at: DateTime<Utc>,
}

impl RecordingDescriptor {
    pub fn new(source_path: PathBuf, duration: Duration, trigger: TriggerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path,
            duration,
            trigger,
            created_at: Utc::now(),
        }
    }
}

/// Live input level reported while capture is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureLevel {
    /// Root mean square amplitude (0.0..=1.0)
    pub rms: f32,
    /// Peak amplitude (0.0..=1.0)
    pub peak: f32,
}

/// Events published by the audio capture gateway
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Level(CaptureLevel),
    /// The running capture broke and cannot continue
    Failed(CaptureError),
}

/// Events published by the power monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PowerEvent {
    /// Battery level in percent (0-100)
    BatteryLevel(u8),
    PowerSaveMode(bool),
}

/// Latest known power conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerStatus {
    pub battery_percent: Option<u8>,
    pub power_save: bool,
}

impl PowerStatus {
    /// Fold an event into the status. Returns whether anything changed.
    pub fn apply(&mut self, event: PowerEvent) -> bool {
        let before = *self;
        match event {
            PowerEvent::BatteryLevel(level) => self.battery_percent = Some(level.min(100)),
            PowerEvent::PowerSaveMode(enabled) => self.power_save = enabled,
        }
        before != *self
    }

    /// Whether the battery is at or below `threshold` percent
    pub fn is_low(&self, threshold: u8) -> bool {
        threshold > 0 && self.battery_percent.is_some_and(|level| level <= threshold)
    }
}
