//! Bridge keyword detector
//!
//! Stands in for an on-device keyword engine. Training stores a small model
//! file naming the sample and trigger phrase; detections are injected from
//! outside (the IPC `trigger_keyword` request) and only delivered while armed.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::capability::{DetectorError, KeywordDetector, KeywordProfile, ProfileId, TrainError};

/// Contents of a bridge model file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BridgeModel {
    trigger_text: String,
    sample: PathBuf,
}

pub struct BridgeDetector {
    models_dir: PathBuf,
    armed: Mutex<Option<ProfileId>>,
    detections: broadcast::Sender<bool>,
}

impl BridgeDetector {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        let (detections, _) = broadcast::channel(16);
        Self {
            models_dir: models_dir.into(),
            armed: Mutex::new(None),
            detections,
        }
    }

    /// Profile currently matched against, if armed
    pub fn armed_profile(&self) -> Option<ProfileId> {
        self.armed.lock().ok().and_then(|armed| *armed)
    }

    /// Report the trigger phrase as heard. Returns whether it was delivered.
    pub fn trigger(&self) -> bool {
        match self.armed_profile() {
            Some(profile) => {
                info!(%profile, "keyword detection injected");
                let _ = self.detections.send(true);
                true
            }
            None => {
                debug!("keyword detection injected while disarmed, dropped");
                false
            }
        }
    }

    fn set_armed(&self, profile: Option<ProfileId>) {
        if let Ok(mut armed) = self.armed.lock() {
            *armed = profile;
        }
    }
}

#[async_trait]
impl KeywordDetector for BridgeDetector {
    async fn train(&self, sample: &Path, trigger_text: &str) -> Result<KeywordProfile, TrainError> {
        if !tokio::fs::try_exists(sample).await.unwrap_or(false) {
            return Err(TrainError::BadSample(format!(
                "sample {} does not exist",
                sample.display()
            )));
        }

        let mut profile = KeywordProfile::new(trigger_text, PathBuf::new());
        profile.model_path = self.models_dir.join(format!("{}.json", profile.id));

        let model = BridgeModel {
            trigger_text: trigger_text.to_string(),
            sample: sample.to_path_buf(),
        };
        let encoded =
            serde_json::to_vec_pretty(&model).map_err(|e| TrainError::Engine(e.to_string()))?;
        tokio::fs::create_dir_all(&self.models_dir)
            .await
            .map_err(|e| TrainError::Engine(e.to_string()))?;
        tokio::fs::write(&profile.model_path, encoded)
            .await
            .map_err(|e| TrainError::Engine(e.to_string()))?;

        info!(
            profile = %profile.id,
            model = %profile.model_path.display(),
            "bridge model written"
        );
        Ok(profile)
    }

    async fn arm(&self, profile: &KeywordProfile) -> Result<(), DetectorError> {
        if !tokio::fs::try_exists(&profile.model_path).await.unwrap_or(false) {
            return Err(DetectorError::Arm(format!(
                "model {} not found",
                profile.model_path.display()
            )));
        }
        self.set_armed(Some(profile.id));
        Ok(())
    }

    async fn disarm(&self) -> Result<(), DetectorError> {
        self.set_armed(None);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.detections.subscribe()
    }
}
