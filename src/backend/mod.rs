//! Collaborators the daemon runs with out of the box
//!
//! Platform integrations (audio device, keyword engine, battery, OS
//! notifications) plug in through the capability traits. Until they do,
//! these stand-ins keep every orchestrator path reachable.

mod capture;
mod detector;
mod lease;
mod notify;
mod power;
mod store;

use std::sync::Arc;

pub use capture::{PlaceholderCapture, SAMPLE_RATE};
pub use detector::BridgeDetector;
pub use lease::ForegroundOnlyLease;
pub use notify::LogNotificationSink;
pub use power::StaticPowerMonitor;
pub use store::JsonRecordingStore;

use crate::config::Config;
use crate::orchestrator::Collaborators;

/// Stand-ins that accept updates from outside the process
#[derive(Clone, Default)]
pub struct Bridge {
    /// Receives detections reported over IPC
    pub detector: Option<Arc<BridgeDetector>>,
    /// Receives battery and power-save reports over IPC
    pub power: Option<Arc<StaticPowerMonitor>>,
}

/// Stand-in wiring plus the handles used to feed it
pub struct StandIns {
    pub collaborators: Collaborators,
    pub bridge: Bridge,
}

impl StandIns {
    pub fn new(config: &Config) -> Self {
        let detector = Arc::new(BridgeDetector::new(&config.models_dir));
        let power = Arc::new(StaticPowerMonitor::default());

        let collaborators = Collaborators {
            capture: Arc::new(PlaceholderCapture::new(&config.capture_dir)),
            detector: detector.clone(),
            lease: Arc::new(ForegroundOnlyLease),
            power: power.clone(),
            notifier: Arc::new(LogNotificationSink),
            store: Arc::new(JsonRecordingStore::new(&config.recordings_dir)),
        };

        Self {
            collaborators,
            bridge: Bridge {
                detector: Some(detector),
                power: Some(power),
            },
        }
    }
}
