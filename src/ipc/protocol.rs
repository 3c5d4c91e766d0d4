//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::capability::{KeywordProfile, PowerEvent, ProfileId, RecordingDescriptor};
use crate::events::StateEvent;
use crate::orchestrator::{OrchestratorError, Status};

/// Largest frame either side may send
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to state event notifications
    Subscribe,

    ArmListening,
    DisarmListening,

    /// Start a manual recording, optionally bounded
    StartRecording {
        #[serde(default)]
        max_duration_secs: Option<u64>,
    },

    /// Stop whichever recording is active
    StopRecording,

    StartTraining,
    FinishTraining { trigger_text: String },

    /// Leave the error state
    Reset,

    ListProfiles,
    ActivateProfile { id: ProfileId },
    DeleteProfile { id: ProfileId },

    /// Report the trigger phrase as heard by an external detector
    TriggerKeyword,

    /// Report a battery or power-save change from an external monitor
    ReportPower { event: PowerEvent },
}

/// Responses from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Command accepted
    Ok,

    /// A finished and saved recording
    Recording { descriptor: RecordingDescriptor },

    /// A newly trained profile
    Profile { profile: KeywordProfile },

    Profiles { profiles: Vec<KeywordProfile> },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<OrchestratorError> for Response {
    fn from(e: OrchestratorError) -> Self {
        Self::error(e.code(), e.to_string())
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// State event occurred
    Event { event: StateEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Orchestrator snapshot
    pub orchestrator: Status,
}

impl DaemonStatus {
    pub fn new(orchestrator: Status, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            orchestrator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::OperationalState;

    #[test]
    fn test_request_serialization() {
        let req = Request::FinishTraining {
            trigger_text: "hey recorder".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("finish_training"));
        assert!(json.contains("hey recorder"));
    }

    #[test]
    fn test_start_recording_bound_is_optional() {
        let req: Request = serde_json::from_str(r#"{"type":"start_recording"}"#).unwrap();
        assert_eq!(
            req,
            Request::StartRecording {
                max_duration_secs: None
            }
        );

        let req: Request =
            serde_json::from_str(r#"{"type":"start_recording","max_duration_secs":90}"#).unwrap();
        assert_eq!(
            req,
            Request::StartRecording {
                max_duration_secs: Some(90)
            }
        );
    }

    #[test]
    fn test_report_power_wire_format() {
        let req: Request = serde_json::from_str(
            r#"{"type":"report_power","event":{"type":"battery_level","value":12}}"#,
        )
        .unwrap();
        assert_eq!(
            req,
            Request::ReportPower {
                event: PowerEvent::BatteryLevel(12)
            }
        );
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::new(Status::default(), 3));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""state":"idle""#));
    }

    #[test]
    fn test_error_response_carries_code() {
        let resp = Response::from(OrchestratorError::NoActiveProfile);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "no_active_profile");
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::Event {
            event: StateEvent::Transitioned {
                from: OperationalState::Idle,
                to: OperationalState::ListeningArmed,
                duration_ms: 5,
            },
        };
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"]["type"], "transitioned");
        assert_eq!(json["event"]["to"]["state"], "listening_armed");
    }
}
