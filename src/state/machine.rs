//! Operational state and transition table
//!
//! `OperationalState` is the single source of truth for which activity owns
//! the microphone. Only the orchestrator mutates it; [`StateKind::next`]
//! decides which triggers are accepted from each state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What the daemon is doing right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationalState {
    /// No capture, no timer, no lease
    Idle,
    /// Keyword detector armed; microphone soft-owned by the detector
    ListeningArmed,
    /// Capture held for a keyword training sample
    TrainingKeyword,
    /// Capture held for a keyword-triggered, always bounded session
    AutoRecording {
        #[serde(rename = "remaining_ms", with = "millis")]
        remaining: Duration,
    },
    /// Capture held for a user-initiated session, bounded when `remaining` is set
    ManualRecording {
        #[serde(rename = "remaining_ms", with = "millis_opt")]
        remaining: Option<Duration>,
    },
    /// A capture or detector failure interrupted the previous activity
    Error {
        message: String,
        recoverable_to: Box<OperationalState>,
    },
}

impl Default for OperationalState {
    fn default() -> Self {
        Self::Idle
    }
}

impl OperationalState {
    /// Build the error state reached after a mid-session failure
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            recoverable_to: Box::new(Self::Idle),
        }
    }

    pub fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::ListeningArmed => StateKind::ListeningArmed,
            Self::TrainingKeyword => StateKind::TrainingKeyword,
            Self::AutoRecording { .. } => StateKind::AutoRecording,
            Self::ManualRecording { .. } => StateKind::ManualRecording,
            Self::Error { .. } => StateKind::Error,
        }
    }

    /// Whether the orchestrator owns the microphone in this state
    pub fn holds_capture(&self) -> bool {
        self.kind().holds_capture()
    }

    /// Whether the background lease should be held in this state
    pub fn holds_lease(&self) -> bool {
        self.kind().holds_lease()
    }

    /// Remaining time of a bounded recording, if any
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::AutoRecording { remaining } => Some(*remaining),
            Self::ManualRecording { remaining } => *remaining,
            _ => None,
        }
    }

    /// Copy of a bounded recording state with a new remaining time.
    /// Other states are returned unchanged.
    pub fn with_remaining(&self, value: Duration) -> Self {
        match self {
            Self::AutoRecording { .. } => Self::AutoRecording { remaining: value },
            Self::ManualRecording { remaining: Some(_) } => Self::ManualRecording {
                remaining: Some(value),
            },
            other => other.clone(),
        }
    }
}

impl std::fmt::Display for OperationalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoRecording { remaining } => {
                write!(f, "AutoRecording ({}s left)", remaining.as_secs())
            }
            Self::ManualRecording {
                remaining: Some(remaining),
            } => write!(f, "ManualRecording ({}s left)", remaining.as_secs()),
            Self::Error { message, .. } => write!(f, "Error ({})", message),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Data-free discriminant of [`OperationalState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Idle,
    ListeningArmed,
    TrainingKeyword,
    AutoRecording,
    ManualRecording,
    Error,
}

/// Inputs that may move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ArmListening,
    DisarmListening,
    KeywordDetected,
    StartManualRecording,
    StopManualRecording,
    StopAutoRecording,
    TimerExpired,
    StartTraining,
    FinishTraining,
    CaptureFailed,
    Reset,
}

impl StateKind {
    /// Target state for `trigger`, or `None` when the trigger is not accepted
    /// from this state.
    pub fn next(self, trigger: Trigger) -> Option<StateKind> {
        use StateKind::*;

        match (self, trigger) {
            (Idle | Error, Trigger::ArmListening) => Some(ListeningArmed),
            (ListeningArmed, Trigger::DisarmListening) => Some(Idle),
            (ListeningArmed, Trigger::KeywordDetected) => Some(AutoRecording),

            (Idle, Trigger::StartManualRecording) => Some(ManualRecording),
            (ManualRecording, Trigger::StopManualRecording | Trigger::TimerExpired) => Some(Idle),
            (AutoRecording, Trigger::StopAutoRecording | Trigger::TimerExpired) => Some(Idle),

            (Idle, Trigger::StartTraining) => Some(TrainingKeyword),
            (TrainingKeyword, Trigger::FinishTraining) => Some(Idle),

            (TrainingKeyword | AutoRecording | ManualRecording, Trigger::CaptureFailed) => {
                Some(Error)
            }
            (Error, Trigger::Reset) => Some(Idle),

            _ => None,
        }
    }

    pub fn holds_capture(self) -> bool {
        matches!(
            self,
            StateKind::TrainingKeyword | StateKind::AutoRecording | StateKind::ManualRecording
        )
    }

    pub fn holds_lease(self) -> bool {
        matches!(self, StateKind::ListeningArmed | StateKind::AutoRecording)
    }
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateKind::Idle => write!(f, "Idle"),
            StateKind::ListeningArmed => write!(f, "ListeningArmed"),
            StateKind::TrainingKeyword => write!(f, "TrainingKeyword"),
            StateKind::AutoRecording => write!(f, "AutoRecording"),
            StateKind::ManualRecording => write!(f, "ManualRecording"),
            StateKind::Error => write!(f, "Error"),
        }
    }
}

/// Serialize a `Duration` as whole milliseconds
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub(crate) mod millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&(value.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StateKind; 6] = [
        StateKind::Idle,
        StateKind::ListeningArmed,
        StateKind::TrainingKeyword,
        StateKind::AutoRecording,
        StateKind::ManualRecording,
        StateKind::Error,
    ];

    #[test]
    fn test_initial_state() {
        assert_eq!(OperationalState::default(), OperationalState::Idle);
    }

    #[test]
    fn test_listening_cycle() {
        let armed = StateKind::Idle.next(Trigger::ArmListening);
        assert_eq!(armed, Some(StateKind::ListeningArmed));
        assert_eq!(
            StateKind::ListeningArmed.next(Trigger::KeywordDetected),
            Some(StateKind::AutoRecording)
        );
        assert_eq!(
            StateKind::AutoRecording.next(Trigger::TimerExpired),
            Some(StateKind::Idle)
        );
        assert_eq!(
            StateKind::ListeningArmed.next(Trigger::DisarmListening),
            Some(StateKind::Idle)
        );
    }

    #[test]
    fn test_keyword_only_accepted_while_listening() {
        for kind in ALL {
            let next = kind.next(Trigger::KeywordDetected);
            if kind == StateKind::ListeningArmed {
                assert_eq!(next, Some(StateKind::AutoRecording));
            } else {
                assert_eq!(next, None, "{kind} should ignore keyword events");
            }
        }
    }

    #[test]
    fn test_capture_states_only_entered_from_idle_or_listening() {
        for kind in ALL {
            for trigger in [
                Trigger::StartManualRecording,
                Trigger::StartTraining,
                Trigger::KeywordDetected,
            ] {
                if let Some(target) = kind.next(trigger) {
                    assert!(target.holds_capture());
                    assert!(
                        !kind.holds_capture(),
                        "{kind} entered {target} while holding capture"
                    );
                }
            }
        }
    }

    #[test]
    fn test_capture_failure_only_from_capture_states() {
        for kind in ALL {
            let next = kind.next(Trigger::CaptureFailed);
            assert_eq!(next.is_some(), kind.holds_capture());
        }
    }

    #[test]
    fn test_error_recovers_through_reset_or_arm() {
        assert_eq!(StateKind::Error.next(Trigger::Reset), Some(StateKind::Idle));
        assert_eq!(
            StateKind::Error.next(Trigger::ArmListening),
            Some(StateKind::ListeningArmed)
        );
        assert_eq!(StateKind::Error.next(Trigger::StartManualRecording), None);
    }

    #[test]
    fn test_lease_states() {
        assert!(StateKind::ListeningArmed.holds_lease());
        assert!(StateKind::AutoRecording.holds_lease());
        assert!(!StateKind::ManualRecording.holds_lease());
        assert!(!StateKind::TrainingKeyword.holds_lease());
    }

    #[test]
    fn test_with_remaining_keeps_unbounded_manual() {
        let unbounded = OperationalState::ManualRecording { remaining: None };
        assert_eq!(unbounded.with_remaining(Duration::from_secs(3)), unbounded);

        let auto = OperationalState::AutoRecording {
            remaining: Duration::from_secs(600),
        };
        assert_eq!(
            auto.with_remaining(Duration::from_secs(599)).remaining(),
            Some(Duration::from_secs(599))
        );
    }

    #[test]
    fn test_state_serialization() {
        let state = OperationalState::AutoRecording {
            remaining: Duration::from_secs(2),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("auto_recording"));
        assert!(json.contains("\"remaining_ms\":2000"));

        let error = OperationalState::error("mic unplugged");
        let json = serde_json::to_string(&error).unwrap();
        let back: OperationalState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, error);
    }
}
