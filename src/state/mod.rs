//! State machine module for microphone ownership
//!
//! Provides the operational states:
//! - Idle: no capture, no timer, no lease
//! - ListeningArmed: keyword detector armed, background lease held
//! - TrainingKeyword: capture held for a training sample
//! - AutoRecording / ManualRecording: capture held for a bounded session
//! - Error: recoverable failure state

mod machine;

pub(crate) use machine::millis;
pub use machine::{OperationalState, StateKind, Trigger};
