//! Recording and listening orchestrator
//!
//! Decides, at any instant, which single activity owns the microphone:
//! - keyword listening (detector armed, background lease held)
//! - keyword training capture
//! - keyword-triggered auto recording, bounded by an auto-stop timer
//! - manual recording, optionally bounded
//!
//! All transitions run on one actor task; see [`Orchestrator::spawn`].

mod actor;
mod command;
mod error;
mod handle;
mod profiles;
mod scope;

#[cfg(test)]
pub(crate) mod testing;

pub use actor::{Collaborators, Orchestrator};
pub use error::OrchestratorError;
pub use handle::{OrchestratorHandle, Status};
