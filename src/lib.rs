//! keyrec: keyword-triggered recording daemon
//!
//! Coordinates exclusive use of the microphone between keyword listening,
//! keyword training and bounded or manual recordings. The
//! [`orchestrator`] owns every transition; platform integrations plug in
//! through the traits in [`capability`].

pub mod backend;
pub mod capability;
pub mod config;
pub mod events;
pub mod ipc;
pub mod lease;
pub mod lifecycle;
pub mod orchestrator;
pub mod state;
pub mod timer;
