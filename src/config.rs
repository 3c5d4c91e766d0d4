//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::lease::DEFAULT_ACQUIRE_TIMEOUT;
use crate::timer::TICK_PERIOD;

/// Bound of a keyword-triggered recording
pub const AUTO_RECORD_DURATION: Duration = Duration::from_secs(10 * 60);

/// Default bound on a single notification delivery
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest bound any recording may be given
pub const MAX_RECORDING_BOUND: Duration = Duration::from_secs(24 * 60 * 60);

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Directory where saved recordings and their metadata live
    pub recordings_dir: PathBuf,

    /// Scratch directory for in-progress captures
    pub capture_dir: PathBuf,

    /// Trained keyword models
    pub models_dir: PathBuf,

    /// Orchestrator policy
    pub orchestrator: OrchestratorConfig,
}

/// Timing and policy knobs of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Bound applied to every keyword-triggered recording
    pub auto_record_duration: Duration,
    /// Bound applied to manual recordings started without one
    pub max_manual_duration: Option<Duration>,
    /// Countdown tick cadence
    pub tick_period: Duration,
    /// Bound on a single background lease request
    pub lease_timeout: Duration,
    /// Re-arm listening once an auto recording finishes
    pub rearm_after_auto_recording: bool,
    /// Disarm listening at or below this battery percentage; 0 disables
    pub low_battery_percent: u8,
    /// Disarm listening when power-save mode turns on
    pub pause_on_power_save: bool,
    /// Bound on a single notification delivery
    pub notify_timeout: Duration,
    /// Depth of the command queue
    pub command_queue_depth: usize,
    /// Capacity of the observer event channel
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_record_duration: AUTO_RECORD_DURATION,
            max_manual_duration: None,
            tick_period: TICK_PERIOD,
            lease_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            rearm_after_auto_recording: false,
            low_battery_percent: 10,
            pause_on_power_save: true,
            notify_timeout: NOTIFY_TIMEOUT,
            command_queue_depth: 32,
            event_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("KEYREC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = lookup("HOME").context("neither KEYREC_DATA_DIR nor HOME is set")?;
                PathBuf::from(home).join(".local").join("share").join("keyrec")
            }
        };

        let socket_path = lookup("KEYREC_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let defaults = OrchestratorConfig::default();
        let orchestrator = OrchestratorConfig {
            auto_record_duration: parse_var::<u64, _>(&lookup, "KEYREC_AUTO_RECORD_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.auto_record_duration),
            max_manual_duration: parse_var::<u64, _>(&lookup, "KEYREC_MAX_MANUAL_SECS")?
                .map(Duration::from_secs),
            lease_timeout: parse_var::<u64, _>(&lookup, "KEYREC_LEASE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lease_timeout),
            rearm_after_auto_recording: parse_flag(&lookup, "KEYREC_REARM_AFTER_AUTO")?
                .unwrap_or(defaults.rearm_after_auto_recording),
            low_battery_percent: parse_var::<u8, _>(&lookup, "KEYREC_LOW_BATTERY_PERCENT")?
                .unwrap_or(defaults.low_battery_percent),
            pause_on_power_save: parse_flag(&lookup, "KEYREC_PAUSE_ON_POWER_SAVE")?
                .unwrap_or(defaults.pause_on_power_save),
            ..defaults
        };

        if orchestrator.auto_record_duration.is_zero() {
            bail!("KEYREC_AUTO_RECORD_SECS must be greater than zero");
        }
        if orchestrator.auto_record_duration > MAX_RECORDING_BOUND {
            bail!(
                "KEYREC_AUTO_RECORD_SECS must not exceed {}",
                MAX_RECORDING_BOUND.as_secs()
            );
        }
        if let Some(bound) = orchestrator.max_manual_duration {
            if bound.is_zero() || bound > MAX_RECORDING_BOUND {
                bail!(
                    "KEYREC_MAX_MANUAL_SECS must be between 1 and {}",
                    MAX_RECORDING_BOUND.as_secs()
                );
            }
        }
        if orchestrator.low_battery_percent > 100 {
            bail!("KEYREC_LOW_BATTERY_PERCENT must be between 0 and 100");
        }

        Ok(Self {
            socket_path,
            recordings_dir: data_dir.join("recordings"),
            capture_dir: data_dir.join("capture"),
            models_dir: data_dir.join("models"),
            data_dir,
            orchestrator,
        })
    }

    /// Ensure data directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.data_dir,
            &self.recordings_dir,
            &self.capture_dir,
            &self.models_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {value:?}"))
        })
        .transpose()
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("invalid value for {key}: {value:?}"),
        })
        .transpose()
}
