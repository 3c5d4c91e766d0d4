//! Placeholder microphone capture
//!
//! Holds the "microphone" exclusively, publishes a flat level meter while
//! running and writes a silent 16-bit mono WAV of the captured length on stop.
//! Lets the daemon run end-to-end where no audio backend is wired in.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::capability::{AudioCapture, CaptureError, CaptureEvent, CaptureLevel};

pub const SAMPLE_RATE: u32 = 16_000;

/// Cadence of level events while capturing
const LEVEL_PERIOD: std::time::Duration = std::time::Duration::from_millis(250);

struct ActiveCapture {
    path: PathBuf,
    started_at: Instant,
    meter: JoinHandle<()>,
}

pub struct PlaceholderCapture {
    capture_dir: PathBuf,
    active: Mutex<Option<ActiveCapture>>,
    events: broadcast::Sender<CaptureEvent>,
}

impl PlaceholderCapture {
    pub fn new(capture_dir: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            capture_dir: capture_dir.into(),
            active: Mutex::new(None),
            events,
        }
    }
}

#[async_trait]
impl AudioCapture for PlaceholderCapture {
    async fn start(&self) -> Result<(), CaptureError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(CaptureError::Busy("capture already running".into()));
        }

        tokio::fs::create_dir_all(&self.capture_dir)
            .await
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        let path = self.capture_dir.join(format!("capture-{}.wav", Uuid::new_v4()));
        let events = self.events.clone();
        let meter = tokio::spawn(async move {
            let mut ticker = time::interval(LEVEL_PERIOD);
            loop {
                ticker.tick().await;
                let _ = events.send(CaptureEvent::Level(CaptureLevel::default()));
            }
        });

        info!(path = %path.display(), "placeholder capture started");
        *active = Some(ActiveCapture {
            path,
            started_at: Instant::now(),
            meter,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<PathBuf, CaptureError> {
        let ActiveCapture {
            path,
            started_at,
            meter,
        } = self.active.lock().await.take().ok_or(CaptureError::NotRunning)?;
        meter.abort();

        let elapsed = started_at.elapsed();
        let samples = (elapsed.as_secs_f64() * f64::from(SAMPLE_RATE)) as u64;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_silence(&target, samples))
            .await
            .map_err(|e| CaptureError::Stream(e.to_string()))??;

        debug!(
            path = %path.display(),
            samples,
            duration_ms = elapsed.as_millis() as u64,
            "placeholder capture written"
        );
        Ok(path)
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }
}

fn write_silence(path: &Path, samples: u64) -> Result<(), CaptureError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let stream_error = |e: hound::Error| CaptureError::Stream(e.to_string());

    let mut writer = WavWriter::create(path, spec).map_err(stream_error)?;
    for _ in 0..samples {
        writer.write_sample(0i16).map_err(stream_error)?;
    }
    writer.finalize().map_err(stream_error)
}
