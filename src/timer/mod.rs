//! Auto-stop countdown timer
//!
//! A timer emits a remaining-time tick at a fixed cadence and exactly one
//! completion signal. Remaining time is always derived from the monotonic
//! deadline, never from counting ticks, so scheduling jitter cannot
//! accumulate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Default tick cadence
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// Deadline used when `start + duration` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Signals produced by a running timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// Time left until completion
    Tick(Duration),
    /// The countdown reached zero. Sent once, after the final zero tick.
    Completed,
}

/// Factory for countdown timers
#[derive(Debug, Clone, Copy)]
pub struct AutoStopTimer {
    duration: Duration,
    period: Duration,
}

impl AutoStopTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            period: TICK_PERIOD,
        }
    }

    /// Override the tick cadence
    pub fn with_period(mut self, period: Duration) -> Self {
        if !period.is_zero() {
            self.period = period;
        }
        self
    }

    /// Start the countdown. Signals are delivered on the returned receiver
    /// until completion or cancellation.
    pub fn start(self) -> (TimerHandle, mpsc::Receiver<TimerSignal>) {
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let started_at = Instant::now();
        let deadline = started_at
            .checked_add(self.duration)
            .unwrap_or(started_at + FAR_FUTURE);
        let cancelled = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_countdown(
            started_at,
            deadline,
            self.period,
            Arc::clone(&cancelled),
            tx,
        ));

        debug!(id, duration_ms = self.duration.as_millis() as u64, "timer started");

        let handle = TimerHandle {
            id,
            duration: self.duration,
            started_at,
            cancelled,
            task,
        };
        (handle, rx)
    }
}

/// Owning handle of a running countdown. Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    duration: Duration,
    started_at: Instant,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Time left, computed from the start instant
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started_at.elapsed())
    }

    /// Stop all further signals. Safe to call repeatedly or after completion.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) && !self.task.is_finished() {
            debug!(id = self.id, "timer cancelled");
        }
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the countdown task has exited, by completion or cancellation
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_countdown(
    started_at: Instant,
    deadline: Instant,
    period: Duration,
    cancelled: Arc<AtomicBool>,
    tx: mpsc::Sender<TimerSignal>,
) {
    let total = deadline.saturating_duration_since(started_at);
    if !total.is_zero() && !emit(&tx, &cancelled, TimerSignal::Tick(total)).await {
        return;
    }

    let mut ticker = time::interval_at(started_at + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let expiry = time::sleep_until(deadline);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;

            _ = &mut expiry => {
                if emit(&tx, &cancelled, TimerSignal::Tick(Duration::ZERO)).await {
                    emit(&tx, &cancelled, TimerSignal::Completed).await;
                }
                return;
            }

            _ = ticker.tick() => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    // expiry arm reports the final tick
                    continue;
                }
                if !emit(&tx, &cancelled, TimerSignal::Tick(remaining)).await {
                    return;
                }
            }
        }
    }
}

async fn emit(tx: &mpsc::Sender<TimerSignal>, cancelled: &AtomicBool, signal: TimerSignal) -> bool {
    if cancelled.load(Ordering::SeqCst) {
        return false;
    }
    tx.send(signal).await.is_ok()
}
