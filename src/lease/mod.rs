//! Background lease controller
//!
//! Wraps the platform [`BackgroundLease`] with a bounded acquisition timeout
//! and held/not-held tracking. Acquisition is best-effort: failure or timeout
//! is logged and reported as `false`, never raised.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use crate::capability::BackgroundLease;

/// Default bound on a single acquisition attempt
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LeaseController {
    lease: Arc<dyn BackgroundLease>,
    timeout: Duration,
    held: bool,
}

impl LeaseController {
    pub fn new(lease: Arc<dyn BackgroundLease>) -> Self {
        Self::with_timeout(lease, DEFAULT_ACQUIRE_TIMEOUT)
    }

    pub fn with_timeout(lease: Arc<dyn BackgroundLease>, timeout: Duration) -> Self {
        Self {
            lease,
            timeout,
            held: false,
        }
    }

    /// Whether the platform granted the lease
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Request the lease. Returns whether it is actually held afterwards.
    pub async fn acquire(&mut self) -> bool {
        if self.held {
            debug!("background lease already held");
            return true;
        }

        match time::timeout(self.timeout, self.lease.acquire()).await {
            Ok(Ok(())) => {
                self.held = true;
                info!("background lease acquired");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "background lease unavailable, continuing in foreground only");
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "background lease request timed out, continuing in foreground only"
                );
                // a grant that lands after the timeout must not leak
                if let Err(e) = self.lease.release().await {
                    debug!(error = %e, "release after timed out acquire failed");
                }
            }
        }

        self.held
    }

    /// Give the lease back. Safe to call when not held.
    pub async fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;

        match self.lease.release().await {
            Ok(()) => info!("background lease released"),
            Err(e) => warn!(error = %e, "background lease release failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::capability::LeaseError;

    #[derive(Default)]
    struct CountingLease {
        acquires: AtomicUsize,
        releases: AtomicUsize,
        deny: bool,
        hang: bool,
    }

    #[async_trait]
    impl BackgroundLease for CountingLease {
        async fn acquire(&self) -> Result<(), LeaseError> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.deny {
                return Err(LeaseError::Denied("battery optimisation".into()));
            }
            Ok(())
        }

        async fn release(&self) -> Result<(), LeaseError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let lease = Arc::new(CountingLease::default());
        let mut controller = LeaseController::new(lease.clone());

        assert!(controller.acquire().await);
        assert!(controller.is_held());
        controller.release().await;
        assert!(!controller.is_held());

        assert_eq!(lease.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(lease.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_while_held_is_noop() {
        let lease = Arc::new(CountingLease::default());
        let mut controller = LeaseController::new(lease.clone());

        assert!(controller.acquire().await);
        assert!(controller.acquire().await);
        assert_eq!(lease.acquires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_lease_returns_false() {
        let lease = Arc::new(CountingLease {
            deny: true,
            ..Default::default()
        });
        let mut controller = LeaseController::new(lease.clone());

        assert!(!controller.acquire().await);
        controller.release().await;
        assert_eq!(lease.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out() {
        let lease = Arc::new(CountingLease {
            hang: true,
            ..Default::default()
        });
        let mut controller = LeaseController::with_timeout(lease.clone(), Duration::from_secs(2));

        assert!(!controller.acquire().await);
        assert!(!controller.is_held());
        assert_eq!(lease.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let lease = Arc::new(CountingLease::default());
        let mut controller = LeaseController::new(lease.clone());

        controller.acquire().await;
        controller.release().await;
        controller.release().await;
        assert_eq!(lease.releases.load(Ordering::SeqCst), 1);
    }
}
