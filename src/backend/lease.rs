//! Background lease for platforms without one
//!
//! A daemon process is never suspended for leaving the foreground, so there
//! is nothing to request. Acquisition reports `Unsupported` and the
//! orchestrator carries on without the lease.

use async_trait::async_trait;

use crate::capability::{BackgroundLease, LeaseError};

#[derive(Debug, Default)]
pub struct ForegroundOnlyLease;

#[async_trait]
impl BackgroundLease for ForegroundOnlyLease {
    async fn acquire(&self) -> Result<(), LeaseError> {
        Err(LeaseError::Unsupported)
    }

    async fn release(&self) -> Result<(), LeaseError> {
        Ok(())
    }
}
