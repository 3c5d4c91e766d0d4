//! Power monitor fed by explicit updates
//!
//! Without a platform battery API the status stays at whatever it was
//! constructed with. Clients report changes with the `report_power` IPC
//! request, which lands in [`StaticPowerMonitor::apply`] and is pushed to
//! subscribers the way a real monitor would.

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::capability::{PowerEvent, PowerMonitor, PowerStatus};

pub struct StaticPowerMonitor {
    status: watch::Sender<PowerStatus>,
    events: broadcast::Sender<PowerEvent>,
}

impl StaticPowerMonitor {
    pub fn new(initial: PowerStatus) -> Self {
        let (status, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(16);
        Self { status, events }
    }

    /// Record a power change and publish it if it changed anything
    pub fn apply(&self, event: PowerEvent) -> bool {
        let changed = self.status.send_if_modified(|status| status.apply(event));
        if changed {
            debug!(?event, "power status updated");
            let _ = self.events.send(event);
        }
        changed
    }
}

impl Default for StaticPowerMonitor {
    fn default() -> Self {
        Self::new(PowerStatus::default())
    }
}

impl PowerMonitor for StaticPowerMonitor {
    fn current(&self) -> PowerStatus {
        *self.status.borrow()
    }

    fn subscribe(&self) -> broadcast::Receiver<PowerEvent> {
        self.events.subscribe()
    }
}
