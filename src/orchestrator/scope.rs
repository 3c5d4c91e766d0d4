//! Resources tied to a single state entry
//!
//! Everything opened while entering a state (event forwarders, the auto-stop
//! timer) is registered here and torn down in one place when the state is
//! left, whatever the exit path. Dropping the scope closes it as well.

use tokio::task::JoinHandle;
use tracing::debug;

use crate::timer::TimerHandle;

/// A running forwarder task feeding the command queue
#[derive(Debug)]
pub(crate) struct Subscription {
    source: &'static str,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(source: &'static str, task: JoinHandle<()>) -> Self {
        Self { source, task }
    }

    pub(crate) fn source(&self) -> &'static str {
        self.source
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Default)]
pub(crate) struct StateScope {
    subscriptions: Vec<Subscription>,
    timer: Option<TimerHandle>,
}

impl StateScope {
    pub(crate) fn open(&mut self, subscription: Subscription) {
        debug!(source = subscription.source(), "subscription opened");
        self.subscriptions.push(subscription);
    }

    pub(crate) fn set_timer(&mut self, timer: TimerHandle) {
        if let Some(previous) = self.timer.replace(timer) {
            previous.cancel();
        }
    }

    /// Id of the timer owned by the current state, if any
    pub(crate) fn timer_id(&self) -> Option<u64> {
        self.timer.as_ref().map(TimerHandle::id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.timer.is_none()
    }

    /// Cancel the timer and close every subscription
    pub(crate) fn close(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        for subscription in self.subscriptions.drain(..) {
            debug!(source = subscription.source(), "subscription closed");
        }
    }
}

impl Drop for StateScope {
    fn drop(&mut self) {
        self.close();
    }
}
