use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::trace;

use super::HubInner;
use super::Message;
use super::SubscriberShared;
use super::on_hub_worker;

/// Cancellation handle of a hub subscription
///
/// When dropped, the subscription is automatically unregistered from the hub.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: Weak<HubInner>,
    shared: Arc<SubscriberShared>,
}

impl Subscription {
    pub(super) fn new(
        id: u64,
        hub: Weak<HubInner>,
        shared: Arc<SubscriberShared>,
    ) -> Self {
        Self { id, hub, shared }
    }

    /// Unique identifier of this subscription
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Stops deliveries to this subscription.
    ///
    /// Waits for a handler invocation already in progress to finish; once
    /// this returns no further invocation starts.
    ///
    /// Called from inside any hub handler it does not wait: no new invocation
    /// starts, but one already running on the target's worker may still
    /// complete. Two handlers unsubscribing each other therefore cannot
    /// deadlock.
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }

        if !on_hub_worker() {
            drop(self.shared.delivery.lock());
        }
        trace!(subscriber_id = self.id, "Subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Channel-backed hub subscription
///
/// Dropping the watcher unsubscribes it.
#[derive(Debug)]
pub struct Watcher {
    subscription: Subscription,
    receiver: mpsc::UnboundedReceiver<Arc<Message>>,
}

impl Watcher {
    pub(super) fn new(
        subscription: Subscription,
        receiver: mpsc::UnboundedReceiver<Arc<Message>>,
    ) -> Self {
        Self {
            subscription,
            receiver,
        }
    }

    pub fn id(&self) -> u64 {
        self.subscription.id()
    }

    /// Waits for the next message. Returns `None` once the hub is gone and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        let message = self.receiver.recv().await;
        if message.is_some() {
            self.subscription.shared.backlog.fetch_sub(1, Ordering::AcqRel);
        }
        message
    }

    /// Takes the next queued message without waiting
    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        match self.receiver.try_recv() {
            Ok(message) => {
                self.subscription.shared.backlog.fetch_sub(1, Ordering::AcqRel);
                Some(message)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Messages queued and not yet received
    pub fn backlog(&self) -> usize {
        self.subscription.shared.backlog.load(Ordering::Acquire)
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}
