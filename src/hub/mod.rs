//! Notification hub for cache changes
//!
//! Topic-keyed publish/subscribe broker between the entity stores and the
//! workers reacting to cache changes.
//!
//! # Architecture
//!
//! ```text
//! Mutation path (entity lock already released):
//!   store.upsert() -> hub.publish() -> match patterns -> send(per-subscriber queue)
//!                                                              ↓
//! Subscriber worker thread (one per callback subscription):
//!   queue.blocking_recv() -> delivery lock -> handler(&message)
//!
//! Channel watcher:
//!   queue -> Watcher::recv().await
//! ```
//!
//! # Delivery guarantees
//!
//! - Publishing never blocks on a subscriber: queues are unbounded and
//!   handlers run on their own thread.
//! - A single subscriber sees messages in publish order. There is no
//!   ordering across subscribers.
//! - A handler error or panic is logged and counted; the subscriber keeps
//!   receiving and other subscribers are unaffected.
//! - Messages live in memory only and are lost on restart.
mod subscription;
mod topic;
pub use subscription::*;
pub use topic::*;


use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use crate::ControllerGauges;
use crate::EntityChange;
use crate::HandlerError;
use crate::HubConfig;
use crate::HubError;
use crate::Result;

thread_local! {
    /// Set for the lifetime of every subscriber worker thread
    static ON_HUB_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True when called from a subscriber handler
pub(crate) fn on_hub_worker() -> bool {
    ON_HUB_WORKER.with(Cell::get)
}

/// Registered subscriber as seen by publishers
struct Subscriber {
    id: u64,
    pattern: TopicPattern,
    sender: mpsc::UnboundedSender<Arc<Message>>,
    shared: Arc<SubscriberShared>,
}

/// State shared between a subscriber's registry entry, its worker and its handle
#[derive(Debug, Default)]
pub(crate) struct SubscriberShared {
    active: AtomicBool,
    /// Messages queued but not yet taken by the worker or watcher
    backlog: AtomicUsize,
    /// Held by the worker for the duration of one handler invocation
    delivery: Mutex<()>,
}

impl SubscriberShared {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            ..Default::default()
        }
    }
}

pub(crate) struct HubInner {
    /// Copy-on-write subscriber list; publishers read it without locking
    subscribers: ArcSwap<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
    config: HubConfig,
    gauges: Arc<ControllerGauges>,
}

impl fmt::Debug for HubInner {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("HubInner")
            .field("subscribers", &self.subscribers.load().len())
            .field("next_id", &self.next_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HubInner {
    fn add(
        &self,
        subscriber: Arc<Subscriber>,
    ) {
        self.subscribers.rcu(|list| {
            let mut next = Vec::with_capacity(list.len() + 1);
            next.extend(list.iter().cloned());
            next.push(subscriber.clone());
            next
        });
        self.gauges.hub_subscribers.inc();
    }

    /// Drops the registry entry. Returns false if it was already gone.
    pub(crate) fn remove(
        &self,
        id: u64,
    ) -> bool {
        let previous = self
            .subscribers
            .rcu(|list| list.iter().filter(|s| s.id != id).cloned().collect::<Vec<_>>());
        let removed = previous.iter().any(|s| s.id == id);
        if removed {
            self.gauges.hub_subscribers.dec();
            trace!(subscriber_id = id, "Subscriber unregistered");
        }
        removed
    }
}

/// Topic-based publish/subscribe broker
///
/// Cloning is cheap; all clones share one subscriber registry.
///
/// # Example
///
/// ```ignore
/// let hub = Hub::new(HubConfig::default(), gauges);
/// let subscription = hub.subscribe(
///     TopicPattern::all().kind(EntityKind::Machine).event(EventType::Removed),
///     |message| {
///         restart_dependents(&message.topic.identity);
///         Ok(())
///     },
/// )?;
///
/// // later
/// hub.unsubscribe(subscription);
/// ```
#[derive(Debug, Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        gauges: Arc<ControllerGauges>,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: ArcSwap::from_pointee(Vec::new()),
                next_id: AtomicU64::new(1),
                config,
                gauges,
            }),
        }
    }

    /// Registers `handler` for every future message matching `pattern`.
    ///
    /// The handler runs on a dedicated worker thread, one message at a time,
    /// in publish order. The returned handle unsubscribes when dropped.
    pub fn subscribe<F>(
        &self,
        pattern: TopicPattern,
        handler: F,
    ) -> Result<Subscription>
    where
        F: Fn(&Message) -> std::result::Result<(), HandlerError> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(SubscriberShared::new());

        let worker_shared = shared.clone();
        let gauges = self.inner.gauges.clone();
        thread::Builder::new()
            .name(format!("{}-{}", self.inner.config.worker_thread_prefix, id))
            .spawn(move || run_worker(id, worker_shared, receiver, handler, gauges))
            .map_err(HubError::SpawnFailed)?;

        self.inner.add(Arc::new(Subscriber {
            id,
            pattern: pattern.clone(),
            sender,
            shared: shared.clone(),
        }));
        debug!(subscriber_id = id, ?pattern, "Subscriber registered");

        Ok(Subscription::new(id, Arc::downgrade(&self.inner), shared))
    }

    /// Registers a channel-backed watcher for every future message matching `pattern`.
    ///
    /// Messages are queued until read from the returned `Watcher`; dropping
    /// it unsubscribes.
    pub fn watch(
        &self,
        pattern: TopicPattern,
    ) -> Watcher {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(SubscriberShared::new());

        self.inner.add(Arc::new(Subscriber {
            id,
            pattern: pattern.clone(),
            sender,
            shared: shared.clone(),
        }));
        debug!(watcher_id = id, ?pattern, "Watcher registered");

        Watcher::new(Subscription::new(id, Arc::downgrade(&self.inner), shared), receiver)
    }

    /// Deregisters a subscription. Equivalent to `subscription.unsubscribe()`.
    pub fn unsubscribe(
        &self,
        subscription: Subscription,
    ) {
        subscription.unsubscribe();
    }

    /// Queues `message` for every registered subscriber whose pattern matches.
    ///
    /// Never blocks on subscribers. Returns the number of subscribers the
    /// message was queued for.
    pub fn publish(
        &self,
        topic: Topic,
        details: EntityChange,
    ) -> usize {
        self.inner
            .gauges
            .hub_messages_published
            .with_label_values(&[topic.kind().as_str(), topic.event.as_str()])
            .inc();

        let message = Arc::new(Message { topic, details });
        let subscribers = self.inner.subscribers.load();
        let threshold = self.inner.config.backlog_warn_threshold;

        let mut queued = 0;
        for subscriber in subscribers.iter() {
            if !subscriber.shared.active.load(Ordering::Acquire)
                || !subscriber.pattern.matches(&message.topic)
            {
                continue;
            }

            let depth = subscriber.shared.backlog.fetch_add(1, Ordering::AcqRel) + 1;
            if subscriber.sender.send(message.clone()).is_err() {
                // Receiver gone: the subscription is being torn down
                subscriber.shared.backlog.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            if threshold > 0 && depth % threshold == 0 {
                warn!(
                    subscriber_id = subscriber.id,
                    backlog = depth,
                    "Subscriber is falling behind"
                );
            }
            queued += 1;
        }

        trace!(topic = %message.topic, subscribers = queued, "Message published");
        queued
    }

    /// Number of registered subscribers and watchers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.load().len()
    }
}

fn run_worker<F>(
    id: u64,
    shared: Arc<SubscriberShared>,
    mut receiver: mpsc::UnboundedReceiver<Arc<Message>>,
    handler: F,
    gauges: Arc<ControllerGauges>,
) where
    F: Fn(&Message) -> std::result::Result<(), HandlerError>,
{
    ON_HUB_WORKER.with(|flag| flag.set(true));
    trace!(subscriber_id = id, "Subscriber worker started");

    while let Some(message) = receiver.blocking_recv() {
        shared.backlog.fetch_sub(1, Ordering::AcqRel);

        let _delivery = shared.delivery.lock();
        if !shared.active.load(Ordering::Acquire) {
            break;
        }

        match catch_unwind(AssertUnwindSafe(|| handler(&message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                gauges.hub_handler_failures.inc();
                error!(subscriber_id = id, topic = %message.topic, "Subscriber handler failed: {}", e);
            }
            Err(panic) => {
                gauges.hub_handler_failures.inc();
                error!(
                    subscriber_id = id,
                    topic = %message.topic,
                    "Subscriber handler panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    trace!(subscriber_id = id, "Subscriber worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
