//! Entity store
//!
//! Holds the current snapshot of every live entity of one kind. Each snapshot
//! carries its own lock, so mutating one entity never waits on another; the
//! map itself is a sharded concurrent map. Readers hold a shard lock only long
//! enough to clone a snapshot handle; an upsert holds it for the duration of
//! one snapshot write.
//!
//! Notifications are published after every lock has been released.


use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use crate::metrics::OP_REMOVE;
use crate::metrics::OP_UPSERT;
use crate::ControllerGauges;
use crate::Entity;
use crate::EntityKey;
use crate::Hub;
use crate::Topic;

/// Result of applying an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// The identity was absent and a snapshot was created
    Created,
    /// The cached details were replaced
    Updated,
    /// The details equal the cached ones; nothing changed
    Unchanged,
}

/// In-memory snapshot of one entity
#[derive(Debug)]
struct Snapshot<E> {
    details: RwLock<E>,
    /// Set by `mark()`, cleared by any upsert
    stale: AtomicBool,
}

impl<E: Entity> Snapshot<E> {
    fn new(details: E) -> Self {
        Self {
            details: RwLock::new(details),
            stale: AtomicBool::new(false),
        }
    }

    fn copy(&self) -> E {
        self.details.read().clone()
    }
}

/// Snapshots of all live entities of kind `E::KIND`
#[derive(Debug)]
pub struct EntityStore<E: Entity> {
    entries: DashMap<EntityKey, Arc<Snapshot<E>>>,
    hub: Hub,
    gauges: Arc<ControllerGauges>,
}

impl<E: Entity> EntityStore<E> {
    pub fn new(
        hub: Hub,
        gauges: Arc<ControllerGauges>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            hub,
            gauges,
        }
    }

    /// Creates the snapshot if absent, otherwise replaces its details.
    ///
    /// Publishes an `Updated` message unless the details were already cached
    /// exactly as given.
    pub fn upsert(
        &self,
        details: E,
    ) -> Upserted {
        let key = details.key();
        let kind = E::KIND.as_str();
        self.gauges.changes_processed.with_label_values(&[kind, OP_UPSERT]).inc();

        // The entry guard stays held while the details are written, so a
        // concurrent `remove()` or `sweep()` cannot unlink the snapshot mid-update.
        let outcome = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let snapshot = entry.get();
                snapshot.stale.store(false, Ordering::Release);
                let mut current = snapshot.details.write();
                if *current == details {
                    Upserted::Unchanged
                } else {
                    *current = details.clone();
                    Upserted::Updated
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Snapshot::new(details.clone())));
                Upserted::Created
            }
        };

        if outcome == Upserted::Created {
            self.gauges.entities.with_label_values(&[kind]).inc();
        }

        if outcome == Upserted::Unchanged {
            self.gauges.changes_unchanged.with_label_values(&[kind]).inc();
            trace!(kind, %key, "Upsert matched cached details");
        } else {
            debug!(kind, %key, ?outcome, "Entity upserted");
            self.hub.publish(Topic::updated(details.identity()), details.into_change());
        }
        outcome
    }

    /// Deletes the snapshot if present. Returns the last cached details.
    ///
    /// Removing an absent identity is a no-op and publishes nothing.
    pub fn remove(
        &self,
        key: &EntityKey,
    ) -> Option<E> {
        let kind = E::KIND.as_str();
        self.gauges.changes_processed.with_label_values(&[kind, OP_REMOVE]).inc();

        let (_, snapshot) = self.entries.remove(key)?;
        self.gauges.entities.with_label_values(&[kind]).dec();

        let last = snapshot.copy();
        debug!(kind, %key, "Entity removed");
        self.hub.publish(Topic::removed(last.identity()), last.clone().into_change());
        Some(last)
    }

    /// Copy of the current details, or `None` if not cached
    pub fn get(
        &self,
        key: &EntityKey,
    ) -> Option<E> {
        let snapshot = self.entries.get(key).map(|entry| entry.value().clone())?;
        Some(snapshot.copy())
    }

    pub fn contains(
        &self,
        key: &EntityKey,
    ) -> bool {
        self.entries.contains_key(key)
    }

    /// Lazily yields copies of the snapshots matching `predicate`.
    ///
    /// Weakly consistent: entities upserted or removed while iterating may or
    /// may not be reflected. Each call re-scans the current state.
    pub fn list<P>(
        &self,
        predicate: P,
    ) -> impl Iterator<Item = E>
    where
        P: Fn(&E) -> bool,
    {
        self.handles().into_iter().filter_map(move |snapshot| {
            let details = snapshot.copy();
            predicate(&details).then_some(details)
        })
    }

    /// Keys of all cached entities matching `predicate`
    pub fn keys<P>(
        &self,
        predicate: P,
    ) -> Vec<EntityKey>
    where
        P: Fn(&EntityKey) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.key()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flags every cached entity stale. Entities still stale at the next
    /// `sweep()` were not seen again and get removed.
    pub fn mark(&self) {
        for snapshot in self.handles() {
            snapshot.stale.store(true, Ordering::Release);
        }
    }

    /// Removes every entity still flagged stale. Returns the removed details.
    pub fn sweep(&self) -> Vec<E> {
        let kind = E::KIND.as_str();
        let mut removed = Vec::new();
        for key in self.keys_where_stale() {
            // Skip entities upserted again since the key was collected
            let Some((_, snapshot)) = self
                .entries
                .remove_if(&key, |_, snapshot| snapshot.stale.load(Ordering::Acquire))
            else {
                continue;
            };
            self.gauges.entities.with_label_values(&[kind]).dec();
            self.gauges.sweep_removals.with_label_values(&[kind]).inc();

            let last = snapshot.copy();
            debug!(kind, %key, "Stale entity swept");
            self.hub.publish(Topic::removed(last.identity()), last.clone().into_change());
            removed.push(last);
        }
        removed
    }

    fn handles(&self) -> Vec<Arc<Snapshot<E>>> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    fn keys_where_stale(&self) -> Vec<EntityKey> {
        self.entries
            .iter()
            .filter(|entry| entry.value().stale.load(Ordering::Acquire))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
