//! Controller cache
//!
//! The aggregate owning one entity store per registered kind, the
//! notification hub and the controller gauges. Change records from the
//! upstream watcher are routed here by kind; cross-entity rules (cascading
//! removal, resync) live here so the stores stay ignorant of each other.
mod cascade;

#[cfg(test)]
mod controller_test;

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use autometrics::autometrics;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::metrics::bind_server;
use crate::metrics::REASON_UNKNOWN_KIND;
use crate::Application;
use crate::CacheConfig;
use crate::CacheError;
use crate::CacheNodeConfig;
use crate::ChangeRecord;
use crate::Charm;
use crate::ControllerGauges;
use crate::Entity;
use crate::EntityChange;
use crate::EntityKey;
use crate::EntityKind;
use crate::EntityStore;
use crate::Error;
use crate::Hub;
use crate::Machine;
use crate::Model;
use crate::MonitoringConfig;
use crate::Result;
use crate::Unit;
use crate::API_SLO;

/// In-memory mirror of controller state
///
/// Owned by whoever runs the upstream watcher and passed by reference (or
/// `Arc`) to readers. Readers use the accessors; only `apply_change` and the
/// resync operations mutate.
#[derive(Debug)]
pub struct ControllerCache {
    models: Option<EntityStore<Model>>,
    applications: Option<EntityStore<Application>>,
    machines: Option<EntityStore<Machine>>,
    units: Option<EntityStore<Unit>>,
    charms: Option<EntityStore<Charm>>,
    hub: Hub,
    gauges: Arc<ControllerGauges>,
    config: CacheConfig,
}

impl ControllerCache {
    /// Builds the cache, its hub and its gauges from a validated configuration.
    pub fn new(config: &CacheNodeConfig) -> Result<Self> {
        let gauges = Arc::new(ControllerGauges::new(&config.monitoring.namespace)?);
        let hub = Hub::new(config.hub.clone(), gauges.clone());
        Self::with_hub(config.cache.clone(), hub, gauges)
    }

    /// Builds the cache around an existing hub and gauge set.
    pub fn with_hub(
        config: CacheConfig,
        hub: Hub,
        gauges: Arc<ControllerGauges>,
    ) -> Result<Self> {
        let kinds = config.kinds()?;
        info!(?kinds, "Creating controller cache");

        Ok(Self {
            models: register(&kinds, &hub, &gauges),
            applications: register(&kinds, &hub, &gauges),
            machines: register(&kinds, &hub, &gauges),
            units: register(&kinds, &hub, &gauges),
            charms: register(&kinds, &hub, &gauges),
            hub,
            gauges,
            config,
        })
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn gauges(&self) -> &Arc<ControllerGauges> {
        &self.gauges
    }

    /// True when a store is registered for `kind`
    pub fn is_registered(
        &self,
        kind: EntityKind,
    ) -> bool {
        match kind {
            EntityKind::Model => self.models.is_some(),
            EntityKind::Application => self.applications.is_some(),
            EntityKind::Machine => self.machines.is_some(),
            EntityKind::Unit => self.units.is_some(),
            EntityKind::Charm => self.charms.is_some(),
        }
    }

    /// Routes one change record to the store of its kind.
    ///
    /// # Errors
    /// `CacheError::UnknownKind` when no store is registered for the record's
    /// kind. The record is dropped and counted; the cache stays usable.
    #[autometrics(objective = API_SLO)]
    pub fn apply_change(
        &self,
        record: ChangeRecord,
    ) -> Result<()> {
        let kind_name = record.kind_name().to_string();
        let key = record.key();

        match self.dispatch(record) {
            Err(Error::Cache(CacheError::UnknownKind(kind))) => {
                self.gauges.changes_rejected.with_label_values(&[REASON_UNKNOWN_KIND]).inc();
                warn!(kind = %kind_name, %key, "Dropping change record for unregistered kind");
                Err(CacheError::UnknownKind(kind).into())
            }
            other => other,
        }
    }

    fn dispatch(
        &self,
        record: ChangeRecord,
    ) -> Result<()> {
        match record {
            ChangeRecord::Upsert(change) => self.apply_upsert(change),
            ChangeRecord::Remove { kind, key } => {
                let kind = EntityKind::from_str(&kind)?;
                self.apply_remove(kind, &key)
            }
        }
    }

    fn apply_upsert(
        &self,
        change: EntityChange,
    ) -> Result<()> {
        match change {
            EntityChange::Model(details) => {
                store(&self.models)?.upsert(details);
            }
            EntityChange::Application(details) => {
                store(&self.applications)?.upsert(details);
            }
            EntityChange::Machine(details) => {
                store(&self.machines)?.upsert(details);
            }
            EntityChange::Unit(details) => {
                store(&self.units)?.upsert(details);
            }
            EntityChange::Charm(details) => {
                store(&self.charms)?.upsert(details);
            }
        }
        Ok(())
    }

    /// Removes one entity and whatever the cascade rules scope under it.
    /// Absent identities are a no-op.
    fn apply_remove(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Result<()> {
        if !self.is_registered(kind) {
            return Err(CacheError::UnknownKind(kind.as_str().to_string()).into());
        }

        let dependents = self.cascade_records(kind, key);
        if !dependents.is_empty() {
            debug!(%kind, %key, dependents = dependents.len(), "Cascading removal");
        }
        for record in dependents {
            let dependent_key = record.key();
            let dependent_kind = EntityKind::from_str(record.kind_name())?;
            if self.remove_entity(dependent_kind, &dependent_key) {
                self.gauges
                    .cascade_removals
                    .with_label_values(&[dependent_kind.as_str()])
                    .inc();
            }
        }

        self.remove_entity(kind, key);
        Ok(())
    }

    /// Removes a single entity from its store, if both exist
    fn remove_entity(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> bool {
        match kind {
            EntityKind::Model => self.models.as_ref().and_then(|s| s.remove(key)).is_some(),
            EntityKind::Application => self.applications.as_ref().and_then(|s| s.remove(key)).is_some(),
            EntityKind::Machine => self.machines.as_ref().and_then(|s| s.remove(key)).is_some(),
            EntityKind::Unit => self.units.as_ref().and_then(|s| s.remove(key)).is_some(),
            EntityKind::Charm => self.charms.as_ref().and_then(|s| s.remove(key)).is_some(),
        }
    }

    /// Flags every cached entity stale ahead of a full replay of upstream state.
    pub fn mark(&self) {
        mark_store(&self.models);
        mark_store(&self.applications);
        mark_store(&self.machines);
        mark_store(&self.units);
        mark_store(&self.charms);
    }

    /// Removes every entity not upserted since the last `mark()`.
    ///
    /// Dependents are swept before their owners. Returns how many entities
    /// were removed.
    pub fn sweep(&self) -> usize {
        let removed = sweep_store(&self.units)
            + sweep_store(&self.applications)
            + sweep_store(&self.machines)
            + sweep_store(&self.charms)
            + sweep_store(&self.models);
        info!(removed, "Resync sweep finished");
        removed
    }

    /// Starts the `/metrics` endpoint for this cache's gauges when
    /// `prometheus_enabled` is set, serving until the shutdown signal fires.
    ///
    /// Returns the bound address, or `None` when monitoring is disabled. Must
    /// be called from within a tokio runtime.
    pub fn serve_metrics(
        &self,
        config: &MonitoringConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Option<SocketAddr>> {
        if !config.prometheus_enabled {
            debug!("Prometheus endpoint disabled");
            return Ok(None);
        }

        let (addr, server) = bind_server(
            self.gauges.registry().clone(),
            config.prometheus_port,
            shutdown_signal,
        )?;
        tokio::spawn(server);
        Ok(Some(addr))
    }

    /// Consumes change records until the stream ends or shutdown is signalled.
    ///
    /// Failing records are logged and skipped; the loop itself only stops on
    /// channel close or shutdown.
    pub async fn run(
        &self,
        mut changes: mpsc::Receiver<ChangeRecord>,
        mut shutdown_signal: watch::Receiver<()>,
    ) -> Result<()> {
        info!("Controller cache ingest loop started");
        loop {
            tokio::select! {
                _ = shutdown_signal.changed() => {
                    info!("Controller cache received shutdown signal");
                    break;
                }
                record = changes.recv() => {
                    let Some(record) = record else {
                        debug!("Change stream closed");
                        break;
                    };
                    if let Err(e) = self.apply_change(record) {
                        error!("Failed to apply change record: {}", e);
                    }
                }
            }
        }
        info!("Controller cache ingest loop stopped");
        Ok(())
    }

    //---------------------------------------------------------------------
    // Read-through accessors

    pub fn model(
        &self,
        model_uuid: &str,
    ) -> Result<Model> {
        lookup(&self.models, EntityKey::model(model_uuid))
    }

    pub fn application(
        &self,
        model_uuid: &str,
        name: &str,
    ) -> Result<Application> {
        lookup(&self.applications, EntityKey::new(model_uuid, name))
    }

    pub fn machine(
        &self,
        model_uuid: &str,
        id: &str,
    ) -> Result<Machine> {
        lookup(&self.machines, EntityKey::new(model_uuid, id))
    }

    pub fn unit(
        &self,
        model_uuid: &str,
        name: &str,
    ) -> Result<Unit> {
        lookup(&self.units, EntityKey::new(model_uuid, name))
    }

    pub fn charm(
        &self,
        model_uuid: &str,
        charm_url: &str,
    ) -> Result<Charm> {
        lookup(&self.charms, EntityKey::new(model_uuid, charm_url))
    }

    pub fn models(&self) -> Vec<Model> {
        collect(&self.models, |_| true)
    }

    pub fn applications(
        &self,
        model_uuid: &str,
    ) -> Vec<Application> {
        collect(&self.applications, |a| a.model_uuid == model_uuid)
    }

    pub fn machines(
        &self,
        model_uuid: &str,
    ) -> Vec<Machine> {
        collect(&self.machines, |m| m.model_uuid == model_uuid)
    }

    pub fn units(
        &self,
        model_uuid: &str,
    ) -> Vec<Unit> {
        collect(&self.units, |u| u.model_uuid == model_uuid)
    }

    pub fn units_of_application(
        &self,
        model_uuid: &str,
        application: &str,
    ) -> Vec<Unit> {
        collect(&self.units, |u| u.model_uuid == model_uuid && u.application == application)
    }

    pub fn charms(
        &self,
        model_uuid: &str,
    ) -> Vec<Charm> {
        collect(&self.charms, |c| c.model_uuid == model_uuid)
    }
}

fn register<E: Entity>(
    kinds: &BTreeSet<EntityKind>,
    hub: &Hub,
    gauges: &Arc<ControllerGauges>,
) -> Option<EntityStore<E>> {
    kinds
        .contains(&E::KIND)
        .then(|| EntityStore::new(hub.clone(), gauges.clone()))
}

fn mark_store<E: Entity>(store: &Option<EntityStore<E>>) {
    if let Some(store) = store {
        store.mark();
    }
}

fn sweep_store<E: Entity>(store: &Option<EntityStore<E>>) -> usize {
    store.as_ref().map(|s| s.sweep().len()).unwrap_or(0)
}

fn store<E: Entity>(store: &Option<EntityStore<E>>) -> Result<&EntityStore<E>> {
    store
        .as_ref()
        .ok_or_else(|| CacheError::UnknownKind(E::KIND.as_str().to_string()).into())
}

fn lookup<E: Entity>(
    entities: &Option<EntityStore<E>>,
    key: EntityKey,
) -> Result<E> {
    match store(entities)?.get(&key) {
        Some(details) => Ok(details),
        None => Err(CacheError::NotFound { kind: E::KIND, key }.into()),
    }
}

fn collect<E, P>(
    entities: &Option<EntityStore<E>>,
    predicate: P,
) -> Vec<E>
where
    E: Entity,
    P: Fn(&E) -> bool,
{
    entities
        .as_ref()
        .map(|s| s.list(predicate).collect())
        .unwrap_or_default()
}
