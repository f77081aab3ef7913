//! Controller gauges.
//!
//! One `ControllerGauges` is owned by each controller cache and shared by
//! reference with its stores and hub. Values are plain numbers for an external
//! collector to scrape; nothing is pushed.
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use autometrics::prometheus_exporter;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::EntityKind;
use crate::Error;
use crate::EventType;
use crate::Result;

#[cfg(test)]
mod metrics_test;

/// Store operation label values
pub(crate) const OP_UPSERT: &str = "upsert";
pub(crate) const OP_REMOVE: &str = "remove";

/// Rejection reason label values
pub(crate) const REASON_UNKNOWN_KIND: &str = "unknown_kind";

#[derive(Clone)]
pub struct ControllerGauges {
    namespace: String,
    registry: Registry,

    /// Entities of kind K currently cached
    pub(crate) entities: IntGaugeVec,
    /// Change records applied, by kind and operation
    pub(crate) changes_processed: IntCounterVec,
    /// Upserts that matched the cached details exactly
    pub(crate) changes_unchanged: IntCounterVec,
    /// Change records dropped, by reason
    pub(crate) changes_rejected: IntCounterVec,
    /// Entities removed because their owner was removed
    pub(crate) cascade_removals: IntCounterVec,
    /// Entities removed by a resync sweep
    pub(crate) sweep_removals: IntCounterVec,
    pub(crate) hub_messages_published: IntCounterVec,
    pub(crate) hub_handler_failures: IntCounter,
    pub(crate) hub_subscribers: IntGauge,
}

impl fmt::Debug for ControllerGauges {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ControllerGauges")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ControllerGauges {
    /// Creates the gauge set inside a fresh registry whose metric names are
    /// prefixed with `namespace`.
    pub fn new(namespace: &str) -> Result<Self> {
        let registry = Registry::new_custom(Some(namespace.to_string()), None)?;

        let gauges = Self {
            entities: IntGaugeVec::new(Opts::new("entities", "Entities currently cached"), &["kind"])?,
            changes_processed: IntCounterVec::new(
                Opts::new("changes_processed", "Change records applied"),
                &["kind", "op"],
            )?,
            changes_unchanged: IntCounterVec::new(
                Opts::new("changes_unchanged", "Upserts identical to the cached details"),
                &["kind"],
            )?,
            changes_rejected: IntCounterVec::new(
                Opts::new("changes_rejected", "Change records dropped"),
                &["reason"],
            )?,
            cascade_removals: IntCounterVec::new(
                Opts::new("cascade_removals", "Entities removed together with their owner"),
                &["kind"],
            )?,
            sweep_removals: IntCounterVec::new(
                Opts::new("sweep_removals", "Stale entities removed by a resync sweep"),
                &["kind"],
            )?,
            hub_messages_published: IntCounterVec::new(
                Opts::new("hub_messages_published", "Notifications published on the hub"),
                &["kind", "event"],
            )?,
            hub_handler_failures: IntCounter::new(
                "hub_handler_failures",
                "Subscriber handlers that returned an error or panicked",
            )?,
            hub_subscribers: IntGauge::new("hub_subscribers", "Registered hub subscribers")?,
            namespace: namespace.to_string(),
            registry,
        };
        gauges.register()?;
        Ok(gauges)
    }

    fn register(&self) -> Result<()> {
        self.registry.register(Box::new(self.entities.clone()))?;
        self.registry.register(Box::new(self.changes_processed.clone()))?;
        self.registry.register(Box::new(self.changes_unchanged.clone()))?;
        self.registry.register(Box::new(self.changes_rejected.clone()))?;
        self.registry.register(Box::new(self.cascade_removals.clone()))?;
        self.registry.register(Box::new(self.sweep_removals.clone()))?;
        self.registry.register(Box::new(self.hub_messages_published.clone()))?;
        self.registry.register(Box::new(self.hub_handler_failures.clone()))?;
        self.registry.register(Box::new(self.hub_subscribers.clone()))?;
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn entity_count(
        &self,
        kind: EntityKind,
    ) -> i64 {
        self.entities.with_label_values(&[kind.as_str()]).get()
    }

    pub fn changes_processed(
        &self,
        kind: EntityKind,
        op: &str,
    ) -> u64 {
        self.changes_processed.with_label_values(&[kind.as_str(), op]).get()
    }

    pub fn changes_unchanged(
        &self,
        kind: EntityKind,
    ) -> u64 {
        self.changes_unchanged.with_label_values(&[kind.as_str()]).get()
    }

    pub fn changes_rejected(
        &self,
        reason: &str,
    ) -> u64 {
        self.changes_rejected.with_label_values(&[reason]).get()
    }

    pub fn cascade_removals(
        &self,
        kind: EntityKind,
    ) -> u64 {
        self.cascade_removals.with_label_values(&[kind.as_str()]).get()
    }

    pub fn sweep_removals(
        &self,
        kind: EntityKind,
    ) -> u64 {
        self.sweep_removals.with_label_values(&[kind.as_str()]).get()
    }

    pub fn messages_published(
        &self,
        kind: EntityKind,
        event: EventType,
    ) -> u64 {
        self.hub_messages_published
            .with_label_values(&[kind.as_str(), event.as_str()])
            .get()
    }

    pub fn handler_failures(&self) -> u64 {
        self.hub_handler_failures.get()
    }

    pub fn subscribers(&self) -> i64 {
        self.hub_subscribers.get()
    }

    /// Registry contents in the Prometheus text exposition format
    pub fn encode_text(&self) -> String {
        encode_registry(&self.registry)
    }
}

/// Serves `/metrics` until the shutdown signal fires.
pub async fn start_server(
    registry: Registry,
    port: u16,
    shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let (_, server) = bind_server(registry, port, shutdown_signal)?;
    server.await;
    Ok(())
}

/// Binds the `/metrics` endpoint and returns the bound address together with
/// the server future. Nothing is served until the future is polled.
///
/// Must be called from within a tokio runtime. Port 0 binds an ephemeral port.
pub fn bind_server(
    registry: Registry,
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    let metrics_route = warp::path!("metrics")
        .and(warp::any().map(move || registry.clone()))
        .and_then(metrics_handler);

    let (addr, server) = warp::serve(metrics_route)
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
            info!("metrics server received shutdown signal");
        })
        .map_err(|e| Error::Fatal(format!("metrics server failed to bind port {}: {}", port, e)))?;

    info!(%addr, "metrics server listening");
    Ok((addr, server))
}

async fn metrics_handler(registry: Registry) -> std::result::Result<impl Reply, Rejection> {
    let mut res = encode_registry(&registry);
    res.push_str(&get_metrics_body());
    Ok(res)
}

fn encode_registry(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode cache metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("cache metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

/// Export autometrics-instrumented function metrics
pub fn get_metrics_body() -> String {
    let autometrics_response = prometheus_exporter::encode_http_response();
    autometrics_response.into_body()
}
