//! In-memory controller cache.
//!
//! Mirrors the models, applications, machines, units and charms of a
//! controller from an upstream change stream, fans updates out to in-process
//! subscribers and exposes gauges for an external collector.
mod change;
mod config;
mod controller;
mod entity;
mod errors;
mod hub;
mod metrics;
mod store;

pub use change::*;
pub use config::*;
pub use controller::*;
pub use entity::*;
pub use errors::*;
pub use hub::*;
pub use metrics::*;
pub use store::*;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
