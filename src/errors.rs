//! Controller Cache Error Hierarchy
//!
//! Defines the error types surfaced by the cache, the notification hub and
//! the ambient layers (configuration, metrics).

use config::ConfigError;

use crate::EntityKey;
use crate::EntityKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a subscriber handler. Logged and counted by the hub,
/// never propagated to the publisher.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cache lookup and dispatch failures
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Notification hub failures
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Metric registration failures
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// A change record names a kind with no registered store.
    /// The record is dropped; processing of later records continues.
    #[error("No store registered for entity kind {0:?}")]
    UnknownKind(String),

    /// Lookup of an identity that is not cached
    #[error("{kind} {key} not found")]
    NotFound { kind: EntityKind, key: EntityKey },
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Subscriber worker thread could not be started
    #[error("Failed to start subscriber worker: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

impl Error {
    /// True when the error is a normal negative lookup result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Cache(e) if e.is_not_found())
    }
}
