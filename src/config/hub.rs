use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Notification hub tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HubConfig {
    /// Name prefix of the per-subscriber delivery threads
    ///
    /// **Default**: "cache-hub"
    #[serde(default = "default_worker_thread_prefix")]
    pub worker_thread_prefix: String,

    /// Queue depth of a single subscriber above which a warning is logged.
    /// Queues are unbounded; this only surfaces slow handlers.
    ///
    /// **Default**: 1024
    #[serde(default = "default_backlog_warn_threshold")]
    pub backlog_warn_threshold: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            worker_thread_prefix: default_worker_thread_prefix(),
            backlog_warn_threshold: default_backlog_warn_threshold(),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backlog_warn_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "hub.backlog_warn_threshold must be greater than 0".into(),
            )));
        }
        if self.worker_thread_prefix.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "hub.worker_thread_prefix cannot be empty".into(),
            )));
        }
        Ok(())
    }
}

fn default_worker_thread_prefix() -> String {
    "cache-hub".to_string()
}

fn default_backlog_warn_threshold() -> usize {
    1024
}
