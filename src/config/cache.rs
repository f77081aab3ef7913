use std::collections::BTreeSet;
use std::str::FromStr;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::EntityKind;
use crate::Error;
use crate::Result;

/// Store registration and cascade behaviour of the controller cache
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Entity kinds that get a store. Change records for any other kind are
    /// rejected with `UnknownKind`.
    ///
    /// **Default**: all kinds
    #[serde(default = "default_enabled_kinds")]
    pub enabled_kinds: Vec<String>,

    /// Remove an application's units together with the application
    ///
    /// **Default**: true
    #[serde(default = "default_cascade_application_units")]
    pub cascade_application_units: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled_kinds: default_enabled_kinds(),
            cascade_application_units: default_cascade_application_units(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        self.kinds().map(|_| ())
    }

    /// Parsed set of enabled kinds
    pub fn kinds(&self) -> Result<BTreeSet<EntityKind>> {
        self.enabled_kinds
            .iter()
            .map(|name| {
                EntityKind::from_str(name).map_err(|_| {
                    Error::Config(ConfigError::Message(format!(
                        "cache.enabled_kinds contains unknown kind {:?}",
                        name
                    )))
                })
            })
            .collect()
    }
}

fn default_enabled_kinds() -> Vec<String> {
    EntityKind::ALL.iter().map(|k| k.as_str().to_string()).collect()
}

fn default_cascade_application_units() -> bool {
    true
}
