use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use super::EntityKey;
use super::EntityKind;
use super::Life;
use crate::EntityChange;

/// Latest known details of an application deployed in a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub model_uuid: String,
    pub name: String,
    pub charm_url: String,
    pub life: Life,
    pub exposed: bool,
    pub min_units: u32,
    pub subordinate: bool,
    pub workload_version: String,
    /// Application config settings
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Application {
    pub fn new(
        model_uuid: impl Into<String>,
        name: impl Into<String>,
        charm_url: impl Into<String>,
    ) -> Self {
        Self {
            model_uuid: model_uuid.into(),
            name: name.into(),
            charm_url: charm_url.into(),
            ..Default::default()
        }
    }
}

impl Entity for Application {
    const KIND: EntityKind = EntityKind::Application;

    fn key(&self) -> EntityKey {
        EntityKey::new(self.model_uuid.clone(), self.name.clone())
    }

    fn into_change(self) -> EntityChange {
        EntityChange::Application(self)
    }
}
