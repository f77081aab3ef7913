use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use super::EntityKey;
use super::EntityKind;
use super::Life;
use crate::EntityChange;

/// Latest known details of a charm used in a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charm {
    pub model_uuid: String,
    pub charm_url: String,
    pub revision: u32,
    pub charm_version: String,
    pub life: Life,
    #[serde(default)]
    pub default_config: BTreeMap<String, String>,
}

impl Charm {
    pub fn new(
        model_uuid: impl Into<String>,
        charm_url: impl Into<String>,
        revision: u32,
    ) -> Self {
        Self {
            model_uuid: model_uuid.into(),
            charm_url: charm_url.into(),
            revision,
            ..Default::default()
        }
    }
}

impl Entity for Charm {
    const KIND: EntityKind = EntityKind::Charm;

    fn key(&self) -> EntityKey {
        EntityKey::new(self.model_uuid.clone(), self.charm_url.clone())
    }

    fn into_change(self) -> EntityChange {
        EntityChange::Charm(self)
    }
}
