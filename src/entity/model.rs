use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use super::EntityKey;
use super::EntityKind;
use super::Life;
use crate::EntityChange;

/// Latest known details of a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub model_uuid: String,
    pub name: String,
    pub owner: String,
    pub cloud: String,
    pub cloud_region: String,
    pub life: Life,
    /// Model config settings
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Model {
    pub fn new(
        model_uuid: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            model_uuid: model_uuid.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Entity for Model {
    const KIND: EntityKind = EntityKind::Model;

    fn key(&self) -> EntityKey {
        EntityKey::model(self.model_uuid.clone())
    }

    fn into_change(self) -> EntityChange {
        EntityChange::Model(self)
    }
}
