use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use super::EntityKey;
use super::EntityKind;
use super::Life;
use crate::EntityChange;

/// Latest known details of a machine (or container) in a model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub model_uuid: String,
    pub id: String,
    pub instance_id: String,
    pub base: String,
    pub life: Life,
    pub agent_status: String,
    #[serde(default)]
    pub hardware_characteristics: BTreeMap<String, String>,
    pub is_container: bool,
}

impl Machine {
    pub fn new(
        model_uuid: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            model_uuid: model_uuid.into(),
            // "0/lxd/1" style ids name containers
            is_container: id.contains('/'),
            id,
            ..Default::default()
        }
    }
}

impl Entity for Machine {
    const KIND: EntityKind = EntityKind::Machine;

    fn key(&self) -> EntityKey {
        EntityKey::new(self.model_uuid.clone(), self.id.clone())
    }

    fn into_change(self) -> EntityChange {
        EntityChange::Machine(self)
    }
}
