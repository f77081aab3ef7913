use serde::Deserialize;
use serde::Serialize;

use super::Entity;
use super::EntityKey;
use super::EntityKind;
use super::Life;
use crate::EntityChange;

/// Latest known details of a unit of an application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub model_uuid: String,
    /// Unit name, e.g. "mysql/0"
    pub name: String,
    pub application: String,
    pub machine_id: String,
    pub charm_url: String,
    pub life: Life,
    /// Principal unit name for subordinates
    pub principal: Option<String>,
    pub subordinate: bool,
    pub workload_status: String,
}

impl Unit {
    pub fn new(
        model_uuid: impl Into<String>,
        name: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            model_uuid: model_uuid.into(),
            name: name.into(),
            application: application.into(),
            ..Default::default()
        }
    }
}

impl Entity for Unit {
    const KIND: EntityKind = EntityKind::Unit;

    fn key(&self) -> EntityKey {
        EntityKey::new(self.model_uuid.clone(), self.name.clone())
    }

    fn into_change(self) -> EntityChange {
        EntityChange::Unit(self)
    }
}
