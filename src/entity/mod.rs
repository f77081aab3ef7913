//! Entity kinds, identities and the per-kind field sets held by the cache.
//!
//! Every cached value is a plain, cloneable details struct. The cache owns one
//! snapshot per identity and hands out copies; the details types never carry
//! locks or references to shared collaborators.
mod application;
mod charm;
mod machine;
mod model;
mod unit;
pub use application::*;
pub use charm::*;
pub use machine::*;
pub use model::*;
pub use unit::*;

#[cfg(test)]
mod entity_test;

use std::fmt;
use std::fmt::Debug;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::CacheError;

/// Category of cluster object mirrored by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Model,
    Application,
    Machine,
    Unit,
    Charm,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Model,
        EntityKind::Application,
        EntityKind::Machine,
        EntityKind::Unit,
        EntityKind::Charm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Model => "model",
            EntityKind::Application => "application",
            EntityKind::Machine => "machine",
            EntityKind::Unit => "unit",
            EntityKind::Charm => "charm",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "model" => Ok(EntityKind::Model),
            "application" => Ok(EntityKind::Application),
            "machine" => Ok(EntityKind::Machine),
            "unit" => Ok(EntityKind::Unit),
            "charm" => Ok(EntityKind::Charm),
            _ => Err(CacheError::UnknownKind(s.to_string())),
        }
    }
}

/// Unique key of an entity within its kind.
///
/// All entities are scoped by the UUID of the model they live in. For a
/// model itself `id` equals `model_uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub model_uuid: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(
        model_uuid: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            model_uuid: model_uuid.into(),
            id: id.into(),
        }
    }

    /// Key of the model with the given UUID
    pub fn model(model_uuid: impl Into<String>) -> Self {
        let model_uuid = model_uuid.into();
        Self {
            id: model_uuid.clone(),
            model_uuid,
        }
    }

    pub fn is_scoped_to(
        &self,
        model_uuid: &str,
    ) -> bool {
        self.model_uuid == model_uuid
    }
}

impl fmt::Display for EntityKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.id == self.model_uuid {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}:{}", self.model_uuid, self.id)
        }
    }
}

/// Composite identity: entity kind plus key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub kind: EntityKind,
    pub key: EntityKey,
}

impl Identity {
    pub fn new(
        kind: EntityKind,
        key: EntityKey,
    ) -> Self {
        Self { kind, key }
    }
}

impl fmt::Display for Identity {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.key)
    }
}

/// Lifecycle of the upstream object, as reported by the backing store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    #[default]
    Alive,
    Dying,
    Dead,
}

/// Field set of one entity kind
pub trait Entity: Clone + Debug + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;

    fn key(&self) -> EntityKey;

    fn identity(&self) -> Identity {
        Identity::new(Self::KIND, self.key())
    }

    /// Wrap into the kind-tagged change payload
    fn into_change(self) -> crate::EntityChange;
}
