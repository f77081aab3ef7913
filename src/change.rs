//! Change records delivered by the upstream watcher.
//!
//! A record is immutable once built and is consumed exactly once by the
//! store matching its kind. Upserts carry the full latest field set of one
//! entity; removals carry only the identity.

use serde::Deserialize;
use serde::Serialize;

use crate::Application;
use crate::Charm;
use crate::Entity;
use crate::EntityKey;
use crate::EntityKind;
use crate::Identity;
use crate::Machine;
use crate::Model;
use crate::Unit;

/// Kind-tagged entity details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "lowercase")]
pub enum EntityChange {
    Model(Model),
    Application(Application),
    Machine(Machine),
    Unit(Unit),
    Charm(Charm),
}

impl EntityChange {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityChange::Model(_) => EntityKind::Model,
            EntityChange::Application(_) => EntityKind::Application,
            EntityChange::Machine(_) => EntityKind::Machine,
            EntityChange::Unit(_) => EntityKind::Unit,
            EntityChange::Charm(_) => EntityKind::Charm,
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            EntityChange::Model(m) => m.key(),
            EntityChange::Application(a) => a.key(),
            EntityChange::Machine(m) => m.key(),
            EntityChange::Unit(u) => u.key(),
            EntityChange::Charm(c) => c.key(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.kind(), self.key())
    }
}

/// One upstream state mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRecord {
    /// Create or update an entity with the given details
    Upsert(EntityChange),
    /// Remove an entity. Kind is carried by name so that records for kinds
    /// this process does not know can still be decoded and rejected.
    Remove { kind: String, key: EntityKey },
}

impl ChangeRecord {
    pub fn upsert<E: Entity>(details: E) -> Self {
        ChangeRecord::Upsert(details.into_change())
    }

    pub fn remove(
        kind: EntityKind,
        key: EntityKey,
    ) -> Self {
        ChangeRecord::Remove {
            kind: kind.as_str().to_string(),
            key,
        }
    }

    /// Declared kind name of the record
    pub fn kind_name(&self) -> &str {
        match self {
            ChangeRecord::Upsert(change) => change.kind().as_str(),
            ChangeRecord::Remove { kind, .. } => kind,
        }
    }

    pub fn key(&self) -> EntityKey {
        match self {
            ChangeRecord::Upsert(change) => change.key(),
            ChangeRecord::Remove { key, .. } => key.clone(),
        }
    }
}

impl From<EntityChange> for ChangeRecord {
    fn from(change: EntityChange) -> Self {
        ChangeRecord::Upsert(change)
    }
}

impl From<Identity> for ChangeRecord {
    fn from(identity: Identity) -> Self {
        ChangeRecord::remove(identity.kind, identity.key)
    }
}
