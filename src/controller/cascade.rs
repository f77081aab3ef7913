//! Cascading removal rules.
//!
//! Stores do not know about each other. When an owning entity goes away the
//! cache plans synthetic removal records for everything scoped under it and
//! applies them before removing the owner itself.

use super::ControllerCache;
use crate::ChangeRecord;
use crate::Entity;
use crate::EntityKey;
use crate::EntityKind;
use crate::EntityStore;

impl ControllerCache {
    /// Removal records for the dependents of `kind`/`key`, in the order they
    /// must be applied.
    pub(super) fn cascade_records(
        &self,
        kind: EntityKind,
        key: &EntityKey,
    ) -> Vec<ChangeRecord> {
        match kind {
            EntityKind::Model => {
                let model_uuid = key.model_uuid.as_str();
                let mut records = scoped(&self.units, model_uuid);
                records.extend(scoped(&self.applications, model_uuid));
                records.extend(scoped(&self.machines, model_uuid));
                records.extend(scoped(&self.charms, model_uuid));
                records
            }
            EntityKind::Application if self.config.cascade_application_units => self
                .units_of_application(&key.model_uuid, &key.id)
                .into_iter()
                .map(|unit| unit.identity().into())
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn scoped<E: Entity>(
    store: &Option<EntityStore<E>>,
    model_uuid: &str,
) -> Vec<ChangeRecord> {
    let Some(store) = store else {
        return Vec::new();
    };
    store
        .keys(|k| k.is_scoped_to(model_uuid))
        .into_iter()
        .map(|key| ChangeRecord::remove(E::KIND, key))
        .collect()
}
