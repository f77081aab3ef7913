use std::str::FromStr;

use super::*;
use crate::CacheError;

#[test]
fn test_entity_kind_parses_case_insensitively() {
    assert_eq!(EntityKind::from_str("Model").unwrap(), EntityKind::Model);
    assert_eq!(EntityKind::from_str(" charm ").unwrap(), EntityKind::Charm);
    for kind in EntityKind::ALL {
        assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
    }
}

#[test]
fn test_entity_kind_rejects_unknown_name() {
    let err = EntityKind::from_str("relation").unwrap_err();
    assert_eq!(err, CacheError::UnknownKind("relation".to_string()));
}

#[test]
fn test_model_key_uses_uuid_as_id() {
    let model = Model::new("uuid-1", "default");
    let key = model.key();

    assert_eq!(key, EntityKey::model("uuid-1"));
    assert_eq!(key.id, "uuid-1");
    assert_eq!(key.to_string(), "uuid-1");
}

#[test]
fn test_scoped_keys_display_model_prefix() {
    let unit = Unit::new("uuid-1", "mysql/0", "mysql");
    let identity = unit.identity();

    assert_eq!(identity.kind, EntityKind::Unit);
    assert_eq!(identity.to_string(), "unit/uuid-1:mysql/0");
    assert!(identity.key.is_scoped_to("uuid-1"));
    assert!(!identity.key.is_scoped_to("uuid-2"));
}

#[test]
fn test_machine_container_detection() {
    assert!(!Machine::new("uuid-1", "0").is_container);
    assert!(Machine::new("uuid-1", "0/lxd/1").is_container);
}

#[test]
fn test_charm_identity_ignores_revision() {
    let a = Charm::new("uuid-1", "ch1", 3);
    let b = Charm::new("uuid-1", "ch1", 4);

    assert_eq!(a.key(), b.key());
    assert_ne!(a, b);
}
