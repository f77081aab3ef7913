use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::EntityChange;
use crate::EntityKind;
use crate::Identity;

/// What happened to the entity named by a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Entity was created or its details changed
    Updated,
    /// Entity was removed from the cache
    Removed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Updated => "updated",
            EventType::Removed => "removed",
        }
    }
}

/// Routing key of one hub message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub event: EventType,
    pub identity: Identity,
}

impl Topic {
    pub fn updated(identity: Identity) -> Self {
        Self {
            event: EventType::Updated,
            identity,
        }
    }

    pub fn removed(identity: Identity) -> Self {
        Self {
            event: EventType::Removed,
            identity,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.identity.kind
    }
}

impl fmt::Display for Topic {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{} {}", self.identity, self.event.as_str())
    }
}

/// Subscriber-side filter over topics.
///
/// Every unset field matches anything, so `TopicPattern::all()` receives
/// every message.
///
/// ```ignore
/// // Removal of any machine in one model
/// let pattern = TopicPattern::all()
///     .kind(EntityKind::Machine)
///     .event(EventType::Removed)
///     .model("deadbeef");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPattern {
    kind: Option<EntityKind>,
    event: Option<EventType>,
    model_uuid: Option<String>,
    id: Option<String>,
}

impl TopicPattern {
    pub fn all() -> Self {
        Self::default()
    }

    /// Pattern matching every event of exactly one entity
    pub fn entity(identity: &Identity) -> Self {
        Self::all()
            .kind(identity.kind)
            .model(identity.key.model_uuid.clone())
            .id(identity.key.id.clone())
    }

    pub fn kind(
        mut self,
        kind: EntityKind,
    ) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn event(
        mut self,
        event: EventType,
    ) -> Self {
        self.event = Some(event);
        self
    }

    pub fn model(
        mut self,
        model_uuid: impl Into<String>,
    ) -> Self {
        self.model_uuid = Some(model_uuid.into());
        self
    }

    pub fn id(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn matches(
        &self,
        topic: &Topic,
    ) -> bool {
        let key = &topic.identity.key;
        self.kind.map_or(true, |k| k == topic.identity.kind)
            && self.event.map_or(true, |e| e == topic.event)
            && self.model_uuid.as_deref().map_or(true, |m| m == key.model_uuid)
            && self.id.as_deref().map_or(true, |id| id == key.id)
    }
}

/// Notification delivered to subscribers.
///
/// For `Removed` events `details` holds the last cached details of the entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Topic,
    pub details: EntityChange,
}
