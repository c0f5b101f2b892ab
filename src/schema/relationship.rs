use serde::{Deserialize, Serialize};

use super::entity::EntityId;

/// A passage between two rooms, optionally through a door entity.
///
/// The door carries the `locked` or `closed` attribute; a connector without a door is
/// always passable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityId,
    pub target: EntityId,
    pub rel_type: String,
    pub door: Option<EntityId>,
    pub bidirectional: bool,
}

impl Relationship {
    pub fn passage(source: EntityId, target: EntityId) -> Self {
        Self {
            source,
            target,
            rel_type: "passage".to_string(),
            door: None,
            bidirectional: true,
        }
    }

    pub fn through(mut self, door: EntityId) -> Self {
        self.rel_type = "door".to_string();
        self.door = Some(door);
        self
    }

    /// The room reached from `from`, if this connector leads out of it.
    pub fn other_end(&self, from: EntityId) -> Option<EntityId> {
        if self.source == from {
            Some(self.target)
        } else if self.bidirectional && self.target == from {
            Some(self.source)
        } else {
            None
        }
    }

    pub fn remap(&mut self, f: impl Fn(EntityId) -> EntityId) {
        self.source = f(self.source);
        self.target = f(self.target);
        self.door = self.door.map(&f);
    }
}
