use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Newtype wrapper for entity IDs. Internal only: an id never reaches the
/// token stream or the surface text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Property keys that may be shown to a model, in the order they appear in
/// an entity's description.
pub const DESCRIBABLE_KEYS: &[&str] = &["name", "nickname", "size", "color", "material", "type"];

/// Property keys that are bookkeeping only.
pub const HIDDEN_KEYS: &[&str] = &["var_name"];

/// Attributes that would trivially identify an entity.
pub const HIDDEN_ATTRIBUTES: &[&str] = &["main"];

/// Property key holding the location relation (possession is a location
/// whose value is a player).
pub const LOCATION: &str = "location";

/// A dynamic value that can be stored in entity properties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Entity(EntityId),
}

impl Value {
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Self::Entity(id)
    }
}

/// Anything that lives in the world: a player, a room, an item, a door.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub properties: BTreeMap<String, Value>,
    pub attributes: FxHashSet<String>,
}

impl Entity {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            properties: BTreeMap::new(),
            attributes: FxHashSet::default(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains(attribute)
    }

    pub fn location(&self) -> Option<EntityId> {
        self.properties.get(LOCATION).and_then(Value::as_entity)
    }

    /// The `name` property, if the entity has one.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name").and_then(Value::as_text)
    }

    /// Describable property values in description order.
    pub fn describable_values(&self) -> Vec<&str> {
        DESCRIBABLE_KEYS
            .iter()
            .filter_map(|key| self.properties.get(*key).and_then(Value::as_text))
            .collect()
    }

    /// Attributes that may be shown, sorted so descriptions are stable.
    pub fn visible_attributes(&self) -> Vec<&str> {
        let mut attrs: Vec<&str> = self
            .attributes
            .iter()
            .map(String::as_str)
            .filter(|a| !HIDDEN_ATTRIBUTES.contains(a))
            .collect();
        attrs.sort_unstable();
        attrs
    }
}

/// True if the key may appear in a description or a token stream.
pub fn is_describable_key(key: &str) -> bool {
    !HIDDEN_KEYS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entity() -> Entity {
        let mut entity = Entity::new(EntityId(7));
        entity
            .properties
            .insert("name".to_string(), Value::from("Ada"));
        entity
            .properties
            .insert("type".to_string(), Value::from("person"));
        entity
            .properties
            .insert("var_name".to_string(), Value::from("ada"));
        entity
            .properties
            .insert(LOCATION.to_string(), Value::Entity(EntityId(2)));
        entity.attributes.insert("main".to_string());
        entity.attributes.insert("person".to_string());
        entity
    }

    #[test]
    fn describable_values_skip_hidden_keys() {
        let entity = make_entity();
        assert_eq!(entity.describable_values(), vec!["Ada", "person"]);
    }

    #[test]
    fn visible_attributes_skip_main() {
        let entity = make_entity();
        assert_eq!(entity.visible_attributes(), vec!["person"]);
        assert!(entity.has_attribute("main"));
    }

    #[test]
    fn location_reads_entity_value() {
        let entity = make_entity();
        assert_eq!(entity.location(), Some(EntityId(2)));
        assert_eq!(entity.name(), Some("Ada"));
    }

    #[test]
    fn hidden_key_check() {
        assert!(!is_describable_key("var_name"));
        assert!(is_describable_key("color"));
    }
}
