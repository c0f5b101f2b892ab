/// World graph: entities, named collections and connectors between rooms.

use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use thiserror::Error;

use super::entity::{Entity, EntityId, Value, LOCATION};
use super::relationship::Relationship;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),
    #[error("unknown entity key '{0}'")]
    UnknownKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Attribute that blocks a door and keeps it from being opened.
pub const LOCKED: &str = "locked";

/// Openable entities carry exactly one of these.
pub const OPEN: &str = "open";
pub const CLOSED: &str = "closed";

/// Items that cannot be picked up.
pub const STATIC: &str = "static";

/// The simulated world. Entity ids are allocated here and never reused.
#[derive(Debug, Clone, Default)]
pub struct World {
    entities: BTreeMap<EntityId, Entity>,
    collections: BTreeMap<String, Vec<EntityId>>,
    relationships: Vec<Relationship>,
    next_id: u64,
}

/// Result of merging another world into this one.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Incoming id → id assigned in this world.
    pub mapping: BTreeMap<EntityId, EntityId>,
    pub connectors_added: usize,
}

/// Fluent entity construction borrowed from `World::spawn`.
pub struct Spawn<'w> {
    world: &'w mut World,
    id: EntityId,
}

impl Spawn<'_> {
    pub fn prop(self, key: &str, value: impl Into<Value>) -> Self {
        if let Some(entity) = self.world.entities.get_mut(&self.id) {
            entity.properties.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn attr(self, attribute: &str) -> Self {
        if let Some(entity) = self.world.entities.get_mut(&self.id) {
            entity.attributes.insert(attribute.to_string());
        }
        self
    }

    pub fn at(self, location: EntityId) -> Self {
        self.prop(LOCATION, Value::Entity(location))
    }

    pub fn member(self, collection: &str) -> Self {
        self.world
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(self.id);
        self
    }

    pub fn id(self) -> EntityId {
        self.id
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new entity. `var_name` is a hidden bookkeeping key.
    pub fn spawn(&mut self, var_name: &str) -> Spawn<'_> {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        let mut entity = Entity::new(id);
        entity
            .properties
            .insert("var_name".to_string(), Value::from(var_name));
        self.entities.insert(id, entity);
        Spawn { world: self, id }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entity(&self, id: EntityId) -> Result<&Entity, WorldError> {
        self.entities.get(&id).ok_or(WorldError::EntityNotFound(id))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// A named collection such as `players`, `items` or `rooms`.
    pub fn collection(&self, name: &str) -> &[EntityId] {
        self.collections
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn connect(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    pub fn by_var_name(&self, var_name: &str) -> Option<EntityId> {
        self.entities
            .values()
            .find(|e| e.property("var_name").and_then(Value::as_text) == Some(var_name))
            .map(|e| e.id)
    }

    pub fn location_of(&self, id: EntityId) -> Option<EntityId> {
        self.entities.get(&id).and_then(Entity::location)
    }

    /// Move an entity, returning its previous location.
    pub fn set_location(
        &mut self,
        id: EntityId,
        location: EntityId,
    ) -> Result<Option<EntityId>, WorldError> {
        if !self.entities.contains_key(&location) {
            return Err(WorldError::EntityNotFound(location));
        }
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::EntityNotFound(id))?;
        let previous = entity.location();
        entity
            .properties
            .insert(LOCATION.to_string(), Value::Entity(location));
        Ok(previous)
    }

    /// Items whose location is `owner`, in collection order.
    pub fn items_at(&self, owner: EntityId) -> Vec<EntityId> {
        self.collection("items")
            .iter()
            .copied()
            .filter(|id| self.location_of(*id) == Some(owner))
            .collect()
    }

    /// Tokens that identify an entity without exposing its id: the name if
    /// it has one, otherwise every describable property value, otherwise
    /// its visible attributes.
    pub fn description_tokens(&self, id: EntityId) -> Result<Vec<String>, WorldError> {
        let entity = self.entity(id)?;
        if let Some(name) = entity.name() {
            return Ok(vec![name.to_string()]);
        }
        let values = entity.describable_values();
        if !values.is_empty() {
            return Ok(values.into_iter().map(str::to_string).collect());
        }
        Ok(entity
            .visible_attributes()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Surface wording for an entity: "Ada" or "the small red ball".
    pub fn surface(&self, id: EntityId) -> Vec<String> {
        let tokens = self.description_tokens(id).unwrap_or_default();
        let named = self.get(id).and_then(Entity::name).is_some();
        if named || tokens.is_empty() {
            tokens
        } else {
            let mut words = vec!["the".to_string()];
            words.extend(tokens);
            words
        }
    }

    /// Display wording, as used in generated sentences.
    pub fn describe(&self, id: EntityId) -> String {
        crate::schema::utterance::join_tokens(&self.surface(id))
    }

    /// Every entity whose description equals `tokens`.
    pub fn resolve(&self, tokens: &[String]) -> Vec<EntityId> {
        self.entities
            .keys()
            .copied()
            .filter(|id| {
                self.description_tokens(*id)
                    .map(|d| d.as_slice() == tokens)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn is_passable(&self, relationship: &Relationship) -> bool {
        match relationship.door {
            Some(door) => self
                .get(door)
                .map(|d| !d.has_attribute(LOCKED) && !d.has_attribute(CLOSED))
                .unwrap_or(false),
            None => true,
        }
    }

    /// The connector between two rooms, if any.
    pub fn connector(&self, from: EntityId, to: EntityId) -> Option<&Relationship> {
        self.relationships
            .iter()
            .find(|r| r.other_end(from) == Some(to))
    }

    /// Rooms on either side of a door, in connector order.
    pub fn door_sides(&self, door: EntityId) -> Vec<EntityId> {
        self.relationships
            .iter()
            .filter(|r| r.door == Some(door))
            .flat_map(|r| [r.source, r.target])
            .collect()
    }

    /// Whether the entity has an open/closed state.
    pub fn is_openable(&self, id: EntityId) -> bool {
        self.get(id)
            .map_or(false, |e| e.has_attribute(OPEN) || e.has_attribute(CLOSED))
    }

    /// Rooms reachable in one move from `room`.
    pub fn neighbours(&self, room: EntityId) -> Vec<EntityId> {
        self.relationships
            .iter()
            .filter(|r| self.is_passable(r))
            .filter_map(|r| r.other_end(room))
            .collect()
    }

    /// Shortest sequence of rooms leading from `from` to `to`, excluding
    /// `from`. Breadth-first over passable connectors in insertion order.
    pub fn path(&self, from: EntityId, to: EntityId) -> Option<Vec<EntityId>> {
        if from == to {
            return Some(Vec::new());
        }
        let mut previous: BTreeMap<EntityId, EntityId> = BTreeMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(room) = queue.pop_front() {
            for next in self.neighbours(room) {
                if next == from || previous.contains_key(&next) {
                    continue;
                }
                previous.insert(next, room);
                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while let Some(&prev) = previous.get(&cursor) {
                        if prev == from {
                            break;
                        }
                        path.push(prev);
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Remove the `locked` attribute from a door. Returns whether it was locked.
    pub fn unlock(&mut self, door: EntityId) -> Result<bool, WorldError> {
        let entity = self
            .entities
            .get_mut(&door)
            .ok_or(WorldError::EntityNotFound(door))?;
        Ok(entity.attributes.remove(LOCKED))
    }

    /// Union another world into this one. Incoming entities get fresh ids
    /// so ids already handed out stay valid; entity-valued properties,
    /// collections and connectors of `other` are re-pointed accordingly.
    pub fn merge(&mut self, other: World) -> MergeReport {
        let mut mapping = BTreeMap::new();
        for id in other.entities.keys() {
            mapping.insert(*id, EntityId(self.next_id));
            self.next_id += 1;
        }
        let remap = |id: EntityId| mapping.get(&id).copied().unwrap_or(id);

        for (_, mut entity) in other.entities {
            entity.id = remap(entity.id);
            for value in entity.properties.values_mut() {
                if let Value::Entity(target) = value {
                    *target = remap(*target);
                }
            }
            self.entities.insert(entity.id, entity);
        }
        for (name, members) in other.collections {
            self.collections
                .entry(name)
                .or_default()
                .extend(members.into_iter().map(remap));
        }
        let connectors_added = other.relationships.len();
        for mut relationship in other.relationships {
            relationship.remap(remap);
            self.relationships.push(relationship);
        }

        MergeReport {
            mapping,
            connectors_added,
        }
    }

    /// Load a world from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<World, WorldError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a world from a RON string.
    pub fn parse_ron(input: &str) -> Result<World, WorldError> {
        let file: WorldFile = ron::from_str(input)?;
        let mut world = World::new();
        let mut keys: BTreeMap<String, EntityId> = BTreeMap::new();

        for decl in &file.entities {
            let mut spawn = world.spawn(&decl.key);
            for (k, v) in &decl.properties {
                spawn = spawn.prop(k, v.as_str());
            }
            for attr in &decl.attributes {
                spawn = spawn.attr(attr);
            }
            for collection in &decl.collections {
                spawn = spawn.member(collection);
            }
            keys.insert(decl.key.clone(), spawn.id());
        }

        let lookup = |key: &str| {
            keys.get(key)
                .copied()
                .ok_or_else(|| WorldError::UnknownKey(key.to_string()))
        };

        for decl in &file.entities {
            if let Some(ref location) = decl.location {
                world.set_location(lookup(&decl.key)?, lookup(location)?)?;
            }
        }
        for decl in &file.connectors {
            let mut rel = Relationship::passage(lookup(&decl.from)?, lookup(&decl.to)?);
            if let Some(ref door) = decl.door {
                rel = rel.through(lookup(door)?);
            }
            rel.bidirectional = decl.bidirectional;
            world.connect(rel);
        }

        Ok(world)
    }
}

/// Builds a world in code, referring to entities by key.
#[derive(Debug, Default)]
pub struct WorldBuilder {
    world: World,
    error: Option<WorldError>,
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&mut self, key: &str) -> Option<EntityId> {
        let found = self.world.by_var_name(key);
        if found.is_none() && self.error.is_none() {
            self.error = Some(WorldError::UnknownKey(key.to_string()));
        }
        found
    }

    pub fn room(mut self, key: &str) -> Self {
        self.world.spawn(key).prop("type", key).member("rooms");
        self
    }

    pub fn player(mut self, key: &str, name: &str, room: &str) -> Self {
        if let Some(room) = self.lookup(room) {
            self.world
                .spawn(key)
                .prop("name", name)
                .attr("person")
                .at(room)
                .member("players");
        }
        self
    }

    /// An item with describable properties, placed in a room or held by a player.
    pub fn item(mut self, key: &str, props: &[(&str, &str)], location: &str) -> Self {
        if let Some(location) = self.lookup(location) {
            let mut spawn = self.world.spawn(key);
            for (k, v) in props {
                spawn = spawn.prop(k, *v);
            }
            spawn.at(location).member("items");
        }
        self
    }

    pub fn passage(mut self, from: &str, to: &str) -> Self {
        if let (Some(from), Some(to)) = (self.lookup(from), self.lookup(to)) {
            self.world.connect(Relationship::passage(from, to));
        }
        self
    }

    pub fn door(mut self, key: &str, from: &str, to: &str, locked: bool) -> Self {
        if let (Some(from), Some(to)) = (self.lookup(from), self.lookup(to)) {
            let mut spawn = self.world.spawn(key).prop("type", "door").member("doors");
            if locked {
                spawn = spawn.attr(LOCKED);
            }
            let door = spawn.id();
            self.world.connect(Relationship::passage(from, to).through(door));
        }
        self
    }

    pub fn build(self) -> Result<World, WorldError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.world),
        }
    }
}

// RON deserialization helpers: world files refer to entities by key.

#[derive(Debug, Deserialize)]
struct WorldFile {
    entities: Vec<EntityDecl>,
    #[serde(default)]
    connectors: Vec<ConnectorDecl>,
}

#[derive(Debug, Deserialize)]
struct EntityDecl {
    key: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectorDecl {
    from: String,
    to: String,
    #[serde(default)]
    door: Option<String>,
    #[serde(default = "default_true")]
    bidirectional: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_world() -> (World, EntityId, EntityId, EntityId, EntityId) {
        let mut world = World::new();
        let hall = world.spawn("hall").prop("type", "hall").member("rooms").id();
        let kitchen = world
            .spawn("kitchen")
            .prop("type", "kitchen")
            .member("rooms")
            .id();
        let garden = world
            .spawn("garden")
            .prop("type", "garden")
            .member("rooms")
            .id();
        let door = world
            .spawn("back_door")
            .prop("material", "oak")
            .prop("type", "door")
            .attr(LOCKED)
            .id();
        world.connect(Relationship::passage(hall, kitchen));
        world.connect(Relationship::passage(kitchen, garden).through(door));
        (world, hall, kitchen, garden, door)
    }

    #[test]
    fn description_prefers_name() {
        let mut world = World::new();
        let ada = world
            .spawn("ada")
            .prop("name", "Ada")
            .prop("type", "person")
            .attr("main")
            .id();
        let ball = world
            .spawn("ball")
            .prop("size", "small")
            .prop("color", "red")
            .prop("type", "ball")
            .id();
        assert_eq!(world.description_tokens(ada).unwrap(), vec!["Ada"]);
        assert_eq!(
            world.description_tokens(ball).unwrap(),
            vec!["small", "red", "ball"]
        );
        assert_eq!(world.surface(ball), vec!["the", "small", "red", "ball"]);
        assert_eq!(world.resolve(&["Ada".to_string()]), vec![ada]);
    }

    #[test]
    fn path_stops_at_locked_door() {
        let (mut world, hall, kitchen, garden, door) = make_world();
        assert_eq!(world.path(hall, kitchen), Some(vec![kitchen]));
        assert_eq!(world.path(hall, garden), None);
        assert!(world.unlock(door).unwrap());
        assert_eq!(world.path(hall, garden), Some(vec![kitchen, garden]));
        assert_eq!(world.path(garden, garden), Some(vec![]));
    }

    #[test]
    fn closed_door_blocks_until_opened() {
        let (mut world, hall, kitchen, garden, door) = make_world();
        world.unlock(door).unwrap();
        if let Some(d) = world.get_mut(door) {
            d.attributes.insert(CLOSED.to_string());
        }
        assert!(world.is_openable(door));
        assert!(!world.is_openable(hall));
        assert_eq!(world.door_sides(door), vec![kitchen, garden]);
        assert_eq!(world.path(hall, garden), None);
        if let Some(d) = world.get_mut(door) {
            d.attributes.remove(CLOSED);
            d.attributes.insert(OPEN.to_string());
        }
        assert_eq!(world.path(hall, garden), Some(vec![kitchen, garden]));
    }

    #[test]
    fn merge_keeps_existing_ids() {
        let (mut world, hall, _, _, _) = make_world();
        let mut annex = World::new();
        let shed = annex.spawn("shed").prop("type", "shed").member("rooms").id();
        let rake = annex
            .spawn("rake")
            .prop("type", "rake")
            .member("items")
            .at(shed)
            .id();
        annex.connect(Relationship::passage(shed, shed));

        let before = world.len();
        let report = world.merge(annex);
        assert_eq!(world.len(), before + 2);
        assert_eq!(world.get(hall).and_then(|e| e.property("type")), Some(&Value::from("hall")));

        let new_shed = report.mapping[&shed];
        let new_rake = report.mapping[&rake];
        assert_ne!(new_shed, shed);
        assert_eq!(world.location_of(new_rake), Some(new_shed));
        assert!(world.collection("rooms").contains(&new_shed));
        assert_eq!(report.connectors_added, 1);
    }

    #[test]
    fn builder_reports_unknown_room() {
        let world = WorldBuilder::new()
            .room("kitchen")
            .player("ada", "Ada", "kitchen")
            .build()
            .unwrap();
        let ada = world.by_var_name("ada").unwrap();
        assert_eq!(world.describe(ada), "Ada");

        let err = WorldBuilder::new().player("ada", "Ada", "attic").build();
        assert!(matches!(err, Err(WorldError::UnknownKey(k)) if k == "attic"));
    }

    #[test]
    fn parse_world_from_ron() {
        let input = r#"(
            entities: [
                (key: "bedroom", properties: {"type": "bedroom"}, collections: ["rooms"]),
                (key: "ada", properties: {"name": "Ada"}, attributes: ["person"],
                 location: Some("bedroom"), collections: ["players"]),
            ],
        )"#;
        let world = World::parse_ron(input).unwrap();
        let ada = world.by_var_name("ada").unwrap();
        let bedroom = world.by_var_name("bedroom").unwrap();
        assert_eq!(world.location_of(ada), Some(bedroom));
        assert_eq!(world.collection("players"), &[ada]);
    }

    #[test]
    fn parse_world_unknown_location_errors() {
        let input = r#"(entities: [(key: "ada", location: Some("nowhere"))])"#;
        assert!(matches!(
            World::parse_ron(input),
            Err(WorldError::UnknownKey(k)) if k == "nowhere"
        ));
    }
}
