/// Environment effects: actions change the world, observations report it.

use crate::core::phrasing::{Lexicon, SchemaSet};
use crate::core::sentences;
use crate::schema::entity::EntityId;
use crate::schema::frame::{roles, Frame, Mood};
use crate::schema::utterance::Utterance;
use crate::schema::world::{World, WorldError, CLOSED, LOCKED, OPEN, STATIC};

/// Applies action utterances to the world.
#[derive(Debug, Clone, Copy)]
pub struct Environment {
    /// Report what is in a room on arrival.
    pub look_on_arrival: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            look_on_arrival: true,
        }
    }
}

impl Environment {
    /// Apply every action in `utterance` and return the trusted observations
    /// it caused, in order.
    pub fn apply(
        &self,
        utterance: &Utterance,
        world: &mut World,
        schemas: &SchemaSet,
    ) -> Result<Vec<Utterance>, WorldError> {
        let mut observed = Vec::new();
        for frame in &utterance.frames {
            let Some(agent) = own_action(frame, utterance.speaker) else {
                continue;
            };
            let frames = match (frame.predicate.as_str(), frame.entity(roles::THEME)) {
                ("go", _) => match frame.entity(roles::DESTINATION) {
                    Some(destination) => self.go(agent, destination, world)?,
                    None => Vec::new(),
                },
                ("get", Some(item)) => get(agent, item, world)?,
                ("drop", Some(item)) => drop(agent, item, world)?,
                ("open", Some(target)) => set_open(agent, target, true, world)?,
                ("close", Some(target)) => set_open(agent, target, false, world)?,
                ("look", Some(target)) => look_at(agent, target, world)?,
                _ => Vec::new(),
            };
            observed.extend(frames);
        }
        let lex = Lexicon::new(world, schemas);
        Ok(observed
            .into_iter()
            .map(|frame| sentences::observe(&lex, frame))
            .collect())
    }

    fn go(
        &self,
        agent: EntityId,
        destination: EntityId,
        world: &mut World,
    ) -> Result<Vec<Frame>, WorldError> {
        world.entity(destination)?;
        let from = room_of(agent, world)?;

        if from != destination {
            let Some(connector) = world.connector(from, destination) else {
                tracing::debug!(agent = %agent, from = %from, to = %destination, "no connector");
                return Ok(Vec::new());
            };
            if !world.is_passable(connector) {
                let Some(door) = connector.door else {
                    return Ok(Vec::new());
                };
                let reason = if world.entity(door)?.has_attribute(LOCKED) {
                    LOCKED
                } else {
                    CLOSED
                };
                return Ok(vec![sentences::attribute(door, reason)]);
            }
            world.set_location(agent, destination)?;
        }

        let mut frames = vec![sentences::located(agent, destination)];
        if self.look_on_arrival {
            frames.extend(look(world, agent, destination));
        }
        Ok(frames)
    }
}

/// The acting agent of a statement it utters itself.
fn own_action(frame: &Frame, speaker: Option<EntityId>) -> Option<EntityId> {
    if frame.mood != Mood::Statement {
        return None;
    }
    let agent = frame.entity(roles::AGENT)?;
    (speaker == Some(agent)).then_some(agent)
}

fn room_of(agent: EntityId, world: &World) -> Result<EntityId, WorldError> {
    world
        .entity(agent)?
        .location()
        .ok_or(WorldError::EntityNotFound(agent))
}

/// Within reach: in the agent's room, carried by the agent or by someone
/// in the room, or a door of the room.
fn within_reach(agent: EntityId, target: EntityId, world: &World) -> Result<bool, WorldError> {
    let room = room_of(agent, world)?;
    let reach = match world.location_of(target) {
        Some(place) if place == room || place == agent => true,
        Some(place) => {
            world.collection("players").contains(&place) && world.location_of(place) == Some(room)
        }
        None => world.door_sides(target).contains(&room),
    };
    Ok(reach)
}

/// Out of reach: say where it is not, when it lies somewhere.
fn out_of_reach(agent: EntityId, target: EntityId, world: &World) -> Result<Vec<Frame>, WorldError> {
    let room = room_of(agent, world)?;
    Ok(world
        .location_of(target)
        .map(|_| sentences::located(target, room).negated())
        .into_iter()
        .collect())
}

fn get(agent: EntityId, item: EntityId, world: &mut World) -> Result<Vec<Frame>, WorldError> {
    if !world.collection("items").contains(&item) {
        tracing::debug!(agent = %agent, target = %item, "not an item");
        return Ok(Vec::new());
    }
    let room = room_of(agent, world)?;
    if world.entity(item)?.has_attribute(STATIC) {
        return Ok(vec![sentences::attribute(item, STATIC)]);
    }
    match world.location_of(item) {
        Some(place) if place == agent => Ok(vec![sentences::located(item, agent)]),
        Some(place) if place == room => {
            world.set_location(item, agent)?;
            Ok(vec![sentences::located(item, agent)])
        }
        _ => Ok(vec![sentences::located(item, room).negated()]),
    }
}

fn drop(agent: EntityId, item: EntityId, world: &mut World) -> Result<Vec<Frame>, WorldError> {
    if world.location_of(item) != Some(agent) {
        return Ok(vec![sentences::located(item, agent).negated()]);
    }
    let room = room_of(agent, world)?;
    world.set_location(item, room)?;
    Ok(vec![sentences::located(item, room)])
}

/// Open or close `target`. Locked entities stay closed.
fn set_open(
    agent: EntityId,
    target: EntityId,
    open: bool,
    world: &mut World,
) -> Result<Vec<Frame>, WorldError> {
    if !world.is_openable(target) {
        tracing::debug!(agent = %agent, target = %target, "nothing to open or close");
        return Ok(Vec::new());
    }
    if !within_reach(agent, target, world)? {
        return out_of_reach(agent, target, world);
    }
    let (set, unset) = if open { (OPEN, CLOSED) } else { (CLOSED, OPEN) };
    let entity = world
        .get_mut(target)
        .ok_or(WorldError::EntityNotFound(target))?;
    if entity.has_attribute(set) {
        return Ok(vec![sentences::attribute(target, set)]);
    }
    if open && entity.has_attribute(LOCKED) {
        return Ok(vec![sentences::attribute(target, LOCKED)]);
    }
    entity.attributes.remove(unset);
    entity.attributes.insert(set.to_string());
    Ok(vec![
        sentences::attribute(target, set),
        sentences::attribute(target, unset).negated(),
    ])
}

/// Looking at the room shows its contents, at a player their possessions,
/// at anything else where it is, its attributes and, when open, what is
/// inside.
fn look_at(agent: EntityId, target: EntityId, world: &World) -> Result<Vec<Frame>, WorldError> {
    let room = room_of(agent, world)?;
    if target == room {
        return Ok(look(world, agent, room));
    }
    if world.collection("rooms").contains(&target) {
        return Ok(vec![sentences::located(agent, target).negated()]);
    }
    if world.collection("players").contains(&target) {
        if target != agent && world.location_of(target) != Some(room) {
            return out_of_reach(agent, target, world);
        }
        return Ok(vec![sentences::have(target, &world.items_at(target))]);
    }
    if !within_reach(agent, target, world)? {
        return out_of_reach(agent, target, world);
    }

    let entity = world.entity(target)?;
    let mut frames: Vec<Frame> = entity
        .location()
        .map(|place| sentences::located(target, place))
        .into_iter()
        .collect();
    frames.extend(
        entity
            .visible_attributes()
            .into_iter()
            .map(|attribute| sentences::attribute(target, attribute)),
    );
    if entity.has_attribute(OPEN) {
        frames.extend(
            world
                .items_at(target)
                .into_iter()
                .map(|item| sentences::located(item, target)),
        );
    }
    Ok(frames)
}

/// What `viewer` sees in `room`: the items lying there and the other players.
fn look(world: &World, viewer: EntityId, room: EntityId) -> Vec<Frame> {
    let mut frames: Vec<Frame> = world
        .items_at(room)
        .into_iter()
        .map(|item| sentences::located(item, room))
        .collect();
    for player in world.collection("players") {
        if *player != viewer && world.location_of(*player) == Some(room) {
            frames.push(sentences::located(*player, room));
        }
    }
    frames
}
