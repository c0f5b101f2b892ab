/// Built-in updaters. Each looks at one frame and may write facts.

use crate::core::knowledge::{FactWriter, Proposition, Updater};
use crate::schema::entity::EntityId;
use crate::schema::frame::{roles, ArgValue, Frame, Mood};
use crate::schema::world::{World, CLOSED, OPEN};

/// Registration order: property, openness, have, go, get, drop, statement.
pub fn defaults() -> Vec<Updater> {
    vec![
        property_update,
        openness_update,
        have_update,
        go_update,
        get_update,
        drop_update,
        statement_update,
    ]
}

/// Predicates that describe an action rather than a fact.
const ACTIONS: &[&str] = &["go", "get", "drop", "look", "open", "close"];

/// `be` statements about properties and attributes. Only observations that
/// agree with the world are recorded.
pub fn property_update(w: &mut FactWriter<'_>, frame: &Frame, world: &World) {
    if frame.mood != Mood::Statement {
        return;
    }
    if let Some((prop, truth)) = Proposition::from_be(frame) {
        if prop.holds_in(world) == truth {
            w.set(prop, truth);
        }
    }
}

/// A full possession listing: listed items are at the owner, every other
/// item is not. Negated listings only clear the listed items.
pub fn have_update(w: &mut FactWriter<'_>, frame: &Frame, world: &World) {
    if !frame.is("have") || frame.mood != Mood::Statement {
        return;
    }
    let Some(owner) = frame.entity(roles::OWNER) else {
        return;
    };
    let Some(listed) = frame.arg(roles::POSSESSION).and_then(ArgValue::as_list) else {
        return;
    };
    let listed: Vec<EntityId> = listed.iter().filter_map(ArgValue::as_entity).collect();

    if frame.is_negated() {
        for item in listed {
            w.set(Proposition::location(item, owner), false);
        }
        return;
    }
    for item in world.collection("items") {
        w.set(Proposition::location(*item, owner), listed.contains(item));
    }
}

/// A completed move: the agent is now at the destination.
pub fn go_update(w: &mut FactWriter<'_>, frame: &Frame, world: &World) {
    if !frame.is("go") || frame.mood != Mood::Statement {
        return;
    }
    let (Some(agent), Some(destination)) =
        (frame.entity(roles::AGENT), frame.entity(roles::DESTINATION))
    else {
        return;
    };
    if world.location_of(agent) == Some(destination) {
        w.set(Proposition::location(agent, destination), true);
    }
}

/// `open` and `closed` exclude each other: learning one settles the other.
pub fn openness_update(w: &mut FactWriter<'_>, frame: &Frame, world: &World) {
    if frame.mood != Mood::Statement {
        return;
    }
    let Some((Proposition::Attribute { entity, attribute }, truth)) = Proposition::from_be(frame)
    else {
        return;
    };
    let other = match attribute.as_str() {
        OPEN => CLOSED,
        CLOSED => OPEN,
        _ => return,
    };
    let other = Proposition::Attribute {
        entity,
        attribute: other.to_string(),
    };
    if other.holds_in(world) != truth {
        w.set(other, !truth);
    }
}

fn agent_and_theme(frame: &Frame, predicate: &str) -> Option<(EntityId, EntityId)> {
    if !frame.is(predicate) || frame.mood != Mood::Statement {
        return None;
    }
    Some((frame.entity(roles::AGENT)?, frame.entity(roles::THEME)?))
}

/// A completed pick-up: the item is now with the agent.
pub fn get_update(w: &mut FactWriter<'_>, frame: &Frame, world: &World) {
    let Some((agent, item)) = agent_and_theme(frame, "get") else {
        return;
    };
    if world.location_of(item) == Some(agent) {
        w.set(Proposition::location(item, agent), true);
    }
}

/// A completed drop: the item left the agent for the agent's room.
pub fn drop_update(w: &mut FactWriter<'_>, frame: &Frame, world: &World) {
    let Some((agent, item)) = agent_and_theme(frame, "drop") else {
        return;
    };
    let room = world.location_of(agent);
    if room.is_some() && world.location_of(item) == room {
        w.set(Proposition::location(item, agent), false);
        if let Some(room) = room {
            w.set(Proposition::location(item, room), true);
        }
    }
}

/// Any other statement is remembered as-is, negation-normalized.
pub fn statement_update(w: &mut FactWriter<'_>, frame: &Frame, _world: &World) {
    if frame.mood != Mood::Statement {
        return;
    }
    let handled = matches!(frame.predicate.as_str(), "say" | "and" | "have")
        || ACTIONS.contains(&frame.predicate.as_str())
        || Proposition::from_be(frame).is_some();
    if handled {
        return;
    }
    let (prop, truth) = Proposition::statement(frame);
    w.set(prop, truth);
}
