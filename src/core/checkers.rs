/// Built-in checkers. `None` means abstain.

use crate::core::knowledge::{Checker, KnowledgeBase, Proposition};
use crate::schema::entity::EntityId;
use crate::schema::frame::{roles, ArgValue, Frame};
use crate::schema::world::World;

/// Priority order: property, exclusive, have, statement.
pub fn defaults() -> Vec<Checker> {
    vec![property_check, exclusive_check, have_check, statement_check]
}

/// A directly recorded property or attribute.
pub fn property_check(kb: &KnowledgeBase, frame: &Frame, _world: &World) -> Option<bool> {
    let (prop, polarity) = Proposition::from_be(frame)?;
    kb.fact(&prop).map(|b| b == polarity)
}

/// Closed-world answer for mutually exclusive keys: knowing the value
/// settles every other value.
pub fn exclusive_check(kb: &KnowledgeBase, frame: &Frame, _world: &World) -> Option<bool> {
    let (prop, polarity) = Proposition::from_be(frame)?;
    let Proposition::Property { entity, key, value } = prop else {
        return None;
    };
    if !kb.is_exclusive(&key) {
        return None;
    }
    kb.exclusive_value(entity, &key)
        .map(|known| (*known == value) == polarity)
}

/// Possession listings, answered from item locations.
pub fn have_check(kb: &KnowledgeBase, frame: &Frame, world: &World) -> Option<bool> {
    if !frame.is("have") {
        return None;
    }
    let owner = frame.entity(roles::OWNER)?;
    let listed: Vec<EntityId> = frame
        .arg(roles::POSSESSION)?
        .as_list()?
        .iter()
        .filter_map(ArgValue::as_entity)
        .collect();
    let polarity = !frame.is_negated();

    // "has nothing" needs every item known to be elsewhere
    let (expected, items): (bool, Vec<EntityId>) = if listed.is_empty() {
        (false, world.collection("items").to_vec())
    } else {
        (true, listed)
    };

    let mut all_match = true;
    for item in items {
        match kb.known_location(item, owner) {
            Some(at_owner) if at_owner != expected => return Some(!polarity),
            Some(_) => {}
            None => all_match = false,
        }
    }
    all_match.then_some(polarity)
}

/// Any statement remembered verbatim.
pub fn statement_check(kb: &KnowledgeBase, frame: &Frame, _world: &World) -> Option<bool> {
    let (prop, polarity) = Proposition::statement(frame);
    kb.fact(&prop).map(|b| b == polarity)
}
