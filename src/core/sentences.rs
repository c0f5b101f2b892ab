/// Frame and utterance constructors for the built-in predicates.

use crate::core::phrasing::Lexicon;
use crate::schema::entity::{EntityId, LOCATION};
use crate::schema::frame::{roles, ArgValue, Frame, Mood};
use crate::schema::utterance::{ask_about, Hooks, Utterance};

/// `theme's key is value`.
pub fn be(theme: EntityId, key: &str, value: ArgValue) -> Frame {
    Frame::new("be", Mood::Statement)
        .with(roles::THEME, ArgValue::Entity(theme))
        .with(roles::KEY, ArgValue::Text(key.to_string()))
        .with(roles::VALUE, value)
}

pub fn located(theme: EntityId, place: EntityId) -> Frame {
    be(theme, LOCATION, ArgValue::Entity(place))
}

/// `theme is attribute`, e.g. "the door is not locked".
pub fn attribute(theme: EntityId, attribute: &str) -> Frame {
    Frame::new("be", Mood::Statement)
        .with(roles::THEME, ArgValue::Entity(theme))
        .with(roles::VALUE, ArgValue::Text(attribute.to_string()))
}

pub fn know_not(agent: EntityId, content: Frame) -> Frame {
    Frame::new("know", Mood::Statement)
        .with(roles::AGENT, ArgValue::Entity(agent))
        .with(roles::CONTENT, ArgValue::Frame(Box::new(content)))
        .negated()
}

/// A full listing of what `owner` has.
pub fn have(owner: EntityId, items: &[EntityId]) -> Frame {
    Frame::new("have", Mood::Statement)
        .with(roles::OWNER, ArgValue::Entity(owner))
        .with(
            roles::POSSESSION,
            ArgValue::List(items.iter().map(|id| ArgValue::Entity(*id)).collect()),
        )
}

pub fn what_has(owner: EntityId) -> Frame {
    Frame::new("have", Mood::Question).with(roles::OWNER, ArgValue::Entity(owner))
}

pub fn go(agent: EntityId, destination: EntityId, mood: Mood) -> Frame {
    Frame::new("go", mood)
        .with(roles::AGENT, ArgValue::Entity(agent))
        .with(roles::DESTINATION, ArgValue::Entity(destination))
}

/// An item action: `get`, `drop`, `look`, `open` or `close`.
pub fn act(verb: &str, agent: EntityId, theme: EntityId, mood: Mood) -> Frame {
    Frame::new(verb, mood)
        .with(roles::AGENT, ArgValue::Entity(agent))
        .with(roles::THEME, ArgValue::Entity(theme))
}

pub fn get(agent: EntityId, item: EntityId, mood: Mood) -> Frame {
    act("get", agent, item, mood)
}

pub fn drop(agent: EntityId, item: EntityId, mood: Mood) -> Frame {
    act("drop", agent, item, mood)
}

pub fn look(agent: EntityId, target: EntityId, mood: Mood) -> Frame {
    act("look", agent, target, mood)
}

pub fn and(clauses: Vec<Frame>, mood: Mood) -> Frame {
    Frame::new("and", mood).with(
        roles::CLAUSES,
        ArgValue::List(clauses.into_iter().map(|f| ArgValue::Frame(Box::new(f))).collect()),
    )
}

/// Questions compare without polarity: "isn't X" asks the same as "is X".
pub fn canonical_request(frame: &Frame) -> Frame {
    match frame.mood {
        Mood::Question => frame.without_neg(),
        Mood::Statement | Mood::Command => frame.clone(),
    }
}

/// A single-frame utterance by `speaker`.
pub fn utter(lex: &Lexicon<'_>, speaker: Option<EntityId>, frame: Frame) -> Utterance {
    let (frame, tokens) = lex.phrase(frame);
    Utterance {
        tokens,
        frames: vec![frame],
        speaker,
        trusted: false,
        hooks: Hooks {
            request_form: Some(ask_about),
            canonical: Some(canonical_request),
        },
    }
}

/// `speaker says to addressee: content`.
pub fn say(
    lex: &Lexicon<'_>,
    speaker: EntityId,
    addressee: Option<EntityId>,
    content: Frame,
) -> Utterance {
    let mut frame = Frame::new("say", Mood::Statement)
        .with(roles::AGENT, ArgValue::Entity(speaker))
        .with(roles::CONTENT, ArgValue::Frame(Box::new(content)));
    if let Some(addressee) = addressee {
        frame = frame.with(roles::ADDRESSEE, ArgValue::Entity(addressee));
    }
    utter(lex, Some(speaker), frame)
}

/// A trusted environment report.
pub fn observe(lex: &Lexicon<'_>, frame: Frame) -> Utterance {
    let mut utterance = utter(lex, None, frame);
    utterance.trusted = true;
    utterance
}

/// The content frame of a `say` addressed to `listener`.
pub fn addressed_content(utterance: &Utterance, listener: EntityId) -> Option<&Frame> {
    let frame = utterance.frames.first()?;
    if !frame.is("say") || frame.entity(roles::ADDRESSEE) != Some(listener) {
        return None;
    }
    frame.arg(roles::CONTENT).and_then(ArgValue::as_frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phrasing::SchemaSet;
    use crate::schema::world::WorldBuilder;

    #[test]
    fn say_and_observe_text() {
        let world = WorldBuilder::new()
            .room("kitchen")
            .room("bedroom")
            .player("ada", "Ada", "bedroom")
            .player("bob", "Bob", "bedroom")
            .door("door", "kitchen", "bedroom", true)
            .build()
            .unwrap();
        let schemas = SchemaSet::builtin().unwrap();
        let lex = Lexicon::new(&world, &schemas);
        let ada = world.by_var_name("ada").unwrap();
        let bob = world.by_var_name("bob").unwrap();
        let kitchen = world.by_var_name("kitchen").unwrap();
        let door = world.by_var_name("door").unwrap();

        let request = say(
            &lex,
            bob,
            Some(ada),
            located(ada, kitchen).with_mood(Mood::Question),
        );
        assert_eq!(request.text(), "Bob says to Ada: is Ada's location in the kitchen?");
        assert_eq!(
            addressed_content(&request, ada),
            Some(&located(ada, kitchen).with_mood(Mood::Question))
        );
        assert_eq!(addressed_content(&request, bob), None);

        let unlocked = observe(&lex, attribute(door, "locked").negated());
        assert!(unlocked.trusted);
        assert_eq!(unlocked.speaker, None);
        assert_eq!(unlocked.text(), "the door is not locked.");

        let dont_know = say(&lex, ada, Some(bob), know_not(ada, located(ada, kitchen)));
        assert_eq!(
            dont_know.text(),
            "Ada says to Bob: Ada does not know whether Ada's location is in the kitchen."
        );
    }

    #[test]
    fn item_actions_read_as_commands_and_statements() {
        let world = WorldBuilder::new()
            .room("hall")
            .player("ada", "Ada", "hall")
            .item("ball", &[("color", "red"), ("type", "ball")], "hall")
            .build()
            .unwrap();
        let schemas = SchemaSet::builtin().unwrap();
        let lex = Lexicon::new(&world, &schemas);
        let ada = world.by_var_name("ada").unwrap();
        let ball = world.by_var_name("ball").unwrap();

        let step = utter(&lex, Some(ada), get(ada, ball, Mood::Statement));
        assert_eq!(step.text(), "Ada gets the red ball.");
        let (_, tokens) = lex.phrase(act("open", ada, ball, Mood::Command));
        assert_eq!(crate::schema::utterance::join_tokens(&tokens), "open the red ball.");
        let (_, tokens) = lex.phrase(look(ada, ball, Mood::Statement));
        assert_eq!(crate::schema::utterance::join_tokens(&tokens), "Ada looks at the red ball.");
    }

    #[test]
    fn canonical_request_drops_question_negation() {
        let q = located(EntityId(1), EntityId(2)).with_mood(Mood::Question);
        assert_eq!(canonical_request(&q.negated()), q);
        let s = located(EntityId(1), EntityId(2)).negated();
        assert_eq!(canonical_request(&s), s);
    }
}
