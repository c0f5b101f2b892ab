/// Built-in responders and the standard agent policy built from them.

use crate::core::goal::{Goal, GoalKind};
use crate::core::knowledge::{Proposition, Truth};
use crate::core::policy::{Ask, AutoPolicy, ReactivePolicy, Respond, Responder, Response, Turn};
use crate::core::sentences;
use crate::schema::entity::{EntityId, Value, LOCATION};
use crate::schema::frame::{roles, ArgValue, Frame, Mood};
use crate::schema::utterance::Utterance;
use crate::schema::world::{CLOSED, LOCKED, OPEN, STATIC};

/// Attribute an agent denies a place it cannot get to.
pub const REACHABLE: &str = "reachable";

/// Every responder the standard agent knows, in dispatch order.
pub fn standard(agent: EntityId) -> AutoPolicy {
    AutoPolicy::new(agent)
        .with(Box::new(ReactivePolicy::new(agent, IsItemProperty)))
        .with(Box::new(ReactivePolicy::new(agent, IsItemAttribute)))
        .with(Box::new(ReactivePolicy::new(agent, ListPossessions)))
        .with(Box::new(ReactivePolicy::new(agent, GoLocation)))
        .with(Box::new(ReactivePolicy::new(agent, GetItem)))
        .with(Box::new(ReactivePolicy::new(agent, DropItem)))
        .with(Box::new(ReactivePolicy::new(agent, LookItem)))
        .with(Box::new(ReactivePolicy::new(agent, OpenCloseItem)))
        .with(Box::new(ReactivePolicy::new(agent, Conjunction::standard())))
}

fn reply(turn: &Turn<'_>, ask: Ask, content: Frame) -> Utterance {
    sentences::say(&turn.lex, ask.agent, ask.asker, content)
}

fn correct(turn: &Turn<'_>, agent: EntityId, accept: Vec<Utterance>, reject: Vec<Utterance>) -> Goal {
    Goal::new(
        GoalKind::MultipleCorrect {
            participant: agent,
            accept,
            reject,
        },
        turn.start,
    )
}

/// A single spoken answer that is its own goal.
fn refuse(turn: &Turn<'_>, ask: Ask, content: Frame) -> Response {
    let step = reply(turn, ask, content);
    Response {
        steps: vec![step.clone()],
        goal: Some(correct(turn, ask.agent, vec![step], Vec::new())),
    }
}

/// One `go` statement per room on the way.
fn walk(turn: &Turn<'_>, agent: EntityId, rooms: &[EntityId]) -> Vec<Utterance> {
    rooms
        .iter()
        .map(|room| {
            sentences::utter(
                &turn.lex,
                Some(agent),
                sentences::go(agent, *room, Mood::Statement),
            )
        })
        .collect()
}

/// Walk to `room`, then take `action`. Done once the environment reports
/// `effect`.
fn walk_then(turn: &Turn<'_>, ask: Ask, room: EntityId, action: Frame, effect: Frame) -> Response {
    let world = turn.world();
    let agent = ask.agent;
    let Some(rooms) = world
        .location_of(agent)
        .and_then(|from| world.path(from, room))
    else {
        return refuse(turn, ask, sentences::attribute(room, REACHABLE).negated());
    };
    let mut steps = walk(turn, agent, &rooms);
    let step = sentences::utter(&turn.lex, Some(agent), action);
    steps.push(step.clone());
    let goal = Goal::new(
        GoalKind::All(vec![
            Goal::new(GoalKind::Observed(effect), turn.start),
            Goal::new(
                GoalKind::StepsSublist {
                    participant: agent,
                    steps: vec![step],
                },
                turn.start,
            ),
        ]),
        turn.start,
    );
    Response {
        steps,
        goal: Some(goal),
    }
}

/// Where the agent believes `entity` is. Its own position and what it
/// carries it always knows.
fn believed_place(turn: &Turn<'_>, agent: EntityId, entity: EntityId) -> Option<EntityId> {
    let world = turn.world();
    if entity == agent || world.location_of(entity) == Some(agent) {
        return world.location_of(entity);
    }
    turn.kb
        .exclusive_value(entity, LOCATION)
        .and_then(Value::as_entity)
}

/// The item's place and the room to go to for it, or what the agent says
/// instead.
fn reach(turn: &Turn<'_>, agent: EntityId, item: EntityId) -> Result<(EntityId, EntityId), Frame> {
    let world = turn.world();
    let rooms = world.collection("rooms");
    let unknown = || sentences::know_not(agent, sentences::attribute(item, REACHABLE));
    let place = believed_place(turn, agent, item).ok_or_else(unknown)?;
    if rooms.contains(&place) {
        return Ok((place, place));
    }
    if world.collection("players").contains(&place) {
        return match believed_place(turn, agent, place) {
            Some(room) if rooms.contains(&room) => Ok((place, room)),
            _ => Err(unknown()),
        };
    }
    Err(sentences::located(item, place))
}

/// Answer a `be` question from the knowledge base; ground truth is
/// accepted too when the agent could not know.
fn answer_be(statement: &Frame, ask: Ask, turn: &Turn<'_>) -> Response {
    let world = turn.world();
    let denial = statement.negated();
    let mut accept = Vec::new();
    let mut reject = Vec::new();

    let answer = match turn.kb.check(statement, world) {
        Truth::True => {
            reject.push(reply(turn, ask, denial));
            statement.clone()
        }
        Truth::False => {
            reject.push(reply(turn, ask, statement.clone()));
            denial
        }
        Truth::Unknown => {
            let holds = Proposition::from_be(statement)
                .map_or(false, |(prop, _)| prop.holds_in(world));
            let (truth, falsehood) = if holds {
                (statement.clone(), denial)
            } else {
                (denial, statement.clone())
            };
            if turn.reward_ground_truth {
                accept.push(reply(turn, ask, truth));
            }
            reject.push(reply(turn, ask, falsehood));
            sentences::know_not(ask.agent, statement.clone())
        }
    };

    let step = reply(turn, ask, answer);
    accept.insert(0, step.clone());
    Response {
        steps: vec![step],
        goal: Some(correct(turn, ask.agent, accept, reject)),
    }
}

/// "Is X's key V?" answered from the knowledge base.
pub struct IsItemProperty;

impl Responder for IsItemProperty {
    /// The statement being asked about, positive.
    type Request = Frame;

    fn name(&self) -> &'static str {
        "is_item_property"
    }

    fn parse(&self, content: &Frame, _agent: EntityId, _turn: &Turn<'_>) -> Option<Frame> {
        if content.mood != Mood::Question || content.text(roles::KEY).is_none() {
            return None;
        }
        Proposition::from_be(content)?;
        Some(content.without_neg().with_mood(Mood::Statement))
    }

    fn request(&self, statement: &Frame, _agent: EntityId) -> Frame {
        statement.with_mood(Mood::Question)
    }

    fn task(&self, statement: &Frame, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        Some(answer_be(statement, ask, turn))
    }
}

/// "Is X open?" answered from the knowledge base.
pub struct IsItemAttribute;

impl Responder for IsItemAttribute {
    type Request = Frame;

    fn name(&self) -> &'static str {
        "is_item_attribute"
    }

    fn parse(&self, content: &Frame, _agent: EntityId, _turn: &Turn<'_>) -> Option<Frame> {
        if content.mood != Mood::Question {
            return None;
        }
        match Proposition::from_be(content)? {
            (Proposition::Attribute { .. }, _) => {
                Some(content.without_neg().with_mood(Mood::Statement))
            }
            _ => None,
        }
    }

    fn request(&self, statement: &Frame, _agent: EntityId) -> Frame {
        statement.with_mood(Mood::Question)
    }

    fn task(&self, statement: &Frame, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        Some(answer_be(statement, ask, turn))
    }
}

/// "What does X have?" answered with the items known to be at X. A listing
/// is only given as complete when every item's whereabouts are known.
pub struct ListPossessions;

impl Responder for ListPossessions {
    type Request = EntityId;

    fn name(&self) -> &'static str {
        "list_possessions"
    }

    fn parse(&self, content: &Frame, _agent: EntityId, _turn: &Turn<'_>) -> Option<EntityId> {
        if !content.is("have") || content.mood != Mood::Question {
            return None;
        }
        if content.arg(roles::POSSESSION).is_some() {
            return None;
        }
        content.entity(roles::OWNER)
    }

    fn request(&self, owner: &EntityId, _agent: EntityId) -> Frame {
        sentences::what_has(*owner)
    }

    fn task(&self, owner: &EntityId, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let world = turn.world();
        let items = world.collection("items");
        let known: Vec<(EntityId, Option<bool>)> = items
            .iter()
            .map(|item| (*item, turn.kb.known_location(*item, *owner)))
            .collect();
        let visible: Vec<EntityId> = known
            .iter()
            .filter(|(_, at)| *at == Some(true))
            .map(|(item, _)| *item)
            .collect();
        let complete = known.iter().all(|(_, at)| at.is_some());

        let listing = sentences::have(*owner, &visible);
        let answer = if complete {
            listing.clone()
        } else if visible.is_empty() {
            sentences::know_not(ask.agent, sentences::have(*owner, &[]))
        } else {
            // what is known to be there, and doubt about the full listing
            let mut clauses: Vec<Frame> = visible
                .iter()
                .map(|item| sentences::located(*item, *owner))
                .collect();
            clauses.push(sentences::know_not(ask.agent, listing.clone()));
            sentences::and(clauses, Mood::Statement)
        };
        let step = reply(turn, ask, answer);
        let mut accept = vec![step.clone()];
        let mut reject = Vec::new();

        let mut truth: Vec<EntityId> = world.items_at(*owner);
        truth.retain(|item| items.contains(item));
        if truth != visible {
            if turn.reward_ground_truth {
                accept.push(reply(turn, ask, sentences::have(*owner, &truth)));
            }
            if !complete && !visible.is_empty() {
                reject.push(reply(turn, ask, listing));
            }
        }

        Some(Response {
            steps: vec![step],
            goal: Some(correct(turn, ask.agent, accept, reject)),
        })
    }
}

/// "Go to X", addressed to the agent itself: walk the path, then report.
pub struct GoLocation;

impl Responder for GoLocation {
    type Request = EntityId;

    fn name(&self) -> &'static str {
        "go_location"
    }

    fn parse(&self, content: &Frame, agent: EntityId, _turn: &Turn<'_>) -> Option<EntityId> {
        if !content.is("go") || content.mood != Mood::Command {
            return None;
        }
        if content.entity(roles::AGENT) != Some(agent) {
            return None;
        }
        content.entity(roles::DESTINATION)
    }

    fn request(&self, destination: &EntityId, agent: EntityId) -> Frame {
        sentences::go(agent, *destination, Mood::Command)
    }

    fn task(&self, destination: &EntityId, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let world = turn.world();
        let agent = ask.agent;
        let path = world
            .location_of(agent)
            .and_then(|from| world.path(from, *destination));

        let Some(rooms) = path else {
            return Some(refuse(
                turn,
                ask,
                sentences::attribute(*destination, REACHABLE).negated(),
            ));
        };

        let mut steps = walk(turn, agent, &rooms);
        let report = reply(turn, ask, sentences::located(agent, *destination));
        steps.push(report.clone());

        let said = Goal::new(
            GoalKind::StepsSublist {
                participant: agent,
                steps: vec![report],
            },
            turn.start,
        );
        // already there: nothing moves, so nothing is observed
        if rooms.is_empty() {
            return Some(Response {
                steps,
                goal: Some(said),
            });
        }
        let arrived = Goal::new(
            GoalKind::Arrived {
                participant: agent,
                destination: *destination,
            },
            turn.start,
        );
        Some(Response {
            steps,
            goal: Some(Goal::new(GoalKind::All(vec![arrived, said]), turn.start)),
        })
    }
}

/// The item of an action command addressed to the agent.
fn commanded_item(content: &Frame, verb: &str, agent: EntityId, turn: &Turn<'_>) -> Option<EntityId> {
    if !content.is(verb) || content.mood != Mood::Command {
        return None;
    }
    if content.entity(roles::AGENT) != Some(agent) {
        return None;
    }
    let item = content.entity(roles::THEME)?;
    turn.world().collection("items").contains(&item).then_some(item)
}

/// "Get X": go where X lies and pick it up.
pub struct GetItem;

impl Responder for GetItem {
    type Request = EntityId;

    fn name(&self) -> &'static str {
        "get_item"
    }

    fn parse(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> Option<EntityId> {
        commanded_item(content, "get", agent, turn)
    }

    fn request(&self, item: &EntityId, agent: EntityId) -> Frame {
        sentences::get(agent, *item, Mood::Command)
    }

    fn task(&self, item: &EntityId, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let agent = ask.agent;
        let item = *item;
        let fixed = Proposition::Attribute {
            entity: item,
            attribute: STATIC.to_string(),
        };
        if turn.kb.fact(&fixed) == Some(true) {
            return Some(refuse(turn, ask, sentences::attribute(item, STATIC)));
        }
        let response = match reach(turn, agent, item) {
            Ok((place, _)) if place == agent => refuse(turn, ask, sentences::located(item, agent)),
            Ok((place, room)) if place == room => walk_then(
                turn,
                ask,
                room,
                sentences::get(agent, item, Mood::Statement),
                sentences::located(item, agent),
            ),
            Ok((holder, _)) => refuse(turn, ask, sentences::located(item, holder)),
            Err(reason) => refuse(turn, ask, reason),
        };
        Some(response)
    }
}

/// "Drop X": put down something the agent carries.
pub struct DropItem;

impl Responder for DropItem {
    type Request = EntityId;

    fn name(&self) -> &'static str {
        "drop_item"
    }

    fn parse(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> Option<EntityId> {
        commanded_item(content, "drop", agent, turn)
    }

    fn request(&self, item: &EntityId, agent: EntityId) -> Frame {
        sentences::drop(agent, *item, Mood::Command)
    }

    fn task(&self, item: &EntityId, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let world = turn.world();
        let agent = ask.agent;
        if world.location_of(*item) != Some(agent) {
            return Some(refuse(turn, ask, sentences::located(*item, agent).negated()));
        }
        let room = world.location_of(agent)?;
        Some(walk_then(
            turn,
            ask,
            room,
            sentences::drop(agent, *item, Mood::Statement),
            sentences::located(*item, room),
        ))
    }
}

/// "Look at X": go where X is and look at it.
pub struct LookItem;

impl Responder for LookItem {
    type Request = EntityId;

    fn name(&self) -> &'static str {
        "look_item"
    }

    fn parse(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> Option<EntityId> {
        commanded_item(content, "look", agent, turn)
    }

    fn request(&self, item: &EntityId, agent: EntityId) -> Frame {
        sentences::look(agent, *item, Mood::Command)
    }

    fn task(&self, item: &EntityId, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let agent = ask.agent;
        let response = match reach(turn, agent, *item) {
            Ok((place, room)) => walk_then(
                turn,
                ask,
                room,
                sentences::look(agent, *item, Mood::Statement),
                sentences::located(*item, place),
            ),
            Err(reason) => refuse(turn, ask, reason),
        };
        Some(response)
    }
}

/// "Open X" / "close X" for doors and containers.
pub struct OpenCloseItem;

impl Responder for OpenCloseItem {
    /// Whether to open, and what.
    type Request = (bool, EntityId);

    fn name(&self) -> &'static str {
        "open_close_item"
    }

    fn parse(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> Option<(bool, EntityId)> {
        let open = match content.predicate.as_str() {
            "open" => true,
            "close" => false,
            _ => return None,
        };
        if content.mood != Mood::Command || content.entity(roles::AGENT) != Some(agent) {
            return None;
        }
        let target = content.entity(roles::THEME)?;
        turn.world().is_openable(target).then_some((open, target))
    }

    fn request(&self, request: &(bool, EntityId), agent: EntityId) -> Frame {
        let (open, target) = *request;
        let verb = if open { "open" } else { "close" };
        sentences::act(verb, agent, target, Mood::Command)
    }

    fn task(&self, request: &(bool, EntityId), ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let (open, target) = *request;
        let world = turn.world();
        let agent = ask.agent;
        let locked = Proposition::Attribute {
            entity: target,
            attribute: LOCKED.to_string(),
        };
        if open && turn.kb.fact(&locked) == Some(true) {
            return Some(refuse(turn, ask, sentences::attribute(target, LOCKED)));
        }

        let room = if world.location_of(target).is_none() {
            // a door: the nearer of its two sides
            let here = world.location_of(agent);
            let sides = world.door_sides(target);
            sides
                .iter()
                .copied()
                .find(|side| Some(*side) == here)
                .or_else(|| {
                    sides
                        .iter()
                        .copied()
                        .filter_map(|side| {
                            here.and_then(|h| world.path(h, side)).map(|p| (p.len(), side))
                        })
                        .min()
                        .map(|(_, side)| side)
                })
                .or_else(|| sides.first().copied())?
        } else {
            match reach(turn, agent, target) {
                Ok((_, room)) => room,
                Err(reason) => return Some(refuse(turn, ask, reason)),
            }
        };
        let verb = if open { "open" } else { "close" };
        let state = if open { OPEN } else { CLOSED };
        Some(walk_then(
            turn,
            ask,
            room,
            sentences::act(verb, agent, target, Mood::Statement),
            sentences::attribute(target, state),
        ))
    }
}

/// Parsed conjunction: each clause with the candidate that answers it.
pub struct Clauses {
    mood: Mood,
    clauses: Vec<(usize, Frame)>,
}

/// A request made of several requests, each answered by a candidate. It is
/// answered only when every clause is.
pub struct Conjunction {
    candidates: Vec<Box<dyn Respond>>,
}

impl Conjunction {
    pub fn new(candidates: Vec<Box<dyn Respond>>) -> Self {
        Self { candidates }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(IsItemProperty),
            Box::new(IsItemAttribute),
            Box::new(ListPossessions),
            Box::new(GoLocation),
            Box::new(GetItem),
            Box::new(DropItem),
            Box::new(LookItem),
            Box::new(OpenCloseItem),
        ])
    }
}

impl Responder for Conjunction {
    type Request = Clauses;

    fn name(&self) -> &'static str {
        "conjunction"
    }

    fn parse(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> Option<Clauses> {
        if !content.is("and") {
            return None;
        }
        let items = content.arg(roles::CLAUSES)?.as_list()?;
        if items.is_empty() {
            return None;
        }
        let mut clauses = Vec::with_capacity(items.len());
        for item in items {
            let clause = sentences::canonical_request(item.as_frame()?);
            let index = self
                .candidates
                .iter()
                .position(|c| c.accepts(&clause, agent, turn))?;
            clauses.push((index, clause));
        }
        Some(Clauses {
            mood: content.mood,
            clauses,
        })
    }

    fn request(&self, request: &Clauses, _agent: EntityId) -> Frame {
        let frames = request.clauses.iter().map(|(_, f)| f.clone()).collect();
        sentences::and(frames, request.mood)
    }

    fn task(&self, request: &Clauses, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let mut steps = Vec::new();
        let mut goals = Vec::new();
        for (index, clause) in &request.clauses {
            let part = self.candidates.get(*index)?.respond(clause, ask, turn)?;
            steps.extend(part.steps);
            goals.extend(part.goal);
        }
        Some(Response {
            steps,
            goal: Some(Goal::new(GoalKind::All(goals), turn.start)),
        })
    }
}

/// The clause list of an `and` frame, if it is one.
pub fn clauses(frame: &Frame) -> Vec<&Frame> {
    if !frame.is("and") {
        return Vec::new();
    }
    frame
        .arg(roles::CLAUSES)
        .and_then(ArgValue::as_list)
        .map(|items| items.iter().filter_map(ArgValue::as_frame).collect())
        .unwrap_or_default()
}
