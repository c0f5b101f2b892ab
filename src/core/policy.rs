/// Participant behavior: single-shot requests, reactive responders and
/// first-match dispatch over candidates.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::context::{ContextId, Entry};
use crate::core::goal::Goal;
use crate::core::knowledge::KnowledgeBase;
use crate::core::phrasing::Lexicon;
use crate::core::sentences;
use crate::schema::entity::EntityId;
use crate::schema::frame::{roles, Frame};
use crate::schema::utterance::Utterance;
use crate::schema::world::World;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("RON encode error: {0}")]
    Encode(#[from] ron::Error),
    #[error("RON decode error: {0}")]
    Decode(#[from] ron::error::SpannedError),
    #[error("state holds {found} candidate states, expected {expected}")]
    Shape { expected: usize, found: usize },
}

/// Opaque saved state. RON text, so two snapshots compare by value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyState(pub String);

impl PolicyState {
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, PolicyError> {
        Ok(Self(ron::to_string(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PolicyError> {
        Ok(ron::from_str(&self.0)?)
    }
}

/// What a policy sees when asked to act.
#[derive(Clone, Copy)]
pub struct Turn<'a> {
    pub lex: Lexicon<'a>,
    pub kb: &'a KnowledgeBase,
    /// Entries produced by the current dialogue so far.
    pub dialogue: &'a [Entry],
    pub start: ContextId,
    /// Accept ground-truth answers the speaker could not have derived.
    pub reward_ground_truth: bool,
}

impl<'a> Turn<'a> {
    pub fn world(&self) -> &'a World {
        self.lex.world
    }

    pub fn first(&self) -> Option<&'a Entry> {
        self.dialogue.first()
    }
}

/// Ordered steps for one turn and, for responders, the goal they imply.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub steps: Vec<Utterance>,
    pub goal: Option<Goal>,
}

/// Behavior bound to one participant.
pub trait Policy {
    fn participant(&self) -> EntityId;

    /// `None` when this policy does not recognize the situation.
    fn try_match(&mut self, turn: &Turn<'_>) -> Option<Response>;

    fn execute(&mut self, turn: &Turn<'_>) -> Response {
        self.try_match(turn).unwrap_or_default()
    }

    fn get_goal(&self, turn: &Turn<'_>) -> Option<Goal>;

    fn save_state(&self) -> Result<PolicyState, PolicyError>;

    fn recover_state(&mut self, state: &PolicyState) -> Result<(), PolicyError>;
}

/// Who asked and who must answer.
#[derive(Debug, Clone, Copy)]
pub struct Ask {
    pub asker: Option<EntityId>,
    pub agent: EntityId,
}

/// A request shape an agent knows how to answer.
pub trait Responder {
    type Request;

    fn name(&self) -> &'static str;

    /// Extract request parameters from an observed content frame.
    fn parse(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> Option<Self::Request>;

    /// Canonical frame for the parameters.
    fn request(&self, request: &Self::Request, agent: EntityId) -> Frame;

    /// Steps and goal answering a parsed request. `None` when the agent
    /// cannot answer it.
    fn task(&self, request: &Self::Request, ask: Ask, turn: &Turn<'_>) -> Option<Response>;
}

/// Object-safe face of `Responder`, for heterogeneous candidate lists.
pub trait Respond {
    fn accepts(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> bool;

    fn respond(&self, content: &Frame, ask: Ask, turn: &Turn<'_>) -> Option<Response>;
}

impl<R: Responder> Respond for R {
    fn accepts(&self, content: &Frame, agent: EntityId, turn: &Turn<'_>) -> bool {
        self.parse(content, agent, turn)
            .map_or(false, |req| self.request(&req, agent) == *content)
    }

    fn respond(&self, content: &Frame, ask: Ask, turn: &Turn<'_>) -> Option<Response> {
        let req = self.parse(content, ask.agent, turn)?;
        if self.request(&req, ask.agent) != *content {
            return None;
        }
        self.task(&req, ask, turn)
    }
}

/// Single-shot user role: says its bound request once.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    participant: EntityId,
    addressee: Option<EntityId>,
    pending: Option<Frame>,
}

#[derive(Serialize, Deserialize)]
struct RequestState {
    addressee: Option<EntityId>,
    pending: Option<Frame>,
}

impl RequestPolicy {
    pub fn new(participant: EntityId) -> Self {
        Self {
            participant,
            addressee: None,
            pending: None,
        }
    }

    pub fn bind(&mut self, addressee: EntityId, request: Frame) {
        self.addressee = Some(addressee);
        self.pending = Some(request);
    }

    pub fn is_bound(&self) -> bool {
        self.pending.is_some()
    }
}

impl Policy for RequestPolicy {
    fn participant(&self) -> EntityId {
        self.participant
    }

    fn try_match(&mut self, turn: &Turn<'_>) -> Option<Response> {
        let request = self.pending.take()?;
        let utterance = sentences::say(&turn.lex, self.participant, self.addressee, request);
        Some(Response {
            steps: vec![utterance],
            goal: None,
        })
    }

    fn get_goal(&self, _turn: &Turn<'_>) -> Option<Goal> {
        None
    }

    fn save_state(&self) -> Result<PolicyState, PolicyError> {
        PolicyState::encode(&RequestState {
            addressee: self.addressee,
            pending: self.pending.clone(),
        })
    }

    fn recover_state(&mut self, state: &PolicyState) -> Result<(), PolicyError> {
        let state: RequestState = state.decode()?;
        self.addressee = state.addressee;
        self.pending = state.pending;
        Ok(())
    }
}

/// Agent role answering the dialogue's opening request through `R`.
pub struct ReactivePolicy<R: Responder> {
    participant: EntityId,
    responder: R,
    /// Context id of the request already answered.
    answered: Option<ContextId>,
}

impl<R: Responder> ReactivePolicy<R> {
    pub fn new(participant: EntityId, responder: R) -> Self {
        Self {
            participant,
            responder,
            answered: None,
        }
    }

    fn opening<'t>(&self, turn: &Turn<'t>) -> Option<(&'t Entry, Frame, Ask)> {
        let entry = turn.first()?;
        let content = sentences::addressed_content(&entry.utterance, self.participant)?;
        let canonical = entry.utterance.canonical(content);
        let asker = entry.utterance.frames.first().and_then(|f| f.entity(roles::AGENT));
        Some((
            entry,
            canonical,
            Ask {
                asker,
                agent: self.participant,
            },
        ))
    }
}

impl<R: Responder> Policy for ReactivePolicy<R> {
    fn participant(&self) -> EntityId {
        self.participant
    }

    fn try_match(&mut self, turn: &Turn<'_>) -> Option<Response> {
        let (entry, content, ask) = self.opening(turn)?;
        if !self.responder.accepts(&content, self.participant, turn) {
            return None;
        }
        if self.answered == Some(entry.id) {
            return Some(Response::default());
        }
        let response = self.responder.respond(&content, ask, turn)?;
        tracing::debug!(
            responder = self.responder.name(),
            request = %entry.id,
            steps = response.steps.len(),
            "responder matched"
        );
        self.answered = Some(entry.id);
        Some(response)
    }

    fn get_goal(&self, turn: &Turn<'_>) -> Option<Goal> {
        let (_, content, ask) = self.opening(turn)?;
        self.responder.respond(&content, ask, turn)?.goal
    }

    fn save_state(&self) -> Result<PolicyState, PolicyError> {
        PolicyState::encode(&self.answered.map(|id| id.0))
    }

    fn recover_state(&mut self, state: &PolicyState) -> Result<(), PolicyError> {
        let answered: Option<u64> = state.decode()?;
        self.answered = answered.map(ContextId);
        Ok(())
    }
}

/// Ordered candidates for one participant; the first that matches acts.
pub struct AutoPolicy {
    participant: EntityId,
    candidates: Vec<Box<dyn Policy>>,
}

impl AutoPolicy {
    pub fn new(participant: EntityId) -> Self {
        Self {
            participant,
            candidates: Vec::new(),
        }
    }

    pub fn with(mut self, candidate: Box<dyn Policy>) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl Policy for AutoPolicy {
    fn participant(&self) -> EntityId {
        self.participant
    }

    fn try_match(&mut self, turn: &Turn<'_>) -> Option<Response> {
        self.candidates.iter_mut().find_map(|c| c.try_match(turn))
    }

    fn get_goal(&self, turn: &Turn<'_>) -> Option<Goal> {
        self.candidates.iter().find_map(|c| c.get_goal(turn))
    }

    fn save_state(&self) -> Result<PolicyState, PolicyError> {
        let parts = self
            .candidates
            .iter()
            .map(|c| c.save_state().map(|s| s.0))
            .collect::<Result<Vec<String>, PolicyError>>()?;
        PolicyState::encode(&parts)
    }

    fn recover_state(&mut self, state: &PolicyState) -> Result<(), PolicyError> {
        let parts: Vec<String> = state.decode()?;
        if parts.len() != self.candidates.len() {
            return Err(PolicyError::Shape {
                expected: self.candidates.len(),
                found: parts.len(),
            });
        }
        for (candidate, part) in self.candidates.iter_mut().zip(parts) {
            candidate.recover_state(&PolicyState(part))?;
        }
        Ok(())
    }
}
