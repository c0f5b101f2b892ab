/// Goals: predicates over the utterances produced since a start id.

use crate::core::context::{Context, ContextId, Entry};
use crate::core::sentences;
use crate::schema::entity::EntityId;
use crate::schema::frame::Frame;
use crate::schema::utterance::Utterance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    Satisfied,
    Contradicted,
    /// Inconclusive so far; never a failure on its own.
    Pending,
}

#[derive(Debug, Clone)]
pub enum GoalKind {
    /// Any accepted utterance by the participant satisfies the goal; a
    /// rejected one said first contradicts it.
    MultipleCorrect {
        participant: EntityId,
        accept: Vec<Utterance>,
        reject: Vec<Utterance>,
    },
    /// The steps appear in order among the participant's utterances.
    StepsSublist {
        participant: EntityId,
        steps: Vec<Utterance>,
    },
    /// The environment reported the participant at the destination.
    Arrived {
        participant: EntityId,
        destination: EntityId,
    },
    /// The environment reported `frame`, e.g. an item now held by the agent.
    Observed(Frame),
    All(Vec<Goal>),
    Any(Vec<Goal>),
}

#[derive(Debug, Clone)]
pub struct Goal {
    pub kind: GoalKind,
    pub start: ContextId,
}

fn spoken_by(entries: &[Entry], speaker: Option<EntityId>) -> impl Iterator<Item = &Utterance> {
    entries
        .iter()
        .map(|e| &e.utterance)
        .filter(move |u| u.speaker == speaker)
}

/// Ordered containment: every element of `sub` appears in `list` in order.
pub fn is_sublist<'a>(list: impl IntoIterator<Item = &'a Utterance>, sub: &[Utterance]) -> bool {
    let mut wanted = sub.iter().peekable();
    for item in list {
        match wanted.peek() {
            Some(next) if *next == item => {
                wanted.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    wanted.peek().is_none()
}

impl Goal {
    pub fn new(kind: GoalKind, start: ContextId) -> Self {
        Self { kind, start }
    }

    pub fn evaluate(&self, context: &Context) -> GoalStatus {
        let entries = context.since(self.start);
        match &self.kind {
            GoalKind::MultipleCorrect {
                participant,
                accept,
                reject,
            } => {
                for u in spoken_by(entries, Some(*participant)) {
                    if accept.contains(u) {
                        return GoalStatus::Satisfied;
                    }
                    if reject.contains(u) {
                        return GoalStatus::Contradicted;
                    }
                }
                GoalStatus::Pending
            }
            GoalKind::StepsSublist { participant, steps } => {
                if is_sublist(spoken_by(entries, Some(*participant)), steps) {
                    GoalStatus::Satisfied
                } else {
                    GoalStatus::Pending
                }
            }
            GoalKind::Arrived {
                participant,
                destination,
            } => {
                let arrival = sentences::located(*participant, *destination);
                let arrived = spoken_by(entries, None)
                    .flat_map(|u| u.frames.iter())
                    .any(|f| *f == arrival);
                if arrived {
                    GoalStatus::Satisfied
                } else {
                    GoalStatus::Pending
                }
            }
            GoalKind::Observed(frame) => {
                let seen = spoken_by(entries, None)
                    .flat_map(|u| u.frames.iter())
                    .any(|f| f == frame);
                if seen {
                    GoalStatus::Satisfied
                } else {
                    GoalStatus::Pending
                }
            }
            GoalKind::All(goals) => {
                let mut all = true;
                for goal in goals {
                    match goal.evaluate(context) {
                        GoalStatus::Contradicted => return GoalStatus::Contradicted,
                        GoalStatus::Pending => all = false,
                        GoalStatus::Satisfied => {}
                    }
                }
                if all && !goals.is_empty() {
                    GoalStatus::Satisfied
                } else {
                    GoalStatus::Pending
                }
            }
            GoalKind::Any(goals) => {
                let mut contradicted = 0;
                for goal in goals {
                    match goal.evaluate(context) {
                        GoalStatus::Satisfied => return GoalStatus::Satisfied,
                        GoalStatus::Contradicted => contradicted += 1,
                        GoalStatus::Pending => {}
                    }
                }
                if contradicted > 0 && contradicted == goals.len() {
                    GoalStatus::Contradicted
                } else {
                    GoalStatus::Pending
                }
            }
        }
    }
}
