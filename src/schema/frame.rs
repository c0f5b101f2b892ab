/// Semantic frames: predicate, mood and role arguments.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use super::entity::{EntityId, Value};

/// Role names shared by the built-in predicates.
pub mod roles {
    pub const THEME: &str = "theme";
    pub const KEY: &str = "key";
    pub const VALUE: &str = "value";
    pub const NEG: &str = "neg";
    pub const AGENT: &str = "agent";
    pub const ADDRESSEE: &str = "addressee";
    pub const CONTENT: &str = "content";
    pub const OWNER: &str = "owner";
    pub const POSSESSION: &str = "possession";
    pub const DESTINATION: &str = "destination";
    pub const CLAUSES: &str = "clauses";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mood {
    Statement,
    Question,
    Command,
}

impl Mood {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Statement => "statement",
            Self::Question => "question",
            Self::Command => "command",
        }
    }

    pub fn from_token(token: &str) -> Option<Mood> {
        match token {
            "statement" => Some(Self::Statement),
            "question" => Some(Self::Question),
            "command" => Some(Self::Command),
            _ => None,
        }
    }
}

/// What an argument is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgValue {
    Entity(EntityId),
    Text(String),
    Number(i64),
    List(Vec<ArgValue>),
    Frame(Box<Frame>),
}

impl ArgValue {
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

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Self::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The entity property value this argument denotes, if it has one.
    pub fn to_property_value(&self) -> Option<Value> {
        match self {
            Self::Entity(id) => Some(Value::Entity(*id)),
            Self::Text(s) => Some(Value::Text(s.clone())),
            Self::Number(n) => Some(Value::Int(*n)),
            Self::List(_) | Self::Frame(_) => None,
        }
    }

    pub fn from_property_value(value: &Value) -> ArgValue {
        match value {
            Value::Entity(id) => Self::Entity(*id),
            Value::Text(s) => Self::Text(s.clone()),
            Value::Int(n) => Self::Number(*n),
            Value::Bool(b) => Self::Text(b.to_string()),
        }
    }
}

/// A value paired with the wording chosen for it in one utterance.
///
/// Equality and hashing look at the value only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub value: ArgValue,
    pub surface: Vec<String>,
}

impl Argument {
    /// An argument whose surface has not been realized yet.
    pub fn bare(value: ArgValue) -> Self {
        Self {
            value,
            surface: Vec::new(),
        }
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Argument {}

impl Hash for Argument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    pub predicate: String,
    pub mood: Mood,
    pub args: BTreeMap<String, Argument>,
}

impl Frame {
    pub fn new(predicate: &str, mood: Mood) -> Self {
        Self {
            predicate: predicate.to_string(),
            mood,
            args: BTreeMap::new(),
        }
    }

    /// Set a role to an unrealized value.
    pub fn with(mut self, role: &str, value: ArgValue) -> Self {
        self.args.insert(role.to_string(), Argument::bare(value));
        self
    }

    pub fn arg(&self, role: &str) -> Option<&ArgValue> {
        self.args.get(role).map(|a| &a.value)
    }

    pub fn entity(&self, role: &str) -> Option<EntityId> {
        self.arg(role).and_then(ArgValue::as_entity)
    }

    pub fn text(&self, role: &str) -> Option<&str> {
        self.arg(role).and_then(ArgValue::as_text)
    }

    pub fn is(&self, predicate: &str) -> bool {
        self.predicate == predicate
    }

    pub fn is_negated(&self) -> bool {
        self.args.contains_key(roles::NEG)
    }

    /// Same frame with the polarity flipped.
    pub fn negated(&self) -> Frame {
        if self.is_negated() {
            self.without_neg()
        } else {
            let mut frame = self.clone();
            frame.args.insert(
                roles::NEG.to_string(),
                Argument::bare(ArgValue::Text("not".to_string())),
            );
            frame
        }
    }

    pub fn without_neg(&self) -> Frame {
        let mut frame = self.clone();
        frame.args.remove(roles::NEG);
        frame
    }

    pub fn with_mood(&self, mood: Mood) -> Frame {
        let mut frame = self.clone();
        frame.mood = mood;
        frame
    }

    /// Frames carried inside this one that state something on their own:
    /// the content of `say` and the clauses of `and`.
    pub fn embedded(&self) -> Vec<&Frame> {
        let mut out = Vec::new();
        if let Some(content) = self.arg(roles::CONTENT).and_then(ArgValue::as_frame) {
            if self.is("say") {
                out.push(content);
            }
        }
        if let Some(clauses) = self.arg(roles::CLAUSES).and_then(ArgValue::as_list) {
            out.extend(clauses.iter().filter_map(ArgValue::as_frame));
        }
        out
    }
}
