/// Knowledge base: facts derived from trusted utterances, answered by
/// ordered checkers.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::checkers;
use crate::core::context::{Context, ContextId};
use crate::core::updaters;
use crate::schema::entity::{EntityId, Value, LOCATION};
use crate::schema::frame::{roles, Frame, Mood};
use crate::schema::utterance::Utterance;
use crate::schema::world::World;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("snapshot predates the last journal flush ({journal_len} > {current})")]
    StaleSnapshot { journal_len: usize, current: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    Unknown,
}

impl From<Option<bool>> for Truth {
    fn from(answer: Option<bool>) -> Self {
        match answer {
            Some(true) => Truth::True,
            Some(false) => Truth::False,
            None => Truth::Unknown,
        }
    }
}

/// A normalized fact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Proposition {
    Property {
        entity: EntityId,
        key: String,
        value: Value,
    },
    Attribute {
        entity: EntityId,
        attribute: String,
    },
    /// A whole statement frame, positive polarity.
    Statement(Frame),
}

impl Proposition {
    pub fn location(entity: EntityId, place: EntityId) -> Self {
        Proposition::Property {
            entity,
            key: LOCATION.to_string(),
            value: Value::Entity(place),
        }
    }

    /// The proposition a `be` frame talks about, with the polarity it asserts.
    pub fn from_be(frame: &Frame) -> Option<(Proposition, bool)> {
        if !frame.is("be") {
            return None;
        }
        let entity = frame.entity(roles::THEME)?;
        let value = frame.arg(roles::VALUE)?;
        let prop = match frame.text(roles::KEY) {
            Some(key) => Proposition::Property {
                entity,
                key: key.to_string(),
                value: value.to_property_value()?,
            },
            None => Proposition::Attribute {
                entity,
                attribute: value.as_text()?.to_string(),
            },
        };
        Some((prop, !frame.is_negated()))
    }

    /// Whether the world itself makes this proposition true.
    pub fn holds_in(&self, world: &World) -> bool {
        match self {
            Proposition::Property { entity, key, value } => world
                .get(*entity)
                .and_then(|e| e.property(key))
                .map_or(false, |v| v == value),
            Proposition::Attribute { entity, attribute } => world
                .get(*entity)
                .map_or(false, |e| e.has_attribute(attribute)),
            Proposition::Statement(_) => false,
        }
    }

    /// Statement key for any frame: positive polarity, statement mood.
    pub fn statement(frame: &Frame) -> (Proposition, bool) {
        let key = frame.without_neg().with_mood(Mood::Statement);
        (Proposition::Statement(key), !frame.is_negated())
    }
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Fact {
        prop: Proposition,
        previous: Option<bool>,
    },
    Exclusive {
        slot: (EntityId, String),
        previous: Option<Value>,
    },
}

/// Facts plus the exclusive-value index and the undo journal.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    facts: FxHashMap<Proposition, bool>,
    exclusive: FxHashMap<(EntityId, String), Value>,
    exclusive_keys: Vec<String>,
    journal: Vec<JournalEntry>,
}

impl FactStore {
    pub fn new(exclusive_keys: Vec<String>) -> Self {
        Self {
            exclusive_keys,
            ..Self::default()
        }
    }

    fn is_exclusive(&self, key: &str) -> bool {
        self.exclusive_keys.iter().any(|k| k == key)
    }

    fn record(&mut self, prop: Proposition, truth: bool) {
        let previous = self.facts.get(&prop).copied();
        if previous == Some(truth) {
            return;
        }
        self.journal.push(JournalEntry::Fact {
            prop: prop.clone(),
            previous,
        });
        self.facts.insert(prop, truth);
    }

    fn set_exclusive(&mut self, slot: (EntityId, String), value: Option<Value>) {
        let previous = self.exclusive.get(&slot).cloned();
        if previous == value {
            return;
        }
        self.journal.push(JournalEntry::Exclusive {
            slot: slot.clone(),
            previous,
        });
        match value {
            Some(v) => self.exclusive.insert(slot, v),
            None => self.exclusive.remove(&slot),
        };
    }

    /// Write a fact. A true value for an exclusive key falsifies the value
    /// previously known for it.
    pub fn set(&mut self, prop: Proposition, truth: bool) {
        if let Proposition::Property { entity, key, value } = &prop {
            if self.is_exclusive(key) {
                let slot = (*entity, key.clone());
                let current = self.exclusive.get(&slot).cloned();
                if truth {
                    if let Some(old) = current.filter(|old| old != value) {
                        self.record(
                            Proposition::Property {
                                entity: *entity,
                                key: key.clone(),
                                value: old,
                            },
                            false,
                        );
                    }
                    self.set_exclusive(slot, Some(value.clone()));
                } else if current.as_ref() == Some(value) {
                    self.set_exclusive(slot, None);
                }
            }
        }
        self.record(prop, truth);
    }

    fn undo_to(&mut self, len: usize) {
        while self.journal.len() > len {
            match self.journal.pop() {
                Some(JournalEntry::Fact { prop, previous }) => match previous {
                    Some(b) => {
                        self.facts.insert(prop, b);
                    }
                    None => {
                        self.facts.remove(&prop);
                    }
                },
                Some(JournalEntry::Exclusive { slot, previous }) => match previous {
                    Some(v) => {
                        self.exclusive.insert(slot, v);
                    }
                    None => {
                        self.exclusive.remove(&slot);
                    }
                },
                None => break,
            }
        }
    }
}

/// Write access handed to updaters.
pub struct FactWriter<'a> {
    store: &'a mut FactStore,
}

impl FactWriter<'_> {
    pub fn set(&mut self, prop: Proposition, truth: bool) {
        self.store.set(prop, truth);
    }

    pub fn get(&self, prop: &Proposition) -> Option<bool> {
        self.store.facts.get(prop).copied()
    }
}

pub type Updater = fn(&mut FactWriter<'_>, &Frame, &World);
pub type Checker = fn(&KnowledgeBase, &Frame, &World) -> Option<bool>;

/// Point to roll the fact store back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KbSnapshot {
    journal_len: usize,
    consumed: ContextId,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    updaters: Vec<Updater>,
    checkers: Vec<Checker>,
    store: FactStore,
    consumed: ContextId,
}

impl KnowledgeBase {
    /// Built-in rules, `location` plus `exclusive_keys` as mutually exclusive.
    pub fn new(exclusive_keys: &[String]) -> Self {
        let mut keys = vec![LOCATION.to_string()];
        keys.extend(exclusive_keys.iter().filter(|k| *k != LOCATION).cloned());
        Self::with_rules(updaters::defaults(), checkers::defaults(), keys)
    }

    pub fn with_rules(
        updaters: Vec<Updater>,
        checkers: Vec<Checker>,
        exclusive_keys: Vec<String>,
    ) -> Self {
        Self {
            updaters,
            checkers,
            store: FactStore::new(exclusive_keys),
            consumed: ContextId::default(),
        }
    }

    /// Apply a trusted utterance. Untrusted ones are ignored.
    pub fn update(&mut self, utterance: &Utterance, world: &World) {
        if !utterance.trusted {
            return;
        }
        for frame in &utterance.frames {
            self.apply(frame, world);
        }
    }

    fn apply(&mut self, frame: &Frame, world: &World) {
        let mut writer = FactWriter {
            store: &mut self.store,
        };
        for updater in &self.updaters {
            updater(&mut writer, frame, world);
        }
        for inner in frame.embedded() {
            self.apply(inner, world);
        }
    }

    /// Apply every context entry not consumed yet.
    pub fn sync(&mut self, context: &Context, world: &World) {
        if self.consumed < context.flushed() {
            tracing::warn!(
                from = self.consumed.0,
                to = context.flushed().0,
                "context range flushed before the knowledge base consumed it; skipping"
            );
            self.consumed = context.flushed();
        }
        for entry in context.since(self.consumed) {
            self.update(&entry.utterance, world);
        }
        self.consumed = context.next_id();
    }

    /// First non-abstaining checker wins.
    pub fn check(&self, frame: &Frame, world: &World) -> Truth {
        self.checkers
            .iter()
            .find_map(|checker| checker(self, frame, world))
            .into()
    }

    pub fn check_all(&self, frames: &[Frame], world: &World) -> Truth {
        let mut all_true = true;
        for frame in frames {
            match self.check(frame, world) {
                Truth::False => return Truth::False,
                Truth::Unknown => all_true = false,
                Truth::True => {}
            }
        }
        if all_true {
            Truth::True
        } else {
            Truth::Unknown
        }
    }

    pub fn fact(&self, prop: &Proposition) -> Option<bool> {
        self.store.facts.get(prop).copied()
    }

    pub fn exclusive_value(&self, entity: EntityId, key: &str) -> Option<&Value> {
        self.store.exclusive.get(&(entity, key.to_string()))
    }

    pub fn is_exclusive(&self, key: &str) -> bool {
        self.store.is_exclusive(key)
    }

    /// Whether `entity` is known to be at `place`, directly or by exclusion.
    pub fn known_location(&self, entity: EntityId, place: EntityId) -> Option<bool> {
        self.fact(&Proposition::location(entity, place)).or_else(|| {
            self.exclusive_value(entity, LOCATION)
                .map(|v| *v == Value::Entity(place))
        })
    }

    pub fn len(&self) -> usize {
        self.store.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.facts.is_empty()
    }

    /// First context id not yet applied.
    pub fn consumed(&self) -> ContextId {
        self.consumed
    }

    pub fn snapshot(&self) -> KbSnapshot {
        KbSnapshot {
            journal_len: self.store.journal.len(),
            consumed: self.consumed,
        }
    }

    pub fn restore(&mut self, snapshot: &KbSnapshot) -> Result<(), KnowledgeError> {
        let current = self.store.journal.len();
        if snapshot.journal_len > current {
            return Err(KnowledgeError::StaleSnapshot {
                journal_len: snapshot.journal_len,
                current,
            });
        }
        self.store.undo_to(snapshot.journal_len);
        self.consumed = snapshot.consumed;
        Ok(())
    }

    /// Drop undo history. Earlier snapshots can no longer be restored.
    pub fn flush_journal(&mut self) {
        self.store.journal.clear();
    }
}
