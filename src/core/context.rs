/// Shared dialogue history: append-only, with ids that survive eviction.

use std::fmt;
use thiserror::Error;

use crate::schema::utterance::Utterance;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("cannot truncate to {requested}: ids below {flushed} were flushed")]
    Flushed { requested: u64, flushed: u64 },
    #[error("cannot truncate to {requested}: context only has {len} entries")]
    BeyondEnd { requested: u64, len: u64 },
}

/// Position of an utterance in the shared history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// An utterance and the serialized line written for it.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: ContextId,
    pub utterance: Utterance,
    pub line: String,
}

/// Every utterance produced so far. Flushed entries leave memory but keep
/// their ids: the next id is always `flushed + resident`.
#[derive(Debug, Clone, Default)]
pub struct Context {
    resident: Vec<Entry>,
    flushed: u64,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, utterance: Utterance, line: String) -> ContextId {
        let id = self.next_id();
        self.resident.push(Entry {
            id,
            utterance,
            line,
        });
        id
    }

    pub fn next_id(&self) -> ContextId {
        ContextId(self.len())
    }

    /// Total number of utterances ever appended, flushed ones included.
    pub fn len(&self) -> u64 {
        self.flushed + self.resident.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First id still held in memory.
    pub fn flushed(&self) -> ContextId {
        ContextId(self.flushed)
    }

    pub fn resident(&self) -> &[Entry] {
        &self.resident
    }

    pub fn get(&self, id: ContextId) -> Option<&Entry> {
        let index = id.0.checked_sub(self.flushed)?;
        self.resident.get(index as usize)
    }

    /// Resident entries with id at or after `from`.
    pub fn since(&self, from: ContextId) -> &[Entry] {
        let start = from.0.saturating_sub(self.flushed) as usize;
        self.resident.get(start..).unwrap_or(&[])
    }

    /// Drop entries at or after `len`. The range must still be resident.
    pub fn truncate_to(&mut self, len: u64) -> Result<(), ContextError> {
        if len < self.flushed {
            return Err(ContextError::Flushed {
                requested: len,
                flushed: self.flushed,
            });
        }
        if len > self.len() {
            return Err(ContextError::BeyondEnd {
                requested: len,
                len: self.len(),
            });
        }
        self.resident.truncate((len - self.flushed) as usize);
        Ok(())
    }

    /// Evict all but the last `keep` resident entries, returning their lines.
    pub fn flush(&mut self, keep: usize) -> Vec<String> {
        let evict = self.resident.len().saturating_sub(keep);
        let lines: Vec<String> = self.resident.drain(..evict).map(|e| e.line).collect();
        self.flushed += lines.len() as u64;
        lines
    }
}

/// Last-seen position for "unseen since" queries. Never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextCursor {
    last_seen: ContextId,
}

impl ContextCursor {
    pub fn position(&self) -> ContextId {
        self.last_seen
    }

    pub fn resume_from(&mut self, id: ContextId) {
        self.last_seen = self.last_seen.max(id);
    }

    /// Resident entries not yet seen.
    pub fn unseen<'c>(&self, context: &'c Context) -> &'c [Entry] {
        context.since(self.last_seen)
    }

    pub fn mark_seen(&mut self, context: &Context) {
        self.resume_from(context.next_id());
    }
}
