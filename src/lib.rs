//! Dialogue Engine: simulated multi-turn dialogues in a textual world.
//!
//! A user asks an agent for something, the agent answers or acts, the
//! environment reports what happened, and a goal decides when the exchange
//! is over. Every utterance is kept as semantic frames and as a flat token
//! line, so generated dialogues double as training and evaluation data.

pub mod config;
pub mod core;
pub mod schema;

pub use crate::config::EngineConfig;
pub use crate::core::engine::{DialogueEngine, EngineError};
