pub mod checkers;
pub mod context;
pub mod dialogue;
pub mod engine;
pub mod environment;
pub mod evaluation;
pub mod goal;
pub mod knowledge;
pub mod phrasing;
pub mod policy;
pub mod responders;
pub mod sentences;
pub mod serialize;
pub mod store;
pub mod template;
pub mod updaters;
