pub mod entity;
pub mod frame;
pub mod relationship;
pub mod utterance;
pub mod world;
