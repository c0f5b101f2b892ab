/// Semantic serialization: frames to a flat token stream and back.
///
/// ```text
/// sent    := "bsent" [speaker] frame* "esent"
/// speaker := "bspeaker" entity "espeaker"
/// frame   := "bframe" "bpred" PRED "epred" "bmood" MOOD "emood" arg* "eframe"
/// arg     := "b"ROLE value "e"ROLE
/// value   := entity | "bnum" INT "enum" | "blist" value* "elist" | frame | TEXT
/// entity  := "bentity" WORD+ "eentity"
/// ```
///
/// Entities are written as their description, never their id, and a
/// description has to pick out exactly one entity. Bookkeeping keys and
/// hidden attributes are never written.
///
/// Lines carry no trust marker: a sentence without a speaker is an
/// environment report and reads back as trusted.

use thiserror::Error;

use crate::core::phrasing::{Lexicon, SchemaSet};
use crate::core::sentences::canonical_request;
use crate::schema::entity::{is_describable_key, EntityId, HIDDEN_ATTRIBUTES};
use crate::schema::frame::{ArgValue, Argument, Frame, Mood};
use crate::schema::utterance::{ask_about, Hooks, Utterance};
use crate::schema::world::World;

/// Structural tokens. A text value may not be one of these.
pub const RESERVED: &[&str] = &[
    "bsent", "esent", "bspeaker", "espeaker", "bframe", "eframe", "bpred", "epred", "bmood",
    "emood", "bentity", "eentity", "bnum", "enum", "blist", "elist",
];

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("argument '{role}' of '{predicate}' has no surface realization")]
    EmptySurface { predicate: String, role: String },
    #[error("entity {0} has no describable property")]
    Indescribable(EntityId),
    #[error("entity {0} is not in the world")]
    UnknownEntity(EntityId),
    #[error("token '{0}' cannot be written as a text value")]
    InvalidText(String),
    #[error("hidden attribute '{0}' would be exposed")]
    HiddenAttribute(String),
    #[error("bookkeeping key '{0}' would be exposed")]
    HiddenKey(String),
    #[error("description '{description}' matches {matches} entities")]
    Ambiguous { description: String, matches: usize },
}

#[derive(Debug, Error)]
pub enum DeserializationError {
    #[error("unexpected end of tokens, expected {0}")]
    UnexpectedEnd(String),
    #[error("unexpected token '{found}', expected {expected}")]
    UnexpectedToken { found: String, expected: String },
    #[error("unknown predicate '{0}'")]
    UnknownPredicate(String),
    #[error("predicate '{predicate}' does not accept role '{role}'")]
    UnknownRole { predicate: String, role: String },
    #[error("unknown mood '{0}'")]
    UnknownMood(String),
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("description '{description}' matches {matches} entities")]
    Unresolved { description: String, matches: usize },
    #[error("{0} trailing tokens")]
    TrailingTokens(usize),
}

fn check_text(token: &str) -> Result<(), SerializationError> {
    if token.is_empty() || token.chars().any(char::is_whitespace) || RESERVED.contains(&token) {
        return Err(SerializationError::InvalidText(token.to_string()));
    }
    if HIDDEN_ATTRIBUTES.contains(&token) {
        return Err(SerializationError::HiddenAttribute(token.to_string()));
    }
    if !is_describable_key(token) {
        return Err(SerializationError::HiddenKey(token.to_string()));
    }
    Ok(())
}

/// Tokens for an utterance's speaker and frames.
pub fn serialize(utterance: &Utterance, world: &World) -> Result<Vec<String>, SerializationError> {
    let mut out = vec!["bsent".to_string()];
    if let Some(speaker) = utterance.speaker {
        out.push("bspeaker".to_string());
        write_entity(speaker, world, &mut out)?;
        out.push("espeaker".to_string());
    }
    for frame in &utterance.frames {
        write_frame(frame, world, &mut out)?;
    }
    out.push("esent".to_string());
    Ok(out)
}

/// One context line: the tokens separated by spaces.
pub fn serialize_line(utterance: &Utterance, world: &World) -> Result<String, SerializationError> {
    Ok(serialize(utterance, world)?.join(" "))
}

fn write_frame(frame: &Frame, world: &World, out: &mut Vec<String>) -> Result<(), SerializationError> {
    check_text(&frame.predicate)?;
    out.push("bframe".to_string());
    out.push("bpred".to_string());
    out.push(frame.predicate.clone());
    out.push("epred".to_string());
    out.push("bmood".to_string());
    out.push(frame.mood.token().to_string());
    out.push("emood".to_string());
    for (role, arg) in &frame.args {
        write_arg(frame, role, arg, world, out)?;
    }
    out.push("eframe".to_string());
    Ok(())
}

fn write_arg(
    frame: &Frame,
    role: &str,
    arg: &Argument,
    world: &World,
    out: &mut Vec<String>,
) -> Result<(), SerializationError> {
    if arg.surface.is_empty() {
        return Err(SerializationError::EmptySurface {
            predicate: frame.predicate.clone(),
            role: role.to_string(),
        });
    }
    check_text(role)?;
    out.push(format!("b{}", role));
    write_value(&arg.value, world, out)?;
    out.push(format!("e{}", role));
    Ok(())
}

fn write_value(value: &ArgValue, world: &World, out: &mut Vec<String>) -> Result<(), SerializationError> {
    match value {
        ArgValue::Entity(id) => write_entity(*id, world, out),
        ArgValue::Text(text) => {
            check_text(text)?;
            out.push(text.clone());
            Ok(())
        }
        ArgValue::Number(n) => {
            out.extend(["bnum".to_string(), n.to_string(), "enum".to_string()]);
            Ok(())
        }
        ArgValue::List(items) => {
            out.push("blist".to_string());
            for item in items {
                write_value(item, world, out)?;
            }
            out.push("elist".to_string());
            Ok(())
        }
        ArgValue::Frame(frame) => write_frame(frame, world, out),
    }
}

fn write_entity(id: EntityId, world: &World, out: &mut Vec<String>) -> Result<(), SerializationError> {
    let description = world
        .description_tokens(id)
        .map_err(|_| SerializationError::UnknownEntity(id))?;
    if description.is_empty() {
        return Err(SerializationError::Indescribable(id));
    }
    let matches = world.resolve(&description);
    if matches != [id] {
        return Err(SerializationError::Ambiguous {
            description: description.join(" "),
            matches: matches.len(),
        });
    }
    out.push("bentity".to_string());
    for token in description {
        check_text(&token)?;
        out.push(token);
    }
    out.push("eentity".to_string());
    Ok(())
}

/// Rebuild an utterance from tokens. Surfaces are re-realized from values.
pub fn deserialize(
    tokens: &[String],
    world: &World,
    schemas: &SchemaSet,
) -> Result<Utterance, DeserializationError> {
    let mut reader = Reader {
        tokens,
        pos: 0,
        world,
        schemas,
    };
    reader.expect("bsent")?;
    let mut speaker = None;
    if reader.peek() == Some("bspeaker") {
        reader.next("bspeaker")?;
        speaker = Some(reader.entity()?);
        reader.expect("espeaker")?;
    }
    let mut frames = Vec::new();
    while reader.peek() == Some("bframe") {
        frames.push(reader.frame()?);
    }
    reader.expect("esent")?;
    if reader.pos < tokens.len() {
        return Err(DeserializationError::TrailingTokens(tokens.len() - reader.pos));
    }

    let lex = Lexicon::new(world, schemas);
    let mut realized = Vec::with_capacity(frames.len());
    let mut surface = Vec::new();
    for frame in frames {
        let (frame, words) = lex.phrase(frame);
        surface.extend(words);
        realized.push(frame);
    }
    Ok(Utterance {
        tokens: surface,
        frames: realized,
        speaker,
        trusted: speaker.is_none(),
        hooks: Hooks {
            request_form: Some(ask_about),
            canonical: Some(canonical_request),
        },
    })
}

/// Parse a context line written by `serialize_line`.
pub fn deserialize_line(
    line: &str,
    world: &World,
    schemas: &SchemaSet,
) -> Result<Utterance, DeserializationError> {
    let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    deserialize(&tokens, world, schemas)
}

struct Reader<'a> {
    tokens: &'a [String],
    pos: usize,
    world: &'a World,
    schemas: &'a SchemaSet,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self, expected: &str) -> Result<&'a str, DeserializationError> {
        let token = self
            .peek()
            .ok_or_else(|| DeserializationError::UnexpectedEnd(expected.to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: &str) -> Result<(), DeserializationError> {
        let token = self.next(expected)?;
        if token != expected {
            return Err(DeserializationError::UnexpectedToken {
                found: token.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }

    fn frame(&mut self) -> Result<Frame, DeserializationError> {
        self.expect("bframe")?;
        self.expect("bpred")?;
        let predicate = self.next("predicate")?;
        let schemas = self.schemas;
        let schema = schemas
            .get(predicate)
            .ok_or_else(|| DeserializationError::UnknownPredicate(predicate.to_string()))?;
        self.expect("epred")?;
        self.expect("bmood")?;
        let mood_token = self.next("mood")?;
        let mood = Mood::from_token(mood_token)
            .ok_or_else(|| DeserializationError::UnknownMood(mood_token.to_string()))?;
        self.expect("emood")?;

        let mut frame = Frame::new(predicate, mood);
        loop {
            let token = self.next("argument or eframe")?;
            if token == "eframe" {
                return Ok(frame);
            }
            let role = token
                .strip_prefix('b')
                .filter(|r| !r.is_empty())
                .ok_or_else(|| DeserializationError::UnexpectedToken {
                    found: token.to_string(),
                    expected: "argument or eframe".to_string(),
                })?;
            if !schema.accepts(role) {
                return Err(DeserializationError::UnknownRole {
                    predicate: predicate.to_string(),
                    role: role.to_string(),
                });
            }
            let value = self.value()?;
            self.expect(&format!("e{}", role))?;
            frame = frame.with(role, value);
        }
    }

    fn value(&mut self) -> Result<ArgValue, DeserializationError> {
        match self.peek() {
            None => Err(DeserializationError::UnexpectedEnd("value".to_string())),
            Some("bentity") => Ok(ArgValue::Entity(self.entity()?)),
            Some("bframe") => Ok(ArgValue::Frame(Box::new(self.frame()?))),
            Some("bnum") => {
                self.next("bnum")?;
                let token = self.next("number")?;
                let n = token
                    .parse::<i64>()
                    .map_err(|_| DeserializationError::InvalidNumber(token.to_string()))?;
                self.expect("enum")?;
                Ok(ArgValue::Number(n))
            }
            Some("blist") => {
                self.next("blist")?;
                let mut items = Vec::new();
                while self.peek() != Some("elist") {
                    items.push(self.value()?);
                }
                self.expect("elist")?;
                Ok(ArgValue::List(items))
            }
            Some(token) if RESERVED.contains(&token) => Err(DeserializationError::UnexpectedToken {
                found: token.to_string(),
                expected: "value".to_string(),
            }),
            Some(token) => {
                self.pos += 1;
                Ok(ArgValue::Text(token.to_string()))
            }
        }
    }

    fn entity(&mut self) -> Result<EntityId, DeserializationError> {
        self.expect("bentity")?;
        let mut description = Vec::new();
        loop {
            let token = self.next("eentity")?;
            if token == "eentity" {
                break;
            }
            description.push(token.to_string());
        }
        let matches = self.world.resolve(&description);
        match matches.as_slice() {
            [id] => Ok(*id),
            _ => Err(DeserializationError::Unresolved {
                description: description.join(" "),
                matches: matches.len(),
            }),
        }
    }
}
