/// Predicate schemas: accepted roles, surface patterns, realization.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::schema::entity::LOCATION;
use crate::schema::frame::{roles, ArgValue, Frame, Mood};
use crate::schema::world::World;

#[derive(Debug, Error)]
pub enum PhrasingError {
    #[error("pattern parse error: {0}")]
    PatternParse(String),
    #[error("pattern for '{predicate}' names role '{role}' it does not accept")]
    UndeclaredRole { predicate: String, role: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A segment of a parsed surface pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternSegment {
    /// A literal word, emitted as-is.
    Word(String),
    /// The surface of a role argument: `{role}`.
    Role(String),
    /// Emitted only when every role inside is present: `[ ... ]`.
    Optional(Vec<PatternSegment>),
}

/// A parsed surface pattern, e.g. `{theme} ['s {key}] is [{neg}] {value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub segments: Vec<PatternSegment>,
}

impl Pattern {
    /// Parse a pattern string.
    ///
    /// Syntax:
    /// - `{role}` → `Role`
    /// - `[ ... ]` → `Optional` (not nested)
    /// - `'s`, `,` and `:` are words of their own
    /// - everything else splits on whitespace into `Word`s
    pub fn parse(input: &str) -> Result<Pattern, PhrasingError> {
        let mut stack: Vec<Vec<PatternSegment>> = vec![Vec::new()];
        let mut word = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        fn flush(word: &mut String, stack: &mut [Vec<PatternSegment>]) {
            if !word.is_empty() {
                if let Some(top) = stack.last_mut() {
                    top.push(PatternSegment::Word(std::mem::take(word)));
                }
            }
        }

        while i < len {
            match chars[i] {
                '{' => {
                    flush(&mut word, &mut stack);
                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(PhrasingError::PatternParse(
                                "nested braces are not allowed".to_string(),
                            ));
                        }
                        end += 1;
                    }
                    if end == len {
                        return Err(PhrasingError::PatternParse("unclosed brace".to_string()));
                    }
                    let role: String = chars[start..end].iter().collect();
                    if role.trim().is_empty() {
                        return Err(PhrasingError::PatternParse("empty braces".to_string()));
                    }
                    if let Some(top) = stack.last_mut() {
                        top.push(PatternSegment::Role(role.trim().to_string()));
                    }
                    i = end + 1;
                }
                '}' => {
                    return Err(PhrasingError::PatternParse(
                        "unmatched closing brace".to_string(),
                    ));
                }
                '[' => {
                    flush(&mut word, &mut stack);
                    if stack.len() > 1 {
                        return Err(PhrasingError::PatternParse(
                            "nested optional groups are not allowed".to_string(),
                        ));
                    }
                    stack.push(Vec::new());
                    i += 1;
                }
                ']' => {
                    flush(&mut word, &mut stack);
                    if stack.len() < 2 {
                        return Err(PhrasingError::PatternParse(
                            "unmatched closing bracket".to_string(),
                        ));
                    }
                    let group = stack.pop().unwrap_or_default();
                    if let Some(top) = stack.last_mut() {
                        top.push(PatternSegment::Optional(group));
                    }
                    i += 1;
                }
                '\'' if chars.get(i + 1) == Some(&'s') => {
                    flush(&mut word, &mut stack);
                    word.push_str("'s");
                    flush(&mut word, &mut stack);
                    i += 2;
                }
                ',' | ':' => {
                    flush(&mut word, &mut stack);
                    word.push(chars[i]);
                    flush(&mut word, &mut stack);
                    i += 1;
                }
                c if c.is_whitespace() => {
                    flush(&mut word, &mut stack);
                    i += 1;
                }
                c => {
                    word.push(c);
                    i += 1;
                }
            }
        }
        flush(&mut word, &mut stack);

        if stack.len() != 1 {
            return Err(PhrasingError::PatternParse("unclosed bracket".to_string()));
        }
        Ok(Pattern {
            segments: stack.pop().unwrap_or_default(),
        })
    }

    /// Role names mentioned anywhere in the pattern.
    pub fn roles(&self) -> Vec<&str> {
        fn walk<'a>(segments: &'a [PatternSegment], out: &mut Vec<&'a str>) {
            for segment in segments {
                match segment {
                    PatternSegment::Role(r) => out.push(r),
                    PatternSegment::Optional(inner) => walk(inner, out),
                    PatternSegment::Word(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.segments, &mut out);
        out
    }

    /// Render against a frame's argument surfaces. `None` if a required
    /// role is missing.
    fn render(&self, frame: &Frame) -> Option<Vec<String>> {
        fn render_into(
            segments: &[PatternSegment],
            frame: &Frame,
            out: &mut Vec<String>,
        ) -> Option<()> {
            for segment in segments {
                match segment {
                    PatternSegment::Word(w) => out.push(w.clone()),
                    PatternSegment::Role(r) => {
                        out.extend(frame.args.get(r)?.surface.iter().cloned());
                    }
                    PatternSegment::Optional(inner) => {
                        let mut buf = Vec::new();
                        if render_into(inner, frame, &mut buf).is_some() {
                            out.extend(buf);
                        }
                    }
                }
            }
            Some(())
        }
        let mut out = Vec::new();
        render_into(&self.segments, frame, &mut out)?;
        Some(out)
    }
}

/// One predicate: the roles it accepts and a surface pattern per mood.
#[derive(Debug, Clone)]
pub struct PredicateSchema {
    pub name: String,
    pub roles: Vec<String>,
    pub patterns: BTreeMap<Mood, Pattern>,
}

impl PredicateSchema {
    pub fn accepts(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// A set of predicate schemas, keyed by predicate name.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    pub schemas: BTreeMap<String, PredicateSchema>,
}

// RON deserialization helpers: patterns are plain strings in the file.

#[derive(Debug, Deserialize)]
#[serde(rename = "Predicate")]
struct RonPredicate {
    roles: Vec<String>,
    #[serde(default)]
    patterns: BTreeMap<Mood, String>,
}

impl SchemaSet {
    /// Schemas for the built-in predicates in `data/predicates.ron`.
    pub fn builtin() -> Result<SchemaSet, PhrasingError> {
        Self::parse_ron(include_str!("../../data/predicates.ron"))
    }

    /// Load a schema set from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<SchemaSet, PhrasingError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a schema set from a RON string.
    pub fn parse_ron(input: &str) -> Result<SchemaSet, PhrasingError> {
        let raw: BTreeMap<String, RonPredicate> = ron::from_str(input)?;
        let mut schemas = BTreeMap::new();

        for (name, ron_pred) in raw {
            let mut patterns = BTreeMap::new();
            for (mood, text) in ron_pred.patterns {
                let pattern = Pattern::parse(&text)?;
                if let Some(role) = pattern
                    .roles()
                    .into_iter()
                    .find(|r| !ron_pred.roles.iter().any(|d| d == r))
                {
                    return Err(PhrasingError::UndeclaredRole {
                        predicate: name.clone(),
                        role: role.to_string(),
                    });
                }
                patterns.insert(mood, pattern);
            }
            schemas.insert(
                name.clone(),
                PredicateSchema {
                    name,
                    roles: ron_pred.roles,
                    patterns,
                },
            );
        }

        Ok(SchemaSet { schemas })
    }

    /// Merge another schema set into this one. Schemas from `other`
    /// override schemas in `self` with the same name.
    pub fn merge(&mut self, other: SchemaSet) {
        for (name, schema) in other.schemas {
            self.schemas.insert(name, schema);
        }
    }

    pub fn get(&self, predicate: &str) -> Option<&PredicateSchema> {
        self.schemas.get(predicate)
    }

    /// Surface tokens for a frame without terminal punctuation. Arguments
    /// must already carry their surfaces.
    pub fn realize(&self, frame: &Frame) -> Vec<String> {
        let rendered = self
            .get(&frame.predicate)
            .and_then(|s| s.patterns.get(&frame.mood))
            .and_then(|p| p.render(frame));
        match rendered {
            Some(tokens) => tokens,
            None => {
                let mut tokens = vec![frame.predicate.clone()];
                for arg in frame.args.values() {
                    tokens.extend(arg.surface.iter().cloned());
                }
                tokens
            }
        }
    }

    /// Realization plus the terminal mark of the sentence's mood.
    pub fn sentence(&self, frame: &Frame) -> Vec<String> {
        let mut tokens = self.realize(frame);
        tokens.push(terminal(frame).to_string());
        tokens
    }
}

/// `.` or `?`, taken from what is ultimately being said.
fn terminal(frame: &Frame) -> &'static str {
    if frame.is("say") {
        if let Some(content) = frame.arg(roles::CONTENT).and_then(ArgValue::as_frame) {
            return terminal(content);
        }
    }
    match frame.mood {
        Mood::Question => "?",
        Mood::Statement | Mood::Command => ".",
    }
}

/// Everything needed to put words on a frame.
#[derive(Debug, Clone, Copy)]
pub struct Lexicon<'a> {
    pub world: &'a World,
    pub schemas: &'a SchemaSet,
}

impl<'a> Lexicon<'a> {
    pub fn new(world: &'a World, schemas: &'a SchemaSet) -> Self {
        Self { world, schemas }
    }

    /// Fill every argument surface from its value, nested frames first.
    pub fn realize_args(&self, frame: &mut Frame) {
        let location_value =
            frame.is("be") && frame.text(roles::KEY) == Some(LOCATION);
        for (role, arg) in frame.args.iter_mut() {
            match &mut arg.value {
                ArgValue::Frame(inner) => self.realize_args(inner),
                ArgValue::List(items) => {
                    for item in items.iter_mut() {
                        if let ArgValue::Frame(inner) = item {
                            self.realize_args(inner);
                        }
                    }
                }
                _ => {}
            }
            let mut surface = self.value_surface(&arg.value);
            if location_value && role == roles::VALUE && arg.value.as_entity().is_some() {
                surface.insert(0, "in".to_string());
            }
            arg.surface = surface;
        }
    }

    fn value_surface(&self, value: &ArgValue) -> Vec<String> {
        match value {
            ArgValue::Entity(id) => self.world.surface(*id),
            ArgValue::Text(s) => vec![s.clone()],
            ArgValue::Number(n) => vec![n.to_string()],
            ArgValue::Frame(f) => self.schemas.realize(f),
            ArgValue::List(items) if items.is_empty() => vec!["nothing".to_string()],
            ArgValue::List(items) => {
                let parts: Vec<Vec<String>> = items
                    .iter()
                    .map(|item| self.value_surface(item))
                    .collect();
                let mut out = Vec::new();
                let last = parts.len() - 1;
                for (i, part) in parts.into_iter().enumerate() {
                    if i > 0 {
                        out.push(if i == last { "and" } else { "," }.to_string());
                    }
                    out.extend(part);
                }
                out
            }
        }
    }

    /// Realized copy of `frame` and its sentence tokens.
    pub fn phrase(&self, frame: Frame) -> (Frame, Vec<String>) {
        let mut frame = frame;
        self.realize_args(&mut frame);
        let tokens = self.schemas.sentence(&frame);
        (frame, tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entity::EntityId;
    use crate::schema::utterance::join_tokens;
    use crate::schema::world::WorldBuilder;

    #[test]
    fn parse_words_and_roles() {
        let p = Pattern::parse("{agent} goes to {destination}").unwrap();
        assert_eq!(
            p.segments,
            vec![
                PatternSegment::Role("agent".to_string()),
                PatternSegment::Word("goes".to_string()),
                PatternSegment::Word("to".to_string()),
                PatternSegment::Role("destination".to_string()),
            ]
        );
    }

    #[test]
    fn parse_optional_and_clitic() {
        let p = Pattern::parse("{theme} ['s {key}] is [{neg}] {value}").unwrap();
        assert_eq!(p.segments.len(), 5);
        assert_eq!(
            p.segments[1],
            PatternSegment::Optional(vec![
                PatternSegment::Word("'s".to_string()),
                PatternSegment::Role("key".to_string()),
            ])
        );
        assert_eq!(p.roles(), vec!["theme", "key", "neg", "value"]);
    }

    #[test]
    fn parse_errors() {
        assert!(Pattern::parse("bad {} here").is_err());
        assert!(Pattern::parse("bad {unclosed").is_err());
        assert!(Pattern::parse("bad } here").is_err());
        assert!(Pattern::parse("bad [outer [inner]]").is_err());
        assert!(Pattern::parse("bad [open").is_err());
        assert!(Pattern::parse("bad close]").is_err());
    }

    #[test]
    fn undeclared_role_rejected() {
        let input = r#"{ "go": Predicate(roles: ["agent"], patterns: { Statement: "{agent} goes to {destination}" }) }"#;
        assert!(matches!(
            SchemaSet::parse_ron(input),
            Err(PhrasingError::UndeclaredRole { role, .. }) if role == "destination"
        ));
    }

    #[test]
    fn builtin_schemas_load() {
        let set = SchemaSet::builtin().unwrap();
        for name in ["be", "say", "know", "have", "go", "get", "drop", "look", "open", "close", "and"] {
            assert!(set.get(name).is_some(), "missing {}", name);
        }
        assert!(set.get("be").unwrap().accepts("neg"));
        assert!(!set.get("go").unwrap().accepts("possession"));
    }

    #[test]
    fn realize_location_sentence() {
        let world = WorldBuilder::new()
            .room("kitchen")
            .room("bedroom")
            .player("ada", "Ada", "bedroom")
            .build()
            .unwrap();
        let schemas = SchemaSet::builtin().unwrap();
        let lex = Lexicon::new(&world, &schemas);
        let ada = world.by_var_name("ada").unwrap();
        let kitchen = world.by_var_name("kitchen").unwrap();

        let frame = Frame::new("be", Mood::Statement)
            .with(roles::THEME, ArgValue::Entity(ada))
            .with(roles::KEY, ArgValue::Text(LOCATION.to_string()))
            .with(roles::VALUE, ArgValue::Entity(kitchen))
            .negated();
        let (_, tokens) = lex.phrase(frame.clone());
        assert_eq!(join_tokens(&tokens), "Ada's location is not in the kitchen.");

        let (_, tokens) = lex.phrase(frame.without_neg().with_mood(Mood::Question));
        assert_eq!(join_tokens(&tokens), "is Ada's location in the kitchen?");
    }

    #[test]
    fn unknown_predicate_falls_back() {
        let world = World::new();
        let schemas = SchemaSet::default();
        let lex = Lexicon::new(&world, &schemas);
        let frame = Frame::new("wave", Mood::Statement)
            .with(roles::AGENT, ArgValue::Text("someone".to_string()));
        let (_, tokens) = lex.phrase(frame);
        assert_eq!(tokens, vec!["wave", "someone", "."]);
    }

    #[test]
    fn list_surface_joins_with_and() {
        let world = WorldBuilder::new()
            .room("hall")
            .item("cup", &[("type", "cup")], "hall")
            .item("ball", &[("color", "red"), ("type", "ball")], "hall")
            .item("key", &[("type", "key")], "hall")
            .build()
            .unwrap();
        let schemas = SchemaSet::builtin().unwrap();
        let lex = Lexicon::new(&world, &schemas);
        let items: Vec<ArgValue> = world
            .collection("items")
            .iter()
            .map(|id| ArgValue::Entity(*id))
            .collect();
        assert_eq!(
            join_tokens(&lex.value_surface(&ArgValue::List(items))),
            "the cup, the red ball and the key"
        );
        assert_eq!(lex.value_surface(&ArgValue::List(vec![])), vec!["nothing"]);
        assert_eq!(lex.value_surface(&ArgValue::Entity(EntityId(99))), Vec::<String>::new());
    }
}
