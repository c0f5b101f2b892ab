use super::entity::EntityId;
use super::frame::{Frame, Mood};

/// Optional transformations attached by whoever built the utterance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hooks {
    /// Statement form → the request asking about it.
    pub request_form: Option<fn(&Frame) -> Frame>,
    /// Frame → the canonical frame a responder compares against.
    pub canonical: Option<fn(&Frame) -> Frame>,
}

/// One line of dialogue: surface tokens plus the frames they express.
#[derive(Debug, Clone, Default)]
pub struct Utterance {
    pub tokens: Vec<String>,
    pub frames: Vec<Frame>,
    pub speaker: Option<EntityId>,
    /// Observations from the environment; only these feed the knowledge base.
    pub trusted: bool,
    pub hooks: Hooks,
}

impl PartialEq for Utterance {
    fn eq(&self, other: &Self) -> bool {
        self.speaker == other.speaker && self.frames == other.frames
    }
}

impl Eq for Utterance {}

impl Utterance {
    /// Request form of the first frame, when a hook is attached.
    pub fn request_form(&self) -> Option<Frame> {
        let hook = self.hooks.request_form?;
        self.frames.first().map(hook)
    }

    /// Canonical form of a frame using this utterance's hook, or the frame itself.
    pub fn canonical(&self, frame: &Frame) -> Frame {
        match self.hooks.canonical {
            Some(hook) => hook(frame),
            None => frame.clone(),
        }
    }

    /// Surface tokens joined into display text.
    pub fn text(&self) -> String {
        join_tokens(&self.tokens)
    }
}

/// Default request form: the statement asked as a question, positively.
pub fn ask_about(frame: &Frame) -> Frame {
    frame.without_neg().with_mood(Mood::Question)
}

/// Join surface tokens, attaching clitics and punctuation to the previous word.
pub fn join_tokens(tokens: &[String]) -> String {
    let mut out = String::new();
    for token in tokens {
        let attach = matches!(token.as_str(), "'s" | "," | "." | "?" | "!" | ":");
        if !out.is_empty() && !attach {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}
