/// The dialogue engine: template → dialogue → turn loop orchestration.
///
/// Owns the world, the shared context, the knowledge base and every
/// participant's policy, and lends them to policies one turn at a time.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::core::context::{Context, ContextCursor, ContextError, ContextId, Entry};
use crate::core::dialogue::{Dialogue, DialogueStatus};
use crate::core::environment::Environment;
use crate::core::goal::GoalStatus;
use crate::core::knowledge::{KbSnapshot, KnowledgeBase, KnowledgeError};
use crate::core::phrasing::{Lexicon, PhrasingError, SchemaSet};
use crate::core::policy::{Policy, PolicyError, PolicyState, RequestPolicy, Response, Turn};
use crate::core::responders;
use crate::core::sentences;
use crate::core::serialize::{self, DeserializationError, SerializationError};
use crate::core::store::{ContextLog, ErrorEntry, ErrorLog, StoreError};
use crate::core::template::{ResolutionContext, TemplateError, TemplateRegistry};
use crate::schema::entity::{EntityId, Value};
use crate::schema::frame::Frame;
use crate::schema::relationship::Relationship;
use crate::schema::utterance::Utterance;
use crate::schema::world::{MergeReport, World, WorldError, LOCKED};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),
    #[error("deserialization error: {0}")]
    Deserialization(#[from] DeserializationError),
    #[error("phrasing error: {0}")]
    Phrasing(#[from] PhrasingError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("world error: {0}")]
    World(#[from] WorldError),
    #[error("context error: {0}")]
    Context(#[from] ContextError),
    #[error("knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("dialogue {dialogue} failed: {source}")]
    RuntimeDialogue {
        dialogue: u64,
        source: Box<EngineError>,
    },
    #[error("no world supplied")]
    NoWorld,
    #[error("no primary participant configured")]
    NoPrimary,
    #[error("no policy for participant {0}")]
    NoPolicy(EntityId),
}

/// Outcome counts for a batch of dialogues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub in_progress: usize,
    pub failed: usize,
    /// Dialogues aborted by an error; see the error log.
    pub errors: usize,
}

impl RunSummary {
    fn count(&mut self, status: DialogueStatus) {
        match status {
            DialogueStatus::Succeeded => self.succeeded += 1,
            DialogueStatus::Failed => self.failed += 1,
            DialogueStatus::InProgress | DialogueStatus::Created | DialogueStatus::Running => {
                self.in_progress += 1
            }
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.in_progress + self.failed + self.errors
    }
}

/// Everything needed to put the engine back where it was.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    context_len: u64,
    kb: KbSnapshot,
    world: World,
    users: BTreeMap<EntityId, PolicyState>,
    agents: BTreeMap<EntityId, PolicyState>,
    rng: StdRng,
    dialogues: u64,
}

/// Doors to open and passages to add after a world merge, by `var_name`.
/// Keys are looked up in the incoming world first.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub unlock: Vec<String>,
    pub connect: Vec<(String, String)>,
}

/// The top-level dialogue engine. Built via `DialogueEngine::builder()`.
pub struct DialogueEngine {
    world: World,
    schemas: SchemaSet,
    context: Context,
    cursor: ContextCursor,
    kb: KnowledgeBase,
    users: BTreeMap<EntityId, RequestPolicy>,
    agents: BTreeMap<EntityId, Box<dyn Policy>>,
    environment: Environment,
    templates: TemplateRegistry,
    rng: StdRng,
    config: EngineConfig,
    primary: Option<EntityId>,
    context_log: Option<ContextLog>,
    error_log: Option<ErrorLog>,
    dialogues: u64,
    suppress_flush: bool,
}

/// Builder for constructing a `DialogueEngine`.
#[derive(Default)]
pub struct DialogueEngineBuilder {
    config_path: Option<PathBuf>,
    world_path: Option<PathBuf>,
    schemas_path: Option<PathBuf>,
    seed: Option<u64>,
    /// Directly provided config (for testing without files).
    config: Option<EngineConfig>,
    /// Directly provided world (for testing without files).
    world: Option<World>,
    /// Extra predicate schemas layered over the built-in ones.
    schemas: Option<SchemaSet>,
    templates: Option<TemplateRegistry>,
    environment: Option<Environment>,
}

impl DialogueEngineBuilder {
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn world_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.world_path = Some(path.into());
        self
    }

    pub fn schemas_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schemas_path = Some(path.into());
        self
    }

    /// Overrides the configured seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_world(mut self, world: World) -> Self {
        self.world = Some(world);
        self
    }

    pub fn with_schemas(mut self, schemas: SchemaSet) -> Self {
        self.schemas = Some(schemas);
        self
    }

    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn build(self) -> Result<DialogueEngine, EngineError> {
        let mut config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(path)?,
            (None, None) => EngineConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;

        let world = match (self.world, &self.world_path) {
            (Some(world), _) => world,
            (None, Some(path)) => World::load_from_ron(path)?,
            (None, None) => return Err(EngineError::NoWorld),
        };

        // File schemas override built-in ones, direct ones override both
        let mut schemas = SchemaSet::builtin()?;
        if let Some(path) = &self.schemas_path {
            schemas.merge(SchemaSet::load_from_ron(path)?);
        }
        if let Some(extra) = self.schemas {
            schemas.merge(extra);
        }

        let primary = match &config.primary {
            Some(key) => Some(
                world
                    .by_var_name(key)
                    .ok_or_else(|| WorldError::UnknownKey(key.clone()))?,
            ),
            None => world
                .entities()
                .find(|e| e.has_attribute("main"))
                .map(|e| e.id),
        };

        Ok(DialogueEngine {
            kb: KnowledgeBase::new(&config.exclusive_keys),
            rng: StdRng::seed_from_u64(config.seed),
            context_log: config.context_log.clone().map(ContextLog::new),
            error_log: config.error_log.clone().map(ErrorLog::new),
            world,
            schemas,
            context: Context::new(),
            cursor: ContextCursor::default(),
            users: BTreeMap::new(),
            agents: BTreeMap::new(),
            environment: self.environment.unwrap_or_default(),
            templates: self.templates.unwrap_or_else(TemplateRegistry::builtin),
            primary,
            config,
            dialogues: 0,
            suppress_flush: false,
        })
    }
}

impl DialogueEngine {
    pub fn builder() -> DialogueEngineBuilder {
        DialogueEngineBuilder::default()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn kb(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn primary(&self) -> Option<EntityId> {
        self.primary
    }

    pub fn context_log(&self) -> Option<&ContextLog> {
        self.context_log.as_ref()
    }

    pub fn error_log(&self) -> Option<&ErrorLog> {
        self.error_log.as_ref()
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Hold automatic flushes, e.g. while a batch snapshot must stay valid.
    pub fn suppress_flush(&mut self, suppress: bool) {
        self.suppress_flush = suppress;
    }

    /// Install `policy` for its participant, returning the one it replaces.
    pub fn replace_policy(&mut self, policy: Box<dyn Policy>) -> Option<Box<dyn Policy>> {
        self.agents.insert(policy.participant(), policy)
    }

    /// Pick a template, resolve its parameters and bind the participants'
    /// policies. `overrides` pins parameters by name.
    pub fn generate_dialogue(
        &mut self,
        overrides: &BTreeMap<String, Value>,
        template: Option<&str>,
    ) -> Result<Dialogue, EngineError> {
        self.generate_dialogue_excluding(overrides, template, &[])
    }

    /// Like `generate_dialogue`, but `excluded` players are never picked as
    /// the agent unless an override names them.
    pub fn generate_dialogue_excluding(
        &mut self,
        overrides: &BTreeMap<String, Value>,
        template: Option<&str>,
        excluded: &[EntityId],
    ) -> Result<Dialogue, EngineError> {
        let mut ctx =
            ResolutionContext::new(overrides.clone(), self.primary).excluding_agents(excluded);
        let episode = self
            .templates
            .generate(template, &mut ctx, &self.world, &mut self.rng)?;

        self.users
            .entry(episode.user)
            .or_insert_with(|| RequestPolicy::new(episode.user))
            .bind(episode.agent, episode.request.clone());
        self.agents
            .entry(episode.agent)
            .or_insert_with(|| Box::new(responders::standard(episode.agent)));

        let id = self.dialogues;
        self.dialogues += 1;
        debug!(
            dialogue = id,
            template = %episode.template,
            user = %episode.user,
            agent = %episode.agent,
            "dialogue generated"
        );
        Ok(Dialogue::new(
            id,
            &episode.template,
            vec![episode.user, episode.agent],
            episode.agent,
            self.context.next_id(),
            self.config.max_steps,
        ))
    }

    /// Run the turn loop until the goal is decided, nobody acts, or the
    /// step ceiling is reached.
    pub fn run_dialogue(&mut self, dialogue: &mut Dialogue) -> Result<DialogueStatus, EngineError> {
        dialogue.status = DialogueStatus::Running;
        let order = dialogue.participants.clone();
        let mut idle = 0;
        let mut turn = 0;

        while !order.is_empty() && dialogue.budget_left() && !dialogue.status.is_final() {
            let participant = order[turn % order.len()];
            turn += 1;

            let response = self.act(participant, dialogue);
            debug!(
                dialogue = dialogue.id,
                participant = %participant,
                steps = response.steps.len(),
                "turn"
            );
            if participant == dialogue.goal_owner {
                dialogue.adopt_goal(response.goal);
            }
            if response.steps.is_empty() {
                idle += 1;
                if idle >= order.len() {
                    break;
                }
                continue;
            }
            idle = 0;

            for step in response.steps {
                if !dialogue.budget_left() {
                    break;
                }
                self.integrate(step, dialogue)?;
                dialogue.steps += 1;
                if dialogue.check_goal(&self.context) != GoalStatus::Pending {
                    break;
                }
            }
        }

        let status = dialogue.finish();
        if status == DialogueStatus::Failed {
            warn!(dialogue = dialogue.id, template = %dialogue.template, "goal contradicted");
        }
        debug!(dialogue = dialogue.id, ?status, steps = dialogue.steps, "dialogue finished");
        Ok(status)
    }

    fn act(&mut self, participant: EntityId, dialogue: &Dialogue) -> Response {
        let turn = Turn {
            lex: Lexicon::new(&self.world, &self.schemas),
            kb: &self.kb,
            dialogue: self.context.since(dialogue.start),
            start: dialogue.start,
            reward_ground_truth: self.config.reward_ground_truth,
        };
        if dialogue.user() == Some(participant) {
            return match self.users.get_mut(&participant) {
                Some(policy) => policy.execute(&turn),
                None => Response::default(),
            };
        }
        match self.agents.get_mut(&participant) {
            Some(policy) => policy.execute(&turn),
            None => Response::default(),
        }
    }

    /// Apply one step: environment effects, then the step and its
    /// observations go to the context and the knowledge base.
    fn integrate(&mut self, step: Utterance, dialogue: &mut Dialogue) -> Result<(), EngineError> {
        let observations = self
            .environment
            .apply(&step, &mut self.world, &self.schemas)?;
        for utterance in std::iter::once(step).chain(observations) {
            let line = serialize::serialize_line(&utterance, &self.world)?;
            let id = self.context.append(utterance, line.clone());
            dialogue.record(id, line);
        }
        self.kb.sync(&self.context, &self.world);
        Ok(())
    }

    /// Generate and run `n` dialogues. A dialogue that errors is logged
    /// and the batch moves on.
    pub fn run(&mut self, n: usize) -> Result<RunSummary, EngineError> {
        let mut summary = RunSummary::default();
        for _ in 0..n {
            let mut dialogue = match self.generate_dialogue(&BTreeMap::new(), None) {
                Ok(d) => d,
                Err(e) => {
                    self.record_failure(None, &e)?;
                    summary.errors += 1;
                    continue;
                }
            };
            match self.run_dialogue(&mut dialogue) {
                Ok(status) => summary.count(status),
                Err(e) => {
                    let e = EngineError::RuntimeDialogue {
                        dialogue: dialogue.id,
                        source: Box::new(e),
                    };
                    self.record_failure(Some(&dialogue), &e)?;
                    summary.errors += 1;
                }
            }
            self.maybe_flush()?;
        }
        info!(
            dialogues = n,
            succeeded = summary.succeeded,
            in_progress = summary.in_progress,
            failed = summary.failed,
            errors = summary.errors,
            "batch finished"
        );
        Ok(summary)
    }

    pub(crate) fn record_failure(
        &self,
        dialogue: Option<&Dialogue>,
        error: &EngineError,
    ) -> Result<(), EngineError> {
        let entry = match dialogue {
            Some(d) => ErrorEntry {
                dialogue: d.id,
                template: d.template.clone(),
                seed: self.config.seed,
                error: error.to_string(),
                lines: d.lines.clone(),
            },
            None => ErrorEntry {
                dialogue: self.dialogues,
                template: String::new(),
                seed: self.config.seed,
                error: error.to_string(),
                lines: Vec::new(),
            },
        };
        error!(dialogue = entry.dialogue, template = %entry.template, error = %entry.error, "dialogue error");
        if let Some(log) = &self.error_log {
            log.append(&entry)?;
        }
        Ok(())
    }

    /// Append a trusted environment report about `frame`.
    pub fn observe(&mut self, frame: Frame) -> Result<ContextId, EngineError> {
        let utterance = sentences::observe(&Lexicon::new(&self.world, &self.schemas), frame);
        let line = serialize::serialize_line(&utterance, &self.world)?;
        let id = self.context.append(utterance, line);
        self.kb.sync(&self.context, &self.world);
        Ok(id)
    }

    /// Parse a context line back into an utterance.
    pub fn read_line(&self, line: &str) -> Result<Utterance, EngineError> {
        Ok(serialize::deserialize_line(line, &self.world, &self.schemas)?)
    }

    /// Evict resident context to the log, keeping `flush_keep` entries.
    /// Knowledge is kept; undo history is not.
    pub fn flush(&mut self) -> Result<usize, EngineError> {
        self.kb.sync(&self.context, &self.world);
        let lines = self.context.flush(self.config.flush_keep);
        if let Some(log) = &self.context_log {
            log.append_lines(&lines)?;
        }
        self.kb.flush_journal();
        info!(
            flushed = lines.len(),
            resident = self.context.resident().len(),
            next_id = self.context.next_id().0,
            "context flushed"
        );
        Ok(lines.len())
    }

    fn maybe_flush(&mut self) -> Result<(), EngineError> {
        if self.suppress_flush {
            return Ok(());
        }
        match self.config.flush_after {
            Some(after) if self.context.resident().len() >= after => {
                self.flush()?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        let users = self
            .users
            .iter()
            .map(|(id, p)| p.save_state().map(|s| (*id, s)))
            .collect::<Result<_, _>>()?;
        let agents = self
            .agents
            .iter()
            .map(|(id, p)| p.save_state().map(|s| (*id, s)))
            .collect::<Result<_, _>>()?;
        Ok(EngineSnapshot {
            context_len: self.context.len(),
            kb: self.kb.snapshot(),
            world: self.world.clone(),
            users,
            agents,
            rng: self.rng.clone(),
            dialogues: self.dialogues,
        })
    }

    /// Roll back to `snapshot`. Fails if part of the range was flushed since.
    /// Policies created after the snapshot are dropped. The cursor is left
    /// alone: it never moves backwards.
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> Result<(), EngineError> {
        self.context.truncate_to(snapshot.context_len)?;
        self.kb.restore(&snapshot.kb)?;
        self.world = snapshot.world.clone();

        self.users.retain(|id, _| snapshot.users.contains_key(id));
        for (id, state) in &snapshot.users {
            if let Some(policy) = self.users.get_mut(id) {
                policy.recover_state(state)?;
            }
        }
        self.agents.retain(|id, _| snapshot.agents.contains_key(id));
        for (id, state) in &snapshot.agents {
            if let Some(policy) = self.agents.get_mut(id) {
                policy.recover_state(state)?;
            }
        }

        self.rng = snapshot.rng.clone();
        self.dialogues = snapshot.dialogues;
        Ok(())
    }

    /// Add another world. Existing ids stay valid; unlocked doors are
    /// reported to the context as trusted observations.
    pub fn merge_world(&mut self, other: World, plan: &MergePlan) -> Result<MergeReport, EngineError> {
        let unlock: Vec<(&str, Option<EntityId>)> = plan
            .unlock
            .iter()
            .map(|k| (k.as_str(), other.by_var_name(k)))
            .collect();
        let connect: Vec<((&str, Option<EntityId>), (&str, Option<EntityId>))> = plan
            .connect
            .iter()
            .map(|(a, b)| {
                (
                    (a.as_str(), other.by_var_name(a)),
                    (b.as_str(), other.by_var_name(b)),
                )
            })
            .collect();

        let report = self.world.merge(other);
        let find = |world: &World, (key, incoming): (&str, Option<EntityId>)| {
            incoming
                .and_then(|id| report.mapping.get(&id).copied())
                .or_else(|| world.by_var_name(key))
                .ok_or_else(|| WorldError::UnknownKey(key.to_string()))
        };

        for (a, b) in connect {
            let from = find(&self.world, a)?;
            let to = find(&self.world, b)?;
            self.world.connect(Relationship::passage(from, to));
        }
        let mut opened = Vec::new();
        for door in unlock {
            let door = find(&self.world, door)?;
            if self.world.unlock(door)? {
                opened.push(door);
            }
        }
        for door in &opened {
            self.observe(sentences::attribute(*door, LOCKED).negated())?;
        }
        info!(
            entities = report.mapping.len(),
            connectors = report.connectors_added + plan.connect.len(),
            unlocked = opened.len(),
            "world merged"
        );
        Ok(report)
    }

    /// Context entries the cursor has not passed yet.
    pub fn unseen(&self) -> &[Entry] {
        self.cursor.unseen(&self.context)
    }

    pub fn mark_seen(&mut self) {
        self.cursor.mark_seen(&self.context);
    }

    /// Move the cursor forward to `id`. Never moves it back.
    pub fn resume_from(&mut self, id: ContextId) {
        self.cursor.resume_from(id);
    }

    pub fn cursor(&self) -> ContextCursor {
        self.cursor
    }
}

/// Convenience: load every part of an engine from files.
pub fn load_engine(config: &Path, world: &Path) -> Result<DialogueEngine, EngineError> {
    DialogueEngine::builder()
        .config_file(config)
        .world_file(world)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::knowledge::Truth;
    use crate::schema::frame::Mood;
    use crate::schema::world::WorldBuilder;

    fn world() -> World {
        WorldBuilder::new()
            .room("kitchen")
            .room("bedroom")
            .player("ada", "Ada", "bedroom")
            .player("bob", "Bob", "bedroom")
            .item("cup", &[("color", "blue"), ("type", "cup")], "kitchen")
            .passage("kitchen", "bedroom")
            .build()
            .unwrap()
    }

    fn engine() -> DialogueEngine {
        DialogueEngine::builder()
            .with_world(world())
            .seed(42)
            .build()
            .unwrap()
    }

    fn pin(pairs: &[(&str, EntityId)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Entity(*v)))
            .collect()
    }

    #[test]
    fn build_requires_world() {
        assert!(matches!(
            DialogueEngine::builder().build(),
            Err(EngineError::NoWorld)
        ));
    }

    #[test]
    fn go_location_moves_agent_and_succeeds() {
        let mut engine = engine();
        let ada = engine.world().by_var_name("ada").unwrap();
        let bob = engine.world().by_var_name("bob").unwrap();
        let kitchen = engine.world().by_var_name("kitchen").unwrap();
        let mut dialogue = engine
            .generate_dialogue(
                &pin(&[("user", bob), ("agent", ada), ("room", kitchen)]),
                Some("go_location"),
            )
            .unwrap();
        let status = engine.run_dialogue(&mut dialogue).unwrap();
        assert_eq!(status, DialogueStatus::Succeeded);
        assert_eq!(engine.world().location_of(ada), Some(kitchen));
        assert_eq!(
            engine.kb().check(&sentences::located(ada, kitchen), engine.world()),
            Truth::True
        );
        // request, the move, the report
        assert_eq!(dialogue.steps, 3);
    }

    #[test]
    fn snapshot_restore_rewinds_everything() {
        let mut engine = engine();
        let before = engine.snapshot().unwrap();
        let summary = engine.run(3).unwrap();
        assert_eq!(summary.total(), 3);
        assert!(engine.context().len() > 0);

        engine.restore(&before).unwrap();
        assert_eq!(engine.context().len(), 0);
        assert!(engine.kb().is_empty());
        let again = engine.snapshot().unwrap();
        assert_eq!(again.users, before.users);
        assert_eq!(again.agents, before.agents);
    }

    #[test]
    fn merge_unlocks_and_reports() {
        let mut engine = engine();
        let other = WorldBuilder::new()
            .room("garden")
            .room("shed")
            .door("gate", "garden", "shed", true)
            .build()
            .unwrap();
        let plan = MergePlan {
            unlock: vec!["gate".to_string()],
            connect: vec![("garden".to_string(), "kitchen".to_string())],
        };
        let existing: Vec<EntityId> = engine.world().entities().map(|e| e.id).collect();
        let report = engine.merge_world(other, &plan).unwrap();
        assert_eq!(report.mapping.len(), 3);
        assert!(report.mapping.values().all(|id| !existing.contains(id)));

        let ada = engine.world().by_var_name("ada").unwrap();
        let bedroom = engine.world().by_var_name("bedroom").unwrap();
        let shed = report.mapping.values().copied().find(|id| {
            engine.world().get(*id).and_then(|e| e.property("type")).and_then(Value::as_text) == Some("shed")
        });
        let shed = shed.unwrap();
        assert!(engine.world().path(bedroom, shed).is_some());
        assert_eq!(engine.world().location_of(ada), Some(bedroom));

        let last = engine.context().resident().last().unwrap();
        assert_eq!(last.utterance.text(), "the door is not locked.");
        assert!(last.utterance.trusted);
    }

    #[test]
    fn flush_keeps_answers() {
        let mut engine = engine();
        let ada = engine.world().by_var_name("ada").unwrap();
        let bedroom = engine.world().by_var_name("bedroom").unwrap();
        engine.observe(sentences::located(ada, bedroom)).unwrap();
        let question = sentences::located(ada, bedroom).with_mood(Mood::Statement);
        let before = engine.kb().check(&question, engine.world());
        engine.flush().unwrap();
        assert_eq!(engine.context().resident().len(), 0);
        assert_eq!(engine.kb().check(&question, engine.world()), before);
        assert_eq!(before, Truth::True);
    }

    #[test]
    fn lines_read_back() {
        let mut engine = engine();
        let ada = engine.world().by_var_name("ada").unwrap();
        let bedroom = engine.world().by_var_name("bedroom").unwrap();
        engine.observe(sentences::located(ada, bedroom)).unwrap();
        let entry = &engine.context().resident()[0];
        let back = engine.read_line(&entry.line).unwrap();
        assert_eq!(back.frames, entry.utterance.frames);
        assert_eq!(back.text(), "Ada's location is in the bedroom.");
    }
}
