/// Engine integration tests: whole dialogues against the household world.

use dialogue_engine::config::EngineConfig;
use dialogue_engine::core::dialogue::DialogueStatus;
use dialogue_engine::core::engine::{load_engine, DialogueEngine, MergePlan};
use dialogue_engine::core::evaluation::{self, EvalRequest};
use dialogue_engine::core::goal::{Goal, GoalKind};
use dialogue_engine::core::policy::{AutoPolicy, Policy, PolicyError, PolicyState, Response, Turn};
use dialogue_engine::core::responders;
use dialogue_engine::core::sentences;
use dialogue_engine::core::store::ContextLog;
use dialogue_engine::schema::entity::{EntityId, Value};
use dialogue_engine::schema::world::{World, WorldBuilder};
use std::collections::BTreeMap;
use std::path::Path;

fn household() -> World {
    World::load_from_ron(Path::new("data/household.ron")).unwrap()
}

fn engine_with(config: EngineConfig) -> DialogueEngine {
    DialogueEngine::builder()
        .with_config(config)
        .with_world(household())
        .build()
        .unwrap()
}

fn engine(seed: u64) -> DialogueEngine {
    engine_with(EngineConfig {
        seed,
        ..EngineConfig::default()
    })
}

fn lines(engine: &DialogueEngine) -> Vec<String> {
    engine
        .context()
        .resident()
        .iter()
        .map(|e| e.line.clone())
        .collect()
}

fn id(engine: &DialogueEngine, key: &str) -> EntityId {
    engine.world().by_var_name(key).unwrap()
}

#[test]
fn primary_comes_from_main_attribute() {
    let engine = engine(1);
    assert_eq!(engine.primary(), Some(id(&engine, "ada")));
}

#[test]
fn known_location_question_gets_one_correct_answer() {
    let mut engine = engine(7);
    let ada = id(&engine, "ada");
    let bob = id(&engine, "bob");
    let bedroom = id(&engine, "bedroom");
    let kitchen = id(&engine, "kitchen");
    engine.observe(sentences::located(ada, bedroom)).unwrap();

    let overrides: BTreeMap<String, Value> = [
        ("user", Value::Entity(bob)),
        ("agent", Value::Entity(ada)),
        ("item", Value::Entity(ada)),
        ("property_key", Value::from("location")),
        ("property_value", Value::Entity(kitchen)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let mut dialogue = engine
        .generate_dialogue(&overrides, Some("is_item_property"))
        .unwrap();
    let status = engine.run_dialogue(&mut dialogue).unwrap();
    assert_eq!(status, DialogueStatus::Succeeded);

    let spoken: Vec<String> = dialogue
        .produced
        .iter()
        .filter_map(|id| engine.context().get(*id))
        .filter(|e| e.utterance.speaker == Some(ada))
        .map(|e| e.utterance.text())
        .collect();
    assert_eq!(spoken, vec!["Ada says to Bob: Ada's location is not in the kitchen."]);
    assert_eq!(dialogue.steps, 2);
}

#[test]
fn same_seed_same_dialogues() {
    let mut a = engine(11);
    let mut b = engine(11);
    let first = a.run(8).unwrap();
    let second = b.run(8).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.total(), 8);
    assert_eq!(lines(&a), lines(&b));
    assert!(!lines(&a).is_empty());
}

#[test]
fn every_template_runs() {
    let mut engine = engine(3);
    let names = engine.templates().names();
    for name in names {
        let mut dialogue = engine.generate_dialogue(&BTreeMap::new(), Some(name)).unwrap();
        let status = engine.run_dialogue(&mut dialogue).unwrap();
        assert!(status.is_final(), "{name} ended as {status:?}");
        assert!(dialogue.steps >= 1);
        assert!(dialogue.steps <= dialogue.max_steps);
    }
}

#[test]
fn cursor_only_moves_forward() {
    let mut engine = engine(5);
    engine.run(2).unwrap();
    assert!(!engine.unseen().is_empty());
    engine.mark_seen();
    assert!(engine.unseen().is_empty());
    let seen = engine.cursor().position();

    engine.run(1).unwrap();
    let unseen = engine.unseen();
    assert!(!unseen.is_empty());
    assert!(unseen.iter().all(|e| e.id >= seen));

    engine.resume_from(dialogue_engine::core::context::ContextId(0));
    assert_eq!(engine.cursor().position(), seen);
}

#[test]
fn forgetful_evaluation_leaves_no_trace() {
    let mut evaluated = engine(21);
    let mut untouched = engine(21);
    evaluated.run(2).unwrap();
    untouched.run(2).unwrap();

    let primary = evaluated.primary().unwrap();
    let context_len = evaluated.context().len();
    let kb_len = evaluated.kb().len();
    let report = evaluation::evaluate(
        &mut evaluated,
        EvalRequest {
            dialogues: 12,
            policy: Box::new(responders::standard(primary)),
            agent_prob: 1.0,
            forgetful: true,
        },
    )
    .unwrap();
    assert!(report.total <= 12);
    assert_eq!(report.correct, report.total);
    assert_eq!(evaluated.context().len(), context_len);
    assert_eq!(evaluated.kb().len(), kb_len);

    // same rng, policies and world: the next dialogues match
    evaluated.run(3).unwrap();
    untouched.run(3).unwrap();
    assert_eq!(lines(&evaluated), lines(&untouched));
}

#[test]
fn evaluation_rejects_foreign_policy() {
    let mut engine = engine(2);
    let bob = id(&engine, "bob");
    let result = evaluation::evaluate(
        &mut engine,
        EvalRequest {
            dialogues: 1,
            policy: Box::new(responders::standard(bob)),
            agent_prob: 0.5,
            forgetful: true,
        },
    );
    assert!(result.is_err());
}

#[test]
fn flushing_does_not_change_dialogues() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("context.log");
    let mut flushing = engine_with(EngineConfig {
        seed: 13,
        flush_after: Some(6),
        flush_keep: 2,
        context_log: Some(log_path.clone()),
        ..EngineConfig::default()
    });
    let mut resident = engine(13);
    flushing.run(10).unwrap();
    resident.run(10).unwrap();

    let log = ContextLog::new(&log_path);
    let flushed = log.len().unwrap();
    assert!(flushed > 0);
    assert_eq!(flushing.context().flushed().0, flushed as u64);
    assert_eq!(flushing.context().len(), resident.context().len());

    let all = lines(&resident);
    let mut rebuilt = log.tail(flushed).unwrap();
    rebuilt.extend(lines(&flushing));
    assert_eq!(rebuilt, all);
    assert_eq!(log.tail(2).unwrap(), all[flushed - 2..flushed].to_vec());
}

#[test]
fn failed_generation_goes_to_error_log() {
    let dir = tempfile::tempdir().unwrap();
    let error_path = dir.path().join("errors").join("log.ron");
    let world = WorldBuilder::new()
        .room("hall")
        .player("ada", "Ada", "hall")
        .item("cup", &[("type", "cup")], "hall")
        .build()
        .unwrap();
    let mut engine = DialogueEngine::builder()
        .with_world(world)
        .with_config(EngineConfig {
            seed: 4,
            primary: Some("ada".to_string()),
            error_log: Some(error_path),
            ..EngineConfig::default()
        })
        .build()
        .unwrap();

    let summary = engine.run(2).unwrap();
    assert_eq!(summary.errors, 2);
    let entries = engine.error_log().unwrap().entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.seed == 4));
    assert!(entries[0].error.contains("user"));
}

#[test]
fn engine_loads_from_files() {
    let engine = load_engine(
        Path::new("tests/fixtures/config.ron"),
        Path::new("data/household.ron"),
    )
    .unwrap();
    assert_eq!(engine.config().seed, 8);
    assert_eq!(engine.config().max_steps, 6);
    assert!(engine.kb().is_exclusive("color"));
    assert_eq!(engine.primary(), Some(id(&engine, "ada")));
}

#[test]
fn merged_annex_becomes_reachable() {
    let mut engine = engine(17);
    let annex = World::load_from_ron(Path::new("tests/fixtures/annex.ron")).unwrap();
    let plan = MergePlan {
        unlock: vec!["gate".to_string()],
        connect: vec![("hall".to_string(), "garden".to_string())],
    };
    let before = engine.world().len();
    let report = engine.merge_world(annex, &plan).unwrap();
    assert_eq!(engine.world().len(), before + 4);

    let gate_line = engine.context().resident().last().unwrap();
    assert_eq!(gate_line.utterance.text(), "the gate is not locked.");

    // the incoming rake is a new item the generators can now pick
    let rake = engine
        .world()
        .collection("items")
        .iter()
        .copied()
        .find(|i| engine.world().describe(*i) == "the rake")
        .unwrap();
    assert!(report.mapping.values().any(|id| *id == rake));

    let ada = id(&engine, "ada");
    let shed = engine.world().location_of(rake).unwrap();
    let overrides: BTreeMap<String, Value> = [
        ("user", Value::Entity(id(&engine, "cy"))),
        ("agent", Value::Entity(ada)),
        ("room", Value::Entity(shed)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let mut dialogue = engine.generate_dialogue(&overrides, Some("go_location")).unwrap();
    assert_eq!(engine.run_dialogue(&mut dialogue).unwrap(), DialogueStatus::Succeeded);
    assert_eq!(engine.world().location_of(ada), Some(shed));
}

/// The rule-based agent, but it never states a goal.
struct Goalless(AutoPolicy);

impl Policy for Goalless {
    fn participant(&self) -> EntityId {
        self.0.participant()
    }

    fn try_match(&mut self, turn: &Turn<'_>) -> Option<Response> {
        self.0.try_match(turn).map(|r| Response {
            steps: r.steps,
            goal: None,
        })
    }

    fn get_goal(&self, _turn: &Turn<'_>) -> Option<Goal> {
        None
    }

    fn save_state(&self) -> Result<PolicyState, PolicyError> {
        self.0.save_state()
    }

    fn recover_state(&mut self, state: &PolicyState) -> Result<(), PolicyError> {
        self.0.recover_state(state)
    }
}

/// Answers every request with "X is purple" and a goal that accepts exactly
/// that.
struct Purple(EntityId);

impl Policy for Purple {
    fn participant(&self) -> EntityId {
        self.0
    }

    fn try_match(&mut self, turn: &Turn<'_>) -> Option<Response> {
        let opening = &turn.first()?.utterance;
        sentences::addressed_content(opening, self.0)?;
        if turn.dialogue.iter().any(|e| e.utterance.speaker == Some(self.0)) {
            return None;
        }
        let claim = sentences::say(
            &turn.lex,
            self.0,
            opening.speaker,
            sentences::attribute(self.0, "purple"),
        );
        let goal = Goal::new(
            GoalKind::MultipleCorrect {
                participant: self.0,
                accept: vec![claim.clone()],
                reject: Vec::new(),
            },
            turn.start,
        );
        Some(Response {
            steps: vec![claim],
            goal: Some(goal),
        })
    }

    fn get_goal(&self, _turn: &Turn<'_>) -> Option<Goal> {
        None
    }

    fn save_state(&self) -> Result<PolicyState, PolicyError> {
        PolicyState::encode(&())
    }

    fn recover_state(&mut self, _state: &PolicyState) -> Result<(), PolicyError> {
        Ok(())
    }
}

fn evaluate_with(engine: &mut DialogueEngine, policy: Box<dyn Policy>, agent_prob: f64, forgetful: bool) -> evaluation::EvalReport {
    evaluation::evaluate(
        engine,
        EvalRequest {
            dialogues: 20,
            policy,
            agent_prob,
            forgetful,
        },
    )
    .unwrap()
}

#[test]
fn substitute_is_scored_by_the_rule_based_goal() {
    let mut engine = engine(23);
    let primary = engine.primary().unwrap();
    let report = evaluate_with(
        &mut engine,
        Box::new(Goalless(responders::standard(primary))),
        1.0,
        true,
    );
    assert!(report.total > 0);
    assert_eq!(report.correct, report.total);
}

#[test]
fn substitute_cannot_grade_itself() {
    let mut engine = engine(23);
    let primary = engine.primary().unwrap();
    let report = evaluate_with(&mut engine, Box::new(Purple(primary)), 1.0, true);
    assert!(report.total > 0);
    assert_eq!(report.correct, 0);
}

#[test]
fn primary_never_answers_when_not_chosen_as_agent() {
    let mut engine = engine(29);
    let primary = engine.primary().unwrap();
    let report = evaluate_with(&mut engine, Box::new(responders::standard(primary)), 0.0, false);
    assert_eq!(report.total, 0);
    assert!(!engine.context().is_empty());
    assert!(engine
        .context()
        .resident()
        .iter()
        .all(|e| e.utterance.speaker != Some(primary)));
}

#[test]
fn primary_is_addressed_in_every_dialogue_when_always_agent() {
    let mut engine = engine(31);
    let primary = engine.primary().unwrap();
    evaluate_with(&mut engine, Box::new(responders::standard(primary)), 1.0, false);
    let mut others = 0;
    for entry in engine.context().resident() {
        match entry.utterance.speaker {
            Some(speaker) if speaker != primary => {
                others += 1;
                assert!(
                    sentences::addressed_content(&entry.utterance, primary).is_some(),
                    "not addressed to the primary: {}",
                    entry.utterance.text()
                );
            }
            _ => {}
        }
    }
    assert!(others > 0);
}

#[test]
fn chest_can_be_opened_on_request() {
    let mut engine = engine(37);
    let ada = id(&engine, "ada");
    let chest = id(&engine, "chest");
    let hall = id(&engine, "hall");
    engine.observe(sentences::located(chest, hall)).unwrap();

    let overrides: BTreeMap<String, Value> = [
        ("user", Value::Entity(id(&engine, "bob"))),
        ("agent", Value::Entity(ada)),
        ("openable", Value::Entity(chest)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let mut dialogue = engine.generate_dialogue(&overrides, Some("open_item")).unwrap();
    assert_eq!(engine.run_dialogue(&mut dialogue).unwrap(), DialogueStatus::Succeeded);
    assert_eq!(engine.world().location_of(ada), Some(hall));
    let opened = engine.world().get(chest).unwrap();
    assert!(opened.has_attribute("open"));
    assert!(!opened.has_attribute("closed"));
}
