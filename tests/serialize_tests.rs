/// Token lines written by the engine read back to the same utterances.

use dialogue_engine::config::EngineConfig;
use dialogue_engine::core::engine::{DialogueEngine, MergePlan};
use dialogue_engine::core::sentences;
use dialogue_engine::core::serialize;
use dialogue_engine::schema::frame::ArgValue;
use dialogue_engine::schema::world::World;
use std::path::Path;

fn engine() -> DialogueEngine {
    DialogueEngine::builder()
        .with_world(World::load_from_ron(Path::new("data/household.ron")).unwrap())
        .with_config(EngineConfig {
            seed: 99,
            ..EngineConfig::default()
        })
        .build()
        .unwrap()
}

#[test]
fn context_lines_round_trip() {
    let mut engine = engine();
    engine.run(15).unwrap();
    assert!(!engine.context().resident().is_empty());

    for entry in engine.context().resident() {
        let back = engine.read_line(&entry.line).unwrap();
        assert_eq!(back, entry.utterance, "line: {}", entry.line);
        assert_eq!(back.trusted, entry.utterance.trusted, "line: {}", entry.line);
        assert_eq!(back.text(), entry.utterance.text());
        let again = serialize::serialize_line(&back, engine.world()).unwrap();
        assert_eq!(again, entry.line);
    }
}

#[test]
fn lines_never_expose_ids_or_hidden_attributes() {
    let mut engine = engine();
    engine.run(15).unwrap();
    for entry in engine.context().resident() {
        assert!(!entry.line.contains('#'), "id leaked: {}", entry.line);
        assert!(
            !entry.line.split(' ').any(|t| t == "main"),
            "hidden attribute leaked: {}",
            entry.line
        );
        assert!(entry.line.starts_with("bsent"));
        assert!(entry.line.ends_with("esent"));
    }
}

#[test]
fn garbage_lines_are_rejected() {
    let engine = engine();
    assert!(engine.read_line("bsent bframe bpred fly epred").is_err());
    assert!(engine.read_line("bsent esent extra").is_err());
    assert!(engine
        .read_line("bsent bspeaker bentity Zed eentity espeaker esent")
        .is_err());
}

#[test]
fn bookkeeping_keys_stay_out_of_the_context() {
    let mut engine = engine();
    let ada = engine.world().by_var_name("ada").unwrap();
    let before = engine.context().len();
    let leak = sentences::be(ada, "var_name", ArgValue::Text("ada".to_string()));
    assert!(engine.observe(leak).is_err());
    assert_eq!(engine.context().len(), before);
}

#[test]
fn ambiguous_descriptions_are_not_written() {
    let mut engine = engine();
    let twin = World::parse_ron(
        r#"(entities: [(key: "kitchen2", properties: {"type": "kitchen"}, collections: ["rooms"])])"#,
    )
    .unwrap();
    let report = engine.merge_world(twin, &MergePlan::default()).unwrap();
    let ada = engine.world().by_var_name("ada").unwrap();
    let second = report.mapping.values().copied().next().unwrap();
    let before = engine.context().len();
    assert!(engine.observe(sentences::located(ada, second)).is_err());
    assert_eq!(engine.context().len(), before);

    // every line that did make it in still reads back
    engine.run(10).unwrap();
    for entry in engine.context().resident() {
        assert_eq!(engine.read_line(&entry.line).unwrap(), entry.utterance);
    }
}
