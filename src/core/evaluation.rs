/// Batch evaluation of a substitute policy for the primary participant.

use rand::Rng;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::ConfigError;
use crate::core::dialogue::DialogueStatus;
use crate::core::engine::{DialogueEngine, EngineError};
use crate::core::policy::Policy;
use crate::schema::entity::{EntityId, Value};

pub struct EvalRequest {
    pub dialogues: usize,
    /// Plays the primary participant's agent role.
    pub policy: Box<dyn Policy>,
    /// Chance the primary participant is the agent of a dialogue.
    pub agent_prob: f64,
    /// Leave the engine exactly as it was found.
    pub forgetful: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemplateScore {
    pub correct: usize,
    pub total: usize,
}

impl TemplateScore {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    pub per_template: BTreeMap<String, TemplateScore>,
    pub correct: usize,
    pub total: usize,
    pub errors: usize,
}

impl EvalReport {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn score(&mut self, template: &str, correct: bool) {
        let entry = self.per_template.entry(template.to_string()).or_default();
        entry.total += 1;
        self.total += 1;
        if correct {
            entry.correct += 1;
            self.correct += 1;
        }
    }
}

/// Run `request.dialogues` dialogues. Whenever the primary participant is
/// the agent and the rule-based run succeeds, the same dialogue is replayed
/// with the substitute policy under the same step ceiling and scored against
/// the rule-based goal. Otherwise the primary participant is kept out of the
/// agent role.
pub fn evaluate(engine: &mut DialogueEngine, request: EvalRequest) -> Result<EvalReport, EngineError> {
    let primary = engine.primary().ok_or(EngineError::NoPrimary)?;
    if request.policy.participant() != primary {
        return Err(EngineError::NoPolicy(primary));
    }
    if !(0.0..=1.0).contains(&request.agent_prob) {
        return Err(ConfigError::Invalid(format!("agent_prob {} is outside [0, 1]", request.agent_prob)).into());
    }
    let batch = if request.forgetful {
        Some(engine.snapshot()?)
    } else {
        None
    };
    engine.suppress_flush(true);
    let outcome = run_batch(engine, primary, request.dialogues, request.agent_prob, request.policy);
    engine.suppress_flush(false);
    if let Some(batch) = &batch {
        engine.restore(batch)?;
    }
    let report = outcome?;

    info!(
        dialogues = request.dialogues,
        scored = report.total,
        correct = report.correct,
        errors = report.errors,
        forgetful = request.forgetful,
        "evaluation finished"
    );
    Ok(report)
}

fn run_batch(
    engine: &mut DialogueEngine,
    primary: EntityId,
    dialogues: usize,
    agent_prob: f64,
    mut substitute: Box<dyn Policy>,
) -> Result<EvalReport, EngineError> {
    let mut report = EvalReport::default();
    for _ in 0..dialogues {
        let as_agent = engine.rng_mut().gen_bool(agent_prob);
        let mut overrides = BTreeMap::new();
        let mut excluded = Vec::new();
        if as_agent {
            overrides.insert("agent".to_string(), Value::Entity(primary));
        } else {
            excluded.push(primary);
        }

        let dialogue = match engine.generate_dialogue_excluding(&overrides, None, &excluded) {
            Ok(d) => d,
            Err(e) => {
                engine.record_failure(None, &e)?;
                report.errors += 1;
                continue;
            }
        };
        let start = engine.snapshot()?;

        let mut reference = dialogue.clone();
        if let Err(e) = engine.run_dialogue(&mut reference) {
            let e = EngineError::RuntimeDialogue {
                dialogue: reference.id,
                source: Box::new(e),
            };
            engine.record_failure(Some(&reference), &e)?;
            report.errors += 1;
            continue;
        }
        if !as_agent || reference.status != DialogueStatus::Succeeded {
            continue;
        }

        engine.restore(&start)?;
        // the substitute is judged by the rule-based goal, never its own
        let mut attempt = dialogue;
        attempt.max_steps = reference.steps;
        attempt.goal = reference.goal.clone();
        let rule_based = engine
            .replace_policy(substitute)
            .ok_or(EngineError::NoPolicy(primary))?;
        let outcome = engine.run_dialogue(&mut attempt);
        substitute = engine
            .replace_policy(rule_based)
            .ok_or(EngineError::NoPolicy(primary))?;

        match outcome {
            Ok(status) => report.score(&attempt.template, status == DialogueStatus::Succeeded),
            Err(e) => {
                let e = EngineError::RuntimeDialogue {
                    dialogue: attempt.id,
                    source: Box::new(e),
                };
                engine.record_failure(Some(&attempt), &e)?;
                report.errors += 1;
            }
        }
    }

    Ok(report)
}
