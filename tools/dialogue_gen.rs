/// dialogue_gen: generate dialogue corpora or score the rule-based agent.
///
/// Usage:
///   dialogue_gen --world data/household.ron generate -n 100 --print
///   dialogue_gen --world data/household.ron --config data/engine.ron evaluate -n 200

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use dialogue_engine::core::engine::{DialogueEngine, EngineError};
use dialogue_engine::core::evaluation::{self, EvalRequest};
use dialogue_engine::core::responders;

#[derive(Parser)]
#[command(name = "dialogue_gen", version, about = "Simulated dialogues in a textual world")]
struct Cli {
    /// World description (RON).
    #[arg(long)]
    world: PathBuf,

    /// Engine configuration (RON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra predicate schemas (RON).
    #[arg(long)]
    schemas: Option<PathBuf>,

    /// Overrides the configured seed.
    #[arg(long)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run dialogues and keep them in the context.
    Generate {
        #[arg(short = 'n', long, default_value = "10")]
        dialogues: usize,

        /// Only use this template.
        #[arg(long)]
        template: Option<String>,

        /// Print each dialogue's lines as it finishes.
        #[arg(long)]
        print: bool,

        /// Print surface text instead of token lines.
        #[arg(long)]
        text: bool,
    },

    /// Score the rule-based policy in place of the primary participant.
    Evaluate {
        #[arg(short = 'n', long, default_value = "100")]
        dialogues: usize,

        /// Chance the primary participant is the agent. Falls back to the config.
        #[arg(long)]
        agent_prob: Option<f64>,

        /// Keep what the evaluation dialogues produced.
        #[arg(long)]
        keep: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), EngineError> {
    let mut builder = DialogueEngine::builder().world_file(&cli.world);
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(path) = &cli.schemas {
        builder = builder.schemas_file(path);
    }
    if let Some(seed) = cli.seed {
        builder = builder.seed(seed);
    }
    let mut engine = builder.build()?;

    match cli.command {
        Commands::Generate {
            dialogues,
            template,
            print,
            text,
        } => generate(&mut engine, dialogues, template.as_deref(), print, text),
        Commands::Evaluate {
            dialogues,
            agent_prob,
            keep,
        } => {
            let primary = engine.primary().ok_or(EngineError::NoPrimary)?;
            let request = EvalRequest {
                dialogues,
                policy: Box::new(responders::standard(primary)),
                agent_prob: agent_prob.unwrap_or(engine.config().agent_prob),
                forgetful: !keep,
            };
            let report = evaluation::evaluate(&mut engine, request)?;
            for (template, score) in &report.per_template {
                println!(
                    "{template:<24} {:>4}/{:<4} {:.3}",
                    score.correct,
                    score.total,
                    score.accuracy()
                );
            }
            println!(
                "{:<24} {:>4}/{:<4} {:.3}  ({} errors)",
                "overall",
                report.correct,
                report.total,
                report.accuracy(),
                report.errors
            );
            Ok(())
        }
    }
}

fn generate(
    engine: &mut DialogueEngine,
    dialogues: usize,
    template: Option<&str>,
    print: bool,
    text: bool,
) -> Result<(), EngineError> {
    if template.is_none() && !print {
        let summary = engine.run(dialogues)?;
        println!(
            "{} dialogues: {} succeeded, {} in progress, {} failed, {} errors",
            summary.total(),
            summary.succeeded,
            summary.in_progress,
            summary.failed,
            summary.errors
        );
        return Ok(());
    }

    for _ in 0..dialogues {
        let mut dialogue = engine.generate_dialogue(&BTreeMap::new(), template)?;
        let status = engine.run_dialogue(&mut dialogue)?;
        if !print {
            continue;
        }
        println!("# {} [{}] {:?}", dialogue.id, dialogue.template, status);
        for (id, line) in dialogue.produced.iter().zip(&dialogue.lines) {
            match engine.context().get(*id) {
                Some(entry) if text => println!("{}", entry.utterance.text()),
                _ => println!("{line}"),
            }
        }
        println!();
    }
    engine.flush()?;
    Ok(())
}
