//! # arena CLI Entry Point
//!
//! Loads a strategy set, wires a translator, runs the tournament and prints
//! the report.

mod command_translator;
mod input;
mod logger;
mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use arena_core::{
    InterpreterConfig, KeywordTranslator, StrategyBase, StrategyInterpreter, StrategySpec, TournamentConfig,
    TournamentEngine, Translator,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use crate::command_translator::CommandTranslator;

/// Iterated Prisoner's Dilemma tournaments between strategies written in
/// plain text.
#[derive(Parser, Debug)]
#[command(name = "arena", version, about)]
struct Cli {
    /// More logging (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log to a timestamped file in the working directory instead of stderr.
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a round-robin tournament from a JSON file.
    Run(RunArgs),
    /// Show how one strategy text is interpreted.
    Interpret(InterpretArgs),
    /// List built-in templates.
    Templates,
}

#[derive(Args, Debug)]
struct TranslatorArgs {
    /// External translator command (JSON on stdin/stdout). Defaults to the
    /// built-in keyword recognizer.
    #[arg(long)]
    translator_cmd: Option<String>,

    /// Timeout per translation attempt, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Tournament file: {"rounds_per_match", "payoff", "strategies": [{"name", "text"}]}
    file: PathBuf,

    /// Rounds per match; overrides the file.
    #[arg(long, allow_hyphen_values = true)]
    rounds: Option<i64>,

    /// Play matches one after another instead of in parallel.
    #[arg(long)]
    sequential: bool,

    /// Print the full report as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    translator: TranslatorArgs,
}

#[derive(Args, Debug)]
struct InterpretArgs {
    /// Strategy text
    text: String,

    #[command(flatten)]
    translator: TranslatorArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose, cli.log_file)?;

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Interpret(args) => interpret(args),
        Commands::Templates => {
            for base in StrategyBase::ALL {
                println!("{:<24} {}", base.name(), base.describe());
            }
            Ok(())
        }
    }
}

fn build_interpreter(args: &TranslatorArgs) -> anyhow::Result<StrategyInterpreter> {
    let mut config = InterpreterConfig::from_env();
    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }

    let translator: Arc<dyn Translator> = match &args.translator_cmd {
        Some(command_line) => Arc::new(CommandTranslator::parse(command_line)?.with_timeout(config.timeout())),
        None => Arc::new(KeywordTranslator::new()),
    };
    Ok(StrategyInterpreter::new(translator, config))
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let file = input::load(&args.file)?;

    let mut config = TournamentConfig::from_env();
    if let Some(payoff) = file.payoff {
        config = config.with_payoff(payoff);
    }
    if args.sequential {
        config = config.with_parallel(false);
    }
    let rounds = file.rounds(args.rounds, config.max_rounds_per_match())?;
    info!(file = %args.file.display(), strategies = file.strategies.len(), rounds, "loaded tournament");

    let engine = TournamentEngine::new(Arc::new(build_interpreter(&args.translator)?), config);
    let report = engine
        .run_tournament(&file.strategies, rounds)
        .with_context(|| format!("cannot run tournament from `{}`", args.file.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", output::render_table(&report));
    }
    Ok(())
}

fn interpret(args: InterpretArgs) -> anyhow::Result<()> {
    let interpreter = build_interpreter(&args.translator)?;
    let interpreted = interpreter.interpret_strategy(&StrategySpec::new("cli", args.text));
    print!("{}", output::render_interpretation(&interpreted));
    Ok(())
}
