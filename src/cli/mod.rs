// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All work is delegated to Layer 2 (application).
//
//   1. `init-config` - writes a model config JSON
//   2. `run`         - scores (--train) or decodes sentences
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InitConfigArgs, RunArgs};

use dep_ner::application::{
    config_use_case::InitConfigUseCase,
    run_use_case::{RunReport, RunUseCase},
};

#[derive(Parser, Debug)]
#[command(
    name = "dep-ner",
    version = "0.1.0",
    about = "Dependency-aware NER: transformer embedder, dependency GCN, CRF or span heads."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::InitConfig(args) => run_init_config(args),
            Commands::Run(args)        => run_model(args),
        }
    }
}

fn run_init_config(args: InitConfigArgs) -> Result<()> {
    let output = args.output.clone();
    let config = InitConfigUseCase::new(args.into()).execute()?;
    println!(
        "Wrote {} ({} labels, {:?} / {:?}) to {}",
        config.embedder.name,
        config.labels.len(),
        config.dep_model,
        config.parser_mode,
        output.display()
    );
    Ok(())
}

fn run_model(args: RunArgs) -> Result<()> {
    tracing::info!("Running model from '{}' on '{}'", args.config.display(), args.input.display());
    match RunUseCase::new(args.into()).execute()? {
        report @ RunReport::Loss { .. } => {
            println!("{}", serde_json::to_string(&report)?);
        }
        RunReport::Predictions { sentences } => {
            for sentence in &sentences {
                println!("{}", serde_json::to_string(sentence)?);
            }
        }
    }
    Ok(())
}
