// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands off to the
// application layer:
//
//   1. `train`  — trains the demo classifier
//   2. `export` — writes the latest checkpoint as ONNX

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ExportArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "brickflow",
    version,
    about = "Compose, train and export burn models built from named, stage-gated bricks."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case; this layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)  => run_train(args),
            Commands::Export(args) => run_export(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training into '{}'", args.checkpoint_dir);
    let reports = TrainUseCase::new(args.into()).execute()?;

    match reports.last().and_then(|r| r.valid.metrics.get("accuracy")) {
        Some(acc) => println!("Training complete. Validation accuracy: {:.1}%", acc * 100.0),
        None => println!("Training complete. Checkpoint saved."),
    }
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    use crate::application::export_use_case::ExportUseCase;

    let output = args.output.clone();
    let epoch = ExportUseCase::new(args.into()).execute()?;
    println!("Exported epoch {} to {}", epoch, output.display());
    Ok(())
}
