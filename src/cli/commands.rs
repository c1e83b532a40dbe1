// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `export`, and all
// their configurable flags.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{export_use_case::ExportConfig, train_use_case::TrainConfig};
use crate::domain::Stage;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the demo classifier on synthetic images
    Train(TrainArgs),

    /// Export the latest checkpoint as an ONNX model
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory for checkpoints, train_config.json and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Number of synthetic images to generate
    #[arg(long, default_value_t = 512)]
    pub num_samples: usize,

    #[arg(long, default_value_t = 4)]
    pub num_classes: usize,

    #[arg(long, default_value_t = 1)]
    pub channels: usize,

    #[arg(long, default_value_t = 8)]
    pub height: usize,

    #[arg(long, default_value_t = 8)]
    pub width: usize,

    /// Width of the hidden dense layer
    #[arg(long, default_value_t = 32)]
    pub hidden: usize,

    /// Half-width of the uniform pixel noise around each class prototype
    #[arg(long, default_value_t = 0.2)]
    pub noise: f32,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 1e-2)]
    pub lr: f64,

    /// Share of samples used for training; the rest validates
    #[arg(long, default_value_t = 0.8)]
    pub train_fraction: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            checkpoint_dir: a.checkpoint_dir,
            num_samples:    a.num_samples,
            num_classes:    a.num_classes,
            channels:       a.channels,
            height:         a.height,
            width:          a.width,
            hidden:         a.hidden,
            noise:          a.noise,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            train_fraction: a.train_fraction,
            seed:           a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Where to write the ONNX model
    #[arg(long, default_value = "model.onnx")]
    pub output: PathBuf,

    /// Mark the leading dimension of inputs and outputs as symbolic
    #[arg(long)]
    pub dynamic_batch: bool,

    /// Batch size of the example input used for tracing
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    /// Stage to trace at (train, validation, test, inference, export)
    #[arg(long, default_value = "export")]
    pub stage: Stage,
}

impl From<ExportArgs> for ExportConfig {
    fn from(a: ExportArgs) -> Self {
        ExportConfig {
            checkpoint_dir: a.checkpoint_dir,
            output:         a.output,
            dynamic_batch:  a.dynamic_batch,
            batch_size:     a.batch_size,
            stage:          a.stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_export_stage_is_parsed() {
        let cli = Cli::try_parse_from(["brickflow", "export", "--stage", "val", "--dynamic-batch"]).unwrap();
        let Commands::Export(args) = cli.command else { panic!("expected export") };
        assert_eq!(args.stage, Stage::Validation);
        assert!(args.dynamic_batch);
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        assert!(Cli::try_parse_from(["brickflow", "export", "--stage", "deploy"]).is_err());
    }

    #[test]
    fn test_train_defaults_match_config() {
        let cli = Cli::try_parse_from(["brickflow", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        let default = TrainConfig::default();
        assert_eq!(cfg.epochs, default.epochs);
        assert_eq!(cfg.num_samples, default.num_samples);
        assert_eq!(cfg.checkpoint_dir, default.checkpoint_dir);
    }
}
