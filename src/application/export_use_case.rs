// ============================================================
// Layer 2 — ExportUseCase
// ============================================================
// Rebuilds the trained model from train_config.json, restores
// the latest checkpoint and writes it out as ONNX.

use anyhow::{Context, Result};
use burn::tensor::Tensor;
use std::path::PathBuf;

use crate::domain::Stage;
use crate::export::{export_onnx_to_file, ExportOptions};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{model::IMAGES, value::NamedValues, InferenceBackend};

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub checkpoint_dir: String,
    pub output:         PathBuf,
    pub dynamic_batch:  bool,
    /// Batch size of the example input used for tracing.
    pub batch_size:     usize,
    pub stage:          Stage,
}

pub struct ExportUseCase {
    config: ExportConfig,
}

impl ExportUseCase {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Returns the epoch of the exported checkpoint.
    pub fn execute(&self) -> Result<usize> {
        let cfg = &self.config;
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;
        let train_cfg = checkpoints.load_config()?;

        let device = Default::default();
        let mut collection = train_cfg.classifier().build::<InferenceBackend>(&device)?;
        let epoch = checkpoints.load(&mut collection, &device)?;

        let example = NamedValues::new().with(
            IMAGES,
            Tensor::<InferenceBackend, 4>::zeros(
                [cfg.batch_size.max(1), train_cfg.channels, train_cfg.height, train_cfg.width],
                &device,
            ),
        );
        let options = ExportOptions::default()
            .with_stage(cfg.stage)
            .with_dynamic_batch(cfg.dynamic_batch);

        export_onnx_to_file(&mut collection, &example, &options, &cfg.output)
            .with_context(|| format!("Cannot export to '{}'", cfg.output.display()))?;
        Ok(epoch)
    }
}
