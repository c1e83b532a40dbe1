// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the demo training pipeline in order:
//
//   Step 1: Generate synthetic images   (Layer 4 - data)
//   Step 2: Split train/validation      (Layer 4 - data)
//   Step 3: Batch into named values     (Layer 4 - data)
//   Step 4: Build the brick collection  (Layer 5 - ml)
//   Step 5: Save config                 (Layer 6 - infra)
//   Step 6: Run the epoch loop, saving
//           checkpoints + metrics.csv   (Layer 5 + 6)

use anyhow::{ensure, Result};
use burn::optim::AdamConfig;
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::ImageBatcher,
    dataset::{BlobConfig, BlobDataset},
    splitter::split_train_val,
};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::{
    model::ClassifierConfig,
    trainer::{EpochReport, Trainer},
    TrainingBackend,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Serialisable so export can rebuild the exact same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub checkpoint_dir: String,
    pub num_samples:    usize,
    pub num_classes:    usize,
    pub channels:       usize,
    pub height:         usize,
    pub width:          usize,
    pub hidden:         usize,
    pub noise:          f32,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub train_fraction: f64,
    pub seed:           u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "checkpoints".to_string(),
            num_samples:    512,
            num_classes:    4,
            channels:       1,
            height:         8,
            width:          8,
            hidden:         32,
            noise:          0.2,
            batch_size:     32,
            epochs:         10,
            lr:             1e-2,
            train_fraction: 0.8,
            seed:           42,
        }
    }
}

impl TrainConfig {
    pub fn classifier(&self) -> ClassifierConfig {
        ClassifierConfig::new(self.channels, self.height, self.width, self.num_classes)
            .with_hidden(self.hidden)
    }

    pub fn blobs(&self) -> BlobConfig {
        BlobConfig {
            num_samples: self.num_samples,
            num_classes: self.num_classes,
            channels:    self.channels,
            height:      self.height,
            width:       self.width,
            noise:       self.noise,
            seed:        self.seed,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    pub fn execute(&self) -> Result<Vec<EpochReport>> {
        let cfg = &self.config;
        ensure!(cfg.num_classes > 0, "num_classes must be positive");
        ensure!(cfg.batch_size > 0, "batch_size must be positive");

        // ── Steps 1-2: data ──────────────────────────────────────────────────
        let dataset = BlobDataset::synthetic(&cfg.blobs());
        let (train_samples, val_samples) =
            split_train_val(dataset.into_samples(), cfg.train_fraction, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 3: batches ──────────────────────────────────────────────────
        let device = Default::default();
        let batcher = ImageBatcher::<TrainingBackend>::new(device, cfg.channels, cfg.height, cfg.width);
        let train = batcher.batches(&BlobDataset::new(train_samples), cfg.batch_size);
        let valid = batcher.batches(&BlobDataset::new(val_samples), cfg.batch_size);

        // ── Step 4: model ────────────────────────────────────────────────────
        let mut collection = cfg
            .classifier()
            .build_with::<TrainingBackend>(&batcher.device, |dense| {
                dense.with_optimizer(AdamConfig::new().with_epsilon(1e-8).init())
            })?;
        tracing::info!(
            "Model ready: {} bricks, {} parameters",
            collection.len(),
            collection.num_params()
        );

        // ── Step 5: config ───────────────────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;
        checkpoints.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 6: epochs ───────────────────────────────────────────────────
        Trainer::new(cfg.epochs, cfg.lr)
            .with_seed(cfg.seed)
            .fit(&mut collection, &train, &valid, |report, collection| {
                metrics.log(report)?;
                checkpoints.save(collection, report.epoch)
            })
    }
}
