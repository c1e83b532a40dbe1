// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists a Collection's state dict: one opaque blob per brick
// that has parameters, named after the brick's qualified name.
//
//   checkpoints/
//     epoch_1/
//       classifier.hidden.bin
//       classifier.head.bin
//     epoch_2/ ...
//     manifest.json       ← latest epoch + the bricks it holds
//     train_config.json   ← run configuration
//
// The blob format belongs to each computation (burn's
// BinBytesRecorder for module-backed bricks). Loading rebuilds
// the same Collection first, then restores every blob into it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};
use burn::tensor::backend::Backend;

use crate::application::train_use_case::TrainConfig;
use crate::ml::collection::Collection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub epoch:  usize,
    pub bricks: Vec<String>,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn epoch_dir(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("epoch_{epoch}"))
    }

    /// Write the state dict of `collection` for `epoch` and point the
    /// manifest at it.
    pub fn save<B: Backend>(&self, collection: &Collection<B>, epoch: usize) -> Result<()> {
        let dict = collection.state_dict()?;
        let epoch_dir = self.epoch_dir(epoch);
        fs::create_dir_all(&epoch_dir)?;

        for (name, blob) in &dict {
            let path = epoch_dir.join(format!("{name}.bin"));
            fs::write(&path, blob)
                .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        }

        let manifest = Manifest { epoch, bricks: dict.into_keys().collect() };
        fs::write(self.dir.join("manifest.json"), serde_json::to_string_pretty(&manifest)?)
            .with_context(|| "Failed to write manifest.json")?;

        tracing::info!("Checkpoint saved for epoch {} ({} bricks)", epoch, manifest.bricks.len());
        Ok(())
    }

    /// Restore the latest checkpoint into `collection`, returning its epoch.
    ///
    /// `collection` must have the layout the checkpoint was taken from.
    pub fn load<B: Backend>(&self, collection: &mut Collection<B>, device: &B::Device) -> Result<usize> {
        let manifest = self.manifest()?;
        let epoch_dir = self.epoch_dir(manifest.epoch);

        let mut dict = BTreeMap::new();
        for name in &manifest.bricks {
            let path = epoch_dir.join(format!("{name}.bin"));
            let blob = fs::read(&path)
                .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
            dict.insert(name.clone(), blob);
        }
        collection
            .load_state_dict(dict, device)
            .with_context(|| format!("Checkpoint of epoch {} does not fit the model", manifest.epoch))?;

        tracing::info!("Loaded checkpoint from epoch {}", manifest.epoch);
        Ok(manifest.epoch)
    }

    pub fn manifest(&self) -> Result<Manifest> {
        let path = self.dir.join("manifest.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot find '{}'. Have you run 'train' first?", path.display())
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'export'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}
