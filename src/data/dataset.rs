// ============================================================
// Layer 4 — Synthetic Image Dataset
// ============================================================
// Labelled "blob" images for the demo pipeline: every class
// gets a random prototype image, and each sample is its class
// prototype plus uniform noise. Generation is seeded, so the
// same config always yields the same dataset.

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One image, stored channel-major (`[channels, height, width]` flattened).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    pub pixels: Vec<f32>,
    pub label:  usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    pub num_samples: usize,
    pub num_classes: usize,
    pub channels:    usize,
    pub height:      usize,
    pub width:       usize,
    /// Half-width of the uniform noise added to each pixel.
    pub noise:       f32,
    pub seed:        u64,
}

impl BlobConfig {
    pub fn pixels_per_image(&self) -> usize {
        self.channels * self.height * self.width
    }
}

pub struct BlobDataset {
    samples: Vec<ImageSample>,
}

impl BlobDataset {
    pub fn new(samples: Vec<ImageSample>) -> Self {
        Self { samples }
    }

    pub fn synthetic(cfg: &BlobConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let size = cfg.pixels_per_image();

        let prototypes: Vec<Vec<f32>> = (0..cfg.num_classes)
            .map(|_| (0..size).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();

        let samples = (0..cfg.num_samples)
            .map(|i| {
                let label = i % cfg.num_classes.max(1);
                let pixels: Vec<f32> = prototypes
                    .get(label)
                    .map(|proto| {
                        proto
                            .iter()
                            .map(|p| p + rng.gen_range(-cfg.noise..=cfg.noise))
                            .collect()
                    })
                    .unwrap_or_default();
                ImageSample { pixels, label }
            })
            .collect();

        tracing::debug!(
            "Generated {} samples over {} classes ({} pixels each)",
            cfg.num_samples,
            cfg.num_classes,
            size
        );
        Self { samples }
    }

    pub fn into_samples(self) -> Vec<ImageSample> {
        self.samples
    }
}

impl Dataset<ImageSample> for BlobDataset {
    fn get(&self, index: usize) -> Option<ImageSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
