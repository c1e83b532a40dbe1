// ============================================================
// Layer 5 — Demo Classifier
// ============================================================
// A small image classifier assembled from bricks, used by the
// train / export commands and the integration tests.
//
//   preprocess.scale      frozen     images      → scaled
//   preprocess.flatten    frozen     scaled      → features
//   classifier.hidden     trainable  features    → hidden (ReLU)
//   classifier.head       trainable  hidden      → logits
//   probabilities         frozen     logits      → probabilities
//   loss                  loss       logits, labels → loss
//   accuracy              metric     logits, labels
//
// Everything above the loss is alive at EXPORT, so the exported
// graph maps images to probabilities.

use burn::prelude::*;

use crate::domain::BrickError;
use crate::ml::brick::Brick;
use crate::ml::collection::Collection;
use crate::ml::metric::Accuracy;
use crate::ml::ops::{flatten, softmax, Activation, CrossEntropy, Dense, Scale};

pub const IMAGES: &str = "images";
pub const LABELS: &str = "labels";
pub const LOGITS: &str = "logits";
pub const PROBABILITIES: &str = "probabilities";

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub channels:    usize,
    pub height:      usize,
    pub width:       usize,
    pub num_classes: usize,
    #[config(default = 32)]
    pub hidden:      usize,
    /// Applied to raw pixels before anything else.
    #[config(default = 1.0)]
    pub input_scale: f32,
    #[config(default = 0.0)]
    pub label_smoothing: f32,
}

impl ClassifierConfig {
    pub fn input_features(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn build<B: Backend>(&self, device: &B::Device) -> Result<Collection<B>, BrickError> {
        self.build_with(device, |dense| dense)
    }

    /// Build with `attach` applied to every trainable dense layer,
    /// typically to give it an optimizer.
    pub fn build_with<B: Backend>(
        &self,
        device: &B::Device,
        attach: impl Fn(Dense<B>) -> Dense<B>,
    ) -> Result<Collection<B>, BrickError> {
        let preprocess = Collection::new()
            .with("scale", Brick::frozen(Scale::new(self.input_scale), [IMAGES], ["scaled"]))?
            .with("flatten", Brick::frozen(flatten(), ["scaled"], ["features"]))?;

        let hidden = attach(Dense::init(self.input_features(), self.hidden, Activation::Relu, device));
        let head = attach(Dense::init(self.hidden, self.num_classes, Activation::None, device));
        let classifier = Collection::new()
            .with("hidden", Brick::trainable(hidden, ["features"], ["hidden"]))?
            .with("head", Brick::trainable(head, ["hidden"], [LOGITS]))?;

        let loss = if self.label_smoothing > 0.0 {
            CrossEntropy::new().with_smoothing(self.label_smoothing)
        } else {
            CrossEntropy::new()
        };

        Collection::new()
            .with("preprocess", preprocess)?
            .with("classifier", classifier)?
            .with("probabilities", Brick::frozen(softmax(), [LOGITS], [PROBABILITIES]))?
            .with("loss", Brick::loss(loss, [LOGITS, LABELS], ["loss"]))?
            .with("accuracy", Brick::metric(Accuracy::new(), [LOGITS, LABELS]))
    }
}
