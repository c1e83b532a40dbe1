// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop driven entirely through the Collection contract:
//
//   train phase  — step(batch, Train) → loss.backward()
//                  → collection.learn(grads, lr)
//   valid phase  — step(batch, Validation), no backward
//   after each   — summarize(stage, reset = true)
//
// The trainer never touches parameters itself. Trainable bricks
// own their optimizers and apply the gradients they are handed;
// frozen bricks ignore them.
//
// Batch order is reshuffled every epoch from the seed plus the epoch number, so
// a run is reproducible.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use burn::tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::Stage;
use crate::ml::collection::Collection;
use crate::ml::value::NamedValues;

/// Loss and metrics of one stage over one pass through its batches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseReport {
    /// Mean of the reduced batch losses; `None` if no loss brick ran.
    pub loss:    Option<f64>,
    pub metrics: BTreeMap<String, f64>,
    pub batches: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub train: PhaseReport,
    pub valid: PhaseReport,
}

impl EpochReport {
    /// `(stage, name, value)` rows: losses first, then metrics.
    pub fn rows(&self) -> Vec<(Stage, String, f64)> {
        let mut rows = Vec::new();
        for (stage, phase) in [(Stage::Train, &self.train), (Stage::Validation, &self.valid)] {
            if let Some(loss) = phase.loss {
                rows.push((stage, "loss".to_string(), loss));
            }
            rows.extend(phase.metrics.iter().map(|(name, value)| (stage, name.clone(), *value)));
        }
        rows
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Trainer {
    epochs: usize,
    lr:     f64,
    seed:   u64,
}

impl Trainer {
    pub fn new(epochs: usize, lr: f64) -> Self {
        Self { epochs, lr, seed: 42 }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train for every epoch, calling `on_epoch` after each one
    /// (checkpointing and metric logging hook in there).
    pub fn fit<B, F>(
        &self,
        collection:   &mut Collection<B>,
        train:        &[NamedValues<B>],
        valid:        &[NamedValues<B>],
        mut on_epoch: F,
    ) -> Result<Vec<EpochReport>>
    where
        B: AutodiffBackend,
        B::Gradients: 'static,
        F: FnMut(&EpochReport, &Collection<B>) -> Result<()>,
    {
        let mut reports = Vec::with_capacity(self.epochs);
        let mut order: Vec<usize> = (0..train.len()).collect();

        for epoch in 1..=self.epochs {
            order.shuffle(&mut StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64)));

            let mut loss_sum = 0.0f64;
            for &index in &order {
                let out = collection.step(train[index].clone(), Stage::Train)?;
                let loss = out
                    .loss
                    .ok_or_else(|| anyhow!("no loss brick is alive at stage train"))?;
                loss_sum += loss.clone().into_scalar().elem::<f64>();

                let mut grads = loss.backward();
                collection.learn(&mut grads, self.lr)?;
            }
            let train_report = PhaseReport {
                loss:    (!train.is_empty()).then(|| loss_sum / train.len() as f64),
                metrics: collection.summarize(Stage::Train, true)?,
                batches: train.len(),
            };

            let valid_report = evaluate(collection, valid, Stage::Validation)?;

            tracing::info!(
                "Epoch {:>3}/{} | train_loss={} | val_loss={} | {}",
                epoch,
                self.epochs,
                fmt_loss(train_report.loss),
                fmt_loss(valid_report.loss),
                fmt_metrics(&valid_report.metrics),
            );

            let report = EpochReport { epoch, train: train_report, valid: valid_report };
            on_epoch(&report, collection)?;
            reports.push(report);
        }

        tracing::info!("Training complete after {} epochs", self.epochs);
        Ok(reports)
    }
}

/// One pass over `batches` at `stage` without learning; metrics for the
/// stage are drained and reset afterwards.
pub fn evaluate<B: Backend>(
    collection: &mut Collection<B>,
    batches:    &[NamedValues<B>],
    stage:      Stage,
) -> Result<PhaseReport> {
    let mut loss_sum = 0.0f64;
    let mut with_loss = 0usize;
    for batch in batches {
        if let Some(loss) = collection.step(batch.clone(), stage)?.loss {
            loss_sum += loss.into_scalar().elem::<f64>();
            with_loss += 1;
        }
    }
    Ok(PhaseReport {
        loss:    (with_loss > 0).then(|| loss_sum / with_loss as f64),
        metrics: collection.summarize(stage, true)?,
        batches: batches.len(),
    })
}

fn fmt_loss(loss: Option<f64>) -> String {
    loss.map_or_else(|| "-".to_string(), |l| format!("{l:.4}"))
}

fn fmt_metrics(metrics: &BTreeMap<String, f64>) -> String {
    metrics
        .iter()
        .map(|(name, value)| format!("{name}={value:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::brick::Brick;
    use crate::ml::metric::Mean;
    use crate::ml::ops::{Activation, Dense, MeanSquaredError};
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::SgdConfig;
    use burn::tensor::Tensor;

    type AB = Autodiff<NdArray>;

    fn regression() -> (Collection<AB>, Vec<NamedValues<AB>>) {
        let device = Default::default();
        let dense = Dense::<AB>::init(1, 1, Activation::None, &device).with_optimizer(SgdConfig::new().init());
        let collection = Collection::new()
            .with("dense", Brick::trainable(dense, ["x"], ["y"]))
            .and_then(|c| c.with("mse", Brick::loss(MeanSquaredError, ["y", "target"], ["mse"])))
            .and_then(|c| c.with("y_mean", Brick::metric(Mean::new(), ["y"])))
            .unwrap();
        let batches = (0..4)
            .map(|i| {
                let x = i as f32 / 4.0;
                NamedValues::new()
                    .with("x", Tensor::<AB, 2>::from_floats([[x], [x + 0.1]], &device))
                    .with("target", Tensor::<AB, 2>::from_floats([[2.0 * x], [2.0 * x + 0.2]], &device))
            })
            .collect();
        (collection, batches)
    }

    #[test]
    fn test_fit_reduces_training_loss() {
        let (mut collection, batches) = regression();
        let mut seen = Vec::new();
        let reports = Trainer::new(30, 0.1)
            .fit(&mut collection, &batches, &batches, |report, _| {
                seen.push(report.epoch);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, (1..=30).collect::<Vec<_>>());
        let first = reports[0].train.loss.unwrap();
        let last = reports[29].train.loss.unwrap();
        assert!(last < first, "loss went from {first} to {last}");
        assert!(reports[29].valid.metrics.contains_key("y_mean"));
    }

    #[test]
    fn test_metrics_are_reset_between_epochs() {
        let (mut collection, batches) = regression();
        Trainer::new(2, 0.0)
            .fit(&mut collection, &batches, &batches, |_, _| Ok(()))
            .unwrap();
        assert!(collection.summarize(Stage::Train, false).unwrap().is_empty());
        assert!(collection.summarize(Stage::Validation, false).unwrap().is_empty());
    }

    #[test]
    fn test_largest_seed_wraps_between_epochs() {
        let (mut collection, batches) = regression();
        let reports = Trainer::new(2, 0.01)
            .with_seed(u64::MAX)
            .fit(&mut collection, &batches, &batches, |_, _| Ok(()))
            .unwrap();
        assert_eq!(reports.len(), 2);
    }

    #[test]
    fn test_report_rows_are_long_format() {
        let report = EpochReport {
            epoch: 1,
            train: PhaseReport { loss: Some(0.5), metrics: BTreeMap::new(), batches: 1 },
            valid: PhaseReport {
                loss:    None,
                metrics: BTreeMap::from([("accuracy".to_string(), 0.75)]),
                batches: 1,
            },
        };
        assert_eq!(
            report.rows(),
            vec![
                (Stage::Train, "loss".to_string(), 0.5),
                (Stage::Validation, "accuracy".to_string(), 0.75),
            ]
        );
    }

    #[test]
    fn test_fit_without_loss_fails() {
        let device = Default::default();
        let mut collection = Collection::<AB>::new()
            .with("dense", Brick::trainable(Dense::init(1, 1, Activation::None, &device), ["x"], ["y"]))
            .unwrap();
        let batches = vec![NamedValues::new().with("x", Tensor::<AB, 2>::zeros([1, 1], &device))];
        let err = Trainer::new(1, 0.1)
            .fit(&mut collection, &batches, &[], |_, _| Ok(()))
            .unwrap_err();
        assert!(err.to_string().contains("no loss brick"));
    }
}
