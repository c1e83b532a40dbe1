// ============================================================
// Layer 5 — Metric Accumulators
// ============================================================
// Running aggregation state behind metric bricks.
//
// A metric brick owns one prototype accumulator and clones a
// fresh one per stage on first use, so train / validation /
// test aggregates never mix. `value` reads the aggregate over
// every batch seen since the last reset.
//
// Built-ins:
//   Accuracy — argmax(logits) == targets, counted over samples
//   Mean     — mean of every element seen
//   Summary  — mean / min / max of every element seen

use std::collections::BTreeMap;

use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

use crate::domain::ComputeError;
use crate::ml::value::{Inputs, Value};

/// Result of draining an accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Many(BTreeMap<String, f64>),
}

pub trait Accumulator<B: Backend> {
    /// Fold one batch into the running state and return per-batch values,
    /// which the brick forwards only when configured to.
    fn update(&mut self, inputs: &Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>;

    /// Aggregate so far; `None` if nothing has been accumulated.
    fn value(&self) -> Option<MetricValue>;

    fn reset(&mut self);

    /// An empty accumulator with the same configuration.
    fn fresh(&self) -> Box<dyn Accumulator<B>>;
}

// ─── Accuracy ─────────────────────────────────────────────────────────────────
/// Classification accuracy. Inputs: logits `[batch, classes]`, targets `[batch]`.
#[derive(Debug, Clone, Default)]
pub struct Accuracy {
    correct: u64,
    total:   u64,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Accumulator<B> for Accuracy {
    fn update(&mut self, inputs: &Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        let logits: Tensor<B, 2> = inputs.get(0)?;
        let targets: Tensor<B, 1, Int> = inputs.get(1)?;
        let [batch, _] = logits.dims();
        if targets.dims()[0] != batch {
            return Err(ComputeError::Shape(format!(
                "{batch} logit rows but {} targets",
                targets.dims()[0]
            )));
        }

        let device = logits.device();
        // argmax(1) keeps the reduced axis: [batch, 1] -> [batch]
        let predicted = logits.detach().argmax(1).flatten::<1>(0, 1);
        let correct = predicted
            .equal(targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as u64;

        self.correct += correct;
        self.total   += batch as u64;

        let batch_acc = if batch > 0 { correct as f32 / batch as f32 } else { 0.0 };
        Ok(vec![Tensor::<B, 1>::from_floats([batch_acc], &device).into()])
    }

    fn value(&self) -> Option<MetricValue> {
        (self.total > 0).then(|| MetricValue::Scalar(self.correct as f64 / self.total as f64))
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn fresh(&self) -> Box<dyn Accumulator<B>> {
        Box::new(Self::default())
    }
}

// ─── Mean ─────────────────────────────────────────────────────────────────────
/// Mean over every element of the first input, across batches.
#[derive(Debug, Clone, Default)]
pub struct Mean {
    sum:   f64,
    count: u64,
}

impl Mean {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Accumulator<B> for Mean {
    fn update(&mut self, inputs: &Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        let value = inputs.arg(0)?.clone().detach();
        let count = value.dims().iter().product::<usize>();
        let device = value.device();
        let found = value.kind();
        let sum = value
            .sum()
            .ok_or(ComputeError::ValueKind { expected: "float", found })?
            .into_scalar()
            .elem::<f64>();

        self.sum   += sum;
        self.count += count as u64;

        let batch_mean = if count > 0 { sum / count as f64 } else { 0.0 };
        Ok(vec![Tensor::<B, 1>::from_floats([batch_mean as f32], &device).into()])
    }

    fn value(&self) -> Option<MetricValue> {
        (self.count > 0).then(|| MetricValue::Scalar(self.sum / self.count as f64))
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn fresh(&self) -> Box<dyn Accumulator<B>> {
        Box::new(Self::default())
    }
}

// ─── Summary ──────────────────────────────────────────────────────────────────
/// Mean, min and max over every element of the first input.
/// Drains to a mapping: `{ "max", "mean", "min" }`.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    sum:   f64,
    count: u64,
    min:   f64,
    max:   f64,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Accumulator<B> for Summary {
    fn update(&mut self, inputs: &Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        let values = inputs.arg(0)?.to_f32_vec()?;
        for v in &values {
            let v = f64::from(*v);
            if self.count == 0 {
                self.min = v;
                self.max = v;
            } else {
                self.min = self.min.min(v);
                self.max = self.max.max(v);
            }
            self.sum   += v;
            self.count += 1;
        }
        Ok(Vec::new())
    }

    fn value(&self) -> Option<MetricValue> {
        if self.count == 0 {
            return None;
        }
        let mut map = BTreeMap::new();
        map.insert("mean".to_string(), self.sum / self.count as f64);
        map.insert("min".to_string(), self.min);
        map.insert("max".to_string(), self.max);
        Some(MetricValue::Many(map))
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn fresh(&self) -> Box<dyn Accumulator<B>> {
        Box::new(Self::default())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TB = NdArray;

    fn inputs(logits: [[f32; 2]; 3], targets: [i32; 3]) -> Inputs<TB> {
        let device = Default::default();
        Inputs::positional(vec![
            ("logits".into(), Tensor::<TB, 2>::from_floats(logits, &device).into()),
            ("targets".into(), Tensor::<TB, 1, Int>::from_ints(targets, &device).into()),
        ])
    }

    #[test]
    fn test_accuracy_counts_over_batches() {
        let mut acc = Accuracy::new();
        // predictions: 1, 0, 1
        let batch = inputs([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], [1, 1, 1]);
        let per_batch = Accumulator::<TB>::update(&mut acc, &batch).unwrap();
        assert_eq!(per_batch.len(), 1);
        let batch = inputs([[0.9, 0.1], [0.8, 0.2], [0.3, 0.7]], [0, 0, 0]);
        Accumulator::<TB>::update(&mut acc, &batch).unwrap();
        // 2/3 + 2/3 correct
        assert_eq!(Accumulator::<TB>::value(&acc), Some(MetricValue::Scalar(4.0 / 6.0)));
    }

    #[test]
    fn test_accuracy_rejects_mismatched_batch() {
        let device = Default::default();
        let batch = Inputs::<TB>::positional(vec![
            ("logits".into(), Tensor::<TB, 2>::zeros([3, 2], &device).into()),
            ("targets".into(), Tensor::<TB, 1, Int>::from_ints([0, 1], &device).into()),
        ]);
        let err = Accumulator::<TB>::update(&mut Accuracy::new(), &batch).unwrap_err();
        assert!(matches!(err, ComputeError::Shape(_)));
    }

    #[test]
    fn test_mean_is_element_weighted() {
        let device = Default::default();
        let mut mean = Mean::new();
        let one = Inputs::<TB>::positional(vec![("x".into(), Tensor::<TB, 1>::from_floats([1.0, 3.0], &device).into())]);
        let two = Inputs::<TB>::positional(vec![("x".into(), Tensor::<TB, 1>::from_floats([5.0], &device).into())]);
        Accumulator::<TB>::update(&mut mean, &one).unwrap();
        Accumulator::<TB>::update(&mut mean, &two).unwrap();
        assert_eq!(Accumulator::<TB>::value(&mean), Some(MetricValue::Scalar(3.0)));
    }

    #[test]
    fn test_empty_accumulators_have_no_value() {
        assert_eq!(Accumulator::<TB>::value(&Accuracy::new()), None);
        assert_eq!(Accumulator::<TB>::value(&Summary::new()), None);
    }

    #[test]
    fn test_summary_drains_to_mapping() {
        let device = Default::default();
        let mut summary = Summary::new();
        let batch = Inputs::<TB>::positional(vec![("x".into(), Tensor::<TB, 1>::from_floats([2.0, -1.0, 5.0], &device).into())]);
        Accumulator::<TB>::update(&mut summary, &batch).unwrap();
        let Some(MetricValue::Many(map)) = Accumulator::<TB>::value(&summary) else {
            panic!("summary drains to a mapping");
        };
        assert_eq!(map["min"], -1.0);
        assert_eq!(map["max"], 5.0);
        assert_eq!(map["mean"], 2.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut acc = Accuracy::new();
        Accumulator::<TB>::update(&mut acc, &inputs([[0.0, 1.0]; 3], [1, 1, 1])).unwrap();
        Accumulator::<TB>::reset(&mut acc);
        assert_eq!(Accumulator::<TB>::value(&acc), None);
    }
}
