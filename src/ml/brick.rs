// ============================================================
// Layer 5 — Brick
// ============================================================
// The atomic unit of a model: one opaque computation (or
// metric accumulator) behind a named-input / named-output
// contract and a stage gate.
//
//   Trainable — gradients tracked at Train; outputs detached
//               at every other stage
//   Frozen    — parameters excluded from gradients; gradient
//               flow through the brick is configurable
//   Loss      — outputs are collected as losses by `step`
//   Metric    — folds batches into per-stage accumulators,
//               returns nothing unless asked to forward
//
// A brick that is not alive in the current stage does no work
// at all: no input lookup, no forward, no accumulator touch.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use burn::tensor::backend::Backend;

use crate::domain::{BrickError, Stage, StageSet};
use crate::ml::computation::Computation;
use crate::ml::metric::{Accumulator, MetricValue};
use crate::ml::trace::{Lowering, TraceGraph};
use crate::ml::value::{Inputs, NamedValues, Value};

// ─── InputSpec ────────────────────────────────────────────────────────────────
/// Which keys a brick reads from the named value mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// Every available value, passed keyword-only.
    All,
    /// These keys, passed positionally in this order.
    Names(Vec<String>),
}

impl InputSpec {
    pub fn names(&self) -> Option<&[String]> {
        match self {
            InputSpec::All => None,
            InputSpec::Names(names) => Some(names),
        }
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for InputSpec {
    fn from(names: [S; N]) -> Self {
        InputSpec::Names(names.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> From<Vec<S>> for InputSpec {
    fn from(names: Vec<S>) -> Self {
        InputSpec::Names(names.into_iter().map(Into::into).collect())
    }
}

// ─── Kind ─────────────────────────────────────────────────────────────────────
/// Whether a frozen brick lets gradients reach upstream bricks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradFlow {
    #[default]
    Pass,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrickKind {
    Trainable,
    Frozen { flow: GradFlow },
    /// `outputs` are the output keys collected as losses.
    Loss { outputs: Vec<String> },
    /// `forward`: also return per-batch metric values.
    Metric { forward: bool },
}

enum Body<B: Backend> {
    Compute(Box<dyn Computation<B>>),
    Metric {
        prototype: Box<dyn Accumulator<B>>,
        stages:    BTreeMap<Stage, Box<dyn Accumulator<B>>>,
    },
}

// ─── Brick ────────────────────────────────────────────────────────────────────
pub struct Brick<B: Backend> {
    kind:    BrickKind,
    inputs:  InputSpec,
    outputs: Vec<String>,
    alive:   StageSet,
    body:    Body<B>,
}

fn strings(names: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    names.into_iter().map(Into::into).collect()
}

impl<B: Backend> Brick<B> {
    fn compute(
        kind:        BrickKind,
        computation: impl Computation<B> + 'static,
        inputs:      impl Into<InputSpec>,
        outputs:     Vec<String>,
        alive:       StageSet,
    ) -> Self {
        Self {
            kind,
            inputs: inputs.into(),
            outputs,
            alive,
            body: Body::Compute(Box::new(computation)),
        }
    }

    /// Parameters take part in optimization. Alive in every stage.
    pub fn trainable(
        computation: impl Computation<B> + 'static,
        inputs:      impl Into<InputSpec>,
        outputs:     impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::compute(BrickKind::Trainable, computation, inputs, strings(outputs), StageSet::all())
    }

    /// Parameters are frozen. Alive in every stage.
    pub fn frozen(
        mut computation: impl Computation<B> + 'static,
        inputs:          impl Into<InputSpec>,
        outputs:         impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        computation.freeze();
        let kind = BrickKind::Frozen { flow: GradFlow::default() };
        Self::compute(kind, computation, inputs, strings(outputs), StageSet::all())
    }

    /// Every output is a loss. Alive in train, validation and test.
    pub fn loss(
        computation: impl Computation<B> + 'static,
        inputs:      impl Into<InputSpec>,
        outputs:     impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let outputs = strings(outputs);
        let kind = BrickKind::Loss { outputs: outputs.clone() };
        Self::compute(kind, computation, inputs, outputs, StageSet::evaluation())
    }

    /// Accumulates without producing outputs. Alive in train, validation and test.
    pub fn metric(accumulator: impl Accumulator<B> + 'static, inputs: impl Into<InputSpec>) -> Self {
        Self {
            kind:    BrickKind::Metric { forward: false },
            inputs:  inputs.into(),
            outputs: Vec::new(),
            alive:   StageSet::evaluation(),
            body:    Body::Metric {
                prototype: Box::new(accumulator),
                stages:    BTreeMap::new(),
            },
        }
    }

    // ── builders ──────────────────────────────────────────────────────────────

    pub fn alive(mut self, stages: impl Into<StageSet>) -> Self {
        self.alive = stages.into();
        self
    }

    /// Only meaningful for frozen bricks; ignored otherwise.
    pub fn grad_flow(mut self, flow: GradFlow) -> Self {
        if let BrickKind::Frozen { flow: current } = &mut self.kind {
            *current = flow;
        }
        self
    }

    /// Narrow which outputs of a loss brick count as losses.
    pub fn loss_outputs(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let BrickKind::Loss { outputs } = &mut self.kind {
            *outputs = strings(names);
        }
        self
    }

    /// Let a metric brick also write its per-batch values under `names`.
    pub fn forward_outputs(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let BrickKind::Metric { forward } = &mut self.kind {
            *forward = true;
            self.outputs = strings(names);
        }
        self
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    pub fn kind(&self) -> &BrickKind {
        &self.kind
    }

    pub fn inputs(&self) -> &InputSpec {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn alive_stages(&self) -> StageSet {
        self.alive
    }

    pub fn is_alive(&self, stage: Stage) -> bool {
        self.alive.contains(stage)
    }

    pub fn requires_gradient(&self) -> bool {
        matches!(self.kind, BrickKind::Trainable)
    }

    pub fn loss_output_names(&self) -> &[String] {
        match &self.kind {
            BrickKind::Loss { outputs } => outputs,
            _ => &[],
        }
    }

    pub fn is_metric(&self) -> bool {
        matches!(self.kind, BrickKind::Metric { .. })
    }

    fn detaches_outputs(&self, stage: Stage) -> bool {
        match self.kind {
            BrickKind::Trainable => stage != Stage::Train,
            BrickKind::Frozen { flow } => flow == GradFlow::Block,
            BrickKind::Loss { .. } => false,
            BrickKind::Metric { .. } => true,
        }
    }

    /// Keys this brick would read from `available`.
    pub fn resolved_inputs(&self, available: &NamedValues<B>) -> Vec<String> {
        match &self.inputs {
            InputSpec::All => available.keys().map(str::to_string).collect(),
            InputSpec::Names(names) => names.clone(),
        }
    }

    // ── invocation ────────────────────────────────────────────────────────────

    /// Run the brick against `available` under `name`.
    ///
    /// Returns an empty mapping when the brick is not alive in `stage`.
    pub fn invoke(
        &mut self,
        name:      &str,
        available: &NamedValues<B>,
        stage:     Stage,
    ) -> Result<NamedValues<B>, BrickError> {
        if !self.is_alive(stage) {
            return Ok(NamedValues::new());
        }

        let inputs = self.gather(name, available, stage)?;
        let detach_outputs = self.detaches_outputs(stage);
        let block_inputs = matches!(self.kind, BrickKind::Frozen { flow: GradFlow::Block });

        let produced = match &mut self.body {
            Body::Compute(computation) => {
                let inputs = if block_inputs { inputs.detach() } else { inputs };
                computation
                    .forward(inputs)
                    .map_err(|e| BrickError::compute(name, e))?
            }
            Body::Metric { prototype, stages } => {
                let accumulator = stages.entry(stage).or_insert_with(|| prototype.fresh());
                let values = accumulator
                    .update(&inputs)
                    .map_err(|e| BrickError::compute(name, e))?;
                if !matches!(self.kind, BrickKind::Metric { forward: true }) {
                    return Ok(NamedValues::new());
                }
                values
            }
        };

        if produced.len() != self.outputs.len() {
            return Err(BrickError::OutputArityMismatch {
                unit:     name.to_string(),
                expected: self.outputs.len(),
                actual:   produced.len(),
            });
        }

        Ok(self
            .outputs
            .iter()
            .cloned()
            .zip(produced)
            .map(|(key, value)| (key, if detach_outputs { value.detach() } else { value }))
            .collect())
    }

    fn gather(
        &self,
        name:      &str,
        available: &NamedValues<B>,
        stage:     Stage,
    ) -> Result<Inputs<B>, BrickError> {
        match &self.inputs {
            InputSpec::All => Ok(Inputs::keyword(
                available
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect(),
            )),
            InputSpec::Names(names) => names
                .iter()
                .map(|key| {
                    available
                        .get(key)
                        .map(|value| (key.clone(), value.clone()))
                        .ok_or_else(|| BrickError::MissingInput {
                            unit: name.to_string(),
                            key:  key.clone(),
                            stage,
                        })
                })
                .collect::<Result<Vec<(String, Value<B>)>, _>>()
                .map(Inputs::positional),
        }
    }

    // ── metrics ───────────────────────────────────────────────────────────────

    pub fn has_metric_state(&self, stage: Stage) -> bool {
        match &self.body {
            Body::Metric { stages, .. } => stages
                .get(&stage)
                .is_some_and(|accumulator| accumulator.value().is_some()),
            Body::Compute(_) => false,
        }
    }

    /// Read the aggregate for `stage`; with `reset`, clear that stage's accumulator.
    pub fn drain(&mut self, stage: Stage, reset: bool) -> Option<MetricValue> {
        let Body::Metric { stages, .. } = &mut self.body else {
            return None;
        };
        let accumulator = stages.get_mut(&stage)?;
        let value = accumulator.value();
        if reset {
            accumulator.reset();
        }
        value
    }

    // ── parameters ────────────────────────────────────────────────────────────

    pub fn num_params(&self) -> usize {
        match &self.body {
            Body::Compute(computation) => computation.num_params(),
            Body::Metric { .. } => 0,
        }
    }

    pub fn state(&self, name: &str) -> Result<Option<Vec<u8>>, BrickError> {
        match &self.body {
            Body::Compute(computation) => computation
                .state()
                .map_err(|e| BrickError::state(name, e.to_string())),
            Body::Metric { .. } => Ok(None),
        }
    }

    pub fn load_state(&mut self, name: &str, blob: Vec<u8>, device: &B::Device) -> Result<(), BrickError> {
        match &mut self.body {
            Body::Compute(computation) => computation
                .load_state(blob, device)
                .map_err(|e| BrickError::state(name, e.to_string())),
            Body::Metric { .. } => Err(BrickError::state(name, "metric bricks carry no parameters")),
        }
    }

    /// Hand gradients to the computation; only trainable bricks learn.
    pub fn learn(&mut self, name: &str, grads: &mut dyn Any, lr: f64) -> Result<bool, BrickError> {
        if !self.requires_gradient() {
            return Ok(false);
        }
        match &mut self.body {
            Body::Compute(computation) => computation
                .learn(grads, lr)
                .map_err(|e| BrickError::compute(name, e)),
            Body::Metric { .. } => Ok(false),
        }
    }

    // ── export ────────────────────────────────────────────────────────────────

    pub fn lower(&self, graph: &mut TraceGraph, io: &Lowering<'_>) -> Result<(), BrickError> {
        let unsupported = |reason: String| BrickError::ExportUnsupported {
            unit: io.unit.to_string(),
            reason,
        };
        match &self.body {
            Body::Compute(computation) => computation
                .lower(graph, io)
                .map_err(|e| unsupported(e.to_string())),
            Body::Metric { .. } => Err(unsupported("metric accumulators have no graph form".to_string())),
        }
    }
}

impl<B: Backend> fmt::Debug for Brick<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Brick")
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("alive", &self.alive)
            .finish_non_exhaustive()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::domain::ComputeError;
    use crate::ml::metric::Accuracy;
    use crate::ml::ops::{FnOp, Identity};
    use burn::backend::NdArray;
    use burn::tensor::{Int, Tensor};

    type TB = NdArray;

    fn values() -> NamedValues<TB> {
        let device = Default::default();
        NamedValues::new()
            .with("logits", Tensor::<TB, 2>::from_floats([[0.0, 1.0], [1.0, 0.0]], &device))
            .with("targets", Tensor::<TB, 1, Int>::from_ints([1, 1], &device))
    }

    #[test]
    fn test_missing_input_names_unit_and_key() {
        let mut brick = Brick::<TB>::trainable(Identity, ["absent"], ["out"]);
        let err = brick.invoke("copy", &values(), Stage::Train).unwrap_err();
        match err {
            BrickError::MissingInput { unit, key, stage } => {
                assert_eq!(unit, "copy");
                assert_eq!(key, "absent");
                assert_eq!(stage, Stage::Train);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dead_brick_skips_input_lookup() {
        // Missing input would fail if the brick did any work.
        let mut brick = Brick::<TB>::trainable(Identity, ["absent"], ["out"]).alive(Stage::Train);
        let out = brick.invoke("copy", &values(), Stage::Inference).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_output_arity_is_checked() {
        let mut brick = Brick::<TB>::frozen(Identity, ["logits"], ["a", "b"]);
        let err = brick.invoke("copy", &values(), Stage::Test).unwrap_err();
        assert!(matches!(
            err,
            BrickError::OutputArityMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_read_everything_is_keyword_only() {
        let op = FnOp::new(|inputs: Inputs<TB>| {
            assert!(inputs.is_keyword_only());
            Ok(vec![inputs.named("targets")?.clone()])
        });
        let mut brick = Brick::<TB>::frozen(op, InputSpec::All, ["copy"]);
        let out = brick.invoke("all", &values(), Stage::Inference).unwrap();
        assert_eq!(out.get("copy").unwrap().kind(), "int1");

        let positional = FnOp::new(|inputs: Inputs<TB>| Ok(vec![inputs.arg(0)?.clone()]));
        let mut brick = Brick::<TB>::frozen(positional, InputSpec::All, ["copy"]);
        let err = brick.invoke("all", &values(), Stage::Inference).unwrap_err();
        assert!(matches!(
            err,
            BrickError::Compute { source: ComputeError::KeywordOnly, .. }
        ));
    }

    #[test]
    fn test_metric_keeps_state_per_stage() {
        let mut brick = Brick::<TB>::metric(Accuracy::new(), ["logits", "targets"]);
        let out = brick.invoke("acc", &values(), Stage::Train).unwrap();
        assert!(out.is_empty());
        assert!(brick.has_metric_state(Stage::Train));
        assert!(!brick.has_metric_state(Stage::Validation));
        assert_eq!(brick.drain(Stage::Train, false), Some(MetricValue::Scalar(0.5)));
        assert_eq!(brick.drain(Stage::Validation, false), None);
    }

    #[test]
    fn test_metric_can_forward_batch_values() {
        let mut brick = Brick::<TB>::metric(Accuracy::new(), ["logits", "targets"])
            .forward_outputs(["batch_accuracy"]);
        let out = brick.invoke("acc", &values(), Stage::Validation).unwrap();
        assert_eq!(out.get("batch_accuracy").unwrap().to_f32_vec().unwrap(), vec![0.5]);
    }

    #[test]
    fn test_default_stage_sets() {
        let loss = Brick::<TB>::loss(Identity, ["logits"], ["l"]);
        assert!(!loss.is_alive(Stage::Inference));
        assert!(!loss.is_alive(Stage::Export));
        assert!(loss.is_alive(Stage::Validation));
        assert_eq!(loss.loss_output_names(), ["l".to_string()]);

        let frozen = Brick::<TB>::frozen(Identity, ["logits"], ["l"]);
        assert!(!frozen.requires_gradient());
        assert!(StageSet::all() == frozen.alive_stages());
        assert!(Brick::<TB>::trainable(Identity, ["logits"], ["l"]).requires_gradient());
    }

    #[test]
    fn test_drain_with_reset_clears_stage() {
        let mut brick = Brick::<TB>::metric(Accuracy::new(), ["logits", "targets"]);
        brick.invoke("acc", &values(), Stage::Train).unwrap();
        assert!(brick.drain(Stage::Train, true).is_some());
        assert!(brick.drain(Stage::Train, false).is_none());
    }

    struct CountingResets {
        inner:  Accuracy,
        resets: Rc<Cell<usize>>,
    }

    impl Accumulator<TB> for CountingResets {
        fn update(&mut self, inputs: &Inputs<TB>) -> Result<Vec<Value<TB>>, ComputeError> {
            self.inner.update(inputs)
        }

        fn value(&self) -> Option<MetricValue> {
            Accumulator::<TB>::value(&self.inner)
        }

        fn reset(&mut self) {
            self.resets.set(self.resets.get() + 1);
            Accumulator::<TB>::reset(&mut self.inner);
        }

        fn fresh(&self) -> Box<dyn Accumulator<TB>> {
            Box::new(CountingResets { inner: Accuracy::new(), resets: self.resets.clone() })
        }
    }

    #[test]
    fn test_reset_goes_through_the_accumulator() {
        let resets = Rc::new(Cell::new(0));
        let counting = CountingResets { inner: Accuracy::new(), resets: resets.clone() };
        let mut brick = Brick::<TB>::metric(counting, ["logits", "targets"]);

        brick.invoke("acc", &values(), Stage::Train).unwrap();
        assert_eq!(brick.drain(Stage::Train, true), Some(MetricValue::Scalar(0.5)));
        assert_eq!(resets.get(), 1);

        let device = Default::default();
        let perfect = NamedValues::new()
            .with("logits", Tensor::<TB, 2>::from_floats([[0.0, 1.0], [0.0, 1.0]], &device))
            .with("targets", Tensor::<TB, 1, Int>::from_ints([1, 1], &device));
        brick.invoke("acc", &perfect, Stage::Train).unwrap();
        assert_eq!(brick.drain(Stage::Train, false), Some(MetricValue::Scalar(1.0)));
    }
}
