// ============================================================
// Layer 5 — Ready-made Computations
// ============================================================
// Computations that cover the common bricks of a model:
//
//   FnOp       — stateless closure, optionally lowered to one
//                ONNX node (flatten / relu / softmax helpers)
//   Identity   — pass inputs through unchanged
//   Scale      — multiply by a constant
//   ModuleOp   — any burn Module plus a forward closure
//   Dense      — burn Linear with an optional ReLU, exportable
//   CrossEntropy / MeanSquaredError — loss computations
//
// Anything else can implement `Computation` directly.

use std::any::Any;
use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, Module},
    nn::{
        loss::{CrossEntropyLossConfig, MseLoss, Reduction},
        Linear, LinearConfig,
    },
    optim::Optimizer,
    tensor::{
        activation,
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
};

use crate::domain::ComputeError;
use crate::ml::computation::{learner, load_module, save_module, Computation, Learner};
use crate::ml::trace::{Attribute, Lowering, TraceGraph};
use crate::ml::value::{Inputs, Value};

fn kind_error<B: Backend>(expected: &'static str, found: &Value<B>) -> ComputeError {
    ComputeError::ValueKind { expected, found: found.kind() }
}

// ─── FnOp ─────────────────────────────────────────────────────────────────────
struct Lowered {
    op_type:    String,
    attributes: Vec<Attribute>,
}

/// Stateless closure computation.
pub struct FnOp<F> {
    f:        F,
    lowering: Option<Lowered>,
}

impl<F> FnOp<F> {
    pub fn new<B>(f: F) -> Self
    where
        B: Backend,
        F: Fn(Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>,
    {
        Self { f, lowering: None }
    }

    /// Export as a single `op_type` node from the brick's inputs to its outputs.
    pub fn lowered_as(mut self, op_type: &str) -> Self {
        self.lowering = Some(Lowered { op_type: op_type.to_string(), attributes: Vec::new() });
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        if let Some(lowered) = self.lowering.as_mut() {
            lowered.attributes.push(attribute);
        }
        self
    }
}

impl<B, F> Computation<B> for FnOp<F>
where
    B: Backend,
    F: Fn(Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>,
{
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        (self.f)(inputs)
    }

    fn lower(&self, graph: &mut TraceGraph, io: &Lowering<'_>) -> Result<(), ComputeError> {
        let lowered = self
            .lowering
            .as_ref()
            .ok_or_else(|| ComputeError::Other("closure has no graph lowering".to_string()))?;
        let node = graph
            .node(&lowered.op_type, io.inputs.to_vec(), io.outputs.to_vec())
            .named(io.unit);
        for attribute in &lowered.attributes {
            node.attr(attribute.clone());
        }
        Ok(())
    }
}

/// `[batch, ...]` to `[batch, features]`.
pub fn flatten<B: Backend>() -> FnOp<impl Fn(Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>> {
    FnOp::new(|inputs: Inputs<B>| {
        let flat: Value<B> = match inputs.arg(0)?.clone() {
            Value::Float2(t) => t.into(),
            Value::Float3(t) => t.flatten::<2>(1, 2).into(),
            Value::Float4(t) => t.flatten::<2>(1, 3).into(),
            other => return Err(kind_error("float2, float3 or float4", &other)),
        };
        Ok(vec![flat])
    })
    .lowered_as("Flatten")
    .with_attribute(Attribute::Int("axis".into(), 1))
}

pub fn relu<B: Backend>() -> FnOp<impl Fn(Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>> {
    FnOp::new(|inputs: Inputs<B>| Ok(vec![relu_value(inputs.arg(0)?.clone())?])).lowered_as("Relu")
}

/// Softmax over the last axis.
pub fn softmax<B: Backend>() -> FnOp<impl Fn(Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>> {
    FnOp::new(|inputs: Inputs<B>| {
        let probs: Value<B> = match inputs.arg(0)?.clone() {
            Value::Float1(t) => activation::softmax(t, 0).into(),
            Value::Float2(t) => activation::softmax(t, 1).into(),
            Value::Float3(t) => activation::softmax(t, 2).into(),
            Value::Float4(t) => activation::softmax(t, 3).into(),
            other => return Err(kind_error("float", &other)),
        };
        Ok(vec![probs])
    })
    .lowered_as("Softmax")
    .with_attribute(Attribute::Int("axis".into(), -1))
}

fn relu_value<B: Backend>(value: Value<B>) -> Result<Value<B>, ComputeError> {
    Ok(match value {
        Value::Float1(t) => activation::relu(t).into(),
        Value::Float2(t) => activation::relu(t).into(),
        Value::Float3(t) => activation::relu(t).into(),
        Value::Float4(t) => activation::relu(t).into(),
        other => return Err(kind_error("float", &other)),
    })
}

// ─── Identity ─────────────────────────────────────────────────────────────────
/// Returns its inputs unchanged, one output per input.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<B: Backend> Computation<B> for Identity {
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        Ok(inputs.values().cloned().collect())
    }

    fn lower(&self, graph: &mut TraceGraph, io: &Lowering<'_>) -> Result<(), ComputeError> {
        for (input, output) in io.inputs.iter().zip(io.outputs) {
            graph.node("Identity", vec![input.clone()], vec![output.clone()]);
        }
        Ok(())
    }
}

// ─── Scale ────────────────────────────────────────────────────────────────────
/// Multiplies a float input by a constant factor.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub factor: f32,
}

impl Scale {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl<B: Backend> Computation<B> for Scale {
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        let f = self.factor;
        let scaled: Value<B> = match inputs.arg(0)?.clone() {
            Value::Float1(t) => t.mul_scalar(f).into(),
            Value::Float2(t) => t.mul_scalar(f).into(),
            Value::Float3(t) => t.mul_scalar(f).into(),
            Value::Float4(t) => t.mul_scalar(f).into(),
            other => return Err(kind_error("float", &other)),
        };
        Ok(vec![scaled])
    }

    fn lower(&self, graph: &mut TraceGraph, io: &Lowering<'_>) -> Result<(), ComputeError> {
        let factor = graph.initializer(format!("{}.factor", io.unit), Vec::new(), vec![self.factor]);
        graph
            .node("Mul", vec![io.inputs[0].clone(), factor], io.outputs.to_vec())
            .named(io.unit);
        Ok(())
    }
}

// ─── ModuleOp ─────────────────────────────────────────────────────────────────
type LowerFn<M> = Box<dyn Fn(&M, &mut TraceGraph, &Lowering<'_>) -> Result<(), ComputeError>>;

/// Any burn [`Module`] driven by a forward closure.
///
/// Parameters are persisted with burn's recorder; attach an optimizer
/// with [`ModuleOp::with_optimizer`] to make the brick learnable and a
/// lowering with [`ModuleOp::with_lowering`] to make it exportable.
pub struct ModuleOp<B: Backend, M: Module<B>, F> {
    module:   M,
    forward:  F,
    learner:  Option<Learner<M>>,
    lowering: Option<LowerFn<M>>,
    _backend: PhantomData<B>,
}

impl<B, M, F> ModuleOp<B, M, F>
where
    B: Backend,
    M: Module<B>,
    F: Fn(&M, Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>,
{
    pub fn new(module: M, forward: F) -> Self {
        Self { module, forward, learner: None, lowering: None, _backend: PhantomData }
    }

    pub fn with_lowering(
        mut self,
        lower: impl Fn(&M, &mut TraceGraph, &Lowering<'_>) -> Result<(), ComputeError> + 'static,
    ) -> Self {
        self.lowering = Some(Box::new(lower));
        self
    }

    pub fn module(&self) -> &M {
        &self.module
    }
}

impl<B, M, F> ModuleOp<B, M, F>
where
    B: AutodiffBackend,
    B::Gradients: 'static,
    M: AutodiffModule<B> + 'static,
{
    pub fn with_optimizer<O: Optimizer<M, B> + 'static>(mut self, optim: O) -> Self {
        self.learner = Some(learner::<B, M, O>(optim));
        self
    }
}

impl<B, M, F> Computation<B> for ModuleOp<B, M, F>
where
    B: Backend,
    M: Module<B>,
    F: Fn(&M, Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>,
{
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        (self.forward)(&self.module, inputs)
    }

    fn freeze(&mut self) {
        self.module = self.module.clone().no_grad();
    }

    fn num_params(&self) -> usize {
        self.module.num_params()
    }

    fn state(&self) -> Result<Option<Vec<u8>>, ComputeError> {
        save_module::<B, M>(&self.module).map(Some)
    }

    fn load_state(&mut self, blob: Vec<u8>, device: &B::Device) -> Result<(), ComputeError> {
        self.module = load_module::<B, M>(self.module.clone(), blob, device)?;
        Ok(())
    }

    fn learn(&mut self, grads: &mut dyn Any, lr: f64) -> Result<bool, ComputeError> {
        let Some(learner) = self.learner.as_mut() else {
            return Ok(false);
        };
        self.module = learner(self.module.clone(), grads, lr)?;
        Ok(true)
    }

    fn lower(&self, graph: &mut TraceGraph, io: &Lowering<'_>) -> Result<(), ComputeError> {
        match &self.lowering {
            Some(lower) => lower(&self.module, graph, io),
            None => Err(ComputeError::Other("module has no graph lowering".to_string())),
        }
    }
}

// ─── Dense ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    None,
    Relu,
}

/// Fully connected layer: `activation(x · W + b)`.
pub struct Dense<B: Backend> {
    linear:     Linear<B>,
    activation: Activation,
    learner:    Option<Learner<Linear<B>>>,
}

impl<B: Backend> Dense<B> {
    pub fn new(linear: Linear<B>, activation: Activation) -> Self {
        Self { linear, activation, learner: None }
    }

    pub fn init(d_input: usize, d_output: usize, activation: Activation, device: &B::Device) -> Self {
        Self::new(LinearConfig::new(d_input, d_output).init(device), activation)
    }

    pub fn linear(&self) -> &Linear<B> {
        &self.linear
    }
}

impl<B: AutodiffBackend> Dense<B>
where
    B::Gradients: 'static,
{
    pub fn with_optimizer<O: Optimizer<Linear<B>, B> + 'static>(mut self, optim: O) -> Self {
        self.learner = Some(learner::<B, Linear<B>, O>(optim));
        self
    }
}

impl<B: Backend> Computation<B> for Dense<B> {
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        let out: Value<B> = match inputs.arg(0)?.clone() {
            Value::Float2(t) => self.linear.forward(t).into(),
            Value::Float3(t) => self.linear.forward(t).into(),
            other => return Err(kind_error("float2 or float3", &other)),
        };
        let out = match self.activation {
            Activation::None => out,
            Activation::Relu => relu_value(out)?,
        };
        Ok(vec![out])
    }

    fn freeze(&mut self) {
        self.linear = self.linear.clone().no_grad();
    }

    fn num_params(&self) -> usize {
        self.linear.num_params()
    }

    fn state(&self) -> Result<Option<Vec<u8>>, ComputeError> {
        save_module::<B, Linear<B>>(&self.linear).map(Some)
    }

    fn load_state(&mut self, blob: Vec<u8>, device: &B::Device) -> Result<(), ComputeError> {
        self.linear = load_module::<B, Linear<B>>(self.linear.clone(), blob, device)?;
        Ok(())
    }

    fn learn(&mut self, grads: &mut dyn Any, lr: f64) -> Result<bool, ComputeError> {
        let Some(learner) = self.learner.as_mut() else {
            return Ok(false);
        };
        self.linear = learner(self.linear.clone(), grads, lr)?;
        Ok(true)
    }

    fn lower(&self, graph: &mut TraceGraph, io: &Lowering<'_>) -> Result<(), ComputeError> {
        let weight = self.linear.weight.val();
        let dims = weight.dims().to_vec();
        let data = weight
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ComputeError::Data(format!("{e:?}")))?;
        let weight = graph.initializer(format!("{}.weight", io.unit), dims, data);

        let output = io.outputs[0].clone();
        let has_bias = self.linear.bias.is_some();
        let relu = self.activation == Activation::Relu;

        let product = if has_bias || relu { graph.fresh(io.unit) } else { output.clone() };
        graph.node("MatMul", vec![io.inputs[0].clone(), weight], vec![product.clone()]);

        let mut current = product;
        if let Some(bias) = &self.linear.bias {
            let bias = bias.val();
            let dims = bias.dims().to_vec();
            let data = bias
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| ComputeError::Data(format!("{e:?}")))?;
            let bias = graph.initializer(format!("{}.bias", io.unit), dims, data);
            let summed = if relu { graph.fresh(io.unit) } else { output.clone() };
            graph.node("Add", vec![current, bias], vec![summed.clone()]);
            current = summed;
        }
        if relu {
            graph.node("Relu", vec![current], vec![output]);
        }
        Ok(())
    }
}

// ─── Losses ───────────────────────────────────────────────────────────────────
/// Cross entropy between logits `[batch, classes]` and class targets `[batch]`.
#[derive(Debug, Clone)]
pub struct CrossEntropy {
    config: CrossEntropyLossConfig,
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self { config: CrossEntropyLossConfig::new() }
    }
}

impl CrossEntropy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_smoothing(mut self, alpha: f32) -> Self {
        self.config = self.config.with_smoothing(Some(alpha));
        self
    }
}

impl<B: Backend> Computation<B> for CrossEntropy {
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        let logits: Tensor<B, 2> = inputs.get(0)?;
        let targets: Tensor<B, 1, Int> = inputs.get(1)?;
        if logits.dims()[0] != targets.dims()[0] {
            return Err(ComputeError::Shape(format!(
                "{} logit rows but {} targets",
                logits.dims()[0],
                targets.dims()[0]
            )));
        }
        let loss = self.config.init(&logits.device()).forward(logits, targets);
        Ok(vec![loss.into()])
    }
}

/// Mean squared error between two float values of the same rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl<B: Backend> Computation<B> for MeanSquaredError {
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        let mse = MseLoss::new();
        let prediction = inputs.arg(0)?.clone();
        let target = inputs.arg(1)?.clone();
        if prediction.dims() != target.dims() {
            return Err(ComputeError::Shape(format!(
                "prediction {:?} vs target {:?}",
                prediction.dims(),
                target.dims()
            )));
        }
        let loss = match (prediction, target) {
            (Value::Float1(p), Value::Float1(t)) => mse.forward(p, t, Reduction::Mean),
            (Value::Float2(p), Value::Float2(t)) => mse.forward(p, t, Reduction::Mean),
            (Value::Float3(p), Value::Float3(t)) => mse.forward(p, t, Reduction::Mean),
            (Value::Float4(p), Value::Float4(t)) => mse.forward(p, t, Reduction::Mean),
            (p, _) => return Err(kind_error("matching float values", &p)),
        };
        Ok(vec![loss.into()])
    }
}
