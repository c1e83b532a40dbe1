// ============================================================
// Layer 5 — Computation Contract
// ============================================================
// The opaque unit of work a brick wraps.
//
// A computation only has to implement `forward`. Everything
// else is optional capability with a safe default:
//
//   freeze      — exclude own parameters from gradients
//   num_params  — parameter count for summaries
//   state /
//   load_state  — opaque blob for checkpoints
//   learn       — apply one backward pass worth of gradients
//   lower       — emit trace-graph nodes for export
//
// Module-backed computations record their state with burn's
// BinBytesRecorder and learn through a boxed `Learner` that
// owns a burn optimizer.

use std::any::Any;

use burn::{
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};

use crate::domain::ComputeError;
use crate::ml::trace::{Lowering, TraceGraph};
use crate::ml::value::{Inputs, Value};

pub trait Computation<B: Backend> {
    /// Produce one value per declared output, in declaration order.
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError>;

    fn freeze(&mut self) {}

    fn num_params(&self) -> usize {
        0
    }

    /// `None` when the computation has nothing to persist.
    fn state(&self) -> Result<Option<Vec<u8>>, ComputeError> {
        Ok(None)
    }

    fn load_state(&mut self, _blob: Vec<u8>, _device: &B::Device) -> Result<(), ComputeError> {
        Err(ComputeError::Record("computation has no state to load".to_string()))
    }

    /// `grads` is the `B::Gradients` of an autodiff backend, type-erased so
    /// this trait stays usable on plain backends. Returns whether anything
    /// was updated.
    fn learn(&mut self, _grads: &mut dyn Any, _lr: f64) -> Result<bool, ComputeError> {
        Ok(false)
    }

    fn lower(&self, _graph: &mut TraceGraph, _io: &Lowering<'_>) -> Result<(), ComputeError> {
        Err(ComputeError::Other("computation has no graph lowering".to_string()))
    }
}

impl<B: Backend> Computation<B> for Box<dyn Computation<B>> {
    fn forward(&self, inputs: Inputs<B>) -> Result<Vec<Value<B>>, ComputeError> {
        (**self).forward(inputs)
    }

    fn freeze(&mut self) {
        (**self).freeze()
    }

    fn num_params(&self) -> usize {
        (**self).num_params()
    }

    fn state(&self) -> Result<Option<Vec<u8>>, ComputeError> {
        (**self).state()
    }

    fn load_state(&mut self, blob: Vec<u8>, device: &B::Device) -> Result<(), ComputeError> {
        (**self).load_state(blob, device)
    }

    fn learn(&mut self, grads: &mut dyn Any, lr: f64) -> Result<bool, ComputeError> {
        (**self).learn(grads, lr)
    }

    fn lower(&self, graph: &mut TraceGraph, io: &Lowering<'_>) -> Result<(), ComputeError> {
        (**self).lower(graph, io)
    }
}

// ─── Learner ──────────────────────────────────────────────────────────────────
/// Optimizer step for one module type: takes the module, the erased
/// gradients and the learning rate, returns the updated module.
pub type Learner<M> = Box<dyn FnMut(M, &mut dyn Any, f64) -> Result<M, ComputeError>>;

/// Wrap a burn optimizer so a type-erased computation can drive it.
pub fn learner<B, M, O>(mut optim: O) -> Learner<M>
where
    B: AutodiffBackend,
    B::Gradients: 'static,
    M: AutodiffModule<B> + 'static,
    O: Optimizer<M, B> + 'static,
{
    Box::new(move |module: M, grads: &mut dyn Any, lr: f64| {
        let grads = grads
            .downcast_mut::<B::Gradients>()
            .ok_or(ComputeError::ForeignGradients)?;
        let params = GradientsParams::from_module::<B, M>(grads, &module);
        Ok(optim.step(lr, module, params))
    })
}

// ─── Module records ───────────────────────────────────────────────────────────
pub(crate) fn save_module<B: Backend, M: Module<B>>(module: &M) -> Result<Vec<u8>, ComputeError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    Recorder::<B>::record(&recorder, module.clone().into_record(), ())
        .map_err(|e| ComputeError::Record(format!("{e:?}")))
}

pub(crate) fn load_module<B: Backend, M: Module<B>>(
    module: M,
    blob:   Vec<u8>,
    device: &B::Device,
) -> Result<M, ComputeError> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = Recorder::<B>::load(&recorder, blob, device)
        .map_err(|e| ComputeError::Record(format!("{e:?}")))?;
    Ok(module.load_record(record))
}
