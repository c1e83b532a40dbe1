// ============================================================
// Layer 5 — ML / Brick Engine (Burn)
// ============================================================
// Everything that touches burn tensors lives here.
//
//   value.rs       — Value / NamedValues / Inputs
//   computation.rs — the opaque Computation contract
//   metric.rs      — per-stage metric accumulators
//   ops.rs         — ready-made computations and losses
//   trace.rs       — backend-neutral graph for export
//   brick.rs       — Brick: one computation behind a named,
//                    stage-gated contract
//   collection.rs  — Collection: ordered data-flow executor
//   trainer.rs     — epoch loop over Collection::step
//   model.rs       — demo classifier built from bricks

pub mod brick;
pub mod collection;
pub mod computation;
pub mod metric;
pub mod model;
pub mod ops;
pub mod trace;
pub mod trainer;
pub mod value;

/// Backend the demo pipeline runs on without gradients.
#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray;
#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu;

/// Backend the demo pipeline trains on.
pub type TrainingBackend = burn::backend::Autodiff<InferenceBackend>;
