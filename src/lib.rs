//! Compose burn models out of small, named, stage-gated bricks.
//!
//! A [`Brick`](ml::brick::Brick) wraps one computation behind named inputs
//! and outputs; a [`Collection`](ml::collection::Collection) runs bricks in
//! declaration order over a shared mapping of named tensors, skipping any
//! brick that is not alive in the current [`Stage`](domain::Stage).

#![recursion_limit = "256"]

pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod export;
pub mod infra;
pub mod ml;

pub use domain::{BrickError, ComputeError, Stage, StageSet};
pub use export::{export_onnx, ExportOptions};
pub use ml::brick::{Brick, BrickKind, GradFlow, InputSpec};
pub use ml::collection::{Collection, LossReduction, Node, StepOutput};
pub use ml::value::{Inputs, NamedValues, Value};
