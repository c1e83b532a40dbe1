// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer:
//
//   stage.rs — the closed Stage enum and the StageSet a brick
//              is alive in
//   error.rs — BrickError / ComputeError
//
// No burn types live here; everything tensor-shaped is in
// the ml layer.

pub mod error;
pub mod stage;

pub use error::{BrickError, ComputeError};
pub use stage::{Stage, StageSet};
