// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File-system concerns shared by the use cases:
//
//   checkpoint.rs — per-brick state dict blobs, manifest and
//                   run configuration on disk
//   metrics.rs    — epoch losses / metric summaries as CSV

/// Collection checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
