// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Feeds the demo classifier:
//
//   BlobDataset    → seeded synthetic images (burn Dataset)
//       │
//       ▼
//   split_train_val → seeded shuffle + split
//       │
//       ▼
//   ImageBatcher   → NamedValues { images, labels } per batch

/// Synthetic labelled images implementing burn's Dataset trait
pub mod dataset;

/// Stacks samples into named tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
