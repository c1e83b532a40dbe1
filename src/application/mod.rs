// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor code, no printing.
// Each use case wires data, ml and infra together for one
// command.

// Generate data, train the demo classifier, checkpoint it
pub mod train_use_case;

// Restore the latest checkpoint and write it out as ONNX
pub mod export_use_case;
