// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the brick engine can report.
//
//   BrickError   — raised by bricks, collections and export.
//                  Always carries the brick name (and key or
//                  stage where relevant) so a failure can be
//                  diagnosed without re-running.
//   ComputeError — raised by the opaque computations a brick
//                  wraps. A brick turns it into
//                  BrickError::Compute with its own name.
//
// Nothing here is retried or recovered: every error aborts
// the current invoke / step / summarize call.

use thiserror::Error;

use crate::domain::stage::Stage;

#[derive(Debug, Error)]
pub enum BrickError {
    #[error("brick '{unit}' needs input '{key}' which is not available at stage {stage}")]
    MissingInput {
        unit:  String,
        key:   String,
        stage: Stage,
    },

    #[error("brick '{unit}' declares {expected} output(s) but its computation returned {actual}")]
    OutputArityMismatch {
        unit:     String,
        expected: usize,
        actual:   usize,
    },

    #[error("a brick or collection named '{name}' already exists at this level")]
    DuplicateUnitName { name: String },

    #[error("metric name '{name}' is reported by more than one brick")]
    DuplicateMetricName { name: String },

    #[error("invalid brick name '{name}': names must be non-empty and must not contain '.'")]
    InvalidName { name: String },

    #[error("no brick or collection named '{name}'")]
    UnknownUnit { name: String },

    #[error("input key '{key}' uses the reserved '__' prefix")]
    ReservedKey { key: String },

    #[error("brick '{unit}' cannot be exported: {reason}")]
    ExportUnsupported { unit: String, reason: String },

    #[error("'{value}' is not a stage (expected train, validation, test, inference or export)")]
    StageNotRecognized { value: String },

    #[error("brick '{unit}' failed")]
    Compute {
        unit: String,
        #[source]
        source: ComputeError,
    },

    #[error("state of brick '{unit}': {message}")]
    State { unit: String, message: String },

    #[error("failed to encode export artifact: {0}")]
    Encode(String),
}

impl BrickError {
    pub fn compute(unit: impl Into<String>, source: ComputeError) -> Self {
        BrickError::Compute { unit: unit.into(), source }
    }

    pub fn state(unit: impl Into<String>, message: impl Into<String>) -> Self {
        BrickError::State { unit: unit.into(), message: message.into() }
    }

    /// Name of the brick the error is attributed to, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            BrickError::MissingInput { unit, .. }
            | BrickError::OutputArityMismatch { unit, .. }
            | BrickError::ExportUnsupported { unit, .. }
            | BrickError::Compute { unit, .. }
            | BrickError::State { unit, .. } => Some(unit),
            _ => None,
        }
    }
}

/// Failure inside an opaque computation or accumulator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComputeError {
    #[error("expected a {expected} value, found {found}")]
    ValueKind {
        expected: &'static str,
        found:    &'static str,
    },

    #[error("no positional argument {index} ({available} given)")]
    MissingArgument { index: usize, available: usize },

    #[error("no argument named '{name}'")]
    MissingNamedArgument { name: String },

    #[error("inputs are keyword-only when a brick reads every available value")]
    KeywordOnly,

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("cannot read tensor data: {0}")]
    Data(String),

    #[error("record error: {0}")]
    Record(String),

    #[error("gradients do not belong to this backend")]
    ForeignGradients,

    #[error("{0}")]
    Other(String),
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_missing_input_message_names_unit_key_and_stage() {
        let err = BrickError::MissingInput {
            unit:  "head".into(),
            key:   "features".into(),
            stage: Stage::Train,
        };
        let msg = err.to_string();
        assert!(msg.contains("'head'"));
        assert!(msg.contains("'features'"));
        assert!(msg.contains("train"));
        assert_eq!(err.unit(), Some("head"));
    }

    #[test]
    fn test_compute_error_is_exposed_as_source() {
        let err = BrickError::compute("loss", ComputeError::KeywordOnly);
        let source = err.source().expect("compute errors carry a source");
        assert!(source.to_string().contains("keyword-only"));
    }
}
