// ============================================================
// Layer 3 — Stage
// ============================================================
// The execution context passed into every invocation.
// A stage is the only switch deciding which bricks run and
// whether trainable bricks keep an autodiff graph.
//
// The set is closed: anything coming from text (CLI flags,
// config files) goes through `FromStr`, so a typo is an
// error instead of a silent no-op.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::BrickError;

/// Execution context of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Train,
    Validation,
    Test,
    Inference,
    Export,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Train,
        Stage::Validation,
        Stage::Test,
        Stage::Inference,
        Stage::Export,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Train      => "train",
            Stage::Validation => "validation",
            Stage::Test       => "test",
            Stage::Inference  => "inference",
            Stage::Export     => "export",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = BrickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train"                       => Ok(Stage::Train),
            "validation" | "valid" | "val" => Ok(Stage::Validation),
            "test"                        => Ok(Stage::Test),
            "inference" | "infer"         => Ok(Stage::Inference),
            "export"                      => Ok(Stage::Export),
            _ => Err(BrickError::StageNotRecognized { value: s.to_string() }),
        }
    }
}

// ─── StageSet ─────────────────────────────────────────────────────────────────
/// The stages in which a brick is alive.
///
/// Stored as a bitmask over [`Stage`]; `StageSet::all()` is the
/// "every stage" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageSet(u8);

impl StageSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b1_1111)
    }

    /// Train, validation and test: the default for losses and metrics.
    pub fn evaluation() -> Self {
        Self::of([Stage::Train, Stage::Validation, Stage::Test])
    }

    pub fn of(stages: impl IntoIterator<Item = Stage>) -> Self {
        stages
            .into_iter()
            .fold(Self::empty(), |set, stage| Self(set.0 | stage.bit()))
    }

    pub fn contains(self, stage: Stage) -> bool {
        self.0 & stage.bit() != 0
    }

    pub fn is_all(self) -> bool {
        self == Self::all()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn with(self, stage: Stage) -> Self {
        Self(self.0 | stage.bit())
    }

    pub fn without(self, stage: Stage) -> Self {
        Self(self.0 & !stage.bit())
    }

    pub fn iter(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl From<Stage> for StageSet {
    fn from(stage: Stage) -> Self {
        Self::of([stage])
    }
}

impl<const N: usize> From<[Stage; N]> for StageSet {
    fn from(stages: [Stage; N]) -> Self {
        Self::of(stages)
    }
}

impl fmt::Debug for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("StageSet(all)");
        }
        f.debug_set().entries(self.iter()).finish()
    }
}
