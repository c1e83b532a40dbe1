// ============================================================
// Layer 5 — Collection
// ============================================================
// The executor. An ordered registry of bricks, possibly built
// from nested collections, flattened at construction into
// `outer.inner` qualified names.
//
// One pass:
//   1. seed the named value mapping with the caller's inputs
//      (keys starting with "__" are rejected)
//   2. run every brick in declaration order; bricks that are
//      not alive in the stage are skipped outright
//   3. merge each brick's outputs back, last writer wins
//   4. collect loss outputs on the side
//
// There is no topological sort. A brick declared before the
// brick producing its input fails with MissingInput.
//
// Metric side effects are not rolled back when a later brick
// fails: accumulators keep the batches they already saw.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use burn::tensor::{backend::Backend, Tensor};

use crate::domain::{BrickError, ComputeError, Stage};
use crate::ml::brick::{Brick, InputSpec};
use crate::ml::metric::MetricValue;
use crate::ml::value::{NamedValues, Value};

pub const RESERVED_PREFIX: &str = "__";

// ─── Node ─────────────────────────────────────────────────────────────────────
/// One named entry of a collection.
pub enum Node<B: Backend> {
    Brick(Brick<B>),
    Group(Collection<B>),
}

impl<B: Backend> From<Brick<B>> for Node<B> {
    fn from(brick: Brick<B>) -> Self {
        Node::Brick(brick)
    }
}

impl<B: Backend> From<Collection<B>> for Node<B> {
    fn from(group: Collection<B>) -> Self {
        Node::Group(group)
    }
}

/// How `step` folds loss outputs into the training signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LossReduction {
    #[default]
    Sum,
    Mean,
}

/// Result of one `step`.
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    /// Inputs plus everything produced during the pass.
    pub values: NamedValues<B>,
    /// Loss outputs by key.
    pub losses: NamedValues<B>,
    /// Reduced loss; `None` when no loss brick ran.
    pub loss:   Option<Tensor<B, 1>>,
}

/// One executed brick, as recorded by [`Collection::trace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub unit:    String,
    pub inputs:  Vec<String>,
    pub outputs: Vec<String>,
}

struct Pass<B: Backend> {
    values: NamedValues<B>,
    losses: Vec<(String, String, Value<B>)>,
    steps:  Vec<TraceStep>,
}

// ─── Collection ───────────────────────────────────────────────────────────────
pub struct Collection<B: Backend> {
    entries:   Vec<(String, Brick<B>)>,
    roots:     Vec<String>,
    reduction: LossReduction,
}

impl<B: Backend> Default for Collection<B> {
    fn default() -> Self {
        Self { entries: Vec::new(), roots: Vec::new(), reduction: LossReduction::default() }
    }
}

fn validate_name(name: &str) -> Result<(), BrickError> {
    if name.is_empty() || name.contains('.') {
        return Err(BrickError::InvalidName { name: name.to_string() });
    }
    Ok(())
}

impl<B: Backend> Collection<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Collection::insert`].
    pub fn with(mut self, name: &str, node: impl Into<Node<B>>) -> Result<Self, BrickError> {
        self.insert(name, node)?;
        Ok(self)
    }

    pub fn with_reduction(mut self, reduction: LossReduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn reduction(&self) -> LossReduction {
        self.reduction
    }

    /// Append a brick or a nested collection after every existing entry.
    pub fn insert(&mut self, name: &str, node: impl Into<Node<B>>) -> Result<(), BrickError> {
        validate_name(name)?;
        if self.roots.iter().any(|root| root == name) {
            return Err(BrickError::DuplicateUnitName { name: name.to_string() });
        }
        match node.into() {
            Node::Brick(brick) => self.entries.push((name.to_string(), brick)),
            Node::Group(group) => self.entries.extend(
                group
                    .entries
                    .into_iter()
                    .map(|(inner, brick)| (format!("{name}.{inner}"), brick)),
            ),
        }
        self.roots.push(name.to_string());
        Ok(())
    }

    /// Take a top-level entry out, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Result<Node<B>, BrickError> {
        let position = self
            .roots
            .iter()
            .position(|root| root == name)
            .ok_or_else(|| BrickError::UnknownUnit { name: name.to_string() })?;
        self.roots.remove(position);

        let prefix = format!("{name}.");
        let (mut taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(qualified, _)| qualified == name || qualified.starts_with(&prefix));
        self.entries = kept;

        if taken.len() == 1 && taken[0].0 == name {
            if let Some((_, brick)) = taken.pop() {
                return Ok(Node::Brick(brick));
            }
        }

        let mut group = Collection::new();
        for (qualified, brick) in taken {
            let inner = qualified[prefix.len()..].to_string();
            let root = inner.split('.').next().unwrap_or_default().to_string();
            if !group.roots.contains(&root) {
                group.roots.push(root);
            }
            group.entries.push((inner, brick));
        }
        Ok(Node::Group(group))
    }

    // ── registry ──────────────────────────────────────────────────────────────

    /// Qualified brick names in execution order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn brick(&self, name: &str) -> Option<&Brick<B>> {
        self.entries
            .iter()
            .find(|(qualified, _)| qualified == name)
            .map(|(_, brick)| brick)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_params(&self) -> usize {
        self.entries.iter().map(|(_, brick)| brick.num_params()).sum()
    }

    // ── execution ─────────────────────────────────────────────────────────────

    fn pass(&mut self, inputs: NamedValues<B>, stage: Stage, trace: bool) -> Result<Pass<B>, BrickError> {
        if let Some(key) = inputs.keys().find(|key| key.starts_with(RESERVED_PREFIX)) {
            return Err(BrickError::ReservedKey { key: key.to_string() });
        }

        let mut pass = Pass { values: inputs, losses: Vec::new(), steps: Vec::new() };
        for (name, brick) in self.entries.iter_mut() {
            if !brick.is_alive(stage) {
                tracing::debug!(brick = %name, %stage, "skipped: not alive");
                continue;
            }
            let read = if trace { brick.resolved_inputs(&pass.values) } else { Vec::new() };
            let produced = brick.invoke(name, &pass.values, stage)?;
            tracing::debug!(brick = %name, %stage, outputs = produced.len(), "executed");

            for key in brick.loss_output_names() {
                if let Some(value) = produced.get(key) {
                    pass.losses.push((name.clone(), key.clone(), value.clone()));
                }
            }
            if trace {
                pass.steps.push(TraceStep {
                    unit:    name.clone(),
                    inputs:  read,
                    outputs: if produced.is_empty() { Vec::new() } else { brick.outputs().to_vec() },
                });
            }
            pass.values.extend(produced);
        }
        Ok(pass)
    }

    /// Run every brick alive in `stage` and return the full value mapping.
    pub fn invoke(&mut self, inputs: NamedValues<B>, stage: Stage) -> Result<NamedValues<B>, BrickError> {
        Ok(self.pass(inputs, stage, false)?.values)
    }

    /// Like [`Collection::invoke`], plus the per-key losses and their reduction.
    pub fn step(&mut self, inputs: NamedValues<B>, stage: Stage) -> Result<StepOutput<B>, BrickError> {
        let pass = self.pass(inputs, stage, false)?;

        // Only the last loss written under a key counts, as in `values`.
        let mut losses = NamedValues::new();
        let mut total: Option<Tensor<B, 1>> = None;
        for (unit, key, value) in pass.losses.into_iter().rev() {
            if losses.contains(&key) {
                continue;
            }
            let found = value.kind();
            let reduced = value.clone().sum().ok_or_else(|| {
                BrickError::compute(unit, ComputeError::ValueKind { expected: "float", found })
            })?;
            total = Some(match total {
                Some(sum) => sum + reduced,
                None => reduced,
            });
            losses.insert(key, value);
        }

        let count = losses.len();
        let loss = match self.reduction {
            LossReduction::Sum => total,
            LossReduction::Mean => total.map(|sum| sum.div_scalar(count as f64)),
        };
        Ok(StepOutput { values: pass.values, losses, loss })
    }

    /// Run once and record which bricks executed, with the keys each
    /// read and wrote.
    pub fn trace(
        &mut self,
        inputs: NamedValues<B>,
        stage:  Stage,
    ) -> Result<(NamedValues<B>, Vec<TraceStep>), BrickError> {
        let pass = self.pass(inputs, stage, true)?;
        Ok((pass.values, pass.steps))
    }

    /// Check declared names against declaration order without running
    /// anything. Reports the first brick whose input would be missing.
    pub fn validate<S: AsRef<str>>(
        &self,
        input_keys: impl IntoIterator<Item = S>,
        stage:      Stage,
    ) -> Result<(), BrickError> {
        let mut known = BTreeSet::new();
        for key in input_keys {
            let key = key.as_ref();
            if key.starts_with(RESERVED_PREFIX) {
                return Err(BrickError::ReservedKey { key: key.to_string() });
            }
            known.insert(key.to_string());
        }

        for (name, brick) in self.entries.iter().filter(|(_, brick)| brick.is_alive(stage)) {
            if let InputSpec::Names(names) = brick.inputs() {
                if let Some(missing) = names.iter().find(|key| !known.contains(*key)) {
                    return Err(BrickError::MissingInput {
                        unit: name.clone(),
                        key: missing.clone(),
                        stage,
                    });
                }
            }
            known.extend(brick.outputs().iter().cloned());
        }
        Ok(())
    }

    // ── metrics ───────────────────────────────────────────────────────────────

    /// Drain every metric brick holding state for `stage`.
    ///
    /// Scalars are keyed by the brick's qualified name, multi-valued
    /// metrics by `brick.sub`. With `reset`, that stage's accumulators are
    /// cleared afterwards; nothing is reset when the call fails.
    ///
    /// Names never contain `.` and are unique per level, so two metrics
    /// cannot map to one key; `DuplicateMetricName` guards that invariant.
    pub fn summarize(&mut self, stage: Stage, reset: bool) -> Result<BTreeMap<String, f64>, BrickError> {
        let mut summary = BTreeMap::new();
        let mut record = |key: String, value: f64| match summary.insert(key.clone(), value) {
            Some(_) => Err(BrickError::DuplicateMetricName { name: key }),
            None => Ok(()),
        };

        for (name, brick) in self.entries.iter_mut().filter(|(_, brick)| brick.is_metric()) {
            match brick.drain(stage, false) {
                Some(MetricValue::Scalar(value)) => record(name.clone(), value)?,
                Some(MetricValue::Many(values)) => {
                    for (sub, value) in values {
                        record(format!("{name}.{sub}"), value)?;
                    }
                }
                None => {}
            }
        }

        if reset {
            for (_, brick) in self.entries.iter_mut() {
                brick.drain(stage, true);
            }
        }
        Ok(summary)
    }

    // ── parameters ────────────────────────────────────────────────────────────

    /// Opaque state of every brick that has some, keyed by qualified name.
    pub fn state_dict(&self) -> Result<BTreeMap<String, Vec<u8>>, BrickError> {
        let mut dict = BTreeMap::new();
        for (name, brick) in &self.entries {
            if let Some(blob) = brick.state(name)? {
                dict.insert(name.clone(), blob);
            }
        }
        Ok(dict)
    }

    /// Restore a [`Collection::state_dict`]. Every brick with parameters
    /// must have an entry and every entry must name a brick.
    pub fn load_state_dict(
        &mut self,
        mut dict: BTreeMap<String, Vec<u8>>,
        device:   &B::Device,
    ) -> Result<(), BrickError> {
        for (name, brick) in self.entries.iter_mut() {
            match dict.remove(name.as_str()) {
                Some(blob) => brick.load_state(name, blob, device)?,
                None if brick.num_params() > 0 => {
                    return Err(BrickError::state(name.as_str(), "no entry in state dict"));
                }
                None => {}
            }
        }
        match dict.into_keys().next() {
            Some(unknown) => Err(BrickError::state(unknown, "state dict entry names no brick")),
            None => Ok(()),
        }
    }

    /// Forward the gradients of one backward pass to every trainable brick.
    /// Returns how many bricks were updated.
    pub fn learn(&mut self, grads: &mut dyn Any, lr: f64) -> Result<usize, BrickError> {
        let mut updated = 0;
        for (name, brick) in self.entries.iter_mut() {
            if brick.learn(name, grads, lr)? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

impl<B: Backend> fmt::Debug for Collection<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, brick)| (name, brick)))
            .finish()
    }
}
