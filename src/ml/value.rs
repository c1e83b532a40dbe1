// ============================================================
// Layer 5 — Named Values
// ============================================================
// The currency bricks trade in.
//
//   Value<B>       — one burn tensor, tagged with its rank and
//                    kind (float 1-4 or int 1-2) so tensors of
//                    different ranks share one mapping.
//   NamedValues<B> — the named value mapping of one invocation.
//                    BTreeMap-backed: iteration order is the
//                    key order, never the insertion order.
//   Inputs<B>      — what a single computation receives:
//                    positional (declared input order) or
//                    keyword-only (read-everything bricks).

use std::collections::BTreeMap;

use burn::tensor::{backend::Backend, Int, Tensor};

use crate::domain::ComputeError;

// ─── Value ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub enum Value<B: Backend> {
    Float1(Tensor<B, 1>),
    Float2(Tensor<B, 2>),
    Float3(Tensor<B, 3>),
    Float4(Tensor<B, 4>),
    Int1(Tensor<B, 1, Int>),
    Int2(Tensor<B, 2, Int>),
}

impl<B: Backend> Value<B> {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Float1(_) => "float1",
            Value::Float2(_) => "float2",
            Value::Float3(_) => "float3",
            Value::Float4(_) => "float4",
            Value::Int1(_)   => "int1",
            Value::Int2(_)   => "int2",
        }
    }

    pub fn is_float(&self) -> bool {
        !matches!(self, Value::Int1(_) | Value::Int2(_))
    }

    pub fn rank(&self) -> usize {
        match self {
            Value::Float1(_) | Value::Int1(_) => 1,
            Value::Float2(_) | Value::Int2(_) => 2,
            Value::Float3(_) => 3,
            Value::Float4(_) => 4,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            Value::Float1(t) => t.dims().to_vec(),
            Value::Float2(t) => t.dims().to_vec(),
            Value::Float3(t) => t.dims().to_vec(),
            Value::Float4(t) => t.dims().to_vec(),
            Value::Int1(t)   => t.dims().to_vec(),
            Value::Int2(t)   => t.dims().to_vec(),
        }
    }

    pub fn device(&self) -> B::Device {
        match self {
            Value::Float1(t) => t.device(),
            Value::Float2(t) => t.device(),
            Value::Float3(t) => t.device(),
            Value::Float4(t) => t.device(),
            Value::Int1(t)   => t.device(),
            Value::Int2(t)   => t.device(),
        }
    }

    /// Cut the value out of the autodiff graph.
    /// Int tensors never carry gradients and are returned as is.
    pub fn detach(self) -> Self {
        match self {
            Value::Float1(t) => Value::Float1(t.detach()),
            Value::Float2(t) => Value::Float2(t.detach()),
            Value::Float3(t) => Value::Float3(t.detach()),
            Value::Float4(t) => Value::Float4(t.detach()),
            int => int,
        }
    }

    /// Sum of all elements as a `[1]` tensor; `None` for int values.
    pub fn sum(self) -> Option<Tensor<B, 1>> {
        match self {
            Value::Float1(t) => Some(t.sum()),
            Value::Float2(t) => Some(t.sum()),
            Value::Float3(t) => Some(t.sum()),
            Value::Float4(t) => Some(t.sum()),
            _ => None,
        }
    }

    /// Row-major copy of the elements, converted to f32.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, ComputeError> {
        let data = match self.clone() {
            Value::Float1(t) => t.into_data(),
            Value::Float2(t) => t.into_data(),
            Value::Float3(t) => t.into_data(),
            Value::Float4(t) => t.into_data(),
            Value::Int1(t)   => t.float().into_data(),
            Value::Int2(t)   => t.float().into_data(),
        };
        data.to_vec::<f32>()
            .map_err(|e| ComputeError::Data(format!("{e:?}")))
    }
}

/// Typed extraction of a burn tensor out of a [`Value`].
pub trait FromValue<B: Backend>: Sized {
    const KIND: &'static str;

    fn from_value(value: Value<B>) -> Result<Self, ComputeError>;
}

macro_rules! value_conversions {
    ($($variant:ident => $ty:ty, $kind:literal;)*) => {$(
        impl<B: Backend> From<$ty> for Value<B> {
            fn from(tensor: $ty) -> Self {
                Value::$variant(tensor)
            }
        }

        impl<B: Backend> FromValue<B> for $ty {
            const KIND: &'static str = $kind;

            fn from_value(value: Value<B>) -> Result<Self, ComputeError> {
                match value {
                    Value::$variant(tensor) => Ok(tensor),
                    other => Err(ComputeError::ValueKind {
                        expected: $kind,
                        found:    other.kind(),
                    }),
                }
            }
        }
    )*};
}

value_conversions! {
    Float1 => Tensor<B, 1>, "float1";
    Float2 => Tensor<B, 2>, "float2";
    Float3 => Tensor<B, 3>, "float3";
    Float4 => Tensor<B, 4>, "float4";
    Int1   => Tensor<B, 1, Int>, "int1";
    Int2   => Tensor<B, 2, Int>, "int2";
}

// ─── NamedValues ──────────────────────────────────────────────────────────────
/// Mapping from key to [`Value`] shared by all bricks of one invocation.
#[derive(Debug, Clone)]
pub struct NamedValues<B: Backend> {
    values: BTreeMap<String, Value<B>>,
}

impl<B: Backend> Default for NamedValues<B> {
    fn default() -> Self {
        Self { values: BTreeMap::new() }
    }
}

impl<B: Backend> NamedValues<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for seeding caller inputs:
    ///
    /// ```ignore
    /// let inputs = NamedValues::new().with("raw", images).with("labels", labels);
    /// ```
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value<B>>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite; returns the previous value of `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value<B>>) -> Option<Value<B>> {
        self.values.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value<B>> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value<B>> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value<B>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into `self`, `other` winning on key collisions.
    pub fn extend(&mut self, other: NamedValues<B>) {
        self.values.extend(other.values);
    }

    /// Typed copy of the tensor stored under `key`.
    pub fn tensor<T: FromValue<B>>(&self, key: &str) -> Result<T, ComputeError> {
        let value = self
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| ComputeError::MissingNamedArgument { name: key.to_string() })?;
        T::from_value(value)
    }
}

impl<B: Backend> IntoIterator for NamedValues<B> {
    type Item = (String, Value<B>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value<B>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<B: Backend> FromIterator<(String, Value<B>)> for NamedValues<B> {
    fn from_iter<I: IntoIterator<Item = (String, Value<B>)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

// ─── Inputs ───────────────────────────────────────────────────────────────────
/// Arguments handed to one computation.
///
/// Positional access follows the brick's declared input order.
/// A brick that reads every available value hands its computation
/// keyword-only inputs: positional access then fails with
/// [`ComputeError::KeywordOnly`], since key order carries no meaning.
#[derive(Debug, Clone)]
pub struct Inputs<B: Backend> {
    entries:      Vec<(String, Value<B>)>,
    keyword_only: bool,
}

impl<B: Backend> Inputs<B> {
    pub fn positional(entries: Vec<(String, Value<B>)>) -> Self {
        Self { entries, keyword_only: false }
    }

    pub fn keyword(entries: Vec<(String, Value<B>)>) -> Self {
        Self { entries, keyword_only: true }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_keyword_only(&self) -> bool {
        self.keyword_only
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn arg(&self, index: usize) -> Result<&Value<B>, ComputeError> {
        if self.keyword_only {
            return Err(ComputeError::KeywordOnly);
        }
        self.entries
            .get(index)
            .map(|(_, v)| v)
            .ok_or(ComputeError::MissingArgument { index, available: self.entries.len() })
    }

    pub fn named(&self, name: &str) -> Result<&Value<B>, ComputeError> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .ok_or_else(|| ComputeError::MissingNamedArgument { name: name.to_string() })
    }

    /// Typed positional argument.
    pub fn get<T: FromValue<B>>(&self, index: usize) -> Result<T, ComputeError> {
        T::from_value(self.arg(index)?.clone())
    }

    /// Typed keyword argument.
    pub fn get_named<T: FromValue<B>>(&self, name: &str) -> Result<T, ComputeError> {
        T::from_value(self.named(name)?.clone())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value<B>> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn detach(self) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (k, v.detach()))
                .collect(),
            keyword_only: self.keyword_only,
        }
    }
}
