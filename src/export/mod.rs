// ============================================================
// Layer 5 — Export
// ============================================================
// Turns a Collection into an ONNX model through one traced pass.
//
//   1. run `Collection::trace` at the export stage; bricks that
//      are not alive there never show up
//   2. give every value an ONNX name; a key written twice gets
//      `key__v2`, `key__v3`, ... so the graph stays SSA
//   3. ask each executed brick to lower itself into a
//      TraceGraph between those names
//   4. graph inputs  = caller inputs some brick consumed
//      graph outputs = final values nothing consumed
//   5. encode as ModelProto with prost
//
// With `dynamic_batch` the leading dimension of every graph
// input and output is the symbol `batch`.

pub mod onnx;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use burn::tensor::backend::Backend;
use prost::Message;

use crate::domain::{BrickError, Stage};
use crate::ml::collection::Collection;
use crate::ml::trace::{Attribute, Lowering, TraceGraph, TraceNode};
use crate::ml::value::{NamedValues, Value};

use self::onnx::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    ValueInfoProto,
};

pub const BATCH_SYMBOL: &str = "batch";
const IR_VERSION: i64 = 8;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub stage:         Stage,
    pub dynamic_batch: bool,
    pub graph_name:    String,
    pub opset:         i64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            stage:         Stage::Export,
            dynamic_batch: false,
            graph_name:    "brickflow".to_string(),
            opset:         13,
        }
    }
}

impl ExportOptions {
    pub fn with_dynamic_batch(mut self, dynamic_batch: bool) -> Self {
        self.dynamic_batch = dynamic_batch;
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}

/// SSA names for keys as they get (re)written.
#[derive(Default)]
struct Names {
    current:  BTreeMap<String, String>,
    versions: BTreeMap<String, usize>,
}

impl Names {
    fn write(&mut self, key: &str) -> String {
        let version = self.versions.entry(key.to_string()).or_insert(0);
        *version += 1;
        let name = match *version {
            1 => key.to_string(),
            n => format!("{key}__v{n}"),
        };
        self.current.insert(key.to_string(), name.clone());
        name
    }

    fn read(&self, key: &str) -> Option<&String> {
        self.current.get(key)
    }
}

/// Export `collection` as a serialized ONNX `ModelProto`.
pub fn export_onnx<B: Backend>(
    collection:     &mut Collection<B>,
    example_inputs: &NamedValues<B>,
    options:        &ExportOptions,
) -> Result<Vec<u8>, BrickError> {
    Ok(build_model(collection, example_inputs, options)?.encode_to_vec())
}

/// [`export_onnx`] straight to a file.
pub fn export_onnx_to_file<B: Backend>(
    collection:     &mut Collection<B>,
    example_inputs: &NamedValues<B>,
    options:        &ExportOptions,
    path:           &Path,
) -> Result<(), BrickError> {
    let bytes = export_onnx(collection, example_inputs, options)?;
    std::fs::write(path, &bytes)
        .map_err(|e| BrickError::Encode(format!("cannot write '{}': {e}", path.display())))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "exported ONNX model");
    Ok(())
}

pub(crate) fn build_model<B: Backend>(
    collection:     &mut Collection<B>,
    example_inputs: &NamedValues<B>,
    options:        &ExportOptions,
) -> Result<ModelProto, BrickError> {
    let (values, steps) = collection.trace(example_inputs.clone(), options.stage)?;

    let mut names = Names::default();
    for key in example_inputs.keys() {
        names.write(key);
    }

    let mut graph = TraceGraph::new();
    let mut consumed = BTreeSet::new();
    let mut produced = BTreeSet::new();

    for step in &steps {
        let inputs: Vec<String> = step
            .inputs
            .iter()
            .map(|key| {
                names.read(key).cloned().ok_or_else(|| BrickError::ExportUnsupported {
                    unit:   step.unit.clone(),
                    reason: format!("input '{key}' has no traced producer"),
                })
            })
            .collect::<Result<_, _>>()?;
        consumed.extend(inputs.iter().cloned());

        let outputs: Vec<String> = step.outputs.iter().map(|key| names.write(key)).collect();
        produced.extend(step.outputs.iter().cloned());

        let brick = collection
            .brick(&step.unit)
            .ok_or_else(|| BrickError::UnknownUnit { name: step.unit.clone() })?;
        brick.lower(&mut graph, &Lowering { unit: &step.unit, inputs: &inputs, outputs: &outputs })?;
        tracing::debug!(brick = %step.unit, nodes = graph.nodes().len(), "lowered");
    }

    let symbolic = |dims: Vec<usize>| -> Vec<Option<usize>> {
        dims.into_iter()
            .enumerate()
            .map(|(axis, size)| (!(options.dynamic_batch && axis == 0)).then_some(size))
            .collect()
    };
    let value_info = |name: &str, value: &Value<B>| {
        let elem_type = if value.is_float() { onnx::FLOAT } else { onnx::INT64 };
        ValueInfoProto::tensor(name, elem_type, &symbolic(value.dims()), BATCH_SYMBOL)
    };

    let input = example_inputs
        .iter()
        .filter(|(key, _)| consumed.contains(*key))
        .map(|(key, value)| value_info(key, value))
        .collect::<Vec<_>>();

    let output = produced
        .iter()
        .filter_map(|key| {
            let name = names.read(key)?;
            let value = values.get(key)?;
            (!consumed.contains(name)).then(|| value_info(name, value))
        })
        .collect::<Vec<_>>();

    if output.is_empty() {
        return Err(BrickError::Encode(format!(
            "nothing to export: no brick alive at stage {} produced an unconsumed value",
            options.stage
        )));
    }

    let graph = GraphProto {
        node: graph.nodes().iter().map(node_proto).collect(),
        name: options.graph_name.clone(),
        initializer: graph
            .initializers()
            .iter()
            .map(|init| TensorProto {
                dims:       init.dims.iter().map(|&d| d as i64).collect(),
                data_type:  onnx::FLOAT,
                float_data: init.data.clone(),
                name:       init.name.clone(),
            })
            .collect(),
        input,
        output,
    };

    tracing::info!(
        nodes = graph.node.len(),
        inputs = graph.input.len(),
        outputs = graph.output.len(),
        "traced collection for export"
    );

    Ok(ModelProto {
        ir_version:       IR_VERSION,
        producer_name:    "brickflow".to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        graph:            Some(graph),
        opset_import:     vec![OperatorSetIdProto { domain: String::new(), version: options.opset }],
    })
}

fn node_proto(node: &TraceNode) -> NodeProto {
    NodeProto {
        input:     node.inputs.clone(),
        output:    node.outputs.clone(),
        name:      node.name.clone(),
        op_type:   node.op_type.clone(),
        attribute: node.attributes.iter().map(attribute_proto).collect(),
    }
}

fn attribute_proto(attribute: &Attribute) -> AttributeProto {
    let mut proto = AttributeProto { name: attribute.name().to_string(), ..Default::default() };
    match attribute {
        Attribute::Int(_, i) => {
            proto.i = *i;
            proto.r#type = onnx::ATTR_INT;
        }
        Attribute::Float(_, f) => {
            proto.f = *f;
            proto.r#type = onnx::ATTR_FLOAT;
        }
        Attribute::Ints(_, ints) => {
            proto.ints = ints.clone();
            proto.r#type = onnx::ATTR_INTS;
        }
    }
    proto
}
