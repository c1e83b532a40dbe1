// ============================================================
// Layer 5 — Trace Graph
// ============================================================
// A backend-neutral graph that exportable computations lower
// themselves into during an export pass.
//
// Value names are the ONNX value names chosen by the exporter
// for a brick's inputs and outputs (see `Lowering`). A
// computation emits nodes between those names, allocating
// intermediates with `fresh` and weights with `initializer`.
// The export layer turns the finished graph into protobuf.

/// Node attribute; the subset of ONNX attribute types bricks need.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Int(String, i64),
    Float(String, f32),
    Ints(String, Vec<i64>),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Int(name, _) | Attribute::Float(name, _) | Attribute::Ints(name, _) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode {
    pub name:       String,
    pub op_type:    String,
    pub inputs:     Vec<String>,
    pub outputs:    Vec<String>,
    pub attributes: Vec<Attribute>,
}

/// Constant float tensor baked into the graph (weights, biases).
#[derive(Debug, Clone, PartialEq)]
pub struct Initializer {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

/// Names one brick must connect while lowering.
#[derive(Debug, Clone, Copy)]
pub struct Lowering<'a> {
    /// Qualified brick name, used to prefix node and weight names.
    pub unit:    &'a str,
    pub inputs:  &'a [String],
    pub outputs: &'a [String],
}

#[derive(Debug, Clone, Default)]
pub struct TraceGraph {
    nodes:        Vec<TraceNode>,
    initializers: Vec<Initializer>,
    counter:      usize,
}

impl TraceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; attributes can be added through the returned reference.
    pub fn node(
        &mut self,
        op_type: &str,
        inputs:  Vec<String>,
        outputs: Vec<String>,
    ) -> &mut TraceNode {
        self.counter += 1;
        let name = format!("{op_type}_{}", self.counter);
        self.nodes.push(TraceNode {
            name,
            op_type: op_type.to_string(),
            inputs,
            outputs,
            attributes: Vec::new(),
        });
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    /// Register a constant and return the value name to wire it with.
    pub fn initializer(&mut self, name: impl Into<String>, dims: Vec<usize>, data: Vec<f32>) -> String {
        let name = name.into();
        self.initializers.push(Initializer { name: name.clone(), dims, data });
        name
    }

    /// A value name no other node uses.
    pub fn fresh(&mut self, hint: &str) -> String {
        self.counter += 1;
        format!("{hint}__t{}", self.counter)
    }

    pub fn nodes(&self) -> &[TraceNode] {
        &self.nodes
    }

    pub fn initializers(&self) -> &[Initializer] {
        &self.initializers
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl TraceNode {
    pub fn attr(&mut self, attribute: Attribute) -> &mut Self {
        self.attributes.push(attribute);
        self
    }

    /// Rename the node, typically to the brick that emitted it.
    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_names_are_unique() {
        let mut graph = TraceGraph::new();
        let a = graph.fresh("dense");
        let b = graph.fresh("dense");
        assert_ne!(a, b);
    }

    #[test]
    fn test_node_records_attributes() {
        let mut graph = TraceGraph::new();
        graph
            .node("Softmax", vec!["x".into()], vec!["y".into()])
            .attr(Attribute::Int("axis".into(), -1));
        assert_eq!(graph.nodes().len(), 1);
        assert_eq!(graph.nodes()[0].attributes[0].name(), "axis");
    }
}
