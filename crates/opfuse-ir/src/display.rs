//! Text dump of a graph, in the format read back by [`crate::parse_graph`].

use std::fmt::Write;

use crate::graph::{Graph, NodeHandle};
use crate::types::TensorDesc;

/// Dumps `graph` as text: one `node` line per node (with attributes, output
/// descriptors and group ids), then every data edge, then every control edge.
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "graph {}", graph.name);

    for (_, node) in graph.nodes() {
        let _ = write!(out, "node {} {}", node.name, node.op_type);
        for (slot, output) in node.outputs().iter().enumerate() {
            if output.desc != TensorDesc::default() {
                let _ = write!(out, " out{slot}={}", format_desc(&output.desc));
            }
        }
        for (key, value) in &node.attrs {
            let _ = write!(out, " {key}={value}");
        }
        for (family, id) in node.groups() {
            let _ = write!(out, " group.{family}={}", id.0);
        }
        out.push('\n');
    }

    for (_, node) in graph.nodes() {
        for (slot, output) in node.outputs().iter().enumerate() {
            for c in &output.consumers {
                let _ = writeln!(
                    out,
                    "edge {}:{slot} -> {}:{}",
                    node.name,
                    name_of(graph, c.node),
                    c.slot
                );
            }
        }
    }

    for (_, node) in graph.nodes() {
        for &succ in node.control_successors() {
            let _ = writeln!(out, "ctrl {} -> {}", node.name, name_of(graph, succ));
        }
    }

    out
}

/// Formats a descriptor as `dtype:format:d0,d1,...`.
pub fn format_desc(desc: &TensorDesc) -> String {
    let dims: Vec<String> = desc.shape.iter().map(i64::to_string).collect();
    format!("{}:{}:{}", desc.dtype, desc.format, dims.join(","))
}

fn name_of(graph: &Graph, handle: NodeHandle) -> &str {
    &graph.node(handle).name
}
