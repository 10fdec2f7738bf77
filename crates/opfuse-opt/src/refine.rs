//! Semantic checks shared by rule refiners.
//!
//! Each check returns `Err(reason)` to reject the mapping; refiners chain
//! them with `?` and hand the result to [`crate::Refinement::from_check`].

use opfuse_analysis::Mapping;
use opfuse_ir::{Graph, NodeHandle, TensorDesc};

/// Every tensor flowing into the nodes bound to `join` from inside the
/// mapping must share one dtype and format.
pub fn join_agreement(graph: &Graph, mapping: &Mapping<'_>, join: &str) -> Result<(), String> {
    for &node in mapping.nodes_for(join) {
        let mut first: Option<&TensorDesc> = None;
        for (slot, input) in graph.node(node).inputs().iter().enumerate() {
            let Some(input) = input else { continue };
            if !mapping.contains(input.node) {
                continue;
            }
            let Some(desc) = graph.input_desc(node, slot as u32) else {
                continue;
            };
            match first {
                None => first = Some(desc),
                Some(f) if f.dtype != desc.dtype || f.format != desc.format => {
                    return Err(format!(
                        "join '{}' mixes {}/{} with {}/{}",
                        graph.node(node).name,
                        f.dtype,
                        f.format,
                        desc.dtype,
                        desc.format
                    ));
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// No node bound to `id` may have one of the `banned` operator types.
pub fn op_blacklist(
    graph: &Graph,
    mapping: &Mapping<'_>,
    id: &str,
    banned: &[&str],
) -> Result<(), String> {
    match mapping
        .nodes_for(id)
        .iter()
        .map(|&h| graph.node(h))
        .find(|n| banned.contains(&n.op_type.as_str()))
    {
        Some(node) => Err(format!(
            "'{}' ({}) is not fusable as {id}",
            node.name, node.op_type
        )),
        None => Ok(()),
    }
}

/// Two shapes are compatible when either is unknown (empty) or they have the
/// same rank and agree on every static dimension.
pub fn shapes_compatible(a: &[i64], b: &[i64]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| *x < 0 || *y < 0 || x == y)
}

/// All `shapes` must be pairwise compatible with the first known one.
pub fn uniform_shapes<'a>(
    what: &str,
    shapes: impl IntoIterator<Item = &'a [i64]>,
) -> Result<(), String> {
    let mut reference: Option<&[i64]> = None;
    for shape in shapes {
        if shape.is_empty() {
            continue;
        }
        match reference {
            None => reference = Some(shape),
            Some(r) if !shapes_compatible(r, shape) => {
                return Err(format!("{what}: shape {shape:?} differs from {r:?}"));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Output shape of slot 0 of `node`, empty when undescribed.
pub fn output_shape(graph: &Graph, node: NodeHandle) -> &[i64] {
    graph
        .node(node)
        .output(0)
        .map_or(&[][..], |out| out.desc.shape.as_slice())
}

/// A member whose output feeds both another member and a node outside the
/// mapping is only allowed at the listed `boundary` pattern nodes.
pub fn multi_output(graph: &Graph, mapping: &Mapping<'_>, boundary: &[&str]) -> Result<(), String> {
    for node in mapping.nodes() {
        let consumers = graph.data_consumers(node);
        let inside = consumers.iter().any(|&c| mapping.contains(c));
        let outside = consumers.iter().any(|&c| !mapping.contains(c));
        if !(inside && outside) {
            continue;
        }
        let id = mapping.pattern_node_of(node).unwrap_or_default();
        if !boundary.contains(&id) {
            return Err(format!(
                "'{}' feeds nodes outside the fusion from pattern node '{id}'",
                graph.node(node).name
            ));
        }
    }
    Ok(())
}
