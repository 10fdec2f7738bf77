//! Collapses the groups of one family into fused nodes.
//!
//! The source graph is left untouched. Every group becomes a single
//! `FusedOp` node at the position of its first member in topological order; edges internal to a
//! group disappear and the remaining data and control edges are rerouted to
//! the fused nodes.

use std::collections::BTreeMap;

use opfuse_ir::{AttrValue, EXEC_UNIT_ATTR, Endpoint, Graph, GraphError, GroupId, NodeHandle};

use crate::error::MergeError;
use crate::runner::GroupRecord;

/// Operator type given to fused nodes.
pub const FUSED_OP_TYPE: &str = "FusedOp";

/// Attribute listing the member operator types of a fused node.
pub const FUSED_OPS_ATTR: &str = "fused_ops";

/// Builds a copy of `graph` with every group of `family` merged.
///
/// A fused node is named by concatenating its members' names in match
/// order, taken from the matching entry of `records`. Groups without a
/// record (ids restored from the input text, say) fall back to topological
/// order. The fused node's outputs are the member outputs read outside the
/// group, in member order; its inputs are the distinct external tensors its
/// members read.
pub fn merge_groups(
    graph: &Graph,
    family: &str,
    records: &[GroupRecord],
) -> Result<Graph, MergeError> {
    let err = |source: GraphError| MergeError::Graph {
        graph: graph.name.clone(),
        family: family.to_string(),
        source,
    };
    let order = graph.topological_order().map_err(err)?;
    let members = member_order(graph, family, records, &order);

    let mut merged = Graph::new(graph.name.clone());
    let mut mapped: BTreeMap<NodeHandle, NodeHandle> = BTreeMap::new();
    let mut fused: BTreeMap<GroupId, NodeHandle> = BTreeMap::new();
    let mut out_slots: BTreeMap<Endpoint, u32> = BTreeMap::new();

    for &n in &order {
        let node = graph.node(n);
        let new = match node.group(family) {
            None => {
                let h = merged
                    .add_node(node.name.clone(), node.op_type.clone())
                    .map_err(err)?;
                let copy = merged.node_mut(h);
                copy.attrs = node.attrs.clone();
                for (fam, id) in node.groups() {
                    copy.set_group(fam, id);
                }
                for (slot, out) in node.outputs().iter().enumerate() {
                    merged
                        .set_output_desc(h, slot as u32, out.desc.clone())
                        .map_err(err)?;
                }
                h
            }
            Some(id) => match fused.get(&id) {
                Some(&h) => h,
                None => {
                    let group = members.get(&id).map_or(&[][..], Vec::as_slice);
                    let h = add_fused(graph, &mut merged, family, id, group, &mut out_slots)
                        .map_err(err)?;
                    fused.insert(id, h);
                    h
                }
            },
        };
        mapped.insert(n, new);
    }

    let mut in_slots: BTreeMap<NodeHandle, BTreeMap<Endpoint, u32>> = BTreeMap::new();
    for &dst in &order {
        let dst_group = graph.node(dst).group(family);
        for (slot, input) in graph.node(dst).inputs().iter().enumerate() {
            let Some(ep) = *input else { continue };
            let src_group = graph.node(ep.node).group(family);
            if dst_group.is_some() && src_group == dst_group {
                continue;
            }
            let src_slot = match src_group {
                Some(_) => out_slots.get(&ep).copied().unwrap_or(ep.slot),
                None => ep.slot,
            };
            let src = Endpoint::new(mapped[&ep.node], src_slot);
            let new_dst = mapped[&dst];
            let dst_slot = if dst_group.is_some() {
                let slots = in_slots.entry(new_dst).or_default();
                if slots.contains_key(&src) {
                    continue;
                }
                let next = slots.len() as u32;
                slots.insert(src, next);
                next
            } else {
                slot as u32
            };
            merged
                .add_data_edge(src.node, src.slot, new_dst, dst_slot)
                .map_err(err)?;
        }
    }

    for &src in &order {
        for &dst in graph.node(src).control_successors() {
            let (a, b) = (mapped[&src], mapped[&dst]);
            if a != b {
                merged.add_control_edge(a, b).map_err(err)?;
            }
        }
    }

    merged.topological_order().map_err(err)?;
    log::debug!(
        "graph '{}': merged {} group(s) of family '{family}', {} -> {} nodes",
        graph.name,
        fused.len(),
        graph.len(),
        merged.len()
    );
    Ok(merged)
}

/// Members of every group of `family`, recorded ones in match order first,
/// then any unrecorded member in topological order.
fn member_order(
    graph: &Graph,
    family: &str,
    records: &[GroupRecord],
    order: &[NodeHandle],
) -> BTreeMap<GroupId, Vec<NodeHandle>> {
    let mut members: BTreeMap<GroupId, Vec<NodeHandle>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.family == family) {
        let group = members.entry(record.id).or_default();
        for &n in &record.nodes {
            let carries = graph.contains(n) && graph.node(n).group(family) == Some(record.id);
            if carries && !group.contains(&n) {
                group.push(n);
            }
        }
    }
    for &n in order {
        if let Some(id) = graph.node(n).group(family) {
            let group = members.entry(id).or_default();
            if !group.contains(&n) {
                group.push(n);
            }
        }
    }
    members
}

fn add_fused(
    graph: &Graph,
    merged: &mut Graph,
    family: &str,
    id: GroupId,
    members: &[NodeHandle],
    out_slots: &mut BTreeMap<Endpoint, u32>,
) -> Result<NodeHandle, GraphError> {
    let name: String = members
        .iter()
        .map(|&m| graph.node(m).name.as_str())
        .collect();
    let h = merged.add_node(name, FUSED_OP_TYPE)?;

    let ops = members
        .iter()
        .map(|&m| graph.node(m).op_type.clone())
        .collect();
    let fused = merged.node_mut(h);
    fused.set_attr(FUSED_OPS_ATTR, AttrValue::StrList(ops));
    fused.set_group(family, id);
    if let Some(unit) = members
        .first()
        .and_then(|&m| graph.node(m).attr(EXEC_UNIT_ATTR))
    {
        fused.set_attr(EXEC_UNIT_ATTR, unit.clone());
    }

    let mut next = 0;
    for &m in members {
        for (slot, out) in graph.node(m).outputs().iter().enumerate() {
            let external = out
                .consumers
                .iter()
                .any(|c| graph.node(c.node).group(family) != Some(id));
            if !external {
                continue;
            }
            out_slots.insert(Endpoint::new(m, slot as u32), next);
            merged.set_output_desc(h, next, out.desc.clone())?;
            next += 1;
        }
    }
    Ok(h)
}
