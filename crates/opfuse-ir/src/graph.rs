//! Operator graph: nodes joined by data and control edges.
//!
//! Nodes live in an [`Arena`] and are addressed by [`NodeHandle`]s, so
//! neighbours refer to each other by index instead of by pointer. Every
//! query that returns several nodes returns them in a fixed order (slot
//! order, then insertion order) so downstream passes stay deterministic.

use std::collections::{BTreeMap, BTreeSet};

use crate::arena::{Arena, Handle};
use crate::error::GraphError;
use crate::types::{AttrValue, GroupId, TensorDesc};

/// Exclusive upper bound on input and output slot indices.
pub const MAX_SLOTS: u32 = 4096;

/// Handle of a node inside its [`Graph`].
pub type NodeHandle = Handle<Node>;

/// One end of a data edge: a node and one of its slots.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Endpoint {
    pub node: NodeHandle,
    pub slot: u32,
}

impl Endpoint {
    pub fn new(node: NodeHandle, slot: u32) -> Self {
        Self { node, slot }
    }
}

/// An output slot: the tensor it carries and every consumer reading it.
#[derive(Clone, Debug, Default)]
pub struct OutputSlot {
    pub desc: TensorDesc,
    /// Consumer input endpoints, in the order the edges were added.
    pub consumers: Vec<Endpoint>,
}

/// An operator instance.
#[derive(Clone, Debug)]
pub struct Node {
    /// Unique name inside the graph.
    pub name: String,
    /// Operator type name, e.g. `Conv2D`.
    pub op_type: String,
    /// Free-form attributes set by earlier compiler stages.
    pub attrs: BTreeMap<String, AttrValue>,
    inputs: Vec<Option<Endpoint>>,
    outputs: Vec<OutputSlot>,
    control_in: Vec<NodeHandle>,
    control_out: Vec<NodeHandle>,
    groups: BTreeMap<String, GroupId>,
}

impl Node {
    fn new(name: String, op_type: String) -> Self {
        Self {
            name,
            op_type,
            attrs: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            control_in: Vec::new(),
            control_out: Vec::new(),
            groups: BTreeMap::new(),
        }
    }

    /// Producer endpoint per input slot; `None` marks an unconnected slot.
    pub fn inputs(&self) -> &[Option<Endpoint>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn output(&self, slot: u32) -> Option<&OutputSlot> {
        self.outputs.get(slot as usize)
    }

    pub fn control_predecessors(&self) -> &[NodeHandle] {
        &self.control_in
    }

    pub fn control_successors(&self) -> &[NodeHandle] {
        &self.control_out
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: AttrValue) {
        self.attrs.insert(key.into(), value);
    }

    /// Group id assigned by the rule family `family`, if any.
    pub fn group(&self, family: &str) -> Option<GroupId> {
        self.groups.get(family).copied()
    }

    /// Sets the group id for `family`, returning the previous one.
    pub fn set_group(&mut self, family: impl Into<String>, id: GroupId) -> Option<GroupId> {
        self.groups.insert(family.into(), id)
    }

    pub fn clear_group(&mut self, family: &str) -> Option<GroupId> {
        self.groups.remove(family)
    }

    /// All `(family, group id)` pairs on this node, ordered by family.
    pub fn groups(&self) -> impl Iterator<Item = (&str, GroupId)> {
        self.groups.iter().map(|(f, g)| (f.as_str(), *g))
    }

    fn output_slot_mut(&mut self, slot: u32) -> &mut OutputSlot {
        let slot = slot as usize;
        if slot >= self.outputs.len() {
            self.outputs.resize_with(slot + 1, OutputSlot::default);
        }
        &mut self.outputs[slot]
    }
}

/// A dataflow graph of operators.
///
/// Edges are stored on both ends: each consumer knows its producer per
/// input slot and each output slot lists its consumers. Control edges carry
/// no data and only constrain ordering.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub name: String,
    nodes: Arena<Node>,
    names: BTreeMap<String, NodeHandle>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a node and returns its handle. Handles are issued in creation
    /// order, which is also the tie-break order of [`Self::topological_order`].
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        op_type: impl Into<String>,
    ) -> Result<NodeHandle, GraphError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateName(name));
        }
        let handle = self.nodes.append(Node::new(name.clone(), op_type.into()));
        self.names.insert(name, handle);
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by handle, reporting out-of-range handles as errors.
    pub fn try_node(&self, handle: NodeHandle) -> Result<&Node, GraphError> {
        self.nodes.try_get(handle).ok_or(GraphError::BadHandle {
            index: handle.index(),
            size: self.nodes.len(),
        })
    }

    fn try_node_mut(&mut self, handle: NodeHandle) -> Result<&mut Node, GraphError> {
        let size = self.nodes.len();
        self.nodes.try_get_mut(handle).ok_or(GraphError::BadHandle {
            index: handle.index(),
            size,
        })
    }

    /// # Panics
    ///
    /// Panics if `handle` was not issued by this graph.
    pub fn node(&self, handle: NodeHandle) -> &Node {
        &self.nodes[handle]
    }

    /// # Panics
    ///
    /// Panics if `handle` was not issued by this graph.
    pub fn node_mut(&mut self, handle: NodeHandle) -> &mut Node {
        &mut self.nodes[handle]
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains(handle)
    }

    /// Iterates over `(handle, node)` pairs in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.nodes.iter()
    }

    /// Iterates over all handles in creation order.
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + use<> {
        self.nodes.handles()
    }

    pub fn find(&self, name: &str) -> Option<NodeHandle> {
        self.names.get(name).copied()
    }

    /// Adds a data edge `src:src_slot -> dst:dst_slot`.
    ///
    /// Output and input slots below [`MAX_SLOTS`] are created on demand. An
    /// input slot accepts a single producer; an output slot may fan out to
    /// any number of consumers.
    pub fn add_data_edge(
        &mut self,
        src: NodeHandle,
        src_slot: u32,
        dst: NodeHandle,
        dst_slot: u32,
    ) -> Result<(), GraphError> {
        let src_node = self.try_node(src)?;
        if src_slot >= MAX_SLOTS {
            return Err(GraphError::SlotOutOfRange {
                node: src_node.name.clone(),
                slot: src_slot,
            });
        }
        let dst_node = self.try_node(dst)?;
        if dst_slot >= MAX_SLOTS {
            return Err(GraphError::SlotOutOfRange {
                node: dst_node.name.clone(),
                slot: dst_slot,
            });
        }
        if src == dst {
            return Err(GraphError::SelfEdge(dst_node.name.clone()));
        }
        if let Some(Some(_)) = dst_node.inputs.get(dst_slot as usize) {
            return Err(GraphError::InputOccupied {
                node: dst_node.name.clone(),
                slot: dst_slot,
            });
        }

        let dst_node = &mut self.nodes[dst];
        let slot = dst_slot as usize;
        if slot >= dst_node.inputs.len() {
            dst_node.inputs.resize(slot + 1, None);
        }
        dst_node.inputs[slot] = Some(Endpoint::new(src, src_slot));

        self.nodes[src]
            .output_slot_mut(src_slot)
            .consumers
            .push(Endpoint::new(dst, dst_slot));
        Ok(())
    }

    /// Connects output slot 0 of `src` to the first free input slot of `dst`.
    pub fn connect(&mut self, src: NodeHandle, dst: NodeHandle) -> Result<(), GraphError> {
        let dst_node = self.try_node(dst)?;
        let free = dst_node
            .inputs
            .iter()
            .position(Option::is_none)
            .unwrap_or(dst_node.inputs.len());
        self.add_data_edge(src, 0, dst, free as u32)
    }

    /// Removes the data edge `src:src_slot -> dst:dst_slot`.
    pub fn remove_data_edge(
        &mut self,
        src: NodeHandle,
        src_slot: u32,
        dst: NodeHandle,
        dst_slot: u32,
    ) -> Result<(), GraphError> {
        let src_node = self.try_node(src)?;
        let dst_node = self.try_node(dst)?;
        let Some(out) = src_node.output(src_slot) else {
            return Err(GraphError::BadOutputSlot {
                node: src_node.name.clone(),
                slot: src_slot,
            });
        };
        let target = Endpoint::new(dst, dst_slot);
        let Some(pos) = out.consumers.iter().position(|c| *c == target) else {
            return Err(GraphError::MissingEdge {
                src: src_node.name.clone(),
                dst: dst_node.name.clone(),
            });
        };

        self.nodes[src].outputs[src_slot as usize]
            .consumers
            .remove(pos);
        self.nodes[dst].inputs[dst_slot as usize] = None;
        Ok(())
    }

    /// Adds a control edge; adding an existing edge again is a no-op.
    pub fn add_control_edge(&mut self, src: NodeHandle, dst: NodeHandle) -> Result<(), GraphError> {
        self.try_node(src)?;
        let dst_node = self.try_node(dst)?;
        if src == dst {
            return Err(GraphError::SelfEdge(dst_node.name.clone()));
        }
        if dst_node.control_in.contains(&src) {
            return Ok(());
        }
        self.nodes[dst].control_in.push(src);
        self.nodes[src].control_out.push(dst);
        Ok(())
    }

    pub fn remove_control_edge(
        &mut self,
        src: NodeHandle,
        dst: NodeHandle,
    ) -> Result<(), GraphError> {
        self.try_node(src)?;
        let dst_node = self.try_node(dst)?;
        let Some(pos) = dst_node.control_in.iter().position(|&h| h == src) else {
            return Err(GraphError::MissingEdge {
                src: self.nodes[src].name.clone(),
                dst: dst_node.name.clone(),
            });
        };
        self.nodes[dst].control_in.remove(pos);
        self.nodes[src].control_out.retain(|&h| h != dst);
        Ok(())
    }

    /// Sets the tensor descriptor of an output slot, creating the slot if needed.
    pub fn set_output_desc(
        &mut self,
        node: NodeHandle,
        slot: u32,
        desc: TensorDesc,
    ) -> Result<(), GraphError> {
        let node = self.try_node_mut(node)?;
        if slot >= MAX_SLOTS {
            return Err(GraphError::SlotOutOfRange {
                node: node.name.clone(),
                slot,
            });
        }
        node.output_slot_mut(slot).desc = desc;
        Ok(())
    }

    /// Descriptor of the tensor feeding input `slot` of `node`.
    pub fn input_desc(&self, node: NodeHandle, slot: u32) -> Option<&TensorDesc> {
        let producer = (*self.nodes.try_get(node)?.inputs.get(slot as usize)?)?;
        self.nodes[producer.node]
            .output(producer.slot)
            .map(|out| &out.desc)
    }

    /// Distinct data consumers of `node`, by output slot then edge order.
    pub fn data_consumers(&self, node: NodeHandle) -> Vec<NodeHandle> {
        let mut seen = Vec::new();
        for out in &self.nodes[node].outputs {
            for c in &out.consumers {
                if !seen.contains(&c.node) {
                    seen.push(c.node);
                }
            }
        }
        seen
    }

    /// Distinct data producers of `node`, in input slot order.
    pub fn data_producers(&self, node: NodeHandle) -> Vec<NodeHandle> {
        let mut seen = Vec::new();
        for p in self.nodes[node].inputs.iter().flatten() {
            if !seen.contains(&p.node) {
                seen.push(p.node);
            }
        }
        seen
    }

    /// Data consumers followed by control successors, deduplicated.
    pub fn successors(&self, node: NodeHandle) -> Vec<NodeHandle> {
        let mut out = self.data_consumers(node);
        for &c in &self.nodes[node].control_out {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        out
    }

    /// Data producers followed by control predecessors, deduplicated.
    pub fn predecessors(&self, node: NodeHandle) -> Vec<NodeHandle> {
        let mut out = self.data_producers(node);
        for &p in &self.nodes[node].control_in {
            if !out.contains(&p) {
                out.push(p);
            }
        }
        out
    }

    /// Returns every node in topological order over data and control edges.
    ///
    /// The ordering is deterministic: among ready nodes the one created
    /// first is emitted first.
    pub fn topological_order(&self) -> Result<Vec<NodeHandle>, GraphError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for h in self.nodes.handles() {
            in_degree[h.index()] = self.predecessors(h).len();
        }

        // Kahn's algorithm with a BTreeSet ready list (ordered by handle).
        let mut ready: BTreeSet<NodeHandle> = self
            .nodes
            .handles()
            .filter(|h| in_degree[h.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(h) = ready.pop_first() {
            order.push(h);
            for s in self.successors(h) {
                in_degree[s.index()] -= 1;
                if in_degree[s.index()] == 0 {
                    ready.insert(s);
                }
            }
        }

        if order.len() != n {
            return Err(GraphError::Cycle {
                graph: self.name.clone(),
                visited: order.len(),
                total: n,
            });
        }
        Ok(order)
    }

    /// Removes the group id of `family` from every node.
    pub fn clear_groups(&mut self, family: &str) {
        for (_, node) in self.nodes.iter_mut() {
            node.groups.remove(family);
        }
    }

    /// Collects the members of every group of `family`, keyed by group id.
    /// Members are listed in handle order.
    pub fn groups(&self, family: &str) -> BTreeMap<GroupId, Vec<NodeHandle>> {
        let mut groups: BTreeMap<GroupId, Vec<NodeHandle>> = BTreeMap::new();
        for (h, node) in self.nodes.iter() {
            if let Some(id) = node.group(family) {
                groups.entry(id).or_default().push(h);
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Format};

    fn chain(graph: &mut Graph, names: &[(&str, &str)]) -> Vec<NodeHandle> {
        let handles: Vec<_> = names
            .iter()
            .map(|(n, t)| graph.add_node(*n, *t).unwrap())
            .collect();
        for pair in handles.windows(2) {
            graph.connect(pair[0], pair[1]).unwrap();
        }
        handles
    }

    #[test]
    fn build_simple_graph() {
        let mut graph = Graph::new("simple");
        let h = chain(
            &mut graph,
            &[("conv", "Conv2D"), ("add", "Add"), ("relu", "Relu")],
        );
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.find("add"), Some(h[1]));
        assert_eq!(graph.data_consumers(h[0]), vec![h[1]]);
        assert_eq!(graph.data_producers(h[2]), vec![h[1]]);
        assert_eq!(graph.node(h[1]).inputs(), &[Some(Endpoint::new(h[0], 0))]);
    }

    #[test]
    fn slots_are_bounded() {
        let mut graph = Graph::new("slots");
        let h = chain(&mut graph, &[("a", "Add"), ("b", "Relu")]);
        assert_eq!(
            graph.add_data_edge(h[0], MAX_SLOTS, h[1], 1),
            Err(GraphError::SlotOutOfRange {
                node: "a".into(),
                slot: MAX_SLOTS,
            })
        );
        assert_eq!(
            graph.add_data_edge(h[0], 0, h[1], u32::MAX),
            Err(GraphError::SlotOutOfRange {
                node: "b".into(),
                slot: u32::MAX,
            })
        );
        let desc = TensorDesc::new(DataType::F16, Format::Nchw, [1]);
        assert!(graph.set_output_desc(h[1], MAX_SLOTS, desc.clone()).is_err());
        graph.set_output_desc(h[1], MAX_SLOTS - 1, desc).unwrap();
        assert_eq!(graph.node(h[1]).outputs().len(), MAX_SLOTS as usize);
        assert_eq!(graph.node(h[1]).inputs().len(), 1);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut graph = Graph::new("dup");
        graph.add_node("a", "Relu").unwrap();
        assert_eq!(
            graph.add_node("a", "Relu"),
            Err(GraphError::DuplicateName("a".into()))
        );
    }

    #[test]
    fn input_slot_single_producer() {
        let mut graph = Graph::new("slots");
        let a = graph.add_node("a", "Relu").unwrap();
        let b = graph.add_node("b", "Relu").unwrap();
        let c = graph.add_node("c", "Add").unwrap();
        graph.add_data_edge(a, 0, c, 0).unwrap();
        let err = graph.add_data_edge(b, 0, c, 0).unwrap_err();
        assert!(matches!(err, GraphError::InputOccupied { slot: 0, .. }));
        // `connect` picks the next free slot instead.
        graph.connect(b, c).unwrap();
        assert_eq!(graph.data_producers(c), vec![a, b]);
    }

    #[test]
    fn self_edge_rejected() {
        let mut graph = Graph::new("self");
        let a = graph.add_node("a", "Relu").unwrap();
        assert!(matches!(
            graph.add_data_edge(a, 0, a, 0),
            Err(GraphError::SelfEdge(_))
        ));
        assert!(matches!(
            graph.add_control_edge(a, a),
            Err(GraphError::SelfEdge(_))
        ));
    }

    #[test]
    fn fan_out_consumers_keep_edge_order() {
        let mut graph = Graph::new("fanout");
        let a = graph.add_node("a", "Conv2D").unwrap();
        let b = graph.add_node("b", "Relu").unwrap();
        let c = graph.add_node("c", "Relu").unwrap();
        let d = graph.add_node("d", "Relu").unwrap();
        graph.add_data_edge(a, 1, d, 0).unwrap();
        graph.add_data_edge(a, 0, c, 0).unwrap();
        graph.add_data_edge(a, 0, b, 0).unwrap();
        // Slot 0 consumers first (in edge order), then slot 1.
        assert_eq!(graph.data_consumers(a), vec![c, b, d]);
    }

    #[test]
    fn remove_edges() {
        let mut graph = Graph::new("remove");
        let h = chain(&mut graph, &[("a", "Relu"), ("b", "Relu")]);
        graph.add_control_edge(h[0], h[1]).unwrap();
        graph.remove_data_edge(h[0], 0, h[1], 0).unwrap();
        assert!(graph.data_consumers(h[0]).is_empty());
        assert_eq!(graph.successors(h[0]), vec![h[1]]);
        graph.remove_control_edge(h[0], h[1]).unwrap();
        assert!(graph.successors(h[0]).is_empty());
        assert!(matches!(
            graph.remove_control_edge(h[0], h[1]),
            Err(GraphError::MissingEdge { .. })
        ));
    }

    #[test]
    fn control_edges_are_deduplicated() {
        let mut graph = Graph::new("ctrl");
        let a = graph.add_node("a", "Relu").unwrap();
        let b = graph.add_node("b", "Relu").unwrap();
        graph.add_control_edge(a, b).unwrap();
        graph.add_control_edge(a, b).unwrap();
        assert_eq!(graph.node(b).control_predecessors(), &[a]);
        assert_eq!(graph.node(a).control_successors(), &[b]);
    }

    #[test]
    fn topological_order_diamond() {
        // A → B, A → C, B → D, C → D
        let mut graph = Graph::new("diamond");
        let a = graph.add_node("A", "Relu").unwrap();
        let b = graph.add_node("B", "Relu").unwrap();
        let c = graph.add_node("C", "Relu").unwrap();
        let d = graph.add_node("D", "Add").unwrap();
        graph.connect(a, b).unwrap();
        graph.connect(a, c).unwrap();
        graph.connect(b, d).unwrap();
        graph.connect(c, d).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec![a, b, c, d]);
    }

    #[test]
    fn topological_order_respects_control_edges() {
        let mut graph = Graph::new("ctrl-order");
        let a = graph.add_node("a", "Relu").unwrap();
        let b = graph.add_node("b", "Relu").unwrap();
        graph.add_control_edge(b, a).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec![b, a]);
    }

    #[test]
    fn topological_order_detects_cycle() {
        let mut graph = Graph::new("cyclic");
        let a = graph.add_node("a", "Relu").unwrap();
        let b = graph.add_node("b", "Relu").unwrap();
        graph.connect(a, b).unwrap();
        graph.add_control_edge(b, a).unwrap();
        assert_eq!(
            graph.topological_order(),
            Err(GraphError::Cycle {
                graph: "cyclic".into(),
                visited: 0,
                total: 2,
            })
        );
    }

    #[test]
    fn input_desc_reads_producer_slot() {
        let mut graph = Graph::new("desc");
        let h = chain(&mut graph, &[("conv", "Conv2D"), ("relu", "Relu")]);
        let desc = TensorDesc::new(DataType::F16, Format::Nc1hwc0, [1, 4, 8, 8, 16]);
        graph.set_output_desc(h[0], 0, desc.clone()).unwrap();
        assert_eq!(graph.input_desc(h[1], 0), Some(&desc));
        assert_eq!(graph.input_desc(h[1], 1), None);
    }

    #[test]
    fn group_ids_per_family() {
        let mut graph = Graph::new("groups");
        let h = chain(&mut graph, &[("a", "Relu"), ("b", "Relu"), ("c", "Relu")]);
        graph.node_mut(h[0]).set_group("ub", GroupId(1));
        graph.node_mut(h[1]).set_group("ub", GroupId(1));
        graph.node_mut(h[1]).set_group("l1", GroupId(7));

        let ub = graph.groups("ub");
        assert_eq!(ub.len(), 1);
        assert_eq!(ub[&GroupId(1)], vec![h[0], h[1]]);
        assert_eq!(graph.node(h[1]).group("l1"), Some(GroupId(7)));

        graph.clear_groups("ub");
        assert!(graph.groups("ub").is_empty());
        assert_eq!(graph.node(h[1]).group("l1"), Some(GroupId(7)));
    }

    #[test]
    fn bad_handle_reported() {
        let graph = Graph::new("empty");
        let mut other = Graph::new("other");
        let h = other.add_node("x", "Relu").unwrap();
        assert_eq!(
            graph.try_node(h).unwrap_err(),
            GraphError::BadHandle { index: 0, size: 0 }
        );
    }
}
