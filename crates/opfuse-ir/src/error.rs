//! Error types for the graph IR.

/// Errors that can occur when constructing or querying a graph.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    /// A node handle is out of bounds for the graph's arena.
    #[error("node handle {index} out of bounds (graph size: {size})")]
    BadHandle { index: usize, size: usize },

    /// An output slot index does not exist on the producer.
    #[error("node '{node}' has no output slot {slot}")]
    BadOutputSlot { node: String, slot: u32 },

    /// A slot index is at or above [`crate::MAX_SLOTS`].
    #[error("slot {slot} of node '{node}' is out of range")]
    SlotOutOfRange { node: String, slot: u32 },

    /// The consumer's input slot is already fed by another producer.
    #[error("input slot {slot} of node '{node}' is already connected")]
    InputOccupied { node: String, slot: u32 },

    /// An edge would connect a node to itself.
    #[error("edge from '{0}' to itself")]
    SelfEdge(String),

    /// The edge to remove does not exist.
    #[error("no edge from '{src}' to '{dst}'")]
    MissingEdge { src: String, dst: String },

    /// A node name was used twice.
    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    /// Data and control edges together form a cycle.
    #[error("graph '{graph}' contains a cycle ({visited} of {total} nodes ordered)")]
    Cycle {
        graph: String,
        visited: usize,
        total: usize,
    },
}
