//! Operator graph IR for the opfuse fusion stage.
//!
//! An arena-backed dataflow graph: nodes addressed by stable integer
//! handles, data edges between numbered slots, control edges, free-form
//! attributes and per-family fusion group ids. Also provides a small text
//! format ([`parse_graph`] / [`dump_graph`]) used by the driver and tests.

pub mod arena;
mod display;
mod error;
pub mod graph;
mod text;
mod types;

pub use arena::{Arena, Handle, HandleMap};
pub use display::{dump_graph, format_desc};
pub use error::GraphError;
pub use graph::{Endpoint, Graph, MAX_SLOTS, Node, NodeHandle, OutputSlot};
pub use text::{ParseError, parse_graph};
pub use types::{AttrValue, DataType, Format, GroupId, TensorDesc};

/// Attribute holding explicit category names for a node. When present it
/// takes precedence over the op-type lookup.
pub const CATEGORY_OVERRIDE_ATTR: &str = "fusion.categories";

/// Attribute naming the execution unit a node is scheduled on.
pub const EXEC_UNIT_ATTR: &str = "exec_unit";
