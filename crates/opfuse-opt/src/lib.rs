//! Operator fusion passes for opfuse.
//!
//! Provides the [`FusionRule`] trait, the built-in rules, a
//! [`FusionPassRunner`] that applies one rule to a graph, and a
//! [`PassManager`] that runs all registered rules in priority order.
//! [`merge_groups`] collapses the resulting groups into fused nodes.
//!
//! ```
//! use opfuse_ir::parse_graph;
//!
//! let mut graph = parse_graph(
//!     "node conv Conv2D\nnode deq AscendDequant\nnode relu Relu\n\
//!      edge conv -> deq\nedge deq -> relu",
//! )
//! .unwrap();
//! let report = opfuse_opt::fuse(&mut graph).unwrap();
//! assert_eq!(report.len(), 1);
//! assert_eq!(report.groups[0].node_names, ["conv", "deq", "relu"]);
//! ```

mod error;
mod manager;
mod merge;
pub mod refine;
mod rule;
pub mod rules;
mod runner;
mod validation;

pub use error::{FusionError, MergeError};
pub use manager::{FusionReport, PassManager, fuse};
pub use merge::{FUSED_OP_TYPE, FUSED_OPS_ATTR, merge_groups};
pub use rule::{
    CandidateFusionSet, DEFAULT_FAMILY, ExecUnit, FusionRule, Refinement, RegisteredRule,
};
pub use runner::{
    DEFAULT_MIN_GROUP_SIZE, FusionConfig, FusionPassRunner, GroupIdAllocator, GroupRecord,
    PassContext,
};
pub use validation::validate_partition;
