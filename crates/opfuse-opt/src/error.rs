//! Error types for the fusion stage.
//!
//! Expected outcomes (no mapping, a refiner rejection, a cycle) never
//! surface here; these errors abort fusion of the current graph.

use opfuse_analysis::PatternError;
use opfuse_ir::{GraphError, GroupId};

/// Fatal errors raised while registering or running fusion rules.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    /// A rule's pattern definition is malformed.
    #[error("rule '{rule}' defines an invalid pattern: {source}")]
    Pattern {
        rule: String,
        #[source]
        source: PatternError,
    },

    /// Two rules share a name.
    #[error("rule '{0}' is already registered")]
    DuplicateRule(String),

    /// The graph itself is unusable (e.g. cyclic).
    #[error("rule '{rule}' on graph '{graph}': {source}")]
    Graph {
        rule: String,
        graph: String,
        #[source]
        source: GraphError,
    },

    /// A refiner produced a candidate that is not a valid node set.
    #[error("rule '{rule}' on graph '{graph}': invalid candidate: {reason}")]
    InvalidCandidate {
        rule: String,
        graph: String,
        reason: String,
    },

    /// A candidate contains a node already grouped in the same family.
    #[error(
        "rule '{rule}' on graph '{graph}': node '{node}' already belongs to group {group} of family '{family}'"
    )]
    AlreadyGrouped {
        rule: String,
        graph: String,
        node: String,
        family: String,
        group: GroupId,
    },

    /// Every group id has been handed out.
    #[error("rule '{rule}' on graph '{graph}': no group id left for family '{family}'")]
    GroupIdsExhausted {
        rule: String,
        graph: String,
        family: String,
    },

    /// Two committed groups of one family share a node. `rule` committed
    /// the second group.
    #[error(
        "rule '{rule}' on graph '{graph}': node '{node}' is in groups {first} and {second} of family '{family}'"
    )]
    Overlap {
        rule: String,
        graph: String,
        family: String,
        node: String,
        first: GroupId,
        second: GroupId,
    },

    /// A node's recorded group disagrees with the committed group.
    #[error(
        "rule '{rule}' on graph '{graph}': node '{node}' should carry group {expected} of family '{family}'"
    )]
    GroupMismatch {
        rule: String,
        graph: String,
        family: String,
        node: String,
        expected: GroupId,
    },
}

/// Errors raised while collapsing groups into fused nodes.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("merging family '{family}' of graph '{graph}': {source}")]
    Graph {
        graph: String,
        family: String,
        #[source]
        source: GraphError,
    },
}
