//! Declarative fusion patterns.
//!
//! A [`Pattern`] is a small DAG of [`PatternNode`]s. Each pattern node names
//! the categories it accepts, how many real nodes it binds (a linear chain of
//! `min..=max` nodes, where `min == 0` makes it optional), and the pattern
//! nodes that consume its output. Patterns are assembled with a
//! [`PatternBuilder`] and validated once, when the owning rule is registered.

use std::collections::BTreeSet;

use crate::category::CategorySet;

/// Upper occurrence bound meaning "as many as the graph offers".
pub const REPEAT_MAX: u32 = u32::MAX;

/// How a pattern node's output is distributed over its listed successors.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BranchMode {
    /// The output reaches exactly one node inside the fused region. Several
    /// listed successors are alternatives, tried in declared order.
    #[default]
    Single,
    /// Real consumers are distributed one-to-one over the listed successors.
    /// Surplus consumers stay outside the match.
    Multi,
}

/// Errors detected while building a pattern.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern '{pattern}': duplicate node id '{id}'")]
    DuplicateId { pattern: String, id: String },

    #[error("pattern '{pattern}': reference to unknown node id '{id}'")]
    DanglingId { pattern: String, id: String },

    #[error("pattern '{pattern}': node '{id}' has its successors declared twice")]
    ConnectedTwice { pattern: String, id: String },

    #[error("pattern '{pattern}': node '{id}' has min count {min} above max count {max}")]
    BadBounds {
        pattern: String,
        id: String,
        min: u32,
        max: u32,
    },

    #[error("pattern '{pattern}': node '{id}' has a max count of zero")]
    ZeroMax { pattern: String, id: String },

    #[error("pattern '{pattern}': no head declared")]
    NoHead { pattern: String },

    #[error("pattern '{pattern}': successor structure is cyclic through '{id}'")]
    Cyclic { pattern: String, id: String },

    #[error("pattern '{pattern}': node '{id}' is not reachable from any head")]
    Unreachable { pattern: String, id: String },
}

/// One node of a pattern.
#[derive(Clone, Debug)]
pub struct PatternNode {
    pub id: String,
    pub categories: CategorySet,
    pub min: u32,
    pub max: u32,
    /// Indices of successor pattern nodes, in declared order.
    pub successors: Vec<usize>,
    pub mode: BranchMode,
    /// When set, a listed successor that cannot be matched is treated as
    /// absent instead of failing the whole mapping.
    pub allow_partial: bool,
    pub is_head: bool,
}

impl PatternNode {
    pub fn is_optional(&self) -> bool {
        self.min == 0
    }

    pub fn is_repeated(&self) -> bool {
        self.max > 1
    }
}

/// An immutable, validated pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    name: String,
    nodes: Vec<PatternNode>,
    heads: Vec<usize>,
    predecessors: Vec<Vec<usize>>,
}

impl Pattern {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pattern nodes in declaration order.
    pub fn nodes(&self) -> &[PatternNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &PatternNode {
        &self.nodes[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Head indices in declared order.
    pub fn heads(&self) -> &[usize] {
        &self.heads
    }

    /// Pattern nodes listing `index` as a successor, in declaration order.
    pub fn predecessors(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }
}

#[derive(Debug)]
struct PendingConnect {
    from: String,
    to: Vec<String>,
    mode: BranchMode,
    allow_partial: bool,
}

/// Collects pattern nodes and edges; [`PatternBuilder::build`] validates
/// the result.
///
/// ```
/// use opfuse_analysis::{BranchMode, Category, CategorySet, PatternBuilder};
///
/// let pattern = PatternBuilder::new("conv_relu")
///     .add_node("conv", CategorySet::of(&[Category::Conv]), 1, 1)
///     .add_node("relu", CategorySet::of(&[Category::Elemwise]), 1, 1)
///     .connect("conv", &["relu"], BranchMode::Single, false)
///     .set_head(&["conv"])
///     .build()
///     .unwrap();
/// assert_eq!(pattern.nodes().len(), 2);
/// ```
#[derive(Debug)]
pub struct PatternBuilder {
    name: String,
    nodes: Vec<(String, CategorySet, u32, u32)>,
    connects: Vec<PendingConnect>,
    heads: Vec<String>,
}

impl PatternBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            connects: Vec::new(),
            heads: Vec::new(),
        }
    }

    /// Declares a pattern node binding between `min` and `max` real nodes.
    pub fn add_node(mut self, id: &str, categories: CategorySet, min: u32, max: u32) -> Self {
        self.nodes.push((id.to_string(), categories, min, max));
        self
    }

    /// Declares the successors of `from`.
    pub fn connect(
        mut self,
        from: &str,
        to: &[&str],
        mode: BranchMode,
        allow_partial: bool,
    ) -> Self {
        self.connects.push(PendingConnect {
            from: from.to_string(),
            to: to.iter().map(|s| s.to_string()).collect(),
            mode,
            allow_partial,
        });
        self
    }

    /// Marks pattern nodes as valid starting points. May be called repeatedly.
    pub fn set_head(mut self, ids: &[&str]) -> Self {
        self.heads.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    pub fn build(self) -> Result<Pattern, PatternError> {
        let name = self.name;
        let mut nodes: Vec<PatternNode> = Vec::with_capacity(self.nodes.len());
        for (id, categories, min, max) in self.nodes {
            if nodes.iter().any(|n| n.id == id) {
                return Err(PatternError::DuplicateId { pattern: name, id });
            }
            if max == 0 {
                return Err(PatternError::ZeroMax { pattern: name, id });
            }
            if min > max {
                return Err(PatternError::BadBounds {
                    pattern: name,
                    id,
                    min,
                    max,
                });
            }
            nodes.push(PatternNode {
                id,
                categories,
                min,
                max,
                successors: Vec::new(),
                mode: BranchMode::Single,
                allow_partial: false,
                is_head: false,
            });
        }

        let index_of = |nodes: &[PatternNode], id: &str| nodes.iter().position(|n| n.id == id);
        let mut connected = BTreeSet::new();
        for c in self.connects {
            let Some(from) = index_of(&nodes, &c.from) else {
                return Err(PatternError::DanglingId {
                    pattern: name,
                    id: c.from,
                });
            };
            if !connected.insert(from) {
                return Err(PatternError::ConnectedTwice {
                    pattern: name,
                    id: c.from,
                });
            }
            let mut successors = Vec::with_capacity(c.to.len());
            for to in c.to {
                match index_of(&nodes, &to) {
                    Some(idx) => successors.push(idx),
                    None => return Err(PatternError::DanglingId { pattern: name, id: to }),
                }
            }
            let node = &mut nodes[from];
            node.successors = successors;
            node.mode = c.mode;
            node.allow_partial = c.allow_partial;
        }

        let mut heads = Vec::new();
        for id in self.heads {
            let Some(idx) = index_of(&nodes, &id) else {
                return Err(PatternError::DanglingId { pattern: name, id });
            };
            if !heads.contains(&idx) {
                heads.push(idx);
                nodes[idx].is_head = true;
            }
        }
        if heads.is_empty() {
            return Err(PatternError::NoHead { pattern: name });
        }

        if let Some(idx) = find_cycle(&nodes) {
            return Err(PatternError::Cyclic {
                pattern: name,
                id: nodes[idx].id.clone(),
            });
        }

        let mut reached = vec![false; nodes.len()];
        let mut stack = heads.clone();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut reached[idx], true) {
                continue;
            }
            stack.extend(nodes[idx].successors.iter().copied());
        }
        if let Some(idx) = reached.iter().position(|r| !r) {
            return Err(PatternError::Unreachable {
                pattern: name,
                id: nodes[idx].id.clone(),
            });
        }

        let mut predecessors = vec![Vec::new(); nodes.len()];
        for (idx, node) in nodes.iter().enumerate() {
            for &s in &node.successors {
                if !predecessors[s].contains(&idx) {
                    predecessors[s].push(idx);
                }
            }
        }

        Ok(Pattern {
            name,
            nodes,
            heads,
            predecessors,
        })
    }
}

/// Returns a node lying on a cycle, if any.
fn find_cycle(nodes: &[PatternNode]) -> Option<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(nodes: &[PatternNode], marks: &mut [Mark], idx: usize) -> Option<usize> {
        match marks[idx] {
            Mark::Active => return Some(idx),
            Mark::Done => return None,
            Mark::New => {}
        }
        marks[idx] = Mark::Active;
        for &s in &nodes[idx].successors {
            if let Some(found) = visit(nodes, marks, s) {
                return Some(found);
            }
        }
        marks[idx] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; nodes.len()];
    (0..nodes.len()).find_map(|idx| visit(nodes, &mut marks, idx))
}
