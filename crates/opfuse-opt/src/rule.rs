//! The fusion rule interface.
//!
//! A rule contributes one or more [`Pattern`]s and a refiner that turns a raw
//! [`Mapping`] into a [`CandidateFusionSet`] or rejects it. Rules are
//! registered as trait objects in an ordered list; see
//! [`crate::PassManager`].

use std::fmt::{self, Debug};
use std::str::FromStr;

use opfuse_analysis::{Mapping, Pattern, PatternError};
use opfuse_ir::{EXEC_UNIT_ATTR, Graph, Node, NodeHandle};

use crate::error::FusionError;

/// Rule family used by the built-in rules.
pub const DEFAULT_FAMILY: &str = "ub";

/// Accelerator core type a node is scheduled on. Rules only see nodes of
/// their own unit.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ExecUnit {
    /// Cube/matrix core.
    #[default]
    AiCore,
    /// Vector core.
    VectorCore,
}

impl ExecUnit {
    /// Units in the order the pass manager runs them.
    pub const ALL: [ExecUnit; 2] = [Self::AiCore, Self::VectorCore];

    /// Unit of `node`, read from its `exec_unit` attribute. Nodes without the
    /// attribute run on the AI core.
    pub fn of(node: &Node) -> Self {
        let Some(value) = node.attr(EXEC_UNIT_ATTR).and_then(|v| v.as_str()) else {
            return Self::default();
        };
        value.parse().unwrap_or_else(|e| {
            log::warn!("node '{}': {e}, assuming {}", node.name, Self::default());
            Self::default()
        })
    }
}

impl fmt::Display for ExecUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AiCore => "aicore",
            Self::VectorCore => "vector",
        })
    }
}

impl FromStr for ExecUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aicore" | "ai_core" | "cube" => Ok(Self::AiCore),
            "vector" | "vector_core" | "vectorcore" => Ok(Self::VectorCore),
            _ => Err(format!("unknown execution unit '{s}'")),
        }
    }
}

/// The node set one fusion instance will collapse.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CandidateFusionSet {
    pub rule: String,
    pub pattern: String,
    /// Members in match order.
    pub nodes: Vec<NodeHandle>,
    /// Size of the mapping the set was refined from.
    pub mapping_size: usize,
}

impl CandidateFusionSet {
    /// Takes every node of `mapping` unchanged.
    pub fn from_mapping(rule: &str, mapping: &Mapping<'_>) -> Self {
        Self {
            rule: rule.to_string(),
            pattern: mapping.pattern_name().to_string(),
            nodes: mapping.nodes(),
            mapping_size: mapping.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Outcome of refining one mapping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Refinement {
    Accept(CandidateFusionSet),
    Reject(String),
}

impl Refinement {
    /// Accepts the whole mapping if `check` passed, rejects with its reason
    /// otherwise.
    pub fn from_check(rule: &str, mapping: &Mapping<'_>, check: Result<(), String>) -> Self {
        match check {
            Ok(()) => Self::Accept(CandidateFusionSet::from_mapping(rule, mapping)),
            Err(reason) => Self::Reject(reason),
        }
    }
}

/// A fusion rule: patterns to look for plus semantic checks on each match.
pub trait FusionRule: Debug {
    /// Unique name of the rule, used in logs and reports.
    fn name(&self) -> &str;

    /// Rule family; groups of different families never interact.
    fn family(&self) -> &str {
        DEFAULT_FAMILY
    }

    fn unit(&self) -> ExecUnit {
        ExecUnit::AiCore
    }

    /// Lower priorities run first.
    fn priority(&self) -> u32;

    /// Patterns tried at every head, in order.
    fn define_patterns(&self) -> Result<Vec<Pattern>, PatternError>;

    /// Validates a raw mapping and narrows it to a candidate set.
    fn refine(&self, graph: &Graph, mapping: &Mapping<'_>) -> Refinement;
}

/// A rule together with its validated patterns.
#[derive(Debug)]
pub struct RegisteredRule {
    rule: Box<dyn FusionRule>,
    patterns: Vec<Pattern>,
}

impl RegisteredRule {
    /// Builds the rule's patterns; a malformed pattern is a registration error.
    pub fn new(rule: Box<dyn FusionRule>) -> Result<Self, FusionError> {
        let patterns = rule.define_patterns().map_err(|source| FusionError::Pattern {
            rule: rule.name().to_string(),
            source,
        })?;
        Ok(Self { rule, patterns })
    }

    pub fn rule(&self) -> &dyn FusionRule {
        &*self.rule
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }
}
