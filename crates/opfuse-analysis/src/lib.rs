//! Pattern matching and cycle analysis for operator fusion.
//!
//! Provides the category table that classifies operators, declarative
//! fusion [`Pattern`]s, the subgraph [`Matcher`] that instantiates them
//! against an [`opfuse_ir::Graph`], and the [`CycleDetector`] that decides
//! whether a candidate node set can be contracted safely.

pub mod category;
pub mod cycle;
pub mod matcher;
pub mod pattern;

pub use category::{Category, CategoryRegistry, CategorySet};
pub use cycle::{BitSet, CycleDetector};
pub use matcher::{DEFAULT_MAX_MAPPINGS, Mapping, Matcher, MatcherOptions, Matches};
pub use pattern::{BranchMode, Pattern, PatternBuilder, PatternError, PatternNode, REPEAT_MAX};
