//! Drives one fusion rule over a whole graph.
//!
//! Heads are visited in topological order. For every free head the rule's
//! patterns are matched, each mapping is refined and cycle-checked in
//! priority order, and the first survivor is committed: its nodes receive a
//! fresh group id, become claimed, and are contracted in the cycle index.

use std::collections::{BTreeMap, BTreeSet};

use opfuse_analysis::{CategoryRegistry, CycleDetector, Matcher, MatcherOptions};
use opfuse_ir::{Graph, GroupId, NodeHandle};

use crate::error::FusionError;
use crate::rule::{CandidateFusionSet, ExecUnit, RegisteredRule, Refinement};

/// Default lower bound on committed group sizes.
pub const DEFAULT_MIN_GROUP_SIZE: usize = 2;

/// Tunables for one fusion run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FusionConfig {
    /// Candidates with fewer nodes are rejected like refiner rejections.
    pub min_group_size: usize,
    pub matcher: MatcherOptions,
    /// Rules skipped by name.
    pub disabled_rules: BTreeSet<String>,
    /// When set, only rules of these families run.
    pub families: Option<BTreeSet<String>>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_group_size: DEFAULT_MIN_GROUP_SIZE,
            matcher: MatcherOptions::default(),
            disabled_rules: BTreeSet::new(),
            families: None,
        }
    }
}

impl FusionConfig {
    /// Whether a rule with this name and family takes part in the run.
    pub fn is_enabled(&self, name: &str, family: &str) -> bool {
        !self.disabled_rules.contains(name)
            && self.families.as_ref().is_none_or(|f| f.contains(family))
    }
}

/// Hands out group ids, scoped to one compilation.
#[derive(Clone, Debug, Default)]
pub struct GroupIdAllocator {
    // Wider than `GroupId` so that exhaustion is a state, not an overflow.
    next: u64,
}

impl GroupIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(first: u32) -> Self {
        Self { next: first.into() }
    }

    /// Starts past every group id already present on `graph`.
    pub fn for_graph(graph: &Graph) -> Self {
        let next = graph
            .nodes()
            .flat_map(|(_, node)| node.groups().map(|(_, id)| u64::from(id.0) + 1))
            .max()
            .unwrap_or(0);
        Self { next }
    }

    /// Next unused id, or `None` once every `u32` id has been handed out.
    pub fn allocate(&mut self) -> Option<GroupId> {
        let id = u32::try_from(self.next).ok()?;
        self.next += 1;
        Some(GroupId(id))
    }
}

/// A committed group, kept for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: GroupId,
    pub family: String,
    pub rule: String,
    pub pattern: String,
    /// Members in match order.
    pub nodes: Vec<NodeHandle>,
    pub node_names: Vec<String>,
    pub mapping_size: usize,
}

/// State shared by every rule of one run over one graph.
#[derive(Debug)]
pub struct PassContext<'a> {
    pub config: FusionConfig,
    registry: &'a CategoryRegistry,
    allocator: GroupIdAllocator,
    detectors: BTreeMap<String, CycleDetector>,
    claimed: BTreeMap<String, BTreeSet<NodeHandle>>,
    records: Vec<GroupRecord>,
}

impl<'a> PassContext<'a> {
    pub fn new(graph: &Graph, config: FusionConfig, registry: &'a CategoryRegistry) -> Self {
        Self {
            config,
            registry,
            allocator: GroupIdAllocator::for_graph(graph),
            detectors: BTreeMap::new(),
            claimed: BTreeMap::new(),
            records: Vec::new(),
        }
    }

    /// Groups committed so far, in commit order.
    pub fn records(&self) -> &[GroupRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<GroupRecord> {
        self.records
    }

    /// Whether `node` is still available to `family`.
    pub fn is_free(&self, graph: &Graph, family: &str, node: NodeHandle) -> bool {
        let claimed = self
            .claimed
            .get(family)
            .is_some_and(|set| set.contains(&node));
        !claimed && graph.node(node).group(family).is_none()
    }

    fn ensure_detector(&mut self, graph: &Graph, family: &str, rule: &str) -> Result<(), FusionError> {
        if !self.detectors.contains_key(family) {
            let detector =
                CycleDetector::with_groups(graph, family).map_err(|source| FusionError::Graph {
                    rule: rule.to_string(),
                    graph: graph.name.clone(),
                    source,
                })?;
            self.detectors.insert(family.to_string(), detector);
        }
        Ok(())
    }

    fn commit(
        &mut self,
        graph: &mut Graph,
        family: &str,
        set: CandidateFusionSet,
    ) -> Result<GroupId, FusionError> {
        for &n in &set.nodes {
            if let Some(group) = graph.node(n).group(family) {
                return Err(FusionError::AlreadyGrouped {
                    rule: set.rule,
                    graph: graph.name.clone(),
                    node: graph.node(n).name.clone(),
                    family: family.to_string(),
                    group,
                });
            }
        }

        let Some(id) = self.allocator.allocate() else {
            return Err(FusionError::GroupIdsExhausted {
                rule: set.rule,
                graph: graph.name.clone(),
                family: family.to_string(),
            });
        };
        for &n in &set.nodes {
            graph.node_mut(n).set_group(family, id);
        }
        self.claimed
            .entry(family.to_string())
            .or_default()
            .extend(set.nodes.iter().copied());
        if let Some(detector) = self.detectors.get_mut(family) {
            detector.commit(&set.nodes);
        }

        let node_names: Vec<String> = set
            .nodes
            .iter()
            .map(|&n| graph.node(n).name.clone())
            .collect();
        log::debug!(
            "rule '{}' committed {id} ({}) on '{}': {}",
            set.rule,
            set.pattern,
            graph.name,
            node_names.join(", ")
        );
        self.records.push(GroupRecord {
            id,
            family: family.to_string(),
            rule: set.rule,
            pattern: set.pattern,
            nodes: set.nodes,
            node_names,
            mapping_size: set.mapping_size,
        });
        Ok(id)
    }
}

/// Runs single rules; see the module docs for the per-head state machine.
#[derive(Debug, Default)]
pub struct FusionPassRunner;

impl FusionPassRunner {
    /// Applies `rule` to every head of `graph`. Returns the number of groups
    /// committed. Only structural problems are errors; a rule that fuses
    /// nothing returns `Ok(0)`.
    pub fn run(
        &self,
        graph: &mut Graph,
        rule: &RegisteredRule,
        ctx: &mut PassContext<'_>,
    ) -> Result<usize, FusionError> {
        let name = rule.rule().name();
        let family = rule.rule().family();
        let order = graph
            .topological_order()
            .map_err(|source| FusionError::Graph {
                rule: name.to_string(),
                graph: graph.name.clone(),
                source,
            })?;
        ctx.ensure_detector(graph, family, name)?;

        let mut committed = 0;
        for head in order {
            if !self.head_eligible(graph, rule, ctx, head) {
                continue;
            }
            if let Some(set) = self.select(graph, rule, ctx, head)? {
                ctx.commit(graph, family, set)?;
                committed += 1;
            }
        }
        log::info!(
            "rule '{name}' on '{}': {committed} group(s) committed",
            graph.name
        );
        Ok(committed)
    }

    fn head_eligible(
        &self,
        graph: &Graph,
        rule: &RegisteredRule,
        ctx: &PassContext<'_>,
        node: NodeHandle,
    ) -> bool {
        ctx.is_free(graph, rule.rule().family(), node)
            && ExecUnit::of(graph.node(node)) == rule.rule().unit()
    }

    /// Picks the first mapping at `head` that survives refinement, the size
    /// limit, and the cycle check.
    fn select(
        &self,
        graph: &Graph,
        rule: &RegisteredRule,
        ctx: &PassContext<'_>,
        head: NodeHandle,
    ) -> Result<Option<CandidateFusionSet>, FusionError> {
        let family = rule.rule().family();
        let Some(detector) = ctx.detectors.get(family) else {
            return Ok(None);
        };
        let matcher = Matcher::new(graph, ctx.registry, ctx.config.matcher)
            .with_filter(|h| self.head_eligible(graph, rule, ctx, h));

        for pattern in rule.patterns() {
            for mapping in matcher.match_at(head, pattern) {
                let set = match rule.rule().refine(graph, &mapping) {
                    Refinement::Accept(set) => set,
                    Refinement::Reject(reason) => {
                        log::trace!(
                            "{}: mapping of {} node(s) at '{}' rejected: {reason}",
                            rule.rule().name(),
                            mapping.len(),
                            graph.node(head).name
                        );
                        continue;
                    }
                };
                self.check_candidate(graph, rule, ctx, &set)?;
                if set.len() < ctx.config.min_group_size {
                    log::trace!(
                        "{}: candidate of {} node(s) at '{}' below minimum size",
                        rule.rule().name(),
                        set.len(),
                        graph.node(head).name
                    );
                    continue;
                }
                if detector.would_cycle(&set.nodes) {
                    log::debug!(
                        "{}: candidate of {} node(s) at '{}' discarded, contraction would close a cycle",
                        rule.rule().name(),
                        set.len(),
                        graph.node(head).name
                    );
                    continue;
                }
                return Ok(Some(set));
            }
        }
        Ok(None)
    }

    /// A refiner may only return distinct, unclaimed nodes of the graph.
    fn check_candidate(
        &self,
        graph: &Graph,
        rule: &RegisteredRule,
        ctx: &PassContext<'_>,
        set: &CandidateFusionSet,
    ) -> Result<(), FusionError> {
        let invalid = |reason: String| FusionError::InvalidCandidate {
            rule: rule.rule().name().to_string(),
            graph: graph.name.clone(),
            reason,
        };
        let mut seen = BTreeSet::new();
        for &n in &set.nodes {
            let node = graph
                .try_node(n)
                .map_err(|e| invalid(e.to_string()))?;
            if !seen.insert(n) {
                return Err(invalid(format!("node '{}' listed twice", node.name)));
            }
            if !ctx.is_free(graph, rule.rule().family(), n) {
                return Err(invalid(format!("node '{}' is already claimed", node.name)));
            }
        }
        Ok(())
    }
}
