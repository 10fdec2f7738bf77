//! Subgraph matcher: instantiates a [`Pattern`] against the real graph.
//!
//! Matching starts from one real node bound to a head pattern node and walks
//! pattern successors in declared order:
//!
//! - `Single` edges bind exactly one real consumer of the anchor node; other
//!   consumers stay outside the match.
//! - `Multi` edges distribute distinct real consumers one-to-one over the
//!   listed successors; surplus consumers stay outside.
//! - Repeated pattern nodes extend a linear chain greedily while every link
//!   has a single consumer, and every shorter prefix down to `min` is also
//!   produced.
//! - Optional pattern nodes may be skipped; their successors then continue
//!   from the same real node.
//! - Pattern nodes that precede already-bound nodes (fan-in joins and
//!   optional prologues) are bound backwards to a real producer, in input
//!   slot order.
//!
//! Mappings come out longest first; among equally long mappings the order
//! is the search order (declared successor order, then real consumer
//! order, bindings before skips).

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use opfuse_ir::{Graph, NodeHandle};

use crate::category::CategoryRegistry;
use crate::pattern::{BranchMode, Pattern, PatternNode};

/// Default cap on the mappings enumerated for one head.
pub const DEFAULT_MAX_MAPPINGS: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MatcherOptions {
    /// Stop enumerating after this many distinct mappings per head.
    pub max_mappings: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            max_mappings: DEFAULT_MAX_MAPPINGS,
        }
    }
}

/// One instantiation of a pattern: the real nodes bound to each pattern node.
#[derive(Clone, Debug)]
pub struct Mapping<'p> {
    pattern: &'p Pattern,
    bound: Vec<Vec<NodeHandle>>,
}

impl<'p> Mapping<'p> {
    pub fn pattern(&self) -> &'p Pattern {
        self.pattern
    }

    pub fn pattern_name(&self) -> &'p str {
        self.pattern.name()
    }

    /// Real nodes bound to pattern node `id`; empty when it was skipped or
    /// the id is unknown.
    pub fn nodes_for(&self, id: &str) -> &[NodeHandle] {
        self.pattern
            .index_of(id)
            .map_or(&[][..], |idx| self.bound[idx].as_slice())
    }

    /// `(pattern node, bound nodes)` pairs in pattern declaration order.
    pub fn bindings(&self) -> impl Iterator<Item = (&'p PatternNode, &[NodeHandle])> {
        let pattern = self.pattern;
        self.bound
            .iter()
            .enumerate()
            .map(move |(idx, nodes)| (pattern.node(idx), nodes.as_slice()))
    }

    /// All bound nodes in match order: pattern declaration order, chain
    /// order within a repeated node.
    pub fn nodes(&self) -> Vec<NodeHandle> {
        self.bound.iter().flatten().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bound.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, node: NodeHandle) -> bool {
        self.bound.iter().any(|nodes| nodes.contains(&node))
    }

    /// Id of the pattern node `node` is bound to.
    pub fn pattern_node_of(&self, node: NodeHandle) -> Option<&'p str> {
        let pattern = self.pattern;
        self.bound
            .iter()
            .position(|nodes| nodes.contains(&node))
            .map(|idx| pattern.node(idx).id.as_str())
    }
}

/// Mappings found for one head, in priority order.
#[derive(Debug)]
pub struct Matches<'p> {
    inner: std::vec::IntoIter<Mapping<'p>>,
}

impl<'p> Iterator for Matches<'p> {
    type Item = Mapping<'p>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Matches<'_> {}

type NodeFilter<'g> = Box<dyn Fn(NodeHandle) -> bool + 'g>;

/// Matches patterns against one graph.
pub struct Matcher<'g> {
    graph: &'g Graph,
    registry: &'g CategoryRegistry,
    options: MatcherOptions,
    filter: Option<NodeFilter<'g>>,
}

impl fmt::Debug for Matcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("graph", &self.graph.name)
            .field("options", &self.options)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

impl<'g> Matcher<'g> {
    pub fn new(graph: &'g Graph, registry: &'g CategoryRegistry, options: MatcherOptions) -> Self {
        Self {
            graph,
            registry,
            options,
            filter: None,
        }
    }

    /// Restricts matching to nodes for which `eligible` returns `true`.
    pub fn with_filter(mut self, eligible: impl Fn(NodeHandle) -> bool + 'g) -> Self {
        self.filter = Some(Box::new(eligible));
        self
    }

    /// Enumerates every mapping of `pattern` that binds `head` to one of the
    /// pattern's head nodes. No state is shared between calls.
    pub fn match_at<'p>(&self, head: NodeHandle, pattern: &'p Pattern) -> Matches<'p> {
        let mut search = Search {
            matcher: self,
            pattern,
            found: Vec::new(),
            seen: BTreeSet::new(),
        };

        if self.graph.contains(head) {
            for &h in pattern.heads() {
                let pnode = pattern.node(h);
                if !self.accepts(pnode, head) {
                    continue;
                }
                let blank = State::new(pattern.nodes().len());
                for chain in search.chains(&blank, pnode, head) {
                    let mut state = blank.clone();
                    state.bind(h, chain);
                    state.tasks.push_back(Task::Expand(h));
                    search.step(state);
                }
            }
        }

        let mut found = search.found;
        found.sort_by(|a, b| count(b).cmp(&count(a)));
        log::trace!(
            "pattern '{}' at '{}': {} mapping(s)",
            pattern.name(),
            self.graph.try_node(head).map_or("?", |n| n.name.as_str()),
            found.len()
        );
        let mappings: Vec<_> = found
            .into_iter()
            .map(|bound| Mapping { pattern, bound })
            .collect();
        Matches {
            inner: mappings.into_iter(),
        }
    }

    fn eligible(&self, node: NodeHandle) -> bool {
        self.filter.as_ref().is_none_or(|f| f(node))
    }

    fn accepts(&self, pnode: &PatternNode, node: NodeHandle) -> bool {
        self.eligible(node)
            && pnode
                .categories
                .accepts(self.registry.category_of(self.graph.node(node)))
    }
}

fn count(bound: &[Vec<NodeHandle>]) -> usize {
    bound.iter().map(Vec::len).sum()
}

#[derive(Clone, Debug)]
enum Task {
    /// Match the open successors of a resolved pattern node.
    Expand(usize),
    /// Bind successors `succs[next..]` to distinct consumers of `from`.
    Assign {
        from: NodeHandle,
        succs: Vec<usize>,
        next: usize,
        partial: bool,
        taken: Vec<NodeHandle>,
    },
}

/// Partial mapping plus pending work.
#[derive(Clone, Debug)]
struct State {
    /// `None` while unresolved, an empty list when skipped.
    bound: Vec<Option<Vec<NodeHandle>>>,
    /// Real node whose consumers feed this pattern node's successors.
    anchor: Vec<Option<NodeHandle>>,
    used: BTreeSet<NodeHandle>,
    tasks: VecDeque<Task>,
}

impl State {
    fn new(len: usize) -> Self {
        Self {
            bound: vec![None; len],
            anchor: vec![None; len],
            used: BTreeSet::new(),
            tasks: VecDeque::new(),
        }
    }

    fn bind(&mut self, idx: usize, chain: Vec<NodeHandle>) {
        self.anchor[idx] = chain.last().copied();
        self.used.extend(chain.iter().copied());
        self.bound[idx] = Some(chain);
    }

    fn skip(&mut self, idx: usize, anchor: Option<NodeHandle>) {
        self.anchor[idx] = anchor;
        self.bound[idx] = Some(Vec::new());
    }
}

struct Search<'a, 'g, 'p> {
    matcher: &'a Matcher<'g>,
    pattern: &'p Pattern,
    found: Vec<Vec<Vec<NodeHandle>>>,
    seen: BTreeSet<Vec<Vec<NodeHandle>>>,
}

impl Search<'_, '_, '_> {
    fn full(&self) -> bool {
        self.found.len() >= self.matcher.options.max_mappings
    }

    fn graph(&self) -> &Graph {
        self.matcher.graph
    }

    fn step(&mut self, mut state: State) {
        if self.full() {
            return;
        }
        match state.tasks.pop_front() {
            Some(Task::Expand(idx)) => self.expand(state, idx),
            Some(Task::Assign {
                from,
                succs,
                next,
                partial,
                taken,
            }) => self.assign(state, from, succs, next, partial, taken),
            None => self.resolve_rest(state),
        }
    }

    fn expand(&mut self, mut state: State, idx: usize) {
        let pattern = self.pattern;
        let pnode = pattern.node(idx);
        let Some(from) = state.anchor[idx] else {
            return self.step(state);
        };

        let mut open = Vec::new();
        for &s in &pnode.successors {
            if state.bound[s].is_none() {
                open.push(s);
            } else if !self.feeds(&state, from, s) {
                return;
            }
        }
        if open.is_empty() {
            return self.step(state);
        }

        let assign = |succs: Vec<usize>| Task::Assign {
            from,
            succs,
            next: 0,
            partial: pnode.allow_partial,
            taken: Vec::new(),
        };
        match pnode.mode {
            BranchMode::Single if open.len() > 1 => {
                for &s in &open {
                    let mut alt = state.clone();
                    alt.tasks.push_front(assign(vec![s]));
                    self.step(alt);
                    if self.full() {
                        return;
                    }
                }
            }
            BranchMode::Single | BranchMode::Multi => {
                state.tasks.push_front(assign(open));
                self.step(state);
            }
        }
    }

    fn assign(
        &mut self,
        mut state: State,
        from: NodeHandle,
        succs: Vec<usize>,
        next: usize,
        partial: bool,
        taken: Vec<NodeHandle>,
    ) {
        let Some(&s) = succs.get(next) else {
            return self.step(state);
        };
        let then = |taken: Vec<NodeHandle>| Task::Assign {
            from,
            succs: succs.clone(),
            next: next + 1,
            partial,
            taken,
        };

        if state.bound[s].is_some() {
            if self.feeds(&state, from, s) {
                state.tasks.push_front(then(taken));
                self.step(state);
            }
            return;
        }

        let pattern = self.pattern;
        let pnode = pattern.node(s);
        for c in self.graph().data_consumers(from) {
            if taken.contains(&c) || state.used.contains(&c) || !self.matcher.accepts(pnode, c) {
                continue;
            }
            for chain in self.chains(&state, pnode, c) {
                let mut alt = state.clone();
                alt.bind(s, chain);
                alt.tasks.push_back(Task::Expand(s));
                let mut taken = taken.clone();
                taken.push(c);
                alt.tasks.push_front(then(taken));
                self.step(alt);
                if self.full() {
                    return;
                }
            }
        }

        if pnode.is_optional() || partial {
            state.skip(s, Some(from));
            state.tasks.push_back(Task::Expand(s));
            state.tasks.push_front(then(taken));
            self.step(state);
        }
    }

    /// Binds pattern nodes the forward walk could not reach: predecessors of
    /// bound nodes are bound backwards, anything left must be optional.
    fn resolve_rest(&mut self, mut state: State) {
        let pattern = self.pattern;
        let pick = (0..pattern.nodes().len()).find_map(|q| {
            if state.bound[q].is_some() {
                return None;
            }
            pattern.node(q).successors.iter().find_map(|&s| {
                state.bound[s]
                    .as_ref()
                    .and_then(|_| entries(pattern, &state.bound, s).first().copied())
                    .map(|target| (q, target))
            })
        });

        let Some((q, target)) = pick else {
            let required_open = (0..pattern.nodes().len())
                .any(|q| state.bound[q].is_none() && !pattern.node(q).is_optional());
            if required_open {
                return;
            }
            for q in 0..pattern.nodes().len() {
                if state.bound[q].is_none() {
                    state.skip(q, None);
                }
            }
            return self.finish(state);
        };

        let pnode = pattern.node(q);
        if pnode.min <= 1 {
            for r in self.graph().data_producers(target) {
                if state.used.contains(&r) || !self.matcher.accepts(pnode, r) {
                    continue;
                }
                let feeds_all = pnode
                    .successors
                    .iter()
                    .all(|&s| state.bound[s].is_none() || self.feeds(&state, r, s));
                if !feeds_all {
                    continue;
                }
                let mut alt = state.clone();
                alt.bind(q, vec![r]);
                alt.tasks.push_back(Task::Expand(q));
                self.step(alt);
                if self.full() {
                    return;
                }
            }
        }
        if pnode.is_optional() {
            state.skip(q, None);
            self.step(state);
        }
    }

    /// Checks mirrored connectivity and records a complete mapping.
    fn finish(&mut self, state: State) {
        let graph = self.graph();
        for (idx, chain) in state.bound.iter().enumerate() {
            let Some(&tail) = chain.as_ref().and_then(|c| c.last()) else {
                continue;
            };
            let inside: Vec<_> = graph
                .data_consumers(tail)
                .into_iter()
                .filter(|c| state.used.contains(c))
                .collect();
            if inside.is_empty() {
                continue;
            }
            let pnode = self.pattern.node(idx);
            if pnode.mode == BranchMode::Single && inside.len() > 1 {
                return;
            }
            let allowed: Vec<_> = pnode
                .successors
                .iter()
                .flat_map(|&s| entries(self.pattern, &state.bound, s))
                .collect();
            if inside.iter().any(|c| !allowed.contains(c)) {
                return;
            }
        }

        let bound: Vec<Vec<NodeHandle>> = state
            .bound
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();
        if count(&bound) > 0 && self.seen.insert(bound.clone()) {
            self.found.push(bound);
        }
    }

    /// Candidate chains for `pnode` starting at `start`, longest first.
    fn chains(&self, state: &State, pnode: &PatternNode, start: NodeHandle) -> Vec<Vec<NodeHandle>> {
        let graph = self.graph();
        let mut chain = vec![start];
        while (chain.len() as u64) < u64::from(pnode.max) {
            let Some(&tail) = chain.last() else { break };
            let consumers = graph.data_consumers(tail);
            let [next] = consumers.as_slice() else { break };
            if state.used.contains(next) || chain.contains(next) || !self.matcher.accepts(pnode, *next)
            {
                break;
            }
            chain.push(*next);
        }
        let min = pnode.min.max(1) as usize;
        (min..=chain.len()).rev().map(|n| chain[..n].to_vec()).collect()
    }

    /// Whether every entry node of resolved pattern node `s` consumes `from`.
    fn feeds(&self, state: &State, from: NodeHandle, s: usize) -> bool {
        let consumers = self.graph().data_consumers(from);
        entries(self.pattern, &state.bound, s)
            .iter()
            .all(|e| consumers.contains(e))
    }
}

/// Real nodes a predecessor of pattern node `idx` must feed: the first node
/// of its chain, or for a skipped node the entries of its successors.
fn entries(pattern: &Pattern, bound: &[Option<Vec<NodeHandle>>], idx: usize) -> Vec<NodeHandle> {
    match &bound[idx] {
        Some(chain) if !chain.is_empty() => vec![chain[0]],
        Some(_) => {
            let mut out = Vec::new();
            for &s in &pattern.node(idx).successors {
                for e in entries(pattern, bound, s) {
                    if !out.contains(&e) {
                        out.push(e);
                    }
                }
            }
            out
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{Category, CategorySet};
    use crate::pattern::{PatternBuilder, REPEAT_MAX};

    fn cats(c: Category) -> CategorySet {
        CategorySet::of(&[c])
    }

    fn build(ops: &[(&str, &str)], edges: &[(&str, &str)]) -> Graph {
        let mut g = Graph::new("t");
        for (name, op) in ops {
            g.add_node(*name, *op).unwrap();
        }
        for (a, b) in edges {
            let (a, b) = (g.find(a).unwrap(), g.find(b).unwrap());
            g.connect(a, b).unwrap();
        }
        g
    }

    fn names(g: &Graph, m: &Mapping<'_>) -> Vec<String> {
        m.nodes().iter().map(|&h| g.node(h).name.clone()).collect()
    }

    fn conv_chain() -> Pattern {
        PatternBuilder::new("conv_chain")
            .add_node("conv", cats(Category::Conv), 1, 1)
            .add_node("dq", cats(Category::Dequant), 0, 1)
            .add_node("ew", cats(Category::Elemwise), 0, 5)
            .add_node("q", cats(Category::Quant), 0, 1)
            .connect("conv", &["dq"], BranchMode::Single, false)
            .connect("dq", &["ew"], BranchMode::Single, false)
            .connect("ew", &["q"], BranchMode::Single, false)
            .set_head(&["conv"])
            .build()
            .unwrap()
    }

    #[test]
    fn chain_prefixes_longest_first() {
        let g = build(
            &[("c", "Conv2D"), ("d", "AscendDequant"), ("a", "Add"), ("r", "Relu")],
            &[("c", "d"), ("d", "a"), ("a", "r")],
        );
        let registry = CategoryRegistry::with_builtins();
        let pattern = conv_chain();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        let all: Vec<_> = matcher
            .match_at(g.find("c").unwrap(), &pattern)
            .map(|m| names(&g, &m))
            .collect();
        assert_eq!(
            all,
            vec![
                vec!["c", "d", "a", "r"],
                vec!["c", "d", "a"],
                vec!["c", "d"],
                vec!["c"],
            ]
        );
    }

    #[test]
    fn mapping_accessors() {
        let g = build(
            &[("c", "Conv2D"), ("a", "Add"), ("r", "Relu")],
            &[("c", "a"), ("a", "r")],
        );
        let registry = CategoryRegistry::with_builtins();
        let pattern = conv_chain();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        let first = matcher
            .match_at(g.find("c").unwrap(), &pattern)
            .next()
            .unwrap();
        let (a, r) = (g.find("a").unwrap(), g.find("r").unwrap());
        assert_eq!(first.pattern_name(), "conv_chain");
        assert_eq!(first.nodes_for("ew"), &[a, r]);
        assert!(first.nodes_for("dq").is_empty());
        assert!(first.nodes_for("nope").is_empty());
        assert_eq!(first.len(), 3);
        assert!(first.contains(r));
        assert_eq!(first.pattern_node_of(r), Some("ew"));
        assert_eq!(first.pattern_node_of(g.find("c").unwrap()), Some("conv"));
    }

    #[test]
    fn chain_stops_at_fan_out() {
        // a has two consumers, so the chain cannot grow past it.
        let g = build(
            &[("c", "Conv2D"), ("a", "Add"), ("r", "Relu"), ("x", "Custom")],
            &[("c", "a"), ("a", "r"), ("a", "x")],
        );
        let registry = CategoryRegistry::with_builtins();
        let pattern = conv_chain();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        let first = matcher
            .match_at(g.find("c").unwrap(), &pattern)
            .next()
            .unwrap();
        assert_eq!(names(&g, &first), vec!["c", "a"]);
    }

    #[test]
    fn single_picks_one_consumer_at_a_time() {
        let g = build(
            &[("c", "Conv2D"), ("r1", "Relu"), ("r2", "Relu")],
            &[("c", "r1"), ("c", "r2")],
        );
        let registry = CategoryRegistry::with_builtins();
        let pattern = conv_chain();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        let all: Vec<_> = matcher
            .match_at(g.find("c").unwrap(), &pattern)
            .map(|m| names(&g, &m))
            .collect();
        assert_eq!(all, vec![vec!["c", "r1"], vec!["c", "r2"], vec!["c"]]);
    }

    #[test]
    fn multi_distributes_consumers() {
        let pattern = PatternBuilder::new("double_out")
            .add_node("conv", cats(Category::Conv), 1, 1)
            .add_node("dq", cats(Category::Dequant), 1, 1)
            .add_node("q", cats(Category::Quant), 1, 1)
            .add_node("ew", cats(Category::Elemwise), 0, 1)
            .connect("conv", &["dq"], BranchMode::Single, false)
            .connect("dq", &["q", "ew"], BranchMode::Multi, false)
            .set_head(&["conv"])
            .build()
            .unwrap();
        let g = build(
            &[
                ("c", "Conv2D"),
                ("d", "AscendDequant"),
                ("q", "AscendQuant"),
                ("r", "Relu"),
                ("x", "Custom"),
            ],
            &[("c", "d"), ("d", "q"), ("d", "r"), ("d", "x")],
        );
        let registry = CategoryRegistry::with_builtins();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        let all: Vec<_> = matcher
            .match_at(g.find("c").unwrap(), &pattern)
            .map(|m| names(&g, &m))
            .collect();
        assert_eq!(all, vec![vec!["c", "d", "q", "r"], vec!["c", "d", "q"]]);
    }

    #[test]
    fn fan_in_binds_backwards() {
        let pattern = PatternBuilder::new("join")
            .add_node("conv", cats(Category::Conv), 1, 1)
            .add_node("ew", cats(Category::Elemwise), 1, 1)
            .add_node("sel", cats(Category::ReadSelect), 1, 1)
            .connect("conv", &["ew"], BranchMode::Single, false)
            .connect("sel", &["ew"], BranchMode::Single, false)
            .set_head(&["conv", "sel"])
            .build()
            .unwrap();
        let g = build(
            &[("s", "ReadSelect"), ("c", "Conv2D"), ("a", "Add")],
            &[("c", "a"), ("s", "a")],
        );
        let registry = CategoryRegistry::with_builtins();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        for head in ["c", "s"] {
            let all: Vec<_> = matcher
                .match_at(g.find(head).unwrap(), &pattern)
                .map(|m| names(&g, &m))
                .collect();
            assert_eq!(all, vec![vec!["c", "a", "s"]], "head {head}");
        }
    }

    #[test]
    fn diamond_breaks_mirrored_connectivity() {
        // c feeds both d and a directly; the pattern only has c -> d -> a.
        let g = build(
            &[("c", "Conv2D"), ("d", "AscendDequant"), ("a", "Add")],
            &[("c", "d"), ("d", "a"), ("c", "a")],
        );
        let registry = CategoryRegistry::with_builtins();
        let pattern = conv_chain();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        let all: Vec<_> = matcher
            .match_at(g.find("c").unwrap(), &pattern)
            .map(|m| names(&g, &m))
            .collect();
        assert!(!all.contains(&vec!["c".to_string(), "d".into(), "a".into()]));
        assert!(all.contains(&vec!["c".to_string(), "d".into()]));
    }

    #[test]
    fn filter_and_cap() {
        let g = build(
            &[("c", "Conv2D"), ("a", "Add"), ("r", "Relu")],
            &[("c", "a"), ("a", "r")],
        );
        let registry = CategoryRegistry::with_builtins();
        let pattern = conv_chain();
        let r = g.find("r").unwrap();
        let matcher =
            Matcher::new(&g, &registry, MatcherOptions::default()).with_filter(move |h| h != r);
        let first = matcher
            .match_at(g.find("c").unwrap(), &pattern)
            .next()
            .unwrap();
        assert_eq!(names(&g, &first), vec!["c", "a"]);

        let capped = Matcher::new(&g, &registry, MatcherOptions { max_mappings: 1 });
        assert_eq!(capped.match_at(g.find("c").unwrap(), &pattern).len(), 1);
    }

    #[test]
    fn no_match_is_empty() {
        let g = build(&[("r", "Relu")], &[]);
        let registry = CategoryRegistry::with_builtins();
        let pattern = conv_chain();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        assert_eq!(matcher.match_at(g.find("r").unwrap(), &pattern).count(), 0);
    }

    #[test]
    fn unbounded_repeat() {
        let pattern = PatternBuilder::new("ew")
            .add_node("ew", cats(Category::Elemwise), 2, REPEAT_MAX)
            .set_head(&["ew"])
            .build()
            .unwrap();
        let g = build(
            &[("a", "Add"), ("b", "Mul"), ("c", "Relu")],
            &[("a", "b"), ("b", "c")],
        );
        let registry = CategoryRegistry::with_builtins();
        let matcher = Matcher::new(&g, &registry, MatcherOptions::default());
        let all: Vec<_> = matcher
            .match_at(g.find("a").unwrap(), &pattern)
            .map(|m| names(&g, &m))
            .collect();
        assert_eq!(all, vec![vec!["a", "b", "c"], vec!["a", "b"]]);
    }
}
