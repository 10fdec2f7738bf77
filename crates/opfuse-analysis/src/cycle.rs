//! Cycle check for candidate node contractions.
//!
//! [`CycleDetector`] keeps, for every node, the set of nodes that can reach
//! it over data and control edges. Committed groups are contracted in place:
//! members share the union of their ancestors and every descendant inherits
//! it, so later queries see each group as a single node without rebuilding
//! the index.

use opfuse_ir::{Graph, GraphError, HandleMap, Node, NodeHandle};

/// Fixed-width bit set indexed by node handle.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: vec![0; bits.div_ceil(64)],
        }
    }

    pub fn insert(&mut self, bit: usize) -> bool {
        let (w, mask) = (bit / 64, 1u64 << (bit % 64));
        if w >= self.words.len() {
            self.words.resize(w + 1, 0);
        }
        let fresh = self.words[w] & mask == 0;
        self.words[w] |= mask;
        fresh
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1u64 << (bit % 64)) != 0)
    }

    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
    }

    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64)
                .filter(move |b| word & (1u64 << b) != 0)
                .map(move |b| i * 64 + b)
        })
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::default();
        for bit in iter {
            set.insert(bit);
        }
        set
    }
}

/// Reachability index answering "would contracting these nodes close a cycle?".
#[derive(Clone, Debug)]
pub struct CycleDetector {
    /// Strict ancestors of every node; for group members this also holds
    /// the other members of the group.
    ancestors: HandleMap<Node, BitSet>,
    handles: Vec<NodeHandle>,
    commits: usize,
}

impl CycleDetector {
    /// Builds the index over the current graph. Fails if the graph already
    /// contains a cycle.
    pub fn new(graph: &Graph) -> Result<Self, GraphError> {
        let order = graph.topological_order()?;
        let mut ancestors: HandleMap<Node, BitSet> =
            HandleMap::with_capacity(graph.len());
        for &h in &order {
            let mut set = BitSet::with_capacity(graph.len());
            for p in graph.predecessors(h) {
                set.insert(p.index());
                if let Some(anc) = ancestors.get(p) {
                    set.union_with(anc);
                }
            }
            ancestors.insert(h, set);
        }
        Ok(Self {
            ancestors,
            handles: graph.handles().collect(),
            commits: 0,
        })
    }

    /// Builds the index and contracts the groups of `family` already
    /// recorded on the graph.
    pub fn with_groups(graph: &Graph, family: &str) -> Result<Self, GraphError> {
        let mut detector = Self::new(graph)?;
        for members in graph.groups(family).values() {
            detector.commit(members);
        }
        Ok(detector)
    }

    /// Number of contractions applied since construction.
    pub fn commits(&self) -> usize {
        self.commits
    }

    /// Returns `true` if `node` can reach `target`, taking committed
    /// contractions into account.
    pub fn reaches(&self, node: NodeHandle, target: NodeHandle) -> bool {
        self.ancestors
            .get(target)
            .is_some_and(|anc| anc.contains(node.index()))
    }

    /// Returns `true` if contracting `candidate` into one node would create a
    /// directed cycle: some node outside the set is reachable from the set
    /// and also reaches back into it. Paths running only between members,
    /// control edges included, never count.
    pub fn would_cycle(&self, candidate: &[NodeHandle]) -> bool {
        let members: BitSet = candidate.iter().map(|h| h.index()).collect();
        let mut upstream = BitSet::default();
        for &m in candidate {
            if let Some(anc) = self.ancestors.get(m) {
                upstream.union_with(anc);
            }
        }
        upstream
            .iter()
            .filter(|&x| !members.contains(x))
            .any(|x| self.ancestors_at(x).is_some_and(|anc| anc.intersects(&members)))
    }

    /// Records `members` as contracted into a single node.
    pub fn commit(&mut self, members: &[NodeHandle]) {
        let member_bits: BitSet = members.iter().map(|h| h.index()).collect();
        let mut shared = member_bits.clone();
        for &m in members {
            if let Some(anc) = self.ancestors.get(m) {
                shared.union_with(anc);
            }
        }
        for &h in &self.handles {
            let Some(anc) = self.ancestors.get_mut(h) else {
                continue;
            };
            if member_bits.contains(h.index()) || anc.intersects(&member_bits) {
                anc.union_with(&shared);
            }
        }
        self.commits += 1;
    }

    fn ancestors_at(&self, index: usize) -> Option<&BitSet> {
        self.handles
            .get(index)
            .and_then(|&h| self.ancestors.get(h))
    }
}
