//! Matrix multiplication epilogue rule.

use opfuse_analysis::{
    BranchMode, Category, CategorySet, Mapping, Pattern, PatternBuilder, PatternError,
};
use opfuse_ir::Graph;

use super::ELEMWISE_BLACKLIST;
use crate::refine;
use crate::rule::{FusionRule, Refinement};

/// `MatMul -> (Dequant)? -> Elemwise{1..3}`
#[derive(Debug)]
pub struct MatMulEpilogue;

impl FusionRule for MatMulEpilogue {
    fn name(&self) -> &str {
        "matmul_epilogue"
    }

    fn priority(&self) -> u32 {
        400
    }

    fn define_patterns(&self) -> Result<Vec<Pattern>, PatternError> {
        let pattern = PatternBuilder::new("matmul_dequant_elemwise")
            .add_node("matmul", CategorySet::of(&[Category::MatMul]), 1, 1)
            .add_node("dequant", CategorySet::of(&[Category::Dequant]), 0, 1)
            .add_node("elemwise", CategorySet::of(&[Category::Elemwise]), 1, 3)
            .connect("matmul", &["dequant"], BranchMode::Single, false)
            .connect("dequant", &["elemwise"], BranchMode::Single, false)
            .set_head(&["matmul"])
            .build()?;
        Ok(vec![pattern])
    }

    fn refine(&self, graph: &Graph, mapping: &Mapping<'_>) -> Refinement {
        let check = refine::op_blacklist(graph, mapping, "elemwise", ELEMWISE_BLACKLIST)
            .and_then(|()| refine::multi_output(graph, mapping, &[]));
        Refinement::from_check(self.name(), mapping, check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opfuse_analysis::{CategoryRegistry, Matcher, MatcherOptions};
    use opfuse_ir::parse_graph;

    #[test]
    fn epilogue_caps_at_three() {
        let graph = parse_graph(
            "node mm MatMulV2\nnode a Add\nnode b Mul\nnode c Relu\nnode d Sigmoid\n\
             edge mm -> a\nedge a -> b\nedge b -> c\nedge c -> d",
        )
        .unwrap();
        let registry = CategoryRegistry::with_builtins();
        let patterns = MatMulEpilogue.define_patterns().unwrap();
        let matcher = Matcher::new(&graph, &registry, MatcherOptions::default());
        let sizes: Vec<usize> = matcher
            .match_at(graph.find("mm").unwrap(), &patterns[0])
            .map(|m| m.len())
            .collect();
        assert_eq!(sizes, vec![4, 3, 2]);
    }
}
