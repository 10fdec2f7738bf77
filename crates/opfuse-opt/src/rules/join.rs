//! Fan-in join of a convolution result with a select read.

use opfuse_analysis::{
    BranchMode, Category, CategorySet, Mapping, Pattern, PatternBuilder, PatternError,
};
use opfuse_ir::Graph;

use crate::refine;
use crate::rule::{FusionRule, Refinement};

/// `Conv -> (Dequant)? -> Elemwise <- ReadSelect`, both operands of the
/// join agreeing on dtype and format.
#[derive(Debug)]
pub struct ConvJoinReadSelect;

impl FusionRule for ConvJoinReadSelect {
    fn name(&self) -> &str {
        "conv_join_read_select"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn define_patterns(&self) -> Result<Vec<Pattern>, PatternError> {
        let pattern = PatternBuilder::new("conv_join_read_select")
            .add_node("conv", CategorySet::of(&[Category::Conv]), 1, 1)
            .add_node("dequant", CategorySet::of(&[Category::Dequant]), 0, 1)
            .add_node("elemwise", CategorySet::of(&[Category::Elemwise]), 1, 1)
            .add_node("select", CategorySet::of(&[Category::ReadSelect]), 1, 1)
            .connect("conv", &["dequant"], BranchMode::Single, false)
            .connect("dequant", &["elemwise"], BranchMode::Single, false)
            .connect("select", &["elemwise"], BranchMode::Single, false)
            .set_head(&["conv", "select"])
            .build()?;
        Ok(vec![pattern])
    }

    fn refine(&self, graph: &Graph, mapping: &Mapping<'_>) -> Refinement {
        let check = refine::join_agreement(graph, mapping, "elemwise")
            .and_then(|()| refine::multi_output(graph, mapping, &[]));
        Refinement::from_check(self.name(), mapping, check)
    }
}
