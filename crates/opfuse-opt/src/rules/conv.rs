//! Convolution epilogue rules.

use opfuse_analysis::{
    BranchMode, Category, CategorySet, Mapping, Pattern, PatternBuilder, PatternError,
};
use opfuse_ir::Graph;

use super::ELEMWISE_BLACKLIST;
use crate::refine;
use crate::rule::{FusionRule, Refinement};

fn one(c: Category) -> CategorySet {
    CategorySet::of(&[c])
}

/// `(StridedRead)? -> Conv -> (Dequant)? -> Elemwise{0..5} -> (Quant)? -> (StridedWrite)?`
#[derive(Debug)]
pub struct ConvQuantChain;

impl FusionRule for ConvQuantChain {
    fn name(&self) -> &str {
        "conv_quant_chain"
    }

    fn priority(&self) -> u32 {
        300
    }

    fn define_patterns(&self) -> Result<Vec<Pattern>, PatternError> {
        let pattern = PatternBuilder::new("conv_dequant_elemwise_quant")
            .add_node("read", one(Category::StridedRead), 0, 1)
            .add_node("conv", one(Category::Conv), 1, 1)
            .add_node("dequant", one(Category::Dequant), 0, 1)
            .add_node("elemwise", one(Category::Elemwise), 0, 5)
            .add_node("quant", one(Category::Quant), 0, 1)
            .add_node("write", one(Category::StridedWrite), 0, 1)
            .connect("read", &["conv"], BranchMode::Single, false)
            .connect("conv", &["dequant"], BranchMode::Single, false)
            .connect("dequant", &["elemwise"], BranchMode::Single, false)
            .connect("elemwise", &["quant"], BranchMode::Single, false)
            .connect("quant", &["write"], BranchMode::Single, false)
            .set_head(&["read", "conv"])
            .build()?;
        Ok(vec![pattern])
    }

    fn refine(&self, graph: &Graph, mapping: &Mapping<'_>) -> Refinement {
        let check = refine::op_blacklist(graph, mapping, "elemwise", ELEMWISE_BLACKLIST)
            .and_then(|()| refine::multi_output(graph, mapping, &["dequant", "elemwise"]));
        Refinement::from_check(self.name(), mapping, check)
    }
}

/// `Conv -> Dequant -> MULTI [Quant, (Elemwise)?]`: the dequantized result is
/// both requantized and post-processed.
#[derive(Debug)]
pub struct ConvDequantDoubleOut;

impl FusionRule for ConvDequantDoubleOut {
    fn name(&self) -> &str {
        "conv_dequant_double_out"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn define_patterns(&self) -> Result<Vec<Pattern>, PatternError> {
        let pattern = PatternBuilder::new("conv_dequant_double_out")
            .add_node("conv", one(Category::Conv), 1, 1)
            .add_node("dequant", one(Category::Dequant), 1, 1)
            .add_node("quant", one(Category::Quant), 1, 1)
            .add_node("elemwise", one(Category::Elemwise), 0, 1)
            .connect("conv", &["dequant"], BranchMode::Single, false)
            .connect("dequant", &["quant", "elemwise"], BranchMode::Multi, false)
            .set_head(&["conv"])
            .build()?;
        Ok(vec![pattern])
    }

    fn refine(&self, graph: &Graph, mapping: &Mapping<'_>) -> Refinement {
        if mapping.nodes_for("elemwise").is_empty() {
            return Refinement::Reject("single output, left to the chain rule".into());
        }
        let check = refine::op_blacklist(graph, mapping, "elemwise", ELEMWISE_BLACKLIST)
            .and_then(|()| refine::multi_output(graph, mapping, &["dequant"]));
        Refinement::from_check(self.name(), mapping, check)
    }
}
