//! Vector-core rules.

use opfuse_analysis::{
    BranchMode, Category, CategorySet, Mapping, Pattern, PatternBuilder, PatternError,
};
use opfuse_ir::Graph;

use crate::refine;
use crate::rule::{ExecUnit, FusionRule, Refinement};

/// `Elemwise{1..4} -> (Reduce)?` on the vector core. Every tensor along the
/// chain, and the tensor the reduction reads, must have one shape.
#[derive(Debug)]
pub struct ElemwiseReduce;

impl FusionRule for ElemwiseReduce {
    fn name(&self) -> &str {
        "elemwise_reduce"
    }

    fn unit(&self) -> ExecUnit {
        ExecUnit::VectorCore
    }

    fn priority(&self) -> u32 {
        500
    }

    fn define_patterns(&self) -> Result<Vec<Pattern>, PatternError> {
        let pattern = PatternBuilder::new("elemwise_reduce")
            .add_node("elemwise", CategorySet::of(&[Category::Elemwise]), 1, 4)
            .add_node("reduce", CategorySet::of(&[Category::Reduce]), 0, 1)
            .connect("elemwise", &["reduce"], BranchMode::Single, false)
            .set_head(&["elemwise"])
            .build()?;
        Ok(vec![pattern])
    }

    fn refine(&self, graph: &Graph, mapping: &Mapping<'_>) -> Refinement {
        let chain = mapping.nodes_for("elemwise");
        let mut shapes: Vec<&[i64]> = chain
            .iter()
            .map(|&h| refine::output_shape(graph, h))
            .collect();
        for &reduce in mapping.nodes_for("reduce") {
            for (slot, input) in graph.node(reduce).inputs().iter().enumerate() {
                let fed_by_chain = input.is_some_and(|ep| chain.contains(&ep.node));
                if let (true, Some(desc)) = (fed_by_chain, graph.input_desc(reduce, slot as u32)) {
                    shapes.push(&desc.shape);
                }
            }
        }
        let check = refine::uniform_shapes("elemwise chain", shapes)
            .and_then(|()| refine::multi_output(graph, mapping, &[]));
        Refinement::from_check(self.name(), mapping, check)
    }
}
