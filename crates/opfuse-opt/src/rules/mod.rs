//! Built-in fusion rules.
//!
//! More specific shapes run first: fan-in joins and double outputs claim
//! their nodes before the generic chains see them.

mod conv;
mod join;
mod matmul;
mod vector;

pub use conv::{ConvDequantDoubleOut, ConvQuantChain};
pub use join::ConvJoinReadSelect;
pub use matmul::MatMulEpilogue;
pub use vector::ElemwiseReduce;

use crate::rule::FusionRule;

/// Element-wise operator types never fused into a cube-unit epilogue.
pub const ELEMWISE_BLACKLIST: &[&str] = &["RealDiv", "Power", "Log", "Exp"];

/// The built-in rules, in registration order.
pub fn builtin_rules() -> Vec<Box<dyn FusionRule>> {
    vec![
        Box::new(ConvJoinReadSelect),
        Box::new(ConvDequantDoubleOut),
        Box::new(ConvQuantChain),
        Box::new(MatMulEpilogue),
        Box::new(ElemwiseReduce),
    ]
}
