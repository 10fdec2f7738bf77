//! Operator categories used by fusion patterns.
//!
//! A [`CategoryRegistry`] maps concrete operator type names to the abstract
//! [`Category`] tags that pattern nodes accept. The lookup is total: an
//! unknown type name yields the empty set. Nodes may carry an explicit
//! override (see [`opfuse_ir::CATEGORY_OVERRIDE_ATTR`]) that wins over the
//! type-name table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use opfuse_ir::{AttrValue, CATEGORY_OVERRIDE_ATTR, Node};

/// Abstract operator classification.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum Category {
    /// Convolutions (cube unit).
    Conv = 0,
    /// Matrix multiplications (cube unit).
    MatMul,
    Pool,
    /// Element-wise ops, including activations.
    Elemwise,
    Broadcast,
    Reduce,
    Norm,
    Quant,
    Dequant,
    Requant,
    /// Strided slice read feeding a compute op.
    StridedRead,
    /// Strided write of a compute op's result.
    StridedWrite,
    ReadSelect,
    WriteSelect,
    /// Graph input placeholder.
    InputBoundary,
    /// Graph output sink.
    OutputBoundary,
    /// Matches every node.
    Any,
}

impl Category {
    pub const ALL: [Category; 17] = [
        Self::Conv,
        Self::MatMul,
        Self::Pool,
        Self::Elemwise,
        Self::Broadcast,
        Self::Reduce,
        Self::Norm,
        Self::Quant,
        Self::Dequant,
        Self::Requant,
        Self::StridedRead,
        Self::StridedWrite,
        Self::ReadSelect,
        Self::WriteSelect,
        Self::InputBoundary,
        Self::OutputBoundary,
        Self::Any,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conv => "conv",
            Self::MatMul => "matmul",
            Self::Pool => "pool",
            Self::Elemwise => "elemwise",
            Self::Broadcast => "broadcast",
            Self::Reduce => "reduce",
            Self::Norm => "norm",
            Self::Quant => "quant",
            Self::Dequant => "dequant",
            Self::Requant => "requant",
            Self::StridedRead => "strided_read",
            Self::StridedWrite => "strided_write",
            Self::ReadSelect => "read_select",
            Self::WriteSelect => "write_select",
            Self::InputBoundary => "input",
            Self::OutputBoundary => "output",
            Self::Any => "any",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// A set of categories, stored as a bit mask.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct CategorySet(u32);

impl CategorySet {
    pub const EMPTY: Self = Self(0);

    pub fn of(categories: &[Category]) -> Self {
        categories.iter().fold(Self::EMPTY, |set, c| set.with(*c))
    }

    pub fn with(self, category: Category) -> Self {
        Self(self.0 | category.bit())
    }

    pub fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if a pattern slot accepting `self` accepts a node
    /// whose categories are `node`. `Any` in the pattern accepts everything.
    pub fn accepts(self, node: CategorySet) -> bool {
        self.contains(Category::Any) || self.0 & node.0 != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, c) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{c}")?;
        }
        f.write_str("}")
    }
}

impl FromIterator<Category> for CategorySet {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, |set, c| set.with(c))
    }
}

const CONV_OPS: &[&str] = &["Conv2D", "Conv3D", "DepthwiseConv2D", "Conv2DTranspose"];
const MATMUL_OPS: &[&str] = &["MatMul", "MatMulV2", "BatchMatMul", "FullyConnection"];
const POOL_OPS: &[&str] = &["MaxPool", "AvgPool", "Pooling"];
const ELEMWISE_OPS: &[&str] = &[
    "Add", "Sub", "Mul", "RealDiv", "Maximum", "Minimum", "Relu", "Relu6", "LeakyRelu",
    "PRelu", "Sigmoid", "Tanh", "Gelu", "Swish", "Exp", "Log", "Sqrt", "Rsqrt", "Abs",
    "Neg", "Cast", "Muls", "Adds", "Power", "Eltwise",
];
const BROADCAST_OPS: &[&str] = &["BroadcastTo", "Tile"];
const REDUCE_OPS: &[&str] = &["ReduceSum", "ReduceMean", "ReduceMax", "ReduceMin"];
const NORM_OPS: &[&str] = &["BatchNorm", "LayerNorm", "BNInference"];
const QUANT_OPS: &[&str] = &["AscendQuant", "Quant"];
const DEQUANT_OPS: &[&str] = &["AscendDequant", "Dequant"];
const REQUANT_OPS: &[&str] = &["AscendRequant", "Requant"];
const STRIDED_READ_OPS: &[&str] = &["StridedRead"];
const STRIDED_WRITE_OPS: &[&str] = &["StridedWrite"];
const READ_SELECT_OPS: &[&str] = &["ReadSelect"];
const WRITE_SELECT_OPS: &[&str] = &["WriteSelect"];
const INPUT_OPS: &[&str] = &["Data", "Placeholder", "Const"];
const OUTPUT_OPS: &[&str] = &["NetOutput"];

/// Lookup table from operator type name to categories.
#[derive(Clone, Debug, Default)]
pub struct CategoryRegistry {
    table: BTreeMap<String, CategorySet>,
}

impl CategoryRegistry {
    /// Creates an empty registry; every lookup yields the empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with the built-in operator table.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let tables: [(&[&str], Category); 16] = [
            (CONV_OPS, Category::Conv),
            (MATMUL_OPS, Category::MatMul),
            (POOL_OPS, Category::Pool),
            (ELEMWISE_OPS, Category::Elemwise),
            (BROADCAST_OPS, Category::Broadcast),
            (REDUCE_OPS, Category::Reduce),
            (NORM_OPS, Category::Norm),
            (QUANT_OPS, Category::Quant),
            (DEQUANT_OPS, Category::Dequant),
            (REQUANT_OPS, Category::Requant),
            (STRIDED_READ_OPS, Category::StridedRead),
            (STRIDED_WRITE_OPS, Category::StridedWrite),
            (READ_SELECT_OPS, Category::ReadSelect),
            (WRITE_SELECT_OPS, Category::WriteSelect),
            (INPUT_OPS, Category::InputBoundary),
            (OUTPUT_OPS, Category::OutputBoundary),
        ];
        for (ops, category) in tables {
            for &op in ops {
                registry.add(op, category);
            }
        }
        registry
    }

    /// Replaces the categories of `op_type`.
    pub fn register(&mut self, op_type: impl Into<String>, categories: CategorySet) {
        self.table.insert(op_type.into(), categories);
    }

    /// Adds one category to `op_type`, keeping the ones it already has.
    pub fn add(&mut self, op_type: impl Into<String>, category: Category) {
        let entry = self.table.entry(op_type.into()).or_default();
        *entry = entry.with(category);
    }

    /// Categories of an operator type name; unknown names map to the empty set.
    pub fn category_of_type(&self, op_type: &str) -> CategorySet {
        self.table.get(op_type).copied().unwrap_or_default()
    }

    /// Categories of a node. The node's override attribute, when present,
    /// replaces the type-name lookup. Unknown names in the override are
    /// ignored with a warning.
    pub fn category_of(&self, node: &Node) -> CategorySet {
        let Some(names) = node
            .attr(CATEGORY_OVERRIDE_ATTR)
            .and_then(AttrValue::as_str_list)
        else {
            return self.category_of_type(&node.op_type);
        };
        let mut set = CategorySet::EMPTY;
        for name in names {
            match name.parse::<Category>() {
                Ok(c) => set = set.with(c),
                Err(e) => log::warn!("node '{}': {e} in category override", node.name),
            }
        }
        set
    }
}
