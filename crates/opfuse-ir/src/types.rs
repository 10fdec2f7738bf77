//! Tensor descriptors, attribute values and group identifiers.

use std::fmt;
use std::str::FromStr;

/// Element type of a tensor.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum DataType {
    #[default]
    F32,
    F16,
    BF16,
    I32,
    I8,
    U8,
    I64,
    Bool,
}

impl DataType {
    /// Width of one element in bytes.
    pub fn width(self) -> u8 {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 => 2,
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I32 => "i32",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I64 => "i64",
            Self::Bool => "bool",
        })
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "f32" => Self::F32,
            "f16" => Self::F16,
            "bf16" => Self::BF16,
            "i32" => Self::I32,
            "i8" => Self::I8,
            "u8" => Self::U8,
            "i64" => Self::I64,
            "bool" => Self::Bool,
            _ => return Err(format!("unknown data type '{s}'")),
        })
    }
}

/// Memory layout of a tensor.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Format {
    /// Plain row-major, no layout semantics.
    #[default]
    Nd,
    Nchw,
    Nhwc,
    /// Channel-blocked 5D layout used by the cube unit.
    Nc1hwc0,
    /// Fractal layout for weights and matmul operands.
    FractalZ,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nd => "nd",
            Self::Nchw => "nchw",
            Self::Nhwc => "nhwc",
            Self::Nc1hwc0 => "nc1hwc0",
            Self::FractalZ => "fractal_z",
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "nd" => Self::Nd,
            "nchw" => Self::Nchw,
            "nhwc" => Self::Nhwc,
            "nc1hwc0" => Self::Nc1hwc0,
            "fractal_z" => Self::FractalZ,
            _ => return Err(format!("unknown format '{s}'")),
        })
    }
}

/// Element type, layout and shape of the tensor carried by an output slot.
///
/// A negative dimension is dynamic.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct TensorDesc {
    pub dtype: DataType,
    pub format: Format,
    pub shape: Vec<i64>,
}

impl TensorDesc {
    pub fn new(dtype: DataType, format: Format, shape: impl Into<Vec<i64>>) -> Self {
        Self {
            dtype,
            format,
            shape: shape.into(),
        }
    }

    /// Returns `true` if any dimension is unknown until runtime.
    pub fn is_dynamic(&self) -> bool {
        self.shape.iter().any(|&d| d < 0)
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>[", self.dtype, self.format)?;
        for (i, d) in self.shape.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if *d < 0 {
                f.write_str("?")?;
            } else {
                write!(f, "{d}")?;
            }
        }
        f.write_str("]")
    }
}

/// A node attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<String>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the list form; a single string reads as a one-element list.
    pub fn as_str_list(&self) -> Option<Vec<&str>> {
        match self {
            Self::StrList(items) => Some(items.iter().map(String::as_str).collect()),
            Self::Str(s) => Some(vec![s.as_str()]),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::StrList(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Identifier written onto every node of a committed fusion group.
///
/// Group ids are unique within one compilation; the rule family a group
/// belongs to is recorded alongside it on the node.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}
