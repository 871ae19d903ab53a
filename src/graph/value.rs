use std::fmt;

use crate::sym_shape::SymbolicShape;

/// Element type of a tensor.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum DataType {
    Int32,
    Float,
    Int8,
    UInt8,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int32 => "int32",
            Self::Float => "float",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
        };
        write!(f, "{}", name)
    }
}

/// Type of a tensor value, with optional element type and shape information.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TensorType {
    pub dtype: Option<DataType>,
    pub shape: SymbolicShape,
}

impl TensorType {
    pub fn new(dtype: Option<DataType>, shape: SymbolicShape) -> Self {
        Self { dtype, shape }
    }

    /// Return a copy of this type with the shape replaced by `shape`.
    ///
    /// All other type information is preserved.
    pub fn with_shape(&self, shape: SymbolicShape) -> Self {
        Self {
            dtype: self.dtype,
            shape,
        }
    }
}

/// Static type of a value in a graph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Type {
    Int,
    Bool,
    /// List of integers. This is the type of shapes in shape programs.
    IntList,
    Tuple(Vec<Type>),
    Tensor(TensorType),
    TensorList,
    NoneType,
}

impl Type {
    /// Return the tensor type information if this is a tensor.
    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Self::Tensor(tt) => Some(tt),
            _ => None,
        }
    }
}

impl From<TensorType> for Type {
    fn from(tt: TensorType) -> Type {
        Type::Tensor(tt)
    }
}

// Types are formatted as they appear in operator signatures, so tensor
// types omit dtype and shape.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Bool => write!(f, "bool"),
            Self::IntList => write!(f, "int[]"),
            Self::Tuple(elems) => {
                write!(f, "(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, ")")
            }
            Self::Tensor(_) => write!(f, "Tensor"),
            Self::TensorList => write!(f, "Tensor[]"),
            Self::NoneType => write!(f, "NoneType"),
        }
    }
}

/// A value which is known at analysis time.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum IValue {
    Int(i64),
    Bool(bool),
    IntList(Vec<i64>),
    Tuple(Vec<IValue>),
    None,
}

impl IValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            Self::IntList(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[IValue]> {
        match self {
            Self::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Return the static type of this value.
    pub fn ty(&self) -> Type {
        match self {
            Self::Int(_) => Type::Int,
            Self::Bool(_) => Type::Bool,
            Self::IntList(_) => Type::IntList,
            Self::Tuple(items) => Type::Tuple(items.iter().map(|item| item.ty()).collect()),
            Self::None => Type::NoneType,
        }
    }
}

impl From<i64> for IValue {
    fn from(val: i64) -> Self {
        Self::Int(val)
    }
}

impl From<bool> for IValue {
    fn from(val: bool) -> Self {
        Self::Bool(val)
    }
}

impl From<Vec<i64>> for IValue {
    fn from(val: Vec<i64>) -> Self {
        Self::IntList(val)
    }
}

impl From<&[i64]> for IValue {
    fn from(val: &[i64]) -> Self {
        Self::IntList(val.to_vec())
    }
}

impl fmt::Display for IValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(x) => write!(f, "{}", x),
            Self::Bool(x) => write!(f, "{}", x),
            Self::IntList(xs) => write!(f, "{:?}", xs),
            Self::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Self::None => write!(f, "None"),
        }
    }
}
