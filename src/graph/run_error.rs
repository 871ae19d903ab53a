use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors that occur when evaluating a graph or a single operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunError {
    /// The number of inputs does not match the number of graph inputs.
    InvalidInputCount { expected: usize, actual: usize },

    /// A value was used before it was defined.
    MissingValue,

    /// An operation received a value of the wrong type.
    TypeMismatch(&'static str),

    /// A list or tuple index was out of bounds.
    IndexOutOfRange,

    DivisionByZero,

    /// Integer arithmetic overflowed.
    Overflow,

    /// An `Assert` operation's condition was false.
    AssertionFailed,

    /// The operation cannot be evaluated.
    UnsupportedOp(String),
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInputCount { expected, actual } => {
                write!(f, "expected {} inputs but got {}", expected, actual)
            }
            Self::MissingValue => write!(f, "value used before definition"),
            Self::TypeMismatch(msg) => write!(f, "type mismatch: {}", msg),
            Self::IndexOutOfRange => write!(f, "index out of range"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::Overflow => write!(f, "integer overflow"),
            Self::AssertionFailed => write!(f, "assertion failed"),
            Self::UnsupportedOp(name) => write!(f, "operator \"{}\" cannot be evaluated", name),
        }
    }
}

impl Error for RunError {}
