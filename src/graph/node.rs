use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::{BlockId, IValue, RunError, Type, ValueId};

/// Binary integer operations.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// Division rounding towards negative infinity.
    FloorDiv,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::FloorDiv => "FloorDiv",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::Eq => "Eq",
            Self::Ne => "Ne",
            Self::Lt => "Lt",
            Self::Le => "Le",
            Self::Gt => "Gt",
            Self::Ge => "Ge",
        }
    }

    /// Return true if this operation produces a bool rather than an int.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Apply this operation to a pair of integers.
    pub fn eval(self, a: i64, b: i64) -> Result<IValue, RunError> {
        let int_result = |val: Option<i64>| val.map(IValue::Int).ok_or(RunError::Overflow);
        match self {
            Self::Add => int_result(a.checked_add(b)),
            Self::Sub => int_result(a.checked_sub(b)),
            Self::Mul => int_result(a.checked_mul(b)),
            Self::FloorDiv => floor_div(a, b).map(IValue::Int),
            Self::Min => Ok(IValue::Int(a.min(b))),
            Self::Max => Ok(IValue::Int(a.max(b))),
            Self::Eq => Ok(IValue::Bool(a == b)),
            Self::Ne => Ok(IValue::Bool(a != b)),
            Self::Lt => Ok(IValue::Bool(a < b)),
            Self::Le => Ok(IValue::Bool(a <= b)),
            Self::Gt => Ok(IValue::Bool(a > b)),
            Self::Ge => Ok(IValue::Bool(a >= b)),
        }
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, RunError> {
    if b == 0 {
        return Err(RunError::DivisionByZero);
    }
    let quotient = a.checked_div(b).ok_or(RunError::Overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Named and typed argument or result of an operator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Arg {
    pub name: String,
    pub ty: Type,
}

impl Arg {
    pub fn new(name: &str, ty: Type) -> Self {
        Arg {
            name: name.to_string(),
            ty,
        }
    }

    /// Create an unnamed argument. This is typically used for results.
    pub fn unnamed(ty: Type) -> Self {
        Self::new("", ty)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.ty)
        } else {
            write!(f, "{} {}", self.ty, self.name)
        }
    }
}

/// Operator schema.
///
/// The `Display` representation, eg. `test::pad(Tensor self, int[] pads) ->
/// Tensor`, is the operator's canonical signature. Operators with the same
/// signature share a shape program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Schema {
    name: String,
    inputs: Vec<Arg>,
    outputs: Vec<Arg>,
}

impl Schema {
    pub fn new(name: &str, inputs: Vec<Arg>, outputs: Vec<Arg>) -> Self {
        Schema {
            name: name.to_string(),
            inputs,
            outputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Arg] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arg] {
        &self.outputs
    }

    /// Return the canonical signature used as a registry key.
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ") -> ")?;
        match self.outputs.as_slice() {
            [output] => write!(f, "{}", output),
            outputs => {
                write!(f, "(")?;
                for (i, arg) in outputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Operation performed by a node.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Produce a fixed value.
    Constant(IValue),
    /// Create a list from the int inputs.
    ListConstruct,
    TupleConstruct,
    /// Extract the element at a fixed index from a tuple.
    TupleIndex(usize),
    /// Split a tuple into one output per element.
    TupleUnpack,
    /// Length of a list.
    Len,
    /// `list[index]`, where negative indices count from the end.
    GetItem,
    /// `list[start:end]`. Either bound may be `None`.
    Slice,
    /// Append the second input to the list given by the first input, in
    /// place. Has no outputs.
    ListAppend,
    Binary(BinaryOp),
    /// Boolean negation.
    Not,
    /// Fail evaluation if the bool input is false.
    Assert,
    /// Evaluate the first or second block depending on a bool condition.
    /// Outputs are the return values of the evaluated block.
    If,
    /// Evaluate the body block `inputs[0]` times.
    ///
    /// The remaining inputs are initial values of loop-carried variables.
    /// The body's parameters are `[iteration, carried...]` and it returns the
    /// updated carried values. Outputs are the final carried values.
    Loop,
    /// Call to an operator which is opaque to shape programs.
    Call(Arc<Schema>),
}

impl Op {
    pub fn name(&self) -> &str {
        match self {
            Self::Constant(_) => "Constant",
            Self::ListConstruct => "ListConstruct",
            Self::TupleConstruct => "TupleConstruct",
            Self::TupleIndex(_) => "TupleIndex",
            Self::TupleUnpack => "TupleUnpack",
            Self::Len => "Len",
            Self::GetItem => "GetItem",
            Self::Slice => "Slice",
            Self::ListAppend => "ListAppend",
            Self::Binary(op) => op.name(),
            Self::Not => "Not",
            Self::Assert => "Assert",
            Self::If => "If",
            Self::Loop => "Loop",
            Self::Call(schema) => schema.name(),
        }
    }

    /// Return true if the operation has effects other than producing its
    /// outputs.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, Self::ListAppend | Self::Assert | Self::Call(_))
    }

    /// Return true if the operation may modify the value passed as its
    /// `index`th input.
    ///
    /// Opaque calls are assumed to mutate all their inputs.
    pub fn may_mutate_input(&self, index: usize) -> bool {
        match self {
            Self::ListAppend => index == 0,
            Self::Call(_) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub(super) name: Option<String>,
    pub(super) op: Op,
    pub(super) inputs: SmallVec<[ValueId; 4]>,
    pub(super) outputs: SmallVec<[ValueId; 2]>,
    pub(super) blocks: SmallVec<[BlockId; 2]>,

    /// Block which contains this node.
    pub(super) block: BlockId,
}

impl Node {
    /// Return the debug name of this node.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn inputs(&self) -> &[ValueId] {
        &self.inputs
    }

    /// Return the `index`th input.
    ///
    /// Panics if the node has fewer inputs.
    pub fn input(&self, index: usize) -> ValueId {
        self.inputs[index]
    }

    pub fn outputs(&self) -> &[ValueId] {
        &self.outputs
    }

    /// Return the node's output if it has exactly one.
    pub fn output(&self) -> Option<ValueId> {
        match self.outputs.as_slice() {
            [output] => Some(*output),
            _ => None,
        }
    }

    /// Return the nested blocks of control flow nodes.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn owning_block(&self) -> BlockId {
        self.block
    }

    /// Return the schema of the operator, if this node is an operator call.
    pub fn schema(&self) -> Option<&Schema> {
        match &self.op {
            Op::Call(schema) => Some(schema.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rten_testing::TestCases;

    use super::{Arg, BinaryOp, Schema};
    use crate::graph::{IValue, RunError, TensorType, Type};

    #[test]
    fn test_schema_signature() {
        let schema = Schema::new(
            "test::pad",
            vec![
                Arg::new("self", Type::Tensor(TensorType::default())),
                Arg::new("pads", Type::IntList),
            ],
            vec![Arg::unnamed(Type::Tensor(TensorType::default()))],
        );
        assert_eq!(
            schema.signature(),
            "test::pad(Tensor self, int[] pads) -> Tensor"
        );

        let schema = Schema::new(
            "test::split",
            vec![Arg::new("self", Type::Tensor(TensorType::default()))],
            vec![
                Arg::unnamed(Type::TensorList),
                Arg::unnamed(Type::Tuple(vec![Type::Int, Type::Bool])),
            ],
        );
        assert_eq!(
            schema.signature(),
            "test::split(Tensor self) -> (Tensor[], (int, bool))"
        );
    }

    #[test]
    fn test_binary_op_eval() {
        #[derive(Debug)]
        struct Case {
            op: BinaryOp,
            a: i64,
            b: i64,
            expected: Result<IValue, RunError>,
        }

        let cases = [
            Case {
                op: BinaryOp::Add,
                a: 3,
                b: 4,
                expected: Ok(IValue::Int(7)),
            },
            Case {
                op: BinaryOp::FloorDiv,
                a: 7,
                b: 2,
                expected: Ok(IValue::Int(3)),
            },
            Case {
                op: BinaryOp::FloorDiv,
                a: -7,
                b: 2,
                expected: Ok(IValue::Int(-4)),
            },
            Case {
                op: BinaryOp::FloorDiv,
                a: 7,
                b: 0,
                expected: Err(RunError::DivisionByZero),
            },
            Case {
                op: BinaryOp::Mul,
                a: i64::MAX,
                b: 2,
                expected: Err(RunError::Overflow),
            },
            Case {
                op: BinaryOp::Le,
                a: 2,
                b: 2,
                expected: Ok(IValue::Bool(true)),
            },
            Case {
                op: BinaryOp::Max,
                a: -1,
                b: 5,
                expected: Ok(IValue::Int(5)),
            },
        ];

        cases.test_each(|case| {
            assert_eq!(case.op.eval(case.a, case.b), case.expected);
        })
    }
}
