//! Reference interpreter for graphs.

use std::iter::zip;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::{BlockId, Graph, IValue, Op, RunError, ValueId};

/// Values computed so far during evaluation.
///
/// Lists are updated in place by `ListAppend`, so a list's identity is the
/// ID of the value which defines it. Mutating a list through an alias (eg.
/// a loop-carried parameter) is not supported.
type Env = FxHashMap<ValueId, IValue>;

/// Resolve an index given as a value in `[-len, len-1]` to a positive index
/// in `[0, len)`, or return `None` if the index is out of bounds.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

fn int_arg(inputs: &[&IValue], index: usize) -> Result<i64, RunError> {
    inputs
        .get(index)
        .and_then(|val| val.as_int())
        .ok_or(RunError::TypeMismatch("expected an int"))
}

fn opt_int_arg(inputs: &[&IValue], index: usize) -> Result<Option<i64>, RunError> {
    match inputs.get(index) {
        Some(IValue::None) => Ok(None),
        _ => int_arg(inputs, index).map(Some),
    }
}

fn bool_arg(inputs: &[&IValue], index: usize) -> Result<bool, RunError> {
    inputs
        .get(index)
        .and_then(|val| val.as_bool())
        .ok_or(RunError::TypeMismatch("expected a bool"))
}

fn list_arg<'a>(inputs: &[&'a IValue], index: usize) -> Result<&'a [i64], RunError> {
    inputs
        .get(index)
        .and_then(|val| val.as_int_list())
        .ok_or(RunError::TypeMismatch("expected a list of ints"))
}

fn tuple_arg<'a>(inputs: &[&'a IValue], index: usize) -> Result<&'a [IValue], RunError> {
    inputs
        .get(index)
        .and_then(|val| val.as_tuple())
        .ok_or(RunError::TypeMismatch("expected a tuple"))
}

/// Resolve a slice bound following Python's rules, clamping to `[0, len]`.
fn slice_bound(bound: Option<i64>, len: i64, default: i64) -> i64 {
    match bound {
        None => default,
        Some(b) if b < 0 => (b + len).max(0),
        Some(b) => b.min(len),
    }
}

/// Evaluate a single operation given the values of its inputs.
///
/// Operations with nested blocks or in-place updates (`If`, `Loop`,
/// `ListAppend`) and opaque calls cannot be evaluated in isolation and return
/// [`RunError::UnsupportedOp`].
pub fn eval_op(op: &Op, inputs: &[&IValue]) -> Result<Vec<IValue>, RunError> {
    let value = match op {
        Op::Constant(value) => value.clone(),
        Op::ListConstruct => IValue::IntList(
            (0..inputs.len())
                .map(|i| int_arg(inputs, i))
                .collect::<Result<_, _>>()?,
        ),
        Op::TupleConstruct => IValue::Tuple(inputs.iter().map(|&val| val.clone()).collect()),
        Op::TupleIndex(index) => tuple_arg(inputs, 0)?
            .get(*index)
            .cloned()
            .ok_or(RunError::IndexOutOfRange)?,
        Op::TupleUnpack => return Ok(tuple_arg(inputs, 0)?.to_vec()),
        Op::Len => IValue::Int(list_arg(inputs, 0)?.len() as i64),
        Op::GetItem => {
            let list = list_arg(inputs, 0)?;
            let index = normalize_index(int_arg(inputs, 1)?, list.len())
                .ok_or(RunError::IndexOutOfRange)?;
            IValue::Int(list[index])
        }
        Op::Slice => {
            let list = list_arg(inputs, 0)?;
            let len = list.len() as i64;
            let start = slice_bound(opt_int_arg(inputs, 1)?, len, 0);
            let end = slice_bound(opt_int_arg(inputs, 2)?, len, len).max(start);
            IValue::IntList(list[start as usize..end as usize].to_vec())
        }
        Op::Binary(op) => op.eval(int_arg(inputs, 0)?, int_arg(inputs, 1)?)?,
        Op::Not => IValue::Bool(!bool_arg(inputs, 0)?),
        Op::Assert => {
            return if bool_arg(inputs, 0)? {
                Ok(Vec::new())
            } else {
                Err(RunError::AssertionFailed)
            };
        }
        Op::ListAppend | Op::If | Op::Loop | Op::Call(_) => {
            return Err(RunError::UnsupportedOp(op.name().to_string()));
        }
    };
    Ok(vec![value])
}

fn lookup(env: &Env, id: ValueId) -> Result<&IValue, RunError> {
    env.get(&id).ok_or(RunError::MissingValue)
}

impl Graph {
    /// Evaluate the graph with the given input values and return the values
    /// of its outputs.
    ///
    /// This is the reference semantics for shape programs. Graphs containing
    /// opaque operator calls cannot be evaluated.
    pub fn run(&self, inputs: &[IValue]) -> Result<Vec<IValue>, RunError> {
        let input_ids = self.input_ids();
        if inputs.len() != input_ids.len() {
            return Err(RunError::InvalidInputCount {
                expected: input_ids.len(),
                actual: inputs.len(),
            });
        }

        let mut env = Env::default();
        for (&id, value) in zip(input_ids, inputs) {
            env.insert(id, value.clone());
        }
        self.run_block(self.root(), &mut env)?;

        self.output_ids()
            .iter()
            .map(|&id| lookup(&env, id).cloned())
            .collect()
    }

    fn run_block(&self, block: BlockId, env: &mut Env) -> Result<(), RunError> {
        for &node_id in self.block_nodes(block) {
            let node = self.node(node_id);
            match node.op() {
                Op::If => {
                    let cond = lookup(env, node.input(0))?
                        .as_bool()
                        .ok_or(RunError::TypeMismatch("If condition must be a bool"))?;
                    let branch = node.blocks()[if cond { 0 } else { 1 }];
                    self.run_block(branch, env)?;
                    let results = self.block_results(branch, env)?;
                    env.extend(zip(node.outputs().iter().copied(), results));
                }
                Op::Loop => {
                    let trip_count = lookup(env, node.input(0))?
                        .as_int()
                        .ok_or(RunError::TypeMismatch("Loop trip count must be an int"))?;
                    let body = node.blocks()[0];
                    let params = self.block_params(body);
                    let mut carried: Vec<IValue> = node.inputs()[1..]
                        .iter()
                        .map(|&id| lookup(env, id).cloned())
                        .collect::<Result<_, _>>()?;

                    for iter in 0..trip_count.max(0) {
                        env.insert(params[0], IValue::Int(iter));
                        env.extend(zip(params[1..].iter().copied(), carried));
                        self.run_block(body, env)?;
                        carried = self.block_results(body, env)?;
                    }
                    env.extend(zip(node.outputs().iter().copied(), carried));
                }
                Op::ListAppend => {
                    let item = lookup(env, node.input(1))?
                        .as_int()
                        .ok_or(RunError::TypeMismatch("list items must be ints"))?;
                    match env.get_mut(&node.input(0)) {
                        Some(IValue::IntList(list)) => list.push(item),
                        Some(_) => {
                            return Err(RunError::TypeMismatch("can only append to a list"));
                        }
                        None => return Err(RunError::MissingValue),
                    }
                }
                op => {
                    let outputs = {
                        let inputs = node
                            .inputs()
                            .iter()
                            .map(|&id| lookup(env, id))
                            .collect::<Result<SmallVec<[&IValue; 4]>, _>>()?;
                        eval_op(op, &inputs)?
                    };
                    env.extend(zip(node.outputs().iter().copied(), outputs));
                }
            }
        }
        Ok(())
    }

    fn block_results(&self, block: BlockId, env: &Env) -> Result<Vec<IValue>, RunError> {
        self.block_returns(block)
            .iter()
            .map(|&id| lookup(env, id).cloned())
            .collect()
    }
}
