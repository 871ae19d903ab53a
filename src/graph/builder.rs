//! Tools to simplify writing shape programs and operator graphs in code.

use std::sync::Arc;

use super::{BinaryOp, BlockId, Graph, IValue, NodeId, Op, Schema, Type, ValueId};

/// Builder for a [`Graph`].
///
/// Nodes are appended to the current block, which is the root block unless
/// the builder is inside the closure passed to [`if_else`](Self::if_else) or
/// [`loop_n`](Self::loop_n).
///
/// The following builds a shape program for an operator which appends a
/// dimension of size 1 to its input:
///
/// ```
/// use rten_symbolic_shapes::graph::{GraphBuilder, IValue, Type};
///
/// let mut b = GraphBuilder::new();
/// let x = b.input("x", Type::IntList);
/// let out = b.list(&[]);
/// let n = b.len(x);
/// b.loop_n(n, &[], |b, i, _| {
///     let dim = b.get_item(x, i);
///     b.append(out, dim);
///     vec![]
/// });
/// let one = b.constant(1);
/// b.append(out, one);
/// let program = b.build(&[out]);
///
/// let result = program.run(&[IValue::IntList(vec![2, 3])]).unwrap();
/// assert_eq!(result, [IValue::IntList(vec![2, 3, 1])]);
/// ```
pub struct GraphBuilder {
    graph: Graph,
    block: BlockId,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        let graph = Graph::new();
        let block = graph.root();
        GraphBuilder { graph, block }
    }

    /// Return the graph built so far.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Add a graph input.
    pub fn input(&mut self, name: &str, ty: Type) -> ValueId {
        self.graph.add_input(Some(name), ty)
    }

    fn push_op(&mut self, op: Op, inputs: &[ValueId], output_type: Type) -> ValueId {
        let node = self
            .graph
            .add_node(self.block, op, inputs, &[output_type]);
        self.graph.node(node).outputs()[0]
    }

    pub fn constant<V: Into<IValue>>(&mut self, value: V) -> ValueId {
        let value = value.into();
        let ty = value.ty();
        self.push_op(Op::Constant(value), &[], ty)
    }

    /// Create a list of ints.
    pub fn list(&mut self, elems: &[ValueId]) -> ValueId {
        self.push_op(Op::ListConstruct, elems, Type::IntList)
    }

    pub fn tuple(&mut self, elems: &[ValueId]) -> ValueId {
        let ty = Type::Tuple(
            elems
                .iter()
                .map(|&elem| self.graph.value_type(elem).clone())
                .collect(),
        );
        self.push_op(Op::TupleConstruct, elems, ty)
    }

    fn tuple_elem_types(&self, tuple: ValueId) -> Vec<Type> {
        match self.graph.value_type(tuple) {
            Type::Tuple(types) => types.clone(),
            _ => panic!("value {} is not a tuple", tuple),
        }
    }

    pub fn tuple_index(&mut self, tuple: ValueId, index: usize) -> ValueId {
        let ty = self
            .tuple_elem_types(tuple)
            .get(index)
            .cloned()
            .expect("tuple index out of range");
        self.push_op(Op::TupleIndex(index), &[tuple], ty)
    }

    pub fn tuple_unpack(&mut self, tuple: ValueId) -> Vec<ValueId> {
        let types = self.tuple_elem_types(tuple);
        let node = self
            .graph
            .add_node(self.block, Op::TupleUnpack, &[tuple], &types);
        self.graph.node(node).outputs().to_vec()
    }

    /// Return the length of a list.
    pub fn len(&mut self, list: ValueId) -> ValueId {
        self.push_op(Op::Len, &[list], Type::Int)
    }

    /// Return `list[index]`.
    pub fn get_item(&mut self, list: ValueId, index: ValueId) -> ValueId {
        self.push_op(Op::GetItem, &[list, index], Type::Int)
    }

    /// Return `list[index]` for a fixed index.
    pub fn index(&mut self, list: ValueId, index: i64) -> ValueId {
        let index = self.constant(index);
        self.get_item(list, index)
    }

    /// Return `list[start:end]`.
    pub fn slice(&mut self, list: ValueId, start: Option<ValueId>, end: Option<ValueId>) -> ValueId {
        let start = start.unwrap_or_else(|| self.constant(IValue::None));
        let end = end.unwrap_or_else(|| self.constant(IValue::None));
        self.push_op(Op::Slice, &[list, start, end], Type::IntList)
    }

    /// Append `item` to `list` in place.
    pub fn append(&mut self, list: ValueId, item: ValueId) -> NodeId {
        self.graph
            .add_node(self.block, Op::ListAppend, &[list, item], &[])
    }

    pub fn binary(&mut self, op: BinaryOp, a: ValueId, b: ValueId) -> ValueId {
        let ty = if op.is_comparison() {
            Type::Bool
        } else {
            Type::Int
        };
        self.push_op(Op::Binary(op), &[a, b], ty)
    }

    pub fn add(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn eq(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.binary(BinaryOp::Eq, a, b)
    }

    pub fn logical_not(&mut self, x: ValueId) -> ValueId {
        self.push_op(Op::Not, &[x], Type::Bool)
    }

    /// Add an assertion that `cond` is true.
    pub fn assert(&mut self, cond: ValueId) -> NodeId {
        self.graph.add_node(self.block, Op::Assert, &[cond], &[])
    }

    /// Run `f` with the builder's current block set to `block`.
    fn in_block<R>(&mut self, block: BlockId, f: impl FnOnce(&mut Self) -> R) -> R {
        let prev_block = std::mem::replace(&mut self.block, block);
        let result = f(self);
        self.block = prev_block;
        result
    }

    /// Add a conditional.
    ///
    /// `then_branch` and `else_branch` build the bodies of each branch and
    /// return their results, which must match `output_types`.
    pub fn if_else(
        &mut self,
        cond: ValueId,
        output_types: &[Type],
        then_branch: impl FnOnce(&mut Self) -> Vec<ValueId>,
        else_branch: impl FnOnce(&mut Self) -> Vec<ValueId>,
    ) -> Vec<ValueId> {
        let node = self
            .graph
            .add_node(self.block, Op::If, &[cond], output_types);

        let then_block = self.graph.add_node_block(node);
        let then_results = self.in_block(then_block, then_branch);
        self.graph.set_block_returns(then_block, &then_results);

        let else_block = self.graph.add_node_block(node);
        let else_results = self.in_block(else_block, else_branch);
        self.graph.set_block_returns(else_block, &else_results);

        self.graph.node(node).outputs().to_vec()
    }

    /// Add a loop which runs `trip_count` times.
    ///
    /// `body` is called with the iteration counter and the loop-carried
    /// values, and returns the updated carried values. Returns the final
    /// carried values.
    pub fn loop_n(
        &mut self,
        trip_count: ValueId,
        carried: &[ValueId],
        body: impl FnOnce(&mut Self, ValueId, &[ValueId]) -> Vec<ValueId>,
    ) -> Vec<ValueId> {
        let carried_types: Vec<Type> = carried
            .iter()
            .map(|&id| self.graph.value_type(id).clone())
            .collect();
        let mut inputs = vec![trip_count];
        inputs.extend_from_slice(carried);
        let node = self
            .graph
            .add_node(self.block, Op::Loop, &inputs, &carried_types);

        let body_block = self.graph.add_node_block(node);
        let iter = self
            .graph
            .add_block_param(body_block, Some("i"), Type::Int);
        let params: Vec<ValueId> = carried_types
            .into_iter()
            .map(|ty| self.graph.add_block_param(body_block, None, ty))
            .collect();
        let results = self.in_block(body_block, |b| body(b, iter, &params));
        self.graph.set_block_returns(body_block, &results);

        self.graph.node(node).outputs().to_vec()
    }

    /// Add a call to an operator which is opaque to shape programs.
    pub fn call(
        &mut self,
        name: Option<&str>,
        schema: &Arc<Schema>,
        inputs: &[ValueId],
        output_types: &[Type],
    ) -> Vec<ValueId> {
        let node = self
            .graph
            .add_node(self.block, Op::Call(schema.clone()), inputs, output_types);
        if let Some(name) = name {
            self.graph.set_node_name(node, name);
        }
        self.graph.node(node).outputs().to_vec()
    }

    /// Set the graph outputs and return the graph.
    pub fn build(mut self, outputs: &[ValueId]) -> Graph {
        self.graph.set_output_ids(outputs);
        self.graph
    }
}
