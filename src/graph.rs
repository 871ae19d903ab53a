//! Graph IR for shape programs and the operator graphs they are applied to.
//!
//! A [`Graph`] stores nodes, values and blocks in arenas owned by the graph
//! and addressed by [`NodeId`], [`ValueId`] and [`BlockId`]. Cloning a graph
//! therefore produces a fully independent copy, which analyses can mutate
//! freely.
//!
//! Each graph has a root block. The root block's parameters are the graph's
//! inputs and its return values are the graph's outputs. Control flow nodes
//! (`If`, `Loop`) own nested blocks.

use std::iter::zip;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub mod builder;
mod node;
mod node_id;
mod run;
mod run_error;
mod value;

#[cfg(test)]
mod tests;

pub use builder::GraphBuilder;
pub use node::{Arg, BinaryOp, Node, Op, Schema};
pub use node_id::{BlockId, NodeId, ValueId};
pub use run::{eval_op, normalize_index};
pub use run_error::RunError;
pub use value::{DataType, IValue, TensorType, Type};

/// Describes where a value is defined.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueDef {
    /// The `index`th parameter of a block.
    Param { block: BlockId, index: usize },
    /// The `index`th output of a node.
    Node { node: NodeId, index: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueInfo {
    name: Option<String>,
    ty: Type,
    def: ValueDef,
}

impl ValueInfo {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn def(&self) -> ValueDef {
        self.def
    }
}

/// A place where a value is used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Use {
    /// The `index`th input of a node.
    Node { node: NodeId, index: usize },
    /// The `index`th return value of a block.
    Return { block: BlockId, index: usize },
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Block {
    params: Vec<ValueId>,
    nodes: Vec<NodeId>,
    returns: Vec<ValueId>,

    /// Control flow node which owns this block, or `None` for the root.
    owner: Option<NodeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Graph {
    /// Node arena. Removed nodes are replaced with `None`. IDs are not reused.
    nodes: Vec<Option<Node>>,
    values: Vec<ValueInfo>,
    blocks: Vec<Block>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Graph {
        Graph {
            nodes: Vec::new(),
            values: Vec::new(),
            blocks: vec![Block::default()],
        }
    }

    /// Return the ID of the root block.
    pub fn root(&self) -> BlockId {
        BlockId::from_usize(0)
    }

    /// Add a new graph input.
    pub fn add_input(&mut self, name: Option<&str>, ty: Type) -> ValueId {
        self.add_block_param(self.root(), name, ty)
    }

    pub fn input_ids(&self) -> &[ValueId] {
        self.block_params(self.root())
    }

    pub fn output_ids(&self) -> &[ValueId] {
        self.block_returns(self.root())
    }

    pub fn set_output_ids(&mut self, ids: &[ValueId]) {
        self.set_block_returns(self.root(), ids)
    }

    fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.as_usize()]
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.as_usize()]
    }

    pub fn block_params(&self, id: BlockId) -> &[ValueId] {
        &self.block(id).params
    }

    /// Return the nodes of a block in execution order.
    pub fn block_nodes(&self, id: BlockId) -> &[NodeId] {
        &self.block(id).nodes
    }

    pub fn block_returns(&self, id: BlockId) -> &[ValueId] {
        &self.block(id).returns
    }

    /// Return the control flow node which owns a block, or `None` for the
    /// root block.
    pub fn block_owner(&self, id: BlockId) -> Option<NodeId> {
        self.block(id).owner
    }

    pub fn add_block_param(&mut self, block: BlockId, name: Option<&str>, ty: Type) -> ValueId {
        let index = self.block(block).params.len();
        let id = self.add_value(name, ty, ValueDef::Param { block, index });
        self.block_mut(block).params.push(id);
        id
    }

    pub fn set_block_returns(&mut self, block: BlockId, ids: &[ValueId]) {
        self.block_mut(block).returns = ids.to_vec();
    }

    fn add_value(&mut self, name: Option<&str>, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId::from_usize(self.values.len());
        self.values.push(ValueInfo {
            name: name.map(|s| s.to_string()),
            ty,
            def,
        });
        id
    }

    /// Append a node to the end of `block`.
    ///
    /// A new output value is created for each entry in `output_types`.
    pub fn add_node(
        &mut self,
        block: BlockId,
        op: Op,
        inputs: &[ValueId],
        output_types: &[Type],
    ) -> NodeId {
        let pos = self.block(block).nodes.len();
        self.insert_node(block, pos, op, inputs, output_types)
    }

    /// Insert a node at position `pos` in `block`.
    pub fn insert_node(
        &mut self,
        block: BlockId,
        pos: usize,
        op: Op,
        inputs: &[ValueId],
        output_types: &[Type],
    ) -> NodeId {
        let id = NodeId::from_usize(self.nodes.len());
        let outputs = output_types
            .iter()
            .enumerate()
            .map(|(index, ty)| self.add_value(None, ty.clone(), ValueDef::Node { node: id, index }))
            .collect();
        self.nodes.push(Some(Node {
            name: None,
            op,
            inputs: inputs.into(),
            outputs,
            blocks: SmallVec::new(),
            block,
        }));
        self.block_mut(block).nodes.insert(pos, id);
        id
    }

    /// Create a new empty block owned by a control flow node.
    pub fn add_node_block(&mut self, node: NodeId) -> BlockId {
        let id = BlockId::from_usize(self.blocks.len());
        self.blocks.push(Block {
            owner: Some(node),
            ..Default::default()
        });
        self.node_mut(node).blocks.push(id);
        id
    }

    pub fn set_node_name(&mut self, node: NodeId, name: &str) {
        self.node_mut(node).name = Some(name.to_string());
    }

    /// Return the node with a given ID, or `None` if it has been removed.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_usize())?.as_ref()
    }

    /// Return the node with a given ID.
    ///
    /// Panics if the node has been removed.
    pub fn node(&self, id: NodeId) -> &Node {
        self.get_node(id)
            .expect("node ID should refer to a node in the graph")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(id.as_usize())
            .and_then(|n| n.as_mut())
            .expect("node ID should refer to a node in the graph")
    }

    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.as_usize()]
    }

    pub fn value_type(&self, id: ValueId) -> &Type {
        &self.value(id).ty
    }

    pub fn set_value_type(&mut self, id: ValueId, ty: Type) {
        self.values[id.as_usize()].ty = ty;
    }

    /// Return the node which produces a value, or `None` if the value is a
    /// block parameter.
    pub fn producer(&self, value: ValueId) -> Option<NodeId> {
        match self.value(value).def {
            ValueDef::Node { node, .. } => Some(node),
            ValueDef::Param { .. } => None,
        }
    }

    /// Return the value of `value` if it is produced by a constant node.
    pub fn constant_value(&self, value: ValueId) -> Option<&IValue> {
        let node = self.get_node(self.producer(value)?)?;
        match node.op() {
            Op::Constant(val) => Some(val),
            _ => None,
        }
    }

    pub fn constant_int(&self, value: ValueId) -> Option<i64> {
        self.constant_value(value)?.as_int()
    }

    pub fn constant_bool(&self, value: ValueId) -> Option<bool> {
        self.constant_value(value)?.as_bool()
    }

    /// Add a constant node at the start of the root block and return its
    /// output.
    ///
    /// Constants have no inputs, so a value created this way can be used
    /// anywhere in the graph.
    pub fn insert_constant(&mut self, value: IValue) -> ValueId {
        let ty = value.ty();
        let node = self.insert_node(self.root(), 0, Op::Constant(value), &[], &[ty]);
        self.node(node).outputs()[0]
    }

    /// Return the IDs of nodes in the root block, in execution order.
    pub fn node_ids(&self) -> &[NodeId] {
        self.block_nodes(self.root())
    }

    /// Return the IDs of all nodes, including those in nested blocks.
    ///
    /// Nodes are returned in execution order, with nodes of nested blocks
    /// following their owning node.
    pub fn all_node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.collect_node_ids(self.root(), &mut ids);
        ids
    }

    fn collect_node_ids(&self, block: BlockId, ids: &mut Vec<NodeId>) {
        for &id in self.block_nodes(block) {
            self.collect_node_tree(id, ids);
        }
    }

    /// Add `node` and all nodes in its nested blocks to `ids`.
    fn collect_node_tree(&self, node: NodeId, ids: &mut Vec<NodeId>) {
        ids.push(node);
        for &block in self.node(node).blocks() {
            self.collect_node_ids(block, ids);
        }
    }

    /// Return the index of a node within its owning block.
    pub fn position(&self, node: NodeId) -> usize {
        let block = self.node(node).block;
        self.block_nodes(block)
            .iter()
            .position(|&id| id == node)
            .expect("node should be in its owning block")
    }

    /// Return all uses of a value, in execution order.
    pub fn uses(&self, value: ValueId) -> Vec<Use> {
        let mut uses = Vec::new();
        self.collect_uses(self.root(), value, &mut uses);
        uses
    }

    fn collect_uses(&self, block: BlockId, value: ValueId, uses: &mut Vec<Use>) {
        for &id in self.block_nodes(block) {
            let node = self.node(id);
            for (index, &input) in node.inputs().iter().enumerate() {
                if input == value {
                    uses.push(Use::Node { node: id, index });
                }
            }
            for &nested in node.blocks() {
                self.collect_uses(nested, value, uses);
            }
        }
        for (index, &ret) in self.block_returns(block).iter().enumerate() {
            if ret == value {
                uses.push(Use::Return { block, index });
            }
        }
    }

    pub fn has_uses(&self, value: ValueId) -> bool {
        !self.uses(value).is_empty()
    }

    /// Replace all uses of `old` in node inputs and block returns with `new`.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        for node in self.nodes.iter_mut().flatten() {
            for input in node.inputs.iter_mut().filter(|id| **id == old) {
                *input = new;
            }
        }
        for block in self.blocks.iter_mut() {
            for ret in block.returns.iter_mut().filter(|id| **id == old) {
                *ret = new;
            }
        }
    }

    /// Replace uses of `old` with `new` in nodes that follow `node` in its
    /// block, including their nested blocks, and in the block's returns.
    pub fn replace_uses_after(&mut self, node: NodeId, old: ValueId, new: ValueId) {
        let block = self.node(node).block;
        let pos = self.position(node);

        let mut later_nodes = Vec::new();
        for &id in &self.block_nodes(block)[pos + 1..] {
            self.collect_node_tree(id, &mut later_nodes);
        }

        for id in later_nodes {
            for input in self.node_mut(id).inputs.iter_mut().filter(|id| **id == old) {
                *input = new;
            }
            let nested: SmallVec<[BlockId; 2]> = self.node(id).blocks.clone();
            for nested in nested {
                for ret in self
                    .block_mut(nested)
                    .returns
                    .iter_mut()
                    .filter(|id| **id == old)
                {
                    *ret = new;
                }
            }
        }
        for ret in self
            .block_mut(block)
            .returns
            .iter_mut()
            .filter(|id| **id == old)
        {
            *ret = new;
        }
    }

    /// Remove a node from its block, along with all nodes in its nested
    /// blocks.
    ///
    /// Uses of the node's outputs are not updated.
    pub fn remove_node(&mut self, id: NodeId) {
        let block = self.node(id).block;
        self.block_mut(block).nodes.retain(|&n| n != id);
        self.discard_node(id);
    }

    fn discard_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes[id.as_usize()].take() else {
            return;
        };
        for block in node.blocks {
            let nodes = std::mem::take(&mut self.block_mut(block).nodes);
            for nested in nodes {
                self.discard_node(nested);
            }
        }
    }

    /// Move all nodes of block `from` into block `into`, starting at position
    /// `pos`. `from` is left empty.
    pub fn splice_block(&mut self, from: BlockId, into: BlockId, pos: usize) {
        let nodes = std::mem::take(&mut self.block_mut(from).nodes);
        for &id in &nodes {
            self.node_mut(id).block = into;
        }
        self.block_mut(into).nodes.splice(pos..pos, nodes);
    }

    /// Insert copies of the nodes in block `src` into block `dest`, starting
    /// at position `pos`.
    ///
    /// Inputs of copied nodes are remapped using `value_map`, which is
    /// updated with mappings from original to copied values as nodes are
    /// copied. Values that are not in the map are used as-is. Returns the
    /// number of nodes inserted into `dest`.
    pub fn clone_block_into(
        &mut self,
        src: BlockId,
        dest: BlockId,
        pos: usize,
        value_map: &mut FxHashMap<ValueId, ValueId>,
    ) -> usize {
        let src_nodes = self.block_nodes(src).to_vec();
        for (offset, &id) in src_nodes.iter().enumerate() {
            self.clone_node_into(id, dest, pos + offset, value_map);
        }
        src_nodes.len()
    }

    fn clone_node_into(
        &mut self,
        id: NodeId,
        dest: BlockId,
        pos: usize,
        value_map: &mut FxHashMap<ValueId, ValueId>,
    ) -> NodeId {
        let node = self.node(id).clone();
        let map = |value_map: &FxHashMap<ValueId, ValueId>, id: &ValueId| {
            value_map.get(id).copied().unwrap_or(*id)
        };

        let inputs: SmallVec<[ValueId; 4]> =
            node.inputs.iter().map(|id| map(value_map, id)).collect();
        let output_types: SmallVec<[Type; 2]> = node
            .outputs
            .iter()
            .map(|&id| self.value_type(id).clone())
            .collect();
        let new_id = self.insert_node(dest, pos, node.op.clone(), &inputs, &output_types);
        self.node_mut(new_id).name = node.name.clone();

        let new_outputs = self.node(new_id).outputs.clone();
        for (&old, &new) in zip(&node.outputs, &new_outputs) {
            self.values[new.as_usize()].name = self.values[old.as_usize()].name.clone();
            value_map.insert(old, new);
        }

        for &block in &node.blocks {
            let new_block = self.add_node_block(new_id);
            for param in self.block_params(block).to_vec() {
                let ValueInfo { name, ty, .. } = self.value(param).clone();
                let new_param = self.add_block_param(new_block, name.as_deref(), ty);
                value_map.insert(param, new_param);
            }
            self.clone_block_into(block, new_block, 0, value_map);
            let returns: Vec<ValueId> = self
                .block_returns(block)
                .iter()
                .map(|id| map(value_map, id))
                .collect();
            self.set_block_returns(new_block, &returns);
        }

        new_id
    }
}
