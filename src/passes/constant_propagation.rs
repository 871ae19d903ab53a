use smallvec::SmallVec;

use super::GraphExt;
use crate::graph::{eval_op, Graph, IValue, NodeId, Op, Type, ValueId};

/// Evaluate nodes whose inputs are all constants and replace their outputs
/// with constants.
///
/// Additionally this inlines the taken branch of `If` nodes with a constant
/// condition and removes assertions whose condition is constant true.
/// Nodes whose evaluation fails (eg. an out of range index or a failing
/// assertion) are left in place.
pub fn propagate_constants(graph: &mut Graph) -> bool {
    let mut changed = false;

    for node_id in graph.all_node_ids() {
        let Some(node) = graph.get_node(node_id) else {
            continue;
        };
        changed |= match node.op() {
            Op::If => inline_constant_branch(graph, node_id),
            Op::Assert => remove_true_assertion(graph, node_id),
            Op::Constant(_) | Op::Loop | Op::ListAppend | Op::Call(_) => false,
            _ => fold_node(graph, node_id),
        };
    }

    changed
}

fn fold_node(graph: &mut Graph, node_id: NodeId) -> bool {
    let node = graph.node(node_id);

    // Lists which are mutated or escape must keep their identity.
    let is_shared_list = |id: ValueId| {
        matches!(graph.value_type(id), Type::IntList) && !graph.is_read_only_list(id)
    };
    if node.outputs().iter().any(|&output| is_shared_list(output))
        || node.inputs().iter().any(|&input| is_shared_list(input))
    {
        return false;
    }

    let values = {
        let Some(inputs) = node
            .inputs()
            .iter()
            .map(|&id| graph.constant_value(id))
            .collect::<Option<SmallVec<[&IValue; 4]>>>()
        else {
            return false;
        };
        let Ok(values) = eval_op(node.op(), &inputs) else {
            return false;
        };
        values
    };

    let outputs: SmallVec<[ValueId; 2]> = SmallVec::from_slice(graph.node(node_id).outputs());
    for (output, value) in outputs.into_iter().zip(values) {
        let constant = graph.insert_constant(value);
        graph.replace_all_uses_with(output, constant);
    }
    graph.remove_node(node_id);
    true
}

fn inline_constant_branch(graph: &mut Graph, node_id: NodeId) -> bool {
    let node = graph.node(node_id);
    let Some(cond) = graph.constant_bool(node.input(0)) else {
        return false;
    };
    let branch = node.blocks()[if cond { 0 } else { 1 }];
    let block = node.owning_block();
    let outputs: SmallVec<[_; 2]> = node.outputs().into();
    let results: SmallVec<[_; 2]> = graph.block_returns(branch).into();

    let pos = graph.position(node_id);
    graph.splice_block(branch, block, pos);
    for (output, result) in outputs.into_iter().zip(results) {
        graph.replace_all_uses_with(output, result);
    }
    graph.remove_node(node_id);
    true
}

fn remove_true_assertion(graph: &mut Graph, node_id: NodeId) -> bool {
    let cond = graph.node(node_id).input(0);
    if graph.constant_bool(cond) == Some(true) {
        graph.remove_node(node_id);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::propagate_constants;
    use crate::graph::{Arg, Graph, GraphBuilder, IValue, Op, Schema, TensorType, Type};

    fn count_ops(graph: &Graph, pred: impl Fn(&Op) -> bool) -> usize {
        graph
            .all_node_ids()
            .into_iter()
            .filter(|&id| pred(graph.node(id).op()))
            .count()
    }

    #[test]
    fn test_fold_arithmetic() {
        let mut b = GraphBuilder::new();
        let two = b.constant(2);
        let three = b.constant(3);
        let product = b.mul(two, three);
        let one = b.constant(1);
        let sum = b.add(product, one);
        let out = b.list(&[two, sum]);
        let mut graph = b.build(&[out]);

        assert!(propagate_constants(&mut graph));
        assert_eq!(
            graph.constant_value(graph.output_ids()[0]),
            Some(&IValue::IntList(vec![2, 7]))
        );
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Binary(_))), 0);
    }

    #[test]
    fn test_failed_evaluation_is_not_folded() {
        let mut b = GraphBuilder::new();
        let list = b.constant(vec![1, 2]);
        let item = b.index(list, 5);
        let mut graph = b.build(&[item]);

        assert!(!propagate_constants(&mut graph));
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::GetItem)), 1);
    }

    #[test]
    fn test_inline_constant_branch() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", Type::IntList);
        let four = b.constant(4);
        let rank = b.constant(4);
        let cond = b.eq(rank, four);
        let out = b.if_else(
            cond,
            &[Type::Int],
            |b| vec![b.index(x, -1)],
            |b| vec![b.constant(0)],
        );
        let mut graph = b.build(&out);

        assert!(propagate_constants(&mut graph));
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::If)), 0);
        let result = graph.run(&[IValue::IntList(vec![1, 2, 3, 9])]).unwrap();
        assert_eq!(result, [IValue::Int(9)]);
    }

    #[test]
    fn test_assertions() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", Type::IntList);
        let passes = b.constant(true);
        b.assert(passes);
        let fails = b.constant(false);
        b.assert(fails);
        let mut graph = b.build(&[x]);

        assert!(propagate_constants(&mut graph));
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Assert)), 1);
    }

    #[test]
    fn test_shared_lists_are_not_folded() {
        let schema = Arc::new(Schema::new(
            "test::view",
            vec![
                Arg::new("self", Type::Tensor(TensorType::default())),
                Arg::new("size", Type::IntList),
            ],
            vec![Arg::unnamed(Type::Tensor(TensorType::default()))],
        ));

        let mut b = GraphBuilder::new();
        let t = b.input("t", Type::Tensor(TensorType::default()));
        let one = b.constant(1);
        let appended = b.list(&[one]);
        b.append(appended, one);
        let escaped = b.list(&[one]);
        b.call(None, &schema, &[t, escaped], &[Type::Tensor(TensorType::default())]);
        let mut graph = b.build(&[appended, escaped]);

        assert!(!propagate_constants(&mut graph));
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::ListConstruct)), 2);
    }

    #[test]
    fn test_reads_of_mutated_constant_lists_are_not_folded() {
        let mut b = GraphBuilder::new();
        let list = b.constant(vec![1, 2]);
        let zero = b.constant(0);
        b.append(list, zero);
        let n = b.len(list);
        let last = b.index(list, -1);
        let out = b.list(&[n, last]);
        let mut graph = b.build(&[out]);

        propagate_constants(&mut graph);

        assert_eq!(count_ops(&graph, |op| matches!(op, Op::Len)), 1);
        assert_eq!(count_ops(&graph, |op| matches!(op, Op::GetItem)), 1);
        assert_eq!(graph.run(&[]).unwrap(), [IValue::IntList(vec![3, 0])]);
    }
}
