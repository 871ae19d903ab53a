use std::sync::Arc;

use rustc_hash::FxHashMap;
use rten_testing::TestCases;

use super::{
    Arg, Graph, GraphBuilder, IValue, Op, RunError, Schema, TensorType, Type, Use, ValueId,
};

fn tensor_type() -> Type {
    Type::Tensor(TensorType::default())
}

#[test]
fn test_run_list_ops() {
    #[derive(Debug)]
    struct Case {
        input: Vec<i64>,
        start: Option<i64>,
        end: Option<i64>,
        expected: Vec<i64>,
    }

    let cases = [
        Case {
            input: vec![1, 2, 3, 4],
            start: None,
            end: None,
            expected: vec![1, 2, 3, 4],
        },
        Case {
            input: vec![1, 2, 3, 4],
            start: Some(1),
            end: Some(-1),
            expected: vec![2, 3],
        },
        Case {
            input: vec![1, 2, 3, 4],
            start: Some(-10),
            end: Some(10),
            expected: vec![1, 2, 3, 4],
        },
        Case {
            input: vec![1, 2, 3, 4],
            start: Some(3),
            end: Some(1),
            expected: vec![],
        },
    ];

    cases.test_each(|case| {
        let mut b = GraphBuilder::new();
        let x = b.input("x", Type::IntList);
        let start = case.start.map(|s| b.constant(s));
        let end = case.end.map(|e| b.constant(e));
        let out = b.slice(x, start, end);
        let graph = b.build(&[out]);

        let result = graph.run(&[case.input.clone().into()]).unwrap();
        assert_eq!(result, [IValue::IntList(case.expected.clone())]);
    })
}

#[test]
fn test_run_get_item() {
    #[derive(Debug)]
    struct Case {
        index: i64,
        expected: Result<i64, RunError>,
    }

    let cases = [
        Case {
            index: 0,
            expected: Ok(5),
        },
        Case {
            index: -1,
            expected: Ok(7),
        },
        Case {
            index: -3,
            expected: Ok(5),
        },
        Case {
            index: 3,
            expected: Err(RunError::IndexOutOfRange),
        },
        Case {
            index: -4,
            expected: Err(RunError::IndexOutOfRange),
        },
    ];

    cases.test_each(|case| {
        let mut b = GraphBuilder::new();
        let x = b.input("x", Type::IntList);
        let item = b.index(x, case.index);
        let graph = b.build(&[item]);

        let result = graph.run(&[IValue::IntList(vec![5, 6, 7])]);
        let expected = case.expected.clone().map(|v| vec![IValue::Int(v)]);
        assert_eq!(result, expected);
    })
}

#[test]
fn test_run_if() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let two = b.constant(2);
    let is_2d = b.eq(n, two);
    let out = b.if_else(
        is_2d,
        &[Type::Int],
        |b| vec![b.index(x, 1)],
        |b| vec![b.constant(-1)],
    );
    let graph = b.build(&out);

    let result = graph.run(&[IValue::IntList(vec![3, 4])]).unwrap();
    assert_eq!(result, [IValue::Int(4)]);

    let result = graph.run(&[IValue::IntList(vec![3, 4, 5])]).unwrap();
    assert_eq!(result, [IValue::Int(-1)]);
}

#[test]
fn test_run_loop() {
    // Compute the product of all dimensions using a loop-carried value.
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let init = b.constant(1);
    let out = b.loop_n(n, &[init], |b, i, params| {
        let dim = b.get_item(x, i);
        vec![b.mul(params[0], dim)]
    });
    let graph = b.build(&out);

    let result = graph.run(&[IValue::IntList(vec![2, 3, 4])]).unwrap();
    assert_eq!(result, [IValue::Int(24)]);

    let result = graph.run(&[IValue::IntList(vec![])]).unwrap();
    assert_eq!(result, [IValue::Int(1)]);
}

#[test]
fn test_run_assert() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let one = b.constant(1);
    let cond = b.eq(n, one);
    b.assert(cond);
    let graph = b.build(&[n]);

    assert_eq!(
        graph.run(&[IValue::IntList(vec![3])]),
        Ok(vec![IValue::Int(1)])
    );
    assert_eq!(
        graph.run(&[IValue::IntList(vec![3, 4])]),
        Err(RunError::AssertionFailed)
    );
}

#[test]
fn test_run_invalid_input_count() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let graph = b.build(&[x]);

    assert_eq!(
        graph.run(&[]),
        Err(RunError::InvalidInputCount {
            expected: 1,
            actual: 0
        })
    );
}

#[test]
fn test_run_opaque_call() {
    let schema = Arc::new(Schema::new(
        "test::relu",
        vec![Arg::new("self", tensor_type())],
        vec![Arg::unnamed(tensor_type())],
    ));
    let mut b = GraphBuilder::new();
    let x = b.input("x", tensor_type());
    let out = b.call(Some("relu"), &schema, &[x], &[tensor_type()]);
    let graph = b.build(&out);

    assert_eq!(
        graph.run(&[IValue::None]),
        Err(RunError::UnsupportedOp("test::relu".into()))
    );
}

#[test]
fn test_tuples() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let tuple = b.tuple(&[x, n]);
    assert_eq!(
        b.graph().value_type(tuple),
        &Type::Tuple(vec![Type::IntList, Type::Int])
    );
    let count = b.tuple_index(tuple, 1);
    let unpacked = b.tuple_unpack(tuple);
    let graph = b.build(&[count, unpacked[0]]);

    let result = graph.run(&[IValue::IntList(vec![8, 9])]).unwrap();
    assert_eq!(result, [IValue::Int(2), IValue::IntList(vec![8, 9])]);
}

#[test]
fn test_uses() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let out = b.if_else(
        n,
        &[Type::IntList],
        |b| {
            b.len(x);
            vec![x]
        },
        |b| vec![b.list(&[])],
    );
    let graph = b.build(&[x, out[0]]);

    let uses = graph.uses(x);
    let len_node = graph.producer(n).unwrap();
    let then_block = graph.node(graph.producer(out[0]).unwrap()).blocks()[0];
    let nested_len = graph.block_nodes(then_block)[0];
    assert_eq!(
        uses,
        [
            Use::Node {
                node: len_node,
                index: 0
            },
            Use::Node {
                node: nested_len,
                index: 0
            },
            Use::Return {
                block: then_block,
                index: 0
            },
            Use::Return {
                block: graph.root(),
                index: 0
            },
        ]
    );
    assert!(graph.has_uses(out[0]));
    assert_eq!(graph.uses(n).len(), 1);
}

#[test]
fn test_replace_uses_after() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let len_a = b.len(x);
    let y = b.list(&[len_a]);
    let len_b = b.len(x);
    let graph_outputs = [len_a, len_b, x];
    let mut graph = b.build(&graph_outputs);

    let split_node = graph.producer(y).unwrap();
    graph.replace_uses_after(split_node, x, y);

    let len_a_node = graph.node(graph.producer(len_a).unwrap());
    let len_b_node = graph.node(graph.producer(len_b).unwrap());
    assert_eq!(len_a_node.inputs(), [x]);
    assert_eq!(len_b_node.inputs(), [y]);
    assert_eq!(graph.output_ids(), [len_a, len_b, y]);
}

#[test]
fn test_remove_node_discards_nested_nodes() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let out = b.loop_n(n, &[], |b, i, _| {
        b.get_item(x, i);
        vec![]
    });
    assert!(out.is_empty());
    let mut graph = b.build(&[n]);

    let loop_node = *graph.node_ids().last().unwrap();
    let body = graph.node(loop_node).blocks()[0];
    let nested = graph.block_nodes(body).to_vec();
    assert_eq!(nested.len(), 1);

    graph.remove_node(loop_node);
    assert!(graph.get_node(loop_node).is_none());
    for id in nested {
        assert!(graph.get_node(id).is_none());
    }
    assert_eq!(graph.all_node_ids().len(), 1);
}

#[test]
fn test_clone_block_into() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let init = b.constant(0);
    let out = b.loop_n(n, &[init], |b, i, params| {
        let dim = b.get_item(x, i);
        vec![b.add(params[0], dim)]
    });
    let mut graph = b.build(&out);

    let loop_node = graph.producer(out[0]).unwrap();
    let body = graph.node(loop_node).blocks()[0];
    let params = graph.block_params(body).to_vec();

    // Unroll one iteration in front of the loop.
    let zero = graph.insert_constant(IValue::Int(0));
    let mut value_map = FxHashMap::default();
    value_map.insert(params[0], zero);
    value_map.insert(params[1], init);
    let pos = graph.position(loop_node);
    let root = graph.root();
    let inserted = graph.clone_block_into(body, root, pos, &mut value_map);
    assert_eq!(inserted, 2);

    let sum = value_map[&graph.block_returns(body)[0]];
    assert_ne!(sum, graph.block_returns(body)[0]);
    graph.set_output_ids(&[sum]);

    let result = graph.run(&[IValue::IntList(vec![5, 6])]).unwrap();
    assert_eq!(result, [IValue::Int(5)]);
}

#[test]
fn test_splice_block() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let cond = b.constant(true);
    let out = b.if_else(
        cond,
        &[Type::Int],
        |b| vec![b.index(x, 0)],
        |b| vec![b.constant(0)],
    );
    let mut graph = b.build(&out);

    let if_node = graph.producer(out[0]).unwrap();
    let then_block = graph.node(if_node).blocks()[0];
    let result_id: ValueId = graph.block_returns(then_block)[0];
    let pos = graph.position(if_node);
    let root = graph.root();

    graph.splice_block(then_block, root, pos);
    graph.replace_all_uses_with(out[0], result_id);
    graph.remove_node(if_node);

    assert!(graph
        .all_node_ids()
        .iter()
        .all(|&id| !matches!(graph.node(id).op(), Op::If)));
    let result = graph.run(&[IValue::IntList(vec![9])]).unwrap();
    assert_eq!(result, [IValue::Int(9)]);
}

#[test]
fn test_insert_constant_is_first_node() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", Type::IntList);
    let n = b.len(x);
    let mut graph: Graph = b.build(&[n]);

    let c = graph.insert_constant(IValue::IntList(vec![1, 2]));
    let first = graph.node_ids()[0];
    assert_eq!(graph.node(first).outputs(), [c]);
    assert_eq!(graph.constant_value(c), Some(&IValue::IntList(vec![1, 2])));
    assert_eq!(graph.constant_int(n), None);
}
