use smallvec::SmallVec;

use crate::graph::{Graph, Op, ValueId};

/// Forward tuple elements to readers of tuples built by `TupleConstruct`.
///
/// `TupleIndex` and `TupleUnpack` nodes whose input is produced by a
/// `TupleConstruct` are removed, and uses of their outputs are replaced with
/// the corresponding constructor input.
pub fn lower_simple_tuples(graph: &mut Graph) -> bool {
    let mut changed = false;

    for node_id in graph.all_node_ids() {
        let Some(node) = graph.get_node(node_id) else {
            continue;
        };
        let indices: SmallVec<[usize; 4]> = match node.op() {
            Op::TupleIndex(index) => SmallVec::from_slice(&[*index]),
            Op::TupleUnpack => (0..node.outputs().len()).collect(),
            _ => continue,
        };
        let Some(elements) = tuple_elements(graph, node.input(0)) else {
            continue;
        };
        if indices.iter().any(|&i| i >= elements.len()) {
            continue;
        }

        let outputs: SmallVec<[ValueId; 4]> = node.outputs().into();
        for (output, index) in outputs.into_iter().zip(indices) {
            graph.replace_all_uses_with(output, elements[index]);
        }
        graph.remove_node(node_id);
        changed = true;
    }

    changed
}

/// Return the elements of a tuple if it is produced by a `TupleConstruct`.
fn tuple_elements(graph: &Graph, tuple: ValueId) -> Option<SmallVec<[ValueId; 4]>> {
    let producer = graph.get_node(graph.producer(tuple)?)?;
    match producer.op() {
        Op::TupleConstruct => Some(producer.inputs().into()),
        _ => None,
    }
}
