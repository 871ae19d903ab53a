use crate::graph::{BlockId, Graph, Op, Type, Use, ValueId};

/// Replace in-place appends to lists with construction of new lists.
///
/// A `ListAppend(list, item)` is rewritten when `list` is produced by a
/// `ListConstruct` in the same block as the append, and every use of `list`
/// is a read or an append in that block (or a return from it). A new
/// `ListConstruct` containing the extra item is inserted in place of the
/// append and later uses of `list` are redirected to it. Readers before the
/// append keep seeing the original list.
pub fn remove_list_mutation(graph: &mut Graph) -> bool {
    let mut changed = false;

    for node_id in graph.all_node_ids() {
        let Some(node) = graph.get_node(node_id) else {
            continue;
        };
        if !matches!(node.op(), Op::ListAppend) {
            continue;
        }
        let (list, item) = (node.input(0), node.input(1));
        let block = node.owning_block();

        let Some(mut elements) = list_elements(graph, list, block) else {
            continue;
        };
        if !uses_are_local(graph, list, block) {
            continue;
        }
        elements.push(item);

        let pos = graph.position(node_id);
        let new_node =
            graph.insert_node(block, pos, Op::ListConstruct, &elements, &[Type::IntList]);
        let new_list = graph.node(new_node).outputs()[0];
        graph.replace_uses_after(new_node, list, new_list);
        graph.remove_node(node_id);
        changed = true;
    }

    changed
}

/// Return the elements of `list` if it is built by a `ListConstruct` in
/// `block`.
fn list_elements(graph: &Graph, list: ValueId, block: BlockId) -> Option<Vec<ValueId>> {
    let node = graph.get_node(graph.producer(list)?)?;
    match node.op() {
        Op::ListConstruct if node.owning_block() == block => Some(node.inputs().to_vec()),
        _ => None,
    }
}

fn uses_are_local(graph: &Graph, list: ValueId, block: BlockId) -> bool {
    graph.uses(list).into_iter().all(|use_| match use_ {
        Use::Node { node, index } => {
            let node = graph.node(node);
            node.owning_block() == block
                && index == 0
                && matches!(node.op(), Op::Len | Op::GetItem | Op::Slice | Op::ListAppend)
        }
        Use::Return { block: ret_block, .. } => ret_block == block,
    })
}
