use rustc_hash::FxHashSet;

use crate::graph::{Graph, NodeId, Op, ValueId};

/// Remove nodes which do not contribute to the graph's outputs.
///
/// Assertions and opaque calls are always kept. A `ListAppend` is kept if
/// the list it modifies is live. Control flow nodes are kept if any of their
/// outputs, or any node in their nested blocks, is live.
pub fn eliminate_dead_code(graph: &mut Graph) -> bool {
    let all_nodes = graph.all_node_ids();
    let mut live_values: FxHashSet<ValueId> = graph.output_ids().iter().copied().collect();
    let mut live_nodes: FxHashSet<NodeId> = FxHashSet::default();

    // Iterate to a fixed point, since appends and loop bodies can make
    // values that are defined earlier live.
    loop {
        let mut changed = false;
        for &node_id in all_nodes.iter().rev() {
            if live_nodes.contains(&node_id) || !is_live(graph, node_id, &live_values, &live_nodes)
            {
                continue;
            }
            let node = graph.node(node_id);
            live_nodes.insert(node_id);
            live_values.extend(node.inputs().iter().copied());
            for &block in node.blocks() {
                live_values.extend(graph.block_returns(block).iter().copied());
            }
            changed = true;
        }
        if !changed {
            break;
        }
    }

    let mut removed = false;
    for node_id in all_nodes {
        if !live_nodes.contains(&node_id) && graph.get_node(node_id).is_some() {
            graph.remove_node(node_id);
            removed = true;
        }
    }
    removed
}

fn is_live(
    graph: &Graph,
    node_id: NodeId,
    live_values: &FxHashSet<ValueId>,
    live_nodes: &FxHashSet<NodeId>,
) -> bool {
    let node = graph.node(node_id);
    match node.op() {
        Op::Assert | Op::Call(_) => true,
        Op::ListAppend => live_values.contains(&node.input(0)),
        Op::If | Op::Loop => {
            node.outputs().iter().any(|id| live_values.contains(id))
                || node.blocks().iter().any(|&block| {
                    graph
                        .block_nodes(block)
                        .iter()
                        .any(|id| live_nodes.contains(id))
                })
        }
        _ => node.outputs().iter().any(|id| live_values.contains(id)),
    }
}
