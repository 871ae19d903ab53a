use rustc_hash::FxHashMap;

use crate::graph::{Graph, IValue, Op, ValueId};

/// Maximum trip count of loops that are unrolled.
pub const MAX_UNROLL_TRIP_COUNT: i64 = 64;

/// Fully unroll loops whose trip count is a constant no greater than
/// [`MAX_UNROLL_TRIP_COUNT`].
///
/// The body is copied into the loop's block once per iteration, with the
/// iteration counter replaced by a constant. Loops nested inside an unrolled
/// body are left for a later call.
pub fn unroll_constant_loops(graph: &mut Graph) -> bool {
    let mut changed = false;

    for node_id in graph.all_node_ids() {
        let Some(node) = graph.get_node(node_id) else {
            continue;
        };
        if !matches!(node.op(), Op::Loop) {
            continue;
        }
        let Some(trip_count) = graph.constant_int(node.input(0)) else {
            continue;
        };
        if trip_count > MAX_UNROLL_TRIP_COUNT {
            continue;
        }

        let block = node.owning_block();
        let body = node.blocks()[0];
        let outputs: Vec<ValueId> = node.outputs().to_vec();
        let mut carried: Vec<ValueId> = node.inputs()[1..].to_vec();
        let params: Vec<ValueId> = graph.block_params(body).to_vec();

        for iter in 0..trip_count.max(0) {
            let iter_value = graph.insert_constant(IValue::Int(iter));
            let mut value_map = FxHashMap::default();
            value_map.insert(params[0], iter_value);
            value_map.extend(params[1..].iter().copied().zip(carried.iter().copied()));

            let pos = graph.position(node_id);
            graph.clone_block_into(body, block, pos, &mut value_map);
            carried = graph
                .block_returns(body)
                .iter()
                .map(|id| value_map.get(id).copied().unwrap_or(*id))
                .collect();
        }

        for (output, result) in outputs.into_iter().zip(carried) {
            graph.replace_all_uses_with(output, result);
        }
        graph.remove_node(node_id);
        changed = true;
    }

    changed
}
