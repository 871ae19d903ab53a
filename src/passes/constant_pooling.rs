use rustc_hash::FxHashMap;

use super::GraphExt;
use crate::graph::{Graph, IValue, Op, ValueId};

/// Merge constant nodes with equal values.
///
/// The surviving constant for each value is placed in the root block so that
/// it is visible to every use. List constants which are not read-only keep
/// their own node.
pub fn pool_constants(graph: &mut Graph) -> bool {
    let mut changed = false;
    let mut pool: FxHashMap<IValue, ValueId> = FxHashMap::default();
    let root = graph.root();

    for node_id in graph.all_node_ids() {
        let Some(node) = graph.get_node(node_id) else {
            continue;
        };
        let Op::Constant(value) = node.op() else {
            continue;
        };
        let Some(output) = node.output() else {
            continue;
        };
        if matches!(value, IValue::IntList(_)) && !graph.is_read_only_list(output) {
            continue;
        }

        if let Some(&existing) = pool.get(value) {
            graph.replace_all_uses_with(output, existing);
            graph.remove_node(node_id);
            changed = true;
        } else if node.owning_block() != root {
            let value = value.clone();
            let hoisted = graph.insert_constant(value.clone());
            graph.replace_all_uses_with(output, hoisted);
            graph.remove_node(node_id);
            pool.insert(value, hoisted);
            changed = true;
        } else {
            pool.insert(value.clone(), output);
        }
    }

    changed
}
