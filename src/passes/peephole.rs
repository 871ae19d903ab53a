use super::GraphExt;
use crate::graph::{normalize_index, BinaryOp, Graph, IValue, NodeId, Op, ValueId};

/// Replacement for the output of a node matched by a peephole rule.
enum Rewrite {
    Value(ValueId),
    Constant(IValue),
}

/// Apply local algebraic simplifications.
///
/// - Integer identities such as `x + 0`, `x * 1`, `x * 0` and `x - x`
/// - Comparisons of a value with itself
/// - Double negation
/// - `len` of, and constant-index reads from, lists built by `ListConstruct`
///   which are never mutated
pub fn peephole_optimize(graph: &mut Graph) -> bool {
    let mut changed = false;

    for node_id in graph.all_node_ids() {
        if graph.get_node(node_id).is_none() {
            continue;
        }
        let Some(rewrite) = match_rewrite(graph, node_id) else {
            continue;
        };
        let Some(output) = graph.node(node_id).output() else {
            continue;
        };
        let replacement = match rewrite {
            Rewrite::Value(value) => value,
            Rewrite::Constant(value) => graph.insert_constant(value),
        };
        graph.replace_all_uses_with(output, replacement);
        graph.remove_node(node_id);
        changed = true;
    }

    changed
}

fn match_rewrite(graph: &Graph, node_id: NodeId) -> Option<Rewrite> {
    let node = graph.node(node_id);
    match node.op() {
        Op::Binary(op) => {
            let (a, b) = (node.input(0), node.input(1));
            simplify_binary(*op, a, b, graph.constant_int(a), graph.constant_int(b))
        }
        Op::Not => {
            let inner = graph.get_node(graph.producer(node.input(0))?)?;
            match inner.op() {
                Op::Not => Some(Rewrite::Value(inner.input(0))),
                _ => None,
            }
        }
        Op::Len => {
            let elements = read_only_list_elements(graph, node.input(0))?;
            Some(Rewrite::Constant(IValue::Int(elements.len() as i64)))
        }
        Op::GetItem => {
            let elements = read_only_list_elements(graph, node.input(0))?;
            let index = graph.constant_int(node.input(1))?;
            let index = normalize_index(index, elements.len())?;
            Some(Rewrite::Value(elements[index]))
        }
        _ => None,
    }
}

fn simplify_binary(
    op: BinaryOp,
    a: ValueId,
    b: ValueId,
    const_a: Option<i64>,
    const_b: Option<i64>,
) -> Option<Rewrite> {
    use BinaryOp::*;

    if a == b {
        match op {
            Sub => return Some(Rewrite::Constant(IValue::Int(0))),
            Min | Max => return Some(Rewrite::Value(a)),
            Eq | Le | Ge => return Some(Rewrite::Constant(IValue::Bool(true))),
            Ne | Lt | Gt => return Some(Rewrite::Constant(IValue::Bool(false))),
            _ => {}
        }
    }

    match (op, const_a, const_b) {
        (Add, _, Some(0)) | (Sub, _, Some(0)) | (Mul, _, Some(1)) | (FloorDiv, _, Some(1)) => {
            Some(Rewrite::Value(a))
        }
        (Add, Some(0), _) | (Mul, Some(1), _) => Some(Rewrite::Value(b)),
        (Mul, Some(0), _) | (Mul, _, Some(0)) => Some(Rewrite::Constant(IValue::Int(0))),
        _ => None,
    }
}

/// Return the elements of a list built by `ListConstruct` that is never
/// mutated.
fn read_only_list_elements(graph: &Graph, list: ValueId) -> Option<&[ValueId]> {
    let producer = graph.get_node(graph.producer(list)?)?;
    if !matches!(producer.op(), Op::ListConstruct) || !graph.is_read_only_list(list) {
        return None;
    }
    Some(producer.inputs())
}
