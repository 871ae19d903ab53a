//! Simplification passes for shape programs.
//!
//! Each pass rewrites a [`Graph`] in place and returns `true` if it changed
//! anything. Passes preserve the result of [`Graph::run`] for every input on
//! which evaluation succeeds.

use crate::graph::{Graph, Op, Use, ValueId};

mod constant_pooling;
mod constant_propagation;
mod dead_code;
mod lower_tuples;
mod peephole;
mod remove_mutation;
mod unroll_loops;

pub use constant_pooling::pool_constants;
pub use constant_propagation::propagate_constants;
pub use dead_code::eliminate_dead_code;
pub use lower_tuples::lower_simple_tuples;
pub use peephole::peephole_optimize;
pub use remove_mutation::remove_list_mutation;
pub use unroll_loops::{unroll_constant_loops, MAX_UNROLL_TRIP_COUNT};

/// Additional graph querying methods used by the passes.
pub(crate) trait GraphExt {
    /// Return true if a list value is only ever read, and does not escape
    /// into a nested block, tuple or operator call.
    ///
    /// Only lists for which this holds can be replaced by constants or have
    /// their elements forwarded to readers.
    fn is_read_only_list(&self, list: ValueId) -> bool;
}

impl GraphExt for Graph {
    fn is_read_only_list(&self, list: ValueId) -> bool {
        let root = self.root();
        self.uses(list).into_iter().all(|use_| match use_ {
            Use::Node { node, index } => {
                index == 0 && matches!(self.node(node).op(), Op::Len | Op::GetItem | Op::Slice)
            }
            Use::Return { block, .. } => block == root,
        })
    }
}
