//! Symbolic shape analysis for operator graphs.
//!
//! The output shape of an operator can often be computed from the shapes and
//! values of its inputs by a small program, called a _shape program_. This
//! crate infers as much as can be proven about an operator's output shape
//! when its inputs are only partially known, by partially evaluating the
//! operator's shape program.
//!
//! # Workflow
//!
//! 1. Write shape programs using [`GraphBuilder`](graph::GraphBuilder). A
//!    shape program has one input per operator input and a single output of
//!    type `int[]`. Tensor inputs are represented by their shapes.
//! 2. Register the programs in a [`ShapeFunctionRegistry`], keyed by
//!    operator signature.
//! 3. Call [`ShapeFunctionRegistry::propagate_shapes`] on an operator graph
//!    to annotate the output types of registered operators.
//!
//! Individual operators can also be analyzed directly using
//! [`SymbolicShapeAnalyzer`] or [`analyze`].
//!
//! # Precision
//!
//! Analysis is best-effort. Dimensions which cannot be proven are reported
//! as unknown and a result whose rank cannot be proven has unknown rank.
//! Known dimensions always match the result of evaluating the shape program
//! on any concrete input consistent with what is known.
//!
//! # Configuration
//!
//! [`AnalysisOptions`] controls the number of simplification rounds and the
//! diagnostics printed during analysis. [`AnalysisOptions::from_env`] reads
//! these from the `RTEN_SHAPE_ROUNDS`, `RTEN_SHAPE_STOP_EARLY` and
//! `RTEN_SHAPE_DIAGNOSTICS` environment variables.

mod analyzer;
mod diagnostics;
mod env;
pub mod graph;
pub mod passes;
mod registry;
mod sym_shape;

pub use analyzer::{
    analyze, AnalysisError, AnalysisOptions, OperatorInput, SymbolicShapeAnalyzer,
    DEFAULT_MAX_ROUNDS,
};
pub use diagnostics::DiagnosticLevel;
pub use registry::{PropagateError, ShapeFunctionRegistry};
pub use sym_shape::SymbolicShape;
