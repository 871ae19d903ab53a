//! Partial evaluation of shape programs.
//!
//! A shape program computes the output shape of an operator from the shapes
//! and values of its inputs. [`SymbolicShapeAnalyzer`] specializes a copy of
//! a shape program using whatever is known about an operator's inputs,
//! simplifies it repeatedly and then reads as much of the output shape as
//! can be proven from the simplified program.

use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::diagnostics::{DiagnosticLevel, Diagnostics};
use crate::env::{env_flag, env_usize};
use crate::graph::{normalize_index, Graph, IValue, NodeId, Op, Type, Use, ValueId};
use crate::passes::{
    eliminate_dead_code, lower_simple_tuples, peephole_optimize, pool_constants,
    propagate_constants, remove_list_mutation, unroll_constant_loops, GraphExt,
};
use crate::sym_shape::SymbolicShape;


/// Default number of substitution and simplification rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 6;

/// Configuration for shape analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisOptions {
    /// Number of substitution and simplification rounds.
    ///
    /// Rewrites which only become possible after several rounds (eg. a
    /// loop whose trip count depends on a dimension that is resolved late)
    /// will be missed if this is too low.
    pub max_rounds: usize,

    /// Stop early after a round in which nothing changed. `max_rounds` is
    /// still an upper bound.
    pub stop_when_unchanged: bool,

    /// Level of diagnostics printed during analysis.
    pub diagnostics: DiagnosticLevel,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            max_rounds: DEFAULT_MAX_ROUNDS,
            stop_when_unchanged: false,
            diagnostics: DiagnosticLevel::Off,
        }
    }
}

impl AnalysisOptions {
    /// Create options from environment variables.
    ///
    /// - `RTEN_SHAPE_ROUNDS` sets [`max_rounds`](Self::max_rounds)
    /// - `RTEN_SHAPE_STOP_EARLY` sets [`stop_when_unchanged`](Self::stop_when_unchanged)
    /// - `RTEN_SHAPE_DIAGNOSTICS` (`off`, `warn` or `info`) sets the
    ///   diagnostic level
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let diagnostics = std::env::var("RTEN_SHAPE_DIAGNOSTICS")
            .ok()
            .and_then(|name| DiagnosticLevel::from_name(&name))
            .unwrap_or(defaults.diagnostics);
        AnalysisOptions {
            max_rounds: env_usize("RTEN_SHAPE_ROUNDS", defaults.max_rounds),
            stop_when_unchanged: env_flag("RTEN_SHAPE_STOP_EARLY", defaults.stop_when_unchanged),
            diagnostics,
        }
    }
}

/// Errors which indicate that a shape program or its inputs are malformed.
///
/// These are never caused by a lack of information about the inputs, which
/// instead produces a less precise result.
#[derive(Clone, Debug, PartialEq)]
pub enum AnalysisError {
    /// The shape program does not have exactly one output of type `int[]`.
    InvalidShapeProgram(&'static str),

    /// A list of tensors was passed as an operator input.
    TensorListInput { index: usize },

    /// The number of operator inputs does not match the number of shape
    /// program inputs.
    InputCountMismatch { expected: usize, actual: usize },
}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::InvalidShapeProgram(msg) => write!(f, "invalid shape program: {}", msg),
            Self::TensorListInput { index } => {
                write!(f, "input {} is a tensor list, which is not supported", index)
            }
            Self::InputCountMismatch { expected, actual } => write!(
                f,
                "shape program expects {} inputs but operator has {}",
                expected, actual
            ),
        }
    }
}

impl Error for AnalysisError {}

/// What is known about one input of the operator being analyzed.
#[derive(Clone, Debug, PartialEq)]
pub enum OperatorInput {
    /// A tensor with a possibly partially known shape.
    Tensor(SymbolicShape),

    /// A list of tensors.
    TensorList,

    /// A non-tensor value, which is `Some` if it is known at analysis time.
    Value(Option<IValue>),
}

impl OperatorInput {
    /// Describe the value `id` in an operator graph.
    ///
    /// Non-tensor values are known if they are produced by a constant node.
    pub fn for_value(graph: &Graph, id: ValueId) -> Self {
        match graph.value_type(id) {
            Type::Tensor(tensor_type) => Self::Tensor(tensor_type.shape.clone()),
            Type::TensorList => Self::TensorList,
            _ => Self::Value(graph.constant_value(id).cloned()),
        }
    }
}

impl From<SymbolicShape> for OperatorInput {
    fn from(shape: SymbolicShape) -> Self {
        Self::Tensor(shape)
    }
}

impl From<IValue> for OperatorInput {
    fn from(value: IValue) -> Self {
        Self::Value(Some(value))
    }
}

/// Classification of a use of a shape program input.
enum PropertyQuery {
    /// `len(x)`
    Len,
    /// `x[index]`, where `index` is `None` if it is not constant.
    GetItem { index: Option<i64> },
    /// Any other use, eg. a slice.
    Other,
}

/// An input of known rank whose dimension sizes are not all known.
struct TrackedInput {
    value: ValueId,
    dims: Vec<Option<i64>>,
}

/// Infers the output shape of an operator by partial evaluation of its
/// shape program.
///
/// ```
/// use rten_symbolic_shapes::{
///     AnalysisOptions, OperatorInput, SymbolicShape, SymbolicShapeAnalyzer,
/// };
/// use rten_symbolic_shapes::graph::{GraphBuilder, Type};
///
/// // Shape program for an operator which flattens the last two dims.
/// let mut b = GraphBuilder::new();
/// let x = b.input("x", Type::IntList);
/// let d0 = b.index(x, 0);
/// let d1 = b.index(x, 1);
/// let d2 = b.index(x, 2);
/// let inner = b.mul(d1, d2);
/// let out = b.list(&[d0, inner]);
/// let program = b.build(&[out]);
///
/// let x_shape = SymbolicShape::from_dims(vec![None, Some(3), Some(4)]);
/// let inputs = [OperatorInput::Tensor(x_shape)];
/// let analyzer =
///     SymbolicShapeAnalyzer::new(&inputs, &program, AnalysisOptions::default()).unwrap();
/// let shape = analyzer.run().unwrap();
/// assert_eq!(shape, SymbolicShape::from_dims(vec![None, Some(12)]));
/// ```
pub struct SymbolicShapeAnalyzer {
    /// Private copy of the shape program, specialized for the inputs.
    program: Graph,
    tracked: Vec<TrackedInput>,
    options: AnalysisOptions,
    diagnostics: Diagnostics,

    /// Name used to attribute diagnostic messages.
    subject: String,
}

impl SymbolicShapeAnalyzer {
    /// Create an analyzer for an operator with the given inputs.
    ///
    /// `inputs` correspond positionally to the inputs of `program`. Inputs
    /// with fully known shapes or known values are substituted into a copy of
    /// the program. Tensors of known rank are tracked so that reads of their
    /// length and dimensions can be resolved during simplification.
    pub fn new(
        inputs: &[OperatorInput],
        program: &Graph,
        options: AnalysisOptions,
    ) -> Result<Self, AnalysisError> {
        check_program_output(program)?;
        let param_ids = program.input_ids().to_vec();
        if param_ids.len() != inputs.len() {
            return Err(AnalysisError::InputCountMismatch {
                expected: param_ids.len(),
                actual: inputs.len(),
            });
        }

        let mut program = program.clone();
        let mut tracked = Vec::new();

        for (index, (input, &param)) in inputs.iter().zip(&param_ids).enumerate() {
            let constant = match input {
                OperatorInput::TensorList => {
                    return Err(AnalysisError::TensorListInput { index });
                }
                OperatorInput::Tensor(shape) => {
                    if let Some(sizes) = shape.to_concrete() {
                        Some(IValue::IntList(sizes))
                    } else {
                        // Reads of a mutated shape list cannot be answered
                        // from the input shape.
                        let dims = shape.dims().filter(|_| program.is_read_only_list(param));
                        if let Some(dims) = dims {
                            tracked.push(TrackedInput {
                                value: param,
                                dims: dims.to_vec(),
                            });
                        }
                        None
                    }
                }
                OperatorInput::Value(value) => value.clone(),
            };
            let Some(value) = constant else {
                continue;
            };
            let constant = match value {
                // A list which is mutated or escapes is rebuilt from its
                // elements, so that mutations are visible to later reads.
                IValue::IntList(sizes) if !program.is_read_only_list(param) => {
                    construct_list(&mut program, &sizes)
                }
                value => program.insert_constant(value),
            };
            program.replace_all_uses_with(param, constant);
        }

        let mut diagnostics = Diagnostics::new();
        diagnostics.set_level(options.diagnostics);

        Ok(SymbolicShapeAnalyzer {
            program,
            tracked,
            options,
            diagnostics,
            subject: "shape program".to_string(),
        })
    }

    /// Set the name used to attribute diagnostic messages, eg. the name of
    /// the operator node being analyzed.
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    /// Return the specialized shape program.
    pub fn program(&self) -> &Graph {
        &self.program
    }

    /// Simplify the program and return the inferred output shape.
    pub fn run(mut self) -> Result<SymbolicShape, AnalysisError> {
        self.simplify();
        let shape = self.output_shape()?;

        if shape.rank().is_none() {
            self.diagnostics
                .warn(&self.subject, format_args!("could not infer output rank"));
        } else {
            self.diagnostics
                .info(&self.subject, format_args!("inferred shape {}", shape));
        }

        Ok(shape)
    }

    /// Run the substitution and simplification rounds, then pool constants
    /// and remove dead code.
    ///
    /// Returns the number of rounds that were run.
    pub fn simplify(&mut self) -> usize {
        let mut rounds = 0;
        while rounds < self.options.max_rounds {
            rounds += 1;
            let changed = self.simplify_round();
            self.diagnostics.info(
                &self.subject,
                format_args!("round {} changed program: {}", rounds, changed),
            );
            if !changed && self.options.stop_when_unchanged {
                break;
            }
        }
        pool_constants(&mut self.program);
        eliminate_dead_code(&mut self.program);
        rounds
    }

    fn simplify_round(&mut self) -> bool {
        let mut changed = self.substitute_tensor_properties();

        let graph = &mut self.program;
        changed |= lower_simple_tuples(graph);
        changed |= remove_list_mutation(graph);
        changed |= unroll_constant_loops(graph);
        changed |= propagate_constants(graph);
        changed |= peephole_optimize(graph);
        changed |= propagate_constants(graph);

        changed
    }

    /// Replace `len(x)` and `x[k]` reads of tracked inputs with constants
    /// where the answer is known.
    ///
    /// Returns true if any read was replaced.
    pub fn substitute_tensor_properties(&mut self) -> bool {
        let mut changed = false;

        for input in &self.tracked {
            let rank = input.dims.len();
            for use_ in self.program.uses(input.value) {
                let Use::Node { node, index: 0 } = use_ else {
                    continue;
                };
                let Some(output) = self.program.node(node).output() else {
                    continue;
                };
                // Skip reads that are unused, so that replacements are only
                // reported once.
                if !self.program.has_uses(output) {
                    continue;
                }

                let replacement = match classify_use(&self.program, node) {
                    PropertyQuery::Len => Some(rank as i64),
                    PropertyQuery::GetItem { index: Some(index) } => {
                        normalize_index(index, rank).and_then(|i| input.dims[i])
                    }
                    PropertyQuery::GetItem { index: None } | PropertyQuery::Other => None,
                };

                if let Some(value) = replacement {
                    let constant = self.program.insert_constant(IValue::Int(value));
                    self.program.replace_all_uses_with(output, constant);
                    changed = true;
                }
            }
        }

        changed
    }

    /// Read the output shape from the program in its current state.
    pub fn output_shape(&self) -> Result<SymbolicShape, AnalysisError> {
        check_program_output(&self.program)?;
        let output = self.program.output_ids()[0];

        if let Some(value) = self.program.constant_value(output) {
            return Ok(match value.as_int_list() {
                Some(sizes) if self.program.is_read_only_list(output) => {
                    SymbolicShape::from_sizes(sizes)
                }
                _ => SymbolicShape::unknown(),
            });
        }

        let Some(producer) = self.program.producer(output) else {
            return Ok(SymbolicShape::unknown());
        };
        let node = self.program.node(producer);
        if !matches!(node.op(), Op::ListConstruct) || self.program.uses(output).len() != 1 {
            return Ok(SymbolicShape::unknown());
        }

        let dims = node
            .inputs()
            .iter()
            .map(|&dim| self.program.constant_int(dim))
            .collect();
        Ok(SymbolicShape::from_dims(dims))
    }
}

/// Add a `ListConstruct` of int constants at the start of the root block.
fn construct_list(program: &mut Graph, sizes: &[i64]) -> ValueId {
    let elements: Vec<ValueId> = sizes
        .iter()
        .map(|&size| program.insert_constant(IValue::Int(size)))
        .collect();
    let root = program.root();
    let node = program.insert_node(
        root,
        elements.len(),
        Op::ListConstruct,
        &elements,
        &[Type::IntList],
    );
    program.node(node).outputs()[0]
}

fn classify_use(program: &Graph, node: NodeId) -> PropertyQuery {
    let node = program.node(node);
    match node.op() {
        Op::Len => PropertyQuery::Len,
        Op::GetItem => PropertyQuery::GetItem {
            index: program.constant_int(node.input(1)),
        },
        _ => PropertyQuery::Other,
    }
}

fn check_program_output(program: &Graph) -> Result<(), AnalysisError> {
    match program.output_ids() {
        [output] if matches!(program.value_type(*output), Type::IntList) => Ok(()),
        [_] => Err(AnalysisError::InvalidShapeProgram(
            "output must be a list of ints",
        )),
        _ => Err(AnalysisError::InvalidShapeProgram(
            "program must have exactly one output",
        )),
    }
}

/// Infer the output shape of an operator from its shape program.
///
/// This is a shorthand for creating a [`SymbolicShapeAnalyzer`] and calling
/// [`run`](SymbolicShapeAnalyzer::run).
pub fn analyze(
    inputs: &[OperatorInput],
    program: &Graph,
    options: AnalysisOptions,
) -> Result<SymbolicShape, AnalysisError> {
    SymbolicShapeAnalyzer::new(inputs, program, options)?.run()
}
