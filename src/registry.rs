//! Registry of shape programs and propagation of shapes through operator
//! graphs.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;

use crate::analyzer::{AnalysisError, AnalysisOptions, OperatorInput, SymbolicShapeAnalyzer};
use crate::diagnostics::Diagnostics;
use crate::graph::{Graph, NodeId, Type};

/// Error that occurs when the shape program registered for an operator is
/// malformed or cannot be applied to the operator's inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct PropagateError {
    /// Name of the operator node.
    pub node: Option<String>,
    /// Signature of the operator.
    pub signature: String,
    pub error: AnalysisError,
}

impl Display for PropagateError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "shape analysis failed for node \"{}\" ({}): {}",
            self.node.as_deref().unwrap_or_default(),
            self.signature,
            self.error
        )
    }
}

impl Error for PropagateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Table of shape programs keyed by operator signature.
///
/// Registration and propagation are serialized by a single lock, which is
/// held for the whole of a [`propagate_shapes`](Self::propagate_shapes) call.
/// Entries are never removed or replaced.
pub struct ShapeFunctionRegistry {
    programs: Mutex<FxHashMap<String, Arc<Graph>>>,
    options: AnalysisOptions,
}

impl Default for ShapeFunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShapeFunctionRegistry {
    /// Create an empty registry which analyzes operators with default
    /// options.
    pub fn new() -> Self {
        Self::with_options(AnalysisOptions::default())
    }

    pub fn with_options(options: AnalysisOptions) -> Self {
        ShapeFunctionRegistry {
            programs: Mutex::new(FxHashMap::default()),
            options,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<String, Arc<Graph>>> {
        // Entries are inserted in a single step, so the map is consistent
        // even if a thread panicked while holding the lock.
        self.programs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the shape program for operators with a given signature.
    ///
    /// If a program is already registered for `signature`, the existing entry
    /// is kept. Returns true if `program` was inserted.
    pub fn register(&self, signature: &str, program: Arc<Graph>) -> bool {
        let mut programs = self.lock();
        if programs.contains_key(signature) {
            return false;
        }
        programs.insert(signature.to_string(), program);
        true
    }

    /// Register the shape program for the operator called by `node`.
    ///
    /// Returns false if `node` is not an operator call or a program is
    /// already registered for its signature.
    pub fn register_for_node(&self, graph: &Graph, node: NodeId, program: Arc<Graph>) -> bool {
        match graph.node(node).schema() {
            Some(schema) => self.register(&schema.signature(), program),
            None => false,
        }
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.lock().contains_key(signature)
    }

    /// Return the number of registered programs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the shape program registered for `signature`.
    pub fn shape_program(&self, signature: &str) -> Option<Arc<Graph>> {
        self.lock().get(signature).cloned()
    }

    /// Infer output shapes of operator calls in the root block of `graph`.
    ///
    /// Each operator with a single tensor output whose signature has a
    /// registered shape program is analyzed, and the shape of its output
    /// type is replaced with the result. Operators are visited in execution
    /// order, so inferred shapes feed into the analysis of later operators.
    ///
    /// Returns the number of operators whose output shapes were updated.
    pub fn propagate_shapes(&self, graph: &mut Graph) -> Result<usize, PropagateError> {
        let programs = self.lock();
        let diagnostics = {
            let mut diag = Diagnostics::new();
            diag.set_level(self.options.diagnostics);
            diag
        };
        let mut updated = 0;

        for node_id in graph.node_ids().to_vec() {
            let node = graph.node(node_id);
            let Some(schema) = node.schema() else {
                continue;
            };
            let signature = schema.signature();
            let Some(program) = programs.get(&signature) else {
                continue;
            };
            let Some(output) = node.output() else {
                continue;
            };
            let Type::Tensor(output_type) = graph.value_type(output) else {
                continue;
            };

            let subject = node.name().unwrap_or(schema.name()).to_string();
            let inputs: Vec<OperatorInput> = node
                .inputs()
                .iter()
                .map(|&id| OperatorInput::for_value(graph, id))
                .collect();
            let shape = SymbolicShapeAnalyzer::new(&inputs, program, self.options.clone())
                .and_then(|analyzer| analyzer.with_subject(&subject).run())
                .map_err(|error| PropagateError {
                    node: node.name().map(|name| name.to_string()),
                    signature: signature.clone(),
                    error,
                })?;

            diagnostics.info(
                &subject,
                format_args!("{} -> {}", output_type.shape, shape),
            );
            let new_type = output_type.with_shape(shape);
            graph.set_value_type(output, Type::Tensor(new_type));
            updated += 1;
        }

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ShapeFunctionRegistry;
    use crate::analyzer::AnalysisError;
    use crate::graph::{
        Arg, DataType, Graph, GraphBuilder, IValue, Schema, TensorType, Type, ValueId,
    };
    use crate::sym_shape::SymbolicShape;

    fn tensor_type(dtype: Option<DataType>, shape: SymbolicShape) -> Type {
        Type::Tensor(TensorType::new(dtype, shape))
    }

    fn pad_schema() -> Arc<Schema> {
        Arc::new(Schema::new(
            "test::pad",
            vec![
                Arg::new("self", Type::Tensor(TensorType::default())),
                Arg::new("pad", Type::Int),
            ],
            vec![Arg::unnamed(Type::Tensor(TensorType::default()))],
        ))
    }

    /// Shape program for `test::pad`, which adds `2 * pad` to the last dim.
    fn pad_program() -> Graph {
        let mut b = GraphBuilder::new();
        let x = b.input("x", Type::IntList);
        let pad = b.input("pad", Type::Int);
        let n = b.len(x);
        let one = b.constant(1);
        let last = b.sub(n, one);
        let start = b.constant(0);
        let leading = b.slice(x, Some(start), Some(last));
        let out = b.list(&[]);
        b.loop_n(last, &[], |b, i, _| {
            let dim = b.get_item(leading, i);
            b.append(out, dim);
            vec![]
        });
        let last_dim = b.index(x, -1);
        let two = b.constant(2);
        let total_pad = b.mul(pad, two);
        let padded = b.add(last_dim, total_pad);
        b.append(out, padded);
        b.build(&[out])
    }

    /// Build an operator graph which applies `test::pad` twice.
    fn pad_graph(input_shape: SymbolicShape) -> (Graph, ValueId, ValueId) {
        let schema = pad_schema();
        let mut b = GraphBuilder::new();
        let x = b.input("x", tensor_type(Some(DataType::Float), input_shape));
        let pad = b.constant(IValue::Int(3));
        let unknown_type = tensor_type(Some(DataType::Float), SymbolicShape::unknown());
        let y = b.call(Some("pad_1"), &schema, &[x, pad], &[unknown_type.clone()])[0];
        let z = b.call(Some("pad_2"), &schema, &[y, pad], &[unknown_type])[0];
        (b.build(&[z]), y, z)
    }

    #[test]
    fn test_register_first_write_wins() {
        let registry = ShapeFunctionRegistry::new();
        let signature = pad_schema().signature();
        let first = Arc::new(pad_program());
        let second = Arc::new(Graph::new());

        assert!(registry.is_empty());
        assert!(registry.register(&signature, first.clone()));
        assert!(!registry.register(&signature, second));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&signature));

        let program = registry.shape_program(&signature).unwrap();
        assert!(Arc::ptr_eq(&program, &first));
        assert!(registry.shape_program("test::other() -> Tensor").is_none());
    }

    #[test]
    fn test_propagate_uses_first_registered_program() {
        let (mut graph, y, _) = pad_graph(SymbolicShape::from_dims(vec![None, Some(4)]));
        let registry = ShapeFunctionRegistry::new();
        let signature = pad_schema().signature();

        // Program which returns the input shape unchanged.
        let mut b = GraphBuilder::new();
        let x = b.input("x", Type::IntList);
        b.input("pad", Type::Int);
        let identity = b.build(&[x]);

        assert!(registry.register(&signature, Arc::new(pad_program())));
        assert!(!registry.register(&signature, Arc::new(identity)));
        assert_eq!(registry.propagate_shapes(&mut graph), Ok(2));

        let y_type = graph.value_type(y).as_tensor().unwrap();
        assert_eq!(y_type.shape, SymbolicShape::from_dims(vec![None, Some(10)]));
    }

    #[test]
    fn test_register_for_node() {
        let (graph, y, _) = pad_graph(SymbolicShape::unknown());
        let registry = ShapeFunctionRegistry::new();
        let pad_node = graph.producer(y).unwrap();
        let constant_node = graph.node_ids()[0];

        assert!(!registry.register_for_node(&graph, constant_node, Arc::new(pad_program())));
        assert!(registry.register_for_node(&graph, pad_node, Arc::new(pad_program())));
        assert!(registry.contains("test::pad(Tensor self, int pad) -> Tensor"));
    }

    #[test]
    fn test_propagate_shapes() {
        let (mut graph, y, z) = pad_graph(SymbolicShape::from_dims(vec![None, Some(4)]));
        let registry = ShapeFunctionRegistry::new();
        registry.register(&pad_schema().signature(), Arc::new(pad_program()));

        assert_eq!(registry.propagate_shapes(&mut graph), Ok(2));

        let y_type = graph.value_type(y).as_tensor().unwrap();
        assert_eq!(y_type.shape, SymbolicShape::from_dims(vec![None, Some(10)]));
        assert_eq!(y_type.dtype, Some(DataType::Float));

        let z_type = graph.value_type(z).as_tensor().unwrap();
        assert_eq!(z_type.shape, SymbolicShape::from_dims(vec![None, Some(16)]));
    }

    #[test]
    fn test_unregistered_operators_are_skipped() {
        let (mut graph, y, _) = pad_graph(SymbolicShape::from_sizes(&[2, 4]));
        let registry = ShapeFunctionRegistry::new();

        assert_eq!(registry.propagate_shapes(&mut graph), Ok(0));
        assert_eq!(
            graph.value_type(y).as_tensor().unwrap().shape,
            SymbolicShape::unknown()
        );
    }

    #[test]
    fn test_propagate_invalid_program() {
        let (mut graph, _, _) = pad_graph(SymbolicShape::from_sizes(&[2, 4]));
        let registry = ShapeFunctionRegistry::new();

        let mut b = GraphBuilder::new();
        let x = b.input("x", Type::IntList);
        b.input("pad", Type::Int);
        let n = b.len(x);
        registry.register(&pad_schema().signature(), Arc::new(b.build(&[n])));

        let err = registry.propagate_shapes(&mut graph).unwrap_err();
        assert_eq!(err.node.as_deref(), Some("pad_1"));
        assert_eq!(
            err.error,
            AnalysisError::InvalidShapeProgram("output must be a list of ints")
        );
        assert!(err.to_string().contains("pad_1"));
    }

    #[test]
    fn test_registry_is_shared_between_threads() {
        let registry = Arc::new(ShapeFunctionRegistry::new());
        let signature = pad_schema().signature();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let signature = signature.clone();
                std::thread::spawn(move || registry.register(&signature, Arc::new(pad_program())))
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&inserted| inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(registry.len(), 1);
    }
}
