//! Execution backend interface
//!
//! A [`Backend`] compiles a lowered module into an executable and runs it on
//! concrete tensors. [`Interpreter`] is a small reference implementation that
//! evaluates the lowered vocabulary directly.

use std::collections::HashMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument};

use crate::error::{CompileError, CompileResult};
use crate::ir::{Function, Module, OpKind, Region, ValueId};
use crate::irgen::ENTRY_FUNCTION;
use crate::lower::is_lowered;

/// A dense row-major `f64` tensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> CompileResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(CompileError::backend(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Parse nested JSON arrays of numbers, e.g. `[[1, 2], [3, 4]]`
    pub fn from_json(text: &str) -> CompileResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| CompileError::backend(format!("invalid tensor JSON: {}", e)))?;
        Self::from_value(&value)
    }

    fn from_value(value: &serde_json::Value) -> CompileResult<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Tensor::scalar)
                .ok_or_else(|| CompileError::backend(format!("{} is not a float", n))),
            serde_json::Value::Array(items) => {
                let rows = items
                    .iter()
                    .map(Self::from_value)
                    .collect::<CompileResult<Vec<_>>>()?;
                let inner = rows.first().map(|r| r.shape.clone()).unwrap_or_default();
                if rows.iter().any(|r| r.shape != inner) {
                    return Err(CompileError::backend("ragged tensor"));
                }
                let mut shape = vec![rows.len()];
                shape.extend(inner);
                let data = rows.into_iter().flat_map(|r| r.data).collect();
                Ok(Self { shape, data })
            }
            other => Err(CompileError::backend(format!(
                "expected a number or an array, got {}",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Tensor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Tensor::from_value(&value).map_err(D::Error::custom)
    }
}

fn write_nested(f: &mut fmt::Formatter<'_>, shape: &[usize], data: &[f64]) -> fmt::Result {
    match shape.split_first() {
        None => write!(f, "{}", data.first().copied().unwrap_or_default()),
        Some((&len, rest)) => {
            let stride: usize = rest.iter().product();
            write!(f, "[")?;
            for i in 0..len {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_nested(f, rest, &data[i * stride..(i + 1) * stride])?;
            }
            write!(f, "]")
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nested(f, &self.shape, &self.data)
    }
}

/// Something that can run a lowered module
pub trait Backend {
    type Executable;

    fn compile(&self, module: &Module) -> CompileResult<Self::Executable>;

    fn execute(&self, executable: &Self::Executable, inputs: &[Tensor])
        -> CompileResult<Vec<Tensor>>;
}

/// Reference backend evaluating the lowered operations one by one
#[derive(Debug, Clone)]
pub struct Interpreter {
    entry: String,
}

/// The validated entry function
#[derive(Debug, Clone)]
pub struct Program {
    function: Function,
}

impl Interpreter {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(ENTRY_FUNCTION)
    }
}

impl Backend for Interpreter {
    type Executable = Program;

    fn compile(&self, module: &Module) -> CompileResult<Program> {
        let function = module
            .function(&self.entry)
            .ok_or_else(|| CompileError::backend(format!("no function named '{}'", self.entry)))?;

        if let Some(&param) = function
            .body
            .params()
            .iter()
            .find(|&&p| !function.body.value_type(p).is_ranked())
        {
            return Err(CompileError::backend(format!(
                "parameter %{} of '{}' has no shape",
                param.0, function.name
            )));
        }
        if !is_lowered(&function.body) {
            return Err(CompileError::backend(format!(
                "'{}' contains operations that were not lowered",
                function.name
            )));
        }

        Ok(Program {
            function: function.clone(),
        })
    }

    #[instrument(skip_all, fields(entry = %self.entry, inputs = inputs.len()))]
    fn execute(&self, program: &Program, inputs: &[Tensor]) -> CompileResult<Vec<Tensor>> {
        let body = &program.function.body;
        if inputs.len() != body.params().len() {
            return Err(CompileError::backend(format!(
                "expected {} inputs, got {}",
                body.params().len(),
                inputs.len()
            )));
        }
        for (i, (&param, input)) in body.params().iter().zip(inputs).enumerate() {
            let declared = body.value_type(param);
            if declared.shape.dims() != Some(input.shape.as_slice()) {
                return Err(CompileError::backend(format!(
                    "input {} has shape {:?}, expected {}",
                    i, input.shape, declared
                )));
            }
            if declared.shape.num_elements() != Some(input.data.len()) {
                return Err(CompileError::backend(format!(
                    "input {} has {} elements, shape {:?} needs {}",
                    i,
                    input.data.len(),
                    input.shape,
                    input.shape.iter().product::<usize>()
                )));
            }
        }

        let outputs = eval_region(body, inputs.to_vec())?;
        debug!(outputs = outputs.len(), "executed");
        Ok(outputs)
    }
}

fn eval_region(region: &Region, args: Vec<Tensor>) -> CompileResult<Vec<Tensor>> {
    let mut env: HashMap<ValueId, Tensor> = region.params().iter().copied().zip(args).collect();

    for (_, op) in region.ops() {
        let operands = op
            .operands
            .iter()
            .map(|v| {
                env.get(v).cloned().ok_or_else(|| {
                    CompileError::backend(format!("%{} used before definition", v.0))
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;

        let results = match &op.kind {
            OpKind::Constant(value) => vec![Tensor::scalar(*value)],
            OpKind::ElementwiseAdd => vec![elementwise(&operands, |a, b| a + b)?],
            OpKind::ElementwiseMultiply => vec![elementwise(&operands, |a, b| a * b)?],
            OpKind::ShapedReduce { dimensions } => {
                let body = op
                    .region
                    .as_ref()
                    .ok_or_else(|| CompileError::backend("tensor.reduce without a body"))?;
                vec![reduce(&operands, dimensions, body)?]
            }
            OpKind::RegionReturn | OpKind::Return => return Ok(operands),
            other => {
                return Err(CompileError::backend(format!(
                    "cannot execute {}",
                    other.name()
                )))
            }
        };

        for (&id, tensor) in op.results.iter().zip(results) {
            env.insert(id, tensor);
        }
    }

    Err(CompileError::backend("region has no terminator"))
}

fn elementwise(operands: &[Tensor], f: impl Fn(f64, f64) -> f64) -> CompileResult<Tensor> {
    match operands {
        [lhs, rhs] if lhs.shape == rhs.shape => Ok(Tensor {
            shape: lhs.shape.clone(),
            data: lhs.data.iter().zip(&rhs.data).map(|(&a, &b)| f(a, b)).collect(),
        }),
        [lhs, rhs] => Err(CompileError::backend(format!(
            "elementwise operands differ in shape: {:?} and {:?}",
            lhs.shape, rhs.shape
        ))),
        _ => Err(CompileError::backend("elementwise op expects 2 operands")),
    }
}

/// Fold `arg` over its leading axis, applying `body` element by element
fn reduce(operands: &[Tensor], dimensions: &[usize], body: &Region) -> CompileResult<Tensor> {
    let (arg, init) = match operands {
        [arg, init] if init.rank() == 0 => (arg, init.data[0]),
        _ => {
            return Err(CompileError::backend(
                "tensor.reduce expects an argument and a scalar initial value",
            ))
        }
    };
    if dimensions != [0] || arg.rank() == 0 {
        return Err(CompileError::backend(format!(
            "only reductions over dimension 0 of a ranked argument are supported, got {:?} over {:?}",
            dimensions, arg.shape
        )));
    }

    let row_shape = arg.shape[1..].to_vec();
    let stride: usize = row_shape.iter().product();
    let mut acc = vec![init; stride];

    for row in arg.data.chunks(stride.max(1)).take(arg.shape[0]) {
        for (slot, &element) in acc.iter_mut().zip(row) {
            let out = eval_region(body, vec![Tensor::scalar(*slot), Tensor::scalar(element)])?;
            *slot = match out.as_slice() {
                [value] if value.rank() == 0 => value.data[0],
                _ => {
                    return Err(CompileError::backend(
                        "reduce body must return one scalar",
                    ))
                }
            };
        }
    }

    Tensor::new(row_shape, acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tensor_from_json() {
        let tensor = Tensor::from_json("[[2, 3, 4], [4.5, 5.5, 6.5]]").unwrap();
        assert_eq!(tensor.shape, vec![2, 3]);
        assert_eq!(tensor.data, vec![2.0, 3.0, 4.0, 4.5, 5.5, 6.5]);
        assert_eq!(Tensor::from_json("7").unwrap(), Tensor::scalar(7.0));
        assert!(Tensor::from_json("[[1], [2, 3]]").is_err());
        assert!(Tensor::from_json("[\"a\"]").is_err());
    }

    #[test]
    fn test_tensor_deserialize_and_display() {
        let tensor: Tensor = serde_json::from_str("[[1, 2], [3, 4.5]]").unwrap();
        assert_eq!(tensor.to_string(), "[[1, 2], [3, 4.5]]");
        assert_eq!(Tensor::scalar(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_tensor_new_checks_length() {
        assert!(Tensor::new(vec![2, 2], vec![1.0; 3]).is_err());
        assert!(Tensor::new(vec![2, 2], vec![1.0; 4]).is_ok());
    }

    #[test]
    fn test_execute_add() {
        let module = compile("+", "main=3_3").unwrap();
        let backend = Interpreter::default();
        let program = backend.compile(&module).unwrap();

        let outputs = backend
            .execute(
                &program,
                &[
                    Tensor::vector(vec![2.0, 3.0, 4.5]),
                    Tensor::vector(vec![4.0, 5.0, 6.0]),
                ],
            )
            .unwrap();
        assert_eq!(outputs, vec![Tensor::vector(vec![6.0, 8.0, 10.5])]);
    }

    #[test]
    fn test_execute_reduce() {
        let module = compile("/+", "main=2x3").unwrap();
        let backend = Interpreter::default();
        let program = backend.compile(&module).unwrap();

        let input = Tensor::from_json("[[2, 3, 4], [4.5, 5.5, 6.5]]").unwrap();
        let outputs = backend.execute(&program, &[input]).unwrap();
        assert_eq!(outputs, vec![Tensor::vector(vec![6.5, 8.5, 10.5])]);
    }

    #[test]
    fn test_execute_product_to_scalar() {
        let module = compile("/×", "main=4").unwrap();
        let backend = Interpreter::default();
        let program = backend.compile(&module).unwrap();

        let outputs = backend
            .execute(&program, &[Tensor::vector(vec![1.0, 2.0, 3.0, 4.0])])
            .unwrap();
        assert_eq!(outputs, vec![Tensor::scalar(24.0)]);
    }

    #[test]
    fn test_execute_chain() {
        // first × (second + second)
        let module = compile("×+.", "main=2_2").unwrap();
        let backend = Interpreter::default();
        let program = backend.compile(&module).unwrap();

        let outputs = backend
            .execute(
                &program,
                &[Tensor::vector(vec![3.0, 4.0]), Tensor::vector(vec![1.0, 1.5])],
            )
            .unwrap();
        assert_eq!(outputs, vec![Tensor::vector(vec![6.0, 12.0])]);
    }

    #[test]
    fn test_input_shape_is_checked() {
        let module = compile("+", "main=3_3").unwrap();
        let backend = Interpreter::default();
        let program = backend.compile(&module).unwrap();

        let err = backend
            .execute(&program, &[Tensor::vector(vec![1.0]), Tensor::vector(vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, CompileError::Backend { .. }));
    }

    #[test]
    fn test_input_data_length_is_checked() {
        let module = compile("+", "main=3_3").unwrap();
        let backend = Interpreter::default();
        let program = backend.compile(&module).unwrap();

        // the fields are public, so the length invariant can be bypassed
        let short = Tensor {
            shape: vec![3],
            data: vec![1.0],
        };
        let err = backend
            .execute(&program, &[short.clone(), short])
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::backend("input 0 has 1 elements, shape [3] needs 3")
        );
    }

    #[test]
    fn test_compile_rejects_unlowered_module() {
        let module = crate::irgen::build_module(&crate::parse("+").unwrap()).unwrap();
        let err = Interpreter::default().compile(&module).unwrap_err();
        assert!(matches!(err, CompileError::Backend { .. }));
    }
}
