//! Shape inference
//!
//! Propagates ranked shapes forward through every region until a full sweep
//! changes nothing. Each value only ever moves from unranked to ranked, so
//! the loop terminates after at most one change per value.

use tracing::{debug, instrument, trace};

use crate::error::{CompileError, CompileResult};
use crate::ir::{Function, Module, OpId, OpKind, Region, Shape, TensorType, ValueId};

/// Infer shapes in every function. Returns the number of refined values.
#[instrument(skip_all, fields(functions = module.functions.len()))]
pub fn infer_shapes(module: &mut Module) -> CompileResult<usize> {
    let mut total = 0;
    for function in &mut module.functions {
        total += infer_function(function)?;
    }
    debug!(refined = total, "shape inference done");
    Ok(total)
}

pub fn infer_function(function: &mut Function) -> CompileResult<usize> {
    let refined = infer_region(&mut function.body)?;
    trace!(function = %function.name, refined, "inferred function");
    Ok(refined)
}

/// Run sweeps over `region` until a fixed point is reached
pub fn infer_region(region: &mut Region) -> CompileResult<usize> {
    let mut total = 0;
    for iteration in 1.. {
        let changed = sweep(region)?;
        trace!(iteration, changed, "shape inference sweep");
        if changed == 0 {
            break;
        }
        total += changed;
    }
    Ok(total)
}

fn sweep(region: &mut Region) -> CompileResult<usize> {
    let mut changed = 0;
    for id in region.op_ids() {
        changed += infer_op(region, id)?;
    }
    Ok(changed)
}

fn infer_op(region: &mut Region, id: OpId) -> CompileResult<usize> {
    let kind = region.op(id)?.kind.clone();
    match kind {
        OpKind::Add | OpKind::Multiply | OpKind::ElementwiseAdd | OpKind::ElementwiseMultiply => {
            infer_pointwise(region, id)
        }
        OpKind::Reduce => infer_reduce(region, id),
        OpKind::ShapedReduce { dimensions } => infer_shaped_reduce(region, id, &dimensions),
        OpKind::Constant(_)
        | OpKind::Cast
        | OpKind::Yield
        | OpKind::RegionReturn
        | OpKind::Return => Ok(0),
    }
}

fn binary_operands(region: &Region, id: OpId) -> CompileResult<(TensorType, TensorType)> {
    let op = region.op(id)?;
    match op.operands.as_slice() {
        [lhs, rhs] => Ok((
            region.value_type(*lhs).clone(),
            region.value_type(*rhs).clone(),
        )),
        other => Err(CompileError::internal(format!(
            "{} expects 2 operands, found {}",
            op.kind.name(),
            other.len()
        ))),
    }
}

fn single_result(region: &Region, id: OpId) -> CompileResult<ValueId> {
    let op = region.op(id)?;
    match op.results.as_slice() {
        [result] => Ok(*result),
        other => Err(CompileError::internal(format!(
            "{} expects 1 result, found {}",
            op.kind.name(),
            other.len()
        ))),
    }
}

fn refine(region: &mut Region, value: ValueId, ty: &TensorType) -> CompileResult<usize> {
    Ok(usize::from(region.refine_type(value, ty)?))
}

fn infer_pointwise(region: &mut Region, id: OpId) -> CompileResult<usize> {
    let (lhs, rhs) = binary_operands(region, id)?;
    if !lhs.is_ranked() || !rhs.is_ranked() {
        return Ok(0);
    }
    if lhs.shape != rhs.shape {
        return Err(CompileError::shape_mismatch(
            region.op(id)?.kind.name(),
            lhs.to_string(),
            rhs.to_string(),
        ));
    }
    let result = single_result(region, id)?;
    refine(region, result, &lhs)
}

fn infer_reduce(region: &mut Region, id: OpId) -> CompileResult<usize> {
    let arg = match region.op(id)?.operands.as_slice() {
        [arg] => region.value_type(*arg).clone(),
        other => {
            return Err(CompileError::internal(format!(
                "uiua.reduce expects 1 operand, found {}",
                other.len()
            )))
        }
    };
    let dims = match arg.shape.dims() {
        Some(dims) => dims.to_vec(),
        None => return Ok(0),
    };
    if dims.is_empty() {
        return Err(CompileError::shape_mismatch(
            "uiua.reduce",
            "an argument of rank 1 or more",
            arg.to_string(),
        ));
    }

    // one row of the argument
    let row = arg.with_shape(Shape::Ranked(dims[1..].to_vec()));
    let result = single_result(region, id)?;
    let mut changed = refine(region, result, &row)?;

    let mut body = region
        .op_mut(id)?
        .region
        .take()
        .ok_or_else(|| CompileError::internal("uiua.reduce without a body"))?;
    let inner = infer_reduce_body(&mut body, &row);
    region.op_mut(id)?.region = Some(body);
    changed += inner?;
    Ok(changed)
}

fn infer_reduce_body(body: &mut Region, row: &TensorType) -> CompileResult<usize> {
    let mut changed = 0;
    for param in body.params().to_vec() {
        changed += refine(body, param, row)?;
    }
    changed += infer_region(body)?;

    if let Some(terminator) = body.terminator() {
        for &value in &body.op(terminator)?.operands {
            let ty = body.value_type(value);
            if ty.is_ranked() && ty.shape != row.shape {
                return Err(CompileError::shape_mismatch(
                    "uiua.reduce body",
                    row.to_string(),
                    ty.to_string(),
                ));
            }
        }
    }
    Ok(changed)
}

fn infer_shaped_reduce(
    region: &mut Region,
    id: OpId,
    dimensions: &[usize],
) -> CompileResult<usize> {
    let arg = match region.op(id)?.operands.first() {
        Some(arg) => region.value_type(*arg).clone(),
        None => return Err(CompileError::internal("tensor.reduce without operands")),
    };
    let mut changed = 0;

    if let Some(dims) = arg.shape.dims() {
        if let Some(&bad) = dimensions.iter().find(|&&d| d >= dims.len()) {
            return Err(CompileError::shape_mismatch(
                "tensor.reduce",
                format!("dimension {} in range", bad),
                arg.to_string(),
            ));
        }
        let kept: Vec<usize> = dims
            .iter()
            .enumerate()
            .filter(|(axis, _)| !dimensions.contains(axis))
            .map(|(_, &d)| d)
            .collect();
        let result = single_result(region, id)?;
        changed += refine(region, result, &arg.with_shape(Shape::Ranked(kept)))?;
    }

    let mut body = region
        .op_mut(id)?
        .region
        .take()
        .ok_or_else(|| CompileError::internal("tensor.reduce without a body"))?;
    let inner = infer_region(&mut body);
    region.op_mut(id)?.region = Some(body);
    changed += inner?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ElementKind;
    use crate::irgen::build_module;
    use crate::parser::parse;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Log sink shared between the subscriber and the test
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn ranked(dims: &[usize]) -> TensorType {
        TensorType::ranked(ElementKind::F64, dims.to_vec())
    }

    /// Build `source` and give `main` the parameter shapes directly
    fn shaped(source: &str, shapes: &[&[usize]]) -> Module {
        let mut module = build_module(&parse(source).unwrap()).unwrap();
        let main = module.function_mut("main").unwrap();
        for (&param, dims) in main.body.params().to_vec().iter().zip(shapes) {
            main.body.set_type(param, ranked(dims));
        }
        module
    }

    fn returned_type(module: &Module) -> TensorType {
        let main = module.function("main").unwrap();
        main.body
            .value_type(main.returned_values().unwrap()[0])
            .clone()
    }

    #[test]
    fn test_pointwise_propagates_shape() {
        let mut module = shaped("+", &[&[3], &[3]]);
        assert_eq!(infer_shapes(&mut module).unwrap(), 1);
        assert_eq!(returned_type(&module), ranked(&[3]));
    }

    #[test]
    fn test_inference_is_idempotent() {
        let mut module = shaped("×+", &[&[2, 2], &[2, 2], &[2, 2]]);
        assert_eq!(infer_shapes(&mut module).unwrap(), 2);
        let snapshot = module.clone();
        assert_eq!(infer_shapes(&mut module).unwrap(), 0);
        assert_eq!(module, snapshot);
    }

    #[test]
    fn test_each_sweep_is_traced() {
        let mut module = shaped("+", &[&[3], &[3]]);
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(captured.clone())
            .finish();

        let main = module.function_mut("main").unwrap();
        let refined = tracing::subscriber::with_default(subscriber, || {
            infer_region(&mut main.body)
        })
        .unwrap();
        assert_eq!(refined, 1);

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("iteration=1 changed=1"));
        assert!(logs.contains("iteration=2 changed=0"));
        assert!(!logs.contains("iteration=3"));
    }

    #[test]
    fn test_unranked_operand_blocks_inference() {
        let mut module = shaped("+", &[&[3]]);
        assert_eq!(infer_shapes(&mut module).unwrap(), 0);
        assert!(!returned_type(&module).is_ranked());
    }

    #[test]
    fn test_pointwise_shape_mismatch() {
        let mut module = shaped("+", &[&[3], &[4]]);
        let err = infer_shapes(&mut module).unwrap_err();
        assert_eq!(
            err,
            CompileError::shape_mismatch("uiua.add", "tensor<3xf64>", "tensor<4xf64>")
        );
    }

    #[test]
    fn test_reduce_drops_leading_axis() {
        let mut module = shaped("/+", &[&[2, 3]]);
        infer_shapes(&mut module).unwrap();
        assert_eq!(returned_type(&module), ranked(&[3]));

        let main = module.function("main").unwrap();
        let (_, reduce) = main.body.ops().next().unwrap();
        let body = reduce.region.as_ref().unwrap();
        for &param in body.params() {
            assert_eq!(body.value_type(param), &ranked(&[3]));
        }
        let (_, add) = body.ops().next().unwrap();
        assert_eq!(body.value_type(add.results[0]), &ranked(&[3]));
    }

    #[test]
    fn test_reduce_of_vector_is_scalar() {
        let mut module = shaped("/×", &[&[4]]);
        infer_shapes(&mut module).unwrap();
        assert_eq!(returned_type(&module), ranked(&[]));
    }

    #[test]
    fn test_reduce_of_scalar_is_rejected() {
        let mut module = shaped("/+", &[&[]]);
        let err = infer_shapes(&mut module).unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_shaped_reduce_removes_dimensions() {
        let mut body = Region::new();
        let a = body.add_param(ranked(&[]));
        let b = body.add_param(ranked(&[]));
        let sum = body.push_op(OpKind::ElementwiseAdd, vec![a, b], vec![ranked(&[])], None);
        let sum = body.op(sum).unwrap().results[0];
        body.push_op(OpKind::RegionReturn, vec![sum], vec![], None);

        let mut region = Region::new();
        let arg = region.add_param(ranked(&[2, 5]));
        let init = region.push_op(OpKind::Constant(0.0), vec![], vec![ranked(&[])], None);
        let init = region.op(init).unwrap().results[0];
        let reduce = region.push_op(
            OpKind::ShapedReduce {
                dimensions: vec![0],
            },
            vec![arg, init],
            vec![TensorType::unranked(ElementKind::F64)],
            Some(body),
        );

        assert_eq!(infer_region(&mut region).unwrap(), 1);
        let result = region.op(reduce).unwrap().results[0];
        assert_eq!(region.value_type(result), &ranked(&[5]));
    }
}
