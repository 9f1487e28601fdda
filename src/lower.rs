//! Lowering to the generic tensor vocabulary
//!
//! One rule per operation kind, applied once to every operation:
//!
//! | source           | target                                   |
//! |------------------|------------------------------------------|
//! | `uiua.add`       | `tensor.add`                             |
//! | `uiua.multiply`  | `tensor.multiply`                        |
//! | `uiua.reduce`    | `arith.constant` + `tensor.reduce` dim 0 |
//! | `uiua.yield`     | `tensor.return`                          |
//!
//! Constants, function returns and operations that are already in the
//! target vocabulary are left alone. A cast reaching this pass means the
//! cast erasure pass did not run.

use tracing::{debug, instrument, trace};

use crate::error::{CompileError, CompileResult};
use crate::ir::{Function, Module, OpId, OpKind, Region, Shape, TensorType};

/// Lower every function. Returns the number of rewritten operations.
#[instrument(skip_all, fields(functions = module.functions.len()))]
pub fn lower_module(module: &mut Module) -> CompileResult<usize> {
    let mut total = 0;
    for function in &mut module.functions {
        total += lower_function(function)?;
    }
    debug!(rewritten = total, "lowering done");
    Ok(total)
}

pub fn lower_function(function: &mut Function) -> CompileResult<usize> {
    let rewritten = lower_region(&mut function.body)?;
    trace!(function = %function.name, rewritten, "lowered function");
    Ok(rewritten)
}

pub fn lower_region(region: &mut Region) -> CompileResult<usize> {
    let mut rewritten = 0;
    for id in region.op_ids() {
        rewritten += lower_op(region, id)?;
    }
    Ok(rewritten)
}

/// Whether every operation, nested ones included, is in the target vocabulary
pub fn is_lowered(region: &Region) -> bool {
    region.ops().all(|(_, op)| {
        op.kind.is_target() && op.region.as_ref().map_or(true, is_lowered)
    })
}

fn lower_op(region: &mut Region, id: OpId) -> CompileResult<usize> {
    let kind = region.op(id)?.kind.clone();
    match kind {
        OpKind::Add => lower_pointwise(region, id, OpKind::ElementwiseAdd),
        OpKind::Multiply => lower_pointwise(region, id, OpKind::ElementwiseMultiply),
        OpKind::Reduce => lower_reduce(region, id),
        OpKind::Yield => {
            region.op_mut(id)?.kind = OpKind::RegionReturn;
            Ok(1)
        }
        OpKind::Cast => Err(CompileError::internal(
            "uiua.cast reached lowering; erase casts first",
        )),
        OpKind::Constant(_)
        | OpKind::Return
        | OpKind::ElementwiseAdd
        | OpKind::ElementwiseMultiply
        | OpKind::ShapedReduce { .. }
        | OpKind::RegionReturn => Ok(0),
    }
}

fn lower_pointwise(region: &mut Region, id: OpId, target: OpKind) -> CompileResult<usize> {
    let op = region.op(id)?;
    let (lhs, rhs) = match op.operands.as_slice() {
        [lhs, rhs] => (region.value_type(*lhs).clone(), region.value_type(*rhs).clone()),
        other => {
            return Err(CompileError::internal(format!(
                "{} expects 2 operands, found {}",
                op.kind.name(),
                other.len()
            )))
        }
    };
    if !lhs.is_ranked() || lhs != rhs {
        return Err(CompileError::shape_mismatch(
            op.kind.name(),
            lhs.to_string(),
            rhs.to_string(),
        ));
    }

    let results = op.results.clone();
    for result in results {
        region.set_type(result, lhs.clone());
    }
    region.op_mut(id)?.kind = target;
    Ok(1)
}

/// Initial accumulator for a fold with this body
fn fold_identity(body: &Region) -> f64 {
    let ops: Vec<&OpKind> = body
        .ops()
        .map(|(_, op)| &op.kind)
        .filter(|kind| !kind.is_terminator())
        .collect();
    match ops.as_slice() {
        [OpKind::Multiply] | [OpKind::ElementwiseMultiply] => 1.0,
        _ => 0.0,
    }
}

fn lower_reduce(region: &mut Region, id: OpId) -> CompileResult<usize> {
    let (arg, result) = {
        let op = region.op(id)?;
        match (op.operands.as_slice(), op.results.as_slice()) {
            ([arg], [result]) => (*arg, *result),
            _ => {
                return Err(CompileError::internal(
                    "uiua.reduce expects 1 operand and 1 result",
                ))
            }
        }
    };

    let arg_type = region.value_type(arg).clone();
    let dims = match arg_type.shape.dims() {
        Some(dims) if !dims.is_empty() => dims.to_vec(),
        _ => {
            return Err(CompileError::shape_mismatch(
                "uiua.reduce",
                "a ranked argument of rank 1 or more",
                arg_type.to_string(),
            ))
        }
    };
    let scalar = TensorType::scalar(arg_type.element);

    let mut body = region
        .op_mut(id)?
        .region
        .take()
        .ok_or_else(|| CompileError::internal("uiua.reduce without a body"))?;
    let init_value = fold_identity(&body);
    for param in body.params().to_vec() {
        body.set_type(param, scalar.clone());
    }
    let lowered = lower_region(&mut body);
    region.op_mut(id)?.region = Some(body);
    let lowered = lowered?;

    let init = region.insert_op_before(
        id,
        OpKind::Constant(init_value),
        vec![],
        vec![scalar],
        None,
    )?;
    let init = region.op(init)?.results[0];

    if region.value_type(result).shape == Shape::Unranked {
        region.set_type(result, arg_type.with_shape(Shape::Ranked(dims[1..].to_vec())));
    }
    let op = region.op_mut(id)?;
    op.kind = OpKind::ShapedReduce {
        dimensions: vec![0],
    };
    op.operands = vec![arg, init];

    Ok(1 + lowered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::casts::{apply_shape_spec, erase_module_casts};
    use crate::ir::ElementKind;
    use crate::irgen::build_module;
    use crate::parser::parse;
    use crate::shape_spec::ShapeSpec;
    use crate::shapes::infer_shapes;
    use pretty_assertions::assert_eq;

    fn ranked(dims: &[usize]) -> TensorType {
        TensorType::ranked(ElementKind::F64, dims.to_vec())
    }

    fn kinds(region: &Region) -> Vec<OpKind> {
        region.ops().map(|(_, op)| op.kind.clone()).collect()
    }

    /// Everything up to, but not including, lowering
    fn prepared(source: &str, spec: &str) -> Module {
        let mut module = build_module(&parse(source).unwrap()).unwrap();
        let spec: ShapeSpec = spec.parse().unwrap();
        apply_shape_spec(&mut module, &spec).unwrap();
        infer_shapes(&mut module).unwrap();
        erase_module_casts(&mut module, &spec).unwrap();
        module
    }

    #[test]
    fn test_lower_add() {
        let mut module = prepared("+", "main=3_3");
        assert_eq!(lower_module(&mut module).unwrap(), 1);

        let main = module.function("main").unwrap();
        assert_eq!(kinds(&main.body), vec![OpKind::ElementwiseAdd, OpKind::Return]);
        assert!(is_lowered(&main.body));
        assert_eq!(main.signature.outputs, vec![ranked(&[3])]);
    }

    #[test]
    fn test_lower_reduce_add() {
        let mut module = prepared("/+", "main=2x3");
        lower_module(&mut module).unwrap();

        let main = module.function("main").unwrap();
        assert_eq!(
            kinds(&main.body),
            vec![
                OpKind::Constant(0.0),
                OpKind::ShapedReduce {
                    dimensions: vec![0]
                },
                OpKind::Return
            ]
        );
        assert_eq!(main.signature.outputs, vec![ranked(&[3])]);

        let ops: Vec<_> = main.body.ops().collect();
        let init = ops[0].1.results[0];
        assert_eq!(main.body.value_type(init), &ranked(&[]));
        assert_eq!(ops[1].1.operands, vec![main.body.params()[0], init]);

        let body = ops[1].1.region.as_ref().unwrap();
        assert_eq!(kinds(body), vec![OpKind::ElementwiseAdd, OpKind::RegionReturn]);
        for &param in body.params() {
            assert_eq!(body.value_type(param), &ranked(&[]));
        }
        assert!(is_lowered(&main.body));
    }

    #[test]
    fn test_reduce_multiply_starts_at_one() {
        let mut module = prepared("/×", "main=4");
        lower_module(&mut module).unwrap();
        let main = module.function("main").unwrap();
        assert_eq!(kinds(&main.body)[0], OpKind::Constant(1.0));
    }

    #[test]
    fn test_unranked_operands_are_rejected() {
        let mut module = build_module(&parse("+").unwrap()).unwrap();
        let err = lower_module(&mut module).unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_leftover_cast_is_internal_error() {
        let mut module = build_module(&parse("+").unwrap()).unwrap();
        let spec: ShapeSpec = "main=3_3".parse().unwrap();
        apply_shape_spec(&mut module, &spec).unwrap();
        infer_shapes(&mut module).unwrap();

        let err = lower_module(&mut module).unwrap_err();
        assert!(matches!(err, CompileError::Internal { .. }));
    }

    #[test]
    fn test_reduce_of_scalar_is_rejected() {
        let mut module = build_module(&parse("/+").unwrap()).unwrap();
        let main = module.function_mut("main").unwrap();
        let param = main.body.params()[0];
        main.body.set_type(param, ranked(&[]));

        let err = lower_module(&mut module).unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_lowering_twice_changes_nothing() {
        let mut module = prepared("/+", "main=2x3");
        lower_module(&mut module).unwrap();
        let snapshot = module.clone();
        assert_eq!(lower_module(&mut module).unwrap(), 0);
        assert_eq!(module, snapshot);
    }
}
