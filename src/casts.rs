//! Shape assignment and cast erasure
//!
//! Assignment gives a function's parameters concrete shapes and wraps every
//! returned value in a cast back to the declared result type, so inference
//! can refine the body while the function's signature stays as it was.
//! Erasure undoes the casts once inference has converged and publishes the
//! refined result types.

use tracing::{debug, instrument};

use crate::error::{CompileError, CompileResult};
use crate::ir::{Function, Module, OpId, OpKind, TensorType};
use crate::shape_spec::ShapeSpec;

/// Give each parameter of `function` the matching shape and insert exit casts
#[instrument(skip_all, fields(function = %function.name))]
pub fn assign_shapes(function: &mut Function, shapes: &[Vec<usize>]) -> CompileResult<()> {
    let params = function.body.params().to_vec();
    if params.len() != shapes.len() {
        return Err(CompileError::shape_spec(
            function.name.clone(),
            format!(
                "function takes {} parameters but {} shapes were given",
                params.len(),
                shapes.len()
            ),
        ));
    }

    let mut inputs = Vec::with_capacity(params.len());
    for (&param, dims) in params.iter().zip(shapes) {
        let element = function.body.value_type(param).element;
        let ty = TensorType::ranked(element, dims.clone());
        function.body.set_type(param, ty.clone());
        inputs.push(ty);
    }
    function.signature.inputs = inputs;

    let ret = match return_op(function) {
        Some(ret) => ret,
        None => return Ok(()),
    };

    let returned = function.body.op(ret)?.operands.clone();
    let mut casted = Vec::with_capacity(returned.len());
    for (i, &value) in returned.iter().enumerate() {
        let declared = match function.signature.outputs.get(i) {
            Some(ty) => ty.clone(),
            None => TensorType::unranked(function.body.value_type(value).element),
        };
        let cast = function
            .body
            .insert_op_before(ret, OpKind::Cast, vec![value], vec![declared], None)?;
        casted.push(function.body.op(cast)?.results[0]);
    }
    function.body.op_mut(ret)?.operands = casted;

    debug!(params = params.len(), casts = returned.len(), "assigned shapes");
    Ok(())
}

/// Remove the exit casts and publish the refined result types
#[instrument(skip_all, fields(function = %function.name))]
pub fn erase_casts(function: &mut Function) -> CompileResult<()> {
    let ret = match return_op(function) {
        Some(ret) => ret,
        None => return Ok(()),
    };

    let mut casts: Vec<OpId> = Vec::new();
    let mut originals = Vec::new();
    let returned = function.body.op(ret)?.operands.clone();
    for value in returned {
        let cast = match function.body.defining_op(value) {
            Some(op) if function.body.op(op)?.kind == OpKind::Cast => op,
            _ => {
                return Err(CompileError::internal(format!(
                    "returned value %{} of '{}' is not a cast",
                    value.0, function.name
                )))
            }
        };
        originals.push(function.body.op(cast)?.operands[0]);
        if !casts.contains(&cast) {
            casts.push(cast);
        }
    }

    function.body.op_mut(ret)?.operands = originals.clone();
    for cast in &casts {
        function.body.erase_op(*cast)?;
    }
    function.signature.outputs = originals
        .iter()
        .map(|&v| function.body.value_type(v).clone())
        .collect();

    debug!(casts = casts.len(), "erased casts");
    Ok(())
}

fn return_op(function: &Function) -> Option<OpId> {
    function
        .body
        .terminator()
        .filter(|&id| {
            function
                .body
                .op(id)
                .is_ok_and(|op| op.kind == OpKind::Return)
        })
}

fn lookup<'m>(module: &'m mut Module, name: &str) -> CompileResult<&'m mut Function> {
    module
        .function_mut(name)
        .ok_or_else(|| CompileError::shape_spec(name, "no function with this name"))
}

/// Assign shapes to every function named in `spec`
pub fn apply_shape_spec(module: &mut Module, spec: &ShapeSpec) -> CompileResult<()> {
    for (name, shapes) in spec.iter() {
        assign_shapes(lookup(module, name)?, shapes)?;
    }
    Ok(())
}

/// Erase casts in every function named in `spec`
pub fn erase_module_casts(module: &mut Module, spec: &ShapeSpec) -> CompileResult<()> {
    for (name, _) in spec.iter() {
        erase_casts(lookup(module, name)?)?;
    }
    Ok(())
}
