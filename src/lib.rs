//! Stack-Array to Tensor Compiler
//!
//! This library compiles programs in a small stack-based array language into
//! a shape-annotated dataflow graph made of generic tensor operations.
//!
//! The pipeline is: parse → build graph → assign shapes → infer shapes →
//! erase casts → lower.
//!
//! # Example
//!
//! ```rust
//! use uiua_to_hlo::{compile, Backend, Interpreter, Tensor};
//!
//! // fold add over a 2x3 array
//! let module = compile("/+", "main=2x3").unwrap();
//! println!("{}", module);
//!
//! let backend = Interpreter::default();
//! let program = backend.compile(&module).unwrap();
//! let input = Tensor::from_json("[[2, 3, 4], [4.5, 5.5, 6.5]]").unwrap();
//! let outputs = backend.execute(&program, &[input]).unwrap();
//! assert_eq!(outputs[0].data, vec![6.5, 8.5, 10.5]);
//! ```

pub mod ast;
pub mod backend;
pub mod casts;
pub mod config;
pub mod error;
pub mod ir;
pub mod irgen;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod primitive;
pub mod shape_spec;
pub mod shapes;
pub mod source;

pub use ast::*;
pub use backend::{Backend, Interpreter, Program, Tensor};
pub use casts::{apply_shape_spec, assign_shapes, erase_casts, erase_module_casts};
pub use config::{PipelineConfig, Stage};
pub use error::{CompileError, CompileResult};
pub use ir::{ElementKind, Function, Module, OpKind, Region, Shape, TensorType};
pub use irgen::{build_module, ModuleBuilder, ENTRY_FUNCTION};
pub use lower::lower_module;
pub use parser::{parse, Parser};
pub use shape_spec::ShapeSpec;
pub use shapes::infer_shapes;

use tracing::debug;

/// Compile `source` all the way down, with shapes given as `Name=2x3_4;...`
pub fn compile(source: &str, shapes: &str) -> CompileResult<Module> {
    let spec: ShapeSpec = shapes.parse()?;
    compile_with_config(source, &spec, &PipelineConfig::default())
}

/// Run the pipeline up to `config.stop_after`
pub fn compile_with_config(
    source: &str,
    spec: &ShapeSpec,
    config: &PipelineConfig,
) -> CompileResult<Module> {
    let items = Parser::new(source)
        .keep_comments(config.keep_comments)
        .parse_items()?;
    let mut module = ModuleBuilder::new(config.entry.as_str()).build(&items)?;

    if config.runs(Stage::Shaped) {
        apply_shape_spec(&mut module, spec)?;
    }
    if config.runs(Stage::Inferred) {
        infer_shapes(&mut module)?;
    }
    if config.runs(Stage::Erased) {
        erase_module_casts(&mut module, spec)?;
    }
    if config.runs(Stage::Lowered) {
        lower_module(&mut module)?;
    }

    debug!(
        stage = config.stop_after.name(),
        functions = module.functions.len(),
        "pipeline finished"
    );
    Ok(module)
}

/// Compile `source` for the shapes of `inputs`, then execute it on `backend`
pub fn run<B: Backend>(
    backend: &B,
    source: &str,
    inputs: &[Tensor],
) -> CompileResult<Vec<Tensor>> {
    let config = PipelineConfig::default();
    let shapes = inputs.iter().map(|t| t.shape.clone()).collect();
    let spec = ShapeSpec::for_entry(config.entry.as_str(), shapes);

    let module = compile_with_config(source, &spec, &config)?;
    let executable = backend.compile(&module)?;
    backend.execute(&executable, inputs)
}
