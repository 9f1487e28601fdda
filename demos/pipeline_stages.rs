//! Example: Pipeline Stages
//!
//! Prints the module after every stage of the pipeline for a program with a
//! named function and some top-level code.
//!
//! Run with: cargo run --example pipeline_stages

use uiua_to_hlo::{compile_with_config, PipelineConfig, ShapeSpec, Stage};

fn main() {
    println!("=== Pipeline Stages Example ===\n");

    let source = "Sum ← /+\n× .";
    let spec: ShapeSpec = "Sum=4x2;main=3".parse().unwrap();

    println!("Source:\n{}\n", source);
    println!("Shapes: {}\n", spec);

    let stages = [
        Stage::Built,
        Stage::Shaped,
        Stage::Inferred,
        Stage::Erased,
        Stage::Lowered,
    ];
    for stage in stages {
        let config = PipelineConfig::new().stop_after(stage);
        let module = compile_with_config(source, &spec, &config).unwrap();

        println!("--- after {} ---", stage.name());
        println!("{}", module);
    }

    // JSON form of the final module
    let module = compile_with_config(source, &spec, &PipelineConfig::default()).unwrap();
    println!("{}", module.to_json().unwrap());
}
