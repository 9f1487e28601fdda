//! Example: Elementwise Operations
//!
//! Shows how missing stack values become function parameters and how the
//! pointwise primitives lower to elementwise tensor operations.
//!
//! Run with: cargo run --example elementwise

use uiua_to_hlo::{build_module, parse, run, Interpreter, Tensor};

fn main() {
    println!("=== Elementwise Example ===\n");

    let programs = ["+", "+.", "×+", "+ 1"];
    for source in programs {
        let module = build_module(&parse(source).unwrap()).unwrap();
        let main = module.function("main").unwrap();
        println!(
            "{:<6} takes {} parameter(s), returns {} value(s)",
            source,
            main.signature.inputs.len(),
            main.signature.outputs.len()
        );
    }
    println!();

    // add two vectors
    let a = Tensor::vector(vec![2.0, 3.0, 4.5]);
    let b = Tensor::vector(vec![4.0, 5.0, 6.0]);
    println!("{} + {}", a, b);
    let outputs = run(&Interpreter::default(), "+", &[a, b]).unwrap();
    println!("  = {}\n", outputs[0]);

    // multiply the first input by twice the second
    let a = Tensor::from_json("[[1, 2], [3, 4]]").unwrap();
    let b = Tensor::from_json("[[5, 6], [7, 8]]").unwrap();
    println!("{} × ({} + itself)", a, b);
    let outputs = run(&Interpreter::default(), "×+.", &[a, b]).unwrap();
    println!("  = {}", outputs[0]);
}
