//! Example: Fold Add
//!
//! Compiles `/+` for a 2x3 input, prints the lowered module and runs it on
//! the reference interpreter.
//!
//! Run with: cargo run --example fold_add

use uiua_to_hlo::{compile, Backend, Interpreter, Tensor};

fn main() {
    println!("=== Fold Add Example ===\n");

    println!("Source: /+");
    println!("Shapes: main=2x3\n");

    let module = compile("/+", "main=2x3").unwrap();
    println!("{}", module);

    let backend = Interpreter::default();
    let program = backend.compile(&module).unwrap();

    let input = Tensor::from_json("[[2, 3, 4], [4.5, 5.5, 6.5]]").unwrap();
    println!("Input:  {}", input);

    let outputs = backend.execute(&program, &[input]).unwrap();
    println!("Output: {}", outputs[0]);

    // Expected: column sums
    // [2 + 4.5, 3 + 5.5, 4 + 6.5] = [6.5, 8.5, 10.5]
    println!("\nExpected: [6.5, 8.5, 10.5]");
}
