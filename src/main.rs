//! Stack-Array to Tensor Compiler CLI
//!
//! Usage:
//!   uiua2hlo parse "/+ [1 2 3]" --json
//!   uiua2hlo lower "/+" --shapes main=2x3
//!   uiua2hlo lower -f program.ua --shapes "Sum=4;main=2_2" --stage inferred
//!   uiua2hlo run "+" --input "[1, 2]" --input "[3, 4]"

use clap::{Args, Parser as ClapParser, Subcommand};
use colored::Colorize;
use std::fmt::Display;
use std::fs;
use std::io::{self, Read};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use uiua_to_hlo::{
    compile_with_config, run, Interpreter, Parser, PipelineConfig, ShapeSpec, Stage, Tensor,
    ENTRY_FUNCTION,
};

#[derive(ClapParser, Debug)]
#[command(name = "uiua2hlo")]
#[command(version = "0.1.0")]
#[command(about = "Compiles stack-array programs to generic tensor operations")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (also raises the log level to debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and print the syntax tree
    Parse {
        #[command(flatten)]
        source: SourceArgs,

        /// Keep comments in the tree
        #[arg(long = "keep-comments")]
        keep_comments: bool,

        /// Output as JSON
        #[arg(short = 'j', long = "json")]
        json_output: bool,
    },

    /// Compile and print the resulting module
    Lower {
        #[command(flatten)]
        source: SourceArgs,

        /// Parameter shapes per function (e.g., "main=2x3_2x3;Sum=4")
        #[arg(short = 's', long = "shapes", value_parser = parse_shapes)]
        shapes: Option<ShapeSpec>,

        /// Stop after this stage
        #[arg(long = "stage", value_enum, default_value_t = Stage::Lowered)]
        stage: Stage,

        /// Name of the function holding top-level code
        #[arg(long = "entry", default_value = ENTRY_FUNCTION)]
        entry: String,

        /// Keep comments while parsing
        #[arg(long = "keep-comments")]
        keep_comments: bool,

        /// Output as JSON
        #[arg(short = 'j', long = "json")]
        json_output: bool,
    },

    /// Compile for the given inputs and execute on the reference interpreter
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Input tensor as nested JSON arrays, in parameter order
        #[arg(short = 'i', long = "input", value_parser = parse_tensor)]
        inputs: Vec<Tensor>,

        /// Output as JSON
        #[arg(short = 'j', long = "json")]
        json_output: bool,
    },
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Program text (e.g., "/+")
    #[arg(value_name = "SOURCE")]
    text: Option<String>,

    /// Read the program from a file
    #[arg(short = 'f', long = "file")]
    input_file: Option<String>,
}

fn parse_shapes(s: &str) -> Result<ShapeSpec, String> {
    s.parse().map_err(|e: uiua_to_hlo::CompileError| e.to_string())
}

fn parse_tensor(s: &str) -> Result<Tensor, String> {
    Tensor::from_json(s).map_err(|e| e.to_string())
}

fn fail(context: &str, err: impl Display) -> ! {
    eprintln!("{}: {}", context.red(), err);
    std::process::exit(1);
}

/// Program text from the argument, a file, or stdin
fn read_source(args: &SourceArgs) -> String {
    if let Some(text) = &args.text {
        text.clone()
    } else if let Some(file) = &args.input_file {
        fs::read_to_string(file)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read file '{}': {}", file, e)))
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .unwrap_or_else(|e| fail("Error", format!("Failed to read stdin: {}", e)));
        buffer
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail("Error", format!("Failed to serialize to JSON: {}", e)),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "uiua_to_hlo=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Parse {
            source,
            keep_comments,
            json_output,
        } => {
            let text = read_source(&source);
            let items = Parser::new(&text)
                .keep_comments(keep_comments)
                .parse_items()
                .unwrap_or_else(|e| fail("Parse error", e));

            if json_output {
                print_json(&items);
            } else {
                if cli.verbose {
                    println!("{}: {} item(s)", "Parsed".green(), items.len());
                }
                println!("{:#?}", items);
            }
        }

        Command::Lower {
            source,
            shapes,
            stage,
            entry,
            keep_comments,
            json_output,
        } => {
            let text = read_source(&source);
            let spec = shapes.unwrap_or_default();
            let config = PipelineConfig::new()
                .with_entry(entry)
                .with_comments(keep_comments)
                .stop_after(stage);

            if cli.verbose {
                println!("{}", "Stack-Array to Tensor Compiler".bold().blue());
                println!("{}", "=".repeat(30));
                println!("{}: {}", "Input".green(), text.trim());
                println!("{}: {}", "Shapes".green(), spec);
                println!("{}: {}", "Stop after".green(), stage.name());
                println!();
            }

            let module = compile_with_config(&text, &spec, &config)
                .unwrap_or_else(|e| fail("Compilation error", e));

            if json_output {
                match module.to_json() {
                    Ok(json) => println!("{}", json),
                    Err(e) => fail("Error", format!("Failed to serialize to JSON: {}", e)),
                }
            } else {
                print!("{}", module);
            }
        }

        Command::Run {
            source,
            inputs,
            json_output,
        } => {
            let text = read_source(&source);
            if cli.verbose {
                for (i, input) in inputs.iter().enumerate() {
                    println!("{} {}: {}", "Input".green(), i, input);
                }
            }

            let outputs = run(&Interpreter::default(), &text, &inputs)
                .unwrap_or_else(|e| fail("Execution error", e));

            if json_output {
                print_json(&outputs);
            } else {
                for output in &outputs {
                    println!("{}", output);
                }
            }
        }
    }
}
