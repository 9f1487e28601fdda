//! Error types for the stack-array to tensor compiler

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Parse error at position {position}: {expected}")]
    ParseError { position: usize, expected: String },

    #[error("Arity error: {message}")]
    ArityError { message: String },

    #[error("Shape mismatch in {op}: expected {expected}, got {got}")]
    ShapeMismatch {
        op: String,
        expected: String,
        got: String,
    },

    #[error("Unsupported construct: {construct}")]
    Unsupported { construct: String },

    #[error("Invalid shape specification '{entry}': {message}")]
    ShapeSpecFormat { entry: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },
}

impl CompileError {
    pub fn parse_error(position: usize, expected: impl Into<String>) -> Self {
        CompileError::ParseError {
            position,
            expected: expected.into(),
        }
    }

    pub fn arity(msg: impl Into<String>) -> Self {
        CompileError::ArityError { message: msg.into() }
    }

    pub fn shape_mismatch(
        op: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        CompileError::ShapeMismatch {
            op: op.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn unsupported(construct: impl Into<String>) -> Self {
        CompileError::Unsupported {
            construct: construct.into(),
        }
    }

    pub fn shape_spec(entry: impl Into<String>, msg: impl Into<String>) -> Self {
        CompileError::ShapeSpecFormat {
            entry: entry.into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal { message: msg.into() }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        CompileError::Backend { message: msg.into() }
    }
}
