//! Shape specification strings
//!
//! `"Add=2x3_2x3;Id=4x5"` maps each function name to the shapes of its
//! parameters, in order. Shapes are separated by `_`, dimensions by `x`, and
//! an empty shape denotes a scalar. `Name=` on its own declares no
//! parameters at all.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{CompileError, CompileResult};

/// Parameter shapes per function, in the order they were written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShapeSpec {
    functions: IndexMap<String, Vec<Vec<usize>>>,
}

impl ShapeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// A spec naming only `name`
    pub fn for_entry(name: impl Into<String>, shapes: Vec<Vec<usize>>) -> Self {
        let mut spec = Self::new();
        spec.insert(name, shapes);
        spec
    }

    /// Set the shapes for a function, returning any previous ones
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        shapes: Vec<Vec<usize>>,
    ) -> Option<Vec<Vec<usize>>> {
        self.functions.insert(name.into(), shapes)
    }

    pub fn get(&self, name: &str) -> Option<&[Vec<usize>]> {
        self.functions.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Vec<usize>])> + '_ {
        self.functions
            .iter()
            .map(|(name, shapes)| (name.as_str(), shapes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn parse_dims(entry: &str, text: &str) -> CompileResult<Vec<usize>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split('x')
        .map(|dim| {
            dim.parse::<usize>().map_err(|_| {
                CompileError::shape_spec(entry, format!("invalid dimension '{}'", dim))
            })
        })
        .collect()
}

fn parse_entry(entry: &str) -> CompileResult<(String, Vec<Vec<usize>>)> {
    let fields: Vec<&str> = entry.split('=').collect();
    let (name, shapes) = match fields.as_slice() {
        [name, shapes] => (name.trim(), shapes.trim()),
        _ => {
            return Err(CompileError::shape_spec(
                entry,
                format!("expected 'Name=shapes', found {} fields", fields.len()),
            ))
        }
    };
    if name.is_empty() {
        return Err(CompileError::shape_spec(entry, "missing function name"));
    }

    let shapes = if shapes.is_empty() {
        Vec::new()
    } else {
        shapes
            .split('_')
            .map(|dims| parse_dims(entry, dims))
            .collect::<CompileResult<_>>()?
    };
    Ok((name.to_string(), shapes))
}

impl FromStr for ShapeSpec {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        let mut spec = ShapeSpec::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, shapes) = parse_entry(entry)?;
            if spec.insert(name.clone(), shapes).is_some() {
                return Err(CompileError::shape_spec(
                    entry,
                    format!("'{}' is listed more than once", name),
                ));
            }
        }
        Ok(spec)
    }
}

impl fmt::Display for ShapeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, shapes)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            let shapes: Vec<String> = shapes
                .iter()
                .map(|dims| {
                    dims.iter()
                        .map(|d| d.to_string())
                        .collect::<Vec<_>>()
                        .join("x")
                })
                .collect();
            write!(f, "{}={}", name, shapes.join("_"))?;
        }
        Ok(())
    }
}
