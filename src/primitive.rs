//! Primitive table
//!
//! Static, read-only metadata for every primitive glyph the compiler knows:
//! how many values it pops, how many it pushes, and which class of rule the
//! graph builder and the passes apply to it.

use serde::Serialize;

/// How a primitive behaves when replayed against the value stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PrimitiveClass {
    /// Binary, element by element over two equally shaped arrays
    DyadicPervasive,
    /// Takes a function operand and applies it structurally (e.g. a fold)
    AggregatingModifier,
    /// Leaves its argument untouched
    Identity,
    /// Pushes its argument twice
    Duplicate,
}

/// A primitive spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PrimitiveSpelling {
    Add,
    Multiply,
    Duplicate,
    Identity,
    Reduce,
}

/// One row of the primitive table
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveInfo {
    pub spelling: PrimitiveSpelling,
    pub glyph: &'static str,
    pub name: &'static str,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub class: PrimitiveClass,
}

/// All primitives, indexed by `PrimitiveSpelling as usize`
pub static PRIMITIVES: [PrimitiveInfo; 5] = [
    PrimitiveInfo {
        spelling: PrimitiveSpelling::Add,
        glyph: "+",
        name: "add",
        num_inputs: 2,
        num_outputs: 1,
        class: PrimitiveClass::DyadicPervasive,
    },
    PrimitiveInfo {
        spelling: PrimitiveSpelling::Multiply,
        glyph: "×",
        name: "multiply",
        num_inputs: 2,
        num_outputs: 1,
        class: PrimitiveClass::DyadicPervasive,
    },
    PrimitiveInfo {
        spelling: PrimitiveSpelling::Duplicate,
        glyph: ".",
        name: "duplicate",
        num_inputs: 1,
        num_outputs: 2,
        class: PrimitiveClass::Duplicate,
    },
    PrimitiveInfo {
        spelling: PrimitiveSpelling::Identity,
        glyph: "∘",
        name: "identity",
        num_inputs: 1,
        num_outputs: 1,
        class: PrimitiveClass::Identity,
    },
    PrimitiveInfo {
        spelling: PrimitiveSpelling::Reduce,
        glyph: "/",
        name: "reduce",
        num_inputs: 1,
        num_outputs: 1,
        class: PrimitiveClass::AggregatingModifier,
    },
];

impl PrimitiveSpelling {
    pub fn info(self) -> &'static PrimitiveInfo {
        &PRIMITIVES[self as usize]
    }

    pub fn glyph(self) -> &'static str {
        self.info().glyph
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Number of values popped off the stack
    pub fn num_inputs(self) -> usize {
        self.info().num_inputs
    }

    /// Number of values pushed onto the stack
    pub fn num_outputs(self) -> usize {
        self.info().num_outputs
    }

    pub fn class(self) -> PrimitiveClass {
        self.info().class
    }

    pub fn all() -> impl Iterator<Item = PrimitiveSpelling> {
        PRIMITIVES.iter().map(|info| info.spelling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_indexed_by_spelling() {
        for (i, info) in PRIMITIVES.iter().enumerate() {
            assert_eq!(info.spelling as usize, i);
        }
    }

    #[test]
    fn test_arity() {
        assert_eq!(PrimitiveSpelling::Add.num_inputs(), 2);
        assert_eq!(PrimitiveSpelling::Add.num_outputs(), 1);
        assert_eq!(PrimitiveSpelling::Duplicate.num_inputs(), 1);
        assert_eq!(PrimitiveSpelling::Duplicate.num_outputs(), 2);
        assert_eq!(
            PrimitiveSpelling::Reduce.class(),
            PrimitiveClass::AggregatingModifier
        );
    }
}
