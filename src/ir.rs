//! Operation graph
//!
//! A [`Module`] owns named [`Function`]s; a function owns one [`Region`]. A
//! region is an arena: values and operations are addressed by stable indices
//! ([`ValueId`], [`OpId`]) and an explicit order list gives program order.
//! Changing a value's type updates its slot in place, and erasing an
//! operation empties its slot without shifting any other index.
//!
//! Regions are isolated from above: an operation nested inside a region only
//! refers to that region's parameters and results. This is what lets the
//! graph builder construct nested regions as plain values.

use std::fmt;

use serde::Serialize;

use crate::error::{CompileError, CompileResult};

/// Index of a value inside its region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueId(pub usize);

/// Index of an operation inside its region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OpId(pub usize);

// Types

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementKind {
    F64,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::F64 => write!(f, "f64"),
        }
    }
}

/// Shape of a tensor, unknown until inference ranks it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Shape {
    Unranked,
    Ranked(Vec<usize>),
}

impl Shape {
    pub fn scalar() -> Self {
        Shape::Ranked(Vec::new())
    }

    pub fn is_ranked(&self) -> bool {
        matches!(self, Shape::Ranked(_))
    }

    pub fn dims(&self) -> Option<&[usize]> {
        match self {
            Shape::Ranked(dims) => Some(dims),
            Shape::Unranked => None,
        }
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims().map(|dims| dims.len())
    }

    pub fn num_elements(&self) -> Option<usize> {
        self.dims().map(|dims| dims.iter().product())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Unranked => write!(f, "*"),
            Shape::Ranked(dims) => {
                let dims: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
                write!(f, "[{}]", dims.join("x"))
            }
        }
    }
}

/// `(element kind, shape)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TensorType {
    pub element: ElementKind,
    pub shape: Shape,
}

impl TensorType {
    pub fn unranked(element: ElementKind) -> Self {
        Self {
            element,
            shape: Shape::Unranked,
        }
    }

    pub fn ranked(element: ElementKind, dims: impl Into<Vec<usize>>) -> Self {
        Self {
            element,
            shape: Shape::Ranked(dims.into()),
        }
    }

    pub fn scalar(element: ElementKind) -> Self {
        Self::ranked(element, Vec::new())
    }

    /// Same element kind, different shape
    pub fn with_shape(&self, shape: Shape) -> Self {
        Self {
            element: self.element,
            shape,
        }
    }

    pub fn is_ranked(&self) -> bool {
        self.shape.is_ranked()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            Shape::Unranked => write!(f, "tensor<*x{}>", self.element),
            Shape::Ranked(dims) if dims.is_empty() => write!(f, "tensor<{}>", self.element),
            Shape::Ranked(dims) => {
                for (i, dim) in dims.iter().enumerate() {
                    if i == 0 {
                        write!(f, "tensor<{}", dim)?;
                    } else {
                        write!(f, "x{}", dim)?;
                    }
                }
                write!(f, "x{}>", self.element)
            }
        }
    }
}

/// Declared input and output types of a function
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunctionType {
    pub inputs: Vec<TensorType>,
    pub outputs: Vec<TensorType>,
}

// Operations

/// The fixed operation vocabulary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OpKind {
    /// Scalar constant
    Constant(f64),

    // Source vocabulary
    /// Pointwise add of two equally shaped arrays
    Add,
    /// Pointwise multiply of two equally shaped arrays
    Multiply,
    /// Left fold over the leading axis; the region combines two values
    Reduce,
    /// Terminates a reduce region
    Yield,
    /// Widens a value's declared type to unranked
    Cast,

    // Target vocabulary
    ElementwiseAdd,
    ElementwiseMultiply,
    /// Reduction with an explicit initial value, operands `(arg, init)`
    ShapedReduce { dimensions: Vec<usize> },
    /// Terminates a shaped-reduce region
    RegionReturn,

    /// Terminates a function
    Return,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Constant(_) => "arith.constant",
            OpKind::Add => "uiua.add",
            OpKind::Multiply => "uiua.multiply",
            OpKind::Reduce => "uiua.reduce",
            OpKind::Yield => "uiua.yield",
            OpKind::Cast => "uiua.cast",
            OpKind::ElementwiseAdd => "tensor.add",
            OpKind::ElementwiseMultiply => "tensor.multiply",
            OpKind::ShapedReduce { .. } => "tensor.reduce",
            OpKind::RegionReturn => "tensor.return",
            OpKind::Return => "func.return",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, OpKind::Yield | OpKind::RegionReturn | OpKind::Return)
    }

    /// Whether the kind survives lowering unchanged
    pub fn is_target(&self) -> bool {
        matches!(
            self,
            OpKind::Constant(_)
                | OpKind::ElementwiseAdd
                | OpKind::ElementwiseMultiply
                | OpKind::ShapedReduce { .. }
                | OpKind::RegionReturn
                | OpKind::Return
        )
    }
}

/// An operation: kind, operand edges, result values and an optional region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub region: Option<Region>,
}

/// Where a value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueDef {
    Param,
    Result { op: OpId, index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Value {
    pub ty: TensorType,
    pub def: ValueDef,
}

/// A single-block region: parameters, operations in program order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Region {
    values: Vec<Value>,
    ops: Vec<Option<Operation>>,
    params: Vec<ValueId>,
    order: Vec<OpId>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    // Values

    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    pub fn add_param(&mut self, ty: TensorType) -> ValueId {
        let index = self.params.len();
        self.insert_param(index, ty)
    }

    /// Insert a parameter at `index` in the parameter list
    pub fn insert_param(&mut self, index: usize, ty: TensorType) -> ValueId {
        let id = self.new_value(ty, ValueDef::Param);
        self.params.insert(index, id);
        id
    }

    fn new_value(&mut self, ty: TensorType, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(Value { ty, def });
        id
    }

    pub fn value_type(&self, id: ValueId) -> &TensorType {
        &self.values[id.0].ty
    }

    /// Overwrite a value's type; for rewrites that change representation
    pub fn set_type(&mut self, id: ValueId, ty: TensorType) {
        self.values[id.0].ty = ty;
    }

    /// Monotonically refine a value's type. Returns whether it changed.
    ///
    /// Unranked may become ranked; ranked must stay exactly as it is.
    pub fn refine_type(&mut self, id: ValueId, ty: &TensorType) -> CompileResult<bool> {
        let current = self.values[id.0].ty.clone();
        if current.element != ty.element {
            return Err(CompileError::internal(format!(
                "cannot refine %{} from {} to {}: element kinds differ",
                id.0, current, ty
            )));
        }
        match (&current.shape, &ty.shape) {
            (Shape::Unranked, Shape::Unranked) => Ok(false),
            (Shape::Unranked, Shape::Ranked(_)) => {
                self.values[id.0].ty = ty.clone();
                Ok(true)
            }
            (Shape::Ranked(a), Shape::Ranked(b)) if a == b => Ok(false),
            (Shape::Ranked(_), _) => Err(CompileError::internal(format!(
                "cannot refine %{} from {} to {}",
                id.0, current, ty
            ))),
        }
    }

    /// The operation producing `id`, if it is not a parameter
    pub fn defining_op(&self, id: ValueId) -> Option<OpId> {
        match self.values[id.0].def {
            ValueDef::Param => None,
            ValueDef::Result { op, .. } => Some(op),
        }
    }

    // Operations

    /// Append an operation at the end of the region
    pub fn push_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: Vec<TensorType>,
        region: Option<Region>,
    ) -> OpId {
        let id = self.create_op(kind, operands, result_types, region);
        self.order.push(id);
        id
    }

    /// Insert an operation immediately before `anchor`
    pub fn insert_op_before(
        &mut self,
        anchor: OpId,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: Vec<TensorType>,
        region: Option<Region>,
    ) -> CompileResult<OpId> {
        let position = self.position(anchor)?;
        let id = self.create_op(kind, operands, result_types, region);
        self.order.insert(position, id);
        Ok(id)
    }

    fn create_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_types: Vec<TensorType>,
        region: Option<Region>,
    ) -> OpId {
        let id = OpId(self.ops.len());
        let results = result_types
            .into_iter()
            .enumerate()
            .map(|(index, ty)| self.new_value(ty, ValueDef::Result { op: id, index }))
            .collect();
        self.ops.push(Some(Operation {
            kind,
            operands,
            results,
            region,
        }));
        id
    }

    fn position(&self, id: OpId) -> CompileResult<usize> {
        self.order
            .iter()
            .position(|&op| op == id)
            .ok_or_else(|| {
                CompileError::internal(format!("operation #{} is not in the region", id.0))
            })
    }

    /// Remove an operation whose results are no longer used
    pub fn erase_op(&mut self, id: OpId) -> CompileResult<Operation> {
        let position = self.position(id)?;
        let op = self.op(id)?;
        if let Some(&used) = op.results.iter().find(|&&r| self.has_uses(r)) {
            return Err(CompileError::internal(format!(
                "cannot erase {}: result %{} is still used",
                op.kind.name(),
                used.0
            )));
        }
        self.order.remove(position);
        self.ops[id.0]
            .take()
            .ok_or_else(|| CompileError::internal(format!("operation #{} already erased", id.0)))
    }

    pub fn op(&self, id: OpId) -> CompileResult<&Operation> {
        self.ops
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| CompileError::internal(format!("operation #{} was erased", id.0)))
    }

    pub fn op_mut(&mut self, id: OpId) -> CompileResult<&mut Operation> {
        self.ops
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| CompileError::internal(format!("operation #{} was erased", id.0)))
    }

    /// Live operation behind an id taken from `order`
    fn live(&self, id: OpId) -> Option<&Operation> {
        self.ops.get(id.0).and_then(Option::as_ref)
    }

    /// Operation ids in program order
    pub fn op_ids(&self) -> Vec<OpId> {
        self.order.clone()
    }

    /// Operations in program order
    pub fn ops(&self) -> impl Iterator<Item = (OpId, &Operation)> + '_ {
        self.order
            .iter()
            .filter_map(move |&id| self.live(id).map(|op| (id, op)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The last operation, if it is a terminator
    pub fn terminator(&self) -> Option<OpId> {
        self.order
            .last()
            .copied()
            .filter(|&id| self.live(id).is_some_and(|op| op.kind.is_terminator()))
    }

    pub fn has_uses(&self, value: ValueId) -> bool {
        self.ops().any(|(_, op)| op.operands.contains(&value))
    }
}

// Functions and modules

/// A named function: signature plus body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub signature: FunctionType,
    pub body: Region,
}

impl Function {
    pub fn new(name: impl Into<String>, body: Region) -> Self {
        Self {
            name: name.into(),
            signature: FunctionType::default(),
            body,
        }
    }

    /// Operands of the function's `Return`, if it has one
    pub fn returned_values(&self) -> Option<&[ValueId]> {
        self.body
            .terminator()
            .and_then(|id| self.body.op(id).ok())
            .filter(|op| op.kind == OpKind::Return)
            .map(|op| op.operands.as_slice())
    }
}

/// A compilation unit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Module {
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// Textual dump

fn value_name(depth: usize, id: ValueId) -> String {
    if depth == 0 {
        format!("%{}", id.0)
    } else {
        format!("%{}_{}", depth, id.0)
    }
}

fn write_region(f: &mut fmt::Formatter<'_>, region: &Region, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth + 1);
    for (_, op) in region.ops() {
        write!(f, "{}", indent)?;
        if !op.results.is_empty() {
            let results: Vec<String> = op.results.iter().map(|&r| value_name(depth, r)).collect();
            write!(f, "{} = ", results.join(", "))?;
        }
        write!(f, "{}", op.kind.name())?;
        match &op.kind {
            OpKind::Constant(value) => write!(f, " {:?}", value)?,
            OpKind::ShapedReduce { dimensions } => write!(f, " dims = {:?}", dimensions)?,
            _ => {}
        }
        if !op.operands.is_empty() {
            let operands: Vec<String> = op.operands.iter().map(|&v| value_name(depth, v)).collect();
            write!(f, " {}", operands.join(", "))?;
        }
        if let Some(inner) = &op.region {
            let params: Vec<String> = inner
                .params()
                .iter()
                .map(|&p| format!("{}: {}", value_name(depth + 1, p), inner.value_type(p)))
                .collect();
            writeln!(f, " ({}) {{", params.join(", "))?;
            write_region(f, inner, depth + 1)?;
            write!(f, "{}}}", indent)?;
        }
        if !op.results.is_empty() {
            let types: Vec<String> = op
                .results
                .iter()
                .map(|&r| region.value_type(r).to_string())
                .collect();
            write!(f, " : {}", types.join(", "))?;
        }
        writeln!(f)?;
    }
    Ok(())
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .body
            .params()
            .iter()
            .map(|&p| format!("{}: {}", value_name(0, p), self.body.value_type(p)))
            .collect();
        let outputs: Vec<String> = self.signature.outputs.iter().map(|t| t.to_string()).collect();
        writeln!(
            f,
            "func @{}({}) -> ({}) {{",
            self.name,
            params.join(", "),
            outputs.join(", ")
        )?;
        write_region(f, &self.body, 0)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {{")?;
        for function in &self.functions {
            write!(f, "{}", function)?;
        }
        writeln!(f, "}}")
    }
}
