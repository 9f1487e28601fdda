//! Graph builder
//!
//! Replays each function's words against an explicit value stack to build a
//! single-assignment operation graph. Words on a line are replayed right to
//! left. Whenever an operation needs more values than the stack holds, the
//! missing ones become new leading parameters of the region being built.

use tracing::{debug, instrument, trace};

use crate::ast::{BindingItem, Item, Items, Modified, Number, Primitive, Spanned, Word};
use crate::error::{CompileError, CompileResult};
use crate::ir::{
    ElementKind, Function, FunctionType, Module, OpKind, Region, TensorType, ValueId,
};
use crate::primitive::{PrimitiveClass, PrimitiveSpelling};

/// Name given to the function built from anonymous top-level code
pub const ENTRY_FUNCTION: &str = "main";

/// Build a module, naming the entry function [`ENTRY_FUNCTION`]
pub fn build_module(items: &Items) -> CompileResult<Module> {
    ModuleBuilder::new(ENTRY_FUNCTION).build(items)
}

/// Source op for a pointwise primitive
fn pervasive_op(spelling: PrimitiveSpelling) -> CompileResult<OpKind> {
    match spelling {
        PrimitiveSpelling::Add => Ok(OpKind::Add),
        PrimitiveSpelling::Multiply => Ok(OpKind::Multiply),
        other => Err(CompileError::arity(format!(
            "'{}' is not a pointwise primitive",
            other.name()
        ))),
    }
}

/// Source op for an aggregating modifier
fn modifier_op(spelling: PrimitiveSpelling) -> CompileResult<OpKind> {
    match spelling {
        PrimitiveSpelling::Reduce => Ok(OpKind::Reduce),
        other => Err(CompileError::arity(format!(
            "'{}' is not a modifier",
            other.name()
        ))),
    }
}

/// Builds one region from words, tracking the value stack
struct RegionBuilder {
    region: Region,
    stack: Vec<ValueId>,
    element: ElementKind,
}

impl RegionBuilder {
    fn new() -> Self {
        Self {
            region: Region::new(),
            stack: Vec::new(),
            element: ElementKind::F64,
        }
    }

    fn unranked(&self) -> TensorType {
        TensorType::unranked(self.element)
    }

    /// Pop `num` values, synthesizing leading parameters for any shortfall
    fn pop_args(&mut self, num: usize) -> Vec<ValueId> {
        let split = self.stack.len().saturating_sub(num);
        let popped = self.stack.split_off(split);
        if popped.len() == num {
            return popped;
        }

        let missing = num - popped.len();
        let mut args: Vec<ValueId> = (0..missing)
            .map(|_| {
                let ty = self.unranked();
                self.region.insert_param(0, ty)
            })
            .collect();
        args.reverse();
        trace!(missing, params = self.region.params().len(), "synthesized parameters");

        args.extend(popped);
        args
    }

    fn build_word_line(&mut self, line: &[Spanned<Word>]) -> CompileResult<()> {
        for word in line.iter().rev() {
            self.build_word(word)?;
        }
        Ok(())
    }

    fn build_word(&mut self, word: &Spanned<Word>) -> CompileResult<()> {
        match &word.value {
            Word::Number(number) => self.build_number(number),
            Word::Array(_) => Err(CompileError::unsupported(format!(
                "array literal at {}",
                word.span
            ))),
            Word::Func(func) => {
                for line in &func.lines {
                    self.build_word_line(line)?;
                }
                Ok(())
            }
            Word::Comment(_) | Word::Spaces => Ok(()),
            Word::Primitive(primitive) => self.build_primitive(primitive),
            Word::Modified(modified) => self.build_modified(modified),
        }
    }

    fn build_number(&mut self, number: &Number) -> CompileResult<()> {
        let ty = TensorType::scalar(self.element);
        let op = self
            .region
            .push_op(OpKind::Constant(number.value), vec![], vec![ty], None);
        self.stack.extend(self.region.op(op)?.results.iter().copied());
        Ok(())
    }

    fn build_primitive(&mut self, primitive: &Primitive) -> CompileResult<()> {
        let spelling = primitive.spelling;
        let operands = self.pop_args(spelling.num_inputs());

        match spelling.class() {
            PrimitiveClass::Identity => {
                self.stack.extend(operands);
            }
            PrimitiveClass::Duplicate => {
                self.stack.extend(operands.iter().copied());
                self.stack.extend(operands);
            }
            PrimitiveClass::DyadicPervasive => {
                let kind = pervasive_op(spelling)?;
                let result_types = vec![self.unranked(); spelling.num_outputs()];
                let op = self.region.push_op(kind, operands, result_types, None);
                self.stack.extend(self.region.op(op)?.results.iter().copied());
            }
            PrimitiveClass::AggregatingModifier => {
                return Err(CompileError::arity(format!(
                    "modifier '{}' used without an operand",
                    spelling.name()
                )));
            }
        }
        Ok(())
    }

    fn build_modified(&mut self, modified: &Modified) -> CompileResult<()> {
        let spelling = modified.modifier.value.spelling;
        let kind = modifier_op(spelling)?;
        let operands = self.pop_args(spelling.num_inputs());

        let mut inner = RegionBuilder::new();
        inner.build_word_line(&modified.operands)?;
        let body = inner.finish(OpKind::Yield);

        let yielded = body
            .terminator()
            .and_then(|id| body.op(id).ok())
            .map(|op| op.operands.len())
            .unwrap_or(0);
        if body.params().len() != 2 || yielded != 1 {
            return Err(CompileError::arity(format!(
                "fold body at {} must take 2 values and produce 1, got {} and {}",
                modified.modifier.span,
                body.params().len(),
                yielded
            )));
        }

        let result_types = vec![self.unranked(); spelling.num_outputs()];
        let op = self.region.push_op(kind, operands, result_types, Some(body));
        self.stack.extend(self.region.op(op)?.results.iter().copied());
        Ok(())
    }

    /// Terminate the region with the stack contents
    fn finish(mut self, terminator: OpKind) -> Region {
        let results = std::mem::take(&mut self.stack);
        self.region.push_op(terminator, results, vec![], None);
        self.region
    }

    fn finish_function(self, name: &str) -> Function {
        let inputs = self
            .region
            .params()
            .iter()
            .map(|&p| self.region.value_type(p).clone())
            .collect();
        let outputs = self
            .stack
            .iter()
            .map(|&v| self.region.value_type(v).clone())
            .collect();

        let mut function = Function::new(name, self.finish(OpKind::Return));
        function.signature = FunctionType { inputs, outputs };
        debug!(
            function = name,
            params = function.signature.inputs.len(),
            results = function.signature.outputs.len(),
            ops = function.body.len(),
            "built function"
        );
        function
    }
}

/// Builds a module from top-level items
pub struct ModuleBuilder {
    module: Module,
    entry_name: String,
    entry: Option<RegionBuilder>,
}

impl ModuleBuilder {
    pub fn new(entry_name: impl Into<String>) -> Self {
        Self {
            module: Module::new(),
            entry_name: entry_name.into(),
            entry: None,
        }
    }

    #[instrument(skip_all, fields(items = items.len()))]
    pub fn build(mut self, items: &Items) -> CompileResult<Module> {
        for item in items.iter() {
            self.build_item(item)?;
        }

        // anonymous code of the whole unit goes into one function, placed last
        if let Some(entry) = self.entry.take() {
            let function = entry.finish_function(&self.entry_name);
            self.add_function(function)?;
        }
        Ok(self.module)
    }

    fn build_item(&mut self, item: &Item) -> CompileResult<()> {
        match item {
            Item::Words(words) => {
                let entry = self.entry.get_or_insert_with(RegionBuilder::new);
                for line in &words.lines {
                    entry.build_word_line(line)?;
                }
                Ok(())
            }
            Item::Binding(binding) => self.build_binding(binding),
        }
    }

    fn build_binding(&mut self, binding: &BindingItem) -> CompileResult<()> {
        let mut builder = RegionBuilder::new();
        builder.build_word_line(&binding.words)?;
        let function = builder.finish_function(&binding.name.value);
        self.add_function(function)
    }

    fn add_function(&mut self, function: Function) -> CompileResult<()> {
        if self.module.function(&function.name).is_some() {
            return Err(CompileError::unsupported(format!(
                "redefinition of function '{}'",
                function.name
            )));
        }
        self.module.functions.push(function);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Shape;
    use crate::parser::parse;

    fn build(source: &str) -> Module {
        build_module(&parse(source).unwrap()).unwrap()
    }

    fn kinds(region: &Region) -> Vec<OpKind> {
        region.ops().map(|(_, op)| op.kind.clone()).collect()
    }

    #[test]
    fn test_add_synthesizes_two_params() {
        let module = build("+");
        let main = module.function("main").unwrap();
        let params = main.body.params().to_vec();

        assert_eq!(params.len(), 2);
        assert_eq!(kinds(&main.body), vec![OpKind::Add, OpKind::Return]);

        let (add_id, add) = main.body.ops().next().unwrap();
        assert_eq!(add.operands, params);
        let add_results = &main.body.op(add_id).unwrap().results;
        assert_eq!(main.returned_values().unwrap(), &add_results[..]);
        assert_eq!(main.signature.inputs.len(), 2);
        assert_eq!(main.signature.outputs.len(), 1);
    }

    #[test]
    fn test_duplicate_reuses_one_param() {
        let module = build("+.");
        let main = module.function("main").unwrap();
        let p = main.body.params()[0];
        assert_eq!(main.body.params().len(), 1);
        let (_, add) = main.body.ops().next().unwrap();
        assert_eq!(add.operands, vec![p, p]);
    }

    #[test]
    fn test_identity_emits_nothing() {
        let module = build("∘");
        let main = module.function("main").unwrap();
        assert_eq!(kinds(&main.body), vec![OpKind::Return]);
        assert_eq!(main.returned_values().unwrap(), main.body.params());
    }

    #[test]
    fn test_constant_fills_part_of_deficit() {
        let module = build("+ 1");
        let main = module.function("main").unwrap();
        assert_eq!(main.body.params().len(), 1);

        let ops: Vec<_> = main.body.ops().collect();
        assert_eq!(ops[0].1.kind, OpKind::Constant(1.0));
        let constant = ops[0].1.results[0];
        assert_eq!(main.body.value_type(constant).shape, Shape::scalar());
        // synthesized argument first, then what was on the stack
        assert_eq!(ops[1].1.operands, vec![main.body.params()[0], constant]);
    }

    #[test]
    fn test_fully_supplied_has_no_params() {
        let module = build("+ 1 2");
        let main = module.function("main").unwrap();
        assert!(main.body.params().is_empty());
        assert!(main.signature.inputs.is_empty());
    }

    #[test]
    fn test_param_count_is_deficit() {
        // 4 pops, 1 push before the outer add needs it
        let module = build("++");
        let main = module.function("main").unwrap();
        let params = main.body.params().to_vec();
        assert_eq!(params.len(), 3);

        let ops: Vec<_> = main.body.ops().collect();
        // rightmost add consumes the last two parameters
        assert_eq!(ops[0].1.operands, vec![params[1], params[2]]);
        assert_eq!(ops[1].1.operands, vec![params[0], ops[0].1.results[0]]);
    }

    #[test]
    fn test_lines_replay_top_to_bottom() {
        let module = build("1\n+");
        let main = module.function("main").unwrap();
        let ops: Vec<_> = main.body.ops().collect();
        assert_eq!(ops[0].1.kind, OpKind::Constant(1.0));
        assert_eq!(
            ops[1].1.operands,
            vec![main.body.params()[0], ops[0].1.results[0]]
        );
    }

    #[test]
    fn test_reduce_builds_nested_region() {
        let module = build("/+");
        let main = module.function("main").unwrap();
        assert_eq!(main.body.params().len(), 1);
        assert_eq!(kinds(&main.body), vec![OpKind::Reduce, OpKind::Return]);

        let (_, reduce) = main.body.ops().next().unwrap();
        assert_eq!(reduce.operands, main.body.params());
        let body = reduce.region.as_ref().unwrap();
        assert_eq!(body.params().len(), 2);
        assert_eq!(kinds(body), vec![OpKind::Add, OpKind::Yield]);
    }

    #[test]
    fn test_reduce_body_arity_is_checked() {
        let err = build_module(&parse("/∘").unwrap()).unwrap_err();
        assert!(matches!(err, CompileError::ArityError { .. }));
    }

    #[test]
    fn test_func_literal_is_inlined() {
        let module = build("(+ 1) 2");
        let main = module.function("main").unwrap();
        assert!(main.body.params().is_empty());
        assert_eq!(
            kinds(&main.body),
            vec![
                OpKind::Constant(2.0),
                OpKind::Constant(1.0),
                OpKind::Add,
                OpKind::Return
            ]
        );
    }

    #[test]
    fn test_array_is_unsupported() {
        let err = build_module(&parse("[1 2]").unwrap()).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }));
    }

    #[test]
    fn test_bindings_become_functions() {
        let module = build("Sum ← /+\nTwice ← +.\n1");
        let names: Vec<_> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Sum", "Twice", "main"]);
        assert_eq!(module.function("Twice").unwrap().body.params().len(), 1);
        assert!(module.function("main").unwrap().body.params().is_empty());
    }

    #[test]
    fn test_redefinition_is_unsupported() {
        let err = build_module(&parse("F ← +\nF ← ×").unwrap()).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { .. }));
    }
}
