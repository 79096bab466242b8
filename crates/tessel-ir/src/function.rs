//! Functions and basic blocks

use crate::instruction::{IrOp, OpKind, Operand};
use crate::node::{BlockId, ConstantId, TypeId, ValueId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessel_error::Span;

/// A function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub id: ValueId,
    pub name: String,
    pub ty: TypeId,
}

/// A function-local variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVariable {
    pub id: ValueId,
    pub name: String,
    /// Type of the stored value
    pub ty: TypeId,
    #[serde(default)]
    pub initializer: Option<ConstantId>,
}

/// A labeled sequence of ops ending in a terminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub ops: Vec<IrOp>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            ops: Vec::new(),
        }
    }

    pub fn terminator(&self) -> Option<&IrOp> {
        self.ops.last().filter(|op| op.kind.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    /// The merge instruction heading this block's terminator, if any
    pub fn merge(&self) -> Option<&IrOp> {
        self.terminator()?;
        let len = self.ops.len();
        if len < 2 {
            return None;
        }
        Some(&self.ops[len - 2]).filter(|op| op.kind.is_merge())
    }
}

/// Function in IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: String,
    /// `TypeKind::Function` node describing the signature
    pub function_type: TypeId,
    pub return_type: TypeId,
    #[serde(default)]
    pub params: Vec<FunctionParam>,
    #[serde(default)]
    pub locals: Vec<LocalVariable>,
    /// Empty for declarations
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
    #[serde(default)]
    pub source: Option<Span>,
}

impl IrFunction {
    /// A function with no body
    pub fn declaration(name: impl Into<String>, function_type: TypeId, return_type: TypeId) -> Self {
        Self {
            name: name.into(),
            function_type,
            return_type,
            params: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
            source: None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn ops(&self) -> impl Iterator<Item = &IrOp> {
        self.blocks.iter().flat_map(|b| b.ops.iter())
    }

    /// Type of every value defined in this function
    pub fn value_types(&self) -> FxHashMap<ValueId, TypeId> {
        let mut types = FxHashMap::default();
        for param in &self.params {
            types.insert(param.id, param.ty);
        }
        for local in &self.locals {
            types.insert(local.id, local.ty);
        }
        for op in self.ops() {
            if let (Some(result), Some(ty)) = (op.result, op.result_type) {
                types.insert(result, ty);
            }
        }
        types
    }

    /// One past the highest value id in use
    pub fn value_bound(&self) -> u32 {
        let params = self.params.iter().map(|p| p.id.0);
        let locals = self.locals.iter().map(|l| l.id.0);
        let results = self.ops().filter_map(|op| op.result.map(|r| r.0));
        params.chain(locals).chain(results).max().map_or(0, |m| m + 1)
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {} {}(", self.return_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}: {}", param.id, param.name, param.ty)?;
        }
        write!(f, ")")?;

        if self.is_declaration() {
            return writeln!(f, ";");
        }
        writeln!(f, " {{")?;
        for local in &self.locals {
            write!(f, "  local {} {}: {}", local.id, local.name, local.ty)?;
            if let Some(init) = local.initializer {
                write!(f, " = {}", init)?;
            }
            writeln!(f)?;
        }
        for block in &self.blocks {
            writeln!(f, "{} ({}):", block.id, block.label)?;
            for op in &block.ops {
                writeln!(f, "    {}", op)?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Incrementally builds an [`IrFunction`]
///
/// ```rust
/// use tessel_ir::{FunctionBuilder, OpKind, Operand, TypeId};
///
/// let mut builder = FunctionBuilder::new("Main", TypeId(1), TypeId(0));
/// builder.emit_void(OpKind::Return, vec![]);
/// let function = builder.finish();
/// assert_eq!(function.blocks.len(), 1);
/// ```
#[derive(Debug)]
pub struct FunctionBuilder {
    function: IrFunction,
    next_value: u32,
    next_block: u32,
    current: usize,
}

impl FunctionBuilder {
    /// Starts a function with an `entry` block
    pub fn new(name: impl Into<String>, function_type: TypeId, return_type: TypeId) -> Self {
        let mut builder = Self {
            function: IrFunction::declaration(name, function_type, return_type),
            next_value: 0,
            next_block: 0,
            current: 0,
        };
        let entry = builder.new_block_id();
        builder.function.blocks.push(BasicBlock::new(entry, "entry"));
        builder
    }

    pub fn with_source(mut self, span: Span) -> Self {
        self.function.source = Some(span);
        self
    }

    /// Allocates a fresh SSA value id
    pub fn new_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn new_block_id(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn param(&mut self, name: impl Into<String>, ty: TypeId) -> ValueId {
        let id = self.new_value();
        self.function.params.push(FunctionParam { id, name: name.into(), ty });
        id
    }

    pub fn local(&mut self, name: impl Into<String>, ty: TypeId) -> ValueId {
        let id = self.new_value();
        self.function.locals.push(LocalVariable {
            id,
            name: name.into(),
            ty,
            initializer: None,
        });
        id
    }

    /// Appends a new block without switching to it
    pub fn block(&mut self, label: impl Into<String>) -> BlockId {
        let id = self.new_block_id();
        self.function.blocks.push(BasicBlock::new(id, label));
        id
    }

    pub fn entry(&self) -> BlockId {
        self.function.blocks[0].id
    }

    /// Subsequent ops are appended to `block`
    pub fn switch_to(&mut self, block: BlockId) {
        if let Some(index) = self.function.blocks.iter().position(|b| b.id == block) {
            self.current = index;
        }
    }

    pub fn push(&mut self, op: IrOp) {
        self.function.blocks[self.current].ops.push(op);
    }

    /// Emits an op with a result and returns the result id
    pub fn emit(&mut self, kind: OpKind, result_type: TypeId, operands: Vec<Operand>) -> ValueId {
        let result = self.new_value();
        self.push(IrOp::new(kind, operands).with_result(result, result_type));
        result
    }

    /// Emits an op without a result
    pub fn emit_void(&mut self, kind: OpKind, operands: Vec<Operand>) {
        self.push(IrOp::new(kind, operands));
    }

    pub fn finish(self) -> IrFunction {
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::BinaryOp;
    use crate::node::VariableId;

    #[test]
    fn test_builder_allocates_unique_values() {
        let mut builder = FunctionBuilder::new("Scale", TypeId(3), TypeId(1));
        let x = builder.param("x", TypeId(1));
        let tmp = builder.local("tmp", TypeId(1));
        let doubled = builder.emit(
            OpKind::Binary(BinaryOp::Add),
            TypeId(1),
            vec![Operand::Value(x), Operand::Value(x)],
        );
        builder.emit_void(OpKind::Store, vec![Operand::Value(tmp), Operand::Value(doubled)]);
        builder.emit_void(OpKind::ReturnValue, vec![Operand::Value(doubled)]);
        let function = builder.finish();

        assert_eq!((x, tmp, doubled), (ValueId(0), ValueId(1), ValueId(2)));
        assert_eq!(function.value_bound(), 3);
        assert_eq!(function.value_types().get(&doubled), Some(&TypeId(1)));
        assert!(function.blocks[0].is_terminated());
    }

    #[test]
    fn test_merge_lookup() {
        let mut builder = FunctionBuilder::new("Branchy", TypeId(2), TypeId(0));
        let then_block = builder.block("then");
        let merge_block = builder.block("merge");
        builder.emit_void(OpKind::SelectionMerge, vec![Operand::Block(merge_block)]);
        builder.emit_void(
            OpKind::BranchConditional,
            vec![
                Operand::Constant(ConstantId(0)),
                Operand::Block(then_block),
                Operand::Block(merge_block),
            ],
        );
        let function = builder.finish();

        let entry = &function.blocks[0];
        assert_eq!(entry.merge().map(|m| m.kind), Some(OpKind::SelectionMerge));
        assert!(function.block(then_block).is_some_and(|b| !b.is_terminated()));
    }

    #[test]
    fn test_merge_needs_a_terminator() {
        let mut builder = FunctionBuilder::new("Dangling", TypeId(2), TypeId(0));
        let merge_block = builder.block("merge");
        builder.emit_void(OpKind::SelectionMerge, vec![Operand::Block(merge_block)]);
        builder.emit_void(
            OpKind::Store,
            vec![Operand::Variable(VariableId(0)), Operand::Constant(ConstantId(0))],
        );
        let function = builder.finish();

        let entry = &function.blocks[0];
        assert!(!entry.is_terminated());
        assert_eq!(entry.merge(), None);
    }

    #[test]
    fn test_declaration_has_no_blocks() {
        let decl = IrFunction::declaration("External", TypeId(1), TypeId(0));
        assert!(decl.is_declaration());
        assert_eq!(decl.to_string(), "function %t0 External();\n");
    }
}
