//! Dependency collector
//!
//! Walks the IR graph from one or more roots and records every type,
//! constant, global, function and extension import the roots need, in an
//! order where each node follows everything it depends on. Backends emit
//! declarations in exactly this order.
//!
//! Module-scope variables with a global storage class are registered as soon
//! as any op references them, together with their initializer function, which
//! lands in a separate "run before main" list. Every underlying set reports
//! whether an insertion was new, so revisiting a node through a second path
//! has no further effect.

use crate::capabilities::{self, Capability};
use crate::ordered_set::OrderedSet;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tessel_error::{Diagnostic, ErrorCode};
use tessel_ir::{
    BasicBlock, ConstantId, ConstantValue, EntryPoint, FunctionId, ImportId, IrFunction, IrOp, NodeRef, Operand,
    ShaderIrLibrary, TypeId, VariableId,
};
use thiserror::Error;
use tracing::{debug, trace};

/// Collection failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    /// An id that is not present in the library
    #[error("unresolved dependency: {node} (referenced from {context})")]
    UnresolvedNode { node: NodeRef, context: String },
}

impl CollectError {
    pub fn node(&self) -> NodeRef {
        match self {
            CollectError::UnresolvedNode { node, .. } => *node,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.to_string())
            .with_code(ErrorCode::UNRESOLVED_DEPENDENCY)
            .with_note("the shader library is internally inconsistent; rebuild it from source")
    }
}

/// Result of a collection, owned and detached from the collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCollection {
    /// Every collected node, dependencies first
    pub order: Vec<NodeRef>,
    pub types: Vec<TypeId>,
    pub constants: Vec<ConstantId>,
    pub globals: Vec<VariableId>,
    pub functions: Vec<FunctionId>,
    pub imports: Vec<ImportId>,
    pub capabilities: Vec<Capability>,
    /// Initializer functions of collected globals, to run before main
    pub global_initializers: Vec<FunctionId>,
}

impl DependencyCollection {
    pub fn contains(&self, node: NodeRef) -> bool {
        self.order.contains(&node)
    }

    pub fn position(&self, node: NodeRef) -> Option<usize> {
        self.order.iter().position(|n| *n == node)
    }

    pub fn requires(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Collects the dependencies of translation roots
pub struct DependencyCollector<'a> {
    library: &'a ShaderIrLibrary,
    visited: FxHashSet<NodeRef>,
    order: OrderedSet<NodeRef>,
    types: OrderedSet<TypeId>,
    constants: OrderedSet<ConstantId>,
    globals: OrderedSet<VariableId>,
    functions: OrderedSet<FunctionId>,
    imports: OrderedSet<ImportId>,
    capabilities: OrderedSet<Capability>,
    global_initializers: OrderedSet<FunctionId>,
    scope: Vec<String>,
}

impl<'a> DependencyCollector<'a> {
    pub fn new(library: &'a ShaderIrLibrary) -> Self {
        let mut capabilities = OrderedSet::new();
        capabilities.insert(Capability::Shader);
        Self {
            library,
            visited: FxHashSet::default(),
            order: OrderedSet::new(),
            types: OrderedSet::new(),
            constants: OrderedSet::new(),
            globals: OrderedSet::new(),
            functions: OrderedSet::new(),
            imports: OrderedSet::new(),
            capabilities,
            global_initializers: OrderedSet::new(),
            scope: Vec::new(),
        }
    }

    fn unresolved(&self, node: NodeRef) -> CollectError {
        let context = match self.scope.last() {
            Some(function) => format!("function `{}`", function),
            None => format!("library `{}`", self.library.name),
        };
        CollectError::UnresolvedNode { node, context }
    }

    /// Marks `node` visited; false if it already was
    fn visit(&mut self, node: NodeRef) -> bool {
        self.visited.insert(node)
    }

    fn emit(&mut self, node: NodeRef) {
        self.order.insert(node);
    }

    fn require(&mut self, capability: Option<Capability>) {
        if let Some(capability) = capability {
            if self.capabilities.insert(capability) {
                trace!(%capability, "capability required");
            }
        }
    }

    /// Collects an entry point: its stage capability and its function
    pub fn collect_entry_point(&mut self, entry: &EntryPoint) -> Result<(), CollectError> {
        debug!(entry = %entry.name, stage = %entry.stage, "collecting entry point");
        self.require(capabilities::stage_capability(entry.stage));
        self.collect_function(entry.function)
    }

    pub fn collect_type(&mut self, id: TypeId) -> Result<(), CollectError> {
        if !self.visit(NodeRef::Type(id)) {
            return Ok(());
        }
        let library = self.library;
        let ty = library.ty(id).map_err(|_| self.unresolved(NodeRef::Type(id)))?;
        for sub in ty.referenced_types() {
            self.collect_type(sub)?;
        }
        self.require(capabilities::type_capability(ty));
        self.types.insert(id);
        self.emit(NodeRef::Type(id));
        Ok(())
    }

    pub fn collect_constant(&mut self, id: ConstantId) -> Result<(), CollectError> {
        if !self.visit(NodeRef::Constant(id)) {
            return Ok(());
        }
        let library = self.library;
        let constant = library
            .constant(id)
            .map_err(|_| self.unresolved(NodeRef::Constant(id)))?;
        self.collect_type(constant.ty)?;
        if let ConstantValue::Composite(parts) = &constant.value {
            for part in parts {
                self.collect_constant(*part)?;
            }
        }
        self.constants.insert(id);
        self.emit(NodeRef::Constant(id));
        Ok(())
    }

    /// Collects a module-scope variable. Global storage registers the
    /// variable and its initializer unconditionally.
    pub fn collect_variable(&mut self, id: VariableId) -> Result<(), CollectError> {
        if !self.visit(NodeRef::Variable(id)) {
            return Ok(());
        }
        let library = self.library;
        let variable = library
            .variable(id)
            .map_err(|_| self.unresolved(NodeRef::Variable(id)))?;
        self.collect_type(variable.ty)?;
        if let Some(built_in) = variable.decorations.built_in {
            self.require(capabilities::built_in_capability(built_in));
        }
        if !variable.is_global() {
            return Ok(());
        }

        self.globals.insert(id);
        self.emit(NodeRef::Variable(id));

        if let Some(initializer) = variable.initializer {
            self.collect_function(initializer)?;
            if self.global_initializers.insert(initializer) {
                trace!(global = %variable.name, %initializer, "global initializer registered");
            }
        }
        Ok(())
    }

    pub fn collect_import(&mut self, id: ImportId) -> Result<(), CollectError> {
        if !self.visit(NodeRef::Import(id)) {
            return Ok(());
        }
        self.library
            .import(id)
            .map_err(|_| self.unresolved(NodeRef::Import(id)))?;
        self.imports.insert(id);
        self.emit(NodeRef::Import(id));
        Ok(())
    }

    /// Collects a function: signature, locals, then every block. Callees are
    /// emitted before their callers. Declarations are recorded after their
    /// signature without further recursion.
    pub fn collect_function(&mut self, id: FunctionId) -> Result<(), CollectError> {
        if !self.visit(NodeRef::Function(id)) {
            return Ok(());
        }
        let library = self.library;
        let function = library
            .function(id)
            .map_err(|_| self.unresolved(NodeRef::Function(id)))?;

        self.scope.push(function.name.clone());
        let result = self.collect_function_body(function);
        self.scope.pop();
        result?;

        self.functions.insert(id);
        self.emit(NodeRef::Function(id));
        Ok(())
    }

    fn collect_function_body(&mut self, function: &'a IrFunction) -> Result<(), CollectError> {
        self.collect_type(function.function_type)?;
        self.collect_type(function.return_type)?;
        for param in &function.params {
            self.collect_type(param.ty)?;
        }
        if function.is_declaration() {
            trace!(function = %function.name, "declaration collected without body");
            return Ok(());
        }
        for local in &function.locals {
            self.collect_type(local.ty)?;
            if let Some(init) = local.initializer {
                self.collect_constant(init)?;
            }
        }
        for block in &function.blocks {
            self.collect_block(block)?;
        }
        Ok(())
    }

    pub fn collect_block(&mut self, block: &BasicBlock) -> Result<(), CollectError> {
        for op in &block.ops {
            self.collect_op(op)?;
        }
        Ok(())
    }

    pub fn collect_op(&mut self, op: &IrOp) -> Result<(), CollectError> {
        self.require(capabilities::op_capability(op.kind));
        if let Some(ty) = op.result_type {
            self.collect_type(ty)?;
        }
        for operand in &op.operands {
            match *operand {
                Operand::Type(id) => self.collect_type(id)?,
                Operand::Constant(id) => self.collect_constant(id)?,
                Operand::Variable(id) => self.collect_variable(id)?,
                Operand::Function(id) => self.collect_function(id)?,
                Operand::Import(id) => self.collect_import(id)?,
                Operand::Value(_) | Operand::Block(_) | Operand::Literal(_) => {}
            }
        }
        Ok(())
    }

    pub fn order(&self) -> &OrderedSet<NodeRef> {
        &self.order
    }

    pub fn referenced_types(&self) -> &OrderedSet<TypeId> {
        &self.types
    }

    pub fn referenced_constants(&self) -> &OrderedSet<ConstantId> {
        &self.constants
    }

    pub fn referenced_globals(&self) -> &OrderedSet<VariableId> {
        &self.globals
    }

    pub fn referenced_functions(&self) -> &OrderedSet<FunctionId> {
        &self.functions
    }

    pub fn referenced_imports(&self) -> &OrderedSet<ImportId> {
        &self.imports
    }

    pub fn capabilities(&self) -> &OrderedSet<Capability> {
        &self.capabilities
    }

    pub fn global_initializers(&self) -> &OrderedSet<FunctionId> {
        &self.global_initializers
    }

    pub fn finish(self) -> DependencyCollection {
        debug!(
            types = self.types.len(),
            constants = self.constants.len(),
            globals = self.globals.len(),
            functions = self.functions.len(),
            "dependency collection finished"
        );
        DependencyCollection {
            order: self.order.into_vec(),
            types: self.types.into_vec(),
            constants: self.constants.into_vec(),
            globals: self.globals.into_vec(),
            functions: self.functions.into_vec(),
            imports: self.imports.into_vec(),
            capabilities: self.capabilities.into_vec(),
            global_initializers: self.global_initializers.into_vec(),
        }
    }
}

/// Collects everything one entry point needs
pub fn collect_entry_point(library: &ShaderIrLibrary, entry: &EntryPoint) -> Result<DependencyCollection, CollectError> {
    let mut collector = DependencyCollector::new(library);
    collector.collect_entry_point(entry)?;
    Ok(collector.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tessel_ir::{
        FunctionBuilder, IntrinsicsLibrary, IrConstant, IrFunction, IrType, OpKind, ShaderStage, StorageClass,
        StructMember, TypeKind, Variable,
    };

    struct Fixture {
        library: ShaderIrLibrary,
        void: TypeId,
        real: TypeId,
        fn_void: TypeId,
    }

    fn fixture() -> Fixture {
        let intrinsics = IntrinsicsLibrary::standard();
        let mut library = ShaderIrLibrary::new("Fixture");
        let void = intrinsics.install(&mut library, "Void").unwrap();
        let real = intrinsics.install(&mut library, "Real").unwrap();
        let fn_void = library.add_type(IrType::new("", TypeKind::Function { ret: void, params: vec![] }));
        Fixture { library, void, real, fn_void }
    }

    #[test]
    fn test_struct_local_orders_types_before_function() {
        let Fixture { mut library, void, real, fn_void } = fixture();
        let pair = library.add_type(IrType::new(
            "Pair",
            TypeKind::Struct {
                members: vec![StructMember::new("a", real), StructMember::new("b", real)],
            },
        ));
        let mut builder = FunctionBuilder::new("Main", fn_void, void);
        builder.local("pair", pair);
        builder.emit_void(OpKind::Return, vec![]);
        let main = library.add_function(builder.finish());

        let mut collector = DependencyCollector::new(&library);
        collector.collect_function(main).unwrap();
        let order: Vec<NodeRef> = collector.order().iter().copied().collect();

        assert_eq!(
            order,
            vec![
                NodeRef::Type(void),
                NodeRef::Type(fn_void),
                NodeRef::Type(real),
                NodeRef::Type(pair),
                NodeRef::Function(main),
            ]
        );
    }

    #[test]
    fn test_global_initializer_registered_once() {
        let Fixture { mut library, void, real, fn_void } = fixture();
        let one = library.add_constant(IrConstant::new(real, ConstantValue::Float(1.0)));
        let init_id = library.add_function(IrFunction::declaration("InitScale", fn_void, void));
        let scale = library.add_variable(Variable::new("Scale", real, StorageClass::Uniform).with_initializer(init_id));

        let mut init = FunctionBuilder::new("InitScale", fn_void, void);
        init.emit_void(OpKind::Store, vec![Operand::Variable(scale), Operand::Constant(one)]);
        init.emit_void(OpKind::Return, vec![]);
        library.define_function(init_id, init.finish()).unwrap();

        let mut main = FunctionBuilder::new("Main", fn_void, void);
        let second = main.block("second");
        main.emit(OpKind::Load, real, vec![Operand::Variable(scale)]);
        main.emit_void(OpKind::Branch, vec![Operand::Block(second)]);
        main.switch_to(second);
        main.emit(OpKind::Load, real, vec![Operand::Variable(scale)]);
        main.emit_void(OpKind::Return, vec![]);
        let main = library.add_function(main.finish());

        let collection = collect_entry_point(&library, &EntryPoint::new("Scaled", ShaderStage::Vertex, main)).unwrap();
        assert_eq!(collection.globals, vec![scale]);
        assert_eq!(collection.global_initializers, vec![init_id]);
        assert_eq!(collection.functions, vec![init_id, main]);
        assert!(collection.position(NodeRef::Variable(scale)) < collection.position(NodeRef::Function(init_id)));
    }

    #[test]
    fn test_recollection_is_idempotent() {
        let Fixture { mut library, void, real, fn_void } = fixture();
        let color = library.add_variable(Variable::new("Color", real, StorageClass::Output));
        let mut builder = FunctionBuilder::new("Main", fn_void, void);
        builder.emit_void(OpKind::Store, vec![Operand::Variable(color), Operand::Variable(color)]);
        builder.emit_void(OpKind::Return, vec![]);
        let main = library.add_function(builder.finish());

        let mut collector = DependencyCollector::new(&library);
        collector.collect_function(main).unwrap();
        let before = collector.order().clone();
        let capabilities_before = collector.capabilities().clone();

        collector.collect_variable(color).unwrap();
        collector.collect_function(main).unwrap();
        collector.collect_type(real).unwrap();

        assert_eq!(collector.order(), &before);
        assert_eq!(collector.capabilities(), &capabilities_before);
        assert!(collector.global_initializers().is_empty());
    }

    #[test]
    fn test_declaration_is_not_an_error() {
        let Fixture { mut library, void, fn_void, .. } = fixture();
        let external = library.add_function(IrFunction::declaration("External", fn_void, void));
        let mut builder = FunctionBuilder::new("Main", fn_void, void);
        builder.emit_void(OpKind::FunctionCall, vec![Operand::Function(external)]);
        builder.emit_void(OpKind::Return, vec![]);
        let main = library.add_function(builder.finish());

        let mut collector = DependencyCollector::new(&library);
        collector.collect_function(main).unwrap();
        assert_eq!(collector.referenced_functions().as_slice(), &[external, main]);
    }

    #[test]
    fn test_unknown_operand_is_hard_failure() {
        let Fixture { mut library, void, fn_void, .. } = fixture();
        let mut builder = FunctionBuilder::new("Broken", fn_void, void);
        builder.emit_void(OpKind::Store, vec![Operand::Variable(VariableId(42))]);
        let broken = library.add_function(builder.finish());

        let error = DependencyCollector::new(&library).collect_function(broken).unwrap_err();
        assert_eq!(error.node(), NodeRef::Variable(VariableId(42)));
        assert!(error.to_string().contains("function `Broken`"));
    }

    #[test]
    fn test_capabilities_from_ops_and_stage() {
        let Fixture { mut library, void, fn_void, .. } = fixture();
        let mut builder = FunctionBuilder::new("Main", fn_void, void);
        builder.emit_void(OpKind::EmitVertex, vec![]);
        builder.emit_void(OpKind::EndPrimitive, vec![]);
        builder.emit_void(OpKind::Return, vec![]);
        let main = library.add_function(builder.finish());

        let collection =
            collect_entry_point(&library, &EntryPoint::new("Geo", ShaderStage::Geometry, main)).unwrap();
        assert_eq!(collection.capabilities, vec![Capability::Shader, Capability::Geometry]);
    }

    #[test]
    fn test_function_storage_variable_is_conditional() {
        let Fixture { mut library, void, real, fn_void } = fixture();
        let scratch = library.add_variable(Variable::new("Scratch", real, StorageClass::Function));
        let mut builder = FunctionBuilder::new("Main", fn_void, void);
        builder.emit(OpKind::Load, real, vec![Operand::Variable(scratch)]);
        builder.emit_void(OpKind::Return, vec![]);
        let main = library.add_function(builder.finish());

        let mut collector = DependencyCollector::new(&library);
        collector.collect_function(main).unwrap();
        assert!(collector.referenced_globals().is_empty());
        assert!(collector.referenced_types().contains(&real));
    }
}
