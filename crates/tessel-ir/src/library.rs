//! ShaderIrLibrary - owner of one compiled shader module
//!
//! Every other structure in the pipeline holds ids into a library and never
//! owns nodes itself. During translation a library is only ever read.

use crate::function::IrFunction;
use crate::node::{
    ConstantId, EntryPoint, ExtensionImport, FunctionId, ImportId, IrConstant, NodeRef, TypeId, Variable, VariableId,
};
use crate::types::IrType;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessel_error::{Diagnostic, ErrorCode};
use thiserror::Error;

/// Consistency errors raised when looking nodes up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("unknown {0}")]
    UnknownNode(NodeRef),

    #[error("no entry point named `{0}`")]
    MissingEntryPoint(String),

    #[error("malformed type `{name}`: {reason}")]
    MalformedType { name: String, reason: String },

    #[error("no intrinsic type named `{0}`")]
    UnknownIntrinsic(String),
}

impl IrError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IrError::UnknownNode(_) | IrError::UnknownIntrinsic(_) => ErrorCode::UNKNOWN_NODE,
            IrError::MissingEntryPoint(_) => ErrorCode::MISSING_ENTRY_POINT,
            IrError::MalformedType { .. } => ErrorCode::MALFORMED_TYPE,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.to_string()).with_code(self.code())
    }
}

/// All IR nodes of one compiled shader module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderIrLibrary {
    pub name: String,
    #[serde(default)]
    types: Vec<IrType>,
    #[serde(default)]
    constants: Vec<IrConstant>,
    #[serde(default)]
    variables: Vec<Variable>,
    #[serde(default)]
    functions: Vec<IrFunction>,
    #[serde(default)]
    imports: Vec<ExtensionImport>,
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
}

impl ShaderIrLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // ===== construction =====

    pub fn add_type(&mut self, ty: IrType) -> TypeId {
        self.types.push(ty);
        TypeId(self.types.len() as u32 - 1)
    }

    /// Returns the id of a structurally identical type, adding it if absent
    pub fn intern_type(&mut self, ty: IrType) -> TypeId {
        match self.types.iter().position(|t| t.name == ty.name && t.kind == ty.kind) {
            Some(index) => TypeId(index as u32),
            None => self.add_type(ty),
        }
    }

    pub fn add_constant(&mut self, constant: IrConstant) -> ConstantId {
        self.constants.push(constant);
        ConstantId(self.constants.len() as u32 - 1)
    }

    pub fn add_variable(&mut self, variable: Variable) -> VariableId {
        self.variables.push(variable);
        VariableId(self.variables.len() as u32 - 1)
    }

    pub fn add_function(&mut self, function: IrFunction) -> FunctionId {
        self.functions.push(function);
        FunctionId(self.functions.len() as u32 - 1)
    }

    /// Replaces a previously declared function (used for forward declarations)
    pub fn define_function(&mut self, id: FunctionId, function: IrFunction) -> Result<(), IrError> {
        let slot = self
            .functions
            .get_mut(id.index())
            .ok_or(IrError::UnknownNode(NodeRef::Function(id)))?;
        *slot = function;
        Ok(())
    }

    pub fn add_import(&mut self, import: ExtensionImport) -> ImportId {
        if let Some(index) = self.imports.iter().position(|i| i.name == import.name) {
            return ImportId(index as u32);
        }
        self.imports.push(import);
        ImportId(self.imports.len() as u32 - 1)
    }

    pub fn add_entry_point(&mut self, entry_point: EntryPoint) {
        self.entry_points.push(entry_point);
    }

    // ===== lookup =====

    pub fn ty(&self, id: TypeId) -> Result<&IrType, IrError> {
        self.types.get(id.index()).ok_or(IrError::UnknownNode(NodeRef::Type(id)))
    }

    pub fn constant(&self, id: ConstantId) -> Result<&IrConstant, IrError> {
        self.constants
            .get(id.index())
            .ok_or(IrError::UnknownNode(NodeRef::Constant(id)))
    }

    pub fn variable(&self, id: VariableId) -> Result<&Variable, IrError> {
        self.variables
            .get(id.index())
            .ok_or(IrError::UnknownNode(NodeRef::Variable(id)))
    }

    pub fn function(&self, id: FunctionId) -> Result<&IrFunction, IrError> {
        self.functions
            .get(id.index())
            .ok_or(IrError::UnknownNode(NodeRef::Function(id)))
    }

    pub fn import(&self, id: ImportId) -> Result<&ExtensionImport, IrError> {
        self.imports.get(id.index()).ok_or(IrError::UnknownNode(NodeRef::Import(id)))
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        match node {
            NodeRef::Type(id) => id.index() < self.types.len(),
            NodeRef::Constant(id) => id.index() < self.constants.len(),
            NodeRef::Variable(id) => id.index() < self.variables.len(),
            NodeRef::Function(id) => id.index() < self.functions.len(),
            NodeRef::Import(id) => id.index() < self.imports.len(),
        }
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeId, &IrType)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn constants(&self) -> impl Iterator<Item = (ConstantId, &IrConstant)> {
        self.constants.iter().enumerate().map(|(i, c)| (ConstantId(i as u32), c))
    }

    pub fn variables(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables.iter().enumerate().map(|(i, v)| (VariableId(i as u32), v))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &IrFunction)> {
        self.functions.iter().enumerate().map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn imports(&self) -> impl Iterator<Item = (ImportId, &ExtensionImport)> {
        self.imports.iter().enumerate().map(|(i, x)| (ImportId(i as u32), x))
    }

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types().find(|(_, t)| t.name == name).map(|(id, _)| id)
    }

    pub fn find_variable(&self, name: &str) -> Option<VariableId> {
        self.variables().find(|(_, v)| v.name == name).map(|(id, _)| id)
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.functions().find(|(_, f)| f.name == name).map(|(id, _)| id)
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn entry_point(&self, name: &str) -> Result<&EntryPoint, IrError> {
        self.entry_points
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| IrError::MissingEntryPoint(name.to_string()))
    }

    // ===== rewriting =====

    pub fn functions_mut(&mut self) -> impl Iterator<Item = (FunctionId, &mut IrFunction)> {
        self.functions
            .iter_mut()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn constants_mut(&mut self) -> impl Iterator<Item = (ConstantId, &mut IrConstant)> {
        self.constants
            .iter_mut()
            .enumerate()
            .map(|(i, c)| (ConstantId(i as u32), c))
    }

    pub fn variable_mut(&mut self, id: VariableId) -> Result<&mut Variable, IrError> {
        self.variables
            .get_mut(id.index())
            .ok_or(IrError::UnknownNode(NodeRef::Variable(id)))
    }

    pub fn node_count(&self) -> usize {
        self.types.len() + self.constants.len() + self.variables.len() + self.functions.len() + self.imports.len()
    }
}

impl fmt::Display for ShaderIrLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; Library: {}", self.name)?;

        for entry in &self.entry_points {
            writeln!(f, "; entry {} {} -> {}", entry.stage, entry.name, entry.function)?;
        }
        for (id, import) in self.imports() {
            writeln!(f, "{} = import \"{}\"", id, import.name)?;
        }
        if !self.types.is_empty() {
            writeln!(f)?;
        }
        for (id, ty) in self.types() {
            writeln!(f, "{} = type {}", id, ty)?;
        }
        for (id, constant) in self.constants() {
            write!(f, "{} = constant {} {}", id, constant.ty, constant.value)?;
            if !constant.name.is_empty() {
                write!(f, " \"{}\"", constant.name)?;
            }
            writeln!(f)?;
        }
        for (id, var) in self.variables() {
            write!(f, "{} = variable {} {} \"{}\"", id, var.storage_class, var.ty, var.name)?;
            if let Some(init) = var.initializer {
                write!(f, " init {}", init)?;
            }
            let d = &var.decorations;
            if let Some(set) = d.descriptor_set {
                write!(f, " set={}", set)?;
            }
            if let Some(binding) = d.binding {
                write!(f, " binding={}", binding)?;
            }
            if let Some(location) = d.location {
                write!(f, " location={}", location)?;
            }
            if let Some(built_in) = d.built_in {
                write!(f, " builtin={:?}", built_in)?;
            }
            writeln!(f)?;
        }
        for (id, function) in self.functions() {
            writeln!(f)?;
            write!(f, "{}: {}", id, function)?;
        }
        Ok(())
    }
}
