//! Shared GLSL emission
//!
//! Walks a [`DependencyCollection`] in dependency order and writes the
//! declarations, function bodies and the synthesized `main`. Dialect
//! differences go through the [`GlslTranslator`] hooks.
//!
//! Structured control flow is rebuilt from merge annotations: a
//! selection merge becomes `if`/`else` ending at the merge block, a loop
//! merge becomes `while (true)` with `break` at the merge block and the
//! continue block appended to the body.

use crate::builder::CodeBuilder;
use crate::error::TranslateError;
use crate::names::NameTable;
use crate::translator::{
    CapabilitySupport, CombinedSampler, DeclaredGlobal, GlslOptions, GlslTranslator, InterfaceVariable,
    MainFunction, ShaderTranslation,
};
use crate::types::{NativeTypes, TypeNamer};
use rustc_hash::{FxHashMap, FxHashSet};
use tessel_analysis::{collect_entry_point, DependencyCollection};
use tessel_ir::{
    BasicBlock, BinaryOp, BlockId, BuiltIn, CompareOp, ConstantId, ConstantValue, EntryPoint, FunctionId, IrConstant, IrFunction,
    IrOp, OpKind, Operand, ShaderIrLibrary, ShaderStage, StorageClass, TypeId, TypeKind, ValueId, Variable,
    VariableId,
};
use tracing::{debug, trace};

type Result<T> = std::result::Result<T, TranslateError>;

/// Extended instruction set the translator understands
pub const GLSL_STD_450: &str = "GLSL.std.450";

/// Uniform renamed per stage so linked programs don't see conflicting
/// definitions of it
const MATERIAL: &str = "Material";

const SWIZZLE: [char; 4] = ['x', 'y', 'z', 'w'];

pub fn translate<T: GlslTranslator + ?Sized>(
    dialect: &T,
    library: &ShaderIrLibrary,
    entry: &EntryPoint,
    options: &GlslOptions,
) -> Result<ShaderTranslation> {
    check_stage(dialect, entry.stage)?;
    let collection = collect_entry_point(library, entry)?;
    dialect.build_final_shader(library, entry, &collection, options.range_mappings, options.walk_dependencies)
}

pub fn check_stage<T: GlslTranslator + ?Sized>(dialect: &T, stage: ShaderStage) -> Result<()> {
    if dialect.supports_fragment_type(stage) {
        Ok(())
    } else {
        Err(TranslateError::UnsupportedStage {
            stage,
            dialect: dialect.full_language_string().to_string(),
        })
    }
}

pub fn build_final_shader<T: GlslTranslator + ?Sized>(
    dialect: &T,
    library: &ShaderIrLibrary,
    entry: &EntryPoint,
    collection: &DependencyCollection,
    with_range_mappings: bool,
    walk_dependencies: bool,
) -> Result<ShaderTranslation> {
    check_stage(dialect, entry.stage)?;
    let natives = dialect.native_types();
    let builder = if with_range_mappings {
        CodeBuilder::with_range_mappings(entry.name.clone(), library.function(entry.function)?.source)
    } else {
        CodeBuilder::new()
    };

    let mut emitter = Emitter::new(dialect, library, entry, collection, &natives, builder);
    emitter.emit(walk_dependencies)?;
    let translation = emitter.finish();
    debug!(
        dialect = %translation.dialect,
        entry = %translation.entry,
        bytes = translation.source.len(),
        "GLSL translation finished"
    );
    Ok(translation)
}

/// GLSL.std.450 instruction number to GLSL built-in function
fn glsl_std_450_function(instruction: u32) -> Option<&'static str> {
    Some(match instruction {
        1 => "round",
        2 => "roundEven",
        3 => "trunc",
        4 | 5 => "abs",
        6 | 7 => "sign",
        8 => "floor",
        9 => "ceil",
        10 => "fract",
        11 => "radians",
        12 => "degrees",
        13 => "sin",
        14 => "cos",
        15 => "tan",
        16 => "asin",
        17 => "acos",
        18 => "atan",
        19 => "sinh",
        20 => "cosh",
        21 => "tanh",
        22 => "asinh",
        23 => "acosh",
        24 => "atanh",
        25 => "atan",
        26 => "pow",
        27 => "exp",
        28 => "log",
        29 => "exp2",
        30 => "log2",
        31 => "sqrt",
        32 => "inversesqrt",
        33 => "determinant",
        34 => "inverse",
        35 => "modf",
        37..=39 => "min",
        40..=42 => "max",
        43..=45 => "clamp",
        46 | 47 => "mix",
        48 => "step",
        49 => "smoothstep",
        53 => "ldexp",
        66 => "length",
        67 => "distance",
        68 => "cross",
        69 => "normalize",
        70 => "faceforward",
        71 => "reflect",
        72 => "refract",
        _ => return None,
    })
}

const GLSL_STD_450_FMA: u32 = 50;

fn built_in_name(built_in: BuiltIn, storage: StorageClass, stage: ShaderStage) -> Result<&'static str> {
    Ok(match built_in {
        BuiltIn::Position if storage == StorageClass::Output => "gl_Position",
        BuiltIn::Position => return Err(TranslateError::construct("a position input outside gl_in")),
        BuiltIn::PointSize => "gl_PointSize",
        BuiltIn::ClipDistance => "gl_ClipDistance",
        BuiltIn::CullDistance => "gl_CullDistance",
        BuiltIn::VertexIndex => "gl_VertexID",
        BuiltIn::InstanceIndex => "gl_InstanceID",
        BuiltIn::PrimitiveId if stage == ShaderStage::Geometry && storage == StorageClass::Input => {
            "gl_PrimitiveIDIn"
        }
        BuiltIn::PrimitiveId => "gl_PrimitiveID",
        BuiltIn::InvocationId => "gl_InvocationID",
        BuiltIn::Layer => "gl_Layer",
        BuiltIn::FragCoord => "gl_FragCoord",
        BuiltIn::FrontFacing => "gl_FrontFacing",
        BuiltIn::FragDepth => "gl_FragDepth",
    })
}

fn float_literal(value: f64, width: u32) -> String {
    if value.is_nan() {
        return "(0.0 / 0.0)".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "(1.0 / 0.0)".into() } else { "(-1.0 / 0.0)".into() };
    }
    // Debug keeps a '.' or an exponent, which GLSL needs for a float
    let text = format!("{:?}", value);
    if width == 64 {
        format!("{}lf", text)
    } else {
        text
    }
}

fn bool_type(components: u32) -> String {
    if components == 1 {
        "bool".into()
    } else {
        format!("bvec{}", components)
    }
}

fn unterminated(block: &BasicBlock) -> Result<&IrOp> {
    block
        .terminator()
        .ok_or_else(|| TranslateError::construct(format!("block `{}`, which has no terminator", block.label)))
}

/// GLSL rejects assignment to these
fn is_read_only(storage: StorageClass) -> bool {
    matches!(storage, StorageClass::Uniform | StorageClass::UniformConstant | StorageClass::Input)
}

fn malformed(op: &IrOp) -> TranslateError {
    TranslateError::construct(format!("malformed `{}` op", op.kind))
}

fn block_operand(op: &IrOp, index: usize) -> Result<BlockId> {
    op.operands.get(index).and_then(Operand::as_block).ok_or_else(|| malformed(op))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Bool,
    Int,
    Uint,
    Float,
}

enum Index {
    Literal(u32),
    Dynamic(String),
}

/// What a global turned into
struct Global {
    expr: String,
    /// Component count when declared with an integer stand-in for bool
    bool_substitute: Option<u32>,
}

/// A translated SSA value or pointer
#[derive(Debug, Clone)]
struct Value {
    expr: String,
    ty: TypeId,
    /// Global an opaque value was loaded from
    source: Option<VariableId>,
}

#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    header: BlockId,
    merge: BlockId,
    continue_target: BlockId,
}

struct FunctionScope<'a> {
    function: &'a IrFunction,
    names: NameTable,
    values: FxHashMap<ValueId, Value>,
    visited: FxHashSet<BlockId>,
    loops: Vec<LoopFrame>,
    /// Global each access chain result points into
    roots: FxHashMap<ValueId, VariableId>,
}

struct Prototype {
    id: FunctionId,
    header: String,
    names: NameTable,
    params: Vec<String>,
}

struct Emitter<'a, T: ?Sized> {
    dialect: &'a T,
    library: &'a ShaderIrLibrary,
    entry: &'a EntryPoint,
    collection: &'a DependencyCollection,
    types: TypeNamer<'a>,
    builder: CodeBuilder,
    names: NameTable,
    /// Mangled member names per struct type
    members: FxHashMap<TypeId, Vec<String>>,
    /// Struct types only ever seen as a uniform block
    block_only: FxHashSet<TypeId>,
    constants: FxHashMap<ConstantId, String>,
    globals: FxHashMap<VariableId, Global>,
    functions: FxHashMap<FunctionId, String>,
    combined: Vec<CombinedSampler>,
    /// Separate images and samplers folded into `combined`
    combined_parts: FxHashSet<VariableId>,
    declared: Vec<DeclaredGlobal>,
}

impl<'a, T: GlslTranslator + ?Sized> Emitter<'a, T> {
    fn new(
        dialect: &'a T,
        library: &'a ShaderIrLibrary,
        entry: &'a EntryPoint,
        collection: &'a DependencyCollection,
        natives: &'a NativeTypes,
        builder: CodeBuilder,
    ) -> Self {
        Self {
            dialect,
            library,
            entry,
            collection,
            types: TypeNamer::new(library, natives),
            builder,
            names: NameTable::new(),
            members: FxHashMap::default(),
            block_only: FxHashSet::default(),
            constants: FxHashMap::default(),
            globals: FxHashMap::default(),
            functions: FxHashMap::default(),
            combined: Vec::new(),
            combined_parts: FxHashSet::default(),
            declared: Vec::new(),
        }
    }

    fn dialect_name(&self) -> String {
        self.dialect.full_language_string().to_string()
    }

    fn emit(&mut self, walk_dependencies: bool) -> Result<()> {
        self.emit_header()?;
        self.scan_combined_samplers()?;
        self.block_only = self.block_only_structs()?;
        self.emit_structs()?;
        self.emit_constants()?;
        self.emit_globals()?;
        self.emit_functions(walk_dependencies)?;
        self.emit_main()
    }

    fn finish(self) -> ShaderTranslation {
        let (source, range_mapping) = self.builder.finish();
        ShaderTranslation {
            dialect: self.dialect.full_language_string().to_string(),
            entry: self.entry.name.clone(),
            stage: self.entry.stage,
            source,
            range_mapping,
            globals: self.declared,
            combined_samplers: self.combined,
        }
    }

    // ===== type queries =====

    fn kind(&self, ty: TypeId) -> Result<&'a TypeKind> {
        let library = self.library;
        let ty = self.types.value_type(ty)?;
        Ok(&library.ty(ty)?.kind)
    }

    fn is_void(&self, ty: TypeId) -> Result<bool> {
        Ok(matches!(self.kind(ty)?, TypeKind::Void))
    }

    fn is_opaque(&self, ty: TypeId) -> Result<bool> {
        Ok(matches!(
            self.kind(ty)?,
            TypeKind::Image { .. } | TypeKind::SampledImage { .. } | TypeKind::Sampler
        ))
    }

    fn vector_count(&self, ty: TypeId) -> Result<Option<u32>> {
        Ok(match self.kind(ty)? {
            TypeKind::Vector { count, .. } => Some(*count),
            _ => None,
        })
    }

    fn scalar(&self, ty: TypeId) -> Result<Option<Scalar>> {
        let kind = match self.kind(ty)? {
            TypeKind::Vector { component, .. } => self.kind(*component)?,
            other => other,
        };
        Ok(match kind {
            TypeKind::Bool => Some(Scalar::Bool),
            TypeKind::Int { signed: true, .. } => Some(Scalar::Int),
            TypeKind::Int { signed: false, .. } => Some(Scalar::Uint),
            TypeKind::Float { .. } => Some(Scalar::Float),
            _ => None,
        })
    }

    // ===== module scope =====

    fn emit_header(&mut self) -> Result<()> {
        self.builder.line(self.dialect.version_string());

        let mut extensions: Vec<&'static str> = Vec::new();
        for &capability in &self.collection.capabilities {
            match self.dialect.capability_support(capability) {
                CapabilitySupport::Core => {}
                CapabilitySupport::Extension(name) => {
                    if !extensions.contains(&name) {
                        extensions.push(name);
                    }
                }
                CapabilitySupport::Unavailable => {
                    return Err(TranslateError::UnsupportedCapability {
                        capability,
                        dialect: self.dialect_name(),
                    })
                }
            }
        }
        for extension in extensions {
            self.builder.line(format!("#extension {} : require", extension));
        }
        for line in self.dialect.precision_header() {
            self.builder.line(line);
        }
        if self.entry.stage == ShaderStage::Geometry {
            let settings = self.entry.geometry.unwrap_or_default();
            self.dialect.write_geometry_layout(&mut self.builder, &settings);
        }
        self.builder.blank();
        Ok(())
    }

    /// Finds every image/sampler pair sampled together and names the
    /// combined uniform that replaces them
    fn scan_combined_samplers(&mut self) -> Result<()> {
        let library = self.library;
        let mut pairs: Vec<(VariableId, Option<VariableId>)> = Vec::new();
        for &id in &self.collection.functions {
            let function = library.function(id)?;
            let mut loaded: FxHashMap<ValueId, VariableId> = FxHashMap::default();
            for op in function.ops() {
                match (op.kind, op.result, op.operands.as_slice()) {
                    (OpKind::Load, Some(result), [Operand::Variable(variable)]) => {
                        loaded.insert(result, *variable);
                    }
                    (OpKind::SampledImage, _, [image, sampler]) => {
                        let source = |operand: &Operand| match operand {
                            Operand::Value(value) => loaded.get(value).copied(),
                            Operand::Variable(variable) => Some(*variable),
                            _ => None,
                        };
                        let (Some(image), Some(sampler)) = (source(image), source(sampler)) else {
                            return Err(TranslateError::construct(
                                "combining an image and sampler that are not globals",
                            ));
                        };
                        if !pairs.contains(&(image, Some(sampler))) {
                            pairs.push((image, Some(sampler)));
                        }
                    }
                    (OpKind::ImageFetch | OpKind::ImageQuerySize, _, [Operand::Value(value), ..]) => {
                        if let Some(&image) = loaded.get(value) {
                            let is_separate = matches!(self.kind(library.variable(image)?.ty)?, TypeKind::Image { .. });
                            if is_separate && !pairs.contains(&(image, None)) {
                                pairs.push((image, None));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        for (image, sampler) in pairs {
            let image_name = &library.variable(image)?.name;
            let name = match sampler {
                Some(sampler) => {
                    let sampler_name = &library.variable(sampler)?.name;
                    self.names.unique(&format!("{}_{}", image_name, sampler_name))
                }
                None => self.names.unique(image_name),
            };
            self.combined_parts.insert(image);
            self.combined_parts.extend(sampler);
            self.combined.push(CombinedSampler { name, image, sampler });
        }
        Ok(())
    }

    /// Struct types of uniform blocks that nothing else uses as a value
    fn block_only_structs(&self) -> Result<FxHashSet<TypeId>> {
        let mut candidates = FxHashSet::default();
        if !self.dialect.supports_uniform_blocks() {
            return Ok(candidates);
        }
        let library = self.library;
        for &id in &self.collection.globals {
            let variable = library.variable(id)?;
            let ty = self.types.value_type(variable.ty)?;
            if variable.storage_class == StorageClass::Uniform && matches!(library.ty(ty)?.kind, TypeKind::Struct { .. }) {
                candidates.insert(ty);
            }
        }
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut used = FxHashSet::default();
        for &id in &self.collection.types {
            match &library.ty(id)?.kind {
                TypeKind::Struct { members } => used.extend(members.iter().map(|m| m.ty)),
                TypeKind::FixedArray { element, .. } | TypeKind::RuntimeArray { element } => {
                    used.insert(*element);
                }
                TypeKind::Pointer { pointee, storage } if *storage != StorageClass::Uniform => {
                    used.insert(*pointee);
                }
                TypeKind::Function { ret, params } => {
                    used.insert(*ret);
                    used.extend(params.iter().copied());
                }
                _ => {}
            }
        }
        for &id in &self.collection.globals {
            let variable = library.variable(id)?;
            if variable.storage_class != StorageClass::Uniform {
                used.insert(variable.ty);
            }
        }
        for &id in &self.collection.functions {
            used.extend(library.function(id)?.value_types().into_values());
        }

        for ty in used {
            candidates.remove(&self.types.value_type(ty)?);
        }
        Ok(candidates)
    }

    fn emit_structs(&mut self) -> Result<()> {
        let library = self.library;
        for &id in &self.collection.types {
            let ty = library.ty(id)?;
            let TypeKind::Struct { members } = &ty.kind else {
                continue;
            };
            let mut member_names = NameTable::new();
            let fields: Vec<String> = members.iter().map(|m| member_names.unique(&m.name)).collect();
            // Named by the uniform block that declares it
            if self.block_only.contains(&id) {
                self.members.insert(id, fields);
                continue;
            }

            let name = self.names.unique(if ty.name.is_empty() { "Struct" } else { &ty.name });
            self.types.set_struct_name(id, name.clone());
            self.builder.begin_range(name.clone(), ty.source);
            self.builder.open(format!("struct {}", name));
            for (member, field) in members.iter().zip(&fields) {
                self.builder.line(format!("{};", self.types.declare(member.ty, field)?));
            }
            self.builder.close_with(";");
            self.builder.end_range();
            self.builder.blank();
            self.members.insert(id, fields);
        }
        Ok(())
    }

    fn emit_constants(&mut self) -> Result<()> {
        let library = self.library;
        let mut declared_any = false;
        for &id in &self.collection.constants {
            let constant = library.constant(id)?;
            let literal = self.constant_literal(constant)?;
            if constant.name.is_empty() {
                self.constants.insert(id, literal);
                continue;
            }
            let name = self.names.unique(&constant.name);
            self.builder
                .line(format!("const {} = {};", self.types.declare(constant.ty, &name)?, literal));
            self.constants.insert(id, name);
            declared_any = true;
        }
        if declared_any {
            self.builder.blank();
        }
        Ok(())
    }

    fn constant_expr(&self, id: ConstantId) -> Result<String> {
        match self.constants.get(&id) {
            Some(expr) => Ok(expr.clone()),
            None => self.constant_literal(self.library.constant(id)?),
        }
    }

    fn constant_literal(&self, constant: &IrConstant) -> Result<String> {
        Ok(match &constant.value {
            ConstantValue::Bool(value) => value.to_string(),
            ConstantValue::Int(value) => match self.scalar(constant.ty)? {
                Some(Scalar::Uint) => format!("{}u", value),
                _ => value.to_string(),
            },
            ConstantValue::Float(value) => match self.kind(constant.ty)? {
                TypeKind::Float { width } => float_literal(*value, *width),
                _ => float_literal(*value, 32),
            },
            ConstantValue::Composite(parts) => {
                let parts = parts.iter().map(|p| self.constant_expr(*p)).collect::<Result<Vec<_>>>()?;
                format!("{}({})", self.types.name(constant.ty)?, parts.join(", "))
            }
            ConstantValue::Null => self.null_literal(constant.ty)?,
        })
    }

    fn null_literal(&self, ty: TypeId) -> Result<String> {
        Ok(match self.kind(ty)? {
            TypeKind::Bool => "false".into(),
            TypeKind::Int { signed: true, .. } => "0".into(),
            TypeKind::Int { signed: false, .. } => "0u".into(),
            TypeKind::Float { width } => float_literal(0.0, *width),
            TypeKind::Vector { component, .. } | TypeKind::Matrix { column: component, .. } => {
                let zero = match self.kind(*component)? {
                    TypeKind::Vector { component, .. } => self.null_literal(*component)?,
                    _ => self.null_literal(*component)?,
                };
                format!("{}({})", self.types.name(ty)?, zero)
            }
            TypeKind::Struct { members } => {
                let parts = members.iter().map(|m| self.null_literal(m.ty)).collect::<Result<Vec<_>>>()?;
                format!("{}({})", self.types.name(ty)?, parts.join(", "))
            }
            TypeKind::FixedArray { element, length } => {
                let zero = self.null_literal(*element)?;
                format!("{}({})", self.types.name(ty)?, vec![zero; *length as usize].join(", "))
            }
            _ => return Err(TranslateError::construct(format!("a null {}", self.types.name(ty)?))),
        })
    }

    fn emit_globals(&mut self) -> Result<()> {
        let library = self.library;
        let collection = self.collection;
        let stage = self.entry.stage;
        for &id in &collection.globals {
            if self.combined_parts.contains(&id) {
                continue;
            }
            let variable = library.variable(id)?;
            if let Some(built_in) = variable.decorations.built_in {
                let expr = built_in_name(built_in, variable.storage_class, stage)?;
                self.globals.insert(id, Global { expr: expr.into(), bool_substitute: None });
                continue;
            }

            self.builder.begin_range(variable.name.clone(), variable.source);
            match variable.storage_class {
                StorageClass::Input | StorageClass::Output => self.emit_interface(id, variable)?,
                StorageClass::Uniform => self.emit_uniform(id, variable)?,
                StorageClass::UniformConstant => {
                    // Samplers only exist folded into an image
                    if !matches!(self.kind(variable.ty)?, TypeKind::Sampler) {
                        let name = self.names.unique(&variable.name);
                        self.builder.line(format!("uniform {};", self.types.declare(variable.ty, &name)?));
                        self.declare(id, name, None, None);
                    }
                }
                StorageClass::Private => {
                    let name = self.names.unique(&variable.name);
                    self.builder.line(format!("{};", self.types.declare(variable.ty, &name)?));
                    self.declare(id, name, None, None);
                }
                StorageClass::StorageBuffer | StorageClass::Image => {
                    return Err(TranslateError::construct(format!(
                        "{} with {} storage",
                        variable.name, variable.storage_class
                    )))
                }
                StorageClass::Function => {
                    return Err(TranslateError::construct(format!("function-local {} at module scope", variable.name)))
                }
            }
            self.builder.end_range();
        }

        for index in 0..self.combined.len() {
            let image_type = library.variable(self.combined[index].image)?.ty;
            let line = format!("uniform {};", self.types.declare(image_type, &self.combined[index].name)?);
            self.builder.line(line);
        }
        self.builder.blank();
        Ok(())
    }

    fn declare(&mut self, id: VariableId, name: String, block: Option<String>, bool_substitute: Option<u32>) {
        self.globals.insert(id, Global { expr: name.clone(), bool_substitute });
        self.declared.push(DeclaredGlobal { variable: id, name, block });
    }

    /// Declaration for a global, with an integer stand-in where `storage`
    /// can't hold a bool
    fn storage_declaration(&self, variable: &Variable, name: &str) -> Result<(String, Option<u32>)> {
        if !self.dialect.supports_native_bool(variable.storage_class) {
            if let Some(components) = self.types.bool_components(variable.ty)? {
                return Ok((format!("{} {}", TypeNamer::bool_substitute(components), name), Some(components)));
            }
        }
        Ok((self.types.declare(variable.ty, name)?, None))
    }

    fn emit_interface(&mut self, id: VariableId, variable: &Variable) -> Result<()> {
        let stage = self.entry.stage;
        let name = self.names.unique(&variable.name);
        let (declaration, bool_substitute) = self.storage_declaration(variable, &name)?;
        let integral = bool_substitute.is_some()
            || matches!(self.scalar(variable.ty)?, Some(Scalar::Int | Scalar::Uint | Scalar::Bool));
        // Integer varyings between stages must not be interpolated
        let between_stages = match variable.storage_class {
            StorageClass::Input => stage != ShaderStage::Vertex,
            _ => stage != ShaderStage::Pixel,
        };
        let interface = InterfaceVariable {
            name: name.clone(),
            declaration,
            location: variable.decorations.location,
            flat: variable.decorations.flat || (integral && between_stages),
        };

        if variable.storage_class == StorageClass::Input {
            self.dialect.write_input_declaration(&mut self.builder, stage, &interface);
        } else {
            self.dialect.write_output_declaration(&mut self.builder, stage, &interface);
        }
        self.declare(id, name, None, bool_substitute);
        Ok(())
    }

    fn emit_uniform(&mut self, id: VariableId, variable: &Variable) -> Result<()> {
        let library = self.library;
        let ty = self.types.value_type(variable.ty)?;
        let renamed = (variable.name == MATERIAL).then(|| format!("{}_{}", MATERIAL, self.entry.stage.name()));

        let TypeKind::Struct { members } = &library.ty(ty)?.kind else {
            let name = self.names.unique(renamed.as_deref().unwrap_or(&variable.name));
            let (declaration, bool_substitute) = self.storage_declaration(variable, &name)?;
            self.builder.line(format!("uniform {};", declaration));
            self.declare(id, name, None, bool_substitute);
            return Ok(());
        };

        if !self.dialect.supports_uniform_blocks() {
            let name = self.names.unique(renamed.as_deref().unwrap_or(&variable.name));
            self.builder.line(format!("uniform {};", self.types.declare(ty, &name)?));
            self.declare(id, name, None, None);
            return Ok(());
        }

        let block = match renamed {
            Some(renamed) => self.names.unique(&renamed),
            None if self.block_only.contains(&ty) => {
                let label = &library.ty(ty)?.name;
                self.names.unique(if label.is_empty() { "Block" } else { label })
            }
            None => self.names.unique(&format!("{}Block", self.types.name(ty)?)),
        };
        let instance = self.names.unique(&variable.name);
        let fields = self.members.get(&ty).cloned().unwrap_or_default();
        self.builder.open(format!("layout(std140) uniform {}", block));
        for (member, field) in members.iter().zip(&fields) {
            self.builder.line(format!("{};", self.types.declare(member.ty, field)?));
        }
        self.builder.close_with(&format!(" {};", instance));
        self.declare(id, instance, Some(block), None);
        Ok(())
    }

    // ===== functions =====

    fn emit_functions(&mut self, walk_dependencies: bool) -> Result<()> {
        let library = self.library;
        for &id in &self.collection.functions {
            let name = self.names.unique(&library.function(id)?.name);
            self.functions.insert(id, name);
        }

        let mut prototypes = Vec::with_capacity(self.collection.functions.len());
        for &id in &self.collection.functions {
            let function = library.function(id)?;
            if function.is_declaration() {
                return Err(TranslateError::construct(format!("a call to `{}`, which has no body", function.name)));
            }
            let prototype = self.prototype(id, function)?;
            self.builder.line(format!("{};", prototype.header));
            prototypes.push(prototype);
        }
        if !prototypes.is_empty() {
            self.builder.blank();
        }

        for prototype in prototypes {
            let required = prototype.id == self.entry.function
                || self.collection.global_initializers.contains(&prototype.id);
            if walk_dependencies || required {
                self.emit_function(prototype)?;
                self.builder.blank();
            }
        }
        Ok(())
    }

    fn prototype(&self, id: FunctionId, function: &IrFunction) -> Result<Prototype> {
        // Start from the module scope so locals never shadow globals
        let mut names = self.names.clone();
        let mut params = Vec::with_capacity(function.params.len());
        let mut declarations = Vec::with_capacity(function.params.len());
        for param in &function.params {
            let name = names.unique(&param.name);
            let declaration = match self.library.ty(param.ty)?.kind {
                TypeKind::Pointer { pointee, .. } => format!("inout {}", self.types.declare(pointee, &name)?),
                _ => self.types.declare(param.ty, &name)?,
            };
            declarations.push(declaration);
            params.push(name);
        }
        let name = self.functions.get(&id).cloned().unwrap_or_else(|| function.name.clone());
        Ok(Prototype {
            id,
            header: format!("{} {}({})", self.types.name(function.return_type)?, name, declarations.join(", ")),
            names,
            params,
        })
    }

    fn emit_function(&mut self, prototype: Prototype) -> Result<()> {
        let library = self.library;
        let function = library.function(prototype.id)?;
        trace!(function = %function.name, blocks = function.blocks.len(), "emitting function");

        self.builder.begin_range(function.name.clone(), function.source);
        self.builder.open(&prototype.header);
        let mut scope = FunctionScope {
            function,
            names: prototype.names,
            values: FxHashMap::default(),
            visited: FxHashSet::default(),
            loops: Vec::new(),
            roots: FxHashMap::default(),
        };
        for (param, name) in function.params.iter().zip(prototype.params) {
            let ty = self.types.value_type(param.ty)?;
            scope.values.insert(param.id, Value { expr: name, ty, source: None });
        }
        for local in &function.locals {
            let name = scope.names.unique(&local.name);
            let declaration = self.types.declare(local.ty, &name)?;
            match local.initializer {
                Some(init) => self.builder.line(format!("{} = {};", declaration, self.constant_expr(init)?)),
                None => self.builder.line(format!("{};", declaration)),
            }
            let ty = self.types.value_type(local.ty)?;
            scope.values.insert(local.id, Value { expr: name, ty, source: None });
        }
        if let Some(entry) = function.entry_block() {
            self.emit_block(&mut scope, entry.id, None)?;
        }
        self.builder.close();
        self.builder.end_range();
        Ok(())
    }

    fn emit_main(&mut self) -> Result<()> {
        let library = self.library;
        let mut main = MainFunction::default();
        for &init in &self.collection.global_initializers {
            let name = self.function_name(init)?;
            let function = library.function(init)?;
            let mut target = None;
            for &global in &self.collection.globals {
                let variable = library.variable(global)?;
                if variable.initializer == Some(init) && variable.storage_class == StorageClass::Private {
                    target = self.globals.get(&global).map(|g| g.expr.clone());
                    break;
                }
            }
            let returns_value = !self.is_void(function.return_type)?;
            match target {
                Some(target) if returns_value => {
                    main.initializers.push(format!("{} = {}();", target, name))
                }
                _ => main.initializers.push(format!("{}();", name)),
            }
        }

        if !library.function(self.entry.function)?.params.is_empty() {
            return Err(TranslateError::construct("an entry point function with parameters"));
        }
        main.entry_call = format!("{}();", self.function_name(self.entry.function)?);
        self.builder.begin_range("main", None);
        self.dialect.write_main(&mut self.builder, &main);
        self.builder.end_range();
        Ok(())
    }

    fn function_name(&self, id: FunctionId) -> Result<String> {
        self.functions
            .get(&id)
            .cloned()
            .ok_or_else(|| TranslateError::construct(format!("a call to uncollected function {}", id)))
    }

    // ===== control flow =====

    fn emit_block(&mut self, scope: &mut FunctionScope<'a>, id: BlockId, stop: Option<BlockId>) -> Result<()> {
        if Some(id) == stop || !scope.visited.insert(id) {
            return Ok(());
        }
        let function = scope.function;
        let block = function
            .block(id)
            .ok_or_else(|| TranslateError::construct(format!("a branch to missing block {}", id)))?;
        let terminator = unterminated(block)?;
        let merge = block.merge();
        let body = &block.ops[..block.ops.len() - usize::from(merge.is_some()) - 1];

        if let Some(merge) = merge.filter(|m| m.kind == OpKind::LoopMerge) {
            let frame = LoopFrame {
                header: id,
                merge: block_operand(merge, 0)?,
                continue_target: block_operand(merge, 1)?,
            };
            self.builder.open("while (true)");
            scope.loops.push(frame);
            for op in body {
                self.emit_op(scope, op)?;
            }
            self.emit_terminator(scope, terminator, None, Some(frame.continue_target))?;
            if frame.continue_target != id {
                scope.visited.insert(frame.continue_target);
                self.emit_continue(scope, frame)?;
            }
            scope.loops.pop();
            self.builder.close();
            return self.emit_block(scope, frame.merge, stop);
        }

        for op in body {
            self.emit_op(scope, op)?;
        }
        let selection = merge.map(|m| block_operand(m, 0)).transpose()?;
        self.emit_terminator(scope, terminator, selection, stop)
    }

    /// Continue block ops, ending with a conditional break when the loop
    /// tests at the bottom
    fn emit_continue(&mut self, scope: &mut FunctionScope<'a>, frame: LoopFrame) -> Result<()> {
        let function = scope.function;
        let Some(block) = function.block(frame.continue_target) else {
            return Err(TranslateError::construct(format!("a missing continue block {}", frame.continue_target)));
        };
        let op = unterminated(block)?;
        for body_op in &block.ops[..block.ops.len() - 1] {
            self.emit_op(scope, body_op)?;
        }
        if op.kind == OpKind::BranchConditional {
            let condition = self.operand(scope, op.operands.first().ok_or_else(|| malformed(op))?)?;
            if block_operand(op, 1)? == frame.merge {
                self.builder.open(format!("if ({})", condition));
            } else if block_operand(op, 2)? == frame.merge {
                self.builder.open(format!("if (!{})", condition));
            } else {
                return Ok(());
            }
            self.builder.line("break;");
            self.builder.close();
        }
        Ok(())
    }

    fn emit_terminator(
        &mut self,
        scope: &mut FunctionScope<'a>,
        op: &'a IrOp,
        selection: Option<BlockId>,
        stop: Option<BlockId>,
    ) -> Result<()> {
        match op.kind {
            OpKind::Branch => self.branch(scope, block_operand(op, 0)?, stop),
            OpKind::BranchConditional => {
                let condition = self.operand(scope, op.operands.first().ok_or_else(|| malformed(op))?)?;
                let on_true = block_operand(op, 1)?;
                let on_false = block_operand(op, 2)?;
                let end = selection.or(stop);
                if Some(on_true) != end {
                    self.builder.open(format!("if ({})", condition));
                    self.branch(scope, on_true, end)?;
                    self.builder.close();
                    if Some(on_false) != end {
                        self.builder.open("else");
                        self.branch(scope, on_false, end)?;
                        self.builder.close();
                    }
                } else if Some(on_false) != end {
                    self.builder.open(format!("if (!{})", condition));
                    self.branch(scope, on_false, end)?;
                    self.builder.close();
                }
                match selection {
                    Some(merge) => self.emit_block(scope, merge, stop),
                    None => Ok(()),
                }
            }
            OpKind::Return => {
                self.builder.line("return;");
                Ok(())
            }
            OpKind::ReturnValue => {
                let value = self.operand(scope, op.operands.first().ok_or_else(|| malformed(op))?)?;
                self.builder.line(format!("return {};", value));
                Ok(())
            }
            OpKind::Kill => {
                self.builder.line("discard;");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn branch(&mut self, scope: &mut FunctionScope<'a>, target: BlockId, stop: Option<BlockId>) -> Result<()> {
        if Some(target) == stop {
            return Ok(());
        }
        if let Some(frame) = scope.loops.last().copied() {
            if target == frame.merge {
                self.builder.line("break;");
                return Ok(());
            }
            if target == frame.continue_target || target == frame.header {
                if frame.continue_target != frame.header {
                    self.emit_continue(scope, frame)?;
                }
                self.builder.line("continue;");
                return Ok(());
            }
        }
        self.emit_block(scope, target, stop)
    }

    // ===== ops =====

    fn emit_op(&mut self, scope: &mut FunctionScope<'a>, op: &'a IrOp) -> Result<()> {
        let tracked = self.builder.tracks_ranges() && op.source.is_some();
        if tracked {
            self.builder.begin_range(op.kind.to_string(), op.source);
        }
        self.translate_op(scope, op)?;
        if tracked {
            self.builder.end_range();
        }
        Ok(())
    }

    fn operand(&self, scope: &FunctionScope<'a>, operand: &Operand) -> Result<String> {
        match operand {
            Operand::Value(id) => scope
                .values
                .get(id)
                .map(|v| v.expr.clone())
                .ok_or_else(|| TranslateError::construct(format!("a use of undefined value {}", id))),
            Operand::Constant(id) => self.constant_expr(*id),
            Operand::Variable(id) => self
                .globals
                .get(id)
                .map(|g| g.expr.clone())
                .ok_or_else(|| TranslateError::construct(format!("a use of undeclared global {}", id))),
            Operand::Function(id) => self.function_name(*id),
            Operand::Literal(value) => Ok(value.to_string()),
            Operand::Type(_) | Operand::Import(_) | Operand::Block(_) => {
                Err(TranslateError::construct(format!("{} as a value", operand)))
            }
        }
    }

    fn operand_type(&self, scope: &FunctionScope<'a>, operand: &Operand) -> Result<TypeId> {
        let ty = match operand {
            Operand::Value(id) => scope
                .values
                .get(id)
                .map(|v| v.ty)
                .ok_or_else(|| TranslateError::construct(format!("a use of undefined value {}", id)))?,
            Operand::Constant(id) => self.library.constant(*id)?.ty,
            Operand::Variable(id) => self.library.variable(*id)?.ty,
            _ => return Err(TranslateError::construct(format!("{} as a typed value", operand))),
        };
        self.types.value_type(ty)
    }

    fn operands(&self, scope: &FunctionScope<'a>, operands: &[Operand]) -> Result<Vec<String>> {
        operands.iter().map(|o| self.operand(scope, o)).collect()
    }

    /// Opaque global an operand was loaded from
    fn source(&self, scope: &FunctionScope<'a>, operand: &Operand) -> Option<VariableId> {
        match operand {
            Operand::Variable(id) => Some(*id),
            Operand::Value(id) => scope.values.get(id).and_then(|v| v.source),
            _ => None,
        }
    }

    /// Global a pointer operand addresses, through any access chains
    fn pointer_root(&self, scope: &FunctionScope<'a>, pointer: &Operand) -> Option<VariableId> {
        match pointer {
            Operand::Variable(id) => Some(*id),
            Operand::Value(id) => scope.roots.get(id).copied(),
            _ => None,
        }
    }

    fn combined_name(&self, image: VariableId, sampler: Option<VariableId>) -> Option<String> {
        self.combined
            .iter()
            .find(|c| c.image == image && c.sampler == sampler)
            .map(|c| c.name.clone())
    }

    /// Sampler expression for an image operand of a fetch or query
    fn image_operand(&self, scope: &FunctionScope<'a>, operand: &Operand) -> Result<String> {
        match self.source(scope, operand).and_then(|image| self.combined_name(image, None)) {
            Some(name) => Ok(name),
            None => self.operand(scope, operand),
        }
    }

    /// Declares a temporary for `op`'s result, or writes `expr` as a
    /// statement when there is none
    fn bind(&mut self, scope: &mut FunctionScope<'a>, op: &IrOp, expr: String) -> Result<()> {
        let typed = match op.result_type {
            Some(ty) => !self.is_void(ty)?,
            None => false,
        };
        match (op.result, op.result_type) {
            (Some(result), Some(ty)) if typed => {
                let name = scope.names.unique(&format!("_{}", result.0));
                let declaration = self.types.declare(ty, &name)?;
                self.builder.line(format!("{} = {};", declaration, expr));
                let ty = self.types.value_type(ty)?;
                scope.values.insert(result, Value { expr: name, ty, source: None });
            }
            _ => self.builder.line(format!("{};", expr)),
        }
        Ok(())
    }

    /// Records `op`'s result as an expression without a temporary
    fn alias(&self, scope: &mut FunctionScope<'a>, op: &IrOp, expr: String, ty: TypeId, source: Option<VariableId>) -> Result<()> {
        let result = op.result.ok_or_else(|| malformed(op))?;
        scope.values.insert(result, Value { expr, ty, source });
        Ok(())
    }

    fn index_into(&self, expr: &str, ty: TypeId, index: &Index) -> Result<(String, TypeId)> {
        let ty = self.types.value_type(ty)?;
        let subscript = |i: &Index| match i {
            Index::Literal(i) => format!("{}[{}]", expr, i),
            Index::Dynamic(e) => format!("{}[{}]", expr, e),
        };
        match self.kind(ty)? {
            TypeKind::Struct { members } => {
                let Index::Literal(i) = index else {
                    return Err(TranslateError::construct("a dynamic struct member index"));
                };
                let member = members
                    .get(*i as usize)
                    .ok_or_else(|| TranslateError::construct(format!("member {} of a {}-member struct", i, members.len())))?;
                let field = self
                    .members
                    .get(&ty)
                    .and_then(|fields| fields.get(*i as usize))
                    .cloned()
                    .unwrap_or_else(|| member.name.clone());
                Ok((format!("{}.{}", expr, field), member.ty))
            }
            TypeKind::Vector { component, .. } => match index {
                Index::Literal(i) if (*i as usize) < SWIZZLE.len() => {
                    Ok((format!("{}.{}", expr, SWIZZLE[*i as usize]), *component))
                }
                other => Ok((subscript(other), *component)),
            },
            TypeKind::Matrix { column, .. } => Ok((subscript(index), *column)),
            TypeKind::FixedArray { element, .. } | TypeKind::RuntimeArray { element } => Ok((subscript(index), *element)),
            _ => Err(TranslateError::construct(format!("indexing into {}", self.types.name(ty)?))),
        }
    }

    fn constant_index(&self, operand: &Operand) -> Result<Option<u32>> {
        Ok(match operand {
            Operand::Literal(value) => Some(*value),
            Operand::Constant(id) => match self.library.constant(*id)?.value {
                ConstantValue::Int(value) => u32::try_from(value).ok(),
                _ => None,
            },
            _ => None,
        })
    }

    fn translate_op(&mut self, scope: &mut FunctionScope<'a>, op: &'a IrOp) -> Result<()> {
        let operands = op.operands.as_slice();
        match op.kind {
            OpKind::Load => {
                let [pointer] = operands else { return Err(malformed(op)) };
                let result_type = op.result_type.ok_or_else(|| malformed(op))?;
                if self.is_opaque(result_type)? {
                    let source = self.source(scope, pointer);
                    let expr = match pointer {
                        Operand::Variable(id) => self.globals.get(id).map(|g| g.expr.clone()).unwrap_or_default(),
                        other => self.operand(scope, other)?,
                    };
                    let ty = self.types.value_type(result_type)?;
                    return self.alias(scope, op, expr, ty, source);
                }
                let mut expr = self.operand(scope, pointer)?;
                if let Operand::Variable(id) = pointer {
                    if let Some(components) = self.globals.get(id).and_then(|g| g.bool_substitute) {
                        expr = format!("{}({})", bool_type(components), expr);
                    }
                }
                self.bind(scope, op, expr)
            }
            OpKind::Store => {
                let [pointer, value] = operands else { return Err(malformed(op)) };
                if let Some(root) = self.pointer_root(scope, pointer) {
                    let variable = self.library.variable(root)?;
                    if is_read_only(variable.storage_class) {
                        return Err(TranslateError::construct(format!(
                            "a store to {} with {} storage",
                            variable.name, variable.storage_class
                        )));
                    }
                }
                let target = self.operand(scope, pointer)?;
                let mut value = self.operand(scope, value)?;
                if let Operand::Variable(id) = pointer {
                    if let Some(components) = self.globals.get(id).and_then(|g| g.bool_substitute) {
                        value = format!("{}({})", TypeNamer::bool_substitute(components), value);
                    }
                }
                self.builder.line(format!("{} = {};", target, value));
                Ok(())
            }
            OpKind::AccessChain => {
                let [base, indices @ ..] = operands else { return Err(malformed(op)) };
                let mut expr = self.operand(scope, base)?;
                let mut ty = self.operand_type(scope, base)?;
                for index in indices {
                    let index = match self.constant_index(index)? {
                        Some(i) => Index::Literal(i),
                        None => Index::Dynamic(self.operand(scope, index)?),
                    };
                    (expr, ty) = self.index_into(&expr, ty, &index)?;
                }
                if let (Some(root), Some(result)) = (self.pointer_root(scope, base), op.result) {
                    scope.roots.insert(result, root);
                }
                self.alias(scope, op, expr, ty, None)
            }
            OpKind::Binary(binary) => {
                let [lhs, rhs] = operands else { return Err(malformed(op)) };
                let (a, b) = (self.operand(scope, lhs)?, self.operand(scope, rhs)?);
                let float = self.scalar(self.operand_type(scope, lhs)?)? == Some(Scalar::Float);
                let expr = if binary == BinaryOp::Mod && float {
                    format!("mod({}, {})", a, b)
                } else {
                    format!("({} {} {})", a, binary.symbol(), b)
                };
                self.bind(scope, op, expr)
            }
            OpKind::Compare(compare) => {
                let [lhs, rhs] = operands else { return Err(malformed(op)) };
                let (a, b) = (self.operand(scope, lhs)?, self.operand(scope, rhs)?);
                let expr = if self.vector_count(self.operand_type(scope, lhs)?)?.is_some() {
                    let function = match compare {
                        CompareOp::Eq => "equal",
                        CompareOp::Ne => "notEqual",
                        CompareOp::Lt => "lessThan",
                        CompareOp::Le => "lessThanEqual",
                        CompareOp::Gt => "greaterThan",
                        CompareOp::Ge => "greaterThanEqual",
                    };
                    format!("{}({}, {})", function, a, b)
                } else {
                    format!("({} {} {})", a, compare.symbol(), b)
                };
                self.bind(scope, op, expr)
            }
            OpKind::Negate | OpKind::Not | OpKind::LogicalNot => {
                let [value] = operands else { return Err(malformed(op)) };
                let a = self.operand(scope, value)?;
                let vector = self.vector_count(self.operand_type(scope, value)?)?.is_some();
                let expr = match op.kind {
                    OpKind::Negate => format!("(-{})", a),
                    OpKind::Not => format!("(~{})", a),
                    _ if vector => format!("not({})", a),
                    _ => format!("(!{})", a),
                };
                self.bind(scope, op, expr)
            }
            OpKind::LogicalAnd | OpKind::LogicalOr => {
                let [lhs, rhs] = operands else { return Err(malformed(op)) };
                let symbol = if op.kind == OpKind::LogicalAnd { "&&" } else { "||" };
                let expr = format!("({} {} {})", self.operand(scope, lhs)?, symbol, self.operand(scope, rhs)?);
                self.bind(scope, op, expr)
            }
            OpKind::Select => {
                let [condition, on_true, on_false] = operands else { return Err(malformed(op)) };
                let c = self.operand(scope, condition)?;
                let (t, f) = (self.operand(scope, on_true)?, self.operand(scope, on_false)?);
                let expr = if self.vector_count(self.operand_type(scope, condition)?)?.is_some() {
                    format!("mix({}, {}, {})", f, t, c)
                } else {
                    format!("({} ? {} : {})", c, t, f)
                };
                self.bind(scope, op, expr)
            }
            OpKind::Dot => {
                let [lhs, rhs] = operands else { return Err(malformed(op)) };
                let expr = format!("dot({}, {})", self.operand(scope, lhs)?, self.operand(scope, rhs)?);
                self.bind(scope, op, expr)
            }
            OpKind::VectorTimesScalar | OpKind::MatrixTimesVector | OpKind::VectorTimesMatrix | OpKind::MatrixTimesMatrix => {
                let [lhs, rhs] = operands else { return Err(malformed(op)) };
                let expr = format!("({} * {})", self.operand(scope, lhs)?, self.operand(scope, rhs)?);
                self.bind(scope, op, expr)
            }
            OpKind::CompositeConstruct => {
                let result_type = op.result_type.ok_or_else(|| malformed(op))?;
                let expr = format!("{}({})", self.types.name(result_type)?, self.operands(scope, operands)?.join(", "));
                self.bind(scope, op, expr)
            }
            OpKind::CompositeExtract => {
                let [composite, indices @ ..] = operands else { return Err(malformed(op)) };
                let mut expr = self.operand(scope, composite)?;
                let mut ty = self.operand_type(scope, composite)?;
                for index in indices {
                    let index = index.as_literal().ok_or_else(|| malformed(op))?;
                    (expr, ty) = self.index_into(&expr, ty, &Index::Literal(index))?;
                }
                self.bind(scope, op, expr)
            }
            OpKind::VectorShuffle => self.translate_shuffle(scope, op),
            OpKind::ConvertFToS | OpKind::ConvertSToF => {
                let [value] = operands else { return Err(malformed(op)) };
                let result_type = op.result_type.ok_or_else(|| malformed(op))?;
                let expr = format!("{}({})", self.types.name(result_type)?, self.operand(scope, value)?);
                self.bind(scope, op, expr)
            }
            OpKind::Bitcast => {
                let [value] = operands else { return Err(malformed(op)) };
                let result_type = op.result_type.ok_or_else(|| malformed(op))?;
                let a = self.operand(scope, value)?;
                let from = self.scalar(self.operand_type(scope, value)?)?;
                let expr = match (from, self.scalar(result_type)?) {
                    (Some(Scalar::Float), Some(Scalar::Int)) => format!("floatBitsToInt({})", a),
                    (Some(Scalar::Float), Some(Scalar::Uint)) => format!("floatBitsToUint({})", a),
                    (Some(Scalar::Int), Some(Scalar::Float)) => format!("intBitsToFloat({})", a),
                    (Some(Scalar::Uint), Some(Scalar::Float)) => format!("uintBitsToFloat({})", a),
                    _ => format!("{}({})", self.types.name(result_type)?, a),
                };
                self.bind(scope, op, expr)
            }
            OpKind::SampledImage => {
                let [image, sampler] = operands else { return Err(malformed(op)) };
                let result_type = op.result_type.ok_or_else(|| malformed(op))?;
                let name = match (self.source(scope, image), self.source(scope, sampler)) {
                    (Some(image), Some(sampler)) => self.combined_name(image, Some(sampler)),
                    _ => None,
                }
                .ok_or_else(|| TranslateError::construct("combining an image and sampler that are not globals"))?;
                let ty = self.types.value_type(result_type)?;
                self.alias(scope, op, name, ty, None)
            }
            OpKind::ImageSample => {
                let [image, coordinate] = operands else { return Err(malformed(op)) };
                let expr = format!("texture({}, {})", self.operand(scope, image)?, self.operand(scope, coordinate)?);
                self.bind(scope, op, expr)
            }
            OpKind::ImageSampleLod => {
                let [image, coordinate, lod] = operands else { return Err(malformed(op)) };
                let expr = format!(
                    "textureLod({}, {}, {})",
                    self.operand(scope, image)?,
                    self.operand(scope, coordinate)?,
                    self.operand(scope, lod)?
                );
                self.bind(scope, op, expr)
            }
            OpKind::ImageSampleDref => {
                let [image, coordinate, dref] = operands else { return Err(malformed(op)) };
                let sampler = self.operand(scope, image)?;
                let (c, d) = (self.operand(scope, coordinate)?, self.operand(scope, dref)?);
                let components = self.vector_count(self.operand_type(scope, coordinate)?)?.unwrap_or(1);
                // The reference folds into the coordinate unless that is full
                let expr = if components < 4 {
                    format!("texture({}, vec{}({}, {}))", sampler, components + 1, c, d)
                } else {
                    format!("texture({}, {}, {})", sampler, c, d)
                };
                self.bind(scope, op, expr)
            }
            OpKind::ImageFetch => {
                let [image, coordinate, lod @ ..] = operands else { return Err(malformed(op)) };
                let lod = match lod.first() {
                    Some(lod) => self.operand(scope, lod)?,
                    None => "0".into(),
                };
                let expr = format!(
                    "texelFetch({}, {}, {})",
                    self.image_operand(scope, image)?,
                    self.operand(scope, coordinate)?,
                    lod
                );
                self.bind(scope, op, expr)
            }
            OpKind::ImageQuerySize => {
                let [image] = operands else { return Err(malformed(op)) };
                let expr = format!("textureSize({}, 0)", self.image_operand(scope, image)?);
                self.bind(scope, op, expr)
            }
            OpKind::ImageRead | OpKind::ImageWrite => Err(TranslateError::construct("storage image access")),
            OpKind::DPdx | OpKind::DPdy | OpKind::Fwidth => {
                let [value] = operands else { return Err(malformed(op)) };
                let function = match op.kind {
                    OpKind::DPdx => "dFdx",
                    OpKind::DPdy => "dFdy",
                    _ => "fwidth",
                };
                let expr = format!("{}({})", function, self.operand(scope, value)?);
                self.bind(scope, op, expr)
            }
            OpKind::EmitVertex => {
                self.builder.line("EmitVertex();");
                Ok(())
            }
            OpKind::EndPrimitive => {
                self.builder.line("EndPrimitive();");
                Ok(())
            }
            OpKind::FunctionCall => {
                let [Operand::Function(callee), arguments @ ..] = operands else { return Err(malformed(op)) };
                let expr = format!(
                    "{}({})",
                    self.function_name(*callee)?,
                    self.operands(scope, arguments)?.join(", ")
                );
                self.bind(scope, op, expr)
            }
            OpKind::ExtInst => {
                let [Operand::Import(import), Operand::Literal(instruction), arguments @ ..] = operands else {
                    return Err(malformed(op));
                };
                let set = &self.library.import(*import)?.name;
                if set != GLSL_STD_450 {
                    return Err(TranslateError::construct(format!("instructions from `{}`", set)));
                }
                let arguments = self.operands(scope, arguments)?;
                let expr = match (*instruction, arguments.as_slice()) {
                    (GLSL_STD_450_FMA, [a, b, c]) => format!("({} * {} + {})", a, b, c),
                    (instruction, _) => {
                        let function = glsl_std_450_function(instruction).ok_or_else(|| {
                            TranslateError::construct(format!("{} instruction {}", GLSL_STD_450, instruction))
                        })?;
                        format!("{}({})", function, arguments.join(", "))
                    }
                };
                self.bind(scope, op, expr)
            }
            // Structure is rebuilt by emit_block
            OpKind::SelectionMerge
            | OpKind::LoopMerge
            | OpKind::Branch
            | OpKind::BranchConditional
            | OpKind::Return
            | OpKind::ReturnValue
            | OpKind::Kill
            | OpKind::Unreachable => Ok(()),
        }
    }

    fn translate_shuffle(&mut self, scope: &mut FunctionScope<'a>, op: &'a IrOp) -> Result<()> {
        let [a, b, components @ ..] = op.operands.as_slice() else { return Err(malformed(op)) };
        let width = self.vector_count(self.operand_type(scope, a)?)?.unwrap_or(1);
        let components = components
            .iter()
            .map(|c| c.as_literal().ok_or_else(|| malformed(op)))
            .collect::<Result<Vec<u32>>>()?;
        let letter = |i: u32| SWIZZLE.get(i as usize).copied().ok_or_else(|| malformed(op));
        let swizzle = |offset: u32| components.iter().map(|c| letter(c - offset)).collect::<Result<String>>();

        let expr = if components.iter().all(|&c| c < width) {
            format!("{}.{}", self.operand(scope, a)?, swizzle(0)?)
        } else if components.iter().all(|&c| c >= width) {
            format!("{}.{}", self.operand(scope, b)?, swizzle(width)?)
        } else {
            let (a, b) = (self.operand(scope, a)?, self.operand(scope, b)?);
            let parts = components
                .iter()
                .map(|&c| -> Result<String> {
                    if c < width {
                        Ok(format!("{}.{}", a, letter(c)?))
                    } else {
                        Ok(format!("{}.{}", b, letter(c - width)?))
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            let result_type = op.result_type.ok_or_else(|| malformed(op))?;
            format!("{}({})", self.types.name(result_type)?, parts.join(", "))
        };
        self.bind(scope, op, expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_literals_stay_floats() {
        assert_eq!(float_literal(1.0, 32), "1.0");
        assert_eq!(float_literal(0.5, 32), "0.5");
        assert_eq!(float_literal(2.0, 64), "2.0lf");
        assert_eq!(float_literal(f64::INFINITY, 32), "(1.0 / 0.0)");
    }

    #[test]
    fn test_glsl_std_450_table() {
        assert_eq!(glsl_std_450_function(4), Some("abs"));
        assert_eq!(glsl_std_450_function(32), Some("inversesqrt"));
        assert_eq!(glsl_std_450_function(46), Some("mix"));
        assert_eq!(glsl_std_450_function(69), Some("normalize"));
        assert_eq!(glsl_std_450_function(GLSL_STD_450_FMA), None);
        assert_eq!(glsl_std_450_function(500), None);
    }

    #[test]
    fn test_built_in_names_depend_on_direction() {
        assert_eq!(
            built_in_name(BuiltIn::PrimitiveId, StorageClass::Input, ShaderStage::Geometry),
            Ok("gl_PrimitiveIDIn")
        );
        assert_eq!(
            built_in_name(BuiltIn::PrimitiveId, StorageClass::Input, ShaderStage::Pixel),
            Ok("gl_PrimitiveID")
        );
        assert!(built_in_name(BuiltIn::Position, StorageClass::Input, ShaderStage::Pixel).is_err());
    }
}
