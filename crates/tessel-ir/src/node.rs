//! IR nodes other than types and functions
//!
//! Node identities, constants, module-scope variables, extension imports and
//! entry points.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessel_error::Span;

macro_rules! node_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

node_id!(
    /// Index of a type node in its library
    TypeId, "%t"
);
node_id!(
    /// Index of a constant node in its library
    ConstantId, "%c"
);
node_id!(
    /// Index of a module-scope variable in its library
    VariableId, "%g"
);
node_id!(
    /// Index of a function in its library
    FunctionId, "@f"
);
node_id!(
    /// Index of an extension import in its library
    ImportId, "%x"
);
node_id!(
    /// Function-scoped SSA value: parameter, local variable or op result
    ValueId, "%"
);
node_id!(
    /// Function-scoped basic block label
    BlockId, "%b"
);

/// Reference to any module-level node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeRef {
    Type(TypeId),
    Constant(ConstantId),
    Variable(VariableId),
    Function(FunctionId),
    Import(ImportId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Type(id) => write!(f, "type {}", id),
            NodeRef::Constant(id) => write!(f, "constant {}", id),
            NodeRef::Variable(id) => write!(f, "variable {}", id),
            NodeRef::Function(id) => write!(f, "function {}", id),
            NodeRef::Import(id) => write!(f, "import {}", id),
        }
    }
}

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    /// Function-local storage
    Function,
    /// Module-private storage
    Private,
    /// Stage input
    Input,
    /// Stage output
    Output,
    /// Uniform buffer block
    Uniform,
    /// Opaque uniforms (samplers, images)
    UniformConstant,
    StorageBuffer,
    /// Storage image
    Image,
}

impl StorageClass {
    /// True for every storage class whose variables outlive a single call
    pub fn is_global(self) -> bool {
        !matches!(self, StorageClass::Function)
    }

    pub fn code(self) -> u32 {
        match self {
            StorageClass::Function => 0,
            StorageClass::Private => 1,
            StorageClass::Input => 2,
            StorageClass::Output => 3,
            StorageClass::Uniform => 4,
            StorageClass::UniformConstant => 5,
            StorageClass::StorageBuffer => 6,
            StorageClass::Image => 7,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => StorageClass::Function,
            1 => StorageClass::Private,
            2 => StorageClass::Input,
            3 => StorageClass::Output,
            4 => StorageClass::Uniform,
            5 => StorageClass::UniformConstant,
            6 => StorageClass::StorageBuffer,
            7 => StorageClass::Image,
            _ => return None,
        })
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageClass::Function => "function",
            StorageClass::Private => "private",
            StorageClass::Input => "input",
            StorageClass::Output => "output",
            StorageClass::Uniform => "uniform",
            StorageClass::UniformConstant => "uniform_constant",
            StorageClass::StorageBuffer => "storage_buffer",
            StorageClass::Image => "image",
        };
        f.write_str(name)
    }
}

/// Built-in variables understood by every target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltIn {
    Position,
    PointSize,
    ClipDistance,
    CullDistance,
    VertexIndex,
    InstanceIndex,
    PrimitiveId,
    InvocationId,
    Layer,
    FragCoord,
    FrontFacing,
    FragDepth,
}

impl BuiltIn {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        const ALL: [BuiltIn; 12] = [
            BuiltIn::Position,
            BuiltIn::PointSize,
            BuiltIn::ClipDistance,
            BuiltIn::CullDistance,
            BuiltIn::VertexIndex,
            BuiltIn::InstanceIndex,
            BuiltIn::PrimitiveId,
            BuiltIn::InvocationId,
            BuiltIn::Layer,
            BuiltIn::FragCoord,
            BuiltIn::FrontFacing,
            BuiltIn::FragDepth,
        ];
        ALL.get(code as usize).copied()
    }
}

/// Interface decorations of a module-scope variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorations {
    pub binding: Option<u32>,
    pub descriptor_set: Option<u32>,
    pub location: Option<u32>,
    pub built_in: Option<BuiltIn>,
    #[serde(default)]
    pub flat: bool,
}

impl Decorations {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Literal value of a constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Composite(Vec<ConstantId>),
    Null,
}

impl ConstantValue {
    /// Equality that treats floats bitwise, so identical literals compare equal
    pub fn same_as(&self, other: &ConstantValue) -> bool {
        match (self, other) {
            (ConstantValue::Float(a), ConstantValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Bool(v) => write!(f, "{}", v),
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Float(v) => write!(f, "{:?}", v),
            ConstantValue::Composite(parts) => {
                write!(f, "{{")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "}}")
            }
            ConstantValue::Null => write!(f, "null"),
        }
    }
}

/// An immutable typed literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrConstant {
    pub name: String,
    pub ty: TypeId,
    pub value: ConstantValue,
}

impl IrConstant {
    pub fn new(ty: TypeId, value: ConstantValue) -> Self {
        Self { name: String::new(), ty, value }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// A module-scope variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    /// Type of the stored value (not a pointer type)
    pub ty: TypeId,
    pub storage_class: StorageClass,
    /// Function that must run before main to initialize this variable
    #[serde(default)]
    pub initializer: Option<FunctionId>,
    #[serde(default)]
    pub decorations: Decorations,
    #[serde(default)]
    pub source: Option<Span>,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: TypeId, storage_class: StorageClass) -> Self {
        Self {
            name: name.into(),
            ty,
            storage_class,
            initializer: None,
            decorations: Decorations::default(),
            source: None,
        }
    }

    pub fn with_initializer(mut self, function: FunctionId) -> Self {
        self.initializer = Some(function);
        self
    }

    pub fn with_binding(mut self, set: u32, binding: u32) -> Self {
        self.decorations.descriptor_set = Some(set);
        self.decorations.binding = Some(binding);
        self
    }

    pub fn with_location(mut self, location: u32) -> Self {
        self.decorations.location = Some(location);
        self
    }

    pub fn with_built_in(mut self, built_in: BuiltIn) -> Self {
        self.decorations.built_in = Some(built_in);
        self
    }

    pub fn with_source(mut self, span: Span) -> Self {
        self.source = Some(span);
        self
    }

    pub fn is_global(&self) -> bool {
        self.storage_class.is_global()
    }
}

/// A named external instruction set ("GLSL.std.450")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionImport {
    pub name: String,
}

impl ExtensionImport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Shader stages ("fragment types") a library can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Pixel,
    Compute,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "Vertex",
            ShaderStage::Geometry => "Geometry",
            ShaderStage::Pixel => "Pixel",
            ShaderStage::Compute => "Compute",
        }
    }

    pub fn code(self) -> u32 {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Geometry => 3,
            ShaderStage::Pixel => 4,
            ShaderStage::Compute => 5,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => ShaderStage::Vertex,
            3 => ShaderStage::Geometry,
            4 => ShaderStage::Pixel,
            5 => ShaderStage::Compute,
            _ => return None,
        })
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryInput {
    Points,
    Lines,
    Triangles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryOutput {
    Points,
    LineStrip,
    TriangleStrip,
}

/// Primitive settings of a geometry stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometrySettings {
    pub input: GeometryInput,
    pub output: GeometryOutput,
    pub max_vertices: u32,
}

impl Default for GeometrySettings {
    fn default() -> Self {
        Self {
            input: GeometryInput::Triangles,
            output: GeometryOutput::TriangleStrip,
            max_vertices: 3,
        }
    }
}

/// The function a shader stage starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Shader type name ("PhongLighting")
    pub name: String,
    pub stage: ShaderStage,
    pub function: FunctionId,
    #[serde(default)]
    pub geometry: Option<GeometrySettings>,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>, stage: ShaderStage, function: FunctionId) -> Self {
        Self {
            name: name.into(),
            stage,
            function,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, settings: GeometrySettings) -> Self {
        self.geometry = Some(settings);
        self
    }
}
