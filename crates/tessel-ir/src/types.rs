//! IR Type System
//!
//! Every shader-visible type is one [`IrType`] node. The storage is a tagged
//! variant ([`TypeKind`]); [`IrType::base_type`] and [`IrType::parameters`]
//! expose the generic "base type + ordered parameter list" shape that the
//! binary encoding and the extended type views read.

use crate::node::{StorageClass, TypeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tessel_error::Span;

/// Category tag of a type node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Void,
    Bool,
    Int,
    Float,
    Vector,
    Matrix,
    Struct,
    FixedArray,
    RuntimeArray,
    Pointer,
    Function,
    Sampler,
    Image,
    SampledImage,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseType::Void => "void",
            BaseType::Bool => "bool",
            BaseType::Int => "int",
            BaseType::Float => "float",
            BaseType::Vector => "vector",
            BaseType::Matrix => "matrix",
            BaseType::Struct => "struct",
            BaseType::FixedArray => "array",
            BaseType::RuntimeArray => "runtime_array",
            BaseType::Pointer => "pointer",
            BaseType::Function => "function",
            BaseType::Sampler => "sampler",
            BaseType::Image => "image",
            BaseType::SampledImage => "sampled_image",
        };
        f.write_str(name)
    }
}

/// One entry of a type's parameter list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeParam {
    /// A sub-type
    Type(TypeId),
    /// A constant integer literal
    Literal(i32),
    /// A value not known until specialization (template argument, spec constant)
    Symbol(String),
}

impl TypeParam {
    pub fn as_literal(&self) -> Option<i32> {
        match self {
            TypeParam::Literal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeId> {
        match self {
            TypeParam::Type(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for TypeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeParam::Type(id) => write!(f, "{}", id),
            TypeParam::Literal(v) => write!(f, "{}", v),
            TypeParam::Symbol(name) => write!(f, "?{}", name),
        }
    }
}

/// Image dimensionality literals
pub mod dim {
    pub const DIM_1D: i32 = 0;
    pub const DIM_2D: i32 = 1;
    pub const DIM_3D: i32 = 2;
    pub const CUBE: i32 = 3;
}

/// Storage image format literals (0 means unknown / not a storage image)
pub mod format {
    pub const UNKNOWN: i32 = 0;
    pub const RGBA32F: i32 = 1;
    pub const RGBA16F: i32 = 2;
    pub const R32F: i32 = 3;
    pub const RGBA8: i32 = 4;
}

/// Image parameter literals, stored at fixed parameter slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageParams {
    pub dim: TypeParam,
    pub depth: TypeParam,
    pub arrayed: TypeParam,
    pub multisampled: TypeParam,
    /// 1 = used with a sampler, 2 = storage image
    pub sampled: TypeParam,
    pub format: TypeParam,
}

impl ImageParams {
    /// A plain sampled 2D color image
    pub fn sampled_2d() -> Self {
        Self {
            dim: TypeParam::Literal(dim::DIM_2D),
            depth: TypeParam::Literal(0),
            arrayed: TypeParam::Literal(0),
            multisampled: TypeParam::Literal(0),
            sampled: TypeParam::Literal(1),
            format: TypeParam::Literal(format::UNKNOWN),
        }
    }

    pub fn with_dim(mut self, dim: TypeParam) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_depth(mut self, depth: bool) -> Self {
        self.depth = TypeParam::Literal(depth as i32);
        self
    }

    pub fn with_arrayed(mut self, arrayed: bool) -> Self {
        self.arrayed = TypeParam::Literal(arrayed as i32);
        self
    }

    pub fn storage(mut self, format: i32) -> Self {
        self.sampled = TypeParam::Literal(2);
        self.format = TypeParam::Literal(format);
        self
    }
}

/// A struct member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
}

impl StructMember {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self { name: name.into(), ty }
    }
}

/// Variant storage of a type node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: TypeId, count: u32 },
    Matrix { column: TypeId, count: u32 },
    Struct { members: Vec<StructMember> },
    FixedArray { element: TypeId, length: u32 },
    RuntimeArray { element: TypeId },
    Pointer { pointee: TypeId, storage: StorageClass },
    Function { ret: TypeId, params: Vec<TypeId> },
    Sampler,
    Image { sampled_type: TypeId, params: ImageParams },
    SampledImage { image: TypeId },
}

/// Parameter slots of an image type
pub const IMAGE_SAMPLED_TYPE: usize = 0;
pub const IMAGE_DIM: usize = 1;
pub const IMAGE_DEPTH: usize = 2;
pub const IMAGE_ARRAYED: usize = 3;
pub const IMAGE_MULTISAMPLED: usize = 4;
pub const IMAGE_SAMPLED: usize = 5;
pub const IMAGE_FORMAT: usize = 6;
pub const IMAGE_PARAM_COUNT: usize = 7;

/// A type node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrType {
    /// Engine-facing name ("Real3", "Material"); may be empty for anonymous types
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub source: Option<Span>,
}

impl IrType {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            source: None,
        }
    }

    pub fn with_source(mut self, span: Span) -> Self {
        self.source = Some(span);
        self
    }

    pub fn base_type(&self) -> BaseType {
        match &self.kind {
            TypeKind::Void => BaseType::Void,
            TypeKind::Bool => BaseType::Bool,
            TypeKind::Int { .. } => BaseType::Int,
            TypeKind::Float { .. } => BaseType::Float,
            TypeKind::Vector { .. } => BaseType::Vector,
            TypeKind::Matrix { .. } => BaseType::Matrix,
            TypeKind::Struct { .. } => BaseType::Struct,
            TypeKind::FixedArray { .. } => BaseType::FixedArray,
            TypeKind::RuntimeArray { .. } => BaseType::RuntimeArray,
            TypeKind::Pointer { .. } => BaseType::Pointer,
            TypeKind::Function { .. } => BaseType::Function,
            TypeKind::Sampler => BaseType::Sampler,
            TypeKind::Image { .. } => BaseType::Image,
            TypeKind::SampledImage { .. } => BaseType::SampledImage,
        }
    }

    /// Ordered parameter list. The count and kind of each slot is fixed per
    /// base type.
    pub fn parameters(&self) -> Vec<TypeParam> {
        match &self.kind {
            TypeKind::Void | TypeKind::Bool | TypeKind::Sampler => Vec::new(),
            TypeKind::Int { width, signed } => {
                vec![TypeParam::Literal(*width as i32), TypeParam::Literal(*signed as i32)]
            }
            TypeKind::Float { width } => vec![TypeParam::Literal(*width as i32)],
            TypeKind::Vector { component, count } => {
                vec![TypeParam::Type(*component), TypeParam::Literal(*count as i32)]
            }
            TypeKind::Matrix { column, count } => {
                vec![TypeParam::Type(*column), TypeParam::Literal(*count as i32)]
            }
            TypeKind::Struct { members } => members.iter().map(|m| TypeParam::Type(m.ty)).collect(),
            TypeKind::FixedArray { element, length } => {
                vec![TypeParam::Type(*element), TypeParam::Literal(*length as i32)]
            }
            TypeKind::RuntimeArray { element } => vec![TypeParam::Type(*element)],
            TypeKind::Pointer { pointee, storage } => {
                vec![TypeParam::Literal(storage.code() as i32), TypeParam::Type(*pointee)]
            }
            TypeKind::Function { ret, params } => std::iter::once(TypeParam::Type(*ret))
                .chain(params.iter().map(|p| TypeParam::Type(*p)))
                .collect(),
            TypeKind::Image { sampled_type, params } => vec![
                TypeParam::Type(*sampled_type),
                params.dim.clone(),
                params.depth.clone(),
                params.arrayed.clone(),
                params.multisampled.clone(),
                params.sampled.clone(),
                params.format.clone(),
            ],
            TypeKind::SampledImage { image } => vec![TypeParam::Type(*image)],
        }
    }

    /// Reads a single parameter slot
    pub fn parameter(&self, index: usize) -> Option<TypeParam> {
        self.parameters().into_iter().nth(index)
    }

    /// Sub-types this type depends on, in declaration order
    pub fn referenced_types(&self) -> Vec<TypeId> {
        self.parameters().iter().filter_map(TypeParam::as_type).collect()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, TypeKind::Bool | TypeKind::Int { .. } | TypeKind::Float { .. })
    }

    pub fn is_opaque(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Sampler | TypeKind::Image { .. } | TypeKind::SampledImage { .. }
        )
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_type())?;
        let params = self.parameters();
        if !params.is_empty() {
            write!(f, "<")?;
            for (i, p) in params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", p)?;
            }
            write!(f, ">")?;
        }
        if !self.name.is_empty() {
            write!(f, " \"{}\"", self.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_parameters_have_fixed_slots() {
        let image = IrType::new(
            "Image2d",
            TypeKind::Image {
                sampled_type: TypeId(0),
                params: ImageParams::sampled_2d().with_depth(true),
            },
        );
        let params = image.parameters();
        assert_eq!(params.len(), IMAGE_PARAM_COUNT);
        assert_eq!(params[IMAGE_SAMPLED_TYPE], TypeParam::Type(TypeId(0)));
        assert_eq!(params[IMAGE_DIM], TypeParam::Literal(dim::DIM_2D));
        assert_eq!(params[IMAGE_DEPTH], TypeParam::Literal(1));
        assert_eq!(params[IMAGE_SAMPLED], TypeParam::Literal(1));
    }

    #[test]
    fn test_referenced_types_skip_literals() {
        let vec3 = IrType::new("Real3", TypeKind::Vector { component: TypeId(2), count: 3 });
        assert_eq!(vec3.referenced_types(), vec![TypeId(2)]);

        let func = IrType::new(
            "",
            TypeKind::Function { ret: TypeId(0), params: vec![TypeId(4), TypeId(4)] },
        );
        assert_eq!(func.referenced_types(), vec![TypeId(0), TypeId(4), TypeId(4)]);
    }

    #[test]
    fn test_display() {
        let ty = IrType::new("Real4", TypeKind::Vector { component: TypeId(1), count: 4 });
        assert_eq!(ty.to_string(), "vector<%t1, 4> \"Real4\"");
    }
}
