//! Capability inference
//!
//! Fixed tables from IR constructs to the target features they require.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessel_ir::{BuiltIn, ImageTypeView, IrType, OpKind, ShaderStage, TypeKind};

/// A target feature that must be available for a construct to be valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    Shader,
    Geometry,
    ClipDistance,
    CullDistance,
    Float64,
    Int64,
    Sampled1D,
    SampledCubeArray,
    ImageQuery,
    StorageImage,
    Derivatives,
}

impl Capability {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        const ALL: [Capability; 11] = [
            Capability::Shader,
            Capability::Geometry,
            Capability::ClipDistance,
            Capability::CullDistance,
            Capability::Float64,
            Capability::Int64,
            Capability::Sampled1D,
            Capability::SampledCubeArray,
            Capability::ImageQuery,
            Capability::StorageImage,
            Capability::Derivatives,
        ];
        ALL.get(code as usize).copied()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Capability required by an operation kind
pub fn op_capability(kind: OpKind) -> Option<Capability> {
    match kind {
        OpKind::EmitVertex | OpKind::EndPrimitive => Some(Capability::Geometry),
        OpKind::ImageQuerySize => Some(Capability::ImageQuery),
        OpKind::ImageRead | OpKind::ImageWrite => Some(Capability::StorageImage),
        OpKind::DPdx | OpKind::DPdy | OpKind::Fwidth => Some(Capability::Derivatives),
        _ => None,
    }
}

/// Capability required by declaring a type
pub fn type_capability(ty: &IrType) -> Option<Capability> {
    match &ty.kind {
        TypeKind::Float { width: 64 } => Some(Capability::Float64),
        TypeKind::Int { width: 64, .. } => Some(Capability::Int64),
        TypeKind::Image { .. } => {
            let view = ImageTypeView::of(ty)?;
            if view.is_storage() {
                Some(Capability::StorageImage)
            } else if view.dim() == tessel_ir::types::dim::DIM_1D {
                Some(Capability::Sampled1D)
            } else if view.dim() == tessel_ir::types::dim::CUBE && view.arrayed() == 1 {
                Some(Capability::SampledCubeArray)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Capability required by a built-in decoration
pub fn built_in_capability(built_in: BuiltIn) -> Option<Capability> {
    match built_in {
        BuiltIn::ClipDistance => Some(Capability::ClipDistance),
        BuiltIn::CullDistance => Some(Capability::CullDistance),
        BuiltIn::PrimitiveId | BuiltIn::InvocationId | BuiltIn::Layer => Some(Capability::Geometry),
        _ => None,
    }
}

/// Capability required by the stage itself
pub fn stage_capability(stage: ShaderStage) -> Option<Capability> {
    match stage {
        ShaderStage::Geometry => Some(Capability::Geometry),
        _ => None,
    }
}
