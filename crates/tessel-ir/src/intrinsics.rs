//! Intrinsics library
//!
//! Built-in types (scalars, vectors, matrices, samplers, images) known by
//! their engine names. One instance is shared process-wide: call [`init`]
//! once at startup, read it through [`get`], and tear it down with
//! [`shutdown`]. Translations only ever read it.

use crate::library::{IrError, ShaderIrLibrary};
use crate::node::{StorageClass, TypeId};
use crate::types::{dim, format, ImageParams, IrType, TypeKind, TypeParam};
use parking_lot::RwLock;
use std::sync::Arc;

/// Shape of a built-in type, with sub-types named by engine name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntrinsicShape {
    Void,
    Bool,
    Int,
    Float,
    Vector { component: &'static str, count: u32 },
    Matrix { column: &'static str, count: u32 },
    Sampler,
    Image { dim: i32, depth: bool, arrayed: bool, storage_format: Option<i32> },
    SampledImage { image: &'static str },
}

/// A built-in type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrinsicType {
    pub name: &'static str,
    pub shape: IntrinsicShape,
}

/// Table of built-in types
#[derive(Debug, Clone, Default)]
pub struct IntrinsicsLibrary {
    types: Vec<IntrinsicType>,
}

impl IntrinsicsLibrary {
    /// The engine's standard built-ins
    pub fn standard() -> Self {
        use IntrinsicShape::*;

        let mut types = vec![
            IntrinsicType { name: "Void", shape: Void },
            IntrinsicType { name: "Boolean", shape: Bool },
            IntrinsicType { name: "Integer", shape: Int },
            IntrinsicType { name: "Real", shape: Float },
        ];
        for (name, component, count) in [
            ("Boolean2", "Boolean", 2),
            ("Boolean3", "Boolean", 3),
            ("Boolean4", "Boolean", 4),
            ("Integer2", "Integer", 2),
            ("Integer3", "Integer", 3),
            ("Integer4", "Integer", 4),
            ("Real2", "Real", 2),
            ("Real3", "Real", 3),
            ("Real4", "Real", 4),
        ] {
            types.push(IntrinsicType { name, shape: Vector { component, count } });
        }
        types.extend([
            IntrinsicType { name: "Real2x2", shape: Matrix { column: "Real2", count: 2 } },
            IntrinsicType { name: "Real3x3", shape: Matrix { column: "Real3", count: 3 } },
            IntrinsicType { name: "Real4x4", shape: Matrix { column: "Real4", count: 4 } },
            IntrinsicType { name: "Sampler", shape: Sampler },
            IntrinsicType {
                name: "Image2d",
                shape: Image { dim: dim::DIM_2D, depth: false, arrayed: false, storage_format: None },
            },
            IntrinsicType {
                name: "DepthImage2d",
                shape: Image { dim: dim::DIM_2D, depth: true, arrayed: false, storage_format: None },
            },
            IntrinsicType {
                name: "ImageCube",
                shape: Image { dim: dim::CUBE, depth: false, arrayed: false, storage_format: None },
            },
            IntrinsicType {
                name: "StorageImage2d",
                shape: Image { dim: dim::DIM_2D, depth: false, arrayed: false, storage_format: Some(format::RGBA32F) },
            },
            IntrinsicType { name: "SampledImage2d", shape: SampledImage { image: "Image2d" } },
            IntrinsicType { name: "SampledDepthImage2d", shape: SampledImage { image: "DepthImage2d" } },
            IntrinsicType { name: "SampledImageCube", shape: SampledImage { image: "ImageCube" } },
        ]);
        Self { types }
    }

    pub fn get(&self, name: &str) -> Option<&IntrinsicType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntrinsicType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Adds the named built-in (and anything it is built from) to `library`,
    /// reusing nodes that are already there.
    pub fn install(&self, library: &mut ShaderIrLibrary, name: &str) -> Result<TypeId, IrError> {
        let intrinsic = self
            .get(name)
            .ok_or_else(|| IrError::UnknownIntrinsic(name.to_string()))?;

        let kind = match &intrinsic.shape {
            IntrinsicShape::Void => TypeKind::Void,
            IntrinsicShape::Bool => TypeKind::Bool,
            IntrinsicShape::Int => TypeKind::Int { width: 32, signed: true },
            IntrinsicShape::Float => TypeKind::Float { width: 32 },
            IntrinsicShape::Vector { component, count } => TypeKind::Vector {
                component: self.install(library, component)?,
                count: *count,
            },
            IntrinsicShape::Matrix { column, count } => TypeKind::Matrix {
                column: self.install(library, column)?,
                count: *count,
            },
            IntrinsicShape::Sampler => TypeKind::Sampler,
            IntrinsicShape::Image { dim, depth, arrayed, storage_format } => {
                let mut params = ImageParams::sampled_2d()
                    .with_dim(TypeParam::Literal(*dim))
                    .with_depth(*depth)
                    .with_arrayed(*arrayed);
                if let Some(fmt) = storage_format {
                    params = params.storage(*fmt);
                }
                TypeKind::Image {
                    sampled_type: self.install(library, "Real")?,
                    params,
                }
            }
            IntrinsicShape::SampledImage { image } => TypeKind::SampledImage {
                image: self.install(library, image)?,
            },
        };
        Ok(library.intern_type(IrType::new(intrinsic.name, kind)))
    }

    /// Adds a pointer type to an installed built-in
    pub fn install_pointer(
        &self,
        library: &mut ShaderIrLibrary,
        name: &str,
        storage: StorageClass,
    ) -> Result<TypeId, IrError> {
        let pointee = self.install(library, name)?;
        Ok(library.intern_type(IrType::new("", TypeKind::Pointer { pointee, storage })))
    }
}

static INTRINSICS: RwLock<Option<Arc<IntrinsicsLibrary>>> = parking_lot::const_rwlock(None);

/// Initializes the process-wide intrinsics library. Later calls return the
/// existing instance.
pub fn init() -> Arc<IntrinsicsLibrary> {
    if let Some(existing) = INTRINSICS.read().as_ref() {
        return Arc::clone(existing);
    }
    let mut slot = INTRINSICS.write();
    let library = slot.get_or_insert_with(|| {
        tracing::debug!("initializing intrinsics library");
        Arc::new(IntrinsicsLibrary::standard())
    });
    Arc::clone(library)
}

/// The process-wide intrinsics library, if initialized
pub fn get() -> Option<Arc<IntrinsicsLibrary>> {
    INTRINSICS.read().clone()
}

/// Drops the process-wide instance. Holders of an `Arc` keep theirs alive.
pub fn shutdown() {
    if INTRINSICS.write().take().is_some() {
        tracing::debug!("intrinsics library shut down");
    }
}
