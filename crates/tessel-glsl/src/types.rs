//! IR types to GLSL type names

use crate::error::TranslateError;
use rustc_hash::FxHashMap;
use tessel_ir::types::dim;
use tessel_ir::{
    ImageTypeView, IntrinsicShape, IntrinsicsLibrary, IrType, SampledImageTypeView, ShaderIrLibrary, TypeId,
    TypeKind,
};

/// `sampler2D`, `isamplerCube`, `sampler2DArrayShadow`, `image2D`...
pub fn image_type_name(prefix: &str, dimension: i32, depth: bool, arrayed: bool, storage: bool) -> Option<String> {
    let dim_name = match dimension {
        dim::DIM_1D => "1D",
        dim::DIM_2D => "2D",
        dim::DIM_3D => "3D",
        dim::CUBE => "Cube",
        _ => return None,
    };
    let mut name = format!("{}{}{}", prefix, if storage { "image" } else { "sampler" }, dim_name);
    if arrayed {
        name.push_str("Array");
    }
    if depth && !storage {
        name.push_str("Shadow");
    }
    Some(name)
}

fn vector_prefix(component: &TypeKind) -> Option<&'static str> {
    match component {
        TypeKind::Bool => Some("bvec"),
        TypeKind::Int { signed: true, .. } => Some("ivec"),
        TypeKind::Int { signed: false, .. } => Some("uvec"),
        TypeKind::Float { width: 64 } => Some("dvec"),
        TypeKind::Float { .. } => Some("vec"),
        _ => None,
    }
}

/// GLSL spellings of the engine's built-in types, keyed by engine name
#[derive(Debug, Clone, Default)]
pub struct NativeTypes {
    names: FxHashMap<String, String>,
}

impl NativeTypes {
    /// Registers every built-in that has a GLSL spelling
    pub fn from_intrinsics(intrinsics: &IntrinsicsLibrary) -> Self {
        let mut names = FxHashMap::default();
        for intrinsic in intrinsics.iter() {
            if let Some(native) = Self::shape_name(intrinsics, &intrinsic.shape) {
                names.insert(intrinsic.name.to_string(), native);
            }
        }
        Self { names }
    }

    fn shape_name(intrinsics: &IntrinsicsLibrary, shape: &IntrinsicShape) -> Option<String> {
        let named = |name: &str| intrinsics.get(name).map(|t| &t.shape);
        match shape {
            IntrinsicShape::Void => Some("void".into()),
            IntrinsicShape::Bool => Some("bool".into()),
            IntrinsicShape::Int => Some("int".into()),
            IntrinsicShape::Float => Some("float".into()),
            IntrinsicShape::Vector { component, count } => {
                let prefix = match named(component)? {
                    IntrinsicShape::Bool => "bvec",
                    IntrinsicShape::Int => "ivec",
                    IntrinsicShape::Float => "vec",
                    _ => return None,
                };
                Some(format!("{}{}", prefix, count))
            }
            IntrinsicShape::Matrix { column, count } => match named(column)? {
                IntrinsicShape::Vector { count: rows, .. } if rows == count => Some(format!("mat{}", count)),
                IntrinsicShape::Vector { count: rows, .. } => Some(format!("mat{}x{}", count, rows)),
                _ => None,
            },
            // No standalone sampler objects in these dialects
            IntrinsicShape::Sampler => None,
            IntrinsicShape::Image { dim, depth, arrayed, storage_format } => {
                image_type_name("", *dim, *depth, *arrayed, storage_format.is_some())
            }
            IntrinsicShape::SampledImage { image } => Self::shape_name(intrinsics, named(image)?),
        }
    }

    pub fn get(&self, engine_name: &str) -> Option<&str> {
        self.names.get(engine_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Names IR types for one translation
pub struct TypeNamer<'a> {
    library: &'a ShaderIrLibrary,
    natives: &'a NativeTypes,
    /// Mangled names of struct types
    structs: FxHashMap<TypeId, String>,
}

impl<'a> TypeNamer<'a> {
    pub fn new(library: &'a ShaderIrLibrary, natives: &'a NativeTypes) -> Self {
        Self {
            library,
            natives,
            structs: FxHashMap::default(),
        }
    }

    pub fn set_struct_name(&mut self, id: TypeId, name: String) {
        self.structs.insert(id, name);
    }

    pub fn ty(&self, id: TypeId) -> Result<&'a IrType, TranslateError> {
        Ok(self.library.ty(id)?)
    }

    /// Strips pointer types down to what they point at
    pub fn value_type(&self, id: TypeId) -> Result<TypeId, TranslateError> {
        match &self.ty(id)?.kind {
            TypeKind::Pointer { pointee, .. } => self.value_type(*pointee),
            _ => Ok(id),
        }
    }

    pub fn name(&self, id: TypeId) -> Result<String, TranslateError> {
        let ty = self.ty(id)?;
        if let Some(native) = self.natives.get(&ty.name) {
            return Ok(native.to_string());
        }
        match &ty.kind {
            TypeKind::Void => Ok("void".into()),
            TypeKind::Bool => Ok("bool".into()),
            TypeKind::Int { width: 32, signed: true } => Ok("int".into()),
            TypeKind::Int { width: 32, signed: false } => Ok("uint".into()),
            TypeKind::Float { width: 32 } => Ok("float".into()),
            TypeKind::Float { width: 64 } => Ok("double".into()),
            TypeKind::Int { width, .. } | TypeKind::Float { width } => {
                Err(TranslateError::construct(format!("{}-bit scalars", width)))
            }
            TypeKind::Vector { component, count } => {
                let component = self.ty(*component)?;
                let prefix = vector_prefix(&component.kind)
                    .ok_or_else(|| TranslateError::construct(format!("vectors of {}", component)))?;
                Ok(format!("{}{}", prefix, count))
            }
            TypeKind::Matrix { column, count } => match &self.ty(*column)?.kind {
                TypeKind::Vector { count: rows, .. } if rows == count => Ok(format!("mat{}", count)),
                TypeKind::Vector { count: rows, .. } => Ok(format!("mat{}x{}", count, rows)),
                _ => Err(TranslateError::construct("matrices of non-vector columns")),
            },
            TypeKind::Struct { .. } => self
                .structs
                .get(&id)
                .cloned()
                .ok_or_else(|| TranslateError::construct(format!("undeclared struct {}", id))),
            TypeKind::FixedArray { element, length } => Ok(format!("{}[{}]", self.name(*element)?, length)),
            TypeKind::RuntimeArray { .. } => Err(TranslateError::construct("runtime arrays outside buffers")),
            TypeKind::Pointer { pointee, .. } => self.name(*pointee),
            TypeKind::Function { .. } => Err(TranslateError::construct("function types as values")),
            TypeKind::Sampler => Err(TranslateError::construct("a sampler that is never combined with an image")),
            TypeKind::Image { .. } => self.image_name(ty),
            TypeKind::SampledImage { .. } => {
                let image = SampledImageTypeView::of(ty)
                    .and_then(|v| v.image_type())
                    .ok_or_else(|| TranslateError::construct("a sampled image without an image"))?;
                self.image_name(self.ty(image)?)
            }
        }
    }

    fn image_name(&self, ty: &IrType) -> Result<String, TranslateError> {
        let view = ImageTypeView::of(ty).ok_or_else(|| TranslateError::construct(format!("malformed image {}", ty)))?;
        let prefix = match view.sampled_type().map(|t| self.ty(t)).transpose()?.map(|t| &t.kind) {
            Some(TypeKind::Int { signed: true, .. }) => "i",
            Some(TypeKind::Int { signed: false, .. }) => "u",
            _ => "",
        };
        image_type_name(prefix, view.dim(), view.depth() == 1, view.arrayed() == 1, view.is_storage())
            .ok_or_else(|| TranslateError::construct(format!("image with dimensionality {}", view.dim())))
    }

    /// `float name`, `vec4 name[3]`
    pub fn declare(&self, id: TypeId, ident: &str) -> Result<String, TranslateError> {
        let mut suffix = String::new();
        let mut current = self.value_type(id)?;
        loop {
            match &self.ty(current)?.kind {
                TypeKind::FixedArray { element, length } => {
                    suffix.push_str(&format!("[{}]", length));
                    current = *element;
                }
                TypeKind::RuntimeArray { element } => {
                    suffix.push_str("[]");
                    current = *element;
                }
                _ => break,
            }
        }
        Ok(format!("{} {}{}", self.name(current)?, ident, suffix))
    }

    /// Component count of a bool scalar (1) or bool vector, `None` otherwise
    pub fn bool_components(&self, id: TypeId) -> Result<Option<u32>, TranslateError> {
        Ok(match &self.ty(self.value_type(id)?)?.kind {
            TypeKind::Bool => Some(1),
            TypeKind::Vector { component, count } => {
                matches!(self.ty(*component)?.kind, TypeKind::Bool).then_some(*count)
            }
            _ => None,
        })
    }

    /// Integer stand-in for a bool type where native bools are not allowed
    pub fn bool_substitute(components: u32) -> String {
        if components == 1 {
            "int".into()
        } else {
            format!("ivec{}", components)
        }
    }

    pub fn library(&self) -> &'a ShaderIrLibrary {
        self.library
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_ir::{ImageParams, StructMember, TypeParam};

    #[test]
    fn test_native_names_for_intrinsics() {
        let natives = NativeTypes::from_intrinsics(&IntrinsicsLibrary::standard());
        assert_eq!(natives.get("Real4"), Some("vec4"));
        assert_eq!(natives.get("Integer3"), Some("ivec3"));
        assert_eq!(natives.get("Boolean2"), Some("bvec2"));
        assert_eq!(natives.get("Real4x4"), Some("mat4"));
        assert_eq!(natives.get("SampledDepthImage2d"), Some("sampler2DShadow"));
        assert_eq!(natives.get("ImageCube"), Some("samplerCube"));
        assert_eq!(natives.get("StorageImage2d"), Some("image2D"));
        assert_eq!(natives.get("Sampler"), None);
    }

    #[test]
    fn test_structural_names() {
        let natives = NativeTypes::default();
        let mut library = ShaderIrLibrary::new("Types");
        let real = library.add_type(IrType::new("", TypeKind::Float { width: 32 }));
        let uint = library.add_type(IrType::new("", TypeKind::Int { width: 32, signed: false }));
        let vec3 = library.add_type(IrType::new("", TypeKind::Vector { component: real, count: 3 }));
        let mat = library.add_type(IrType::new("", TypeKind::Matrix { column: vec3, count: 4 }));
        let array = library.add_type(IrType::new("", TypeKind::FixedArray { element: vec3, length: 8 }));
        let light = library.add_type(IrType::new(
            "Light",
            TypeKind::Struct { members: vec![StructMember::new("Direction", vec3)] },
        ));
        let image = library.add_type(IrType::new(
            "",
            TypeKind::Image { sampled_type: uint, params: ImageParams::sampled_2d().with_arrayed(true) },
        ));

        let mut namer = TypeNamer::new(&library, &natives);
        namer.set_struct_name(light, "Light".into());
        assert_eq!(namer.name(vec3).unwrap(), "vec3");
        assert_eq!(namer.name(mat).unwrap(), "mat4x3");
        assert_eq!(namer.name(light).unwrap(), "Light");
        assert_eq!(namer.name(image).unwrap(), "usampler2DArray");
        assert_eq!(namer.declare(array, "Normals").unwrap(), "vec3 Normals[8]");
        assert_eq!(namer.declare(real, "x").unwrap(), "float x");
    }

    #[test]
    fn test_symbolic_image_dimension_is_rejected() {
        let natives = NativeTypes::default();
        let mut library = ShaderIrLibrary::new("Symbolic");
        let real = library.add_type(IrType::new("", TypeKind::Float { width: 32 }));
        let image = library.add_type(IrType::new(
            "",
            TypeKind::Image {
                sampled_type: real,
                params: ImageParams::sampled_2d().with_dim(TypeParam::Symbol("Dim".into())),
            },
        ));
        let namer = TypeNamer::new(&library, &natives);
        assert_eq!(
            namer.name(image),
            Err(TranslateError::construct("image with dimensionality -1"))
        );
    }
}
