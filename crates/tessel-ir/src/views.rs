//! Extended type views
//!
//! Read-only adaptors that interpret a generic [`IrType`] as a domain
//! concept. A view starts empty; [`load`](ImageTypeView::load) binds it only
//! when the node's base type matches. Accessors on an empty view, or on a
//! parameter that is not a constant literal, return [`UNKNOWN`].

use crate::node::TypeId;
use crate::types::{
    BaseType, IrType, TypeParam, IMAGE_ARRAYED, IMAGE_DEPTH, IMAGE_DIM, IMAGE_FORMAT, IMAGE_MULTISAMPLED,
    IMAGE_PARAM_COUNT, IMAGE_SAMPLED, IMAGE_SAMPLED_TYPE,
};

/// Returned by accessors when a value is not statically known
pub const UNKNOWN: i32 = -1;

/// View over an image type
#[derive(Debug, Clone, Default)]
pub struct ImageTypeView {
    params: Option<Vec<TypeParam>>,
}

impl ImageTypeView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds to `ty` if it is a well-formed image type
    pub fn load(&mut self, ty: &IrType) -> bool {
        self.params = None;
        if ty.base_type() != BaseType::Image {
            return false;
        }
        let params = ty.parameters();
        if params.len() != IMAGE_PARAM_COUNT {
            return false;
        }
        self.params = Some(params);
        true
    }

    /// Loads a fresh view, returning `None` on mismatch
    pub fn of(ty: &IrType) -> Option<Self> {
        let mut view = Self::new();
        view.load(ty).then_some(view)
    }

    pub fn is_loaded(&self) -> bool {
        self.params.is_some()
    }

    fn literal(&self, index: usize) -> i32 {
        self.params
            .as_ref()
            .and_then(|p| p.get(index))
            .and_then(TypeParam::as_literal)
            .unwrap_or(UNKNOWN)
    }

    pub fn sampled_type(&self) -> Option<TypeId> {
        self.params
            .as_ref()
            .and_then(|p| p.get(IMAGE_SAMPLED_TYPE))
            .and_then(TypeParam::as_type)
    }

    pub fn dim(&self) -> i32 {
        self.literal(IMAGE_DIM)
    }

    pub fn depth(&self) -> i32 {
        self.literal(IMAGE_DEPTH)
    }

    pub fn arrayed(&self) -> i32 {
        self.literal(IMAGE_ARRAYED)
    }

    pub fn multi_sampled(&self) -> i32 {
        self.literal(IMAGE_MULTISAMPLED)
    }

    pub fn sampled(&self) -> i32 {
        self.literal(IMAGE_SAMPLED)
    }

    pub fn format(&self) -> i32 {
        self.literal(IMAGE_FORMAT)
    }

    /// Storage images are read and written without a sampler
    pub fn is_storage(&self) -> bool {
        self.sampled() == 2
    }
}

/// View over a combined image + sampler type
#[derive(Debug, Clone, Default)]
pub struct SampledImageTypeView {
    image: Option<TypeId>,
}

impl SampledImageTypeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, ty: &IrType) -> bool {
        self.image = None;
        if ty.base_type() != BaseType::SampledImage {
            return false;
        }
        self.image = ty.parameter(0).and_then(|p| p.as_type());
        self.image.is_some()
    }

    pub fn of(ty: &IrType) -> Option<Self> {
        let mut view = Self::new();
        view.load(ty).then_some(view)
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    pub fn image_type(&self) -> Option<TypeId> {
        self.image
    }
}

/// View over a runtime (unsized) array type
#[derive(Debug, Clone, Default)]
pub struct RuntimeArrayTypeView {
    element: Option<TypeId>,
}

impl RuntimeArrayTypeView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, ty: &IrType) -> bool {
        self.element = None;
        if ty.base_type() != BaseType::RuntimeArray {
            return false;
        }
        self.element = ty.parameter(0).and_then(|p| p.as_type());
        self.element.is_some()
    }

    pub fn of(ty: &IrType) -> Option<Self> {
        let mut view = Self::new();
        view.load(ty).then_some(view)
    }

    pub fn is_loaded(&self) -> bool {
        self.element.is_some()
    }

    pub fn contained_type(&self) -> Option<TypeId> {
        self.element
    }
}
