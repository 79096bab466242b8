//! Shader stage reflection
//!
//! Describes the resources a translated stage exposes: uniform blocks,
//! sampled and storage images, storage buffers and the stage interface.
//! Block member offsets and sizes follow std140 rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessel_ir::{
    BaseType, EntryPoint, IrError, IrType, ShaderIrLibrary, ShaderStage, StorageClass, TypeId, TypeKind, Variable,
    VariableId,
};

/// Placement of one resource or block member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReflection {
    pub instance_name: String,
    pub type_name: String,
    pub size_in_bytes: u32,
    pub offset_in_bytes: u32,
    /// Element stride of arrays, zero otherwise
    pub stride: u32,
    pub binding: Option<u32>,
    pub location: Option<u32>,
    pub descriptor_set: Option<u32>,
}

/// A resource together with its members
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResource {
    pub reflection: ResourceReflection,
    pub members: Vec<ResourceReflection>,
    /// Member name -> index into `members`
    pub lookup: BTreeMap<String, usize>,
}

impl StageResource {
    pub fn new(reflection: ResourceReflection) -> Self {
        Self {
            reflection,
            members: Vec::new(),
            lookup: BTreeMap::new(),
        }
    }

    pub fn push_member(&mut self, member: ResourceReflection) {
        self.lookup.insert(member.instance_name.clone(), self.members.len());
        self.members.push(member);
    }

    pub fn member(&self, name: &str) -> Option<&ResourceReflection> {
        self.lookup.get(name).and_then(|&i| self.members.get(i))
    }

    pub fn name(&self) -> &str {
        &self.reflection.instance_name
    }
}

/// Everything a runtime needs to bind a translated stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderStageReflection {
    pub shader_type_name: String,
    pub stage: Option<ShaderStage>,
    pub uniforms: Vec<StageResource>,
    pub sampled_images: Vec<StageResource>,
    pub stage_inputs: Vec<StageResource>,
    pub stage_outputs: Vec<StageResource>,
    pub storage_buffers: Vec<StageResource>,
    pub storage_images: Vec<StageResource>,
    /// Separate image name -> combined samplers it was folded into
    #[serde(default)]
    pub image_remappings: BTreeMap<String, Vec<String>>,
    /// Separate sampler name -> combined samplers it was folded into
    #[serde(default)]
    pub sampler_remappings: BTreeMap<String, Vec<String>>,
}

impl ShaderStageReflection {
    /// Reflects the interface globals of `entry`
    pub fn extract(
        library: &ShaderIrLibrary,
        entry: &EntryPoint,
        globals: &[VariableId],
    ) -> Result<Self, IrError> {
        let mut reflection = Self {
            shader_type_name: entry.name.clone(),
            stage: Some(entry.stage),
            ..Self::default()
        };

        for &id in globals {
            let variable = library.variable(id)?;
            let ty = library.ty(variable.ty)?;
            let resource = reflect_variable(library, variable, ty)?;

            match (variable.storage_class, ty.base_type()) {
                (StorageClass::Uniform, _) => reflection.uniforms.push(resource),
                (StorageClass::StorageBuffer, _) => reflection.storage_buffers.push(resource),
                (StorageClass::Image, _) => reflection.storage_images.push(resource),
                (StorageClass::UniformConstant, BaseType::Image) if is_storage_image(ty) => {
                    reflection.storage_images.push(resource)
                }
                (StorageClass::UniformConstant, BaseType::Image | BaseType::SampledImage) => {
                    reflection.sampled_images.push(resource)
                }
                (StorageClass::Input, _) if variable.decorations.built_in.is_none() => {
                    reflection.stage_inputs.push(resource)
                }
                (StorageClass::Output, _) if variable.decorations.built_in.is_none() => {
                    reflection.stage_outputs.push(resource)
                }
                _ => {}
            }
        }
        Ok(reflection)
    }

    pub fn resources(&self) -> impl Iterator<Item = &StageResource> {
        self.uniforms
            .iter()
            .chain(&self.sampled_images)
            .chain(&self.stage_inputs)
            .chain(&self.stage_outputs)
            .chain(&self.storage_buffers)
            .chain(&self.storage_images)
    }

    pub fn find(&self, instance_name: &str) -> Option<&StageResource> {
        self.resources().find(|r| r.name() == instance_name)
    }

    /// Keeps only resources whose instance name passes `keep`
    pub fn retain_resources(&mut self, mut keep: impl FnMut(&str) -> bool) {
        for list in [
            &mut self.uniforms,
            &mut self.sampled_images,
            &mut self.stage_inputs,
            &mut self.stage_outputs,
            &mut self.storage_buffers,
            &mut self.storage_images,
        ] {
            list.retain(|r| keep(r.name()));
        }
    }

    /// Every binding slot claimed by a uniform, image or buffer
    pub fn used_bindings(&self) -> Vec<u32> {
        let mut bindings: Vec<u32> = self
            .uniforms
            .iter()
            .chain(&self.sampled_images)
            .chain(&self.storage_buffers)
            .chain(&self.storage_images)
            .filter_map(|r| r.reflection.binding)
            .collect();
        bindings.sort_unstable();
        bindings.dedup();
        bindings
    }

    pub fn is_empty(&self) -> bool {
        self.resources().next().is_none()
    }
}

fn is_storage_image(ty: &IrType) -> bool {
    tessel_ir::ImageTypeView::of(ty).is_some_and(|v| v.is_storage())
}

fn reflect_variable(library: &ShaderIrLibrary, variable: &Variable, ty: &IrType) -> Result<StageResource, IrError> {
    let layout = Layout::of(library, variable.ty)?;
    let mut resource = StageResource::new(ResourceReflection {
        instance_name: variable.name.clone(),
        type_name: type_name(ty),
        size_in_bytes: layout.size,
        offset_in_bytes: 0,
        stride: layout.stride,
        binding: variable.decorations.binding,
        location: variable.decorations.location,
        descriptor_set: variable.decorations.descriptor_set,
    });

    if let TypeKind::Struct { members } = &ty.kind {
        let mut offset = 0;
        for member in members {
            let member_layout = Layout::of(library, member.ty)?;
            offset = round_up(offset, member_layout.align);
            resource.push_member(ResourceReflection {
                instance_name: member.name.clone(),
                type_name: type_name(library.ty(member.ty)?),
                size_in_bytes: member_layout.size,
                offset_in_bytes: offset,
                stride: member_layout.stride,
                ..ResourceReflection::default()
            });
            offset += member_layout.size;
        }
    }
    Ok(resource)
}

fn type_name(ty: &IrType) -> String {
    if ty.name.is_empty() {
        ty.base_type().to_string()
    } else {
        ty.name.clone()
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// std140 size, alignment and array stride of a type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: u32,
    pub align: u32,
    pub stride: u32,
}

impl Layout {
    const OPAQUE: Layout = Layout { size: 0, align: 1, stride: 0 };

    fn plain(size: u32, align: u32) -> Self {
        Self { size, align, stride: 0 }
    }

    pub fn of(library: &ShaderIrLibrary, id: TypeId) -> Result<Self, IrError> {
        let ty = library.ty(id)?;
        Ok(match &ty.kind {
            TypeKind::Bool => Layout::plain(4, 4),
            TypeKind::Int { width, .. } | TypeKind::Float { width } => {
                let bytes = width / 8;
                Layout::plain(bytes, bytes)
            }
            TypeKind::Vector { component, count } => {
                let scalar = Self::of(library, *component)?.size;
                let align = if *count == 2 { scalar * 2 } else { scalar * 4 };
                Layout::plain(scalar * count, align)
            }
            TypeKind::Matrix { column, count } => {
                let column = Self::of(library, *column)?;
                let column_stride = round_up(column.size, 16);
                Layout { size: column_stride * count, align: 16, stride: column_stride }
            }
            TypeKind::FixedArray { element, length } => {
                let element = Self::of(library, *element)?;
                let stride = round_up(element.size, element.align.max(16));
                Layout { size: stride * length, align: 16, stride }
            }
            TypeKind::RuntimeArray { element } => {
                let element = Self::of(library, *element)?;
                let stride = round_up(element.size, element.align.max(16));
                Layout { size: 0, align: 16, stride }
            }
            TypeKind::Struct { members } => {
                let mut offset = 0;
                for member in members {
                    let member = Self::of(library, member.ty)?;
                    offset = round_up(offset, member.align) + member.size;
                }
                Layout::plain(round_up(offset, 16), 16)
            }
            TypeKind::Void
            | TypeKind::Pointer { .. }
            | TypeKind::Function { .. }
            | TypeKind::Sampler
            | TypeKind::Image { .. }
            | TypeKind::SampledImage { .. } => Layout::OPAQUE,
        })
    }
}
