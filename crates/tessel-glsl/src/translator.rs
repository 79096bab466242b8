//! GLSL translator contract
//!
//! [`GlslTranslator`] carries the shared translation as provided methods.
//! A dialect implements the four identity methods and overrides only the
//! hooks where its syntax differs.

use crate::builder::{CodeBuilder, CodeRangeMapping};
use crate::emit;
use crate::error::TranslateError;
use crate::types::NativeTypes;
use serde::{Deserialize, Serialize};
use tessel_analysis::{Capability, DependencyCollection};
use tessel_error::Span;
use tessel_ir::{
    EntryPoint, GeometryInput, GeometryOutput, GeometrySettings, IntrinsicsLibrary, ShaderIrLibrary, ShaderStage,
    StorageClass, VariableId,
};

/// How a capability is made available in a dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilitySupport {
    Core,
    /// Needs `#extension <name> : require`
    Extension(&'static str),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlslOptions {
    /// Build a [`CodeRangeMapping`] tree alongside the text
    pub range_mappings: bool,
    /// Emit bodies of every function the entry point reaches. When off,
    /// helpers are only forward declared.
    pub walk_dependencies: bool,
    /// Give combined image samplers the first free binding slot
    pub assign_sampler_bindings: bool,
}

impl Default for GlslOptions {
    fn default() -> Self {
        Self {
            range_mappings: false,
            walk_dependencies: true,
            assign_sampler_bindings: true,
        }
    }
}

impl GlslOptions {
    pub fn with_range_mappings(mut self, enabled: bool) -> Self {
        self.range_mappings = enabled;
        self
    }

    pub fn with_walk_dependencies(mut self, enabled: bool) -> Self {
        self.walk_dependencies = enabled;
        self
    }
}

/// An image (and optional sampler) folded into one GLSL sampler uniform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedSampler {
    pub name: String,
    pub image: VariableId,
    pub sampler: Option<VariableId>,
}

/// A global that made it into the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredGlobal {
    pub variable: VariableId,
    /// Emitted identifier
    pub name: String,
    /// Interface block name, for uniform blocks
    pub block: Option<String>,
}

/// Finished GLSL for one entry point
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderTranslation {
    pub dialect: String,
    pub entry: String,
    pub stage: ShaderStage,
    pub source: String,
    pub range_mapping: Option<CodeRangeMapping>,
    pub globals: Vec<DeclaredGlobal>,
    pub combined_samplers: Vec<CombinedSampler>,
}

impl ShaderTranslation {
    /// Script location that produced emitted line `line` (1-based). Only
    /// available when range mappings were requested.
    pub fn source_location_for_line(&self, line: u32) -> Option<Span> {
        self.range_mapping.as_ref().and_then(|m| m.source_for_line(line))
    }

    pub fn global(&self, variable: VariableId) -> Option<&DeclaredGlobal> {
        self.globals.iter().find(|g| g.variable == variable)
    }
}

/// A stage input or output about to be declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceVariable {
    pub name: String,
    /// `vec4 Color`
    pub declaration: String,
    pub location: Option<u32>,
    pub flat: bool,
}

impl InterfaceVariable {
    /// `flat in vec4 Color;`
    pub fn qualified(&self, keyword: &str) -> String {
        let flat = if self.flat { "flat " } else { "" };
        format!("{}{} {};", flat, keyword, self.declaration)
    }
}

/// Statements of the synthesized `main`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainFunction {
    /// Global initializer calls, in run order
    pub initializers: Vec<String>,
    /// Call of the entry function
    pub entry_call: String,
}

pub trait GlslTranslator: Send + Sync {
    /// "Glsl150"
    fn full_language_string(&self) -> &'static str;

    fn language_version_number(&self) -> u32;

    fn version_string(&self) -> String {
        format!("#version {}", self.language_version_number())
    }

    fn supports_fragment_type(&self, stage: ShaderStage) -> bool;

    // ===== dialect hooks =====

    /// Whether `bool` may be declared with this storage class. Otherwise an
    /// integer encoding is declared and converted on access.
    fn supports_native_bool(&self, storage: StorageClass) -> bool {
        !matches!(storage, StorageClass::Input | StorageClass::Output)
    }

    fn supports_uniform_blocks(&self) -> bool {
        true
    }

    fn capability_support(&self, capability: Capability) -> CapabilitySupport {
        match capability {
            Capability::StorageImage => CapabilitySupport::Unavailable,
            Capability::Float64 => CapabilitySupport::Extension("GL_ARB_gpu_shader_fp64"),
            Capability::Int64 => CapabilitySupport::Extension("GL_ARB_gpu_shader_int64"),
            Capability::CullDistance => CapabilitySupport::Extension("GL_ARB_cull_distance"),
            Capability::SampledCubeArray => CapabilitySupport::Extension("GL_ARB_texture_cube_map_array"),
            _ => CapabilitySupport::Core,
        }
    }

    /// Lines written right after `#version`
    fn precision_header(&self) -> &'static [&'static str] {
        &[]
    }

    fn write_geometry_layout(&self, builder: &mut CodeBuilder, settings: &GeometrySettings) {
        let input = match settings.input {
            GeometryInput::Points => "points",
            GeometryInput::Lines => "lines",
            GeometryInput::Triangles => "triangles",
        };
        let output = match settings.output {
            GeometryOutput::Points => "points",
            GeometryOutput::LineStrip => "line_strip",
            GeometryOutput::TriangleStrip => "triangle_strip",
        };
        builder.line(format!("layout({}) in;", input));
        builder.line(format!("layout({}, max_vertices = {}) out;", output, settings.max_vertices));
    }

    fn write_input_declaration(&self, builder: &mut CodeBuilder, _stage: ShaderStage, input: &InterfaceVariable) {
        builder.line(input.qualified("in"));
    }

    fn write_output_declaration(&self, builder: &mut CodeBuilder, _stage: ShaderStage, output: &InterfaceVariable) {
        builder.line(output.qualified("out"));
    }

    fn write_main(&self, builder: &mut CodeBuilder, main: &MainFunction) {
        builder.open("void main()");
        for initializer in &main.initializers {
            builder.line(initializer);
        }
        builder.line(&main.entry_call);
        builder.close();
    }

    // ===== translation =====

    /// GLSL spellings for the built-in types of `intrinsics`
    fn parse_native_library(&self, intrinsics: &IntrinsicsLibrary) -> NativeTypes {
        NativeTypes::from_intrinsics(intrinsics)
    }

    /// Built-ins from the process-wide intrinsics library, initialized on
    /// first use
    fn native_types(&self) -> NativeTypes {
        let intrinsics = tessel_ir::intrinsics::get().unwrap_or_else(tessel_ir::intrinsics::init);
        self.parse_native_library(&intrinsics)
    }

    /// Collects and translates `entry`
    fn translate(
        &self,
        library: &ShaderIrLibrary,
        entry: &EntryPoint,
        options: &GlslOptions,
    ) -> Result<ShaderTranslation, TranslateError> {
        emit::translate(self, library, entry, options)
    }

    /// Emits the final text for an already collected entry point
    fn build_final_shader(
        &self,
        library: &ShaderIrLibrary,
        entry: &EntryPoint,
        collection: &DependencyCollection,
        with_range_mappings: bool,
        walk_dependencies: bool,
    ) -> Result<ShaderTranslation, TranslateError> {
        emit::build_final_shader(self, library, entry, collection, with_range_mappings, walk_dependencies)
    }
}
