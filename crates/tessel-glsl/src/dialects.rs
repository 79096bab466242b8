//! Concrete GLSL dialects

use crate::builder::CodeBuilder;
use crate::translator::{CapabilitySupport, GlslTranslator, InterfaceVariable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tessel_analysis::Capability;
use tessel_ir::{ShaderStage, StorageClass};

/// Desktop GLSL 1.30: no geometry stage, no uniform blocks, no bool
/// uniforms
#[derive(Debug, Clone, Copy, Default)]
pub struct Glsl130;

impl GlslTranslator for Glsl130 {
    fn full_language_string(&self) -> &'static str {
        "Glsl130"
    }

    fn language_version_number(&self) -> u32 {
        130
    }

    fn supports_fragment_type(&self, stage: ShaderStage) -> bool {
        matches!(stage, ShaderStage::Vertex | ShaderStage::Pixel)
    }

    fn supports_native_bool(&self, storage: StorageClass) -> bool {
        !matches!(storage, StorageClass::Input | StorageClass::Output | StorageClass::Uniform)
    }

    fn supports_uniform_blocks(&self) -> bool {
        false
    }

    fn capability_support(&self, capability: Capability) -> CapabilitySupport {
        match capability {
            Capability::Geometry
            | Capability::CullDistance
            | Capability::SampledCubeArray
            | Capability::StorageImage
            | Capability::Int64
            | Capability::Float64 => CapabilitySupport::Unavailable,
            _ => CapabilitySupport::Core,
        }
    }
}

/// Desktop GLSL 1.50
#[derive(Debug, Clone, Copy, Default)]
pub struct Glsl150;

impl GlslTranslator for Glsl150 {
    fn full_language_string(&self) -> &'static str {
        "Glsl150"
    }

    fn language_version_number(&self) -> u32 {
        150
    }

    fn supports_fragment_type(&self, stage: ShaderStage) -> bool {
        matches!(stage, ShaderStage::Vertex | ShaderStage::Geometry | ShaderStage::Pixel)
    }
}

/// GLSL ES 3.00 for WebGL 2 and mobile targets
#[derive(Debug, Clone, Copy, Default)]
pub struct GlslEs300;

impl GlslTranslator for GlslEs300 {
    fn full_language_string(&self) -> &'static str {
        "GlslEs300"
    }

    fn language_version_number(&self) -> u32 {
        300
    }

    fn version_string(&self) -> String {
        "#version 300 es".into()
    }

    fn supports_fragment_type(&self, stage: ShaderStage) -> bool {
        matches!(stage, ShaderStage::Vertex | ShaderStage::Pixel)
    }

    fn capability_support(&self, capability: Capability) -> CapabilitySupport {
        match capability {
            Capability::Geometry
            | Capability::Sampled1D
            | Capability::Float64
            | Capability::Int64
            | Capability::ClipDistance
            | Capability::CullDistance
            | Capability::SampledCubeArray
            | Capability::StorageImage => CapabilitySupport::Unavailable,
            _ => CapabilitySupport::Core,
        }
    }

    fn precision_header(&self) -> &'static [&'static str] {
        &["precision highp float;", "precision highp int;"]
    }

    fn write_input_declaration(&self, builder: &mut CodeBuilder, stage: ShaderStage, input: &InterfaceVariable) {
        match input.location {
            Some(location) if stage == ShaderStage::Vertex => {
                builder.line(format!("layout(location = {}) {}", location, input.qualified("in")))
            }
            _ => builder.line(input.qualified("in")),
        }
    }

    fn write_output_declaration(&self, builder: &mut CodeBuilder, stage: ShaderStage, output: &InterfaceVariable) {
        match output.location {
            Some(location) if stage == ShaderStage::Pixel => {
                builder.line(format!("layout(location = {}) {}", location, output.qualified("out")))
            }
            _ => builder.line(output.qualified("out")),
        }
    }
}

/// Selectable GLSL target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Glsl130,
    Glsl150,
    GlslEs300,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Glsl130, Dialect::Glsl150, Dialect::GlslEs300];

    /// Command-line spelling
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Glsl130 => "glsl130",
            Dialect::Glsl150 => "glsl150",
            Dialect::GlslEs300 => "glsl-es300",
        }
    }

    /// Accepts the command-line spelling or the dialect's language string,
    /// in any case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dialect| {
            dialect.name().eq_ignore_ascii_case(name)
                || dialect.translator().full_language_string().eq_ignore_ascii_case(name)
        })
    }

    pub fn translator(self) -> Arc<dyn GlslTranslator> {
        match self {
            Dialect::Glsl130 => Arc::new(Glsl130),
            Dialect::Glsl150 => Arc::new(Glsl150),
            Dialect::GlslEs300 => Arc::new(GlslEs300),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            let known: Vec<&str> = Self::ALL.iter().map(|d| d.name()).collect();
            format!("unknown GLSL dialect `{}` (expected one of {})", s, known.join(", "))
        })
    }
}
