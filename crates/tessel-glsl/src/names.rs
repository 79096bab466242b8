//! Identifier mangling
//!
//! Every emitted identifier goes through a [`NameTable`] so duplicates,
//! GLSL keywords and reserved prefixes never reach the output.

use rustc_hash::FxHashSet;

const RESERVED: &[&str] = &[
    // keywords
    "attribute", "const", "uniform", "varying", "layout", "centroid", "flat", "smooth", "noperspective",
    "break", "continue", "do", "for", "while", "switch", "case", "default", "if", "else", "in", "out",
    "inout", "true", "false", "invariant", "discard", "return", "struct", "precision", "highp", "mediump",
    "lowp", "main",
    // types
    "void", "bool", "int", "uint", "float", "double", "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4",
    "uvec2", "uvec3", "uvec4", "bvec2", "bvec3", "bvec4", "dvec2", "dvec3", "dvec4", "mat2", "mat3",
    "mat4", "sampler1D", "sampler2D", "sampler3D", "samplerCube", "sampler2DShadow", "sampler2DArray",
    // reserved for future use
    "common", "partition", "active", "asm", "class", "union", "enum", "typedef", "template", "this",
    "packed", "goto", "inline", "noinline", "volatile", "public", "static", "extern", "external",
    "interface", "long", "short", "half", "fixed", "unsigned", "superp", "input", "output", "filter",
    "sizeof", "cast", "namespace", "using", "sample", "patch", "buffer", "shared", "coherent",
    "restrict", "readonly", "writeonly", "resource",
    // built-in functions the translator calls
    "texture", "textureLod", "texelFetch", "textureSize", "mix", "dot", "mod", "dFdx", "dFdy", "fwidth",
    "EmitVertex", "EndPrimitive", "equal", "notEqual", "lessThan", "lessThanEqual", "greaterThan",
    "greaterThanEqual", "not", "floatBitsToInt", "floatBitsToUint", "intBitsToFloat", "uintBitsToFloat",
    "round", "roundEven", "trunc", "abs", "sign", "floor", "ceil", "fract", "radians", "degrees", "sin",
    "cos", "tan", "asin", "acos", "atan", "sinh", "cosh", "tanh", "asinh", "acosh", "atanh", "pow", "exp",
    "log", "exp2", "log2", "sqrt", "inversesqrt", "determinant", "inverse", "modf", "min", "max", "clamp",
    "step", "smoothstep", "ldexp", "length", "distance", "cross", "normalize", "faceforward", "reflect",
    "refract",
];

/// Turns an arbitrary name into a legal GLSL identifier
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        // "__" is reserved anywhere in an identifier
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    if out.is_empty() || out == "_" {
        return "v".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if out.starts_with("gl_") {
        out.insert_str(0, "u_");
    }
    out
}

/// Set of identifiers already handed out in one scope
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    used: FxHashSet<String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reserved(name: &str) -> bool {
        RESERVED.contains(&name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    /// Claims `name` exactly; used for identifiers fixed by the target
    pub fn claim(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    /// Claims the first free spelling of `name`
    pub fn unique(&mut self, name: &str) -> String {
        let base = sanitize(name);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while Self::is_reserved(&candidate) || self.used.contains(&candidate) {
            candidate = if base.ends_with('_') {
                format!("{}{}", base, suffix)
            } else {
                format!("{}_{}", base, suffix)
            };
            suffix += 1;
        }
        self.used.insert(candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_get_suffixes() {
        let mut names = NameTable::new();
        assert_eq!(names.unique("Color"), "Color");
        assert_eq!(names.unique("Color"), "Color_1");
        assert_eq!(names.unique("Color"), "Color_2");
    }

    #[test]
    fn test_reserved_and_illegal_names() {
        let mut names = NameTable::new();
        assert_eq!(names.unique("main"), "main_1");
        assert_eq!(names.unique("out"), "out_1");
        assert_eq!(names.unique("gl_Position"), "u_gl_Position");
        assert_eq!(names.unique("my__value"), "my_value");
        assert_eq!(names.unique("Material.Roughness"), "Material_Roughness");
        assert_eq!(names.unique("3d"), "_3d");
        assert_eq!(names.unique(""), "v");
        assert_eq!(names.unique(""), "v_1");
    }

    #[test]
    fn test_claimed_names_are_avoided() {
        let mut names = NameTable::new();
        names.claim("Scale");
        assert!(names.contains("Scale"));
        assert_eq!(names.unique("Scale"), "Scale_1");
    }
}
