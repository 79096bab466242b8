//! Binary IR codec
//!
//! Word-oriented encoding of one collected entry point, laid out like
//! SPIR-V: a five word header followed by instructions whose first word
//! packs the word count (high half) and the opcode (low half).
//!
//! ```text
//! header      magic version generator bound schema
//! module      Capability* Import* SourceName EntryPoint Geometry?
//! globals     (Line? Type | Constant | Line? Variable Decorate*)*
//! functions   (Line? Function Param* Local* (Label (Line? op)*)* FunctionEnd)*
//! ```
//!
//! Module-level nodes are renumbered from 1 in emission order; 0 means
//! "none". Function values and blocks keep their function-local numbers.
//! Op operands are `(tag, value)` pairs.

use rustc_hash::FxHashMap;
use tessel_analysis::{Capability, DependencyCollection};
use tessel_error::{Position, Span, ToolDiagnostic};
use tessel_ir::{
    BaseType, BlockId, BuiltIn, ConstantId, ConstantValue, EntryPoint, ExtensionImport, FunctionId, FunctionParam,
    GeometryInput, GeometryOutput, GeometrySettings, ImageParams, ImportId, IrConstant, IrError, IrFunction, IrOp,
    IrType, LocalVariable, NodeRef, OpKind, Operand, ShaderIrLibrary, ShaderStage, StorageClass, StructMember, TypeId,
    TypeKind, TypeParam, ValueId, Variable, VariableId,
};
use thiserror::Error;

pub const MAGIC: u32 = 0x5453_4C42;
pub const VERSION: u32 = 0x0001_0000;
pub const GENERATOR: u32 = 0x5445_0001;
pub const HEADER_WORDS: usize = 5;

const MAX_WORD_COUNT: usize = 0xFFFF;

/// Module-level opcodes. Op kinds use [`OpKind::opcode`], all below 200.
pub mod opcode {
    pub const CAPABILITY: u16 = 200;
    pub const IMPORT: u16 = 201;
    pub const SOURCE_NAME: u16 = 202;
    pub const ENTRY_POINT: u16 = 203;
    pub const GEOMETRY: u16 = 204;
    pub const TYPE: u16 = 205;
    pub const CONSTANT: u16 = 206;
    pub const VARIABLE: u16 = 207;
    pub const DECORATE: u16 = 208;
    pub const FUNCTION: u16 = 209;
    pub const PARAM: u16 = 210;
    pub const LOCAL: u16 = 211;
    pub const LABEL: u16 = 212;
    pub const FUNCTION_END: u16 = 213;
    pub const LINE: u16 = 214;

    pub fn name(code: u16) -> Option<&'static str> {
        Some(match code {
            CAPABILITY => "Capability",
            IMPORT => "Import",
            SOURCE_NAME => "SourceName",
            ENTRY_POINT => "EntryPoint",
            GEOMETRY => "Geometry",
            TYPE => "Type",
            CONSTANT => "Constant",
            VARIABLE => "Variable",
            DECORATE => "Decorate",
            FUNCTION => "Function",
            PARAM => "Param",
            LOCAL => "Local",
            LABEL => "Label",
            FUNCTION_END => "FunctionEnd",
            LINE => "Line",
            _ => return None,
        })
    }
}

/// Operand tags of op instructions
pub mod tag {
    pub const TYPE: u32 = 0;
    pub const CONSTANT: u32 = 1;
    pub const VARIABLE: u32 = 2;
    pub const FUNCTION: u32 = 3;
    pub const IMPORT: u32 = 4;
    pub const VALUE: u32 = 5;
    pub const BLOCK: u32 = 6;
    pub const LITERAL: u32 = 7;
}

mod param_tag {
    pub const TYPE: u32 = 0;
    pub const LITERAL: u32 = 1;
    pub const SYMBOL: u32 = 2;
}

mod decoration {
    pub const BINDING: u32 = 0;
    pub const SET: u32 = 1;
    pub const LOCATION: u32 = 2;
    pub const BUILT_IN: u32 = 3;
    pub const FLAT: u32 = 4;
}

mod constant_kind {
    pub const BOOL: u32 = 0;
    pub const INT: u32 = 1;
    pub const FLOAT: u32 = 2;
    pub const COMPOSITE: u32 = 3;
    pub const NULL: u32 = 4;
}

/// Encoding and decoding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("stream length {0} is not a whole number of words")]
    Misaligned(usize),

    #[error("stream too short: expected at least {expected} words, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported version {0:#010x}")]
    UnsupportedVersion(u32),

    #[error("word {index}: unknown opcode {opcode}")]
    UnknownOpcode { index: usize, opcode: u16 },

    #[error("word {index}: {reason}")]
    Malformed { index: usize, reason: String },

    #[error("word {index}: id {id} is not defined")]
    UndefinedId { index: usize, id: u32 },

    #[error("{0} is referenced but was not collected")]
    Unmapped(NodeRef),

    #[error("stream does not declare an entry point")]
    MissingEntryPoint,

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl CodecError {
    /// Word index the error points at, 0 when there is none
    pub fn index(&self) -> u32 {
        match self {
            CodecError::UnknownOpcode { index, .. }
            | CodecError::Malformed { index, .. }
            | CodecError::UndefinedId { index, .. } => *index as u32,
            _ => 0,
        }
    }

    /// The error as a record positioned at its word index
    pub fn to_tool_diagnostic(&self) -> ToolDiagnostic {
        let message = match self {
            CodecError::Malformed { reason, .. } => reason.clone(),
            CodecError::UnknownOpcode { opcode, .. } => format!("unknown opcode {}", opcode),
            CodecError::UndefinedId { id, .. } => format!("id {} is not defined", id),
            other => other.to_string(),
        };
        ToolDiagnostic::binary(self.index(), message)
    }

    fn malformed(index: usize, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            index,
            reason: reason.into(),
        }
    }
}

/// The five header words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub generator: u32,
    /// One past the highest module-level id
    pub bound: u32,
    pub schema: u32,
}

impl Header {
    pub fn read(words: &[u32]) -> Result<Self, CodecError> {
        if words.len() < HEADER_WORDS {
            return Err(CodecError::Truncated {
                expected: HEADER_WORDS,
                found: words.len(),
            });
        }
        if words[0] != MAGIC {
            return Err(CodecError::BadMagic(words[0]));
        }
        if words[1] >> 16 != VERSION >> 16 {
            return Err(CodecError::UnsupportedVersion(words[1]));
        }
        Ok(Self {
            version: words[1],
            generator: words[2],
            bound: words[3],
            schema: words[4],
        })
    }
}

// ===== reading =====

/// One undecoded instruction
#[derive(Debug, Clone, Copy)]
pub struct RawInstruction<'a> {
    /// Word index of the instruction's first word
    pub index: usize,
    pub opcode: u16,
    pub operands: &'a [u32],
}

/// Splits the words after the header into instructions
pub struct InstructionReader<'a> {
    words: &'a [u32],
    position: usize,
}

impl<'a> InstructionReader<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self {
            words,
            position: HEADER_WORDS.min(words.len()),
        }
    }
}

impl<'a> Iterator for InstructionReader<'a> {
    type Item = Result<RawInstruction<'a>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.words.len() {
            return None;
        }
        let index = self.position;
        let first = self.words[index];
        let word_count = (first >> 16) as usize;
        let opcode = (first & 0xFFFF) as u16;

        if word_count == 0 {
            self.position = self.words.len();
            return Some(Err(CodecError::malformed(index, "instruction has a zero word count")));
        }
        if index + word_count > self.words.len() {
            self.position = self.words.len();
            return Some(Err(CodecError::malformed(
                index,
                format!("word count {} overruns the stream", word_count),
            )));
        }
        self.position += word_count;
        Some(Ok(RawInstruction {
            index,
            opcode,
            operands: &self.words[index + 1..index + word_count],
        }))
    }
}

/// Sequential reader over one instruction's operand words
pub struct OperandCursor<'a> {
    words: &'a [u32],
    position: usize,
    index: usize,
}

impl<'a> OperandCursor<'a> {
    pub fn new(instruction: &RawInstruction<'a>) -> Self {
        Self {
            words: instruction.operands,
            position: 0,
            index: instruction.index,
        }
    }

    pub fn word(&mut self) -> Result<u32, CodecError> {
        let word = self
            .words
            .get(self.position)
            .copied()
            .ok_or_else(|| CodecError::malformed(self.index, "missing operand"))?;
        self.position += 1;
        Ok(word)
    }

    /// Reads a NUL-terminated string packed four bytes per word
    pub fn string(&mut self) -> Result<String, CodecError> {
        let mut bytes = Vec::new();
        loop {
            let word = self
                .word()
                .map_err(|_| CodecError::malformed(self.index, "unterminated string"))?;
            for shift in [0, 8, 16, 24] {
                let byte = ((word >> shift) & 0xFF) as u8;
                if byte == 0 {
                    return String::from_utf8(bytes)
                        .map_err(|_| CodecError::malformed(self.index, "string is not valid UTF-8"));
                }
                bytes.push(byte);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.words.len()
    }

    /// Fails if operand words are left over
    pub fn finish(&self) -> Result<(), CodecError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::malformed(
                self.index,
                format!("{} trailing operand word(s)", self.words.len() - self.position),
            ))
        }
    }
}

// ===== encoding =====

fn push_string(body: &mut Vec<u32>, s: &str) {
    let mut word = 0u32;
    let mut filled = 0;
    for byte in s.bytes().filter(|b| *b != 0) {
        word |= (byte as u32) << (filled * 8);
        filled += 1;
        if filled == 4 {
            body.push(word);
            word = 0;
            filled = 0;
        }
    }
    body.push(word);
}

fn base_code(base: BaseType) -> u32 {
    match base {
        BaseType::Void => 0,
        BaseType::Bool => 1,
        BaseType::Int => 2,
        BaseType::Float => 3,
        BaseType::Vector => 4,
        BaseType::Matrix => 5,
        BaseType::Struct => 6,
        BaseType::FixedArray => 7,
        BaseType::RuntimeArray => 8,
        BaseType::Pointer => 9,
        BaseType::Function => 10,
        BaseType::Sampler => 11,
        BaseType::Image => 12,
        BaseType::SampledImage => 13,
    }
}

fn base_from_code(code: u32) -> Option<BaseType> {
    Some(match code {
        0 => BaseType::Void,
        1 => BaseType::Bool,
        2 => BaseType::Int,
        3 => BaseType::Float,
        4 => BaseType::Vector,
        5 => BaseType::Matrix,
        6 => BaseType::Struct,
        7 => BaseType::FixedArray,
        8 => BaseType::RuntimeArray,
        9 => BaseType::Pointer,
        10 => BaseType::Function,
        11 => BaseType::Sampler,
        12 => BaseType::Image,
        13 => BaseType::SampledImage,
        _ => return None,
    })
}

fn geometry_input_code(input: GeometryInput) -> u32 {
    match input {
        GeometryInput::Points => 0,
        GeometryInput::Lines => 1,
        GeometryInput::Triangles => 2,
    }
}

fn geometry_output_code(output: GeometryOutput) -> u32 {
    match output {
        GeometryOutput::Points => 0,
        GeometryOutput::LineStrip => 1,
        GeometryOutput::TriangleStrip => 2,
    }
}

struct Encoder<'a> {
    library: &'a ShaderIrLibrary,
    ids: FxHashMap<NodeRef, u32>,
    words: Vec<u32>,
}

impl<'a> Encoder<'a> {
    fn id(&self, node: NodeRef) -> Result<u32, CodecError> {
        self.ids.get(&node).copied().ok_or(CodecError::Unmapped(node))
    }

    fn emit(&mut self, opcode: u16, body: Vec<u32>) -> Result<(), CodecError> {
        let word_count = body.len() + 1;
        if word_count > MAX_WORD_COUNT {
            return Err(CodecError::malformed(
                self.words.len(),
                format!("instruction of {} words exceeds the encodable size", word_count),
            ));
        }
        self.words.push(((word_count as u32) << 16) | opcode as u32);
        self.words.extend(body);
        Ok(())
    }

    fn emit_line(&mut self, span: Option<Span>) -> Result<(), CodecError> {
        match span {
            Some(span) => self.emit(
                opcode::LINE,
                vec![
                    span.file_id,
                    span.start.line,
                    span.start.column,
                    span.end.line,
                    span.end.column,
                ],
            ),
            None => Ok(()),
        }
    }

    fn encode_type(&mut self, id: TypeId) -> Result<(), CodecError> {
        let library = self.library;
        let ty = library.ty(id)?;
        self.emit_line(ty.source)?;

        let params = ty.parameters();
        let mut body = vec![self.id(NodeRef::Type(id))?, base_code(ty.base_type()), params.len() as u32];
        for param in &params {
            match param {
                TypeParam::Type(sub) => body.extend([param_tag::TYPE, self.id(NodeRef::Type(*sub))?]),
                TypeParam::Literal(value) => body.extend([param_tag::LITERAL, *value as u32]),
                TypeParam::Symbol(name) => {
                    body.push(param_tag::SYMBOL);
                    push_string(&mut body, name);
                }
            }
        }
        push_string(&mut body, &ty.name);
        if let TypeKind::Struct { members } = &ty.kind {
            for member in members {
                push_string(&mut body, &member.name);
            }
        }
        self.emit(opcode::TYPE, body)
    }

    fn encode_constant(&mut self, id: ConstantId) -> Result<(), CodecError> {
        let library = self.library;
        let constant = library.constant(id)?;
        let mut body = vec![self.id(NodeRef::Type(constant.ty))?, self.id(NodeRef::Constant(id))?];
        match &constant.value {
            ConstantValue::Bool(value) => body.extend([constant_kind::BOOL, *value as u32]),
            ConstantValue::Int(value) => {
                let bits = *value as u64;
                body.extend([constant_kind::INT, bits as u32, (bits >> 32) as u32]);
            }
            ConstantValue::Float(value) => {
                let bits = value.to_bits();
                body.extend([constant_kind::FLOAT, bits as u32, (bits >> 32) as u32]);
            }
            ConstantValue::Composite(parts) => {
                body.extend([constant_kind::COMPOSITE, parts.len() as u32]);
                for part in parts {
                    body.push(self.id(NodeRef::Constant(*part))?);
                }
            }
            ConstantValue::Null => body.push(constant_kind::NULL),
        }
        push_string(&mut body, &constant.name);
        self.emit(opcode::CONSTANT, body)
    }

    fn encode_variable(&mut self, id: VariableId) -> Result<(), CodecError> {
        let library = self.library;
        let variable = library.variable(id)?;
        self.emit_line(variable.source)?;

        let result = self.id(NodeRef::Variable(id))?;
        let initializer = match variable.initializer {
            Some(function) => self.id(NodeRef::Function(function))?,
            None => 0,
        };
        let mut body = vec![
            self.id(NodeRef::Type(variable.ty))?,
            result,
            variable.storage_class.code(),
            initializer,
        ];
        push_string(&mut body, &variable.name);
        self.emit(opcode::VARIABLE, body)?;

        let d = &variable.decorations;
        for (kind, value) in [
            (decoration::BINDING, d.binding),
            (decoration::SET, d.descriptor_set),
            (decoration::LOCATION, d.location),
            (decoration::BUILT_IN, d.built_in.map(BuiltIn::code)),
            (decoration::FLAT, d.flat.then_some(1)),
        ] {
            if let Some(value) = value {
                self.emit(opcode::DECORATE, vec![result, kind, value])?;
            }
        }
        Ok(())
    }

    fn encode_function(&mut self, id: FunctionId) -> Result<(), CodecError> {
        let library = self.library;
        let function = library.function(id)?;
        self.emit_line(function.source)?;

        let mut body = vec![
            self.id(NodeRef::Type(function.return_type))?,
            self.id(NodeRef::Function(id))?,
            self.id(NodeRef::Type(function.function_type))?,
        ];
        push_string(&mut body, &function.name);
        self.emit(opcode::FUNCTION, body)?;

        for param in &function.params {
            let mut body = vec![self.id(NodeRef::Type(param.ty))?, param.id.0];
            push_string(&mut body, &param.name);
            self.emit(opcode::PARAM, body)?;
        }
        for local in &function.locals {
            let initializer = match local.initializer {
                Some(constant) => self.id(NodeRef::Constant(constant))?,
                None => 0,
            };
            let mut body = vec![self.id(NodeRef::Type(local.ty))?, local.id.0, initializer];
            push_string(&mut body, &local.name);
            self.emit(opcode::LOCAL, body)?;
        }
        for block in &function.blocks {
            let mut body = vec![block.id.0];
            push_string(&mut body, &block.label);
            self.emit(opcode::LABEL, body)?;
            for op in &block.ops {
                self.emit_line(op.source)?;
                self.encode_op(op)?;
            }
        }
        self.emit(opcode::FUNCTION_END, Vec::new())
    }

    fn encode_op(&mut self, op: &IrOp) -> Result<(), CodecError> {
        let mut body = Vec::with_capacity(3 + op.operands.len() * 2);
        match (op.result, op.result_type) {
            (Some(result), Some(ty)) => body.extend([1, self.id(NodeRef::Type(ty))?, result.0]),
            _ => body.push(0),
        }
        for operand in &op.operands {
            let (tag, value) = match *operand {
                Operand::Type(id) => (tag::TYPE, self.id(NodeRef::Type(id))?),
                Operand::Constant(id) => (tag::CONSTANT, self.id(NodeRef::Constant(id))?),
                Operand::Variable(id) => (tag::VARIABLE, self.id(NodeRef::Variable(id))?),
                Operand::Function(id) => (tag::FUNCTION, self.id(NodeRef::Function(id))?),
                Operand::Import(id) => (tag::IMPORT, self.id(NodeRef::Import(id))?),
                Operand::Value(id) => (tag::VALUE, id.0),
                Operand::Block(id) => (tag::BLOCK, id.0),
                Operand::Literal(value) => (tag::LITERAL, value),
            };
            body.extend([tag, value]);
        }
        self.emit(op.kind.opcode(), body)
    }
}

/// Encodes the nodes of `collection` in collection order
pub fn encode(
    library: &ShaderIrLibrary,
    entry: &EntryPoint,
    collection: &DependencyCollection,
) -> Result<Vec<u32>, CodecError> {
    let mut ids = FxHashMap::default();
    let mut next_id = 1u32;
    let nodes = collection
        .order
        .iter()
        .copied()
        .chain(collection.imports.iter().map(|&id| NodeRef::Import(id)))
        .chain(collection.functions.iter().map(|&id| NodeRef::Function(id)));
    for node in nodes {
        ids.entry(node).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
    }

    let mut encoder = Encoder {
        library,
        ids,
        words: vec![MAGIC, VERSION, GENERATOR, next_id, 0],
    };

    for capability in &collection.capabilities {
        encoder.emit(opcode::CAPABILITY, vec![capability.code()])?;
    }
    for &id in &collection.imports {
        let mut body = vec![encoder.id(NodeRef::Import(id))?];
        push_string(&mut body, &library.import(id)?.name);
        encoder.emit(opcode::IMPORT, body)?;
    }

    let mut body = Vec::new();
    push_string(&mut body, &library.name);
    encoder.emit(opcode::SOURCE_NAME, body)?;

    let mut body = vec![entry.stage.code(), encoder.id(NodeRef::Function(entry.function))?];
    push_string(&mut body, &entry.name);
    encoder.emit(opcode::ENTRY_POINT, body)?;
    if let Some(geometry) = entry.geometry {
        encoder.emit(
            opcode::GEOMETRY,
            vec![
                geometry_input_code(geometry.input),
                geometry_output_code(geometry.output),
                geometry.max_vertices,
            ],
        )?;
    }

    for node in &collection.order {
        match *node {
            NodeRef::Type(id) => encoder.encode_type(id)?,
            NodeRef::Constant(id) => encoder.encode_constant(id)?,
            NodeRef::Variable(id) => encoder.encode_variable(id)?,
            NodeRef::Function(_) | NodeRef::Import(_) => {}
        }
    }
    for &id in &collection.functions {
        encoder.encode_function(id)?;
    }
    Ok(encoder.words)
}

// ===== decoding =====

/// A decoded stream, ready for a backend
#[derive(Debug, Clone)]
pub struct DecodedModule {
    pub header: Header,
    pub library: ShaderIrLibrary,
    pub entry: EntryPoint,
    pub capabilities: Vec<Capability>,
}

fn bump(counter: &mut u32) -> u32 {
    let value = *counter;
    *counter += 1;
    value
}

/// Maps every defined module-level id to the node it will decode into, so
/// later instructions can refer to functions defined further down.
pub fn prescan(words: &[u32]) -> Result<FxHashMap<u32, NodeRef>, CodecError> {
    let mut ids = FxHashMap::default();
    let (mut types, mut constants, mut variables, mut functions, mut imports) = (0, 0, 0, 0, 0);

    for instruction in InstructionReader::new(words) {
        let instruction = instruction?;
        let (slot, node) = match instruction.opcode {
            opcode::TYPE => (0, NodeRef::Type(TypeId(bump(&mut types)))),
            opcode::CONSTANT => (1, NodeRef::Constant(ConstantId(bump(&mut constants)))),
            opcode::VARIABLE => (1, NodeRef::Variable(VariableId(bump(&mut variables)))),
            opcode::FUNCTION => (1, NodeRef::Function(FunctionId(bump(&mut functions)))),
            opcode::IMPORT => (0, NodeRef::Import(ImportId(bump(&mut imports)))),
            _ => continue,
        };
        let id = instruction
            .operands
            .get(slot)
            .copied()
            .ok_or_else(|| CodecError::malformed(instruction.index, "missing result id"))?;
        if id == 0 || ids.insert(id, node).is_some() {
            return Err(CodecError::malformed(
                instruction.index,
                format!("id {} is reserved or defined twice", id),
            ));
        }
    }
    Ok(ids)
}

struct Decoder {
    ids: FxHashMap<u32, NodeRef>,
    library: ShaderIrLibrary,
    capabilities: Vec<Capability>,
    entry: Option<EntryPoint>,
    geometry: Option<GeometrySettings>,
    function: Option<IrFunction>,
    pending_span: Option<Span>,
}

impl Decoder {
    fn expect<T>(
        &self,
        id: u32,
        index: usize,
        what: &str,
        pick: impl Fn(NodeRef) -> Option<T>,
    ) -> Result<T, CodecError> {
        let node = self.ids.get(&id).copied().ok_or(CodecError::UndefinedId { index, id })?;
        pick(node).ok_or_else(|| CodecError::malformed(index, format!("id {} is a {}, expected a {}", id, node, what)))
    }

    fn type_id(&self, id: u32, index: usize) -> Result<TypeId, CodecError> {
        self.expect(id, index, "type", |n| match n {
            NodeRef::Type(t) => Some(t),
            _ => None,
        })
    }

    fn constant_id(&self, id: u32, index: usize) -> Result<ConstantId, CodecError> {
        self.expect(id, index, "constant", |n| match n {
            NodeRef::Constant(c) => Some(c),
            _ => None,
        })
    }

    fn variable_id(&self, id: u32, index: usize) -> Result<VariableId, CodecError> {
        self.expect(id, index, "variable", |n| match n {
            NodeRef::Variable(v) => Some(v),
            _ => None,
        })
    }

    fn function_id(&self, id: u32, index: usize) -> Result<FunctionId, CodecError> {
        self.expect(id, index, "function", |n| match n {
            NodeRef::Function(f) => Some(f),
            _ => None,
        })
    }

    fn import_id(&self, id: u32, index: usize) -> Result<ImportId, CodecError> {
        self.expect(id, index, "import", |n| match n {
            NodeRef::Import(x) => Some(x),
            _ => None,
        })
    }

    fn open_function(&mut self, index: usize) -> Result<&mut IrFunction, CodecError> {
        self.function
            .as_mut()
            .ok_or_else(|| CodecError::malformed(index, "instruction outside a function"))
    }

    fn apply(&mut self, instruction: RawInstruction<'_>) -> Result<(), CodecError> {
        let index = instruction.index;
        let mut c = OperandCursor::new(&instruction);
        let span = self.pending_span.take();

        match instruction.opcode {
            opcode::LINE => {
                let file_id = c.word()?;
                let (start_line, start_column) = (c.word()?, c.word()?);
                let (end_line, end_column) = (c.word()?, c.word()?);
                self.pending_span = Some(Span::new(
                    Position::new(start_line, start_column, 0),
                    Position::new(end_line, end_column, 0),
                    file_id,
                ));
            }
            opcode::CAPABILITY => {
                let code = c.word()?;
                let capability = Capability::from_code(code)
                    .ok_or_else(|| CodecError::malformed(index, format!("unknown capability {}", code)))?;
                self.capabilities.push(capability);
            }
            opcode::IMPORT => {
                c.word()?;
                let name = c.string()?;
                self.library.add_import(ExtensionImport::new(name));
            }
            opcode::SOURCE_NAME => self.library.name = c.string()?,
            opcode::ENTRY_POINT => {
                let code = c.word()?;
                let stage = ShaderStage::from_code(code)
                    .ok_or_else(|| CodecError::malformed(index, format!("unknown stage {}", code)))?;
                let function = self.function_id(c.word()?, index)?;
                let name = c.string()?;
                if self.entry.is_some() {
                    return Err(CodecError::malformed(index, "second entry point"));
                }
                self.entry = Some(EntryPoint::new(name, stage, function));
            }
            opcode::GEOMETRY => {
                let input = match c.word()? {
                    0 => GeometryInput::Points,
                    1 => GeometryInput::Lines,
                    2 => GeometryInput::Triangles,
                    other => return Err(CodecError::malformed(index, format!("unknown geometry input {}", other))),
                };
                let output = match c.word()? {
                    0 => GeometryOutput::Points,
                    1 => GeometryOutput::LineStrip,
                    2 => GeometryOutput::TriangleStrip,
                    other => return Err(CodecError::malformed(index, format!("unknown geometry output {}", other))),
                };
                let max_vertices = c.word()?;
                self.geometry = Some(GeometrySettings { input, output, max_vertices });
            }
            opcode::TYPE => {
                let mut ty = self.decode_type(&mut c, index)?;
                ty.source = span;
                self.library.add_type(ty);
            }
            opcode::CONSTANT => {
                let constant = self.decode_constant(&mut c, index)?;
                self.library.add_constant(constant);
            }
            opcode::VARIABLE => {
                let ty = self.type_id(c.word()?, index)?;
                c.word()?;
                let code = c.word()?;
                let storage = StorageClass::from_code(code)
                    .ok_or_else(|| CodecError::malformed(index, format!("unknown storage class {}", code)))?;
                let initializer = match c.word()? {
                    0 => None,
                    id => Some(self.function_id(id, index)?),
                };
                let mut variable = Variable::new(c.string()?, ty, storage);
                variable.initializer = initializer;
                variable.source = span;
                self.library.add_variable(variable);
            }
            opcode::DECORATE => {
                let id = self.variable_id(c.word()?, index)?;
                let (kind, value) = (c.word()?, c.word()?);
                let decorations = &mut self.library.variable_mut(id)?.decorations;
                match kind {
                    decoration::BINDING => decorations.binding = Some(value),
                    decoration::SET => decorations.descriptor_set = Some(value),
                    decoration::LOCATION => decorations.location = Some(value),
                    decoration::BUILT_IN => {
                        decorations.built_in = Some(
                            BuiltIn::from_code(value)
                                .ok_or_else(|| CodecError::malformed(index, format!("unknown built-in {}", value)))?,
                        )
                    }
                    decoration::FLAT => decorations.flat = value != 0,
                    other => return Err(CodecError::malformed(index, format!("unknown decoration {}", other))),
                }
            }
            opcode::FUNCTION => {
                if self.function.is_some() {
                    return Err(CodecError::malformed(index, "function opened inside another function"));
                }
                let return_type = self.type_id(c.word()?, index)?;
                c.word()?;
                let function_type = self.type_id(c.word()?, index)?;
                let mut function = IrFunction::declaration(c.string()?, function_type, return_type);
                function.source = span;
                self.function = Some(function);
            }
            opcode::PARAM => {
                let ty = self.type_id(c.word()?, index)?;
                let id = ValueId(c.word()?);
                let name = c.string()?;
                self.open_function(index)?.params.push(FunctionParam { id, name, ty });
            }
            opcode::LOCAL => {
                let ty = self.type_id(c.word()?, index)?;
                let id = ValueId(c.word()?);
                let initializer = match c.word()? {
                    0 => None,
                    constant => Some(self.constant_id(constant, index)?),
                };
                let name = c.string()?;
                self.open_function(index)?.locals.push(LocalVariable { id, name, ty, initializer });
            }
            opcode::LABEL => {
                let id = BlockId(c.word()?);
                let label = c.string()?;
                self.open_function(index)?
                    .blocks
                    .push(tessel_ir::BasicBlock::new(id, label));
            }
            opcode::FUNCTION_END => {
                let function = self
                    .function
                    .take()
                    .ok_or_else(|| CodecError::malformed(index, "function end without a function"))?;
                self.library.add_function(function);
            }
            code => {
                let kind = OpKind::from_opcode(code).ok_or(CodecError::UnknownOpcode { index, opcode: code })?;
                let mut op = self.decode_op(kind, &mut c, index)?;
                op.source = span;
                let block = self
                    .open_function(index)?
                    .blocks
                    .last_mut()
                    .ok_or_else(|| CodecError::malformed(index, "op outside a block"))?;
                block.ops.push(op);
            }
        }
        c.finish()
    }

    fn decode_type(&self, c: &mut OperandCursor<'_>, index: usize) -> Result<IrType, CodecError> {
        c.word()?;
        let code = c.word()?;
        let base = base_from_code(code).ok_or_else(|| CodecError::malformed(index, format!("unknown base type {}", code)))?;
        let count = c.word()?;
        let mut params = Vec::new();
        for _ in 0..count {
            let param = match c.word()? {
                param_tag::TYPE => TypeParam::Type(self.type_id(c.word()?, index)?),
                param_tag::LITERAL => TypeParam::Literal(c.word()? as i32),
                param_tag::SYMBOL => TypeParam::Symbol(c.string()?),
                other => return Err(CodecError::malformed(index, format!("unknown type parameter tag {}", other))),
            };
            params.push(param);
        }
        let name = c.string()?;
        let mut member_names = Vec::new();
        if base == BaseType::Struct {
            for _ in 0..count {
                member_names.push(c.string()?);
            }
        }
        let kind = build_type_kind(base, params, member_names)
            .ok_or_else(|| CodecError::malformed(index, format!("parameters do not fit a {} type", base)))?;
        Ok(IrType::new(name, kind))
    }

    fn decode_constant(&self, c: &mut OperandCursor<'_>, index: usize) -> Result<IrConstant, CodecError> {
        let ty = self.type_id(c.word()?, index)?;
        c.word()?;
        let value = match c.word()? {
            constant_kind::BOOL => ConstantValue::Bool(c.word()? != 0),
            constant_kind::INT => {
                let (lo, hi) = (c.word()? as u64, c.word()? as u64);
                ConstantValue::Int((lo | (hi << 32)) as i64)
            }
            constant_kind::FLOAT => {
                let (lo, hi) = (c.word()? as u64, c.word()? as u64);
                ConstantValue::Float(f64::from_bits(lo | (hi << 32)))
            }
            constant_kind::COMPOSITE => {
                let count = c.word()?;
                let mut parts = Vec::new();
                for _ in 0..count {
                    parts.push(self.constant_id(c.word()?, index)?);
                }
                ConstantValue::Composite(parts)
            }
            constant_kind::NULL => ConstantValue::Null,
            other => return Err(CodecError::malformed(index, format!("unknown constant kind {}", other))),
        };
        Ok(IrConstant::new(ty, value).named(c.string()?))
    }

    fn decode_op(&self, kind: OpKind, c: &mut OperandCursor<'_>, index: usize) -> Result<IrOp, CodecError> {
        let mut op = IrOp::new(kind, Vec::new());
        match c.word()? {
            0 => {}
            1 => {
                let ty = self.type_id(c.word()?, index)?;
                op = op.with_result(ValueId(c.word()?), ty);
            }
            other => return Err(CodecError::malformed(index, format!("bad result flag {}", other))),
        }
        while !c.is_empty() {
            let (tag, value) = (c.word()?, c.word()?);
            op.operands.push(match tag {
                tag::TYPE => Operand::Type(self.type_id(value, index)?),
                tag::CONSTANT => Operand::Constant(self.constant_id(value, index)?),
                tag::VARIABLE => Operand::Variable(self.variable_id(value, index)?),
                tag::FUNCTION => Operand::Function(self.function_id(value, index)?),
                tag::IMPORT => Operand::Import(self.import_id(value, index)?),
                tag::VALUE => Operand::Value(ValueId(value)),
                tag::BLOCK => Operand::Block(BlockId(value)),
                tag::LITERAL => Operand::Literal(value),
                other => return Err(CodecError::malformed(index, format!("unknown operand tag {}", other))),
            });
        }
        Ok(op)
    }
}

/// Rebuilds a type from its base type and ordered parameter list
fn build_type_kind(base: BaseType, params: Vec<TypeParam>, member_names: Vec<String>) -> Option<TypeKind> {
    let literal = |i: usize| params.get(i).and_then(TypeParam::as_literal);
    let ty = |i: usize| params.get(i).and_then(TypeParam::as_type);

    Some(match base {
        BaseType::Void if params.is_empty() => TypeKind::Void,
        BaseType::Bool if params.is_empty() => TypeKind::Bool,
        BaseType::Sampler if params.is_empty() => TypeKind::Sampler,
        BaseType::Int => TypeKind::Int {
            width: literal(0)? as u32,
            signed: literal(1)? != 0,
        },
        BaseType::Float => TypeKind::Float { width: literal(0)? as u32 },
        BaseType::Vector => TypeKind::Vector {
            component: ty(0)?,
            count: literal(1)? as u32,
        },
        BaseType::Matrix => TypeKind::Matrix {
            column: ty(0)?,
            count: literal(1)? as u32,
        },
        BaseType::Struct => TypeKind::Struct {
            members: params
                .iter()
                .zip(member_names)
                .map(|(p, name)| p.as_type().map(|t| StructMember::new(name, t)))
                .collect::<Option<Vec<_>>>()?,
        },
        BaseType::FixedArray => TypeKind::FixedArray {
            element: ty(0)?,
            length: literal(1)? as u32,
        },
        BaseType::RuntimeArray => TypeKind::RuntimeArray { element: ty(0)? },
        BaseType::Pointer => TypeKind::Pointer {
            storage: StorageClass::from_code(literal(0)? as u32)?,
            pointee: ty(1)?,
        },
        BaseType::Function => TypeKind::Function {
            ret: ty(0)?,
            params: params[1..].iter().map(TypeParam::as_type).collect::<Option<Vec<_>>>()?,
        },
        BaseType::Image if params.len() == tessel_ir::types::IMAGE_PARAM_COUNT => TypeKind::Image {
            sampled_type: ty(0)?,
            params: ImageParams {
                dim: params[1].clone(),
                depth: params[2].clone(),
                arrayed: params[3].clone(),
                multisampled: params[4].clone(),
                sampled: params[5].clone(),
                format: params[6].clone(),
            },
        },
        BaseType::SampledImage => TypeKind::SampledImage { image: ty(0)? },
        _ => return None,
    })
}

/// Decodes a stream back into a library holding only the encoded nodes
pub fn decode(words: &[u32]) -> Result<DecodedModule, CodecError> {
    let header = Header::read(words)?;
    let ids = prescan(words)?;
    let mut decoder = Decoder {
        ids,
        library: ShaderIrLibrary::default(),
        capabilities: Vec::new(),
        entry: None,
        geometry: None,
        function: None,
        pending_span: None,
    };
    for instruction in InstructionReader::new(words) {
        decoder.apply(instruction?)?;
    }

    if decoder.function.is_some() {
        return Err(CodecError::malformed(words.len(), "function is not terminated"));
    }
    let mut entry = decoder.entry.ok_or(CodecError::MissingEntryPoint)?;
    entry.geometry = decoder.geometry;
    decoder.library.add_entry_point(entry.clone());

    Ok(DecodedModule {
        header,
        library: decoder.library,
        entry,
        capabilities: decoder.capabilities,
    })
}
