//! IR Instructions
//!
//! Typed operations in SSA form. Operands refer to other nodes by id and
//! never own them.
//!
//! Operand layout per kind:
//!
//! ```text
//! Load                [pointer]
//! Store               [pointer, value]
//! AccessChain         [base, index...]
//! Binary / Compare    [lhs, rhs]
//! Select              [condition, if_true, if_false]
//! CompositeExtract    [composite, #index...]
//! VectorShuffle       [a, b, #component...]
//! SampledImage        [image, sampler]
//! ImageSample*        [sampled_image, coordinate, (lod | dref)]
//! ImageWrite          [image, coordinate, texel]
//! FunctionCall        [@function, argument...]
//! ExtInst             [%import, #instruction, argument...]
//! SelectionMerge      [merge_block]
//! LoopMerge           [merge_block, continue_block]
//! Branch              [target]
//! BranchConditional   [condition, true_block, false_block]
//! ReturnValue         [value]
//! ```

use crate::node::{BlockId, ConstantId, FunctionId, ImportId, TypeId, ValueId, VariableId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tessel_error::Span;

/// Binary arithmetic / bitwise operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    const ALL: [BinaryOp; 10] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
        BinaryOp::Shl,
        BinaryOp::Shr,
    ];

    /// Infix operator in C-like shading languages
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
        };
        f.write_str(name)
    }
}

/// Comparison operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    const ALL: [CompareOp; 6] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
        };
        f.write_str(name)
    }
}

/// Operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    // Memory
    Load,
    Store,
    AccessChain,

    // Arithmetic and logic
    Binary(BinaryOp),
    Compare(CompareOp),
    Negate,
    Not,
    LogicalAnd,
    LogicalOr,
    LogicalNot,
    Select,
    Dot,
    VectorTimesScalar,
    MatrixTimesVector,
    VectorTimesMatrix,
    MatrixTimesMatrix,

    // Composites
    CompositeConstruct,
    CompositeExtract,
    VectorShuffle,

    // Conversions
    ConvertFToS,
    ConvertSToF,
    Bitcast,

    // Images
    SampledImage,
    ImageSample,
    ImageSampleLod,
    ImageSampleDref,
    ImageFetch,
    ImageQuerySize,
    ImageRead,
    ImageWrite,

    // Derivatives
    DPdx,
    DPdy,
    Fwidth,

    // Geometry
    EmitVertex,
    EndPrimitive,

    // Calls
    FunctionCall,
    ExtInst,

    // Control flow
    SelectionMerge,
    LoopMerge,
    Branch,
    BranchConditional,
    Return,
    ReturnValue,
    Kill,
    Unreachable,
}

const BINARY_BASE: u16 = 40;
const COMPARE_BASE: u16 = 60;

impl OpKind {
    /// Numeric opcode used by the binary encoding
    pub fn opcode(self) -> u16 {
        match self {
            OpKind::Load => 1,
            OpKind::Store => 2,
            OpKind::AccessChain => 3,
            OpKind::Binary(op) => BINARY_BASE + BinaryOp::ALL.iter().position(|o| *o == op).unwrap_or(0) as u16,
            OpKind::Compare(op) => COMPARE_BASE + CompareOp::ALL.iter().position(|o| *o == op).unwrap_or(0) as u16,
            OpKind::Negate => 10,
            OpKind::Not => 11,
            OpKind::LogicalAnd => 12,
            OpKind::LogicalOr => 13,
            OpKind::LogicalNot => 14,
            OpKind::Select => 15,
            OpKind::Dot => 16,
            OpKind::VectorTimesScalar => 17,
            OpKind::MatrixTimesVector => 18,
            OpKind::VectorTimesMatrix => 19,
            OpKind::MatrixTimesMatrix => 20,
            OpKind::CompositeConstruct => 21,
            OpKind::CompositeExtract => 22,
            OpKind::VectorShuffle => 23,
            OpKind::ConvertFToS => 24,
            OpKind::ConvertSToF => 25,
            OpKind::Bitcast => 26,
            OpKind::SampledImage => 70,
            OpKind::ImageSample => 71,
            OpKind::ImageSampleLod => 72,
            OpKind::ImageSampleDref => 73,
            OpKind::ImageFetch => 74,
            OpKind::ImageQuerySize => 75,
            OpKind::ImageRead => 76,
            OpKind::ImageWrite => 77,
            OpKind::DPdx => 80,
            OpKind::DPdy => 81,
            OpKind::Fwidth => 82,
            OpKind::EmitVertex => 85,
            OpKind::EndPrimitive => 86,
            OpKind::FunctionCall => 90,
            OpKind::ExtInst => 91,
            OpKind::SelectionMerge => 100,
            OpKind::LoopMerge => 101,
            OpKind::Branch => 102,
            OpKind::BranchConditional => 103,
            OpKind::Return => 104,
            OpKind::ReturnValue => 105,
            OpKind::Kill => 106,
            OpKind::Unreachable => 107,
        }
    }

    pub fn from_opcode(code: u16) -> Option<Self> {
        if (BINARY_BASE..BINARY_BASE + BinaryOp::ALL.len() as u16).contains(&code) {
            return Some(OpKind::Binary(BinaryOp::ALL[(code - BINARY_BASE) as usize]));
        }
        if (COMPARE_BASE..COMPARE_BASE + CompareOp::ALL.len() as u16).contains(&code) {
            return Some(OpKind::Compare(CompareOp::ALL[(code - COMPARE_BASE) as usize]));
        }
        Some(match code {
            1 => OpKind::Load,
            2 => OpKind::Store,
            3 => OpKind::AccessChain,
            10 => OpKind::Negate,
            11 => OpKind::Not,
            12 => OpKind::LogicalAnd,
            13 => OpKind::LogicalOr,
            14 => OpKind::LogicalNot,
            15 => OpKind::Select,
            16 => OpKind::Dot,
            17 => OpKind::VectorTimesScalar,
            18 => OpKind::MatrixTimesVector,
            19 => OpKind::VectorTimesMatrix,
            20 => OpKind::MatrixTimesMatrix,
            21 => OpKind::CompositeConstruct,
            22 => OpKind::CompositeExtract,
            23 => OpKind::VectorShuffle,
            24 => OpKind::ConvertFToS,
            25 => OpKind::ConvertSToF,
            26 => OpKind::Bitcast,
            70 => OpKind::SampledImage,
            71 => OpKind::ImageSample,
            72 => OpKind::ImageSampleLod,
            73 => OpKind::ImageSampleDref,
            74 => OpKind::ImageFetch,
            75 => OpKind::ImageQuerySize,
            76 => OpKind::ImageRead,
            77 => OpKind::ImageWrite,
            80 => OpKind::DPdx,
            81 => OpKind::DPdy,
            82 => OpKind::Fwidth,
            85 => OpKind::EmitVertex,
            86 => OpKind::EndPrimitive,
            90 => OpKind::FunctionCall,
            91 => OpKind::ExtInst,
            100 => OpKind::SelectionMerge,
            101 => OpKind::LoopMerge,
            102 => OpKind::Branch,
            103 => OpKind::BranchConditional,
            104 => OpKind::Return,
            105 => OpKind::ReturnValue,
            106 => OpKind::Kill,
            107 => OpKind::Unreachable,
            _ => return None,
        })
    }

    /// Ends a basic block
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            OpKind::Branch
                | OpKind::BranchConditional
                | OpKind::Return
                | OpKind::ReturnValue
                | OpKind::Kill
                | OpKind::Unreachable
        )
    }

    pub fn is_merge(self) -> bool {
        matches!(self, OpKind::SelectionMerge | OpKind::LoopMerge)
    }

    /// Has effects beyond its result value; never removed as dead code
    pub fn has_side_effects(self) -> bool {
        self.is_terminator()
            || self.is_merge()
            || matches!(
                self,
                OpKind::Store
                    | OpKind::ImageWrite
                    | OpKind::EmitVertex
                    | OpKind::EndPrimitive
                    | OpKind::FunctionCall
            )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Binary(op) => write!(f, "{}", op),
            OpKind::Compare(op) => write!(f, "cmp.{}", op),
            other => {
                let debug = format!("{:?}", other);
                let mut name = String::with_capacity(debug.len() + 4);
                for (i, c) in debug.chars().enumerate() {
                    if c.is_ascii_uppercase() && i > 0 {
                        name.push('_');
                    }
                    name.push(c.to_ascii_lowercase());
                }
                f.write_str(&name)
            }
        }
    }
}

/// Reference held by an op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Type(TypeId),
    Constant(ConstantId),
    Variable(VariableId),
    Function(FunctionId),
    Import(ImportId),
    Value(ValueId),
    Block(BlockId),
    Literal(u32),
}

impl Operand {
    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Operand::Block(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<u32> {
        match self {
            Operand::Literal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Operand::Value(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Type(id) => write!(f, "{}", id),
            Operand::Constant(id) => write!(f, "{}", id),
            Operand::Variable(id) => write!(f, "{}", id),
            Operand::Function(id) => write!(f, "{}", id),
            Operand::Import(id) => write!(f, "{}", id),
            Operand::Value(id) => write!(f, "{}", id),
            Operand::Block(id) => write!(f, "{}", id),
            Operand::Literal(v) => write!(f, "#{}", v),
        }
    }
}

/// A single typed instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrOp {
    pub kind: OpKind,
    #[serde(default)]
    pub result: Option<ValueId>,
    #[serde(default)]
    pub result_type: Option<TypeId>,
    #[serde(default)]
    pub operands: Vec<Operand>,
    #[serde(default)]
    pub source: Option<Span>,
}

impl IrOp {
    pub fn new(kind: OpKind, operands: Vec<Operand>) -> Self {
        Self {
            kind,
            result: None,
            result_type: None,
            operands,
            source: None,
        }
    }

    pub fn with_result(mut self, result: ValueId, result_type: TypeId) -> Self {
        self.result = Some(result);
        self.result_type = Some(result_type);
        self
    }

    pub fn with_source(mut self, span: Span) -> Self {
        self.source = Some(span);
        self
    }

    /// Blocks this op may transfer control to (merge targets included)
    pub fn block_targets(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.operands.iter().filter_map(Operand::as_block)
    }
}

impl fmt::Display for IrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{} = ", result)?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(ty) = self.result_type {
            write!(f, " {}", ty)?;
        }
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}
