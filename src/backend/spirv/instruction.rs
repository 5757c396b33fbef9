//! SPIR-V instructions
//!
//! Instruction definitions and their binary encoding.

use std::fmt;

/// A SPIR-V result id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u32);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Opcodes used by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Op {
    // ============ Module ============
    Name = 5,
    MemberName = 6,
    ExtInstImport = 11,
    ExtInst = 12,
    MemoryModel = 14,
    EntryPoint = 15,
    ExecutionMode = 16,
    Capability = 17,

    // ============ Types ============
    TypeVoid = 19,
    TypeBool = 20,
    TypeInt = 21,
    TypeFloat = 22,
    TypeVector = 23,
    TypeStruct = 30,
    TypePointer = 32,
    TypeFunction = 33,

    // ============ Constants ============
    ConstantTrue = 41,
    ConstantFalse = 42,
    Constant = 43,

    // ============ Functions ============
    Function = 54,
    FunctionParameter = 55,
    FunctionEnd = 56,
    FunctionCall = 57,

    // ============ Memory ============
    Variable = 59,
    Load = 61,
    Store = 62,
    AccessChain = 65,

    // ============ Annotations ============
    Decorate = 71,
    MemberDecorate = 72,

    // ============ Composites ============
    VectorShuffle = 79,
    CompositeConstruct = 80,
    CompositeExtract = 81,

    // ============ Conversions ============
    ConvertFToU = 109,
    ConvertFToS = 110,
    ConvertSToF = 111,
    ConvertUToF = 112,
    Bitcast = 124,

    // ============ Arithmetic ============
    SNegate = 126,
    FNegate = 127,
    IAdd = 128,
    FAdd = 129,
    ISub = 130,
    FSub = 131,
    IMul = 132,
    FMul = 133,
    UDiv = 134,
    SDiv = 135,
    FDiv = 136,
    VectorTimesScalar = 142,
    Dot = 148,

    // ============ Logic ============
    LogicalEqual = 164,
    LogicalNotEqual = 165,
    LogicalOr = 166,
    LogicalAnd = 167,
    LogicalNot = 168,
    IEqual = 170,
    INotEqual = 171,
    UGreaterThan = 172,
    SGreaterThan = 173,
    UGreaterThanEqual = 174,
    SGreaterThanEqual = 175,
    ULessThan = 176,
    SLessThan = 177,
    ULessThanEqual = 178,
    SLessThanEqual = 179,
    FOrdEqual = 180,
    FOrdNotEqual = 182,
    FOrdLessThan = 184,
    FOrdGreaterThan = 186,
    FOrdLessThanEqual = 188,
    FOrdGreaterThanEqual = 190,

    // ============ Control Flow ============
    SelectionMerge = 247,
    Label = 248,
    Branch = 249,
    BranchConditional = 250,
    Return = 253,
    ReturnValue = 254,
    Unreachable = 255,
}

impl Op {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether this instruction ends a block
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Op::Branch | Op::BranchConditional | Op::Return | Op::ReturnValue | Op::Unreachable
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op{:?}", self)
    }
}

/// An instruction operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Id(Id),
    Literal(u32),
    /// An enumerant, with its name for disassembly
    Enum(&'static str, u32),
    String(String),
}

impl Operand {
    fn word_count(&self) -> usize {
        match self {
            Operand::String(s) => s.len() / 4 + 1,
            _ => 1,
        }
    }

    fn encode(&self, out: &mut Vec<u32>) {
        match self {
            Operand::Id(id) => out.push(id.0),
            Operand::Literal(v) | Operand::Enum(_, v) => out.push(*v),
            Operand::String(s) => {
                // Nul-terminated, padded to a word boundary
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                while bytes.len() % 4 != 0 {
                    bytes.push(0);
                }
                out.extend(
                    bytes
                        .chunks(4)
                        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
                );
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Id(id) => write!(f, "{}", id),
            Operand::Literal(v) => write!(f, "{}", v),
            Operand::Enum(name, _) => write!(f, "{}", name),
            Operand::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<Id> for Operand {
    fn from(id: Id) -> Self {
        Operand::Id(id)
    }
}

/// A SPIR-V instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub result_type: Option<Id>,
    pub result: Option<Id>,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(op: Op, result_type: Option<Id>, result: Option<Id>, operands: Vec<Operand>) -> Self {
        Self {
            op,
            result_type,
            result,
            operands,
        }
    }

    /// An instruction without result
    pub fn plain(op: Op, operands: Vec<Operand>) -> Self {
        Self::new(op, None, None, operands)
    }

    pub fn word_count(&self) -> usize {
        1 + usize::from(self.result_type.is_some())
            + usize::from(self.result.is_some())
            + self.operands.iter().map(Operand::word_count).sum::<usize>()
    }

    pub fn encode(&self, out: &mut Vec<u32>) {
        out.push(((self.word_count() as u32) << 16) | u32::from(self.op.code()));
        if let Some(ty) = self.result_type {
            out.push(ty.0);
        }
        if let Some(result) = self.result {
            out.push(result.0);
        }
        for operand in &self.operands {
            operand.encode(out);
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{} = ", result)?;
        }
        write!(f, "{}", self.op)?;
        if let Some(ty) = self.result_type {
            write!(f, " {}", ty)?;
        }
        for operand in &self.operands {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_with_result() {
        let inst = Instruction::new(Op::TypeFloat, None, Some(Id(3)), vec![Operand::Literal(32)]);
        let mut words = Vec::new();
        inst.encode(&mut words);
        assert_eq!(words, vec![(3 << 16) | 22, 3, 32]);
    }

    #[test]
    fn test_string_padding() {
        // "main" needs a second word for the terminator
        let inst = Instruction::plain(Op::Name, vec![Id(1).into(), Operand::String("main".into())]);
        let mut words = Vec::new();
        inst.encode(&mut words);
        assert_eq!(words.len(), 4);
        assert_eq!(inst.word_count(), 4);
        assert_eq!(words[2], u32::from_le_bytes(*b"main"));
        assert_eq!(words[3], 0);
    }

    #[test]
    fn test_display() {
        let inst = Instruction::new(
            Op::Load,
            Some(Id(4)),
            Some(Id(9)),
            vec![Id(8).into()],
        );
        assert_eq!(inst.to_string(), "%9 = OpLoad %4 %8");
        assert_eq!(
            Instruction::plain(Op::Capability, vec![Operand::Enum("Shader", 1)]).to_string(),
            "OpCapability Shader"
        );
    }
}
