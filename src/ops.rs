//! Operators.

use crate::Func;

/// Properties of a memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct MemoryArg {
    /// Volatile accesses are observable and may never be folded.
    pub volatile: bool,
    /// Address space of the pointer operand. Zero is the default
    /// space, in which a null pointer refers to nothing.
    pub addr_space: u32,
}

impl std::fmt::Display for MemoryArg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.volatile {
            write!(f, ".volatile")?;
        }
        if self.addr_space != 0 {
            write!(f, ".as{}", self.addr_space)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,

    Eq,
    Ne,
    LtS,
    LtU,
    LeS,
    LeU,
    GtS,
    GtU,
    GeS,
    GeU,

    /// Integer casts. The result type of the instruction is the
    /// destination type.
    Zext,
    Sext,
    Trunc,

    /// `select cond, if_true, if_false`.
    Select,

    ExtractField {
        index: u32,
    },
    /// `insert.N agg, value`: `agg` with field `N` replaced.
    InsertField {
        index: u32,
    },
    /// Address of field `N` of the struct behind the pointer operand.
    FieldAddr {
        index: u32,
    },

    /// `load ptr`.
    Load {
        memory: MemoryArg,
    },
    /// `store ptr, value`.
    Store {
        memory: MemoryArg,
    },

    Call {
        function_index: Func,
    },
    /// `call_indirect callee, args...`.
    CallIndirect,

    Alloca,
    VaArg,
    /// An operation this crate carries through but does not model.
    Opaque {
        opcode: u32,
    },
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operator::Add => write!(f, "add"),
            Operator::Sub => write!(f, "sub"),
            Operator::Mul => write!(f, "mul"),
            Operator::DivS => write!(f, "div_s"),
            Operator::DivU => write!(f, "div_u"),
            Operator::RemS => write!(f, "rem_s"),
            Operator::RemU => write!(f, "rem_u"),
            Operator::And => write!(f, "and"),
            Operator::Or => write!(f, "or"),
            Operator::Xor => write!(f, "xor"),
            Operator::Shl => write!(f, "shl"),
            Operator::ShrS => write!(f, "shr_s"),
            Operator::ShrU => write!(f, "shr_u"),
            Operator::Eq => write!(f, "eq"),
            Operator::Ne => write!(f, "ne"),
            Operator::LtS => write!(f, "lt_s"),
            Operator::LtU => write!(f, "lt_u"),
            Operator::LeS => write!(f, "le_s"),
            Operator::LeU => write!(f, "le_u"),
            Operator::GtS => write!(f, "gt_s"),
            Operator::GtU => write!(f, "gt_u"),
            Operator::GeS => write!(f, "ge_s"),
            Operator::GeU => write!(f, "ge_u"),
            Operator::Zext => write!(f, "zext"),
            Operator::Sext => write!(f, "sext"),
            Operator::Trunc => write!(f, "trunc"),
            Operator::Select => write!(f, "select"),
            Operator::ExtractField { index } => write!(f, "extract.{}", index),
            Operator::InsertField { index } => write!(f, "insert.{}", index),
            Operator::FieldAddr { index } => write!(f, "fieldaddr.{}", index),
            Operator::Load { memory } => write!(f, "load{}", memory),
            Operator::Store { memory } => write!(f, "store{}", memory),
            Operator::Call { function_index } => write!(f, "call @{}", function_index),
            Operator::CallIndirect => write!(f, "call_indirect"),
            Operator::Alloca => write!(f, "alloca"),
            Operator::VaArg => write!(f, "va_arg"),
            Operator::Opaque { opcode } => write!(f, "opaque.{}", opcode),
        }
    }
}
