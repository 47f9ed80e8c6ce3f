use core::fmt;

use crate::op::Op;

/// A decoded instruction with all operands resolved to their widest types.
///
/// Index operands are always `u16` regardless of whether the instruction was
/// encoded in narrow or wide form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Line { line: u32 },
    Breakpoint { line: u32 },
    PushUndefined,
    PushNull,
    PushTrue,
    PushFalse,
    PushThis,
    PushSmi { value: i16 },
    PushNumber { idx: u16 },
    PushString { idx: u16 },
    Pop,
    Dup,
    Dup2,
    Swap,
    Insert { depth: u8 },
    GetLocal { slot: u16 },
    SetLocal { slot: u16 },
    GetName { name: u16 },
    SetName { name: u16 },
    TypeOfName { name: u16 },
    GetArguments,
    GetProp { name: u16 },
    SetProp { name: u16 },
    DeleteProp { name: u16 },
    GetElem,
    SetElem,
    DeleteElem,
    NewObject,
    InitProp { name: u16 },
    Closure { func: u16 },
    Call { argc: u8 },
    Return,
    Throw,
    Suspend,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Plus,
    Not,
    TypeOf,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    Jump { offset: i16 },
    JumpIfTrue { offset: i16 },
    JumpIfFalse { offset: i16 },
}

impl Instruction {
    pub fn op(&self) -> Op {
        match self {
            Self::Line { .. } => Op::Line,
            Self::Breakpoint { .. } => Op::Breakpoint,
            Self::PushUndefined => Op::PushUndefined,
            Self::PushNull => Op::PushNull,
            Self::PushTrue => Op::PushTrue,
            Self::PushFalse => Op::PushFalse,
            Self::PushThis => Op::PushThis,
            Self::PushSmi { .. } => Op::PushSmi,
            Self::PushNumber { .. } => Op::PushNumber,
            Self::PushString { .. } => Op::PushString,
            Self::Pop => Op::Pop,
            Self::Dup => Op::Dup,
            Self::Dup2 => Op::Dup2,
            Self::Swap => Op::Swap,
            Self::Insert { .. } => Op::Insert,
            Self::GetLocal { .. } => Op::GetLocal,
            Self::SetLocal { .. } => Op::SetLocal,
            Self::GetName { .. } => Op::GetName,
            Self::SetName { .. } => Op::SetName,
            Self::TypeOfName { .. } => Op::TypeOfName,
            Self::GetArguments => Op::GetArguments,
            Self::GetProp { .. } => Op::GetProp,
            Self::SetProp { .. } => Op::SetProp,
            Self::DeleteProp { .. } => Op::DeleteProp,
            Self::GetElem => Op::GetElem,
            Self::SetElem => Op::SetElem,
            Self::DeleteElem => Op::DeleteElem,
            Self::NewObject => Op::NewObject,
            Self::InitProp { .. } => Op::InitProp,
            Self::Closure { .. } => Op::Closure,
            Self::Call { .. } => Op::Call,
            Self::Return => Op::Return,
            Self::Throw => Op::Throw,
            Self::Suspend => Op::Suspend,
            Self::Add => Op::Add,
            Self::Sub => Op::Sub,
            Self::Mul => Op::Mul,
            Self::Div => Op::Div,
            Self::Mod => Op::Mod,
            Self::Neg => Op::Neg,
            Self::Plus => Op::Plus,
            Self::Not => Op::Not,
            Self::TypeOf => Op::TypeOf,
            Self::Eq => Op::Eq,
            Self::Ne => Op::Ne,
            Self::StrictEq => Op::StrictEq,
            Self::StrictNe => Op::StrictNe,
            Self::Lt => Op::Lt,
            Self::Le => Op::Le,
            Self::Gt => Op::Gt,
            Self::Ge => Op::Ge,
            Self::Jump { .. } => Op::Jump,
            Self::JumpIfTrue { .. } => Op::JumpIfTrue,
            Self::JumpIfFalse { .. } => Op::JumpIfFalse,
        }
    }

    /// Number of values popped and pushed by this instruction.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Self::Line { .. }
            | Self::Breakpoint { .. }
            | Self::Jump { .. } => (0, 0),
            Self::PushUndefined
            | Self::PushNull
            | Self::PushTrue
            | Self::PushFalse
            | Self::PushThis
            | Self::PushSmi { .. }
            | Self::PushNumber { .. }
            | Self::PushString { .. }
            | Self::GetLocal { .. }
            | Self::GetName { .. }
            | Self::TypeOfName { .. }
            | Self::GetArguments
            | Self::NewObject
            | Self::Closure { .. } => (0, 1),
            Self::Pop
            | Self::Return
            | Self::Throw
            | Self::JumpIfTrue { .. }
            | Self::JumpIfFalse { .. } => (1, 0),
            Self::Dup => (1, 2),
            Self::Dup2 => (2, 4),
            Self::Swap => (2, 2),
            Self::Insert { depth } => (*depth as usize + 1, *depth as usize + 1),
            Self::SetLocal { .. }
            | Self::SetName { .. }
            | Self::GetProp { .. }
            | Self::DeleteProp { .. }
            | Self::Suspend
            | Self::Neg
            | Self::Plus
            | Self::Not
            | Self::TypeOf => (1, 1),
            Self::SetProp { .. }
            | Self::GetElem
            | Self::DeleteElem
            | Self::InitProp { .. }
            | Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Div
            | Self::Mod
            | Self::Eq
            | Self::Ne
            | Self::StrictEq
            | Self::StrictNe
            | Self::Lt
            | Self::Le
            | Self::Gt
            | Self::Ge => (2, 1),
            Self::SetElem => (3, 1),
            Self::Call { argc } => (*argc as usize + 2, 1),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line { line } => write!(f, "Line {line}"),
            Self::Breakpoint { line } => write!(f, "Breakpoint {line}"),
            Self::PushSmi { value } => write!(f, "PushSmi {value}"),
            Self::PushNumber { idx } => write!(f, "PushNumber #{idx}"),
            Self::PushString { idx } => write!(f, "PushString #{idx}"),
            Self::Insert { depth } => write!(f, "Insert {depth}"),
            Self::GetLocal { slot } => write!(f, "GetLocal s{slot}"),
            Self::SetLocal { slot } => write!(f, "SetLocal s{slot}"),
            Self::GetName { name } => write!(f, "GetName #{name}"),
            Self::SetName { name } => write!(f, "SetName #{name}"),
            Self::TypeOfName { name } => write!(f, "TypeOfName #{name}"),
            Self::GetProp { name } => write!(f, "GetProp #{name}"),
            Self::SetProp { name } => write!(f, "SetProp #{name}"),
            Self::DeleteProp { name } => write!(f, "DeleteProp #{name}"),
            Self::InitProp { name } => write!(f, "InitProp #{name}"),
            Self::Closure { func } => write!(f, "Closure fn{func}"),
            Self::Call { argc } => write!(f, "Call {argc}"),
            Self::Jump { offset } => write!(f, "Jump {offset:+}"),
            Self::JumpIfTrue { offset } => write!(f, "JumpIfTrue {offset:+}"),
            Self::JumpIfFalse { offset } => {
                write!(f, "JumpIfFalse {offset:+}")
            }
            other => write!(f, "{:?}", other.op()),
        }
    }
}
