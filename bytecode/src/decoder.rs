use thiserror::Error;

use crate::instruction::Instruction;
use crate::op::Op;

/// A malformed instruction stream.
///
/// Code produced by [`BytecodeBuilder`](crate::BytecodeBuilder) never
/// triggers these; seeing one means the generator or a patch went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode 0x{byte:02x} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },
    #[error("truncated operand for {op:?} at offset {offset}")]
    Truncated { op: Op, offset: usize },
    #[error("wide prefix before {op:?} at offset {offset}")]
    InvalidWide { op: Op, offset: usize },
    #[error("instruction stream ends at offset {offset}")]
    UnexpectedEnd { offset: usize },
}

/// Decodes a bytecode byte slice into [`Instruction`]s.
///
/// Unlike a trusting decoder every read is bounds checked, so a corrupt
/// stream surfaces as a [`DecodeError`] rather than undefined behaviour.
pub struct BytecodeDecoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Start decoding at an arbitrary instruction boundary.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    /// Current byte offset in the stream.
    #[inline]
    pub fn offset(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Decode the next instruction, or `None` at end-of-stream.
    pub fn decode_next(&mut self) -> Option<Result<Instruction, DecodeError>> {
        if self.is_at_end() {
            return None;
        }
        Some(self.decode())
    }

    fn decode(&mut self) -> Result<Instruction, DecodeError> {
        let start = self.pos;
        let op = self.read_op()?;
        if op == Op::Wide {
            let next = self.read_op()?;
            if !next.has_scalable_operands() {
                return Err(DecodeError::InvalidWide {
                    op: next,
                    offset: start,
                });
            }
            return self.decode_op(next, true, start);
        }
        self.decode_op(op, false, start)
    }

    fn decode_op(
        &mut self,
        op: Op,
        wide: bool,
        start: usize,
    ) -> Result<Instruction, DecodeError> {
        let instr = match op {
            Op::Wide => {
                return Err(DecodeError::InvalidWide { op, offset: start });
            }
            Op::Line => Instruction::Line {
                line: self.read_u32(op)?,
            },
            Op::Breakpoint => Instruction::Breakpoint {
                line: self.read_u32(op)?,
            },
            Op::PushUndefined => Instruction::PushUndefined,
            Op::PushNull => Instruction::PushNull,
            Op::PushTrue => Instruction::PushTrue,
            Op::PushFalse => Instruction::PushFalse,
            Op::PushThis => Instruction::PushThis,
            Op::PushSmi => {
                let value = if wide {
                    self.read_u16(op)? as i16
                } else {
                    self.read_u8(op)? as i8 as i16
                };
                Instruction::PushSmi { value }
            }
            Op::PushNumber => Instruction::PushNumber {
                idx: self.read_index(op, wide)?,
            },
            Op::PushString => Instruction::PushString {
                idx: self.read_index(op, wide)?,
            },
            Op::Pop => Instruction::Pop,
            Op::Dup => Instruction::Dup,
            Op::Dup2 => Instruction::Dup2,
            Op::Swap => Instruction::Swap,
            Op::Insert => Instruction::Insert {
                depth: self.read_u8(op)?,
            },
            Op::GetLocal => Instruction::GetLocal {
                slot: self.read_index(op, wide)?,
            },
            Op::SetLocal => Instruction::SetLocal {
                slot: self.read_index(op, wide)?,
            },
            Op::GetName => Instruction::GetName {
                name: self.read_index(op, wide)?,
            },
            Op::SetName => Instruction::SetName {
                name: self.read_index(op, wide)?,
            },
            Op::TypeOfName => Instruction::TypeOfName {
                name: self.read_index(op, wide)?,
            },
            Op::GetArguments => Instruction::GetArguments,
            Op::GetProp => Instruction::GetProp {
                name: self.read_index(op, wide)?,
            },
            Op::SetProp => Instruction::SetProp {
                name: self.read_index(op, wide)?,
            },
            Op::DeleteProp => Instruction::DeleteProp {
                name: self.read_index(op, wide)?,
            },
            Op::GetElem => Instruction::GetElem,
            Op::SetElem => Instruction::SetElem,
            Op::DeleteElem => Instruction::DeleteElem,
            Op::NewObject => Instruction::NewObject,
            Op::InitProp => Instruction::InitProp {
                name: self.read_index(op, wide)?,
            },
            Op::Closure => Instruction::Closure {
                func: self.read_index(op, wide)?,
            },
            Op::Call => Instruction::Call {
                argc: self.read_u8(op)?,
            },
            Op::Return => Instruction::Return,
            Op::Throw => Instruction::Throw,
            Op::Suspend => Instruction::Suspend,
            Op::Add => Instruction::Add,
            Op::Sub => Instruction::Sub,
            Op::Mul => Instruction::Mul,
            Op::Div => Instruction::Div,
            Op::Mod => Instruction::Mod,
            Op::Neg => Instruction::Neg,
            Op::Plus => Instruction::Plus,
            Op::Not => Instruction::Not,
            Op::TypeOf => Instruction::TypeOf,
            Op::Eq => Instruction::Eq,
            Op::Ne => Instruction::Ne,
            Op::StrictEq => Instruction::StrictEq,
            Op::StrictNe => Instruction::StrictNe,
            Op::Lt => Instruction::Lt,
            Op::Le => Instruction::Le,
            Op::Gt => Instruction::Gt,
            Op::Ge => Instruction::Ge,
            Op::Jump => Instruction::Jump {
                offset: self.read_u16(op)? as i16,
            },
            Op::JumpIfTrue => Instruction::JumpIfTrue {
                offset: self.read_u16(op)? as i16,
            },
            Op::JumpIfFalse => Instruction::JumpIfFalse {
                offset: self.read_u16(op)? as i16,
            },
        };
        Ok(instr)
    }

    fn read_op(&mut self) -> Result<Op, DecodeError> {
        let offset = self.pos;
        let byte = *self
            .bytes
            .get(offset)
            .ok_or(DecodeError::UnexpectedEnd { offset })?;
        self.pos += 1;
        Op::try_from(byte)
            .map_err(|byte| DecodeError::UnknownOpcode { byte, offset })
    }

    fn take<const N: usize>(&mut self, op: Op) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(DecodeError::Truncated { op, offset: self.pos })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn read_u8(&mut self, op: Op) -> Result<u8, DecodeError> {
        Ok(self.take::<1>(op)?[0])
    }

    fn read_u16(&mut self, op: Op) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take::<2>(op)?))
    }

    fn read_u32(&mut self, op: Op) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take::<4>(op)?))
    }

    fn read_index(&mut self, op: Op, wide: bool) -> Result<u16, DecodeError> {
        if wide {
            self.read_u16(op)
        } else {
            self.read_u8(op).map(u16::from)
        }
    }
}

impl Iterator for BytecodeDecoder<'_> {
    /// `(offset, instruction)` pairs.
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.pos;
        self.decode_next().map(|r| r.map(|instr| (offset, instr)))
    }
}

/// Decode the single instruction starting at `pc`, returning it together
/// with the offset of the following instruction.
pub fn decode_at(
    bytes: &[u8],
    pc: usize,
) -> Result<(Instruction, usize), DecodeError> {
    let mut decoder = BytecodeDecoder::at(bytes, pc);
    let instr = decoder.decode()?;
    Ok((instr, decoder.offset()))
}
