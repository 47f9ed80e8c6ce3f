/// Bytecode opcodes for the stack machine.
///
/// Index operands (slots, constant pool entries, names, nested functions)
/// are 8-bit by default. The [`Wide`](Op::Wide) prefix promotes them to
/// 16-bit. Branch offsets are always a signed 16-bit delta measured from the
/// branch opcode itself. Line markers always carry a 32-bit line so that a
/// [`Line`](Op::Line) can be swapped for a [`Breakpoint`](Op::Breakpoint)
/// without moving any other byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Prefix: the next instruction uses 16-bit index operands.
    Wide = 0x00,

    /// Source line marker.
    /// Operands: `line:u32`
    Line,

    /// Source line marker with an armed breakpoint.
    /// Operands: `line:u32`
    Breakpoint,

    PushUndefined,
    PushNull,
    PushTrue,
    PushFalse,
    PushThis,

    /// Push a small integer.
    /// Operands: `value:i8` (wide: `i16`)
    PushSmi,

    /// Push an entry of the numeric constant table.
    /// Operands: `idx:u8` (wide: `u16`)
    PushNumber,

    /// Push an entry of the string constant table.
    /// Operands: `idx:u8` (wide: `u16`)
    PushString,

    Pop,
    Dup,
    /// Duplicate the top two values: `a b -> a b a b`.
    Dup2,
    Swap,

    /// Move the top value below the next `depth` values.
    /// Operands: `depth:u8`
    Insert,

    /// Push a local slot.
    /// Operands: `slot:u8` (wide: `u16`)
    GetLocal,

    /// Store the top value into a local slot, leaving it on the stack.
    /// Operands: `slot:u8` (wide: `u16`)
    SetLocal,

    /// Scope-chain lookup of a free name.
    /// Operands: `name:u8` (wide: `u16`) into the string table
    GetName,

    /// Scope-chain assignment, leaving the value on the stack.
    /// Operands: `name:u8` (wide: `u16`)
    SetName,

    /// `typeof name` that yields `"undefined"` for unbound names.
    /// Operands: `name:u8` (wide: `u16`)
    TypeOfName,

    /// Push the (lazily materialised) arguments object of the activation.
    GetArguments,

    /// `obj -> obj.name`
    /// Operands: `name:u8` (wide: `u16`)
    GetProp,

    /// `obj value -> value`
    /// Operands: `name:u8` (wide: `u16`)
    SetProp,

    /// `obj -> bool`
    /// Operands: `name:u8` (wide: `u16`)
    DeleteProp,

    /// `obj key -> obj[key]`
    GetElem,
    /// `obj key value -> value`
    SetElem,
    /// `obj key -> bool`
    DeleteElem,

    NewObject,

    /// `obj value -> obj`, defining an own property (object literals).
    /// Operands: `name:u8` (wide: `u16`)
    InitProp,

    /// Create a closure over a nested function unit and the current scope.
    /// Operands: `func:u8` (wide: `u16`)
    Closure,

    /// `callee this arg0 .. argN-1 -> result`
    /// Operands: `argc:u8`
    Call,

    Return,
    Throw,

    /// Suspend the interpreter, handing the top value to the host. The value
    /// supplied on resumption replaces it.
    Suspend,

    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    /// Unary `+` (ToNumber).
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

    /// Unconditional relative jump.
    /// Operands: `offset:i16` (relative to the jump opcode)
    Jump,

    /// Pop the condition; jump if truthy.
    /// Operands: `offset:i16`
    JumpIfTrue,

    /// Pop the condition; jump if falsy.
    /// Operands: `offset:i16`
    JumpIfFalse,
}

impl Op {
    pub const COUNT: usize = Op::JumpIfFalse as usize + 1;

    /// Whether this opcode has operands affected by the `Wide` prefix.
    pub const fn has_scalable_operands(self) -> bool {
        matches!(
            self,
            Op::PushSmi
                | Op::PushNumber
                | Op::PushString
                | Op::GetLocal
                | Op::SetLocal
                | Op::GetName
                | Op::SetName
                | Op::TypeOfName
                | Op::GetProp
                | Op::SetProp
                | Op::DeleteProp
                | Op::InitProp
                | Op::Closure
        )
    }

    /// Whether this opcode is a branch carrying an `i16` offset.
    pub const fn is_branch(self) -> bool {
        matches!(self, Op::Jump | Op::JumpIfTrue | Op::JumpIfFalse)
    }

    /// Whether this opcode is one of the two interchangeable line markers.
    pub const fn is_line_marker(self) -> bool {
        matches!(self, Op::Line | Op::Breakpoint)
    }
}

impl TryFrom<u8> for Op {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        if (byte as usize) < Self::COUNT {
            // SAFETY: Op is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, Op>(byte) })
        } else {
            Err(byte)
        }
    }
}
