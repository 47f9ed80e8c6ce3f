use crate::instruction::Instruction;
use crate::label::{Label, LabelError, LabelTable};
use crate::line_table::{LineTable, LineTableBuilder};
use crate::op::Op;

/// Output of [`BytecodeBuilder::finish`].
#[derive(Debug)]
pub struct Assembled {
    pub code: Vec<u8>,
    /// Deepest operand stack reached on any path.
    pub max_stack: usize,
    pub lines: LineTable,
}

/// Builds a bytecode byte sequence.
///
/// The builder automatically emits the [`Op::Wide`] prefix when an index
/// operand exceeds `u8::MAX`, keeps a running model of the operand stack
/// depth, and defers branch offsets to a [`LabelTable`].
pub struct BytecodeBuilder {
    buf: Vec<u8>,
    labels: LabelTable,
    lines: LineTableBuilder,
    current_line: Option<u32>,
    depth: usize,
    max_depth: usize,
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            labels: LabelTable::new(),
            lines: LineTableBuilder::new(),
            current_line: None,
            depth: 0,
            max_depth: 0,
        }
    }

    /// Current byte offset in the bytecode stream.
    pub fn current_offset(&self) -> usize {
        self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Modelled operand stack depth at the current offset.
    pub fn stack_depth(&self) -> usize {
        self.depth
    }

    /// Override the modelled depth. Needed after an unconditional transfer,
    /// where the following code is only reached through a label whose depth
    /// the generator knows.
    pub fn set_stack_depth(&mut self, depth: usize) {
        self.depth = depth;
        self.max_depth = self.max_depth.max(depth);
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn emit_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emit_op(&mut self, op: Op) {
        self.buf.push(op as u8);
    }

    fn needs_wide(idx: u16) -> bool {
        idx > u8::MAX as u16
    }

    fn emit_index(&mut self, op: Op, idx: u16) {
        if Self::needs_wide(idx) {
            self.emit_op(Op::Wide);
            self.emit_op(op);
            self.emit_u16(idx);
        } else {
            self.emit_op(op);
            self.emit_u8(idx as u8);
        }
    }

    fn account(&mut self, instr: &Instruction) {
        let (pops, pushes) = instr.stack_effect();
        debug_assert!(
            self.depth >= pops,
            "stack underflow emitting {instr} at depth {}",
            self.depth
        );
        self.depth = self.depth.saturating_sub(pops) + pushes;
        self.max_depth = self.max_depth.max(self.depth);
    }

    /// Append one instruction in its shortest encoding.
    pub fn emit(&mut self, instr: Instruction) {
        self.account(&instr);
        match instr {
            Instruction::Line { line } => {
                self.emit_op(Op::Line);
                self.emit_u32(line);
            }
            Instruction::Breakpoint { line } => {
                self.emit_op(Op::Breakpoint);
                self.emit_u32(line);
            }
            Instruction::PushSmi { value } => {
                if let Ok(v) = i8::try_from(value) {
                    self.emit_op(Op::PushSmi);
                    self.emit_u8(v as u8);
                } else {
                    self.emit_op(Op::Wide);
                    self.emit_op(Op::PushSmi);
                    self.emit_i16(value);
                }
            }
            Instruction::PushNumber { idx }
            | Instruction::PushString { idx } => {
                self.emit_index(instr.op(), idx);
            }
            Instruction::GetLocal { slot } | Instruction::SetLocal { slot } => {
                self.emit_index(instr.op(), slot);
            }
            Instruction::GetName { name }
            | Instruction::SetName { name }
            | Instruction::TypeOfName { name }
            | Instruction::GetProp { name }
            | Instruction::SetProp { name }
            | Instruction::DeleteProp { name }
            | Instruction::InitProp { name } => {
                self.emit_index(instr.op(), name);
            }
            Instruction::Closure { func } => self.emit_index(Op::Closure, func),
            Instruction::Insert { depth } => {
                self.emit_op(Op::Insert);
                self.emit_u8(depth);
            }
            Instruction::Call { argc } => {
                self.emit_op(Op::Call);
                self.emit_u8(argc);
            }
            Instruction::Jump { offset }
            | Instruction::JumpIfTrue { offset }
            | Instruction::JumpIfFalse { offset } => {
                self.emit_op(instr.op());
                self.emit_i16(offset);
            }
            other => self.emit_op(other.op()),
        }
    }

    /// Emit a line marker if `line` differs from the last one emitted.
    pub fn mark_line(&mut self, line: u32) {
        if self.current_line == Some(line) {
            return;
        }
        self.current_line = Some(line);
        self.lines.add(self.buf.len() as u32, line);
        self.emit(Instruction::Line { line });
    }

    // ── labels ─────────────────────────────────────────────────────

    pub fn new_label(&mut self) -> Label {
        self.labels.acquire()
    }

    /// Fix `label` to the current offset.
    pub fn mark(&mut self, label: Label) -> Result<(), LabelError> {
        self.labels.fix(label, self.buf.len())
    }

    /// The offset `label` was fixed to, if it has been.
    pub fn label_offset(&self, label: Label) -> Option<usize> {
        self.labels.pc(label)
    }

    /// Unconditional jump to `label`. The code after it is unreachable
    /// until a label is marked.
    pub fn jump(&mut self, label: Label) {
        self.emit_branch(Op::Jump, label);
    }

    /// Pop the condition; jump to `label` if it is truthy.
    pub fn jump_if_true(&mut self, label: Label) {
        self.emit_branch(Op::JumpIfTrue, label);
    }

    /// Pop the condition; jump to `label` if it is falsy.
    pub fn jump_if_false(&mut self, label: Label) {
        self.emit_branch(Op::JumpIfFalse, label);
    }

    fn emit_branch(&mut self, op: Op, label: Label) {
        let instr = match op {
            Op::JumpIfTrue => Instruction::JumpIfTrue { offset: 0 },
            Op::JumpIfFalse => Instruction::JumpIfFalse { offset: 0 },
            _ => Instruction::Jump { offset: 0 },
        };
        self.account(&instr);
        self.emit_op(op);
        self.labels.add_fixup(label, self.buf.len());
        self.emit_i16(0); // placeholder
    }

    /// Resolve every branch and hand out the finished stream.
    pub fn finish(mut self) -> Result<Assembled, LabelError> {
        self.labels.resolve_all(&mut self.buf)?;
        Ok(Assembled {
            code: self.buf,
            max_stack: self.max_depth,
            lines: self.lines.finish(),
        })
    }
}

impl Default for BytecodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
