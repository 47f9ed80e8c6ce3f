mod builder;
mod decoder;
mod disasm;
mod instruction;
mod label;
mod line_table;
mod op;
mod unit;
mod variables;

pub use builder::{Assembled, BytecodeBuilder};
pub use decoder::{BytecodeDecoder, DecodeError, decode_at};
pub use disasm::disassemble;
pub use instruction::Instruction;
pub use label::{Label, LabelError, LabelTable};
pub use line_table::{LineEntries, LineTable, LineTableBuilder};
pub use op::Op;
pub use unit::{CompiledUnit, LanguageVersion, TryRegion, UnitKind, UnitParts};
pub use variables::{ParameterDecl, Variable, VariableTable};
