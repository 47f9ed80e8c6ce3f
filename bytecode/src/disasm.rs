use std::fmt::Write;

use crate::decoder::BytecodeDecoder;
use crate::instruction::Instruction;
use crate::unit::CompiledUnit;

/// Render `unit` and every nested unit as text.
pub fn disassemble(unit: &CompiledUnit) -> String {
    let mut out = String::new();
    write_unit(&mut out, unit, 0);
    out
}

fn write_unit(out: &mut String, unit: &CompiledUnit, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(
        out,
        "{pad}== {:?} {} ({} params, {} slots, max stack {}, version {}) ==",
        unit.kind,
        unit.display_name(),
        unit.param_count,
        unit.slot_count(),
        unit.max_stack,
        unit.language_version,
    );
    if unit.needs_activation {
        let _ = writeln!(out, "{pad}  needs activation");
    }
    if !unit.slot_names.is_empty() {
        let _ = writeln!(out, "{pad}  slots: {}", unit.slot_names.join(", "));
    }
    for (i, s) in unit.strings.iter().enumerate() {
        let _ = writeln!(out, "{pad}  #{i} = {s:?}");
    }
    for (i, n) in unit.numbers.iter().enumerate() {
        let _ = writeln!(out, "{pad}  #{i} = {n}");
    }
    for region in &unit.try_regions {
        let _ = writeln!(
            out,
            "{pad}  try [{}, {}) -> {} (depth {})",
            region.start, region.end, region.handler, region.stack_depth
        );
    }

    let code = unit.code();
    for item in BytecodeDecoder::new(&code) {
        match item {
            Ok((offset, instr)) => {
                let _ = write!(out, "{pad}  {offset:04}  {instr}");
                match instr {
                    Instruction::Jump { offset: rel }
                    | Instruction::JumpIfTrue { offset: rel }
                    | Instruction::JumpIfFalse { offset: rel } => {
                        let target = offset as isize + rel as isize;
                        let _ = write!(out, "  -> {target:04}");
                    }
                    Instruction::PushString { idx }
                    | Instruction::GetName { name: idx }
                    | Instruction::SetName { name: idx }
                    | Instruction::GetProp { name: idx }
                    | Instruction::SetProp { name: idx }
                    | Instruction::InitProp { name: idx } => {
                        if let Some(s) = unit.strings.get(idx as usize) {
                            let _ = write!(out, "  ; {s}");
                        }
                    }
                    Instruction::GetLocal { slot } | Instruction::SetLocal { slot } => {
                        if let Some(s) = unit.slot_names.get(slot as usize) {
                            let _ = write!(out, "  ; {s}");
                        }
                    }
                    _ => {}
                }
                out.push('\n');
            }
            Err(err) => {
                let _ = writeln!(out, "{pad}  !! {err}");
                break;
            }
        }
    }
    drop(code);

    for func in &unit.functions {
        write_unit(out, func, depth + 1);
    }
}
