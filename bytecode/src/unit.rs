use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::line_table::LineTable;
use crate::op::Op;

/// Language version a unit was compiled for, in the `major * 100 + minor * 10`
/// numbering (`150` is 1.5). [`DEFAULT`](Self::DEFAULT) means "unspecified".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LanguageVersion(pub u16);

impl LanguageVersion {
    pub const DEFAULT: Self = Self(0);
    pub const V1_2: Self = Self(120);
    pub const V1_3: Self = Self(130);
    pub const V1_5: Self = Self(150);

    /// Whether arguments objects of this version expose the deprecated
    /// synthetic `caller` property.
    pub fn has_arguments_caller(self) -> bool {
        self != Self::DEFAULT && self <= Self::V1_3
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::DEFAULT {
            return f.write_str("default");
        }
        write!(f, "{}.{}", self.0 / 100, (self.0 % 100) / 10)
    }
}

impl std::str::FromStr for LanguageVersion {
    type Err = String;

    /// Accepts `default`, `1.5` style or raw `150` style versions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("default") {
            return Ok(Self::DEFAULT);
        }
        if let Some((major, minor)) = s.split_once('.') {
            let major: u16 = major.parse().map_err(|_| format!("bad version `{s}`"))?;
            let minor: u16 = minor.parse().map_err(|_| format!("bad version `{s}`"))?;
            if minor > 9 {
                return Err(format!("bad version `{s}`"));
            }
            return Ok(Self(major * 100 + minor * 10));
        }
        s.parse().map(Self).map_err(|_| format!("bad version `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Script,
    Function,
}

/// A guarded instruction range with its handler.
///
/// On a throw at `pc` with `start <= pc < end`, the operand stack is cut to
/// `stack_depth`, the thrown value is pushed and control moves to `handler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryRegion {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    pub stack_depth: usize,
}

impl TryRegion {
    pub fn covers(&self, pc: usize) -> bool {
        self.start <= pc && pc < self.end
    }
}

/// Everything the code generator hands over to build a [`CompiledUnit`].
#[derive(Debug)]
pub struct UnitParts {
    pub name: String,
    pub kind: UnitKind,
    pub code: Vec<u8>,
    pub strings: Vec<Arc<str>>,
    pub numbers: Vec<f64>,
    pub functions: Vec<Arc<CompiledUnit>>,
    pub param_count: usize,
    pub slot_names: Vec<String>,
    pub needs_activation: bool,
    pub uses_arguments: bool,
    pub max_stack: usize,
    pub max_try_depth: usize,
    /// Innermost region first.
    pub try_regions: Vec<TryRegion>,
    pub lines: LineTable,
    pub language_version: LanguageVersion,
    pub declared_names: Vec<String>,
    pub source: Option<Arc<str>>,
    pub source_name: String,
}

/// The immutable result of compiling one function or script.
///
/// Only the line-marker bytes of the instruction stream ever change after
/// construction, through [`set_breakpoint`](Self::set_breakpoint). The
/// stream is behind a lock so that a unit shared across threads can still
/// be armed by a debugger.
#[derive(Debug)]
pub struct CompiledUnit {
    pub name: String,
    pub kind: UnitKind,
    code: RwLock<Box<[u8]>>,
    pub strings: Vec<Arc<str>>,
    pub numbers: Vec<f64>,
    pub functions: Vec<Arc<CompiledUnit>>,
    pub param_count: usize,
    pub slot_names: Vec<String>,
    pub needs_activation: bool,
    pub uses_arguments: bool,
    pub max_stack: usize,
    pub max_try_depth: usize,
    pub try_regions: Vec<TryRegion>,
    pub lines: LineTable,
    pub language_version: LanguageVersion,
    pub declared_names: Vec<String>,
    pub source: Option<Arc<str>>,
    pub source_name: String,
}

impl CompiledUnit {
    pub fn new(parts: UnitParts) -> Self {
        log::debug!(
            "finalised unit `{}`: {} bytes, max stack {}, {} slots",
            parts.name,
            parts.code.len(),
            parts.max_stack,
            parts.slot_names.len()
        );
        Self {
            name: parts.name,
            kind: parts.kind,
            code: RwLock::new(parts.code.into_boxed_slice()),
            strings: parts.strings,
            numbers: parts.numbers,
            functions: parts.functions,
            param_count: parts.param_count,
            slot_names: parts.slot_names,
            needs_activation: parts.needs_activation,
            uses_arguments: parts.uses_arguments,
            max_stack: parts.max_stack,
            max_try_depth: parts.max_try_depth,
            try_regions: parts.try_regions,
            lines: parts.lines,
            language_version: parts.language_version,
            declared_names: parts.declared_names,
            source: parts.source,
            source_name: parts.source_name,
        }
    }

    /// Read access to the instruction stream.
    pub fn code(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.code.read(), |code| &**code)
    }

    pub fn code_len(&self) -> usize {
        self.code.read().len()
    }

    pub fn slot_count(&self) -> usize {
        self.slot_names.len()
    }

    pub fn is_script(&self) -> bool {
        self.kind == UnitKind::Script
    }

    /// Display name, `<anonymous>` for unnamed functions.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "<anonymous>"
        } else {
            &self.name
        }
    }

    /// Innermost try region covering `pc`.
    pub fn handler_for(&self, pc: usize) -> Option<&TryRegion> {
        self.try_regions.iter().find(|r| r.covers(pc))
    }

    pub fn line_for_pc(&self, pc: usize) -> Option<u32> {
        self.lines.line_for_pc(pc)
    }

    /// Text of source line `line` (1-based), when the source was retained.
    pub fn source_line(&self, line: u32) -> Option<&str> {
        let source = self.source.as_deref()?;
        source.lines().nth(line.checked_sub(1)? as usize)
    }

    /// Arm or disarm the breakpoint on `line` by swapping its marker
    /// opcode in place. Returns `false` when no marker exists for `line`.
    pub fn set_breakpoint(&self, line: u32, enabled: bool) -> bool {
        let Some(offset) = self.lines.offset_for_line(line) else {
            log::warn!(
                "no code for line {line} in `{}`; breakpoint ignored",
                self.display_name()
            );
            return false;
        };
        let mut code = self.code.write();
        let Some(byte) = code.get_mut(offset) else {
            return false;
        };
        let is_marker = Op::try_from(*byte).is_ok_and(Op::is_line_marker);
        if !is_marker {
            log::warn!("line table of `{}` points past a marker", self.display_name());
            return false;
        }
        let marker = if enabled { Op::Breakpoint } else { Op::Line };
        *byte = marker as u8;
        true
    }

    pub fn has_breakpoint(&self, line: u32) -> bool {
        self.lines
            .offset_for_line(line)
            .is_some_and(|offset| self.code.read().get(offset) == Some(&(Op::Breakpoint as u8)))
    }

    /// Arm `line` in this unit and every nested unit carrying it. Returns
    /// how many markers were armed.
    pub fn set_breakpoint_recursive(&self, line: u32, enabled: bool) -> usize {
        let own = usize::from(
            self.lines.offset_for_line(line).is_some() && self.set_breakpoint(line, enabled),
        );
        own + self
            .functions
            .iter()
            .map(|f| f.set_breakpoint_recursive(line, enabled))
            .sum::<usize>()
    }
}
