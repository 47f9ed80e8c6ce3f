use std::fmt;

use bytecode::{DecodeError, LabelError};
use parser::ParseError;
use thiserror::Error;

use crate::continuation::Suspension;
use crate::value::Value;

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a source text does not become a [`CompiledUnit`](bytecode::CompiledUnit).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Parse(#[from] ParseError),

    /// Label misuse inside the generator. Always a generator bug.
    #[error("code generation failed: {0}")]
    Label(#[from] LabelError),

    #[error("too many {what} in `{unit}` (limit {limit})")]
    Limit {
        what: &'static str,
        unit: String,
        limit: usize,
    },

    #[error("{message} (line {line})")]
    Unsupported { message: String, line: usize },
}

/// A scripted error that no try region caught.
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub value: Value,
    /// Textual form of `value`, e.g. `TypeError: x is not a function`.
    pub message: String,
    pub unit: String,
    pub line: Option<u32>,
    pub source_line: Option<String>,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match self.line {
            Some(line) => write!(f, " ({}:{line})", self.unit)?,
            None => write!(f, " ({})", self.unit)?,
        }
        if let Some(text) = &self.source_line {
            write!(f, "\n    {}", text.trim())?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

/// Invariant violations of the instruction stream. Never catchable by
/// scripts.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("malformed bytecode in `{unit}`: {source}")]
    Decode {
        unit: String,
        #[source]
        source: DecodeError,
    },

    #[error("operand stack underflow in `{unit}` at {pc}")]
    StackUnderflow { unit: String, pc: usize },

    #[error("{what} index {index} out of range in `{unit}`")]
    BadIndex {
        unit: String,
        what: &'static str,
        index: usize,
    },

    #[error("`{unit}` reads `arguments` without an activation")]
    MissingActivation { unit: String },
}

/// How a run ended when it did not return normally.
#[derive(Debug, Error)]
pub enum Unwind {
    #[error("uncaught {0}")]
    Thrown(ScriptError),

    /// Not a failure: the script hit `yield` and can be resumed.
    #[error("script suspended")]
    Suspended(Suspension),

    #[error("stack overflow: call depth exceeded {limit}")]
    StackOverflow { limit: usize },

    #[error("internal error: {0}")]
    Internal(#[from] InternalError),

    /// Misuse of the embedding API, such as calling a non-function.
    #[error("{0}")]
    Host(String),
}

impl Unwind {
    pub fn into_suspension(self) -> Option<Suspension> {
        match self {
            Self::Suspended(suspension) => Some(suspension),
            _ => None,
        }
    }
}

/// Anything [`ExecutionContext::evaluate`](crate::ExecutionContext::evaluate)
/// can fail with.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Unwind(#[from] Unwind),
}

/// Abrupt completion of one instruction inside the interpreter loop.
pub(crate) enum Fault {
    Throw(Value),
    Suspend(Value),
    Fatal(Unwind),
}

impl From<InternalError> for Fault {
    fn from(err: InternalError) -> Self {
        Self::Fatal(Unwind::Internal(err))
    }
}
