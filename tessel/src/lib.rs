//! # tessel
//!
//! A small bytecode engine for an ECMAScript-like language.
//!
//! ```text
//!  source ──▶ parser ──▶ compiler ──▶ CompiledUnit (Arc, shareable)
//!                                          │
//!                                          ▼
//!             ExecutionContext ──▶ interpreter loop ──▶ Value
//!                    │                    │
//!                    │                    └──▶ Unwind::Suspended(token)
//!                    └──────── resume(token, value) ◀───┘
//! ```
//!
//! Compiled units are immutable apart from their breakpoint markers and can
//! be shared across threads. Everything a script touches at run time
//! (values, objects, activation records) is reference counted and belongs
//! to one [`ExecutionContext`].
pub mod activation;
pub mod arguments;
mod builtins;
pub mod compiler;
pub mod config;
pub mod context;
pub mod continuation;
pub mod error;
mod interpreter;
pub mod number;
pub mod object;
pub mod scope;
pub mod value;

pub use activation::{ActivationRecord, ActivationRef};
pub use arguments::ArgumentsView;
pub use bytecode::{CompiledUnit, LanguageVersion, disassemble};
pub use config::{CompileOptions, ContextCreateInfo};
pub use context::{BreakEvent, ExecutionContext};
pub use continuation::{ResumeToken, Suspension};
pub use error::{CompileError, Error, InternalError, Result, ScriptError, Unwind};
pub use object::{Callable, ErrorKind, NativeFunction, Object, ObjectKind, ObjectRef};
pub use scope::{PropertyAccess, Scope};
pub use value::Value;
