//! The bytecode interpreter loop.
//!
//! A run owns an explicit stack of [`Frame`]s; calls between compiled
//! functions push and pop frames instead of recursing on the host stack.
//! Host functions are called directly and may re-enter the context, in
//! which case the nested run accounts for the frames held further down.
use std::rc::Rc;
use std::sync::Arc;

use bytecode::{CompiledUnit, Instruction, decode_at};

use crate::activation::{ActivationRecord, ActivationRef};
use crate::arguments::array_index;
use crate::context::{BreakEvent, ExecutionContext};
use crate::continuation::{ResumeToken, Suspension};
use crate::error::{Fault, InternalError, ScriptError, Unwind};
use crate::object::{Callable, ErrorKind, NativeFunction, Object, ObjectKind, ObjectRef};
use crate::scope::{PropertyAccess, Scope};
use crate::value::Value;

/// Where a frame keeps its parameters and locals.
#[derive(Clone)]
enum Locals {
    Slots(Vec<Value>),
    Activation(ActivationRef),
}

#[derive(Clone)]
pub(crate) struct Frame {
    unit: Arc<CompiledUnit>,
    pc: usize,
    /// Start of the instruction being executed; try regions and line
    /// lookups are keyed on it.
    instr_pc: usize,
    stack: Vec<Value>,
    locals: Locals,
    scope: Scope,
    this: Value,
}

enum Flow {
    Next,
    Call {
        callee: ObjectRef,
        this: Value,
        args: Vec<Value>,
    },
    Return(Value),
    Break(u32),
}

pub(crate) fn throw(kind: ErrorKind, message: impl AsRef<str>) -> Fault {
    Fault::Throw(Value::Object(Object::error(kind, message.as_ref())))
}

impl Frame {
    fn new(unit: Arc<CompiledUnit>, locals: Locals, scope: Scope, this: Value, stack_size: usize) -> Self {
        let capacity = stack_size.max(unit.max_stack);
        Self {
            unit,
            pc: 0,
            instr_pc: 0,
            stack: Vec::with_capacity(capacity),
            locals,
            scope,
            this,
        }
    }

    /// Frame for a script unit running directly against `scope`.
    pub(crate) fn script(unit: Arc<CompiledUnit>, scope: Scope, this: Value, stack_size: usize) -> Self {
        let slots = vec![Value::Undefined; unit.slot_count()];
        Self::new(unit, Locals::Slots(slots), scope, this, stack_size)
    }

    pub(crate) fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    pub(crate) fn line(&self) -> Option<u32> {
        self.unit.line_for_pc(self.instr_pc)
    }

    pub(crate) fn activation(&self) -> Option<&ActivationRef> {
        match &self.locals {
            Locals::Activation(activation) => Some(activation),
            Locals::Slots(_) => None,
        }
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn underflow(&self) -> InternalError {
        InternalError::StackUnderflow {
            unit: self.unit.display_name().to_string(),
            pc: self.instr_pc,
        }
    }

    fn bad_index(&self, what: &'static str, index: usize) -> InternalError {
        InternalError::BadIndex {
            unit: self.unit.display_name().to_string(),
            what,
            index,
        }
    }

    fn pop(&mut self) -> Result<Value, InternalError> {
        self.stack.pop().ok_or_else(|| self.underflow())
    }

    fn peek(&self) -> Result<&Value, InternalError> {
        self.stack.last().ok_or_else(|| self.underflow())
    }

    /// Stack index `depth` values below the top.
    fn below(&self, depth: usize) -> Result<usize, InternalError> {
        self.stack.len().checked_sub(depth).ok_or_else(|| self.underflow())
    }

    fn get_local(&self, slot: u16) -> Result<Value, InternalError> {
        let index = usize::from(slot);
        let value = match &self.locals {
            Locals::Slots(slots) => slots.get(index).cloned(),
            Locals::Activation(activation) => activation.slot(index),
        };
        value.ok_or_else(|| self.bad_index("slot", index))
    }

    fn set_local(&mut self, slot: u16, value: Value) -> Result<(), InternalError> {
        let index = usize::from(slot);
        let stored = match &mut self.locals {
            Locals::Slots(slots) => slots.get_mut(index).map(|s| *s = value).is_some(),
            Locals::Activation(activation) => activation.set_slot(index, value),
        };
        if stored { Ok(()) } else { Err(self.bad_index("slot", index)) }
    }

    fn name(&self, index: u16) -> Result<Arc<str>, InternalError> {
        self.unit
            .strings
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| self.bad_index("string", usize::from(index)))
    }

    fn jump_target(&self, offset: i16) -> Result<usize, InternalError> {
        self.instr_pc
            .checked_add_signed(isize::from(offset))
            .filter(|&target| target < self.unit.code_len())
            .ok_or_else(|| self.bad_index("branch target", self.instr_pc))
    }

    /// Called when the frame is discarded.
    fn release(&self) {
        if let Some(activation) = self.activation() {
            log::debug!("leaving `{}`", activation.name());
            activation.release_arguments();
        }
    }
}

fn string_member(text: &str, name: &str) -> Value {
    if name == "length" {
        return Value::Number(text.encode_utf16().count() as f64);
    }
    array_index(name)
        .and_then(|index| text.encode_utf16().nth(index))
        .map_or(Value::Undefined, |unit| Value::string(String::from_utf16_lossy(&[unit])))
}

fn add(a: &Value, b: &Value) -> Value {
    let (a, b) = (a.to_primitive(), b.to_primitive());
    if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
        let mut text = a.to_js_string().to_string();
        text.push_str(&b.to_js_string());
        Value::string(text)
    } else {
        Value::Number(a.to_number() + b.to_number())
    }
}

/// Describe an uncaught `value` thrown at `pc` of `unit`.
pub(crate) fn script_error(value: Value, origin: Option<(&CompiledUnit, usize)>) -> ScriptError {
    let message = value.to_js_string().to_string();
    match origin {
        Some((unit, pc)) => {
            let line = unit.line_for_pc(pc);
            ScriptError {
                value,
                message,
                unit: unit.source_name.clone(),
                line,
                source_line: line.and_then(|l| unit.source_line(l)).map(str::to_string),
            }
        }
        None => ScriptError {
            value,
            message,
            unit: "<native>".to_string(),
            line: None,
            source_line: None,
        },
    }
}

impl ExecutionContext {
    /// Innermost live activation: the nearest frame owning one, else the
    /// one current when this run was entered.
    pub(crate) fn top_activation(&self, frames: &[Frame]) -> Option<ActivationRef> {
        frames
            .iter()
            .rev()
            .find_map(|frame| frame.activation().cloned())
            .or_else(|| self.floor.clone())
    }

    fn check_depth(&self, depth: usize) -> Result<(), Fault> {
        let limit = self.info.max_call_depth;
        if self.outer_frames + depth >= limit {
            log::warn!("call depth limit {limit} reached");
            return Err(Fault::Fatal(Unwind::StackOverflow { limit }));
        }
        Ok(())
    }

    /// Build the frame for a call of a compiled function.
    pub(crate) fn enter(
        &self,
        frames: &[Frame],
        callee: Option<ObjectRef>,
        unit: Arc<CompiledUnit>,
        scope: Scope,
        this: Value,
        args: Vec<Value>,
    ) -> Frame {
        let this = if this.is_nullish() {
            Value::Object(self.global.clone())
        } else {
            this
        };
        let stack_size = self.info.stack_size;
        if unit.needs_activation {
            let caller = self.top_activation(frames);
            let activation = ActivationRecord::new(unit.clone(), callee, this.clone(), caller.as_ref(), scope, &args);
            return Frame::new(
                unit,
                Locals::Activation(activation.clone()),
                Scope::Activation(activation),
                this,
                stack_size,
            );
        }
        let mut slots = vec![Value::Undefined; unit.slot_count()];
        for (slot, arg) in slots.iter_mut().zip(args).take(unit.param_count) {
            *slot = arg;
        }
        Frame::new(unit, Locals::Slots(slots), scope, this, stack_size)
    }

    /// Run `frames` until the bottom frame returns.
    pub(crate) fn run(&mut self, mut frames: Vec<Frame>) -> Result<Value, Unwind> {
        loop {
            let fault = match self.execute_frames(&mut frames) {
                Ok(value) => return Ok(value),
                Err(fault) => fault,
            };
            match fault {
                Fault::Throw(value) => self.unwind(&mut frames, value)?,
                Fault::Suspend(value) => {
                    let token = ResumeToken::new(frames);
                    log::debug!(
                        "suspended in `{}` with {} frames",
                        token.unit_name().unwrap_or("<none>"),
                        token.depth()
                    );
                    return Err(Unwind::Suspended(Suspension { value, token }));
                }
                Fault::Fatal(unwind) => {
                    frames.iter().for_each(Frame::release);
                    return Err(unwind);
                }
            }
        }
    }

    /// Re-enter captured frames with `value` as the result of the `yield`.
    pub(crate) fn resume_frames(&mut self, mut frames: Vec<Frame>, value: Value) -> Result<Value, Unwind> {
        let Some(top) = frames.last_mut() else {
            return Err(Unwind::Host("resume token holds no frames".to_string()));
        };
        log::debug!("resuming `{}` at {}", top.unit.display_name(), top.pc);
        top.push(value);
        self.run(frames)
    }

    /// Transfer a thrown value to the innermost covering handler. Fails
    /// with the uncaught error once every frame is gone.
    fn unwind(&mut self, frames: &mut Vec<Frame>, value: Value) -> Result<(), Unwind> {
        let origin = frames.last().map(|f| (f.unit.clone(), f.instr_pc));
        while let Some(frame) = frames.last_mut() {
            if let Some(region) = frame.unit.handler_for(frame.instr_pc).copied() {
                log::debug!(
                    "exception caught in `{}` at {}, handler {}",
                    frame.unit.display_name(),
                    frame.instr_pc,
                    region.handler
                );
                frame.stack.truncate(region.stack_depth);
                frame.stack.push(value);
                frame.pc = region.handler;
                return Ok(());
            }
            if let Some(frame) = frames.pop() {
                frame.release();
            }
        }
        let origin = origin.as_ref().map(|(unit, pc)| (&**unit, *pc));
        Err(Unwind::Thrown(script_error(value, origin)))
    }

    fn execute_frames(&mut self, frames: &mut Vec<Frame>) -> Result<Value, Fault> {
        loop {
            let Some(frame) = frames.last_mut() else {
                return Err(Fault::Fatal(Unwind::Host("no frame to execute".to_string())));
            };
            match self.step(frame)? {
                Flow::Next => {}
                Flow::Return(value) => {
                    if let Some(done) = frames.pop() {
                        done.release();
                    }
                    match frames.last_mut() {
                        Some(caller) => caller.push(value),
                        None => return Ok(value),
                    }
                }
                Flow::Call { callee, this, args } => self.dispatch(frames, callee, this, args)?,
                Flow::Break(line) => self.hit_breakpoint(frames, line),
            }
        }
    }

    fn dispatch(&mut self, frames: &mut Vec<Frame>, callee: ObjectRef, this: Value, args: Vec<Value>) -> Result<(), Fault> {
        match callee.kind() {
            ObjectKind::Function(Callable::Closure { unit, scope }) => {
                self.check_depth(frames.len())?;
                let frame = self.enter(frames, Some(callee.clone()), unit.clone(), scope.clone(), this, args);
                frames.push(frame);
            }
            ObjectKind::Function(Callable::Native(native)) => {
                let value = self.call_native(frames, native, this, &args)?;
                if let Some(top) = frames.last_mut() {
                    top.push(value);
                }
            }
            _ => return Err(throw(ErrorKind::TypeError, format!("{:?} is not a function", Value::Object(callee.clone())))),
        }
        Ok(())
    }

    pub(crate) fn call_native(
        &mut self,
        frames: &[Frame],
        native: &NativeFunction,
        this: Value,
        args: &[Value],
    ) -> Result<Value, Fault> {
        self.check_depth(frames.len())?;
        let held = frames.len() + 1;
        let floor = self.top_activation(frames);
        let saved = std::mem::replace(&mut self.floor, floor);
        self.outer_frames += held;
        let func = Rc::clone(&native.func);
        let result = func(self, &this, args);
        self.outer_frames -= held;
        self.floor = saved;
        if let Some(unwind) = self.pending.take() {
            return Err(Fault::Fatal(unwind));
        }
        result.map_err(Fault::Throw)
    }

    fn hit_breakpoint(&mut self, frames: &[Frame], line: u32) {
        let Some(frame) = frames.last() else {
            return;
        };
        let event = BreakEvent {
            unit: frame.unit.clone(),
            line,
            frame_count: self.outer_frames + frames.len(),
        };
        match self.debug_hook.take() {
            Some(mut hook) => {
                hook(&event);
                // The hook may have been replaced from inside itself.
                if self.debug_hook.is_none() {
                    self.debug_hook = Some(hook);
                }
            }
            None => log::info!(
                "breakpoint at {}:{line} with no debug hook installed",
                frame.unit.display_name()
            ),
        }
    }

    fn get_member(&self, target: &Value, name: &str) -> Result<Value, Fault> {
        match target {
            Value::Object(obj) => Ok(obj.get_property(name).unwrap_or_default()),
            Value::String(text) => Ok(string_member(text, name)),
            Value::Number(_) => Ok(self.number_prototype.get_property(name).unwrap_or_default()),
            Value::Bool(_) => Ok(Value::Undefined),
            Value::Undefined | Value::Null => Err(throw(
                ErrorKind::TypeError,
                format!("Cannot read property \"{name}\" from {target}"),
            )),
        }
    }

    fn set_member(&self, target: &Value, name: &str, value: Value) -> Result<(), Fault> {
        match target {
            Value::Object(obj) => {
                obj.put_property(name, value);
                Ok(())
            }
            Value::Undefined | Value::Null => Err(throw(
                ErrorKind::TypeError,
                format!("Cannot set property \"{name}\" of {target}"),
            )),
            // Writes to primitives are dropped.
            _ => Ok(()),
        }
    }

    fn delete_member(&self, target: &Value, name: &str) -> Result<bool, Fault> {
        match target {
            Value::Object(obj) => Ok(obj.delete_property(name)),
            Value::Undefined | Value::Null => Err(throw(
                ErrorKind::TypeError,
                format!("Cannot delete property \"{name}\" of {target}"),
            )),
            _ => Ok(true),
        }
    }

    fn step(&mut self, frame: &mut Frame) -> Result<Flow, Fault> {
        let (instr, next) = {
            let code = frame.unit.code();
            decode_at(&code, frame.pc).map_err(|source| InternalError::Decode {
                unit: frame.unit.display_name().to_string(),
                source,
            })?
        };
        frame.instr_pc = frame.pc;
        frame.pc = next;
        log::trace!("{}:{:04} {}", frame.unit.display_name(), frame.instr_pc, instr);

        match instr {
            Instruction::Line { .. } => {}
            Instruction::Breakpoint { line } => return Ok(Flow::Break(line)),
            Instruction::PushUndefined => frame.push(Value::Undefined),
            Instruction::PushNull => frame.push(Value::Null),
            Instruction::PushTrue => frame.push(Value::Bool(true)),
            Instruction::PushFalse => frame.push(Value::Bool(false)),
            Instruction::PushThis => {
                let this = frame.this.clone();
                frame.push(this);
            }
            Instruction::PushSmi { value } => frame.push(Value::Number(f64::from(value))),
            Instruction::PushNumber { idx } => {
                let index = usize::from(idx);
                let n = *frame
                    .unit
                    .numbers
                    .get(index)
                    .ok_or_else(|| frame.bad_index("number", index))?;
                frame.push(Value::Number(n));
            }
            Instruction::PushString { idx } => {
                let text = frame.name(idx)?;
                frame.push(Value::string(&*text));
            }
            Instruction::Pop => {
                frame.pop()?;
            }
            Instruction::Dup => {
                let top = frame.peek()?.clone();
                frame.push(top);
            }
            Instruction::Dup2 => {
                let at = frame.below(2)?;
                let (a, b) = (frame.stack[at].clone(), frame.stack[at + 1].clone());
                frame.push(a);
                frame.push(b);
            }
            Instruction::Swap => {
                let at = frame.below(2)?;
                frame.stack.swap(at, at + 1);
            }
            Instruction::Insert { depth } => {
                let value = frame.pop()?;
                let at = frame.below(usize::from(depth))?;
                frame.stack.insert(at, value);
            }
            Instruction::GetLocal { slot } => {
                let value = frame.get_local(slot)?;
                frame.push(value);
            }
            Instruction::SetLocal { slot } => {
                let value = frame.peek()?.clone();
                frame.set_local(slot, value)?;
            }
            Instruction::GetName { name } => {
                let name = frame.name(name)?;
                match frame.scope.lookup(&name) {
                    Some(value) => frame.push(value),
                    None => return Err(throw(ErrorKind::ReferenceError, format!("{name} is not defined"))),
                }
            }
            Instruction::SetName { name } => {
                let name = frame.name(name)?;
                let value = frame.peek()?.clone();
                frame.scope.assign(&name, value);
            }
            Instruction::TypeOfName { name } => {
                let name = frame.name(name)?;
                let kind = frame.scope.lookup(&name).map_or("undefined", |v| v.type_of());
                frame.push(Value::from(kind));
            }
            Instruction::GetArguments => {
                let Some(activation) = frame.activation() else {
                    return Err(InternalError::MissingActivation {
                        unit: frame.unit.display_name().to_string(),
                    }
                    .into());
                };
                // A script assignment to `arguments` lands in the activation's
                // own properties and replaces the implicit object.
                let value = activation.get_property("arguments").unwrap_or_default();
                frame.push(value);
            }
            Instruction::GetProp { name } => {
                let name = frame.name(name)?;
                let target = frame.pop()?;
                let value = self.get_member(&target, &name)?;
                frame.push(value);
            }
            Instruction::SetProp { name } => {
                let name = frame.name(name)?;
                let value = frame.pop()?;
                let target = frame.pop()?;
                self.set_member(&target, &name, value.clone())?;
                frame.push(value);
            }
            Instruction::DeleteProp { name } => {
                let name = frame.name(name)?;
                let target = frame.pop()?;
                let deleted = self.delete_member(&target, &name)?;
                frame.push(Value::Bool(deleted));
            }
            Instruction::GetElem => {
                let key = frame.pop()?;
                let target = frame.pop()?;
                let value = self.get_member(&target, &key.to_js_string())?;
                frame.push(value);
            }
            Instruction::SetElem => {
                let value = frame.pop()?;
                let key = frame.pop()?;
                let target = frame.pop()?;
                self.set_member(&target, &key.to_js_string(), value.clone())?;
                frame.push(value);
            }
            Instruction::DeleteElem => {
                let key = frame.pop()?;
                let target = frame.pop()?;
                let deleted = self.delete_member(&target, &key.to_js_string())?;
                frame.push(Value::Bool(deleted));
            }
            Instruction::NewObject => frame.push(Value::Object(Object::new_ordinary())),
            Instruction::InitProp { name } => {
                let name = frame.name(name)?;
                let value = frame.pop()?;
                if let Value::Object(obj) = frame.peek()? {
                    obj.put_property(&name, value);
                }
            }
            Instruction::Closure { func } => {
                let index = usize::from(func);
                let unit = frame
                    .unit
                    .functions
                    .get(index)
                    .cloned()
                    .ok_or_else(|| frame.bad_index("function", index))?;
                frame.push(Value::Object(Object::closure(unit, frame.scope.clone())));
            }
            Instruction::Call { argc } => {
                let at = frame.below(usize::from(argc) + 2)?;
                let args = frame.stack.split_off(at + 2);
                let this = frame.pop()?;
                return match frame.pop()? {
                    Value::Object(callee) if callee.is_callable() => Ok(Flow::Call { callee, this, args }),
                    other => Err(throw(ErrorKind::TypeError, format!("{other:?} is not a function"))),
                };
            }
            Instruction::Return => return Ok(Flow::Return(frame.pop()?)),
            Instruction::Throw => return Err(Fault::Throw(frame.pop()?)),
            Instruction::Suspend => return Err(Fault::Suspend(frame.pop()?)),
            Instruction::Add => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                frame.push(add(&a, &b));
            }
            Instruction::Sub => arithmetic(frame, |a, b| a - b)?,
            Instruction::Mul => arithmetic(frame, |a, b| a * b)?,
            Instruction::Div => arithmetic(frame, |a, b| a / b)?,
            Instruction::Mod => arithmetic(frame, |a, b| a % b)?,
            Instruction::Neg => {
                let n = frame.pop()?.to_number();
                frame.push(Value::Number(-n));
            }
            Instruction::Plus => {
                let n = frame.pop()?.to_number();
                frame.push(Value::Number(n));
            }
            Instruction::Not => {
                let b = frame.pop()?.to_boolean();
                frame.push(Value::Bool(!b));
            }
            Instruction::TypeOf => {
                let kind = frame.pop()?.type_of();
                frame.push(Value::from(kind));
            }
            Instruction::Eq => compare(frame, |a, b| a.loose_equals(b))?,
            Instruction::Ne => compare(frame, |a, b| !a.loose_equals(b))?,
            Instruction::StrictEq => compare(frame, |a, b| a.strict_equals(b))?,
            Instruction::StrictNe => compare(frame, |a, b| !a.strict_equals(b))?,
            Instruction::Lt => compare(frame, |a, b| a.compare(b).is_some_and(|o| o.is_lt()))?,
            Instruction::Le => compare(frame, |a, b| a.compare(b).is_some_and(|o| o.is_le()))?,
            Instruction::Gt => compare(frame, |a, b| a.compare(b).is_some_and(|o| o.is_gt()))?,
            Instruction::Ge => compare(frame, |a, b| a.compare(b).is_some_and(|o| o.is_ge()))?,
            Instruction::Jump { offset } => frame.pc = frame.jump_target(offset)?,
            Instruction::JumpIfTrue { offset } => {
                if frame.pop()?.to_boolean() {
                    frame.pc = frame.jump_target(offset)?;
                }
            }
            Instruction::JumpIfFalse { offset } => {
                if !frame.pop()?.to_boolean() {
                    frame.pc = frame.jump_target(offset)?;
                }
            }
        }
        Ok(Flow::Next)
    }
}

fn arithmetic(frame: &mut Frame, op: impl Fn(f64, f64) -> f64) -> Result<(), InternalError> {
    let b = frame.pop()?.to_number();
    let a = frame.pop()?.to_number();
    frame.push(Value::Number(op(a, b)));
    Ok(())
}

fn compare(frame: &mut Frame, op: impl Fn(&Value, &Value) -> bool) -> Result<(), InternalError> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    frame.push(Value::Bool(op(&a, &b)));
    Ok(())
}
