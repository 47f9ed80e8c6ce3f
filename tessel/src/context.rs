//! The host-facing execution context.
//!
//! An [`ExecutionContext`] owns the global object and the state a running
//! script needs from its host: the call-depth budget, the debug hook and
//! the innermost activation of runs that are suspended inside host
//! functions. It is passed explicitly to every host function, so there is
//! no thread-bound "current activation".
//!
//! ```
//! use tessel::{ContextCreateInfo, ExecutionContext, Value};
//!
//! let mut ctx = ExecutionContext::new(ContextCreateInfo::default());
//! let value = ctx.evaluate("function f(a, b) { return a * b }\nf(6, 7)").unwrap();
//! assert_eq!(value, Value::Number(42.0));
//! ```
use std::sync::Arc;

use bytecode::CompiledUnit;

use crate::activation::ActivationRef;
use crate::builtins;
use crate::compiler;
use crate::config::{CompileOptions, ContextCreateInfo};
use crate::continuation::ResumeToken;
use crate::error::{CompileError, Unwind};
use crate::interpreter::{Frame, script_error};
use crate::object::{Callable, Object, ObjectKind, ObjectRef};
use crate::scope::{PropertyAccess, Scope};
use crate::value::Value;

/// Passed to the debug hook when an armed line marker executes.
#[derive(Debug, Clone)]
pub struct BreakEvent {
    pub unit: Arc<CompiledUnit>,
    pub line: u32,
    /// Interpreter frames live at the break, host-nested runs included.
    pub frame_count: usize,
}

impl BreakEvent {
    pub fn unit_name(&self) -> &str {
        self.unit.display_name()
    }
}

type DebugHook = Box<dyn FnMut(&BreakEvent)>;

pub struct ExecutionContext {
    pub(crate) info: ContextCreateInfo,
    pub(crate) global: ObjectRef,
    /// Receiver of property lookups on number values.
    pub(crate) number_prototype: ObjectRef,
    pub(crate) debug_hook: Option<DebugHook>,
    /// Innermost activation of the runs waiting on a host function.
    pub(crate) floor: Option<ActivationRef>,
    /// Frames held by those runs, counted against `max_call_depth`.
    pub(crate) outer_frames: usize,
    /// An unwind a host function could not throw as a value. Re-raised
    /// when the host function returns.
    pub(crate) pending: Option<Unwind>,
}

impl ExecutionContext {
    pub fn new(info: ContextCreateInfo) -> Self {
        log::debug!(
            "creating context: max call depth {}, language version {}",
            info.max_call_depth,
            info.compile.language_version
        );
        let mut ctx = Self {
            info,
            global: Object::new_ordinary(),
            number_prototype: Object::new_ordinary(),
            debug_hook: None,
            floor: None,
            outer_frames: 0,
            pending: None,
        };
        builtins::install(&mut ctx);
        ctx
    }

    pub fn info(&self) -> &ContextCreateInfo {
        &self.info
    }

    pub fn global(&self) -> &ObjectRef {
        &self.global
    }

    pub fn global_scope(&self) -> Scope {
        Scope::Global(self.global.clone())
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.global.put_property(name, value);
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.global.get_property(name)
    }

    /// Install a host function as a global.
    pub fn define_native(
        &mut self,
        name: &str,
        arity: usize,
        func: impl Fn(&mut ExecutionContext, &Value, &[Value]) -> Result<Value, Value> + 'static,
    ) {
        self.define_global(name, Value::Object(Object::native(name, arity, func)));
    }

    /// Compile with the context's options under the given source name.
    pub fn compile(&self, source: &str, source_name: &str) -> Result<Arc<CompiledUnit>, CompileError> {
        let options = CompileOptions {
            source_name: source_name.to_string(),
            ..self.info.compile.clone()
        };
        self.compile_with(source, &options)
    }

    pub fn compile_with(&self, source: &str, options: &CompileOptions) -> Result<Arc<CompiledUnit>, CompileError> {
        compiler::compile(source, options)
    }

    /// Compile and run a script against the global scope.
    pub fn evaluate(&mut self, source: &str) -> crate::Result<Value> {
        let unit = self.compile_with(source, &self.info.compile.clone())?;
        Ok(self.execute(&unit)?)
    }

    /// Run a script unit against the global scope.
    pub fn execute(&mut self, unit: &Arc<CompiledUnit>) -> Result<Value, Unwind> {
        let this = Value::Object(self.global.clone());
        self.invoke(unit, this, self.global_scope(), &[])
    }

    /// Run `unit` with an explicit receiver, scope and arguments.
    ///
    /// Script units bind their declarations on `scope` and ignore `args`.
    /// Function units get a fresh activation (when they need one) whose
    /// caller is the context's current activation.
    pub fn invoke(
        &mut self,
        unit: &Arc<CompiledUnit>,
        this: Value,
        scope: Scope,
        args: &[Value],
    ) -> Result<Value, Unwind> {
        if self.outer_frames >= self.info.max_call_depth {
            return Err(Unwind::StackOverflow {
                limit: self.info.max_call_depth,
            });
        }
        let frame = if unit.is_script() {
            for name in &unit.declared_names {
                scope.declare(name);
            }
            Frame::script(unit.clone(), scope, this, self.info.stack_size)
        } else {
            // A callee object so `arguments.callee` refers to the function.
            let callee = Object::closure(unit.clone(), scope.clone());
            self.enter(&[], Some(callee), unit.clone(), scope, this, args.to_vec())
        };
        self.run(vec![frame])
    }

    /// Call a function value.
    pub fn call(&mut self, func: &Value, this: Value, args: &[Value]) -> Result<Value, Unwind> {
        let Some(callee) = func.as_object().filter(|obj| obj.is_callable()) else {
            return Err(Unwind::Host(format!("{func:?} is not a function")));
        };
        if self.outer_frames >= self.info.max_call_depth {
            return Err(Unwind::StackOverflow {
                limit: self.info.max_call_depth,
            });
        }
        match callee.kind() {
            ObjectKind::Function(Callable::Closure { unit, scope }) => {
                let frame = self.enter(&[], Some(callee.clone()), unit.clone(), scope.clone(), this, args.to_vec());
                self.run(vec![frame])
            }
            ObjectKind::Function(Callable::Native(native)) => {
                let func = native.func.clone();
                func(self, &this, args).map_err(|value| Unwind::Thrown(script_error(value, None)))
            }
            _ => Err(Unwind::Host(format!("{func:?} is not a function"))),
        }
    }

    /// Continue a suspended run. `value` becomes the result of the `yield`
    /// that suspended it. The token stays valid and can be resumed again.
    pub fn resume(&mut self, token: &ResumeToken, value: Value) -> Result<Value, Unwind> {
        self.resume_frames(token.frames(), value)
    }

    /// Convert the failure of a nested [`call`](Self::call) made by a host
    /// function into a value it can return as `Err`. Unwinds that scripts
    /// cannot catch are kept and re-raised once the host function returns.
    pub fn into_thrown(&mut self, unwind: Unwind) -> Value {
        match unwind {
            Unwind::Thrown(err) => err.value,
            Unwind::Suspended(_) => {
                self.pending = Some(Unwind::Host("cannot yield across a host function".to_string()));
                Value::Undefined
            }
            other => {
                self.pending = Some(other);
                Value::Undefined
            }
        }
    }

    /// The activation of the innermost function call that is waiting on the
    /// host, if any.
    pub fn current_activation(&self) -> Option<ActivationRef> {
        self.floor.clone()
    }

    /// Activation `depth` links up the caller chain from the current one.
    pub fn activation_at(&self, depth: usize) -> Option<ActivationRef> {
        let mut activation = self.current_activation()?;
        for _ in 0..depth {
            activation = activation.caller()?;
        }
        Some(activation)
    }

    /// Length of the caller chain starting at the current activation.
    pub fn frame_count(&self) -> usize {
        std::iter::successors(self.current_activation(), |a| a.caller()).count()
    }

    pub fn set_debug_hook(&mut self, hook: impl FnMut(&BreakEvent) + 'static) {
        self.debug_hook = Some(Box::new(hook));
    }

    pub fn clear_debug_hook(&mut self) {
        self.debug_hook = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn host_functions_see_the_caller_chain() {
        let info = ContextCreateInfo {
            compile: CompileOptions {
                force_activation: true,
                ..CompileOptions::default()
            },
            ..ContextCreateInfo::default()
        };
        let mut ctx = ExecutionContext::new(info);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ctx.define_native("probe", 0, move |ctx, _, _| {
            let names = (0..ctx.frame_count())
                .filter_map(|depth| ctx.activation_at(depth))
                .map(|a| a.name().to_string())
                .collect::<Vec<_>>();
            sink.borrow_mut().extend(names);
            Ok(Value::Undefined)
        });
        ctx.evaluate("function a() { b() }\nfunction b() { c() }\nfunction c() { probe() }\na()")
            .unwrap();
        assert_eq!(*seen.borrow(), ["c", "b", "a"]);
        assert_eq!(ctx.frame_count(), 0);
    }

    #[test]
    fn host_can_call_script_functions() {
        let mut ctx = ExecutionContext::new(ContextCreateInfo::default());
        ctx.evaluate("function add(a, b) { return a + b }").unwrap();
        let add = ctx.get_global("add").unwrap();
        let sum = ctx
            .call(&add, Value::Undefined, &[Value::Number(2.0), Value::Number(3.0)])
            .unwrap();
        assert_eq!(sum, Value::Number(5.0));
        assert!(matches!(
            ctx.call(&Value::Number(1.0), Value::Undefined, &[]),
            Err(Unwind::Host(_))
        ));
    }

    #[test]
    fn host_functions_can_call_back_into_scripts() {
        let mut ctx = ExecutionContext::new(ContextCreateInfo::default());
        ctx.define_native("twice", 1, |ctx, _, args| {
            let f = args.first().cloned().unwrap_or_default();
            let once = ctx.call(&f, Value::Undefined, &[]).map_err(|e| ctx.into_thrown(e))?;
            let again = ctx.call(&f, Value::Undefined, &[]).map_err(|e| ctx.into_thrown(e))?;
            Ok(Value::Number(once.to_number() + again.to_number()))
        });
        let value = ctx
            .evaluate("var n = 0\ntwice(function () { n = n + 1; return n })")
            .unwrap();
        assert_eq!(value, Value::Number(3.0));

        let value = ctx
            .evaluate("var r\ntry { twice(function () { throw 'inner' }) } catch (e) { r = e }\nr")
            .unwrap();
        assert_eq!(value, Value::from("inner"));
    }

    #[test]
    fn invoke_binds_script_declarations_on_the_given_scope() {
        let mut ctx = ExecutionContext::new(ContextCreateInfo::default());
        let unit = ctx.compile("var local = 5\nlocal * 2", "scoped.js").unwrap();
        let scope_object = Object::new_ordinary();
        let value = ctx
            .invoke(&unit, Value::Undefined, Scope::Global(scope_object.clone()), &[])
            .unwrap();
        assert_eq!(value, Value::Number(10.0));
        assert_eq!(scope_object.get_property("local"), Some(Value::Number(5.0)));
        assert_eq!(ctx.get_global("local"), None);
    }

    #[test]
    fn invoked_functions_see_their_callee() {
        let mut ctx = ExecutionContext::new(ContextCreateInfo::default());
        let unit = ctx
            .compile("function f(n) { return typeof arguments.callee }", "callee.js")
            .unwrap();
        let f = unit.functions[0].clone();
        let scope = ctx.global_scope();
        let value = ctx
            .invoke(&f, Value::Undefined, scope, &[Value::Number(1.0)])
            .unwrap();
        assert_eq!(value, Value::from("function"));
    }
}
