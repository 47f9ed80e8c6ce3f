//! Heap objects: an insertion-ordered property bag plus a kind tag.
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use bytecode::CompiledUnit;
use indexmap::IndexMap;

use crate::arguments::ArgumentsView;
use crate::context::ExecutionContext;
use crate::scope::{PropertyAccess, Scope};
use crate::value::Value;

pub type ObjectRef = Rc<Object>;
pub type PropertyMap = IndexMap<Rc<str>, Value>;

/// Host function callable from scripts. `Err` carries a thrown value.
pub type NativeFn = Rc<dyn Fn(&mut ExecutionContext, &Value, &[Value]) -> Result<Value, Value>>;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: Rc<str>,
    pub arity: usize,
    pub func: NativeFn,
}

pub enum Callable {
    /// A compiled function closed over the scope it was created in.
    Closure { unit: Arc<CompiledUnit>, scope: Scope },
    Native(NativeFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 4] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::ReferenceError => "ReferenceError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub enum ObjectKind {
    Ordinary,
    Function(Callable),
    Arguments(ArgumentsView),
    Error(ErrorKind),
}

pub struct Object {
    kind: ObjectKind,
    properties: RefCell<PropertyMap>,
}

impl Object {
    fn with_kind(kind: ObjectKind, properties: PropertyMap) -> ObjectRef {
        Rc::new(Self {
            kind,
            properties: RefCell::new(properties),
        })
    }

    pub fn new_ordinary() -> ObjectRef {
        Self::with_kind(ObjectKind::Ordinary, PropertyMap::new())
    }

    pub fn closure(unit: Arc<CompiledUnit>, scope: Scope) -> ObjectRef {
        Self::with_kind(
            ObjectKind::Function(Callable::Closure { unit, scope }),
            PropertyMap::new(),
        )
    }

    pub fn native(
        name: &str,
        arity: usize,
        func: impl Fn(&mut ExecutionContext, &Value, &[Value]) -> Result<Value, Value> + 'static,
    ) -> ObjectRef {
        Self::with_kind(
            ObjectKind::Function(Callable::Native(NativeFunction {
                name: Rc::from(name),
                arity,
                func: Rc::new(func),
            })),
            PropertyMap::new(),
        )
    }

    pub fn error(kind: ErrorKind, message: &str) -> ObjectRef {
        let mut properties = PropertyMap::new();
        properties.insert(Rc::from("name"), Value::from(kind.name()));
        properties.insert(Rc::from("message"), Value::from(message));
        Self::with_kind(ObjectKind::Error(kind), properties)
    }

    pub(crate) fn arguments(view: ArgumentsView, callee: Value) -> ObjectRef {
        let mut properties = PropertyMap::new();
        properties.insert(Rc::from("length"), Value::Number(view.len() as f64));
        properties.insert(Rc::from("callee"), callee);
        Self::with_kind(ObjectKind::Arguments(view), properties)
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    pub fn as_arguments(&self) -> Option<&ArgumentsView> {
        match &self.kind {
            ObjectKind::Arguments(view) => Some(view),
            _ => None,
        }
    }

    /// Own properties in insertion order. Synthetic properties of
    /// functions and arguments objects are not included.
    pub fn properties(&self) -> Ref<'_, PropertyMap> {
        self.properties.borrow()
    }

    pub fn function_name(&self) -> String {
        match &self.kind {
            ObjectKind::Function(Callable::Closure { unit, .. }) => unit.display_name().to_string(),
            ObjectKind::Function(Callable::Native(native)) => native.name.to_string(),
            _ => String::new(),
        }
    }

    fn function_arity(&self) -> usize {
        match &self.kind {
            ObjectKind::Function(Callable::Closure { unit, .. }) => unit.param_count,
            ObjectKind::Function(Callable::Native(native)) => native.arity,
            _ => 0,
        }
    }

    /// What `ToString` yields for this object.
    pub fn default_string(&self) -> String {
        match &self.kind {
            ObjectKind::Ordinary => "[object Object]".to_string(),
            ObjectKind::Arguments(_) => "[object Arguments]".to_string(),
            ObjectKind::Function(Callable::Closure { unit, .. }) => {
                format!("function {}() {{ [bytecode] }}", unit.name)
            }
            ObjectKind::Function(Callable::Native(native)) => {
                format!("function {}() {{ [native code] }}", native.name)
            }
            ObjectKind::Error(kind) => {
                let props = self.properties.borrow();
                let name = props
                    .get("name")
                    .map(|v| v.to_js_string().to_string())
                    .unwrap_or_else(|| kind.name().to_string());
                let message = props
                    .get("message")
                    .map(|v| v.to_js_string().to_string())
                    .unwrap_or_default();
                if message.is_empty() {
                    name
                } else {
                    format!("{name}: {message}")
                }
            }
        }
    }
}

impl PropertyAccess for Object {
    fn get_property(&self, name: &str) -> Option<Value> {
        if let ObjectKind::Arguments(view) = &self.kind {
            if let Some(value) = view.get(name) {
                return Some(value);
            }
        }
        if let Some(value) = self.properties.borrow().get(name) {
            return Some(value.clone());
        }
        match (&self.kind, name) {
            (ObjectKind::Function(_), "name") => Some(Value::string(self.function_name())),
            (ObjectKind::Function(_), "length") => Some(Value::Number(self.function_arity() as f64)),
            _ => None,
        }
    }

    fn put_property(&self, name: &str, value: Value) {
        if let ObjectKind::Arguments(view) = &self.kind {
            if view.put(name, &value) {
                return;
            }
        }
        let mut props = self.properties.borrow_mut();
        match props.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                props.insert(Rc::from(name), value);
            }
        }
    }

    fn delete_property(&self, name: &str) -> bool {
        if let ObjectKind::Arguments(view) = &self.kind {
            if view.delete(name) {
                return true;
            }
        }
        self.properties.borrow_mut().shift_remove(name);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_keep_insertion_order() {
        let obj = Object::new_ordinary();
        obj.put_property("b", Value::Number(1.0));
        obj.put_property("a", Value::Number(2.0));
        obj.put_property("b", Value::Number(3.0));
        let keys: Vec<_> = obj.properties().keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(obj.get_property("b"), Some(Value::Number(3.0)));
        assert!(obj.delete_property("b"));
        assert_eq!(obj.get_property("b"), None);
    }

    #[test]
    fn errors_render_name_and_message() {
        let err = Object::error(ErrorKind::RangeError, "bad radix");
        assert_eq!(err.default_string(), "RangeError: bad radix");
        assert_eq!(Object::error(ErrorKind::Error, "").default_string(), "Error");
    }

    #[test]
    fn natives_expose_name_and_length() {
        let f = Object::native("twice", 1, |_, _, args| {
            Ok(Value::Number(args.first().map_or(0.0, Value::to_number) * 2.0))
        });
        assert!(f.is_callable());
        assert_eq!(f.get_property("name"), Some(Value::from("twice")));
        assert_eq!(f.get_property("length"), Some(Value::Number(1.0)));
        assert_eq!(Value::Object(f).type_of(), "function");
    }
}
