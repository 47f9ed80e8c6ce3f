//! The `arguments` object.
//!
//! An [`ArgumentsView`] owns no storage. Index reads and writes below the
//! declared parameter count go to the parameter slots of the activation,
//! so `arguments[0] = 9` is observed through the first parameter and the
//! other way round. Higher indices address the raw argument vector. Names
//! that are not in-range indices (`length`, `callee`, added properties)
//! live in the object's ordinary property bag.
use std::cell::Cell;

use crate::activation::ActivationRef;
use crate::value::Value;

pub struct ArgumentsView {
    activation: ActivationRef,
    /// Whether `caller` still resolves to the calling function's arguments.
    /// Cleared for good by any write or delete of `caller`.
    synthetic_caller: Cell<bool>,
}

/// Canonical array index: digits only, no leading zeros, below `u32::MAX`.
pub(crate) fn array_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse::<u32>()
        .ok()
        .filter(|&i| i != u32::MAX)
        .map(|i| i as usize)
}

impl ArgumentsView {
    pub fn new(activation: ActivationRef) -> Self {
        let synthetic_caller = activation.unit().language_version.has_arguments_caller();
        Self {
            activation,
            synthetic_caller: Cell::new(synthetic_caller),
        }
    }

    pub fn activation(&self) -> &ActivationRef {
        &self.activation
    }

    /// Number of arguments the caller supplied.
    pub fn len(&self) -> usize {
        self.activation.arg_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_index(&self, index: usize) -> Option<Value> {
        self.activation.argument(index)
    }

    /// Returns `false` when `index` is past the supplied arguments.
    pub fn set_index(&self, index: usize, value: Value) -> bool {
        self.activation.set_argument(index, value)
    }

    /// Clears the value but keeps the index bound to its slot.
    pub fn delete_index(&self, index: usize) -> bool {
        self.activation.set_argument(index, Value::Undefined)
    }

    pub fn has_synthetic_caller(&self) -> bool {
        self.synthetic_caller.get()
    }

    fn disable_synthetic_caller(&self) {
        if self.synthetic_caller.replace(false) {
            log::debug!(
                "arguments.caller of `{}` overridden; synthetic value disabled",
                self.activation.name()
            );
        }
    }

    /// The calling function's arguments object, or `null` at the outermost
    /// call.
    fn caller_arguments(&self) -> Value {
        self.activation
            .caller()
            .map_or(Value::Null, |caller| Value::Object(caller.arguments_object()))
    }

    /// Reads handled by the view itself; `None` defers to the property bag.
    pub(crate) fn get(&self, name: &str) -> Option<Value> {
        if let Some(index) = array_index(name) {
            return self.get_index(index);
        }
        (name == "caller" && self.has_synthetic_caller()).then(|| self.caller_arguments())
    }

    /// Writes handled by the view itself. Returns `false` when the value
    /// belongs in the property bag.
    pub(crate) fn put(&self, name: &str, value: &Value) -> bool {
        if let Some(index) = array_index(name) {
            return self.set_index(index, value.clone());
        }
        if name == "caller" {
            self.disable_synthetic_caller();
        }
        false
    }

    pub(crate) fn delete(&self, name: &str) -> bool {
        if let Some(index) = array_index(name) {
            return self.delete_index(index);
        }
        if name == "caller" {
            self.disable_synthetic_caller();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationRecord;
    use crate::activation::tests::{unit, versioned_unit};
    use crate::object::Object;
    use crate::scope::{PropertyAccess, Scope};
    use bytecode::LanguageVersion;

    fn call(params: &[&str], args: &[f64]) -> ActivationRef {
        let args: Vec<Value> = args.iter().map(|&n| Value::Number(n)).collect();
        ActivationRecord::new(
            unit("f", params, &[]),
            None,
            Value::Undefined,
            None,
            Scope::Global(Object::new_ordinary()),
            &args,
        )
    }

    #[test]
    fn indices_alias_parameters() {
        let act = call(&["a", "b"], &[1.0, 2.0, 3.0]);
        let args = act.arguments_object();

        args.put_property("0", Value::Number(9.0));
        assert_eq!(act.get_property("a"), Some(Value::Number(9.0)));

        act.put_property("b", Value::Number(7.0));
        assert_eq!(args.get_property("1"), Some(Value::Number(7.0)));

        // Past the declared parameters nothing is aliased.
        args.put_property("2", Value::Number(5.0));
        assert_eq!(args.get_property("2"), Some(Value::Number(5.0)));
        assert_eq!(act.get_property("a"), Some(Value::Number(9.0)));
        assert_eq!(act.get_property("b"), Some(Value::Number(7.0)));
        assert_eq!(args.get_property("length"), Some(Value::Number(3.0)));
    }

    #[test]
    fn missing_arguments_are_not_aliased() {
        let act = call(&["a", "b"], &[1.0]);
        let args = act.arguments_object();
        args.put_property("1", Value::Number(4.0));
        assert_eq!(act.get_property("b"), Some(Value::Undefined));
        assert_eq!(args.get_property("1"), Some(Value::Number(4.0)));
    }

    #[test]
    fn delete_clears_but_keeps_alias() {
        let act = call(&["a"], &[1.0]);
        let args = act.arguments_object();
        assert!(args.delete_property("0"));
        assert_eq!(act.get_property("a"), Some(Value::Undefined));
        args.put_property("0", Value::Number(3.0));
        assert_eq!(act.get_property("a"), Some(Value::Number(3.0)));
    }

    #[test]
    fn array_index_is_canonical() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("1.5"), None);
        assert_eq!(array_index("4294967295"), None);
    }

    #[test]
    fn synthetic_caller_is_gated_and_one_way() {
        let global = Scope::Global(Object::new_ordinary());
        let outer = ActivationRecord::new(
            versioned_unit("outer", &["x"], &[], LanguageVersion::V1_2),
            None,
            Value::Undefined,
            None,
            global.clone(),
            &[Value::Number(1.0)],
        );
        let inner = ActivationRecord::new(
            versioned_unit("inner", &[], &[], LanguageVersion::V1_2),
            None,
            Value::Undefined,
            Some(&outer),
            global.clone(),
            &[],
        );
        let args = inner.arguments_object();
        let caller = args.get_property("caller").unwrap();
        let caller = caller.as_object().unwrap();
        assert!(std::rc::Rc::ptr_eq(caller, &outer.arguments_object()));
        assert_eq!(caller.get_property("0"), Some(Value::Number(1.0)));

        args.put_property("caller", Value::Number(5.0));
        assert_eq!(args.get_property("caller"), Some(Value::Number(5.0)));
        args.delete_property("caller");
        assert_eq!(args.get_property("caller"), None);
        assert!(!args.as_arguments().unwrap().has_synthetic_caller());

        let modern = ActivationRecord::new(
            unit("modern", &[], &[]),
            None,
            Value::Undefined,
            Some(&outer),
            global,
            &[],
        );
        assert_eq!(modern.arguments_object().get_property("caller"), None);
    }
}
