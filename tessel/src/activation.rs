//! Per-call scope objects.
//!
//! An [`ActivationRecord`] holds the parameter and local slots of one
//! function invocation, the untouched argument vector the caller supplied,
//! and any properties added to the scope at run time. Its `caller` link is
//! weak: the chain only ever describes frames that are still live.
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use bytecode::CompiledUnit;

use crate::arguments::ArgumentsView;
use crate::object::{Object, ObjectRef, PropertyMap};
use crate::scope::{PropertyAccess, Scope};
use crate::value::Value;

pub type ActivationRef = Rc<ActivationRecord>;

/// The arguments object of an activation, once somebody asked for it.
enum ArgumentsCache {
    Empty,
    /// Held strongly while the owning frame runs.
    Live(ObjectRef),
    /// The frame has exited; identity is kept only while others hold it.
    Detached(Weak<Object>),
}

pub struct ActivationRecord {
    unit: Arc<CompiledUnit>,
    callee: Option<ObjectRef>,
    this: Value,
    caller: Option<Weak<ActivationRecord>>,
    parent: Scope,
    /// Exactly what the caller passed. Length never changes.
    args: RefCell<Vec<Value>>,
    /// Parameters first, then locals, in `VariableTable` order.
    slots: RefCell<Vec<Value>>,
    properties: RefCell<PropertyMap>,
    arguments: RefCell<ArgumentsCache>,
}

impl ActivationRecord {
    pub fn new(
        unit: Arc<CompiledUnit>,
        callee: Option<ObjectRef>,
        this: Value,
        caller: Option<&ActivationRef>,
        parent: Scope,
        args: &[Value],
    ) -> ActivationRef {
        let mut slots = vec![Value::Undefined; unit.slot_count()];
        for (slot, arg) in slots.iter_mut().zip(args).take(unit.param_count) {
            *slot = arg.clone();
        }
        log::debug!(
            "activation for `{}`: {} args, {} slots, caller {}",
            unit.display_name(),
            args.len(),
            slots.len(),
            caller.map_or("<none>", |c| c.unit.display_name()),
        );
        Rc::new(Self {
            unit,
            callee,
            this,
            caller: caller.map(Rc::downgrade),
            parent,
            args: RefCell::new(args.to_vec()),
            slots: RefCell::new(slots),
            properties: RefCell::new(PropertyMap::new()),
            arguments: RefCell::new(ArgumentsCache::Empty),
        })
    }

    pub fn unit(&self) -> &Arc<CompiledUnit> {
        &self.unit
    }

    pub fn name(&self) -> &str {
        self.unit.display_name()
    }

    /// The function object being run, when called through one.
    pub fn callee(&self) -> Option<&ObjectRef> {
        self.callee.as_ref()
    }

    pub fn this(&self) -> &Value {
        &self.this
    }

    /// The activation that was current when this one was entered, if it is
    /// still alive.
    pub fn caller(&self) -> Option<ActivationRef> {
        self.caller.as_ref().and_then(Weak::upgrade)
    }

    pub fn parent(&self) -> &Scope {
        &self.parent
    }

    pub fn param_count(&self) -> usize {
        self.unit.param_count
    }

    /// Number of arguments actually supplied.
    pub fn arg_count(&self) -> usize {
        self.args.borrow().len()
    }

    pub fn slot(&self, index: usize) -> Option<Value> {
        self.slots.borrow().get(index).cloned()
    }

    pub fn set_slot(&self, index: usize, value: Value) -> bool {
        match self.slots.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn slot_index(&self, name: &str) -> Option<usize> {
        // The first occurrence of a duplicated parameter owns the name.
        self.unit.slot_names.iter().position(|n| n == name)
    }

    /// Indexed argument access. Indices shared with declared parameters
    /// read the parameter slot; the rest read the argument vector.
    pub fn argument(&self, index: usize) -> Option<Value> {
        let args = self.args.borrow();
        if index >= args.len() {
            return None;
        }
        if index < self.param_count() {
            self.slot(index)
        } else {
            Some(args[index].clone())
        }
    }

    pub fn set_argument(&self, index: usize, value: Value) -> bool {
        let mut args = self.args.borrow_mut();
        if index >= args.len() {
            return false;
        }
        if index < self.param_count() {
            self.set_slot(index, value)
        } else {
            args[index] = value;
            true
        }
    }

    /// The arguments object, created on first use.
    pub fn arguments_object(self: &Rc<Self>) -> ObjectRef {
        let mut cache = self.arguments.borrow_mut();
        match &*cache {
            ArgumentsCache::Live(obj) => return obj.clone(),
            ArgumentsCache::Detached(weak) => {
                if let Some(obj) = weak.upgrade() {
                    return obj;
                }
            }
            ArgumentsCache::Empty => {}
        }
        let callee = self.callee.clone().map_or(Value::Undefined, Value::Object);
        let obj = Object::arguments(ArgumentsView::new(self.clone()), callee);
        log::debug!("materialised arguments of `{}`", self.name());
        *cache = ArgumentsCache::Live(obj.clone());
        obj
    }

    /// Called when the owning frame exits. An arguments object nobody else
    /// holds is dropped; an escaped one stays reachable only through its
    /// holders, which breaks the activation/arguments cycle.
    pub(crate) fn release_arguments(&self) {
        let mut cache = self.arguments.borrow_mut();
        if let ArgumentsCache::Live(obj) = &*cache {
            *cache = if Rc::strong_count(obj) == 1 {
                ArgumentsCache::Empty
            } else {
                ArgumentsCache::Detached(Rc::downgrade(obj))
            };
        }
    }
}

impl PropertyAccess for ActivationRef {
    /// Parameters and locals shadow added properties, which shadow the
    /// implicit `arguments` binding.
    fn get_property(&self, name: &str) -> Option<Value> {
        if let Some(index) = self.slot_index(name) {
            return self.slot(index);
        }
        if let Some(value) = self.properties.borrow().get(name) {
            return Some(value.clone());
        }
        (name == "arguments").then(|| Value::Object(self.arguments_object()))
    }

    fn has_property(&self, name: &str) -> bool {
        name == "arguments"
            || self.slot_index(name).is_some()
            || self.properties.borrow().contains_key(name)
    }

    fn put_property(&self, name: &str, value: Value) {
        if let Some(index) = self.slot_index(name) {
            self.set_slot(index, value);
            return;
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
        if self.slot_index(name).is_some() {
            return false;
        }
        self.properties.borrow_mut().shift_remove(name);
        true
    }
}
