//! Name resolution along the lexical scope chain.
use crate::activation::ActivationRef;
use crate::object::ObjectRef;
use crate::value::Value;

/// Property storage shared by objects, activation records and scopes.
pub trait PropertyAccess {
    fn get_property(&self, name: &str) -> Option<Value>;

    fn has_property(&self, name: &str) -> bool {
        self.get_property(name).is_some()
    }

    fn put_property(&self, name: &str, value: Value);

    /// Remove `name`. Returns `false` only for non-deletable bindings.
    fn delete_property(&self, name: &str) -> bool;
}

/// One link of the scope chain. The chain always ends in a global object.
#[derive(Clone)]
pub enum Scope {
    Global(ObjectRef),
    Activation(ActivationRef),
}

impl Scope {
    pub fn parent(&self) -> Option<Scope> {
        match self {
            Self::Global(_) => None,
            Self::Activation(activation) => Some(activation.parent().clone()),
        }
    }

    /// The global object terminating this chain.
    pub fn global(&self) -> ObjectRef {
        let mut scope = self.clone();
        loop {
            match scope {
                Self::Global(global) => return global,
                Self::Activation(activation) => scope = activation.parent().clone(),
            }
        }
    }

    fn find<T>(&self, mut f: impl FnMut(&Scope) -> Option<T>) -> Option<T> {
        let mut scope = self.clone();
        loop {
            if let Some(found) = f(&scope) {
                return Some(found);
            }
            scope = scope.parent()?;
        }
    }

    /// Value bound to `name` in the nearest scope defining it.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.find(|scope| scope.get_property(name))
    }

    /// Assign to the nearest binding of `name`, creating a global one when
    /// no scope defines it.
    pub fn assign(&self, name: &str, value: Value) {
        let holder = self.find(|scope| scope.has_property(name).then(|| scope.clone()));
        match holder {
            Some(scope) => scope.put_property(name, value),
            None => self.global().put_property(name, value),
        }
    }

    /// Bind `name` to `undefined` here unless it is already bound.
    pub fn declare(&self, name: &str) {
        if !self.has_property(name) {
            self.put_property(name, Value::Undefined);
        }
    }

    /// Number of links up to and including the global object.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut scope = self.clone();
        while let Some(parent) = scope.parent() {
            depth += 1;
            scope = parent;
        }
        depth
    }
}

impl PropertyAccess for Scope {
    fn get_property(&self, name: &str) -> Option<Value> {
        match self {
            Self::Global(global) => global.get_property(name),
            Self::Activation(activation) => activation.get_property(name),
        }
    }

    fn has_property(&self, name: &str) -> bool {
        match self {
            Self::Global(global) => global.has_property(name),
            Self::Activation(activation) => activation.has_property(name),
        }
    }

    fn put_property(&self, name: &str, value: Value) {
        match self {
            Self::Global(global) => global.put_property(name, value),
            Self::Activation(activation) => activation.put_property(name, value),
        }
    }

    fn delete_property(&self, name: &str) -> bool {
        match self {
            Self::Global(global) => global.delete_property(name),
            Self::Activation(activation) => activation.delete_property(name),
        }
    }
}
