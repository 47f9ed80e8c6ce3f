//! Script values and the language's conversion rules.
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::number::{number_to_string, string_to_number};
use crate::object::{ObjectKind, ObjectRef};

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn string(text: impl Into<Rc<str>>) -> Self {
        Self::String(text.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(obj) if obj.is_callable() => "function",
            Self::Object(_) => "object",
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => !(*n == 0.0 || n.is_nan()),
            Self::String(s) => !s.is_empty(),
            Self::Object(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => string_to_number(s),
            Self::Object(obj) => string_to_number(&obj.default_string()),
        }
    }

    /// `ToString`.
    pub fn to_js_string(&self) -> Rc<str> {
        match self {
            Self::Undefined => Rc::from("undefined"),
            Self::Null => Rc::from("null"),
            Self::Bool(true) => Rc::from("true"),
            Self::Bool(false) => Rc::from("false"),
            Self::Number(n) => Rc::from(number_to_string(*n)),
            Self::String(s) => s.clone(),
            Self::Object(obj) => Rc::from(obj.default_string()),
        }
    }

    /// `ToPrimitive` with the string hint; objects have no user-defined
    /// conversion hooks here.
    pub fn to_primitive(&self) -> Value {
        match self {
            Self::Object(obj) => Self::string(obj.default_string()),
            other => other.clone(),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined | Self::Null, Self::Undefined | Self::Null) => true,
            (Self::Undefined | Self::Null, _) | (_, Self::Undefined | Self::Null) => false,
            (Self::Number(a), Self::String(_)) => *a == other.to_number(),
            (Self::String(_), Self::Number(b)) => self.to_number() == *b,
            (Self::Bool(_), _) => Self::Number(self.to_number()).loose_equals(other),
            (_, Self::Bool(_)) => self.loose_equals(&Self::Number(other.to_number())),
            (Self::Object(_), Self::Object(_)) => self.strict_equals(other),
            (Self::Object(_), _) => self.to_primitive().loose_equals(other),
            (_, Self::Object(_)) => self.loose_equals(&other.to_primitive()),
            _ => self.strict_equals(other),
        }
    }

    /// Abstract relational comparison. `None` when either side is NaN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        let (a, b) = (self.to_primitive(), other.to_primitive());
        match (&a, &b) {
            (Self::String(x), Self::String(y)) => Some(x.cmp(y)),
            _ => a.to_number().partial_cmp(&b.to_number()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Self::Object(obj)
    }
}

/// Same-value comparison for host code: strict equality except that NaN
/// equals itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(obj) => match obj.kind() {
                ObjectKind::Ordinary => f.write_str("[object Object]"),
                ObjectKind::Function(_) => write!(f, "[function {}]", obj.function_name()),
                ObjectKind::Arguments(_) => f.write_str("[object Arguments]"),
                ObjectKind::Error(_) => write!(f, "[error {}]", obj.default_string()),
            },
            other => write!(f, "{other}"),
        }
    }
}
