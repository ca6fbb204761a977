//! Runtime values.

use std::fmt;
use std::rc::Rc;

use fabric_types::Type;

use crate::frame::Frame;

/// A runtime value. Compound variants are reference counted so copies stay
/// cheap while a lookup fans a value out to its listeners.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Float(f64),
    Frame(Rc<Frame>),
    Int(i64),
    Str(Rc<str>),
    Template(Rc<Template>),
    Unit,
    Bin(Rc<[u8]>),
}

impl Value {
    /// The singleton type of this value.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Bool(_) => Type::BOOL,
            Value::Float(_) => Type::FLOAT,
            Value::Frame(_) => Type::FRAME,
            Value::Int(_) => Type::INT,
            Value::Str(_) => Type::STR,
            Value::Template(_) => Type::TEMPLATE,
            Value::Unit => Type::UNIT,
            Value::Bin(_) => Type::BIN,
        }
    }

    pub fn as_frame(&self) -> Option<&Rc<Frame>> {
        match self {
            Value::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl PartialEq for Value {
    /// Scalars compare by content; frames and templates by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => Rc::ptr_eq(a, b),
            (Value::Unit, Value::Unit) => true,
            (Value::Bin(a), Value::Bin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Frame(frame) => write!(f, "Frame({} attributes)", frame.len()),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Template(t) => write!(f, "Template({:?})", t.attributes),
            Value::Unit => write!(f, "Unit"),
            Value::Bin(bytes) => write!(f, "Bin({} bytes)", bytes.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Rc<Frame>> for Value {
    fn from(frame: Rc<Frame>) -> Self {
        Value::Frame(frame)
    }
}

/// A template value: the attribute names it will define when instantiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub attributes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuilder;

    #[test]
    fn test_type_of_is_singleton() {
        let values = [
            Value::Bool(true),
            Value::Float(1.5),
            Value::Int(3),
            Value::str("s"),
            Value::Unit,
            Value::Bin(Rc::from(&b"\x00"[..])),
        ];
        for v in values {
            assert!(v.type_of().is_singleton(), "{v:?}");
        }
    }

    #[test]
    fn test_frames_compare_by_identity() {
        let a = FrameBuilder::new().ready("x", Value::Int(1)).build();
        let b = FrameBuilder::new().ready("x", Value::Int(1)).build();
        assert_eq!(Value::Frame(a.clone()), Value::Frame(a.clone()));
        assert_ne!(Value::Frame(a), Value::Frame(b));
    }
}
