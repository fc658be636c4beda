use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};

/// Runtime value in the HogTrace VM.
///
/// Primitives are owned by the VM. `Object` is an opaque handle to a
/// host-language value: the VM never looks inside it, only the dispatcher
/// does. Handles are reference-counted so the request store and capture
/// events can hold copies without involving the host.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    None,
    Object(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wrap a host value as an opaque handle.
    pub fn object<T: Any + Send + Sync>(obj: T) -> Self {
        Value::Object(Arc::new(obj))
    }

    /// Boolean coercion for predicates.
    ///
    /// `Object` is truthy here; callers that can reach a dispatcher should
    /// route opaque values through `Dispatcher::truthy` instead.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::None => false,
            Value::Object(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::None => "none",
            Value::Object(_) => "object",
        }
    }

    /// Rough payload cost of this value, used for the capture byte cap.
    ///
    /// Opaque handles are charged a flat cost: the VM must not walk host
    /// object graphs to measure them.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Bool(_) | Value::None => 1,
            Value::Int(_) | Value::Float(_) => 8,
            Value::String(s) => s.len(),
            Value::Object(_) => 16,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(fl) => write!(f, "Float({fl})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::None => write!(f, "None"),
            Value::Object(_) => write!(f, "Object(<opaque>)"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::String(s) => write!(f, "{s}"),
            Value::None => write!(f, "None"),
            Value::Object(_) => write!(f, "<object>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::None => serializer.serialize_none(),
            Value::Object(_) => serializer.serialize_str("<object>"),
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
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(-3).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::None.is_truthy());
        assert!(Value::object(vec![1u8]).is_truthy());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(Value::Int(42).as_float(), Some(42.0));
        assert_eq!(Value::Bool(true).as_int(), Some(1));
        assert_eq!(Value::from("x").as_int(), None);
    }

    #[test]
    fn object_equality_is_identity() {
        let a = Value::object(7i64);
        let b = a.clone();
        assert_eq!(a, b);
        assert_ne!(Value::object(7i64), Value::object(7i64));
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_string(&Value::Int(5)).unwrap();
        assert_eq!(json, "5");
        let json = serde_json::to_string(&Value::None).unwrap();
        assert_eq!(json, "null");
    }
}
