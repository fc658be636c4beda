use std::collections::BTreeMap;

use hogtrace_protocol::Value;

/// Structured host data for the reference binding.
///
/// The VM never sees this type: it travels behind `Value::Object` and
/// only the dispatcher looks inside. Real hosts substitute their own
/// object model; lists and string-keyed maps are enough to express
/// argument tuples, keyword maps and nested payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum HostObject {
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl HostObject {
    /// Wrap a list as an opaque value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::object(HostObject::List(items.into_iter().collect()))
    }

    /// Wrap a string-keyed map as an opaque value.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::object(HostObject::Map(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Borrow the host object behind an opaque value, if it is one of
    /// ours.
    pub fn from_value(value: &Value) -> Option<&HostObject> {
        match value {
            Value::Object(obj) => obj.downcast_ref::<HostObject>(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostObject::List(items) => items.len(),
            HostObject::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_through_opaque_value() {
        let value = HostObject::list([Value::Int(1), Value::Int(2)]);
        let obj = HostObject::from_value(&value).expect("host object");
        assert_eq!(obj.len(), 2);
        assert!(HostObject::from_value(&Value::Int(1)).is_none());
    }

    #[test]
    fn foreign_objects_are_not_ours() {
        let value = Value::object("some other host handle");
        assert!(HostObject::from_value(&value).is_none());
    }
}
