use hogtrace_protocol::Value;

/// Host-side failure surfaced through the dispatcher. The payload is
/// opaque to the VM; it only ever reports it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DispatcherError {
    pub message: String,
}

impl DispatcherError {
    pub fn new(message: impl Into<String>) -> Self {
        DispatcherError {
            message: message.into(),
        }
    }

    pub fn unknown_variable(name: &str) -> Self {
        Self::new(format!("unknown variable '{name}'"))
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(format!("unknown function '{name}'"))
    }
}

pub type DispatchResult<T> = Result<T, DispatcherError>;

/// The capability set a host grants to probes.
///
/// This is the only boundary where host-language references cross into
/// the VM; everything the VM cannot interpret itself is delegated here.
/// One dispatcher serves one probe invocation: it wraps the frame the
/// probe fires against.
pub trait Dispatcher {
    /// Frame-local variable lookup: `arg0`, `retval`, `kwargs`, ...
    /// An unknown name is an error, not None.
    fn load_variable(&mut self, name: &str) -> DispatchResult<Value>;

    /// `object.field`
    fn get_attribute(&mut self, obj: &Value, field: &str) -> DispatchResult<Value>;

    /// `object[key]`
    fn get_item(&mut self, obj: &Value, key: &Value) -> DispatchResult<Value>;

    /// Built-in or host-registered function call. Arguments arrive in
    /// source order.
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> DispatchResult<Value>;

    /// Truthiness of an opaque host object, used when a predicate result
    /// is an `Object`. Everything else coerces inside the VM.
    fn truthy(&mut self, _obj: &Value) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_constructors() {
        assert_eq!(
            DispatcherError::unknown_variable("nope").to_string(),
            "unknown variable 'nope'"
        );
        assert_eq!(
            DispatcherError::unknown_function("mystery").to_string(),
            "unknown function 'mystery'"
        );
    }
}
