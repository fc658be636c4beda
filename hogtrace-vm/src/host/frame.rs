use std::collections::BTreeMap;

use hogtrace_protocol::Value;

use super::object::HostObject;

/// The execution frame a probe fires against: positional arguments,
/// keyword arguments, the receiver, and on exit the return value or
/// exception.
///
/// The frame is data, not behavior; all probe access goes through the
/// dispatcher's `load_variable`.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
    receiver: Option<Value>,
    retval: Option<Value>,
    exception: Option<Value>,
    locals: BTreeMap<String, Value>,
    globals: BTreeMap<String, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for an entry frame with positional arguments only.
    pub fn entry(args: impl IntoIterator<Item = Value>) -> Self {
        Frame {
            args: args.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    pub fn with_receiver(mut self, value: Value) -> Self {
        self.receiver = Some(value);
        self
    }

    pub fn with_retval(mut self, value: Value) -> Self {
        self.retval = Some(value);
        self
    }

    pub fn with_exception(mut self, value: Value) -> Self {
        self.exception = Some(value);
        self
    }

    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }

    pub fn with_global(mut self, name: impl Into<String>, value: Value) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Serve a well-known frame name. A miss means the name is not
    /// available on this frame (e.g. `retval` at entry) and becomes a
    /// dispatcher error upstream.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "args" => Some(HostObject::list(self.args.clone())),
            "kwargs" => Some(HostObject::map(self.kwargs.clone())),
            "self" => self.receiver.clone(),
            "retval" => self.retval.clone(),
            // Exit frames always serve `exception`; no exception is None.
            "exception" => Some(self.exception.clone().unwrap_or(Value::None)),
            "locals" => Some(HostObject::map(self.locals.clone())),
            "globals" => Some(HostObject::map(self.globals.clone())),
            _ => {
                let digits = name.strip_prefix("arg")?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let index: usize = digits.parse().ok()?;
                self.args.get(index).cloned()
            }
        }
    }
}
