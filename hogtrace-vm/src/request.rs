//! Request-scoped variable storage.
//!
//! `$req.*` slots live here, shared by every probe that fires within one
//! host request. The store is an explicit collaborator passed to each
//! execution; there is no hidden thread-local in the core. Hosts that
//! share a request across threads must wrap the scope in their own lock.

use std::collections::HashMap;

use hogtrace_protocol::Value;

/// Slots for a single request. An unset slot reads as `None`, never as
/// an error.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    slots: HashMap<String, Value>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a slot. Missing slots yield `Value::None`.
    pub fn get(&self, name: &str) -> Value {
        self.slots.get(name).cloned().unwrap_or(Value::None)
    }

    /// Whether the slot has ever been written in this request.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.slots.insert(name.into(), value);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Scopes keyed by host request id. The store outlives requests; each
/// request's entries live from `begin_request` until `end_request`.
#[derive(Debug, Default)]
pub struct RequestStore {
    scopes: HashMap<String, RequestScope>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request: any leftover slots under this id are dropped.
    pub fn begin_request(&mut self, request_id: impl Into<String>) -> &mut RequestScope {
        let entry = self.scopes.entry(request_id.into()).or_default();
        entry.clear();
        entry
    }

    /// The scope for an in-flight request.
    pub fn scope_mut(&mut self, request_id: &str) -> Option<&mut RequestScope> {
        self.scopes.get_mut(request_id)
    }

    /// The host declared the request complete; its slots are gone.
    pub fn end_request(&mut self, request_id: &str) {
        self.scopes.remove(request_id);
    }

    pub fn active_requests(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_slot_reads_as_none() {
        let scope = RequestScope::new();
        assert_eq!(scope.get("anything"), Value::None);
    }

    #[test]
    fn writes_are_visible_and_overwrite() {
        let mut scope = RequestScope::new();
        scope.set("user_id", Value::Int(1));
        scope.set("user_id", Value::Int(2));
        assert_eq!(scope.get("user_id"), Value::Int(2));
        assert!(scope.contains("user_id"));
    }

    #[test]
    fn requests_are_isolated() {
        let mut store = RequestStore::new();
        store.begin_request("a").set("t", Value::Int(1));
        store.begin_request("b").set("t", Value::Int(2));

        assert_eq!(store.scope_mut("a").unwrap().get("t"), Value::Int(1));
        assert_eq!(store.scope_mut("b").unwrap().get("t"), Value::Int(2));
    }

    #[test]
    fn begin_request_clears_leftovers() {
        let mut store = RequestStore::new();
        store.begin_request("a").set("t", Value::Int(1));
        let scope = store.begin_request("a");
        assert!(scope.is_empty());
        assert_eq!(scope.get("t"), Value::None);
    }

    #[test]
    fn end_request_drops_the_scope() {
        let mut store = RequestStore::new();
        store.begin_request("a").set("t", Value::Int(1));
        store.end_request("a");
        assert!(store.scope_mut("a").is_none());
        assert_eq!(store.active_requests(), 0);
    }
}
