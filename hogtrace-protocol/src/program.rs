use std::fmt;

use crate::wire;
use crate::{ConstantPool, DecodeError};

/// A compiled HogTrace program: immutable once emitted by the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Wire-format version this program was compiled against.
    pub version: u32,
    /// Shared constant pool for all probes.
    pub constant_pool: ConstantPool,
    /// Probes in source order.
    pub probes: Vec<Probe>,
    /// Global sampling rate in [0, 1]. 1.0 means every request.
    pub sampling: f32,
}

impl Program {
    /// Encode to the length-delimited binary wire format.
    pub fn serialize(&self) -> Vec<u8> {
        wire::encode_program(self)
    }

    /// Decode from the binary wire format, validating the version, every
    /// constant tag, and every bytecode pool operand.
    pub fn deserialize(bytes: &[u8]) -> Result<Program, DecodeError> {
        wire::decode_program(bytes)
    }
}

/// One instrumentation point: where to fire, the gate, and the actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    /// Stable textual id assigned at compile time.
    pub id: String,
    /// Where this probe is installed.
    pub spec: ProbeSpec,
    /// Predicate bytecode; empty means always true.
    pub predicate: Vec<u8>,
    /// Action body bytecode.
    pub body: Vec<u8>,
}

/// Probe provider: which host runtime discovers the target function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Fn,
    Py,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Fn => write!(f, "fn"),
            Provider::Py => write!(f, "py"),
        }
    }
}

/// Where within the target function the probe fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    Entry,
    Exit,
    EntryOffset(u32),
    ExitOffset(u32),
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTarget::Entry => write!(f, "entry"),
            ProbeTarget::Exit => write!(f, "exit"),
            ProbeTarget::EntryOffset(n) => write!(f, "entry+{n}"),
            ProbeTarget::ExitOffset(n) => write!(f, "exit+{n}"),
        }
    }
}

/// Parsed probe specification: `provider:module.function:target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    pub provider: Provider,
    /// Dotted module path, optionally ending in `*`.
    pub specifier: String,
    pub target: ProbeTarget,
}

impl ProbeSpec {
    /// Whether this spec covers a concrete dotted function path. A
    /// trailing `*` matches any suffix at that point.
    pub fn matches(&self, path: &str) -> bool {
        match self.specifier.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => self.specifier == path,
        }
    }
}

impl fmt::Display for ProbeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.specifier, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(specifier: &str) -> ProbeSpec {
        ProbeSpec {
            provider: Provider::Fn,
            specifier: specifier.to_string(),
            target: ProbeTarget::Entry,
        }
    }

    #[test]
    fn exact_match() {
        assert!(spec("myapp.users.create").matches("myapp.users.create"));
        assert!(!spec("myapp.users.create").matches("myapp.users.delete"));
    }

    #[test]
    fn wildcard_match() {
        let s = spec("myapp.users.*");
        assert!(s.matches("myapp.users.create"));
        assert!(s.matches("myapp.users.admin.delete"));
        assert!(!s.matches("myapp.orders.create"));
    }

    #[test]
    fn display_roundtrips_the_surface_form() {
        let s = ProbeSpec {
            provider: Provider::Py,
            specifier: "svc.handler".to_string(),
            target: ProbeTarget::ExitOffset(3),
        };
        assert_eq!(s.to_string(), "py:svc.handler:exit+3");
    }
}
