use std::collections::HashMap;

use crate::Value;

/// An entry in the constant pool.
///
/// Literals lift directly into [`Value`]s at runtime. `Identifier`,
/// `Field` and `Function` are symbolic: they carry the same text type but
/// are distinct kinds, so a `LOAD_VAR` operand can never alias a field
/// name and vice versa.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    None,
    Identifier(String),
    Field(String),
    Function(String),
}

/// Discriminant-only view of a [`Constant`], used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantKind {
    Int,
    Float,
    String,
    Bool,
    None,
    Identifier,
    Field,
    Function,
}

impl Constant {
    pub fn kind(&self) -> ConstantKind {
        match self {
            Constant::Int(_) => ConstantKind::Int,
            Constant::Float(_) => ConstantKind::Float,
            Constant::String(_) => ConstantKind::String,
            Constant::Bool(_) => ConstantKind::Bool,
            Constant::None => ConstantKind::None,
            Constant::Identifier(_) => ConstantKind::Identifier,
            Constant::Field(_) => ConstantKind::Field,
            Constant::Function(_) => ConstantKind::Function,
        }
    }

    /// Lift a literal constant into a runtime value. Symbolic constants
    /// have no value form.
    pub fn as_value(&self) -> Option<Value> {
        match self {
            Constant::Int(i) => Some(Value::Int(*i)),
            Constant::Float(f) => Some(Value::Float(*f)),
            Constant::String(s) => Some(Value::String(s.clone())),
            Constant::Bool(b) => Some(Value::Bool(*b)),
            Constant::None => Some(Value::None),
            _ => None,
        }
    }
}

/// Dedup key. Floats key by bit pattern so `0.0`/`-0.0` and NaN payloads
/// stay distinct entries rather than poisoning a `PartialEq` map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Int(i64),
    Float(u64),
    String(String),
    Bool(bool),
    None,
    Identifier(String),
    Field(String),
    Function(String),
}

impl From<&Constant> for ConstantKey {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Int(i) => ConstantKey::Int(*i),
            Constant::Float(f) => ConstantKey::Float(f.to_bits()),
            Constant::String(s) => ConstantKey::String(s.clone()),
            Constant::Bool(b) => ConstantKey::Bool(*b),
            Constant::None => ConstantKey::None,
            Constant::Identifier(s) => ConstantKey::Identifier(s.clone()),
            Constant::Field(s) => ConstantKey::Field(s.clone()),
            Constant::Function(s) => ConstantKey::Function(s.clone()),
        }
    }
}

/// The pool holds more than `u16::MAX` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("constant pool overflow: more than {} entries", u16::MAX)]
pub struct PoolOverflow;

/// Deduplicated, append-only table of constants shared by every bytecode
/// stream in a program. Indices are stable once handed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: HashMap<ConstantKey, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a pool from decoded entries, restoring the dedup index.
    pub fn from_entries(entries: Vec<Constant>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, c) in entries.iter().enumerate() {
            index.entry(ConstantKey::from(c)).or_insert(i as u16);
        }
        ConstantPool { entries, index }
    }

    /// Intern a constant: return the existing index for an equal
    /// (kind, value) pair, or append and return the new index.
    pub fn intern(&mut self, constant: Constant) -> Result<u16, PoolOverflow> {
        let key = ConstantKey::from(&constant);
        if let Some(&idx) = self.index.get(&key) {
            return Ok(idx);
        }
        if self.entries.len() >= u16::MAX as usize {
            return Err(PoolOverflow);
        }
        let idx = self.entries.len() as u16;
        self.entries.push(constant);
        self.index.insert(key, idx);
        Ok(idx)
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    /// Lift the literal at `index` to a runtime value.
    pub fn value_at(&self, index: u16) -> Option<Value> {
        self.get(index).and_then(Constant::as_value)
    }

    /// The identifier text at `index`; `None` for any other kind.
    pub fn identifier_at(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Identifier(s)) => Some(s),
            _ => None,
        }
    }

    /// The field name at `index`; `None` for any other kind.
    pub fn field_at(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Field(s)) => Some(s),
            _ => None,
        }
    }

    /// The function name at `index`; `None` for any other kind.
    pub fn function_at(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Function(s)) => Some(s),
            _ => None,
        }
    }

    /// The string literal at `index`; `None` for any other kind.
    pub fn string_at(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(Constant::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Constant] {
        &self.entries
    }
}
