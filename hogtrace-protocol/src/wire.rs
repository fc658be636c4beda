//! Binary wire format for compiled programs.
//!
//! Length-delimited little-endian records, restatable in any
//! length-delimited encoding with the same logical fields:
//!
//! ```text
//! Program      := version:u32 sampling:f32 pool:ConstantPool probes:List<Probe>
//! ConstantPool := List<Constant>           (u32 count prefix)
//! Constant     := tag:u8 payload
//! Probe        := id:str spec:ProbeSpec predicate:bytes body:bytes
//! ProbeSpec    := provider:u8 specifier:str target:u8 offset:u32
//! ```
//!
//! Strings are u32-length-prefixed UTF-8; byte blobs are u32-length-
//! prefixed. Decoding is strict: the version is gated first, and every
//! bytecode stream is validated eagerly so a decoded program can never
//! carry an unknown opcode or an out-of-range pool operand.

use tracing::debug;

use crate::{Constant, ConstantPool, Opcode, Probe, ProbeSpec, ProbeTarget, Program, Provider};

const TAG_INT: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_STRING: u8 = 0x03;
const TAG_BOOL: u8 = 0x04;
const TAG_NONE: u8 = 0x05;
const TAG_IDENTIFIER: u8 = 0x06;
const TAG_FIELD: u8 = 0x07;
const TAG_FUNCTION: u8 = 0x08;

const PROVIDER_FN: u8 = 0;
const PROVIDER_PY: u8 = 1;

const TARGET_ENTRY: u8 = 0;
const TARGET_EXIT: u8 = 1;
const TARGET_ENTRY_OFFSET: u8 = 2;
const TARGET_EXIT_OFFSET: u8 = 3;

/// Wire-format decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("incompatible wire version {found} (expected {})", crate::WIRE_VERSION)]
    IncompatibleVersion { found: u32 },

    #[error("truncated input at byte {offset} while reading {what}")]
    Truncated { offset: usize, what: &'static str },

    #[error("bad {what} tag 0x{tag:02x} at byte {offset}")]
    BadTag {
        offset: usize,
        tag: u8,
        what: &'static str,
    },

    #[error("probe '{probe}' {stream} stream: pool index {index} out of range (pool has {len})")]
    IndexOutOfRange {
        probe: String,
        stream: &'static str,
        index: u16,
        len: usize,
    },

    #[error("invalid UTF-8 in string at byte {offset}")]
    InvalidUtf8 { offset: usize },
}

// ===== Encoding =====

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn bytes(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }
}

pub fn encode_program(program: &Program) -> Vec<u8> {
    let mut w = Writer::new();
    w.u32(program.version);
    w.f32(program.sampling);

    w.u32(program.constant_pool.len() as u32);
    for constant in program.constant_pool.entries() {
        encode_constant(&mut w, constant);
    }

    w.u32(program.probes.len() as u32);
    for probe in &program.probes {
        w.str(&probe.id);
        encode_spec(&mut w, &probe.spec);
        w.bytes(&probe.predicate);
        w.bytes(&probe.body);
    }

    debug!(
        bytes = w.buf.len(),
        probes = program.probes.len(),
        constants = program.constant_pool.len(),
        "encoded program"
    );
    w.buf
}

fn encode_constant(w: &mut Writer, constant: &Constant) {
    match constant {
        Constant::Int(i) => {
            w.u8(TAG_INT);
            w.i64(*i);
        }
        Constant::Float(f) => {
            w.u8(TAG_FLOAT);
            w.f64(*f);
        }
        Constant::String(s) => {
            w.u8(TAG_STRING);
            w.str(s);
        }
        Constant::Bool(b) => {
            w.u8(TAG_BOOL);
            w.u8(*b as u8);
        }
        Constant::None => w.u8(TAG_NONE),
        Constant::Identifier(s) => {
            w.u8(TAG_IDENTIFIER);
            w.str(s);
        }
        Constant::Field(s) => {
            w.u8(TAG_FIELD);
            w.str(s);
        }
        Constant::Function(s) => {
            w.u8(TAG_FUNCTION);
            w.str(s);
        }
    }
}

fn encode_spec(w: &mut Writer, spec: &ProbeSpec) {
    w.u8(match spec.provider {
        Provider::Fn => PROVIDER_FN,
        Provider::Py => PROVIDER_PY,
    });
    w.str(&spec.specifier);
    let (target, offset) = match spec.target {
        ProbeTarget::Entry => (TARGET_ENTRY, 0),
        ProbeTarget::Exit => (TARGET_EXIT, 0),
        ProbeTarget::EntryOffset(n) => (TARGET_ENTRY_OFFSET, n),
        ProbeTarget::ExitOffset(n) => (TARGET_EXIT_OFFSET, n),
    };
    w.u8(target);
    w.u32(offset);
}

// ===== Decoding =====

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.buf.len() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                what,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self, what: &'static str) -> Result<i64, DecodeError> {
        let b = self.take(8, what)?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn f32(&mut self, what: &'static str) -> Result<f32, DecodeError> {
        let b = self.take(4, what)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self, what: &'static str) -> Result<f64, DecodeError> {
        let b = self.take(8, what)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn str(&mut self, what: &'static str) -> Result<String, DecodeError> {
        let offset = self.pos;
        let len = self.u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    fn bytes(&mut self, what: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.u32(what)? as usize;
        Ok(self.take(len, what)?.to_vec())
    }
}

pub fn decode_program(bytes: &[u8]) -> Result<Program, DecodeError> {
    let mut r = Reader::new(bytes);

    let version = r.u32("version")?;
    if version != crate::WIRE_VERSION {
        return Err(DecodeError::IncompatibleVersion { found: version });
    }
    let sampling = r.f32("sampling rate")?;

    let pool_len = r.u32("constant pool length")?;
    let mut entries = Vec::with_capacity(pool_len.min(1024) as usize);
    for _ in 0..pool_len {
        entries.push(decode_constant(&mut r)?);
    }
    let constant_pool = ConstantPool::from_entries(entries);

    let probe_count = r.u32("probe count")?;
    let mut probes = Vec::with_capacity(probe_count.min(1024) as usize);
    for _ in 0..probe_count {
        let id = r.str("probe id")?;
        let spec = decode_spec(&mut r)?;
        let predicate = r.bytes("predicate bytecode")?;
        let body = r.bytes("body bytecode")?;

        validate_stream(&id, "predicate", &predicate, &constant_pool)?;
        validate_stream(&id, "body", &body, &constant_pool)?;

        probes.push(Probe {
            id,
            spec,
            predicate,
            body,
        });
    }

    debug!(probes = probes.len(), "decoded program");
    Ok(Program {
        version,
        constant_pool,
        probes,
        sampling,
    })
}

fn decode_constant(r: &mut Reader) -> Result<Constant, DecodeError> {
    let offset = r.pos;
    let tag = r.u8("constant tag")?;
    Ok(match tag {
        TAG_INT => Constant::Int(r.i64("int constant")?),
        TAG_FLOAT => Constant::Float(r.f64("float constant")?),
        TAG_STRING => Constant::String(r.str("string constant")?),
        TAG_BOOL => Constant::Bool(r.u8("bool constant")? != 0),
        TAG_NONE => Constant::None,
        TAG_IDENTIFIER => Constant::Identifier(r.str("identifier constant")?),
        TAG_FIELD => Constant::Field(r.str("field constant")?),
        TAG_FUNCTION => Constant::Function(r.str("function constant")?),
        _ => {
            return Err(DecodeError::BadTag {
                offset,
                tag,
                what: "constant",
            })
        }
    })
}

fn decode_spec(r: &mut Reader) -> Result<ProbeSpec, DecodeError> {
    let offset = r.pos;
    let provider = match r.u8("probe provider")? {
        PROVIDER_FN => Provider::Fn,
        PROVIDER_PY => Provider::Py,
        tag => {
            return Err(DecodeError::BadTag {
                offset,
                tag,
                what: "provider",
            })
        }
    };
    let specifier = r.str("probe specifier")?;
    let target_offset = r.pos;
    let target_tag = r.u8("probe target")?;
    let n = r.u32("target offset")?;
    let target = match target_tag {
        TARGET_ENTRY => ProbeTarget::Entry,
        TARGET_EXIT => ProbeTarget::Exit,
        TARGET_ENTRY_OFFSET => ProbeTarget::EntryOffset(n),
        TARGET_EXIT_OFFSET => ProbeTarget::ExitOffset(n),
        tag => {
            return Err(DecodeError::BadTag {
                offset: target_offset,
                tag,
                what: "target",
            })
        }
    };
    Ok(ProbeSpec {
        provider,
        specifier,
        target,
    })
}

/// Walk a bytecode stream, rejecting unknown opcodes, truncated operands
/// and pool operands past the end of the decoded pool.
fn validate_stream(
    probe: &str,
    stream: &'static str,
    bytecode: &[u8],
    pool: &ConstantPool,
) -> Result<(), DecodeError> {
    let mut i = 0;
    while i < bytecode.len() {
        let offset = i;
        let byte = bytecode[i];
        i += 1;
        let op = Opcode::from_u8(byte).ok_or(DecodeError::BadTag {
            offset,
            tag: byte,
            what: "opcode",
        })?;
        let width = op.operand_width();
        if i + width > bytecode.len() {
            return Err(DecodeError::Truncated {
                offset,
                what: "opcode operand",
            });
        }
        if op.pool_operand() {
            let index = u16::from_le_bytes([bytecode[i], bytecode[i + 1]]);
            if index as usize >= pool.len() {
                return Err(DecodeError::IndexOutOfRange {
                    probe: probe.to_string(),
                    stream,
                    index,
                    len: pool.len(),
                });
            }
        }
        i += width;
    }
    Ok(())
}
