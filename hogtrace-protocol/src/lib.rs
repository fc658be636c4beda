//! HogTrace Protocol Library
//!
//! Shared data model for the HogTrace probe pipeline: runtime values, the
//! interned constant pool, the bytecode instruction set, the immutable
//! program container, the on-wire binary format, capture events, and
//! execution limits.
//!
//! Everything in this crate is host-language-neutral. Host bindings live
//! behind the dispatcher contract in `hogtrace-vm`.

mod constants;
mod event;
mod limits;
mod opcode;
mod program;
mod value;
pub mod wire;

pub use constants::{Constant, ConstantKind, ConstantPool, PoolOverflow};
pub use event::CaptureEvent;
pub use limits::Limits;
pub use opcode::Opcode;
pub use program::{Probe, ProbeSpec, ProbeTarget, Program, Provider};
pub use value::Value;
pub use wire::DecodeError;

/// The only wire-format version understood by this crate.
pub const WIRE_VERSION: u32 = 1;

/// Reserved function name for the per-probe sampling gate. Emitted by
/// the compiler for `sample` directives and resolved inside the VM; it
/// never reaches a dispatcher.
pub const SAMPLE_GATE_FN: &str = "__sample__";

/// Reserved identifier through which the per-request sampling verdict is
/// read from the dispatcher and cached in the request scope.
pub const SAMPLE_VERDICT_VAR: &str = "__sample_ok__";
