//! HogTrace compiler front end.
//!
//! Source text goes through three stages: the pest parser produces an
//! AST, the semantic analyzer validates it, and codegen lowers each probe
//! into two linear bytecode streams over a shared constant pool. The
//! output is an immutable [`Program`] ready for the VM or the wire.
//!
//! Boolean operators do not short-circuit in the emitted bytecode: the
//! instruction set has no jumps, so both sides of `&&`/`||` are always
//! evaluated. Predicates must not rely on evaluation being skipped.

pub mod ast;

mod analyzer;
mod codegen;
mod parser;

use tracing::debug;

use hogtrace_protocol::{PoolOverflow, Program};

pub use codegen::CompileOptions;
pub use parser::{parse, ParseError, Rule};

/// Compilation failure: a syntax error with location, or a structured
/// semantic error.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Syntax(#[from] Box<ParseError>),

    #[error("unknown variable '{name}' in probe {probe}")]
    UnknownVariable { name: String, probe: String },

    #[error("cannot mix positional and named capture arguments in probe {probe}")]
    BadMix { probe: String },

    #[error("duplicate capture argument name '{name}' in probe {probe}")]
    DuplicateName { name: String, probe: String },

    #[error("invalid sample directive in probe {probe}: {detail}")]
    BadSample { probe: String, detail: String },

    #[error(transparent)]
    PoolOverflow(#[from] PoolOverflow),

    #[error("invalid probe spec '{spec}': {detail}")]
    BadProbeSpec { spec: String, detail: String },

    #[error("name '{name}' is reserved in probe {probe}")]
    ReservedName { name: String, probe: String },

    #[error("too many arguments ({count}) in probe {probe}, the limit is 255")]
    TooManyArguments { probe: String, count: usize },
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        CompileError::Syntax(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Compile HogTrace source into an executable program with the default
/// options (global sampling rate 1.0).
pub fn compile(source: &str) -> Result<Program> {
    compile_with_options(source, &CompileOptions::default())
}

/// Compile HogTrace source with explicit options.
pub fn compile_with_options(source: &str, options: &CompileOptions) -> Result<Program> {
    let ast = parser::parse(source)?;
    analyzer::analyze(&ast)?;
    let program = codegen::lower(&ast, options)?;
    debug!(
        probes = program.probes.len(),
        sampling = program.sampling,
        "compiled program"
    );
    Ok(program)
}
