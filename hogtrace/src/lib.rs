//! HogTrace: DTrace-inspired instrumentation for application hosts.
//!
//! Operators write small probe programs that fire on function entry and
//! exit, evaluate a guard predicate, and emit structured capture events.
//! This crate is the public surface over the three subsystems:
//!
//! - [`hogtrace_compiler`]: source → AST → semantic analysis → bytecode
//! - [`hogtrace_protocol`]: the data model and the binary wire format
//! - [`hogtrace_vm`]: the stack VM, dispatcher contract and request store
//!
//! ```
//! use hogtrace::host::{Frame, FrameDispatcher};
//! use hogtrace::{compile, execute_probe, ExecutionContext, RequestScope, Value};
//!
//! let program = compile(
//!     r#"fn:myapp.auth.login:entry / arg0 == "admin" / { capture(arg0); }"#,
//! )
//! .unwrap();
//!
//! let frame = Frame::entry([Value::from("admin")]);
//! let mut dispatcher = FrameDispatcher::new(&frame);
//! let mut scope = RequestScope::new();
//! let ctx = ExecutionContext::new("session-1", "request-1");
//!
//! let batch =
//!     execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx).unwrap();
//! assert_eq!(batch.events.len(), 1);
//! assert_eq!(batch.events[0].values["arg0"], Value::from("admin"));
//! ```

pub use hogtrace_compiler::{
    compile, compile_with_options, CompileError, CompileOptions, ParseError,
};
pub use hogtrace_protocol::{
    CaptureEvent, Constant, ConstantPool, DecodeError, Limits, Opcode, Probe, ProbeSpec,
    ProbeTarget, Program, Provider, Value, WIRE_VERSION,
};
pub use hogtrace_vm::{
    execute_probe, host, CaptureBatch, DispatchResult, Dispatcher, DispatcherError,
    ExecutionContext, LimitKind, RequestScope, RequestStore, VmError,
};
