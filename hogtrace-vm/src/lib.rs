//! HogTrace virtual machine.
//!
//! Executes compiled probe bytecode against host-supplied frames. The VM
//! itself is host-language-neutral: variable lookup, attribute and item
//! access and function calls all go through the [`Dispatcher`] contract,
//! and `$req.*` slots live in an explicit [`RequestScope`] collaborator.
//!
//! The one property everything here defends: a probe can never crash or
//! corrupt the host. Runtime failures coerce predicates to false and
//! abort bodies, surfacing as data in the capture batch.

mod dispatcher;
mod executor;
pub mod host;
mod probe;
mod request;

pub use dispatcher::{DispatchResult, Dispatcher, DispatcherError};
pub use executor::{CaptureRecord, Executor, LimitKind, VmError, VmResult};
pub use probe::{execute_probe, CaptureBatch, ExecutionContext};
pub use request::{RequestScope, RequestStore};
