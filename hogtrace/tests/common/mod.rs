#![allow(dead_code)]

use hogtrace::host::{Frame, FrameDispatcher};
use hogtrace::{execute_probe, CaptureBatch, ExecutionContext, Program, RequestScope};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fire one probe of `program` against `frame` with a fresh, seeded
/// dispatcher, the way a host runtime would per invocation.
pub fn run_probe(
    program: &Program,
    idx: usize,
    frame: &Frame,
    scope: &mut RequestScope,
    seed: u64,
) -> Option<CaptureBatch> {
    let mut dispatcher = FrameDispatcher::new(frame)
        .with_sampling(program.sampling)
        .with_seed(seed);
    let ctx = ExecutionContext::new("sess-test", "req-test");
    execute_probe(program, &program.probes[idx], &mut dispatcher, scope, &ctx)
}
