//! The probe runner: sampling gate, predicate, body, capture batch.
//!
//! This is the safety boundary the whole design leans on: a probe can
//! fail in any way it likes and the host only ever sees `None` or a
//! batch with an `errors` field. Nothing propagates.

use tracing::debug;

use hogtrace_protocol::{CaptureEvent, Limits, Probe, Program, Value, SAMPLE_VERDICT_VAR};

use crate::dispatcher::Dispatcher;
use crate::executor::{Executor, VmError};
use crate::request::RequestScope;

/// Identity of one probe firing, used to stamp capture events.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: String,
    pub request_id: String,
    pub limits: Limits,
}

impl ExecutionContext {
    pub fn new(session_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        ExecutionContext {
            session_id: session_id.into(),
            request_id: request_id.into(),
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Everything a fired probe body produced: capture events in source
/// order, plus any runtime error that aborted the body early.
#[derive(Debug, Default)]
pub struct CaptureBatch {
    pub events: Vec<CaptureEvent>,
    pub errors: Vec<VmError>,
}

impl CaptureBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.errors.is_empty()
    }
}

/// Run one probe against the frame behind `dispatcher`.
///
/// Returns `None` exactly when the probe does not fire: sampled out for
/// this request, predicate false, or predicate failed (runtime errors in
/// predicates coerce to false). Otherwise the body runs and its batch is
/// returned; a body error aborts the body but keeps the captures emitted
/// before it.
pub fn execute_probe<D: Dispatcher>(
    program: &Program,
    probe: &Probe,
    dispatcher: &mut D,
    scope: &mut RequestScope,
    ctx: &ExecutionContext,
) -> Option<CaptureBatch> {
    if !sample_verdict(program, dispatcher, scope) {
        debug!(probe = %probe.id, "sampled out for this request");
        return None;
    }

    if !probe.predicate.is_empty() {
        let mut exec = Executor::new(
            &program.constant_pool,
            dispatcher,
            scope,
            ctx.limits,
            &probe.id,
        );
        let fired = match exec.run(&probe.predicate) {
            Ok(value) => exec.truthy(&value),
            Err(err) => {
                debug!(probe = %probe.id, %err, "predicate error coerced to false");
                false
            }
        };
        if !fired {
            return None;
        }
    }

    let mut batch = CaptureBatch::default();
    let mut exec = Executor::new(
        &program.constant_pool,
        dispatcher,
        scope,
        ctx.limits,
        &probe.id,
    );
    let outcome = exec.run(&probe.body);
    let records = exec.take_captures();
    if let Err(err) = outcome {
        debug!(probe = %probe.id, %err, "body aborted");
        batch.errors.push(err);
    }

    let timestamp = dispatcher
        .call_function("timestamp", Vec::new())
        .ok()
        .and_then(|v| v.as_float())
        .unwrap_or(0.0);
    for values in records {
        batch.events.push(CaptureEvent {
            session_id: ctx.session_id.clone(),
            probe_id: probe.id.clone(),
            request_id: ctx.request_id.clone(),
            timestamp,
            values,
        });
    }
    Some(batch)
}

/// The per-request sampling verdict for the program's global rate.
///
/// Taken at most once per request: the first probe to fire resolves it
/// (host-supplied `__sample_ok__` if the dispatcher serves it, otherwise
/// a draw against the program rate) and caches it in the request scope;
/// every later probe in the request reads the cache.
fn sample_verdict<D: Dispatcher>(
    program: &Program,
    dispatcher: &mut D,
    scope: &mut RequestScope,
) -> bool {
    if program.sampling >= 1.0 {
        return true;
    }
    if scope.contains(SAMPLE_VERDICT_VAR) {
        return scope.get(SAMPLE_VERDICT_VAR).is_truthy();
    }

    let verdict = match dispatcher.load_variable(SAMPLE_VERDICT_VAR) {
        Ok(value) => value.is_truthy(),
        Err(_) => match dispatcher
            .call_function("rand", Vec::new())
            .ok()
            .and_then(|v| v.as_float())
        {
            Some(draw) => draw < f64::from(program.sampling),
            // No way to decide: fire rather than drop silently.
            None => true,
        },
    };
    scope.set(SAMPLE_VERDICT_VAR, Value::Bool(verdict));
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherError;
    use std::collections::HashMap;

    struct TestDispatcher {
        variables: HashMap<String, Value>,
        rand_value: f64,
    }

    impl TestDispatcher {
        fn new() -> Self {
            let mut variables = HashMap::new();
            variables.insert("arg0".to_string(), Value::Int(42));
            TestDispatcher {
                variables,
                rand_value: 0.5,
            }
        }
    }

    impl Dispatcher for TestDispatcher {
        fn load_variable(&mut self, name: &str) -> Result<Value, DispatcherError> {
            self.variables
                .get(name)
                .cloned()
                .ok_or_else(|| DispatcherError::unknown_variable(name))
        }

        fn get_attribute(&mut self, _obj: &Value, field: &str) -> Result<Value, DispatcherError> {
            Err(DispatcherError::new(format!("no attribute '{field}'")))
        }

        fn get_item(&mut self, _obj: &Value, _key: &Value) -> Result<Value, DispatcherError> {
            Err(DispatcherError::new("not indexable"))
        }

        fn call_function(&mut self, name: &str, _args: Vec<Value>) -> Result<Value, DispatcherError> {
            match name {
                "rand" => Ok(Value::Float(self.rand_value)),
                "timestamp" => Ok(Value::Float(1_234.5)),
                _ => Err(DispatcherError::unknown_function(name)),
            }
        }
    }

    fn compiled(source: &str) -> Program {
        hogtrace_compiler::compile(source).expect("compile failed")
    }

    #[test]
    fn empty_predicate_always_fires() {
        let program = compiled("fn:m.f:entry { capture(arg0); }");
        let mut dispatcher = TestDispatcher::new();
        let mut scope = RequestScope::new();
        let ctx = ExecutionContext::new("sess", "req");

        let batch = execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx)
            .expect("probe should fire");
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].values["arg0"], Value::Int(42));
        assert_eq!(batch.events[0].timestamp, 1_234.5);
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn predicate_error_means_none() {
        // `nope` is not served by the dispatcher; the analyzer knows
        // `retval`, but this frame has no such variable either.
        let program = compiled("fn:m.f:entry / retval == 1 / { capture(arg0); }");
        let mut dispatcher = TestDispatcher::new();
        let mut scope = RequestScope::new();
        let ctx = ExecutionContext::new("sess", "req");

        let result = execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx);
        assert!(result.is_none());
    }

    #[test]
    fn body_error_keeps_prior_captures() {
        let program = compiled(
            "fn:m.f:entry { capture(arg0); capture(x = arg0 - $req.unset); capture(arg0); }",
        );
        let mut dispatcher = TestDispatcher::new();
        let mut scope = RequestScope::new();
        let ctx = ExecutionContext::new("sess", "req");

        let batch = execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx)
            .expect("probe fires");
        // First capture lands, the failing subtraction aborts the rest.
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert!(matches!(batch.errors[0], VmError::TypeMismatch(_)));
    }

    #[test]
    fn request_scope_flows_between_probes() {
        let program = compiled(
            "fn:m.f:entry { $req.t = arg0; }\n\
             fn:m.f:exit { capture(seen = $req.t); }",
        );
        let mut dispatcher = TestDispatcher::new();
        let mut scope = RequestScope::new();
        let ctx = ExecutionContext::new("sess", "req");

        let first =
            execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx).unwrap();
        assert!(first.events.is_empty() && first.errors.is_empty());

        let second =
            execute_probe(&program, &program.probes[1], &mut dispatcher, &mut scope, &ctx).unwrap();
        assert_eq!(second.events[0].values["seen"], Value::Int(42));
    }

    #[test]
    fn global_sampling_verdict_is_per_request() {
        let program = hogtrace_compiler::compile_with_options(
            "fn:m.f:entry { capture(arg0); }\nfn:m.g:entry { capture(arg0); }",
            &hogtrace_compiler::CompileOptions { sampling: 0.5 },
        )
        .unwrap();
        let ctx = ExecutionContext::new("sess", "req");

        // Sampled out: every probe in the request skips, even after the
        // dispatcher's draw changes.
        let mut dispatcher = TestDispatcher::new();
        dispatcher.rand_value = 0.9;
        let mut scope = RequestScope::new();
        assert!(
            execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx)
                .is_none()
        );
        dispatcher.rand_value = 0.1;
        assert!(
            execute_probe(&program, &program.probes[1], &mut dispatcher, &mut scope, &ctx)
                .is_none()
        );

        // Sampled in: every probe fires.
        let mut scope = RequestScope::new();
        assert!(
            execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx)
                .is_some()
        );
        dispatcher.rand_value = 0.9;
        assert!(
            execute_probe(&program, &program.probes[1], &mut dispatcher, &mut scope, &ctx)
                .is_some()
        );
    }

    #[test]
    fn host_supplied_verdict_wins() {
        let program = hogtrace_compiler::compile_with_options(
            "fn:m.f:entry { capture(arg0); }",
            &hogtrace_compiler::CompileOptions { sampling: 0.01 },
        )
        .unwrap();
        let mut dispatcher = TestDispatcher::new();
        dispatcher
            .variables
            .insert(SAMPLE_VERDICT_VAR.to_string(), Value::Bool(true));
        let mut scope = RequestScope::new();
        let ctx = ExecutionContext::new("sess", "req");

        assert!(
            execute_probe(&program, &program.probes[0], &mut dispatcher, &mut scope, &ctx)
                .is_some()
        );
    }
}
