//! End-to-end scenarios: compile real source, fire probes against
//! reference frames, check the emitted batches.

mod common;

use common::run_probe;
use hogtrace::host::{Frame, HostObject};
use hogtrace::{
    compile, compile_with_options, CompileOptions, LimitKind, RequestScope, Value, VmError,
};

#[test]
fn basic_capture() {
    common::init_logging();
    let program = compile("fn:m.f:entry { capture(arg0); }").unwrap();
    let frame = Frame::entry([Value::Int(42)]);
    let mut scope = RequestScope::new();

    let batch = run_probe(&program, 0, &frame, &mut scope, 1).expect("probe fires");
    assert_eq!(batch.events.len(), 1);
    assert_eq!(batch.events[0].values["arg0"], Value::Int(42));
    assert!(batch.errors.is_empty());
    assert!(batch.events[0].timestamp > 0.0);
    assert_eq!(batch.events[0].probe_id, program.probes[0].id);
}

#[test]
fn predicate_filters() {
    let program = compile(r#"fn:m.f:entry / arg0 == "admin" / { capture(arg0); }"#).unwrap();
    let mut scope = RequestScope::new();

    let frame = Frame::entry([Value::from("user")]);
    assert!(run_probe(&program, 0, &frame, &mut scope, 1).is_none());

    let frame = Frame::entry([Value::from("admin")]);
    let batch = run_probe(&program, 0, &frame, &mut scope, 1).expect("probe fires");
    assert_eq!(batch.events[0].values["arg0"], Value::from("admin"));
}

#[test]
fn request_scope_across_probes() {
    let program = compile(
        "fn:m.f:entry { $req.t = timestamp(); }\n\
         fn:m.f:exit { capture(dur = timestamp() - $req.t); }",
    )
    .unwrap();
    let mut scope = RequestScope::new();

    let entry_frame = Frame::entry([]);
    let batch = run_probe(&program, 0, &entry_frame, &mut scope, 1).expect("entry fires");
    assert!(batch.events.is_empty() && batch.errors.is_empty());
    assert!(scope.contains("t"));

    let exit_frame = Frame::entry([]).with_retval(Value::None);
    let batch = run_probe(&program, 1, &exit_frame, &mut scope, 2).expect("exit fires");
    assert_eq!(batch.events.len(), 1);
    let Value::Float(dur) = batch.events[0].values["dur"] else {
        panic!("dur should be a float");
    };
    assert!(dur >= 0.0);
}

#[test]
fn exit_probe_without_entry_aborts_cleanly() {
    let program = compile(
        "fn:m.f:entry { $req.t = timestamp(); }\n\
         fn:m.f:exit { capture(dur = timestamp() - $req.t); }",
    )
    .unwrap();
    // Fresh request: $req.t was never written, None - float is a type
    // mismatch, the body aborts with zero captures.
    let mut scope = RequestScope::new();
    let frame = Frame::entry([]);
    let batch = run_probe(&program, 1, &frame, &mut scope, 1).expect("probe fires");
    assert!(batch.events.is_empty());
    assert_eq!(batch.errors.len(), 1);
    assert!(matches!(batch.errors[0], VmError::TypeMismatch(_)));
}

fn nested_payload(v: i64) -> Value {
    HostObject::map([(
        "data",
        HostObject::list([HostObject::map([("v", Value::Int(v))])]),
    )])
}

#[test]
fn nested_access() {
    let source = r#"fn:m.f:entry / len(args) > 2 && arg0.data[0]["v"] >= 100 / { capture(v = arg0.data[0]["v"]); }"#;
    let program = compile(source).unwrap();
    let mut scope = RequestScope::new();

    let frame = Frame::entry([nested_payload(120), Value::Int(0), Value::Int(0)]);
    let batch = run_probe(&program, 0, &frame, &mut scope, 1).expect("probe fires");
    assert_eq!(batch.events[0].values["v"], Value::Int(120));

    // Value below the threshold.
    let frame = Frame::entry([nested_payload(50), Value::Int(0), Value::Int(0)]);
    assert!(run_probe(&program, 0, &frame, &mut scope, 1).is_none());

    // Too few arguments; both conjuncts still evaluate, the predicate is
    // simply false.
    let frame = Frame::entry([nested_payload(120)]);
    assert!(run_probe(&program, 0, &frame, &mut scope, 1).is_none());

    // Structure missing entirely: the attribute access fails and the
    // predicate coerces to false.
    let frame = Frame::entry([Value::Int(5), Value::Int(0), Value::Int(0)]);
    assert!(run_probe(&program, 0, &frame, &mut scope, 1).is_none());
}

#[test]
fn per_request_sampling_is_uniform_across_probes() {
    let program = compile_with_options(
        "fn:m.f:entry { capture(arg0); }\nfn:m.g:entry { capture(arg0); }",
        &CompileOptions { sampling: 0.5 },
    )
    .unwrap();
    let frame = Frame::entry([Value::Int(1)]);

    let mut fired = 0;
    let mut skipped = 0;
    for request in 0..64u64 {
        let mut scope = RequestScope::new();
        // Each probe invocation gets its own dispatcher with a different
        // seed; the verdict must still be shared via the request scope.
        let first = run_probe(&program, 0, &frame, &mut scope, request).is_some();
        let second = run_probe(&program, 1, &frame, &mut scope, request + 10_000).is_some();
        assert_eq!(first, second, "probes disagreed within request {request}");
        if first {
            fired += 1;
        } else {
            skipped += 1;
        }
    }
    assert!(fired > 0, "no request was ever sampled in");
    assert!(skipped > 0, "no request was ever sampled out");
}

#[test]
fn probe_level_sample_directive_is_stable_within_a_request() {
    let program = compile("fn:m.f:entry { sample 1/2; capture(arg0); }").unwrap();
    let frame = Frame::entry([Value::Int(1)]);

    let mut fired = 0;
    for request in 0..64u64 {
        let mut scope = RequestScope::new();
        let first = run_probe(&program, 0, &frame, &mut scope, request)
            .map(|b| !b.events.is_empty())
            .unwrap_or(false);
        // Re-firing in the same request must agree even though the
        // dispatcher would draw differently.
        let again = run_probe(&program, 0, &frame, &mut scope, request + 999)
            .map(|b| !b.events.is_empty())
            .unwrap_or(false);
        assert_eq!(first, again, "sample verdict flapped in request {request}");
        if first {
            fired += 1;
        }
    }
    assert!(fired > 0 && fired < 64, "sample gate never varied: {fired}");
}

#[test]
fn pathological_body_hits_the_instruction_limit() {
    let mut source = String::from("fn:m.f:entry { ");
    for _ in 0..10_001 {
        source.push_str("capture(1); ");
    }
    source.push('}');

    let program = compile(&source).unwrap();
    let frame = Frame::entry([]);
    let mut scope = RequestScope::new();

    let batch = run_probe(&program, 0, &frame, &mut scope, 1).expect("probe fires");
    assert_eq!(batch.errors.len(), 1);
    assert!(matches!(
        batch.errors[0],
        VmError::Limit(LimitKind::Instructions)
    ));
    // Two instructions per capture: half the budget completed.
    assert_eq!(batch.events.len(), 5_000);
    assert_eq!(batch.events[0].values["arg0"], Value::Int(1));
}

#[test]
fn named_and_positional_capture_events() {
    let program = compile(
        "fn:m.f:exit { capture(retval, exception); capture(status = retval.status); }",
    )
    .unwrap();
    let retval = HostObject::map([("status", Value::from("ok"))]);
    let frame = Frame::entry([]).with_retval(retval);
    let mut scope = RequestScope::new();

    let batch = run_probe(&program, 0, &frame, &mut scope, 1).expect("probe fires");
    assert_eq!(batch.events.len(), 2);
    // Positional args are named arg0..argN in emission order.
    assert!(batch.events[0].values.contains_key("arg0"));
    assert_eq!(batch.events[0].values["arg1"], Value::None);
    assert_eq!(batch.events[1].values["status"], Value::from("ok"));
}

#[test]
fn kwargs_and_self_are_reachable() {
    let program = compile(r#"fn:m.f:entry / kwargs["mode"] == "fast" / { capture(self); }"#)
        .unwrap();
    let receiver = HostObject::map([("name", Value::from("worker"))]);
    let frame = Frame::entry([])
        .with_kwarg("mode", Value::from("fast"))
        .with_receiver(receiver);
    let mut scope = RequestScope::new();

    let batch = run_probe(&program, 0, &frame, &mut scope, 1).expect("probe fires");
    assert_eq!(batch.events.len(), 1);
}
