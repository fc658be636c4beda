//! Semantic validation of a parsed program, before any bytecode exists.

use tracing::debug;

use crate::ast::{Ast, CaptureArg, Expr, ProbeDecl, SampleRate, Stmt};
use crate::CompileError;

/// Frame names every host must be able to serve.
const FRAME_NAMES: &[&str] = &[
    "args",
    "kwargs",
    "self",
    "retval",
    "exception",
    "locals",
    "globals",
];

/// Most calls take far fewer; the bytecode carries argc as a single byte.
const MAX_CALL_ARGS: usize = 255;

fn is_frame_name(name: &str) -> bool {
    if FRAME_NAMES.contains(&name) {
        return true;
    }
    // arg0, arg1, ... argN
    match name.strip_prefix("arg") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Double-underscore names (`__sample__`, `__sample_ok__`, ...) are
/// internal to the pipeline: the sampling gate and the per-request
/// verdict live under them. Probe source must not be able to call or
/// overwrite them.
fn is_reserved(name: &str) -> bool {
    name.starts_with("__")
}

fn reserved(name: &str, label: &str) -> CompileError {
    CompileError::ReservedName {
        name: name.to_string(),
        probe: label.to_string(),
    }
}

/// Validate every probe in the program. The first violation wins.
pub fn analyze(ast: &Ast) -> Result<(), CompileError> {
    for probe in &ast.probes {
        analyze_probe(probe)?;
    }
    debug!(probes = ast.probes.len(), "semantic analysis passed");
    Ok(())
}

fn analyze_probe(probe: &ProbeDecl) -> Result<(), CompileError> {
    let label = probe.spec_string();

    check_specifier(probe, &label)?;

    if let Some(pred) = &probe.predicate {
        check_expr(pred, &label)?;
    }

    for stmt in &probe.body {
        match stmt {
            Stmt::Assign { slot, value } => {
                if is_reserved(slot) {
                    return Err(reserved(slot, &label));
                }
                check_expr(value, &label)?;
            }
            Stmt::Sample { rate } => check_sample(rate, &label)?,
            Stmt::Capture { args } => check_capture(args, &label)?,
        }
    }
    Ok(())
}

/// A `*` may appear only as the final character of the final segment.
fn check_specifier(probe: &ProbeDecl, label: &str) -> Result<(), CompileError> {
    let spec = &probe.specifier;
    if spec == "*" {
        return Err(CompileError::BadProbeSpec {
            spec: label.to_string(),
            detail: "wildcard must follow a module path".to_string(),
        });
    }
    if let Some(star) = spec.find('*') {
        if star != spec.len() - 1 {
            return Err(CompileError::BadProbeSpec {
                spec: label.to_string(),
                detail: "wildcard is only allowed at the end of the specifier".to_string(),
            });
        }
    }
    Ok(())
}

fn check_sample(rate: &SampleRate, label: &str) -> Result<(), CompileError> {
    let bad = |detail: &str| CompileError::BadSample {
        probe: label.to_string(),
        detail: detail.to_string(),
    };
    match rate {
        SampleRate::Percent(p) if !(0.0..=100.0).contains(p) => {
            Err(bad("percentage must be between 0 and 100"))
        }
        SampleRate::Ratio(_, 0) => Err(bad("ratio denominator must be non-zero")),
        SampleRate::Ratio(num, den) if num > den => Err(bad("ratio must not exceed 1")),
        _ => Ok(()),
    }
}

fn check_capture(args: &[CaptureArg], label: &str) -> Result<(), CompileError> {
    let named = args.iter().filter(|a| a.name.is_some()).count();
    if named != 0 && named != args.len() {
        return Err(CompileError::BadMix {
            probe: label.to_string(),
        });
    }
    if args.len() > MAX_CALL_ARGS {
        return Err(CompileError::TooManyArguments {
            probe: label.to_string(),
            count: args.len(),
        });
    }

    let mut seen = Vec::with_capacity(named);
    for arg in args {
        if let Some(name) = &arg.name {
            if seen.contains(&name.as_str()) {
                return Err(CompileError::DuplicateName {
                    name: name.clone(),
                    probe: label.to_string(),
                });
            }
            seen.push(name);
        }
        check_expr(&arg.value, label)?;
    }
    Ok(())
}

fn check_expr(expr: &Expr, label: &str) -> Result<(), CompileError> {
    match expr {
        Expr::Ident(name) => {
            if !is_frame_name(name) {
                return Err(CompileError::UnknownVariable {
                    name: name.clone(),
                    probe: label.to_string(),
                });
            }
            Ok(())
        }
        Expr::Attr { object, .. } => check_expr(object, label),
        Expr::Index { object, index } => {
            check_expr(object, label)?;
            check_expr(index, label)
        }
        // Ordinary function names resolve at runtime through the
        // dispatcher; unknown names fail there, not here. Reserved names
        // never make it that far.
        Expr::Call { function, args } => {
            if is_reserved(function) {
                return Err(reserved(function, label));
            }
            if args.len() > MAX_CALL_ARGS {
                return Err(CompileError::TooManyArguments {
                    probe: label.to_string(),
                    count: args.len(),
                });
            }
            for arg in args {
                check_expr(arg, label)?;
            }
            Ok(())
        }
        Expr::Not(operand) => check_expr(operand, label),
        Expr::Binary { left, right, .. } => {
            check_expr(left, label)?;
            check_expr(right, label)
        }
        // Unset request slots read as None, so any non-reserved slot
        // name is valid here.
        Expr::RequestVar(slot) => {
            if is_reserved(slot) {
                return Err(reserved(slot, label));
            }
            Ok(())
        }
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None => Ok(()),
    }
}
