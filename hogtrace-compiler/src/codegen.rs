//! Lowering from the AST to bytecode streams over a shared constant pool.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::debug;

use hogtrace_protocol::{
    Constant, ConstantPool, Opcode, Probe, ProbeSpec, Program, SAMPLE_GATE_FN, WIRE_VERSION,
};

use crate::ast::{Ast, BinOp, Expr, ProbeDecl, Stmt};
use crate::CompileError;

/// Compilation options beyond the source text.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Global sampling rate stored on the program, in [0, 1].
    pub sampling: f32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { sampling: 1.0 }
    }
}

pub fn lower(ast: &Ast, options: &CompileOptions) -> Result<Program, CompileError> {
    let mut gen = CodeGen::default();
    let mut probes = Vec::with_capacity(ast.probes.len());

    for (idx, decl) in ast.probes.iter().enumerate() {
        probes.push(gen.compile_probe(decl, idx)?);
    }

    debug!(
        probes = probes.len(),
        constants = gen.pool.len(),
        "lowered program"
    );
    Ok(Program {
        version: WIRE_VERSION,
        constant_pool: gen.pool,
        probes,
        sampling: options.sampling.clamp(0.0, 1.0),
    })
}

#[derive(Default)]
struct CodeGen {
    pool: ConstantPool,
    code: Vec<u8>,
}

impl CodeGen {
    fn intern(&mut self, constant: Constant) -> Result<u16, CompileError> {
        Ok(self.pool.intern(constant)?)
    }

    fn emit(&mut self, op: Opcode) {
        self.code.push(op as u8);
    }

    fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.emit(op);
        self.code.extend_from_slice(&operand.to_le_bytes());
    }

    fn emit_call(&mut self, function: u16, argc: u8) {
        self.emit(Opcode::CallFunc);
        self.code.extend_from_slice(&function.to_le_bytes());
        self.code.push(argc);
    }

    fn emit_capture(&mut self, argc: u8, namedc: u8) {
        self.emit(Opcode::Capture);
        self.code.push(argc);
        self.code.push(namedc);
    }

    fn take_code(&mut self) -> Vec<u8> {
        if !self.code.is_empty() {
            self.emit(Opcode::Halt);
        }
        std::mem::take(&mut self.code)
    }

    fn compile_probe(&mut self, decl: &ProbeDecl, idx: usize) -> Result<Probe, CompileError> {
        let spec_string = decl.spec_string();

        // Per-probe sample directives tighten the predicate; they never
        // appear in the body stream.
        let sample_rates: Vec<f64> = decl
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Sample { rate } => rate.as_rate(),
                _ => None,
            })
            .map(|rate| rate.clamp(0.0, 1.0))
            .collect();

        let mut conjuncts = 0usize;
        if let Some(pred) = &decl.predicate {
            self.compile_expr(pred)?;
            conjuncts += 1;
        }
        for rate in sample_rates {
            let rate_idx = self.intern(Constant::Float(rate))?;
            self.emit_u16(Opcode::PushConst, rate_idx);
            let gate = self.intern(Constant::Function(SAMPLE_GATE_FN.to_string()))?;
            self.emit_call(gate, 1);
            conjuncts += 1;
            if conjuncts > 1 {
                self.emit(Opcode::And);
            }
        }
        let predicate = self.take_code();

        for stmt in &decl.body {
            self.compile_stmt(stmt)?;
        }
        let body = self.take_code();

        Ok(Probe {
            id: probe_id(&spec_string, idx),
            spec: ProbeSpec {
                provider: decl.provider,
                specifier: decl.specifier.clone(),
                target: decl.target,
            },
            predicate,
            body,
        })
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Assign { slot, value } => {
                self.compile_expr(value)?;
                let idx = self.intern(Constant::Identifier(slot.clone()))?;
                self.emit_u16(Opcode::StoreReq, idx);
            }
            // Lowered into the predicate stream by compile_probe.
            Stmt::Sample { .. } => {}
            Stmt::Capture { args } => {
                let named = args.iter().any(|a| a.name.is_some());
                if named {
                    for arg in args {
                        self.compile_expr(&arg.value)?;
                        let name = arg.name.as_deref().unwrap_or_default();
                        let idx = self.intern(Constant::String(name.to_string()))?;
                        self.emit_u16(Opcode::PushConst, idx);
                    }
                    self.emit_capture(0, args.len() as u8);
                } else {
                    for arg in args {
                        self.compile_expr(&arg.value)?;
                    }
                    self.emit_capture(args.len() as u8, 0);
                }
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Int(v) => {
                let idx = self.intern(Constant::Int(*v))?;
                self.emit_u16(Opcode::PushConst, idx);
            }
            Expr::Float(v) => {
                let idx = self.intern(Constant::Float(*v))?;
                self.emit_u16(Opcode::PushConst, idx);
            }
            Expr::Str(v) => {
                let idx = self.intern(Constant::String(v.clone()))?;
                self.emit_u16(Opcode::PushConst, idx);
            }
            Expr::Bool(v) => {
                let idx = self.intern(Constant::Bool(*v))?;
                self.emit_u16(Opcode::PushConst, idx);
            }
            Expr::None => {
                let idx = self.intern(Constant::None)?;
                self.emit_u16(Opcode::PushConst, idx);
            }
            Expr::Ident(name) => {
                let idx = self.intern(Constant::Identifier(name.clone()))?;
                self.emit_u16(Opcode::LoadVar, idx);
            }
            Expr::RequestVar(slot) => {
                let idx = self.intern(Constant::Identifier(slot.clone()))?;
                self.emit_u16(Opcode::LoadReq, idx);
            }
            Expr::Attr { object, field } => {
                self.compile_expr(object)?;
                let idx = self.intern(Constant::Field(field.clone()))?;
                self.emit_u16(Opcode::GetAttr, idx);
            }
            Expr::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(Opcode::GetItem);
            }
            Expr::Call { function, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let idx = self.intern(Constant::Function(function.clone()))?;
                self.emit_call(idx, args.len() as u8);
            }
            Expr::Not(operand) => {
                self.compile_expr(operand)?;
                self.emit(Opcode::Not);
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(match op {
                    BinOp::Add => Opcode::Add,
                    BinOp::Sub => Opcode::Sub,
                    BinOp::Mul => Opcode::Mul,
                    BinOp::Div => Opcode::Div,
                    BinOp::Mod => Opcode::Mod,
                    BinOp::Eq => Opcode::Eq,
                    BinOp::Ne => Opcode::Ne,
                    BinOp::Lt => Opcode::Lt,
                    BinOp::Gt => Opcode::Gt,
                    BinOp::Le => Opcode::Le,
                    BinOp::Ge => Opcode::Ge,
                    BinOp::And => Opcode::And,
                    BinOp::Or => Opcode::Or,
                });
            }
        }
        Ok(())
    }
}

/// Stable textual probe id: fingerprint of the spec's surface form plus
/// its position in the program.
fn probe_id(spec: &str, idx: usize) -> String {
    let mut hasher = DefaultHasher::new();
    spec.hash(&mut hasher);
    idx.hash(&mut hasher);
    let hash = (hasher.finish() & 0xFFFF_FFFF) as u32;
    format!("probe_{idx}_{hash:08x}")
}
