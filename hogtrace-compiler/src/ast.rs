use hogtrace_protocol::{ProbeTarget, Provider};

/// Parsed program: a sequence of probe declarations.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub probes: Vec<ProbeDecl>,
}

/// One `spec /predicate/ { body }` declaration.
#[derive(Debug, Clone)]
pub struct ProbeDecl {
    pub provider: Provider,
    /// Dotted module path, optionally ending in `*`.
    pub specifier: String,
    pub target: ProbeTarget,
    pub predicate: Option<Expr>,
    pub body: Vec<Stmt>,
}

impl ProbeDecl {
    /// The surface form of the probe spec, e.g. `fn:myapp.users.*:entry`.
    pub fn spec_string(&self) -> String {
        format!("{}:{}:{}", self.provider, self.specifier, self.target)
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    /// `$req.name = expr;` with the slot name already canonical.
    Assign { slot: String, value: Expr },
    /// `sample 25%;` or `sample 1/10;`
    Sample { rate: SampleRate },
    /// `capture(...)` / `send(...)`
    Capture { args: Vec<CaptureArg> },
}

/// A sample directive before normalization to a rate in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleRate {
    Percent(f64),
    Ratio(i64, i64),
}

impl SampleRate {
    /// The firing probability this directive denotes. Callers must have
    /// validated the directive first; a zero denominator yields None.
    pub fn as_rate(&self) -> Option<f64> {
        match self {
            SampleRate::Percent(p) => Some(p / 100.0),
            SampleRate::Ratio(_, 0) => None,
            SampleRate::Ratio(num, den) => Some(*num as f64 / *den as f64),
        }
    }
}

/// One argument of a capture call; `name` is set for the named form.
#[derive(Debug, Clone)]
pub struct CaptureArg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    /// Frame variable: `arg0`, `retval`, `kwargs`, ...
    Ident(String),
    /// Request-scoped slot, canonical name without the `$req.` prefix.
    RequestVar(String),
    /// `object.field`
    Attr { object: Box<Expr>, field: String },
    /// `object[index]`
    Index { object: Box<Expr>, index: Box<Expr> },
    /// `function(args...)`
    Call { function: String, args: Vec<Expr> },
    /// `!operand`
    Not(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}
