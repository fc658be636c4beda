use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use tracing::debug;

use hogtrace_protocol::{ProbeTarget, Provider};

use crate::ast::{Ast, BinOp, CaptureArg, Expr, ProbeDecl, SampleRate, Stmt};

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct HogTraceParser;

/// Syntax failure with source location.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    Pest(#[from] Box<pest::error::Error<Rule>>),

    #[error("unexpected token: {0:?}")]
    UnexpectedRule(Rule),

    #[error("invalid {what} literal '{text}'")]
    InvalidLiteral { what: &'static str, text: String },

    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),

    #[error("probe point offset '{0}' does not fit in 32 bits")]
    OffsetOutOfRange(String),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ParseError::Pest(Box::new(err))
    }
}

impl ParseError {
    /// Line and column of the failure, when the grammar can point at one.
    pub fn line_col(&self) -> Option<(usize, usize)> {
        match self {
            ParseError::Pest(err) => Some(match err.line_col {
                pest::error::LineColLocation::Pos(pos) => pos,
                pest::error::LineColLocation::Span(start, _) => start,
            }),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

// Group a (op, rhs, op, rhs, ...) tail into operator/operand pairs.
fn chunks_of_two(pairs: Pairs<'_, Rule>) -> Vec<(Pair<'_, Rule>, Pair<'_, Rule>)> {
    let items: Vec<_> = pairs.collect();
    let mut result = Vec::new();
    let mut i = 0;
    while i + 1 < items.len() {
        result.push((items[i].clone(), items[i + 1].clone()));
        i += 2;
    }
    result
}

/// Parse HogTrace source into an AST.
pub fn parse(source: &str) -> Result<Ast> {
    let pairs = HogTraceParser::parse(Rule::program, source)?;
    let mut ast = Ast::default();

    for pair in pairs.flatten().filter(|p| p.as_rule() == Rule::probe) {
        ast.probes.push(parse_probe(pair)?);
    }

    debug!(probes = ast.probes.len(), "parsed program");
    Ok(ast)
}

fn parse_probe(pair: Pair<Rule>) -> Result<ProbeDecl> {
    let mut predicate = None;
    let mut body = Vec::new();
    let mut spec = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::probe_spec => spec = Some(parse_spec(inner)?),
            Rule::predicate => {
                let expr = inner
                    .into_inner()
                    .next()
                    .ok_or(ParseError::UnexpectedRule(Rule::predicate))?;
                predicate = Some(parse_expr(expr)?);
            }
            Rule::action => {
                for stmt in inner.into_inner() {
                    body.push(parse_statement(stmt)?);
                }
            }
            rule => return Err(ParseError::UnexpectedRule(rule)),
        }
    }

    let (provider, specifier, target) =
        spec.ok_or(ParseError::UnexpectedRule(Rule::probe_spec))?;
    Ok(ProbeDecl {
        provider,
        specifier,
        target,
        predicate,
        body,
    })
}

fn parse_spec(pair: Pair<Rule>) -> Result<(Provider, String, ProbeTarget)> {
    let mut inner = pair.into_inner();
    let provider_pair = inner.next().ok_or(ParseError::UnexpectedRule(Rule::provider))?;
    let provider = match provider_pair.as_str() {
        "fn" => Provider::Fn,
        "py" => Provider::Py,
        _ => return Err(ParseError::UnexpectedRule(Rule::provider)),
    };

    let specifier = inner
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::specifier))?
        .as_str()
        .to_string();

    let point = inner
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::probe_point))?;
    let mut point_inner = point.into_inner();
    let kind = point_inner
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::point_kind))?;
    let is_entry = kind.as_str() == "entry";

    let offset = match point_inner.next() {
        Some(off) => {
            let digits = off
                .into_inner()
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::point_offset))?;
            let text = digits.as_str();
            Some(
                text.parse::<u32>()
                    .map_err(|_| ParseError::OffsetOutOfRange(text.to_string()))?,
            )
        }
        None => None,
    };

    let target = match (is_entry, offset) {
        (true, None) => ProbeTarget::Entry,
        (false, None) => ProbeTarget::Exit,
        (true, Some(n)) => ProbeTarget::EntryOffset(n),
        (false, Some(n)) => ProbeTarget::ExitOffset(n),
    };
    Ok((provider, specifier, target))
}

fn parse_statement(pair: Pair<Rule>) -> Result<Stmt> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::statement))?;

    match inner.as_rule() {
        Rule::assign_stmt => {
            let mut parts = inner.into_inner();
            let var = parts
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::request_var))?;
            let slot = request_slot_name(var)?;
            let value_pair = parts.next().ok_or(ParseError::UnexpectedRule(Rule::expr))?;
            let value = parse_expr(value_pair)?;
            Ok(Stmt::Assign { slot, value })
        }
        Rule::sample_stmt => {
            let rate_pair = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::sample_rate)
                .ok_or(ParseError::UnexpectedRule(Rule::sample_rate))?;
            Ok(Stmt::Sample {
                rate: parse_sample_rate(rate_pair)?,
            })
        }
        Rule::capture_stmt => {
            let mut args = Vec::new();
            for part in inner.into_inner() {
                if part.as_rule() == Rule::capture_args {
                    for arg in part.into_inner() {
                        args.push(parse_capture_arg(arg)?);
                    }
                }
            }
            Ok(Stmt::Capture { args })
        }
        rule => Err(ParseError::UnexpectedRule(rule)),
    }
}

fn parse_sample_rate(pair: Pair<Rule>) -> Result<SampleRate> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::sample_rate))?;
    match inner.as_rule() {
        Rule::percent => {
            let number = inner
                .into_inner()
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::percent))?;
            let text = number.as_str();
            let value = text.parse::<f64>().map_err(|_| ParseError::InvalidLiteral {
                what: "percent",
                text: text.to_string(),
            })?;
            Ok(SampleRate::Percent(value))
        }
        Rule::ratio => {
            let mut parts = inner.into_inner();
            let num = parse_int(parts.next().ok_or(ParseError::UnexpectedRule(Rule::ratio))?)?;
            let den = parse_int(parts.next().ok_or(ParseError::UnexpectedRule(Rule::ratio))?)?;
            Ok(SampleRate::Ratio(num, den))
        }
        rule => Err(ParseError::UnexpectedRule(rule)),
    }
}

fn parse_capture_arg(pair: Pair<Rule>) -> Result<CaptureArg> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::capture_arg))?;
    match inner.as_rule() {
        Rule::named_arg => {
            let mut parts = inner.into_inner();
            let name = parts
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::named_arg))?
                .as_str()
                .to_string();
            let value = parse_expr(parts.next().ok_or(ParseError::UnexpectedRule(Rule::expr))?)?;
            Ok(CaptureArg {
                name: Some(name),
                value,
            })
        }
        Rule::expr => Ok(CaptureArg {
            name: None,
            value: parse_expr(inner)?,
        }),
        rule => Err(ParseError::UnexpectedRule(rule)),
    }
}

// ===== Expressions =====

fn parse_expr(pair: Pair<Rule>) -> Result<Expr> {
    match pair.as_rule() {
        Rule::expr => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::expr))?;
            parse_logical_or(inner)
        }
        rule => Err(ParseError::UnexpectedRule(rule)),
    }
}

fn fold_binary(
    pair: Pair<Rule>,
    expected: Rule,
    child: fn(Pair<Rule>) -> Result<Expr>,
    op_for: fn(&str) -> Option<BinOp>,
) -> Result<Expr> {
    if pair.as_rule() != expected {
        return Err(ParseError::UnexpectedRule(pair.as_rule()));
    }
    let mut pairs = pair.into_inner();
    let first = pairs.next().ok_or(ParseError::UnexpectedRule(expected))?;
    let mut left = child(first)?;

    for (op_pair, rhs) in chunks_of_two(pairs) {
        let op = op_for(op_pair.as_str()).ok_or(ParseError::UnexpectedRule(op_pair.as_rule()))?;
        let right = child(rhs)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_logical_or(pair: Pair<Rule>) -> Result<Expr> {
    fold_binary(pair, Rule::logical_or, parse_logical_and, |s| match s {
        "||" => Some(BinOp::Or),
        _ => None,
    })
}

fn parse_logical_and(pair: Pair<Rule>) -> Result<Expr> {
    fold_binary(pair, Rule::logical_and, parse_equality, |s| match s {
        "&&" => Some(BinOp::And),
        _ => None,
    })
}

fn parse_equality(pair: Pair<Rule>) -> Result<Expr> {
    fold_binary(pair, Rule::equality, parse_relational, |s| match s {
        "==" => Some(BinOp::Eq),
        "!=" => Some(BinOp::Ne),
        _ => None,
    })
}

fn parse_relational(pair: Pair<Rule>) -> Result<Expr> {
    fold_binary(pair, Rule::relational, parse_additive, |s| match s {
        "<" => Some(BinOp::Lt),
        "<=" => Some(BinOp::Le),
        ">" => Some(BinOp::Gt),
        ">=" => Some(BinOp::Ge),
        _ => None,
    })
}

fn parse_additive(pair: Pair<Rule>) -> Result<Expr> {
    fold_binary(pair, Rule::additive, parse_term, |s| match s {
        "+" => Some(BinOp::Add),
        "-" => Some(BinOp::Sub),
        _ => None,
    })
}

fn parse_term(pair: Pair<Rule>) -> Result<Expr> {
    fold_binary(pair, Rule::term, parse_unary, |s| match s {
        "*" => Some(BinOp::Mul),
        "/" => Some(BinOp::Div),
        "%" => Some(BinOp::Mod),
        _ => None,
    })
}

fn parse_unary(pair: Pair<Rule>) -> Result<Expr> {
    if pair.as_rule() != Rule::unary {
        return Err(ParseError::UnexpectedRule(pair.as_rule()));
    }
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or(ParseError::UnexpectedRule(Rule::unary))?;
    match first.as_rule() {
        Rule::not_op => {
            let operand = parse_unary(inner.next().ok_or(ParseError::UnexpectedRule(Rule::unary))?)?;
            Ok(Expr::Not(Box::new(operand)))
        }
        // Unary minus lowers to `0 - x`; the VM has no NEG opcode.
        Rule::neg_op => {
            let operand = parse_unary(inner.next().ok_or(ParseError::UnexpectedRule(Rule::unary))?)?;
            Ok(Expr::Binary {
                op: BinOp::Sub,
                left: Box::new(Expr::Int(0)),
                right: Box::new(operand),
            })
        }
        Rule::postfix => parse_postfix(first),
        rule => Err(ParseError::UnexpectedRule(rule)),
    }
}

fn parse_postfix(pair: Pair<Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let primary = inner
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::postfix))?;
    let mut expr = parse_primary(primary)?;

    for op in inner {
        let op = op
            .into_inner()
            .next()
            .ok_or(ParseError::UnexpectedRule(Rule::postfix_op))?;
        match op.as_rule() {
            Rule::attr_access => {
                let field = op
                    .into_inner()
                    .next()
                    .ok_or(ParseError::UnexpectedRule(Rule::attr_access))?
                    .as_str()
                    .to_string();
                expr = Expr::Attr {
                    object: Box::new(expr),
                    field,
                };
            }
            Rule::index_access => {
                let index = parse_expr(
                    op.into_inner()
                        .next()
                        .ok_or(ParseError::UnexpectedRule(Rule::index_access))?,
                )?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            }
            rule => return Err(ParseError::UnexpectedRule(rule)),
        }
    }
    Ok(expr)
}

fn parse_primary(pair: Pair<Rule>) -> Result<Expr> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::primary))?;
    match inner.as_rule() {
        Rule::function_call => {
            let mut parts = inner.into_inner();
            let function = parts
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::function_call))?
                .as_str()
                .to_string();
            let mut args = Vec::new();
            if let Some(call_args) = parts.next() {
                for arg in call_args.into_inner() {
                    args.push(parse_expr(arg)?);
                }
            }
            Ok(Expr::Call { function, args })
        }
        Rule::literal => parse_literal(inner),
        Rule::request_var => Ok(Expr::RequestVar(request_slot_name(inner)?)),
        Rule::identifier => Ok(Expr::Ident(inner.as_str().to_string())),
        Rule::expr => parse_expr(inner),
        rule => Err(ParseError::UnexpectedRule(rule)),
    }
}

fn parse_literal(pair: Pair<Rule>) -> Result<Expr> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::literal))?;
    match inner.as_rule() {
        Rule::int => Ok(Expr::Int(parse_int(inner)?)),
        Rule::float => {
            let text = inner.as_str();
            let value = text.parse::<f64>().map_err(|_| ParseError::InvalidLiteral {
                what: "float",
                text: text.to_string(),
            })?;
            Ok(Expr::Float(value))
        }
        Rule::string => {
            let quoted = inner
                .into_inner()
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::string))?;
            let raw = quoted.as_str();
            Ok(Expr::Str(unescape(&raw[1..raw.len() - 1])?))
        }
        Rule::bool_lit => Ok(Expr::Bool(inner.as_str() == "True")),
        Rule::none_lit => Ok(Expr::None),
        rule => Err(ParseError::UnexpectedRule(rule)),
    }
}

fn parse_int(pair: Pair<Rule>) -> Result<i64> {
    let text = pair.as_str();
    text.parse::<i64>().map_err(|_| ParseError::InvalidLiteral {
        what: "integer",
        text: text.to_string(),
    })
}

/// `$req.name` and `$request.name` canonicalize to the bare slot name.
fn request_slot_name(pair: Pair<Rule>) -> Result<String> {
    let mut parts = pair.into_inner();
    let _prefix = parts
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::req_prefix))?;
    Ok(parts
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::request_var))?
        .as_str()
        .to_string())
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some(other) => return Err(ParseError::InvalidEscape(other)),
            None => return Err(ParseError::InvalidEscape('\0')),
        }
    }
    Ok(out)
}
