//! Router condition evaluator (spec §4.3, §9).
//!
//! Condition strings are a restricted expression language, hand-parsed and
//! tree-walked rather than delegated to a host-language `eval` — matching
//! the spec's explicit ban on that shortcut. Every `$...` reference inside
//! the expression is resolved non-strictly *before* parsing and bound to a
//! fresh placeholder identifier; the rewritten text is then the only thing
//! the parser ever sees.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::errors::ConditionError;
use crate::reference;
use crate::state::StateInner;

/// The literal `"else"` condition always matches (spec §4.3); it is
/// recognized before any tokenizing happens.
const ELSE_LABEL: &str = "else";

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(String),
    And,
    Or,
    Not,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Dot,
    LBracket,
    RBracket,
    Assign,
}

fn tokenize(src: &str, raw: &str) -> Result<Vec<Tok>, ConditionError> {
    let mut toks = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                toks.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                toks.push(Tok::RBracket);
                i += 1;
            }
            '.' => {
                toks.push(Tok::Dot);
                i += 1;
            }
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Eq);
                    i += 2;
                } else {
                    toks.push(Tok::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Neq);
                    i += 2;
                } else {
                    return Err(ConditionError::Syntax(raw.to_string(), "unexpected '!'".into()));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Le);
                    i += 2;
                } else {
                    toks.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    toks.push(Tok::Ge);
                    i += 2;
                } else {
                    toks.push(Tok::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(ConditionError::Syntax(raw.to_string(), "unterminated string literal".into()));
                }
                toks.push(Tok::Str(s));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| ConditionError::Syntax(raw.to_string(), format!("invalid number {text:?}")))?;
                toks.push(Tok::Num(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                toks.push(match word.as_str() {
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    "true" => Tok::Bool(true),
                    "false" => Tok::Bool(false),
                    "null" | "None" => Tok::Null,
                    "lambda" | "import" | "for" | "def" | "class" => {
                        return Err(ConditionError::Forbidden(raw.to_string(), format!("keyword {word:?} is not allowed")));
                    }
                    _ => Tok::Ident(word),
                });
            }
            other => {
                return Err(ConditionError::Syntax(raw.to_string(), format!("unexpected character {other:?}")));
            }
        }
    }
    Ok(toks)
}

/// A parsed, reference-substituted condition expression.
#[derive(Debug, Clone)]
pub struct ParsedCondition {
    ast: Expr,
    /// placeholder identifier -> original reference text
    refs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(Box<Expr>, CmpOp, Box<Expr>),
    Arith(Box<Expr>, ArithOp, Box<Expr>),
    Neg(Box<Expr>),
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Ref(String),
}

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

struct Parser<'a> {
    toks: &'a [Tok],
    pos: usize,
    raw: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Tok> {
        let t = self.toks.get(self.pos);
        self.pos += 1;
        t
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), ConditionError> {
        if self.peek() == Some(tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(ConditionError::Syntax(self.raw.to_string(), format!("expected {tok:?}")))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ConditionError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Tok::Not) {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Tok::Eq) => Some(CmpOp::Eq),
            Some(Tok::Neq) => Some(CmpOp::Neq),
            Some(Tok::Lt) => Some(CmpOp::Lt),
            Some(Tok::Le) => Some(CmpOp::Le),
            Some(Tok::Gt) => Some(CmpOp::Gt),
            Some(Tok::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        self.pos += 1;
        let rhs = self.parse_additive()?;
        Ok(Expr::Cmp(Box::new(lhs), op, Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => ArithOp::Add,
                Some(Tok::Minus) => ArithOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Arith(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Star) => ArithOp::Mul,
                Some(Tok::Slash) => ArithOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Tok::Minus) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance().cloned() {
            Some(Tok::Num(n)) => Ok(Expr::Num(n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Bool(b)) => Ok(Expr::Bool(b)),
            Some(Tok::Null) => Ok(Expr::Null),
            Some(Tok::Ident(name)) => {
                match self.peek() {
                    Some(Tok::LParen) => Err(ConditionError::Forbidden(
                        self.raw.to_string(),
                        format!("function call {name}(...) is not allowed"),
                    )),
                    Some(Tok::Dot) => Err(ConditionError::Forbidden(
                        self.raw.to_string(),
                        "attribute access is not allowed".into(),
                    )),
                    Some(Tok::LBracket) => Err(ConditionError::Forbidden(
                        self.raw.to_string(),
                        "subscript access is not allowed".into(),
                    )),
                    _ => Ok(Expr::Ref(name)),
                }
            }
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::LBracket) => Err(ConditionError::Forbidden(self.raw.to_string(), "list/subscript syntax is not allowed".into())),
            Some(Tok::Assign) => Err(ConditionError::Forbidden(self.raw.to_string(), "assignment is not allowed".into())),
            other => Err(ConditionError::Syntax(self.raw.to_string(), format!("unexpected token {other:?}"))),
        }
    }
}

/// Substitute every `$...` reference occurrence with a fresh placeholder
/// identifier, tokenize, and parse. Does not evaluate anything yet.
pub fn parse_condition(raw: &str) -> Result<ParsedCondition, ConditionError> {
    if raw.trim() == ELSE_LABEL {
        return Ok(ParsedCondition { ast: Expr::Bool(true), refs: Vec::new() });
    }

    let mut refs: Vec<(String, String)> = Vec::new();
    let mut rewritten = String::with_capacity(raw.len());
    let mut last_end = 0;
    for (start, end, ref_text) in reference::scan_reference_spans(raw) {
        rewritten.push_str(&raw[last_end..start]);
        // reject malformed references eagerly so the validator surfaces a
        // precise syntax error rather than a downstream parser failure
        reference::parse(ref_text).map_err(|e| ConditionError::Syntax(raw.to_string(), e.to_string()))?;
        let placeholder = match refs.iter().find(|(_, t)| t == ref_text) {
            Some((p, _)) => p.clone(),
            None => {
                let p = format!("__ref_{}", refs.len());
                refs.push((p.clone(), ref_text.to_string()));
                p
            }
        };
        rewritten.push_str(&placeholder);
        last_end = end;
    }
    rewritten.push_str(&raw[last_end..]);

    let toks = tokenize(&rewritten, raw)?;
    let mut parser = Parser { toks: &toks, pos: 0, raw };
    let ast = parser.parse_expr()?;
    if parser.pos != parser.toks.len() {
        return Err(ConditionError::Syntax(raw.to_string(), "trailing tokens after expression".into()));
    }
    Ok(ParsedCondition { ast, refs })
}

/// Evaluate a previously parsed condition against `state`. References are
/// resolved non-strictly, per spec §4.2's strictness table for router
/// conditions.
pub fn evaluate(parsed: &ParsedCondition, raw: &str, state: &StateInner) -> Result<bool, ConditionError> {
    let mut env: FxHashMap<String, Value> = FxHashMap::default();
    for (placeholder, ref_text) in &parsed.refs {
        let reference = reference::parse(ref_text).map_err(|e| ConditionError::Syntax(raw.to_string(), e.to_string()))?;
        let value = reference::resolve(&reference, ref_text, state, false)
            .map_err(|e| ConditionError::Syntax(raw.to_string(), e.to_string()))?;
        env.insert(placeholder.clone(), value);
    }
    let result = eval(&parsed.ast, &env, raw)?;
    truthy(&result, raw)
}

/// Parse and evaluate `raw` in one step; convenience for call sites that do
/// not need the parsed form twice.
pub fn evaluate_condition(raw: &str, state: &StateInner) -> Result<bool, ConditionError> {
    let parsed = parse_condition(raw)?;
    evaluate(&parsed, raw, state)
}

#[derive(Debug, Clone)]
enum Val {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
}

fn eval(expr: &Expr, env: &FxHashMap<String, Value>, raw: &str) -> Result<Val, ConditionError> {
    match expr {
        Expr::Num(n) => Ok(Val::Num(*n)),
        Expr::Str(s) => Ok(Val::Str(s.clone())),
        Expr::Bool(b) => Ok(Val::Bool(*b)),
        Expr::Null => Ok(Val::Null),
        Expr::Ref(name) => Ok(json_to_val(env.get(name).unwrap_or(&Value::Null))),
        Expr::Not(inner) => {
            let v = eval(inner, env, raw)?;
            Ok(Val::Bool(!truthy(&v, raw)?))
        }
        Expr::Neg(inner) => match eval(inner, env, raw)? {
            Val::Num(n) => Ok(Val::Num(-n)),
            other => Err(ConditionError::TypeError(raw.to_string(), format!("cannot negate {other:?}"))),
        },
        Expr::And(a, b) => {
            let va = eval(a, env, raw)?;
            if !truthy(&va, raw)? {
                return Ok(Val::Bool(false));
            }
            let vb = eval(b, env, raw)?;
            Ok(Val::Bool(truthy(&vb, raw)?))
        }
        Expr::Or(a, b) => {
            let va = eval(a, env, raw)?;
            if truthy(&va, raw)? {
                return Ok(Val::Bool(true));
            }
            let vb = eval(b, env, raw)?;
            Ok(Val::Bool(truthy(&vb, raw)?))
        }
        Expr::Cmp(a, op, b) => {
            let va = eval(a, env, raw)?;
            let vb = eval(b, env, raw)?;
            Ok(Val::Bool(compare(&va, *op, &vb, raw)?))
        }
        Expr::Arith(a, op, b) => {
            let va = eval(a, env, raw)?;
            let vb = eval(b, env, raw)?;
            let (Val::Num(x), Val::Num(y)) = (&va, &vb) else {
                return Err(ConditionError::TypeError(raw.to_string(), "arithmetic requires numbers".into()));
            };
            match op {
                ArithOp::Add => Ok(Val::Num(x + y)),
                ArithOp::Sub => Ok(Val::Num(x - y)),
                ArithOp::Mul => Ok(Val::Num(x * y)),
                ArithOp::Div => {
                    if *y == 0.0 {
                        Err(ConditionError::DivisionByZero(raw.to_string()))
                    } else {
                        Ok(Val::Num(x / y))
                    }
                }
            }
        }
    }
}

fn json_to_val(v: &Value) -> Val {
    match v {
        Value::Null => Val::Null,
        Value::Bool(b) => Val::Bool(*b),
        Value::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Val::Str(s.clone()),
        Value::Array(_) | Value::Object(_) => Val::Null,
    }
}

fn truthy(v: &Val, raw: &str) -> Result<bool, ConditionError> {
    match v {
        Val::Bool(b) => Ok(*b),
        Val::Null => Ok(false),
        Val::Num(n) => Ok(*n != 0.0),
        Val::Str(s) => Ok(!s.is_empty()),
        #[allow(unreachable_patterns)]
        _ => Err(ConditionError::TypeError(raw.to_string(), "cannot coerce to boolean".into())),
    }
}

fn compare(a: &Val, op: CmpOp, b: &Val, raw: &str) -> Result<bool, ConditionError> {
    use CmpOp::{Eq, Ge, Gt, Le, Lt, Neq};
    match (a, b) {
        (Val::Num(x), Val::Num(y)) => Ok(match op {
            Eq => x == y,
            Neq => x != y,
            Lt => x < y,
            Le => x <= y,
            Gt => x > y,
            Ge => x >= y,
        }),
        (Val::Str(x), Val::Str(y)) => Ok(match op {
            Eq => x == y,
            Neq => x != y,
            Lt => x < y,
            Le => x <= y,
            Gt => x > y,
            Ge => x >= y,
        }),
        (Val::Bool(x), Val::Bool(y)) => match op {
            Eq => Ok(x == y),
            Neq => Ok(x != y),
            _ => Err(ConditionError::TypeError(raw.to_string(), "booleans only support == and !=".into())),
        },
        (Val::Null, Val::Null) => match op {
            Eq => Ok(true),
            Neq => Ok(false),
            _ => Err(ConditionError::TypeError(raw.to_string(), "null only supports == and !=".into())),
        },
        (Val::Null, _) | (_, Val::Null) => match op {
            Eq => Ok(false),
            Neq => Ok(true),
            _ => Err(ConditionError::TypeError(raw.to_string(), "cannot order-compare null".into())),
        },
        _ => Err(ConditionError::TypeError(raw.to_string(), "mismatched operand types".into())),
    }
}
