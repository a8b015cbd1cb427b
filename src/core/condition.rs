//! Run-condition expressions (`if:`)
//!
//! Conditions are parsed once at load time into a small tagged AST and
//! evaluated against an immutable snapshot of the event and the outcomes
//! of the job's dependencies. The language is deliberately tiny:
//!
//! - literals: `'text'`, `true`, `false`, `null`
//! - paths: `event.kind`, `github.ref`, `needs.build.result`, ...
//! - operators: `==`, `!=`, `!`, `&&`, `||`, parentheses
//! - functions: `success()`, `failure()`, `always()`, `contains(a, b)`,
//!   `startsWith(a, b)`, `endsWith(a, b)`
//!
//! A condition that mentions a status function overrides the default
//! upstream gate; any other condition is implicitly `success() && <expr>`.
//!
//! Status functions see direct dependencies only. `failure()` is true when
//! one of them Failed; a Skipped dependency does not count, even when it
//! was skipped because of a failure further upstream.

use crate::core::error::DefinitionError;
use crate::core::state::JobOutcome;
use crate::core::trigger::RepositoryEvent;
use std::collections::BTreeMap;

/// Evaluated value of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Str(s)) | (Value::Str(s), Value::Null) => s.is_empty(),
            _ => self.as_text().eq_ignore_ascii_case(&other.as_text()),
        }
    }
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Success,
    Failure,
    Always,
    Contains,
    StartsWith,
    EndsWith,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "success" => Some(Function::Success),
            "failure" => Some(Function::Failure),
            "always" => Some(Function::Always),
            "contains" => Some(Function::Contains),
            "startswith" => Some(Function::StartsWith),
            "endswith" => Some(Function::EndsWith),
            _ => None,
        }
    }

    fn arity(&self) -> usize {
        match self {
            Function::Success | Function::Failure | Function::Always => 0,
            Function::Contains | Function::StartsWith | Function::EndsWith => 2,
        }
    }

    fn is_status(&self) -> bool {
        matches!(
            self,
            Function::Success | Function::Failure | Function::Always
        )
    }
}

/// Expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Call(Function, Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn mentions_status(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Path(_) => false,
            Expr::Call(f, args) => f.is_status() || args.iter().any(Expr::mentions_status),
            Expr::Not(inner) => inner.mentions_status(),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Eq(a, b) | Expr::Ne(a, b) => {
                a.mentions_status() || b.mentions_status()
            }
        }
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a [String]>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Path(p) => out.push(p),
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_paths(out)),
            Expr::Not(inner) => inner.collect_paths(out),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Eq(a, b) | Expr::Ne(a, b) => {
                a.collect_paths(out);
                b.collect_paths(out);
            }
        }
    }
}

/// Immutable snapshot a condition is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub event: &'a RepositoryEvent,
    /// Terminal outcomes of the job's direct dependencies
    pub needs: &'a BTreeMap<String, JobOutcome>,
}

impl ConditionContext<'_> {
    fn all_succeeded(&self) -> bool {
        self.needs.values().all(|o| *o == JobOutcome::Succeeded)
    }

    fn any_failed(&self) -> bool {
        self.needs.values().any(|o| *o == JobOutcome::Failed)
    }
}

/// A parsed run-condition
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
    status_aware: bool,
}

impl Condition {
    /// Parse a condition, with or without the `${{ }}` wrapper
    pub fn parse(source: &str) -> Result<Self, DefinitionError> {
        let invalid = |reason: String| DefinitionError::InvalidCondition {
            expression: source.to_string(),
            reason,
        };

        let tokens = tokenize(strip_wrapper(source)).map_err(invalid)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or().map_err(invalid)?;
        if parser.pos < parser.tokens.len() {
            return Err(invalid(format!(
                "unexpected {:?} after end of expression",
                parser.tokens[parser.pos]
            )));
        }

        let mut paths = Vec::new();
        expr.collect_paths(&mut paths);
        for path in paths {
            validate_condition_path(path).map_err(invalid)?;
        }

        let status_aware = expr.mentions_status();
        Ok(Self {
            source: source.to_string(),
            expr,
            status_aware,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// True when the condition decides on its own whether upstream
    /// failures or skips block the job
    pub fn overrides_upstream(&self) -> bool {
        self.status_aware
    }

    /// Job names referenced through `needs.<job>...`
    pub fn referenced_needs(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.expr.collect_paths(&mut paths);
        paths
            .into_iter()
            .filter(|p| p.first().map(String::as_str) == Some("needs"))
            .filter_map(|p| p.get(1).cloned())
            .collect()
    }

    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> bool {
        let value = eval(&self.expr, ctx).truthy();
        if self.status_aware {
            value
        } else {
            ctx.all_succeeded() && value
        }
    }
}

fn strip_wrapper(source: &str) -> &str {
    let trimmed = source.trim();
    trimmed
        .strip_prefix("${{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn validate_condition_path(path: &[String]) -> Result<(), String> {
    match path.first().map(String::as_str) {
        Some("needs") => {
            if path.len() == 3 && path[2] == "result" {
                Ok(())
            } else {
                Err(format!(
                    "'{}' is not supported, use needs.<job>.result",
                    path.join(".")
                ))
            }
        }
        Some("secrets") => Err("secrets are not available in conditions".to_string()),
        _ if is_event_path(path) => Ok(()),
        _ => Err(format!("unknown context '{}'", path.join("."))),
    }
}

/// Check if a path names a known event field
pub(crate) fn is_event_path(path: &[String]) -> bool {
    let parts: Vec<&str> = path.iter().map(String::as_str).collect();
    matches!(
        parts.as_slice(),
        ["event", "kind"]
            | ["event", "branch"]
            | ["event", "tag"]
            | ["event", "action"]
            | ["github", "event_name"]
            | ["github", "ref"]
            | ["github", "ref_name"]
            | ["github", "event", "action"]
    )
}

/// Resolve an event path validated by [`is_event_path`]
pub(crate) fn resolve_event_path(event: &RepositoryEvent, path: &[String]) -> Value {
    let parts: Vec<&str> = path.iter().map(String::as_str).collect();
    let text = match parts.as_slice() {
        ["event", "kind"] | ["github", "event_name"] => Some(event.kind.as_str().to_string()),
        ["event", "branch"] => event.metadata.branch.clone(),
        ["event", "tag"] => event.metadata.tag.clone(),
        ["event", "action"] | ["github", "event", "action"] => event.metadata.action.clone(),
        ["github", "ref"] => event.git_ref(),
        ["github", "ref_name"] => event.ref_name().map(str::to_string),
        _ => None,
    };
    text.map(Value::Str).unwrap_or(Value::Null)
}

fn eval(expr: &Expr, ctx: &ConditionContext<'_>) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(path) => {
            if path.first().map(String::as_str) == Some("needs") {
                ctx.needs
                    .get(&path[1])
                    .map(|o| Value::Str(o.result_str().to_string()))
                    .unwrap_or(Value::Null)
            } else {
                resolve_event_path(ctx.event, path)
            }
        }
        Expr::Call(func, args) => call(*func, args, ctx),
        Expr::Not(inner) => Value::Bool(!eval(inner, ctx).truthy()),
        Expr::And(a, b) => Value::Bool(eval(a, ctx).truthy() && eval(b, ctx).truthy()),
        Expr::Or(a, b) => Value::Bool(eval(a, ctx).truthy() || eval(b, ctx).truthy()),
        Expr::Eq(a, b) => Value::Bool(eval(a, ctx).loose_eq(&eval(b, ctx))),
        Expr::Ne(a, b) => Value::Bool(!eval(a, ctx).loose_eq(&eval(b, ctx))),
    }
}

fn call(func: Function, args: &[Expr], ctx: &ConditionContext<'_>) -> Value {
    let text_pair = || {
        (
            eval(&args[0], ctx).as_text().to_lowercase(),
            eval(&args[1], ctx).as_text().to_lowercase(),
        )
    };
    match func {
        Function::Success => Value::Bool(ctx.all_succeeded()),
        Function::Failure => Value::Bool(ctx.any_failed()),
        Function::Always => Value::Bool(true),
        Function::Contains => {
            let (haystack, needle) = text_pair();
            Value::Bool(haystack.contains(&needle))
        }
        Function::StartsWith => {
            let (text, prefix) = text_pair();
            Value::Bool(text.starts_with(&prefix))
        }
        Function::EndsWith => {
            let (text, suffix) = text_pair();
            Value::Bool(text.ends_with(&suffix))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Not,
    And,
    Or,
    Eq,
    Ne,
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        // '' inside a single-quoted string is an escaped quote
                        Some(&q) if q == quote && chars.get(i + 1) == Some(&quote) => {
                            text.push(quote);
                            i += 2;
                        }
                        Some(&q) if q == quote => {
                            i += 1;
                            break;
                        }
                        Some(&other) => {
                            text.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(format!("expected {:?}, found {:?}", expected, t)),
            None => Err(format!("expected {:?}, found end of expression", expected)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_primary()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.advance();
                let rhs = self.parse_primary()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some(Token::Ne) => {
                self.advance();
                let rhs = self.parse_primary()?;
                Ok(Expr::Ne(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => self.parse_call(&name),
                _ => self.parse_path(name),
            },
            Some(t) => Err(format!("unexpected {:?}", t)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, String> {
        let func = Function::lookup(name).ok_or_else(|| format!("unknown function '{}'", name))?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.peek() == Some(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        if args.len() != func.arity() {
            return Err(format!(
                "{}() takes {} argument(s), got {}",
                name,
                func.arity(),
                args.len()
            ));
        }
        Ok(Expr::Call(func, args))
    }

    fn parse_path(&mut self, root: String) -> Result<Expr, String> {
        let mut path = vec![root];
        while self.peek() == Some(&Token::Dot) {
            self.advance();
            match self.advance() {
                Some(Token::Ident(segment)) => path.push(segment),
                other => return Err(format!("expected property name, found {:?}", other)),
            }
        }
        Ok(Expr::Path(path))
    }
}
