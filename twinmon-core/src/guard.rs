//! Guard expression evaluation.
//!
//! Guards are boolean expressions over named fields of a [`Fields`] source,
//! either a single [`SensorEvent`](crate::SensorEvent) or the whole
//! [`HouseState`](crate::HouseState). The expression language supports:
//!
//! - `event.sensor` - field access (truthy check)
//! - `house.kitchen."".pir.motion` - nested path, quoted segments may be empty
//! - `event.state == value` - equality (strings, numbers, booleans, null)
//! - `event.state != value` - inequality
//! - `event.state > value` - greater than (numbers)
//! - `event.state >= value` - greater or equal (numbers)
//! - `event.state < value` - less than (numbers)
//! - `event.state <= value` - less or equal (numbers)
//! - `!expr` - logical NOT
//! - `expr && expr` - logical AND (higher precedence than OR)
//! - `expr || expr` - logical OR
//! - `(expr)` - grouping for precedence control
//!
//! A comparison whose field cannot be resolved is false. Numeric comparisons
//! accept numeric strings, since recorded datasets often carry readings such
//! as `"21.5"` as text.
//!
//! Examples:
//! - `event.sensor == "motion" && event.state == "ON"`
//! - `event.sensor == "luminosity" && event.state < 30`
//! - `!(house.hall."".pir.motion == "ON" && house.hall."".lux.level < 10)`

use crate::error::CoreError;
use serde_json::Value;
use std::fmt;

/// Source of named fields a guard can read.
pub trait Fields {
    /// Resolves a field path (root segment included), `None` when absent.
    fn field(&self, path: &[String]) -> Option<Value>;
}

/// A dotted field path such as `event.state` or `house.hall."".pir.motion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// The first segment, which names the field source (`event`, `house`).
    pub fn root(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            if !segment.is_empty() && segment.chars().all(is_ident_char) {
                f.write_str(segment)?;
            } else {
                write!(f, "\"{}\"", segment)?;
            }
        }
        Ok(())
    }
}

/// A parsed guard expression.
#[derive(Debug, Clone)]
pub enum GuardExpr {
    /// Field is truthy.
    Truthy(FieldPath),
    /// Equality comparison.
    Eq(FieldPath, Value),
    /// Inequality comparison.
    Ne(FieldPath, Value),
    /// Greater than.
    Gt(FieldPath, f64),
    /// Greater or equal.
    Ge(FieldPath, f64),
    /// Less than.
    Lt(FieldPath, f64),
    /// Less or equal.
    Le(FieldPath, f64),
    /// Logical AND.
    And(Box<GuardExpr>, Box<GuardExpr>),
    /// Logical OR.
    Or(Box<GuardExpr>, Box<GuardExpr>),
    /// Logical NOT.
    Not(Box<GuardExpr>),
}

impl GuardExpr {
    /// Parses a guard expression from a string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::InvalidGuard {
                reason: "empty guard expression".to_string(),
            });
        }

        let mut parser = Parser::new(s);
        let expr = parser.parse_expr()?;
        parser.skip_whitespace();
        if parser.pos < s.len() {
            return Err(CoreError::InvalidGuard {
                reason: format!("unexpected input at offset {}: '{}'", parser.pos, parser.rest()),
            });
        }
        Ok(expr)
    }

    /// Parses a guard and checks that every field it reads is rooted at `root`.
    pub fn parse_rooted(s: &str, root: &str) -> Result<Self, CoreError> {
        let expr = Self::parse(s)?;
        if let Some(field) = expr.fields().into_iter().find(|f| f.root() != root) {
            return Err(CoreError::InvalidGuard {
                reason: format!("field '{}' must start with '{}.'", field, root),
            });
        }
        Ok(expr)
    }

    /// Evaluates the guard against a field source.
    pub fn evaluate<F: Fields + ?Sized>(&self, source: &F) -> bool {
        match self {
            GuardExpr::Truthy(field) => source
                .field(field.segments())
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            GuardExpr::Eq(field, expected) => source
                .field(field.segments())
                .map(|v| values_equal(&v, expected))
                .unwrap_or(false),
            GuardExpr::Ne(field, expected) => source
                .field(field.segments())
                .map(|v| !values_equal(&v, expected))
                .unwrap_or(false),
            GuardExpr::Gt(field, expected) => compare(source, field, |v| v > *expected),
            GuardExpr::Ge(field, expected) => compare(source, field, |v| v >= *expected),
            GuardExpr::Lt(field, expected) => compare(source, field, |v| v < *expected),
            GuardExpr::Le(field, expected) => compare(source, field, |v| v <= *expected),
            GuardExpr::And(left, right) => left.evaluate(source) && right.evaluate(source),
            GuardExpr::Or(left, right) => left.evaluate(source) || right.evaluate(source),
            GuardExpr::Not(inner) => !inner.evaluate(source),
        }
    }

    /// Returns every field path referenced by the expression.
    pub fn fields(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            GuardExpr::Truthy(f)
            | GuardExpr::Eq(f, _)
            | GuardExpr::Ne(f, _)
            | GuardExpr::Gt(f, _)
            | GuardExpr::Ge(f, _)
            | GuardExpr::Lt(f, _)
            | GuardExpr::Le(f, _) => out.push(f),
            GuardExpr::And(l, r) | GuardExpr::Or(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
            GuardExpr::Not(inner) => inner.collect_fields(out),
        }
    }
}

fn compare<F, P>(source: &F, field: &FieldPath, pred: P) -> bool
where
    F: Fields + ?Sized,
    P: Fn(f64) -> bool,
{
    source
        .field(field.segments())
        .and_then(|v| as_f64(&v))
        .map(pred)
        .unwrap_or(false)
}

/// Descends into nested objects of `value` along `rest`.
pub(crate) fn descend(value: &Value, rest: &[String]) -> Option<Value> {
    let mut current = value;
    for part in rest {
        match current {
            Value::Object(map) => current = map.get(part)?,
            _ => return None,
        }
    }
    Some(current.clone())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
            if as_f64(a).is_some() && as_f64(b).is_some() =>
        {
            as_f64(a)
                .zip(as_f64(b))
                .map(|(a, b)| (a - b).abs() < f64::EPSILON)
                .unwrap_or(false)
        }
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Simple recursive descent parser for guard expressions.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_expr(&mut self) -> Result<GuardExpr, CoreError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<GuardExpr, CoreError> {
        let mut left = self.parse_and()?;
        self.skip_whitespace();

        while self.peek_str("||") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_and()?;
            left = GuardExpr::Or(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<GuardExpr, CoreError> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();

        while self.peek_str("&&") {
            self.pos += 2;
            self.skip_whitespace();
            let right = self.parse_unary()?;
            left = GuardExpr::And(Box::new(left), Box::new(right));
            self.skip_whitespace();
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<GuardExpr, CoreError> {
        self.skip_whitespace();

        if self.peek_char() == Some('!') {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_unary()?;
            return Ok(GuardExpr::Not(Box::new(inner)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<GuardExpr, CoreError> {
        self.skip_whitespace();

        if self.peek_char() == Some('(') {
            self.pos += 1;
            let expr = self.parse_expr()?;
            self.skip_whitespace();
            if self.peek_char() != Some(')') {
                return Err(CoreError::InvalidGuard {
                    reason: "expected ')'".to_string(),
                });
            }
            self.pos += 1;
            return Ok(expr);
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<GuardExpr, CoreError> {
        self.skip_whitespace();
        let field = self.parse_field()?;
        self.skip_whitespace();

        if self.peek_str("==") {
            self.pos += 2;
            let value = self.parse_value()?;
            return Ok(GuardExpr::Eq(field, value));
        }

        if self.peek_str("!=") {
            self.pos += 2;
            let value = self.parse_value()?;
            return Ok(GuardExpr::Ne(field, value));
        }

        if self.peek_str(">=") {
            self.pos += 2;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Ge(field, num));
        }

        if self.peek_str("<=") {
            self.pos += 2;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Le(field, num));
        }

        if self.peek_char() == Some('>') {
            self.pos += 1;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Gt(field, num));
        }

        if self.peek_char() == Some('<') {
            self.pos += 1;
            let num = self.parse_number()?;
            return Ok(GuardExpr::Lt(field, num));
        }

        Ok(GuardExpr::Truthy(field))
    }

    fn parse_field(&mut self) -> Result<FieldPath, CoreError> {
        let mut segments = vec![self.parse_ident()?];

        while self.peek_char() == Some('.') {
            self.pos += 1;
            let segment = if self.peek_char() == Some('"') {
                self.parse_quoted()?
            } else {
                self.parse_ident()?
            };
            segments.push(segment);
        }

        if segments.len() < 2 {
            return Err(CoreError::InvalidGuard {
                reason: format!("field '{}' needs a source prefix", segments[0]),
            });
        }

        Ok(FieldPath(segments))
    }

    fn parse_ident(&mut self) -> Result<String, CoreError> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if is_ident_char(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(CoreError::InvalidGuard {
                reason: format!("expected field name at offset {}", start),
            });
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_value(&mut self) -> Result<Value, CoreError> {
        self.skip_whitespace();
        let rest = self.rest();

        if rest.starts_with("true") {
            self.pos += 4;
            return Ok(Value::Bool(true));
        }
        if rest.starts_with("false") {
            self.pos += 5;
            return Ok(Value::Bool(false));
        }
        if rest.starts_with("null") {
            self.pos += 4;
            return Ok(Value::Null);
        }

        if rest.starts_with('"') {
            return self.parse_quoted().map(Value::String);
        }

        let num = self.parse_number()?;
        serde_json::Number::from_f64(num)
            .map(Value::Number)
            .ok_or_else(|| CoreError::InvalidGuard {
                reason: format!("number out of range: {}", num),
            })
    }

    fn parse_quoted(&mut self) -> Result<String, CoreError> {
        if self.peek_char() != Some('"') {
            return Err(CoreError::InvalidGuard {
                reason: "expected string".to_string(),
            });
        }
        self.pos += 1;

        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
            match c {
                '"' => return Ok(out),
                '\\' => {
                    if let Some(escaped) = self.peek_char() {
                        self.pos += escaped.len_utf8();
                        out.push(escaped);
                    }
                }
                _ => out.push(c),
            }
        }

        Err(CoreError::InvalidGuard {
            reason: "unterminated string".to_string(),
        })
    }

    fn parse_number(&mut self) -> Result<f64, CoreError> {
        self.skip_whitespace();
        let start = self.pos;

        if self.peek_char() == Some('-') {
            self.pos += 1;
        }

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.peek_char() == Some('.') {
            self.pos += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| CoreError::InvalidGuard {
            reason: format!("invalid number: '{}'", num_str),
        })
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }
}

impl Fields for Value {
    fn field(&self, path: &[String]) -> Option<Value> {
        descend(self, path.get(1..).unwrap_or(&[]))
    }
}
