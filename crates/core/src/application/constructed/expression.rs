// Expression language for compose / groups / keyed_groups
//
// A small Jinja-like subset evaluated over a host's variables:
//   literals      'str' "str" 42 1.5 true false none ['a', 'b']
//   variables     name  name.attr  name['key']  name[0]
//   operators     == != < <= > >=  in  not in  and  or  not  ~  unary -
//   tests         x is defined   x is not defined   x is undefined
//   filters       lower upper trim string length int replace(a, b) default(v) / d(v)
//
// Surrounding `{{ }}` is accepted and ignored.

use crate::domain::HostVars;
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("syntax error in {expr:?} at offset {offset}: {message}")]
    Syntax {
        expr: String,
        offset: usize,
        message: String,
    },

    #[error("undefined variable: {0}")]
    Undefined(String),

    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("type error: {0}")]
    Type(String),
}

impl ExpressionError {
    pub fn is_undefined(&self) -> bool {
        matches!(self, ExpressionError::Undefined(_))
    }
}

type EvalResult = std::result::Result<Value, ExpressionError>;

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(Number),
    Ident(String),
    Dot,
    Comma,
    Pipe,
    Tilde,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Str(s) => write!(f, "string {:?}", s),
            Token::Num(n) => write!(f, "number {}", n),
            Token::Ident(s) => write!(f, "{:?}", s),
            Token::Dot => f.write_str("'.'"),
            Token::Comma => f.write_str("','"),
            Token::Pipe => f.write_str("'|'"),
            Token::Tilde => f.write_str("'~'"),
            Token::Minus => f.write_str("'-'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Eq => f.write_str("'=='"),
            Token::Ne => f.write_str("'!='"),
            Token::Lt => f.write_str("'<'"),
            Token::Le => f.write_str("'<='"),
            Token::Gt => f.write_str("'>'"),
            Token::Ge => f.write_str("'>='"),
            Token::End => f.write_str("end of expression"),
        }
    }
}

struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            expr: self.source.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn tokenize(mut self) -> std::result::Result<Vec<(Token, usize)>, ExpressionError> {
        let mut tokens = Vec::new();

        while let Some(&(offset, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }

            let token = match c {
                '\'' | '"' => self.string(offset, c)?,
                '0'..='9' => self.number(offset)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
                _ => {
                    self.chars.next();
                    match c {
                        '.' => Token::Dot,
                        ',' => Token::Comma,
                        '|' => Token::Pipe,
                        '~' => Token::Tilde,
                        '-' => Token::Minus,
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        '=' if self.eat('=') => Token::Eq,
                        '!' if self.eat('=') => Token::Ne,
                        '<' if self.eat('=') => Token::Le,
                        '>' if self.eat('=') => Token::Ge,
                        '<' => Token::Lt,
                        '>' => Token::Gt,
                        other => {
                            return Err(self.error(offset, format!("unexpected character {:?}", other)))
                        }
                    }
                }
            };
            tokens.push((token, offset));
        }

        tokens.push((Token::End, self.source.len()));
        Ok(tokens)
    }

    fn eat(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn string(&mut self, start: usize, quote: char) -> std::result::Result<Token, ExpressionError> {
        self.chars.next();
        let mut value = String::new();

        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(Token::Str(value)),
                Some((offset, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, c @ ('\\' | '\'' | '"'))) => value.push(c),
                    Some((_, c)) => {
                        value.push('\\');
                        value.push(c);
                    }
                    None => return Err(self.error(offset, "unterminated escape")),
                },
                Some((_, c)) => value.push(c),
                None => return Err(self.error(start, "unterminated string")),
            }
        }
    }

    fn number(&mut self, start: usize) -> std::result::Result<Token, ExpressionError> {
        let mut end = start;
        let mut is_float = false;

        while let Some(&(offset, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = offset + 1;
                self.chars.next();
            } else if c == '.' && !is_float {
                // `1.x` is attribute access on a literal, not a float
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if !matches!(lookahead.peek(), Some(&(_, d)) if d.is_ascii_digit()) {
                    break;
                }
                is_float = true;
                end = offset + 1;
                self.chars.next();
            } else {
                break;
            }
        }

        let text = &self.source[start..end];
        let number = if is_float {
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
        } else {
            text.parse::<i64>().ok().map(Number::from)
        };

        number
            .map(Token::Num)
            .ok_or_else(|| self.error(start, format!("invalid number {:?}", text)))
    }

    fn ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Ident(name)
    }
}

// ============================================================================
// AST & Parser
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Var(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    In {
        item: Box<Expr>,
        container: Box<Expr>,
        negated: bool,
    },
    Concat(Box<Expr>, Box<Expr>),
    Filter {
        input: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Defined {
        expr: Box<Expr>,
        negated: bool,
    },
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let index = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[index].0
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == keyword)
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            expr: self.source.to_string(),
            offset: self.tokens[self.pos].1,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), ExpressionError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", expected, self.peek())))
        }
    }

    fn expect_ident(&mut self) -> std::result::Result<String, ExpressionError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(self.error(format!("expected a name, found {}", other))),
        }
    }

    fn parse(mut self) -> std::result::Result<Expr, ExpressionError> {
        let expr = self.parse_or()?;
        if *self.peek() != Token::End {
            return Err(self.error(format!("unexpected {}", self.peek())));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> std::result::Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.is_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.is_keyword("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> std::result::Result<Expr, ExpressionError> {
        if self.is_keyword("not") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> std::result::Result<Expr, ExpressionError> {
        let mut left = self.parse_concat()?;

        loop {
            let op = match self.peek() {
                Token::Eq => Some(CmpOp::Eq),
                Token::Ne => Some(CmpOp::Ne),
                Token::Lt => Some(CmpOp::Lt),
                Token::Le => Some(CmpOp::Le),
                Token::Gt => Some(CmpOp::Gt),
                Token::Ge => Some(CmpOp::Ge),
                _ => None,
            };

            if let Some(op) = op {
                self.advance();
                let right = self.parse_concat()?;
                left = Expr::Compare(op, Box::new(left), Box::new(right));
            } else if self.is_keyword("in") {
                self.advance();
                let container = self.parse_concat()?;
                left = Expr::In {
                    item: Box::new(left),
                    container: Box::new(container),
                    negated: false,
                };
            } else if self.is_keyword("not")
                && matches!(self.peek_at(1), Token::Ident(name) if name == "in")
            {
                self.advance();
                self.advance();
                let container = self.parse_concat()?;
                left = Expr::In {
                    item: Box::new(left),
                    container: Box::new(container),
                    negated: true,
                };
            } else if self.is_keyword("is") {
                self.advance();
                let mut negated = false;
                if self.is_keyword("not") {
                    self.advance();
                    negated = true;
                }
                match self.expect_ident()?.as_str() {
                    "defined" => {}
                    "undefined" => negated = !negated,
                    other => return Err(self.error(format!("unknown test {:?}", other))),
                }
                left = Expr::Defined {
                    expr: Box::new(left),
                    negated,
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_concat(&mut self) -> std::result::Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while *self.peek() == Token::Tilde {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> std::result::Result<Expr, ExpressionError> {
        if *self.peek() == Token::Minus {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_filtered()
    }

    fn parse_filtered(&mut self) -> std::result::Result<Expr, ExpressionError> {
        let mut expr = self.parse_postfix()?;
        while *self.peek() == Token::Pipe {
            self.advance();
            let name = self.expect_ident()?;
            let args = if *self.peek() == Token::LParen {
                self.advance();
                self.parse_list(Token::RParen)?
            } else {
                Vec::new()
            };
            expr = Expr::Filter {
                input: Box::new(expr),
                name,
                args,
            };
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> std::result::Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let attr = match self.advance() {
                        Token::Ident(name) => name,
                        Token::Num(n) => n.to_string(),
                        other => {
                            return Err(self.error(format!("expected attribute, found {}", other)))
                        }
                    };
                    expr = Expr::Attr(Box::new(expr), attr);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> std::result::Result<Expr, ExpressionError> {
        match self.advance() {
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Num(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" | "True" => Expr::Literal(Value::Bool(true)),
                "false" | "False" => Expr::Literal(Value::Bool(false)),
                "none" | "None" | "null" => Expr::Literal(Value::Null),
                _ => Expr::Var(name),
            }),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.parse_list(Token::RBracket)?)),
            other => Err(self.error(format!("unexpected {}", other))),
        }
    }

    /// Comma-separated expressions up to `close` (already past the opener)
    fn parse_list(&mut self, close: Token) -> std::result::Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        if *self.peek() == close {
            self.advance();
            return Ok(items);
        }
        loop {
            items.push(self.parse_or()?);
            if *self.peek() == Token::Comma {
                self.advance();
                if *self.peek() == close {
                    self.advance();
                    return Ok(items);
                }
            } else {
                self.expect(close)?;
                return Ok(items);
            }
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Jinja truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// String form used by `~`, `string` and group naming
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> EvalResult {
    let ordering = match op {
        CmpOp::Eq => return Ok(Value::Bool(values_equal(left, right))),
        CmpOp::Ne => return Ok(Value::Bool(!values_equal(left, right))),
        _ => match (left, right) {
            (Value::Number(a), Value::Number(b)) => a
                .as_f64()
                .zip(b.as_f64())
                .and_then(|(a, b)| a.partial_cmp(&b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };

    let ordering = ordering.ok_or_else(|| {
        ExpressionError::Type(format!(
            "cannot order {} and {}",
            render_value(left),
            render_value(right)
        ))
    })?;

    let result = match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
    };
    Ok(Value::Bool(result))
}

fn contains(container: &Value, item: &Value) -> std::result::Result<bool, ExpressionError> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Object(map) => Ok(map.contains_key(&render_value(item))),
        Value::String(haystack) => match item {
            Value::String(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(ExpressionError::Type(format!(
                "'in <string>' requires a string, got {}",
                render_value(other)
            ))),
        },
        other => Err(ExpressionError::Type(format!(
            "{} is not a container",
            render_value(other)
        ))),
    }
}

fn lookup(base: &Value, key: &Value, path: &str) -> EvalResult {
    let found = match (base, key) {
        (Value::Object(map), Value::String(k)) => map.get(k),
        (Value::Array(items), Value::Number(n)) => {
            let len = items.len() as i64;
            n.as_i64()
                .map(|i| if i < 0 { len + i } else { i })
                .filter(|i| (0..len).contains(i))
                .and_then(|i| items.get(i as usize))
        }
        _ => None,
    };
    found
        .cloned()
        .ok_or_else(|| ExpressionError::Undefined(path.to_string()))
}

fn apply_filter(name: &str, input: Value, args: &[Value]) -> EvalResult {
    match name {
        "lower" => Ok(Value::String(render_value(&input).to_lowercase())),
        "upper" => Ok(Value::String(render_value(&input).to_uppercase())),
        "trim" => Ok(Value::String(render_value(&input).trim().to_string())),
        "string" => Ok(Value::String(render_value(&input))),
        "length" | "count" => match &input {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(a) => Ok(Value::from(a.len())),
            Value::Object(o) => Ok(Value::from(o.len())),
            other => Err(ExpressionError::Type(format!(
                "{} has no length",
                render_value(other)
            ))),
        },
        "int" => {
            let parsed = match &input {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                Value::Bool(b) => Some(*b as i64),
                _ => None,
            };
            Ok(Value::from(parsed.unwrap_or(0)))
        }
        "replace" => match args {
            [from, to] => Ok(Value::String(
                render_value(&input).replace(&render_value(from), &render_value(to)),
            )),
            _ => Err(ExpressionError::Type(
                "replace expects two arguments".to_string(),
            )),
        },
        other => Err(ExpressionError::UnknownFilter(other.to_string())),
    }
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Var(name) => name.clone(),
        Expr::Attr(base, attr) => format!("{}.{}", describe(base), attr),
        Expr::Index(base, _) => format!("{}[...]", describe(base)),
        _ => "<expression>".to_string(),
    }
}

fn eval(expr: &Expr, vars: &HostVars) -> EvalResult {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, vars))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Var(name) => vars
            .get(name)
            .cloned()
            .ok_or_else(|| ExpressionError::Undefined(name.clone())),
        Expr::Attr(base, attr) => {
            let value = eval(base, vars)?;
            let key = match &value {
                Value::Array(_) => attr
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(attr.clone())),
                _ => Value::String(attr.clone()),
            };
            lookup(&value, &key, &describe(expr))
        }
        Expr::Index(base, index) => {
            let value = eval(base, vars)?;
            let key = eval(index, vars)?;
            lookup(&value, &key, &format!("{}[{}]", describe(base), render_value(&key)))
        }
        Expr::Neg(inner) => match eval(inner, vars)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i.checked_neg().map(Value::from).ok_or_else(|| {
                    ExpressionError::Type(format!("cannot negate {}: integer overflow", n))
                }),
                None => n
                    .as_f64()
                    .and_then(|f| Number::from_f64(-f))
                    .map(Value::Number)
                    .ok_or_else(|| ExpressionError::Type(format!("cannot negate {}", n))),
            },
            other => Err(ExpressionError::Type(format!(
                "cannot negate {}",
                render_value(&other)
            ))),
        },
        Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&eval(inner, vars)?))),
        Expr::And(left, right) => {
            let left = eval(left, vars)?;
            if is_truthy(&left) {
                eval(right, vars)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, vars)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                eval(right, vars)
            }
        }
        Expr::Compare(op, left, right) => {
            let left = eval(left, vars)?;
            let right = eval(right, vars)?;
            compare(*op, &left, &right)
        }
        Expr::In {
            item,
            container,
            negated,
        } => {
            let item = eval(item, vars)?;
            let container = eval(container, vars)?;
            Ok(Value::Bool(contains(&container, &item)? != *negated))
        }
        Expr::Concat(left, right) => {
            let left = eval(left, vars)?;
            let right = eval(right, vars)?;
            Ok(Value::String(render_value(&left) + &render_value(&right)))
        }
        Expr::Filter { input, name, args } if name == "default" || name == "d" => {
            let fallback = || match args.first() {
                Some(arg) => eval(arg, vars),
                None => Ok(Value::String(String::new())),
            };
            let falsy_counts = match args.get(1) {
                Some(flag) => is_truthy(&eval(flag, vars)?),
                None => false,
            };
            match eval(input, vars) {
                Ok(value) if falsy_counts && !is_truthy(&value) => fallback(),
                Ok(value) => Ok(value),
                Err(e) if e.is_undefined() => fallback(),
                Err(e) => Err(e),
            }
        }
        Expr::Filter { input, name, args } => {
            let input = eval(input, vars)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, vars))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            apply_filter(name, input, &args)
        }
        Expr::Defined { expr, negated } => match eval(expr, vars) {
            Ok(_) => Ok(Value::Bool(!*negated)),
            Err(e) if e.is_undefined() => Ok(Value::Bool(*negated)),
            Err(e) => Err(e),
        },
    }
}

/// Parsed expression, ready to evaluate against host variables
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> std::result::Result<Self, ExpressionError> {
        let trimmed = source.trim();
        let body = trimmed
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .unwrap_or(trimmed);

        let tokens = Lexer::new(body).tokenize()?;
        let ast = Parser {
            source: body,
            tokens,
            pos: 0,
        }
        .parse()?;

        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn evaluate(&self, vars: &HostVars) -> EvalResult {
        eval(&self.ast, vars)
    }

    /// Evaluate and reduce to a boolean (for conditional groups)
    pub fn evaluate_condition(&self, vars: &HostVars) -> std::result::Result<bool, ExpressionError> {
        self.evaluate(vars).map(|v| is_truthy(&v))
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Expression::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evaluate(source: &str, vars: &HostVars) -> EvalResult {
        Expression::parse(source)?.evaluate(vars)
    }

    fn context_from(value: Value) -> HostVars {
        match value {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        }
    }

    fn vars() -> HostVars {
        context_from(json!({
            "server_name": "prod-web-01",
            "group": "web",
            "public_ip_address": "203.0.113.10",
            "latitude_status": "on",
            "latitude_plan": "c2-small-x86",
            "cores": 8,
            "tags": ["a", "b"],
            "region": {"country": "Brazil", "site": {"slug": "SAO"}},
            "empty": "",
            "nothing": null
        }))
    }

    fn eval_str(source: &str) -> EvalResult {
        evaluate(source, &vars())
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval_str("'x'").unwrap(), json!("x"));
        assert_eq!(eval_str("\"a\\\"b\"").unwrap(), json!("a\"b"));
        assert_eq!(eval_str("42").unwrap(), json!(42));
        assert_eq!(eval_str("1.5").unwrap(), json!(1.5));
        assert_eq!(eval_str("-3").unwrap(), json!(-3));
        assert_eq!(eval_str("True").unwrap(), json!(true));
        assert_eq!(eval_str("none").unwrap(), json!(null));
        assert_eq!(eval_str("['a', 1,]").unwrap(), json!(["a", 1]));
    }

    #[test]
    fn test_variable_paths() {
        assert_eq!(eval_str("server_name").unwrap(), json!("prod-web-01"));
        assert_eq!(eval_str("region.country").unwrap(), json!("Brazil"));
        assert_eq!(eval_str("region['site'].slug").unwrap(), json!("SAO"));
        assert_eq!(eval_str("tags[1]").unwrap(), json!("b"));
        assert_eq!(eval_str("tags[-1]").unwrap(), json!("b"));
        assert_eq!(eval_str("tags.0").unwrap(), json!("a"));
    }

    #[test]
    fn test_undefined_variables() {
        assert_eq!(
            eval_str("missing").unwrap_err(),
            ExpressionError::Undefined("missing".to_string())
        );
        assert_eq!(
            eval_str("region.city").unwrap_err(),
            ExpressionError::Undefined("region.city".to_string())
        );
        assert!(eval_str("tags[5]").unwrap_err().is_undefined());
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval_str("group == 'web'").unwrap(), json!(true));
        assert_eq!(eval_str("group != 'web'").unwrap(), json!(false));
        assert_eq!(eval_str("cores >= 8 and cores < 16").unwrap(), json!(true));
        assert_eq!(eval_str("cores == 8.0").unwrap(), json!(true));
        assert_eq!(eval_str("not (group == 'db') or missing").unwrap(), json!(true));
        assert_eq!(eval_str("empty or 'fallback'").unwrap(), json!("fallback"));
        assert!(eval_str("cores < 'x'").is_err());
    }

    #[test]
    fn test_membership() {
        assert_eq!(eval_str("'web' in server_name").unwrap(), json!(true));
        assert_eq!(eval_str("group in ['web', 'db']").unwrap(), json!(true));
        assert_eq!(eval_str("'c' not in tags").unwrap(), json!(true));
        assert_eq!(eval_str("'country' in region").unwrap(), json!(true));
        assert!(eval_str("1 in cores").is_err());
    }

    #[test]
    fn test_negation_overflow_is_type_error() {
        assert_eq!(eval_str("-(cores)").unwrap(), json!(-8));
        let err = eval_str("-('-9223372036854775808' | int)").unwrap_err();
        assert!(matches!(err, ExpressionError::Type(_)), "unexpected error: {:?}", err);
    }

    #[test]
    fn test_concat_and_filters() {
        assert_eq!(
            eval_str("group ~ '-' ~ latitude_status | upper").unwrap(),
            json!("web-ON")
        );
        assert_eq!(eval_str("'  Pad ' | trim | lower").unwrap(), json!("pad"));
        assert_eq!(eval_str("tags | length").unwrap(), json!(2));
        assert_eq!(eval_str("'22' | int").unwrap(), json!(22));
        assert_eq!(eval_str("cores | string").unwrap(), json!("8"));
        assert_eq!(
            eval_str("latitude_plan | replace('-', '_')").unwrap(),
            json!("c2_small_x86")
        );
        assert_eq!(eval_str("nothing ~ ''").unwrap(), json!("None"));
        assert_eq!(
            eval_str("cores | bogus").unwrap_err(),
            ExpressionError::UnknownFilter("bogus".to_string())
        );
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(eval_str("missing | default('x')").unwrap(), json!("x"));
        assert_eq!(eval_str("group | d('x')").unwrap(), json!("web"));
        assert_eq!(eval_str("empty | default('x')").unwrap(), json!(""));
        assert_eq!(eval_str("empty | default('x', true)").unwrap(), json!("x"));
        assert_eq!(eval_str("region.city | default(none)").unwrap(), json!(null));
    }

    #[test]
    fn test_defined_tests() {
        assert_eq!(eval_str("group is defined").unwrap(), json!(true));
        assert_eq!(eval_str("missing is defined").unwrap(), json!(false));
        assert_eq!(eval_str("missing is not defined").unwrap(), json!(true));
        assert_eq!(eval_str("group is undefined").unwrap(), json!(false));
    }

    #[test]
    fn test_braces_are_stripped() {
        let expr = Expression::parse("{{ server_name | upper }}").unwrap();
        assert_eq!(expr.evaluate(&vars()).unwrap(), json!("PROD-WEB-01"));
        assert_eq!(expr.to_string(), "{{ server_name | upper }}");
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["", "group ==", "'open", "a b", "(a", "a | ", "x is bogus", "a = b", "a[1"] {
            let err = Expression::parse(source).unwrap_err();
            assert!(
                matches!(err, ExpressionError::Syntax { .. }),
                "{:?} gave {:?}",
                source,
                err
            );
        }
    }

    #[test]
    fn test_condition_truthiness() {
        let expr: Expression = "latitude_status == 'on'".parse().unwrap();
        assert!(expr.evaluate_condition(&vars()).unwrap());

        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!({"a": 1})));
    }
}
