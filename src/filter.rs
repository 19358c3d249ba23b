//! Test case filter expressions.
//!
//! A filter selects test cases by the named parameters on the first line of
//! their input file, e.g. `N >= 50 && (M < 10 || !(K == 3))`.
//!
//! Expressions are compiled once into a tree of composable predicates and then
//! evaluated against every case.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?P<num>-?\d+(?:\.\d+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|(?P<op>&&|\|\||==|!=|<=|>=|<|>|!|\(|\)))")
        .expect("Failed to compile filter token pattern")
});

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unexpected character at offset {0} in filter")]
    InvalidCharacter(usize),

    #[error("Unexpected token `{0}` in filter")]
    UnexpectedToken(String),

    #[error("Filter ended unexpectedly")]
    UnexpectedEnd,

    #[error("Unknown field `{0}` in filter")]
    UnknownField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            _ => return None,
        })
    }

    fn apply(self, a: f64, b: f64) -> bool {
        match self {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Number(f64),
}

impl Operand {
    fn value(&self, params: &HashMap<&str, f64>) -> Option<f64> {
        match self {
            Operand::Field(name) => params.get(name.as_str()).copied(),
            Operand::Number(n) => Some(*n),
        }
    }
}

/// Compiled filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare(Operand, CmpOp, Operand),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let tokens = tokenize(expr)?;
        let mut parser = Parser { tokens, pos: 0 };
        let filter = parser.or_expr()?;
        match parser.peek() {
            Some(extra) => Err(FilterError::UnexpectedToken(extra.to_string())),
            None => Ok(filter),
        }
    }

    /// Fail if the expression names a field outside `known`.
    pub fn check_fields(&self, known: &[String]) -> Result<(), FilterError> {
        match self {
            Filter::Compare(a, _, b) => {
                for operand in [a, b] {
                    if let Operand::Field(name) = operand {
                        if !known.iter().any(|k| k == name) {
                            return Err(FilterError::UnknownField(name.clone()));
                        }
                    }
                }
                Ok(())
            }
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.check_fields(known)?;
                b.check_fields(known)
            }
            Filter::Not(inner) => inner.check_fields(known),
        }
    }

    /// Evaluate against numeric parameters. A comparison on a missing value is false.
    pub fn matches(&self, params: &HashMap<&str, f64>) -> bool {
        match self {
            Filter::Compare(a, op, b) => match (a.value(params), b.value(params)) {
                (Some(a), Some(b)) => op.apply(a, b),
                _ => false,
            },
            Filter::And(a, b) => a.matches(params) && b.matches(params),
            Filter::Or(a, b) => a.matches(params) || b.matches(params),
            Filter::Not(inner) => !inner.matches(params),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) | Token::Op(s) => write!(f, "{}", s),
        }
    }
}

fn tokenize(expr: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    while !expr[offset..].trim().is_empty() {
        let caps = TOKEN
            .captures(&expr[offset..])
            .ok_or_else(|| FilterError::InvalidCharacter(offset + leading_space(&expr[offset..])))?;
        if let Some(num) = caps.name("num") {
            let value = num
                .as_str()
                .parse()
                .map_err(|_| FilterError::UnexpectedToken(num.as_str().to_string()))?;
            tokens.push(Token::Number(value));
        } else if let Some(ident) = caps.name("ident") {
            tokens.push(Token::Ident(ident.as_str().to_string()));
        } else if let Some(op) = caps.name("op") {
            tokens.push(Token::Op(op.as_str().to_string()));
        }
        offset += caps.get(0).map_or(0, |m| m.end());
    }
    Ok(tokens)
}

fn leading_space(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Filter, FilterError> {
        let mut left = self.and_expr()?;
        while self.eat_op("||") {
            left = Filter::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Filter, FilterError> {
        let mut left = self.unary()?;
        while self.eat_op("&&") {
            left = Filter::And(Box::new(left), Box::new(self.unary()?));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Filter, FilterError> {
        if self.eat_op("!") {
            return Ok(Filter::Not(Box::new(self.unary()?)));
        }
        if self.eat_op("(") {
            let inner = self.or_expr()?;
            if !self.eat_op(")") {
                return Err(match self.peek() {
                    Some(t) => FilterError::UnexpectedToken(t.to_string()),
                    None => FilterError::UnexpectedEnd,
                });
            }
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Filter, FilterError> {
        let left = self.operand()?;
        let op = match self.next() {
            Some(Token::Op(op)) => CmpOp::from_token(&op).ok_or(FilterError::UnexpectedToken(op))?,
            Some(other) => return Err(FilterError::UnexpectedToken(other.to_string())),
            None => return Err(FilterError::UnexpectedEnd),
        };
        let right = self.operand()?;
        Ok(Filter::Compare(left, op, right))
    }

    fn operand(&mut self) -> Result<Operand, FilterError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Operand::Number(n)),
            Some(Token::Ident(name)) => Ok(Operand::Field(name)),
            Some(other) => Err(FilterError::UnexpectedToken(other.to_string())),
            None => Err(FilterError::UnexpectedEnd),
        }
    }
}
