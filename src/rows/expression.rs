//! Expression language used by the `calculate` transform.
//!
//! Supports numbers, quoted strings, `true`/`false`/`null`, field references
//! (bare identifiers or `[Field With Spaces]`), `+ - * / %`, unary minus and
//! parentheses. `+` concatenates when either operand is a string.

use serde_json::Value;
use thiserror::Error;

use super::value::{as_number, number_value, render};
use super::Row;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("Unterminated {0}")]
    Unterminated(&'static str),
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unexpected token {0}")]
    UnexpectedToken(String),
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    #[error("Operator '{op}' cannot be applied to {left} and {right}")]
    TypeMismatch {
        op: char,
        left: String,
        right: String,
    },
    #[error("Division by zero")]
    DivisionByZero,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Field(String),
    Op(char),
    LParen,
    RParen,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    Negate(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expr),
            Some(token) => Err(ExpressionError::UnexpectedToken(format!("{:?}", token))),
        }
    }

    pub fn evaluate(&self, row: &Row) -> Result<Value, ExpressionError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(name) => row
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownField(name.clone())),
            Expr::Negate(inner) => {
                let value = inner.evaluate(row)?;
                as_number(&value)
                    .map(|n| number_value(-n))
                    .ok_or_else(|| ExpressionError::TypeMismatch {
                        op: '-',
                        left: "nothing".to_string(),
                        right: type_name(&value).to_string(),
                    })
            }
            Expr::Binary(op, left, right) => {
                let left = left.evaluate(row)?;
                let right = right.evaluate(row)?;
                apply_binary(*op, &left, &right)
            }
        }
    }
}

fn apply_binary(op: char, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    let mismatch = || ExpressionError::TypeMismatch {
        op,
        left: type_name(left).to_string(),
        right: type_name(right).to_string(),
    };

    if op == '+' && (left.is_string() || right.is_string()) {
        if left.is_null() || right.is_null() {
            return Err(mismatch());
        }
        return Ok(Value::String(format!("{}{}", render(left), render(right))));
    }

    let (l, r) = match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(mismatch()),
    };

    let result = match op {
        '+' => l + r,
        '-' => l - r,
        '*' => l * r,
        '/' | '%' if r == 0.0 => return Err(ExpressionError::DivisionByZero),
        '/' => l / r,
        '%' => l % r,
        _ => return Err(mismatch()),
    };
    Ok(number_value(result))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ExpressionError::Unterminated("string literal")),
                        Some('\\') => {
                            if let Some(next) = chars.get(i + 1) {
                                text.push(*next);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '[' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|ch| *ch == ']')
                    .map(|offset| start + offset)
                    .ok_or(ExpressionError::Unterminated("field reference"))?;
                tokens.push(Token::Field(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ExpressionError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek_op(&self, ops: &[char]) -> Option<char> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.term()?;
        while let Some(op) = self.peek_op(&['+', '-']) {
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek_op(&['*', '/', '%']) {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek_op(&['-']).is_some() {
            self.pos += 1;
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExpressionError::UnexpectedEnd)?;
        self.pos += 1;

        match token {
            Token::Number(n) => Ok(Expr::Literal(number_value(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Field(name) => Ok(Expr::Field(name)),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Field(name),
            }),
            Token::LParen => {
                let inner = self.expression()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(other) => Err(ExpressionError::UnexpectedToken(format!("{:?}", other))),
                    None => Err(ExpressionError::Unterminated("parenthesis")),
                }
            }
            other => Err(ExpressionError::UnexpectedToken(format!("{:?}", other))),
        }
    }
}
