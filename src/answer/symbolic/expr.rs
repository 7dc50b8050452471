//! Arithmetic expressions over named variables.
//!
//! Parsing accepts the loose notation generated equations use: implicit
//! multiplication (`2x`, `3(a + b)`, `x y`), `^` and `**` as power, and
//! runs of letters such as `ab` read as a product of single letters.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;

/// Nesting limit for parenthesised and unary sub-expressions.
const MAX_DEPTH: usize = 200;

/// Token limit per expression. Operator chains build trees as deep as they
/// are long, and evaluation recurses through them.
const MAX_TOKENS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("malformed number '{0}'")]
    BadNumber(String),

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expression nested too deeply")]
    TooDeep,

    #[error("expression longer than {MAX_TOKENS} tokens")]
    TooLong,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Ident(name) => write!(f, "'{name}'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::Caret => f.write_str("'^'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::BadNumber(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_')
                {
                    i += 1;
                }
                let name: String = chars[start..i].iter().map(|&(_, c)| c).collect();
                push_identifier(&mut tokens, name);
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1).is_some_and(|&(_, n)| n == '*') {
                    tokens.push(Token::Caret);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
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
            other => return Err(ParseError::UnexpectedChar(other, offset)),
        }
    }

    Ok(tokens)
}

/// Letter-only names longer than one character split into single letters.
fn push_identifier(tokens: &mut Vec<Token>, name: String) {
    if name.len() > 1 && name.chars().all(|c| c.is_ascii_alphabetic()) {
        tokens.extend(name.chars().map(|c| Token::Ident(c.to_string())));
    } else {
        tokens.push(Token::Ident(name));
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
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

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        Ok(())
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    BinOp::Mul
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    BinOp::Div
                }
                // Juxtaposition is multiplication.
                Some(Token::Num(_) | Token::Ident(_) | Token::LParen) => BinOp::Mul,
                _ => return Ok(lhs),
            };
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.descend()?;
                let inner = self.unary();
                self.depth -= 1;
                inner
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            self.descend()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.sum()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ParseError::UnexpectedToken(other.to_string())),
                    None => Err(ParseError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ParseError::UnexpectedToken(other.to_string())),
            None => Err(ParseError::UnexpectedEnd),
        }
    }
}

impl Expr {
    /// Parse an expression.
    pub fn parse(src: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(ParseError::Empty);
        }
        if tokens.len() > MAX_TOKENS {
            return Err(ParseError::TooLong);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.sum()?;
        match parser.next() {
            None => Ok(expr),
            Some(extra) => Err(ParseError::UnexpectedToken(extra.to_string())),
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `lhs - (rhs)`: the residual form of `lhs = rhs`.
    pub fn residual(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Sub, lhs, rhs)
    }

    /// Names of all variables in the expression.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                vars.insert(name.clone());
            }
            Expr::Neg(inner) => inner.collect_variables(vars),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(vars);
                rhs.collect_variables(vars);
            }
        }
    }

    /// Evaluate with the given bindings.
    ///
    /// `None` when a variable is unbound or the value is not finite.
    pub fn eval(&self, env: &HashMap<String, f64>) -> Option<f64> {
        let value = match self {
            Expr::Num(n) => *n,
            Expr::Var(name) => *env.get(name)?,
            Expr::Neg(inner) => -inner.eval(env)?,
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval(env)?;
                let b = rhs.eval(env)?;
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
        };
        value.is_finite().then_some(value)
    }

    /// Value of a closed-form expression.
    pub fn constant(&self) -> Option<f64> {
        self.eval(&HashMap::new())
    }
}
