//! Arithmetic conversion expressions.
//!
//! Register conversions are configured as small formulas over a single bound name, `value`,
//! for example `value * 0.1` or `(value - 32) / 1.8`. The grammar only knows numeric literals,
//! `value`, the four basic operators, unary signs and parentheses:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := NUMBER | 'value' | '(' expr ')'
//! ```
//!
//! Anything else (other identifiers, calls, member access) is rejected while parsing, so a
//! parsed [`Expression`] can only ever do arithmetic on its input. Expressions come from loaded
//! configuration, so both the number of tokens and the nesting depth are bounded.

use thiserror::Error;

use crate::value::VariableKind;

/// The only identifier an expression may reference.
pub const BOUND_NAME: &str = "value";
/// Maximum number of tokens in one expression.
pub const MAX_TOKENS: usize = 128;
/// Maximum nesting of parentheses and unary signs.
pub const MAX_DEPTH: usize = 32;

/// Why an expression could not be parsed or evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("unknown identifier \"{0}\", only \"value\" is allowed")]
    UnknownIdentifier(String),
    #[error("invalid number \"{0}\"")]
    InvalidNumber(String),
    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: &'static str, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expression has more than {} tokens", MAX_TOKENS)]
    TooLong,
    #[error("expression nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("a {0} value can not be used in arithmetic")]
    NonNumericInput(VariableKind),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Value,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(self) -> &'static str {
        match self {
            Token::Number(_) => "number",
            Token::Value => "\"value\"",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::LParen => "'('",
            Token::RParen => "')'",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Spanned {
    token: Token,
    position: usize,
}

type Tokens = heapless::Vec<Spanned, MAX_TOKENS>;

fn tokenize(src: &str) -> Result<Tokens, EvalError> {
    let bytes = src.as_bytes();
    let mut tokens = Tokens::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos];
        let token = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'0'..=b'9' | b'.' => {
                pos = scan_number(bytes, pos);
                let literal = &src[start..pos];
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| EvalError::InvalidNumber(literal.to_owned()))?;
                push(&mut tokens, Token::Number(number), start)?;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                let ident = &src[start..pos];
                if ident != BOUND_NAME {
                    return Err(EvalError::UnknownIdentifier(ident.to_owned()));
                }
                push(&mut tokens, Token::Value, start)?;
                continue;
            }
            _ => {
                // Report the whole (possibly multi-byte) character.
                let ch = src[start..].chars().next().unwrap_or('?');
                return Err(EvalError::UnexpectedCharacter { ch, position: start });
            }
        };
        push(&mut tokens, token, start)?;
        pos += 1;
    }

    if tokens.is_empty() {
        return Err(EvalError::Empty);
    }
    Ok(tokens)
}

fn push(tokens: &mut Tokens, token: Token, position: usize) -> Result<(), EvalError> {
    tokens
        .push(Spanned { token, position })
        .map_err(|_| EvalError::TooLong)
}

/// Scan `digits [. digits] [e [+-] digits]` starting at `pos`, returning the end offset.
fn scan_number(bytes: &[u8], mut pos: usize) -> usize {
    let digits = |mut p: usize| {
        while p < bytes.len() && bytes[p].is_ascii_digit() {
            p += 1;
        }
        p
    };

    pos = digits(pos);
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos = digits(pos + 1);
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        // Only part of the literal if digits follow; otherwise `2e` is left for the caller to reject.
        let end = digits(exp);
        if end > exp {
            pos = end;
        }
    }
    pos
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Value,
    Negate(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
}

struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|s| s.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> EvalError {
        match self.tokens.get(self.pos) {
            Some(s) => EvalError::UnexpectedToken {
                found: s.token.describe(),
                position: s.position,
            },
            None => EvalError::UnexpectedEnd,
        }
    }

    fn descend(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Node, EvalError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Node, EvalError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Node::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Node, EvalError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.advance();
                self.descend()?;
                let node = self.unary();
                self.depth -= 1;
                node
            }
            Some(Token::Minus) => {
                self.advance();
                self.descend()?;
                let node = self.unary().map(|n| Node::Negate(Box::new(n)));
                self.depth -= 1;
                node
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node, EvalError> {
        match self.peek() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Node::Number(n))
            }
            Some(Token::Value) => {
                self.advance();
                Ok(Node::Value)
            }
            Some(Token::LParen) => {
                self.advance();
                self.descend()?;
                let node = self.expr()?;
                if self.peek() != Some(Token::RParen) {
                    return Err(self.unexpected());
                }
                self.advance();
                self.depth -= 1;
                Ok(node)
            }
            _ => Err(self.unexpected()),
        }
    }
}

impl Node {
    fn eval(&self, value: f64) -> Result<f64, EvalError> {
        match self {
            Node::Number(n) => Ok(*n),
            Node::Value => Ok(value),
            Node::Negate(inner) => Ok(-inner.eval(value)?),
            Node::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(value)?;
                let rhs = rhs.eval(value)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div if rhs == 0.0 => Err(EvalError::DivisionByZero),
                    BinaryOp::Div => Ok(lhs / rhs),
                }
            }
        }
    }
}

/// A parsed conversion expression, ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse `source`, rejecting anything outside the arithmetic grammar.
    pub fn parse(source: &str) -> Result<Self, EvalError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(parser.unexpected());
        }
        Ok(Self {
            source: source.to_owned(),
            root,
        })
    }

    /// Evaluate with `value` bound to the given input.
    pub fn eval(&self, value: f64) -> Result<f64, EvalError> {
        let result = self.root.eval(value)?;
        if !result.is_finite() {
            return Err(EvalError::NonFinite);
        }
        Ok(result)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl core::str::FromStr for Expression {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse and evaluate `expression` against a single input.
pub fn evaluate(expression: &str, value: f64) -> Result<f64, EvalError> {
    Expression::parse(expression)?.eval(value)
}
