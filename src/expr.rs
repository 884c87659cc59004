//! Tokenizer and parser for test/value expressions.

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::value::Value;
use std::collections::VecDeque;

/// Functions callable without a receiver. `asList` and `of` exist so that
/// `@java.util.Arrays@asList(1, 2)` style sources keep working.
pub const FUNCTIONS: &[&str] = &["list", "asList", "of"];

pub const METHODS: &[&str] = &[
    "size",
    "length",
    "isEmpty",
    "trim",
    "toUpperCase",
    "toLowerCase",
    "contains",
    "containsKey",
    "startsWith",
    "endsWith",
    "equals",
    "get",
];

/// Syntax error inside an expression; `offset` is relative to the
/// expression source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprError {
    pub message: String,
    pub offset: usize,
}

impl ExprError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,

    // Symbols
    EqEq,     // == / eq
    NotEq,    // != / neq
    Lt,       // < / lt
    Le,       // <= / lte
    Gt,       // > / gt
    Ge,       // >= / gte
    Bang,     // !
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Question, // ?
    Colon,    // :
    Dot,      // .
    Comma,    // ,
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    // Data
    Ident(String),
    StaticCall(String), // @pkg.Class@method
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    /// Next token and its starting offset, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<(Token, usize)>, ExprError> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let start = self.cursor;
        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        const PAIRS: &[(&str, Token)] = &[
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::Le),
            (">=", Token::Ge),
            ("&&", Token::And),
            ("||", Token::Or),
        ];
        for (symbol, token) in PAIRS {
            if rest.starts_with(*symbol) {
                self.advance(2);
                return Ok(Some((token.clone(), start)));
            }
        }

        let single = match first {
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Bang),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '?' => Some(Token::Question),
            ':' => Some(Token::Colon),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            _ => None,
        };
        if let Some(token) = single {
            self.advance(1);
            return Ok(Some((token, start)));
        }

        if first == '\'' || first == '"' {
            return self.string(first, start).map(|s| Some((Token::Str(s), start)));
        }

        if first.is_ascii_digit() {
            return self.number(start).map(|t| Some((t, start)));
        }

        if first == '@' {
            return self.static_call(start).map(|t| Some((t, start)));
        }

        if first.is_alphabetic() || first == '_' || first == '$' {
            let ident = take_ident(rest);
            self.advance(ident.len());
            let token = match ident {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "eq" => Token::EqEq,
                "neq" => Token::NotEq,
                "lt" => Token::Lt,
                "lte" => Token::Le,
                "gt" => Token::Gt,
                "gte" => Token::Ge,
                _ => Token::Ident(ident.to_string()),
            };
            return Ok(Some((token, start)));
        }

        Err(ExprError::new(format!("unexpected character `{first}`"), start))
    }

    fn string(&mut self, quote: char, start: usize) -> Result<String, ExprError> {
        let mut out = String::new();
        let mut chars = self.remaining()[1..].char_indices();
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + 2);
                return Ok(out);
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, esc)) => out.push(esc),
                    None => break,
                }
            } else {
                out.push(c);
            }
        }
        Err(ExprError::new("unterminated string literal", start))
    }

    fn number(&mut self, start: usize) -> Result<Token, ExprError> {
        let rest = self.remaining();
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let mut len = int_len;
        let bytes = rest.as_bytes();
        let is_decimal = bytes.get(int_len) == Some(&b'.')
            && bytes.get(int_len + 1).is_some_and(u8::is_ascii_digit);
        if is_decimal {
            len += 1 + rest[int_len + 1..]
                .bytes()
                .take_while(u8::is_ascii_digit)
                .count();
        }
        let text = &rest[..len];
        self.advance(len);
        // Java-style long suffix
        if self.remaining().starts_with(['L', 'l']) {
            self.advance(1);
        }
        if is_decimal {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ExprError::new(format!("invalid number `{text}`"), start))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ExprError::new(format!("integer `{text}` is out of range"), start))
        }
    }

    fn static_call(&mut self, start: usize) -> Result<Token, ExprError> {
        let rest = &self.remaining()[1..];
        let Some(class_end) = rest.find('@') else {
            return Err(ExprError::new("unterminated static reference", start));
        };
        let class = &rest[..class_end];
        if class.is_empty()
            || !class
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.'))
        {
            return Err(ExprError::new(format!("invalid class name `{class}`"), start));
        }
        let method = take_ident(&rest[class_end + 1..]);
        if method.is_empty() {
            return Err(ExprError::new("expected method name after static reference", start));
        }
        self.advance(1 + class_end + 1 + method.len());
        Ok(Token::StaticCall(method.to_string()))
    }
}

fn take_ident(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_' || *c == '$'))
        .map_or(s.len(), |(idx, _)| idx);
    &s[..end]
}

pub struct Parser<'a> {
    lexer: Tokenizer<'a>,
    buffer: VecDeque<(Token, usize)>,
    len: usize,
}

/// Parse a complete expression.
pub fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(source);
    let expr = parser.parse_expr()?;
    match parser.consume()? {
        None => Ok(expr),
        Some((token, offset)) => Err(ExprError::new(
            format!("unexpected {token:?} after expression"),
            offset,
        )),
    }
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            lexer: Tokenizer::new(input),
            buffer: VecDeque::new(),
            len: input.len(),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, ExprError> {
        if self.buffer.is_empty() {
            if let Some(token) = self.lexer.next_token()? {
                self.buffer.push_back(token);
            }
        }
        Ok(self.buffer.front().map(|(token, _)| token))
    }

    fn consume(&mut self) -> Result<Option<(Token, usize)>, ExprError> {
        match self.buffer.pop_front() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.consume()? {
            Some((t, _)) if t == token => Ok(()),
            Some((t, offset)) => Err(ExprError::new(
                format!("expected {token:?}, got {t:?}"),
                offset,
            )),
            None => Err(ExprError::new(
                format!("expected {token:?}, got end of expression"),
                self.len,
            )),
        }
    }

    fn eat(&mut self, token: &Token) -> Result<bool, ExprError> {
        if self.peek()? == Some(token) {
            self.consume()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_or()?;
        if self.eat(&Token::Question)? {
            let then = self.parse_ternary()?;
            self.expect(Token::Colon)?;
            let otherwise = self.parse_ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or)? {
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_eq()?;
        while self.eat(&Token::And)? {
            let rhs = self.parse_eq()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_eq(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_rel()?;
        loop {
            let op = match self.peek()? {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_rel()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek()? {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                Some(Token::In) => BinOp::In,
                Some(Token::Not) => BinOp::NotIn,
                _ => break,
            };
            self.consume()?;
            if op == BinOp::NotIn {
                self.expect(Token::In)?;
            }
            let rhs = self.parse_add()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek()? {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek()? {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.consume()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek()? {
            Some(Token::Bang | Token::Not) => {
                self.consume()?;
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            Some(Token::Minus) => {
                self.consume()?;
                let operand = self.parse_unary()?;
                Ok(match operand {
                    Expr::Literal(Value::Int(i)) => Expr::Literal(Value::Int(-i)),
                    Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                    other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_args(&mut self, close: Token) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.eat(&close)? {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Token::Comma)? {
                continue;
            }
            self.expect(close)?;
            return Ok(args);
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;

        // Suffixes: .field, .method(..), [index]
        loop {
            match self.peek()? {
                Some(Token::Dot) => {
                    self.consume()?;
                    let name = match self.consume()? {
                        Some((Token::Ident(name), _)) => name,
                        Some((t, offset)) => {
                            return Err(ExprError::new(
                                format!("expected identifier after dot, got {t:?}"),
                                offset,
                            ))
                        }
                        None => {
                            return Err(ExprError::new(
                                "expected identifier after dot",
                                self.len,
                            ))
                        }
                    };
                    if self.peek()? == Some(&Token::LParen) {
                        let (_, offset) = self.consume()?.unwrap_or((Token::LParen, self.len));
                        if !METHODS.contains(&name.as_str()) {
                            return Err(ExprError::new(format!("unknown method `{name}`"), offset));
                        }
                        let args = self.parse_args(Token::RParen)?;
                        expr = Expr::Method(Box::new(expr), name, args);
                    } else {
                        expr = Expr::Field(Box::new(expr), name);
                    }
                }
                Some(Token::LBracket) => {
                    self.consume()?;
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let (token, offset) = match self.consume()? {
            Some(token) => token,
            None => return Err(ExprError::new("expected expression", self.len)),
        };
        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::List(self.parse_args(Token::RBracket)?)),
            Token::LBrace => Ok(Expr::List(self.parse_args(Token::RBrace)?)),
            Token::StaticCall(name) => self.call(name, offset),
            Token::Ident(name) => {
                if self.peek()? == Some(&Token::LParen) {
                    return self.call(name, offset);
                }
                Ok(Expr::Var(name))
            }
            t => Err(ExprError::new(format!("expected expression, got {t:?}"), offset)),
        }
    }

    fn call(&mut self, name: String, offset: usize) -> Result<Expr, ExprError> {
        if !FUNCTIONS.contains(&name.as_str()) {
            return Err(ExprError::new(format!("unknown function `{name}`"), offset));
        }
        self.expect(Token::LParen)?;
        let args = self.parse_args(Token::RParen)?;
        Ok(Expr::Call(name, args))
    }
}
