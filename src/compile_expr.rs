use crate::error::ConfigError;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprAst {
    Identifier(String),
    Number(f64),
    Neg(Box<ExprAst>),
    Binary {
        op: BinaryOp,
        lhs: Box<ExprAst>,
        rhs: Box<ExprAst>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    #[inline]
    pub fn apply(self, lhs: f64, rhs: f64) -> Option<f64> {
        let out = match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div if rhs == 0.0 => return None,
            Self::Div => lhs / rhs,
        };
        out.is_finite().then_some(out)
    }
}

impl ExprAst {
    #[cfg(test)]
    pub(crate) fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_identifiers(&mut out);
        out
    }

    #[cfg(test)]
    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Identifier(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Number(_) => {}
            Self::Neg(expr) => expr.collect_identifiers(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_identifiers(out);
                rhs.collect_identifiers(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Eof,
}

struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
        }
    }

    fn error(&self, reason: String) -> ConfigError {
        ConfigError::ExpressionSyntax {
            expr: self.source.to_string(),
            reason,
        }
    }

    fn next_token(&mut self) -> Result<Token, ConfigError> {
        self.skip_ws();
        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };
        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' | '×' => Some(Token::Star),
            '/' | '÷' => Some(Token::Slash),
            '(' | '（' => Some(Token::LParen),
            ')' | '）' => Some(Token::RParen),
            _ => None,
        };
        if let Some(tok) = single {
            self.chars.next();
            return Ok(tok);
        }
        match ch {
            '[' => {
                self.chars.next();
                self.read_bracketed().map(Token::Ident)
            }
            c if is_ident_start(c) => Ok(Token::Ident(self.read_ident())),
            c if c.is_ascii_digit() || c == '.' => {
                let raw = self.read_number();
                let num = raw
                    .parse::<f64>()
                    .map_err(|_| self.error(format!("invalid number `{raw}`")))?;
                Ok(Token::Number(num))
            }
            other => Err(self.error(format!("unexpected character `{other}`"))),
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn read_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_ident_continue(c) {
                out.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        out
    }

    fn read_bracketed(&mut self) -> Result<String, ConfigError> {
        let mut out = String::new();
        while let Some(c) = self.chars.next() {
            if c == ']' {
                let name = out.trim().to_string();
                if name.is_empty() {
                    return Err(self.error("empty bracketed field name".to_string()));
                }
                return Ok(name);
            }
            out.push(c);
        }
        Err(self.error("unterminated `[`".to_string()))
    }

    fn read_number(&mut self) -> String {
        let mut out = String::new();
        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.chars.next();
                continue;
            }
            if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                out.push(c);
                self.chars.next();
                continue;
            }
            if (c == 'e' || c == 'E') && !seen_exp {
                seen_exp = true;
                out.push(c);
                self.chars.next();
                if let Some(&sign) = self.chars.peek() {
                    if sign == '+' || sign == '-' {
                        out.push(sign);
                        self.chars.next();
                    }
                }
                continue;
            }
            break;
        }
        out
    }
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn parse_expression(source: &str) -> Result<ExprAst, ConfigError> {
    let mut parser = Parser::new(source);
    let expr = parser.parse_add_sub()?;
    match parser.next_token()? {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected trailing token: {other:?}"))),
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            lookahead: None,
        }
    }

    fn error(&self, reason: String) -> ConfigError {
        self.lexer.error(reason)
    }

    fn next_token(&mut self) -> Result<Token, ConfigError> {
        if let Some(tok) = self.lookahead.take() {
            return Ok(tok);
        }
        self.lexer.next_token()
    }

    fn peek_token(&mut self) -> Result<&Token, ConfigError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token()?);
        }
        Ok(self.lookahead.as_ref().unwrap_or(&Token::Eof))
    }

    fn parse_add_sub(&mut self) -> Result<ExprAst, ConfigError> {
        let mut lhs = self.parse_mul_div()?;
        loop {
            let op = match self.peek_token()? {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_mul_div()?;
            lhs = ExprAst::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_mul_div(&mut self) -> Result<ExprAst, ConfigError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_token()? {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.next_token()?;
            let rhs = self.parse_unary()?;
            lhs = ExprAst::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprAst, ConfigError> {
        match self.peek_token()? {
            Token::Plus => {
                self.next_token()?;
                self.parse_unary()
            }
            Token::Minus => {
                self.next_token()?;
                let expr = self.parse_unary()?;
                Ok(ExprAst::Neg(Box::new(expr)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExprAst, ConfigError> {
        match self.next_token()? {
            Token::Ident(name) => Ok(ExprAst::Identifier(name)),
            Token::Number(value) => Ok(ExprAst::Number(value)),
            Token::LParen => {
                let expr = self.parse_add_sub()?;
                self.expect_token(Token::RParen)?;
                Ok(expr)
            }
            other => Err(self.error(format!("unexpected token: {other:?}"))),
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), ConfigError> {
        let got = self.next_token()?;
        if got == expected {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, got {got:?}")))
        }
    }
}
