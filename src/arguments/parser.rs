//! Grammar for deferred call arguments.
//!
//! ```text
//! document := object EOF
//! value    := unary (('+' | '-') unary)*
//! unary    := '-' unary | primary
//! primary  := object | array | string | number | '(' value ')'
//!           | true | false | null | True | False | None
//!           | now '(' ')' | datetime '.' (now | utcnow) '(' ')'
//!           | datetime '(' value{3..6} ')'
//!           | timedelta '(' [value [, value]] [, name '=' value]* ')'
//! object   := '{' [string ':' value (',' string ':' value)* [',']] '}'
//! array    := '[' [value (',' value)* [',']] ']'
//! ```
//!
//! Names outside this vocabulary are rejected while parsing.

use serde_json::Number;

use crate::{HuginnError, Result};

/// Keywords accepted by `timedelta(...)`, with their length in milliseconds.
pub(crate) const TIMEDELTA_UNITS: &[(&str, f64)] = &[
    ("weeks", 7.0 * 86_400_000.0),
    ("days", 86_400_000.0),
    ("hours", 3_600_000.0),
    ("minutes", 60_000.0),
    ("seconds", 1_000.0),
    ("milliseconds", 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ArgExpr {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<ArgExpr>),
    Object(Vec<(String, ArgExpr)>),
    Now,
    DateTime(Vec<ArgExpr>),
    /// Normalised to `(unit, amount)` pairs; positional arguments map to
    /// `days` then `seconds`.
    TimeDelta(Vec<(&'static str, ArgExpr)>),
    Negate(Box<ArgExpr>),
    Binary {
        op: BinaryOp,
        left: Box<ArgExpr>,
        right: Box<ArgExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    Punct(char),
    Eof,
}

fn syntax_error(pos: usize, message: impl std::fmt::Display) -> HuginnError {
    HuginnError::ArgumentResolution(format!("{message} at position {pos}"))
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let token = if c.is_ascii_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            Token::Ident(ident)
        } else if c.is_ascii_digit() {
            let mut text = String::new();
            while let Some(&(_, c)) = chars.peek() {
                let signed_exponent =
                    matches!(c, '+' | '-') && (text.ends_with('e') || text.ends_with('E'));
                if c.is_ascii_digit() || signed_exponent || matches!(c, '.' | 'e' | 'E' | '_') {
                    if c != '_' {
                        text.push(c);
                    }
                    chars.next();
                } else {
                    break;
                }
            }
            let number = if let Ok(n) = text.parse::<i64>() {
                Number::from(n)
            } else {
                text.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .ok_or_else(|| syntax_error(pos, format!("invalid number '{text}'")))?
            };
            Token::Num(number)
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    None => return Err(syntax_error(pos, "unterminated string")),
                    Some((_, ch)) if ch == c => break,
                    Some((_, '\\')) => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, other)) => text.push(other),
                        None => return Err(syntax_error(pos, "unterminated string")),
                    },
                    Some((_, ch)) => text.push(ch),
                }
            }
            Token::Str(text)
        } else if "{}[](),:+-.=".contains(c) {
            chars.next();
            Token::Punct(c)
        } else {
            return Err(syntax_error(pos, format!("unexpected character '{c}'")));
        };
        tokens.push((pos, token));
    }

    tokens.push((input.len(), Token::Eof));
    Ok(tokens)
}

/// Parse a deferred argument expression; the top level must be an object.
pub(crate) fn parse(input: &str) -> Result<ArgExpr> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        index: 0,
    };
    let (pos, first) = parser.peek().clone();
    if first != Token::Punct('{') {
        return Err(syntax_error(pos, "arguments must be a mapping"));
    }
    let root = parser.value()?;
    let (pos, trailing) = parser.peek().clone();
    if trailing != Token::Eof {
        return Err(syntax_error(pos, "unexpected trailing input"));
    }
    Ok(root)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &(usize, Token) {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> (usize, Token) {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek().1 == Token::Punct(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        let (pos, token) = self.advance();
        if token == Token::Punct(c) {
            Ok(())
        } else {
            Err(syntax_error(pos, format!("expected '{c}'")))
        }
    }

    fn value(&mut self) -> Result<ArgExpr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().1 {
                Token::Punct('+') => BinaryOp::Add,
                Token::Punct('-') => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = ArgExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn unary(&mut self) -> Result<ArgExpr> {
        if self.eat('-') {
            return Ok(ArgExpr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<ArgExpr> {
        let (pos, token) = self.advance();
        match token {
            Token::Str(s) => Ok(ArgExpr::String(s)),
            Token::Num(n) => Ok(ArgExpr::Number(n)),
            Token::Punct('{') => self.object(),
            Token::Punct('[') => {
                let items = self.sequence(']')?;
                Ok(ArgExpr::Array(items))
            }
            Token::Punct('(') => {
                let inner = self.value()?;
                self.expect(')')?;
                Ok(inner)
            }
            Token::Ident(name) => self.name(pos, &name),
            Token::Eof => Err(syntax_error(pos, "unexpected end of input")),
            Token::Punct(c) => Err(syntax_error(pos, format!("unexpected '{c}'"))),
        }
    }

    fn name(&mut self, pos: usize, name: &str) -> Result<ArgExpr> {
        match name {
            "true" | "True" => Ok(ArgExpr::Bool(true)),
            "false" | "False" => Ok(ArgExpr::Bool(false)),
            "null" | "None" => Ok(ArgExpr::Null),
            "now" => {
                self.expect('(')?;
                self.expect(')')?;
                Ok(ArgExpr::Now)
            }
            "datetime" if self.eat('.') => {
                let (method_pos, method) = self.advance();
                match method {
                    Token::Ident(m) if m == "now" || m == "utcnow" => {
                        self.expect('(')?;
                        self.expect(')')?;
                        Ok(ArgExpr::Now)
                    }
                    _ => Err(syntax_error(method_pos, "unknown name 'datetime' attribute")),
                }
            }
            "datetime" => {
                self.expect('(')?;
                let args = self.sequence(')')?;
                if !(3..=6).contains(&args.len()) {
                    return Err(syntax_error(
                        pos,
                        format!("datetime() takes 3 to 6 arguments, got {}", args.len()),
                    ));
                }
                Ok(ArgExpr::DateTime(args))
            }
            "timedelta" => {
                self.expect('(')?;
                self.timedelta(pos)
            }
            other => Err(syntax_error(pos, format!("unknown name '{other}'"))),
        }
    }

    fn timedelta(&mut self, pos: usize) -> Result<ArgExpr> {
        let mut parts: Vec<(&'static str, ArgExpr)> = Vec::new();
        let mut positional = 0;
        let positional_units = ["days", "seconds"];

        while !self.eat(')') {
            let keyword = match (&self.tokens[self.index].1, &self.peek_second()) {
                (Token::Ident(name), Token::Punct('=')) => Some(name.clone()),
                _ => None,
            };
            let unit = match keyword {
                Some(name) => {
                    let (kw_pos, _) = self.advance();
                    self.advance();
                    TIMEDELTA_UNITS
                        .iter()
                        .map(|(unit, _)| *unit)
                        .find(|unit| *unit == name)
                        .ok_or_else(|| {
                            syntax_error(kw_pos, format!("timedelta() got an unexpected keyword '{name}'"))
                        })?
                }
                None => {
                    if parts.len() > positional {
                        return Err(syntax_error(pos, "positional argument follows keyword argument"));
                    }
                    let unit = positional_units.get(positional).copied().ok_or_else(|| {
                        syntax_error(pos, "timedelta() takes at most 2 positional arguments")
                    })?;
                    positional += 1;
                    unit
                }
            };
            if parts.iter().any(|(u, _)| *u == unit) {
                return Err(syntax_error(pos, format!("timedelta() got multiple values for '{unit}'")));
            }
            parts.push((unit, self.value()?));
            if !self.eat(',') {
                self.expect(')')?;
                break;
            }
        }
        Ok(ArgExpr::TimeDelta(parts))
    }

    fn peek_second(&self) -> Token {
        self.tokens
            .get(self.index + 1)
            .map_or(Token::Eof, |(_, token)| token.clone())
    }

    /// Comma-separated values up to `close`, allowing a trailing comma.
    fn sequence(&mut self, close: char) -> Result<Vec<ArgExpr>> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.value()?);
            if !self.eat(',') {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    /// `{...}` with the opening brace consumed.
    fn object(&mut self) -> Result<ArgExpr> {
        let mut entries = Vec::new();
        while !self.eat('}') {
            let (pos, key) = self.advance();
            let Token::Str(key) = key else {
                return Err(syntax_error(pos, "mapping keys must be quoted strings"));
            };
            self.expect(':')?;
            entries.push((key, self.value()?));
            if !self.eat(',') {
                self.expect('}')?;
                break;
            }
        }
        Ok(ArgExpr::Object(entries))
    }
}
