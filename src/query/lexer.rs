//! Tokenizer for search expressions.

use serde_json::Value;

use super::QueryError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Identifier(String),
    QuotedIdentifier(String),
    Literal(Value),
    Number(i64),
    Dot,
    Star,
    /// `[]`
    Flatten,
    /// `[?`
    Filter,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Pipe,
    Or,
    And,
    Not,
    Current,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Eof,
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub pos: usize,
    pub token: Token,
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

/// Split an expression into tokens, terminated by [`Token::Eof`].
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Identifier(ident)
            }
            '0'..='9' | '-' => {
                chars.next();
                let mut digits = String::from(c);
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = digits
                    .parse::<i64>()
                    .map_err(|_| QueryError::at(pos, format!("invalid number '{digits}'")))?;
                Token::Number(n)
            }
            '[' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, ']')) => {
                        chars.next();
                        Token::Flatten
                    }
                    Some(&(_, '?')) => {
                        chars.next();
                        Token::Filter
                    }
                    _ => Token::LBracket,
                }
            }
            '|' => {
                chars.next();
                if eat(&mut chars, '|') {
                    Token::Or
                } else {
                    Token::Pipe
                }
            }
            '&' => {
                chars.next();
                if !eat(&mut chars, '&') {
                    return Err(QueryError::at(
                        pos,
                        "expression references ('&') are not supported",
                    ));
                }
                Token::And
            }
            '!' => {
                chars.next();
                if eat(&mut chars, '=') {
                    Token::Ne
                } else {
                    Token::Not
                }
            }
            '=' => {
                chars.next();
                if !eat(&mut chars, '=') {
                    return Err(QueryError::at(pos, "expected '==' but found '='"));
                }
                Token::Eq
            }
            '<' => {
                chars.next();
                if eat(&mut chars, '=') {
                    Token::Lte
                } else {
                    Token::Lt
                }
            }
            '>' => {
                chars.next();
                if eat(&mut chars, '=') {
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '"' => {
                chars.next();
                let raw = delimited(&mut chars, '"', pos)?;
                let name: String = serde_json::from_str(&format!("\"{raw}\""))
                    .map_err(|e| QueryError::at(pos, format!("invalid quoted identifier: {e}")))?;
                Token::QuotedIdentifier(name)
            }
            '\'' => {
                chars.next();
                let raw = delimited(&mut chars, '\'', pos)?;
                Token::Literal(Value::String(raw.replace("\\'", "'")))
            }
            '`' => {
                chars.next();
                let raw = delimited(&mut chars, '`', pos)?;
                let json = raw.replace("\\`", "`");
                let value = serde_json::from_str(json.trim())
                    .map_err(|e| QueryError::at(pos, format!("invalid JSON literal: {e}")))?;
                Token::Literal(value)
            }
            _ => {
                chars.next();
                match c {
                    '.' => Token::Dot,
                    '*' => Token::Star,
                    '@' => Token::Current,
                    ']' => Token::RBracket,
                    '{' => Token::LBrace,
                    '}' => Token::RBrace,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    ':' => Token::Colon,
                    other => {
                        return Err(QueryError::at(pos, format!("unexpected character '{other}'")));
                    }
                }
            }
        };
        tokens.push(Spanned { pos, token });
    }

    tokens.push(Spanned {
        pos: input.len(),
        token: Token::Eof,
    });
    Ok(tokens)
}

fn eat(chars: &mut Chars<'_>, expected: char) -> bool {
    if chars.peek().map(|&(_, c)| c) == Some(expected) {
        chars.next();
        true
    } else {
        false
    }
}

/// Read up to the closing `delimiter`, keeping escape sequences verbatim.
fn delimited(chars: &mut Chars<'_>, delimiter: char, start: usize) -> Result<String, QueryError> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        if c == delimiter {
            return Ok(out);
        }
        out.push(c);
        if c == '\\' {
            if let Some((_, escaped)) = chars.next() {
                out.push(escaped);
            }
        }
    }
    Err(QueryError::at(start, format!("unterminated {delimiter}")))
}
