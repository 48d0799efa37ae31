//! Top-down operator precedence parser producing an [`Ast`].
//!
//! Binding powers follow the JMESPath reference grammar, so expressions
//! such as `Reservations[].Instances[].{id: InstanceId}` group the same
//! way they do in the AWS CLI's `--query`.

use serde_json::Value;

use super::QueryError;
use super::lexer::{Spanned, Token, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ast {
    Identity,
    Field(String),
    Literal(Value),
    Subexpression(Box<Ast>, Box<Ast>),
    Index(i64),
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// Evaluate the right side against every element of the left array.
    Projection(Box<Ast>, Box<Ast>),
    /// Evaluate the right side against every value of the left object.
    ObjectProjection(Box<Ast>, Box<Ast>),
    Filter {
        left: Box<Ast>,
        right: Box<Ast>,
        condition: Box<Ast>,
    },
    Flatten(Box<Ast>),
    MultiSelectList(Vec<Ast>),
    MultiSelectHash(Vec<(String, Ast)>),
    Pipe(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    Comparison {
        op: Comparator,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    Function {
        name: String,
        args: Vec<Ast>,
    },
}

/// Tokens binding weaker than this end a projection's right-hand side.
const PROJECTION_STOP: u8 = 10;

fn binding_power(token: &Token) -> u8 {
    match token {
        Token::Pipe => 1,
        Token::Or => 2,
        Token::And => 3,
        Token::Eq | Token::Ne | Token::Lt | Token::Lte | Token::Gt | Token::Gte => 5,
        Token::Flatten => 9,
        Token::Star => 20,
        Token::Filter => 21,
        Token::Dot => 40,
        Token::Not => 45,
        Token::LBrace => 50,
        Token::LBracket => 55,
        Token::LParen => 60,
        _ => 0,
    }
}

/// Parse a complete expression.
pub(crate) fn parse(input: &str) -> Result<Ast, QueryError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, index: 0 };
    let ast = parser.expression(0)?;
    let trailing = parser.peek();
    if trailing.token != Token::Eof {
        return Err(QueryError::at(
            trailing.pos,
            format!("unexpected {} after expression", describe(&trailing.token)),
        ));
    }
    Ok(ast)
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Spanned {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.index + offset).min(last)]
    }

    fn advance(&mut self) -> Spanned {
        let token = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), QueryError> {
        let next = self.advance();
        if next.token == expected {
            Ok(())
        } else {
            Err(QueryError::at(
                next.pos,
                format!("expected {} but found {}", describe(&expected), describe(&next.token)),
            ))
        }
    }

    fn expression(&mut self, rbp: u8) -> Result<Ast, QueryError> {
        let token = self.advance();
        let mut left = self.nud(token)?;
        while rbp < binding_power(&self.peek().token) {
            let token = self.advance();
            left = self.led(token, left)?;
        }
        Ok(left)
    }

    fn nud(&mut self, spanned: Spanned) -> Result<Ast, QueryError> {
        match spanned.token {
            Token::Literal(value) => Ok(Ast::Literal(value)),
            Token::Identifier(name) => Ok(Ast::Field(name)),
            Token::QuotedIdentifier(name) => {
                if self.peek().token == Token::LParen {
                    return Err(QueryError::at(
                        spanned.pos,
                        "quoted identifier cannot be used as a function name",
                    ));
                }
                Ok(Ast::Field(name))
            }
            Token::Star => {
                let right = self.projection_rhs(binding_power(&Token::Star))?;
                Ok(Ast::ObjectProjection(Box::new(Ast::Identity), Box::new(right)))
            }
            Token::Filter => self.filter(Ast::Identity),
            Token::LBrace => self.multi_select_hash(),
            Token::Flatten => {
                let right = self.projection_rhs(binding_power(&Token::Flatten))?;
                Ok(Ast::Projection(
                    Box::new(Ast::Flatten(Box::new(Ast::Identity))),
                    Box::new(right),
                ))
            }
            Token::LBracket => match self.peek().token.clone() {
                Token::Number(_) | Token::Colon => {
                    let index = self.index_expression()?;
                    self.project_if_slice(Ast::Identity, index)
                }
                Token::Star if self.peek_at(1).token == Token::RBracket => {
                    self.advance();
                    self.advance();
                    let right = self.projection_rhs(binding_power(&Token::Star))?;
                    Ok(Ast::Projection(Box::new(Ast::Identity), Box::new(right)))
                }
                _ => self.multi_select_list(),
            },
            Token::Current => Ok(Ast::Identity),
            Token::Not => {
                let operand = self.expression(binding_power(&Token::Not))?;
                Ok(Ast::Not(Box::new(operand)))
            }
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Eof => Err(QueryError::at(spanned.pos, "unexpected end of expression")),
            other => Err(QueryError::at(
                spanned.pos,
                format!("unexpected {}", describe(&other)),
            )),
        }
    }

    fn led(&mut self, spanned: Spanned, left: Ast) -> Result<Ast, QueryError> {
        let bp = binding_power(&spanned.token);
        match spanned.token {
            Token::Dot => {
                if self.peek().token == Token::Star {
                    self.advance();
                    let right = self.projection_rhs(bp)?;
                    Ok(Ast::ObjectProjection(Box::new(left), Box::new(right)))
                } else {
                    let right = self.dot_rhs(bp)?;
                    Ok(Ast::Subexpression(Box::new(left), Box::new(right)))
                }
            }
            Token::Pipe => {
                let right = self.expression(bp)?;
                Ok(Ast::Pipe(Box::new(left), Box::new(right)))
            }
            Token::Or => {
                let right = self.expression(bp)?;
                Ok(Ast::Or(Box::new(left), Box::new(right)))
            }
            Token::And => {
                let right = self.expression(bp)?;
                Ok(Ast::And(Box::new(left), Box::new(right)))
            }
            Token::LParen => {
                let Ast::Field(name) = left else {
                    return Err(QueryError::at(spanned.pos, "invalid function name"));
                };
                let mut args = Vec::new();
                if self.peek().token == Token::RParen {
                    self.advance();
                } else {
                    loop {
                        args.push(self.expression(0)?);
                        let next = self.advance();
                        match next.token {
                            Token::Comma => continue,
                            Token::RParen => break,
                            other => {
                                return Err(QueryError::at(
                                    next.pos,
                                    format!("expected ',' or ')' but found {}", describe(&other)),
                                ));
                            }
                        }
                    }
                }
                Ok(Ast::Function { name, args })
            }
            Token::Filter => self.filter(left),
            Token::Flatten => {
                let right = self.projection_rhs(bp)?;
                Ok(Ast::Projection(
                    Box::new(Ast::Flatten(Box::new(left))),
                    Box::new(right),
                ))
            }
            Token::LBracket => match self.peek().token.clone() {
                Token::Number(_) | Token::Colon => {
                    let index = self.index_expression()?;
                    self.project_if_slice(left, index)
                }
                _ => {
                    self.expect(Token::Star)?;
                    self.expect(Token::RBracket)?;
                    let right = self.projection_rhs(binding_power(&Token::Star))?;
                    Ok(Ast::Projection(Box::new(left), Box::new(right)))
                }
            },
            Token::Eq | Token::Ne | Token::Lt | Token::Lte | Token::Gt | Token::Gte => {
                let op = match spanned.token {
                    Token::Eq => Comparator::Eq,
                    Token::Ne => Comparator::Ne,
                    Token::Lt => Comparator::Lt,
                    Token::Lte => Comparator::Lte,
                    Token::Gt => Comparator::Gt,
                    _ => Comparator::Gte,
                };
                let right = self.expression(bp)?;
                Ok(Ast::Comparison {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            other => Err(QueryError::at(
                spanned.pos,
                format!("unexpected {}", describe(&other)),
            )),
        }
    }

    /// `[n]` or `[start:stop:step]`, with the opening bracket consumed.
    fn index_expression(&mut self) -> Result<Ast, QueryError> {
        let is_slice =
            self.peek().token == Token::Colon || self.peek_at(1).token == Token::Colon;
        if !is_slice {
            let next = self.advance();
            let Token::Number(index) = next.token else {
                return Err(QueryError::at(next.pos, "expected index"));
            };
            self.expect(Token::RBracket)?;
            return Ok(Ast::Index(index));
        }

        let mut parts: [Option<i64>; 3] = [None; 3];
        let mut slot = 0;
        loop {
            let next = self.advance();
            match next.token {
                Token::RBracket => break,
                Token::Colon => {
                    slot += 1;
                    if slot > 2 {
                        return Err(QueryError::at(next.pos, "too many colons in slice"));
                    }
                }
                Token::Number(n) => parts[slot] = Some(n),
                other => {
                    return Err(QueryError::at(
                        next.pos,
                        format!("unexpected {} in slice", describe(&other)),
                    ));
                }
            }
        }
        if parts[2] == Some(0) {
            return Err(QueryError::at(self.peek().pos, "slice step cannot be 0"));
        }
        Ok(Ast::Slice {
            start: parts[0],
            stop: parts[1],
            step: parts[2],
        })
    }

    fn project_if_slice(&mut self, left: Ast, index: Ast) -> Result<Ast, QueryError> {
        let is_slice = matches!(index, Ast::Slice { .. });
        let indexed = Ast::Subexpression(Box::new(left), Box::new(index));
        if is_slice {
            let right = self.projection_rhs(binding_power(&Token::Star))?;
            Ok(Ast::Projection(Box::new(indexed), Box::new(right)))
        } else {
            Ok(indexed)
        }
    }

    fn filter(&mut self, left: Ast) -> Result<Ast, QueryError> {
        let condition = self.expression(0)?;
        self.expect(Token::RBracket)?;
        let right = if self.peek().token == Token::Flatten {
            Ast::Identity
        } else {
            self.projection_rhs(binding_power(&Token::Filter))?
        };
        Ok(Ast::Filter {
            left: Box::new(left),
            right: Box::new(right),
            condition: Box::new(condition),
        })
    }

    fn projection_rhs(&mut self, bp: u8) -> Result<Ast, QueryError> {
        let next = self.peek().clone();
        if binding_power(&next.token) < PROJECTION_STOP {
            return Ok(Ast::Identity);
        }
        match next.token {
            Token::LBracket | Token::Filter => self.expression(bp),
            Token::Dot => {
                self.advance();
                self.dot_rhs(bp)
            }
            other => Err(QueryError::at(
                next.pos,
                format!("unexpected {} after projection", describe(&other)),
            )),
        }
    }

    fn dot_rhs(&mut self, bp: u8) -> Result<Ast, QueryError> {
        let next = self.peek().clone();
        match next.token {
            Token::Identifier(_) | Token::QuotedIdentifier(_) | Token::Star => self.expression(bp),
            Token::LBracket => {
                self.advance();
                self.multi_select_list()
            }
            Token::LBrace => {
                self.advance();
                self.multi_select_hash()
            }
            other => Err(QueryError::at(
                next.pos,
                format!("expected identifier, '[' or '{{' after '.', found {}", describe(&other)),
            )),
        }
    }

    /// `[a, b, ...]` with the opening bracket consumed.
    fn multi_select_list(&mut self) -> Result<Ast, QueryError> {
        let mut items = Vec::new();
        loop {
            items.push(self.expression(0)?);
            let next = self.advance();
            match next.token {
                Token::Comma => continue,
                Token::RBracket => break,
                other => {
                    return Err(QueryError::at(
                        next.pos,
                        format!("expected ',' or ']' but found {}", describe(&other)),
                    ));
                }
            }
        }
        Ok(Ast::MultiSelectList(items))
    }

    /// `{key: expr, ...}` with the opening brace consumed.
    fn multi_select_hash(&mut self) -> Result<Ast, QueryError> {
        let mut pairs = Vec::new();
        loop {
            let key = self.advance();
            let name = match key.token {
                Token::Identifier(name) | Token::QuotedIdentifier(name) => name,
                other => {
                    return Err(QueryError::at(
                        key.pos,
                        format!("expected key name but found {}", describe(&other)),
                    ));
                }
            };
            self.expect(Token::Colon)?;
            let value = self.expression(0)?;
            pairs.push((name, value));
            let next = self.advance();
            match next.token {
                Token::Comma => continue,
                Token::RBrace => break,
                other => {
                    return Err(QueryError::at(
                        next.pos,
                        format!("expected ',' or '}}' but found {}", describe(&other)),
                    ));
                }
            }
        }
        Ok(Ast::MultiSelectHash(pairs))
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Identifier(name) => format!("identifier '{name}'"),
        Token::QuotedIdentifier(name) => format!("quoted identifier \"{name}\""),
        Token::Literal(value) => format!("literal {value}"),
        Token::Number(n) => format!("number {n}"),
        Token::Eof => "end of expression".to_string(),
        other => {
            let symbol = match other {
                Token::Dot => ".",
                Token::Star => "*",
                Token::Flatten => "[]",
                Token::Filter => "[?",
                Token::LBracket => "[",
                Token::RBracket => "]",
                Token::LBrace => "{",
                Token::RBrace => "}",
                Token::LParen => "(",
                Token::RParen => ")",
                Token::Comma => ",",
                Token::Colon => ":",
                Token::Pipe => "|",
                Token::Or => "||",
                Token::And => "&&",
                Token::Not => "!",
                Token::Current => "@",
                Token::Eq => "==",
                Token::Ne => "!=",
                Token::Lt => "<",
                Token::Lte => "<=",
                Token::Gt => ">",
                _ => ">=",
            };
            format!("'{symbol}'")
        }
    }
}
