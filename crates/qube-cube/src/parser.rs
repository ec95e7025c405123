//! MDX subset parser
//!
//! Recursive descent over the tokens produced by [`crate::lexer`]:
//!
//! ```text
//! query := SELECT axis (',' axis)* FROM name
//! axis  := [NON EMPTY] set ON (COLUMNS | ROWS)
//! set   := CROSSJOIN '(' set ',' set ')'
//!        | '{' [set (',' set)*] '}'
//!        | path ['.' (MEMBERS | CHILDREN | DEFAULTMEMBER)]
//! path  := name ('.' name)*
//! ```

use crate::lexer::{tokenize, Token};
use qube_core::{bracket, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdxQuery {
    pub axes: Vec<AxisSpec>,
    pub cube: String,
}

impl MdxQuery {
    /// Get the set placed on an axis
    pub fn axis(&self, axis: Axis) -> Option<&AxisSpec> {
        self.axes.iter().find(|a| a.axis == axis)
    }
}

/// Axis identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Columns,
    Rows,
}

/// One `<set> ON <axis>` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub axis: Axis,
    pub non_empty: bool,
    pub set: SetExpr,
}

/// Set expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SetExpr {
    /// A single member by path
    Member(MemberPath),
    /// `<level or hierarchy>.members`
    Members(MemberPath),
    /// `<member or hierarchy>.children`
    Children(MemberPath),
    /// `<hierarchy>.DefaultMember`
    DefaultMember(MemberPath),
    /// `{a, b, ...}`
    Set(Vec<SetExpr>),
    /// `CROSSJOIN(a, b)`
    CrossJoin(Box<SetExpr>, Box<SetExpr>),
}

/// A dotted path of bracketed names, kept unescaped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberPath(pub Vec<String>);

impl MemberPath {
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Re-bracketed form, comparable with metadata unique names
    pub fn unique_name(&self) -> String {
        self.0
            .iter()
            .map(|s| bracket(s))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name())
    }
}

/// Parse an MDX query string
pub fn parse(query: &str) -> Result<MdxQuery> {
    let tokens = tokenize(query)?;
    let mut parser = Parser::new(tokens);
    let parsed = parser.parse_query()?;
    if let Some(token) = parser.peek() {
        return Err(Error::QueryParse(format!(
            "Unexpected trailing token {:?}",
            token
        )));
    }
    Ok(parsed)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_query(&mut self) -> Result<MdxQuery> {
        self.expect(Token::Select, "SELECT")?;

        let mut axes = vec![self.parse_axis()?];
        while self.consume(&Token::Comma) {
            axes.push(self.parse_axis()?);
        }

        self.expect(Token::From, "FROM")?;
        let cube = self.parse_name()?;

        Ok(MdxQuery { axes, cube })
    }

    fn parse_axis(&mut self) -> Result<AxisSpec> {
        let non_empty = if self.consume(&Token::Non) {
            self.expect(Token::Empty, "EMPTY after NON")?;
            true
        } else {
            false
        };

        let set = self.parse_set()?;
        self.expect(Token::On, "ON")?;

        let axis = match self.advance() {
            Some(Token::Columns) => Axis::Columns,
            Some(Token::Rows) => Axis::Rows,
            other => {
                return Err(Error::QueryParse(format!(
                    "Expected COLUMNS or ROWS, found {:?}",
                    other
                )));
            }
        };

        Ok(AxisSpec {
            axis,
            non_empty,
            set,
        })
    }

    fn parse_set(&mut self) -> Result<SetExpr> {
        match self.peek() {
            Some(Token::CrossJoin) => {
                self.pos += 1;
                self.expect(Token::LParen, "'(' after CROSSJOIN")?;
                let left = self.parse_set()?;
                self.expect(Token::Comma, "',' between CROSSJOIN arguments")?;
                let right = self.parse_set()?;
                self.expect(Token::RParen, "')' closing CROSSJOIN")?;
                Ok(SetExpr::CrossJoin(Box::new(left), Box::new(right)))
            }
            Some(Token::LBrace) => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.consume(&Token::RBrace) {
                    items.push(self.parse_set()?);
                    while self.consume(&Token::Comma) {
                        items.push(self.parse_set()?);
                    }
                    self.expect(Token::RBrace, "'}' closing set")?;
                }
                Ok(SetExpr::Set(items))
            }
            Some(Token::Name(_)) => self.parse_path_expr(),
            other => Err(Error::QueryParse(format!(
                "Expected set expression, found {:?}",
                other
            ))),
        }
    }

    fn parse_path_expr(&mut self) -> Result<SetExpr> {
        let mut segments = vec![self.parse_name()?];
        while self.consume(&Token::Dot) {
            match self.advance() {
                Some(Token::Name(name)) => segments.push(name),
                Some(Token::Members) => return Ok(SetExpr::Members(MemberPath(segments))),
                Some(Token::Children) => return Ok(SetExpr::Children(MemberPath(segments))),
                Some(Token::DefaultMember) => {
                    return Ok(SetExpr::DefaultMember(MemberPath(segments)));
                }
                other => {
                    return Err(Error::QueryParse(format!(
                        "Expected name or function after '.', found {:?}",
                        other
                    )));
                }
            }
        }
        Ok(SetExpr::Member(MemberPath(segments)))
    }

    fn parse_name(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Name(name)) => Ok(name),
            other => Err(Error::QueryParse(format!(
                "Expected bracketed name, found {:?}",
                other
            ))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn consume(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        if self.consume(&expected) {
            Ok(())
        } else {
            Err(Error::QueryParse(format!(
                "Expected {}, found {:?}",
                what,
                self.peek()
            )))
        }
    }
}
