//! MDX lexer using logos
//!
//! Covers the subset of MDX that reachability queries are written in:
//! `SELECT`, axis specifications, `NON EMPTY`, `CROSSJOIN`, set braces and
//! bracketed member paths.

use logos::Logos;
use qube_core::{Error, Result};

/// MDX tokens
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    // Keywords
    #[token("SELECT", ignore(ascii_case))]
    Select,

    #[token("ON", ignore(ascii_case))]
    On,

    #[token("COLUMNS", ignore(ascii_case))]
    Columns,

    #[token("ROWS", ignore(ascii_case))]
    Rows,

    #[token("FROM", ignore(ascii_case))]
    From,

    #[token("NON", ignore(ascii_case))]
    Non,

    #[token("EMPTY", ignore(ascii_case))]
    Empty,

    #[token("CROSSJOIN", ignore(ascii_case))]
    CrossJoin,

    #[token("MEMBERS", ignore(ascii_case))]
    Members,

    #[token("CHILDREN", ignore(ascii_case))]
    Children,

    #[token("DEFAULTMEMBER", ignore(ascii_case))]
    DefaultMember,

    // Symbols
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    // Bracketed name, `]]` escapes a closing bracket
    #[regex(r"\[([^\]]|\]\])*\]", |lex| {
        let s = lex.slice();
        s[1..s.len()-1].replace("]]", "]")
    })]
    Name(String),
}

impl Token {
    /// Check if this token is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::Select
                | Token::On
                | Token::Columns
                | Token::Rows
                | Token::From
                | Token::Non
                | Token::Empty
                | Token::CrossJoin
                | Token::Members
                | Token::Children
                | Token::DefaultMember
        )
    }
}

/// Tokenize an MDX query string
///
/// Fails on the first character sequence that is not part of the subset.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut lexer = Token::lexer(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push(token),
            Err(()) => {
                return Err(Error::QueryParse(format!(
                    "Unexpected input '{}' at offset {}",
                    lexer.slice(),
                    lexer.span().start
                )));
            }
        }
    }
    Ok(tokens)
}
