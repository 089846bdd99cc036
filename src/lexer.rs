//! Lexer for matrix programs using logos
//!
//! Supports tokens like:
//! - Identifiers: A, b, symmetric
//! - Integers: 100
//! - Operators: *, +, -, ', ^-1
//! - Punctuation: (, ), :, =, ~
//! - `#`-prefixed comments are skipped

use logos::Logos;

/// Token types for the matrix program language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<usize>().ok())]
    Number(usize),

    #[regex(r"[a-zA-Z]+", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("*")]
    Star,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("'")]
    Tick,

    #[token("^-1")]
    InverseOp,

    #[token(":")]
    Colon,

    #[token("=")]
    Equals,

    #[token("~")]
    Tilde,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Star => write!(f, "*"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Tick => write!(f, "'"),
            Token::InverseOp => write!(f, "^-1"),
            Token::Colon => write!(f, ":"),
            Token::Equals => write!(f, "="),
            Token::Tilde => write!(f, "~"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

/// Lexer wrapper that provides a stream of tokens
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }

    /// Slice of the source covered by the most recent token
    pub fn slice(&self) -> &'source str {
        self.inner.slice()
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<Token, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
