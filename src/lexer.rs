//! Lexer for NZSL
//!
//! The lexer converts source code into a stream of tokens.
//! It uses the `logos` crate for efficient lexing. The stream is lazy: tokens
//! are produced as the iterator is advanced, and [`Lexer::reset`] rewinds it
//! to the start of the source.

use crate::span::Span;
use crate::token::{Token, TokenKind};
use logos::Logos;
use std::fmt;
use thiserror::Error;

/// Kind of lexical failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedLiteral,
    InvalidCharacter,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexErrorKind::UnterminatedLiteral => write!(f, "unterminated literal"),
            LexErrorKind::InvalidCharacter => write!(f, "invalid character"),
        }
    }
}

/// Lexer error, carrying the offending span
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {span}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    pub fn new(kind: LexErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The lexer for NZSL
pub struct Lexer<'src> {
    source: &'src str,
    inner: logos::Lexer<'src, TokenKind>,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            inner: TokenKind::lexer(source),
            finished: false,
        }
    }

    /// Get the source code
    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Restart lexing from the beginning of the source
    pub fn reset(&mut self) {
        self.inner = TokenKind::lexer(self.source);
        self.finished = false;
    }

    /// Get the next token. Returns an `Eof` token once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        match self.inner.next() {
            Some(Ok(TokenKind::UnterminatedString)) => {
                let span = self.inner.span();
                Err(LexError::new(
                    LexErrorKind::UnterminatedLiteral,
                    Span::new(span.start, span.end),
                ))
            }
            Some(Ok(kind)) => {
                let span = self.inner.span();
                Ok(Token::new(kind, Span::new(span.start, span.end)))
            }
            Some(Err(())) => {
                let span = self.inner.span();
                Err(LexError::new(
                    LexErrorKind::InvalidCharacter,
                    Span::new(span.start, span.end),
                ))
            }
            None => {
                let pos = self.source.len();
                Ok(Token::new(TokenKind::Eof, Span::new(pos, pos)))
            }
        }
    }

    /// Collect all tokens (including the trailing `Eof`), stopping at the
    /// first error
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        log::trace!("lexed {} tokens", tokens.len());
        Ok(tokens)
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(token) if token.kind == TokenKind::Eof => {
                self.finished = true;
                None
            }
            other => Some(other),
        }
    }
}

/// Helper function to lex source code
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(token_kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_whitespace_and_comments() {
        let kinds = token_kinds("   \t\n // nothing here\n  ");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_numbers() {
        let kinds = token_kinds("42 0xFF 3.14 1e10 2.5e-3");
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let kinds = token_kinds("module struct external fn let return if else vec3 f32 uniform");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Module,
                TokenKind::Struct,
                TokenKind::External,
                TokenKind::Fn,
                TokenKind::Let,
                TokenKind::Return,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_attribute_header() {
        let kinds = token_kinds(r#"[nzsl_version("1.0")] module;"#);
        assert_eq!(
            kinds,
            vec![
                TokenKind::LBracket,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::StringLiteral,
                TokenKind::RParen,
                TokenKind::RBracket,
                TokenKind::Module,
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_member_chain() {
        let kinds = token_kinds("ubo.s.field.z");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_operators() {
        let kinds = token_kinds("+ - * / == != < > <= >= && || ! = ->");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Not,
                TokenKind::Eq,
                TokenKind::Arrow,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex("[nzsl_version(\"1.0)]\nmodule;").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedLiteral);
        assert_eq!(err.span.start, 14);
    }

    #[test]
    fn test_invalid_character() {
        let err = lex("let x = 1 @ 2;").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidCharacter);
        assert_eq!(err.span, Span::new(10, 11));
    }

    #[test]
    fn test_lazy_and_restartable() {
        let mut lexer = Lexer::new("fn main");
        let first: Vec<_> = lexer.by_ref().map(|t| t.unwrap().kind).collect();
        assert_eq!(first, vec![TokenKind::Fn, TokenKind::Ident]);
        assert!(lexer.next().is_none());

        lexer.reset();
        let token = lexer.next().unwrap().unwrap();
        assert_eq!(token.kind, TokenKind::Fn);
    }

    #[test]
    fn test_span_tracking() {
        let source = "let x = 42;";
        let tokens = lex(source).unwrap();
        assert_eq!(tokens[0].text(source), "let");
        assert_eq!(tokens[1].text(source), "x");
        assert_eq!(tokens[2].text(source), "=");
        assert_eq!(tokens[3].text(source), "42");
    }
}
