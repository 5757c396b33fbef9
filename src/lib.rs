//! NZSL Shader Compiler
//!
//! Front end and code generators for NZSL, a small statically-typed shading
//! language with Rust-like syntax. A module is parsed into an AST, checked
//! and normalized by the sanitizer, then handed to one of the backends.
//!
//! # Architecture
//!
//! ```text
//! Source Code (.nzsl)          Builder API
//!       │                           │
//!       ▼                           │
//! ┌─────────────┐                   │
//! │    Lexer    │  → Tokens         │
//! └─────────────┘                   │
//!       │                           │
//!       ▼                           │
//! ┌─────────────┐                   │
//! │   Parser    │  → AST ◄──────────┘
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Sanitizer  │  → Sanitized AST + binding table
//! └─────────────┘
//!       │
//!       ├──────────────┬──────────────┐
//!       ▼              ▼              ▼
//! ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │   GLSL   │   │   NZSL   │   │  SPIR-V  │
//! └──────────┘   └──────────┘   └──────────┘
//! ```

pub mod ast;
pub mod backend;
pub mod builder;
pub mod lexer;
pub mod parser;
pub mod sanitizer;
pub mod span;
pub mod token;

pub use ast::Module;
pub use backend::{
    BackendError, GlslOptions, GlslWriter, NzslWriter, SpirvModule, SpirvOptions, SpirvWriter,
};
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser};
pub use sanitizer::{SanitizeError, SanitizedModule, Sanitizer};
pub use span::{Position, Span};
pub use token::{Token, TokenKind};

use thiserror::Error;

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for NZSL source files
pub const FILE_EXTENSION: &str = "nzsl";

/// Any failure along the source-to-target pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{} sanitization error(s)", .0.len())]
    Sanitize(Vec<SanitizeError>),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<Vec<SanitizeError>> for CompileError {
    fn from(errors: Vec<SanitizeError>) -> Self {
        CompileError::Sanitize(errors)
    }
}

impl CompileError {
    /// Source spans the error points at, first one first
    pub fn spans(&self) -> Vec<Span> {
        match self {
            CompileError::Lex(e) => vec![e.span],
            CompileError::Parse(e) => e.span.real().into_iter().collect(),
            CompileError::Sanitize(errors) => errors.iter().filter_map(|e| e.span).collect(),
            CompileError::Backend(_) => Vec::new(),
        }
    }
}

/// Parse a source file into an unsanitized module
pub fn parse(source: &str) -> Result<Module, CompileError> {
    let mut parser = Parser::new(source)?;
    Ok(parser.parse_module()?)
}

/// Parse and sanitize a source file
pub fn check(source: &str) -> Result<SanitizedModule, CompileError> {
    let module = parse(source)?;
    Ok(sanitizer::sanitize(&module)?)
}

pub fn compile_glsl(source: &str, options: GlslOptions) -> Result<String, CompileError> {
    let module = check(source)?;
    Ok(GlslWriter::new(options).write(&module)?)
}

pub fn compile_nzsl(source: &str) -> Result<String, CompileError> {
    let module = check(source)?;
    Ok(NzslWriter::new().write(&module)?)
}

pub fn compile_spirv(source: &str, options: SpirvOptions) -> Result<SpirvModule, CompileError> {
    let module = check(source)?;
    Ok(SpirvWriter::new(options).write(&module)?)
}
