//! Code generation backends
//!
//! Every backend reads a [`SanitizedModule`](crate::sanitizer::SanitizedModule)
//! and never fails on it, except for constructs a target cannot express,
//! which are reported as [`BackendErrorKind::UnsupportedConstruct`].

pub mod glsl;
pub mod nzsl;
pub mod spirv;

pub use glsl::{GlslOptions, GlslWriter};
pub use nzsl::NzslWriter;
pub use spirv::{SpirvModule, SpirvOptions, SpirvWriter};

use crate::ast::{ExprKind, Expression, Literal};
use std::fmt;
use thiserror::Error;

/// Result type for code generation
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    UnsupportedConstruct,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::UnsupportedConstruct => write!(f, "unsupported construct"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::UnsupportedConstruct,
            message: message.into(),
        }
    }
}

/// Line-oriented output with tab indentation
#[derive(Debug, Default)]
pub(crate) struct TextBuffer {
    out: String,
    indent: usize,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// `{` on its own line, then one level deeper
    pub fn open(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    pub fn close(&mut self, suffix: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(format!("}}{}", suffix));
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// Binding power of an expression when printed as text. Postfix forms and
/// atoms bind tightest; assignment loosest.
pub(crate) fn text_precedence(expr: &Expression) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } => 0,
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } => 8,
        ExprKind::Literal(Literal::F32(v)) if v.is_sign_negative() => 8,
        ExprKind::Literal(Literal::I32(v)) if *v < 0 => 8,
        _ => 10,
    }
}

/// Float literal text that reads back as the same value; always has a
/// decimal point or an exponent.
pub(crate) fn float_text(value: f32) -> BackendResult<String> {
    if !value.is_finite() {
        return Err(BackendError::unsupported(format!(
            "non-finite float constant {}",
            value
        )));
    }
    Ok(format!("{:?}", value))
}

/// Integer literal text; `i32::MIN` has no positive counterpart to negate
pub(crate) fn int_text(value: i32) -> String {
    if value == i32::MIN {
        "(-2147483647 - 1)".to_string()
    } else {
        value.to_string()
    }
}
