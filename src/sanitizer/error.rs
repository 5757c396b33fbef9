//! Sanitizer error definitions

use crate::ast::ExpressionType;
use crate::span::Span;
use std::fmt;
use thiserror::Error;

/// Result type for sanitization steps
pub type SanitizeResult<T> = Result<T, SanitizeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SanitizeErrorKind {
    /// An identifier names nothing visible from where it is used
    UnresolvedIdentifier,
    TypeMismatch,
    /// Two externals share a (set, binding) pair
    DuplicateBinding,
    /// Unknown field, or field access on a type without fields
    InvalidFieldAccess,
    InvalidSwizzleComponent,
    /// The module has functions but none is an entry point
    MissingEntryAttribute,
    DuplicateDeclaration,
    /// A type that does not exist or is not allowed where it appears
    InvalidType,
    InvalidEntrySignature,
    InvalidAssignment,
    MissingReturn,
    RecursiveStruct,
    /// Expressions, blocks or struct members nested past the supported depth
    NestingTooDeep,
}

impl fmt::Display for SanitizeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SanitizeErrorKind::UnresolvedIdentifier => "unresolved identifier",
            SanitizeErrorKind::TypeMismatch => "type mismatch",
            SanitizeErrorKind::DuplicateBinding => "duplicate binding",
            SanitizeErrorKind::InvalidFieldAccess => "invalid field access",
            SanitizeErrorKind::InvalidSwizzleComponent => "invalid swizzle component",
            SanitizeErrorKind::MissingEntryAttribute => "missing entry attribute",
            SanitizeErrorKind::DuplicateDeclaration => "duplicate declaration",
            SanitizeErrorKind::InvalidType => "invalid type",
            SanitizeErrorKind::InvalidEntrySignature => "invalid entry signature",
            SanitizeErrorKind::InvalidAssignment => "invalid assignment",
            SanitizeErrorKind::MissingReturn => "missing return",
            SanitizeErrorKind::RecursiveStruct => "recursive struct",
            SanitizeErrorKind::NestingTooDeep => "nesting too deep",
        };
        write!(f, "{}", s)
    }
}

/// Semantic error found while sanitizing a module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct SanitizeError {
    pub kind: SanitizeErrorKind,
    pub message: String,
    /// Absent for nodes that came from the builder
    pub span: Option<Span>,
}

impl SanitizeError {
    pub fn new(kind: SanitizeErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span: span.real(),
        }
    }

    // ============ Error Constructors ============

    pub fn unresolved_identifier(name: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::UnresolvedIdentifier,
            format!("unknown identifier '{}'", name),
            span,
        )
    }

    pub fn type_mismatch(expected: &ExpressionType, found: &ExpressionType, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::TypeMismatch,
            format!("expected {}, found {}", expected, found),
            span,
        )
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(SanitizeErrorKind::TypeMismatch, message, span)
    }

    pub fn duplicate_binding(set: u32, binding: u32, name: &str, previous: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::DuplicateBinding,
            format!(
                "'{}' uses set {} binding {}, already taken by '{}'",
                name, set, binding, previous
            ),
            span,
        )
    }

    pub fn unknown_field(ty: &ExpressionType, field: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::InvalidFieldAccess,
            format!("type {} has no field '{}'", ty, field),
            span,
        )
    }

    pub fn no_fields(ty: &ExpressionType, field: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::InvalidFieldAccess,
            format!("cannot access '{}' on a value of type {}", field, ty),
            span,
        )
    }

    pub fn invalid_swizzle(message: impl Into<String>, span: Span) -> Self {
        Self::new(SanitizeErrorKind::InvalidSwizzleComponent, message, span)
    }

    pub fn missing_entry(span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::MissingEntryAttribute,
            "module defines functions but none has an entry attribute",
            span,
        )
    }

    pub fn duplicate_declaration(name: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::DuplicateDeclaration,
            format!("'{}' is already declared", name),
            span,
        )
    }

    pub fn invalid_type(message: impl Into<String>, span: Span) -> Self {
        Self::new(SanitizeErrorKind::InvalidType, message, span)
    }

    pub fn invalid_entry_signature(name: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::InvalidEntrySignature,
            format!("entry function '{}' must take no parameters and return nothing", name),
            span,
        )
    }

    pub fn invalid_assignment(message: impl Into<String>, span: Span) -> Self {
        Self::new(SanitizeErrorKind::InvalidAssignment, message, span)
    }

    pub fn missing_return(name: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::MissingReturn,
            format!("function '{}' does not return a value on every path", name),
            span,
        )
    }

    pub fn recursive_struct(name: &str, span: Span) -> Self {
        Self::new(
            SanitizeErrorKind::RecursiveStruct,
            format!("struct '{}' contains itself", name),
            span,
        )
    }

    pub fn nesting_too_deep(message: impl Into<String>, span: Span) -> Self {
        Self::new(SanitizeErrorKind::NestingTooDeep, message, span)
    }
}
