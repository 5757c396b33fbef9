//! Programmatic construction of shader modules
//!
//! Every function here returns an owned node and never fails; no semantic
//! checks happen until the module goes through the sanitizer. Nodes built
//! this way carry [`Span::DUMMY`].
//!
//! ```
//! use nzsl::ast::{ExpressionType, ShaderStage};
//! use nzsl::builder;
//!
//! let access = builder::access_member(builder::identifier("ubo"), ["s", "field"]);
//! let value = builder::swizzle(access, [2]);
//! let decl = builder::declare_variable("result", Some(ExpressionType::f32()), value);
//! let main = builder::declare_entry_function(ShaderStage::Vertex, "main", vec![decl]);
//! let module = builder::module("1.0", vec![main]);
//! assert_eq!(module.declarations.len(), 1);
//! ```

use crate::ast::*;
use crate::span::Span;

fn ident(name: impl Into<String>) -> Ident {
    Ident::new(name, Span::DUMMY)
}

fn expr(kind: ExprKind) -> Expression {
    Expression::new(kind, Span::DUMMY)
}

fn stmt(kind: StmtKind) -> Statement {
    Statement {
        kind,
        span: Span::DUMMY,
    }
}

// ============ Expressions ============

pub fn identifier(name: impl Into<String>) -> Expression {
    expr(ExprKind::Identifier(name.into()))
}

pub fn constant(value: Literal) -> Expression {
    expr(ExprKind::Literal(value))
}

pub fn constant_bool(value: bool) -> Expression {
    constant(Literal::Bool(value))
}

pub fn constant_f32(value: f32) -> Expression {
    constant(Literal::F32(value))
}

pub fn constant_i32(value: i32) -> Expression {
    constant(Literal::I32(value))
}

pub fn constant_u32(value: u32) -> Expression {
    constant(Literal::U32(value))
}

/// `base.f0.f1...`, with the field names kept as one chain
pub fn access_member<I, S>(base: Expression, fields: I) -> Expression
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    expr(ExprKind::AccessMember {
        base: Box::new(base),
        fields: fields.into_iter().map(ident).collect(),
    })
}

pub fn swizzle(base: Expression, components: impl IntoIterator<Item = u32>) -> Expression {
    expr(ExprKind::Swizzle {
        base: Box::new(base),
        components: components.into_iter().collect(),
    })
}

pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Expression {
    expr(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

pub fn unary(op: UnaryOp, operand: Expression) -> Expression {
    expr(ExprKind::Unary {
        op,
        operand: Box::new(operand),
    })
}

pub fn call(callee: impl Into<String>, args: Vec<Expression>) -> Expression {
    expr(ExprKind::Call {
        callee: ident(callee),
        args,
    })
}

pub fn cast(target: ExpressionType, args: Vec<Expression>) -> Expression {
    expr(ExprKind::Cast { target, args })
}

pub fn assign(target: Expression, value: Expression) -> Expression {
    expr(ExprKind::Assign {
        target: Box::new(target),
        value: Box::new(value),
    })
}

// ============ Statements ============

pub fn declare_variable(
    name: impl Into<String>,
    ty: Option<ExpressionType>,
    init: Expression,
) -> Statement {
    stmt(StmtKind::VariableDeclaration {
        name: ident(name),
        ty,
        init,
        id: None,
    })
}

pub fn expression_statement(expression: Expression) -> Statement {
    stmt(StmtKind::Expression(expression))
}

pub fn return_statement(value: Option<Expression>) -> Statement {
    stmt(StmtKind::Return(value))
}

pub fn block(stmts: Vec<Statement>) -> Block {
    Block {
        stmts,
        span: Span::DUMMY,
    }
}

pub fn block_statement(stmts: Vec<Statement>) -> Statement {
    stmt(StmtKind::Block(block(stmts)))
}

pub fn branch(
    condition: Expression,
    then_stmts: Vec<Statement>,
    else_stmts: Option<Vec<Statement>>,
) -> Statement {
    stmt(StmtKind::Branch {
        condition,
        then_block: block(then_stmts),
        else_block: else_stmts.map(block),
    })
}

// ============ Declarations ============

pub fn struct_field(name: impl Into<String>, ty: ExpressionType) -> StructField {
    StructField {
        name: ident(name),
        ty,
        span: Span::DUMMY,
    }
}

pub fn declare_struct(name: impl Into<String>, fields: Vec<StructField>) -> Declaration {
    Declaration::Struct(StructDecl {
        name: ident(name),
        fields,
        span: Span::DUMMY,
    })
}

pub fn external_entry(
    name: impl Into<String>,
    ty: ExpressionType,
    set: u32,
    binding: u32,
) -> ExternalEntry {
    ExternalEntry {
        name: ident(name),
        ty,
        set,
        binding,
        id: None,
        span: Span::DUMMY,
    }
}

pub fn declare_external(entries: Vec<ExternalEntry>) -> Declaration {
    Declaration::External(ExternalDecl {
        entries,
        span: Span::DUMMY,
    })
}

pub fn param(name: impl Into<String>, ty: ExpressionType) -> Param {
    Param {
        name: ident(name),
        ty,
        id: None,
        span: Span::DUMMY,
    }
}

pub fn declare_function(
    name: impl Into<String>,
    params: Vec<Param>,
    return_type: Option<ExpressionType>,
    body: Vec<Statement>,
) -> Declaration {
    Declaration::Function(FunctionDecl {
        name: ident(name),
        entry: None,
        params,
        return_type,
        body: block(body),
        span: Span::DUMMY,
    })
}

/// A parameterless, void function tagged `[entry(stage)]`
pub fn declare_entry_function(
    stage: ShaderStage,
    name: impl Into<String>,
    body: Vec<Statement>,
) -> Declaration {
    Declaration::Function(FunctionDecl {
        name: ident(name),
        entry: Some(stage),
        params: Vec::new(),
        return_type: None,
        body: block(body),
        span: Span::DUMMY,
    })
}

pub fn module(version: impl Into<String>, declarations: Vec<Declaration>) -> Module {
    Module {
        header: ModuleHeader {
            version: version.into(),
            name: None,
            span: Span::DUMMY,
        },
        declarations,
        span: Span::DUMMY,
    }
}
