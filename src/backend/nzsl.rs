//! Canonical NZSL writer
//!
//! Prints a module back as NZSL source in one normalized layout: tab
//! indentation, braces on their own lines, an explicit type on every `let`
//! and the short stage names in `entry(...)`. Output of a sanitized module
//! parses and sanitizes back to the same tree.

use super::{float_text, int_text, text_precedence, BackendResult, TextBuffer};
use crate::ast::*;
use crate::sanitizer::SanitizedModule;

#[derive(Debug, Clone, Default)]
pub struct NzslWriter;

impl NzslWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write(&self, module: &SanitizedModule) -> BackendResult<String> {
        self.write_module(module.module())
    }

    fn write_module(&self, module: &Module) -> BackendResult<String> {
        let mut buf = TextBuffer::new();

        buf.line(format!("[nzsl_version({})]", quote(&module.header.version)));
        match &module.header.name {
            Some(name) => buf.line(format!("module {};", name)),
            None => buf.line("module;"),
        }

        for decl in &module.declarations {
            buf.blank();
            match decl {
                Declaration::Struct(s) => write_struct(&mut buf, s),
                Declaration::External(e) => write_external(&mut buf, e),
                Declaration::Function(f) => write_function(&mut buf, f)?,
            }
        }

        let text = buf.finish();
        log::trace!("wrote {} bytes of NZSL", text.len());
        Ok(text)
    }
}

/// String literal the lexer reads back as `text`
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn write_struct(buf: &mut TextBuffer, decl: &StructDecl) {
    buf.line(format!("struct {}", decl.name));
    buf.open();
    let count = decl.fields.len();
    for (i, field) in decl.fields.iter().enumerate() {
        let sep = if i + 1 < count { "," } else { "" };
        buf.line(format!("{}: {}{}", field.name, field.ty, sep));
    }
    buf.close("");
}

fn write_external(buf: &mut TextBuffer, decl: &ExternalDecl) {
    buf.line("external");
    buf.open();
    let count = decl.entries.len();
    for (i, entry) in decl.entries.iter().enumerate() {
        let sep = if i + 1 < count { "," } else { "" };
        buf.line(format!(
            "[set({}), binding({})] {}: {}{}",
            entry.set, entry.binding, entry.name, entry.ty, sep
        ));
    }
    buf.close("");
}

fn write_function(buf: &mut TextBuffer, func: &FunctionDecl) -> BackendResult<()> {
    if let Some(stage) = func.entry {
        buf.line(format!("[entry({})]", stage.attribute_name()));
    }
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| format!("{}: {}", p.name, p.ty))
        .collect();
    let ret = match &func.return_type {
        Some(ty) if *ty != ExpressionType::Void => format!(" -> {}", ty),
        _ => String::new(),
    };
    buf.line(format!("fn {}({}){}", func.name, params.join(", "), ret));
    write_block(buf, &func.body)
}

fn write_block(buf: &mut TextBuffer, block: &Block) -> BackendResult<()> {
    buf.open();
    for stmt in &block.stmts {
        write_statement(buf, stmt)?;
    }
    buf.close("");
    Ok(())
}

fn write_statement(buf: &mut TextBuffer, stmt: &Statement) -> BackendResult<()> {
    match &stmt.kind {
        StmtKind::VariableDeclaration { name, ty, init, .. } => {
            let init_text = expr_text(init)?;
            match ty.as_ref().or(init.ty.as_ref()) {
                Some(ty) => buf.line(format!("let {}: {} = {};", name, ty, init_text)),
                None => buf.line(format!("let {} = {};", name, init_text)),
            }
        }
        StmtKind::Expression(expr) => buf.line(format!("{};", expr_text(expr)?)),
        StmtKind::Return(Some(value)) => buf.line(format!("return {};", expr_text(value)?)),
        StmtKind::Return(None) => buf.line("return;"),
        StmtKind::Block(block) => write_block(buf, block)?,
        StmtKind::Branch {
            condition,
            then_block,
            else_block,
        } => {
            buf.line(format!("if ({})", expr_text(condition)?));
            write_block(buf, then_block)?;
            if let Some(else_block) = else_block {
                buf.line("else");
                write_block(buf, else_block)?;
            }
        }
    }
    Ok(())
}

fn expr_text(expr: &Expression) -> BackendResult<String> {
    let mut out = String::new();
    write_expr(&mut out, expr)?;
    Ok(out)
}

/// Write `expr`, parenthesized when it binds looser than `min`
fn write_operand(out: &mut String, expr: &Expression, min: u8) -> BackendResult<()> {
    if text_precedence(expr) < min {
        out.push('(');
        write_expr(out, expr)?;
        out.push(')');
        Ok(())
    } else {
        write_expr(out, expr)
    }
}

fn write_args(out: &mut String, args: &[Expression]) -> BackendResult<()> {
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, arg)?;
    }
    out.push(')');
    Ok(())
}

fn write_expr(out: &mut String, expr: &Expression) -> BackendResult<()> {
    match &expr.kind {
        ExprKind::Literal(Literal::Bool(v)) => out.push_str(if *v { "true" } else { "false" }),
        ExprKind::Literal(Literal::F32(v)) => out.push_str(&float_text(*v)?),
        ExprKind::Literal(Literal::I32(v)) => out.push_str(&int_text(*v)),
        ExprKind::Literal(Literal::U32(v)) => out.push_str(&format!("u32({})", v)),
        ExprKind::Identifier(name) | ExprKind::Variable { name, .. } => out.push_str(name),
        ExprKind::AccessMember { base, fields } => {
            write_operand(out, base, 10)?;
            for field in fields {
                out.push('.');
                out.push_str(&field.name);
            }
        }
        ExprKind::Swizzle { base, components } => {
            write_operand(out, base, 10)?;
            out.push('.');
            out.extend(components.iter().filter_map(|c| swizzle_letter(*c)));
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let prec = op.precedence();
            write_operand(out, lhs, prec)?;
            out.push_str(&format!(" {} ", op.symbol()));
            write_operand(out, rhs, prec + 1)?;
        }
        ExprKind::Unary { op, operand } => {
            out.push_str(op.symbol());
            write_operand(out, operand, 9)?;
        }
        ExprKind::Call { callee, args } => {
            out.push_str(&callee.name);
            write_args(out, args)?;
        }
        ExprKind::Cast { target, args } => {
            out.push_str(&target.to_string());
            write_args(out, args)?;
        }
        ExprKind::Assign { target, value } => {
            write_operand(out, target, 1)?;
            out.push_str(" = ");
            write_expr(out, value)?;
        }
    }
    Ok(())
}
