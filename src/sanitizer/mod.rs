//! Sanitizer for NZSL modules
//!
//! Resolves names and types over a raw tree and produces a fresh, fully
//! annotated tree that the backends can translate without further checks.
//!
//! # Architecture
//!
//! Sanitization runs in phases over a single [`Sanitizer`]:
//! 1. **Registration**: structs, externals and function signatures enter the
//!    module scope; struct layouts are ordered so that every struct follows
//!    the structs it contains.
//! 2. **Bindings**: every external entry claims its `(set, binding)` slot.
//! 3. **Bodies**: function bodies are walked with a scoped symbol table.
//!    Identifiers become [`ExprKind::Variable`] nodes, member chains become
//!    nested single-field accesses, dotted names on vectors become swizzles,
//!    and literal subexpressions are folded.
//!
//! Errors in independent declarations and statements are collected; any error
//! means no [`SanitizedModule`] is produced.

mod bindings;
mod error;
mod fold;
mod scope;

pub use bindings::{Binding, BindingTable};
pub use error::{SanitizeError, SanitizeErrorKind, SanitizeResult};
pub use scope::{Symbol, SymbolTable};

use crate::ast::*;
use crate::span::Span;
use std::collections::HashMap;

/// Sanitize a module with default options
pub fn sanitize(module: &Module) -> Result<SanitizedModule, Vec<SanitizeError>> {
    Sanitizer::new().sanitize(module)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Reject modules that define functions without any entry point
    pub require_entry_point: bool,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            require_entry_point: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableKind {
    External { set: u32, binding: u32 },
    Parameter,
    Local,
}

/// Everything known about a variable referenced by [`VariableId`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub ty: ExpressionType,
    pub kind: VariableKind,
}

/// Resolved layout of a struct, fields in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructInfo {
    pub name: String,
    pub fields: Vec<(String, ExpressionType)>,
}

impl StructInfo {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn field(&self, name: &str) -> Option<(usize, &ExpressionType)> {
        self.field_index(name).map(|i| (i, &self.fields[i].1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub stage: ShaderStage,
    pub name: String,
}

/// A module that passed sanitization, with the tables built along the way
#[derive(Debug, Clone)]
pub struct SanitizedModule {
    module: Module,
    bindings: BindingTable,
    variables: Vec<VariableInfo>,
    structs: Vec<StructInfo>,
    entry_points: Vec<EntryPoint>,
}

impl SanitizedModule {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    pub fn variable(&self, id: VariableId) -> Option<&VariableInfo> {
        self.variables.get(id.0 as usize)
    }

    /// Structs ordered so that each one comes after every struct it contains
    pub fn structs(&self) -> &[StructInfo] {
        &self.structs
    }

    pub fn struct_info(&self, name: &str) -> Option<&StructInfo> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.module.functions().find(|f| f.name.name == name)
    }
}

#[derive(Debug, Clone)]
struct FunctionSignature {
    params: Vec<ExpressionType>,
    return_type: ExpressionType,
    entry: Option<ShaderStage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeUsage {
    Value,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// The main sanitizer
pub struct Sanitizer {
    options: SanitizeOptions,
    symbols: SymbolTable,
    structs: HashMap<String, StructInfo>,
    /// Struct names, dependencies first
    struct_order: Vec<String>,
    functions: HashMap<String, FunctionSignature>,
    variables: Vec<VariableInfo>,
    bindings: BindingTable,
    entry_points: Vec<EntryPoint>,
    /// Return type of the function being walked
    return_type: ExpressionType,
    /// Current expression and block nesting
    depth: usize,
    errors: Vec<SanitizeError>,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::with_options(SanitizeOptions::default())
    }

    pub fn with_options(options: SanitizeOptions) -> Self {
        Self {
            options,
            symbols: SymbolTable::new(),
            structs: HashMap::new(),
            struct_order: Vec::new(),
            functions: HashMap::new(),
            variables: Vec::new(),
            bindings: BindingTable::new(),
            entry_points: Vec::new(),
            return_type: ExpressionType::Void,
            depth: 0,
            errors: Vec::new(),
        }
    }

    /// Sanitize a module, consuming the sanitizer
    pub fn sanitize(mut self, module: &Module) -> Result<SanitizedModule, Vec<SanitizeError>> {
        // Phase 1: Register module-level names
        self.collect_structs(module);
        let external_ids = self.collect_externals(module);
        self.collect_functions(module);

        // Phase 2: Walk bodies, building the output tree
        let mut external_ids = external_ids.into_iter();
        let mut declarations = Vec::with_capacity(module.declarations.len());
        for decl in &module.declarations {
            let decl = match decl {
                Declaration::Struct(s) => Declaration::Struct(s.clone()),
                Declaration::External(e) => Declaration::External(ExternalDecl {
                    entries: e
                        .entries
                        .iter()
                        .map(|entry| ExternalEntry {
                            id: external_ids.next().flatten(),
                            ..entry.clone()
                        })
                        .collect(),
                    span: e.span,
                }),
                Declaration::Function(f) => Declaration::Function(self.sanitize_function(f)),
            };
            declarations.push(decl);
        }

        if !self.errors.is_empty() {
            log::debug!("sanitization failed with {} error(s)", self.errors.len());
            return Err(self.errors);
        }

        log::debug!(
            "sanitized module: {} struct(s), {} binding(s), {} variable(s), {} entry point(s)",
            self.struct_order.len(),
            self.bindings.len(),
            self.variables.len(),
            self.entry_points.len()
        );

        let mut structs = self.structs;
        let ordered = self
            .struct_order
            .iter()
            .filter_map(|name| structs.remove(name))
            .collect();

        Ok(SanitizedModule {
            module: Module {
                header: module.header.clone(),
                declarations,
                span: module.span,
            },
            bindings: self.bindings,
            variables: self.variables,
            structs: ordered,
            entry_points: self.entry_points,
        })
    }

    // ============ Registration ============

    fn declare_global(&mut self, name: &Ident, symbol: Symbol) -> bool {
        // Type constructor names stay usable as types and casts
        if Intrinsic::from_name(&name.name).is_some()
            || PrimitiveType::from_name(&name.name).is_some()
            || vector_size(&name.name).is_some()
            || name.name == "uniform"
        {
            self.errors.push(SanitizeError::new(
                SanitizeErrorKind::DuplicateDeclaration,
                format!("'{}' is a built-in name", name.name),
                name.span,
            ));
            return false;
        }
        if !self.symbols.declare(&name.name, symbol) {
            self.errors
                .push(SanitizeError::duplicate_declaration(&name.name, name.span));
            return false;
        }
        true
    }

    fn collect_structs(&mut self, module: &Module) {
        let declared: Vec<&StructDecl> = module
            .structs()
            .filter(|decl| self.declare_global(&decl.name, Symbol::Struct))
            .collect();

        for decl in &declared {
            let mut fields: Vec<(String, ExpressionType)> = Vec::new();
            for field in &decl.fields {
                if fields.iter().any(|(name, _)| *name == field.name.name) {
                    self.errors
                        .push(SanitizeError::duplicate_declaration(&field.name.name, field.span));
                    continue;
                }
                if let Err(e) = self.check_type(&field.ty, field.span, TypeUsage::Value) {
                    self.errors.push(e);
                    continue;
                }
                fields.push((field.name.name.clone(), field.ty.clone()));
            }
            let name = decl.name.name.clone();
            self.structs.insert(name.clone(), StructInfo { name, fields });
        }

        let mut visits = HashMap::new();
        for decl in &declared {
            self.order_struct(&decl.name.name, decl.span, 0, &mut visits);
        }
    }

    /// Depth-first walk over struct members; returns false on a cycle
    fn order_struct(
        &mut self,
        name: &str,
        span: Span,
        depth: usize,
        visits: &mut HashMap<String, Visit>,
    ) -> bool {
        if depth >= MAX_NESTING_DEPTH {
            self.errors.push(SanitizeError::nesting_too_deep(
                format!("struct '{}' nests more than {} levels of members", name, MAX_NESTING_DEPTH),
                span,
            ));
            return false;
        }
        match visits.get(name) {
            Some(Visit::Done) => return true,
            Some(Visit::InProgress) => {
                self.errors.push(SanitizeError::recursive_struct(name, span));
                return false;
            }
            None => {}
        }
        visits.insert(name.to_string(), Visit::InProgress);

        let members: Vec<String> = self
            .structs
            .get(name)
            .map(|info| {
                info.fields
                    .iter()
                    .filter_map(|(_, ty)| match ty {
                        ExpressionType::Struct(inner) => Some(inner.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut acyclic = true;
        for member in members {
            if !self.order_struct(&member, span, depth + 1, visits) {
                acyclic = false;
                break;
            }
        }

        visits.insert(name.to_string(), Visit::Done);
        self.struct_order.push(name.to_string());
        acyclic
    }

    fn collect_externals(&mut self, module: &Module) -> Vec<Option<VariableId>> {
        let mut ids = Vec::new();
        for entry in module.externals() {
            if let Err(e) = self.check_type(&entry.ty, entry.span, TypeUsage::External) {
                self.errors.push(e);
                ids.push(None);
                continue;
            }

            let id = self.new_variable(
                &entry.name.name,
                entry.ty.clone(),
                VariableKind::External {
                    set: entry.set,
                    binding: entry.binding,
                },
            );
            ids.push(Some(id));

            let symbol = Symbol::Variable {
                id,
                ty: entry.ty.clone(),
            };
            if !self.declare_global(&entry.name, symbol) {
                continue;
            }

            let binding = Binding {
                set: entry.set,
                binding: entry.binding,
                name: entry.name.name.clone(),
                ty: entry.ty.clone(),
                variable: id,
            };
            if let Err(previous) = self.bindings.insert(binding) {
                let err = SanitizeError::duplicate_binding(
                    entry.set,
                    entry.binding,
                    &entry.name.name,
                    &previous.name,
                    entry.span,
                );
                self.errors.push(err);
            }
        }
        ids
    }

    fn collect_functions(&mut self, module: &Module) {
        for func in module.functions() {
            if !self.declare_global(&func.name, Symbol::Function) {
                continue;
            }

            for param in &func.params {
                if let Err(e) = self.check_type(&param.ty, param.span, TypeUsage::Value) {
                    self.errors.push(e);
                }
            }
            if let Some(ret) = &func.return_type {
                if *ret != ExpressionType::Void {
                    if let Err(e) = self.check_type(ret, func.span, TypeUsage::Value) {
                        self.errors.push(e);
                    }
                }
            }

            if let Some(stage) = func.entry {
                if func.params.is_empty() && func.result_type() == ExpressionType::Void {
                    self.entry_points.push(EntryPoint {
                        stage,
                        name: func.name.name.clone(),
                    });
                } else {
                    self.errors
                        .push(SanitizeError::invalid_entry_signature(&func.name.name, func.span));
                }
            }

            self.functions.insert(
                func.name.name.clone(),
                FunctionSignature {
                    params: func.params.iter().map(|p| p.ty.clone()).collect(),
                    return_type: func.result_type(),
                    entry: func.entry,
                },
            );
        }

        let has_functions = module.functions().next().is_some();
        let has_entry = module.functions().any(|f| f.entry.is_some());
        if self.options.require_entry_point && has_functions && !has_entry {
            self.errors.push(SanitizeError::missing_entry(module.span));
        }
    }

    fn check_type(&self, ty: &ExpressionType, span: Span, usage: TypeUsage) -> SanitizeResult<()> {
        if usage == TypeUsage::External && !matches!(ty, ExpressionType::Uniform(_)) {
            return Err(SanitizeError::invalid_type(
                format!("external entries must be uniform[...], found {}", ty),
                span,
            ));
        }
        match ty {
            ExpressionType::Primitive(_) => Ok(()),
            ExpressionType::Vector { component, size } => {
                if component.is_numeric() && (2..=4).contains(size) {
                    Ok(())
                } else {
                    Err(SanitizeError::invalid_type(
                        format!("{} is not a valid vector type", ty),
                        span,
                    ))
                }
            }
            ExpressionType::Struct(name) => {
                if self.is_struct(name) {
                    Ok(())
                } else {
                    Err(SanitizeError::invalid_type(format!("unknown type '{}'", name), span))
                }
            }
            ExpressionType::Uniform(name) => {
                if usage != TypeUsage::External {
                    Err(SanitizeError::invalid_type(
                        format!("{} is only allowed on external entries", ty),
                        span,
                    ))
                } else if self.is_struct(name) {
                    Ok(())
                } else {
                    Err(SanitizeError::invalid_type(format!("unknown type '{}'", name), span))
                }
            }
            ExpressionType::Void => Err(SanitizeError::invalid_type(
                "() is not a value type",
                span,
            )),
        }
    }

    fn is_struct(&self, name: &str) -> bool {
        matches!(self.symbols.lookup(name), Some(Symbol::Struct))
    }

    fn new_variable(&mut self, name: &str, ty: ExpressionType, kind: VariableKind) -> VariableId {
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(VariableInfo {
            name: name.to_string(),
            ty,
            kind,
        });
        id
    }

    fn declare_local(&mut self, name: &Ident, ty: ExpressionType, kind: VariableKind) -> SanitizeResult<VariableId> {
        let id = self.new_variable(&name.name, ty.clone(), kind);
        if self.symbols.declare(&name.name, Symbol::Variable { id, ty }) {
            Ok(id)
        } else {
            Err(SanitizeError::duplicate_declaration(&name.name, name.span))
        }
    }

    // ============ Functions and Statements ============

    fn sanitize_function(&mut self, func: &FunctionDecl) -> FunctionDecl {
        self.return_type = func.result_type();
        // Parameters share the scope of the body's top-level statements
        self.symbols.push_scope();

        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let id = match self.declare_local(&param.name, param.ty.clone(), VariableKind::Parameter) {
                Ok(id) => Some(id),
                Err(e) => {
                    self.errors.push(e);
                    None
                }
            };
            params.push(Param {
                id,
                ..param.clone()
            });
        }

        let errors_before = self.errors.len();
        let stmts = self.sanitize_statements(&func.body.stmts);
        self.symbols.pop_scope();

        // Statements that failed are dropped from `stmts`, so only judge clean bodies
        if self.errors.len() == errors_before
            && self.return_type != ExpressionType::Void
            && !always_returns(&stmts)
        {
            self.errors
                .push(SanitizeError::missing_return(&func.name.name, func.span));
        }

        FunctionDecl {
            name: func.name.clone(),
            entry: func.entry,
            params,
            return_type: func.return_type.clone(),
            body: Block {
                stmts,
                span: func.body.span,
            },
            span: func.span,
        }
    }

    fn sanitize_statements(&mut self, stmts: &[Statement]) -> Vec<Statement> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match self.sanitize_statement(stmt) {
                Ok(stmt) => out.push(stmt),
                Err(e) => self.errors.push(e),
            }
        }
        out
    }

    fn sanitize_block(&mut self, block: &Block) -> Block {
        if self.depth >= MAX_NESTING_DEPTH {
            self.errors.push(SanitizeError::nesting_too_deep(
                format!("blocks nest more than {} levels", MAX_NESTING_DEPTH),
                block.span,
            ));
            return Block {
                stmts: Vec::new(),
                span: block.span,
            };
        }
        self.depth += 1;
        self.symbols.push_scope();
        let stmts = self.sanitize_statements(&block.stmts);
        self.symbols.pop_scope();
        self.depth -= 1;
        Block {
            stmts,
            span: block.span,
        }
    }

    fn sanitize_statement(&mut self, stmt: &Statement) -> SanitizeResult<Statement> {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StmtKind::VariableDeclaration { name, ty, init, .. } => {
                if let Some(declared) = ty {
                    self.check_type(declared, span, TypeUsage::Value)?;
                }

                let init = match self.sanitize_expr(init) {
                    Ok(init) => init,
                    Err(e) => {
                        // Keep later uses of the name from cascading
                        if let Some(declared) = ty {
                            let _ = self.declare_local(name, declared.clone(), VariableKind::Local);
                        }
                        return Err(e);
                    }
                };

                let init_ty = type_of(&init);
                if matches!(init_ty, ExpressionType::Void | ExpressionType::Uniform(_)) {
                    return Err(SanitizeError::type_error(
                        format!("cannot store a value of type {} in '{}'", init_ty, name.name),
                        init.span,
                    ));
                }
                if let Some(declared) = ty {
                    if *declared != init_ty {
                        return Err(SanitizeError::type_mismatch(declared, &init_ty, init.span));
                    }
                }

                let id = self.declare_local(name, init_ty.clone(), VariableKind::Local)?;
                StmtKind::VariableDeclaration {
                    name: name.clone(),
                    ty: Some(init_ty),
                    init,
                    id: Some(id),
                }
            }

            StmtKind::Expression(expr) => {
                let expr = self.sanitize_expr(expr)?;
                if let Some(ExpressionType::Uniform(_)) = &expr.ty {
                    return Err(SanitizeError::type_error(
                        "uniform blocks can only be used through their fields",
                        expr.span,
                    ));
                }
                StmtKind::Expression(expr)
            }

            StmtKind::Return(value) => {
                let value = value
                    .as_ref()
                    .map(|v| self.sanitize_expr(v))
                    .transpose()?;
                let found = value.as_ref().map_or(ExpressionType::Void, type_of);
                if found != self.return_type {
                    return Err(SanitizeError::type_mismatch(&self.return_type, &found, span));
                }
                StmtKind::Return(value)
            }

            StmtKind::Block(block) => StmtKind::Block(self.sanitize_block(block)),

            StmtKind::Branch {
                condition,
                then_block,
                else_block,
            } => {
                let condition = self.sanitize_condition(condition);
                let then_block = self.sanitize_block(then_block);
                let else_block = else_block.as_ref().map(|b| self.sanitize_block(b));
                StmtKind::Branch {
                    condition: condition?,
                    then_block,
                    else_block,
                }
            }
        };
        Ok(Statement { kind, span })
    }

    fn sanitize_condition(&mut self, condition: &Expression) -> SanitizeResult<Expression> {
        let condition = self.sanitize_expr(condition)?;
        let ty = type_of(&condition);
        if ty != ExpressionType::bool() {
            return Err(SanitizeError::type_mismatch(
                &ExpressionType::bool(),
                &ty,
                condition.span,
            ));
        }
        Ok(condition)
    }

    // ============ Expressions ============

    fn sanitize_expr(&mut self, expr: &Expression) -> SanitizeResult<Expression> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(SanitizeError::nesting_too_deep(
                format!("expression nests more than {} levels", MAX_NESTING_DEPTH),
                expr.span,
            ));
        }
        self.depth += 1;
        let result = self.sanitize_expr_kind(expr);
        self.depth -= 1;
        result
    }

    fn sanitize_expr_kind(&mut self, expr: &Expression) -> SanitizeResult<Expression> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(Expression::typed(ExprKind::Literal(*lit), span, lit.ty())),

            ExprKind::Identifier(name) | ExprKind::Variable { name, .. } => {
                self.resolve_identifier(name, span)
            }

            ExprKind::AccessMember { base, fields } => {
                // Each field becomes its own node above `base`
                let extra = fields.len().saturating_sub(1);
                if self.depth + extra >= MAX_NESTING_DEPTH {
                    return Err(SanitizeError::nesting_too_deep(
                        format!("member access nests more than {} levels", MAX_NESTING_DEPTH),
                        span,
                    ));
                }
                self.depth += extra;
                let base = self.sanitize_expr(base);
                self.depth -= extra;
                let mut current = base?;
                for field in fields {
                    current = self.access_field(current, field)?;
                }
                Ok(current)
            }

            ExprKind::Swizzle { base, components } => {
                let base = self.sanitize_expr(base)?;
                self.swizzle(base, components.clone(), span)
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.sanitize_expr(lhs)?;
                let rhs = self.sanitize_expr(rhs)?;
                let ty = binary_type(*op, &type_of(&lhs), &type_of(&rhs), span)?;

                if let (ExprKind::Literal(a), ExprKind::Literal(b)) = (&lhs.kind, &rhs.kind) {
                    if let Some(folded) = fold::fold_binary(*op, *a, *b) {
                        return Ok(Expression::typed(ExprKind::Literal(folded), span, ty));
                    }
                }

                Ok(Expression::typed(
                    ExprKind::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                    ty,
                ))
            }

            ExprKind::Unary { op, operand } => {
                let operand = self.sanitize_expr(operand)?;
                let ty = type_of(&operand);
                let valid = match op {
                    UnaryOp::Minus => matches!(
                        ty.scalar(),
                        Some(PrimitiveType::F32) | Some(PrimitiveType::I32)
                    ),
                    UnaryOp::LogicalNot => ty == ExpressionType::bool(),
                };
                if !valid {
                    return Err(SanitizeError::type_error(
                        format!("cannot apply '{}' to {}", op.symbol(), ty),
                        span,
                    ));
                }

                if let ExprKind::Literal(value) = &operand.kind {
                    if let Some(folded) = fold::fold_unary(*op, *value) {
                        return Ok(Expression::typed(ExprKind::Literal(folded), span, ty));
                    }
                }

                Ok(Expression::typed(
                    ExprKind::Unary {
                        op: *op,
                        operand: Box::new(operand),
                    },
                    span,
                    ty,
                ))
            }

            ExprKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|a| self.sanitize_expr(a))
                    .collect::<SanitizeResult<Vec<_>>>()?;
                let ty = match Intrinsic::from_name(&callee.name) {
                    Some(intrinsic) => intrinsic_type(intrinsic, &args, span)?,
                    None => self.call_type(callee, &args, span)?,
                };
                Ok(Expression::typed(
                    ExprKind::Call {
                        callee: callee.clone(),
                        args,
                    },
                    span,
                    ty,
                ))
            }

            ExprKind::Cast { target, args } => {
                let args = args
                    .iter()
                    .map(|a| self.sanitize_expr(a))
                    .collect::<SanitizeResult<Vec<_>>>()?;
                self.check_cast(target, &args, span)?;

                if let [Expression {
                    kind: ExprKind::Literal(value),
                    ..
                }] = args.as_slice()
                {
                    if let Some(folded) = fold::fold_cast(target, *value) {
                        return Ok(Expression::typed(ExprKind::Literal(folded), span, target.clone()));
                    }
                }

                Ok(Expression::typed(
                    ExprKind::Cast {
                        target: target.clone(),
                        args,
                    },
                    span,
                    target.clone(),
                ))
            }

            ExprKind::Assign { target, value } => {
                let target = self.sanitize_expr(target)?;
                let value = self.sanitize_expr(value)?;
                self.check_assignable(&target)?;

                let target_ty = type_of(&target);
                let value_ty = type_of(&value);
                if target_ty != value_ty {
                    return Err(SanitizeError::type_mismatch(&target_ty, &value_ty, value.span));
                }

                Ok(Expression::typed(
                    ExprKind::Assign {
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    span,
                    ExpressionType::Void,
                ))
            }
        }
    }

    fn resolve_identifier(&self, name: &str, span: Span) -> SanitizeResult<Expression> {
        match self.symbols.lookup(name) {
            Some(Symbol::Variable { id, ty }) => Ok(Expression::typed(
                ExprKind::Variable {
                    id: *id,
                    name: name.to_string(),
                },
                span,
                ty.clone(),
            )),
            Some(Symbol::Struct) | Some(Symbol::Function) => Err(SanitizeError::type_error(
                format!("'{}' is not a value", name),
                span,
            )),
            None => Err(SanitizeError::unresolved_identifier(name, span)),
        }
    }

    /// One step of a member chain: a struct field, or a swizzle on a vector
    fn access_field(&self, base: Expression, field: &Ident) -> SanitizeResult<Expression> {
        let span = base.span.merge(field.span);
        let base_ty = type_of(&base);

        if let Some(struct_name) = base_ty.struct_name() {
            let field_ty = self
                .structs
                .get(struct_name)
                .and_then(|info| info.field(&field.name))
                .map(|(_, ty)| ty.clone())
                .ok_or_else(|| SanitizeError::unknown_field(&base_ty, &field.name, field.span))?;
            return Ok(Expression::typed(
                ExprKind::AccessMember {
                    base: Box::new(base),
                    fields: vec![field.clone()],
                },
                span,
                field_ty,
            ));
        }

        if let ExpressionType::Vector { .. } = base_ty {
            let components = parse_swizzle(&field.name).ok_or_else(|| {
                SanitizeError::invalid_swizzle(
                    format!("'{}' is not a swizzle of {}", field.name, base_ty),
                    field.span,
                )
            })?;
            return self.swizzle(base, components, span);
        }

        Err(SanitizeError::no_fields(&base_ty, &field.name, field.span))
    }

    fn swizzle(&self, base: Expression, components: Vec<u32>, span: Span) -> SanitizeResult<Expression> {
        let base_ty = type_of(&base);
        let (component, size) = match base_ty {
            ExpressionType::Vector { component, size } => (component, size),
            _ => {
                return Err(SanitizeError::invalid_swizzle(
                    format!("cannot swizzle a value of type {}", base_ty),
                    span,
                ))
            }
        };

        if components.is_empty() || components.len() > 4 {
            return Err(SanitizeError::invalid_swizzle(
                format!("a swizzle selects 1 to 4 components, found {}", components.len()),
                span,
            ));
        }
        if let Some(index) = components.iter().find(|&&c| c >= u32::from(size)) {
            return Err(SanitizeError::invalid_swizzle(
                format!("component {} is out of range for {}", index, base_ty),
                span,
            ));
        }

        let ty = match components.len() {
            1 => ExpressionType::Primitive(component),
            n => ExpressionType::vector(component, n as u8),
        };
        Ok(Expression::typed(
            ExprKind::Swizzle {
                base: Box::new(base),
                components,
            },
            span,
            ty,
        ))
    }

    fn call_type(&self, callee: &Ident, args: &[Expression], span: Span) -> SanitizeResult<ExpressionType> {
        let signature = self
            .functions
            .get(&callee.name)
            .ok_or_else(|| SanitizeError::unresolved_identifier(&callee.name, callee.span))?;

        if signature.entry.is_some() {
            return Err(SanitizeError::type_error(
                format!("entry function '{}' cannot be called", callee.name),
                span,
            ));
        }
        if signature.params.len() != args.len() {
            return Err(SanitizeError::type_error(
                format!(
                    "'{}' takes {} argument(s), {} given",
                    callee.name,
                    signature.params.len(),
                    args.len()
                ),
                span,
            ));
        }
        for (arg, expected) in args.iter().zip(&signature.params) {
            let found = type_of(arg);
            if found != *expected {
                return Err(SanitizeError::type_mismatch(expected, &found, arg.span));
            }
        }
        Ok(signature.return_type.clone())
    }

    fn check_cast(&self, target: &ExpressionType, args: &[Expression], span: Span) -> SanitizeResult<()> {
        match target {
            ExpressionType::Primitive(primitive) => {
                if !primitive.is_numeric() {
                    return Err(SanitizeError::invalid_type("cannot convert to bool", span));
                }
                let [arg] = args else {
                    return Err(SanitizeError::type_error(
                        format!("{} conversion takes exactly one argument", target),
                        span,
                    ));
                };
                match type_of(arg) {
                    ExpressionType::Primitive(p) if p.is_numeric() => Ok(()),
                    other => Err(SanitizeError::type_error(
                        format!("cannot convert {} to {}", other, target),
                        arg.span,
                    )),
                }
            }
            ExpressionType::Vector { component, size } => {
                self.check_type(target, span, TypeUsage::Value)?;
                let mut total = 0u32;
                for arg in args {
                    let ty = type_of(arg);
                    match (ty.scalar(), ty.component_count()) {
                        (Some(scalar), Some(count)) if scalar == *component => {
                            total += u32::from(count)
                        }
                        _ => {
                            return Err(SanitizeError::type_mismatch(
                                &ExpressionType::Primitive(*component),
                                &ty,
                                arg.span,
                            ))
                        }
                    }
                }
                let splat = matches!(args, [arg] if matches!(arg.ty, Some(ExpressionType::Primitive(_))));
                if !splat && total != u32::from(*size) {
                    return Err(SanitizeError::type_error(
                        format!("{} needs {} components, {} given", target, size, total),
                        span,
                    ));
                }
                Ok(())
            }
            _ => Err(SanitizeError::invalid_type(
                format!("cannot construct a value of type {}", target),
                span,
            )),
        }
    }

    fn check_assignable(&self, target: &Expression) -> SanitizeResult<()> {
        match &target.kind {
            ExprKind::Variable { id, name } => match self.variables.get(id.0 as usize) {
                Some(VariableInfo {
                    kind: VariableKind::External { .. },
                    ..
                }) => Err(SanitizeError::invalid_assignment(
                    format!("external '{}' is read-only", name),
                    target.span,
                )),
                _ => Ok(()),
            },
            ExprKind::AccessMember { base, .. } => self.check_assignable(base),
            ExprKind::Swizzle { base, components } => {
                let repeated = components
                    .iter()
                    .enumerate()
                    .any(|(i, c)| components[..i].contains(c));
                if repeated {
                    return Err(SanitizeError::invalid_assignment(
                        "cannot assign to a swizzle with repeated components",
                        target.span,
                    ));
                }
                self.check_assignable(base)
            }
            _ => Err(SanitizeError::invalid_assignment(
                "left-hand side is not assignable",
                target.span,
            )),
        }
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

fn type_of(expr: &Expression) -> ExpressionType {
    expr.ty.clone().unwrap_or(ExpressionType::Void)
}

fn binary_type(
    op: BinaryOp,
    lhs: &ExpressionType,
    rhs: &ExpressionType,
    span: Span,
) -> SanitizeResult<ExpressionType> {
    let mismatch = || {
        SanitizeError::type_error(
            format!("cannot apply '{}' to {} and {}", op.symbol(), lhs, rhs),
            span,
        )
    };

    if op.is_arithmetic() {
        if lhs == rhs && lhs.is_numeric() {
            return Ok(lhs.clone());
        }
        let f32_vector = |ty: &ExpressionType| {
            matches!(ty, ExpressionType::Vector { component: PrimitiveType::F32, .. })
        };
        if op == BinaryOp::Multiply {
            if f32_vector(lhs) && *rhs == ExpressionType::f32() {
                return Ok(lhs.clone());
            }
            if *lhs == ExpressionType::f32() && f32_vector(rhs) {
                return Ok(rhs.clone());
            }
        }
        return Err(mismatch());
    }

    if op.is_comparison() {
        let ordered = !matches!(op, BinaryOp::CompEq | BinaryOp::CompNe);
        let valid = lhs == rhs
            && match lhs {
                ExpressionType::Primitive(p) => !ordered || p.is_numeric(),
                _ => false,
            };
        return if valid { Ok(ExpressionType::bool()) } else { Err(mismatch()) };
    }

    // && and ||
    if *lhs == ExpressionType::bool() && *rhs == ExpressionType::bool() {
        Ok(ExpressionType::bool())
    } else {
        Err(mismatch())
    }
}

fn intrinsic_type(intrinsic: Intrinsic, args: &[Expression], span: Span) -> SanitizeResult<ExpressionType> {
    let arity = match intrinsic {
        Intrinsic::Length | Intrinsic::Normalize => 1,
        _ => 2,
    };
    if args.len() != arity {
        return Err(SanitizeError::type_error(
            format!("'{}' takes {} argument(s), {} given", intrinsic.name(), arity, args.len()),
            span,
        ));
    }

    let first = type_of(&args[0]);
    if let Some(second) = args.get(1) {
        let second_ty = type_of(second);
        if second_ty != first {
            return Err(SanitizeError::type_mismatch(&first, &second_ty, second.span));
        }
    }

    let float_vector = matches!(first, ExpressionType::Vector { component: PrimitiveType::F32, .. });
    let result = match intrinsic {
        Intrinsic::Dot | Intrinsic::Length if float_vector => Some(ExpressionType::f32()),
        Intrinsic::Normalize if float_vector => Some(first.clone()),
        Intrinsic::Cross if first == ExpressionType::vector(PrimitiveType::F32, 3) => {
            Some(first.clone())
        }
        Intrinsic::Min | Intrinsic::Max if first.is_numeric() => Some(first.clone()),
        _ => None,
    };
    result.ok_or_else(|| {
        SanitizeError::type_error(
            format!("'{}' cannot be applied to {}", intrinsic.name(), first),
            span,
        )
    })
}

/// Whether every path through `stmts` ends in a `return`
fn always_returns(stmts: &[Statement]) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(block) => always_returns(&block.stmts),
        StmtKind::Branch {
            then_block,
            else_block: Some(else_block),
            ..
        } => always_returns(&then_block.stmts) && always_returns(&else_block.stmts),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::parser::Parser;

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    fn parse(body: &str) -> Module {
        let source = format!("{}{}", HEADER, body);
        Parser::new(&source).unwrap().parse_module().unwrap()
    }

    fn sanitize_ok(body: &str) -> SanitizedModule {
        match sanitize(&parse(body)) {
            Ok(m) => m,
            Err(errors) => panic!("Sanitization failed: {:?}", errors),
        }
    }

    fn first_error(body: &str) -> SanitizeError {
        match sanitize(&parse(body)) {
            Ok(_) => panic!("Expected sanitization to fail"),
            Err(mut errors) => errors.remove(0),
        }
    }

    const NESTED: &str = "
struct innerStruct { field: vec3[f32] }
struct outerStruct { s: innerStruct }
external { [set(0), binding(0)] ubo: uniform[outerStruct] }
";

    fn entry_body(m: &SanitizedModule) -> &[Statement] {
        &m.module().functions().next().unwrap().body.stmts
    }

    fn let_init(stmt: &Statement) -> &Expression {
        match &stmt.kind {
            StmtKind::VariableDeclaration { init, .. } => init,
            other => panic!("Expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_access_is_normalized() {
        let m = sanitize_ok(&format!(
            "{}[entry(vert)] fn main() {{ let result: f32 = ubo.s.field.z; }}",
            NESTED
        ));
        let init = let_init(&entry_body(&m)[0]);
        assert_eq!(init.ty, Some(ExpressionType::f32()));

        let ExprKind::Swizzle { base, components } = &init.kind else {
            panic!("Expected swizzle, got {:?}", init.kind);
        };
        assert_eq!(components, &vec![2]);
        assert_eq!(base.ty, Some(ExpressionType::vector(PrimitiveType::F32, 3)));

        let ExprKind::AccessMember { base, fields } = &base.kind else {
            panic!("Expected member access");
        };
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "field");
        assert_eq!(base.ty, Some(ExpressionType::struct_("innerStruct")));

        let ExprKind::AccessMember { base, fields } = &base.kind else {
            panic!("Expected member access");
        };
        assert_eq!(fields[0].name, "s");
        assert!(matches!(base.kind, ExprKind::Variable { ref name, .. } if name == "ubo"));
    }

    #[test]
    fn test_builder_chain_forms_are_equivalent() {
        let header = || {
            vec![
                builder::declare_struct(
                    "innerStruct",
                    vec![builder::struct_field("field", ExpressionType::vector(PrimitiveType::F32, 3))],
                ),
                builder::declare_struct(
                    "outerStruct",
                    vec![builder::struct_field("s", ExpressionType::struct_("innerStruct"))],
                ),
                builder::declare_external(vec![builder::external_entry(
                    "ubo",
                    ExpressionType::uniform("outerStruct"),
                    0,
                    0,
                )]),
            ]
        };
        let build = |access: Expression| {
            let mut decls = header();
            decls.push(builder::declare_entry_function(
                ShaderStage::Vertex,
                "main",
                vec![builder::declare_variable(
                    "result",
                    Some(ExpressionType::f32()),
                    builder::swizzle(access, [2]),
                )],
            ));
            builder::module("1.0", decls)
        };

        let nested = build(builder::access_member(
            builder::access_member(builder::identifier("ubo"), ["s"]),
            ["field"],
        ));
        let flat = build(builder::access_member(builder::identifier("ubo"), ["s", "field"]));

        let nested = sanitize(&nested).unwrap();
        let flat = sanitize(&flat).unwrap();
        assert_eq!(nested.module(), flat.module());
    }

    #[test]
    fn test_ids_are_assigned() {
        let m = sanitize_ok(&format!(
            "{}fn helper(x: f32) -> f32 {{ return x; }}\n[entry(frag)] fn main() {{ let a = helper(1.0); }}",
            NESTED
        ));
        let kinds: Vec<_> = m.variables().iter().map(|v| (v.name.as_str(), &v.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("ubo", &VariableKind::External { set: 0, binding: 0 }),
                ("x", &VariableKind::Parameter),
                ("a", &VariableKind::Local),
            ]
        );
        let ext = m.module().externals().next().unwrap();
        assert_eq!(ext.id, Some(VariableId(0)));
        assert_eq!(m.bindings().get(0, 0).map(|b| b.name.as_str()), Some("ubo"));
    }

    #[test]
    fn test_inferred_let_type() {
        let m = sanitize_ok("[entry(frag)] fn main() { let v = vec3[f32](1.0, 2.0, 3.0); }");
        match &entry_body(&m)[0].kind {
            StmtKind::VariableDeclaration { ty, id, .. } => {
                assert_eq!(ty, &Some(ExpressionType::vector(PrimitiveType::F32, 3)));
                assert!(id.is_some());
            }
            other => panic!("Expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_struct_order_follows_containment() {
        let m = sanitize_ok(
            "struct Outer { inner: Inner }\nstruct Inner { v: f32 }\n[entry(vert)] fn main() {}",
        );
        let names: Vec<_> = m.structs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Inner", "Outer"]);
        assert_eq!(m.struct_info("Outer").and_then(|s| s.field_index("inner")), Some(0));
    }

    #[test]
    fn test_unresolved_identifier_has_position() {
        let source = format!("{}[entry(frag)] fn main() {{ let x = missing; }}", HEADER);
        let module = Parser::new(&source).unwrap().parse_module().unwrap();
        let errors = sanitize(&module).unwrap_err();
        assert_eq!(errors[0].kind, SanitizeErrorKind::UnresolvedIdentifier);
        let span = errors[0].span.unwrap();
        assert_eq!(span.text(&source), "missing");
        assert_eq!(span.position(&source).line, 3);
    }

    #[test]
    fn test_duplicate_binding() {
        let err = first_error(
            "struct Data { v: f32 }
external {
    [set(0), binding(0)] a: uniform[Data],
    [set(0), binding(0)] b: uniform[Data]
}",
        );
        assert_eq!(err.kind, SanitizeErrorKind::DuplicateBinding);
    }

    #[test]
    fn test_swizzle_out_of_range() {
        let err = first_error(&format!(
            "{}[entry(vert)] fn main() {{ let x = ubo.s.field.w; }}",
            NESTED
        ));
        assert_eq!(err.kind, SanitizeErrorKind::InvalidSwizzleComponent);

        let module = builder::module(
            "1.0",
            vec![builder::declare_entry_function(
                ShaderStage::Vertex,
                "main",
                vec![builder::declare_variable(
                    "v",
                    None,
                    builder::swizzle(
                        builder::cast(
                            ExpressionType::vector(PrimitiveType::F32, 3),
                            vec![builder::constant_f32(1.0)],
                        ),
                        [5],
                    ),
                )],
            )],
        );
        let errors = sanitize(&module).unwrap_err();
        assert_eq!(errors[0].kind, SanitizeErrorKind::InvalidSwizzleComponent);
        assert_eq!(errors[0].span, None);
    }

    #[test]
    fn test_unknown_field() {
        let err = first_error(&format!(
            "{}[entry(vert)] fn main() {{ let x = ubo.t; }}",
            NESTED
        ));
        assert_eq!(err.kind, SanitizeErrorKind::InvalidFieldAccess);

        let err = first_error("[entry(vert)] fn main() { let a = 1.0; let b = a.field; }");
        assert_eq!(err.kind, SanitizeErrorKind::InvalidFieldAccess);
    }

    #[test]
    fn test_missing_entry() {
        let err = first_error("fn helper() {}");
        assert_eq!(err.kind, SanitizeErrorKind::MissingEntryAttribute);

        let options = SanitizeOptions {
            require_entry_point: false,
        };
        let result = Sanitizer::with_options(options).sanitize(&parse("fn helper() {}"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_entry_signature() {
        let err = first_error("[entry(frag)] fn main(x: f32) {}");
        assert_eq!(err.kind, SanitizeErrorKind::InvalidEntrySignature);
    }

    #[test]
    fn test_duplicate_declarations() {
        let err = first_error("struct A { x: f32 }\nstruct A { y: f32 }");
        assert_eq!(err.kind, SanitizeErrorKind::DuplicateDeclaration);

        let err = first_error("[entry(frag)] fn main() { let x = 1; let x = 2; }");
        assert_eq!(err.kind, SanitizeErrorKind::DuplicateDeclaration);

        let err = first_error("struct dot { x: f32 }");
        assert_eq!(err.kind, SanitizeErrorKind::DuplicateDeclaration);
    }

    #[test]
    fn test_type_constructor_names_are_reserved() {
        for name in ["vec2", "vec3", "vec4", "uniform"] {
            let err = first_error(&format!("struct {} {{ x: f32 }}", name));
            assert_eq!(err.kind, SanitizeErrorKind::DuplicateDeclaration);
            assert!(err.message.contains("built-in name"));
        }

        let err = first_error("fn vec3() {}\n[entry(frag)] fn main() {}");
        assert_eq!(err.kind, SanitizeErrorKind::DuplicateDeclaration);

        let err = first_error(
            "struct S { v: f32 }\nexternal { [set(0), binding(0)] uniform: uniform[S] }",
        );
        assert_eq!(err.kind, SanitizeErrorKind::DuplicateDeclaration);
    }

    #[test]
    fn test_shadowing_in_nested_block() {
        sanitize_ok("[entry(frag)] fn main() { let x = 1; { let x = 2.0; } let y: i32 = x; }");
    }

    #[test]
    fn test_scope_ends_with_block() {
        let err = first_error("[entry(frag)] fn main() { { let x = 1; } let y = x; }");
        assert_eq!(err.kind, SanitizeErrorKind::UnresolvedIdentifier);
    }

    #[test]
    fn test_type_mismatch() {
        let err = first_error("[entry(frag)] fn main() { let x: f32 = 1; }");
        assert_eq!(err.kind, SanitizeErrorKind::TypeMismatch);

        let err = first_error("[entry(frag)] fn main() { let x = 1 + 1.0; }");
        assert_eq!(err.kind, SanitizeErrorKind::TypeMismatch);

        let err = first_error("[entry(frag)] fn main() { if 1 { } }");
        assert_eq!(err.kind, SanitizeErrorKind::TypeMismatch);
    }

    #[test]
    fn test_vector_scalar_multiply() {
        let m = sanitize_ok(
            "[entry(frag)] fn main() { let v = vec2[f32](1.0, 2.0); let w = v * 2.0; let u = 0.5 * v; }",
        );
        let body = entry_body(&m);
        assert_eq!(let_init(&body[1]).ty, Some(ExpressionType::vector(PrimitiveType::F32, 2)));
        assert_eq!(let_init(&body[2]).ty, Some(ExpressionType::vector(PrimitiveType::F32, 2)));
    }

    #[test]
    fn test_intrinsics() {
        let m = sanitize_ok(
            "[entry(frag)] fn main() {
                let a = vec3[f32](1.0, 0.0, 0.0);
                let d = dot(a, a);
                let c = cross(a, a);
                let m = max(1, 2);
            }",
        );
        let body = entry_body(&m);
        assert_eq!(let_init(&body[1]).ty, Some(ExpressionType::f32()));
        assert_eq!(let_init(&body[2]).ty, Some(ExpressionType::vector(PrimitiveType::F32, 3)));
        assert_eq!(let_init(&body[3]).ty, Some(ExpressionType::i32()));

        let err = first_error("[entry(frag)] fn main() { let l = length(1.0); }");
        assert_eq!(err.kind, SanitizeErrorKind::TypeMismatch);
    }

    #[test]
    fn test_constant_folding() {
        let m = sanitize_ok("[entry(frag)] fn main() { let x = 2 * 3 + 1; let y = -(4.0 / 2.0); }");
        let body = entry_body(&m);
        assert_eq!(let_init(&body[0]).kind, ExprKind::Literal(Literal::I32(7)));
        assert_eq!(let_init(&body[1]).kind, ExprKind::Literal(Literal::F32(-2.0)));

        let m = sanitize_ok("[entry(frag)] fn main() { let z = 1 / 0; }");
        assert!(matches!(let_init(&entry_body(&m)[0]).kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_assignment_rules() {
        sanitize_ok("[entry(frag)] fn main() { let v = vec3[f32](0.0); v.xy = vec2[f32](1.0, 2.0); }");

        let err = first_error(&format!(
            "{}[entry(vert)] fn main() {{ ubo.s.field = vec3[f32](0.0); }}",
            NESTED
        ));
        assert_eq!(err.kind, SanitizeErrorKind::InvalidAssignment);

        let err = first_error("[entry(frag)] fn main() { let v = vec2[f32](0.0); v.xx = v; }");
        assert_eq!(err.kind, SanitizeErrorKind::InvalidAssignment);

        let err = first_error("[entry(frag)] fn main() { 1 = 2; }");
        assert_eq!(err.kind, SanitizeErrorKind::InvalidAssignment);
    }

    #[test]
    fn test_missing_return() {
        let source = "fn f(b: bool) -> i32 { if b { return 1; } }\n[entry(frag)] fn main() {}";
        assert_eq!(first_error(source).kind, SanitizeErrorKind::MissingReturn);

        sanitize_ok(
            "fn f(b: bool) -> i32 { if b { return 1; } else { return 2; } }\n[entry(frag)] fn main() {}",
        );
    }

    #[test]
    fn test_recursive_struct() {
        let err = first_error("struct A { b: B }\nstruct B { a: A }");
        assert_eq!(err.kind, SanitizeErrorKind::RecursiveStruct);
    }

    #[test]
    fn test_invalid_types() {
        let err = first_error("struct A { b: Missing }");
        assert_eq!(err.kind, SanitizeErrorKind::InvalidType);

        let err = first_error("struct A { x: f32 }\nexternal { [set(0), binding(0)] a: A }");
        assert_eq!(err.kind, SanitizeErrorKind::InvalidType);
    }

    #[test]
    fn test_errors_are_collected() {
        let errors = sanitize(&parse(
            "[entry(frag)] fn main() { let a = x; let b = y; }",
        ))
        .unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_resanitizing_is_stable() {
        let first = sanitize_ok(&format!(
            "{}[entry(vert)] fn main() {{ let result: f32 = ubo.s.field.z; }}",
            NESTED
        ));
        let second = sanitize(first.module()).unwrap();
        assert_eq!(first.module(), second.module());
    }

    fn entry_module(body: Vec<Statement>) -> Module {
        builder::module("1.0", vec![builder::declare_entry_function(ShaderStage::Fragment, "main", body)])
    }

    fn only_error(module: &Module) -> SanitizeErrorKind {
        let errors = sanitize(module).unwrap_err();
        assert_eq!(errors.len(), 1, "{:?}", errors);
        errors[0].kind
    }

    #[test]
    fn test_deep_builder_trees_are_rejected() {
        let mut negated = builder::constant_f32(1.0);
        for _ in 0..1000 {
            negated = builder::unary(UnaryOp::Minus, negated);
        }
        let module = entry_module(vec![builder::declare_variable("x", None, negated)]);
        assert_eq!(only_error(&module), SanitizeErrorKind::NestingTooDeep);

        let mut sum = builder::constant_i32(1);
        for _ in 0..1000 {
            sum = builder::binary(BinaryOp::Add, sum, builder::constant_i32(1));
        }
        let module = entry_module(vec![builder::declare_variable("x", None, sum)]);
        assert_eq!(only_error(&module), SanitizeErrorKind::NestingTooDeep);

        let mut blocks = builder::block_statement(Vec::new());
        for _ in 0..1000 {
            blocks = builder::block_statement(vec![blocks]);
        }
        assert_eq!(only_error(&entry_module(vec![blocks])), SanitizeErrorKind::NestingTooDeep);
    }

    #[test]
    fn test_long_member_chain_is_rejected() {
        let fields: Vec<String> = (0..500).map(|_| "x".to_string()).collect();
        let access = builder::access_member(builder::identifier("v"), fields);
        let module = entry_module(vec![
            builder::declare_variable("v", None, builder::constant_f32(1.0)),
            builder::declare_variable("y", None, access),
        ]);
        assert_eq!(only_error(&module), SanitizeErrorKind::NestingTooDeep);
    }

    #[test]
    fn test_deep_struct_nesting_is_rejected() {
        let source: String = (0..200)
            .map(|i| format!("struct S{} {{ next: S{} }}\n", i, i + 1))
            .chain(std::iter::once("struct S200 { v: f32 }\n".to_string()))
            .collect();
        let errors = sanitize(&parse(&source)).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, SanitizeErrorKind::NestingTooDeep);
    }

    #[test]
    fn test_moderate_depth_is_accepted() {
        let mut negated = builder::constant_f32(1.0);
        for _ in 0..32 {
            negated = builder::unary(UnaryOp::Minus, builder::unary(UnaryOp::Minus, negated));
        }
        let m = sanitize(&entry_module(vec![builder::declare_variable("x", None, negated)])).unwrap();
        assert_eq!(let_init(&entry_body(&m)[0]).kind, ExprKind::Literal(Literal::F32(1.0)));
    }
}
