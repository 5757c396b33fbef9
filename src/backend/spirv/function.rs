//! Lowering of function bodies to SPIR-V

use super::builder::{ModuleBuilder, StorageClass};
use super::instruction::{Id, Instruction, Op, Operand};
use crate::ast::*;
use crate::backend::{BackendError, BackendResult};
use std::collections::HashMap;

/// GLSL.std.450 extended instruction numbers
mod glsl_std {
    pub const LENGTH: u32 = 66;
    pub const NORMALIZE: u32 = 69;
    pub const CROSS: u32 = 68;
    pub const F_MIN: u32 = 37;
    pub const U_MIN: u32 = 38;
    pub const S_MIN: u32 = 39;
    pub const F_MAX: u32 = 40;
    pub const U_MAX: u32 = 41;
    pub const S_MAX: u32 = 42;
}

/// A variable's storage: pointer id and storage class
#[derive(Debug, Clone, Copy)]
struct Pointer {
    id: Id,
    storage: StorageClass,
}

/// Emits one function. Local variables are collected separately so they can
/// all be placed at the top of the entry block.
pub struct FunctionEmitter<'b, 'a> {
    builder: &'b mut ModuleBuilder<'a>,
    functions: &'b HashMap<String, Id>,
    variables: HashMap<VariableId, Pointer>,
    locals: Vec<Instruction>,
    body: Vec<Instruction>,
    /// The current block already ended with a terminator
    terminated: bool,
}

impl<'b, 'a> FunctionEmitter<'b, 'a> {
    pub fn new(
        builder: &'b mut ModuleBuilder<'a>,
        functions: &'b HashMap<String, Id>,
        globals: &HashMap<VariableId, Id>,
    ) -> Self {
        let variables = globals
            .iter()
            .map(|(var, id)| {
                let pointer = Pointer {
                    id: *id,
                    storage: StorageClass::Uniform,
                };
                (*var, pointer)
            })
            .collect();
        Self {
            builder,
            functions,
            variables,
            locals: Vec::new(),
            body: Vec::new(),
            terminated: false,
        }
    }

    pub fn emit(mut self, func: &FunctionDecl, id: Id) -> BackendResult<Vec<Instruction>> {
        let return_type = func.result_type();
        let param_types: Vec<ExpressionType> = func.params.iter().map(|p| p.ty.clone()).collect();
        let function_type = self.builder.function_type(&return_type, &param_types);
        let return_type_id = self.builder.type_id(&return_type);
        self.builder.name(id, &func.name.name);

        let mut header = vec![Instruction::new(
            Op::Function,
            Some(return_type_id),
            Some(id),
            vec![Operand::Enum("None", 0), function_type.into()],
        )];

        // Parameters are copied into variables so the body can assign them
        for param in &func.params {
            let value = self.builder.fresh_id();
            let ty = self.builder.type_id(&param.ty);
            header.push(Instruction::new(Op::FunctionParameter, Some(ty), Some(value), vec![]));
            let pointer = self.local_variable(&param.ty, &param.name.name);
            self.bind(param.id, pointer)?;
            self.store(pointer.id, value);
        }

        let entry = self.builder.fresh_id();
        header.push(Instruction::new(Op::Label, None, Some(entry), vec![]));

        self.emit_block(&func.body.stmts)?;
        if !self.terminated {
            let op = if return_type == ExpressionType::Void {
                Op::Return
            } else {
                Op::Unreachable
            };
            self.body.push(Instruction::plain(op, vec![]));
        }

        let mut instructions = header;
        instructions.append(&mut self.locals);
        instructions.append(&mut self.body);
        instructions.push(Instruction::plain(Op::FunctionEnd, vec![]));
        Ok(instructions)
    }

    fn bind(&mut self, id: Option<VariableId>, pointer: Pointer) -> BackendResult<()> {
        let id = id.ok_or_else(|| BackendError::unsupported("variable without an id"))?;
        self.variables.insert(id, pointer);
        Ok(())
    }

    fn local_variable(&mut self, ty: &ExpressionType, name: &str) -> Pointer {
        let pointer_type = self.builder.pointer_type(StorageClass::Function, ty);
        let id = self.builder.fresh_id();
        self.locals.push(Instruction::new(
            Op::Variable,
            Some(pointer_type),
            Some(id),
            vec![StorageClass::Function.operand()],
        ));
        self.builder.name(id, name);
        Pointer {
            id,
            storage: StorageClass::Function,
        }
    }

    fn push_result(&mut self, op: Op, ty: &ExpressionType, operands: Vec<Operand>) -> Id {
        let ty = self.builder.type_id(ty);
        let id = self.builder.fresh_id();
        self.body.push(Instruction::new(op, Some(ty), Some(id), operands));
        id
    }

    fn store(&mut self, pointer: Id, value: Id) {
        self.body
            .push(Instruction::plain(Op::Store, vec![pointer.into(), value.into()]));
    }

    fn start_block(&mut self, label: Id) {
        self.body.push(Instruction::new(Op::Label, None, Some(label), vec![]));
        self.terminated = false;
    }

    fn terminate(&mut self, instruction: Instruction) {
        self.body.push(instruction);
        self.terminated = true;
    }

    // ============ Statements ============

    fn emit_block(&mut self, stmts: &[Statement]) -> BackendResult<()> {
        for stmt in stmts {
            // Anything after a return is unreachable
            if self.terminated {
                break;
            }
            self.emit_statement(stmt)?;
        }
        Ok(())
    }

    fn emit_statement(&mut self, stmt: &Statement) -> BackendResult<()> {
        match &stmt.kind {
            StmtKind::VariableDeclaration { name, ty, init, id } => {
                let value = self.emit_value(init)?;
                let ty = match ty {
                    Some(ty) => ty.clone(),
                    None => type_of(init)?,
                };
                let pointer = self.local_variable(&ty, &name.name);
                self.bind(*id, pointer)?;
                self.store(pointer.id, value);
            }

            StmtKind::Expression(expr) => match &expr.kind {
                ExprKind::Assign { target, value } => self.emit_assign(target, value)?,
                _ => {
                    self.emit_value(expr)?;
                }
            },

            StmtKind::Return(value) => {
                let instruction = match value {
                    Some(value) => {
                        let value = self.emit_value(value)?;
                        Instruction::plain(Op::ReturnValue, vec![value.into()])
                    }
                    None => Instruction::plain(Op::Return, vec![]),
                };
                self.terminate(instruction);
            }

            StmtKind::Block(block) => self.emit_block(&block.stmts)?,

            StmtKind::Branch {
                condition,
                then_block,
                else_block,
            } => {
                let condition = self.emit_value(condition)?;
                let merge = self.builder.fresh_id();
                let then_label = self.builder.fresh_id();
                let else_label = match else_block {
                    Some(_) => self.builder.fresh_id(),
                    None => merge,
                };

                self.body.push(Instruction::plain(
                    Op::SelectionMerge,
                    vec![merge.into(), Operand::Enum("None", 0)],
                ));
                self.terminate(Instruction::plain(
                    Op::BranchConditional,
                    vec![condition.into(), then_label.into(), else_label.into()],
                ));

                self.start_block(then_label);
                self.emit_block(&then_block.stmts)?;
                if !self.terminated {
                    self.terminate(Instruction::plain(Op::Branch, vec![merge.into()]));
                }

                if let Some(else_block) = else_block {
                    self.start_block(else_label);
                    self.emit_block(&else_block.stmts)?;
                    if !self.terminated {
                        self.terminate(Instruction::plain(Op::Branch, vec![merge.into()]));
                    }
                }

                self.start_block(merge);
            }
        }
        Ok(())
    }

    fn emit_assign(&mut self, target: &Expression, value: &Expression) -> BackendResult<()> {
        let value = self.emit_value(value)?;
        let pointer = match &target.kind {
            ExprKind::Swizzle { base, components } => {
                let [component] = components.as_slice() else {
                    return Err(BackendError::unsupported(
                        "assignment to a multi-component swizzle",
                    ));
                };
                let base = self
                    .emit_pointer(base)?
                    .ok_or_else(|| BackendError::unsupported("swizzle target is not addressable"))?;
                let ty = type_of(target)?;
                let pointer_type = self.builder.pointer_type(base.storage, &ty);
                let index = self.builder.index(*component);
                let id = self.builder.fresh_id();
                self.body.push(Instruction::new(
                    Op::AccessChain,
                    Some(pointer_type),
                    Some(id),
                    vec![base.id.into(), index.into()],
                ));
                id
            }
            _ => {
                self.emit_pointer(target)?
                    .ok_or_else(|| BackendError::unsupported("expression is not assignable"))?
                    .id
            }
        };
        self.store(pointer, value);
        Ok(())
    }

    // ============ Expressions ============

    /// Pointer to the storage behind a variable or a member chain rooted at
    /// one; a whole chain becomes a single access chain.
    fn emit_pointer(&mut self, expr: &Expression) -> BackendResult<Option<Pointer>> {
        match &expr.kind {
            ExprKind::Variable { id, name } => self
                .variables
                .get(id)
                .copied()
                .map(Some)
                .ok_or_else(|| BackendError::unsupported(format!("unknown variable '{}'", name))),
            ExprKind::AccessMember { .. } => {
                let (root, path) = self.member_path(expr)?;
                let root = match &root.kind {
                    ExprKind::Variable { .. } => self.emit_pointer(root)?,
                    _ => None,
                };
                let Some(root) = root else {
                    return Ok(None);
                };

                let ty = type_of(expr)?;
                let pointer_type = self.builder.pointer_type(root.storage, &ty);
                let mut operands = vec![Operand::Id(root.id)];
                for index in path {
                    operands.push(Operand::Id(self.builder.index(index)));
                }
                let id = self.builder.fresh_id();
                self.body.push(Instruction::new(
                    Op::AccessChain,
                    Some(pointer_type),
                    Some(id),
                    operands,
                ));
                Ok(Some(Pointer {
                    id,
                    storage: root.storage,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Root of a member chain and the field indices leading from it
    fn member_path<'e>(&self, expr: &'e Expression) -> BackendResult<(&'e Expression, Vec<u32>)> {
        let ExprKind::AccessMember { base, fields } = &expr.kind else {
            return Ok((expr, Vec::new()));
        };
        let (root, mut path) = self.member_path(base)?;
        let mut ty = type_of(base)?;
        for field in fields {
            let (index, field_ty) = self.field(&ty, &field.name)?;
            path.push(index);
            ty = field_ty;
        }
        Ok((root, path))
    }

    fn field(&self, ty: &ExpressionType, name: &str) -> BackendResult<(u32, ExpressionType)> {
        ty.struct_name()
            .and_then(|s| self.builder.sanitized().struct_info(s))
            .and_then(|info| info.field(name))
            .map(|(index, ty)| (index as u32, ty.clone()))
            .ok_or_else(|| BackendError::unsupported(format!("unknown field '{}' on {}", name, ty)))
    }

    fn emit_value(&mut self, expr: &Expression) -> BackendResult<Id> {
        let ty = type_of(expr)?;
        match &expr.kind {
            ExprKind::Literal(value) => Ok(self.builder.constant(*value)),

            ExprKind::Variable { .. } | ExprKind::AccessMember { .. } => {
                if let Some(pointer) = self.emit_pointer(expr)? {
                    return Ok(self.push_result(Op::Load, &ty, vec![pointer.id.into()]));
                }
                // Member chain on a temporary value
                let (root, path) = self.member_path(expr)?;
                let value = self.emit_value(root)?;
                let mut operands = vec![Operand::Id(value)];
                operands.extend(path.into_iter().map(Operand::Literal));
                Ok(self.push_result(Op::CompositeExtract, &ty, operands))
            }

            ExprKind::Swizzle { base, components } => {
                let base = self.emit_value(base)?;
                if let [component] = components.as_slice() {
                    return Ok(self.push_result(
                        Op::CompositeExtract,
                        &ty,
                        vec![base.into(), Operand::Literal(*component)],
                    ));
                }
                let mut operands = vec![Operand::Id(base), Operand::Id(base)];
                operands.extend(components.iter().map(|c| Operand::Literal(*c)));
                Ok(self.push_result(Op::VectorShuffle, &ty, operands))
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = type_of(lhs)?;
                let rhs_ty = type_of(rhs)?;
                let l = self.emit_value(lhs)?;
                let r = self.emit_value(rhs)?;

                if *op == BinaryOp::Multiply && lhs_ty != rhs_ty {
                    let (vector, scalar) = match lhs_ty {
                        ExpressionType::Vector { .. } => (l, r),
                        _ => (r, l),
                    };
                    return Ok(self.push_result(
                        Op::VectorTimesScalar,
                        &ty,
                        vec![vector.into(), scalar.into()],
                    ));
                }

                let scalar = lhs_ty
                    .scalar()
                    .ok_or_else(|| BackendError::unsupported(format!("operands of type {}", lhs_ty)))?;
                Ok(self.push_result(binary_opcode(*op, scalar), &ty, vec![l.into(), r.into()]))
            }

            ExprKind::Unary { op, operand } => {
                let value = self.emit_value(operand)?;
                let opcode = match (op, ty.scalar()) {
                    (UnaryOp::Minus, Some(PrimitiveType::F32)) => Op::FNegate,
                    (UnaryOp::Minus, _) => Op::SNegate,
                    (UnaryOp::LogicalNot, _) => Op::LogicalNot,
                };
                Ok(self.push_result(opcode, &ty, vec![value.into()]))
            }

            ExprKind::Call { callee, args } => {
                let scalar = match args.first() {
                    Some(arg) => type_of(arg)?.scalar(),
                    None => None,
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(Operand::Id(self.emit_value(arg)?));
                }

                match Intrinsic::from_name(&callee.name) {
                    Some(Intrinsic::Dot) => Ok(self.push_result(Op::Dot, &ty, values)),
                    Some(intrinsic) => {
                        let number = extended_instruction(intrinsic, scalar);
                        let mut operands = vec![
                            Operand::Id(self.builder.glsl_std()),
                            Operand::Literal(number),
                        ];
                        operands.extend(values);
                        Ok(self.push_result(Op::ExtInst, &ty, operands))
                    }
                    None => {
                        let function = self.functions.get(&callee.name).copied().ok_or_else(|| {
                            BackendError::unsupported(format!("unknown function '{}'", callee.name))
                        })?;
                        let mut operands = vec![Operand::Id(function)];
                        operands.extend(values);
                        Ok(self.push_result(Op::FunctionCall, &ty, operands))
                    }
                }
            }

            ExprKind::Cast { target, args } => self.emit_cast(target, args),

            ExprKind::Assign { .. } => Err(BackendError::unsupported("assignment used as a value")),

            ExprKind::Identifier(name) => Err(BackendError::unsupported(format!(
                "unresolved identifier '{}'",
                name
            ))),
        }
    }

    fn emit_cast(&mut self, target: &ExpressionType, args: &[Expression]) -> BackendResult<Id> {
        match target {
            ExpressionType::Primitive(to) => {
                let [arg] = args else {
                    return Err(BackendError::unsupported("conversion with several arguments"));
                };
                let from = type_of(arg)?.scalar();
                let value = self.emit_value(arg)?;
                let opcode = match (from, to) {
                    (Some(from), to) if from == *to => return Ok(value),
                    (Some(PrimitiveType::F32), PrimitiveType::I32) => Op::ConvertFToS,
                    (Some(PrimitiveType::F32), PrimitiveType::U32) => Op::ConvertFToU,
                    (Some(PrimitiveType::I32), PrimitiveType::F32) => Op::ConvertSToF,
                    (Some(PrimitiveType::U32), PrimitiveType::F32) => Op::ConvertUToF,
                    _ => Op::Bitcast,
                };
                Ok(self.push_result(opcode, target, vec![value.into()]))
            }
            ExpressionType::Vector { size, .. } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.emit_value(arg)?);
                }
                if let ([value], [arg]) = (values.as_slice(), args) {
                    match type_of(arg)? {
                        ExpressionType::Primitive(_) => {
                            let operands = vec![Operand::Id(*value); usize::from(*size)];
                            return Ok(self.push_result(Op::CompositeConstruct, target, operands));
                        }
                        _ => return Ok(*value),
                    }
                }
                let operands = values.into_iter().map(Operand::Id).collect();
                Ok(self.push_result(Op::CompositeConstruct, target, operands))
            }
            _ => Err(BackendError::unsupported(format!("construction of {}", target))),
        }
    }
}

fn type_of(expr: &Expression) -> BackendResult<ExpressionType> {
    expr.ty
        .clone()
        .ok_or_else(|| BackendError::unsupported("expression has no resolved type"))
}

fn binary_opcode(op: BinaryOp, scalar: PrimitiveType) -> Op {
    use PrimitiveType::{Bool, F32, I32};
    match (op, scalar) {
        (BinaryOp::Add, F32) => Op::FAdd,
        (BinaryOp::Add, _) => Op::IAdd,
        (BinaryOp::Subtract, F32) => Op::FSub,
        (BinaryOp::Subtract, _) => Op::ISub,
        (BinaryOp::Multiply, F32) => Op::FMul,
        (BinaryOp::Multiply, _) => Op::IMul,
        (BinaryOp::Divide, F32) => Op::FDiv,
        (BinaryOp::Divide, I32) => Op::SDiv,
        (BinaryOp::Divide, _) => Op::UDiv,
        (BinaryOp::CompEq, Bool) => Op::LogicalEqual,
        (BinaryOp::CompEq, F32) => Op::FOrdEqual,
        (BinaryOp::CompEq, _) => Op::IEqual,
        (BinaryOp::CompNe, Bool) => Op::LogicalNotEqual,
        (BinaryOp::CompNe, F32) => Op::FOrdNotEqual,
        (BinaryOp::CompNe, _) => Op::INotEqual,
        (BinaryOp::CompLt, F32) => Op::FOrdLessThan,
        (BinaryOp::CompLt, I32) => Op::SLessThan,
        (BinaryOp::CompLt, _) => Op::ULessThan,
        (BinaryOp::CompLe, F32) => Op::FOrdLessThanEqual,
        (BinaryOp::CompLe, I32) => Op::SLessThanEqual,
        (BinaryOp::CompLe, _) => Op::ULessThanEqual,
        (BinaryOp::CompGt, F32) => Op::FOrdGreaterThan,
        (BinaryOp::CompGt, I32) => Op::SGreaterThan,
        (BinaryOp::CompGt, _) => Op::UGreaterThan,
        (BinaryOp::CompGe, F32) => Op::FOrdGreaterThanEqual,
        (BinaryOp::CompGe, I32) => Op::SGreaterThanEqual,
        (BinaryOp::CompGe, _) => Op::UGreaterThanEqual,
        (BinaryOp::LogicalAnd, _) => Op::LogicalAnd,
        (BinaryOp::LogicalOr, _) => Op::LogicalOr,
    }
}

fn extended_instruction(intrinsic: Intrinsic, scalar: Option<PrimitiveType>) -> u32 {
    let float = scalar == Some(PrimitiveType::F32);
    let signed = scalar == Some(PrimitiveType::I32);
    match intrinsic {
        Intrinsic::Length => glsl_std::LENGTH,
        Intrinsic::Normalize => glsl_std::NORMALIZE,
        Intrinsic::Cross => glsl_std::CROSS,
        Intrinsic::Min if float => glsl_std::F_MIN,
        Intrinsic::Min if signed => glsl_std::S_MIN,
        Intrinsic::Min => glsl_std::U_MIN,
        Intrinsic::Max if float => glsl_std::F_MAX,
        Intrinsic::Max if signed => glsl_std::S_MAX,
        Intrinsic::Max => glsl_std::U_MAX,
        // OpDot is a core instruction
        Intrinsic::Dot => 0,
    }
}
