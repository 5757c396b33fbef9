//! SPIR-V module builder
//!
//! Allocates ids, deduplicates types and constants, and keeps each logical
//! section of the module in its own instruction list so that declarations can
//! be created lazily while function bodies are emitted.

use super::instruction::{Id, Instruction, Op, Operand};
use super::layout;
use super::SpirvModule;
use crate::ast::{ExpressionType, Literal, PrimitiveType};
use crate::sanitizer::SanitizedModule;
use std::collections::HashMap;

pub const MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    Uniform,
    Function,
}

impl StorageClass {
    pub fn operand(self) -> Operand {
        match self {
            StorageClass::Uniform => Operand::Enum("Uniform", 2),
            StorageClass::Function => Operand::Enum("Function", 7),
        }
    }
}

/// Decorations used by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoration {
    Block,
    Binding(u32),
    DescriptorSet(u32),
    Offset(u32),
}

impl Decoration {
    fn operands(self) -> Vec<Operand> {
        match self {
            Decoration::Block => vec![Operand::Enum("Block", 2)],
            Decoration::Binding(v) => vec![Operand::Enum("Binding", 33), Operand::Literal(v)],
            Decoration::DescriptorSet(v) => {
                vec![Operand::Enum("DescriptorSet", 34), Operand::Literal(v)]
            }
            Decoration::Offset(v) => vec![Operand::Enum("Offset", 35), Operand::Literal(v)],
        }
    }
}

/// Builder for constructing a SPIR-V module
pub struct ModuleBuilder<'a> {
    module: &'a SanitizedModule,
    /// Next result id
    next_id: u32,
    capabilities: Vec<Instruction>,
    ext_imports: Vec<Instruction>,
    memory_model: Vec<Instruction>,
    entry_points: Vec<Instruction>,
    execution_modes: Vec<Instruction>,
    debug: Vec<Instruction>,
    annotations: Vec<Instruction>,
    /// Types, constants and global variables, in dependency order
    globals: Vec<Instruction>,
    functions: Vec<Instruction>,
    types: HashMap<ExpressionType, Id>,
    pointers: HashMap<(StorageClass, ExpressionType), Id>,
    function_types: HashMap<(ExpressionType, Vec<ExpressionType>), Id>,
    constants: HashMap<(ExpressionType, u32), Id>,
    glsl_std: Id,
}

impl<'a> ModuleBuilder<'a> {
    pub fn new(module: &'a SanitizedModule) -> Self {
        let mut builder = Self {
            module,
            next_id: 1,
            capabilities: Vec::new(),
            ext_imports: Vec::new(),
            memory_model: Vec::new(),
            entry_points: Vec::new(),
            execution_modes: Vec::new(),
            debug: Vec::new(),
            annotations: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            types: HashMap::new(),
            pointers: HashMap::new(),
            function_types: HashMap::new(),
            constants: HashMap::new(),
            glsl_std: Id(0),
        };

        builder
            .capabilities
            .push(Instruction::plain(Op::Capability, vec![Operand::Enum("Shader", 1)]));
        let glsl_std = builder.fresh_id();
        builder.ext_imports.push(Instruction::new(
            Op::ExtInstImport,
            None,
            Some(glsl_std),
            vec![Operand::String("GLSL.std.450".to_string())],
        ));
        builder.glsl_std = glsl_std;
        builder.memory_model.push(Instruction::plain(
            Op::MemoryModel,
            vec![Operand::Enum("Logical", 0), Operand::Enum("GLSL450", 1)],
        ));
        builder
    }

    /// Finish building and assemble the sections in module order
    pub fn finish(self, version: (u8, u8)) -> SpirvModule {
        let instructions = self
            .capabilities
            .into_iter()
            .chain(self.ext_imports)
            .chain(self.memory_model)
            .chain(self.entry_points)
            .chain(self.execution_modes)
            .chain(self.debug)
            .chain(self.annotations)
            .chain(self.globals)
            .chain(self.functions)
            .collect();
        SpirvModule::new(version, self.next_id, instructions)
    }

    pub fn sanitized(&self) -> &'a SanitizedModule {
        self.module
    }

    pub fn fresh_id(&mut self) -> Id {
        let id = Id(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn glsl_std(&self) -> Id {
        self.glsl_std
    }

    // ============ Sections ============

    pub fn entry_point(&mut self, instruction: Instruction) {
        self.entry_points.push(instruction);
    }

    pub fn execution_mode(&mut self, instruction: Instruction) {
        self.execution_modes.push(instruction);
    }

    pub fn name(&mut self, target: Id, name: &str) {
        self.debug.push(Instruction::plain(
            Op::Name,
            vec![target.into(), Operand::String(name.to_string())],
        ));
    }

    pub fn member_name(&mut self, target: Id, member: u32, name: &str) {
        self.debug.push(Instruction::plain(
            Op::MemberName,
            vec![
                target.into(),
                Operand::Literal(member),
                Operand::String(name.to_string()),
            ],
        ));
    }

    pub fn decorate(&mut self, target: Id, decoration: Decoration) {
        let mut operands = vec![target.into()];
        operands.extend(decoration.operands());
        self.annotations.push(Instruction::plain(Op::Decorate, operands));
    }

    pub fn member_decorate(&mut self, target: Id, member: u32, decoration: Decoration) {
        let mut operands = vec![target.into(), Operand::Literal(member)];
        operands.extend(decoration.operands());
        self.annotations
            .push(Instruction::plain(Op::MemberDecorate, operands));
    }

    pub fn global_variable(&mut self, pointer_type: Id, storage: StorageClass) -> Id {
        let id = self.fresh_id();
        self.globals.push(Instruction::new(
            Op::Variable,
            Some(pointer_type),
            Some(id),
            vec![storage.operand()],
        ));
        id
    }

    pub fn push_function(&mut self, instructions: Vec<Instruction>) {
        self.functions.extend(instructions);
    }

    // ============ Types ============

    /// Id of a value type, declaring it (and what it depends on) on first use
    pub fn type_id(&mut self, ty: &ExpressionType) -> Id {
        if let Some(id) = self.types.get(ty) {
            return *id;
        }

        let id = match ty {
            ExpressionType::Void => self.declare_type(Op::TypeVoid, vec![]),
            ExpressionType::Primitive(PrimitiveType::Bool) => self.declare_type(Op::TypeBool, vec![]),
            ExpressionType::Primitive(PrimitiveType::F32) => {
                self.declare_type(Op::TypeFloat, vec![Operand::Literal(32)])
            }
            ExpressionType::Primitive(PrimitiveType::I32) => {
                self.declare_type(Op::TypeInt, vec![Operand::Literal(32), Operand::Literal(1)])
            }
            ExpressionType::Primitive(PrimitiveType::U32) => {
                self.declare_type(Op::TypeInt, vec![Operand::Literal(32), Operand::Literal(0)])
            }
            ExpressionType::Vector { component, size } => {
                let component = self.type_id(&ExpressionType::Primitive(*component));
                self.declare_type(
                    Op::TypeVector,
                    vec![component.into(), Operand::Literal(u32::from(*size))],
                )
            }
            ExpressionType::Struct(name) => self.declare_struct(name, false),
            ExpressionType::Uniform(name) => self.declare_struct(name, true),
        };

        self.types.insert(ty.clone(), id);
        id
    }

    fn declare_type(&mut self, op: Op, operands: Vec<Operand>) -> Id {
        let id = self.fresh_id();
        self.globals.push(Instruction::new(op, None, Some(id), operands));
        id
    }

    fn declare_struct(&mut self, name: &str, block: bool) -> Id {
        let module = self.module;
        let fields = module
            .struct_info(name)
            .map(|info| info.fields.clone())
            .unwrap_or_default();
        let members: Vec<Operand> = fields
            .iter()
            .map(|(_, ty)| Operand::Id(self.type_id(ty)))
            .collect();

        let id = self.declare_type(Op::TypeStruct, members);
        self.name(id, name);
        let offsets = layout::member_offsets(name, module);
        for (index, ((field, _), offset)) in fields.iter().zip(offsets).enumerate() {
            self.member_name(id, index as u32, field);
            self.member_decorate(id, index as u32, Decoration::Offset(offset));
        }
        if block {
            self.decorate(id, Decoration::Block);
        }
        id
    }

    pub fn pointer_type(&mut self, storage: StorageClass, pointee: &ExpressionType) -> Id {
        let key = (storage, pointee.clone());
        if let Some(id) = self.pointers.get(&key) {
            return *id;
        }
        let pointee = self.type_id(pointee);
        let id = self.declare_type(Op::TypePointer, vec![storage.operand(), pointee.into()]);
        self.pointers.insert(key, id);
        id
    }

    pub fn function_type(&mut self, ret: &ExpressionType, params: &[ExpressionType]) -> Id {
        let key = (ret.clone(), params.to_vec());
        if let Some(id) = self.function_types.get(&key) {
            return *id;
        }
        let mut operands = vec![Operand::Id(self.type_id(ret))];
        for param in params {
            operands.push(Operand::Id(self.type_id(param)));
        }
        let id = self.declare_type(Op::TypeFunction, operands);
        self.function_types.insert(key, id);
        id
    }

    // ============ Constants ============

    pub fn constant(&mut self, value: Literal) -> Id {
        let (ty, bits) = match value {
            Literal::Bool(v) => (ExpressionType::bool(), u32::from(v)),
            Literal::F32(v) => (ExpressionType::f32(), v.to_bits()),
            Literal::I32(v) => (ExpressionType::i32(), v as u32),
            Literal::U32(v) => (ExpressionType::u32(), v),
        };
        if let Some(id) = self.constants.get(&(ty.clone(), bits)) {
            return *id;
        }

        let type_id = self.type_id(&ty);
        let id = self.fresh_id();
        let instruction = match value {
            Literal::Bool(true) => Instruction::new(Op::ConstantTrue, Some(type_id), Some(id), vec![]),
            Literal::Bool(false) => Instruction::new(Op::ConstantFalse, Some(type_id), Some(id), vec![]),
            _ => Instruction::new(
                Op::Constant,
                Some(type_id),
                Some(id),
                vec![Operand::Literal(bits)],
            ),
        };
        self.globals.push(instruction);
        self.constants.insert((ty, bits), id);
        id
    }

    /// Signed index constant for access chains
    pub fn index(&mut self, index: u32) -> Id {
        self.constant(Literal::I32(index as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::sanitizer::sanitize;

    fn sanitized(decls: &str) -> SanitizedModule {
        let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", decls);
        let module = Parser::new(&source).unwrap().parse_module().unwrap();
        sanitize(&module).unwrap()
    }

    #[test]
    fn test_types_are_deduplicated() {
        let m = sanitized("");
        let mut b = ModuleBuilder::new(&m);
        let v3 = ExpressionType::vector(PrimitiveType::F32, 3);
        let first = b.type_id(&v3);
        assert_eq!(b.type_id(&v3), first);
        assert_ne!(b.type_id(&ExpressionType::i32()), b.type_id(&ExpressionType::u32()));
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let m = sanitized("");
        let mut b = ModuleBuilder::new(&m);
        let one = b.constant(Literal::F32(1.0));
        assert_eq!(b.constant(Literal::F32(1.0)), one);
        assert_ne!(b.constant(Literal::I32(1)), one);
    }

    #[test]
    fn test_block_struct_is_distinct() {
        let m = sanitized("struct Data { v: f32 }");
        let mut b = ModuleBuilder::new(&m);
        let plain = b.type_id(&ExpressionType::struct_("Data"));
        let block = b.type_id(&ExpressionType::uniform("Data"));
        assert_ne!(plain, block);
    }

    #[test]
    fn test_section_order() {
        let m = sanitized("");
        let mut b = ModuleBuilder::new(&m);
        let ty = b.type_id(&ExpressionType::f32());
        b.name(ty, "float");
        let module = b.finish((1, 0));
        let ops: Vec<Op> = module.instructions().iter().map(|i| i.op).collect();
        assert_eq!(
            ops,
            vec![Op::Capability, Op::ExtInstImport, Op::MemoryModel, Op::Name, Op::TypeFloat]
        );
    }
}
