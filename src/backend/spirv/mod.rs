//! SPIR-V backend
//!
//! Produces a complete shader module: header, capabilities, the
//! GLSL.std.450 import, memory model, entry points and execution modes, debug
//! names, decorations, types, constants, uniform variables and functions.
//!
//! Member access chains rooted at a variable collapse into a single
//! `OpAccessChain`, whatever the nesting of the sanitized tree.

mod builder;
mod function;
mod instruction;
mod layout;

pub use builder::StorageClass;
pub use instruction::{Id, Instruction, Op, Operand};

use crate::ast::ShaderStage;
use crate::backend::{BackendError, BackendResult};
use crate::sanitizer::SanitizedModule;
use builder::{Decoration, ModuleBuilder, MAGIC};
use function::FunctionEmitter;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvOptions {
    /// Target SPIR-V version, (major, minor)
    pub version: (u8, u8),
}

impl Default for SpirvOptions {
    fn default() -> Self {
        Self { version: (1, 0) }
    }
}

/// An assembled SPIR-V module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpirvModule {
    version: (u8, u8),
    bound: u32,
    instructions: Vec<Instruction>,
}

impl SpirvModule {
    pub(crate) fn new(version: (u8, u8), bound: u32, instructions: Vec<Instruction>) -> Self {
        Self {
            version,
            bound,
            instructions,
        }
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// One past the largest id in the module
    pub fn bound(&self) -> u32 {
        self.bound
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instructions of each function, `OpFunction` to `OpFunctionEnd` inclusive
    pub fn functions(&self) -> Vec<&[Instruction]> {
        let mut functions = Vec::new();
        let mut start = None;
        for (i, inst) in self.instructions.iter().enumerate() {
            match inst.op {
                Op::Function => start = Some(i),
                Op::FunctionEnd => {
                    if let Some(s) = start.take() {
                        functions.push(&self.instructions[s..=i]);
                    }
                }
                _ => {}
            }
        }
        functions
    }

    pub fn header(&self) -> [u32; 5] {
        let (major, minor) = self.version;
        let version = (u32::from(major) << 16) | (u32::from(minor) << 8);
        [MAGIC, version, 0, self.bound, 0]
    }

    pub fn words(&self) -> Vec<u32> {
        let mut words = self.header().to_vec();
        for inst in &self.instructions {
            inst.encode(&mut words);
        }
        words
    }

    /// Little-endian binary
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words().iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Textual listing, one instruction per line
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        out.push_str("; SPIR-V\n");
        out.push_str(&format!("; Version: {}.{}\n", self.version.0, self.version.1));
        out.push_str(&format!("; Bound: {}\n", self.bound));
        for inst in &self.instructions {
            out.push_str(&inst.to_string());
            out.push('\n');
        }
        out
    }
}

/// Writer producing a [`SpirvModule`]
#[derive(Debug, Clone, Default)]
pub struct SpirvWriter {
    options: SpirvOptions,
}

impl SpirvWriter {
    pub fn new(options: SpirvOptions) -> Self {
        Self { options }
    }

    pub fn write(&self, module: &SanitizedModule) -> BackendResult<SpirvModule> {
        for binding in module.bindings().iter() {
            let member = binding
                .ty
                .struct_name()
                .and_then(|name| layout::find_bool_member(name, module));
            if let Some(member) = member {
                return Err(BackendError::unsupported(format!(
                    "bool member '{}' in uniform block '{}'",
                    member, binding.name
                )));
            }
        }

        let mut builder = ModuleBuilder::new(module);

        // Uniform variables
        let mut globals = HashMap::new();
        let mut interface = Vec::new();
        for binding in module.bindings().iter() {
            let pointer_type = builder.pointer_type(StorageClass::Uniform, &binding.ty);
            let variable = builder.global_variable(pointer_type, StorageClass::Uniform);
            builder.name(variable, &binding.name);
            builder.decorate(variable, Decoration::DescriptorSet(binding.set));
            builder.decorate(variable, Decoration::Binding(binding.binding));
            globals.insert(binding.variable, variable);
            interface.push(variable);
        }

        let function_ids: HashMap<String, Id> = module
            .module()
            .functions()
            .map(|f| (f.name.name.clone(), builder.fresh_id()))
            .collect();

        for entry in module.entry_points() {
            let id = function_ids.get(&entry.name).copied().ok_or_else(|| {
                BackendError::unsupported(format!("unknown entry point '{}'", entry.name))
            })?;
            let model = match entry.stage {
                ShaderStage::Vertex => Operand::Enum("Vertex", 0),
                ShaderStage::Fragment => Operand::Enum("Fragment", 4),
                ShaderStage::Compute => Operand::Enum("GLCompute", 5),
            };
            let mut operands = vec![model, id.into(), Operand::String(entry.name.clone())];
            // Since 1.4 the interface lists every global the entry point uses
            if self.options.version >= (1, 4) {
                operands.extend(interface.iter().map(|v| Operand::Id(*v)));
            }
            builder.entry_point(Instruction::plain(Op::EntryPoint, operands));

            match entry.stage {
                ShaderStage::Fragment => builder.execution_mode(Instruction::plain(
                    Op::ExecutionMode,
                    vec![id.into(), Operand::Enum("OriginUpperLeft", 7)],
                )),
                ShaderStage::Compute => builder.execution_mode(Instruction::plain(
                    Op::ExecutionMode,
                    vec![
                        id.into(),
                        Operand::Enum("LocalSize", 17),
                        Operand::Literal(1),
                        Operand::Literal(1),
                        Operand::Literal(1),
                    ],
                )),
                ShaderStage::Vertex => {}
            }
        }

        for func in module.module().functions() {
            let id = function_ids.get(&func.name.name).copied().ok_or_else(|| {
                BackendError::unsupported(format!("unknown function '{}'", func.name.name))
            })?;
            let instructions = FunctionEmitter::new(&mut builder, &function_ids, &globals).emit(func, id)?;
            builder.push_function(instructions);
        }

        let spirv = builder.finish(self.options.version);
        log::debug!(
            "emitted SPIR-V {}.{}: {} instructions, bound {}",
            spirv.version.0,
            spirv.version.1,
            spirv.instructions.len(),
            spirv.bound
        );
        Ok(spirv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::sanitizer::sanitize;

    fn compile(body: &str) -> SpirvModule {
        let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body);
        let module = Parser::new(&source).unwrap().parse_module().unwrap();
        let sanitized = sanitize(&module).unwrap();
        SpirvWriter::default().write(&sanitized).unwrap()
    }

    fn ops(instructions: &[Instruction]) -> Vec<Op> {
        instructions.iter().map(|i| i.op).collect()
    }

    const NESTED: &str = "
struct innerStruct { field: vec3[f32] }
struct outerStruct { s: innerStruct }
external { [set(0), binding(0)] ubo: uniform[outerStruct] }
";

    #[test]
    fn test_member_chain_is_one_access_chain() {
        let spirv = compile(&format!(
            "{}[entry(vert)] fn main() {{ let result: f32 = ubo.s.field.z; }}",
            NESTED
        ));
        let functions = spirv.functions();
        assert_eq!(functions.len(), 1);
        assert_eq!(
            ops(functions[0]),
            vec![
                Op::Function,
                Op::Label,
                Op::Variable,
                Op::AccessChain,
                Op::Load,
                Op::CompositeExtract,
                Op::Store,
                Op::Return,
                Op::FunctionEnd,
            ]
        );

        let chain = functions[0].iter().find(|i| i.op == Op::AccessChain).unwrap();
        // base pointer plus two indices
        assert_eq!(chain.operands.len(), 3);
    }

    #[test]
    fn test_header() {
        let spirv = compile("[entry(frag)] fn main() {}");
        let words = spirv.words();
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words[1], 0x0001_0000);
        assert_eq!(words[3], spirv.bound());
        assert_eq!(spirv.to_bytes().len(), words.len() * 4);
    }

    #[test]
    fn test_module_preamble() {
        let spirv = compile("[entry(frag)] fn main() {}");
        let preamble: Vec<Op> = spirv.instructions().iter().take(5).map(|i| i.op).collect();
        assert_eq!(
            preamble,
            vec![
                Op::Capability,
                Op::ExtInstImport,
                Op::MemoryModel,
                Op::EntryPoint,
                Op::ExecutionMode,
            ]
        );
        let listing = spirv.disassemble();
        assert!(listing.contains("OpEntryPoint Fragment %"));
        assert!(listing.contains("OpExecutionMode %"));
        assert!(listing.contains("OriginUpperLeft"));
    }

    #[test]
    fn test_uniform_decorations() {
        let spirv = compile(&format!("{}[entry(vert)] fn main() {{}}", NESTED));
        let listing = spirv.disassemble();
        assert!(listing.contains("DescriptorSet 0"));
        assert!(listing.contains("Binding 0"));
        assert!(listing.contains("Block"));
        assert!(listing.contains("OpVariable"));
        assert!(listing.contains("Uniform"));
    }

    #[test]
    fn test_branch_structure() {
        let spirv = compile(
            "[entry(frag)] fn main() { let x = 1.0; if x > 0.5 { x = 0.0; } else { x = 2.0; } }",
        );
        let body = ops(spirv.functions()[0]);
        assert!(body.contains(&Op::SelectionMerge));
        assert!(body.contains(&Op::BranchConditional));
        assert_eq!(body.iter().filter(|op| **op == Op::Label).count(), 4);
        assert_eq!(body.iter().filter(|op| **op == Op::Branch).count(), 2);
    }

    #[test]
    fn test_helper_function_with_return() {
        let spirv = compile(
            "fn twice(v: f32) -> f32 { return v * 2.0; }\n[entry(frag)] fn main() { let x = twice(1.0); }",
        );
        let functions = spirv.functions();
        assert_eq!(functions.len(), 2);
        let helper = ops(functions[0]);
        assert_eq!(helper[1], Op::FunctionParameter);
        assert!(helper.contains(&Op::ReturnValue));
        assert!(!helper.contains(&Op::Return));
        assert!(ops(functions[1]).contains(&Op::FunctionCall));
    }

    #[test]
    fn test_multi_component_swizzle_is_shuffle() {
        let spirv = compile(
            "[entry(frag)] fn main() { let v = vec3[f32](1.0, 2.0, 3.0); let w = v.zx; }",
        );
        assert!(ops(spirv.functions()[0]).contains(&Op::VectorShuffle));
    }

    #[test]
    fn test_multi_component_swizzle_store_is_unsupported() {
        let source = "[nzsl_version(\"1.0\")]\nmodule;\n[entry(frag)] fn main() { let v = vec3[f32](0.0); v.xy = vec2[f32](1.0, 2.0); }";
        let module = Parser::new(source).unwrap().parse_module().unwrap();
        let sanitized = sanitize(&module).unwrap();
        let err = SpirvWriter::default().write(&sanitized).unwrap_err();
        assert_eq!(err.kind, crate::backend::BackendErrorKind::UnsupportedConstruct);
    }

    #[test]
    fn test_bool_uniform_member_is_unsupported() {
        let source = "[nzsl_version(\"1.0\")]\nmodule;\nstruct Flags { on: bool }\nexternal { [set(0), binding(1)] flags: uniform[Flags] }";
        let module = Parser::new(source).unwrap().parse_module().unwrap();
        let sanitized = sanitize(&module).unwrap();
        assert!(SpirvWriter::default().write(&sanitized).is_err());
    }

    #[test]
    fn test_interface_listed_from_1_4() {
        let source = format!(
            "[nzsl_version(\"1.0\")]\nmodule;\n{}[entry(vert)] fn main() {{}}",
            NESTED
        );
        let module = Parser::new(&source).unwrap().parse_module().unwrap();
        let sanitized = sanitize(&module).unwrap();
        let spirv = SpirvWriter::new(SpirvOptions { version: (1, 4) })
            .write(&sanitized)
            .unwrap();
        let entry = spirv
            .instructions()
            .iter()
            .find(|i| i.op == Op::EntryPoint)
            .unwrap();
        assert_eq!(entry.operands.len(), 4);
    }
}
