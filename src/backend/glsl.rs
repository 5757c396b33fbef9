//! GLSL writer
//!
//! Emits one shader stage as GLSL source. Uniform externals become std140
//! interface blocks named `_nzslBinding_<name>` with the external's name as
//! instance, so member access text carries over unchanged. The selected entry
//! function is renamed to `main`. Names GLSL reserves (keywords, `gl_`
//! prefixes, double underscores) are rejected rather than renamed.

use super::{float_text, int_text, text_precedence, BackendError, BackendResult, TextBuffer};
use crate::ast::*;
use crate::sanitizer::{EntryPoint, SanitizedModule, StructInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlslOptions {
    /// `#version` number
    pub version: u32,
    /// Target OpenGL ES instead of desktop GL
    pub es: bool,
    /// Emit `set = S, binding = B` instead of flattened bindings
    pub vulkan_semantics: bool,
    /// Flattened binding is `set * bindings_per_set + binding`
    pub bindings_per_set: u32,
    /// Entry point to emit; required when the module has several
    pub stage: Option<ShaderStage>,
}

impl Default for GlslOptions {
    fn default() -> Self {
        Self {
            version: 450,
            es: false,
            vulkan_semantics: false,
            bindings_per_set: 16,
            stage: None,
        }
    }
}

impl GlslOptions {
    fn supports_binding_qualifier(&self) -> bool {
        if self.es {
            self.version >= 310
        } else {
            self.version >= 420
        }
    }

    fn compute_version(&self) -> u32 {
        if self.es {
            310
        } else {
            430
        }
    }
}

/// Keywords and reserved words across GLSL 1.40 to 4.60 and ESSL 3.x
const RESERVED_WORDS: &[&str] = &[
    "active", "asm", "atomic_uint", "attribute", "bool", "break", "buffer", "bvec2", "bvec3",
    "bvec4", "case", "cast", "centroid", "class", "coherent", "common", "const", "continue",
    "default", "discard", "dmat2", "dmat3", "dmat4", "do", "double", "dvec2", "dvec3", "dvec4",
    "else", "enum", "extern", "external", "false", "filter", "fixed", "flat", "float", "for",
    "fvec2", "fvec3", "fvec4", "goto", "half", "highp", "hvec2", "hvec3", "hvec4", "if",
    "iimage2D", "iimage3D", "image1D", "image2D", "image3D", "imageCube", "in", "inline", "inout",
    "input", "int", "interface", "invariant", "isampler2D", "isampler3D", "isamplerCube", "ivec2",
    "ivec3", "ivec4", "layout", "long", "lowp", "mat2", "mat2x2", "mat2x3", "mat2x4", "mat3",
    "mat3x2", "mat3x3", "mat3x4", "mat4", "mat4x2", "mat4x3", "mat4x4", "mediump", "namespace",
    "noinline", "noperspective", "out", "output", "partition", "patch", "precise", "precision",
    "public", "readonly", "resource", "restrict", "return", "sample", "sampler1D", "sampler2D",
    "sampler2DArray", "sampler2DShadow", "sampler3D", "samplerBuffer", "samplerCube", "shared",
    "short", "sizeof", "smooth", "static", "struct", "subroutine", "superp", "switch", "template",
    "this", "true", "typedef", "uimage2D", "uimage3D", "uint", "uniform", "union", "unsigned",
    "usampler2D", "usampler3D", "usamplerCube", "using", "uvec2", "uvec3", "uvec4", "varying",
    "vec2", "vec3", "vec4", "void", "volatile", "while", "writeonly",
];

/// Reject names a GLSL compiler would refuse
fn check_name(name: &str) -> BackendResult<&str> {
    if RESERVED_WORDS.contains(&name) {
        return Err(BackendError::unsupported(format!(
            "`{}` is a reserved word in GLSL",
            name
        )));
    }
    if name.starts_with("gl_") || name.contains("__") {
        return Err(BackendError::unsupported(format!(
            "`{}` is reserved for the GLSL implementation",
            name
        )));
    }
    Ok(name)
}

/// Module-level names also must not collide with the entry point
fn check_global_name(name: &str) -> BackendResult<&str> {
    if name == "main" {
        return Err(BackendError::unsupported(
            "`main` would clash with the GLSL entry point",
        ));
    }
    check_name(name)
}

#[derive(Debug, Clone, Default)]
pub struct GlslWriter {
    options: GlslOptions,
}

impl GlslWriter {
    pub fn new(options: GlslOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GlslOptions {
        &self.options
    }

    pub fn write(&self, module: &SanitizedModule) -> BackendResult<String> {
        self.check_version()?;
        let entry = self.select_entry(module)?;
        let compute = entry.map_or(false, |e| e.stage == ShaderStage::Compute);
        if compute && self.options.version < self.options.compute_version() {
            return Err(BackendError::unsupported(format!(
                "compute shaders need GLSL{} {} or later",
                if self.options.es { " ES" } else { "" },
                self.options.compute_version()
            )));
        }

        let mut buf = TextBuffer::new();
        if self.options.es {
            buf.line(format!("#version {} es", self.options.version));
            buf.blank();
            buf.line("precision highp float;");
            buf.line("precision highp int;");
        } else {
            buf.line(format!("#version {}", self.options.version));
        }

        if compute {
            buf.blank();
            buf.line("layout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;");
        }

        for info in module.structs() {
            buf.blank();
            write_struct(&mut buf, info)?;
        }

        for external in module.module().externals() {
            buf.blank();
            self.write_uniform_block(&mut buf, module, external)?;
        }

        let helpers: Vec<&FunctionDecl> = module
            .module()
            .functions()
            .filter(|f| f.entry.is_none())
            .collect();

        for func in &helpers {
            check_global_name(&func.name.name)?;
        }

        if !helpers.is_empty() {
            buf.blank();
            for func in &helpers {
                buf.line(format!("{};", signature(func, &func.name.name)?));
            }
        }

        for func in &helpers {
            buf.blank();
            write_function(&mut buf, func, &func.name.name)?;
        }

        if let Some(entry) = entry {
            if let Some(func) = module.function(&entry.name) {
                buf.blank();
                write_function(&mut buf, func, "main")?;
            }
        }

        let text = buf.finish();
        log::debug!(
            "wrote GLSL {}{} ({} bytes)",
            self.options.version,
            if self.options.es { " es" } else { "" },
            text.len()
        );
        Ok(text)
    }

    fn check_version(&self) -> BackendResult<()> {
        // uniform blocks appeared in GLSL 1.40 and ESSL 3.00
        let minimum = if self.options.es { 300 } else { 140 };
        if self.options.version < minimum {
            return Err(BackendError::unsupported(format!(
                "GLSL{} version {} has no uniform blocks (need {} or later)",
                if self.options.es { " ES" } else { "" },
                self.options.version,
                minimum
            )));
        }
        Ok(())
    }

    fn select_entry<'m>(&self, module: &'m SanitizedModule) -> BackendResult<Option<&'m EntryPoint>> {
        let candidates: Vec<&EntryPoint> = module
            .entry_points()
            .iter()
            .filter(|e| self.options.stage.map_or(true, |stage| stage == e.stage))
            .collect();

        match (candidates.as_slice(), self.options.stage) {
            ([], Some(stage)) => Err(BackendError::unsupported(format!(
                "module has no {} entry point",
                stage
            ))),
            ([], None) => Ok(None),
            ([entry], _) => Ok(Some(*entry)),
            (many, _) => {
                let names: Vec<String> = many
                    .iter()
                    .map(|e| format!("{} ({})", e.name, e.stage))
                    .collect();
                Err(BackendError::unsupported(format!(
                    "several entry points ({}); select a stage",
                    names.join(", ")
                )))
            }
        }
    }

    fn write_uniform_block(
        &self,
        buf: &mut TextBuffer,
        module: &SanitizedModule,
        entry: &ExternalEntry,
    ) -> BackendResult<()> {
        let struct_name = match &entry.ty {
            ExpressionType::Uniform(name) => name,
            other => {
                return Err(BackendError::unsupported(format!(
                    "external `{}` of type {}",
                    entry.name, other
                )))
            }
        };
        let info = module.struct_info(struct_name).ok_or_else(|| {
            BackendError::unsupported(format!("unknown struct `{}`", struct_name))
        })?;

        let layout = if self.options.vulkan_semantics {
            format!("layout(std140, set = {}, binding = {})", entry.set, entry.binding)
        } else if self.options.supports_binding_qualifier() {
            let flat = entry
                .set
                .checked_mul(self.options.bindings_per_set)
                .and_then(|base| base.checked_add(entry.binding))
                .ok_or_else(|| {
                    BackendError::unsupported(format!(
                        "binding of `{}` overflows when flattened",
                        entry.name
                    ))
                })?;
            format!("layout(std140, binding = {})", flat)
        } else {
            "layout(std140)".to_string()
        };

        let block_name = format!("_nzslBinding_{}", check_global_name(&entry.name.name)?);
        buf.line(format!("{} uniform {}", layout, check_name(&block_name)?));
        buf.open();
        for (name, ty) in &info.fields {
            buf.line(format!("{} {};", glsl_type(ty)?, check_name(name)?));
        }
        buf.close(&format!(" {};", entry.name));
        Ok(())
    }
}

fn glsl_type(ty: &ExpressionType) -> BackendResult<String> {
    let text = match ty {
        ExpressionType::Primitive(p) => primitive_name(*p).to_string(),
        ExpressionType::Vector { component, size } => {
            let prefix = match component {
                PrimitiveType::Bool => "b",
                PrimitiveType::F32 => "",
                PrimitiveType::I32 => "i",
                PrimitiveType::U32 => "u",
            };
            format!("{}vec{}", prefix, size)
        }
        ExpressionType::Struct(name) => name.clone(),
        ExpressionType::Void => "void".to_string(),
        ExpressionType::Uniform(name) => {
            return Err(BackendError::unsupported(format!(
                "uniform[{}] used as a value type",
                name
            )))
        }
    };
    Ok(text)
}

fn primitive_name(p: PrimitiveType) -> &'static str {
    match p {
        PrimitiveType::Bool => "bool",
        PrimitiveType::F32 => "float",
        PrimitiveType::I32 => "int",
        PrimitiveType::U32 => "uint",
    }
}

fn write_struct(buf: &mut TextBuffer, info: &StructInfo) -> BackendResult<()> {
    buf.line(format!("struct {}", check_global_name(&info.name)?));
    buf.open();
    for (name, ty) in &info.fields {
        buf.line(format!("{} {};", glsl_type(ty)?, check_name(name)?));
    }
    buf.close(";");
    Ok(())
}

fn signature(func: &FunctionDecl, name: &str) -> BackendResult<String> {
    let mut params = Vec::with_capacity(func.params.len());
    for param in &func.params {
        params.push(format!("{} {}", glsl_type(&param.ty)?, check_name(&param.name.name)?));
    }
    Ok(format!(
        "{} {}({})",
        glsl_type(&func.result_type())?,
        name,
        params.join(", ")
    ))
}

fn write_function(buf: &mut TextBuffer, func: &FunctionDecl, name: &str) -> BackendResult<()> {
    buf.line(signature(func, name)?);
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
            let ty = ty.as_ref().or(init.ty.as_ref()).ok_or_else(|| {
                BackendError::unsupported(format!("variable `{}` has no resolved type", name))
            })?;
            buf.line(format!(
                "{} {} = {};",
                glsl_type(ty)?,
                check_name(&name.name)?,
                expr_text(init)?
            ));
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
        ExprKind::Literal(Literal::U32(v)) => out.push_str(&format!("{}u", v)),
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
            out.push_str(&glsl_type(target)?);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::sanitizer::sanitize;

    const NESTED: &str = r#"[nzsl_version("1.0")]
module;

struct innerStruct
{
    field: vec3[f32]
}

struct outerStruct
{
    s: innerStruct
}

external
{
    [set(0), binding(0)] ubo: uniform[outerStruct]
}

[entry(vert)]
fn main()
{
    let result = ubo.s.field.z;
}
"#;

    fn sanitized(source: &str) -> SanitizedModule {
        let module = Parser::new(source).unwrap().parse_module().unwrap();
        sanitize(&module).unwrap()
    }

    fn glsl(source: &str, options: GlslOptions) -> BackendResult<String> {
        GlslWriter::new(options).write(&sanitized(source))
    }

    #[test]
    fn test_nested_access() {
        let text = glsl(NESTED, GlslOptions::default()).unwrap();
        assert!(text.starts_with("#version 450\n"));
        assert!(text.contains("struct innerStruct\n{\n\tvec3 field;\n};"));
        assert!(text.contains("struct outerStruct\n{\n\tinnerStruct s;\n};"));
        assert!(text.contains(
            "layout(std140, binding = 0) uniform _nzslBinding_ubo\n{\n\touterStruct s;\n} ubo;"
        ));
        assert!(text.contains("void main()\n{\n\tfloat result = ubo.s.field.z;\n}"));
    }

    #[test]
    fn test_struct_order_follows_dependencies() {
        let text = glsl(NESTED, GlslOptions::default()).unwrap();
        let inner = text.find("struct innerStruct").unwrap();
        let outer = text.find("struct outerStruct").unwrap();
        assert!(inner < outer);
    }

    #[test]
    fn test_binding_qualifiers() {
        let source = NESTED.replace("set(0), binding(0)", "set(1), binding(3)");

        let flat = glsl(&source, GlslOptions::default()).unwrap();
        assert!(flat.contains("layout(std140, binding = 19) uniform"));

        let vulkan = glsl(
            &source,
            GlslOptions {
                vulkan_semantics: true,
                ..GlslOptions::default()
            },
        )
        .unwrap();
        assert!(vulkan.contains("layout(std140, set = 1, binding = 3) uniform"));

        let old = glsl(
            &source,
            GlslOptions {
                version: 330,
                ..GlslOptions::default()
            },
        )
        .unwrap();
        assert!(old.contains("layout(std140) uniform"));
    }

    #[test]
    fn test_es_header() {
        let text = glsl(
            NESTED,
            GlslOptions {
                version: 300,
                es: true,
                ..GlslOptions::default()
            },
        )
        .unwrap();
        assert!(text.starts_with("#version 300 es\n\nprecision highp float;\nprecision highp int;\n"));
        assert!(text.contains("layout(std140) uniform"));
    }

    #[test]
    fn test_version_without_uniform_blocks() {
        let err = glsl(
            NESTED,
            GlslOptions {
                version: 120,
                ..GlslOptions::default()
            },
        )
        .unwrap_err();
        assert!(err.message.contains("need 140"));
    }

    #[test]
    fn test_stage_selection() {
        let source = r#"[nzsl_version("1.0")]
module;
[entry(vert)] fn vs() { let a = 1.0; }
[entry(frag)] fn fs() { let b = 2.0; }
"#;
        let err = glsl(source, GlslOptions::default()).unwrap_err();
        assert!(err.message.contains("select a stage"));

        let frag = glsl(
            source,
            GlslOptions {
                stage: Some(ShaderStage::Fragment),
                ..GlslOptions::default()
            },
        )
        .unwrap();
        assert!(frag.contains("void main()\n{\n\tfloat b = 2.0;\n}"));
        assert!(!frag.contains("float a"));

        let missing = glsl(
            source,
            GlslOptions {
                stage: Some(ShaderStage::Compute),
                ..GlslOptions::default()
            },
        )
        .unwrap_err();
        assert!(missing.message.contains("no compute entry point"));
    }

    #[test]
    fn test_helpers_and_expressions() {
        let source = r#"[nzsl_version("1.0")]
module;
fn scale(v: vec3[f32], k: f32) -> vec3[f32] { return v * k; }
[entry(frag)] fn main() {
    let n = normalize(scale(vec3[f32](1.0, 2.0, 3.0), 2.0));
    let i = i32(n.x) * (2 + 3);
    let u = 7;
    let big = 3000000000;
    if n.x > 0.5 && !(i == 0) { n = -n; }
}
"#;
        let text = glsl(source, GlslOptions::default()).unwrap();
        assert!(text.contains("\nvec3 scale(vec3 v, float k);\n"));
        assert!(text.contains("vec3 scale(vec3 v, float k)\n{\n\treturn v * k;\n}"));
        assert!(text.contains("vec3 n = normalize(scale(vec3(1.0, 2.0, 3.0), 2.0));"));
        assert!(text.contains("int i = int(n.x) * 5;"));
        assert!(text.contains("uint big = 3000000000u;"));
        assert!(text.contains("if (n.x > 0.5 && !(i == 0))"));
        assert!(text.contains("\t\tn = -n;\n"));
        let proto = text.find("vec3 scale(vec3 v, float k);").unwrap();
        let main = text.find("void main()").unwrap();
        assert!(proto < main);
    }

    #[test]
    fn test_helper_named_main_is_rejected() {
        let source = r#"[nzsl_version("1.0")]
module;
fn main() {}
[entry(frag)] fn fs() {}
"#;
        let err = glsl(source, GlslOptions::default()).unwrap_err();
        assert_eq!(err.kind, crate::backend::BackendErrorKind::UnsupportedConstruct);
    }

    const COMPUTE: &str = r#"[nzsl_version("1.0")]
module;
[entry(compute)] fn cs() { let a = 1; }
"#;

    #[test]
    fn test_compute_local_size() {
        let text = glsl(COMPUTE, GlslOptions::default()).unwrap();
        assert!(text.starts_with(
            "#version 450\n\nlayout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;\n"
        ));
        assert!(text.contains("void main()\n{\n\tint a = 1;\n}"));

        let es = glsl(
            COMPUTE,
            GlslOptions {
                version: 310,
                es: true,
                ..GlslOptions::default()
            },
        )
        .unwrap();
        assert!(es.contains("\nlayout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;\n"));

        let fragment = glsl(NESTED, GlslOptions::default()).unwrap();
        assert!(!fragment.contains("local_size_x"));
    }

    #[test]
    fn test_compute_needs_recent_version() {
        let err = glsl(
            COMPUTE,
            GlslOptions {
                version: 420,
                ..GlslOptions::default()
            },
        )
        .unwrap_err();
        assert!(err.message.contains("430"));

        let err = glsl(
            COMPUTE,
            GlslOptions {
                version: 300,
                es: true,
                ..GlslOptions::default()
            },
        )
        .unwrap_err();
        assert!(err.message.contains("310"));
    }

    fn rejected(body: &str) -> bool {
        let source = format!("[nzsl_version(\"1.0\")]\nmodule;\n{}", body);
        match glsl(&source, GlslOptions::default()) {
            Err(err) => err.kind == crate::backend::BackendErrorKind::UnsupportedConstruct,
            Ok(text) => panic!("expected an error, got:\n{}", text),
        }
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        assert!(rejected("[entry(frag)] fn main() { let input = 1.0; }"));
        assert!(rejected("[entry(frag)] fn main() { let gl_Position = 1.0; }"));
        assert!(rejected("[entry(frag)] fn main() { let a__b = 1.0; }"));
        assert!(rejected("fn sample(output: f32) -> f32 { return output; }\n[entry(frag)] fn main() {}"));
        assert!(rejected("struct common { v: f32 }\n[entry(frag)] fn main() {}"));
        assert!(rejected("struct S { filter: f32 }\n[entry(frag)] fn main() {}"));
        assert!(rejected(
            "struct S { v: f32 }\nexternal { [set(0), binding(0)] _data: uniform[S] }\n[entry(frag)] fn main() {}"
        ));
    }

    #[test]
    fn test_ordinary_names_are_kept() {
        let text = glsl(
            r#"[nzsl_version("1.0")]
module;
struct Material { samples: f32, input_scale: f32 }
external { [set(0), binding(0)] material: uniform[Material] }
[entry(frag)] fn main() { let inputs = material.samples * material.input_scale; }
"#,
            GlslOptions::default(),
        )
        .unwrap();
        assert!(text.contains("float inputs = material.samples * material.input_scale;"));
    }
}
