//! Abstract Syntax Tree (AST) for NZSL
//!
//! The same node types describe both the raw tree (straight out of the parser
//! or the builder) and the sanitized tree. A sanitized tree differs in three
//! ways: every [`Expression`] has `ty` set, identifiers have become
//! [`ExprKind::Variable`] nodes, and member accesses are nested single-field
//! nodes.

use crate::span::Span;
use std::fmt;

/// Deepest tree the front end accepts, counting expressions, blocks and
/// struct members
pub const MAX_NESTING_DEPTH: usize = 128;

/// Index into the sanitizer's variable table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A complete shader module (compilation unit)
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub header: ModuleHeader,
    pub declarations: Vec<Declaration>,
    pub span: Span,
}

impl Module {
    pub fn structs(&self) -> impl Iterator<Item = &StructDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn externals(&self) -> impl Iterator<Item = &ExternalEntry> {
        self.declarations.iter().flat_map(|d| match d {
            Declaration::External(e) => e.entries.as_slice(),
            _ => &[][..],
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Function(f) => Some(f),
            _ => None,
        })
    }
}

/// `[nzsl_version("1.0")] module Name;`
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleHeader {
    pub version: String,
    pub name: Option<String>,
    pub span: Span,
}

/// An identifier with its location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ============ Declarations ============

/// Top-level declarations, in any order
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// `struct Foo { x: f32, y: vec2[f32] }`
    Struct(StructDecl),

    /// `external { [set(0), binding(0)] ubo: uniform[Foo] }`
    External(ExternalDecl),

    /// `[entry(frag)] fn main() { ... }`
    Function(FunctionDecl),
}

impl Declaration {
    pub fn span(&self) -> Span {
        match self {
            Declaration::Struct(s) => s.span,
            Declaration::External(e) => e.span,
            Declaration::Function(f) => f.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: Ident,
    pub fields: Vec<StructField>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: Ident,
    pub ty: ExpressionType,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDecl {
    pub entries: Vec<ExternalEntry>,
    pub span: Span,
}

/// One resource binding inside an `external` block
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalEntry {
    pub name: Ident,
    pub ty: ExpressionType,
    pub set: u32,
    pub binding: u32,
    /// Assigned by the sanitizer
    pub id: Option<VariableId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub entry: Option<ShaderStage>,
    pub params: Vec<Param>,
    pub return_type: Option<ExpressionType>,
    pub body: Block,
    pub span: Span,
}

impl FunctionDecl {
    /// Declared return type, `Void` when omitted
    pub fn result_type(&self) -> ExpressionType {
        self.return_type.clone().unwrap_or(ExpressionType::Void)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: ExpressionType,
    /// Assigned by the sanitizer
    pub id: Option<VariableId>,
    pub span: Span,
}

/// Pipeline stage an entry function implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Parse the argument of an `entry(...)` attribute
    pub fn from_attribute(name: &str) -> Option<Self> {
        match name {
            "vert" | "vertex" => Some(ShaderStage::Vertex),
            "frag" | "fragment" => Some(ShaderStage::Fragment),
            "compute" => Some(ShaderStage::Compute),
            _ => None,
        }
    }

    /// Canonical spelling inside `entry(...)`
    pub fn attribute_name(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
            ShaderStage::Compute => "compute",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };
        write!(f, "{}", s)
    }
}

// ============ Types ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    F32,
    I32,
    U32,
}

impl PrimitiveType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(PrimitiveType::Bool),
            "f32" => Some(PrimitiveType::F32),
            "i32" => Some(PrimitiveType::I32),
            "u32" => Some(PrimitiveType::U32),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, PrimitiveType::Bool)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::F32 => "f32",
            PrimitiveType::I32 => "i32",
            PrimitiveType::U32 => "u32",
        }
    }
}

/// Semantic type of an expression or declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExpressionType {
    Primitive(PrimitiveType),
    /// `vecN[T]`, N in 2..=4
    Vector { component: PrimitiveType, size: u8 },
    /// A user struct, by name
    Struct(String),
    /// `uniform[S]`, only valid on external entries
    Uniform(String),
    /// Result of a function that returns nothing
    Void,
}

impl ExpressionType {
    pub fn bool() -> Self {
        Self::Primitive(PrimitiveType::Bool)
    }

    pub fn f32() -> Self {
        Self::Primitive(PrimitiveType::F32)
    }

    pub fn i32() -> Self {
        Self::Primitive(PrimitiveType::I32)
    }

    pub fn u32() -> Self {
        Self::Primitive(PrimitiveType::U32)
    }

    pub fn vector(component: PrimitiveType, size: u8) -> Self {
        Self::Vector { component, size }
    }

    pub fn struct_(name: impl Into<String>) -> Self {
        Self::Struct(name.into())
    }

    pub fn uniform(name: impl Into<String>) -> Self {
        Self::Uniform(name.into())
    }

    /// Scalar type of a primitive or the component type of a vector
    pub fn scalar(&self) -> Option<PrimitiveType> {
        match self {
            ExpressionType::Primitive(p) => Some(*p),
            ExpressionType::Vector { component, .. } => Some(*component),
            _ => None,
        }
    }

    /// Number of components: 1 for scalars, N for `vecN`, `None` otherwise
    pub fn component_count(&self) -> Option<u8> {
        match self {
            ExpressionType::Primitive(_) => Some(1),
            ExpressionType::Vector { size, .. } => Some(*size),
            _ => None,
        }
    }

    /// Struct whose fields are reachable through `.field`, if any
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            ExpressionType::Struct(name) | ExpressionType::Uniform(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.scalar().map_or(false, |s| s.is_numeric())
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionType::Primitive(p) => write!(f, "{}", p.name()),
            ExpressionType::Vector { component, size } => {
                write!(f, "vec{}[{}]", size, component.name())
            }
            ExpressionType::Struct(name) => write!(f, "{}", name),
            ExpressionType::Uniform(name) => write!(f, "uniform[{}]", name),
            ExpressionType::Void => write!(f, "()"),
        }
    }
}

// ============ Statements ============

/// A braced sequence of statements; introduces a scope
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `let name: ty = init;` (the type is filled in by the sanitizer when omitted)
    VariableDeclaration {
        name: Ident,
        ty: Option<ExpressionType>,
        init: Expression,
        /// Assigned by the sanitizer
        id: Option<VariableId>,
    },

    /// `expr;`
    Expression(Expression),

    /// `return expr?;`
    Return(Option<Expression>),

    /// `{ ... }`
    Block(Block),

    /// `if cond { ... } else { ... }`
    Branch {
        condition: Expression,
        then_block: Block,
        else_block: Option<Block>,
    },
}

// ============ Expressions ============

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: Span,
    /// Resolved type, set on every node of a sanitized tree
    pub ty: Option<ExpressionType>,
}

impl Expression {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn typed(kind: ExprKind, span: Span, ty: ExpressionType) -> Self {
        Self {
            kind,
            span,
            ty: Some(ty),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),

    /// A name as written in the source; replaced by `Variable` once sanitized
    Identifier(String),

    /// `base.a.b.c`; a multi-field list is equivalent to nested accesses
    AccessMember {
        base: Box<Expression>,
        fields: Vec<Ident>,
    },

    /// `base.xzy`, components as indices (x=0, y=1, z=2, w=3)
    Swizzle {
        base: Box<Expression>,
        components: Vec<u32>,
    },

    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// Call of a user function or an intrinsic
    Call { callee: Ident, args: Vec<Expression> },

    /// Type constructor or conversion: `vec3[f32](x, y, z)`, `f32(i)`
    Cast {
        target: ExpressionType,
        args: Vec<Expression>,
    },

    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
    },

    /// A resolved variable (external, parameter or local)
    Variable { id: VariableId, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Bool(bool),
    F32(f32),
    I32(i32),
    U32(u32),
}

impl Literal {
    pub fn ty(&self) -> ExpressionType {
        match self {
            Literal::Bool(_) => ExpressionType::bool(),
            Literal::F32(_) => ExpressionType::f32(),
            Literal::I32(_) => ExpressionType::i32(),
            Literal::U32(_) => ExpressionType::u32(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    CompEq,
    CompNe,
    CompLt,
    CompLe,
    CompGt,
    CompGe,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::CompEq => "==",
            BinaryOp::CompNe => "!=",
            BinaryOp::CompLt => "<",
            BinaryOp::CompLe => "<=",
            BinaryOp::CompGt => ">",
            BinaryOp::CompGe => ">=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }

    /// Binding power, higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::LogicalOr => 1,
            BinaryOp::LogicalAnd => 2,
            BinaryOp::CompEq | BinaryOp::CompNe => 3,
            BinaryOp::CompLt | BinaryOp::CompLe | BinaryOp::CompGt | BinaryOp::CompGe => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide => 6,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::CompEq
                | BinaryOp::CompNe
                | BinaryOp::CompLt
                | BinaryOp::CompLe
                | BinaryOp::CompGt
                | BinaryOp::CompGe
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    LogicalNot,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::LogicalNot => "!",
        }
    }
}

/// Built-in functions callable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Dot,
    Cross,
    Length,
    Normalize,
    Min,
    Max,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 6] = [
        Intrinsic::Dot,
        Intrinsic::Cross,
        Intrinsic::Length,
        Intrinsic::Normalize,
        Intrinsic::Min,
        Intrinsic::Max,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::Dot => "dot",
            Intrinsic::Cross => "cross",
            Intrinsic::Length => "length",
            Intrinsic::Normalize => "normalize",
            Intrinsic::Min => "min",
            Intrinsic::Max => "max",
        }
    }
}

/// Component count of a `vecN` type constructor name
pub fn vector_size(name: &str) -> Option<u8> {
    match name {
        "vec2" => Some(2),
        "vec3" => Some(3),
        "vec4" => Some(4),
        _ => None,
    }
}

/// Letter for a swizzle component index
pub fn swizzle_letter(index: u32) -> Option<char> {
    match index {
        0 => Some('x'),
        1 => Some('y'),
        2 => Some('z'),
        3 => Some('w'),
        _ => None,
    }
}

/// Parse a swizzle suffix (`xyz`, `rgba`); sets cannot be mixed
pub fn parse_swizzle(text: &str) -> Option<Vec<u32>> {
    if text.is_empty() || text.len() > 4 {
        return None;
    }
    let from = |set: &str| -> Option<Vec<u32>> {
        text.chars()
            .map(|c| set.find(c).map(|i| i as u32))
            .collect()
    };
    from("xyzw").or_else(|| from("rgba"))
}
