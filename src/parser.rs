//! Parser for NZSL
//!
//! This is a recursive descent parser that converts tokens into a raw AST.
//! Binary operators use precedence climbing and are left-associative; member
//! access binds tighter than any operator.
//!
//! Dotted names after an expression are collected into a single
//! [`ExprKind::AccessMember`] chain. Whether a trailing name is a struct field
//! or a swizzle depends on the type of what precedes it, so that decision is
//! left to the sanitizer.

use crate::ast::*;
use crate::lexer::{self, LexError};
use crate::span::Span;
use crate::token::{Token, TokenKind};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken,
    MissingAttribute,
    MalformedDeclaration,
    InvalidLiteral,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::MissingAttribute => "missing attribute",
            ParseErrorKind::MalformedDeclaration => "malformed declaration",
            ParseErrorKind::InvalidLiteral => "invalid literal",
        };
        write!(f, "{}", s)
    }
}

/// Parser error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// What the parser was looking for, when known
    pub expected: Option<String>,
    /// Token found instead
    pub found: Option<TokenKind>,
    pub span: Span,
}

impl ParseError {
    pub fn unexpected(expected: impl Into<String>, found: &Token) -> Self {
        let expected = expected.into();
        Self {
            kind: ParseErrorKind::UnexpectedToken,
            message: format!("expected {}, found {}", expected, found.kind),
            expected: Some(expected),
            found: Some(found.kind),
            span: found.span,
        }
    }

    pub fn missing_attribute(message: impl Into<String>, span: Span) -> Self {
        Self::custom(ParseErrorKind::MissingAttribute, message, span)
    }

    pub fn malformed(message: impl Into<String>, span: Span) -> Self {
        Self::custom(ParseErrorKind::MalformedDeclaration, message, span)
    }

    pub fn invalid_literal(message: impl Into<String>, span: Span) -> Self {
        Self::custom(ParseErrorKind::InvalidLiteral, message, span)
    }

    fn custom(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            expected: None,
            found: None,
            span,
        }
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

/// Parse result
pub type ParseResult<T> = Result<T, ParseError>;

/// `[name(arg), ...]` entry before a declaration
#[derive(Debug, Clone)]
struct Attribute {
    name: Ident,
    arg: Option<AttributeArg>,
    span: Span,
}

#[derive(Debug, Clone)]
enum AttributeArg {
    Ident(String),
    Int(u64),
    Str(String),
}

/// The parser for NZSL
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'src> Parser<'src> {
    /// Lex `source` and create a parser over its tokens
    pub fn new(source: &'src str) -> Result<Self, LexError> {
        let tokens = lexer::lex(source)?;
        Ok(Self::from_tokens(source, tokens))
    }

    /// Create a parser over an already lexed token stream
    pub fn from_tokens(source: &'src str, mut tokens: Vec<Token>) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let end = source.len();
            tokens.push(Token::new(TokenKind::Eof, Span::new(end, end)));
        }
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    fn deepen(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::malformed(
                format!("nesting too deep (more than {} levels)", MAX_NESTING_DEPTH),
                self.current().span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        self.deepen()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Peek at the nth token ahead (0 = current)
    fn peek_nth(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn previous_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn is_at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::unexpected(format!("'{}'", kind), self.current()))
        }
    }

    /// Consume token if it matches
    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn text(&self, token: &Token) -> &'src str {
        token.text(self.source)
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.previous_end())
    }

    fn parse_ident(&mut self) -> ParseResult<Ident> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(Ident::new(self.text(&token), token.span))
    }

    // ============ Top-level parsing ============

    /// Parse a complete module
    pub fn parse_module(&mut self) -> ParseResult<Module> {
        let start = self.current().span.start;
        let header = self.parse_header()?;

        let mut declarations = Vec::new();
        while !self.is_at_end() {
            declarations.push(self.parse_declaration()?);
        }

        log::debug!("parsed module with {} declarations", declarations.len());
        Ok(Module {
            header,
            declarations,
            span: self.span_from(start),
        })
    }

    fn parse_header(&mut self) -> ParseResult<ModuleHeader> {
        let start = self.current().span.start;
        if !self.check(TokenKind::LBracket) {
            return Err(ParseError::missing_attribute(
                "a module must start with a [nzsl_version(\"...\")] attribute",
                self.current().span,
            ));
        }

        let mut version = None;
        for attr in self.parse_attributes()? {
            match (attr.name.name.as_str(), attr.arg) {
                ("nzsl_version", Some(AttributeArg::Str(v))) => {
                    if version.replace(v).is_some() {
                        return Err(ParseError::malformed(
                            "duplicate nzsl_version attribute",
                            attr.span,
                        ));
                    }
                }
                ("nzsl_version", _) => {
                    return Err(ParseError::malformed(
                        "nzsl_version expects a string argument",
                        attr.span,
                    ))
                }
                (other, _) => {
                    return Err(ParseError::malformed(
                        format!("unknown module attribute '{}'", other),
                        attr.span,
                    ))
                }
            }
        }

        let version = version.ok_or_else(|| {
            ParseError::missing_attribute(
                "module is missing its nzsl_version attribute",
                self.span_from(start),
            )
        })?;

        self.expect(TokenKind::Module)?;
        let name = if self.check(TokenKind::Ident) {
            Some(self.parse_ident()?.name)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;

        Ok(ModuleHeader {
            version,
            name,
            span: self.span_from(start),
        })
    }

    /// `[a, b(c), d("e")]`
    fn parse_attributes(&mut self) -> ParseResult<Vec<Attribute>> {
        self.expect(TokenKind::LBracket)?;
        let mut attributes = Vec::new();

        loop {
            let start = self.current().span.start;
            let name = self.parse_ident()?;
            let arg = if self.consume(TokenKind::LParen) {
                let token = self.advance();
                let arg = match token.kind {
                    TokenKind::Ident => AttributeArg::Ident(self.text(&token).to_string()),
                    TokenKind::IntLiteral => {
                        let value = parse_int(self.text(&token)).ok_or_else(|| {
                            ParseError::invalid_literal("integer literal out of range", token.span)
                        })?;
                        AttributeArg::Int(value)
                    }
                    TokenKind::StringLiteral => {
                        AttributeArg::Str(unquote(self.text(&token)))
                    }
                    _ => return Err(ParseError::unexpected("attribute argument", &token)),
                };
                self.expect(TokenKind::RParen)?;
                Some(arg)
            } else {
                None
            };
            attributes.push(Attribute {
                name,
                arg,
                span: self.span_from(start),
            });

            if !self.consume(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RBracket)?;
        Ok(attributes)
    }

    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        let attributes = if self.check(TokenKind::LBracket) {
            self.parse_attributes()?
        } else {
            Vec::new()
        };

        match self.current().kind {
            TokenKind::Struct => {
                reject_attributes(&attributes, "struct")?;
                self.parse_struct().map(Declaration::Struct)
            }
            TokenKind::External => {
                reject_attributes(&attributes, "external block")?;
                self.parse_external().map(Declaration::External)
            }
            TokenKind::Fn => {
                let entry = entry_stage(&attributes)?;
                self.parse_function(entry).map(Declaration::Function)
            }
            _ => Err(ParseError::unexpected(
                "declaration (struct, external or fn)",
                self.current(),
            )),
        }
    }

    // ============ Declarations ============

    fn parse_struct(&mut self) -> ParseResult<StructDecl> {
        let start = self.current().span.start;
        self.expect(TokenKind::Struct)?;
        let name = self.parse_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let field_start = self.current().span.start;
            let field_name = self.parse_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            fields.push(StructField {
                name: field_name,
                ty,
                span: self.span_from(field_start),
            });

            if !self.consume(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(StructDecl {
            name,
            fields,
            span: self.span_from(start),
        })
    }

    fn parse_external(&mut self) -> ParseResult<ExternalDecl> {
        let start = self.current().span.start;
        self.expect(TokenKind::External)?;
        self.expect(TokenKind::LBrace)?;

        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            entries.push(self.parse_external_entry()?);
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(ExternalDecl {
            entries,
            span: self.span_from(start),
        })
    }

    fn parse_external_entry(&mut self) -> ParseResult<ExternalEntry> {
        let start = self.current().span.start;
        let attributes = if self.check(TokenKind::LBracket) {
            self.parse_attributes()?
        } else {
            Vec::new()
        };

        let mut set = None;
        let mut binding = None;
        for attr in &attributes {
            let slot = match attr.name.name.as_str() {
                "set" => &mut set,
                "binding" => &mut binding,
                other => {
                    return Err(ParseError::malformed(
                        format!("unknown external attribute '{}'", other),
                        attr.span,
                    ))
                }
            };
            let value = match attr.arg {
                Some(AttributeArg::Int(v)) => u32::try_from(v).map_err(|_| {
                    ParseError::invalid_literal("binding index out of range", attr.span)
                })?,
                _ => {
                    return Err(ParseError::malformed(
                        format!("{} expects a non-negative integer", attr.name.name),
                        attr.span,
                    ))
                }
            };
            if slot.replace(value).is_some() {
                return Err(ParseError::malformed(
                    format!("duplicate {} attribute", attr.name.name),
                    attr.span,
                ));
            }
        }

        let name = self.parse_ident()?;
        let set = set.ok_or_else(|| {
            ParseError::missing_attribute(
                format!("external '{}' has no set attribute", name.name),
                name.span,
            )
        })?;
        let binding = binding.ok_or_else(|| {
            ParseError::missing_attribute(
                format!("external '{}' has no binding attribute", name.name),
                name.span,
            )
        })?;

        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        Ok(ExternalEntry {
            name,
            ty,
            set,
            binding,
            id: None,
            span: self.span_from(start),
        })
    }

    fn parse_function(&mut self, entry: Option<ShaderStage>) -> ParseResult<FunctionDecl> {
        let start = self.current().span.start;
        self.expect(TokenKind::Fn)?;
        let name = self.parse_ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) && !self.is_at_end() {
            let param_start = self.current().span.start;
            let param_name = self.parse_ident()?;
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param {
                name: param_name,
                ty,
                id: None,
                span: self.span_from(param_start),
            });
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if self.consume(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;
        Ok(FunctionDecl {
            name,
            entry,
            params,
            return_type,
            body,
            span: self.span_from(start),
        })
    }

    // ============ Types ============

    pub fn parse_type(&mut self) -> ParseResult<ExpressionType> {
        let name = self.parse_ident()?;

        if let Some(primitive) = PrimitiveType::from_name(&name.name) {
            return Ok(ExpressionType::Primitive(primitive));
        }

        if let Some(size) = vector_size(&name.name) {
            self.expect(TokenKind::LBracket)?;
            let component = self.parse_ident()?;
            self.expect(TokenKind::RBracket)?;
            return match PrimitiveType::from_name(&component.name) {
                Some(c) if c.is_numeric() => Ok(ExpressionType::vector(c, size)),
                _ => Err(ParseError::malformed(
                    format!("'{}' is not a valid vector component type", component.name),
                    component.span,
                )),
            };
        }

        if name.name == "uniform" {
            self.expect(TokenKind::LBracket)?;
            let inner = self.parse_ident()?;
            self.expect(TokenKind::RBracket)?;
            return Ok(ExpressionType::Uniform(inner.name));
        }

        Ok(ExpressionType::Struct(name.name))
    }

    // ============ Statements ============

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.nested(Self::parse_block_inner)
    }

    fn parse_block_inner(&mut self) -> ParseResult<Block> {
        let start = self.current().span.start;
        self.expect(TokenKind::LBrace)?;

        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            stmts.push(self.parse_statement()?);
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Block {
            stmts,
            span: self.span_from(start),
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current().span.start;

        let kind = match self.current().kind {
            TokenKind::Let => {
                self.advance();
                let name = self.parse_ident()?;
                let ty = if self.consume(TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                self.expect(TokenKind::Eq)?;
                let init = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                StmtKind::VariableDeclaration {
                    name,
                    ty,
                    init,
                    id: None,
                }
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Return(value)
            }
            TokenKind::If => return self.parse_branch(),
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                StmtKind::Expression(expr)
            }
        };

        Ok(Statement {
            kind,
            span: self.span_from(start),
        })
    }

    /// `if cond { } else if cond { } else { }`; an `else if` becomes an else
    /// block holding a single branch
    fn parse_branch(&mut self) -> ParseResult<Statement> {
        let start = self.current().span.start;
        self.expect(TokenKind::If)?;
        let condition = self.parse_expr()?;
        let then_block = self.parse_block()?;

        let else_block = if self.consume(TokenKind::Else) {
            if self.check(TokenKind::If) {
                let nested = self.nested(Self::parse_branch)?;
                let span = nested.span;
                Some(Block {
                    stmts: vec![nested],
                    span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(Statement {
            kind: StmtKind::Branch {
                condition,
                then_block,
                else_block,
            },
            span: self.span_from(start),
        })
    }

    // ============ Expression parsing ============

    pub fn parse_expr(&mut self) -> ParseResult<Expression> {
        self.nested(Self::parse_assignment)
    }

    fn parse_assignment(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_binary(0)?;

        if self.consume(TokenKind::Eq) {
            let start = expr.span.start;
            let value = self.parse_expr()?;
            return Ok(Expression::new(
                ExprKind::Assign {
                    target: Box::new(expr),
                    value: Box::new(value),
                },
                self.span_from(start),
            ));
        }

        Ok(expr)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> ParseResult<Expression> {
        let entered = self.depth;
        let result = self.parse_operator_chain(min_precedence);
        self.depth = entered;
        result
    }

    /// Every operator folded into the left operand nests it one level deeper
    fn parse_operator_chain(&mut self, min_precedence: u8) -> ParseResult<Expression> {
        let mut lhs = self.parse_unary()?;

        while let Some(op) = binary_op(self.current().kind) {
            if op.precedence() < min_precedence {
                break;
            }
            self.advance();
            self.deepen()?;
            let rhs = self.parse_binary(op.precedence() + 1)?;
            let start = lhs.span.start;
            lhs = Expression::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                self.span_from(start),
            );
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let start = self.current().span.start;
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Not => UnaryOp::LogicalNot,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expression::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            self.span_from(start),
        ))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let expr = self.parse_primary()?;
        if !self.check(TokenKind::Dot) {
            return Ok(expr);
        }

        let start = expr.span.start;
        let mut fields = Vec::new();
        while self.consume(TokenKind::Dot) {
            fields.push(self.parse_ident()?);
        }

        Ok(Expression::new(
            ExprKind::AccessMember {
                base: Box::new(expr),
                fields,
            },
            self.span_from(start),
        ))
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let start = self.current().span.start;
        let token = self.current().clone();

        let kind = match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                ExprKind::Literal(int_literal(self.text(&token), token.span)?)
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value: f32 = self
                    .text(&token)
                    .replace('_', "")
                    .parse()
                    .map_err(|_| ParseError::invalid_literal("malformed float literal", token.span))?;
                if !value.is_finite() {
                    return Err(ParseError::invalid_literal(
                        "float literal out of range",
                        token.span,
                    ));
                }
                ExprKind::Literal(Literal::F32(value))
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::Ident => {
                let name = self.text(&token);
                let next = self.peek_nth(1).kind;
                let is_constructor = (PrimitiveType::from_name(name).is_some()
                    && next == TokenKind::LParen)
                    || (vector_size(name).is_some() && next == TokenKind::LBracket);

                if is_constructor {
                    let target = self.parse_type()?;
                    self.expect(TokenKind::LParen)?;
                    let args = self.parse_args()?;
                    ExprKind::Cast { target, args }
                } else if next == TokenKind::LParen {
                    let callee = self.parse_ident()?;
                    self.expect(TokenKind::LParen)?;
                    let args = self.parse_args()?;
                    ExprKind::Call { callee, args }
                } else {
                    self.advance();
                    ExprKind::Identifier(name.to_string())
                }
            }
            _ => return Err(ParseError::unexpected("expression", &token)),
        };

        Ok(Expression::new(kind, self.span_from(start)))
    }

    /// Arguments after the opening parenthesis, consumes the closing one
    fn parse_args(&mut self) -> ParseResult<Vec<Expression>> {
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) && !self.is_at_end() {
            args.push(self.parse_expr()?);
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }
}

fn reject_attributes(attributes: &[Attribute], what: &str) -> ParseResult<()> {
    match attributes.first() {
        Some(attr) => Err(ParseError::malformed(
            format!("attribute '{}' is not allowed on a {}", attr.name.name, what),
            attr.span,
        )),
        None => Ok(()),
    }
}

fn entry_stage(attributes: &[Attribute]) -> ParseResult<Option<ShaderStage>> {
    let mut stage = None;
    for attr in attributes {
        if attr.name.name != "entry" {
            return Err(ParseError::malformed(
                format!("unknown function attribute '{}'", attr.name.name),
                attr.span,
            ));
        }
        let parsed = match &attr.arg {
            Some(AttributeArg::Ident(name)) => ShaderStage::from_attribute(name),
            _ => None,
        };
        let parsed = parsed.ok_or_else(|| {
            ParseError::malformed("entry expects one of vert, frag or compute", attr.span)
        })?;
        if stage.replace(parsed).is_some() {
            return Err(ParseError::malformed("duplicate entry attribute", attr.span));
        }
    }
    Ok(stage)
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Subtract,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::EqEq => BinaryOp::CompEq,
        TokenKind::NotEq => BinaryOp::CompNe,
        TokenKind::Lt => BinaryOp::CompLt,
        TokenKind::LtEq => BinaryOp::CompLe,
        TokenKind::Gt => BinaryOp::CompGt,
        TokenKind::GtEq => BinaryOp::CompGe,
        TokenKind::AndAnd => BinaryOp::LogicalAnd,
        TokenKind::OrOr => BinaryOp::LogicalOr,
        _ => return None,
    };
    Some(op)
}

fn parse_int(text: &str) -> Option<u64> {
    let text = text.replace('_', "");
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Integer literals are `i32` when they fit, `u32` above that
fn int_literal(text: &str, span: Span) -> ParseResult<Literal> {
    let value = parse_int(text)
        .ok_or_else(|| ParseError::invalid_literal("integer literal out of range", span))?;
    if let Ok(v) = i32::try_from(value) {
        Ok(Literal::I32(v))
    } else if let Ok(v) = u32::try_from(value) {
        Ok(Literal::U32(v))
    } else {
        Err(ParseError::invalid_literal(
            "integer literal does not fit in 32 bits",
            span,
        ))
    }
}

fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "[nzsl_version(\"1.0\")]\nmodule;\n";

    fn parse_ok(body: &str) -> Module {
        let source = format!("{}{}", HEADER, body);
        let mut parser = Parser::new(&source).expect("lexing failed");
        match parser.parse_module() {
            Ok(module) => module,
            Err(e) => panic!("Parse error: {}", e),
        }
    }

    fn parse_err(source: &str) -> ParseError {
        let mut parser = Parser::new(source).expect("lexing failed");
        parser.parse_module().expect_err("expected a parse error")
    }

    fn first_function(module: &Module) -> &FunctionDecl {
        module.functions().next().expect("Expected a function")
    }

    #[test]
    fn test_empty_module() {
        let module = parse_ok("");
        assert_eq!(module.header.version, "1.0");
        assert!(module.header.name.is_none());
        assert!(module.declarations.is_empty());
    }

    #[test]
    fn test_named_module() {
        let mut parser = Parser::new("[nzsl_version(\"1.0\")] module Engine;").unwrap();
        let module = parser.parse_module().unwrap();
        assert_eq!(module.header.name.as_deref(), Some("Engine"));
    }

    #[test]
    fn test_missing_version() {
        let err = parse_err("module;");
        assert_eq!(err.kind, ParseErrorKind::MissingAttribute);
        assert_eq!(err.span, Span::new(0, 6));
    }

    #[test]
    fn test_struct() {
        let module = parse_ok("struct Inner { field: vec3[f32], count: u32, }");
        let s = module.structs().next().expect("Expected struct");
        assert_eq!(s.name.name, "Inner");
        assert_eq!(s.fields.len(), 2);
        assert_eq!(s.fields[0].ty, ExpressionType::vector(PrimitiveType::F32, 3));
        assert_eq!(s.fields[1].ty, ExpressionType::u32());
    }

    #[test]
    fn test_external_block() {
        let module = parse_ok(
            "external { [set(1), binding(2)] ubo: uniform[Data], [binding(0), set(0)] other: uniform[Data] }",
        );
        let entries: Vec<_> = module.externals().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].set, entries[0].binding), (1, 2));
        assert_eq!(entries[0].ty, ExpressionType::uniform("Data"));
        assert_eq!((entries[1].set, entries[1].binding), (0, 0));
    }

    #[test]
    fn test_external_without_binding() {
        let err = parse_err(&format!("{}external {{ [set(0)] ubo: uniform[Data] }}", HEADER));
        assert_eq!(err.kind, ParseErrorKind::MissingAttribute);
    }

    #[test]
    fn test_entry_function() {
        let module = parse_ok("[entry(frag)] fn main() { let x: f32 = 1.0; }");
        let f = first_function(&module);
        assert_eq!(f.entry, Some(ShaderStage::Fragment));
        assert_eq!(f.body.stmts.len(), 1);
    }

    #[test]
    fn test_unknown_stage() {
        let err = parse_err(&format!("{}[entry(geometry)] fn main() {{}}", HEADER));
        assert_eq!(err.kind, ParseErrorKind::MalformedDeclaration);
    }

    #[test]
    fn test_attribute_on_struct() {
        let err = parse_err(&format!("{}[entry(vert)] struct A {{ x: f32 }}", HEADER));
        assert_eq!(err.kind, ParseErrorKind::MalformedDeclaration);
    }

    #[test]
    fn test_function_with_params() {
        let module = parse_ok("fn add(a: f32, b: f32) -> f32 { return a + b; }");
        let f = first_function(&module);
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.return_type, Some(ExpressionType::f32()));
    }

    #[test]
    fn test_member_chain_is_one_node() {
        let module = parse_ok("fn f() { let r = ubo.s.field.z; }");
        let f = first_function(&module);
        let StmtKind::VariableDeclaration { init, ty, .. } = &f.body.stmts[0].kind else {
            panic!("Expected variable declaration");
        };
        assert!(ty.is_none());
        match &init.kind {
            ExprKind::AccessMember { base, fields } => {
                assert_eq!(base.kind, ExprKind::Identifier("ubo".to_string()));
                let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["s", "field", "z"]);
            }
            other => panic!("Expected member access, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let module = parse_ok("fn f() { let r = 1 + 2 * 3 - 4; }");
        let f = first_function(&module);
        let StmtKind::VariableDeclaration { init, .. } = &f.body.stmts[0].kind else {
            panic!("Expected variable declaration");
        };
        // ((1 + (2 * 3)) - 4)
        let ExprKind::Binary { op, lhs, .. } = &init.kind else {
            panic!("Expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Subtract);
        let ExprKind::Binary { op, rhs, .. } = &lhs.kind else {
            panic!("Expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Multiply, .. }));
    }

    #[test]
    fn test_member_access_binds_tighter_than_operators() {
        let module = parse_ok("fn f() { let r = a.x * b.y; }");
        let f = first_function(&module);
        let StmtKind::VariableDeclaration { init, .. } = &f.body.stmts[0].kind else {
            panic!("Expected variable declaration");
        };
        let ExprKind::Binary { lhs, rhs, .. } = &init.kind else {
            panic!("Expected binary expression");
        };
        assert!(matches!(lhs.kind, ExprKind::AccessMember { .. }));
        assert!(matches!(rhs.kind, ExprKind::AccessMember { .. }));
    }

    #[test]
    fn test_constructors_and_calls() {
        let module = parse_ok("fn f() { let v = vec3[f32](1.0, 2.0, 3.0); let l = length(v); let i = f32(2); }");
        let f = first_function(&module);
        let inits: Vec<_> = f
            .body
            .stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::VariableDeclaration { init, .. } => init,
                _ => panic!("Expected variable declaration"),
            })
            .collect();
        assert!(matches!(&inits[0].kind, ExprKind::Cast { args, .. } if args.len() == 3));
        assert!(matches!(&inits[1].kind, ExprKind::Call { callee, .. } if callee.name == "length"));
        assert!(matches!(&inits[2].kind, ExprKind::Cast { target, .. } if *target == ExpressionType::f32()));
    }

    #[test]
    fn test_if_else_if() {
        let module = parse_ok("fn f(x: i32) -> i32 { if x < 0 { return 0; } else if x > 9 { return 9; } else { return x; } }");
        let f = first_function(&module);
        let StmtKind::Branch { else_block, .. } = &f.body.stmts[0].kind else {
            panic!("Expected branch");
        };
        let else_block = else_block.as_ref().expect("Expected else block");
        assert_eq!(else_block.stmts.len(), 1);
        assert!(matches!(else_block.stmts[0].kind, StmtKind::Branch { .. }));
    }

    #[test]
    fn test_large_integer_becomes_u32() {
        let module = parse_ok("fn f() { let a = 3000000000; }");
        let f = first_function(&module);
        let StmtKind::VariableDeclaration { init, .. } = &f.body.stmts[0].kind else {
            panic!("Expected variable declaration");
        };
        assert_eq!(init.kind, ExprKind::Literal(Literal::U32(3_000_000_000)));
    }

    #[test]
    fn test_integer_overflow() {
        let err = parse_err(&format!("{}fn f() {{ let a = 99999999999; }}", HEADER));
        assert_eq!(err.kind, ParseErrorKind::InvalidLiteral);
    }

    #[test]
    fn test_unexpected_token_reports_expected_and_found() {
        let err = parse_err(&format!("{}fn f() {{ let = 1; }}", HEADER));
        assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
        assert_eq!(err.found, Some(TokenKind::Eq));
        assert_eq!(err.expected.as_deref(), Some("'identifier'"));
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let parens = format!(
            "{}fn f() {{ let a = {}1{}; }}",
            HEADER,
            "(".repeat(5000),
            ")".repeat(5000)
        );
        let err = parse_err(&parens);
        assert_eq!(err.kind, ParseErrorKind::MalformedDeclaration);
        assert!(err.to_string().contains("nesting too deep"));

        let unary = format!("{}fn f() {{ let a = {}1; }}", HEADER, "-".repeat(5000));
        assert_eq!(parse_err(&unary).kind, ParseErrorKind::MalformedDeclaration);

        let blocks = format!("{}fn f() {{ {}{} }}", HEADER, "{".repeat(5000), "}".repeat(5000));
        assert_eq!(parse_err(&blocks).kind, ParseErrorKind::MalformedDeclaration);

        let calls = format!("{}fn f() {{ let a = {}1{}; }}", HEADER, "g(".repeat(5000), ")".repeat(5000));
        assert_eq!(parse_err(&calls).kind, ParseErrorKind::MalformedDeclaration);
    }

    #[test]
    fn test_long_operator_chain_is_an_error() {
        let terms = vec!["1"; 20_000].join(" + ");
        let err = parse_err(&format!("{}fn f() {{ let a = {}; }}", HEADER, terms));
        assert_eq!(err.kind, ParseErrorKind::MalformedDeclaration);
    }

    #[test]
    fn test_moderate_nesting_is_accepted() {
        let module = parse_ok(&format!("fn f() {{ let a = {}1{}; }}", "(".repeat(32), ")".repeat(32)));
        assert_eq!(first_function(&module).body.stmts.len(), 1);

        let terms = vec!["x"; 64].join(" * ");
        parse_ok(&format!("fn f(x: f32) {{ let a = {}; }}", terms));
    }
}
