//! Type annotation parsing: primitives, `span<T, N>`, `dyn<T>`, struct
//! names and template instantiations.

use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    ComplexTypeId, Name, NamespacedIdentifier, NodeId, Span, TokenKind, TypeInfo, Types,
};
use snex_types::{Instantiation, SymbolType, TemplateArg, TemplateKind, Visibility};

use crate::parser::Parser;

impl Parser<'_> {
    /// Whether the current token can start a type annotation. Identifiers
    /// count only when they name a registered struct, template or bound
    /// template type parameter.
    pub(crate) fn at_type(&self) -> bool {
        match self.cursor.kind() {
            TokenKind::Int
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Void
            | TokenKind::Bool
            | TokenKind::BlockTy
            | TokenKind::EventTy
            | TokenKind::Auto
            | TokenKind::SpanTy
            | TokenKind::DynTy => true,
            TokenKind::Ident(name) => self.ident_is_type(name),
            _ => false,
        }
    }

    fn ident_is_type(&self, name: Name) -> bool {
        if let Some(TemplateArg::Type(_)) = self.bindings.get(&name) {
            return true;
        }
        let id = NamespacedIdentifier::new(name);
        if self.templates.is_template(&id) {
            return true;
        }
        matches!(
            self.namespaces.lookup(&id),
            Some((_, item)) if matches!(item.kind, SymbolType::Struct | SymbolType::UsingAlias)
        )
    }

    /// Parse a type annotation.
    pub(crate) fn parse_type(&mut self) -> CompileResult<TypeInfo> {
        let span = self.cursor.span();
        let ty = match self.cursor.kind() {
            TokenKind::Int => {
                self.cursor.bump();
                TypeInfo::Primitive(Types::Integer)
            }
            TokenKind::Float => {
                self.cursor.bump();
                TypeInfo::Primitive(Types::Float)
            }
            TokenKind::Double => {
                self.cursor.bump();
                TypeInfo::Primitive(Types::Double)
            }
            TokenKind::Void => {
                self.cursor.bump();
                TypeInfo::VOID
            }
            // `bool` is spelled separately but stored as int.
            TokenKind::Bool => {
                self.cursor.bump();
                TypeInfo::Primitive(Types::Integer)
            }
            TokenKind::BlockTy => {
                self.cursor.bump();
                TypeInfo::Primitive(Types::Block)
            }
            TokenKind::EventTy => {
                self.cursor.bump();
                TypeInfo::Primitive(Types::Event)
            }
            TokenKind::Auto => {
                self.cursor.bump();
                TypeInfo::DYNAMIC
            }
            TokenKind::SpanTy => {
                self.cursor.bump();
                self.cursor.expect(TokenKind::Lt)?;
                let element = self.parse_type()?;
                self.cursor.expect(TokenKind::Comma)?;
                let length = self.parse_const_int()?;
                self.cursor.expect(TokenKind::Gt)?;
                if length <= 0 {
                    return Err(CompileError::TemplateError {
                        name: "span".to_owned(),
                        reason: format!("span length must be positive, found {length}"),
                        span,
                    });
                }
                TypeInfo::Complex(self.complex_types.register_span(element, length as u32))
            }
            TokenKind::DynTy => {
                self.cursor.bump();
                self.cursor.expect(TokenKind::Lt)?;
                let element = self.parse_type()?;
                self.cursor.expect(TokenKind::Gt)?;
                TypeInfo::Complex(self.complex_types.register_dyn(element))
            }
            TokenKind::Ident(_) => self.parse_named_type()?,
            found => {
                return Err(CompileError::ExpectedType {
                    found: found.describe().to_owned(),
                    span,
                });
            }
        };
        Ok(ty)
    }

    fn parse_named_type(&mut self) -> CompileResult<TypeInfo> {
        let (first, span) = self.cursor.expect_ident()?;
        if let Some(&TemplateArg::Type(ty)) = self.bindings.get(&first) {
            return Ok(ty);
        }
        let mut id = NamespacedIdentifier::new(first);
        while self.cursor.eat(TokenKind::ColonColon) {
            let (seg, _) = self.cursor.expect_ident()?;
            id = id.child(seg);
        }

        if self.templates.is_template(&id) && self.cursor.is(TokenKind::Lt) {
            let args = self.parse_template_args()?;
            let type_id = self.instantiate_struct_template(&id, args, span)?;
            return Ok(TypeInfo::Complex(type_id));
        }

        let (_, item) = self.namespaces.resolve(&id, span, self.interner)?;
        match item.kind {
            SymbolType::Struct => Ok(item.symbol.type_info),
            _ => Err(CompileError::ExpectedType {
                found: format!("'{}'", id.display(self.interner)),
                span,
            }),
        }
    }

    /// A compile-time integer: a literal, a bound template constant, or a
    /// previously-registered constant symbol.
    pub(crate) fn parse_const_int(&mut self) -> CompileResult<i64> {
        let span = self.cursor.span();
        match self.cursor.kind() {
            TokenKind::IntLit(v) => {
                self.cursor.bump();
                Ok(v)
            }
            TokenKind::Ident(name) => {
                if let Some(&TemplateArg::Constant(v)) = self.bindings.get(&name) {
                    self.cursor.bump();
                    return Ok(v);
                }
                let id = NamespacedIdentifier::new(name);
                let (_, item) = self.namespaces.resolve(&id, span, self.interner)?;
                match item.symbol.constant {
                    Some(v) => {
                        self.cursor.bump();
                        Ok(v.to_int())
                    }
                    None => Err(CompileError::UnexpectedToken {
                        expected: "compile-time integer constant".to_owned(),
                        found: format!("'{}'", id.display(self.interner)),
                        span,
                    }),
                }
            }
            found => Err(CompileError::UnexpectedToken {
                expected: "compile-time integer constant".to_owned(),
                found: found.describe().to_owned(),
                span,
            }),
        }
    }

    /// Parse `<arg, ...>` at an instantiation site.
    pub(crate) fn parse_template_args(&mut self) -> CompileResult<Vec<TemplateArg>> {
        self.cursor.expect(TokenKind::Lt)?;
        let mut args = Vec::new();
        loop {
            if self.at_type() {
                args.push(TemplateArg::Type(self.parse_type()?));
            } else {
                args.push(TemplateArg::Constant(self.parse_const_int()?));
            }
            if !self.cursor.eat(TokenKind::Comma) {
                break;
            }
        }
        self.cursor.expect(TokenKind::Gt)?;
        Ok(args)
    }

    /// Instantiate a struct template, memoized by argument list. The body
    /// tokens are re-parsed with the parameters bound and the result is
    /// registered under a mangled name.
    fn instantiate_struct_template(
        &mut self,
        id: &NamespacedIdentifier,
        args: Vec<TemplateArg>,
        span: Span,
    ) -> CompileResult<ComplexTypeId> {
        if let Some(Instantiation::Struct(existing)) = self.templates.instance(id, &args) {
            return Ok(existing);
        }
        let template = self
            .templates
            .check_arguments(id, &args, span, self.interner)?;
        if template.kind != TemplateKind::Struct {
            return Err(CompileError::TemplateError {
                name: id.display(self.interner).to_string(),
                reason: "function templates cannot be used as types".to_owned(),
                span,
            });
        }
        let body = template.body_tokens;
        let params: Vec<Name> = template.parameters.iter().map(|p| p.name).collect();

        let mangled = self.mangle_instance_name(id, &args);

        // Re-parse the captured declaration with the parameters bound,
        // then restore the surrounding parse state.
        let saved_pos = self.cursor.position();
        let saved_bindings = std::mem::take(&mut self.bindings);
        let saved_visibility = self.section_visibility;
        self.bindings = params.into_iter().zip(args.iter().copied()).collect();
        self.section_visibility = Visibility::Public;
        self.cursor.set_position(body.start as usize);

        let result = self.parse_struct_declaration(Some(mangled));

        self.cursor.set_position(saved_pos);
        self.bindings = saved_bindings;
        self.section_visibility = saved_visibility;

        let (type_id, node) = result?;
        self.instantiated.push(node);
        self.templates
            .memoize(id.clone(), args, Instantiation::Struct(type_id));
        Ok(type_id)
    }

    /// Instantiate a function template at a call site (`max<float>(a, b)`),
    /// returning the qualified name of the generated function. Repeated
    /// instantiations with the same arguments reuse the registered one.
    pub(crate) fn instantiate_function_template(
        &mut self,
        id: &NamespacedIdentifier,
        span: Span,
    ) -> CompileResult<NamespacedIdentifier> {
        let args = self.parse_template_args()?;
        let template = self
            .templates
            .check_arguments(id, &args, span, self.interner)?;
        if template.kind != TemplateKind::Function {
            return Err(CompileError::TemplateError {
                name: id.display(self.interner).to_string(),
                reason: "struct templates cannot be called".to_owned(),
                span,
            });
        }
        let body = template.body_tokens;
        let params: Vec<Name> = template.parameters.iter().map(|p| p.name).collect();

        let mangled = self.mangle_instance_name(id, &args);
        let mangled_id = self.namespaces.qualify(mangled);
        if self.namespaces.get(&mangled_id).is_some() {
            return Ok(mangled_id);
        }

        let saved_pos = self.cursor.position();
        let saved_bindings = std::mem::take(&mut self.bindings);
        self.bindings = params.into_iter().zip(args.iter().copied()).collect();
        self.cursor.set_position(body.start as usize);

        let result = self.parse_function_template_body(mangled);

        self.cursor.set_position(saved_pos);
        self.bindings = saved_bindings;

        let node = result?;
        self.instantiated.push(node);
        Ok(mangled_id)
    }

    /// Re-parse a captured function template declaration under the mangled
    /// instance name. The cursor sits on the declaration's return type.
    fn parse_function_template_body(&mut self, mangled: Name) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let ty = self.parse_type()?;
        let (_declared, _) = self.cursor.expect_ident()?;
        self.parse_function_after_name(ty, mangled, start, snex_ir::SymbolFlags::empty())
    }

    fn mangle_instance_name(&mut self, id: &NamespacedIdentifier, args: &[TemplateArg]) -> Name {
        let mut text = id.display(self.interner).to_string();
        text.push('<');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                text.push(',');
            }
            match arg {
                TemplateArg::Type(TypeInfo::Primitive(p)) => text.push_str(p.as_str()),
                TemplateArg::Type(TypeInfo::Complex(c)) => {
                    text.push_str(&format!("#{}", c.0));
                }
                TemplateArg::Constant(v) => text.push_str(&v.to_string()),
            }
        }
        text.push('>');
        self.interner.intern(&text)
    }
}
