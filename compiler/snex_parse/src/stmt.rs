//! Statement and declaration grammar.
//!
//! Top-level declarations register themselves in the namespace handler as
//! they parse. Namespace blocks flatten into the enclosing statement list;
//! the qualified symbol names carry the nesting. Function bodies are
//! captured as token ranges and parsed later, once every class-level
//! symbol is known.

use smallvec::SmallVec;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    ComplexTypeId, FunctionInfo, Name, NamespacedIdentifier, NodeId, NodeKind, Span, Symbol,
    SymbolFlags, TokenKind, TypeInfo, VariableStorage,
};
use snex_types::{
    SymbolType, TemplateKind, TemplateObject, TemplateParamKind, TemplateParameter, Visibility,
};

use crate::parser::Parser;

impl Parser<'_> {
    /// Parse one top-level item, appending the produced statements (a
    /// namespace block contributes its contents; `using`, `enum` and
    /// `template` declarations contribute none).
    pub(crate) fn parse_top_level(
        &mut self,
        statements: &mut SmallVec<[NodeId; 8]>,
    ) -> CompileResult<()> {
        match self.cursor.kind() {
            TokenKind::Namespace => {
                self.cursor.bump();
                let (name, _) = self.cursor.expect_ident()?;
                self.namespaces.push(name);
                self.cursor.expect(TokenKind::LBrace)?;
                while !self.cursor.is(TokenKind::RBrace) && !self.cursor.is(TokenKind::Eof) {
                    self.parse_top_level(statements)?;
                }
                self.cursor.expect(TokenKind::RBrace)?;
                self.namespaces.pop();
            }
            TokenKind::Using => self.parse_using()?,
            TokenKind::Enum => self.parse_enum()?,
            TokenKind::Template => self.parse_template_declaration()?,
            TokenKind::Struct | TokenKind::Class => {
                let (_, node) = self.parse_struct_declaration(None)?;
                statements.push(node);
            }
            _ => statements.push(self.parse_statement()?),
        }
        Ok(())
    }

    pub(crate) fn parse_statement(&mut self) -> CompileResult<NodeId> {
        match self.cursor.kind() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LoopBlock | TokenKind::LoopSpan => self.parse_loop(),
            TokenKind::Const | TokenKind::Static => self.parse_definition(),
            _ if self.at_type() => self.parse_definition(),
            _ => {
                let expr = self.parse_expression()?;
                self.cursor.expect(TokenKind::Semicolon)?;
                Ok(expr)
            }
        }
    }

    pub(crate) fn parse_block(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::LBrace)?;
        let mut statements = SmallVec::new();
        while !self.cursor.is(TokenKind::RBrace) && !self.cursor.is(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.cursor.expect(TokenKind::RBrace)?;
        let span = start.merge(self.cursor.previous_span());
        Ok(self.add(NodeKind::StatementBlock { statements, scope: None }, span))
    }

    fn parse_if(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::If)?;
        self.cursor.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.cursor.expect(TokenKind::RParen)?;
        let then_branch = self.parse_statement()?;
        let else_branch = if self.cursor.eat(TokenKind::Else) {
            Some(self.parse_statement()?)
        } else {
            None
        };
        let span = start.merge(self.cursor.previous_span());
        Ok(self.add(
            NodeKind::IfStatement {
                cond,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn parse_return(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        self.cursor.expect(TokenKind::Return)?;
        let expr = if self.cursor.is(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.cursor.expect(TokenKind::Semicolon)?;
        let span = start.merge(self.cursor.previous_span());
        Ok(self.add(NodeKind::ReturnStatement { expr }, span))
    }

    /// `loop_block (s: target) body` / `loop_span (s: target) body`.
    ///
    /// The iterator symbol stays unregistered here; symbol resolution
    /// introduces it when it walks the loop, scoped to the body.
    fn parse_loop(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let kind = if self.cursor.bump().kind == TokenKind::LoopBlock {
            snex_ir::LoopKind::Block
        } else {
            snex_ir::LoopKind::Span
        };
        self.cursor.expect(TokenKind::LParen)?;
        let (iter_name, _) = self.cursor.expect_ident()?;
        self.cursor.expect(TokenKind::Colon)?;
        let target = self.parse_expression()?;
        self.cursor.expect(TokenKind::RParen)?;
        let body = self.parse_statement()?;
        let span = start.merge(self.cursor.previous_span());
        let iterator = Symbol::new(self.namespaces.qualify(iter_name), TypeInfo::DYNAMIC);
        Ok(self.add(
            NodeKind::Loop {
                kind,
                iterator,
                target,
                body,
            },
            span,
        ))
    }

    /// A declaration starting with modifiers and a type: either a variable
    /// definition or a function definition.
    fn parse_definition(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let doc = self.cursor.doc_comment().map(str::to_owned);
        let mut flags = SymbolFlags::empty();
        loop {
            if self.cursor.eat(TokenKind::Const) {
                flags |= SymbolFlags::CONST;
            } else if self.cursor.eat(TokenKind::Static) {
                flags |= SymbolFlags::STATIC;
            } else {
                break;
            }
        }
        let ty = self.parse_type()?;
        let (name, name_span) = self.cursor.expect_ident()?;

        if self.cursor.is(TokenKind::LParen) {
            let node = self.parse_function_after_name(ty, name, start, flags)?;
            if let Some(d) = doc {
                self.namespaces.set_doc(&self.namespaces.qualify(name), d);
            }
            return Ok(node);
        }

        let node = self.parse_variable_after_name(ty, name, name_span, start, flags)?;
        if let Some(d) = doc {
            self.namespaces.set_doc(&self.namespaces.qualify(name), d);
        }
        Ok(node)
    }

    fn parse_variable_after_name(
        &mut self,
        ty: TypeInfo,
        name: Name,
        name_span: Span,
        start: Span,
        flags: SymbolFlags,
    ) -> CompileResult<NodeId> {
        let init = if self.cursor.eat(TokenKind::Assign) {
            if self.cursor.is(TokenKind::LBrace) {
                return self.parse_complex_initializer(ty, name, name_span, start, flags);
            }
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.cursor.expect(TokenKind::Semicolon)?;

        let mut symbol = Symbol::new(self.namespaces.qualify(name), ty).with_flags(flags);
        // A const with a literal initializer is a compile-time constant
        // usable in span lengths and template arguments right away.
        if flags.contains(SymbolFlags::CONST) {
            if let Some(init) = init {
                if let NodeKind::Immediate(v) = self.tree.kind(init) {
                    symbol.set_constant(*v);
                }
            }
        }
        let kind = if symbol.is_compile_time_constant() {
            SymbolType::Constant
        } else {
            SymbolType::Variable
        };
        self.namespaces.register(
            symbol.clone(),
            kind,
            self.section_visibility,
            name_span,
            self.interner,
        )?;
        let span = start.merge(self.cursor.previous_span());
        if let TypeInfo::Complex(type_id) = ty {
            return Ok(self.add(
                NodeKind::ComplexTypeDefinition {
                    symbol,
                    type_id,
                    init: init.into_iter().collect(),
                },
                span,
            ));
        }
        Ok(self.add(NodeKind::VariableDefinition { symbol, init }, span))
    }

    /// `span<float, 4> x = { 1.0f, ... };` brace-initialized complex value.
    fn parse_complex_initializer(
        &mut self,
        ty: TypeInfo,
        name: Name,
        name_span: Span,
        start: Span,
        flags: SymbolFlags,
    ) -> CompileResult<NodeId> {
        let TypeInfo::Complex(type_id) = ty else {
            return Err(CompileError::UnexpectedToken {
                expected: "an expression".to_owned(),
                found: "'{'".to_owned(),
                span: self.cursor.span(),
            });
        };
        self.cursor.expect(TokenKind::LBrace)?;
        let mut init = SmallVec::new();
        if !self.cursor.is(TokenKind::RBrace) {
            loop {
                init.push(self.parse_expression()?);
                if !self.cursor.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.cursor.expect(TokenKind::RBrace)?;
        self.cursor.expect(TokenKind::Semicolon)?;

        let symbol = Symbol::new(self.namespaces.qualify(name), ty).with_flags(flags);
        self.namespaces.register(
            symbol.clone(),
            SymbolType::Variable,
            self.section_visibility,
            name_span,
            self.interner,
        )?;
        let span = start.merge(self.cursor.previous_span());
        Ok(self.add(
            NodeKind::ComplexTypeDefinition {
                symbol,
                type_id,
                init,
            },
            span,
        ))
    }

    /// Parse a function definition after `type name` with the cursor on the
    /// parameter list. The body is captured, not parsed.
    pub(crate) fn parse_function_after_name(
        &mut self,
        return_ty: TypeInfo,
        name: Name,
        start: Span,
        flags: SymbolFlags,
    ) -> CompileResult<NodeId> {
        let name_symbol = Symbol::new(self.namespaces.qualify(name), return_ty).with_flags(flags);
        self.namespaces.register(
            name_symbol.clone(),
            SymbolType::Function,
            self.section_visibility,
            start,
            self.interner,
        )?;

        // Parameters register inside the function's own namespace so body
        // references resolve against them.
        self.namespaces.push(name);
        let result = self.parse_parameters_and_body(name_symbol, start);
        self.namespaces.pop();
        result
    }

    fn parse_parameters_and_body(
        &mut self,
        name_symbol: Symbol,
        start: Span,
    ) -> CompileResult<NodeId> {
        self.cursor.expect(TokenKind::LParen)?;
        let mut parameters = Vec::new();
        if !self.cursor.is(TokenKind::RParen) {
            loop {
                let ty = self.parse_type()?;
                let (pname, pspan) = self.cursor.expect_ident()?;
                let param = Symbol::new(self.namespaces.qualify(pname), ty)
                    .with_flags(SymbolFlags::PARAMETER);
                self.namespaces.register(
                    param.clone(),
                    SymbolType::Variable,
                    Visibility::Public,
                    pspan,
                    self.interner,
                )?;
                parameters.push(param);
                if !self.cursor.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.cursor.expect(TokenKind::RParen)?;
        let body_tokens = self.cursor.capture_braced()?;
        if !self.bindings.is_empty() {
            self.body_bindings
                .push((name_symbol.id.clone(), self.bindings.clone()));
        }
        let span = start.merge(self.cursor.previous_span());
        Ok(self.add(
            NodeKind::Function(Box::new(FunctionInfo {
                name: name_symbol,
                parameters,
                body_tokens,
                body: None,
                is_inlinable: true,
            })),
            span,
        ))
    }

    /// `struct Name { ... };` / `class Name { ... };`.
    ///
    /// `override_name` substitutes the declared name when a template body
    /// is re-parsed for an instantiation.
    pub(crate) fn parse_struct_declaration(
        &mut self,
        override_name: Option<Name>,
    ) -> CompileResult<(ComplexTypeId, NodeId)> {
        let start = self.cursor.span();
        let default_visibility = if self.cursor.bump().kind == TokenKind::Class {
            Visibility::Private
        } else {
            Visibility::Public
        };
        let (declared, name_span) = self.cursor.expect_ident()?;
        let name = override_name.unwrap_or(declared);

        let qualified = self.namespaces.qualify(name);
        let type_id = self.complex_types.register_struct(qualified.clone());
        self.namespaces.register(
            Symbol::new(qualified.clone(), TypeInfo::Complex(type_id)),
            SymbolType::Struct,
            Visibility::Public,
            name_span,
            self.interner,
        )?;

        self.namespaces.push(name);
        let saved_visibility = self.section_visibility;
        self.section_visibility = default_visibility;
        let result = self.parse_struct_body(type_id);
        self.section_visibility = saved_visibility;
        self.namespaces.pop();
        let body = result?;

        self.complex_types.finalize_struct(type_id);
        let span = start.merge(self.cursor.previous_span());
        let node = self.add(
            NodeKind::ClassStatement {
                name: qualified,
                type_id,
                body,
            },
            span,
        );
        Ok((type_id, node))
    }

    fn parse_struct_body(
        &mut self,
        type_id: ComplexTypeId,
    ) -> CompileResult<SmallVec<[NodeId; 8]>> {
        self.cursor.expect(TokenKind::LBrace)?;
        let mut body = SmallVec::new();
        while !self.cursor.is(TokenKind::RBrace) && !self.cursor.is(TokenKind::Eof) {
            match self.cursor.kind() {
                TokenKind::Public => {
                    self.cursor.bump();
                    self.cursor.expect(TokenKind::Colon)?;
                    self.section_visibility = Visibility::Public;
                }
                TokenKind::Private => {
                    self.cursor.bump();
                    self.cursor.expect(TokenKind::Colon)?;
                    self.section_visibility = Visibility::Private;
                }
                TokenKind::Protected => {
                    self.cursor.bump();
                    self.cursor.expect(TokenKind::Colon)?;
                    self.section_visibility = Visibility::Protected;
                }
                _ => body.push(self.parse_member(type_id)?),
            }
        }
        self.cursor.expect(TokenKind::RBrace)?;
        self.cursor.eat(TokenKind::Semicolon);
        Ok(body)
    }

    /// One struct member: a data member with an optional literal default,
    /// or a method definition.
    fn parse_member(&mut self, type_id: ComplexTypeId) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let doc = self.cursor.doc_comment().map(str::to_owned);
        let mut flags = SymbolFlags::empty();
        while self.cursor.eat(TokenKind::Const) {
            flags |= SymbolFlags::CONST;
        }
        let ty = self.parse_type()?;
        let (name, name_span) = self.cursor.expect_ident()?;

        if self.cursor.is(TokenKind::LParen) {
            let node = self.parse_function_after_name(ty, name, start, flags)?;
            if let Some(d) = doc {
                self.namespaces.set_doc(&self.namespaces.qualify(name), d);
            }
            return Ok(node);
        }

        let default = if self.cursor.eat(TokenKind::Assign) {
            let init = self.parse_expression()?;
            match self.tree.kind(init) {
                NodeKind::Immediate(v) => Some(*v),
                _ => {
                    return Err(CompileError::UnexpectedToken {
                        expected: "a literal default value".to_owned(),
                        found: "an expression".to_owned(),
                        span: self.tree.node(init).span,
                    });
                }
            }
        } else {
            None
        };
        self.cursor.expect(TokenKind::Semicolon)?;

        self.complex_types
            .add_struct_member(type_id, name, ty, self.section_visibility, default);
        let symbol = Symbol::new(self.namespaces.qualify(name), ty).with_flags(flags);
        self.namespaces.register(
            symbol.clone(),
            SymbolType::Variable,
            self.section_visibility,
            name_span,
            self.interner,
        )?;
        if let Some(d) = doc {
            self.namespaces.set_doc(&symbol.id, d);
        }
        let span = start.merge(self.cursor.previous_span());
        let init = default.map(|v| self.add(NodeKind::Immediate(v), span));
        Ok(self.add(NodeKind::VariableDefinition { symbol, init }, span))
    }

    /// `using Alias = Some::Path;`
    fn parse_using(&mut self) -> CompileResult<()> {
        self.cursor.expect(TokenKind::Using)?;
        let (alias, _) = self.cursor.expect_ident()?;
        self.cursor.expect(TokenKind::Assign)?;
        let (first, _) = self.cursor.expect_ident()?;
        let mut target = NamespacedIdentifier::new(first);
        while self.cursor.eat(TokenKind::ColonColon) {
            let (seg, _) = self.cursor.expect_ident()?;
            target = target.child(seg);
        }
        self.cursor.expect(TokenKind::Semicolon)?;
        self.namespaces.add_alias(alias, target);
        Ok(())
    }

    /// `enum Name { A, B = 4, C };` — values register as compile-time
    /// constants under `Name::`.
    fn parse_enum(&mut self) -> CompileResult<()> {
        self.cursor.expect(TokenKind::Enum)?;
        let (name, _) = self.cursor.expect_ident()?;
        self.cursor.expect(TokenKind::LBrace)?;
        self.namespaces.push(name);
        let mut next_value = 0i64;
        while !self.cursor.is(TokenKind::RBrace) {
            let (value_name, value_span) = self.cursor.expect_ident()?;
            if self.cursor.eat(TokenKind::Assign) {
                next_value = self.parse_const_int()?;
            }
            self.namespaces.add_constant(
                value_name,
                VariableStorage::Int(next_value),
                SymbolType::EnumValue,
                value_span,
                self.interner,
            )?;
            next_value += 1;
            if !self.cursor.eat(TokenKind::Comma) {
                break;
            }
        }
        self.namespaces.pop();
        self.cursor.expect(TokenKind::RBrace)?;
        self.cursor.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    /// `template <typename T, int N> struct ... ;` or a function template.
    ///
    /// The declaration body is captured unparsed; instantiation re-parses
    /// it with the parameters bound.
    fn parse_template_declaration(&mut self) -> CompileResult<()> {
        self.cursor.expect(TokenKind::Template)?;
        self.cursor.expect(TokenKind::Lt)?;
        let mut parameters = Vec::new();
        loop {
            let kind = match self.cursor.kind() {
                TokenKind::Typename => TemplateParamKind::Type,
                TokenKind::Int => TemplateParamKind::IntConstant,
                found => {
                    return Err(CompileError::UnexpectedToken {
                        expected: "'typename' or 'int'".to_owned(),
                        found: found.describe().to_owned(),
                        span: self.cursor.span(),
                    });
                }
            };
            self.cursor.bump();
            let (pname, _) = self.cursor.expect_ident()?;
            parameters.push(TemplateParameter { name: pname, kind });
            if !self.cursor.eat(TokenKind::Comma) {
                break;
            }
        }
        self.cursor.expect(TokenKind::Gt)?;

        let start = self.cursor.position() as u32;
        let (name, kind) = self.skim_template_target()?;
        let end = self.cursor.position() as u32;

        self.templates.register(TemplateObject {
            id: self.namespaces.qualify(name),
            kind,
            parameters,
            body_tokens: snex_ir::TokenRange { start, end },
        });
        Ok(())
    }

    /// Skip over the templated declaration without parsing it, returning
    /// the declared name and whether it is a struct or function template.
    fn skim_template_target(&mut self) -> CompileResult<(Name, TemplateKind)> {
        if matches!(self.cursor.kind(), TokenKind::Struct | TokenKind::Class) {
            self.cursor.bump();
            let (name, _) = self.cursor.expect_ident()?;
            // Skip ahead to the body brace; struct headers have nothing
            // else before it.
            let _ = self.cursor.capture_braced()?;
            self.cursor.eat(TokenKind::Semicolon);
            return Ok((name, TemplateKind::Struct));
        }

        // Function template: the name is the last identifier before the
        // parameter list.
        let mut name = None;
        loop {
            match self.cursor.kind() {
                TokenKind::Ident(n) => {
                    name = Some(n);
                    self.cursor.bump();
                }
                TokenKind::LParen => break,
                TokenKind::Eof => {
                    return Err(CompileError::UnexpectedToken {
                        expected: "a function declaration".to_owned(),
                        found: "end of file".to_owned(),
                        span: self.cursor.span(),
                    });
                }
                _ => {
                    self.cursor.bump();
                }
            }
        }
        let Some(name) = name else {
            return Err(CompileError::UnexpectedToken {
                expected: "a function name".to_owned(),
                found: self.cursor.kind().describe().to_owned(),
                span: self.cursor.span(),
            });
        };
        // Skip the parameter list, then capture the body.
        let mut depth = 0u32;
        loop {
            match self.cursor.kind() {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        self.cursor.bump();
                        break;
                    }
                }
                TokenKind::Eof => {
                    return Err(CompileError::UnexpectedToken {
                        expected: "')'".to_owned(),
                        found: "end of file".to_owned(),
                        span: self.cursor.span(),
                    });
                }
                _ => {}
            }
            self.cursor.bump();
        }
        let _ = self.cursor.capture_braced()?;
        Ok((name, TemplateKind::Function))
    }
}
