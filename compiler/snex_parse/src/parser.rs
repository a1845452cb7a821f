//! The parser state shared by the grammar modules.
//!
//! Grammar productions are split across `ty`, `expr` and `stmt`; this
//! module holds the parser struct, its constructors and small shared
//! helpers. Parsing registers declarations in the namespace handler and
//! complex-type registry as it goes, so later statements can refer to
//! earlier declarations without a separate collection pass.

use rustc_hash::FxHashMap;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    Name, NamespacedIdentifier, NodeId, NodeKind, Span, StringInterner, SyntaxTree, TokenList,
    TokenRange,
};
use snex_types::{
    ComplexTypeRegistry, NamespaceHandler, TemplateArg, TemplateRegistry, Visibility,
};

use crate::cursor::TokenCursor;

pub struct Parser<'a> {
    pub(crate) cursor: TokenCursor<'a>,
    pub(crate) interner: &'a mut StringInterner,
    pub(crate) namespaces: &'a mut NamespaceHandler,
    pub(crate) complex_types: &'a mut ComplexTypeRegistry,
    pub(crate) templates: &'a mut TemplateRegistry,
    pub(crate) tree: &'a mut SyntaxTree,
    /// Template parameters bound while re-parsing a template body.
    pub(crate) bindings: FxHashMap<Name, TemplateArg>,
    /// Visibility of the section currently being parsed inside a
    /// struct/class body; `Public` elsewhere.
    pub(crate) section_visibility: Visibility,
    /// Nodes produced by template instantiation mid-expression; the driver
    /// appends them to the root block so their functions get compiled.
    pub(crate) instantiated: Vec<NodeId>,
    /// Bindings active while a function body was captured, keyed by the
    /// function's qualified name. Template-instance bodies need them again
    /// when the body is finally parsed.
    pub(crate) body_bindings: Vec<(NamespacedIdentifier, FxHashMap<Name, TemplateArg>)>,
}

/// The session objects a parser mutates, bundled to keep constructors flat.
pub struct ParseSession<'a> {
    pub interner: &'a mut StringInterner,
    pub namespaces: &'a mut NamespaceHandler,
    pub complex_types: &'a mut ComplexTypeRegistry,
    pub templates: &'a mut TemplateRegistry,
    pub tree: &'a mut SyntaxTree,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a TokenList, session: ParseSession<'a>) -> Self {
        Parser {
            cursor: TokenCursor::new(tokens),
            interner: session.interner,
            namespaces: session.namespaces,
            complex_types: session.complex_types,
            templates: session.templates,
            tree: session.tree,
            bindings: FxHashMap::default(),
            section_visibility: Visibility::Public,
            instantiated: Vec::new(),
            body_bindings: Vec::new(),
        }
    }

    /// Start parsing at a token offset, used for captured function bodies.
    pub fn at_offset(tokens: &'a TokenList, offset: usize, session: ParseSession<'a>) -> Self {
        let mut parser = Parser::new(tokens, session);
        parser.cursor.set_position(offset);
        parser
    }

    /// Bind template parameters for the duration of a body re-parse.
    pub fn bind_template_args(&mut self, bindings: FxHashMap<Name, TemplateArg>) {
        self.bindings = bindings;
    }

    /// Parse a whole program: top-level statements until EOF. Returns the
    /// root statement block.
    pub fn parse_program(&mut self) -> CompileResult<NodeId> {
        let start = self.cursor.span();
        let mut statements = smallvec::SmallVec::new();
        while !self.cursor.is(snex_ir::TokenKind::Eof) {
            self.parse_top_level(&mut statements)?;
        }
        let span = start.merge(self.cursor.previous_span());
        Ok(self.tree.add(
            NodeKind::StatementBlock {
                statements,
                scope: Some(snex_ir::ScopeId::GLOBAL),
            },
            span,
        ))
    }

    /// Drain the nodes produced by template instantiations so far.
    pub fn take_instantiated(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.instantiated)
    }

    /// Drain the bindings captured alongside template-instance bodies.
    pub fn take_body_bindings(
        &mut self,
    ) -> Vec<(NamespacedIdentifier, FxHashMap<Name, TemplateArg>)> {
        std::mem::take(&mut self.body_bindings)
    }

    /// Parse one captured function body (the cursor must sit on its `{`).
    pub fn parse_body(&mut self, range: TokenRange) -> CompileResult<NodeId> {
        self.cursor.set_position(range.start as usize);
        self.parse_block()
    }

    pub(crate) fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.tree.add(kind, span)
    }

    pub(crate) fn expected_expression(&self) -> CompileError {
        CompileError::ExpectedExpression {
            found: self.cursor.kind().describe().to_owned(),
            span: self.cursor.span(),
        }
    }
}
