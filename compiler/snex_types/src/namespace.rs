//! Hierarchical namespace and symbol handler.
//!
//! Records every declared name together with its classification, resolved
//! type, and visibility, and resolves possibly-qualified identifiers
//! against the current namespace path. The handler is mutated freely while
//! parsing (push/pop on entering namespaces, classes and functions) and is
//! queried read-only by the later passes.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{Name, NamespacedIdentifier, Span, StringInterner, Symbol, VariableStorage};

/// Classification of a registered name.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum SymbolType {
    Variable,
    Function,
    Constant,
    Struct,
    EnumValue,
    TemplateType,
    TemplateConstant,
    UsingAlias,
}

/// Member visibility, enforced at resolution time.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub const fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

/// One registered declaration.
#[derive(Clone, Debug)]
pub struct RegisteredItem {
    pub symbol: Symbol,
    pub kind: SymbolType,
    pub visibility: Visibility,
    pub doc: Option<String>,
}

/// The namespace & symbol handler for one compilation.
///
/// Not shared across concurrent compiles: registration mutates the current
/// path and the item table during parsing.
#[derive(Default)]
pub struct NamespaceHandler {
    items: FxHashMap<NamespacedIdentifier, RegisteredItem>,
    /// Namespace segments from the root to the current position.
    current: Vec<Name>,
    /// Aliases introduced by `using`; resolved transparently on lookup.
    aliases: FxHashMap<NamespacedIdentifier, NamespacedIdentifier>,
}

impl NamespaceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a namespace/class/function scope named `name`.
    pub fn push(&mut self, name: Name) {
        self.current.push(name);
    }

    pub fn pop(&mut self) {
        debug_assert!(!self.current.is_empty(), "unbalanced namespace pop");
        self.current.pop();
    }

    /// The fully-qualified id for `name` declared at the current position.
    pub fn qualify(&self, name: Name) -> NamespacedIdentifier {
        NamespacedIdentifier::from_path(self.current.iter().copied().chain([name]))
    }

    /// Qualify a relative identifier against the current path.
    pub fn qualify_relative(&self, relative: &NamespacedIdentifier) -> NamespacedIdentifier {
        NamespacedIdentifier::from_path(
            self.current
                .iter()
                .copied()
                .chain(relative.segments().iter().copied()),
        )
    }

    pub fn current_path(&self) -> &[Name] {
        &self.current
    }

    /// Register a declaration at the current namespace position.
    ///
    /// Functions may be registered once per name (overloads live inside the
    /// function class); any other duplicate is an illegal redeclaration.
    pub fn register(
        &mut self,
        symbol: Symbol,
        kind: SymbolType,
        visibility: Visibility,
        span: Span,
        interner: &StringInterner,
    ) -> CompileResult<NamespacedIdentifier> {
        let id = symbol.id.clone();
        if let Some(existing) = self.items.get(&id) {
            let both_functions =
                existing.kind == SymbolType::Function && kind == SymbolType::Function;
            if !both_functions {
                return Err(CompileError::Redeclaration {
                    name: id.display(interner).to_string(),
                    span,
                });
            }
            return Ok(id);
        }
        self.items.insert(
            id.clone(),
            RegisteredItem {
                symbol,
                kind,
                visibility,
                doc: None,
            },
        );
        Ok(id)
    }

    /// Attach doc text to an already-registered item.
    pub fn set_doc(&mut self, id: &NamespacedIdentifier, doc: String) {
        if let Some(item) = self.items.get_mut(id) {
            item.doc = Some(doc);
        }
    }

    /// Register an alias introduced by `using name = target;`.
    pub fn add_alias(&mut self, alias: Name, target: NamespacedIdentifier) {
        self.aliases.insert(self.qualify(alias), target);
    }

    /// Shortcut for registering an enum value or other compile-time constant.
    pub fn add_constant(
        &mut self,
        name: Name,
        value: VariableStorage,
        kind: SymbolType,
        span: Span,
        interner: &StringInterner,
    ) -> CompileResult<NamespacedIdentifier> {
        let mut symbol = Symbol::new(
            self.qualify(name),
            snex_ir::TypeInfo::Primitive(value.get_type()),
        );
        symbol.set_constant(value);
        self.register(symbol, kind, Visibility::Public, span, interner)
    }

    /// Look up an identifier without visibility checks.
    ///
    /// Walks outward from the current namespace to the root, inner scopes
    /// taking precedence, and follows `using` aliases.
    pub fn lookup(&self, id: &NamespacedIdentifier) -> Option<(NamespacedIdentifier, &RegisteredItem)> {
        for depth in (0..=self.current.len()).rev() {
            let candidate = NamespacedIdentifier::from_path(
                self.current[..depth]
                    .iter()
                    .copied()
                    .chain(id.segments().iter().copied()),
            );
            let candidate = self.follow_alias(candidate);
            if let Some(item) = self.items.get(&candidate) {
                return Some((candidate, item));
            }
        }
        None
    }

    fn follow_alias(&self, id: NamespacedIdentifier) -> NamespacedIdentifier {
        // One level of aliasing is enough for `using` chains in practice;
        // follow a short chain defensively bounded.
        let mut current = id;
        for _ in 0..4 {
            match self.aliases.get(&current) {
                Some(target) => current = target.clone(),
                None => break,
            }
        }
        current
    }

    /// Resolve an identifier, enforcing visibility.
    ///
    /// A `private` item is accessible only from within its declaring
    /// namespace; `protected` additionally from nested namespaces of it.
    pub fn resolve(
        &self,
        id: &NamespacedIdentifier,
        span: Span,
        interner: &StringInterner,
    ) -> CompileResult<(NamespacedIdentifier, &RegisteredItem)> {
        let Some((qualified, item)) = self.lookup(id) else {
            return Err(CompileError::UndefinedSymbol {
                name: id.display(interner).to_string(),
                span,
            });
        };
        match item.visibility {
            Visibility::Public => {}
            Visibility::Private | Visibility::Protected => {
                let owner: SmallVec<[Name; 2]> = qualified.segments()
                    [..qualified.segments().len() - 1]
                    .iter()
                    .copied()
                    .collect();
                let accessible = self.current.len() >= owner.len()
                    && self.current[..owner.len()] == owner[..];
                if !accessible {
                    return Err(CompileError::NotAccessible {
                        name: qualified.display(interner).to_string(),
                        visibility: item.visibility.as_str(),
                        span,
                    });
                }
            }
        }
        Ok((qualified, item))
    }

    /// All items registered directly inside `parent`.
    pub fn items_in<'a>(
        &'a self,
        parent: &'a [Name],
    ) -> impl Iterator<Item = &'a RegisteredItem> + 'a {
        self.items.iter().filter_map(move |(id, item)| {
            let segs = id.segments();
            (segs.len() == parent.len() + 1 && &segs[..parent.len()] == parent).then_some(item)
        })
    }

    pub fn get(&self, id: &NamespacedIdentifier) -> Option<&RegisteredItem> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &NamespacedIdentifier) -> Option<&mut RegisteredItem> {
        self.items.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_ir::{TypeInfo, Types};

    fn symbol(handler: &NamespaceHandler, name: Name) -> Symbol {
        Symbol::new(handler.qualify(name), TypeInfo::Primitive(Types::Integer))
    }

    #[test]
    fn inner_scopes_take_precedence() {
        let mut i = StringInterner::new();
        let mut h = NamespaceHandler::new();
        let x = i.intern("x");
        let inner = i.intern("Inner");

        h.register(
            symbol(&h, x),
            SymbolType::Variable,
            Visibility::Public,
            Span::DUMMY,
            &i,
        )
        .expect("register");
        h.push(inner);
        h.register(
            symbol(&h, x),
            SymbolType::Variable,
            Visibility::Public,
            Span::DUMMY,
            &i,
        )
        .expect("register");

        let (found, _) = h.lookup(&NamespacedIdentifier::new(x)).expect("lookup");
        assert_eq!(found.segments(), &[inner, x]);

        h.pop();
        let (found, _) = h.lookup(&NamespacedIdentifier::new(x)).expect("lookup");
        assert_eq!(found.segments(), &[x]);
    }

    #[test]
    fn items_in_lists_direct_children_only() {
        let mut i = StringInterner::new();
        let mut h = NamespaceHandler::new();
        let outer = i.intern("Outer");
        let inner = i.intern("Inner");
        let a = i.intern("a");
        let b = i.intern("b");

        h.push(outer);
        h.register(
            symbol(&h, a),
            SymbolType::Variable,
            Visibility::Public,
            Span::DUMMY,
            &i,
        )
        .expect("register");
        h.push(inner);
        h.register(
            symbol(&h, b),
            SymbolType::Variable,
            Visibility::Public,
            Span::DUMMY,
            &i,
        )
        .expect("register");
        h.pop();
        h.pop();

        let parent = [outer];
        let names: Vec<Name> = h.items_in(&parent).map(|item| item.symbol.name()).collect();
        assert_eq!(names, vec![a]);
    }

    #[test]
    fn redeclaration_is_an_error() {
        let mut i = StringInterner::new();
        let mut h = NamespaceHandler::new();
        let x = i.intern("x");
        h.register(
            symbol(&h, x),
            SymbolType::Variable,
            Visibility::Public,
            Span::DUMMY,
            &i,
        )
        .expect("register");
        let err = h
            .register(
                symbol(&h, x),
                SymbolType::Variable,
                Visibility::Public,
                Span::DUMMY,
                &i,
            )
            .unwrap_err();
        assert!(err.to_string().contains("redeclaration"));
    }

    #[test]
    fn private_member_is_hidden_outside_its_namespace() {
        let mut i = StringInterner::new();
        let mut h = NamespaceHandler::new();
        let class = i.intern("Filter");
        let state = i.intern("state");

        h.push(class);
        h.register(
            symbol(&h, state),
            SymbolType::Variable,
            Visibility::Private,
            Span::DUMMY,
            &i,
        )
        .expect("register");

        // Accessible from inside.
        h.resolve(&NamespacedIdentifier::new(state), Span::DUMMY, &i)
            .expect("inside access");
        h.pop();

        // Qualified access from outside is denied.
        let qualified = NamespacedIdentifier::new(class).child(state);
        let err = h.resolve(&qualified, Span::DUMMY, &i).unwrap_err();
        assert!(err.to_string().contains("private"));
    }

    #[test]
    fn using_alias_resolves() {
        let mut i = StringInterner::new();
        let mut h = NamespaceHandler::new();
        let ns = i.intern("Filters");
        let ladder = i.intern("Ladder");
        let alias = i.intern("L");

        h.push(ns);
        h.register(
            Symbol::new(h.qualify(ladder), TypeInfo::Primitive(Types::Integer)),
            SymbolType::Struct,
            Visibility::Public,
            Span::DUMMY,
            &i,
        )
        .expect("register");
        h.pop();

        h.add_alias(alias, NamespacedIdentifier::new(ns).child(ladder));
        let (found, item) = h
            .resolve(&NamespacedIdentifier::new(alias), Span::DUMMY, &i)
            .expect("alias lookup");
        assert_eq!(found.segments(), &[ns, ladder]);
        assert_eq!(item.kind, SymbolType::Struct);
    }

    #[test]
    fn enum_constant_carries_value() {
        let mut i = StringInterner::new();
        let mut h = NamespaceHandler::new();
        let v = i.intern("NoteOn");
        h.add_constant(
            v,
            VariableStorage::Int(144),
            SymbolType::EnumValue,
            Span::DUMMY,
            &i,
        )
        .expect("register");
        let (_, item) = h.lookup(&NamespacedIdentifier::new(v)).expect("lookup");
        assert_eq!(item.symbol.constant, Some(VariableStorage::Int(144)));
    }
}
