//! Scope arena and data layout.
//!
//! Scopes live in a flat arena indexed by [`ScopeId`], parallel to the
//! syntax-tree arena; statement blocks record their scope id during symbol
//! resolution. Data allocation assigns every surviving variable a concrete
//! location: a byte offset into the global data block, a byte offset into
//! the owning function's stack frame, or a byte offset into the owning
//! struct's instance layout.

use rustc_hash::FxHashMap;
use snex_diagnostic::{CompileError, CompileResult};
use snex_ir::{
    NamespacedIdentifier, NodeId, NodeKind, ScopeId, StringInterner, SymbolFlags, SyntaxTree,
    TypeInfo,
};
use snex_types::{ComplexTypeKind, ComplexTypeRegistry};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ScopeKind {
    Global,
    Class,
    Function,
    Anonymous,
}

#[derive(Clone, Debug)]
pub struct ScopeData {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub declarations: Vec<NamespacedIdentifier>,
}

/// Arena of scopes for one compilation. The global scope always exists at
/// [`ScopeId::GLOBAL`].
pub struct ScopeArena {
    scopes: Vec<ScopeData>,
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena {
            scopes: vec![ScopeData {
                parent: None,
                kind: ScopeKind::Global,
                declarations: Vec::new(),
            }],
        }
    }

    pub fn add(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            parent: Some(parent),
            kind,
            declarations: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &ScopeData {
        &self.scopes[id.0 as usize]
    }

    pub fn record_declaration(&mut self, id: ScopeId, name: NamespacedIdentifier) {
        self.scopes[id.0 as usize].declarations.push(name);
    }

    /// True when any scope records a declaration of `name`.
    pub fn declares(&self, name: &NamespacedIdentifier) -> bool {
        self.scopes.iter().any(|s| s.declarations.contains(name))
    }

    /// True when `scope` or one of its ancestors records a declaration of
    /// `name`. A local declared inside a nested block is only visible from
    /// scopes that block encloses.
    pub fn is_visible(&self, mut scope: ScopeId, name: &NamespacedIdentifier) -> bool {
        loop {
            let data = self.get(scope);
            if data.declarations.contains(name) {
                return true;
            }
            match data.parent {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a variable lives at runtime.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum VarLoc {
    /// Byte offset into the global data block.
    Global { offset: u32 },
    /// Byte offset into the current function's stack frame.
    Stack { offset: u32 },
    /// Byte offset into the owning struct instance, addressed off the
    /// receiver pointer inside methods.
    Member { offset: u32 },
}

/// One allocated global, kept for initialisation and the symbol table.
#[derive(Clone, Debug)]
pub struct GlobalSlot {
    pub id: NamespacedIdentifier,
    pub ty: TypeInfo,
    pub offset: u32,
    pub node: NodeId,
}

/// The result of the data-allocation pass.
#[derive(Default, Debug)]
pub struct DataLayout {
    pub locations: FxHashMap<NamespacedIdentifier, VarLoc>,
    pub globals: Vec<GlobalSlot>,
    pub size: u32,
}

const fn align_to(offset: u32, alignment: u32) -> u32 {
    (offset + alignment - 1) & !(alignment - 1)
}

/// Allocate global-block offsets for every top-level variable definition
/// and record member offsets for every registered struct type.
///
/// A top-level `auto` must carry an immediate initializer at this point;
/// its type is taken from the value. Compile-time constants take no
/// storage, they fold away during resolution.
pub fn allocate_globals(
    tree: &mut SyntaxTree,
    root: NodeId,
    complex_types: &ComplexTypeRegistry,
    interner: &StringInterner,
) -> CompileResult<DataLayout> {
    let mut layout = DataLayout::default();

    for (_, complex) in complex_types.iter() {
        if let ComplexTypeKind::Struct { name, members } = &complex.kind {
            for member in members {
                layout.locations.insert(
                    name.child(member.name),
                    VarLoc::Member {
                        offset: member.offset,
                    },
                );
            }
        }
    }

    let NodeKind::StatementBlock { statements, .. } = tree.kind(root) else {
        return Ok(layout);
    };
    let statements: Vec<NodeId> = statements.iter().copied().collect();

    let mut offset = 0u32;
    for stmt in statements {
        let span = tree.node(stmt).span;
        match tree.kind(stmt) {
            NodeKind::VariableDefinition { symbol, init } => {
                if symbol.is_compile_time_constant() {
                    continue;
                }
                let id = symbol.id.clone();
                let init = *init;
                let mut ty = symbol.type_info;
                if ty.is_dynamic() {
                    let Some(value) = init.and_then(|i| match tree.kind(i) {
                        NodeKind::Immediate(v) => Some(*v),
                        _ => None,
                    }) else {
                        return Err(CompileError::UnresolvedAuto {
                            name: id.display(interner).to_string(),
                            span,
                        });
                    };
                    ty = TypeInfo::Primitive(value.get_type());
                    if let NodeKind::VariableDefinition { symbol, .. } =
                        &mut tree.node_mut(stmt).kind
                    {
                        symbol.type_info = ty;
                    }
                }
                let size = complex_types.size_of(ty);
                offset = align_to(offset, complex_types.alignment_of(ty).max(1));
                layout
                    .locations
                    .insert(id.clone(), VarLoc::Global { offset });
                layout.globals.push(GlobalSlot {
                    id,
                    ty,
                    offset,
                    node: stmt,
                });
                offset += size;
            }
            NodeKind::ComplexTypeDefinition { symbol, .. } => {
                let id = symbol.id.clone();
                let ty = symbol.type_info;
                let size = complex_types.size_of(ty);
                offset = align_to(offset, complex_types.alignment_of(ty).max(1));
                layout
                    .locations
                    .insert(id.clone(), VarLoc::Global { offset });
                layout.globals.push(GlobalSlot {
                    id,
                    ty,
                    offset,
                    node: stmt,
                });
                offset += size;
            }
            NodeKind::Function(_) | NodeKind::ClassStatement { .. } | NodeKind::Noop => {}
            _ => return Err(CompileError::IllegalStatement { span }),
        }
    }
    layout.size = align_to(offset, 8);
    Ok(layout)
}

/// Assign stack-frame offsets for a function's parameters and locals,
/// returning the frame size in bytes.
///
/// Parameters spill to the frame at entry so the register allocator can
/// treat every named value as memory-backed. Complex-typed parameters
/// pass as pointers and take pointer-sized slots.
pub fn allocate_frame(
    tree: &SyntaxTree,
    params: &[snex_ir::Symbol],
    body: NodeId,
    complex_types: &ComplexTypeRegistry,
    locations: &mut FxHashMap<NamespacedIdentifier, VarLoc>,
) -> u32 {
    let mut offset = 0u32;
    let mut place = |id: NamespacedIdentifier, size: u32, alignment: u32| {
        offset = align_to(offset, alignment.max(1));
        locations.insert(id, VarLoc::Stack { offset });
        offset += size;
    };

    for param in params {
        let reg_ty = param.type_info.register_type();
        place(
            param.id.clone(),
            reg_ty.size_in_bytes() as u32,
            reg_ty.alignment() as u32,
        );
    }

    for node in tree.walk(body) {
        match tree.kind(node) {
            NodeKind::VariableDefinition { symbol, .. } => {
                if symbol.flags.contains(SymbolFlags::PARAMETER)
                    || symbol.is_compile_time_constant()
                {
                    continue;
                }
                place(
                    symbol.id.clone(),
                    complex_types.size_of(symbol.type_info),
                    complex_types.alignment_of(symbol.type_info),
                );
            }
            NodeKind::ComplexTypeDefinition { symbol, .. } => {
                place(
                    symbol.id.clone(),
                    complex_types.size_of(symbol.type_info),
                    complex_types.alignment_of(symbol.type_info),
                );
            }
            _ => {}
        }
    }
    align_to(offset, 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snex_ir::{Span, Symbol, Types, VariableStorage};

    #[test]
    fn scope_arena_parents() {
        let mut arena = ScopeArena::new();
        let f = arena.add(ScopeId::GLOBAL, ScopeKind::Function);
        let inner = arena.add(f, ScopeKind::Anonymous);
        assert_eq!(arena.get(inner).parent, Some(f));
        assert_eq!(arena.get(f).parent, Some(ScopeId::GLOBAL));
        assert_eq!(arena.get(ScopeId::GLOBAL).kind, ScopeKind::Global);
    }

    #[test]
    fn declarations_are_visible_from_enclosed_scopes_only() {
        let mut interner = StringInterner::new();
        let mut arena = ScopeArena::new();
        let f = arena.add(ScopeId::GLOBAL, ScopeKind::Function);
        let body = arena.add(f, ScopeKind::Anonymous);
        let branch = arena.add(body, ScopeKind::Anonymous);
        let sibling = arena.add(body, ScopeKind::Anonymous);

        let y = NamespacedIdentifier::new(interner.intern("y"));
        arena.record_declaration(branch, y.clone());
        assert!(arena.declares(&y));
        assert!(arena.is_visible(branch, &y));
        // Neither the enclosing body nor a sibling branch sees it.
        assert!(!arena.is_visible(body, &y));
        assert!(!arena.is_visible(sibling, &y));

        let g = NamespacedIdentifier::new(interner.intern("g"));
        arena.record_declaration(ScopeId::GLOBAL, g.clone());
        assert!(arena.is_visible(branch, &g));
    }

    #[test]
    fn globals_are_aligned_and_auto_takes_the_initializer_type() {
        let mut interner = StringInterner::new();
        let registry = ComplexTypeRegistry::new();
        let mut tree = SyntaxTree::new();

        let a = NamespacedIdentifier::new(interner.intern("a"));
        let b = NamespacedIdentifier::new(interner.intern("b"));
        let def_a = tree.add(
            NodeKind::VariableDefinition {
                symbol: Symbol::new(a.clone(), TypeInfo::Primitive(Types::Integer)),
                init: None,
            },
            Span::DUMMY,
        );
        let init_b = tree.add(
            NodeKind::Immediate(VariableStorage::Double(0.5)),
            Span::DUMMY,
        );
        let def_b = tree.add(
            NodeKind::VariableDefinition {
                symbol: Symbol::new(b.clone(), TypeInfo::DYNAMIC),
                init: Some(init_b),
            },
            Span::DUMMY,
        );
        let root = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec::smallvec![def_a, def_b],
                scope: Some(ScopeId::GLOBAL),
            },
            Span::DUMMY,
        );

        let layout = allocate_globals(&mut tree, root, &registry, &interner).expect("allocate");
        assert_eq!(layout.locations[&a], VarLoc::Global { offset: 0 });
        // The double aligns up past the 4-byte int.
        assert_eq!(layout.locations[&b], VarLoc::Global { offset: 8 });
        assert_eq!(layout.size, 16);
        assert_eq!(
            layout.globals[1].ty,
            TypeInfo::Primitive(Types::Double)
        );
    }

    #[test]
    fn unresolved_auto_global_is_an_error() {
        let mut interner = StringInterner::new();
        let registry = ComplexTypeRegistry::new();
        let mut tree = SyntaxTree::new();
        let x = NamespacedIdentifier::new(interner.intern("x"));
        let def = tree.add(
            NodeKind::VariableDefinition {
                symbol: Symbol::new(x, TypeInfo::DYNAMIC),
                init: None,
            },
            Span::DUMMY,
        );
        let root = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec::smallvec![def],
                scope: Some(ScopeId::GLOBAL),
            },
            Span::DUMMY,
        );
        let err = allocate_globals(&mut tree, root, &registry, &interner).unwrap_err();
        assert!(err.to_string().contains("concrete type"));
    }
}
