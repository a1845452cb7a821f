//! Arena-based syntax tree.
//!
//! Nodes live in a flat `Vec` and reference each other by [`NodeId`].
//! Parent links are plain indices, weak by construction: the arena is the
//! sole owner, and replacing a node leaves its old subtree unreferenced in
//! the arena rather than deallocating mid-walk.
//!
//! Optimization passes mutate nodes in place or replace them wholesale via
//! [`SyntaxTree::replace`]; the pass driver re-queues parents through an
//! explicit worklist instead of unwinding the traversal.

use crate::interner::{Name, StringInterner};
use crate::span::Span;
use crate::symbol::{NamespacedIdentifier, Symbol};
use crate::types::{ComplexTypeId, TypeInfo, Types};
use crate::value::VariableStorage;
use smallvec::SmallVec;
use std::fmt;

/// Index of a node in the tree arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn from_index(idx: usize) -> Self {
        NodeId(idx as u32)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Index of a scope in the compiler's scope arena.
///
/// Defined here so block nodes can record their owning scope; the arena
/// itself lives in `snex_compiler`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub const GLOBAL: ScopeId = ScopeId(0);
}

/// Arithmetic binary operators.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    pub const fn is_commutative(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Mul)
    }
}

/// Comparison operators. Result type is always `int` (0 or 1).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Short-circuiting logical operators.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum LogicalOp {
    And,
    Or,
}

/// Assignment operators; the compound forms fold `x = x OP y`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum AssignOp {
    Plain,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    /// The arithmetic op a compound assignment applies, if any.
    pub const fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Plain => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
        }
    }
}

/// Loop flavor: fixed-length span iteration or runtime-length block/dyn
/// iteration (length read from the buffer header at loop entry).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum LoopKind {
    Block,
    Span,
}

/// Range of token indices holding a lazily-parsed function body.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct TokenRange {
    pub start: u32,
    pub end: u32,
}

/// Declaration info for a parsed function, boxed to keep nodes small.
///
/// The body is captured as a token range at class-parse time and only
/// turned into a subtree when the `FunctionParsing` pass runs, so that all
/// class-level symbols are known before bodies are type-checked.
#[derive(Clone, PartialEq, Debug)]
pub struct FunctionInfo {
    /// Function symbol; its `type_info` is the return type.
    pub name: Symbol,
    pub parameters: Vec<Symbol>,
    pub body_tokens: TokenRange,
    /// Parsed body, present after the `FunctionParsing` pass.
    pub body: Option<NodeId>,
    pub is_inlinable: bool,
}

/// The closed node family of the syntax tree.
#[derive(Clone, PartialEq, Debug)]
pub enum NodeKind {
    /// Compile-time immediate value.
    Immediate(VariableStorage),
    /// Reference to a declared symbol; the symbol is rewritten in place as
    /// resolution progresses.
    VariableReference { symbol: Symbol },
    BinaryOp {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Compare {
        op: CompareOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Logical {
        op: LogicalOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Negation { expr: NodeId },
    LogicalNot { expr: NodeId },
    Cast {
        target: Types,
        expr: NodeId,
    },
    Assignment {
        op: AssignOp,
        target: NodeId,
        value: NodeId,
        /// True when this assignment is the initializer of a definition.
        is_first: bool,
    },
    Increment {
        target: NodeId,
        pre: bool,
        decrement: bool,
    },
    FunctionCall {
        name: NamespacedIdentifier,
        /// Receiver expression for method-style calls (`in.size()`).
        object: Option<NodeId>,
        args: SmallVec<[NodeId; 4]>,
    },
    Subscript {
        parent: NodeId,
        index: NodeId,
    },
    DotOperator {
        parent: NodeId,
        member: Name,
        /// Byte offset into the parent's data layout, set by type checking.
        resolved_offset: Option<u32>,
    },
    TernaryOp {
        cond: NodeId,
        if_true: NodeId,
        if_false: NodeId,
    },
    IfStatement {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    Loop {
        kind: LoopKind,
        iterator: Symbol,
        target: NodeId,
        body: NodeId,
    },
    ReturnStatement { expr: Option<NodeId> },
    StatementBlock {
        statements: SmallVec<[NodeId; 8]>,
        scope: Option<ScopeId>,
    },
    VariableDefinition {
        symbol: Symbol,
        init: Option<NodeId>,
    },
    ComplexTypeDefinition {
        symbol: Symbol,
        type_id: ComplexTypeId,
        init: SmallVec<[NodeId; 4]>,
    },
    Function(Box<FunctionInfo>),
    ClassStatement {
        name: NamespacedIdentifier,
        type_id: ComplexTypeId,
        body: SmallVec<[NodeId; 8]>,
    },
    /// Placeholder left behind by dead-code elimination; skipped everywhere.
    Noop,
}

/// One syntax-tree node: kind, source span, resolved type.
#[derive(Clone, PartialEq, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Resolved type, `Dynamic` until the type-check pass runs.
    pub ty: TypeInfo,
}

/// The tree arena. `root` is always a `StatementBlock`.
#[derive(Debug, Default)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        SyntaxTree { nodes: Vec::new() }
    }

    pub fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node {
            kind,
            span,
            ty: TypeInfo::DYNAMIC,
        });
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    #[inline]
    pub fn ty(&self, id: NodeId) -> TypeInfo {
        self.nodes[id.index()].ty
    }

    pub fn set_ty(&mut self, id: NodeId, ty: TypeInfo) {
        self.nodes[id.index()].ty = ty;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Replace a node wholesale, keeping its span. The old subtree stays in
    /// the arena, unreferenced.
    pub fn replace(&mut self, id: NodeId, kind: NodeKind, ty: TypeInfo) {
        let node = &mut self.nodes[id.index()];
        node.kind = kind;
        node.ty = ty;
    }

    /// Child node ids of `id`, in evaluation order.
    pub fn children(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match &self.nodes[id.index()].kind {
            NodeKind::Immediate(_)
            | NodeKind::VariableReference { .. }
            | NodeKind::Noop => {}
            NodeKind::BinaryOp { lhs, rhs, .. }
            | NodeKind::Compare { lhs, rhs, .. }
            | NodeKind::Logical { lhs, rhs, .. } => {
                out.push(*lhs);
                out.push(*rhs);
            }
            NodeKind::Negation { expr }
            | NodeKind::LogicalNot { expr }
            | NodeKind::Cast { expr, .. } => out.push(*expr),
            NodeKind::Assignment { target, value, .. } => {
                out.push(*value);
                out.push(*target);
            }
            NodeKind::Increment { target, .. } => out.push(*target),
            NodeKind::FunctionCall { object, args, .. } => {
                if let Some(obj) = object {
                    out.push(*obj);
                }
                out.extend(args.iter().copied());
            }
            NodeKind::Subscript { parent, index } => {
                out.push(*parent);
                out.push(*index);
            }
            NodeKind::DotOperator { parent, .. } => out.push(*parent),
            NodeKind::TernaryOp {
                cond,
                if_true,
                if_false,
            } => {
                out.push(*cond);
                out.push(*if_true);
                out.push(*if_false);
            }
            NodeKind::IfStatement {
                cond,
                then_branch,
                else_branch,
            } => {
                out.push(*cond);
                out.push(*then_branch);
                if let Some(e) = else_branch {
                    out.push(*e);
                }
            }
            NodeKind::Loop { target, body, .. } => {
                out.push(*target);
                out.push(*body);
            }
            NodeKind::ReturnStatement { expr } => {
                if let Some(e) = expr {
                    out.push(*e);
                }
            }
            NodeKind::StatementBlock { statements, .. } => {
                out.extend(statements.iter().copied());
            }
            NodeKind::VariableDefinition { init, .. } => {
                if let Some(i) = init {
                    out.push(*i);
                }
            }
            NodeKind::ComplexTypeDefinition { init, .. } => {
                out.extend(init.iter().copied());
            }
            NodeKind::Function(info) => {
                if let Some(body) = info.body {
                    out.push(body);
                }
            }
            NodeKind::ClassStatement { body, .. } => {
                out.extend(body.iter().copied());
            }
        }
        out
    }

    /// Preorder walk of the subtree rooted at `root`.
    pub fn walk(&self, root: NodeId) -> TreeWalk<'_> {
        TreeWalk {
            tree: self,
            stack: vec![root],
        }
    }

    /// Find the parent of `child` within the subtree rooted at `root`.
    ///
    /// Linear scan; the tree is small and this only runs when a pass needs
    /// to re-queue a replaced node's parent.
    pub fn parent_of(&self, root: NodeId, child: NodeId) -> Option<NodeId> {
        for id in self.walk(root) {
            if self.children(id).contains(&child) {
                return Some(id);
            }
        }
        None
    }

    /// Human-readable indented listing of the subtree rooted at `root`;
    /// one node per line with its resolved type.
    pub fn dump(&self, root: NodeId, interner: &StringInterner) -> String {
        let mut out = String::new();
        self.dump_node(root, interner, 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, interner: &StringInterner, depth: usize, out: &mut String) {
        use std::fmt::Write as _;
        for _ in 0..depth {
            out.push_str("  ");
        }
        let node = &self.nodes[id.index()];
        match &node.kind {
            NodeKind::Immediate(v) => {
                let _ = write!(out, "Immediate {v}");
            }
            NodeKind::VariableReference { symbol } => {
                let _ = write!(out, "VariableReference {}", symbol.id.display(interner));
            }
            NodeKind::BinaryOp { op, .. } => {
                let _ = write!(out, "BinaryOp {}", op.symbol());
            }
            NodeKind::Compare { op, .. } => {
                let _ = write!(out, "Compare {}", op.symbol());
            }
            NodeKind::Logical { op, .. } => {
                let _ = write!(
                    out,
                    "Logical {}",
                    match op {
                        LogicalOp::And => "&&",
                        LogicalOp::Or => "||",
                    }
                );
            }
            NodeKind::Negation { .. } => {
                let _ = write!(out, "Negation");
            }
            NodeKind::LogicalNot { .. } => {
                let _ = write!(out, "LogicalNot");
            }
            NodeKind::Cast { target, .. } => {
                let _ = write!(out, "Cast -> {target}");
            }
            NodeKind::Assignment { op, .. } => {
                let _ = write!(out, "Assignment {op:?}");
            }
            NodeKind::Increment { pre, decrement, .. } => {
                let _ = write!(
                    out,
                    "Increment {} {}",
                    if *pre { "pre" } else { "post" },
                    if *decrement { "--" } else { "++" }
                );
            }
            NodeKind::FunctionCall { name, .. } => {
                let _ = write!(out, "FunctionCall {}", name.display(interner));
            }
            NodeKind::Subscript { .. } => {
                let _ = write!(out, "Subscript");
            }
            NodeKind::DotOperator { member, .. } => {
                let _ = write!(out, "DotOperator .{}", interner.resolve(*member));
            }
            NodeKind::TernaryOp { .. } => {
                let _ = write!(out, "TernaryOp");
            }
            NodeKind::IfStatement { .. } => {
                let _ = write!(out, "IfStatement");
            }
            NodeKind::Loop { kind, iterator, .. } => {
                let _ = write!(out, "Loop {kind:?} {}", iterator.id.display(interner));
            }
            NodeKind::ReturnStatement { .. } => {
                let _ = write!(out, "Return");
            }
            NodeKind::StatementBlock { .. } => {
                let _ = write!(out, "Block");
            }
            NodeKind::VariableDefinition { symbol, .. } => {
                let _ = write!(out, "VariableDefinition {}", symbol.id.display(interner));
            }
            NodeKind::ComplexTypeDefinition { symbol, .. } => {
                let _ = write!(out, "ComplexTypeDefinition {}", symbol.id.display(interner));
            }
            NodeKind::Function(info) => {
                let _ = write!(out, "Function {}", info.name.id.display(interner));
            }
            NodeKind::ClassStatement { name, .. } => {
                let _ = write!(out, "Class {}", name.display(interner));
            }
            NodeKind::Noop => {
                let _ = write!(out, "Noop");
            }
        }
        match node.ty {
            TypeInfo::Primitive(Types::Dynamic) => out.push('\n'),
            TypeInfo::Primitive(t) => {
                let _ = writeln!(out, " : {t}");
            }
            TypeInfo::Complex(id) => {
                let _ = writeln!(out, " : {id:?}");
            }
        }
        for child in self.children(id) {
            self.dump_node(child, interner, depth + 1, out);
        }
    }

    /// Count references to `symbol` within the subtree rooted at `root`.
    pub fn count_references(&self, root: NodeId, symbol: &NamespacedIdentifier) -> usize {
        self.walk(root)
            .filter(|&id| match self.kind(id) {
                NodeKind::VariableReference { symbol: s } => &s.id == symbol,
                _ => false,
            })
            .count()
    }
}

/// Explicit-stack preorder iterator.
pub struct TreeWalk<'a> {
    tree: &'a SyntaxTree,
    stack: Vec<NodeId>,
}

impl Iterator for TreeWalk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let children = self.tree.children(id);
        // Push in reverse so the leftmost child pops first.
        self.stack.extend(children.into_iter().rev());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imm(tree: &mut SyntaxTree, v: i64) -> NodeId {
        tree.add(NodeKind::Immediate(VariableStorage::Int(v)), Span::DUMMY)
    }

    #[test]
    fn walk_is_preorder() {
        let mut tree = SyntaxTree::new();
        let a = imm(&mut tree, 1);
        let b = imm(&mut tree, 2);
        let sum = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
            Span::DUMMY,
        );
        let order: Vec<NodeId> = tree.walk(sum).collect();
        assert_eq!(order, vec![sum, a, b]);
    }

    #[test]
    fn replace_keeps_span() {
        let mut tree = SyntaxTree::new();
        let a = imm(&mut tree, 1);
        let b = imm(&mut tree, 2);
        let sum = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
            Span::new(3, 8),
        );
        tree.replace(
            sum,
            NodeKind::Immediate(VariableStorage::Int(3)),
            TypeInfo::Primitive(Types::Integer),
        );
        assert_eq!(tree.node(sum).span, Span::new(3, 8));
        assert!(matches!(tree.kind(sum), NodeKind::Immediate(_)));
    }

    #[test]
    fn dump_indents_children_and_shows_types() {
        let mut tree = SyntaxTree::new();
        let interner = StringInterner::new();
        let a = imm(&mut tree, 1);
        tree.set_ty(a, TypeInfo::Primitive(Types::Integer));
        let neg = tree.add(NodeKind::Negation { expr: a }, Span::DUMMY);
        tree.set_ty(neg, TypeInfo::Primitive(Types::Integer));
        assert_eq!(
            tree.dump(neg, &interner),
            "Negation : int\n  Immediate 1 : int\n"
        );
    }

    #[test]
    fn parent_lookup() {
        let mut tree = SyntaxTree::new();
        let a = imm(&mut tree, 1);
        let neg = tree.add(NodeKind::Negation { expr: a }, Span::DUMMY);
        let root = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec::smallvec![neg],
                scope: None,
            },
            Span::DUMMY,
        );
        assert_eq!(tree.parent_of(root, a), Some(neg));
        assert_eq!(tree.parent_of(root, neg), Some(root));
        assert_eq!(tree.parent_of(root, root), None);
    }
}
