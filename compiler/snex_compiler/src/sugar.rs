//! Syntax sugar replacement.
//!
//! Compound assignments like `a += b` exist only in the surface syntax;
//! lowering works on plain stores. After type checking (so both sides
//! already carry their final types) every compound assignment is
//! rewritten into `a = a <op> b`, duplicating the target subtree on the
//! read side.

use crate::optimize::clone_subtree;
use snex_ir::{AssignOp, NodeId, NodeKind, SyntaxTree};

/// Rewrite all compound assignments under `root` in place. Returns the
/// number of rewrites.
pub fn desugar(tree: &mut SyntaxTree, root: NodeId) -> usize {
    let compound: Vec<NodeId> = tree
        .walk(root)
        .filter(|id| {
            matches!(
                tree.kind(*id),
                NodeKind::Assignment { op, .. } if op.binary_op().is_some()
            )
        })
        .collect();

    for &node in &compound {
        let NodeKind::Assignment {
            op,
            target,
            value,
            is_first,
        } = tree.kind(node)
        else {
            continue;
        };
        let (op, target, value, is_first) = (*op, *target, *value, *is_first);
        let Some(bin) = op.binary_op() else { continue };

        let span = tree.node(node).span;
        let read = clone_subtree(tree, target);
        let combined = tree.add(
            NodeKind::BinaryOp {
                op: bin,
                lhs: read,
                rhs: value,
            },
            span,
        );
        tree.set_ty(combined, tree.ty(target));
        let ty = tree.ty(node);
        tree.replace(
            node,
            NodeKind::Assignment {
                op: AssignOp::Plain,
                target,
                value: combined,
                is_first,
            },
            ty,
        );
    }
    compound.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use snex_ir::{
        BinaryOp, NamespacedIdentifier, Span, StringInterner, Symbol, TypeInfo, Types,
        VariableStorage,
    };

    #[test]
    fn compound_assignment_becomes_plain_store() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let int = TypeInfo::Primitive(Types::Integer);
        let sym = Symbol::new(NamespacedIdentifier::new(interner.intern("x")), int);
        let target = tree.add(
            NodeKind::VariableReference {
                symbol: sym.clone(),
            },
            Span::DUMMY,
        );
        tree.set_ty(target, int);
        let value = tree.add(NodeKind::Immediate(VariableStorage::Int(2)), Span::DUMMY);
        let assign = tree.add(
            NodeKind::Assignment {
                op: AssignOp::Add,
                target,
                value,
                is_first: false,
            },
            Span::DUMMY,
        );

        assert_eq!(desugar(&mut tree, assign), 1);

        let NodeKind::Assignment {
            op, value, ..
        } = tree.kind(assign)
        else {
            panic!("not an assignment");
        };
        assert_eq!(*op, AssignOp::Plain);
        let NodeKind::BinaryOp { op, lhs, rhs } = tree.kind(*value) else {
            panic!("store value is not a binary op");
        };
        assert_eq!(*op, BinaryOp::Add);
        let NodeKind::VariableReference { symbol } = tree.kind(*lhs) else {
            panic!("read side is not the target variable");
        };
        assert_eq!(symbol.id, sym.id);
        assert_eq!(
            tree.kind(*rhs),
            &NodeKind::Immediate(VariableStorage::Int(2))
        );
    }

    #[test]
    fn plain_assignments_are_untouched() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let sym = Symbol::new(
            NamespacedIdentifier::new(interner.intern("x")),
            TypeInfo::Primitive(Types::Integer),
        );
        let target = tree.add(NodeKind::VariableReference { symbol: sym }, Span::DUMMY);
        let value = tree.add(NodeKind::Immediate(VariableStorage::Int(2)), Span::DUMMY);
        let assign = tree.add(
            NodeKind::Assignment {
                op: AssignOp::Plain,
                target,
                value,
                is_first: true,
            },
            Span::DUMMY,
        );
        assert_eq!(desugar(&mut tree, assign), 0);
    }
}
