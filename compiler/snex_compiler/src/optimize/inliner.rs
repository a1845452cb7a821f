//! Call-site inlining for trivial functions.
//!
//! A function whose body is a single `return expr;` with a side-effect
//! free expression gets its calls replaced by a copy of that expression,
//! with parameter references substituted by the (already coerced)
//! argument subtrees. Constant folding then gets a chance to collapse
//! the result.

use super::clone_subtree_map;
use crate::functions::{CallMap, Callee};
use rustc_hash::FxHashMap;
use snex_ir::{NamespacedIdentifier, NodeId, NodeKind, SyntaxTree};

/// An inlinable function: the index the call map refers to, its
/// parameter identifiers in declaration order, and the returned
/// expression inside that function's body.
pub struct InlineCandidate {
    pub index: u32,
    pub params: Vec<NamespacedIdentifier>,
    pub expr: NodeId,
}

/// Inline every call under `root` that targets one of `candidates`.
/// Returns the number of call sites replaced.
pub fn inline_calls(
    tree: &mut SyntaxTree,
    calls: &CallMap,
    candidates: &[InlineCandidate],
    root: NodeId,
) -> usize {
    let sites: Vec<NodeId> = tree
        .walk(root)
        .filter(|id| matches!(tree.kind(*id), NodeKind::FunctionCall { object: None, .. }))
        .collect();

    let mut inlined = 0;
    for site in sites {
        let Some(Callee::Compiled { index, .. }) = calls.get(&site) else {
            continue;
        };
        let Some(candidate) = candidates.iter().find(|c| c.index == *index) else {
            continue;
        };
        let NodeKind::FunctionCall { args, .. } = tree.kind(site) else {
            continue;
        };
        if args.len() != candidate.params.len() {
            continue;
        }

        let mut subst: FxHashMap<NamespacedIdentifier, NodeId> = FxHashMap::default();
        for (param, arg) in candidate.params.iter().zip(args.iter()) {
            subst.insert(param.clone(), *arg);
        }
        let copy = clone_subtree_map(tree, candidate.expr, &subst);
        let kind = tree.kind(copy).clone();
        let ty = tree.ty(copy);
        tree.replace(site, kind, ty);
        tracing::trace!(node = ?site, index, "inlined call");
        inlined += 1;
    }
    inlined
}

/// Extract an [`InlineCandidate`] from a compiled function body, if its
/// shape allows inlining.
pub fn candidate_from_body(
    tree: &SyntaxTree,
    index: u32,
    params: &[NamespacedIdentifier],
    body: NodeId,
) -> Option<InlineCandidate> {
    let NodeKind::StatementBlock { statements, .. } = tree.kind(body) else {
        return None;
    };
    let [only] = statements.as_slice() else {
        return None;
    };
    let NodeKind::ReturnStatement { expr: Some(expr) } = tree.kind(*only) else {
        return None;
    };
    let expr = *expr;
    if super::has_side_effects(tree, expr) {
        return None;
    }
    // Everything the expression reads must come in through a parameter,
    // otherwise the copy would capture state from the wrong frame.
    let closed = tree.walk(expr).all(|id| match tree.kind(id) {
        NodeKind::VariableReference { symbol } => params.contains(&symbol.id),
        NodeKind::Immediate(_)
        | NodeKind::BinaryOp { .. }
        | NodeKind::Compare { .. }
        | NodeKind::Logical { .. }
        | NodeKind::Negation { .. }
        | NodeKind::LogicalNot { .. }
        | NodeKind::Cast { .. }
        | NodeKind::TernaryOp { .. } => true,
        _ => false,
    });
    if !closed {
        return None;
    }
    Some(InlineCandidate {
        index,
        params: params.to_vec(),
        expr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;
    use snex_ir::{
        BinaryOp, Span, StringInterner, Symbol, SyntaxTree, TypeInfo, Types, VariableStorage,
    };

    #[test]
    fn single_return_body_inlines_at_the_call_site() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let param = NamespacedIdentifier::new(interner.intern("square"))
            .child(interner.intern("x"));
        let int = TypeInfo::Primitive(Types::Integer);

        // square(x) { return x * x; }
        let lhs = tree.add(
            NodeKind::VariableReference {
                symbol: Symbol::new(param.clone(), int),
            },
            Span::DUMMY,
        );
        let rhs = tree.add(
            NodeKind::VariableReference {
                symbol: Symbol::new(param.clone(), int),
            },
            Span::DUMMY,
        );
        let product = tree.add(
            NodeKind::BinaryOp {
                op: BinaryOp::Mul,
                lhs,
                rhs,
            },
            Span::DUMMY,
        );
        let ret = tree.add(
            NodeKind::ReturnStatement {
                expr: Some(product),
            },
            Span::DUMMY,
        );
        let body = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![ret],
                scope: None,
            },
            Span::DUMMY,
        );

        let params = vec![param];
        let candidate =
            candidate_from_body(&tree, 0, &params, body).expect("inlinable");

        // square(7)
        let arg = tree.add(NodeKind::Immediate(VariableStorage::Int(7)), Span::DUMMY);
        let call = tree.add(
            NodeKind::FunctionCall {
                name: NamespacedIdentifier::new(interner.intern("square")),
                object: None,
                args: smallvec![arg],
            },
            Span::DUMMY,
        );
        let mut calls = CallMap::default();
        calls.insert(
            call,
            Callee::Compiled {
                index: 0,
                return_type: TypeInfo::Primitive(Types::Integer),
                method_of: None,
            },
        );

        assert_eq!(inline_calls(&mut tree, &calls, &[candidate], call), 1);
        let NodeKind::BinaryOp { op, lhs, rhs } = tree.kind(call) else {
            panic!("call not inlined");
        };
        assert_eq!(*op, BinaryOp::Mul);
        assert_eq!(
            tree.kind(*lhs),
            &NodeKind::Immediate(VariableStorage::Int(7))
        );
        assert_eq!(
            tree.kind(*rhs),
            &NodeKind::Immediate(VariableStorage::Int(7))
        );
    }

    #[test]
    fn body_reading_non_parameter_state_is_rejected() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let global = NamespacedIdentifier::new(interner.intern("gain"));
        let read = tree.add(
            NodeKind::VariableReference {
                symbol: Symbol::new(global, TypeInfo::Primitive(Types::Float)),
            },
            Span::DUMMY,
        );
        let ret = tree.add(NodeKind::ReturnStatement { expr: Some(read) }, Span::DUMMY);
        let body = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![ret],
                scope: None,
            },
            Span::DUMMY,
        );
        assert!(candidate_from_body(&tree, 0, &[], body).is_none());
    }

    #[test]
    fn multi_statement_body_is_rejected() {
        let mut tree = SyntaxTree::new();
        let noop = tree.add(NodeKind::Noop, Span::DUMMY);
        let imm = tree.add(NodeKind::Immediate(VariableStorage::Int(1)), Span::DUMMY);
        let ret = tree.add(NodeKind::ReturnStatement { expr: Some(imm) }, Span::DUMMY);
        let body = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![noop, ret],
                scope: None,
            },
            Span::DUMMY,
        );
        assert!(candidate_from_body(&tree, 0, &[], body).is_none());
    }
}
