//! Tree-rewriting optimization passes.
//!
//! Passes implement [`OptimizationPass`] and rewrite single nodes in
//! place. [`run_to_fixpoint`] drives them with an explicit worklist: a
//! successful rewrite re-queues the node, its parent and its (possibly
//! new) children, so cascades like `2 * 3 + x * 0` settle without any
//! recursive restart.

mod binary_op;
mod constant_fold;
mod dead_code;
mod inliner;

pub use binary_op::BinaryOpOptimization;
pub use constant_fold::ConstantFolding;
pub use dead_code::DeadCodeElimination;
pub use inliner::{candidate_from_body, inline_calls, InlineCandidate};

use crate::functions::CallMap;
use rustc_hash::FxHashMap;
use snex_diagnostic::CompileResult;
use snex_ir::{NamespacedIdentifier, NodeId, NodeKind, SyntaxTree};
use std::collections::VecDeque;

pub struct OptimizeCtx<'a> {
    pub tree: &'a mut SyntaxTree,
    pub calls: &'a CallMap,
    /// Root of the subtree being optimized; reference counting and parent
    /// lookups stay within it.
    pub root: NodeId,
}

pub trait OptimizationPass {
    fn name(&self) -> &'static str;

    /// Try to rewrite `node`; `Ok(true)` when the tree changed.
    fn attempt(&self, cx: &mut OptimizeCtx<'_>, node: NodeId) -> CompileResult<bool>;
}

/// Run `passes` over the subtree until no pass changes anything. Returns
/// the number of rewrites applied.
pub fn run_to_fixpoint(
    cx: &mut OptimizeCtx<'_>,
    passes: &[&dyn OptimizationPass],
) -> CompileResult<usize> {
    let mut worklist: VecDeque<NodeId> = cx.tree.walk(cx.root).collect();
    let mut changes = 0usize;
    while let Some(node) = worklist.pop_front() {
        for pass in passes {
            if pass.attempt(cx, node)? {
                changes += 1;
                tracing::trace!(pass = pass.name(), node = ?node, "rewrite");
                worklist.push_back(node);
                worklist.extend(cx.tree.children(node));
                if let Some(parent) = cx.tree.parent_of(cx.root, node) {
                    worklist.push_back(parent);
                }
                break;
            }
        }
    }
    Ok(changes)
}

/// Deep-copy a subtree into fresh arena nodes, preserving spans and types.
pub fn clone_subtree(tree: &mut SyntaxTree, node: NodeId) -> NodeId {
    clone_subtree_map(tree, node, &FxHashMap::default())
}

/// Deep-copy a subtree, replacing references to substituted symbols with
/// copies of their replacement subtrees. Each use site gets its own copy
/// so the result stays a tree, never a DAG.
pub fn clone_subtree_map(
    tree: &mut SyntaxTree,
    node: NodeId,
    subst: &FxHashMap<NamespacedIdentifier, NodeId>,
) -> NodeId {
    if let NodeKind::VariableReference { symbol } = tree.kind(node) {
        if let Some(&replacement) = subst.get(&symbol.id) {
            return clone_subtree(tree, replacement);
        }
    }

    let span = tree.node(node).span;
    let ty = tree.ty(node);
    let kind = match tree.kind(node).clone() {
        k @ (NodeKind::Immediate(_) | NodeKind::VariableReference { .. } | NodeKind::Noop) => k,
        NodeKind::BinaryOp { op, lhs, rhs } => NodeKind::BinaryOp {
            op,
            lhs: clone_subtree_map(tree, lhs, subst),
            rhs: clone_subtree_map(tree, rhs, subst),
        },
        NodeKind::Compare { op, lhs, rhs } => NodeKind::Compare {
            op,
            lhs: clone_subtree_map(tree, lhs, subst),
            rhs: clone_subtree_map(tree, rhs, subst),
        },
        NodeKind::Logical { op, lhs, rhs } => NodeKind::Logical {
            op,
            lhs: clone_subtree_map(tree, lhs, subst),
            rhs: clone_subtree_map(tree, rhs, subst),
        },
        NodeKind::Negation { expr } => NodeKind::Negation {
            expr: clone_subtree_map(tree, expr, subst),
        },
        NodeKind::LogicalNot { expr } => NodeKind::LogicalNot {
            expr: clone_subtree_map(tree, expr, subst),
        },
        NodeKind::Cast { target, expr } => NodeKind::Cast {
            target,
            expr: clone_subtree_map(tree, expr, subst),
        },
        NodeKind::Assignment {
            op,
            target,
            value,
            is_first,
        } => NodeKind::Assignment {
            op,
            target: clone_subtree_map(tree, target, subst),
            value: clone_subtree_map(tree, value, subst),
            is_first,
        },
        NodeKind::Increment {
            target,
            pre,
            decrement,
        } => NodeKind::Increment {
            target: clone_subtree_map(tree, target, subst),
            pre,
            decrement,
        },
        NodeKind::FunctionCall { name, object, args } => NodeKind::FunctionCall {
            name,
            object: object.map(|o| clone_subtree_map(tree, o, subst)),
            args: args
                .into_iter()
                .map(|a| clone_subtree_map(tree, a, subst))
                .collect(),
        },
        NodeKind::Subscript { parent, index } => NodeKind::Subscript {
            parent: clone_subtree_map(tree, parent, subst),
            index: clone_subtree_map(tree, index, subst),
        },
        NodeKind::DotOperator {
            parent,
            member,
            resolved_offset,
        } => NodeKind::DotOperator {
            parent: clone_subtree_map(tree, parent, subst),
            member,
            resolved_offset,
        },
        NodeKind::TernaryOp {
            cond,
            if_true,
            if_false,
        } => NodeKind::TernaryOp {
            cond: clone_subtree_map(tree, cond, subst),
            if_true: clone_subtree_map(tree, if_true, subst),
            if_false: clone_subtree_map(tree, if_false, subst),
        },
        NodeKind::IfStatement {
            cond,
            then_branch,
            else_branch,
        } => NodeKind::IfStatement {
            cond: clone_subtree_map(tree, cond, subst),
            then_branch: clone_subtree_map(tree, then_branch, subst),
            else_branch: else_branch.map(|e| clone_subtree_map(tree, e, subst)),
        },
        NodeKind::Loop {
            kind,
            iterator,
            target,
            body,
        } => NodeKind::Loop {
            kind,
            iterator,
            target: clone_subtree_map(tree, target, subst),
            body: clone_subtree_map(tree, body, subst),
        },
        NodeKind::ReturnStatement { expr } => NodeKind::ReturnStatement {
            expr: expr.map(|e| clone_subtree_map(tree, e, subst)),
        },
        NodeKind::StatementBlock { statements, scope } => NodeKind::StatementBlock {
            statements: statements
                .into_iter()
                .map(|s| clone_subtree_map(tree, s, subst))
                .collect(),
            scope,
        },
        NodeKind::VariableDefinition { symbol, init } => NodeKind::VariableDefinition {
            symbol,
            init: init.map(|i| clone_subtree_map(tree, i, subst)),
        },
        NodeKind::ComplexTypeDefinition {
            symbol,
            type_id,
            init,
        } => NodeKind::ComplexTypeDefinition {
            symbol,
            type_id,
            init: init
                .into_iter()
                .map(|i| clone_subtree_map(tree, i, subst))
                .collect(),
        },
        k @ (NodeKind::Function(_) | NodeKind::ClassStatement { .. }) => k,
    };
    let new = tree.add(kind, span);
    tree.set_ty(new, ty);
    new
}

/// Whether evaluating the subtree can observe or change program state.
pub fn has_side_effects(tree: &SyntaxTree, node: NodeId) -> bool {
    tree.walk(node).any(|id| {
        matches!(
            tree.kind(id),
            NodeKind::FunctionCall { .. }
                | NodeKind::Assignment { .. }
                | NodeKind::Increment { .. }
        )
    })
}
