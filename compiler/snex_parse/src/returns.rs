//! Return-path verification for parsed function bodies.

use snex_ir::{NodeId, NodeKind, SyntaxTree};

/// Whether every control path through `node` executes a return statement.
///
/// Conservative in the usual way: loops never count as returning, a
/// conditional counts only when both branches return. A non-void function
/// whose body fails this check is missing a return; a void function gets
/// an implicit return appended instead.
pub fn all_paths_return(tree: &SyntaxTree, node: NodeId) -> bool {
    match tree.kind(node) {
        NodeKind::ReturnStatement { .. } => true,
        NodeKind::StatementBlock { statements, .. } => statements
            .iter()
            .any(|&stmt| all_paths_return(tree, stmt)),
        NodeKind::IfStatement {
            then_branch,
            else_branch,
            ..
        } => match else_branch {
            Some(else_branch) => {
                all_paths_return(tree, *then_branch) && all_paths_return(tree, *else_branch)
            }
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snex_ir::{Span, VariableStorage};

    fn ret(tree: &mut SyntaxTree) -> NodeId {
        let v = tree.add(
            NodeKind::Immediate(VariableStorage::Int(1)),
            Span::DUMMY,
        );
        tree.add(NodeKind::ReturnStatement { expr: Some(v) }, Span::DUMMY)
    }

    fn block(tree: &mut SyntaxTree, statements: &[NodeId]) -> NodeId {
        tree.add(
            NodeKind::StatementBlock {
                statements: statements.iter().copied().collect(),
                scope: None,
            },
            Span::DUMMY,
        )
    }

    #[test]
    fn plain_return_counts() {
        let mut tree = SyntaxTree::new();
        let r = ret(&mut tree);
        let b = block(&mut tree, &[r]);
        assert!(all_paths_return(&tree, b));
    }

    #[test]
    fn if_without_else_does_not_count() {
        let mut tree = SyntaxTree::new();
        let cond = tree.add(
            NodeKind::Immediate(VariableStorage::Int(1)),
            Span::DUMMY,
        );
        let then_r = ret(&mut tree);
        let only_if = tree.add(
            NodeKind::IfStatement {
                cond,
                then_branch: then_r,
                else_branch: None,
            },
            Span::DUMMY,
        );
        let b = block(&mut tree, &[only_if]);
        assert!(!all_paths_return(&tree, b));

        let else_r = ret(&mut tree);
        let both = tree.add(
            NodeKind::IfStatement {
                cond,
                then_branch: then_r,
                else_branch: Some(else_r),
            },
            Span::DUMMY,
        );
        let b2 = block(&mut tree, &[both]);
        assert!(all_paths_return(&tree, b2));
    }

    #[test]
    fn empty_block_fails() {
        let mut tree = SyntaxTree::new();
        let b = block(&mut tree, &[]);
        assert!(!all_paths_return(&tree, b));
    }
}
