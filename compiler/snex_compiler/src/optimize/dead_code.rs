//! Unused local elimination.

use super::{has_side_effects, OptimizationPass, OptimizeCtx};
use snex_diagnostic::CompileResult;
use snex_ir::{NodeId, NodeKind, SymbolFlags, TypeInfo};

/// Removes local definitions that are never read. Only run over function
/// bodies; globals stay visible to the embedding host even when the
/// compiled code never touches them.
pub struct DeadCodeElimination;

impl OptimizationPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "DeadCodeElimination"
    }

    fn attempt(&self, cx: &mut OptimizeCtx<'_>, node: NodeId) -> CompileResult<bool> {
        let NodeKind::VariableDefinition { symbol, init } = cx.tree.kind(node) else {
            return Ok(false);
        };
        if symbol.flags.contains(SymbolFlags::PARAMETER) {
            return Ok(false);
        }
        let id = symbol.id.clone();
        let init = *init;
        if cx.tree.count_references(cx.root, &id) > 0 {
            return Ok(false);
        }
        if init.is_some_and(|i| has_side_effects(cx.tree, i)) {
            return Ok(false);
        }
        cx.tree.replace(node, NodeKind::Noop, TypeInfo::VOID);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::CallMap;
    use crate::optimize::run_to_fixpoint;
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;
    use snex_ir::{
        NamespacedIdentifier, Span, StringInterner, Symbol, SyntaxTree, Types, VariableStorage,
    };

    fn symbol(interner: &mut StringInterner, name: &str) -> Symbol {
        Symbol::new(
            NamespacedIdentifier::new(interner.intern(name)),
            TypeInfo::Primitive(Types::Integer),
        )
    }

    fn run(tree: &mut SyntaxTree, root: NodeId) -> usize {
        let calls = CallMap::default();
        let mut cx = OptimizeCtx {
            tree,
            calls: &calls,
            root,
        };
        run_to_fixpoint(&mut cx, &[&DeadCodeElimination]).expect("optimize")
    }

    #[test]
    fn unreferenced_local_is_removed() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let init = tree.add(NodeKind::Immediate(VariableStorage::Int(3)), Span::DUMMY);
        let def = tree.add(
            NodeKind::VariableDefinition {
                symbol: symbol(&mut interner, "unused"),
                init: Some(init),
            },
            Span::DUMMY,
        );
        let block = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![def],
                scope: None,
            },
            Span::DUMMY,
        );
        run(&mut tree, block);
        assert_eq!(tree.kind(def), &NodeKind::Noop);
    }

    #[test]
    fn referenced_local_survives() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let sym = symbol(&mut interner, "x");
        let init = tree.add(NodeKind::Immediate(VariableStorage::Int(3)), Span::DUMMY);
        let def = tree.add(
            NodeKind::VariableDefinition {
                symbol: sym.clone(),
                init: Some(init),
            },
            Span::DUMMY,
        );
        let read = tree.add(NodeKind::VariableReference { symbol: sym }, Span::DUMMY);
        let ret = tree.add(NodeKind::ReturnStatement { expr: Some(read) }, Span::DUMMY);
        let block = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![def, ret],
                scope: None,
            },
            Span::DUMMY,
        );
        assert_eq!(run(&mut tree, block), 0);
        assert!(matches!(
            tree.kind(def),
            NodeKind::VariableDefinition { .. }
        ));
    }

    #[test]
    fn initializer_with_side_effects_is_kept() {
        let mut tree = SyntaxTree::new();
        let mut interner = StringInterner::new();
        let name = NamespacedIdentifier::new(interner.intern("advance"));
        let call = tree.add(
            NodeKind::FunctionCall {
                name,
                object: None,
                args: smallvec![],
            },
            Span::DUMMY,
        );
        let def = tree.add(
            NodeKind::VariableDefinition {
                symbol: symbol(&mut interner, "unused"),
                init: Some(call),
            },
            Span::DUMMY,
        );
        let block = tree.add(
            NodeKind::StatementBlock {
                statements: smallvec![def],
                scope: None,
            },
            Span::DUMMY,
        );
        assert_eq!(run(&mut tree, block), 0);
    }
}
